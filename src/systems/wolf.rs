//! Wolf enemy AI: per-agent state machines with interrupt logic, emotion and
//! memory layers, spatial awareness, and deterministic pacing.
//!
//! Per-wolf update order: state machine -> movement -> emotion -> memory ->
//! awareness -> animation. Wolves adopt their physics body's post-step
//! position first, so every decision sees the player and packmates after
//! separation and knockback have been applied.

use bevy_ecs::prelude::*;

use crate::components::{
    AttackKind, CombatState, DeltaTime, Emotion, GameClock, PlayerState, RollState, WolfAnimation,
    WolfBodyId, WolfBrain, WolfBundle, WolfDirectory, WolfId, WolfKind, WolfMemory, WolfMotion,
    WolfState, WolfStats, WolfVitals,
};
use crate::fixed::{Fixed, FixedVec3};
use crate::physics::PhysicsWorld;

const ATTACK_ANTICIPATION_TIME: f32 = 0.3;
const ATTACK_EXECUTE_TIME: f32 = 0.2;
const ATTACK_RECOVERY_TIME: f32 = 0.3;

pub const ATTACK_FACING_COS_THRESHOLD: f32 = 0.5;
const DAMAGE_INTERRUPT_THRESHOLD: f32 = 6.0;

// Distance hysteresis multipliers
const ATTACK_ENTER_MULT: f32 = 1.0;
const ATTACK_EXIT_MULT: f32 = 1.15;
const APPROACH_ENTER_MULT: f32 = 0.70;
const APPROACH_EXIT_MULT: f32 = 0.85;

/// Proximity interrupt fires inside this fraction of attack range.
const PROXIMITY_INTERRUPT_MULT: f32 = 0.6;

/// A packmate inside this corridor blocks line of sight to the player.
const LOS_BLOCK_RADIUS: f32 = 0.025;

/// Sized so the resting contact distance against the player (combined radii
/// plus the separation buffer) sits inside the wolves' attack range;
/// otherwise the narrow phase would hold every wolf just out of reach.
const WOLF_BODY_RADIUS: f32 = 0.025;

/// Read-only picture of every wolf, captured before the mutable pass so
/// budget and line-of-sight checks see a consistent frame.
struct WolfSnapshot {
    id: u32,
    x: f32,
    y: f32,
    state: WolfState,
}

// ----------------------------------------------------------------------
// Spawning / structural commands (called with exclusive world access)
// ----------------------------------------------------------------------

/// Spawn a wolf of the given type at (x, y). Personality rolls draw from the
/// game clock's LCG; the physics proxy is a kinematic body the wolf layer
/// drives by velocity.
pub fn spawn_wolf(world: &mut World, x: f32, y: f32, kind: WolfKind) -> u32 {
    let wolf_id = {
        let mut dir = world.resource_mut::<WolfDirectory>();
        let id = dir.next_wolf_id;
        dir.next_wolf_id += 1;
        id
    };

    let rolls = {
        let mut clock = world.resource_mut::<GameClock>();
        [
            clock.random_float(),
            clock.random_float(),
            clock.random_float(),
            clock.random_float(),
        ]
    };

    let body_id = world
        .resource_mut::<PhysicsWorld>()
        .create_wolf_body(x, y, WOLF_BODY_RADIUS);

    let mut stats = WolfStats {
        aggression: 0.3 + rolls[0] * 0.4,
        intelligence: 0.4 + rolls[1] * 0.4,
        coordination: 0.5 + rolls[2] * 0.3,
        ..Default::default()
    };
    let mut vitals = WolfVitals { morale: 0.6 + rolls[3] * 0.2, ..Default::default() };

    match kind {
        WolfKind::Alpha => {
            vitals.max_health *= 1.5;
            vitals.health = vitals.max_health;
            stats.damage *= 1.3;
            stats.aggression = (stats.aggression + 0.2).min(1.0);
        }
        WolfKind::Scout => {
            stats.speed *= 1.2;
            stats.detection_range *= 1.3;
            stats.intelligence += 0.1;
        }
        WolfKind::Hunter => {
            stats.damage *= 1.2;
            stats.coordination += 0.15;
        }
        WolfKind::Normal | WolfKind::Omega => {}
    }
    // Base copies include the type modifiers; difficulty rescales from here
    stats.base_damage = stats.damage;
    stats.base_speed = stats.speed;
    stats.base_detection_range = stats.detection_range;
    stats.base_attack_range = stats.attack_range;

    // Spawn facing the arena center so freshly placed wolves are oriented
    // toward the fight
    let (dx, dy) = (0.5 - x, 0.5 - y);
    let mag = (dx * dx + dy * dy).sqrt();
    let facing = if mag > 0.001 { (dx / mag, dy / mag) } else { (1.0, 0.0) };

    let brain = WolfBrain {
        health_at_state_enter: vitals.health,
        state_timer: state_duration_for(wolf_id, Emotion::Calm, WolfState::Idle),
        ..Default::default()
    };

    let memory = WolfMemory {
        // Stable per-wolf approach angle, spread by the golden angle
        preferred_attack_angle: (wolf_id as f32 * 2.399_963) % (2.0 * std::f32::consts::PI),
        ..Default::default()
    };

    let entity = world
        .spawn(WolfBundle {
            id: WolfId(wolf_id),
            kind,
            body: WolfBodyId(body_id),
            motion: WolfMotion {
                x: Fixed::from_float(x),
                y: Fixed::from_float(y),
                facing_x: Fixed::from_float(facing.0),
                facing_y: Fixed::from_float(facing.1),
                ..Default::default()
            },
            vitals,
            stats,
            brain,
            memory,
            ..Default::default()
        })
        .id();

    world.resource_mut::<WolfDirectory>().body_to_entity.insert(body_id, entity);
    wolf_id
}

/// Remove a wolf and its body; the body-id map is rebuilt eagerly.
pub fn remove_wolf(world: &mut World, wolf_id: u32) {
    let mut found: Option<(Entity, u32)> = None;
    let mut query = world.query::<(Entity, &WolfId, &WolfBodyId)>();
    for (entity, id, body) in query.iter(world) {
        if id.0 == wolf_id {
            found = Some((entity, body.0));
            break;
        }
    }

    let Some((entity, body_id)) = found else {
        return;
    };

    world.resource_mut::<PhysicsWorld>().destroy_body(body_id);
    world.despawn(entity);
    rebuild_body_index_map(world);
}

/// Rebuild the body-id -> entity map from scratch. Must run on every
/// structural change; lookups between rebuilds rely on it being current.
pub fn rebuild_body_index_map(world: &mut World) {
    let mut entries = Vec::new();
    let mut query = world.query::<(Entity, &WolfBodyId)>();
    for (entity, body) in query.iter(world) {
        if body.0 != 0 {
            entries.push((body.0, entity));
        }
    }
    let mut dir = world.resource_mut::<WolfDirectory>();
    dir.body_to_entity.clear();
    dir.body_to_entity.extend(entries);
}

/// Damage a wolf, apply knockback through its body, and interrupt an attack
/// in progress.
pub fn damage_wolf(world: &mut World, wolf_id: u32, damage: f32, knockback_x: f32, knockback_y: f32) {
    let mut killed = false;
    let mut body_id = 0;

    let mut query = world.query::<(&WolfId, &WolfBodyId, &mut WolfVitals, &mut WolfBrain)>();
    for (id, body, mut vitals, mut brain) in query.iter_mut(world) {
        if id.0 != wolf_id {
            continue;
        }

        let was_alive = vitals.is_alive();
        vitals.health = (vitals.health - damage).max(0.0);
        vitals.morale = (vitals.morale - 0.05).max(0.0);
        body_id = body.0;

        if brain.state == WolfState::Attack {
            brain.state = WolfState::Recover;
            brain.state_timer = 0.5;
        }

        if !vitals.is_alive() {
            brain.state = WolfState::Flee;
            killed = was_alive;
        }
        break;
    }

    if body_id != 0 {
        let mut physics = world.resource_mut::<PhysicsWorld>();
        if let Some(body) = physics.get_body_mut(body_id) {
            body.wake();
            body.velocity.x += Fixed::from_float(knockback_x * 0.3);
            body.velocity.y += Fixed::from_float(knockback_y * 0.3);
        }
    }

    if killed {
        world.resource_mut::<GameClock>().wolf_kills_since_choice += 1;
    }
}

// ----------------------------------------------------------------------
// Per-tick AI
// ----------------------------------------------------------------------

/// Drive every wolf for one tick.
///
/// ## Data Access
/// - Reads: DeltaTime, GameClock, PlayerState, CombatState
/// - Writes: WolfDirectory (counters, difficulty), PhysicsWorld (wolf
///   bodies), all wolf components
pub fn wolf_ai_system(
    dt: Res<DeltaTime>,
    clock: Res<GameClock>,
    player: Res<PlayerState>,
    combat: Res<CombatState>,
    mut dir: ResMut<WolfDirectory>,
    mut physics: ResMut<PhysicsWorld>,
    mut wolves: Query<(
        &WolfId,
        &WolfKind,
        &WolfBodyId,
        &mut WolfMotion,
        &mut WolfVitals,
        &mut WolfStats,
        &mut WolfBrain,
        &mut WolfMemory,
        &mut WolfAnimation,
    )>,
) {
    let delta = dt.0;
    if delta <= 0.0 {
        return;
    }

    update_difficulty(&mut dir, delta);

    // Frame-consistent picture for budget and line-of-sight checks
    let snapshot: Vec<WolfSnapshot> = wolves
        .iter()
        .map(|(id, _, _, motion, _, _, brain, _, _)| WolfSnapshot {
            id: id.0,
            x: motion.x.to_float(),
            y: motion.y.to_float(),
            state: brain.state,
        })
        .collect();
    let mut attackers =
        snapshot.iter().filter(|w| w.state == WolfState::Attack).count() as u32;

    for (id, kind, body_id, mut motion, mut vitals, mut stats, mut brain, mut memory, mut anim) in
        wolves.iter_mut()
    {
        // Difficulty rescales live stats from the base copies
        let scale = dir.difficulty_scale;
        stats.speed = stats.base_speed * scale;
        stats.damage = stats.base_damage * scale;
        stats.detection_range = stats.base_detection_range * scale;
        stats.attack_range = stats.base_attack_range;

        // Adopt the body's post-physics position (separation + knockback)
        if let Some(body) = physics.get_body(body_id.0) {
            motion.x = body.position.x.clamp(Fixed::ZERO, Fixed::from_int(1));
            motion.y = body.position.y.clamp(Fixed::ZERO, Fixed::from_int(1));
            motion.vx = body.velocity.x;
            motion.vy = body.velocity.y;
        }

        if !vitals.is_alive() {
            brain.state = WolfState::Flee;
        }

        update_state_machine(
            id.0, *kind, &mut brain, &mut vitals, &stats, &motion, &mut memory, &player,
            &snapshot, &mut dir, &mut attackers, delta,
        );
        if brain.state != WolfState::Attack {
            vitals.stamina = (vitals.stamina + 0.2 * delta).min(1.0);
        }

        update_movement(&mut motion, &brain, &stats, &player, delta);
        update_emotion(&mut brain, &vitals, &memory);
        update_memory(&mut memory, &stats, &player, &combat, &clock, delta);
        update_awareness(&mut stats, &motion, &player, delta);
        update_animation(&mut anim, &brain, &vitals, &stats, delta);

        // Push the decided velocity back to the body; physics integrates it
        // next tick
        physics.set_position(
            body_id.0,
            FixedVec3::new(motion.x, motion.y, Fixed::ZERO),
        );
        physics.set_velocity(
            body_id.0,
            FixedVec3::new(motion.vx, motion.vy, Fixed::ZERO),
        );
    }
}

fn update_difficulty(dir: &mut WolfDirectory, delta: f32) {
    dir.difficulty_timer += delta;
    if dir.difficulty_timer < 10.0 {
        return;
    }
    dir.difficulty_timer = 0.0;

    // Skill from the attack ledger: a player who blocks and dodges most
    // attacks gets faster, harder-hitting wolves
    let attacks = dir.total_attacks.max(1) as f32;
    let avoided = (dir.player_blocks + dir.player_dodges) as f32;
    let skill = (avoided / attacks).clamp(0.0, 1.0);
    dir.difficulty_scale = (0.8 + skill * 0.5).clamp(0.8, 1.3);
}

#[allow(clippy::too_many_arguments)]
fn update_state_machine(
    wolf_id: u32,
    kind: WolfKind,
    brain: &mut WolfBrain,
    vitals: &mut WolfVitals,
    stats: &WolfStats,
    motion: &WolfMotion,
    memory: &mut WolfMemory,
    player: &PlayerState,
    snapshot: &[WolfSnapshot],
    dir: &mut WolfDirectory,
    attackers: &mut u32,
    delta: f32,
) {
    brain.state_timer -= delta;
    brain.decision_timer -= delta;
    if brain.collision_cooldown > 0.0 {
        brain.collision_cooldown = (brain.collision_cooldown - delta).max(0.0);
    }

    // Interrupts bypass the decision gate
    if let Some(next) = check_interrupts(
        wolf_id, brain, vitals, stats, motion, player, snapshot, dir, attackers,
    ) {
        if brain.state == WolfState::Attack && next != WolfState::Attack {
            memory.failed_attacks += 1;
        }
        if next == WolfState::Attack {
            brain.attack_kind = select_attack_kind(wolf_id, memory);
        }
        enter_state(wolf_id, brain, vitals, next, dir, attackers);
        brain.decision_timer = brain.decision_interval;
    } else if brain.state_timer <= 0.0 && brain.decision_timer <= 0.0 {
        // A wolf already attacking does not count itself against the budget
        let others_attacking = if brain.state == WolfState::Attack {
            attackers.saturating_sub(1)
        } else {
            *attackers
        };
        let next = evaluate_best_state(
            wolf_id, kind, brain, vitals, stats, motion, memory, player, snapshot, dir,
            others_attacking,
        );
        if next != brain.state {
            if brain.state == WolfState::Attack {
                memory.failed_attacks += 1;
            }
            if next == WolfState::Attack {
                brain.attack_kind = select_attack_kind(wolf_id, memory);
            }
            enter_state(wolf_id, brain, vitals, next, dir, attackers);
        } else {
            // Refresh the timer so the wolf never wedges in a stale state
            brain.state_timer = state_duration_for(wolf_id, brain.emotion, next);
        }
        brain.decision_timer = brain.decision_interval;
    }
}

fn enter_state(
    wolf_id: u32,
    brain: &mut WolfBrain,
    vitals: &mut WolfVitals,
    next: WolfState,
    dir: &mut WolfDirectory,
    attackers: &mut u32,
) {
    if brain.state == WolfState::Attack && next != WolfState::Attack {
        *attackers = attackers.saturating_sub(1);
    }
    if next == WolfState::Attack && brain.state != WolfState::Attack {
        *attackers += 1;
        dir.total_attacks += 1;
    }
    if next == WolfState::Retreat && brain.state != WolfState::Retreat {
        vitals.morale = (vitals.morale - 0.1).max(0.0);
    }
    if next == WolfState::Attack && brain.state != WolfState::Attack {
        vitals.stamina = (vitals.stamina - 0.1).max(0.0);
    }

    brain.state = next;
    brain.state_timer = state_duration_for(wolf_id, brain.emotion, next);
    brain.health_at_state_enter = vitals.health;
}

/// Interrupt table, highest priority first. Returns the state to force.
#[allow(clippy::too_many_arguments)]
fn check_interrupts(
    wolf_id: u32,
    brain: &mut WolfBrain,
    vitals: &WolfVitals,
    stats: &WolfStats,
    motion: &WolfMotion,
    player: &PlayerState,
    snapshot: &[WolfSnapshot],
    dir: &mut WolfDirectory,
    attackers: &mut u32,
) -> Option<WolfState> {
    // Critical health
    if vitals.health < vitals.max_health * 0.3 && brain.state != WolfState::Retreat {
        dir.interrupt_critical_health += 1;
        return Some(WolfState::Retreat);
    }

    // Pack command latch
    if let Some(commanded) = brain.pack_command.take() {
        if commanded != brain.state {
            dir.interrupt_pack_command += 1;
            // A commanded attack still goes through the gate
            if commanded != WolfState::Attack
                || should_attack(wolf_id, stats, motion, player, snapshot, dir, *attackers)
            {
                return Some(commanded);
            }
        }
    }

    // Close proximity: the prey is right here
    let dist = distance_to_player(motion, player);
    if dist < stats.attack_range * PROXIMITY_INTERRUPT_MULT && brain.state != WolfState::Attack {
        if should_attack(wolf_id, stats, motion, player, snapshot, dir, *attackers) {
            dir.interrupt_close_proximity += 1;
            return Some(WolfState::Attack);
        }
    }

    // Burst damage since state entry
    if brain.health_at_state_enter - vitals.health > DAMAGE_INTERRUPT_THRESHOLD
        && brain.state != WolfState::Recover
    {
        dir.interrupt_damage += 1;
        return Some(WolfState::Recover);
    }

    None
}

#[allow(clippy::too_many_arguments)]
fn evaluate_best_state(
    wolf_id: u32,
    kind: WolfKind,
    brain: &WolfBrain,
    vitals: &WolfVitals,
    stats: &WolfStats,
    motion: &WolfMotion,
    _memory: &WolfMemory,
    player: &PlayerState,
    snapshot: &[WolfSnapshot],
    dir: &mut WolfDirectory,
    attackers: u32,
) -> WolfState {
    let dist = distance_to_player(motion, player);

    // Out of detection range: keep patrolling or settle down
    if dist > stats.detection_range {
        return if brain.state == WolfState::Patrol {
            WolfState::Patrol
        } else {
            WolfState::Idle
        };
    }

    // Broken wolves disengage
    if vitals.health < vitals.max_health * 0.3 && vitals.morale < 0.4 {
        return WolfState::Retreat;
    }

    // Type preference
    match kind {
        WolfKind::Alpha => return WolfState::Approach,
        WolfKind::Scout => return WolfState::Strafe,
        WolfKind::Hunter => {
            if should_attack(wolf_id, stats, motion, player, snapshot, dir, attackers) {
                return WolfState::Attack;
            }
        }
        WolfKind::Normal | WolfKind::Omega => {}
    }

    // Distance hysteresis
    let attack_enter = stats.attack_range * ATTACK_ENTER_MULT;
    let attack_exit = stats.attack_range * ATTACK_EXIT_MULT;
    let approach_enter = stats.detection_range * APPROACH_ENTER_MULT;
    let approach_exit = stats.detection_range * APPROACH_EXIT_MULT;

    if dist < attack_enter {
        if should_attack(wolf_id, stats, motion, player, snapshot, dir, attackers) {
            return WolfState::Attack;
        }
        return WolfState::Strafe;
    }
    if (brain.state == WolfState::Attack || brain.state == WolfState::Strafe) && dist < attack_exit
    {
        return WolfState::Strafe;
    }

    if dist < approach_enter {
        return WolfState::Approach;
    }
    if brain.state == WolfState::Approach && dist < approach_exit {
        return WolfState::Approach;
    }

    WolfState::Alert
}

/// Attack gating: facing cone, clear line of sight, and the global
/// concurrent-attacker budget. Rejections feed the diagnostic counters.
fn should_attack(
    wolf_id: u32,
    _stats: &WolfStats,
    motion: &WolfMotion,
    player: &PlayerState,
    snapshot: &[WolfSnapshot],
    dir: &mut WolfDirectory,
    attackers: u32,
) -> bool {
    let wx = motion.x.to_float();
    let wy = motion.y.to_float();
    let dx = player.pos_x - wx;
    let dy = player.pos_y - wy;
    let dist = (dx * dx + dy * dy).sqrt();
    if dist < 0.001 {
        return true;
    }

    let facing_dot = (motion.facing_x.to_float() * dx + motion.facing_y.to_float() * dy) / dist;
    if facing_dot < ATTACK_FACING_COS_THRESHOLD {
        dir.gating_angle_rejects += 1;
        return false;
    }

    if !has_clear_path(wolf_id, wx, wy, player.pos_x, player.pos_y, snapshot) {
        dir.gating_los_rejects += 1;
        return false;
    }

    if attackers >= dir.max_concurrent_attackers {
        dir.threat_budget_deferrals += 1;
        return false;
    }

    true
}

/// A packmate standing inside the corridor to the player blocks the lunge.
fn has_clear_path(
    wolf_id: u32,
    wx: f32,
    wy: f32,
    px: f32,
    py: f32,
    snapshot: &[WolfSnapshot],
) -> bool {
    let dx = px - wx;
    let dy = py - wy;
    let len_sq = dx * dx + dy * dy;
    if len_sq < 1e-6 {
        return true;
    }

    for other in snapshot {
        if other.id == wolf_id {
            continue;
        }
        let t = ((other.x - wx) * dx + (other.y - wy) * dy) / len_sq;
        if !(0.05..0.95).contains(&t) {
            continue;
        }
        let cx = wx + dx * t;
        let cy = wy + dy * t;
        let off_sq = (other.x - cx) * (other.x - cx) + (other.y - cy) * (other.y - cy);
        if off_sq < LOS_BLOCK_RADIUS * LOS_BLOCK_RADIUS {
            return false;
        }
    }
    true
}

/// Base duration table, emotion multiplier, and a deterministic per-wolf
/// jitter (at most +2%) derived from the wolf id.
fn state_duration_for(wolf_id: u32, emotion: Emotion, state: WolfState) -> f32 {
    let base = match state {
        WolfState::Idle => 2.0,
        WolfState::Patrol => 4.0,
        WolfState::Alert => 1.0,
        WolfState::Approach => 3.0,
        WolfState::Strafe => 2.0,
        WolfState::Attack => ATTACK_ANTICIPATION_TIME + ATTACK_EXECUTE_TIME + ATTACK_RECOVERY_TIME,
        WolfState::Retreat => 2.0,
        WolfState::Recover => 1.0,
        _ => 1.0,
    };

    let mult = match emotion {
        Emotion::Confident if state == WolfState::Recover => 0.8,
        Emotion::Fearful if state == WolfState::Strafe => 1.3,
        Emotion::Desperate if state == WolfState::Attack => 0.9,
        _ => 1.0,
    };

    let mut seed = 0x9e37_79b9u32 ^ wolf_id.wrapping_mul(0x85eb_ca6b);
    seed ^= seed >> 16;
    let jitter = (seed % 100) as f32 / 1000.0;
    base * mult * (1.0 + jitter * 0.2)
}

/// Pick the attack flavor for this lunge from what the wolf remembers about
/// the player, with the id breaking ties for variety.
fn select_attack_kind(wolf_id: u32, memory: &WolfMemory) -> AttackKind {
    if memory.player_blocks > 2 && memory.player_blocks > memory.successful_attacks {
        AttackKind::Feint
    } else if memory.failed_attacks > memory.successful_attacks {
        AttackKind::QuickJab
    } else if wolf_id % 3 == 0 {
        AttackKind::PowerLunge
    } else {
        AttackKind::StandardLunge
    }
}

/// Steering by state. Velocity is blended toward the desired vector and the
/// body does the integrating; a live collision cooldown suppresses new
/// steering so separated wolves do not immediately pile back in.
fn update_movement(
    motion: &mut WolfMotion,
    brain: &WolfBrain,
    stats: &WolfStats,
    player: &PlayerState,
    delta: f32,
) {
    let dt = Fixed::from_float(delta);
    let speed = Fixed::from_float(stats.speed * emotion_speed_mult(brain.emotion));

    let to_player = FixedVec3::new(
        Fixed::from_float(player.pos_x) - motion.x,
        Fixed::from_float(player.pos_y) - motion.y,
        Fixed::ZERO,
    );
    let toward = to_player.normalized();

    let desired = if brain.collision_cooldown > 0.0 {
        FixedVec3::ZERO
    } else if let Some((tx, ty)) = brain.pack_target {
        let to_target = FixedVec3::new(
            Fixed::from_float(tx) - motion.x,
            Fixed::from_float(ty) - motion.y,
            Fixed::ZERO,
        );
        if to_target.length() < Fixed::from_float(0.02) {
            FixedVec3::ZERO
        } else {
            to_target.normalized() * speed
        }
    } else {
        match brain.state {
            WolfState::Approach | WolfState::Investigate => toward * speed,
            WolfState::Attack => toward * speed * Fixed::from_float(1.3),
            WolfState::Strafe => {
                // Tangential circling plus a radial term holding the ring
                let tangent = FixedVec3::new(-toward.y, toward.x, Fixed::ZERO);
                let ring = Fixed::from_float(stats.attack_range * 1.2);
                let dist = to_player.length();
                let radial = if dist > ring {
                    toward * Fixed::from_float(0.3)
                } else {
                    -toward * Fixed::from_float(0.3)
                };
                (tangent * Fixed::from_float(0.7) + radial) * speed
            }
            WolfState::Retreat | WolfState::Flee => -toward * speed,
            WolfState::Patrol => {
                // Drift along the current facing
                FixedVec3::new(motion.facing_x, motion.facing_y, Fixed::ZERO)
                    * speed
                    * Fixed::from_float(0.3)
            }
            WolfState::Idle | WolfState::Alert | WolfState::Recover | WolfState::Ambush => {
                FixedVec3::ZERO
            }
            WolfState::Flank => toward * speed,
        }
    };

    // Blend toward the desired velocity; the remainder is knockback decay
    let k = Fixed::min(Fixed::from_int(1), Fixed::from_int(10) * dt);
    motion.vx = motion.vx + (desired.x - motion.vx) * k;
    motion.vy = motion.vy + (desired.y - motion.vy) * k;

    // Face the travel direction when moving, otherwise track the player
    let vel = FixedVec3::new(motion.vx, motion.vy, Fixed::ZERO);
    let facing_source = if vel.length() > Fixed::from_float(0.02) { vel } else { to_player };
    let n = facing_source.normalized();
    if !n.is_zero() {
        motion.facing_x = n.x;
        motion.facing_y = n.y;
    }
}

fn emotion_speed_mult(emotion: Emotion) -> f32 {
    match emotion {
        Emotion::Aggressive => 1.1,
        Emotion::Desperate => 1.15,
        Emotion::Fearful => 0.9,
        _ => 1.0,
    }
}

fn update_emotion(brain: &mut WolfBrain, vitals: &WolfVitals, memory: &WolfMemory) {
    let frac = vitals.health_fraction();
    let next = if frac < 0.3 && vitals.morale < 0.4 {
        Emotion::Desperate
    } else if frac < 0.5 {
        Emotion::Fearful
    } else if memory.failed_attacks > memory.successful_attacks + 2 {
        Emotion::Frustrated
    } else if vitals.morale > 0.8 && memory.successful_attacks > memory.failed_attacks {
        Emotion::Confident
    } else if vitals.morale > 0.6
        && matches!(brain.state, WolfState::Attack | WolfState::Approach | WolfState::Strafe)
    {
        Emotion::Aggressive
    } else {
        Emotion::Calm
    };

    if next != brain.emotion {
        brain.previous_emotion = brain.emotion;
        brain.emotion = next;
    }
}

fn update_memory(
    memory: &mut WolfMemory,
    stats: &WolfStats,
    player: &PlayerState,
    combat: &CombatState,
    _clock: &GameClock,
    delta: f32,
) {
    if combat.is_blocking {
        if memory.last_player_block_time > 0.5 {
            memory.player_blocks += 1;
        }
        memory.last_player_block_time = 0.0;
    } else {
        memory.last_player_block_time += delta;
    }

    if combat.roll_state == RollState::Active {
        memory.last_player_roll_time = 0.0;
    } else {
        memory.last_player_roll_time += delta;
    }

    // Running estimate of how fast the player actually moves, weighted by
    // how observant this wolf is
    let observed = player.speed();
    let rate = (0.5 + stats.intelligence) * delta;
    memory.player_speed_estimate += (observed - memory.player_speed_estimate) * rate.min(1.0);
    memory.player_reaction_time = (0.4 - stats.intelligence * 0.2).max(0.1);
}

fn update_awareness(stats: &mut WolfStats, motion: &WolfMotion, player: &PlayerState, delta: f32) {
    let dist = distance_to_player(motion, player);
    let target = if dist >= stats.detection_range {
        0.0
    } else {
        1.0 - dist / stats.detection_range
    };
    stats.awareness += (target - stats.awareness) * (2.0 * delta).min(1.0);
}

fn update_animation(
    anim: &mut WolfAnimation,
    brain: &WolfBrain,
    vitals: &WolfVitals,
    stats: &WolfStats,
    delta: f32,
) {
    // Crouch on attack entry, ease back to neutral otherwise
    let stretch_target = if brain.state == WolfState::Attack { 0.8 } else { 1.0 };
    anim.body_stretch += (stretch_target - anim.body_stretch) * (5.0 * delta).min(1.0);

    anim.tail_wag = vitals.morale * stats.awareness;

    let ear_target = match brain.emotion {
        Emotion::Aggressive | Emotion::Confident => 0.3,
        Emotion::Fearful | Emotion::Desperate => -0.4,
        Emotion::Frustrated => -0.1,
        Emotion::Calm => 0.0,
    };
    for ear in &mut anim.ear_rotation {
        *ear += (ear_target - *ear) * (4.0 * delta).min(1.0);
    }
}

fn distance_to_player(motion: &WolfMotion, player: &PlayerState) -> f32 {
    let dx = player.pos_x - motion.x.to_float();
    let dy = player.pos_y - motion.y.to_float();
    (dx * dx + dy * dy).sqrt()
}
