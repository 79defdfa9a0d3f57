//! Collision-event routing: the bridge from physics back into gameplay.
//!
//! Runs last in the tick. Drains the event ring in order, applies damage,
//! block/parry mediation and collision cooldowns, then clears the ring so
//! consumers reading the snapshot see fully resolved state.

use bevy_ecs::prelude::*;

use crate::components::{
    AttackResult, CombatState, GameClock, PlayerState, WolfBrain, WolfDirectory, WolfMemory,
    WolfMotion, WolfState, WolfStats,
};
use crate::physics::body::{GROUND_BODY_ID, PLAYER_BODY_ID};
use crate::physics::PhysicsWorld;

/// Cooldown after a player-wolf contact.
const PLAYER_WOLF_COOLDOWN: f32 = 0.5;
/// Cooldown after a wolf-wolf contact.
const WOLF_WOLF_COOLDOWN: f32 = 0.4;

const BASE_COLLISION_DAMAGE: f32 = 5.0;
const BLOCK_DAMAGE_MULT: f32 = 0.2;
const BLOCK_STAMINA_COST: f32 = 0.1;
/// The wolf must be inside roughly a 60-degree cone in front of the player
/// for a block to connect.
const BLOCK_FACING_DOT: f32 = 0.5;

/// Route every collision event into gameplay, then clear the ring.
///
/// ## Data Access
/// - Reads: GameClock
/// - Writes: PhysicsWorld (event ring), PlayerState, CombatState,
///   WolfDirectory (ledger), wolf brain/memory
pub fn collision_routing_system(
    clock: Res<GameClock>,
    mut physics: ResMut<PhysicsWorld>,
    mut player: ResMut<PlayerState>,
    mut combat: ResMut<CombatState>,
    mut dir: ResMut<WolfDirectory>,
    mut wolves: Query<(&WolfMotion, &WolfStats, &mut WolfBrain, &mut WolfMemory)>,
) {
    let events: Vec<_> = physics.events().events().to_vec();

    for event in &events {
        let player_is_a = event.body_a == PLAYER_BODY_ID;
        let player_is_b = event.body_b == PLAYER_BODY_ID;

        if player_is_a || player_is_b {
            let other = if player_is_a { event.body_b } else { event.body_a };
            if other == GROUND_BODY_ID {
                continue;
            }
            let Some(&entity) = dir.body_to_entity.get(&other) else {
                continue;
            };
            let Ok((motion, stats, mut brain, mut memory)) = wolves.get_mut(entity) else {
                continue;
            };

            brain.collision_cooldown = PLAYER_WOLF_COOLDOWN;

            // Damage: the wolf's full attack damage mid-lunge, otherwise a
            // bump scaled by the collision impulse
            let wolf_attacking = brain.state == WolfState::Attack;
            let mut damage = if wolf_attacking {
                stats.damage
            } else {
                BASE_COLLISION_DAMAGE * (1.0 + event.impulse * 0.5)
            };
            damage = damage.clamp(1.0, 50.0);

            let result = resolve_defense(
                &mut combat,
                &mut player,
                motion,
                clock.game_time,
                &mut damage,
            );

            match result {
                AttackResult::Miss => dir.player_dodges += 1,
                AttackResult::Block | AttackResult::PerfectParry => dir.player_blocks += 1,
                AttackResult::Hit => {}
            }

            player.take_damage(damage);

            if wolf_attacking && result == AttackResult::Hit {
                memory.successful_attacks += 1;
            }
        } else {
            // Wolf-wolf contact: separation is physics' job, the cooldown
            // keeps them from piling straight back onto the same spot
            let wolf_a = dir.body_to_entity.get(&event.body_a).copied();
            let wolf_b = dir.body_to_entity.get(&event.body_b).copied();
            if let (Some(a), Some(b)) = (wolf_a, wolf_b) {
                if let Ok((_, _, mut brain, _)) = wolves.get_mut(a) {
                    brain.collision_cooldown = WOLF_WOLF_COOLDOWN;
                }
                if let Ok((_, _, mut brain, _)) = wolves.get_mut(b) {
                    brain.collision_cooldown = WOLF_WOLF_COOLDOWN;
                }
            }
        }
    }

    physics.events_mut().clear();
}

/// Apply i-frames, block and parry to an incoming hit, scaling `damage`
/// accordingly and returning what happened.
fn resolve_defense(
    combat: &mut CombatState,
    player: &mut PlayerState,
    wolf_motion: &WolfMotion,
    now: f32,
    damage: &mut f32,
) -> AttackResult {
    if combat.is_invulnerable || player.dash.is_invulnerable {
        *damage = 0.0;
        return AttackResult::Miss;
    }

    if combat.is_blocking {
        // Block only counts with the wolf in front of the player
        let dx = wolf_motion.x.to_float() - player.pos_x;
        let dy = wolf_motion.y.to_float() - player.pos_y;
        let dist = (dx * dx + dy * dy).sqrt();
        if dist > 0.001 {
            let dot = (dx / dist) * player.facing_x + (dy / dist) * player.facing_y;
            if dot >= BLOCK_FACING_DOT {
                let offset = now - combat.block_start_time;
                let result = combat.handle_incoming_attack(now);
                match result {
                    AttackResult::PerfectParry => {
                        // Better timing absorbs more; never worse than a block
                        let effectiveness = combat.parry_effectiveness(offset);
                        *damage *= BLOCK_DAMAGE_MULT * (1.0 - effectiveness);
                    }
                    AttackResult::Block => {
                        *damage *= BLOCK_DAMAGE_MULT;
                        player.consume_stamina(BLOCK_STAMINA_COST);
                    }
                    _ => {}
                }
                return result;
            }
        }
    }

    AttackResult::Hit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::Fixed;

    fn wolf_motion_at(x: f32, y: f32) -> WolfMotion {
        WolfMotion {
            x: Fixed::from_float(x),
            y: Fixed::from_float(y),
            ..Default::default()
        }
    }

    #[test]
    fn test_parry_inside_window_mitigates_heavily() {
        // Blocking since 9.95, the wolf connects at 10.0 with damage 15
        let mut combat = CombatState::default();
        combat.is_blocking = true;
        combat.block_start_time = 9.95;
        let mut player = PlayerState::default();
        player.facing_x = 1.0;
        player.facing_y = 0.0;
        let wolf = wolf_motion_at(0.6, 0.5);

        let mut damage = 15.0;
        let result = resolve_defense(&mut combat, &mut player, &wolf, 10.0, &mut damage);

        assert_eq!(result, AttackResult::PerfectParry);
        assert!(damage <= 0.2 * 15.0, "damage = {}", damage);
        assert!((combat.counter_window_remaining - 0.5).abs() < 0.001);

        player.take_damage(damage);
        assert!(1.0 - player.hp <= 0.03 + 1e-6);
    }

    #[test]
    fn test_lapsed_parry_still_blocks() {
        // Block started a full second earlier
        let mut combat = CombatState::default();
        combat.is_blocking = true;
        combat.block_start_time = 9.0;
        let mut player = PlayerState::default();
        player.facing_x = 1.0;
        let wolf = wolf_motion_at(0.6, 0.5);

        let mut damage = 15.0;
        let result = resolve_defense(&mut combat, &mut player, &wolf, 10.0, &mut damage);

        assert_eq!(result, AttackResult::Block);
        assert!((damage - 3.0).abs() < 0.001);
        assert!(!combat.can_counter, "no counter window on a plain block");
        assert!((player.stamina - 0.9).abs() < 0.001);
    }

    #[test]
    fn test_block_fails_behind_the_player() {
        let mut combat = CombatState::default();
        combat.is_blocking = true;
        combat.block_start_time = 10.0;
        let mut player = PlayerState::default();
        player.facing_x = 1.0;
        // Wolf directly behind
        let wolf = wolf_motion_at(0.4, 0.5);

        let mut damage = 15.0;
        let result = resolve_defense(&mut combat, &mut player, &wolf, 10.0, &mut damage);
        assert_eq!(result, AttackResult::Hit);
        assert!((damage - 15.0).abs() < 0.001);
    }

    #[test]
    fn test_iframes_negate_damage() {
        let mut combat = CombatState::default();
        combat.is_invulnerable = true;
        let mut player = PlayerState::default();
        let wolf = wolf_motion_at(0.6, 0.5);

        let mut damage = 15.0;
        let result = resolve_defense(&mut combat, &mut player, &wolf, 10.0, &mut damage);
        assert_eq!(result, AttackResult::Miss);
        assert_eq!(damage, 0.0);

        // Dash i-frames count too
        let mut combat = CombatState::default();
        let mut player = PlayerState::default();
        player.dash.is_invulnerable = true;
        let mut damage = 15.0;
        assert_eq!(
            resolve_defense(&mut combat, &mut player, &wolf, 10.0, &mut damage),
            AttackResult::Miss
        );
    }
}
