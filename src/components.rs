//! ECS components and resources for the Fangwood simulation.
//!
//! Components are pure data containers attached to wolf entities; singleton
//! gameplay state (player, combat, clock, input) lives in resources. All
//! behavior lives in the systems modules.

use std::collections::HashMap;

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::fixed::Fixed;
use crate::skeleton::PlayerSkeleton;

// ============================================================================
// FRAME TIMING & INPUT
// ============================================================================

/// Delta time for the current tick, in seconds.
#[derive(Resource, Default)]
pub struct DeltaTime(pub f32);

/// Latched player input for the tick. Values are pre-clamped to [-1, 1] and
/// renormalized only when the magnitude exceeds 1.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct PlayerInput {
    pub movement_x: f32,
    pub movement_y: f32,
    pub is_rolling: bool,
    pub is_jumping: bool,
    pub light_attack: bool,
    pub heavy_attack: bool,
    pub is_blocking: bool,
    pub special_attack: bool,
}

impl PlayerInput {
    pub fn set(
        &mut self,
        x: f32,
        y: f32,
        rolling: bool,
        jumping: bool,
        light: bool,
        heavy: bool,
        blocking: bool,
        special: bool,
    ) {
        self.movement_x = x.clamp(-1.0, 1.0);
        self.movement_y = y.clamp(-1.0, 1.0);
        self.is_rolling = rolling;
        self.is_jumping = jumping;
        self.light_attack = light;
        self.heavy_attack = heavy;
        self.is_blocking = blocking;
        self.special_attack = special;

        // Magnitude <= 1 passes through unnormalized; above 1 is rescaled to
        // unit so diagonals are never faster than cardinals
        let len_sq = self.movement_x * self.movement_x + self.movement_y * self.movement_y;
        if len_sq > 1.0 {
            let len = len_sq.sqrt();
            self.movement_x /= len;
            self.movement_y /= len;
        }
    }

    /// Stun restriction: every channel cleared.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// GAME CLOCK & PHASE
// ============================================================================

/// Coarse run phase reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GamePhase {
    #[default]
    Explore,
    Fight,
    Choose,
    PowerUp,
    Risk,
    Escalate,
    CashOut,
    Reset,
}

/// Clock, phase machine and the simulation's only randomness source.
#[derive(Resource, Debug, Clone)]
pub struct GameClock {
    pub phase: GamePhase,
    pub game_time: f32,
    pub total_play_time: f32,
    pub wolf_kills_since_choice: u32,
    pub is_paused: bool,
    pub rng_seed: u64,
    rng_state: u64,
}

impl Default for GameClock {
    fn default() -> Self {
        Self {
            phase: GamePhase::Explore,
            game_time: 0.0,
            total_play_time: 0.0,
            wolf_kills_since_choice: 0,
            is_paused: false,
            rng_seed: 1,
            rng_state: 1,
        }
    }
}

impl GameClock {
    pub fn initialize(&mut self, seed: u64) {
        let seed = if seed == 0 { 1 } else { seed };
        *self = Self { rng_seed: seed, rng_state: seed, ..Self::default() };
    }

    /// Reset preserves cumulative play time.
    pub fn reset(&mut self, seed: u64) {
        let preserved = self.total_play_time;
        self.initialize(seed);
        self.total_play_time = preserved;
    }

    pub fn advance(&mut self, dt: f32) {
        if dt > 0.0 {
            self.game_time += dt;
            self.total_play_time += dt;
        }
        self.advance_rng();
    }

    fn advance_rng(&mut self) {
        self.rng_state = self.rng_state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
    }

    pub fn random_u32(&mut self) -> u32 {
        self.advance_rng();
        self.rng_state as u32
    }

    pub fn random_float(&mut self) -> f32 {
        self.random_u32() as f32 / u32::MAX as f32
    }

    pub fn can_transition_to(&self, target: GamePhase) -> bool {
        use GamePhase::*;
        match self.phase {
            Explore => matches!(target, Fight | Reset),
            Fight => matches!(target, Choose | Reset),
            Choose => matches!(target, PowerUp | Reset),
            PowerUp => matches!(target, Risk | Explore | Reset),
            Risk => matches!(target, Escalate | Explore | Reset),
            Escalate => matches!(target, CashOut | Reset),
            CashOut => matches!(target, Explore | Reset),
            Reset => matches!(target, Explore),
        }
    }

    pub fn transition_to(&mut self, target: GamePhase) -> bool {
        if !self.can_transition_to(target) {
            return false;
        }
        self.phase = target;
        if target == GamePhase::Explore {
            self.wolf_kills_since_choice = 0;
        }
        true
    }

    pub fn pause(&mut self) {
        self.is_paused = true;
    }

    pub fn resume(&mut self) {
        self.is_paused = false;
    }
}

// ============================================================================
// PLAYER
// ============================================================================

/// Shoulder-bash ability block: a charged dash with an active hitbox.
#[derive(Debug, Clone, Copy, Default)]
pub struct BashState {
    pub is_active: bool,
    pub is_charging: bool,
    pub duration: f32,
    pub charge_time: f32,
    pub targets_hit: u32,
}

/// Berserker-charge ability block: fixed-duration unstoppable sprint.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChargeState {
    pub is_active: bool,
    pub duration: f32,
    pub targets_hit: u32,
}

/// Flow-dash ability block: instant commit to a nearby point with i-frames
/// and a combo chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct DashState {
    pub is_active: bool,
    pub duration: f32,
    pub start_x: f32,
    pub start_y: f32,
    pub target_x: f32,
    pub target_y: f32,
    pub combo_level: u32,
    pub cancel_window: f32,
    pub is_invulnerable: bool,
    pub targets_hit: u32,
}

/// Kinematic player avatar plus ability state.
#[derive(Resource, Debug, Clone)]
pub struct PlayerState {
    pub pos_x: f32,
    pub pos_y: f32,
    pub vel_x: f32,
    pub vel_y: f32,

    pub stamina: f32,
    pub hp: f32,
    pub health: i32,
    pub max_health: i32,

    pub is_grounded: bool,
    pub is_wall_sliding: bool,
    pub jump_count: u32,

    pub state_timer: f32,
    pub speed_multiplier: f32,

    pub facing_x: f32,
    pub facing_y: f32,

    pub last_input_x: f32,
    pub last_input_y: f32,

    pub use_skeleton_physics: bool,
    pub balance_quality: f32,
    pub left_foot_grounded: bool,
    pub right_foot_grounded: bool,

    pub bash: BashState,
    pub charge: ChargeState,
    pub dash: DashState,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            pos_x: 0.5,
            pos_y: 0.5,
            vel_x: 0.0,
            vel_y: 0.0,
            stamina: 1.0,
            hp: 1.0,
            health: 100,
            max_health: 100,
            is_grounded: true,
            is_wall_sliding: false,
            jump_count: 0,
            state_timer: 0.0,
            speed_multiplier: 1.0,
            facing_x: 1.0,
            facing_y: 0.0,
            last_input_x: 0.0,
            last_input_y: 0.0,
            use_skeleton_physics: true,
            balance_quality: 1.0,
            left_foot_grounded: false,
            right_foot_grounded: false,
            bash: BashState::default(),
            charge: ChargeState::default(),
            dash: DashState::default(),
        }
    }
}

impl PlayerState {
    pub fn reset_to_spawn(&mut self) {
        *self = Self::default();
    }

    pub fn set_position(&mut self, x: f32, y: f32) {
        self.pos_x = x.clamp(0.0, 1.0);
        self.pos_y = y.clamp(0.0, 1.0);
    }

    pub fn consume_stamina(&mut self, amount: f32) {
        self.stamina = (self.stamina - amount).max(0.0);
    }

    pub fn restore_stamina(&mut self, amount: f32) {
        self.stamina = (self.stamina + amount).min(1.0);
    }

    /// Damage arrives in health points (0-100 scale) and is folded into the
    /// fractional hp so both views stay consistent.
    pub fn take_damage(&mut self, damage_points: f32) {
        self.hp = (self.hp - damage_points / self.max_health as f32).max(0.0);
        self.health = (self.hp * self.max_health as f32).round() as i32;
    }

    pub fn heal(&mut self, hp_fraction: f32) {
        self.hp = (self.hp + hp_fraction).min(1.0);
        self.health = (self.hp * self.max_health as f32).round() as i32;
    }

    pub fn speed(&self) -> f32 {
        (self.vel_x * self.vel_x + self.vel_y * self.vel_y).sqrt()
    }

    pub fn any_ability_active(&self) -> bool {
        self.bash.is_active
            || self.bash.is_charging
            || self.charge.is_active
            || self.dash.is_active
    }
}

/// The player skeleton as a resource; the skeleton itself stays
/// engine-agnostic in `skeleton.rs`.
#[derive(Resource)]
pub struct PlayerRig {
    pub skeleton: PlayerSkeleton,
}

impl Default for PlayerRig {
    fn default() -> Self {
        Self {
            skeleton: PlayerSkeleton::new(Fixed::from_float(0.5), Fixed::from_float(0.5)),
        }
    }
}

// ============================================================================
// COMBAT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AttackState {
    #[default]
    Idle,
    Windup,
    Active,
    Recovery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RollState {
    #[default]
    Idle,
    Active,
    Cooldown,
}

/// Outcome of an incoming attack against the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackResult {
    Miss,
    Hit,
    Block,
    PerfectParry,
}

/// Attack/roll/block state machines plus combo and counter windows.
#[derive(Resource, Debug, Clone, Default)]
pub struct CombatState {
    pub attack_state: AttackState,
    pub attack_state_time: f32,
    pub combo_count: u32,
    pub combo_window_remaining: f32,

    pub is_blocking: bool,
    pub block_start_time: f32,
    pub can_counter: bool,
    pub counter_window_remaining: f32,

    pub roll_state: RollState,
    pub roll_time: f32,
    pub is_invulnerable: bool,

    pub has_hyperarmor: bool,

    pub is_stunned: bool,
    pub stun_remaining: f32,
}

// ============================================================================
// ARM RIG
// ============================================================================

/// Physics body ids of one articulated arm.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArmChain {
    /// Kinematic, follows the player's shoulder.
    pub anchor: u32,
    pub upper: u32,
    pub forearm: u32,
    pub hand: u32,
}

/// Both arms plus their PD servo targets (normalized world space, z
/// accepted but ignored).
#[derive(Resource, Debug, Clone, Default)]
pub struct ArmRig {
    pub left: ArmChain,
    pub right: ArmChain,
    pub left_target: (f32, f32, f32),
    pub right_target: (f32, f32, f32),
}

impl ArmRig {
    pub fn is_installed(&self) -> bool {
        self.left.hand != 0 && self.right.hand != 0
    }
}

// ============================================================================
// WOLVES
// ============================================================================

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WolfId(pub u32);

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WolfKind {
    #[default]
    Normal,
    Alpha,
    Scout,
    Hunter,
    Omega,
}

/// Physics body backing this wolf.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct WolfBodyId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WolfState {
    #[default]
    Idle,
    Patrol,
    Investigate,
    Alert,
    Approach,
    Strafe,
    Attack,
    Retreat,
    Recover,
    Flee,
    Ambush,
    Flank,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PackRole {
    Leader,
    Bruiser,
    Skirmisher,
    Support,
    #[default]
    Scout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Emotion {
    #[default]
    Calm,
    Aggressive,
    Fearful,
    Desperate,
    Confident,
    Frustrated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttackKind {
    #[default]
    StandardLunge,
    QuickJab,
    PowerLunge,
    Feint,
}

/// Fixed-point transform; the authoritative simulation position of a wolf.
#[derive(Component, Debug, Clone, Copy)]
pub struct WolfMotion {
    pub x: Fixed,
    pub y: Fixed,
    pub vx: Fixed,
    pub vy: Fixed,
    pub facing_x: Fixed,
    pub facing_y: Fixed,
}

impl Default for WolfMotion {
    fn default() -> Self {
        Self {
            x: Fixed::from_float(0.5),
            y: Fixed::from_float(0.5),
            vx: Fixed::ZERO,
            vy: Fixed::ZERO,
            facing_x: Fixed::from_int(1),
            facing_y: Fixed::ZERO,
        }
    }
}

/// Health, stamina and morale.
#[derive(Component, Debug, Clone, Copy)]
pub struct WolfVitals {
    pub health: f32,
    pub max_health: f32,
    pub stamina: f32,
    pub morale: f32,
}

impl Default for WolfVitals {
    fn default() -> Self {
        Self { health: 100.0, max_health: 100.0, stamina: 1.0, morale: 0.7 }
    }
}

impl WolfVitals {
    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    pub fn health_fraction(&self) -> f32 {
        if self.max_health <= 0.0 {
            0.0
        } else {
            (self.health / self.max_health).clamp(0.0, 1.0)
        }
    }
}

/// Combat stats with base copies kept aside for difficulty rescaling, plus
/// the four personality scalars and awareness.
#[derive(Component, Debug, Clone, Copy)]
pub struct WolfStats {
    pub damage: f32,
    pub speed: f32,
    pub detection_range: f32,
    pub attack_range: f32,

    pub base_damage: f32,
    pub base_speed: f32,
    pub base_detection_range: f32,
    pub base_attack_range: f32,

    pub aggression: f32,
    pub intelligence: f32,
    pub coordination: f32,
    pub awareness: f32,
}

impl Default for WolfStats {
    fn default() -> Self {
        Self {
            damage: 15.0,
            speed: 0.25,
            detection_range: 0.4,
            attack_range: 0.08,
            base_damage: 15.0,
            base_speed: 0.25,
            base_detection_range: 0.4,
            base_attack_range: 0.08,
            aggression: 0.5,
            intelligence: 0.6,
            coordination: 0.65,
            awareness: 0.5,
        }
    }
}

/// FSM state, timers and pack command latch.
#[derive(Component, Debug, Clone, Copy)]
pub struct WolfBrain {
    pub state: WolfState,
    pub state_timer: f32,
    /// Reaction latency gate distinct from the physics tick.
    pub decision_timer: f32,
    pub decision_interval: f32,
    pub emotion: Emotion,
    pub previous_emotion: Emotion,
    pub health_at_state_enter: f32,
    /// Set by the pack planner; honored as an interrupt next evaluation.
    pub pack_command: Option<WolfState>,
    /// Pack-assigned movement target, normalized world space.
    pub pack_target: Option<(f32, f32)>,
    pub attack_kind: AttackKind,
    pub collision_cooldown: f32,
}

impl Default for WolfBrain {
    fn default() -> Self {
        Self {
            state: WolfState::Idle,
            state_timer: 0.0,
            decision_timer: 0.15,
            decision_interval: 0.15,
            emotion: Emotion::Calm,
            previous_emotion: Emotion::Calm,
            health_at_state_enter: 100.0,
            pack_command: None,
            pack_target: None,
            attack_kind: AttackKind::StandardLunge,
            collision_cooldown: 0.0,
        }
    }
}

/// Observed player behavior: block/roll recency, attack ledger, preferred
/// approach angle and running estimates.
#[derive(Component, Debug, Clone, Copy)]
pub struct WolfMemory {
    pub player_speed_estimate: f32,
    pub player_reaction_time: f32,
    pub last_player_block_time: f32,
    pub last_player_roll_time: f32,
    pub preferred_attack_angle: f32,
    pub successful_attacks: u32,
    pub failed_attacks: u32,
    pub player_blocks: u32,
}

impl Default for WolfMemory {
    fn default() -> Self {
        Self {
            player_speed_estimate: 0.3,
            player_reaction_time: 0.3,
            last_player_block_time: 999.0,
            last_player_roll_time: 999.0,
            preferred_attack_angle: 0.0,
            successful_attacks: 0,
            failed_attacks: 0,
            player_blocks: 0,
        }
    }
}

/// Presentation channels; never read back by the simulation.
#[derive(Component, Debug, Clone, Copy)]
pub struct WolfAnimation {
    pub body_stretch: f32,
    pub tail_wag: f32,
    pub ear_rotation: [f32; 2],
}

impl Default for WolfAnimation {
    fn default() -> Self {
        Self { body_stretch: 1.0, tail_wag: 0.0, ear_rotation: [0.0, 0.0] }
    }
}

/// Pack membership; index is the wolf's slot in the pack's ordered list.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct PackMember {
    pub pack_id: u32,
    pub index: i32,
    pub role: PackRole,
}

/// Bundle for spawning a complete wolf entity.
#[derive(Bundle, Default)]
pub struct WolfBundle {
    pub id: WolfId,
    pub kind: WolfKind,
    pub body: WolfBodyId,
    pub motion: WolfMotion,
    pub vitals: WolfVitals,
    pub stats: WolfStats,
    pub brain: WolfBrain,
    pub memory: WolfMemory,
    pub animation: WolfAnimation,
    pub pack: PackMember,
}

// ============================================================================
// PACKS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PackPlan {
    #[default]
    None,
    Ambush,
    Pincer,
    Retreat,
    Commit,
    Flank,
    Distract,
    Regroup,
}

/// One pack: ordered member list and the currently executing plan.
#[derive(Debug, Clone, Default)]
pub struct Pack {
    pub pack_id: u32,
    pub wolf_ids: Vec<u32>,
    pub current_plan: PackPlan,
    pub plan_timer: f32,
    pub coordination_bonus: f32,
    pub pack_morale: f32,
    pub leader_index: i32,
}

impl Pack {
    pub fn new(pack_id: u32, wolf_ids: Vec<u32>) -> Self {
        Self {
            pack_id,
            wolf_ids,
            current_plan: PackPlan::None,
            plan_timer: 0.0,
            coordination_bonus: 1.0,
            pack_morale: 0.7,
            leader_index: -1,
        }
    }
}

/// All packs; wolves reference entries by pack id.
#[derive(Resource, Debug, Default)]
pub struct PackRegistry {
    pub packs: Vec<Pack>,
    pub next_pack_id: u32,
}

impl PackRegistry {
    pub fn find(&self, pack_id: u32) -> Option<&Pack> {
        self.packs.iter().find(|p| p.pack_id == pack_id)
    }

    pub fn find_mut(&mut self, pack_id: u32) -> Option<&mut Pack> {
        self.packs.iter_mut().find(|p| p.pack_id == pack_id)
    }
}

// ============================================================================
// WOLF DIRECTORY
// ============================================================================

/// Bookkeeping shared across the wolf systems: the body-id -> entity map
/// (rebuilt eagerly on every structural change), id allocation, the
/// concurrent-attacker budget and the diagnostic counters.
#[derive(Resource, Debug)]
pub struct WolfDirectory {
    pub body_to_entity: HashMap<u32, Entity>,
    pub next_wolf_id: u32,
    pub max_concurrent_attackers: u32,

    // Attack-gating / interrupt diagnostics
    pub interrupt_critical_health: u32,
    pub interrupt_pack_command: u32,
    pub interrupt_close_proximity: u32,
    pub interrupt_damage: u32,
    pub gating_angle_rejects: u32,
    pub gating_los_rejects: u32,
    pub threat_budget_deferrals: u32,

    // Skill estimation ledger
    pub total_attacks: u32,
    pub player_blocks: u32,
    pub player_dodges: u32,
    pub average_kill_time: f32,
    pub difficulty_timer: f32,
    /// Live multiplier applied over the base stat copies, within [0.8, 1.3].
    pub difficulty_scale: f32,
}

impl Default for WolfDirectory {
    fn default() -> Self {
        Self {
            body_to_entity: HashMap::new(),
            next_wolf_id: 1,
            max_concurrent_attackers: 2,
            interrupt_critical_health: 0,
            interrupt_pack_command: 0,
            interrupt_close_proximity: 0,
            interrupt_damage: 0,
            gating_angle_rejects: 0,
            gating_los_rejects: 0,
            threat_budget_deferrals: 0,
            total_attacks: 0,
            player_blocks: 0,
            player_dodges: 0,
            average_kill_time: 30.0,
            difficulty_timer: 0.0,
            difficulty_scale: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_clamped_and_normalized() {
        let mut input = PlayerInput::default();
        input.set(2.0, 2.0, false, false, false, false, false, false);
        let mag = (input.movement_x * input.movement_x + input.movement_y * input.movement_y).sqrt();
        assert!((mag - 1.0).abs() < 0.001);

        // Sub-unit input passes through unchanged
        input.set(0.5, 0.5, false, false, false, false, false, false);
        assert!((input.movement_x - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_clock_rng_is_seed_deterministic() {
        let mut a = GameClock::default();
        let mut b = GameClock::default();
        a.initialize(42);
        b.initialize(42);
        for _ in 0..100 {
            assert_eq!(a.random_u32(), b.random_u32());
        }
    }

    #[test]
    fn test_clock_zero_seed_coerced() {
        let mut clock = GameClock::default();
        clock.initialize(0);
        assert_eq!(clock.rng_seed, 1);
    }

    #[test]
    fn test_phase_transition_matrix() {
        let mut clock = GameClock::default();
        assert!(!clock.transition_to(GamePhase::Choose)); // Explore -/-> Choose
        assert!(clock.transition_to(GamePhase::Fight));
        assert!(clock.transition_to(GamePhase::Choose));
        assert_eq!(clock.phase, GamePhase::Choose);
    }

    #[test]
    fn test_reset_preserves_total_play_time() {
        let mut clock = GameClock::default();
        clock.initialize(7);
        clock.advance(5.0);
        clock.reset(9);
        assert_eq!(clock.game_time, 0.0);
        assert!((clock.total_play_time - 5.0).abs() < 0.001);
    }

    #[test]
    fn test_player_damage_keeps_views_consistent() {
        let mut player = PlayerState::default();
        player.take_damage(15.0);
        assert!((player.hp - 0.85).abs() < 0.001);
        assert_eq!(player.health, 85);
        assert_eq!(player.health, (player.hp * player.max_health as f32).round() as i32);
    }

    #[test]
    fn test_player_hp_clamps_at_zero() {
        let mut player = PlayerState::default();
        player.take_damage(500.0);
        assert_eq!(player.hp, 0.0);
        assert_eq!(player.health, 0);
    }

    #[test]
    fn test_stamina_bounds() {
        let mut player = PlayerState::default();
        player.consume_stamina(2.0);
        assert_eq!(player.stamina, 0.0);
        player.restore_stamina(5.0);
        assert_eq!(player.stamina, 1.0);
    }

    #[test]
    fn test_ability_mutual_exclusion_flag() {
        let mut player = PlayerState::default();
        assert!(!player.any_ability_active());
        player.dash.is_active = true;
        assert!(player.any_ability_active());
    }
}
