//! Attack, roll and block state machines with combo, parry and counter
//! windows.

use bevy_ecs::prelude::*;

use crate::components::{
    AttackResult, AttackState, CombatState, DeltaTime, GameClock, PlayerInput, PlayerState,
    RollState,
};

const ATTACK_WINDUP_SEC: f32 = 0.3;
const ATTACK_ACTIVE_SEC: f32 = 0.2;
const ATTACK_RECOVERY_SEC: f32 = 0.4;
const ROLL_DURATION_SEC: f32 = 0.6;
const ROLL_COOLDOWN_SEC: f32 = 1.0;
pub const PARRY_WINDOW_SEC: f32 = 0.2;
const COMBO_WINDOW_SEC: f32 = 1.0;
pub const COUNTER_WINDOW_SEC: f32 = 0.5;

const LIGHT_ATTACK_STAMINA: f32 = 0.15;
const HEAVY_ATTACK_STAMINA: f32 = 0.25;
const SPECIAL_ATTACK_STAMINA: f32 = 0.4;
const ROLL_STAMINA: f32 = 0.2;
const BLOCK_STAMINA_PER_SEC: f32 = 0.1;
const BLOCK_MIN_STAMINA: f32 = 0.05;

impl CombatState {
    /// Only transitions into Windup cost stamina.
    pub fn try_light_attack(&mut self, player: &mut PlayerState) -> bool {
        if self.attack_state != AttackState::Idle || player.stamina < LIGHT_ATTACK_STAMINA {
            return false;
        }

        self.attack_state = AttackState::Windup;
        self.attack_state_time = 0.0;
        player.consume_stamina(LIGHT_ATTACK_STAMINA);

        if self.combo_window_remaining > 0.0 {
            self.combo_count += 1;
        } else {
            self.combo_count = 1;
        }
        self.combo_window_remaining = COMBO_WINDOW_SEC;
        true
    }

    /// Heavy attacks break the combo for bigger single hits.
    pub fn try_heavy_attack(&mut self, player: &mut PlayerState) -> bool {
        if self.attack_state != AttackState::Idle || player.stamina < HEAVY_ATTACK_STAMINA {
            return false;
        }

        self.attack_state = AttackState::Windup;
        self.attack_state_time = 0.0;
        player.consume_stamina(HEAVY_ATTACK_STAMINA);
        self.combo_count = 0;
        self.combo_window_remaining = 0.0;
        true
    }

    /// Specials carry hyperarmor through the windup and active phases.
    pub fn try_special_attack(&mut self, player: &mut PlayerState) -> bool {
        if self.attack_state != AttackState::Idle || player.stamina < SPECIAL_ATTACK_STAMINA {
            return false;
        }

        self.attack_state = AttackState::Windup;
        self.attack_state_time = 0.0;
        player.consume_stamina(SPECIAL_ATTACK_STAMINA);
        self.combo_count = 0;
        self.combo_window_remaining = 0.0;
        self.has_hyperarmor = true;
        true
    }

    /// Feints are only valid during windup; no refund.
    pub fn can_feint(&self) -> bool {
        self.attack_state == AttackState::Windup
    }

    pub fn feint_attack(&mut self) {
        if self.can_feint() {
            self.attack_state = AttackState::Idle;
            self.attack_state_time = 0.0;
            self.has_hyperarmor = false;
        }
    }

    pub fn try_block(&mut self, player: &PlayerState, current_time: f32) -> bool {
        if player.stamina < BLOCK_MIN_STAMINA {
            return false;
        }
        if !self.is_blocking {
            self.is_blocking = true;
            self.block_start_time = current_time;
        }
        true
    }

    pub fn stop_blocking(&mut self) {
        self.is_blocking = false;
    }

    pub fn try_roll(&mut self, player: &mut PlayerState) -> bool {
        if self.roll_state != RollState::Idle || player.stamina < ROLL_STAMINA {
            return false;
        }
        self.roll_state = RollState::Active;
        self.roll_time = 0.0;
        self.is_invulnerable = true;
        player.consume_stamina(ROLL_STAMINA);
        true
    }

    /// Remaining prefix of the parry window, zero once it has lapsed.
    pub fn parry_window_remaining(&self, current_time: f32) -> f32 {
        if !self.is_blocking {
            return 0.0;
        }
        (PARRY_WINDOW_SEC - (current_time - self.block_start_time)).max(0.0)
    }

    /// Parry effectiveness decays linearly across the window.
    pub fn parry_effectiveness(&self, timing_offset: f32) -> f32 {
        (1.0 - timing_offset / PARRY_WINDOW_SEC).clamp(0.0, 1.0)
    }

    /// Resolve an incoming attack at `current_time`. Rolls (and dash
    /// i-frames, folded in by the caller) make it a Miss; the parry window
    /// is the prefix of the block.
    pub fn handle_incoming_attack(&mut self, current_time: f32) -> AttackResult {
        if self.is_invulnerable {
            return AttackResult::Miss;
        }

        if self.is_blocking {
            let offset = current_time - self.block_start_time;
            if offset <= PARRY_WINDOW_SEC {
                self.can_counter = true;
                self.counter_window_remaining = COUNTER_WINDOW_SEC;
                return AttackResult::PerfectParry;
            }
            return AttackResult::Block;
        }

        AttackResult::Hit
    }

    pub fn apply_stun(&mut self, duration: f32) {
        if self.has_hyperarmor {
            return;
        }
        self.is_stunned = true;
        self.stun_remaining = self.stun_remaining.max(duration);
    }
}

/// Tick the combat FSMs.
///
/// ## Data Access
/// - Reads: DeltaTime
/// - Writes: CombatState, PlayerState (block stamina drain)
pub fn combat_system(
    dt: Res<DeltaTime>,
    mut combat: ResMut<CombatState>,
    mut player: ResMut<PlayerState>,
) {
    let delta = dt.0;
    if delta <= 0.0 {
        return;
    }

    update_attack_state(&mut combat, delta);
    update_roll_state(&mut combat, delta);
    update_block_state(&mut combat, &mut player, delta);
    update_combo(&mut combat, delta);
    update_counter_and_stun(&mut combat, delta);
}

/// Input latches drive combat actions once the managers have ticked.
///
/// ## Data Access
/// - Reads: PlayerInput, GameClock
/// - Writes: CombatState, PlayerState
pub fn combat_input_system(
    input: Res<PlayerInput>,
    clock: Res<GameClock>,
    mut combat: ResMut<CombatState>,
    mut player: ResMut<PlayerState>,
) {
    if input.light_attack {
        combat.try_light_attack(&mut player);
    }

    if input.heavy_attack {
        // Holding block turns the heavy press into a feint
        if input.is_blocking && combat.can_feint() {
            combat.feint_attack();
        } else {
            combat.try_heavy_attack(&mut player);
        }
    }

    if input.special_attack {
        combat.try_special_attack(&mut player);
    }

    if input.is_blocking {
        combat.try_block(&player, clock.game_time);
    } else {
        combat.stop_blocking();
    }

    if input.is_rolling {
        combat.try_roll(&mut player);
    }

    if input.is_jumping && player.can_jump() {
        player.apply_jump();
    }
}

/// Movement-speed multipliers from the combat state, reapplied every tick.
///
/// ## Data Access
/// - Reads: CombatState
/// - Writes: PlayerState (speed_multiplier)
pub fn combat_speed_system(combat: Res<CombatState>, mut player: ResMut<PlayerState>) {
    player.speed_multiplier = 1.0;

    match combat.attack_state {
        AttackState::Windup => player.speed_multiplier = 0.5,
        AttackState::Active => player.speed_multiplier = 0.3,
        AttackState::Recovery => player.speed_multiplier = 0.6,
        AttackState::Idle => {
            if combat.is_blocking {
                player.speed_multiplier = 0.4;
            }
        }
    }
}

fn update_attack_state(combat: &mut CombatState, delta: f32) {
    if combat.attack_state == AttackState::Idle {
        return;
    }

    combat.attack_state_time += delta;

    match combat.attack_state {
        AttackState::Windup => {
            if combat.attack_state_time >= ATTACK_WINDUP_SEC {
                combat.attack_state = AttackState::Active;
                combat.attack_state_time = 0.0;
            }
        }
        AttackState::Active => {
            if combat.attack_state_time >= ATTACK_ACTIVE_SEC {
                combat.attack_state = AttackState::Recovery;
                combat.attack_state_time = 0.0;
                // Hyperarmor only covers through the active phase
                combat.has_hyperarmor = false;
            }
        }
        AttackState::Recovery => {
            if combat.attack_state_time >= ATTACK_RECOVERY_SEC {
                combat.attack_state = AttackState::Idle;
                combat.attack_state_time = 0.0;
            }
        }
        AttackState::Idle => {}
    }
}

fn update_roll_state(combat: &mut CombatState, delta: f32) {
    if combat.roll_state == RollState::Idle {
        return;
    }

    combat.roll_time += delta;

    match combat.roll_state {
        RollState::Active => {
            if combat.roll_time >= ROLL_DURATION_SEC {
                combat.roll_state = RollState::Cooldown;
                combat.roll_time = 0.0;
                combat.is_invulnerable = false;
            }
        }
        RollState::Cooldown => {
            if combat.roll_time >= ROLL_COOLDOWN_SEC {
                combat.roll_state = RollState::Idle;
                combat.roll_time = 0.0;
            }
        }
        RollState::Idle => {}
    }
}

fn update_block_state(combat: &mut CombatState, player: &mut PlayerState, delta: f32) {
    if combat.is_blocking {
        player.consume_stamina(BLOCK_STAMINA_PER_SEC * delta);
        if player.stamina < 0.01 {
            combat.stop_blocking();
        }
    }
}

fn update_combo(combat: &mut CombatState, delta: f32) {
    if combat.combo_window_remaining > 0.0 {
        combat.combo_window_remaining -= delta;
        if combat.combo_window_remaining <= 0.0 {
            combat.combo_window_remaining = 0.0;
            combat.combo_count = 0;
        }
    }
}

fn update_counter_and_stun(combat: &mut CombatState, delta: f32) {
    if combat.counter_window_remaining > 0.0 {
        combat.counter_window_remaining -= delta;
        if combat.counter_window_remaining <= 0.0 {
            combat.counter_window_remaining = 0.0;
            combat.can_counter = false;
        }
    }

    if combat.is_stunned {
        combat.stun_remaining -= delta;
        if combat.stun_remaining <= 0.0 {
            combat.is_stunned = false;
            combat.stun_remaining = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_attack(combat: &mut CombatState, seconds: f32) {
        let steps = (seconds / (1.0 / 60.0)).round() as u32;
        for _ in 0..steps {
            update_attack_state(combat, 1.0 / 60.0);
        }
    }

    #[test]
    fn test_attack_fsm_cycle() {
        let mut combat = CombatState::default();
        let mut player = PlayerState::default();

        assert!(combat.try_light_attack(&mut player));
        assert_eq!(combat.attack_state, AttackState::Windup);
        assert!((player.stamina - 0.85).abs() < 0.001);

        run_attack(&mut combat, 0.35);
        assert_eq!(combat.attack_state, AttackState::Active);
        run_attack(&mut combat, 0.25);
        assert_eq!(combat.attack_state, AttackState::Recovery);
        run_attack(&mut combat, 0.45);
        assert_eq!(combat.attack_state, AttackState::Idle);
    }

    #[test]
    fn test_attack_rejected_while_busy_or_tired() {
        let mut combat = CombatState::default();
        let mut player = PlayerState::default();

        combat.try_light_attack(&mut player);
        assert!(!combat.try_heavy_attack(&mut player));

        let mut fresh = CombatState::default();
        player.stamina = 0.05;
        assert!(!fresh.try_light_attack(&mut player));
    }

    #[test]
    fn test_light_attacks_build_combo_heavy_resets() {
        let mut combat = CombatState::default();
        let mut player = PlayerState::default();

        combat.try_light_attack(&mut player);
        assert_eq!(combat.combo_count, 1);
        // Finish the attack inside the combo window
        run_attack(&mut combat, 0.95);
        combat.try_light_attack(&mut player);
        assert_eq!(combat.combo_count, 2);

        run_attack(&mut combat, 0.95);
        combat.try_heavy_attack(&mut player);
        assert_eq!(combat.combo_count, 0);
    }

    #[test]
    fn test_special_grants_hyperarmor_until_active_ends() {
        let mut combat = CombatState::default();
        let mut player = PlayerState::default();

        combat.try_special_attack(&mut player);
        assert!(combat.has_hyperarmor);

        run_attack(&mut combat, 0.35); // into Active
        assert!(combat.has_hyperarmor);
        run_attack(&mut combat, 0.25); // into Recovery
        assert!(!combat.has_hyperarmor);
    }

    #[test]
    fn test_feint_only_in_windup() {
        let mut combat = CombatState::default();
        let mut player = PlayerState::default();

        combat.try_heavy_attack(&mut player);
        assert!(combat.can_feint());
        combat.feint_attack();
        assert_eq!(combat.attack_state, AttackState::Idle);
        // No refund
        assert!((player.stamina - 0.75).abs() < 0.001);

        assert!(!combat.can_feint());
    }

    #[test]
    fn test_roll_grants_iframes_then_cools_down() {
        let mut combat = CombatState::default();
        let mut player = PlayerState::default();

        assert!(combat.try_roll(&mut player));
        assert!(combat.is_invulnerable);

        for _ in 0..40 {
            update_roll_state(&mut combat, 1.0 / 60.0);
        }
        assert_eq!(combat.roll_state, RollState::Cooldown);
        assert!(!combat.is_invulnerable);
        assert!(!combat.try_roll(&mut player));

        for _ in 0..65 {
            update_roll_state(&mut combat, 1.0 / 60.0);
        }
        assert_eq!(combat.roll_state, RollState::Idle);
    }

    #[test]
    fn test_perfect_parry_inside_window() {
        // Block started 0.05 s ago: still inside the parry window
        let mut combat = CombatState::default();
        combat.is_blocking = true;
        combat.block_start_time = 9.95;

        let result = combat.handle_incoming_attack(10.0);
        assert_eq!(result, AttackResult::PerfectParry);
        assert!(combat.can_counter);
        assert!((combat.counter_window_remaining - COUNTER_WINDOW_SEC).abs() < 0.001);
    }

    #[test]
    fn test_block_after_parry_window_lapses() {
        // Block started a full second ago: the parry window has lapsed
        let mut combat = CombatState::default();
        combat.is_blocking = true;
        combat.block_start_time = 9.0;

        let result = combat.handle_incoming_attack(10.0);
        assert_eq!(result, AttackResult::Block);
        assert!(!combat.can_counter);
    }

    #[test]
    fn test_invulnerable_attack_misses() {
        let mut combat = CombatState::default();
        combat.is_invulnerable = true;
        assert_eq!(combat.handle_incoming_attack(5.0), AttackResult::Miss);
    }

    #[test]
    fn test_unblocked_attack_hits() {
        let mut combat = CombatState::default();
        assert_eq!(combat.handle_incoming_attack(5.0), AttackResult::Hit);
    }

    #[test]
    fn test_parry_effectiveness_decays_linearly() {
        let combat = CombatState::default();
        assert!((combat.parry_effectiveness(0.0) - 1.0).abs() < 0.001);
        assert!((combat.parry_effectiveness(0.1) - 0.5).abs() < 0.001);
        assert_eq!(combat.parry_effectiveness(0.3), 0.0);
    }

    #[test]
    fn test_block_drains_stamina_and_breaks() {
        let mut combat = CombatState::default();
        let mut player = PlayerState::default();
        player.stamina = 0.05;
        combat.is_blocking = true;

        // ~0.5 s of blocking drains past the floor
        for _ in 0..30 {
            update_block_state(&mut combat, &mut player, 1.0 / 60.0);
        }
        assert!(!combat.is_blocking);
    }

    #[test]
    fn test_hyperarmor_suppresses_stun() {
        let mut combat = CombatState::default();
        combat.has_hyperarmor = true;
        combat.apply_stun(0.5);
        assert!(!combat.is_stunned);

        combat.has_hyperarmor = false;
        combat.apply_stun(0.5);
        assert!(combat.is_stunned);

        for _ in 0..35 {
            update_counter_and_stun(&mut combat, 1.0 / 60.0);
        }
        assert!(!combat.is_stunned);
    }
}
