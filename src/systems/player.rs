//! Player movement, stamina and the three movement abilities.
//!
//! Movement is kinematic in normalized [0,1] space with input-aware
//! friction; knockback arrives through the player's physics body and decays
//! there. The abilities (shoulder bash, berserker charge, flow dash) are
//! mutually exclusive by construction: each `can_*` check rejects while any
//! other block is live.

use bevy_ecs::prelude::*;

use crate::components::{CombatState, DeltaTime, PlayerInput, PlayerRig, PlayerState};
use crate::fixed::{Fixed, FixedVec3};
use crate::physics::body::PLAYER_BODY_ID;
use crate::physics::PhysicsWorld;

pub const MOVE_SPEED: f32 = 0.3;
const STAMINA_REGEN_RATE: f32 = 0.4;
const MAX_JUMP_COUNT: u32 = 2;
const WALL_SLIDE_SPEED: f32 = 0.3;

const ACCELERATION: f32 = 16.0;
const TURN_BOOST: f32 = 2.5;
const FRICTION_WHEN_IDLE: f32 = 8.0;
const FRICTION_WHEN_MOVING: f32 = 1.5;

// Shoulder bash
const BASH_MIN_CHARGE: f32 = 0.3;
const BASH_MAX_CHARGE: f32 = 1.0;
const BASH_STAMINA_COST: f32 = 0.3;
const BASH_DURATION: f32 = 0.6;
const BASH_BASE_FORCE: f32 = 15.0;
pub const BASH_CHARGE_SLOW_FACTOR: f32 = 0.5;
const BASH_STAMINA_REFUND: f32 = 0.1;
const BASH_HIT_EXTENSION: f32 = 0.1;
const BASH_HITBOX_RADIUS: f32 = 0.05;
const BASH_HITBOX_OFFSET: f32 = 0.04;

// Berserker charge
const CHARGE_DURATION: f32 = 2.0;
pub const CHARGE_SPEED_MULT: f32 = 2.5;
const CHARGE_STAMINA_DRAIN: f32 = 0.25;
const CHARGE_MIN_STAMINA: f32 = 0.3;
const CHARGE_IMPULSE: f32 = 0.5;

// Flow dash
const DASH_DISTANCE: f32 = 0.2;
const DASH_DURATION: f32 = 0.15;
pub const DASH_STAMINA_COST: f32 = 0.15;
pub const DASH_MAX_COMBO: u32 = 3;
pub const DASH_COMBO_MULTIPLIER: f32 = 0.25;
pub const DASH_BASE_DAMAGE: f32 = 20.0;
const DASH_CANCEL_WINDOW: f32 = 0.3;
const DASH_COMBO_STAMINA_REFUND: f32 = 0.05;

/// Active bash hitbox: a circle held in front of the player.
#[derive(Debug, Clone, Copy, Default)]
pub struct BashHitbox {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub active: bool,
}

impl PlayerState {
    // ------------------------------------------------------------------
    // Jumping
    // ------------------------------------------------------------------

    pub fn can_jump(&self) -> bool {
        self.jump_count < MAX_JUMP_COUNT && self.stamina > 0.1
    }

    pub fn apply_jump(&mut self) {
        if self.can_jump() {
            self.vel_y += 0.6;
            self.jump_count += 1;
            self.consume_stamina(0.15);
            self.is_grounded = false;
        }
    }

    pub fn can_wall_slide(&self) -> bool {
        !self.is_grounded && self.stamina > 0.05
    }

    // ------------------------------------------------------------------
    // Shoulder bash
    // ------------------------------------------------------------------

    pub fn can_bash(&self) -> bool {
        !self.any_ability_active() && self.stamina >= BASH_STAMINA_COST
    }

    pub fn start_charging_bash(&mut self) {
        if self.can_bash() {
            self.bash.is_charging = true;
            self.bash.charge_time = 0.0;
        }
    }

    /// Below the minimum charge the release cancels at no cost; above it the
    /// charge level scales force and stamina spent.
    pub fn release_bash(&mut self) {
        if !self.bash.is_charging {
            return;
        }
        self.bash.is_charging = false;

        if self.bash.charge_time < BASH_MIN_CHARGE {
            return;
        }

        let multiplier = 1.0 + self.bash.charge_time;
        self.vel_x += self.facing_x * BASH_BASE_FORCE * multiplier * 0.1;
        self.vel_y += self.facing_y * BASH_BASE_FORCE * multiplier * 0.1;
        self.consume_stamina(BASH_STAMINA_COST * multiplier);

        self.bash.is_active = true;
        self.bash.duration = 0.0;
        self.bash.targets_hit = 0;
    }

    /// Connecting extends the active window and refunds a little stamina.
    pub fn on_bash_hit(&mut self, _target_id: u32) {
        if self.bash.is_active {
            self.bash.duration = (self.bash.duration - BASH_HIT_EXTENSION).max(0.0);
            self.bash.targets_hit += 1;
            self.restore_stamina(BASH_STAMINA_REFUND);
        }
    }

    pub fn bash_hitbox(&self) -> BashHitbox {
        BashHitbox {
            x: self.pos_x + self.facing_x * BASH_HITBOX_OFFSET,
            y: self.pos_y + self.facing_y * BASH_HITBOX_OFFSET,
            radius: BASH_HITBOX_RADIUS,
            active: self.bash.is_active,
        }
    }

    pub fn check_bash_collision(&self, target_x: f32, target_y: f32, target_radius: f32) -> bool {
        let hitbox = self.bash_hitbox();
        if !hitbox.active {
            return false;
        }
        let dx = target_x - hitbox.x;
        let dy = target_y - hitbox.y;
        let reach = hitbox.radius + target_radius;
        dx * dx + dy * dy <= reach * reach
    }

    // ------------------------------------------------------------------
    // Berserker charge
    // ------------------------------------------------------------------

    pub fn can_charge(&self) -> bool {
        !self.any_ability_active() && self.stamina >= CHARGE_MIN_STAMINA
    }

    // ------------------------------------------------------------------
    // Flow dash
    // ------------------------------------------------------------------

    pub fn can_dash(&self) -> bool {
        !self.any_ability_active() && self.stamina >= DASH_STAMINA_COST
    }

    /// Damage the current dash deals, scaled by combo level.
    pub fn dash_damage(&self) -> f32 {
        DASH_BASE_DAMAGE * (1.0 + self.dash.combo_level as f32 * DASH_COMBO_MULTIPLIER)
    }

    /// Connecting opens the cancel window during which a follow-up dash
    /// chains the combo.
    pub fn on_dash_hit(&mut self, _target_id: u32) {
        self.dash.cancel_window = DASH_CANCEL_WINDOW;
        self.dash.targets_hit += 1;
    }

    /// Cooperative cancellation: restores the speed multiplier and drops the
    /// combo.
    pub fn cancel_dash(&mut self) {
        self.dash.is_active = false;
        self.dash.is_invulnerable = false;
        self.dash.cancel_window = 0.0;
        self.dash.combo_level = 0;
        self.speed_multiplier = 1.0;
    }
}

/// Start a berserker charge: hyperarmor up, forward impulse, 2.5x speed.
pub fn execute_berserker_charge(player: &mut PlayerState, combat: &mut CombatState) -> bool {
    if !player.can_charge() {
        return false;
    }
    player.charge.is_active = true;
    player.charge.duration = 0.0;
    player.charge.targets_hit = 0;
    player.vel_x += player.facing_x * CHARGE_IMPULSE;
    player.vel_y += player.facing_y * CHARGE_IMPULSE;
    combat.has_hyperarmor = true;
    true
}

/// Cancel a charge: hyperarmor drops, speed restored.
pub fn cancel_berserker_charge(player: &mut PlayerState, combat: &mut CombatState) {
    player.charge.is_active = false;
    combat.has_hyperarmor = false;
    player.speed_multiplier = 1.0;
}

/// Commit to a dash target 0.2 world units along the requested direction
/// (facing when none given). A dash inside the cancel window chains the
/// combo, refunds stamina and scales damage.
pub fn execute_flow_dash(player: &mut PlayerState, dir_x: f32, dir_y: f32) -> bool {
    let chaining = player.dash.cancel_window > 0.0;
    if !chaining && !player.can_dash() {
        return false;
    }
    if chaining && player.stamina < DASH_STAMINA_COST {
        return false;
    }

    let mag = (dir_x * dir_x + dir_y * dir_y).sqrt();
    let (nx, ny) = if mag > 0.001 {
        (dir_x / mag, dir_y / mag)
    } else {
        (player.facing_x, player.facing_y)
    };

    if chaining && player.dash.combo_level < DASH_MAX_COMBO {
        player.dash.combo_level += 1;
        player.restore_stamina(DASH_COMBO_STAMINA_REFUND);
    }

    player.dash.start_x = player.pos_x;
    player.dash.start_y = player.pos_y;
    player.dash.target_x = (player.pos_x + nx * DASH_DISTANCE).clamp(0.0, 1.0);
    player.dash.target_y = (player.pos_y + ny * DASH_DISTANCE).clamp(0.0, 1.0);
    player.dash.duration = 0.0;
    player.dash.is_active = true;
    player.dash.is_invulnerable = true;
    player.dash.cancel_window = 0.0;
    player.facing_x = nx;
    player.facing_y = ny;
    player.consume_stamina(DASH_STAMINA_COST);
    true
}

fn update_bash(player: &mut PlayerState, dt: f32) {
    if player.bash.is_charging {
        player.bash.charge_time = (player.bash.charge_time + dt).min(BASH_MAX_CHARGE);
    }
    if player.bash.is_active {
        player.bash.duration += dt;
        if player.bash.duration >= BASH_DURATION {
            player.bash.is_active = false;
        }
    }
}

fn update_charge(player: &mut PlayerState, combat: &mut CombatState, dt: f32) {
    if !player.charge.is_active {
        return;
    }
    player.charge.duration += dt;
    player.consume_stamina(CHARGE_STAMINA_DRAIN * dt);

    // Maintain forward momentum while below the charge's target speed
    let target_speed = MOVE_SPEED * CHARGE_SPEED_MULT;
    if player.speed() < target_speed {
        player.vel_x += player.facing_x * ACCELERATION * 0.5 * dt;
        player.vel_y += player.facing_y * ACCELERATION * 0.5 * dt;
    }

    if player.charge.duration >= CHARGE_DURATION || player.stamina <= 0.0 {
        cancel_berserker_charge(player, combat);
    }
}

fn update_dash(player: &mut PlayerState, dt: f32) {
    if player.dash.is_active {
        player.dash.duration += dt;
        let t = (player.dash.duration / DASH_DURATION).clamp(0.0, 1.0);
        // Cubic ease-out
        let eased = 1.0 - (1.0 - t).powi(3);
        player.pos_x = player.dash.start_x + (player.dash.target_x - player.dash.start_x) * eased;
        player.pos_y = player.dash.start_y + (player.dash.target_y - player.dash.start_y) * eased;
        if t >= 1.0 {
            player.dash.is_active = false;
            player.dash.is_invulnerable = false;
        }
    } else if player.dash.cancel_window > 0.0 {
        player.dash.cancel_window -= dt;
        if player.dash.cancel_window <= 0.0 {
            player.dash.cancel_window = 0.0;
            player.dash.combo_level = 0;
        }
    }
}

/// Per-tick player update: movement from input, friction, knockback fold-in,
/// skeleton sync, abilities, stamina, grounded/wall flags.
///
/// ## Data Access
/// - Reads: DeltaTime, PlayerInput
/// - Writes: PlayerState, CombatState (hyperarmor), PlayerRig, PhysicsWorld (body 0)
pub fn player_system(
    dt: Res<DeltaTime>,
    input: Res<PlayerInput>,
    mut player: ResMut<PlayerState>,
    mut combat: ResMut<CombatState>,
    mut rig: ResMut<PlayerRig>,
    mut physics: ResMut<PhysicsWorld>,
) {
    let delta = dt.0;
    if delta <= 0.0 {
        return;
    }

    update_movement(&mut player, input.movement_x, input.movement_y, delta);

    // Friction + world clamp
    apply_friction(&mut player, delta);
    player.pos_x = player.pos_x.clamp(0.0, 1.0);
    player.pos_y = player.pos_y.clamp(0.0, 1.0);

    // Knockback rides on the kinematic player body: fold its decaying
    // velocity into the position, then push the position back to physics
    if let Some(body) = physics.get_body(PLAYER_BODY_ID) {
        let kx = body.velocity.x.to_float();
        let ky = body.velocity.y.to_float();
        if kx.abs() > 1e-4 || ky.abs() > 1e-4 {
            player.pos_x = (player.pos_x + kx * delta).clamp(0.0, 1.0);
            player.pos_y = (player.pos_y + ky * delta).clamp(0.0, 1.0);
        }
    }
    let pos = FixedVec3::new(
        Fixed::from_float(player.pos_x),
        Fixed::from_float(player.pos_y),
        Fixed::ZERO,
    );
    physics.set_position(PLAYER_BODY_ID, pos);

    // Skeleton follows the avatar; contact and balance flow back
    if player.use_skeleton_physics {
        let skeleton = &mut rig.skeleton;
        skeleton.sync_to_player_position(
            Fixed::from_float(player.pos_x),
            Fixed::from_float(player.pos_y),
        );
        skeleton.update(delta);
        player.balance_quality = skeleton.balance_quality();
        player.left_foot_grounded = skeleton.foot_contact_l;
        player.right_foot_grounded = skeleton.foot_contact_r;
    }

    update_bash(&mut player, delta);
    update_charge(&mut player, &mut combat, delta);
    update_dash(&mut player, delta);

    // Stamina regenerates toward full
    if player.stamina < 1.0 {
        player.stamina = (player.stamina + STAMINA_REGEN_RATE * delta).min(1.0);
    }

    player.state_timer += delta;
    update_grounded_state(&mut player);
    update_wall_sliding_state(&mut player);
}

fn update_movement(player: &mut PlayerState, input_x: f32, input_y: f32, delta: f32) {
    let input_mag_sq = input_x * input_x + input_y * input_y;

    // Instant stop without input prevents glide; abilities keep their
    // momentum
    if input_mag_sq < 1e-6 {
        player.last_input_x = 0.0;
        player.last_input_y = 0.0;
        if !player.bash.is_active && !player.charge.is_active && !player.dash.is_active {
            player.vel_x = 0.0;
            player.vel_y = 0.0;
        }
        return;
    }

    if input_mag_sq > 0.01 {
        let mag = input_mag_sq.sqrt();
        player.facing_x = input_x / mag;
        player.facing_y = input_y / mag;
    }

    let mut speed_mult = player.speed_multiplier;
    if player.bash.is_charging {
        speed_mult *= BASH_CHARGE_SLOW_FACTOR;
    }
    if player.charge.is_active {
        speed_mult = CHARGE_SPEED_MULT;
    }

    let target_vel_x = input_x * MOVE_SPEED * speed_mult;
    let target_vel_y = input_y * MOVE_SPEED * speed_mult;

    // Quick-turn assistance: reversing an axis overcomes inertia faster
    let mut accel_x = ACCELERATION;
    let mut accel_y = ACCELERATION;
    if target_vel_x != 0.0 && player.vel_x != 0.0 && target_vel_x * player.vel_x < 0.0 {
        accel_x *= TURN_BOOST;
    }
    if target_vel_y != 0.0 && player.vel_y != 0.0 && target_vel_y * player.vel_y < 0.0 {
        accel_y *= TURN_BOOST;
    }

    player.vel_x += (target_vel_x - player.vel_x) * accel_x * delta;
    player.vel_y += (target_vel_y - player.vel_y) * accel_y * delta;

    player.last_input_x = input_x;
    player.last_input_y = input_y;

    player.pos_x += player.vel_x * delta;
    player.pos_y += player.vel_y * delta;

    // World edge kills velocity on that axis
    if player.pos_x <= 0.0 || player.pos_x >= 1.0 {
        player.vel_x = 0.0;
    }
    if player.pos_y <= 0.0 || player.pos_y >= 1.0 {
        player.vel_y = 0.0;
    }
}

fn apply_friction(player: &mut PlayerState, delta: f32) {
    // Input-aware: light damping while steering, heavy when idle
    let input_mag = player.last_input_x.abs() + player.last_input_y.abs();
    let friction = if input_mag > 0.05 { FRICTION_WHEN_MOVING } else { FRICTION_WHEN_IDLE };
    let factor = 1.0 / (1.0 + friction * delta);

    player.vel_x *= factor;
    player.vel_y *= factor;

    // Snap residual drift to exact zero
    if player.vel_x.abs() < 5e-4 {
        player.vel_x = 0.0;
    }
    if player.vel_y.abs() < 5e-4 {
        player.vel_y = 0.0;
    }
}

fn update_grounded_state(player: &mut PlayerState) {
    if player.use_skeleton_physics {
        player.is_grounded = player.left_foot_grounded || player.right_foot_grounded;
    } else {
        // Legacy heuristic when the skeleton path is disabled
        let is_rising = player.vel_y > 0.1;
        let is_high_up = player.pos_y > 0.3;
        player.is_grounded = !is_rising && !is_high_up;
    }

    if player.is_grounded {
        player.jump_count = 0;
    }
}

fn update_wall_sliding_state(player: &mut PlayerState) {
    let near_wall = player.pos_x <= 0.1 || player.pos_x >= 0.9;
    player.is_wall_sliding = near_wall && !player.is_grounded && player.vel_y < 0.0;
    if player.is_wall_sliding {
        player.vel_y = player.vel_y.max(-WALL_SLIDE_SPEED);
    }
}
