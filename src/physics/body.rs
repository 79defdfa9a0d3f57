//! Rigid body record, sleep rule, world configuration and collision layers.

use crate::fixed::{Fixed, FixedVec3};

/// Body id 0 is always the player; this sentinel marks the ground plane in
/// collision events.
pub const GROUND_BODY_ID: u32 = 0xFFFF_FFFF;

/// Reserved id of the player body.
pub const PLAYER_BODY_ID: u32 = 0;

/// Collision layer bits.
pub mod layers {
    pub const NONE: u32 = 0;
    pub const DEFAULT: u32 = 1 << 0;
    pub const PLAYER: u32 = 1 << 1;
    pub const ENEMY: u32 = 1 << 2;
    pub const ENVIRONMENT: u32 = 1 << 3;
    pub const PROJECTILE: u32 = 1 << 4;
    pub const PLAYER_ARM: u32 = 1 << 5;
    pub const ALL: u32 = 0xFFFF_FFFF;
}

/// Cheap bitmask test run before any collision math.
#[inline]
pub fn should_collide(a_layer: u32, a_mask: u32, b_layer: u32, b_mask: u32) -> bool {
    (a_mask & b_layer) != 0 && (b_mask & a_layer) != 0
}

/// How physics affects a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Affected by forces and gravity.
    Dynamic,
    /// Moved manually, still receives impulses (knockback decay).
    Kinematic,
    /// Never moves.
    Static,
}

/// Rigid body for the sphere simulation. All simulation-relevant fields are
/// fixed-point.
#[derive(Debug, Clone, Copy)]
pub struct RigidBody {
    pub id: u32,
    pub kind: BodyKind,

    pub position: FixedVec3,
    pub velocity: FixedVec3,
    pub acceleration: FixedVec3,

    /// Mass and its inverse are stored together so constraint solvers never
    /// redivide.
    pub mass: Fixed,
    pub inverse_mass: Fixed,
    pub friction: Fixed,
    pub restitution: Fixed,
    /// Per-step velocity damping multiplier.
    pub drag: Fixed,
    pub radius: Fixed,

    pub collision_layer: u32,
    pub collision_mask: u32,

    pub is_sleeping: bool,
    pub sleep_threshold: Fixed,
    /// Accumulated microseconds below the sleep threshold.
    pub sleep_timer_micros: i32,
}

impl Default for RigidBody {
    fn default() -> Self {
        Self {
            id: 0,
            kind: BodyKind::Dynamic,
            position: FixedVec3::ZERO,
            velocity: FixedVec3::ZERO,
            acceleration: FixedVec3::ZERO,
            mass: Fixed::from_int(70),
            inverse_mass: Fixed::from_float(1.0 / 70.0),
            friction: Fixed::from_float(0.9),
            restitution: Fixed::from_float(0.3),
            drag: Fixed::from_float(0.98),
            radius: Fixed::from_float(0.05),
            collision_layer: layers::DEFAULT,
            collision_mask: layers::ALL,
            is_sleeping: false,
            sleep_threshold: Fixed::from_float(0.01),
            sleep_timer_micros: 0,
        }
    }
}

impl RigidBody {
    /// Static never simulates; sleeping bodies skip; Kinematic only while it
    /// still has velocity (so manually moved bodies cost nothing but
    /// knockback still decays).
    pub fn should_simulate(&self) -> bool {
        match self.kind {
            BodyKind::Static => false,
            _ if self.is_sleeping => false,
            BodyKind::Dynamic => true,
            BodyKind::Kinematic => !self.velocity.is_zero(),
        }
    }

    /// Everything except Static and sleeping Dynamic participates in
    /// collision detection.
    pub fn should_collide(&self) -> bool {
        match self.kind {
            BodyKind::Static => false,
            BodyKind::Dynamic => !self.is_sleeping,
            BodyKind::Kinematic => true,
        }
    }

    /// Sleep rule (Dynamic only): below-threshold speed for more than one
    /// accumulated second puts the body to sleep with zeroed motion.
    pub fn update_sleep_state(&mut self, timestep_micros: i32) {
        if self.kind != BodyKind::Dynamic {
            return;
        }

        let speed_sq = self.velocity.length_squared();
        let threshold_sq = self.sleep_threshold * self.sleep_threshold;

        if speed_sq < threshold_sq {
            self.sleep_timer_micros += timestep_micros;
            if self.sleep_timer_micros > 1_000_000 {
                self.is_sleeping = true;
                self.velocity = FixedVec3::ZERO;
                self.acceleration = FixedVec3::ZERO;
            }
        } else {
            self.sleep_timer_micros = 0;
            self.is_sleeping = false;
        }
    }

    pub fn wake(&mut self) {
        self.is_sleeping = false;
        self.sleep_timer_micros = 0;
    }
}

/// Global physics configuration. Timing is integer microseconds so the step
/// size never passes through float.
#[derive(Debug, Clone, Copy)]
pub struct PhysicsConfig {
    pub gravity: FixedVec3,
    /// Fixed timestep in microseconds (16666 = 1/60 s).
    pub timestep_micros: i32,
    pub max_bodies: usize,
    /// Sub-step budget per `update` call.
    pub max_iterations: u32,
    pub max_velocity: Fixed,
    pub world_min_x: Fixed,
    pub world_max_x: Fixed,
    pub world_min_y: Fixed,
    pub world_max_y: Fixed,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: FixedVec3::from_floats(0.0, -9.81, 0.0),
            timestep_micros: 16_666,
            max_bodies: 50,
            max_iterations: 4,
            max_velocity: Fixed::from_float(50.0),
            world_min_x: Fixed::from_int(-10),
            world_max_x: Fixed::from_int(10),
            world_min_y: Fixed::from_int(-10),
            world_max_y: Fixed::from_int(10),
        }
    }
}

impl PhysicsConfig {
    /// Timestep as fixed-point seconds, derived on demand.
    pub fn timestep_fixed(&self) -> Fixed {
        Fixed::from_float(self.timestep_micros as f32 / 1_000_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_simulate_by_kind() {
        let mut body = RigidBody::default();
        assert!(body.should_simulate());

        body.kind = BodyKind::Static;
        assert!(!body.should_simulate());

        body.kind = BodyKind::Kinematic;
        body.velocity = FixedVec3::ZERO;
        assert!(!body.should_simulate());
        body.velocity = FixedVec3::from_floats(0.1, 0.0, 0.0);
        assert!(body.should_simulate());
    }

    #[test]
    fn test_sleep_after_one_second_of_stillness() {
        let mut body = RigidBody::default();
        body.velocity = FixedVec3::from_floats(0.001, 0.0, 0.0);

        // 61 steps of 1/60 s > 1,000,000 us
        for _ in 0..61 {
            body.update_sleep_state(16_666);
        }
        assert!(body.is_sleeping);
        assert!(body.velocity.is_zero());
        assert!(body.acceleration.is_zero());
    }

    #[test]
    fn test_movement_resets_sleep_timer() {
        let mut body = RigidBody::default();
        body.velocity = FixedVec3::from_floats(0.001, 0.0, 0.0);
        for _ in 0..30 {
            body.update_sleep_state(16_666);
        }
        assert!(body.sleep_timer_micros > 0);

        body.velocity = FixedVec3::from_floats(1.0, 0.0, 0.0);
        body.update_sleep_state(16_666);
        assert_eq!(body.sleep_timer_micros, 0);
        assert!(!body.is_sleeping);
    }

    #[test]
    fn test_wake_clears_sleep() {
        let mut body = RigidBody::default();
        body.is_sleeping = true;
        body.sleep_timer_micros = 2_000_000;
        body.wake();
        assert!(!body.is_sleeping);
        assert_eq!(body.sleep_timer_micros, 0);
    }

    #[test]
    fn test_layer_mask_filter() {
        use super::layers::*;
        // Player collides with enemies
        assert!(should_collide(PLAYER, ENEMY | ENVIRONMENT, ENEMY, PLAYER | ENEMY));
        // Arm anchors carry an empty mask and collide with nothing
        assert!(!should_collide(PLAYER, NONE, ENEMY, ALL));
    }

    #[test]
    fn test_timestep_fixed_matches_micros() {
        let config = PhysicsConfig::default();
        let dt = config.timestep_fixed().to_float();
        assert!((dt - 1.0 / 60.0).abs() < 0.001);
    }
}
