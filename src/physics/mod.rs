//! Deterministic fixed-point rigid-body simulation.
//!
//! The driver accumulates frame time as integer microseconds and runs fixed
//! sub-steps, so identical input sequences produce byte-identical body state
//! on any host. Per sub-step: force fields, integration, narrow phase
//! (optionally fed by the broad phase), constraint solves, ground plane,
//! sleep accounting.

pub mod body;
pub mod collision;
pub mod constraint;
pub mod events;
pub mod forces;
pub mod spatial;

use std::collections::HashMap;

use bevy_ecs::prelude::Resource;

use crate::fixed::{Fixed, FixedVec3};
use body::{layers, should_collide, BodyKind, PhysicsConfig, RigidBody, PLAYER_BODY_ID};
use collision::{resolve_ground_collision, resolve_sphere_collision};
use constraint::{
    solve_distance_constraints, solve_range_constraints, DistanceConstraint,
    DistanceRangeConstraint,
};
use events::CollisionEventQueue;
use forces::{apply_force_fields, ForceField};
use spatial::SpatialHashGrid;

/// Constraint solve passes per sub-step for gameplay articulation (arms).
/// A design constant, not a tunable.
const CONSTRAINT_ITERATIONS: u32 = 3;

/// Borrow two distinct slice elements mutably.
pub(crate) fn pair_mut(bodies: &mut [RigidBody], i: usize, j: usize) -> (&mut RigidBody, &mut RigidBody) {
    debug_assert_ne!(i, j);
    if i < j {
        let (head, tail) = bodies.split_at_mut(j);
        (&mut head[i], &mut tail[0])
    } else {
        let (head, tail) = bodies.split_at_mut(i);
        let a = &mut tail[0];
        (a, &mut head[j])
    }
}

/// The physics body store plus everything that mutates it during a step.
///
/// The collision-event queue lives here rather than in process-wide state so
/// parallel test worlds cannot interleave events.
#[derive(Resource)]
pub struct PhysicsWorld {
    config: PhysicsConfig,
    bodies: Vec<RigidBody>,
    next_body_id: u32,

    /// Accumulated frame time in integer microseconds.
    accumulator_micros: i32,

    distance_constraints: Vec<DistanceConstraint>,
    range_constraints: Vec<DistanceRangeConstraint>,
    force_fields: Vec<ForceField>,

    spatial: SpatialHashGrid,
    use_broadphase: bool,
    pair_scratch: Vec<(u32, u32)>,

    events: CollisionEventQueue,

    // Per-frame performance counters (non-deterministic monitoring only)
    pairs_checked: u32,
    collisions_resolved: u32,
    last_step_time_ms: f32,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

impl PhysicsWorld {
    pub fn new(config: PhysicsConfig) -> Self {
        let mut world = Self {
            config,
            bodies: Vec::with_capacity(config.max_bodies),
            next_body_id: 1,
            accumulator_micros: 0,
            distance_constraints: Vec::new(),
            range_constraints: Vec::new(),
            force_fields: Vec::new(),
            spatial: SpatialHashGrid::new(),
            use_broadphase: false,
            pair_scratch: Vec::new(),
            events: CollisionEventQueue::new(),
            pairs_checked: 0,
            collisions_resolved: 0,
            last_step_time_ms: 0.0,
        };
        world.spawn_player_body();
        world
    }

    /// Back to the initial state: only the player body, empty queues,
    /// zeroed accumulator. Constraints are cleared; callers reinstall rigs.
    pub fn reset(&mut self) {
        self.bodies.clear();
        self.next_body_id = 1;
        self.accumulator_micros = 0;
        self.distance_constraints.clear();
        self.range_constraints.clear();
        self.force_fields.clear();
        self.events.clear();
        self.spawn_player_body();
    }

    /// Body 0: the player. Kinematic so gravity never moves it, but a
    /// non-zero inverse mass lets knockback impulses land and decay.
    fn spawn_player_body(&mut self) {
        self.bodies.push(RigidBody {
            id: PLAYER_BODY_ID,
            kind: BodyKind::Kinematic,
            position: FixedVec3::from_floats(0.5, 0.5, 0.0),
            mass: Fixed::from_int(70),
            inverse_mass: Fixed::from_float(1.0 / 70.0),
            drag: Fixed::from_float(0.88),
            radius: Fixed::from_float(0.05),
            collision_layer: layers::PLAYER,
            collision_mask: layers::ENEMY | layers::ENVIRONMENT,
            ..Default::default()
        });
    }

    // ------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------

    /// Advance the simulation. Time is converted to integer microseconds and
    /// consumed in fixed sub-steps; at most `max_iterations` run per call and
    /// any remainder past the budget is dropped on the floor so a frame
    /// hitch can never stall the simulation.
    pub fn update(&mut self, delta_seconds: f32) {
        if delta_seconds <= 0.0 {
            return;
        }

        let dt_micros = (delta_seconds * 1_000_000.0) as i32;
        self.accumulator_micros += dt_micros;

        let step_micros = self.config.timestep_micros;
        let mut steps_taken = 0u32;
        while self.accumulator_micros >= step_micros && steps_taken < self.config.max_iterations {
            let dt = self.config.timestep_fixed();
            self.step(dt);
            self.accumulator_micros -= step_micros;
            steps_taken += 1;
        }

        if steps_taken == self.config.max_iterations && self.accumulator_micros >= step_micros {
            self.accumulator_micros = 0;
        }

        self.last_step_time_ms = steps_taken as f32 * (step_micros as f32 / 1000.0);
    }

    fn step(&mut self, dt: Fixed) {
        apply_force_fields(&self.force_fields, &mut self.bodies);
        self.integrate_forces(dt);
        self.detect_and_resolve_collisions();
        solve_distance_constraints(
            &mut self.bodies,
            &self.distance_constraints,
            CONSTRAINT_ITERATIONS,
        );
        solve_range_constraints(&mut self.bodies, &self.range_constraints, CONSTRAINT_ITERATIONS);
        self.ground_pass();
        self.update_sleeping_bodies();
    }

    fn integrate_forces(&mut self, dt: Fixed) {
        let gravity = self.config.gravity;
        let max_velocity = self.config.max_velocity;

        for i in 0..self.bodies.len() {
            if !self.bodies[i].should_simulate() {
                continue;
            }
            let body = &mut self.bodies[i];

            // Gravity is a force; Kinematic bodies are manually moved and
            // only ever integrate impulse decay
            let total_accel = if body.kind == BodyKind::Dynamic {
                body.acceleration + gravity
            } else {
                body.acceleration
            };
            body.velocity += total_accel * dt;

            // Forces apply for one sub-step only
            body.acceleration = FixedVec3::ZERO;

            body.velocity *= body.drag;

            // Compare magnitudes, not squares: squaring an extreme velocity
            // would wrap in Q16.16 and skip the clamp that prevents it
            let speed = body.velocity.length();
            if speed > max_velocity {
                body.velocity = body.velocity.normalized() * max_velocity;
            }

            body.position += body.velocity * dt;

            Self::apply_world_bounds(&self.config, body);
        }
    }

    /// Clamp to the world box; the velocity on a clamped axis is zeroed and
    /// the body woken so it reacts to whatever pushed it out.
    fn apply_world_bounds(config: &PhysicsConfig, body: &mut RigidBody) {
        let mut hit_bound = false;

        if body.position.x < config.world_min_x {
            body.position.x = config.world_min_x;
            body.velocity.x = Fixed::ZERO;
            hit_bound = true;
        } else if body.position.x > config.world_max_x {
            body.position.x = config.world_max_x;
            body.velocity.x = Fixed::ZERO;
            hit_bound = true;
        }

        if body.position.y < config.world_min_y {
            body.position.y = config.world_min_y;
            body.velocity.y = Fixed::ZERO;
            hit_bound = true;
        } else if body.position.y > config.world_max_y {
            body.position.y = config.world_max_y;
            body.velocity.y = Fixed::ZERO;
            hit_bound = true;
        }

        if hit_bound {
            body.wake();
        }
    }

    fn detect_and_resolve_collisions(&mut self) {
        self.pairs_checked = 0;
        self.collisions_resolved = 0;

        if self.use_broadphase {
            self.spatial.rebuild(&self.bodies);
            let mut pairs = std::mem::take(&mut self.pair_scratch);
            self.spatial.potential_pairs(&mut pairs);

            let id_to_index: HashMap<u32, usize> =
                self.bodies.iter().enumerate().map(|(i, b)| (b.id, i)).collect();

            for &(id_a, id_b) in &pairs {
                let (Some(&i), Some(&j)) = (id_to_index.get(&id_a), id_to_index.get(&id_b))
                else {
                    continue;
                };
                self.resolve_pair(i, j);
            }
            self.pair_scratch = pairs;
        } else {
            // Canonical all-pairs path
            for i in 0..self.bodies.len() {
                for j in (i + 1)..self.bodies.len() {
                    self.resolve_pair(i, j);
                }
            }
        }
    }

    fn resolve_pair(&mut self, i: usize, j: usize) {
        if !self.bodies[i].should_collide() || !self.bodies[j].should_collide() {
            return;
        }
        self.pairs_checked += 1;

        // Layer/mask test before any math
        if !should_collide(
            self.bodies[i].collision_layer,
            self.bodies[i].collision_mask,
            self.bodies[j].collision_layer,
            self.bodies[j].collision_mask,
        ) {
            return;
        }

        let events = &mut self.events;
        let (a, b) = pair_mut(&mut self.bodies, i, j);
        let before = events.len();
        if resolve_sphere_collision(a, b, events) && events.len() > before {
            self.collisions_resolved += 1;
        }
    }

    fn ground_pass(&mut self) {
        for body in &mut self.bodies {
            resolve_ground_collision(body, &mut self.events);
        }
    }

    fn update_sleeping_bodies(&mut self) {
        let timestep = self.config.timestep_micros;
        for body in &mut self.bodies {
            body.update_sleep_state(timestep);
        }
    }

    // ------------------------------------------------------------------
    // Body management
    // ------------------------------------------------------------------

    /// Insert a body, assigning the next monotonic id. Returns the id.
    pub fn create_body(&mut self, template: RigidBody) -> u32 {
        let mut body = template;
        body.id = self.next_body_id;
        self.next_body_id += 1;
        self.bodies.push(body);
        body.id
    }

    /// Convenience constructor for wolf bodies: lighter than the player,
    /// higher surface friction, enemy layer. Kinematic like the player body:
    /// the wolf layer moves it, impulses land and decay here.
    pub fn create_wolf_body(&mut self, x: f32, y: f32, radius: f32) -> u32 {
        self.create_body(RigidBody {
            kind: BodyKind::Kinematic,
            position: FixedVec3::from_floats(x, y, 0.0),
            mass: Fixed::from_int(50),
            inverse_mass: Fixed::from_float(1.0 / 50.0),
            drag: Fixed::from_float(0.85),
            radius: Fixed::from_float(radius),
            collision_layer: layers::ENEMY,
            collision_mask: layers::PLAYER | layers::ENEMY | layers::ENVIRONMENT,
            ..Default::default()
        })
    }

    pub fn destroy_body(&mut self, id: u32) {
        self.bodies.retain(|b| b.id != id);
    }

    pub fn get_body(&self, id: u32) -> Option<&RigidBody> {
        self.bodies.iter().find(|b| b.id == id)
    }

    pub fn get_body_mut(&mut self, id: u32) -> Option<&mut RigidBody> {
        self.bodies.iter_mut().find(|b| b.id == id)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn bodies(&self) -> &[RigidBody] {
        &self.bodies
    }

    // ------------------------------------------------------------------
    // External commands (missing ids are no-ops)
    // ------------------------------------------------------------------

    pub fn apply_impulse(&mut self, body_id: u32, impulse: FixedVec3) {
        if let Some(body) = self.get_body_mut(body_id) {
            body.wake();
            let delta_v = impulse * body.inverse_mass;
            body.velocity += delta_v;
        }
    }

    pub fn apply_force(&mut self, body_id: u32, force: FixedVec3) {
        if let Some(body) = self.get_body_mut(body_id) {
            body.wake();
            let delta_a = force * body.inverse_mass;
            body.acceleration += delta_a;
        }
    }

    pub fn set_velocity(&mut self, body_id: u32, velocity: FixedVec3) {
        if let Some(body) = self.get_body_mut(body_id) {
            if !velocity.is_zero() {
                body.wake();
            }
            body.velocity = velocity;
        }
    }

    pub fn set_position(&mut self, body_id: u32, position: FixedVec3) {
        if let Some(body) = self.get_body_mut(body_id) {
            body.position = position;
        }
    }

    // ------------------------------------------------------------------
    // Constraints, force fields, broad phase
    // ------------------------------------------------------------------

    pub fn add_distance_constraint(&mut self, c: DistanceConstraint) {
        self.distance_constraints.push(c);
    }

    pub fn add_range_constraint(&mut self, c: DistanceRangeConstraint) {
        self.range_constraints.push(c);
    }

    pub fn clear_constraints(&mut self) {
        self.distance_constraints.clear();
        self.range_constraints.clear();
    }

    pub fn add_force_field(&mut self, field: ForceField) {
        self.force_fields.push(field);
    }

    pub fn clear_force_fields(&mut self) {
        self.force_fields.clear();
    }

    pub fn enable_broadphase(&mut self, on: bool) {
        self.use_broadphase = on;
    }

    // ------------------------------------------------------------------
    // Events & counters
    // ------------------------------------------------------------------

    pub fn events(&self) -> &CollisionEventQueue {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut CollisionEventQueue {
        &mut self.events
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn pairs_checked(&self) -> u32 {
        self.pairs_checked
    }

    pub fn collisions_resolved(&self) -> u32 {
        self.collisions_resolved
    }

    pub fn last_step_time_ms(&self) -> f32 {
        self.last_step_time_ms
    }

    #[cfg(test)]
    pub(crate) fn accumulator_micros(&self) -> i32 {
        self.accumulator_micros
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_gravity_config() -> PhysicsConfig {
        PhysicsConfig { gravity: FixedVec3::ZERO, ..Default::default() }
    }

    fn drop_body() -> RigidBody {
        RigidBody {
            kind: BodyKind::Dynamic,
            position: FixedVec3::from_floats(0.5, 0.5, 0.0),
            mass: Fixed::from_int(1),
            inverse_mass: Fixed::from_int(1),
            radius: Fixed::from_float(0.05),
            drag: Fixed::from_float(1.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_world_has_player_body() {
        let world = PhysicsWorld::default();
        assert_eq!(world.body_count(), 1);
        let player = world.get_body(PLAYER_BODY_ID).unwrap();
        assert_eq!(player.kind, BodyKind::Kinematic);
    }

    #[test]
    fn test_zero_and_negative_dt_are_noops() {
        let mut world = PhysicsWorld::default();
        let id = world.create_body(drop_body());
        let y_before = world.get_body(id).unwrap().position.y.raw;

        world.update(0.0);
        world.update(-0.5);

        assert_eq!(world.get_body(id).unwrap().position.y.raw, y_before);
        assert_eq!(world.accumulator_micros(), 0);
    }

    #[test]
    fn test_empty_store_update_succeeds() {
        let mut world = PhysicsWorld::default();
        world.destroy_body(PLAYER_BODY_ID);
        world.update(1.0 / 60.0);
        assert_eq!(world.body_count(), 0);
        assert_eq!(world.pairs_checked(), 0);
        assert!(world.events().is_empty());
    }

    #[test]
    fn test_deterministic_drop_lands_and_sleeps() {
        // Gravity drop: body starts at y=0.5, settles on the ground at
        // y=radius and falls asleep within the run.
        let run = || {
            let mut world = PhysicsWorld::default();
            let id = world.create_body(drop_body());
            for _ in 0..120 {
                world.update(1.0 / 60.0);
            }
            let body = *world.get_body(id).unwrap();
            body
        };

        let a = run();
        let b = run();

        // Identical raw fixed-point state across two runs
        assert_eq!(a.position.y.raw, b.position.y.raw);
        assert_eq!(a.velocity.y.raw, b.velocity.y.raw);

        // Resting on the ground plane, asleep with zeroed motion
        assert_eq!(a.position.y.raw, Fixed::from_float(0.05).raw);
        assert!(a.is_sleeping);
        assert!(a.velocity.is_zero());
        assert!(a.acceleration.is_zero());
    }

    #[test]
    fn test_elastic_collision_reverses_velocities() {
        let mut world = PhysicsWorld::new(zero_gravity_config());
        world.destroy_body(PLAYER_BODY_ID);

        let a = world.create_body(RigidBody {
            position: FixedVec3::from_floats(0.4, 0.5, 0.0),
            velocity: FixedVec3::from_floats(1.0, 0.0, 0.0),
            ..drop_body()
        });
        let b = world.create_body(RigidBody {
            position: FixedVec3::from_floats(0.6, 0.5, 0.0),
            velocity: FixedVec3::from_floats(-1.0, 0.0, 0.0),
            ..drop_body()
        });

        // Run until they meet and resolve
        for _ in 0..10 {
            world.update(1.0 / 60.0);
        }

        let body_a = world.get_body(a).unwrap();
        let body_b = world.get_body(b).unwrap();
        // Rebound at the equal-mass restitution: 0.05 of the closing speed
        assert!((body_a.velocity.x.to_float() + 0.05).abs() < 0.01, "a should bounce back");
        assert!((body_b.velocity.x.to_float() - 0.05).abs() < 0.01, "b should bounce back");

        // Separated past the combined radius + buffer
        let gap = (body_b.position.x - body_a.position.x).to_float();
        assert!(gap >= 2.0 * 0.05 + 0.004, "gap = {}", gap);
    }

    #[test]
    fn test_unequal_masses_use_full_restitution() {
        let mut world = PhysicsWorld::new(zero_gravity_config());
        world.destroy_body(PLAYER_BODY_ID);

        let light = world.create_body(RigidBody {
            position: FixedVec3::from_floats(0.45, 0.5, 0.0),
            velocity: FixedVec3::from_floats(1.0, 0.0, 0.0),
            ..drop_body()
        });
        world.create_body(RigidBody {
            position: FixedVec3::from_floats(0.6, 0.5, 0.0),
            velocity: FixedVec3::from_floats(-1.0, 0.0, 0.0),
            mass: Fixed::from_int(10),
            inverse_mass: Fixed::from_float(0.1),
            ..drop_body()
        });

        for _ in 0..10 {
            world.update(1.0 / 60.0);
        }

        // Light body rebounds noticeably against the heavy one
        let v = world.get_body(light).unwrap().velocity.x.to_float();
        assert!(v < -0.15, "v = {}", v);
    }

    #[test]
    fn test_world_bounds_clamp_and_zero_velocity() {
        let mut world = PhysicsWorld::default();
        let id = world.create_body(RigidBody {
            position: FixedVec3::from_floats(9.9, 5.0, 0.0),
            velocity: FixedVec3::from_floats(40.0, 0.0, 0.0),
            ..drop_body()
        });

        for _ in 0..30 {
            world.update(1.0 / 60.0);
        }

        let body = world.get_body(id).unwrap();
        assert!(body.position.x <= world.config().world_max_x);
        assert_eq!(body.velocity.x.raw, 0);
    }

    #[test]
    fn test_velocity_clamped_to_max() {
        let mut world = PhysicsWorld::new(zero_gravity_config());
        let id = world.create_body(RigidBody {
            velocity: FixedVec3::from_floats(500.0, 0.0, 0.0),
            ..drop_body()
        });

        world.update(1.0 / 60.0);

        // Clamped onto the cap, not past it and not squashed below it
        let speed = world.get_body(id).unwrap().velocity.length().to_float();
        let max = world.config().max_velocity.to_float();
        assert!(speed <= max + 0.1, "speed = {}", speed);
        assert!(speed >= max - 0.5, "speed = {}", speed);
    }

    #[test]
    fn test_broadphase_matches_all_pairs() {
        let build = |broadphase: bool| {
            let mut world = PhysicsWorld::new(zero_gravity_config());
            world.destroy_body(PLAYER_BODY_ID);
            world.enable_broadphase(broadphase);
            for i in 0..8 {
                world.create_body(RigidBody {
                    position: FixedVec3::from_floats(0.40 + 0.03 * i as f32, 0.5, 0.0),
                    ..drop_body()
                });
            }
            for _ in 0..30 {
                world.update(1.0 / 60.0);
            }
            world.bodies().iter().map(|b| (b.id, b.position.x.raw, b.position.y.raw)).collect::<Vec<_>>()
        };

        assert_eq!(build(false), build(true));
    }

    #[test]
    fn test_substep_budget_drops_remainder() {
        let mut world = PhysicsWorld::default();
        // One huge frame: only max_iterations sub-steps run, rest is dropped
        world.update(1.0);
        assert!(world.accumulator_micros() < world.config().timestep_micros);
    }

    #[test]
    fn test_apply_impulse_wakes_and_kicks() {
        let mut world = PhysicsWorld::new(zero_gravity_config());
        let id = world.create_body(RigidBody { is_sleeping: true, ..drop_body() });

        world.apply_impulse(id, FixedVec3::from_floats(2.0, 0.0, 0.0));

        let body = world.get_body(id).unwrap();
        assert!(!body.is_sleeping);
        assert!((body.velocity.x.to_float() - 2.0).abs() < 0.01);
    }

    #[test]
    fn test_commands_on_missing_body_are_noops() {
        let mut world = PhysicsWorld::default();
        world.apply_impulse(999, FixedVec3::from_floats(1.0, 0.0, 0.0));
        world.set_velocity(999, FixedVec3::from_floats(1.0, 0.0, 0.0));
        world.set_position(999, FixedVec3::from_floats(1.0, 1.0, 0.0));
        // Player body untouched
        let player = world.get_body(PLAYER_BODY_ID).unwrap();
        assert!(player.velocity.is_zero());
    }
}
