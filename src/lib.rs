//! Fangwood - Deterministic Combat Simulation Core
//!
//! A fixed-timestep, fixed-point simulation of a real-time action game:
//! rigid-body physics, a Verlet player skeleton with biomechanical balance,
//! PD-servo arm chains, and a multi-agent wolf AI with pack planning. Built
//! on `bevy_ecs`; the host drives everything through [`SimWorld`].

pub mod api;
pub mod components;
pub mod fixed;
pub mod physics;
pub mod progression;
pub mod skeleton;
pub mod systems;
pub mod world;

pub use api::{ArmJoint, SimWorld};
pub use components::*;
pub use fixed::{Fixed, FixedVec3};
pub use physics::body::{BodyKind, PhysicsConfig, RigidBody};
pub use physics::events::CollisionEvent;
pub use physics::PhysicsWorld;
pub use progression::{Progression, ProgressionState};
pub use skeleton::PlayerSkeleton;
pub use world::Snapshot;
