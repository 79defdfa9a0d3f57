//! ECS systems for the Fangwood simulation.
//!
//! Systems contain the game logic that operates on components and
//! resources. Within one tick the order below is the only permissible
//! ordering; the schedule chains them explicitly.
//!
//! | # | System | Reads | Writes |
//! |---|--------|-------|--------|
//! | 1 | `physics_step_system` | DeltaTime | PhysicsWorld (sub-steps, events) |
//! | 2 | `player_system` | DeltaTime, PlayerInput | PlayerState, CombatState, PlayerRig, PhysicsWorld |
//! | 3 | `combat_system` | DeltaTime | CombatState, PlayerState |
//! | 4 | `wolf_ai_system` | GameClock, PlayerState, CombatState | wolf components, WolfDirectory, PhysicsWorld |
//! | 5 | `pack_ai_system` | PlayerState, WolfDirectory | PackRegistry, WolfBrain, PackMember |
//! | 6 | `arm_update_system` | PlayerState, ArmRig | PhysicsWorld (arm bodies) |
//! | 7 | `game_clock_system` | DeltaTime | GameClock |
//! | 8 | `combat_input_system` | PlayerInput, GameClock | CombatState, PlayerState |
//! | 9 | `combat_speed_system` | CombatState | PlayerState (speed multiplier) |
//! | 10 | `collision_routing_system` | GameClock | PhysicsWorld (ring), PlayerState, CombatState, wolves |
//!
//! Ordering guarantees that follow: all physics sub-steps complete before
//! any AI decision; wolves see the player's post-physics position; pack
//! planning sees post-individual-AI state; the event ring is fully drained
//! (and cleared) by the time a snapshot is taken.

pub mod arms;
pub mod combat;
pub mod pack;
pub mod player;
pub mod routing;
pub mod wolf;

pub use arms::{arm_joint_position, arm_update_system, install_arms};
pub use combat::{combat_input_system, combat_speed_system, combat_system};
pub use pack::{create_pack, pack_ai_system};
pub use player::{execute_berserker_charge, execute_flow_dash, player_system};
pub use routing::collision_routing_system;
pub use wolf::{damage_wolf, rebuild_body_index_map, remove_wolf, spawn_wolf, wolf_ai_system};

use bevy_ecs::prelude::*;

use crate::components::{DeltaTime, GameClock};
use crate::physics::PhysicsWorld;

/// Fixed-step physics for the frame. Runs first so every later system sees
/// post-step state.
pub fn physics_step_system(dt: Res<DeltaTime>, mut physics: ResMut<PhysicsWorld>) {
    physics.update(dt.0);
}

/// Advance game time and the per-tick RNG stream.
pub fn game_clock_system(dt: Res<DeltaTime>, mut clock: ResMut<GameClock>) {
    clock.advance(dt.0);
}
