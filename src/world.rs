//! Serializable snapshot of the simulation state for the host.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::components::{
    Emotion, GamePhase, PackMember, PackPlan, PackRegistry, PackRole, PlayerState, WolfBrain,
    WolfId, WolfKind, WolfMotion, WolfVitals,
};
use crate::physics::PhysicsWorld;

/// Player view: position, motion, vitals and ability flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub facing_x: f32,
    pub facing_y: f32,
    pub hp: f32,
    pub health: i32,
    pub stamina: f32,
    pub is_grounded: bool,
    pub balance_quality: f32,
    pub bash_active: bool,
    pub charge_active: bool,
    pub dash_active: bool,
    pub dash_combo: u32,
}

/// One wolf's externally visible state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WolfSnapshot {
    pub id: u32,
    pub kind: WolfKind,
    pub x: f32,
    pub y: f32,
    pub state: String,
    pub role: PackRole,
    pub emotion: Emotion,
    pub health: f32,
    pub max_health: f32,
    pub morale: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackSnapshot {
    pub pack_id: u32,
    pub plan: PackPlan,
    pub morale: f32,
    pub member_count: usize,
}

/// Complete simulation state snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Current simulation tick.
    pub tick: u64,
    /// Elapsed simulation time in seconds.
    pub time: f32,
    pub phase: GamePhase,
    pub player: PlayerSnapshot,
    pub wolves: Vec<WolfSnapshot>,
    pub packs: Vec<PackSnapshot>,
    pub body_count: usize,
    /// Non-deterministic performance counters for monitoring.
    pub pairs_checked: u32,
    pub collisions_resolved: u32,
}

impl Snapshot {
    /// Capture the current state from the ECS world.
    pub fn from_world(world: &mut World, tick: u64, time: f32, phase: GamePhase) -> Self {
        let player = {
            let p = world.resource::<PlayerState>();
            PlayerSnapshot {
                x: p.pos_x,
                y: p.pos_y,
                vx: p.vel_x,
                vy: p.vel_y,
                facing_x: p.facing_x,
                facing_y: p.facing_y,
                hp: p.hp,
                health: p.health,
                stamina: p.stamina,
                is_grounded: p.is_grounded,
                balance_quality: p.balance_quality,
                bash_active: p.bash.is_active,
                charge_active: p.charge.is_active,
                dash_active: p.dash.is_active,
                dash_combo: p.dash.combo_level,
            }
        };

        let mut wolves = Vec::new();
        let mut query = world
            .query::<(&WolfId, &WolfKind, &WolfMotion, &WolfVitals, &WolfBrain, &PackMember)>();
        for (id, kind, motion, vitals, brain, member) in query.iter(world) {
            wolves.push(WolfSnapshot {
                id: id.0,
                kind: *kind,
                x: motion.x.to_float(),
                y: motion.y.to_float(),
                state: format!("{:?}", brain.state),
                role: member.role,
                emotion: brain.emotion,
                health: vitals.health,
                max_health: vitals.max_health,
                morale: vitals.morale,
            });
        }

        let packs = world
            .resource::<PackRegistry>()
            .packs
            .iter()
            .map(|p| PackSnapshot {
                pack_id: p.pack_id,
                plan: p.current_plan,
                morale: p.pack_morale,
                member_count: p.wolf_ids.len(),
            })
            .collect();

        let physics = world.resource::<PhysicsWorld>();

        Self {
            tick,
            time,
            phase,
            player,
            wolves,
            packs,
            body_count: physics.body_count(),
            pairs_checked: physics.pairs_checked(),
            collisions_resolved: physics.collisions_resolved(),
        }
    }

    /// Serialize snapshot to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
