//! Pack-level planning: roles from member stats, coarse plans, and the
//! concurrent-attacker budget applied across the pack.
//!
//! Runs after the per-wolf AI so plans are built from post-decision state;
//! its outputs (targets and command latches) take effect on the members'
//! next evaluation.

use std::collections::BTreeMap;

use bevy_ecs::prelude::*;

use crate::components::{
    DeltaTime, Pack, PackMember, PackPlan, PackRegistry, PackRole, PlayerState, WolfBrain, WolfId,
    WolfMotion, WolfState, WolfStats, WolfVitals, WolfDirectory,
};

const PLAN_DURATION: f32 = 4.0;
const RETREAT_MORALE: f32 = 0.35;
const FLANK_RADIUS: f32 = 0.15;
const REGROUP_SPREAD: f32 = 0.4;
const AMBUSH_RANGE: f32 = 0.35;

/// Per-member scratch data collected before planning.
#[derive(Debug, Clone, Copy)]
struct MemberInfo {
    wolf_id: u32,
    aggression: f32,
    coordination: f32,
    speed: f32,
    awareness: f32,
    morale: f32,
    health_fraction: f32,
    x: f32,
    y: f32,
}

/// Directive for one member, applied in the second pass.
#[derive(Debug, Clone, Copy, Default)]
struct MemberOrder {
    role: Option<PackRole>,
    command: Option<WolfState>,
    target: Option<(f32, f32)>,
    clear_target: bool,
}

/// Register a new pack over the given wolves. Roles are assigned on the next
/// planner tick.
pub fn create_pack(world: &mut World, wolf_ids: Vec<u32>) -> u32 {
    let pack_id = {
        let mut registry = world.resource_mut::<PackRegistry>();
        registry.next_pack_id += 1;
        let pack_id = registry.next_pack_id;
        registry.packs.push(Pack::new(pack_id, wolf_ids.clone()));
        pack_id
    };

    let mut query = world.query::<(&WolfId, &mut PackMember)>();
    for (id, mut member) in query.iter_mut(world) {
        if let Some(index) = wolf_ids.iter().position(|w| *w == id.0) {
            member.pack_id = pack_id;
            member.index = index as i32;
        }
    }

    pack_id
}

/// Tick every pack: refresh morale and roles, re-plan when the timer lapses,
/// and push targets or suggested states onto the members.
///
/// ## Data Access
/// - Reads: DeltaTime, PlayerState, WolfDirectory (budget)
/// - Writes: PackRegistry, PackMember, WolfBrain (command latch, targets)
pub fn pack_ai_system(
    dt: Res<DeltaTime>,
    player: Res<PlayerState>,
    dir: Res<WolfDirectory>,
    mut registry: ResMut<PackRegistry>,
    mut wolves: Query<(
        &WolfId,
        &mut PackMember,
        &WolfStats,
        &WolfVitals,
        &WolfMotion,
        &mut WolfBrain,
    )>,
) {
    let delta = dt.0;
    if delta <= 0.0 || registry.packs.is_empty() {
        return;
    }

    // Pass 1: member info grouped per pack (ordered map: deterministic)
    let mut members: BTreeMap<u32, Vec<MemberInfo>> = BTreeMap::new();
    for (id, member, stats, vitals, motion, _) in wolves.iter() {
        if member.pack_id == 0 || !vitals.is_alive() {
            continue;
        }
        members.entry(member.pack_id).or_default().push(MemberInfo {
            wolf_id: id.0,
            aggression: stats.aggression,
            coordination: stats.coordination,
            speed: stats.speed,
            awareness: stats.awareness,
            morale: vitals.morale,
            health_fraction: vitals.health_fraction(),
            x: motion.x.to_float(),
            y: motion.y.to_float(),
        });
    }

    let mut orders: BTreeMap<u32, MemberOrder> = BTreeMap::new();

    for pack in &mut registry.packs {
        let Some(infos) = members.get(&pack.pack_id) else {
            continue;
        };
        // Keep the pack's declared ordering, dropping dead members
        let infos: Vec<MemberInfo> = pack
            .wolf_ids
            .iter()
            .filter_map(|id| infos.iter().find(|m| m.wolf_id == *id).copied())
            .collect();
        if infos.is_empty() {
            pack.current_plan = PackPlan::None;
            continue;
        }

        let n = infos.len() as f32;
        pack.pack_morale = infos.iter().map(|m| m.morale).sum::<f32>() / n;
        let avg_coordination = infos.iter().map(|m| m.coordination).sum::<f32>() / n;
        let avg_aggression = infos.iter().map(|m| m.aggression).sum::<f32>() / n;
        let avg_health = infos.iter().map(|m| m.health_fraction).sum::<f32>() / n;
        pack.coordination_bonus = 1.0 + avg_coordination * 0.5;

        assign_roles(pack, &infos, &mut orders);

        pack.plan_timer -= delta;
        if pack.current_plan == PackPlan::None || pack.plan_timer <= 0.0 {
            pack.current_plan = choose_plan(
                pack,
                &infos,
                &player,
                avg_coordination,
                avg_aggression,
                avg_health,
            );
            pack.plan_timer = PLAN_DURATION;
        }

        execute_plan(pack, &infos, &player, dir.max_concurrent_attackers, &mut orders);
    }

    // Pass 2: apply directives
    for (id, mut member, _, _, _, mut brain) in wolves.iter_mut() {
        let Some(order) = orders.get(&id.0) else {
            continue;
        };
        if let Some(role) = order.role {
            member.role = role;
        }
        if let Some(command) = order.command {
            brain.pack_command = Some(command);
        }
        if order.clear_target {
            brain.pack_target = None;
        } else if order.target.is_some() {
            brain.pack_target = order.target;
        }
    }
}

/// Stat-driven roles: highest coordination leads, highest aggression
/// bruises, fastest skirmishes, highest awareness scouts, the rest support.
fn assign_roles(pack: &mut Pack, infos: &[MemberInfo], orders: &mut BTreeMap<u32, MemberOrder>) {
    let mut assigned: Vec<Option<PackRole>> = vec![None; infos.len()];

    if let Some(i) = pick_unassigned(&assigned, infos, |m| m.coordination) {
        assigned[i] = Some(PackRole::Leader);
        pack.leader_index = i as i32;
    }
    if let Some(i) = pick_unassigned(&assigned, infos, |m| m.aggression) {
        assigned[i] = Some(PackRole::Bruiser);
    }
    if let Some(i) = pick_unassigned(&assigned, infos, |m| m.speed) {
        assigned[i] = Some(PackRole::Skirmisher);
    }
    if let Some(i) = pick_unassigned(&assigned, infos, |m| m.awareness) {
        assigned[i] = Some(PackRole::Scout);
    }

    for (i, info) in infos.iter().enumerate() {
        let role = assigned[i].unwrap_or(PackRole::Support);
        orders.entry(info.wolf_id).or_default().role = Some(role);
    }
}

fn pick_unassigned(
    assigned: &[Option<PackRole>],
    infos: &[MemberInfo],
    key: impl Fn(&MemberInfo) -> f32,
) -> Option<usize> {
    infos
        .iter()
        .enumerate()
        .filter(|(i, _)| assigned[*i].is_none())
        .max_by(|a, b| key(a.1).total_cmp(&key(b.1)))
        .map(|(i, _)| i)
}

fn choose_plan(
    pack: &Pack,
    infos: &[MemberInfo],
    player: &PlayerState,
    avg_coordination: f32,
    avg_aggression: f32,
    avg_health: f32,
) -> PackPlan {
    if pack.pack_morale < RETREAT_MORALE {
        return PackPlan::Retreat;
    }

    if avg_health > 0.7 && avg_aggression > 0.6 {
        return PackPlan::Commit;
    }

    if infos.len() >= 3 && avg_coordination > 0.7 {
        return PackPlan::Pincer;
    }
    if infos.len() >= 2 && avg_coordination > 0.55 {
        return PackPlan::Flank;
    }

    // Scattered packs pull back to the leader before anything clever
    let spread = infos
        .iter()
        .flat_map(|a| infos.iter().map(move |b| {
            let dx = a.x - b.x;
            let dy = a.y - b.y;
            (dx * dx + dy * dy).sqrt()
        }))
        .fold(0.0f32, f32::max);
    if spread > REGROUP_SPREAD {
        return PackPlan::Regroup;
    }

    // Player far from the whole pack: lie in wait
    let centroid_x = infos.iter().map(|m| m.x).sum::<f32>() / infos.len() as f32;
    let centroid_y = infos.iter().map(|m| m.y).sum::<f32>() / infos.len() as f32;
    let dx = player.pos_x - centroid_x;
    let dy = player.pos_y - centroid_y;
    if (dx * dx + dy * dy).sqrt() > AMBUSH_RANGE {
        return PackPlan::Ambush;
    }

    PackPlan::Distract
}

fn execute_plan(
    pack: &Pack,
    infos: &[MemberInfo],
    player: &PlayerState,
    attacker_budget: u32,
    orders: &mut BTreeMap<u32, MemberOrder>,
) {
    match pack.current_plan {
        PackPlan::None => {
            for info in infos {
                orders.entry(info.wolf_id).or_default().clear_target = true;
            }
        }
        PackPlan::Retreat => {
            for info in infos {
                let order = orders.entry(info.wolf_id).or_default();
                order.command = Some(WolfState::Retreat);
                order.clear_target = true;
            }
        }
        PackPlan::Commit => {
            // All-in, but never past the concurrent-attacker budget
            for (i, info) in infos.iter().enumerate() {
                let order = orders.entry(info.wolf_id).or_default();
                order.clear_target = true;
                order.command = if (i as u32) < attacker_budget {
                    Some(WolfState::Attack)
                } else {
                    Some(WolfState::Strafe)
                };
            }
        }
        PackPlan::Pincer => {
            // Opposing approach vectors through the player
            for (i, info) in infos.iter().enumerate() {
                let side = if i % 2 == 0 { 1.0 } else { -1.0 };
                let order = orders.entry(info.wolf_id).or_default();
                order.target = Some((
                    (player.pos_x).clamp(0.0, 1.0),
                    (player.pos_y + side * FLANK_RADIUS).clamp(0.0, 1.0),
                ));
            }
        }
        PackPlan::Flank => {
            // Spread around the player on an even ring
            let n = infos.len().max(1) as f32;
            for (i, info) in infos.iter().enumerate() {
                let angle = i as f32 / n * std::f32::consts::TAU;
                let order = orders.entry(info.wolf_id).or_default();
                order.target = Some((
                    (player.pos_x + angle.cos() * FLANK_RADIUS).clamp(0.0, 1.0),
                    (player.pos_y + angle.sin() * FLANK_RADIUS).clamp(0.0, 1.0),
                ));
            }
        }
        PackPlan::Distract => {
            // One committed attacker, everyone else circles
            for (i, info) in infos.iter().enumerate() {
                let order = orders.entry(info.wolf_id).or_default();
                if i == 0 {
                    order.command = Some(WolfState::Attack);
                    order.clear_target = true;
                } else {
                    order.command = Some(WolfState::Strafe);
                    order.clear_target = true;
                }
            }
        }
        PackPlan::Regroup => {
            let leader = if pack.leader_index >= 0 {
                infos.get(pack.leader_index as usize)
            } else {
                infos.first()
            };
            if let Some(leader) = leader {
                for info in infos {
                    let order = orders.entry(info.wolf_id).or_default();
                    if info.wolf_id == leader.wolf_id {
                        order.clear_target = true;
                    } else {
                        order.target = Some((leader.x, leader.y));
                    }
                }
            }
        }
        PackPlan::Ambush => {
            for info in infos {
                let order = orders.entry(info.wolf_id).or_default();
                order.command = Some(WolfState::Ambush);
                order.clear_target = true;
            }
        }
    }
}
