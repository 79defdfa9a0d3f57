//! Articulated arms: constraint chains hung off kinematic shoulder anchors,
//! driven toward gameplay targets by a clamped PD servo at each hand.

use bevy_ecs::prelude::*;

use crate::components::{ArmChain, ArmRig, DeltaTime, PlayerState};
use crate::fixed::{Fixed, FixedVec3};
use crate::physics::body::{layers, BodyKind, RigidBody};
use crate::physics::constraint::{DistanceConstraint, DistanceRangeConstraint};
use crate::physics::PhysicsWorld;

const UPPER_LEN: f32 = 0.12;
const FOREARM_LEN: f32 = 0.11;
const HAND_RADIUS: f32 = 0.02;
/// PD positional gain.
const KP: f32 = 200.0;
/// PD damping gain.
const KD: f32 = 12.0;
/// Servo force clamp; unbounded gains destabilize the chain.
const MAX_SERVO_FORCE: f32 = 500.0;
/// Minimum distance kept between the two hands.
const HAND_SEPARATION_MIN: f32 = 0.05;

const SHOULDER_OFFSET_X: f32 = 0.03;
const SHOULDER_OFFSET_Y: f32 = 0.05;

/// Create both arm chains and install their six constraints each into the
/// physics world. Idempotent: an installed rig is left alone.
pub fn install_arms(physics: &mut PhysicsWorld, rig: &mut ArmRig, player_x: f32, player_y: f32) {
    if rig.is_installed() {
        return;
    }
    rig.left = create_arm(physics, player_x, player_y, -1.0);
    rig.right = create_arm(physics, player_x, player_y, 1.0);
    rig.left_target = (0.5, 0.5, 0.0);
    rig.right_target = (0.5, 0.5, 0.0);
}

fn create_arm(physics: &mut PhysicsWorld, px: f32, py: f32, side_sign: f32) -> ArmChain {
    let sx = px + SHOULDER_OFFSET_X * side_sign;
    let sy = py + SHOULDER_OFFSET_Y;

    // Non-colliding kinematic anchor at the shoulder
    let anchor = physics.create_body(RigidBody {
        kind: BodyKind::Kinematic,
        position: FixedVec3::from_floats(sx, sy, 0.0),
        radius: Fixed::from_float(0.015),
        collision_layer: layers::PLAYER,
        collision_mask: layers::NONE,
        ..Default::default()
    });

    let mut segment = |x: f32, y: f32, radius: f32, mass: f32| {
        physics.create_body(RigidBody {
            kind: BodyKind::Dynamic,
            position: FixedVec3::from_floats(x, y, 0.0),
            mass: Fixed::from_float(mass),
            inverse_mass: Fixed::from_float(1.0 / mass),
            drag: Fixed::from_float(0.96),
            restitution: Fixed::from_float(0.1),
            friction: Fixed::from_float(0.9),
            radius: Fixed::from_float(radius),
            collision_layer: layers::PLAYER_ARM,
            collision_mask: layers::ENEMY | layers::ENVIRONMENT | layers::PROJECTILE,
            ..Default::default()
        })
    };

    // Straight initial pose
    let ex = sx + side_sign * UPPER_LEN;
    let hx = ex + side_sign * FOREARM_LEN;
    let upper = segment(ex, sy, 0.02, 2.0);
    let forearm = segment((ex + hx) * 0.5, sy, 0.018, 1.6);
    let hand = segment(hx, sy, HAND_RADIUS, 0.8);

    // Bone lengths
    for (a, b, rest, stiffness) in [
        (anchor, upper, 0.01, 0.9),
        (upper, forearm, UPPER_LEN * 0.5, 0.9),
        (forearm, hand, FOREARM_LEN * 0.5, 0.9),
        // Soft reach cap from shoulder to hand
        (anchor, hand, UPPER_LEN + FOREARM_LEN, 0.4),
    ] {
        physics.add_distance_constraint(DistanceConstraint {
            body_a: a,
            body_b: b,
            rest_length: Fixed::from_float(rest),
            stiffness: Fixed::from_float(stiffness),
        });
    }

    // Shoulder ring: keeps the elbow from extreme curling or extension
    physics.add_range_constraint(DistanceRangeConstraint {
        body_a: anchor,
        body_b: forearm,
        min_length: Fixed::from_float(UPPER_LEN * 0.55),
        max_length: Fixed::from_float(UPPER_LEN + FOREARM_LEN * 0.9),
        stiffness: Fixed::from_float(0.6),
    });

    // Elbow: no hyperextension of the hand past the full arm
    physics.add_range_constraint(DistanceRangeConstraint {
        body_a: upper,
        body_b: hand,
        min_length: Fixed::from_float(FOREARM_LEN * 0.6),
        max_length: Fixed::from_float(UPPER_LEN + FOREARM_LEN),
        stiffness: Fixed::from_float(0.6),
    });

    ArmChain { anchor, upper, forearm, hand }
}

/// Clamped PD force pulling a hand toward its target.
fn apply_hand_servo(physics: &mut PhysicsWorld, hand_id: u32, target: (f32, f32, f32)) {
    let Some(hand) = physics.get_body(hand_id) else {
        return;
    };

    let target = FixedVec3::from_floats(target.0, target.1, 0.0);
    let error = target - hand.position;
    let velocity = hand.velocity;

    let kp = Fixed::from_float(KP);
    let kd = Fixed::from_float(KD);
    let mut force = error * kp - velocity * kd;

    // Magnitude comparison: squaring a force this size would wrap in Q16.16
    let max_force = Fixed::from_float(MAX_SERVO_FORCE);
    let len = force.length();
    if len > max_force && len.raw > 0 {
        force = force * (max_force / len);
    }

    physics.apply_force(hand_id, force);
}

/// Positional push keeping the two hands from intersecting.
fn separate_hands(physics: &mut PhysicsWorld, left_hand: u32, right_hand: u32) {
    let (Some(lh), Some(rh)) = (physics.get_body(left_hand), physics.get_body(right_hand))
    else {
        return;
    };

    let delta = rh.position - lh.position;
    let dist_sq = delta.length_squared();
    let min_dist = Fixed::from_float(HAND_SEPARATION_MIN);
    if dist_sq >= min_dist * min_dist || dist_sq.raw <= 0 {
        return;
    }

    let dist = dist_sq.sqrt();
    let n = delta / dist;
    let push = (min_dist - dist) * Fixed::from_float(0.5);

    let correction = n * push;
    if let Some(lh) = physics.get_body_mut(left_hand) {
        if lh.kind == BodyKind::Dynamic {
            lh.position -= correction;
        }
        lh.wake();
    }
    if let Some(rh) = physics.get_body_mut(right_hand) {
        if rh.kind == BodyKind::Dynamic {
            rh.position += correction;
        }
        rh.wake();
    }
}

/// Per-tick arm update: anchors track the shoulders, hands servo to their
/// targets, and the hands are kept mutually separated.
///
/// ## Data Access
/// - Reads: DeltaTime, PlayerState, ArmRig
/// - Writes: PhysicsWorld (arm bodies)
pub fn arm_update_system(
    dt: Res<DeltaTime>,
    player: Res<PlayerState>,
    rig: Res<ArmRig>,
    mut physics: ResMut<PhysicsWorld>,
) {
    if dt.0 <= 0.0 || !rig.is_installed() {
        return;
    }

    physics.set_position(
        rig.left.anchor,
        FixedVec3::from_floats(
            player.pos_x - SHOULDER_OFFSET_X,
            player.pos_y + SHOULDER_OFFSET_Y,
            0.0,
        ),
    );
    physics.set_position(
        rig.right.anchor,
        FixedVec3::from_floats(
            player.pos_x + SHOULDER_OFFSET_X,
            player.pos_y + SHOULDER_OFFSET_Y,
            0.0,
        ),
    );

    apply_hand_servo(&mut physics, rig.left.hand, rig.left_target);
    apply_hand_servo(&mut physics, rig.right.hand, rig.right_target);

    separate_hands(&mut physics, rig.left.hand, rig.right.hand);
}

/// Position of one arm joint for host queries.
pub fn arm_joint_position(physics: &PhysicsWorld, body_id: u32) -> (f32, f32, f32) {
    match physics.get_body(body_id) {
        Some(body) => (
            body.position.x.to_float(),
            body.position.y.to_float(),
            body.position.z.to_float(),
        ),
        None => (0.0, 0.0, 0.0),
    }
}
