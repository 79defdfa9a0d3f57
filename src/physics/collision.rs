//! Sphere-sphere and ground-plane narrow phase.
//!
//! Both the broad-phase and the all-pairs paths funnel into
//! [`resolve_sphere_collision`]; the broad phase only narrows the candidate
//! set, it never changes the math.

use crate::fixed::Fixed;
use crate::physics::body::{RigidBody, GROUND_BODY_ID};
use crate::physics::events::{CollisionEvent, CollisionEventQueue};

/// Pairs farther apart than this squared distance are ignored outright.
const MAX_DISTANCE_SQ: i32 = 1_000_000;
/// Bodies below this radius do not participate in narrow phase.
const MIN_RADIUS: f32 = 0.001;

const GROUND_RESTITUTION: f32 = 0.3;
const GROUND_FRICTION: f32 = 0.7;
/// Post-bounce vertical speeds below this are resting contact: gravity would
/// re-inject g*dt every sub-step and the micro-bounce would never decay under
/// the sleep threshold.
const GROUND_REST_SPEED: f32 = 0.05;

/// Resolve one sphere pair in place: positional separation split by inverse
/// mass, an elastic impulse when the bodies approach, and a collision event.
///
/// The separation buffer widens for near-equal masses (within +/-25%), which
/// biases equal-mass clusters toward clean separation instead of sticking.
/// Restitution drops for the same pairs to keep stacks stable.
pub fn resolve_sphere_collision(
    a: &mut RigidBody,
    b: &mut RigidBody,
    events: &mut CollisionEventQueue,
) -> bool {
    let delta = b.position - a.position;
    let dist_sq = delta.length_squared();
    let combined_radius = a.radius + b.radius;
    let combined_radius_sq = combined_radius * combined_radius;

    let min_radius = Fixed::from_float(MIN_RADIUS);
    if dist_sq > Fixed::from_int(MAX_DISTANCE_SQ)
        || a.radius < min_radius
        || b.radius < min_radius
    {
        return false;
    }

    if dist_sq >= combined_radius_sq || dist_sq.raw <= 0 {
        return false;
    }

    a.wake();
    b.wake();

    let dist = dist_sq.sqrt();
    let normal = delta.normalized();
    let overlap = combined_radius - dist;

    let mass_ratio = a.mass / b.mass;
    let near_equal_mass =
        mass_ratio > Fixed::from_float(0.8) && mass_ratio < Fixed::from_float(1.25);
    let separation_buffer = if near_equal_mass {
        Fixed::from_float(0.008)
    } else {
        Fixed::from_float(0.004)
    };
    let total_separation = overlap + separation_buffer;

    let total_inv_mass = a.inverse_mass + b.inverse_mass;
    if total_inv_mass.raw <= 0 {
        return false;
    }
    let ratio_a = a.inverse_mass / total_inv_mass;
    let ratio_b = b.inverse_mass / total_inv_mass;

    a.position -= normal * total_separation * ratio_a;
    b.position += normal * total_separation * ratio_b;

    let relative_velocity = b.velocity - a.velocity;
    let velocity_along_normal = relative_velocity.dot(normal);

    // Impulse only when the bodies are moving toward each other
    if velocity_along_normal.raw >= 0 {
        return true;
    }

    let restitution = if near_equal_mass {
        Fixed::from_float(0.05)
    } else {
        Fixed::from_float(0.15)
    };
    let impulse_magnitude =
        -(Fixed::from_int(1) + restitution) * velocity_along_normal / total_inv_mass;
    let impulse = normal * impulse_magnitude;

    a.velocity -= impulse * a.inverse_mass;
    b.velocity += impulse * b.inverse_mass;

    let contact = a.position + normal * a.radius;
    events.push(CollisionEvent {
        body_a: a.id,
        body_b: b.id,
        nx: normal.x.to_float(),
        ny: normal.y.to_float(),
        nz: normal.z.to_float(),
        px: contact.x.to_float(),
        py: contact.y.to_float(),
        pz: contact.z.to_float(),
        impulse: impulse_magnitude.to_float(),
    });

    true
}

/// Lift a body out of the y=0 ground plane, bounce and apply surface
/// friction, and emit an event with the ground sentinel as the second id.
pub fn resolve_ground_collision(body: &mut RigidBody, events: &mut CollisionEventQueue) -> bool {
    if !body.should_collide() {
        return false;
    }

    let ground_y = Fixed::ZERO;
    let body_bottom = body.position.y - body.radius;
    if body_bottom >= ground_y {
        return false;
    }

    body.wake();
    body.position.y = ground_y + body.radius;

    if body.velocity.y.raw < 0 {
        events.push(CollisionEvent {
            body_a: body.id,
            body_b: GROUND_BODY_ID,
            nx: 0.0,
            ny: 1.0,
            nz: 0.0,
            px: body.position.x.to_float(),
            py: (ground_y + body.radius).to_float(),
            pz: body.position.z.to_float(),
            impulse: (-body.velocity.y * body.mass).to_float(),
        });

        body.velocity.y *= -Fixed::from_float(GROUND_RESTITUTION);
        if body.velocity.y < Fixed::from_float(GROUND_REST_SPEED) {
            body.velocity.y = Fixed::ZERO;
        }
        body.velocity.x *= Fixed::from_float(GROUND_FRICTION);
        body.velocity.z *= Fixed::from_float(GROUND_FRICTION);
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::FixedVec3;
    use crate::physics::body::BodyKind;

    fn unit_body(id: u32, x: f32, vx: f32) -> RigidBody {
        RigidBody {
            id,
            position: FixedVec3::from_floats(x, 0.5, 0.0),
            velocity: FixedVec3::from_floats(vx, 0.0, 0.0),
            mass: Fixed::from_int(1),
            inverse_mass: Fixed::from_int(1),
            radius: Fixed::from_float(0.05),
            ..Default::default()
        }
    }

    #[test]
    fn test_overlapping_bodies_separate() {
        let mut a = unit_body(1, 0.50, 0.0);
        let mut b = unit_body(2, 0.56, 0.0);
        let mut events = CollisionEventQueue::new();

        assert!(resolve_sphere_collision(&mut a, &mut b, &mut events));

        let gap = (b.position.x - a.position.x).to_float();
        // Separation includes the equal-mass buffer
        assert!(gap >= 0.1 + 0.004, "gap = {}", gap);
    }

    #[test]
    fn test_approaching_bodies_bounce() {
        let mut a = unit_body(1, 0.50, 1.0);
        let mut b = unit_body(2, 0.58, -1.0);
        let mut events = CollisionEventQueue::new();

        assert!(resolve_sphere_collision(&mut a, &mut b, &mut events));

        // Equal masses rebound at the damped coefficient: 0.05 x closing speed
        assert!((a.velocity.x.to_float() + 0.05).abs() < 0.01, "vx = {}", a.velocity.x.to_float());
        assert!((b.velocity.x.to_float() - 0.05).abs() < 0.01);

        assert_eq!(events.len(), 1);
        let ev = events.events()[0];
        assert!(ev.impulse > 0.0);
        // Contact normal is unit length along +x
        assert!((ev.nx - 1.0).abs() < 0.01, "nx = {}", ev.nx);
        assert!(ev.ny.abs() < 0.01);
    }

    #[test]
    fn test_separating_bodies_get_no_impulse() {
        let mut a = unit_body(1, 0.50, -1.0);
        let mut b = unit_body(2, 0.58, 1.0);
        let mut events = CollisionEventQueue::new();

        assert!(resolve_sphere_collision(&mut a, &mut b, &mut events));
        assert!(events.is_empty());
        // Still separated positionally
        assert!((b.position.x - a.position.x).to_float() >= 0.1);
    }

    #[test]
    fn test_non_overlapping_bodies_ignored() {
        let mut a = unit_body(1, 0.0, 0.0);
        let mut b = unit_body(2, 1.0, 0.0);
        let mut events = CollisionEventQueue::new();
        assert!(!resolve_sphere_collision(&mut a, &mut b, &mut events));
    }

    #[test]
    fn test_tiny_radius_rejected() {
        let mut a = unit_body(1, 0.50, 0.0);
        a.radius = Fixed::from_float(0.0001);
        let mut b = unit_body(2, 0.52, 0.0);
        let mut events = CollisionEventQueue::new();
        assert!(!resolve_sphere_collision(&mut a, &mut b, &mut events));
    }

    #[test]
    fn test_ground_lifts_and_bounces() {
        let mut body = unit_body(1, 0.5, 0.0);
        body.position.y = Fixed::from_float(0.01);
        body.velocity = FixedVec3::from_floats(0.4, -1.0, 0.0);
        let mut events = CollisionEventQueue::new();

        assert!(resolve_ground_collision(&mut body, &mut events));

        assert_eq!(body.position.y.raw, Fixed::from_float(0.05).raw);
        // Bounce up at 0.3 restitution, friction on x
        assert!(body.velocity.y.raw > 0);
        assert!((body.velocity.y.to_float() - 0.3).abs() < 0.01);
        assert!((body.velocity.x.to_float() - 0.28).abs() < 0.01);

        let ev = events.events()[0];
        assert_eq!(ev.body_b, GROUND_BODY_ID);
        assert!((ev.ny - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_ground_skips_static_and_sleeping() {
        let mut wall = unit_body(1, 0.5, 0.0);
        wall.kind = BodyKind::Static;
        wall.position.y = Fixed::from_float(-1.0);
        let mut events = CollisionEventQueue::new();
        assert!(!resolve_ground_collision(&mut wall, &mut events));

        let mut sleeper = unit_body(2, 0.5, 0.0);
        sleeper.is_sleeping = true;
        sleeper.position.y = Fixed::from_float(-1.0);
        assert!(!resolve_ground_collision(&mut sleeper, &mut events));
    }
}
