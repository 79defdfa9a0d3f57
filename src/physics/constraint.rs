//! Positional (PBD-style) constraint solvers.
//!
//! Each iteration walks the constraint list once and corrects positions
//! directly along the line between the two bodies. Kinematic bodies
//! contribute zero inverse mass, so they act as pins.

use std::collections::HashMap;

use crate::fixed::Fixed;
use crate::physics::body::{BodyKind, RigidBody};
use crate::physics::pair_mut;

/// Keeps two bodies at a fixed rest length.
#[derive(Debug, Clone, Copy)]
pub struct DistanceConstraint {
    pub body_a: u32,
    pub body_b: u32,
    pub rest_length: Fixed,
    /// Correction fraction per iteration, 0..1.
    pub stiffness: Fixed,
}

impl Default for DistanceConstraint {
    fn default() -> Self {
        Self {
            body_a: 0,
            body_b: 0,
            rest_length: Fixed::ZERO,
            stiffness: Fixed::from_float(0.8),
        }
    }
}

/// Keeps two bodies within [min_length, max_length]. A zero bound disables
/// that side.
#[derive(Debug, Clone, Copy)]
pub struct DistanceRangeConstraint {
    pub body_a: u32,
    pub body_b: u32,
    pub min_length: Fixed,
    pub max_length: Fixed,
    pub stiffness: Fixed,
}

impl Default for DistanceRangeConstraint {
    fn default() -> Self {
        Self {
            body_a: 0,
            body_b: 0,
            min_length: Fixed::ZERO,
            max_length: Fixed::ZERO,
            stiffness: Fixed::from_float(0.8),
        }
    }
}

#[inline]
fn effective_inverse_mass(body: &RigidBody) -> Fixed {
    if body.kind == BodyKind::Dynamic {
        body.inverse_mass
    } else {
        Fixed::ZERO
    }
}

/// Map body ids to store indices once per solve, keeping the whole solve
/// O(iterations x constraints).
fn build_id_map(bodies: &[RigidBody]) -> HashMap<u32, usize> {
    bodies.iter().enumerate().map(|(i, b)| (b.id, i)).collect()
}

pub fn solve_distance_constraints(
    bodies: &mut [RigidBody],
    constraints: &[DistanceConstraint],
    iterations: u32,
) {
    if constraints.is_empty() || iterations == 0 {
        return;
    }

    let id_to_index = build_id_map(bodies);

    for _ in 0..iterations {
        for c in constraints {
            let (Some(&ia), Some(&ib)) = (id_to_index.get(&c.body_a), id_to_index.get(&c.body_b))
            else {
                continue;
            };
            if ia == ib {
                continue;
            }
            let (a, b) = pair_mut(bodies, ia, ib);

            let delta = b.position - a.position;
            let dist_sq = delta.length_squared();

            // Coincident bodies: break the singularity with a small x nudge
            if dist_sq < Fixed::from_float(0.0001) {
                a.position.x -= Fixed::from_float(0.005);
                b.position.x += Fixed::from_float(0.005);
                continue;
            }

            let dist = dist_sq.sqrt();
            let diff = dist - c.rest_length;
            if diff.abs() < Fixed::from_float(0.0001) {
                continue;
            }

            let n = delta / dist;

            let inv_a = effective_inverse_mass(a);
            let inv_b = effective_inverse_mass(b);
            let inv_sum = inv_a + inv_b;
            if inv_sum.raw <= 0 {
                continue;
            }

            let correction = diff * c.stiffness;
            let ratio_a = inv_a / inv_sum;
            let ratio_b = inv_b / inv_sum;

            a.position -= n * (correction * ratio_a);
            b.position += n * (correction * ratio_b);

            if ratio_a.raw > 0 {
                a.wake();
            }
            if ratio_b.raw > 0 {
                b.wake();
            }
        }
    }
}

pub fn solve_range_constraints(
    bodies: &mut [RigidBody],
    constraints: &[DistanceRangeConstraint],
    iterations: u32,
) {
    if constraints.is_empty() || iterations == 0 {
        return;
    }

    let id_to_index = build_id_map(bodies);

    for _ in 0..iterations {
        for c in constraints {
            let (Some(&ia), Some(&ib)) = (id_to_index.get(&c.body_a), id_to_index.get(&c.body_b))
            else {
                continue;
            };
            if ia == ib {
                continue;
            }
            let (a, b) = pair_mut(bodies, ia, ib);

            let delta = b.position - a.position;
            let dist_sq = delta.length_squared();
            if dist_sq < Fixed::from_float(0.0001) {
                continue;
            }

            let dist = dist_sq.sqrt();
            let target = if c.max_length.raw > 0 && dist > c.max_length {
                c.max_length
            } else if c.min_length.raw > 0 && dist < c.min_length {
                c.min_length
            } else {
                continue;
            };

            let n = delta / dist;

            let inv_a = effective_inverse_mass(a);
            let inv_b = effective_inverse_mass(b);
            let inv_sum = inv_a + inv_b;
            if inv_sum.raw <= 0 {
                continue;
            }

            let diff = dist - target;
            let correction = diff * c.stiffness;
            let ratio_a = inv_a / inv_sum;
            let ratio_b = inv_b / inv_sum;

            a.position -= n * (correction * ratio_a);
            b.position += n * (correction * ratio_b);

            if ratio_a.raw > 0 {
                a.wake();
            }
            if ratio_b.raw > 0 {
                b.wake();
            }
        }
    }
}
