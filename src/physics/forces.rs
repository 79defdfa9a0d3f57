//! Force fields applied before integration each sub-step.

use crate::fixed::{Fixed, FixedVec3};
use crate::physics::body::RigidBody;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceFieldKind {
    RadialAttract,
    RadialRepel,
    DirectionalWind,
}

/// A field accumulates into body acceleration scaled by inverse mass, so
/// heavier bodies accelerate less under the same field.
#[derive(Debug, Clone, Copy)]
pub struct ForceField {
    pub kind: ForceFieldKind,
    pub position: FixedVec3,
    /// Direction for wind; ignored by radial fields.
    pub direction: FixedVec3,
    /// Radius gates application: bodies outside are unaffected. Zero means
    /// unbounded.
    pub radius: Fixed,
    pub strength: Fixed,
}

impl ForceField {
    pub fn attract(position: FixedVec3, radius: Fixed, strength: Fixed) -> Self {
        Self {
            kind: ForceFieldKind::RadialAttract,
            position,
            direction: FixedVec3::ZERO,
            radius,
            strength,
        }
    }

    pub fn repel(position: FixedVec3, radius: Fixed, strength: Fixed) -> Self {
        Self { kind: ForceFieldKind::RadialRepel, ..Self::attract(position, radius, strength) }
    }

    pub fn wind(direction: FixedVec3, strength: Fixed) -> Self {
        Self {
            kind: ForceFieldKind::DirectionalWind,
            position: FixedVec3::ZERO,
            direction,
            radius: Fixed::ZERO,
            strength,
        }
    }

    #[inline]
    fn in_range(&self, body: &RigidBody) -> bool {
        if self.radius.raw <= 0 {
            return true;
        }
        let dist_sq = (body.position - self.position).length_squared();
        dist_sq <= self.radius * self.radius
    }
}

/// Apply every field to every awake body.
pub fn apply_force_fields(fields: &[ForceField], bodies: &mut [RigidBody]) {
    if fields.is_empty() {
        return;
    }

    for body in bodies.iter_mut() {
        if !body.should_simulate() {
            continue;
        }
        for field in fields {
            match field.kind {
                ForceFieldKind::RadialAttract => {
                    if !field.in_range(body) {
                        continue;
                    }
                    let delta = field.position - body.position;
                    if delta.length_squared().raw > 0 {
                        let n = delta.normalized();
                        body.acceleration += n * field.strength * body.inverse_mass;
                    }
                }
                ForceFieldKind::RadialRepel => {
                    if !field.in_range(body) {
                        continue;
                    }
                    let delta = body.position - field.position;
                    if delta.length_squared().raw > 0 {
                        let n = delta.normalized();
                        body.acceleration += n * field.strength * body.inverse_mass;
                    }
                }
                ForceFieldKind::DirectionalWind => {
                    let n = field.direction.normalized();
                    body.acceleration += n * field.strength * body.inverse_mass;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_mass_body_at(x: f32) -> RigidBody {
        RigidBody {
            id: 1,
            position: FixedVec3::from_floats(x, 0.0, 0.0),
            mass: Fixed::from_int(1),
            inverse_mass: Fixed::from_int(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_attract_pulls_toward_field() {
        let field = ForceField::attract(
            FixedVec3::from_floats(1.0, 0.0, 0.0),
            Fixed::ZERO,
            Fixed::from_int(10),
        );
        let mut bodies = vec![unit_mass_body_at(0.0)];
        apply_force_fields(&[field], &mut bodies);
        assert!(bodies[0].acceleration.x.raw > 0);
    }

    #[test]
    fn test_repel_pushes_away() {
        let field = ForceField::repel(
            FixedVec3::from_floats(1.0, 0.0, 0.0),
            Fixed::ZERO,
            Fixed::from_int(10),
        );
        let mut bodies = vec![unit_mass_body_at(0.0)];
        apply_force_fields(&[field], &mut bodies);
        assert!(bodies[0].acceleration.x.raw < 0);
    }

    #[test]
    fn test_radius_gates_application() {
        let field = ForceField::repel(
            FixedVec3::from_floats(1.0, 0.0, 0.0),
            Fixed::from_float(0.5),
            Fixed::from_int(10),
        );
        let mut bodies = vec![unit_mass_body_at(0.0)]; // 1.0 away, outside 0.5
        apply_force_fields(&[field], &mut bodies);
        assert!(bodies[0].acceleration.is_zero());
    }

    #[test]
    fn test_wind_uses_direction() {
        let field = ForceField::wind(FixedVec3::from_floats(0.0, 1.0, 0.0), Fixed::from_int(5));
        let mut bodies = vec![unit_mass_body_at(0.0)];
        apply_force_fields(&[field], &mut bodies);
        assert!(bodies[0].acceleration.y.raw > 0);
        assert_eq!(bodies[0].acceleration.x.raw, 0);
    }

    #[test]
    fn test_heavier_bodies_accelerate_less() {
        let field = ForceField::wind(FixedVec3::from_floats(1.0, 0.0, 0.0), Fixed::from_int(5));
        let mut light = vec![unit_mass_body_at(0.0)];
        let mut heavy = vec![RigidBody {
            mass: Fixed::from_int(10),
            inverse_mass: Fixed::from_float(0.1),
            ..unit_mass_body_at(0.0)
        }];
        apply_force_fields(&[field], &mut light);
        apply_force_fields(&[field], &mut heavy);
        assert!(light[0].acceleration.x.raw > heavy[0].acceleration.x.raw);
    }

    #[test]
    fn test_sleeping_bodies_untouched() {
        let field = ForceField::wind(FixedVec3::from_floats(1.0, 0.0, 0.0), Fixed::from_int(5));
        let mut bodies = vec![RigidBody { is_sleeping: true, ..unit_mass_body_at(0.0) }];
        apply_force_fields(&[field], &mut bodies);
        assert!(bodies[0].acceleration.is_zero());
    }
}
