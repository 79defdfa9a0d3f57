//! Player skeleton: Verlet point masses with bone-length constraints and
//! three biomechanical balance strategies.
//!
//! Small center-of-mass disturbances are absorbed at the ankle, larger ones
//! through the hip/spine chain, and past the stepping threshold the trailing
//! foot is repositioned. Skeleton space is screen-like: y grows downward and
//! the ground plane sits at `ground_y`.

use crate::fixed::Fixed;

/// One point mass. `pinned` joints never move.
#[derive(Debug, Clone, Copy)]
pub struct Joint {
    pub x: Fixed,
    pub y: Fixed,
    pub prev_x: Fixed,
    pub prev_y: Fixed,
    pub mass: Fixed,
    pub pinned: bool,
}

impl Joint {
    fn new(x: Fixed, y: Fixed, mass: Fixed) -> Self {
        Self { x, y, prev_x: x, prev_y: y, mass, pinned: false }
    }

    /// Verlet position update with shared damping.
    fn integrate(&mut self, damping: Fixed) {
        if self.pinned {
            return;
        }
        let (tx, ty) = (self.x, self.y);
        self.x += (self.x - self.prev_x) * damping;
        self.y += (self.y - self.prev_y) * damping;
        self.prev_x = tx;
        self.prev_y = ty;
    }
}

/// Bone between two joints, rest length captured at initialization.
#[derive(Debug, Clone, Copy)]
struct Bone {
    a: usize,
    b: usize,
    length: Fixed,
    stiffness: Fixed,
}

// Joint indices
pub const HEAD: usize = 0;
pub const NECK: usize = 1;
pub const CHEST: usize = 2;
pub const MID_SPINE: usize = 3;
pub const LOWER_SPINE: usize = 4;
pub const PELVIS: usize = 5;
pub const SHOULDER_L: usize = 6;
pub const SHOULDER_R: usize = 7;
pub const ELBOW_L: usize = 8;
pub const ELBOW_R: usize = 9;
pub const WRIST_L: usize = 10;
pub const WRIST_R: usize = 11;
pub const HAND_L: usize = 12;
pub const HAND_R: usize = 13;
pub const HIP_L: usize = 14;
pub const HIP_R: usize = 15;
pub const KNEE_L: usize = 16;
pub const KNEE_R: usize = 17;
pub const ANKLE_L: usize = 18;
pub const ANKLE_R: usize = 19;
pub const HEEL_L: usize = 20;
pub const HEEL_R: usize = 21;
pub const FOOT_L: usize = 22;
pub const FOOT_R: usize = 23;
pub const TOE_L: usize = 24;
pub const TOE_R: usize = 25;

pub const JOINT_COUNT: usize = 26;
const MAX_BONES: usize = 30;

/// Articulated player body with automatic balance.
#[derive(Debug, Clone)]
pub struct PlayerSkeleton {
    pub joints: [Joint; JOINT_COUNT],
    bones: Vec<Bone>,

    // Balance state
    pub center_of_mass_x: Fixed,
    pub center_of_mass_y: Fixed,
    /// Lateral COM offset from the support centroid.
    pub com_offset: Fixed,
    pub foot_contact_l: bool,
    pub foot_contact_r: bool,

    // Settings
    pub ground_y: Fixed,
    pub balance_strength: Fixed,
    pub ankle_flexibility: Fixed,
    pub damping: Fixed,
    pub gravity: Fixed,
    pub auto_balance: bool,
}

impl Default for PlayerSkeleton {
    fn default() -> Self {
        let joint = Joint::new(Fixed::ZERO, Fixed::ZERO, Fixed::from_int(1));
        Self {
            joints: [joint; JOINT_COUNT],
            bones: Vec::with_capacity(MAX_BONES),
            center_of_mass_x: Fixed::ZERO,
            center_of_mass_y: Fixed::ZERO,
            com_offset: Fixed::ZERO,
            foot_contact_l: false,
            foot_contact_r: false,
            ground_y: Fixed::from_float(0.1),
            balance_strength: Fixed::from_float(0.5),
            ankle_flexibility: Fixed::from_float(0.4),
            damping: Fixed::from_float(0.95),
            gravity: Fixed::from_float(9.8),
            auto_balance: true,
        }
    }
}

impl PlayerSkeleton {
    pub fn new(center_x: Fixed, center_y: Fixed) -> Self {
        let mut skeleton = Self::default();
        skeleton.initialize(center_x, center_y, Fixed::from_int(1));
        skeleton
    }

    /// Lay out all 26 joints around the given center and capture bone rest
    /// lengths from that pose.
    pub fn initialize(&mut self, cx: Fixed, cy: Fixed, scale: Fixed) {
        let s = scale * Fixed::from_float(0.01);
        let at = |ox: i32, oy: i32, mass: f32| {
            Joint::new(
                cx + s * Fixed::from_int(ox),
                cy + s * Fixed::from_int(oy),
                Fixed::from_float(mass),
            )
        };

        self.joints[HEAD] = at(0, -200, 0.8);
        self.joints[NECK] = at(0, -170, 0.5);
        self.joints[CHEST] = at(0, -140, 2.0);
        self.joints[MID_SPINE] = at(0, -100, 2.5);
        self.joints[LOWER_SPINE] = at(0, -60, 2.5);
        self.joints[PELVIS] = at(0, -20, 3.0);

        self.joints[SHOULDER_L] = at(-35, -150, 1.0);
        self.joints[SHOULDER_R] = at(35, -150, 1.0);
        self.joints[ELBOW_L] = at(-60, -100, 0.7);
        self.joints[ELBOW_R] = at(60, -100, 0.7);
        self.joints[WRIST_L] = at(-70, -50, 0.5);
        self.joints[WRIST_R] = at(70, -50, 0.5);
        self.joints[HAND_L] = at(-75, -30, 0.4);
        self.joints[HAND_R] = at(75, -30, 0.4);

        self.joints[HIP_L] = at(-20, -10, 1.5);
        self.joints[HIP_R] = at(20, -10, 1.5);
        self.joints[KNEE_L] = at(-25, 80, 1.2);
        self.joints[KNEE_R] = at(25, 80, 1.2);
        self.joints[ANKLE_L] = at(-25, 160, 0.8);
        self.joints[ANKLE_R] = at(25, 160, 0.8);

        self.joints[HEEL_L] = at(-25, 180, 0.6);
        self.joints[HEEL_R] = at(25, 180, 0.6);
        self.joints[FOOT_L] = at(-15, 180, 0.5);
        self.joints[FOOT_R] = at(15, 180, 0.5);
        self.joints[TOE_L] = at(-5, 180, 0.4);
        self.joints[TOE_R] = at(5, 180, 0.4);

        self.bones.clear();
        let bone_spec = [
            (HEAD, NECK, 0.95),
            (NECK, CHEST, 0.9),
            (CHEST, MID_SPINE, 0.85),
            (MID_SPINE, LOWER_SPINE, 0.85),
            (LOWER_SPINE, PELVIS, 0.9),
            (CHEST, SHOULDER_L, 0.95),
            (CHEST, SHOULDER_R, 0.95),
            (SHOULDER_L, SHOULDER_R, 0.8),
            (SHOULDER_L, ELBOW_L, 0.9),
            (ELBOW_L, WRIST_L, 0.9),
            (WRIST_L, HAND_L, 0.95),
            (SHOULDER_R, ELBOW_R, 0.9),
            (ELBOW_R, WRIST_R, 0.9),
            (WRIST_R, HAND_R, 0.95),
            (PELVIS, HIP_L, 0.95),
            (PELVIS, HIP_R, 0.95),
            (HIP_L, HIP_R, 0.8),
            (HIP_L, KNEE_L, 0.9),
            (KNEE_L, ANKLE_L, 0.9),
            (ANKLE_L, HEEL_L, 0.95),
            (HEEL_L, FOOT_L, 0.95),
            (FOOT_L, TOE_L, 0.95),
            (HIP_R, KNEE_R, 0.9),
            (KNEE_R, ANKLE_R, 0.9),
            (ANKLE_R, HEEL_R, 0.95),
            (HEEL_R, FOOT_R, 0.95),
            (FOOT_R, TOE_R, 0.95),
        ];
        for (a, b, stiffness) in bone_spec {
            self.add_bone(a, b, Fixed::from_float(stiffness));
        }
    }

    fn add_bone(&mut self, a: usize, b: usize, stiffness: Fixed) {
        if self.bones.len() >= MAX_BONES {
            return;
        }
        let dx = self.joints[b].x - self.joints[a].x;
        let dy = self.joints[b].y - self.joints[a].y;
        let length = (dx * dx + dy * dy).sqrt();
        self.bones.push(Bone { a, b, length, stiffness });
    }

    /// Full per-frame update: gravity, Verlet, bones, ground, balance, then a
    /// short settling pass.
    pub fn update(&mut self, dt_seconds: f32) {
        // Clamp dt so a frame hitch cannot explode the integration
        let dt = Fixed::from_float(dt_seconds.clamp(1.0 / 240.0, 1.0 / 30.0));

        self.apply_gravity(dt);
        for joint in &mut self.joints {
            joint.integrate(self.damping);
        }

        self.solve_bones(5);
        self.apply_ground();
        self.apply_balance();
        self.solve_bones(2);
    }

    fn apply_gravity(&mut self, dt: Fixed) {
        let g = self.gravity * dt * dt;
        for joint in &mut self.joints {
            if !joint.pinned {
                joint.y += g;
            }
        }
    }

    fn solve_bones(&mut self, iterations: u32) {
        for _ in 0..iterations {
            for i in 0..self.bones.len() {
                let bone = self.bones[i];
                let dx = self.joints[bone.b].x - self.joints[bone.a].x;
                let dy = self.joints[bone.b].y - self.joints[bone.a].y;
                let dist_sq = dx * dx + dy * dy;
                if dist_sq < Fixed::from_float(0.0001) {
                    continue;
                }
                let dist = dist_sq.sqrt();
                let diff = (bone.length - dist) / dist;
                let half = bone.stiffness * Fixed::from_float(0.5);
                let ox = dx * diff * half;
                let oy = dy * diff * half;

                if !self.joints[bone.a].pinned {
                    self.joints[bone.a].x -= ox;
                    self.joints[bone.a].y -= oy;
                }
                if !self.joints[bone.b].pinned {
                    self.joints[bone.b].x += ox;
                    self.joints[bone.b].y += oy;
                }
            }
        }
    }

    /// Ground plane on the foot triple of each side: tangential friction,
    /// strong vertical absorption, contact bookkeeping.
    fn apply_ground(&mut self) {
        let friction = Fixed::from_float(0.85);
        let absorb = Fixed::from_float(0.2);

        for &i in &[HEEL_L, HEEL_R, FOOT_L, FOOT_R, TOE_L, TOE_R] {
            let joint = &mut self.joints[i];
            if joint.y > self.ground_y {
                joint.y = self.ground_y;
                let vel_x = joint.x - joint.prev_x;
                joint.prev_x = joint.x - vel_x * friction;
                let vel_y = joint.y - joint.prev_y;
                joint.prev_y = self.ground_y + vel_y * absorb;
            }
        }

        let threshold = self.ground_y - Fixed::from_float(0.001);
        self.foot_contact_l = self.joints[HEEL_L].y >= threshold
            || self.joints[FOOT_L].y >= threshold
            || self.joints[TOE_L].y >= threshold;
        self.foot_contact_r = self.joints[HEEL_R].y >= threshold
            || self.joints[FOOT_R].y >= threshold
            || self.joints[TOE_R].y >= threshold;
    }

    fn compute_center_of_mass(&mut self) {
        let mut total = Fixed::ZERO;
        let mut cx = Fixed::ZERO;
        let mut cy = Fixed::ZERO;
        for joint in &self.joints {
            cx += joint.x * joint.mass;
            cy += joint.y * joint.mass;
            total += joint.mass;
        }
        self.center_of_mass_x = cx / total;
        self.center_of_mass_y = cy / total;
    }

    /// The three balance strategies in order of increasing disturbance, plus
    /// knee lock.
    fn apply_balance(&mut self) {
        if !self.auto_balance {
            return;
        }

        self.compute_center_of_mass();

        let three = Fixed::from_int(3);
        let mut contact_count = 0;
        let mut support_left = Fixed::ZERO;
        let mut support_right = Fixed::ZERO;

        if self.foot_contact_l {
            support_left =
                (self.joints[HEEL_L].x + self.joints[FOOT_L].x + self.joints[TOE_L].x) / three;
            contact_count += 1;
        }
        if self.foot_contact_r {
            support_right =
                (self.joints[HEEL_R].x + self.joints[FOOT_R].x + self.joints[TOE_R].x) / three;
            contact_count += 1;
        }
        if contact_count == 0 {
            return; // airborne
        }

        let support_center = if contact_count == 2 {
            (support_left + support_right) / Fixed::from_int(2)
        } else if self.foot_contact_l {
            support_left
        } else {
            support_right
        };
        self.com_offset = self.center_of_mass_x - support_center;

        // Ankle strategy: small disturbances
        if self.com_offset.abs() < Fixed::from_float(0.015) {
            let force = -self.com_offset * self.ankle_flexibility * Fixed::from_float(0.8);
            let counter = force * Fixed::from_float(0.3);
            if self.foot_contact_l {
                self.joints[ANKLE_L].x += force;
                self.joints[HEEL_L].x -= counter;
                self.joints[TOE_L].x += counter;
            }
            if self.foot_contact_r {
                self.joints[ANKLE_R].x += force;
                self.joints[HEEL_R].x -= counter;
                self.joints[TOE_R].x += counter;
            }
        }

        // Hip strategy: push the spinal chain with decaying weights
        let hip = -self.com_offset * self.balance_strength;
        self.joints[PELVIS].x += hip;
        self.joints[LOWER_SPINE].x += hip * Fixed::from_float(0.8);
        self.joints[MID_SPINE].x += hip * Fixed::from_float(0.6);
        self.joints[CHEST].x += hip * Fixed::from_float(0.4);
        self.joints[NECK].x += hip * Fixed::from_float(0.2);
        self.joints[HEAD].x += hip * Fixed::from_float(0.1);

        // Weight shift between feet while both are planted
        if contact_count == 2 {
            let shift = (self.com_offset * Fixed::from_float(0.05)).abs();
            let factor_l = if self.com_offset.raw < 0 {
                Fixed::from_float(1.5)
            } else {
                Fixed::from_float(0.5)
            };
            let factor_r = if self.com_offset.raw > 0 {
                Fixed::from_float(1.5)
            } else {
                Fixed::from_float(0.5)
            };
            for &i in &[HEEL_L, FOOT_L, TOE_L] {
                self.joints[i].y -= shift * factor_l;
            }
            for &i in &[HEEL_R, FOOT_R, TOE_R] {
                self.joints[i].y -= shift * factor_r;
            }
        }

        // Stepping strategy: reposition the trailing foot
        if self.com_offset.abs() > Fixed::from_float(0.05) && contact_count == 2 {
            let step = self.com_offset * Fixed::from_float(0.1);
            if self.com_offset.raw > 0 && self.foot_contact_r {
                for &i in &[HEEL_R, FOOT_R, TOE_R] {
                    self.joints[i].x += step;
                }
            } else if self.com_offset.raw < 0 && self.foot_contact_l {
                for &i in &[HEEL_L, FOOT_L, TOE_L] {
                    self.joints[i].x += step;
                }
            }
        }

        // Knee lock
        let knee_strength = Fixed::from_float(0.15);
        if self.foot_contact_l {
            let target = self.joints[ANKLE_L].x;
            let dx = target - self.joints[KNEE_L].x;
            self.joints[KNEE_L].x += dx * knee_strength;
        }
        if self.foot_contact_r {
            let target = self.joints[ANKLE_R].x;
            let dx = target - self.joints[KNEE_R].x;
            self.joints[KNEE_R].x += dx * knee_strength;
        }
    }

    /// Hard-sync the pelvis to the gameplay position each tick.
    pub fn sync_to_player_position(&mut self, player_x: Fixed, player_y: Fixed) {
        self.joints[PELVIS].x = player_x;
        self.joints[PELVIS].y = player_y;
    }

    /// 1.0 fully balanced down to 0.0 at a lateral offset of 0.1.
    pub fn balance_quality(&self) -> f32 {
        (1.0 - self.com_offset.abs().to_float() / 0.1).clamp(0.0, 1.0)
    }

    pub fn foot_positions(&self) -> (Fixed, Fixed, Fixed, Fixed) {
        let three = Fixed::from_int(3);
        let lx = (self.joints[HEEL_L].x + self.joints[FOOT_L].x + self.joints[TOE_L].x) / three;
        let ly = (self.joints[HEEL_L].y + self.joints[FOOT_L].y + self.joints[TOE_L].y) / three;
        let rx = (self.joints[HEEL_R].x + self.joints[FOOT_R].x + self.joints[TOE_R].x) / three;
        let ry = (self.joints[HEEL_R].y + self.joints[FOOT_R].y + self.joints[TOE_R].y) / three;
        (lx, ly, rx, ry)
    }
}
