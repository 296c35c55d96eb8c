use std::ops::Mul;

use glam::{DMat4, DQuat, DVec3};
use serde::{Deserialize, Serialize};

/// A position and orientation expressed in some coordinate frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: DVec3,
    pub orientation: DQuat,
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: DVec3::ZERO,
        orientation: DQuat::IDENTITY,
    };

    pub fn new(position: DVec3, orientation: DQuat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn from_position(position: DVec3) -> Self {
        Self::new(position, DQuat::IDENTITY)
    }

    pub fn matrix(&self) -> DMat4 {
        DMat4::from_rotation_translation(self.orientation, self.position)
    }

    /// Orientation normalized, falling back to identity for degenerate quaternions.
    pub fn normalized(&self) -> Pose {
        Pose::new(self.position, normalize_quat(self.orientation))
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.orientation.is_finite()
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<Transform> for Pose {
    fn from(transform: Transform) -> Self {
        Pose::new(transform.translation, transform.rotation)
    }
}

/// A rigid transform: rotate, then translate. Maps points from a child frame into its parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: DVec3,
    pub rotation: DQuat,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: DVec3::ZERO,
        rotation: DQuat::IDENTITY,
    };

    pub fn new(translation: DVec3, rotation: DQuat) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn from_translation(translation: DVec3) -> Self {
        Self::new(translation, DQuat::IDENTITY)
    }

    pub fn from_pose(pose: &Pose) -> Self {
        Self::new(pose.position, pose.orientation)
    }

    pub fn inverse(&self) -> Transform {
        let rotation = self.rotation.inverse();
        Transform::new(rotation * -self.translation, rotation)
    }

    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.rotation * point + self.translation
    }

    pub fn apply_to_pose(&self, pose: &Pose) -> Pose {
        Pose::new(
            self.transform_point(pose.position),
            normalize_quat(self.rotation * pose.orientation),
        )
    }

    pub fn matrix(&self) -> DMat4 {
        DMat4::from_rotation_translation(self.rotation, self.translation)
    }

    /// Linear interpolation of translation and spherical interpolation of rotation.
    pub fn interpolate(lower: &Transform, upper: &Transform, fraction: f64) -> Transform {
        if fraction <= 0.0 {
            return *lower;
        }
        if fraction >= 1.0 {
            return *upper;
        }
        Transform::new(
            lower.translation.lerp(upper.translation, fraction),
            lower.rotation.slerp(upper.rotation, fraction),
        )
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Transform {
        Transform::new(
            self.rotation * rhs.translation + self.translation,
            normalize_quat(self.rotation * rhs.rotation),
        )
    }
}

pub(crate) fn normalize_quat(quat: DQuat) -> DQuat {
    let length = quat.length();
    if !length.is_finite() || length < 1e-12 {
        return DQuat::IDENTITY;
    }
    quat / length
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use super::*;

    #[test]
    fn composition_matches_matrices() {
        let a = Transform::new(DVec3::new(1.0, 2.0, 3.0), DQuat::from_rotation_z(FRAC_PI_2));
        let b = Transform::new(DVec3::new(-1.0, 0.5, 0.0), DQuat::from_rotation_x(0.3));
        let composed = (a * b).matrix();
        assert!(composed.abs_diff_eq(a.matrix() * b.matrix(), 1e-9));
    }

    #[test]
    fn inverse_round_trips() {
        let a = Transform::new(DVec3::new(4.0, -2.0, 1.0), DQuat::from_rotation_y(1.1));
        let identity = a * a.inverse();
        assert!(identity.translation.abs_diff_eq(DVec3::ZERO, 1e-9));
        assert!(identity.rotation.abs_diff_eq(DQuat::IDENTITY, 1e-9));
    }

    #[test]
    fn interpolation_endpoints_are_exact() {
        let lower = Transform::new(DVec3::new(0.1, 0.2, 0.3), DQuat::from_rotation_z(0.7));
        let upper = Transform::new(DVec3::new(5.0, 0.0, 0.0), DQuat::from_rotation_z(1.3));
        assert_eq!(Transform::interpolate(&lower, &upper, 0.0), lower);
        assert_eq!(Transform::interpolate(&lower, &upper, 1.0), upper);
        let mid = Transform::interpolate(&lower, &upper, 0.5);
        assert!(mid
            .rotation
            .abs_diff_eq(DQuat::from_rotation_z(1.0), 1e-9));
    }

    #[test]
    fn degenerate_quaternion_normalizes_to_identity() {
        let pose = Pose::new(DVec3::ONE, DQuat::from_xyzw(0.0, 0.0, 0.0, 0.0));
        assert_eq!(pose.normalized().orientation, DQuat::IDENTITY);
    }
}
