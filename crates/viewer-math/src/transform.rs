// SPDX-License-Identifier: CEPL-1.0
use glam::{EulerRot, Mat4, Quat, Vec3};

/// Placement of a drawable (or of the camera object) in world space.
///
/// `rotation` holds Tait-Bryan angles in radians, applied in Y (yaw), X (pitch),
/// Z (roll) order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub scale: Vec3,
    pub rotation: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Vec3::ZERO,
        }
    }
}

impl Transform {
    pub fn quat(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.rotation.y, self.rotation.x, self.rotation.z)
    }

    /// Model matrix: translate * rotate(YXZ) * scale.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.quat(), self.translation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn default_is_identity() {
        assert_eq!(Transform::default().matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn yaw_turns_x_towards_negative_z() {
        let t = Transform {
            rotation: Vec3::new(0.0, FRAC_PI_2, 0.0),
            ..Default::default()
        };
        let x = t.matrix().transform_vector3(Vec3::X);
        assert!(x.abs_diff_eq(Vec3::NEG_Z, 1e-6), "{x:?}");
    }

    #[test]
    fn scale_applies_before_translation() {
        let t = Transform {
            translation: Vec3::new(0.0, 0.0, 2.5),
            scale: Vec3::splat(0.5),
            ..Default::default()
        };
        let p = t.matrix().transform_point3(Vec3::new(1.0, 1.0, 1.0));
        assert!(p.abs_diff_eq(Vec3::new(0.5, 0.5, 3.0), 1e-6), "{p:?}");
    }
}
