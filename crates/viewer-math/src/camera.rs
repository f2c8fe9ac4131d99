// SPDX-License-Identifier: CEPL-1.0
use glam::{Mat4, Quat, Vec3, Vec4};

use crate::transform::Transform;

/// Projection and view matrices for the single viewer camera.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    projection: Mat4,
    view: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
        }
    }
}

impl Camera {
    pub fn set_orthographic_projection(
        &mut self,
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
    ) {
        self.projection = Mat4::from_cols(
            Vec4::new(2.0 / (right - left), 0.0, 0.0, 0.0),
            Vec4::new(0.0, 2.0 / (bottom - top), 0.0, 0.0),
            Vec4::new(0.0, 0.0, 1.0 / (far - near), 0.0),
            Vec4::new(
                -(right + left) / (right - left),
                -(bottom + top) / (bottom - top),
                -near / (far - near),
                1.0,
            ),
        );
    }

    /// `fovy` in radians. `aspect` must be finite and non-zero.
    pub fn set_perspective_projection(&mut self, fovy: f32, aspect: f32, near: f32, far: f32) {
        debug_assert!(aspect.is_finite() && aspect.abs() > f32::EPSILON);
        let tan_half = (fovy / 2.0).tan();
        self.projection = Mat4::from_cols(
            Vec4::new(1.0 / (aspect * tan_half), 0.0, 0.0, 0.0),
            Vec4::new(0.0, 1.0 / tan_half, 0.0, 0.0),
            Vec4::new(0.0, 0.0, far / (far - near), 1.0),
            Vec4::new(0.0, 0.0, -(far * near) / (far - near), 0.0),
        );
    }

    pub fn set_view_direction(&mut self, position: Vec3, direction: Vec3, up: Vec3) {
        let w = direction.normalize();
        let u = w.cross(up).normalize();
        let v = w.cross(u);
        self.view = Mat4::from_cols(
            Vec4::new(u.x, v.x, w.x, 0.0),
            Vec4::new(u.y, v.y, w.y, 0.0),
            Vec4::new(u.z, v.z, w.z, 0.0),
            Vec4::new(-u.dot(position), -v.dot(position), -w.dot(position), 1.0),
        );
    }

    pub fn set_view_target(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.set_view_direction(position, target - position, up);
    }

    /// View from a camera placed at `position` with YXZ Euler `rotation`.
    pub fn set_view_yxz(&mut self, position: Vec3, rotation: Vec3) {
        let placement = Transform {
            translation: position,
            rotation,
            ..Default::default()
        };
        let inverse: Quat = placement.quat().conjugate();
        self.view = Mat4::from_quat(inverse) * Mat4::from_translation(-position);
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn projection_view(&self) -> Mat4 {
        self.projection * self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn ndc(m: Mat4, p: Vec3) -> Vec3 {
        let clip = m * p.extend(1.0);
        clip.truncate() / clip.w
    }

    #[test]
    fn perspective_maps_near_and_far_to_unit_depth() {
        let mut cam = Camera::default();
        cam.set_perspective_projection(50f32.to_radians(), 16.0 / 9.0, 0.1, 100.0);

        let near = ndc(cam.projection(), Vec3::new(0.0, 0.0, 0.1));
        let far = ndc(cam.projection(), Vec3::new(0.0, 0.0, 100.0));
        assert!(near.z.abs() < 1e-5, "{near:?}");
        assert!((far.z - 1.0).abs() < 1e-5, "{far:?}");
    }

    #[test]
    fn perspective_keeps_up_as_negative_ndc_y() {
        let mut cam = Camera::default();
        cam.set_perspective_projection(FRAC_PI_2, 1.0, 0.1, 10.0);
        let up = ndc(cam.projection(), Vec3::new(0.0, -1.0, 1.0));
        assert!((up.y + 1.0).abs() < 1e-5, "{up:?}");
    }

    #[test]
    fn orthographic_maps_box_corners() {
        let mut cam = Camera::default();
        cam.set_orthographic_projection(-2.0, 2.0, -1.0, 1.0, 0.0, 10.0);
        let corner = ndc(cam.projection(), Vec3::new(2.0, 1.0, 10.0));
        assert!(corner.abs_diff_eq(Vec3::new(1.0, 1.0, 1.0), 1e-6), "{corner:?}");
    }

    #[test]
    fn view_yxz_moves_camera_to_origin() {
        let mut cam = Camera::default();
        let eye = Vec3::new(1.0, -2.0, -3.0);
        cam.set_view_yxz(eye, Vec3::new(0.3, 1.2, 0.0));
        let p = cam.view().transform_point3(eye);
        assert!(p.abs_diff_eq(Vec3::ZERO, 1e-5), "{p:?}");
    }

    #[test]
    fn view_yxz_without_rotation_matches_view_direction() {
        let eye = Vec3::new(0.5, 0.0, -2.5);
        let mut a = Camera::default();
        let mut b = Camera::default();
        a.set_view_yxz(eye, Vec3::ZERO);
        b.set_view_direction(eye, Vec3::Z, Vec3::NEG_Y);
        assert!(a.view().abs_diff_eq(b.view(), 1e-6));
    }

    #[test]
    fn view_target_looks_down_positive_z() {
        let mut cam = Camera::default();
        let target = Vec3::new(0.0, 0.0, 2.5);
        cam.set_view_target(Vec3::new(-1.0, -2.0, -2.0), target, Vec3::NEG_Y);
        let p = cam.view().transform_point3(target);
        assert!(p.x.abs() < 1e-5 && p.y.abs() < 1e-5 && p.z > 0.0, "{p:?}");
    }
}
