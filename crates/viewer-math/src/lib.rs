// SPDX-License-Identifier: CEPL-1.0
//! Math used by the viewer: object transforms, the camera, and the keyboard
//! controller that drives the camera object.
//!
//! Conventions: left-handed view space with +Z forward and -Y up, clip depth in
//! `[0, 1]`. Projections never flip Y; Vulkan's downward NDC Y matches -Y up.
pub mod camera;
pub mod controller;
pub mod transform;

pub use camera::Camera;
pub use controller::{KeyboardController, Movement};
pub use glam::{Mat4, Quat, Vec3, Vec4};
pub use transform::Transform;
