// SPDX-License-Identifier: CEPL-1.0
use std::f32::consts::TAU;

use bitflags::bitflags;
use glam::Vec3;

use crate::transform::Transform;

bitflags! {
    /// Movement inputs currently held down.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Movement: u16 {
        const MOVE_LEFT = 1 << 0;
        const MOVE_RIGHT = 1 << 1;
        const MOVE_FORWARD = 1 << 2;
        const MOVE_BACKWARD = 1 << 3;
        const MOVE_UP = 1 << 4;
        const MOVE_DOWN = 1 << 5;
        const LOOK_LEFT = 1 << 6;
        const LOOK_RIGHT = 1 << 7;
        const LOOK_UP = 1 << 8;
        const LOOK_DOWN = 1 << 9;
    }
}

const PITCH_LIMIT: f32 = 1.5;

/// First-person style controller: look keys turn, move keys walk in the XZ plane.
#[derive(Clone, Copy, Debug)]
pub struct KeyboardController {
    pub move_speed: f32,
    pub look_speed: f32,
}

impl Default for KeyboardController {
    fn default() -> Self {
        Self {
            move_speed: 3.0,
            look_speed: 1.5,
        }
    }
}

fn axis(input: Movement, positive: Movement, negative: Movement) -> f32 {
    let mut v = 0.0;
    if input.contains(positive) {
        v += 1.0;
    }
    if input.contains(negative) {
        v -= 1.0;
    }
    v
}

impl KeyboardController {
    pub fn move_in_plane_xz(&self, input: Movement, dt: f32, object: &mut Transform) {
        let rotate = Vec3::new(
            axis(input, Movement::LOOK_UP, Movement::LOOK_DOWN),
            axis(input, Movement::LOOK_RIGHT, Movement::LOOK_LEFT),
            0.0,
        );
        if rotate.length_squared() > f32::EPSILON {
            object.rotation += self.look_speed * dt * rotate.normalize();
        }

        object.rotation.x = object.rotation.x.clamp(-PITCH_LIMIT, PITCH_LIMIT);
        object.rotation.y = object.rotation.y.rem_euclid(TAU);

        let yaw = object.rotation.y;
        let forward = Vec3::new(yaw.sin(), 0.0, yaw.cos());
        let right = Vec3::new(forward.z, 0.0, -forward.x);
        let up = Vec3::NEG_Y;

        let step = forward * axis(input, Movement::MOVE_FORWARD, Movement::MOVE_BACKWARD)
            + right * axis(input, Movement::MOVE_RIGHT, Movement::MOVE_LEFT)
            + up * axis(input, Movement::MOVE_UP, Movement::MOVE_DOWN);
        if step.length_squared() > f32::EPSILON {
            object.translation += self.move_speed * dt * step.normalize();
        }
    }
}
