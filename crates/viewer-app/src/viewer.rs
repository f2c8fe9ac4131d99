// SPDX-License-Identifier: CEPL-1.0
use std::f32::consts::TAU;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info};
use viewer_core::FpsCounter;
use viewer_math::{Camera, KeyboardController, Transform, Vec3};
use viewer_platform::ViewerWindow;
use viewer_render::{DrawableCollection, GpuBackend, Renderer};
use viewer_render_vk::{Model, ModelBuilder, SimpleRenderSystem, VkDevice};

use crate::config::AppCfg;

const FOV_Y: f32 = 50.0 * std::f32::consts::PI / 180.0;
const NEAR: f32 = 0.1;
const FAR: f32 = 10.0;
/// Upper bound on one simulation step, so a stall (minimized window, debugger)
/// does not teleport the camera.
const MAX_FRAME_TIME: Duration = Duration::from_millis(250);

pub struct ModelViewer {
    // Field order is drop order: GPU users, then the device, then the window.
    renderer: Renderer<VkDevice, ViewerWindow>,
    render_system: SimpleRenderSystem,
    drawables: DrawableCollection<Model>,
    device: Rc<VkDevice>,
    window: Rc<ViewerWindow>,

    controller: KeyboardController,
    viewer: Transform,
    camera: Camera,
    spin_speed: f32,
}

impl ModelViewer {
    pub fn new(cfg: &AppCfg) -> Result<Self> {
        let window = Rc::new(ViewerWindow::new(&cfg.window_config())?);
        let device = Rc::new(
            VkDevice::new(&*window, &cfg.device_config()).context("initializing Vulkan")?,
        );
        let mut renderer = Renderer::new(Rc::clone(&window), Rc::clone(&device))?;
        renderer.set_clear_color(cfg.render.clear_color);

        let render_system = SimpleRenderSystem::new(
            Rc::clone(&device),
            renderer.swapchain_render_pass(),
            &cfg.shader_source(),
        )?;

        let mut drawables = DrawableCollection::new();
        let cube = Rc::new(Model::new(Rc::clone(&device), &ModelBuilder::cube([0.0; 3]))?);
        let obj = drawables.spawn(cube)?;
        obj.transform.translation = Vec3::new(0.0, 0.0, 2.5);
        obj.transform.scale = Vec3::splat(0.5);

        Ok(Self {
            renderer,
            render_system,
            drawables,
            device,
            window,
            controller: KeyboardController {
                move_speed: cfg.controller.move_speed,
                look_speed: cfg.controller.look_speed,
            },
            viewer: Transform::default(),
            camera: Camera::default(),
            spin_speed: cfg.scene.spin_speed,
        })
    }

    pub fn run(&mut self) -> Result<()> {
        let mut last = Instant::now();
        let mut fps = FpsCounter::new(last);

        while self.window.poll_events() {
            let now = Instant::now();
            let dt = frame_time(last, now);
            last = now;

            self.controller
                .move_in_plane_xz(self.window.movement(), dt, &mut self.viewer);
            self.camera
                .set_view_yxz(self.viewer.translation, self.viewer.rotation);
            self.camera
                .set_perspective_projection(FOV_Y, self.renderer.aspect_ratio(), NEAR, FAR);
            spin(&mut self.drawables, self.spin_speed, dt);

            let Some(cmd) = self.renderer.begin_frame()? else {
                debug!("frame skipped, swapchain rebuilt at {}", self.renderer.extent());
                fps.reset(Instant::now());
                last = Instant::now();
                continue;
            };
            self.renderer.begin_swapchain_render_pass(cmd);
            self.render_system
                .render_drawables(cmd, &self.drawables, &self.camera);
            self.renderer.end_swapchain_render_pass(cmd);
            self.renderer.end_frame()?;

            if let Some(frames) = fps.tick(Instant::now()) {
                info!("{frames} fps @ {}", self.renderer.extent());
            }
        }

        info!("window closed, waiting for the device");
        self.device.wait_idle()
    }
}

fn frame_time(last: Instant, now: Instant) -> f32 {
    now.duration_since(last).min(MAX_FRAME_TIME).as_secs_f32()
}

fn spin<M>(drawables: &mut DrawableCollection<M>, speed: f32, dt: f32) {
    for d in drawables.iter_mut() {
        let r = &mut d.transform.rotation;
        r.y = (r.y + speed * dt).rem_euclid(TAU);
        r.x = (r.x + 0.5 * speed * dt).rem_euclid(TAU);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_time_is_clamped_after_a_stall() {
        let t0 = Instant::now();
        assert!((frame_time(t0, t0 + Duration::from_millis(16)) - 0.016).abs() < 1e-6);
        assert_eq!(frame_time(t0, t0 + Duration::from_secs(5)), 0.25);
    }

    #[test]
    fn spin_wraps_rotation() {
        let mut drawables = DrawableCollection::new();
        let id = drawables.spawn(Rc::new(())).unwrap().id();
        drawables.get_mut(id).unwrap().transform.rotation.y = TAU - 0.1;

        spin(&mut drawables, 1.0, 0.2);
        let r = drawables.get(id).unwrap().transform.rotation;
        assert!((r.y - 0.1).abs() < 1e-5, "{r:?}");
        assert!((r.x - 0.1).abs() < 1e-5, "{r:?}");
    }

    #[test]
    fn zero_spin_keeps_rotation() {
        let mut drawables = DrawableCollection::new();
        let id = drawables.spawn(Rc::new(())).unwrap().id();
        spin(&mut drawables, 0.0, 0.1);
        assert_eq!(drawables.get(id).unwrap().transform.rotation, Vec3::ZERO);
    }
}
