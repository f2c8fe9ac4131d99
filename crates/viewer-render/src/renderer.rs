// SPDX-License-Identifier: CEPL-1.0
use std::rc::Rc;

use anyhow::Result;
use tracing::{debug, info};

use crate::backend::{Acquired, ClearValues, GpuBackend, PresentTargets};
use crate::error::FrameError;
use crate::surface::{wait_for_extent, PresentationSurface};
use crate::swapchain::Swapchain;
use crate::{RenderSize, MAX_FRAMES_IN_FLIGHT};

#[derive(Clone, Copy, Debug, Default)]
struct FrameState {
    image_index: u32,
    frame_index: usize,
    in_progress: bool,
    /// The acquire for the active frame reported a suboptimal surface.
    acquire_suboptimal: bool,
}

/// Drives begin-frame / record / end-frame over a [`Swapchain`] and rebuilds the
/// swapchain when the surface goes stale or changes size.
///
/// Owns one command buffer per frame slot. They are allocated once and survive
/// every rebuild.
pub struct Renderer<B: GpuBackend, S: PresentationSurface> {
    surface: Rc<S>,
    backend: Rc<B>,
    swapchain: Swapchain<B>,
    command_buffers: Vec<B::CommandBuffer>,
    frame: FrameState,
    clear: ClearValues,
}

impl<B: GpuBackend, S: PresentationSurface> Renderer<B, S> {
    pub fn new(surface: Rc<S>, backend: Rc<B>) -> Result<Self> {
        let extent = wait_for_extent(&*surface).ok_or(FrameError::SurfaceClosed)?;
        let swapchain = Swapchain::new(Rc::clone(&backend), extent, None)?;
        let command_buffers = backend.allocate_command_buffers(MAX_FRAMES_IN_FLIGHT)?;
        Ok(Self {
            surface,
            backend,
            swapchain,
            command_buffers,
            frame: FrameState::default(),
            clear: ClearValues::default(),
        })
    }

    /// Starts a frame and returns the command buffer to record into.
    ///
    /// `None` means the swapchain was out of date and has been rebuilt; skip
    /// drawing this iteration.
    ///
    /// # Panics
    /// If a frame is already in progress.
    pub fn begin_frame(&mut self) -> Result<Option<B::CommandBuffer>> {
        assert!(
            !self.frame.in_progress,
            "begin_frame called while a frame is already in progress"
        );

        match self.swapchain.acquire_next_image(self.frame.frame_index)? {
            Acquired::OutOfDate => {
                debug!("acquire reported an out-of-date swapchain");
                self.recreate_swapchain()?;
                Ok(None)
            }
            Acquired::Image { index, suboptimal } => {
                let cmd = self.command_buffers[self.frame.frame_index];
                self.backend.begin_commands(cmd)?;
                self.frame.image_index = index;
                self.frame.acquire_suboptimal = suboptimal;
                self.frame.in_progress = true;
                Ok(Some(cmd))
            }
        }
    }

    /// Finishes recording, submits and presents. The frame slot advances even
    /// when the swapchain has to be rebuilt afterwards.
    pub fn end_frame(&mut self) -> Result<()> {
        if !self.frame.in_progress {
            return Err(FrameError::FrameNotInProgress.into());
        }
        let frame_index = self.frame.frame_index;
        let image_index = self.frame.image_index;
        let acquire_suboptimal = self.frame.acquire_suboptimal;
        let cmd = self.command_buffers[frame_index];

        self.frame.in_progress = false;
        self.frame.acquire_suboptimal = false;
        self.frame.frame_index = (frame_index + 1) % MAX_FRAMES_IN_FLIGHT;

        self.backend.end_commands(cmd)?;
        let status = self.swapchain.submit_and_present(cmd, image_index, frame_index)?;

        let resized = self.surface.was_resized();
        if status.needs_rebuild() || acquire_suboptimal || resized {
            debug!(?status, acquire_suboptimal, resized, "rebuilding swapchain after present");
            self.surface.reset_resized_flag();
            self.recreate_swapchain()?;
        }
        Ok(())
    }

    /// # Panics
    /// Outside a frame, or if `cmd` is not the active frame's command buffer.
    pub fn begin_swapchain_render_pass(&self, cmd: B::CommandBuffer) {
        self.check_recording(cmd, "begin_swapchain_render_pass");
        self.backend
            .begin_render_pass(cmd, self.swapchain.targets(), self.frame.image_index, &self.clear);
    }

    /// # Panics
    /// Outside a frame, or if `cmd` is not the active frame's command buffer.
    pub fn end_swapchain_render_pass(&self, cmd: B::CommandBuffer) {
        self.check_recording(cmd, "end_swapchain_render_pass");
        self.backend.end_render_pass(cmd);
    }

    /// # Panics
    /// Outside a frame.
    pub fn current_command_buffer(&self) -> B::CommandBuffer {
        assert!(
            self.frame.in_progress,
            "no command buffer is recording outside a frame"
        );
        self.command_buffers[self.frame.frame_index]
    }

    fn check_recording(&self, cmd: B::CommandBuffer, op: &str) {
        assert!(self.frame.in_progress, "{op} called outside a frame");
        assert!(
            cmd == self.command_buffers[self.frame.frame_index],
            "{op} called with a command buffer from a different frame"
        );
    }

    fn recreate_swapchain(&mut self) -> Result<()> {
        let Some(extent) = wait_for_extent(&*self.surface) else {
            debug!("surface is closing, swapchain rebuild skipped");
            return Ok(());
        };
        self.backend.wait_idle()?;

        let next = match Swapchain::new(Rc::clone(&self.backend), extent, Some(&self.swapchain)) {
            Ok(next) => next,
            // Minimized between the size check and the surface query. The old
            // generation stays; the next out-of-date result retries.
            Err(e) if is_degenerate_extent(&e) => {
                debug!("surface went degenerate during rebuild, keeping {}", self.swapchain.extent());
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let previous = std::mem::replace(&mut self.swapchain, next);
        drop(previous);

        info!("swapchain rebuilt at {extent}");
        Ok(())
    }

    pub fn frame_index(&self) -> usize {
        self.frame.frame_index
    }

    pub fn is_frame_in_progress(&self) -> bool {
        self.frame.in_progress
    }

    pub fn swapchain_render_pass(&self) -> <B::Targets as PresentTargets>::RenderPass {
        self.swapchain.render_pass()
    }

    pub fn extent(&self) -> RenderSize {
        self.swapchain.extent()
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain.aspect_ratio()
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear.color = rgba;
    }

    pub fn swapchain(&self) -> &Swapchain<B> {
        &self.swapchain
    }
}

fn is_degenerate_extent(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<FrameError>(),
        Some(FrameError::DegenerateExtent { .. })
    )
}

impl<B: GpuBackend, S: PresentationSurface> Drop for Renderer<B, S> {
    fn drop(&mut self) {
        // Command buffers go first; the swapchain field drops after this.
        self.backend.wait_idle().ok();
        self.backend.free_command_buffers(&self.command_buffers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SurfaceStatus;
    use crate::mock::{fixture, Call, MockBackend, MockSurface};

    const SIZE: RenderSize = RenderSize::new(800, 600);

    type TestRenderer = Renderer<MockBackend, MockSurface>;

    fn setup() -> (TestRenderer, Rc<MockBackend>, Rc<MockSurface>) {
        let (backend, surface) = fixture(SIZE);
        let renderer = Renderer::new(Rc::clone(&surface), Rc::clone(&backend)).expect("renderer");
        (renderer, backend, surface)
    }

    fn targets_created(backend: &MockBackend) -> usize {
        backend.count(|c| matches!(c, Call::CreateTargets { .. }))
    }

    fn draw_one(renderer: &mut TestRenderer) -> bool {
        match renderer.begin_frame().unwrap() {
            Some(cmd) => {
                renderer.begin_swapchain_render_pass(cmd);
                renderer.end_swapchain_render_pass(cmd);
                renderer.end_frame().unwrap();
                true
            }
            None => false,
        }
    }

    #[test]
    #[should_panic(expected = "already in progress")]
    fn begin_frame_twice_panics() {
        let (mut renderer, _, _) = setup();
        renderer.begin_frame().unwrap();
        let _ = renderer.begin_frame();
    }

    #[test]
    fn end_frame_without_begin_is_an_error() {
        let (mut renderer, backend, _) = setup();
        backend.clear_log();
        let err = renderer.end_frame().unwrap_err();
        assert_eq!(
            err.downcast_ref::<FrameError>(),
            Some(&FrameError::FrameNotInProgress)
        );
        assert!(backend.calls().is_empty());
        assert_eq!(renderer.frame_index(), 0);
    }

    #[test]
    fn frame_index_follows_end_frame_count() {
        let (mut renderer, backend, surface) = setup();
        let mut ended = 0;
        for i in 0..7 {
            if i == 3 {
                surface.resized.set(true);
            }
            if i == 5 {
                backend.script_present([SurfaceStatus::OutOfDate]);
            }
            assert!(draw_one(&mut renderer));
            ended += 1;
            assert_eq!(renderer.frame_index(), ended % MAX_FRAMES_IN_FLIGHT);
        }
        assert_eq!(targets_created(&backend), 3);
    }

    #[test]
    fn acquire_sequence_drives_rebuilds() {
        let (mut renderer, backend, _) = setup();
        backend.script_acquire([
            Acquired::Image { index: 0, suboptimal: false },
            Acquired::Image { index: 1, suboptimal: true },
            Acquired::OutOfDate,
            Acquired::Image { index: 0, suboptimal: false },
        ]);

        assert!(draw_one(&mut renderer));
        assert_eq!(targets_created(&backend), 1);

        // Suboptimal: frame is still drawn, rebuild follows it.
        assert!(draw_one(&mut renderer));
        assert_eq!(targets_created(&backend), 2);

        // Out of date: rebuilt immediately, nothing drawn.
        backend.clear_log();
        assert!(!draw_one(&mut renderer));
        assert_eq!(targets_created(&backend), 1);
        assert_eq!(backend.count(|c| matches!(c, Call::BeginCommands(_))), 0);
        assert!(!renderer.is_frame_in_progress());

        backend.clear_log();
        assert!(draw_one(&mut renderer));
        assert_eq!(targets_created(&backend), 0);
        assert_eq!(backend.count(|c| matches!(c, Call::Present { .. })), 1);
        assert_eq!(renderer.frame_index(), 3 % MAX_FRAMES_IN_FLIGHT);
    }

    #[test]
    fn minimized_window_defers_rebuild_until_extent_is_usable() {
        let (mut renderer, backend, surface) = setup();
        backend.script_acquire([Acquired::OutOfDate]);
        surface.script_sizes([
            RenderSize::new(0, 0),
            RenderSize::new(0, 0),
            RenderSize::new(0, 0),
            SIZE,
        ]);
        backend.clear_log();

        assert!(renderer.begin_frame().unwrap().is_none());

        assert_eq!(surface.waits.get(), 3);
        let calls = backend.calls();
        let last_wait = calls.iter().rposition(|c| *c == Call::WaitEvents);
        let created = calls.iter().position(|c| matches!(c, Call::CreateTargets { .. }));
        assert!(last_wait < created, "{calls:?}");
        assert!(matches!(
            calls[created.unwrap()],
            Call::CreateTargets { extent: SIZE, .. }
        ));
        assert_eq!(renderer.extent(), SIZE);
    }

    #[test]
    fn surface_minimized_during_rebuild_keeps_old_generation() {
        let (mut renderer, backend, _) = setup();
        let old = renderer.swapchain().targets().id;
        backend.script_acquire([Acquired::OutOfDate, Acquired::OutOfDate]);
        backend.degenerate_targets.set(true);

        assert!(renderer.begin_frame().unwrap().is_none());
        assert_eq!(renderer.swapchain().targets().id, old);
        assert!(!backend.calls().contains(&Call::DestroyTargets(old)));

        // Next out-of-date retries and succeeds.
        assert!(renderer.begin_frame().unwrap().is_none());
        assert_ne!(renderer.swapchain().targets().id, old);
        assert!(draw_one(&mut renderer));
    }

    #[test]
    fn present_failure_propagates_and_still_advances_frame() {
        let (mut renderer, backend, _) = setup();
        backend.fail_present.set(true);

        let cmd = renderer.begin_frame().unwrap().unwrap();
        renderer.begin_swapchain_render_pass(cmd);
        renderer.end_swapchain_render_pass(cmd);
        let err = renderer.end_frame().unwrap_err();

        assert!(err.to_string().contains("device lost"), "{err}");
        assert!(err.downcast_ref::<FrameError>().is_none());
        assert_eq!(renderer.frame_index(), 1);
        assert!(!renderer.is_frame_in_progress());
        assert_eq!(targets_created(&backend), 1);
    }

    #[test]
    fn failed_rebuild_leaves_old_generation_usable() {
        let (mut renderer, backend, _) = setup();
        let old = renderer.swapchain().targets().id;
        backend.script_acquire([Acquired::OutOfDate]);
        backend.fail_targets.set(true);

        let err = renderer.begin_frame().unwrap_err();
        assert!(err.to_string().contains("swapchain creation failed"), "{err}");
        assert!(!renderer.is_frame_in_progress());
        assert_eq!(renderer.swapchain().targets().id, old);
        assert!(!backend.calls().contains(&Call::DestroyTargets(old)));

        backend.clear_log();
        assert!(draw_one(&mut renderer));
        assert!(backend
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Present { targets, .. } if *targets == old)));
    }

    #[test]
    fn rebuild_waits_idle_then_replaces_generation() {
        let (mut renderer, backend, surface) = setup();
        let old = renderer.swapchain().targets().id;
        surface.script_sizes([RenderSize::new(1280, 720)]);
        surface.resized.set(true);
        backend.clear_log();

        assert!(draw_one(&mut renderer));

        let calls = backend.calls();
        let present = calls.iter().position(|c| matches!(c, Call::Present { .. }));
        let idle = calls.iter().position(|c| *c == Call::WaitIdle);
        let created = calls.iter().position(|c| {
            matches!(c, Call::CreateTargets { previous: Some(p), .. } if *p == old)
        });
        let destroyed = calls.iter().position(|c| *c == Call::DestroyTargets(old));
        assert!(present < idle && idle < created && created < destroyed, "{calls:?}");

        assert!(!surface.resized.get());
        assert_eq!(renderer.extent(), RenderSize::new(1280, 720));
        assert!(renderer.swapchain().attachment_counts().is_consistent());
    }

    #[test]
    fn command_buffers_survive_rebuilds() {
        let (mut renderer, backend, _) = setup();
        let first = renderer.begin_frame().unwrap().unwrap();
        renderer.end_frame().unwrap();
        let second = renderer.begin_frame().unwrap().unwrap();
        renderer.end_frame().unwrap();
        assert_ne!(first, second);

        backend.script_acquire([Acquired::OutOfDate]);
        assert!(renderer.begin_frame().unwrap().is_none());
        backend.script_present([SurfaceStatus::Suboptimal]);
        assert!(draw_one(&mut renderer));

        assert_eq!(
            backend.count(|c| matches!(c, Call::AllocateCommandBuffers(_))),
            1
        );
        assert!(backend
            .calls()
            .contains(&Call::AllocateCommandBuffers(MAX_FRAMES_IN_FLIGHT)));
        assert_eq!(renderer.begin_frame().unwrap(), Some(second));
    }

    #[test]
    fn render_pass_targets_the_acquired_image() {
        let (mut renderer, backend, _) = setup();
        backend.script_acquire([Acquired::Image { index: 2, suboptimal: false }]);
        let cmd = renderer.begin_frame().unwrap().unwrap();
        assert_eq!(renderer.current_command_buffer(), cmd);
        renderer.begin_swapchain_render_pass(cmd);

        let targets = renderer.swapchain().targets().id;
        assert!(backend.calls().contains(&Call::BeginRenderPass {
            cmd,
            targets,
            image_index: 2
        }));
        assert_eq!(renderer.swapchain_render_pass(), targets);
    }

    #[test]
    #[should_panic(expected = "different frame")]
    fn render_pass_with_foreign_command_buffer_panics() {
        let (mut renderer, _, _) = setup();
        let cmd = renderer.begin_frame().unwrap().unwrap();
        renderer.begin_swapchain_render_pass(cmd + 100);
    }

    #[test]
    #[should_panic(expected = "outside a frame")]
    fn render_pass_outside_frame_panics() {
        let (renderer, _, _) = setup();
        renderer.end_swapchain_render_pass(1);
    }

    #[test]
    fn closing_while_minimized_skips_rebuild() {
        let (mut renderer, backend, surface) = setup();
        backend.script_acquire([Acquired::OutOfDate]);
        surface.script_sizes([RenderSize::new(0, 0)]);
        surface.closing.set(true);
        backend.clear_log();

        assert!(renderer.begin_frame().unwrap().is_none());
        assert_eq!(targets_created(&backend), 0);
        assert_eq!(surface.waits.get(), 0);
    }

    #[test]
    fn new_fails_when_surface_closes_first() {
        let (backend, surface) = fixture(RenderSize::new(0, 0));
        surface.closing.set(true);
        let err = Renderer::new(surface, Rc::clone(&backend)).err().expect("closed");
        assert_eq!(err.downcast_ref::<FrameError>(), Some(&FrameError::SurfaceClosed));
        assert_eq!(targets_created(&backend), 0);
    }

    #[test]
    fn drop_frees_command_buffers_before_swapchain() {
        let (renderer, backend, _) = setup();
        let id = renderer.swapchain().targets().id;
        backend.clear_log();
        drop(renderer);

        let calls = backend.calls();
        let freed = calls
            .iter()
            .position(|c| matches!(c, Call::FreeCommandBuffers(b) if b.len() == MAX_FRAMES_IN_FLIGHT));
        let destroyed = calls.iter().position(|c| *c == Call::DestroyTargets(id));
        assert_eq!(calls.first(), Some(&Call::WaitIdle));
        assert!(freed.is_some() && freed < destroyed, "{calls:?}");
    }

    #[test]
    fn clear_color_is_configurable() {
        let (mut renderer, _, _) = setup();
        renderer.set_clear_color([0.02, 0.02, 0.04, 1.0]);
        assert_eq!(renderer.clear.color, [0.02, 0.02, 0.04, 1.0]);
        assert_eq!(renderer.clear.depth, 1.0);
        assert!((renderer.aspect_ratio() - 800.0 / 600.0).abs() < f32::EPSILON);
    }
}
