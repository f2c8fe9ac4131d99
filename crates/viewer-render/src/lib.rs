// SPDX-License-Identifier: CEPL-1.0
//! Backend-agnostic frame lifecycle: the swapchain generation, the per-frame
//! state machine that drives it, and the drawable collection it renders.
//!
//! GPU work goes through [`GpuBackend`]; the window goes through
//! [`PresentationSurface`]. Neither trait assumes a particular API.
pub mod backend;
pub mod error;
pub mod renderer;
pub mod scene;
pub mod surface;
pub mod swapchain;

#[cfg(test)]
pub(crate) mod mock;

pub use backend::{
    Acquired, AttachmentCounts, ClearValues, FrameSync, GpuBackend, PresentTargets, SurfaceStatus,
    SyncSet,
};
pub use error::{FrameError, SceneError};
pub use renderer::Renderer;
pub use scene::{Drawable, DrawableCollection, DrawableId, IdAllocator};
pub use surface::PresentationSurface;
pub use swapchain::Swapchain;

/// Frame slots cycled by the renderer. Independent of the swapchain image count.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Zero in either dimension, e.g. while the window is minimized.
    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

impl std::fmt::Display for RenderSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
