// SPDX-License-Identifier: CEPL-1.0
use std::fmt::Debug;

use anyhow::Result;

use crate::RenderSize;

/// Result of presenting (or of the surface state seen while acquiring).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceStatus {
    Optimal,
    /// Still presentable, but the generation should be rebuilt after this frame.
    Suboptimal,
    /// The generation can no longer present. Rebuild before the next frame.
    OutOfDate,
}

impl SurfaceStatus {
    pub fn needs_rebuild(self) -> bool {
        !matches!(self, SurfaceStatus::Optimal)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquired {
    Image { index: u32, suboptimal: bool },
    OutOfDate,
}

/// Per-generation attachment counts; every entry must match the image count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentCounts {
    pub images: usize,
    pub image_views: usize,
    pub depth_attachments: usize,
    pub framebuffers: usize,
}

impl AttachmentCounts {
    pub const fn uniform(n: usize) -> Self {
        Self {
            images: n,
            image_views: n,
            depth_attachments: n,
            framebuffers: n,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.images == self.image_views
            && self.images == self.depth_attachments
            && self.images == self.framebuffers
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClearValues {
    pub color: [f32; 4],
    pub depth: f32,
    pub stencil: u32,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: [0.01, 0.1, 0.1, 1.0],
            depth: 1.0,
            stencil: 0,
        }
    }
}

/// One frame slot's synchronization set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSync<S, F> {
    pub image_available: S,
    pub render_finished: S,
    pub in_flight: F,
}

pub type SyncSet<B> = FrameSync<<B as GpuBackend>::Semaphore, <B as GpuBackend>::Fence>;

/// Presentation resources of one swapchain generation: images, views, depth
/// attachments, render pass and framebuffers.
pub trait PresentTargets {
    type Format: Copy + PartialEq + Debug;
    type RenderPass: Copy + Debug;

    fn color_format(&self) -> Self::Format;
    fn depth_format(&self) -> Self::Format;
    fn extent(&self) -> RenderSize;
    fn render_pass(&self) -> Self::RenderPass;
    fn attachment_counts(&self) -> AttachmentCounts;
}

/// The GPU operations the frame lifecycle needs. Implemented by the Vulkan
/// device; tests substitute a recording mock.
///
/// Fence waits and image acquisition block without a timeout. A hung GPU is not
/// recoverable here.
pub trait GpuBackend {
    type CommandBuffer: Copy + PartialEq + Debug;
    type Semaphore: Copy + Debug;
    type Fence: Copy + PartialEq + Debug;
    type Targets: PresentTargets;

    fn wait_idle(&self) -> Result<()>;

    fn allocate_command_buffers(&self, count: usize) -> Result<Vec<Self::CommandBuffer>>;
    fn free_command_buffers(&self, buffers: &[Self::CommandBuffer]);
    fn begin_commands(&self, cmd: Self::CommandBuffer) -> Result<()>;
    fn end_commands(&self, cmd: Self::CommandBuffer) -> Result<()>;

    /// Begins the generation's render pass on `image_index`'s framebuffer and sets
    /// viewport and scissor to the full extent.
    fn begin_render_pass(
        &self,
        cmd: Self::CommandBuffer,
        targets: &Self::Targets,
        image_index: u32,
        clear: &ClearValues,
    );
    fn end_render_pass(&self, cmd: Self::CommandBuffer);

    /// `previous` is only borrowed for resource reuse; it stays owned by the caller.
    fn create_targets(
        &self,
        extent: RenderSize,
        previous: Option<&Self::Targets>,
    ) -> Result<Self::Targets>;
    fn destroy_targets(&self, targets: &mut Self::Targets);

    /// Fence starts signaled so the first wait on a fresh slot returns at once.
    fn create_frame_sync(&self) -> Result<SyncSet<Self>>;
    fn destroy_frame_sync(&self, sync: &SyncSet<Self>);

    fn wait_for_fence(&self, fence: Self::Fence) -> Result<()>;
    fn reset_fence(&self, fence: Self::Fence) -> Result<()>;

    fn acquire_image(&self, targets: &Self::Targets, signal: Self::Semaphore) -> Result<Acquired>;

    /// Waits on `wait` at the color-attachment-output stage.
    fn submit(
        &self,
        cmd: Self::CommandBuffer,
        wait: Self::Semaphore,
        signal: Self::Semaphore,
        fence: Self::Fence,
    ) -> Result<()>;
    fn present(
        &self,
        targets: &Self::Targets,
        image_index: u32,
        wait: Self::Semaphore,
    ) -> Result<SurfaceStatus>;
}
