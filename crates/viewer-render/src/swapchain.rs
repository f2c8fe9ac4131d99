// SPDX-License-Identifier: CEPL-1.0
use std::rc::Rc;

use anyhow::Result;
use tracing::{debug, info};

use crate::backend::{Acquired, AttachmentCounts, GpuBackend, PresentTargets, SurfaceStatus, SyncSet};
use crate::error::FrameError;
use crate::{RenderSize, MAX_FRAMES_IN_FLIGHT};

type Format<B> = <<B as GpuBackend>::Targets as PresentTargets>::Format;

/// One swapchain generation: the backend's presentation targets plus the
/// `MAX_FRAMES_IN_FLIGHT` synchronization sets and the image-to-fence table.
///
/// A generation is never resized in place. When the surface changes, the
/// renderer builds a successor (borrowing this one) and drops this one.
pub struct Swapchain<B: GpuBackend> {
    backend: Rc<B>,
    targets: B::Targets,
    frames: Vec<SyncSet<B>>,
    /// Fence of the frame slot that last submitted work for each image.
    images_in_flight: Vec<Option<B::Fence>>,
    /// Image acquired by each frame slot and not yet submitted.
    acquired: [Option<u32>; MAX_FRAMES_IN_FLIGHT],
}

impl<B: GpuBackend> Swapchain<B> {
    pub fn new(backend: Rc<B>, extent: RenderSize, previous: Option<&Self>) -> Result<Self> {
        if extent.is_degenerate() {
            return Err(FrameError::DegenerateExtent {
                width: extent.width,
                height: extent.height,
            }
            .into());
        }

        let targets = backend.create_targets(extent, previous.map(|p| &p.targets))?;
        let image_count = targets.attachment_counts().images;

        // From here on Drop releases whatever has been created.
        let mut swapchain = Self {
            backend,
            targets,
            frames: Vec::with_capacity(MAX_FRAMES_IN_FLIGHT),
            images_in_flight: vec![None; image_count],
            acquired: [None; MAX_FRAMES_IN_FLIGHT],
        };

        let counts = swapchain.targets.attachment_counts();
        if !counts.is_consistent() {
            return Err(FrameError::InconsistentAttachments(counts).into());
        }
        if let Some(previous) = previous {
            if !previous.compare_formats(&swapchain) {
                return Err(FrameError::IncompatibleFormats {
                    previous: format_pair::<B>(previous.color_format(), previous.depth_format()),
                    next: format_pair::<B>(swapchain.color_format(), swapchain.depth_format()),
                }
                .into());
            }
        }

        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            let sync = swapchain.backend.create_frame_sync()?;
            swapchain.frames.push(sync);
        }

        info!(
            "swapchain ready: {} ({} images, color {:?}, depth {:?})",
            swapchain.extent(),
            image_count,
            swapchain.color_format(),
            swapchain.depth_format()
        );
        Ok(swapchain)
    }

    /// Waits for `frame`'s fence, then acquires the next image signalling the
    /// slot's image-available semaphore.
    ///
    /// Acquiring twice for the same slot without submitting in between is an
    /// error: the second call would wait on a fence nobody is going to signal
    /// with the first image still held.
    pub fn acquire_next_image(&mut self, frame: usize) -> Result<Acquired> {
        if let Some(image_index) = self.acquired[frame] {
            return Err(FrameError::ImageAlreadyAcquired { frame, image_index }.into());
        }
        let sync = self.frames[frame];
        self.backend.wait_for_fence(sync.in_flight)?;

        let acquired = self.backend.acquire_image(&self.targets, sync.image_available)?;
        if let Acquired::Image { index, suboptimal } = acquired {
            if index as usize >= self.images_in_flight.len() {
                return Err(FrameError::ImageIndexOutOfRange {
                    index,
                    count: self.images_in_flight.len(),
                }
                .into());
            }
            if suboptimal {
                debug!("acquired image {index} from a suboptimal swapchain");
            }
            self.acquired[frame] = Some(index);
        }
        Ok(acquired)
    }

    /// Submits `cmd` for the image acquired by `frame` and presents it.
    /// Frame-slot cadence is left to the caller.
    pub fn submit_and_present(
        &mut self,
        cmd: B::CommandBuffer,
        image_index: u32,
        frame: usize,
    ) -> Result<SurfaceStatus> {
        if self.acquired[frame] != Some(image_index) {
            return Err(FrameError::NoImageAcquired { frame, image_index }.into());
        }
        let sync = self.frames[frame];
        let slot = image_index as usize;

        // The image may still be in use by the other frame slot.
        if let Some(fence) = self.images_in_flight[slot] {
            if fence != sync.in_flight {
                self.backend.wait_for_fence(fence)?;
            }
        }
        self.images_in_flight[slot] = Some(sync.in_flight);
        self.acquired[frame] = None;

        self.backend.reset_fence(sync.in_flight)?;
        self.backend
            .submit(cmd, sync.image_available, sync.render_finished, sync.in_flight)?;
        self.backend
            .present(&self.targets, image_index, sync.render_finished)
    }

    /// True when `other` can be rendered with pipelines built for `self`.
    pub fn compare_formats(&self, other: &Self) -> bool {
        self.color_format() == other.color_format() && self.depth_format() == other.depth_format()
    }

    pub fn extent(&self) -> RenderSize {
        self.targets.extent()
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.extent().aspect_ratio()
    }

    pub fn image_count(&self) -> usize {
        self.images_in_flight.len()
    }

    pub fn color_format(&self) -> Format<B> {
        self.targets.color_format()
    }

    pub fn depth_format(&self) -> Format<B> {
        self.targets.depth_format()
    }

    pub fn render_pass(&self) -> <B::Targets as PresentTargets>::RenderPass {
        self.targets.render_pass()
    }

    pub fn attachment_counts(&self) -> AttachmentCounts {
        self.targets.attachment_counts()
    }

    pub fn targets(&self) -> &B::Targets {
        &self.targets
    }

    pub fn frame_sync(&self, frame: usize) -> &SyncSet<B> {
        &self.frames[frame]
    }

    pub fn images_in_flight(&self) -> &[Option<B::Fence>] {
        &self.images_in_flight
    }
}

fn format_pair<B: GpuBackend>(color: Format<B>, depth: Format<B>) -> String {
    format!("color {color:?}, depth {depth:?}")
}

impl<B: GpuBackend> Drop for Swapchain<B> {
    fn drop(&mut self) {
        self.backend.wait_idle().ok();
        for sync in self.frames.drain(..) {
            self.backend.destroy_frame_sync(&sync);
        }
        self.backend.destroy_targets(&mut self.targets);
    }
}
