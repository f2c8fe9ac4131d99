// SPDX-License-Identifier: CEPL-1.0
use thiserror::Error;

use crate::backend::AttachmentCounts;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("swapchain extent {width}x{height} is degenerate")]
    DegenerateExtent { width: u32, height: u32 },
    #[error("swapchain attachments are inconsistent: {0:?}")]
    InconsistentAttachments(AttachmentCounts),
    #[error("swapchain image or depth format has changed ({previous} -> {next})")]
    IncompatibleFormats { previous: String, next: String },
    #[error("frame slot {frame} already holds acquired image {image_index}")]
    ImageAlreadyAcquired { frame: usize, image_index: u32 },
    #[error("frame slot {frame} has not acquired image {image_index}")]
    NoImageAcquired { frame: usize, image_index: u32 },
    #[error("image index {index} is out of range for {count} swapchain images")]
    ImageIndexOutOfRange { index: u32, count: usize },
    #[error("end_frame called while no frame is in progress")]
    FrameNotInProgress,
    #[error("surface closed before it reported a presentable extent")]
    SurfaceClosed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("drawable ids exhausted after {0} allocations")]
    IdsExhausted(u32),
}
