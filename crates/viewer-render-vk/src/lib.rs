// SPDX-License-Identifier: CEPL-1.0
//! Vulkan implementation of the viewer's [`viewer_render::GpuBackend`], plus the
//! mesh upload and the single pipeline the viewer draws with.
#![deny(unsafe_op_in_unsafe_fn)]

mod backend;
mod device;
mod model;
mod pipeline;
mod render_system;
mod swapchain;

pub use device::{DeviceConfig, PresentModePreference, VkDevice};
pub use model::{Model, ModelBuilder, Vertex};
pub use pipeline::{Pipeline, PipelineConfig, ShaderSource};
pub use render_system::{PushConstants, SimpleRenderSystem};
pub use swapchain::SwapchainTargets;

pub use ash::vk;
