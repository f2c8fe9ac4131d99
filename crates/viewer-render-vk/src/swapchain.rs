// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Context, Result};
use ash::vk;
use tracing::info;
use viewer_render::{AttachmentCounts, FrameError, PresentTargets, RenderSize, MAX_FRAMES_IN_FLIGHT};

use crate::device::{PresentModePreference, VkDevice};

pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Probed in order; the first with optimal-tiling depth attachment support wins.
pub const DEPTH_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == PREFERRED_SURFACE_FORMAT.format
                && f.color_space == PREFERRED_SURFACE_FORMAT.color_space
        })
        .or_else(|| formats.first().copied())
        .ok_or_else(|| anyhow!("surface reports no formats"))
}

pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preference: PresentModePreference,
) -> Result<vk::PresentModeKHR> {
    preference
        .candidates()
        .into_iter()
        .find(|m| modes.contains(m))
        .ok_or_else(|| anyhow!("surface supports neither MAILBOX nor FIFO ({modes:?})"))
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One image more than frames in flight, within the surface limits (max 0 = unbounded).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = (MAX_FRAMES_IN_FLIGHT as u32 + 1).max(caps.min_image_count);
    if caps.max_image_count == 0 {
        want
    } else {
        want.min(caps.max_image_count)
    }
}

fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::DEPTH,
    }
}

/// Presentation resources of one generation. Created and destroyed through the
/// `GpuBackend` impl on [`VkDevice`]; every vector is indexed by image.
#[derive(Debug)]
pub struct SwapchainTargets {
    pub(crate) swapchain: vk::SwapchainKHR,
    color_format: vk::Format,
    depth_format: vk::Format,
    pub(crate) extent: vk::Extent2D,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    depth_images: Vec<vk::Image>,
    depth_memory: Vec<vk::DeviceMemory>,
    depth_views: Vec<vk::ImageView>,
    render_pass: vk::RenderPass,
    pub(crate) framebuffers: Vec<vk::Framebuffer>,
}

impl PresentTargets for SwapchainTargets {
    type Format = vk::Format;
    type RenderPass = vk::RenderPass;

    fn color_format(&self) -> vk::Format {
        self.color_format
    }

    fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    fn extent(&self) -> RenderSize {
        RenderSize::new(self.extent.width, self.extent.height)
    }

    fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    fn attachment_counts(&self) -> AttachmentCounts {
        AttachmentCounts {
            images: self.images.len(),
            image_views: self.image_views.len(),
            depth_attachments: self.depth_views.len(),
            framebuffers: self.framebuffers.len(),
        }
    }
}

impl VkDevice {
    pub(crate) fn create_swapchain_targets(
        &self,
        want: RenderSize,
        previous: Option<&SwapchainTargets>,
    ) -> Result<SwapchainTargets> {
        let support = self.surface_support()?;
        let surface_format = choose_surface_format(&support.formats)?;
        let present_mode = choose_present_mode(&support.present_modes, self.present_mode)?;
        let extent = choose_extent(&support.capabilities, want);
        if extent.width == 0 || extent.height == 0 {
            return Err(FrameError::DegenerateExtent {
                width: extent.width,
                height: extent.height,
            }
            .into());
        }
        let depth_format = self.find_supported_format(
            &DEPTH_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )?;

        let mut targets = SwapchainTargets {
            swapchain: vk::SwapchainKHR::null(),
            color_format: surface_format.format,
            depth_format,
            extent,
            images: Vec::new(),
            image_views: Vec::new(),
            depth_images: Vec::new(),
            depth_memory: Vec::new(),
            depth_views: Vec::new(),
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
        };
        let old = previous.map_or(vk::SwapchainKHR::null(), |p| p.swapchain);
        let built = self.build_targets(
            &mut targets,
            &support.capabilities,
            surface_format,
            present_mode,
            old,
        );
        if let Err(e) = built {
            self.destroy_swapchain_targets(&mut targets);
            return Err(e);
        }

        info!(
            "vk swapchain: {:?}/{:?}, present_mode {:?}, depth {:?}, extent {}x{}, images(min={} → {})",
            surface_format.format,
            surface_format.color_space,
            present_mode,
            depth_format,
            extent.width,
            extent.height,
            support.capabilities.min_image_count,
            targets.images.len()
        );
        Ok(targets)
    }

    fn build_targets(
        &self,
        t: &mut SwapchainTargets,
        caps: &vk::SurfaceCapabilitiesKHR,
        surface_format: vk::SurfaceFormatKHR,
        present_mode: vk::PresentModeKHR,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<()> {
        let d = self.device();
        let pre_transform = if caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            caps.current_transform
        };

        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: self.surface(),
            min_image_count: choose_image_count(caps),
            image_format: surface_format.format,
            image_color_space: surface_format.color_space,
            image_extent: t.extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: vk::TRUE,
            old_swapchain,
            ..Default::default()
        };

        // SAFETY: every handle created here is recorded in `t` right away, so the
        // caller's cleanup sees it if a later step fails.
        unsafe {
            t.swapchain = self
                .swapchain_loader
                .create_swapchain(&swap_info, None)
                .context("create_swapchain")?;
            t.images = self
                .swapchain_loader
                .get_swapchain_images(t.swapchain)
                .context("get_swapchain_images")?;

            for &image in &t.images {
                let view = self.create_view(image, t.color_format, vk::ImageAspectFlags::COLOR)?;
                t.image_views.push(view);
            }

            for _ in 0..t.images.len() {
                let info = vk::ImageCreateInfo {
                    s_type: vk::StructureType::IMAGE_CREATE_INFO,
                    image_type: vk::ImageType::TYPE_2D,
                    format: t.depth_format,
                    extent: vk::Extent3D {
                        width: t.extent.width,
                        height: t.extent.height,
                        depth: 1,
                    },
                    mip_levels: 1,
                    array_layers: 1,
                    samples: vk::SampleCountFlags::TYPE_1,
                    tiling: vk::ImageTiling::OPTIMAL,
                    usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                    sharing_mode: vk::SharingMode::EXCLUSIVE,
                    initial_layout: vk::ImageLayout::UNDEFINED,
                    ..Default::default()
                };
                let (image, memory) =
                    self.create_image_with_info(&info, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;
                t.depth_images.push(image);
                t.depth_memory.push(memory);
                let view = self.create_view(image, t.depth_format, depth_aspect(t.depth_format))?;
                t.depth_views.push(view);
            }

            t.render_pass = self.create_render_pass(t.color_format, t.depth_format)?;

            for (&color, &depth) in t.image_views.iter().zip(&t.depth_views) {
                let attachments = [color, depth];
                let fb_info = vk::FramebufferCreateInfo {
                    s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                    render_pass: t.render_pass,
                    attachment_count: attachments.len() as u32,
                    p_attachments: attachments.as_ptr(),
                    width: t.extent.width,
                    height: t.extent.height,
                    layers: 1,
                    ..Default::default()
                };
                t.framebuffers
                    .push(d.create_framebuffer(&fb_info, None).context("create_framebuffer")?);
            }
        }
        Ok(())
    }

    fn create_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect_mask: vk::ImageAspectFlags,
    ) -> Result<vk::ImageView> {
        let info = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        // SAFETY: `image` is alive and owned by the targets being built.
        unsafe { self.device().create_image_view(&info, None) }.context("create_image_view")
    }

    /// Color: clear/store, ends in PRESENT_SRC. Depth: clear/don't-care.
    fn create_render_pass(&self, color: vk::Format, depth: vk::Format) -> Result<vk::RenderPass> {
        let attachments = [
            vk::AttachmentDescription {
                format: color,
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::STORE,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
                ..Default::default()
            },
            vk::AttachmentDescription {
                format: depth,
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::DONT_CARE,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                ..Default::default()
            },
        ];
        let color_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &color_ref,
            p_depth_stencil_attachment: &depth_ref,
            ..Default::default()
        };
        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        let dependency = vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: stages,
            src_access_mask: vk::AccessFlags::empty(),
            dst_stage_mask: stages,
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ..Default::default()
        };
        let info = vk::RenderPassCreateInfo {
            s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
            attachment_count: attachments.len() as u32,
            p_attachments: attachments.as_ptr(),
            subpass_count: 1,
            p_subpasses: &subpass,
            dependency_count: 1,
            p_dependencies: &dependency,
            ..Default::default()
        };
        // SAFETY: pointers in `info` refer to the locals above.
        unsafe { self.device().create_render_pass(&info, None) }.context("create_render_pass")
    }

    // STRICT TEARDOWN ORDER: framebuffers -> render pass -> depth views/images/memory
    // -> color views -> swapchain (owns the color images). Null handles are no-ops.
    pub(crate) fn destroy_swapchain_targets(&self, t: &mut SwapchainTargets) {
        let d = self.device();
        unsafe {
            for fb in t.framebuffers.drain(..) {
                d.destroy_framebuffer(fb, None);
            }
            d.destroy_render_pass(t.render_pass, None);
            t.render_pass = vk::RenderPass::null();
            for view in t.depth_views.drain(..) {
                d.destroy_image_view(view, None);
            }
            for image in t.depth_images.drain(..) {
                d.destroy_image(image, None);
            }
            for memory in t.depth_memory.drain(..) {
                d.free_memory(memory, None);
            }
            for view in t.image_views.drain(..) {
                d.destroy_image_view(view, None);
            }
            t.images.clear();
            self.swapchain_loader.destroy_swapchain(t.swapchain, None);
            t.swapchain = vk::SwapchainKHR::null();
        }
    }
}
