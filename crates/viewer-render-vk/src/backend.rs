// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Context, Result};
use ash::vk;
use viewer_render::{
    Acquired, ClearValues, FrameSync, GpuBackend, PresentTargets, RenderSize, SurfaceStatus,
    SyncSet,
};

use crate::device::VkDevice;
use crate::swapchain::SwapchainTargets;

impl GpuBackend for VkDevice {
    type CommandBuffer = vk::CommandBuffer;
    type Semaphore = vk::Semaphore;
    type Fence = vk::Fence;
    type Targets = SwapchainTargets;

    fn wait_idle(&self) -> Result<()> {
        unsafe { self.device().device_wait_idle() }.context("device_wait_idle")
    }

    fn allocate_command_buffers(&self, count: usize) -> Result<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.command_pool(),
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count as u32,
            ..Default::default()
        };
        unsafe { self.device().allocate_command_buffers(&info) }
            .context("allocate_command_buffers")
    }

    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        if buffers.is_empty() {
            return;
        }
        unsafe {
            self.device()
                .free_command_buffers(self.command_pool(), buffers)
        };
    }

    // The pool is RESET_COMMAND_BUFFER, so beginning resets the previous recording.
    fn begin_commands(&self, cmd: vk::CommandBuffer) -> Result<()> {
        let info = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            ..Default::default()
        };
        unsafe { self.device().begin_command_buffer(cmd, &info) }.context("begin_command_buffer")
    }

    fn end_commands(&self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe { self.device().end_command_buffer(cmd) }.context("end_command_buffer")
    }

    fn begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        targets: &SwapchainTargets,
        image_index: u32,
        clear: &ClearValues,
    ) {
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear.color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: clear.depth,
                    stencil: clear.stencil,
                },
            },
        ];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: targets.extent,
        };
        let info = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: targets.render_pass(),
            framebuffer: targets.framebuffers[image_index as usize],
            render_area,
            clear_value_count: clear_values.len() as u32,
            p_clear_values: clear_values.as_ptr(),
            ..Default::default()
        };
        // No Y flip: -Y is up in view space and Vulkan's NDC Y points down.
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: targets.extent.width as f32,
            height: targets.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let d = self.device();
        unsafe {
            d.cmd_begin_render_pass(cmd, &info, vk::SubpassContents::INLINE);
            d.cmd_set_viewport(cmd, 0, std::slice::from_ref(&viewport));
            d.cmd_set_scissor(cmd, 0, std::slice::from_ref(&render_area));
        }
    }

    fn end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device().cmd_end_render_pass(cmd) };
    }

    fn create_targets(
        &self,
        extent: RenderSize,
        previous: Option<&SwapchainTargets>,
    ) -> Result<SwapchainTargets> {
        self.create_swapchain_targets(extent, previous)
    }

    fn destroy_targets(&self, targets: &mut SwapchainTargets) {
        self.destroy_swapchain_targets(targets);
    }

    fn create_frame_sync(&self) -> Result<SyncSet<Self>> {
        let d = self.device();
        let sem_ci = vk::SemaphoreCreateInfo::default();
        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        unsafe {
            let image_available = d.create_semaphore(&sem_ci, None)?;
            let render_finished = match d.create_semaphore(&sem_ci, None) {
                Ok(s) => s,
                Err(e) => {
                    d.destroy_semaphore(image_available, None);
                    return Err(e).context("create_semaphore");
                }
            };
            let in_flight = match d.create_fence(&fence_ci, None) {
                Ok(f) => f,
                Err(e) => {
                    d.destroy_semaphore(image_available, None);
                    d.destroy_semaphore(render_finished, None);
                    return Err(e).context("create_fence");
                }
            };
            Ok(FrameSync {
                image_available,
                render_finished,
                in_flight,
            })
        }
    }

    fn destroy_frame_sync(&self, sync: &SyncSet<Self>) {
        let d = self.device();
        unsafe {
            d.destroy_semaphore(sync.image_available, None);
            d.destroy_semaphore(sync.render_finished, None);
            d.destroy_fence(sync.in_flight, None);
        }
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe { self.device().wait_for_fences(&[fence], true, u64::MAX) }
            .context("wait_for_fences")
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe { self.device().reset_fences(&[fence]) }.context("reset_fences")
    }

    fn acquire_image(&self, targets: &SwapchainTargets, signal: vk::Semaphore) -> Result<Acquired> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                targets.swapchain,
                u64::MAX,
                signal,
                vk::Fence::null(),
            )
        };
        match result {
            Ok((index, suboptimal)) => Ok(Acquired::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::OutOfDate),
            Err(e) => Err(anyhow!("acquire_next_image: {e:?}")),
        }
    }

    fn submit(
        &self,
        cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<()> {
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &signal,
            ..Default::default()
        };
        unsafe {
            self.device()
                .queue_submit(self.queue(), std::slice::from_ref(&submit), fence)
        }
        .context("queue_submit")
    }

    fn present(
        &self,
        targets: &SwapchainTargets,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<SurfaceStatus> {
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &targets.swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        match unsafe { self.swapchain_loader.queue_present(self.queue(), &present) } {
            Ok(false) => Ok(SurfaceStatus::Optimal),
            Ok(true) => Ok(SurfaceStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SurfaceStatus::OutOfDate),
            Err(e) => Err(anyhow!("queue_present: {e:?}")),
        }
    }
}
