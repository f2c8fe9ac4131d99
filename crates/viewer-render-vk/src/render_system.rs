// SPDX-License-Identifier: CEPL-1.0
use std::rc::Rc;

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use viewer_math::{Camera, Mat4};
use viewer_render::{Drawable, DrawableCollection};

use crate::device::VkDevice;
use crate::model::Model;
use crate::pipeline::{Pipeline, PipelineConfig, ShaderSource};

/// Per-draw data; layout matches the `Push` block in simple_shader.vert.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct PushConstants {
    pub transform: [[f32; 4]; 4],
    pub color: [f32; 4],
}

impl PushConstants {
    pub fn for_drawable(projection_view: Mat4, drawable: &Drawable<Model>) -> Self {
        Self {
            transform: (projection_view * drawable.transform.matrix()).to_cols_array_2d(),
            color: drawable.color.extend(1.0).to_array(),
        }
    }
}

const PUSH_STAGES: vk::ShaderStageFlags =
    vk::ShaderStageFlags::from_raw(vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw());

/// Owned pipeline layout, destroyed on drop.
struct PipelineLayout {
    device: Rc<VkDevice>,
    raw: vk::PipelineLayout,
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe { self.device.device().destroy_pipeline_layout(self.raw, None) };
    }
}

/// Draws every drawable with one pipeline and a push-constant transform.
pub struct SimpleRenderSystem {
    device: Rc<VkDevice>,
    // Declared before `layout` so the pipeline is destroyed first.
    pipeline: Pipeline,
    layout: PipelineLayout,
}

impl SimpleRenderSystem {
    pub fn new(device: Rc<VkDevice>, render_pass: vk::RenderPass, shaders: &ShaderSource) -> Result<Self> {
        let range = vk::PushConstantRange {
            stage_flags: PUSH_STAGES,
            offset: 0,
            size: std::mem::size_of::<PushConstants>() as u32,
        };
        let layout_info = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            push_constant_range_count: 1,
            p_push_constant_ranges: &range,
            ..Default::default()
        };
        let raw = unsafe { device.device().create_pipeline_layout(&layout_info, None) }
            .context("create_pipeline_layout")?;
        let layout = PipelineLayout {
            device: Rc::clone(&device),
            raw,
        };

        let config = PipelineConfig::new(render_pass, layout.raw);
        let pipeline = Pipeline::new(Rc::clone(&device), shaders, &config)?;
        Ok(Self {
            device,
            pipeline,
            layout,
        })
    }

    pub fn render_drawables(&self, cmd: vk::CommandBuffer, drawables: &DrawableCollection<Model>, camera: &Camera) {
        self.pipeline.bind(cmd);

        let projection_view = camera.projection_view();
        let d = self.device.device();
        for drawable in drawables.iter() {
            let push = PushConstants::for_drawable(projection_view, drawable);
            unsafe {
                d.cmd_push_constants(cmd, self.layout.raw, PUSH_STAGES, 0, bytemuck::bytes_of(&push));
            }
            drawable.mesh.bind(cmd);
            drawable.mesh.draw(cmd);
        }
    }
}
