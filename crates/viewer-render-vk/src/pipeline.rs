// SPDX-License-Identifier: CEPL-1.0
use std::io::Cursor;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use ash::util::read_spv;
use ash::vk;
use tracing::info;

use crate::device::VkDevice;
use crate::model::Vertex;

pub const VERT_SPV: &str = "simple_shader.vert.spv";
pub const FRAG_SPV: &str = "simple_shader.frag.spv";

static EMBEDDED_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/simple_shader.vert.spv"));
static EMBEDDED_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/simple_shader.frag.spv"));

/// Where the vertex/fragment SPIR-V pair comes from.
#[derive(Clone, Debug, Default)]
pub enum ShaderSource {
    /// Compiled by build.rs and linked into the binary.
    #[default]
    Embedded,
    /// `simple_shader.vert.spv` and `simple_shader.frag.spv` in this directory.
    Directory(PathBuf),
}

impl ShaderSource {
    /// Returns (vertex, fragment) SPIR-V words.
    pub fn load(&self) -> Result<(Vec<u32>, Vec<u32>)> {
        match self {
            ShaderSource::Embedded => Ok((
                read_spv(&mut Cursor::new(EMBEDDED_VERT)).context("embedded vertex shader")?,
                read_spv(&mut Cursor::new(EMBEDDED_FRAG)).context("embedded fragment shader")?,
            )),
            ShaderSource::Directory(dir) => {
                let read = |name: &str| -> Result<Vec<u32>> {
                    let path = dir.join(name);
                    let bytes = std::fs::read(&path)
                        .with_context(|| format!("reading shader {}", path.display()))?;
                    read_spv(&mut Cursor::new(&bytes[..]))
                        .with_context(|| format!("parsing SPIR-V {}", path.display()))
                };
                Ok((read(VERT_SPV)?, read(FRAG_SPV)?))
            }
        }
    }
}

/// Fixed-function state for a pipeline targeting one render pass.
#[derive(Clone, Copy, Debug)]
pub struct PipelineConfig {
    pub render_pass: vk::RenderPass,
    pub layout: vk::PipelineLayout,
    pub subpass: u32,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_compare: vk::CompareOp,
}

impl PipelineConfig {
    pub fn new(render_pass: vk::RenderPass, layout: vk::PipelineLayout) -> Self {
        Self {
            render_pass,
            layout,
            subpass: 0,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            depth_compare: vk::CompareOp::LESS,
        }
    }
}

pub struct Pipeline {
    device: Rc<VkDevice>,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    pub fn new(device: Rc<VkDevice>, shaders: &ShaderSource, config: &PipelineConfig) -> Result<Self> {
        let (vs_code, fs_code) = shaders.load()?;
        let d = device.device();

        let vs = create_module(d, &vs_code)?;
        let fs = match create_module(d, &fs_code) {
            Ok(fs) => fs,
            Err(e) => {
                unsafe { d.destroy_shader_module(vs, None) };
                return Err(e);
            }
        };
        let pipeline = build(d, vs, fs, config);
        unsafe {
            d.destroy_shader_module(vs, None);
            d.destroy_shader_module(fs, None);
        }
        let pipeline = pipeline?;
        info!("graphics pipeline ready ({shaders:?})");
        Ok(Self { device, pipeline })
    }

    pub fn bind(&self, cmd: vk::CommandBuffer) {
        unsafe {
            self.device
                .device()
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline)
        };
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe { self.device.device().destroy_pipeline(self.pipeline, None) };
    }
}

fn create_module(d: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule> {
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: code.as_ptr(),
        code_size: std::mem::size_of_val(code),
        ..Default::default()
    };
    unsafe { d.create_shader_module(&ci, None) }.context("create_shader_module")
}

fn build(
    d: &ash::Device,
    vs: vk::ShaderModule,
    fs: vk::ShaderModule,
    config: &PipelineConfig,
) -> Result<vk::Pipeline> {
    let entry = c"main";
    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: vs,
            p_name: entry.as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fs,
            p_name: entry.as_ptr(),
            ..Default::default()
        },
    ];

    let bindings = Vertex::binding_descriptions();
    let attributes = Vertex::attribute_descriptions();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        vertex_binding_description_count: bindings.len() as u32,
        p_vertex_binding_descriptions: bindings.as_ptr(),
        vertex_attribute_description_count: attributes.len() as u32,
        p_vertex_attribute_descriptions: attributes.as_ptr(),
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        ..Default::default()
    };
    // Viewport and scissor come from the render pass begin, per extent.
    let dyn_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
        dynamic_state_count: dyn_states.len() as u32,
        p_dynamic_states: dyn_states.as_ptr(),
        ..Default::default()
    };
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        scissor_count: 1,
        ..Default::default()
    };
    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: config.cull_mode,
        front_face: config.front_face,
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        ..Default::default()
    };
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
        depth_test_enable: vk::TRUE,
        depth_write_enable: vk::TRUE,
        depth_compare_op: config.depth_compare,
        max_depth_bounds: 1.0,
        ..Default::default()
    };
    let color_blend_att = vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::RGBA,
        blend_enable: vk::FALSE,
        ..Default::default()
    };
    let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_blend_att,
        ..Default::default()
    };

    let info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_depth_stencil_state: &depth_stencil,
        p_color_blend_state: &color_blend,
        p_dynamic_state: &dynamic_state,
        layout: config.layout,
        render_pass: config.render_pass,
        subpass: config.subpass,
        ..Default::default()
    };

    let pipelines = unsafe {
        d.create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&info), None)
    }
    .map_err(|(_, err)| anyhow!("create_graphics_pipelines failed: {err:?}"))?;
    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("create_graphics_pipelines returned no pipeline"))
}
