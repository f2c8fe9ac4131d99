// SPDX-License-Identifier: CEPL-1.0
use std::rc::Rc;

use anyhow::{bail, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use tracing::debug;

use crate::device::VkDevice;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    pub fn binding_descriptions() -> [vk::VertexInputBindingDescription; 1] {
        [vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, color) as u32,
            },
        ]
    }
}

/// CPU-side mesh data. Empty `indices` means non-indexed drawing.
#[derive(Clone, Debug, Default)]
pub struct ModelBuilder {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl ModelBuilder {
    /// Unit cube centred on `offset`, one flat color per face.
    pub fn cube(offset: [f32; 3]) -> Self {
        // (color, four corners); corners 0-1 and 2-3 are diagonals of the face.
        const FACES: [([f32; 3], [[f32; 3]; 4]); 6] = [
            // left
            ([0.9, 0.9, 0.9], [[-0.5, -0.5, -0.5], [-0.5, 0.5, 0.5], [-0.5, -0.5, 0.5], [-0.5, 0.5, -0.5]]),
            // right
            ([0.8, 0.8, 0.1], [[0.5, -0.5, -0.5], [0.5, 0.5, 0.5], [0.5, -0.5, 0.5], [0.5, 0.5, -0.5]]),
            // top (-Y)
            ([0.9, 0.6, 0.1], [[-0.5, -0.5, -0.5], [0.5, -0.5, 0.5], [-0.5, -0.5, 0.5], [0.5, -0.5, -0.5]]),
            // bottom
            ([0.8, 0.1, 0.1], [[-0.5, 0.5, -0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5], [0.5, 0.5, -0.5]]),
            // front (+Z)
            ([0.1, 0.1, 0.8], [[-0.5, -0.5, 0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5], [0.5, -0.5, 0.5]]),
            // back
            ([0.1, 0.8, 0.1], [[-0.5, -0.5, -0.5], [0.5, 0.5, -0.5], [-0.5, 0.5, -0.5], [0.5, -0.5, -0.5]]),
        ];

        let mut builder = Self::default();
        for (face, (color, corners)) in FACES.iter().enumerate() {
            for c in corners {
                builder.vertices.push(Vertex {
                    position: [c[0] + offset[0], c[1] + offset[1], c[2] + offset[2]],
                    color: *color,
                });
            }
            let base = (face * 4) as u32;
            builder
                .indices
                .extend([0, 1, 2, 0, 3, 1].map(|i| base + i));
        }
        builder
    }

    pub fn validate(&self) -> Result<()> {
        if self.vertices.len() < 3 {
            bail!("model needs at least 3 vertices, got {}", self.vertices.len());
        }
        let count = self.vertices.len() as u32;
        if let Some(bad) = self.indices.iter().find(|&&i| i >= count) {
            bail!("index {bad} out of range for {count} vertices");
        }
        Ok(())
    }
}

struct GpuBuffer {
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
}

/// Device-local vertex (and optional index) buffer for one mesh.
pub struct Model {
    device: Rc<VkDevice>,
    vertices: GpuBuffer,
    vertex_count: u32,
    indices: Option<GpuBuffer>,
    index_count: u32,
}

impl Model {
    pub fn new(device: Rc<VkDevice>, builder: &ModelBuilder) -> Result<Self> {
        builder.validate()?;
        let vertices = upload(
            &device,
            bytemuck::cast_slice(&builder.vertices),
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        let indices = if builder.indices.is_empty() {
            None
        } else {
            match upload(
                &device,
                bytemuck::cast_slice(&builder.indices),
                vk::BufferUsageFlags::INDEX_BUFFER,
            ) {
                Ok(b) => Some(b),
                Err(e) => {
                    destroy(&device, &vertices);
                    return Err(e);
                }
            }
        };
        debug!(
            "model uploaded: {} vertices, {} indices",
            builder.vertices.len(),
            builder.indices.len()
        );
        Ok(Self {
            device,
            vertices,
            vertex_count: builder.vertices.len() as u32,
            indices,
            index_count: builder.indices.len() as u32,
        })
    }

    pub fn bind(&self, cmd: vk::CommandBuffer) {
        let d = self.device.device();
        unsafe {
            d.cmd_bind_vertex_buffers(cmd, 0, std::slice::from_ref(&self.vertices.buffer), &[0]);
            if let Some(indices) = &self.indices {
                d.cmd_bind_index_buffer(cmd, indices.buffer, 0, vk::IndexType::UINT32);
            }
        }
    }

    pub fn draw(&self, cmd: vk::CommandBuffer) {
        let d = self.device.device();
        unsafe {
            if self.indices.is_some() {
                d.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);
            } else {
                d.cmd_draw(cmd, self.vertex_count, 1, 0, 0);
            }
        }
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        destroy(&self.device, &self.vertices);
        if let Some(indices) = &self.indices {
            destroy(&self.device, indices);
        }
    }
}

fn destroy(device: &VkDevice, b: &GpuBuffer) {
    unsafe {
        device.device().destroy_buffer(b.buffer, None);
        device.device().free_memory(b.memory, None);
    }
}

/// Host data -> staging buffer -> device-local buffer with `usage`.
fn upload(device: &VkDevice, data: &[u8], usage: vk::BufferUsageFlags) -> Result<GpuBuffer> {
    let size = data.len() as vk::DeviceSize;
    let (staging, staging_mem) = device.create_buffer(
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    let staging = GpuBuffer {
        buffer: staging,
        memory: staging_mem,
    };

    let result = (|| -> Result<GpuBuffer> {
        let d = device.device();
        unsafe {
            let ptr = d.map_memory(staging.memory, 0, size, vk::MemoryMapFlags::empty())?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), data.len());
            d.unmap_memory(staging.memory);
        }
        let (buffer, memory) = device.create_buffer(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        let dst = GpuBuffer { buffer, memory };
        if let Err(e) = device.copy_buffer(staging.buffer, dst.buffer, size) {
            destroy(device, &dst);
            return Err(e);
        }
        Ok(dst)
    })();

    destroy(device, &staging);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_matches_shader_inputs() {
        assert_eq!(std::mem::size_of::<Vertex>(), 24);
        let [pos, color] = Vertex::attribute_descriptions();
        assert_eq!((pos.location, pos.offset), (0, 0));
        assert_eq!((color.location, color.offset), (1, 12));
        assert_eq!(Vertex::binding_descriptions()[0].stride, 24);
    }

    #[test]
    fn cube_has_four_vertices_and_two_triangles_per_face() {
        let cube = ModelBuilder::cube([0.0, 0.0, 0.0]);
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        cube.validate().unwrap();
        assert!(cube
            .vertices
            .iter()
            .all(|v| v.position.iter().all(|p| p.abs() == 0.5)));
    }

    #[test]
    fn cube_offset_moves_every_vertex() {
        let cube = ModelBuilder::cube([0.0, 0.0, 2.5]);
        assert!(cube
            .vertices
            .iter()
            .all(|v| v.position[2] == 2.0 || v.position[2] == 3.0));
    }

    #[test]
    fn validate_rejects_bad_input() {
        let v = Vertex {
            position: [0.0; 3],
            color: [1.0; 3],
        };
        let two = ModelBuilder {
            vertices: vec![v; 2],
            indices: vec![],
        };
        assert!(two.validate().is_err());

        let bad_index = ModelBuilder {
            vertices: vec![v; 3],
            indices: vec![0, 1, 3],
        };
        assert!(bad_index.validate().is_err());

        let unindexed = ModelBuilder {
            vertices: vec![v; 3],
            indices: vec![],
        };
        assert!(unindexed.validate().is_ok());
    }
}
