use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use wgpu::{BindingType, BufferBindingType, BufferUsages, ShaderStages};

pub const FLAG_WORLD_UNITS: u32 = 1;
pub const FLAG_CIRCLE: u32 = 2;
pub const FLAG_LIT: u32 = 4;

/// Per-draw state read by every pipeline at a dynamic offset.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct DrawUniform {
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
    pub object_id: u32,
    pub flags: u32,
    pub point_size: f32,
    pub line_width: f32,
}

impl DrawUniform {
    pub fn new(model: Mat4, color: Vec4, object_id: u32) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            color: color.to_array(),
            object_id,
            flags: 0,
            point_size: 1.0,
            line_width: 1.0,
        }
    }
}

/// Uniform buffer holding one `DrawUniform` per draw, each at an aligned offset.
pub struct DrawUniformBuffer {
    buffer: wgpu::Buffer,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    stride: u64,
    capacity: u64,
    staging: Vec<u8>,
}

impl DrawUniformBuffer {
    const INITIAL_CAPACITY: u64 = 256;

    pub fn new(device: &wgpu::Device, bind_group_layout: wgpu::BindGroupLayout) -> Self {
        let alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let size = std::mem::size_of::<DrawUniform>() as u64;
        let stride = size.div_ceil(alignment) * alignment;

        let buffer = Self::create_buffer(device, stride * Self::INITIAL_CAPACITY);
        let bind_group = Self::create_bind_group(device, &bind_group_layout, &buffer);

        Self {
            buffer,
            bind_group_layout,
            bind_group,
            stride,
            capacity: Self::INITIAL_CAPACITY,
            staging: Vec::new(),
        }
    }

    fn create_buffer(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Draw uniform buffer"),
            size,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Layout shared by every draw uniform buffer so pipelines accept any of them.
    pub fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Draw uniform bind group layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<DrawUniform>() as u64),
                },
                count: None,
            }],
        })
    }

    fn create_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        buffer: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw uniform bind group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<DrawUniform>() as u64),
                }),
            }],
        })
    }

    pub fn ensure_capacity(&mut self, device: &wgpu::Device, required_capacity: u64) {
        if required_capacity > self.capacity {
            let new_capacity = required_capacity * 2;
            self.buffer = Self::create_buffer(device, self.stride * new_capacity);
            self.bind_group = Self::create_bind_group(device, &self.bind_group_layout, &self.buffer);
            self.capacity = new_capacity;
        }
    }

    /// Uploads `draws` and returns the dynamic offset of each.
    pub fn write(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, draws: &[DrawUniform]) -> Vec<u32> {
        if draws.is_empty() {
            return Vec::new();
        }
        self.ensure_capacity(device, draws.len() as u64);

        let stride = self.stride as usize;
        self.staging.clear();
        self.staging.resize(stride * draws.len(), 0);
        for (i, draw) in draws.iter().enumerate() {
            let bytes = bytemuck::bytes_of(draw);
            self.staging[i * stride..i * stride + bytes.len()].copy_from_slice(bytes);
        }
        queue.write_buffer(&self.buffer, 0, &self.staging);

        (0..draws.len()).map(|i| (i * stride) as u32).collect()
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_uniform_matches_shader_layout() {
        assert_eq!(std::mem::size_of::<DrawUniform>(), 96);
    }
}
