use wgpu::util::DeviceExt;

use crate::{
    rendering::texture::ImageTexture,
    scene_graph::{DynamicBufferGeometry, Geometry},
};

pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

/// Writes `bytes` into `existing` when it is large enough, otherwise allocates a buffer with
/// room to grow.
fn upload(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    existing: Option<wgpu::Buffer>,
    bytes: &[u8],
    usage: wgpu::BufferUsages,
    label: &str,
) -> wgpu::Buffer {
    let required = (bytes.len() as u64).max(16).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
    let buffer = match existing {
        Some(buffer) if buffer.size() >= required => buffer,
        _ => device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: required.next_power_of_two(),
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }),
    };
    if !bytes.is_empty() {
        queue.write_buffer(&buffer, 0, bytes);
    }
    buffer
}

#[derive(Debug)]
pub enum GpuBuffers {
    /// Points and lines: per-item positions and colours.
    Dynamic {
        positions: wgpu::Buffer,
        colors: wgpu::Buffer,
        items: u32,
    },
    Mesh {
        vertices: wgpu::Buffer,
        indices: wgpu::Buffer,
        index_count: u32,
        instances: wgpu::Buffer,
        instance_count: u32,
    },
    Textured {
        vertices: wgpu::Buffer,
        indices: wgpu::Buffer,
        image: ImageTexture,
    },
}

/// GPU copy of a primitive's geometry, refreshed when the geometry version changes.
#[derive(Debug)]
pub struct GpuPrimitive {
    version: u64,
    pub buffers: GpuBuffers,
}

impl GpuPrimitive {
    /// Brings `slot` in line with `geometry`. Empty geometry keeps no GPU copy.
    pub fn sync(
        slot: &mut Option<GpuPrimitive>,
        geometry: &Geometry,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image_layout: &wgpu::BindGroupLayout,
    ) {
        if geometry.is_empty() {
            *slot = None;
            return;
        }
        if slot.as_ref().is_some_and(|gpu| gpu.version == geometry.version()) {
            return;
        }
        let previous = slot.take().map(|gpu| gpu.buffers);
        let buffers = match geometry {
            Geometry::Points(points) => upload_dynamic(device, queue, previous, &points.buffer),
            Geometry::Lines(lines) => upload_dynamic(device, queue, previous, &lines.buffer),
            Geometry::Mesh(mesh) => {
                let (vertices, indices, instances) = match previous {
                    Some(GpuBuffers::Mesh {
                        vertices,
                        indices,
                        instances,
                        ..
                    }) => (Some(vertices), Some(indices), Some(instances)),
                    _ => (None, None, None),
                };
                GpuBuffers::Mesh {
                    vertices: upload(
                        device,
                        queue,
                        vertices,
                        bytemuck::cast_slice(&mesh.vertices),
                        wgpu::BufferUsages::VERTEX,
                        "Mesh vertices",
                    ),
                    indices: upload(
                        device,
                        queue,
                        indices,
                        bytemuck::cast_slice(&mesh.indices),
                        wgpu::BufferUsages::INDEX,
                        "Mesh indices",
                    ),
                    index_count: mesh.indices.len() as u32,
                    instances: upload(
                        device,
                        queue,
                        instances,
                        bytemuck::cast_slice(&mesh.instances),
                        wgpu::BufferUsages::VERTEX,
                        "Mesh instances",
                    ),
                    instance_count: mesh.instances.len() as u32,
                }
            }
            Geometry::Textured(textured) => {
                let expected = textured.width as usize * textured.height as usize * 4;
                if textured.rgba.len() != expected {
                    log::warn!(
                        "Image data of {} bytes does not match {}x{}",
                        textured.rgba.len(),
                        textured.width,
                        textured.height
                    );
                    return;
                }
                GpuBuffers::Textured {
                    vertices: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Textured quad vertices"),
                        contents: bytemuck::cast_slice(&textured.vertices),
                        usage: wgpu::BufferUsages::VERTEX,
                    }),
                    indices: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Textured quad indices"),
                        contents: bytemuck::cast_slice(&QUAD_INDICES),
                        usage: wgpu::BufferUsages::INDEX,
                    }),
                    image: ImageTexture::new(
                        device,
                        queue,
                        image_layout,
                        textured.width,
                        textured.height,
                        &textured.rgba,
                    ),
                }
            }
        };
        *slot = Some(GpuPrimitive {
            version: geometry.version(),
            buffers,
        });
    }
}

fn upload_dynamic(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    previous: Option<GpuBuffers>,
    buffer: &DynamicBufferGeometry,
) -> GpuBuffers {
    let (positions, colors) = match previous {
        Some(GpuBuffers::Dynamic { positions, colors, .. }) => (Some(positions), Some(colors)),
        _ => (None, None),
    };
    GpuBuffers::Dynamic {
        positions: upload(
            device,
            queue,
            positions,
            buffer.draw_range_bytes("position").unwrap_or_default(),
            wgpu::BufferUsages::VERTEX,
            "Positions",
        ),
        colors: upload(
            device,
            queue,
            colors,
            buffer.draw_range_bytes("color").unwrap_or_default(),
            wgpu::BufferUsages::VERTEX,
            "Colors",
        ),
        items: buffer.len() as u32,
    }
}
