use crate::{
    rendering::{
        draw_uniforms::{DrawUniform, DrawUniformBuffer, FLAG_CIRCLE, FLAG_LIT, FLAG_WORLD_UNITS},
        gpu_geometry::{GpuBuffers, GpuPrimitive},
        pipelines::{PipelineCache, PrimitiveKind, ShadingMode},
        stats::RenderStats,
    },
    scene_graph::{Geometry, Picking, PointShape, Primitive, Renderable},
};

fn expanded_uniform(mut uniform: DrawUniform, picking: Picking) -> DrawUniform {
    if let Picking::Expanded { min_size } = picking {
        if uniform.flags & FLAG_WORLD_UNITS == 0 {
            uniform.point_size = uniform.point_size.max(min_size);
            uniform.line_width = uniform.line_width.max(min_size);
        }
    }
    uniform
}

/// GPU handles of one draw. Cloned from the primitive so a list outlives the frame it was
/// built in.
#[derive(Debug, Clone)]
pub enum DrawBuffers {
    Dynamic {
        positions: wgpu::Buffer,
        colors: wgpu::Buffer,
        instances: u32,
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
        image: wgpu::BindGroup,
    },
}

#[derive(Debug, Clone)]
pub struct DrawItem {
    pub kind: PrimitiveKind,
    pub uniform: DrawUniform,
    pub picking: Picking,
    pub transparent: bool,
    pub buffers: DrawBuffers,
}

impl DrawItem {
    pub fn object_id(&self) -> u32 {
        self.uniform.object_id
    }

    /// The uniform used in the picking pass: expanded picking enforces a minimum pixel size.
    pub fn pick_uniform(&self) -> DrawUniform {
        expanded_uniform(self.uniform, self.picking)
    }

    /// The uniform drawn in `mode`. Debug shading shows the picking footprint.
    pub fn uniform_for(&self, mode: ShadingMode) -> DrawUniform {
        match mode {
            ShadingMode::Color => self.uniform,
            ShadingMode::Debug | ShadingMode::PickObject | ShadingMode::PickInstance => self.pick_uniform(),
        }
    }

    fn from_primitive(renderable: &Renderable, primitive: &Primitive, gpu: &GpuPrimitive) -> Option<Self> {
        let mut uniform = DrawUniform::new(
            renderable.primitive_matrix(primitive),
            primitive.tint(),
            renderable.pick_id(),
        );
        let (kind, buffers) = match (&primitive.geometry, &gpu.buffers) {
            (Geometry::Points(points), GpuBuffers::Dynamic { positions, colors, items }) => {
                uniform.point_size = points.point_size;
                if points.world_units {
                    uniform.flags |= FLAG_WORLD_UNITS;
                }
                if points.shape == PointShape::Circle {
                    uniform.flags |= FLAG_CIRCLE;
                }
                let buffers = DrawBuffers::Dynamic {
                    positions: positions.clone(),
                    colors: colors.clone(),
                    instances: *items,
                };
                (PrimitiveKind::Points, buffers)
            }
            (Geometry::Lines(lines), GpuBuffers::Dynamic { positions, colors, items }) => {
                uniform.line_width = lines.width;
                if lines.world_units {
                    uniform.flags |= FLAG_WORLD_UNITS;
                }
                let buffers = DrawBuffers::Dynamic {
                    positions: positions.clone(),
                    colors: colors.clone(),
                    instances: *items / 2,
                };
                (PrimitiveKind::Lines, buffers)
            }
            (
                Geometry::Mesh(mesh),
                GpuBuffers::Mesh {
                    vertices,
                    indices,
                    index_count,
                    instances,
                    instance_count,
                },
            ) => {
                if mesh.lit {
                    uniform.flags |= FLAG_LIT;
                }
                let buffers = DrawBuffers::Mesh {
                    vertices: vertices.clone(),
                    indices: indices.clone(),
                    index_count: *index_count,
                    instances: instances.clone(),
                    instance_count: *instance_count,
                };
                (PrimitiveKind::Mesh, buffers)
            }
            (
                Geometry::Textured(_),
                GpuBuffers::Textured {
                    vertices,
                    indices,
                    image,
                },
            ) => {
                let buffers = DrawBuffers::Textured {
                    vertices: vertices.clone(),
                    indices: indices.clone(),
                    image: image.bind_group.clone(),
                };
                (PrimitiveKind::Textured, buffers)
            }
            _ => return None,
        };
        let transparent = primitive.color.a < 1.0
            || matches!(kind, PrimitiveKind::Textured)
            || matches!(&primitive.geometry, Geometry::Mesh(mesh) if mesh.instances.iter().any(|i| i.color[3] < 1.0));
        Some(Self {
            kind,
            uniform,
            picking: primitive.picking,
            transparent,
            buffers,
        })
    }
}

/// The draws of one frame, opaque before transparent.
#[derive(Debug, Clone, Default)]
pub struct RenderList {
    pub items: Vec<DrawItem>,
}

impl RenderList {
    /// Uploads changed geometry of every visible renderable and collects its draws.
    pub fn build<'a>(
        renderables: impl Iterator<Item = &'a mut Renderable>,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image_layout: &wgpu::BindGroupLayout,
        stats: &mut RenderStats,
    ) -> Self {
        let mut items = Vec::new();
        for renderable in renderables {
            if !renderable.visible() {
                continue;
            }
            stats.renderables += 1;
            for index in 0..renderable.primitives.len() {
                let primitive = &mut renderable.primitives[index];
                GpuPrimitive::sync(&mut primitive.gpu, &primitive.geometry, device, queue, image_layout);
                let primitive = &renderable.primitives[index];
                let Some(gpu) = &primitive.gpu else {
                    continue;
                };
                match &primitive.geometry {
                    Geometry::Points(points) => stats.points += points.buffer.len() as u64,
                    Geometry::Lines(lines) => stats.line_segments += lines.segment_count() as u64,
                    Geometry::Mesh(mesh) => stats.triangles += mesh.triangle_count() as u64,
                    Geometry::Textured(_) => stats.triangles += 2,
                }
                items.extend(DrawItem::from_primitive(renderable, primitive, gpu));
            }
        }
        items.sort_by_key(|item| item.transparent);
        Self { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items drawn in the picking pass for `mode`.
    pub fn pickable(&self, mode: ShadingMode, object_id: Option<u32>) -> Vec<&DrawItem> {
        self.items
            .iter()
            .filter(|item| item.picking != Picking::Disabled)
            .filter(|item| object_id.is_none_or(|id| item.object_id() == id))
            .filter(|item| mode != ShadingMode::PickInstance || item.kind != PrimitiveKind::Textured)
            .collect()
    }
}

/// Records `items` into `pass`. Pipelines must have been prepared for `mode` and `format`.
#[allow(clippy::too_many_arguments)]
pub fn encode_items(
    pass: &mut wgpu::RenderPass<'_>,
    pipelines: &PipelineCache,
    mode: ShadingMode,
    format: wgpu::TextureFormat,
    camera_bind_group: &wgpu::BindGroup,
    draws: &DrawUniformBuffer,
    items: &[&DrawItem],
    offsets: &[u32],
) -> u32 {
    let mut draw_calls = 0;
    pass.set_bind_group(0, camera_bind_group, &[]);
    for (item, offset) in items.iter().zip(offsets) {
        let Some(pipeline) = pipelines.pipeline(item.kind, mode, format) else {
            continue;
        };
        pass.set_pipeline(pipeline);
        pass.set_bind_group(1, draws.bind_group(), &[*offset]);
        match &item.buffers {
            DrawBuffers::Dynamic {
                positions,
                colors,
                instances,
            } => {
                if *instances == 0 {
                    continue;
                }
                pass.set_vertex_buffer(0, positions.slice(..));
                pass.set_vertex_buffer(1, colors.slice(..));
                pass.draw(0..6, 0..*instances);
            }
            DrawBuffers::Mesh {
                vertices,
                indices,
                index_count,
                instances,
                instance_count,
            } => {
                pass.set_vertex_buffer(0, vertices.slice(..));
                pass.set_vertex_buffer(1, instances.slice(..));
                pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..*index_count, 0, 0..*instance_count);
            }
            DrawBuffers::Textured {
                vertices,
                indices,
                image,
            } => {
                pass.set_bind_group(2, image, &[]);
                pass.set_vertex_buffer(0, vertices.slice(..));
                pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..6, 0, 0..1);
            }
        }
        draw_calls += 1;
    }
    draw_calls
}

/// Creates every pipeline `items` need.
pub fn prepare_pipelines(
    pipelines: &mut PipelineCache,
    device: &wgpu::Device,
    items: &[&DrawItem],
    mode: ShadingMode,
    format: wgpu::TextureFormat,
) {
    for item in items {
        pipelines.prepare(device, item.kind, mode, format);
    }
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Vec4};

    use super::*;

    #[test]
    fn expanded_picking_grows_screen_space_sizes_only() {
        let mut uniform = DrawUniform::new(Mat4::IDENTITY, Vec4::ONE, 7);
        uniform.point_size = 2.0;
        uniform.line_width = 1.0;

        let expanded = expanded_uniform(uniform, Picking::Expanded { min_size: 10.0 });
        assert_eq!((expanded.point_size, expanded.line_width), (10.0, 10.0));
        assert_eq!(expanded_uniform(uniform, Picking::Default).point_size, 2.0);

        uniform.flags |= FLAG_WORLD_UNITS;
        assert_eq!(expanded_uniform(uniform, Picking::Expanded { min_size: 10.0 }).point_size, 2.0);
    }
}
