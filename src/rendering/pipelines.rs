use std::collections::HashMap;

use crate::rendering::texture::DEPTH_FORMAT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Points,
    Lines,
    Mesh,
    Textured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadingMode {
    Color,
    /// Object ids hashed to colours, for inspecting the picking pass.
    Debug,
    PickObject,
    PickInstance,
}

impl ShadingMode {
    fn fragment_entry(self, kind: PrimitiveKind) -> &'static str {
        match (self, kind) {
            (ShadingMode::Color, PrimitiveKind::Textured) => "fs_textured",
            (ShadingMode::Color, _) => "fs_color",
            (ShadingMode::Debug, _) => "fs_debug",
            (ShadingMode::PickObject, _) => "fs_pick_object",
            (ShadingMode::PickInstance, _) => "fs_pick_instance",
        }
    }

    fn blend(self) -> Option<wgpu::BlendState> {
        match self {
            ShadingMode::Color => Some(wgpu::BlendState::ALPHA_BLENDING),
            _ => None,
        }
    }
}

impl PrimitiveKind {
    fn vertex_entry(self) -> &'static str {
        match self {
            PrimitiveKind::Points => "vs_points",
            PrimitiveKind::Lines => "vs_lines",
            PrimitiveKind::Mesh => "vs_mesh",
            PrimitiveKind::Textured => "vs_textured",
        }
    }

    fn vertex_buffers(self) -> Vec<wgpu::VertexBufferLayout<'static>> {
        const POINT_POSITIONS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
        const POINT_COLORS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Unorm8x4];
        const SEGMENT_POSITIONS: [wgpu::VertexAttribute; 2] =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];
        const SEGMENT_COLORS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![2 => Unorm8x4, 3 => Unorm8x4];
        const MESH_VERTEX: [wgpu::VertexAttribute; 3] =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x4];
        const MESH_INSTANCE: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
            3 => Float32x4, 4 => Float32x4, 5 => Float32x4, 6 => Float32x4, 7 => Float32x4
        ];
        const TEXTURED_VERTEX: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];

        let layout = |stride: u64, step_mode, attributes: &'static [wgpu::VertexAttribute]| wgpu::VertexBufferLayout {
            array_stride: stride,
            step_mode,
            attributes,
        };
        use wgpu::VertexStepMode::{Instance, Vertex};
        match self {
            PrimitiveKind::Points => vec![
                layout(12, Instance, &POINT_POSITIONS),
                layout(4, Instance, &POINT_COLORS),
            ],
            PrimitiveKind::Lines => vec![
                layout(24, Instance, &SEGMENT_POSITIONS),
                layout(8, Instance, &SEGMENT_COLORS),
            ],
            PrimitiveKind::Mesh => vec![
                layout(40, Vertex, &MESH_VERTEX),
                layout(80, Instance, &MESH_INSTANCE),
            ],
            PrimitiveKind::Textured => vec![layout(20, Vertex, &TEXTURED_VERTEX)],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    kind: PrimitiveKind,
    mode: ShadingMode,
    format: wgpu::TextureFormat,
}

/// Render pipelines created on first use per primitive kind, shading mode and target format.
pub struct PipelineCache {
    module: wgpu::ShaderModule,
    layout: wgpu::PipelineLayout,
    textured_layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl PipelineCache {
    pub fn new(
        device: &wgpu::Device,
        camera_layout: &wgpu::BindGroupLayout,
        draw_layout: &wgpu::BindGroupLayout,
        image_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/scene.wgsl").into()),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene pipeline layout"),
            bind_group_layouts: &[camera_layout, draw_layout],
            push_constant_ranges: &[],
        });
        let textured_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Textured pipeline layout"),
            bind_group_layouts: &[camera_layout, draw_layout, image_layout],
            push_constant_ranges: &[],
        });
        Self {
            module,
            layout,
            textured_layout,
            pipelines: HashMap::new(),
        }
    }

    /// Creates the pipeline for `kind`, `mode` and `format` unless it exists.
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        kind: PrimitiveKind,
        mode: ShadingMode,
        format: wgpu::TextureFormat,
    ) {
        let key = PipelineKey { kind, mode, format };
        let (module, layout, textured_layout) = (&self.module, &self.layout, &self.textured_layout);
        self.pipelines.entry(key).or_insert_with(|| {
            log::debug!("Creating pipeline {kind:?}/{mode:?} for {format:?}");
            let label = format!("{kind:?} {mode:?} pipeline");
            let buffers = kind.vertex_buffers();
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&label),
                layout: Some(if kind == PrimitiveKind::Textured {
                    textured_layout
                } else {
                    layout
                }),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some(kind.vertex_entry()),
                    buffers: &buffers,
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some(mode.fragment_entry(kind)),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: mode.blend(),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::LessEqual,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        });
    }

    pub fn pipeline(
        &self,
        kind: PrimitiveKind,
        mode: ShadingMode,
        format: wgpu::TextureFormat,
    ) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(&PipelineKey { kind, mode, format })
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }
}
