use std::sync::Arc;

use glam::Vec2;
use winit::window::Window;

use crate::{
    camera::{Camera, CameraState, CameraUniform},
    color::ColorRgba,
    error::{RenderError, RenderResult},
    rendering::{
        config::GpuOptions,
        draw_uniforms::DrawUniformBuffer,
        gpu_context::GpuContext,
        picker::{PickTarget, Picker},
        pipelines::{PipelineCache, ShadingMode},
        render_list::{encode_items, prepare_pipelines, RenderList},
        stats::RenderStats,
        texture::{ColorTarget, DepthTexture, ImageTexture},
    },
    scene_graph::Renderable,
};

enum Output {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen(ColorTarget),
}

fn clear_color(color: ColorRgba) -> wgpu::Color {
    wgpu::Color {
        r: color.r as f64,
        g: color.g as f64,
        b: color.b as f64,
        a: color.a as f64,
    }
}

/// Draws renderables to a window surface or an offscreen target and answers pick requests
/// against the last drawn frame.
pub struct SceneRenderer {
    pub gpu: GpuContext,
    output: Output,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    depth: DepthTexture,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    image_layout: wgpu::BindGroupLayout,
    draws: DrawUniformBuffer,
    pipelines: PipelineCache,
    picker: Picker,
    last_list: RenderList,
    last_camera: Camera,
    pub debug_picking: bool,
}

impl SceneRenderer {
    pub async fn for_window(window: Arc<Window>, options: &GpuOptions) -> RenderResult<Self> {
        let size = window.inner_size();
        let (gpu, surface) = GpuContext::for_window(window, options).await?;

        let capabilities = surface.get_capabilities(&gpu.adapter);
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(wgpu::TextureFormat::is_srgb)
            .or_else(|| capabilities.formats.first().copied())
            .ok_or(RenderError::UnsupportedSurface)?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: options.present_mode(),
            alpha_mode: capabilities
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &config);

        Ok(Self::new(gpu, Output::Surface { surface, config }, format, size.width, size.height))
    }

    /// Renders into an offscreen RGBA8 target.
    pub async fn headless(width: u32, height: u32, options: &GpuOptions) -> RenderResult<Self> {
        let gpu = GpuContext::headless(options).await?;
        let format = wgpu::TextureFormat::Rgba8UnormSrgb;
        let target = ColorTarget::new(&gpu.device, width.max(1), height.max(1), format, "Offscreen target");
        Ok(Self::new(gpu, Output::Offscreen(target), format, width, height))
    }

    fn new(gpu: GpuContext, output: Output, format: wgpu::TextureFormat, width: u32, height: u32) -> Self {
        let device = &gpu.device;
        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Camera bind group layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let camera_buffer = CameraUniform::default().create_buffer(device, "Camera buffer");
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera bind group"),
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });
        let draw_layout = DrawUniformBuffer::create_bind_group_layout(device);
        let image_layout = ImageTexture::bind_group_layout(device);
        let pipelines = PipelineCache::new(device, &camera_layout, &draw_layout, &image_layout);
        let picker = Picker::new(device, &camera_layout, draw_layout.clone());
        let draws = DrawUniformBuffer::new(device, draw_layout);
        let depth = DepthTexture::new(device, width, height, "Depth texture");

        Self {
            output,
            format,
            width: width.max(1),
            height: height.max(1),
            depth,
            camera_buffer,
            camera_bind_group,
            image_layout,
            draws,
            pipelines,
            picker,
            last_list: RenderList::default(),
            last_camera: Camera::new(CameraState::default()),
            debug_picking: false,
            gpu,
        }
    }

    pub fn resolution(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.width = width;
        self.height = height;
        self.depth.resize(&self.gpu.device, width, height);
        match &mut self.output {
            Output::Surface { surface, config } => {
                config.width = width;
                config.height = height;
                surface.configure(&self.gpu.device, config);
            }
            Output::Offscreen(target) => {
                *target = ColorTarget::new(&self.gpu.device, width, height, self.format, "Offscreen target");
            }
        }
    }

    /// Reconfigures the surface at the current size, after it was lost or outdated.
    pub fn reconfigure(&mut self) {
        self.resize(self.width, self.height);
    }

    pub fn render<'a>(
        &mut self,
        renderables: impl Iterator<Item = &'a mut Renderable>,
        camera: &Camera,
        background: ColorRgba,
    ) -> RenderResult<RenderStats> {
        let mut stats = RenderStats::default();
        let list = RenderList::build(
            renderables,
            &self.gpu.device,
            &self.gpu.queue,
            &self.image_layout,
            &mut stats,
        );

        let mut uniform = CameraUniform::default();
        uniform.update(self.resolution(), camera);
        uniform.update_buffer(&self.gpu.queue, &self.camera_buffer);

        let mode = if self.debug_picking {
            ShadingMode::Debug
        } else {
            ShadingMode::Color
        };
        let items: Vec<_> = match mode {
            ShadingMode::Debug => list.pickable(ShadingMode::PickObject, None),
            _ => list.items.iter().collect(),
        };
        prepare_pipelines(&mut self.pipelines, &self.gpu.device, &items, mode, self.format);
        let uniforms: Vec<_> = items.iter().map(|item| item.uniform_for(mode)).collect();
        let offsets = self.draws.write(&self.gpu.device, &self.gpu.queue, &uniforms);

        let surface_texture = match &self.output {
            Output::Surface { surface, .. } => Some(surface.get_current_texture()?),
            Output::Offscreen(_) => None,
        };
        let view = match (&surface_texture, &self.output) {
            (Some(texture), _) => texture
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default()),
            (None, Output::Offscreen(target)) => target.view().clone(),
            (None, Output::Surface { .. }) => return Err(RenderError::UnsupportedSurface),
        };

        let clear = if self.debug_picking {
            wgpu::Color::WHITE
        } else {
            clear_color(background)
        };
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: self.depth.view(),
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            stats.draw_calls = encode_items(
                &mut pass,
                &self.pipelines,
                mode,
                self.format,
                &self.camera_bind_group,
                &self.draws,
                &items,
                &offsets,
            );
        }
        self.gpu.queue.submit([encoder.finish()]);
        if let Some(texture) = surface_texture {
            texture.present();
        }

        stats.pipelines = self.pipelines.len() as u32;
        self.last_list = list;
        self.last_camera = camera.clone();
        Ok(stats)
    }

    /// Object id under window pixel `(x, y)` in the last rendered frame, or `NO_HIT`.
    pub fn pick(&mut self, x: f32, y: f32) -> RenderResult<u32> {
        self.pick_target(x, y, PickTarget::Object)
    }

    /// Index of the instance of `object_id` under `(x, y)`, e.g. a point of a point cloud.
    pub fn pick_instance(&mut self, x: f32, y: f32, object_id: u32) -> RenderResult<u32> {
        self.pick_target(x, y, PickTarget::Instance { object_id })
    }

    fn pick_target(&mut self, x: f32, y: f32, target: PickTarget) -> RenderResult<u32> {
        let resolution = self.resolution();
        self.picker.pick(
            &self.gpu,
            &mut self.pipelines,
            &self.last_list,
            &self.last_camera,
            resolution,
            x,
            y,
            target,
        )
    }
}
