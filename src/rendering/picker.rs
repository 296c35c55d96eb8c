//! Object picking by rendering ids into a small offscreen target around the cursor.

use glam::{Mat4, Vec2, Vec3};

use crate::{
    camera::{Camera, CameraUniform},
    error::{RenderError, RenderResult},
    rendering::{
        draw_uniforms::DrawUniformBuffer,
        gpu_context::GpuContext,
        pipelines::{PipelineCache, ShadingMode},
        render_list::{encode_items, prepare_pipelines, RenderList},
        texture::{ColorTarget, DepthTexture},
    },
};

/// Side length of the picking target in pixels.
pub const PICK_SIZE: u32 = 31;
/// Decoded value of a pixel nothing was drawn into.
pub const NO_HIT: u32 = 0xFFFF_FFFF;

const PICK_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickTarget {
    /// Encodes the object id of whatever covers the pixel.
    Object,
    /// Encodes the instance index within `object_id`.
    Instance { object_id: u32 },
}

/// Projection that maps window pixel `(x, y)` to the centre of the picking target, with one
/// target pixel per window pixel.
pub fn pick_projection(projection: Mat4, x: f32, y: f32, resolution: Vec2) -> Mat4 {
    let ndc = Vec2::new(
        (x + 0.5) / resolution.x * 2.0 - 1.0,
        1.0 - (y + 0.5) / resolution.y * 2.0,
    );
    let size = PICK_SIZE as f32;
    Mat4::from_scale(Vec3::new(resolution.x / size, resolution.y / size, 1.0))
        * Mat4::from_translation(Vec3::new(-ndc.x, -ndc.y, 0.0))
        * projection
}

/// Owns the picking target and its readback buffer. The camera and draw uniforms are separate
/// from the main pass, so picking between frames leaves the visible render untouched.
pub struct Picker {
    target: ColorTarget,
    depth: DepthTexture,
    readback: wgpu::Buffer,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    draws: DrawUniformBuffer,
}

impl Picker {
    pub fn new(
        device: &wgpu::Device,
        camera_layout: &wgpu::BindGroupLayout,
        draw_layout: wgpu::BindGroupLayout,
    ) -> Self {
        let target = ColorTarget::new(device, PICK_SIZE, PICK_SIZE, PICK_FORMAT, "Pick target");
        let depth = DepthTexture::new(device, PICK_SIZE, PICK_SIZE, "Pick depth");
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Pick readback"),
            size: wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let camera_buffer = CameraUniform::default().create_buffer(device, "Pick camera buffer");
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Pick camera bind group"),
            layout: camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });
        Self {
            target,
            depth,
            readback,
            camera_buffer,
            camera_bind_group,
            draws: DrawUniformBuffer::new(device, draw_layout),
        }
    }

    /// Renders the pickable items of `list` around `(x, y)` and decodes the centre pixel.
    #[allow(clippy::too_many_arguments)]
    pub fn pick(
        &mut self,
        gpu: &GpuContext,
        pipelines: &mut PipelineCache,
        list: &RenderList,
        camera: &Camera,
        resolution: Vec2,
        x: f32,
        y: f32,
        target: PickTarget,
    ) -> RenderResult<u32> {
        let (mode, object_id) = match target {
            PickTarget::Object => (ShadingMode::PickObject, None),
            PickTarget::Instance { object_id } => (ShadingMode::PickInstance, Some(object_id)),
        };
        let items = list.pickable(mode, object_id);

        let projection = pick_projection(camera.projection_matrix(resolution), x, y, resolution);
        let uniform = CameraUniform::new(projection, camera.view_matrix(), Vec2::splat(PICK_SIZE as f32));
        uniform.update_buffer(&gpu.queue, &self.camera_buffer);

        prepare_pipelines(pipelines, &gpu.device, &items, mode, PICK_FORMAT);
        let uniforms: Vec<_> = items.iter().map(|item| item.uniform_for(mode)).collect();
        let offsets = self.draws.write(&gpu.device, &gpu.queue, &uniforms);

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Pick encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Pick pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: self.target.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
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
            encode_items(
                &mut pass,
                pipelines,
                mode,
                PICK_FORMAT,
                &self.camera_bind_group,
                &self.draws,
                &items,
                &offsets,
            );
        }

        let centre = PICK_SIZE / 2;
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: self.target.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: centre,
                    y: centre,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT),
                    rows_per_image: Some(1),
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        gpu.queue.submit([encoder.finish()]);

        let pixel = self.read_pixel(gpu)?;
        let id = u32::from_le_bytes(pixel);
        log::debug!("Picked {id:#010x} at ({x}, {y}) with {} candidates", items.len());
        Ok(id)
    }

    fn read_pixel(&self, gpu: &GpuContext) -> RenderResult<[u8; 4]> {
        let slice = self.readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        gpu.device.poll(wgpu::PollType::Wait)?;
        rx.recv().map_err(|_| RenderError::ReadbackCanceled)??;

        let pixel = {
            let data = slice.get_mapped_range();
            [data[0], data[1], data[2], data[3]]
        };
        self.readback.unmap();
        Ok(pixel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_projection_centres_the_cursor() {
        let resolution = Vec2::new(640.0, 480.0);
        let projection = Mat4::perspective_rh(1.0, resolution.x / resolution.y, 0.1, 100.0);
        let picked = pick_projection(projection, 100.0, 50.0, resolution);

        // A point that projects onto pixel (100.5, 50.5) lands at the centre of the target.
        let ndc = Vec2::new(100.5 / 640.0 * 2.0 - 1.0, 1.0 - 50.5 / 480.0 * 2.0);
        let inverse = projection.inverse();
        let point = inverse.project_point3(ndc.extend(0.5));
        let centred = picked.project_point3(point);
        assert!(centred.truncate().abs_diff_eq(Vec2::ZERO, 1e-3));
    }

    #[test]
    fn white_decodes_to_no_hit() {
        assert_eq!(u32::from_le_bytes([255; 4]), NO_HIT);
    }
}
