use glam::{DVec3, Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use wgpu::util::DeviceExt;

use crate::math::Ray;

/// Orbit camera around a target point, Z up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CameraState {
    pub distance: f64,
    pub perspective: bool,
    /// Angle from +Z, degrees.
    pub phi: f64,
    /// Heading around +Z, degrees.
    pub theta_offset: f64,
    pub target: [f64; 3],
    pub target_offset: [f64; 3],
    /// Vertical field of view, degrees.
    pub fovy: f64,
    pub near: f64,
    pub far: f64,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            distance: 20.0,
            perspective: true,
            phi: 60.0,
            theta_offset: 45.0,
            target: [0.0; 3],
            target_offset: [0.0; 3],
            fovy: 45.0,
            near: 0.5,
            far: 5000.0,
        }
    }
}

impl CameraState {
    pub fn target_point(&self) -> DVec3 {
        DVec3::from(self.target) + DVec3::from(self.target_offset)
    }

    pub fn eye(&self) -> DVec3 {
        let phi = self.phi.to_radians().clamp(1e-4, std::f64::consts::PI - 1e-4);
        let theta = self.theta_offset.to_radians();
        let direction = DVec3::new(phi.sin() * theta.cos(), phi.sin() * theta.sin(), phi.cos());
        self.target_point() + direction * self.distance.max(1e-3)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(
            self.eye().as_vec3(),
            self.target_point().as_vec3(),
            Vec3::Z,
        )
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        let aspect = if aspect.is_finite() && aspect > 0.0 { aspect } else { 1.0 };
        let (near, far) = (self.near.max(1e-4) as f32, self.far.max(self.near + 1e-3) as f32);
        if self.perspective {
            Mat4::perspective_rh(self.fovy.to_radians() as f32, aspect, near, far)
        } else {
            let half_height = (self.distance * (self.fovy.to_radians() * 0.5).tan()) as f32;
            let half_width = half_height * aspect;
            Mat4::orthographic_rh(-half_width, half_width, -half_height, half_height, -far, far)
        }
    }

    /// Orbits by a mouse drag in pixels.
    pub fn orbit(&mut self, delta: Vec2) {
        self.theta_offset -= delta.x as f64 * 0.3;
        self.phi = (self.phi - delta.y as f64 * 0.3).clamp(0.1, 179.9);
    }

    pub fn zoom(&mut self, factor: f64) {
        self.distance = (self.distance * factor).clamp(0.05, self.far * 0.9);
    }
}

/// A camera state plus the extra view transform applied by the follow mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub state: CameraState,
    pub follow_transform: Mat4,
}

impl Camera {
    pub fn new(state: CameraState) -> Self {
        Self {
            state,
            follow_transform: Mat4::IDENTITY,
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.state.view_matrix() * self.follow_transform
    }

    pub fn projection_matrix(&self, resolution: Vec2) -> Mat4 {
        self.state.projection_matrix(resolution.x / resolution.y)
    }

    pub fn get_vp_matrix(&self, resolution: Vec2) -> Mat4 {
        self.projection_matrix(resolution) * self.view_matrix()
    }

    /// The ray through a window position in pixels, origin at the top left.
    pub fn screen_ray(&self, cursor: Vec2, resolution: Vec2) -> Option<Ray> {
        let inverse = self.get_vp_matrix(resolution).inverse();
        if !inverse.is_finite() {
            return None;
        }
        let ndc = Vec2::new(
            cursor.x / resolution.x * 2.0 - 1.0,
            1.0 - cursor.y / resolution.y * 2.0,
        );
        let near = inverse.project_point3(ndc.extend(0.0));
        let far = inverse.project_point3(ndc.extend(1.0));
        Ray::between(near.as_dvec3(), far.as_dvec3())
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable, Default)]
pub struct CameraUniform {
    view_proj: Mat4,
    viewport: Vec2,
    /// Pixels per metre at unit depth, used to size world-unit points and lines.
    focal: f32,
    _padding: f32,
}

impl CameraUniform {
    pub fn new(projection: Mat4, view: Mat4, viewport: Vec2) -> Self {
        Self {
            view_proj: projection * view,
            viewport,
            focal: projection.y_axis.y * viewport.y * 0.5,
            _padding: 0.0,
        }
    }

    pub fn update(&mut self, resolution: Vec2, camera: &Camera) {
        *self = Self::new(camera.projection_matrix(resolution), camera.view_matrix(), resolution);
    }

    pub fn view_proj(&self) -> Mat4 {
        self.view_proj
    }

    pub fn create_buffer(&self, device: &wgpu::Device, label: &str) -> wgpu::Buffer {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&[*self]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        })
    }

    pub fn update_buffer(&self, queue: &wgpu::Queue, buffer: &wgpu::Buffer) {
        queue.write_buffer(buffer, 0, bytemuck::cast_slice(&[*self]));
    }
}
