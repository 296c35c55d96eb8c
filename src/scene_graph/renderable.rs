use std::sync::atomic::{AtomicU32, Ordering};

use glam::{Mat4, Vec4};

use crate::{
    color::ColorRgba,
    rendering::gpu_geometry::GpuPrimitive,
    scene_graph::geometry::DynamicBufferGeometry,
    settings::SettingsPath,
    time::Time,
    transforms::{Pose, Transform, TransformTree},
};

/// Object ids written by the picking pass. `u32::MAX` is the clear colour and never issued.
static NEXT_PICK_ID: AtomicU32 = AtomicU32::new(1);

fn next_pick_id() -> u32 {
    loop {
        let id = NEXT_PICK_ID.fetch_add(1, Ordering::Relaxed);
        if id != 0 && id != u32::MAX {
            return id;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Picking {
    Default,
    Disabled,
    /// Points and lines are drawn at least `min_size` pixels wide in the picking pass.
    Expanded { min_size: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointShape {
    #[default]
    Circle,
    Square,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointsGeometry {
    pub buffer: DynamicBufferGeometry,
    /// Diameter in pixels, or metres with `world_units`.
    pub point_size: f32,
    pub shape: PointShape,
    pub world_units: bool,
}

impl PointsGeometry {
    pub fn new(point_size: f32, shape: PointShape) -> Self {
        Self {
            buffer: DynamicBufferGeometry::with_position_color(),
            point_size,
            shape,
            world_units: false,
        }
    }
}

/// Line segments: items `2i` and `2i + 1` of the buffer form segment `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinesGeometry {
    pub buffer: DynamicBufferGeometry,
    pub width: f32,
    /// Width is in metres instead of pixels.
    pub world_units: bool,
}

impl LinesGeometry {
    pub fn new(width: f32, world_units: bool) -> Self {
        Self {
            buffer: DynamicBufferGeometry::with_position_color(),
            width,
            world_units,
        }
    }

    /// Sets segments from a list of endpoints, dropping a trailing unpaired point.
    pub fn set_segments(&mut self, points: &[[f32; 3]], colors: &[[u8; 4]]) {
        let count = points.len().min(colors.len()) & !1;
        self.buffer
            .set_positions_colors(&points[..count], &colors[..count]);
    }

    /// Converts a polyline (optionally closed) into segments.
    pub fn set_strip(&mut self, points: &[[f32; 3]], colors: &[[u8; 4]], closed: bool) {
        let count = points.len().min(colors.len());
        if count < 2 {
            self.buffer.resize(0);
            return;
        }
        let mut segment_points = Vec::with_capacity(count * 2);
        let mut segment_colors = Vec::with_capacity(count * 2);
        let last = if closed { count } else { count - 1 };
        for i in 0..last {
            let j = (i + 1) % count;
            segment_points.extend([points[i], points[j]]);
            segment_colors.extend([colors[i], colors[j]]);
        }
        self.buffer
            .set_positions_colors(&segment_points, &segment_colors);
    }

    pub fn segment_count(&self) -> usize {
        self.buffer.len() / 2
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshInstance {
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
}

impl MeshInstance {
    pub fn new(model: Mat4, color: ColorRgba) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            color: color.to_vec4().to_array(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshGeometry {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    pub instances: Vec<MeshInstance>,
    /// Shade with a fixed directional light instead of flat colour.
    pub lit: bool,
    pub version: u64,
}

impl MeshGeometry {
    pub fn new(vertices: Vec<MeshVertex>, indices: Vec<u32>) -> Self {
        Self {
            vertices,
            indices,
            instances: Vec::new(),
            lit: true,
            version: 0,
        }
    }

    pub fn with_instance(mut self, model: Mat4, color: ColorRgba) -> Self {
        self.instances.push(MeshInstance::new(model, color));
        self
    }

    pub fn set_instances(&mut self, instances: Vec<MeshInstance>) {
        self.instances = instances;
        self.version += 1;
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3 * self.instances.len()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TexturedVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

/// A quad textured with an RGBA8 image.
#[derive(Debug, Clone, PartialEq)]
pub struct TexturedGeometry {
    pub vertices: [TexturedVertex; 4],
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    pub version: u64,
}

impl TexturedGeometry {
    /// A `size_x` by `size_y` quad on the XY plane with its corner at the origin.
    pub fn quad(size_x: f32, size_y: f32, width: u32, height: u32, rgba: Vec<u8>) -> Self {
        let corner = |x: f32, y: f32| TexturedVertex {
            position: [x * size_x, y * size_y, 0.0],
            uv: [x, y],
        };
        Self {
            vertices: [
                corner(0.0, 0.0),
                corner(1.0, 0.0),
                corner(1.0, 1.0),
                corner(0.0, 1.0),
            ],
            width,
            height,
            rgba,
            version: 0,
        }
    }

    pub fn set_image(&mut self, width: u32, height: u32, rgba: Vec<u8>) {
        self.width = width;
        self.height = height;
        self.rgba = rgba;
        self.version += 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Points(PointsGeometry),
    Lines(LinesGeometry),
    Mesh(MeshGeometry),
    Textured(TexturedGeometry),
}

impl Geometry {
    pub fn version(&self) -> u64 {
        match self {
            Geometry::Points(points) => points.buffer.version(),
            Geometry::Lines(lines) => lines.buffer.version(),
            Geometry::Mesh(mesh) => mesh.version,
            Geometry::Textured(textured) => textured.version,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Geometry::Points(points) => points.buffer.is_empty(),
            Geometry::Lines(lines) => lines.segment_count() == 0,
            Geometry::Mesh(mesh) => mesh.indices.is_empty() || mesh.instances.is_empty(),
            Geometry::Textured(textured) => textured.width == 0 || textured.height == 0,
        }
    }
}

/// One drawable piece of a renderable, positioned relative to the renderable's pose.
#[derive(Debug)]
pub struct Primitive {
    pub geometry: Geometry,
    pub local: Transform,
    pub color: ColorRgba,
    pub picking: Picking,
    pub(crate) gpu: Option<GpuPrimitive>,
}

impl Primitive {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            local: Transform::IDENTITY,
            color: ColorRgba::WHITE,
            picking: Picking::Default,
            gpu: None,
        }
    }

    pub fn with_local(mut self, local: Transform) -> Self {
        self.local = local;
        self
    }

    pub fn with_color(mut self, color: ColorRgba) -> Self {
        self.color = color;
        self
    }

    pub fn with_picking(mut self, picking: Picking) -> Self {
        self.picking = picking;
        self
    }

    pub fn tint(&self) -> Vec4 {
        self.color.to_vec4()
    }

    pub fn is_uploaded(&self) -> bool {
        self.gpu.is_some()
    }
}

impl Clone for Primitive {
    fn clone(&self) -> Self {
        Self {
            geometry: self.geometry.clone(),
            local: self.local,
            color: self.color,
            picking: self.picking,
            gpu: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderableUserData {
    pub receive_time: Time,
    pub message_time: Time,
    pub frame_id: String,
    pub pose: Pose,
    pub settings_path: SettingsPath,
    pub topic: Option<String>,
    pub frame_locked: bool,
}

impl RenderableUserData {
    pub fn new(frame_id: impl Into<String>, settings_path: SettingsPath) -> Self {
        Self {
            receive_time: 0,
            message_time: 0,
            frame_id: frame_id.into(),
            pose: Pose::IDENTITY,
            settings_path,
            topic: None,
            frame_locked: false,
        }
    }
}

/// Outcome of resolving a renderable's pose for the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseUpdate {
    Resolved,
    MissingTransform,
}

/// Scene graph node. Owned by exactly one extension.
#[derive(Debug)]
pub struct Renderable {
    pub name: String,
    pick_id: u32,
    pub user_data: RenderableUserData,
    /// Visibility requested by settings.
    pub settings_visible: bool,
    transform_resolved: bool,
    world_pose: Pose,
    pub primitives: Vec<Primitive>,
    /// Extra fields shown for a picked object.
    pub details: serde_json::Value,
}

impl Renderable {
    pub fn new(name: impl Into<String>, user_data: RenderableUserData) -> Self {
        Self {
            name: name.into(),
            pick_id: next_pick_id(),
            user_data,
            settings_visible: true,
            transform_resolved: false,
            world_pose: Pose::IDENTITY,
            primitives: Vec::new(),
            details: serde_json::Value::Null,
        }
    }

    pub fn pick_id(&self) -> u32 {
        self.pick_id
    }

    /// Drawn this frame: enabled in settings and its transform resolved.
    pub fn visible(&self) -> bool {
        self.settings_visible && self.transform_resolved
    }

    pub fn world_pose(&self) -> &Pose {
        &self.world_pose
    }

    pub fn set_primitives(&mut self, primitives: Vec<Primitive>) {
        self.primitives = primitives;
    }

    /// Resolves the renderable's pose into the render frame. Frame-locked renderables resolve
    /// at `current_time` instead of their message time.
    pub fn update_pose(
        &mut self,
        tree: &TransformTree,
        render_frame_id: &str,
        fixed_frame_id: &str,
        current_time: Time,
    ) -> PoseUpdate {
        let src_time = if self.user_data.frame_locked {
            current_time
        } else {
            self.user_data.message_time
        };
        match tree.apply(
            &self.user_data.pose,
            render_frame_id,
            fixed_frame_id,
            &self.user_data.frame_id,
            current_time,
            src_time,
        ) {
            Some(pose) => {
                self.world_pose = pose;
                self.transform_resolved = true;
                PoseUpdate::Resolved
            }
            None => {
                self.transform_resolved = false;
                PoseUpdate::MissingTransform
            }
        }
    }

    /// World matrix of a primitive in the render frame.
    pub fn primitive_matrix(&self, primitive: &Primitive) -> Mat4 {
        (self.world_pose.matrix() * primitive.local.matrix()).as_mat4()
    }

    /// Releases GPU resources. CPU-side geometry is kept so the renderable can be re-uploaded.
    pub fn dispose(&mut self) {
        for primitive in &mut self.primitives {
            primitive.gpu = None;
        }
    }
}

impl Clone for Renderable {
    /// Clones get their own pick id.
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            pick_id: next_pick_id(),
            user_data: self.user_data.clone(),
            settings_visible: self.settings_visible,
            transform_resolved: self.transform_resolved,
            world_pose: self.world_pose,
            primitives: self.primitives.clone(),
            details: self.details.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::*;
    use crate::settings::topic_path;

    #[test]
    fn pick_ids_are_unique_and_never_no_hit() {
        let user_data = RenderableUserData::new("map", topic_path("/a"));
        let a = Renderable::new("a", user_data.clone());
        let b = a.clone();
        assert_ne!(a.pick_id(), b.pick_id());
        assert_ne!(a.pick_id(), u32::MAX);
        assert_ne!(a.pick_id(), 0);
    }

    #[test]
    fn hidden_until_transform_resolves() {
        let mut tree = TransformTree::new();
        let mut user_data = RenderableUserData::new("base_link", topic_path("/a"));
        user_data.pose = Pose::from_position(DVec3::new(1.0, 0.0, 0.0));
        user_data.message_time = 10;
        let mut renderable = Renderable::new("a", user_data);
        assert!(!renderable.visible());

        assert_eq!(
            renderable.update_pose(&tree, "map", "map", 10),
            PoseUpdate::MissingTransform
        );
        tree.add_transform("map", "base_link", 10, Transform::from_translation(DVec3::Z));
        assert_eq!(renderable.update_pose(&tree, "map", "map", 10), PoseUpdate::Resolved);
        assert!(renderable.visible());
        assert!(renderable
            .world_pose()
            .position
            .abs_diff_eq(DVec3::new(1.0, 0.0, 1.0), 1e-12));
    }

    #[test]
    fn frame_locked_uses_current_time() {
        let mut tree = TransformTree::new();
        tree.set_max_delta(0);
        tree.add_transform("map", "base_link", 100, Transform::IDENTITY);
        let mut user_data = RenderableUserData::new("base_link", topic_path("/a"));
        user_data.message_time = 5;
        let mut renderable = Renderable::new("a", user_data);
        assert_eq!(
            renderable.update_pose(&tree, "map", "map", 100),
            PoseUpdate::MissingTransform
        );
        renderable.user_data.frame_locked = true;
        assert_eq!(renderable.update_pose(&tree, "map", "map", 100), PoseUpdate::Resolved);
    }

    #[test]
    fn strips_become_segments() {
        let mut lines = LinesGeometry::new(1.0, false);
        let points = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0]];
        lines.set_strip(&points, &[[255; 4]; 3], false);
        assert_eq!(lines.segment_count(), 2);
        lines.set_strip(&points, &[[255; 4]; 3], true);
        assert_eq!(lines.segment_count(), 3);
        lines.set_segments(&points, &[[255; 4]; 3]);
        assert_eq!(lines.segment_count(), 1);
    }
}
