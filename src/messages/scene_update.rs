use glam::DVec3;

use crate::{
    color::ColorRgba,
    time::{Duration, Time},
    transforms::Pose,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ArrowPrimitive {
    pub pose: Pose,
    pub shaft_length: f64,
    pub shaft_diameter: f64,
    pub head_length: f64,
    pub head_diameter: f64,
    pub color: ColorRgba,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CubePrimitive {
    pub pose: Pose,
    pub size: DVec3,
    pub color: ColorRgba,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpherePrimitive {
    pub pose: Pose,
    pub size: DVec3,
    pub color: ColorRgba,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CylinderPrimitive {
    pub pose: Pose,
    pub size: DVec3,
    pub bottom_scale: f64,
    pub top_scale: f64,
    pub color: ColorRgba,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineType {
    Strip,
    Loop,
    List,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinePrimitive {
    pub line_type: LineType,
    pub pose: Pose,
    pub thickness: f64,
    pub scale_invariant: bool,
    pub points: Vec<DVec3>,
    pub color: ColorRgba,
    pub colors: Vec<ColorRgba>,
    /// Optional indices into `points`.
    pub indices: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriangleListPrimitive {
    pub pose: Pose,
    pub points: Vec<DVec3>,
    pub color: ColorRgba,
    pub colors: Vec<ColorRgba>,
    pub indices: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextPrimitive {
    pub pose: Pose,
    pub billboard: bool,
    pub font_size: f64,
    pub color: ColorRgba,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelPrimitive {
    pub pose: Pose,
    pub scale: DVec3,
    pub color: ColorRgba,
    pub override_color: bool,
    pub url: String,
    pub media_type: String,
    /// Inline model bytes; used instead of `url` when non-empty.
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneEntity {
    pub timestamp: Time,
    pub frame_id: String,
    pub id: String,
    /// Zero means forever.
    pub lifetime: Duration,
    pub frame_locked: bool,
    pub arrows: Vec<ArrowPrimitive>,
    pub cubes: Vec<CubePrimitive>,
    pub spheres: Vec<SpherePrimitive>,
    pub cylinders: Vec<CylinderPrimitive>,
    pub lines: Vec<LinePrimitive>,
    pub triangles: Vec<TriangleListPrimitive>,
    pub texts: Vec<TextPrimitive>,
    pub models: Vec<ModelPrimitive>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionKind {
    MatchingId,
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneEntityDeletion {
    pub timestamp: Time,
    pub kind: DeletionKind,
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneUpdate {
    pub deletions: Vec<SceneEntityDeletion>,
    pub entities: Vec<SceneEntity>,
}
