use glam::DVec3;

use crate::{
    color::ColorRgba,
    error::MessageError,
    messages::Header,
    time::Duration,
    transforms::Pose,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerType {
    Arrow,
    Cube,
    Sphere,
    Cylinder,
    LineStrip,
    LineList,
    CubeList,
    SphereList,
    Points,
    TextViewFacing,
    MeshResource,
    TriangleList,
}

impl TryFrom<i32> for MarkerType {
    type Error = MessageError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => MarkerType::Arrow,
            1 => MarkerType::Cube,
            2 => MarkerType::Sphere,
            3 => MarkerType::Cylinder,
            4 => MarkerType::LineStrip,
            5 => MarkerType::LineList,
            6 => MarkerType::CubeList,
            7 => MarkerType::SphereList,
            8 => MarkerType::Points,
            9 => MarkerType::TextViewFacing,
            10 => MarkerType::MeshResource,
            11 => MarkerType::TriangleList,
            other => return Err(MessageError::UnknownMarkerType(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerAction {
    Add,
    Delete,
    DeleteAll,
}

impl TryFrom<i32> for MarkerAction {
    type Error = MessageError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            // ADD and MODIFY share a value
            0 => Ok(MarkerAction::Add),
            2 => Ok(MarkerAction::Delete),
            3 => Ok(MarkerAction::DeleteAll),
            other => Err(MessageError::Invalid(format!("unsupported marker action {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub header: Header,
    pub ns: String,
    pub id: i32,
    /// Raw type value; unknown values are reported as topic errors.
    pub marker_type: i32,
    pub action: MarkerAction,
    pub pose: Pose,
    pub scale: DVec3,
    pub color: ColorRgba,
    /// Zero means forever.
    pub lifetime: Duration,
    pub frame_locked: bool,
    pub points: Vec<DVec3>,
    pub colors: Vec<ColorRgba>,
    pub text: String,
    pub mesh_resource: String,
    pub mesh_use_embedded_materials: bool,
}

impl Marker {
    pub fn new(frame_id: &str, ns: &str, id: i32, marker_type: MarkerType) -> Self {
        Self {
            header: Header::new(0, frame_id),
            ns: ns.to_string(),
            id,
            marker_type: marker_type as i32,
            action: MarkerAction::Add,
            pose: Pose::IDENTITY,
            scale: DVec3::ONE,
            color: ColorRgba::WHITE,
            lifetime: 0,
            frame_locked: false,
            points: Vec::new(),
            colors: Vec::new(),
            text: String::new(),
            mesh_resource: String::new(),
            mesh_use_embedded_materials: false,
        }
    }

    pub fn kind(&self) -> Result<MarkerType, MessageError> {
        MarkerType::try_from(self.marker_type)
    }

    /// Per-point colour, falling back to the marker colour.
    pub fn point_color(&self, index: usize) -> ColorRgba {
        self.colors.get(index).copied().unwrap_or(self.color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_types() {
        assert_eq!(MarkerType::try_from(10), Ok(MarkerType::MeshResource));
        assert_eq!(
            MarkerType::try_from(42),
            Err(MessageError::UnknownMarkerType(42))
        );
        let marker = Marker::new("map", "ns", 1, MarkerType::TriangleList);
        assert_eq!(marker.kind(), Ok(MarkerType::TriangleList));
        assert_eq!(MarkerAction::try_from(0), Ok(MarkerAction::Add));
    }
}
