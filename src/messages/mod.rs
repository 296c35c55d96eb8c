//! Normalized message records delivered by the player. Records arrive already decoded; the
//! renderer only validates their contents.

pub mod camera_info;
pub mod geometry;
pub mod laser_scan;
pub mod marker;
pub mod occupancy_grid;
pub mod point_cloud;
pub mod scene_update;

use glam::{DQuat, DVec3};

use crate::time::Time;

pub use camera_info::CameraInfo;
pub use geometry::{NavPath, PolygonStamped, PoseArray, PoseStamped, PoseWithCovarianceStamped};
pub use laser_scan::LaserScan;
pub use marker::{Marker, MarkerAction, MarkerType};
pub use occupancy_grid::{MapMetaData, OccupancyGrid};
pub use point_cloud::{NumericType, PointCloud, PointField};
pub use scene_update::{SceneEntity, SceneEntityDeletion, SceneUpdate};

pub use crate::color::ColorRgba;

/// Schema names the renderer routes on.
pub mod schemas {
    pub const TF: &str = "tf2_msgs/TFMessage";
    pub const TRANSFORM_STAMPED: &str = "geometry_msgs/TransformStamped";
    pub const FRAME_TRANSFORM: &str = "foxglove.FrameTransform";
    pub const FRAME_TRANSFORMS: &str = "foxglove.FrameTransforms";
    pub const POINT_CLOUD2: &str = "sensor_msgs/PointCloud2";
    pub const POINT_CLOUD: &str = "foxglove.PointCloud";
    pub const LASER_SCAN: &str = "sensor_msgs/LaserScan";
    pub const FOXGLOVE_LASER_SCAN: &str = "foxglove.LaserScan";
    pub const MARKER: &str = "visualization_msgs/Marker";
    pub const MARKER_ARRAY: &str = "visualization_msgs/MarkerArray";
    pub const POSE_STAMPED: &str = "geometry_msgs/PoseStamped";
    pub const POSE_WITH_COVARIANCE_STAMPED: &str = "geometry_msgs/PoseWithCovarianceStamped";
    pub const POSE_ARRAY: &str = "geometry_msgs/PoseArray";
    pub const NAV_PATH: &str = "nav_msgs/Path";
    pub const CAMERA_INFO: &str = "sensor_msgs/CameraInfo";
    pub const CAMERA_CALIBRATION: &str = "foxglove.CameraCalibration";
    pub const POLYGON_STAMPED: &str = "geometry_msgs/PolygonStamped";
    pub const OCCUPANCY_GRID: &str = "nav_msgs/OccupancyGrid";
    pub const SCENE_UPDATE: &str = "foxglove.SceneUpdate";

    pub const TRANSFORMS: &[&str] = &[TF, TRANSFORM_STAMPED, FRAME_TRANSFORM, FRAME_TRANSFORMS];
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    pub stamp: Time,
    pub frame_id: String,
}

impl Header {
    pub fn new(stamp: Time, frame_id: impl Into<String>) -> Self {
        Self {
            stamp,
            frame_id: frame_id.into(),
        }
    }
}

/// A single time-stamped edge of the transform graph.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTransform {
    pub timestamp: Time,
    pub parent_frame_id: String,
    pub child_frame_id: String,
    pub translation: DVec3,
    pub rotation: DQuat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    FrameTransform(FrameTransform),
    FrameTransforms(Vec<FrameTransform>),
    PointCloud(PointCloud),
    LaserScan(LaserScan),
    Marker(Marker),
    MarkerArray(Vec<Marker>),
    PoseStamped(PoseStamped),
    PoseWithCovarianceStamped(PoseWithCovarianceStamped),
    PoseArray(PoseArray),
    NavPath(NavPath),
    CameraInfo(CameraInfo),
    PolygonStamped(PolygonStamped),
    OccupancyGrid(OccupancyGrid),
    SceneUpdate(SceneUpdate),
}

/// A message delivered on a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub topic: String,
    pub schema_name: String,
    pub receive_time: Time,
    pub message: Message,
}

impl MessageEvent {
    pub fn new(topic: impl Into<String>, schema_name: &str, receive_time: Time, message: Message) -> Self {
        Self {
            topic: topic.into(),
            schema_name: schema_name.to_string(),
            receive_time,
            message,
        }
    }

    pub fn is_transform(&self) -> bool {
        matches!(
            self.message,
            Message::FrameTransform(_) | Message::FrameTransforms(_)
        )
    }
}

/// A topic advertised by the player.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Topic {
    pub name: String,
    pub schema_name: String,
}

impl Topic {
    pub fn new(name: impl Into<String>, schema_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema_name: schema_name.into(),
        }
    }
}
