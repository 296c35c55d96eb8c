pub mod coordinate_frame;
pub mod transform;
pub mod transform_tree;

pub use coordinate_frame::{ClosestTransforms, CoordinateFrame};
pub use transform::{Pose, Transform};
pub use transform_tree::{normalize_frame_id, AddTransformResult, FrameListEntry, TransformTree};
