//! Scene extensions turn messages of particular schemas into renderables and contribute
//! settings-tree nodes.

pub mod cameras;
pub mod core_settings;
pub mod frame_axes;
pub mod grids;
pub mod laser_scans;
pub mod markers;
pub mod measurement_tool;
pub mod occupancy_grids;
pub mod point_clouds;
pub mod point_colors;
pub mod polygons;
pub mod pose_arrays;
pub mod poses;
pub mod primitives;
pub mod publish_click_tool;
pub mod registry;
pub mod scene_entities;
pub mod topic_renderables;

use std::sync::mpsc::{channel, Receiver, Sender};

use glam::{DVec3, Vec2};
use serde_json::Value;

use crate::{
    config::RendererConfig,
    math::Ray,
    messages::{MessageEvent, Topic},
    models::ModelCache,
    scene_graph::{update_renderable_poses, Renderable},
    settings::{LayerErrors, SettingsTreeAction, SettingsTreeEntry},
    time::Time,
    transforms::{Pose, TransformTree},
};

pub use registry::{ExtensionFactory, ExtensionRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterQueue {
    /// Every message is delivered.
    #[default]
    All,
    /// Only the newest message per topic in a batch is delivered.
    OnlyLastByTopic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub schema_names: &'static [&'static str],
    pub filter_queue: FilterQueue,
}

impl Subscription {
    pub const fn all(schema_names: &'static [&'static str]) -> Self {
        Self {
            schema_names,
            filter_queue: FilterQueue::All,
        }
    }

    pub const fn only_last(schema_names: &'static [&'static str]) -> Self {
        Self {
            schema_names,
            filter_queue: FilterQueue::OnlyLastByTopic,
        }
    }
}

/// The frames a tick renders in. Both ids are empty until a coordinate frame exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    pub current_time: Time,
    pub render_frame_id: String,
    pub fixed_frame_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Measure,
    Publish,
}

/// A click in the 3D view.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneClick {
    pub cursor: Vec2,
    pub ray: Option<Ray>,
    /// Intersection of the ray with the ground plane of the render frame.
    pub ground_point: Option<DVec3>,
    pub render_frame_id: Option<String>,
}

/// Messages produced by interaction tools for the player.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishEvent {
    Point {
        topic: String,
        frame_id: String,
        point: DVec3,
    },
    Pose {
        topic: String,
        frame_id: String,
        pose: Pose,
    },
    PoseEstimate {
        topic: String,
        frame_id: String,
        pose: Pose,
        /// Row-major 6x6.
        covariance: Vec<f64>,
    },
}

/// State shared with every extension during a call.
pub struct SceneContext {
    pub config: RendererConfig,
    pub transform_tree: TransformTree,
    pub errors: LayerErrors,
    pub models: ModelCache,
    pub topics: Vec<Topic>,
    pub current_time: Time,
    pub render_frame_id: Option<String>,
    pub fixed_frame_id: Option<String>,
    pub active_tool: Option<ToolKind>,
    settings_invalidated: bool,
    publish_observers: Vec<Sender<PublishEvent>>,
}

impl SceneContext {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            transform_tree: TransformTree::new(),
            errors: LayerErrors::new(),
            models: ModelCache::default(),
            topics: Vec::new(),
            current_time: 0,
            render_frame_id: None,
            fixed_frame_id: None,
            active_tool: None,
            settings_invalidated: false,
            publish_observers: Vec::new(),
        }
    }

    /// Requests that the calling extension's settings nodes be rebuilt.
    pub fn invalidate_settings(&mut self) {
        self.settings_invalidated = true;
    }

    pub(crate) fn take_settings_invalidated(&mut self) -> bool {
        std::mem::take(&mut self.settings_invalidated)
    }

    pub fn subscribe_publish(&mut self) -> Receiver<PublishEvent> {
        let (tx, rx) = channel();
        self.publish_observers.push(tx);
        rx
    }

    pub fn publish(&mut self, event: PublishEvent) {
        log::info!("Publishing {event:?}");
        self.publish_observers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn topic_schema(&self, topic: &str) -> Option<&str> {
        self.topics
            .iter()
            .find(|t| t.name == topic)
            .map(|t| t.schema_name.as_str())
    }
}

/// The plugin contract of the renderer.
pub trait SceneExtension {
    fn extension_id(&self) -> &'static str;

    fn subscriptions(&self) -> Vec<Subscription> {
        Vec::new()
    }

    fn handle_message(&mut self, _ctx: &mut SceneContext, _event: &MessageEvent) {}

    fn settings_nodes(&self, _ctx: &SceneContext) -> Vec<SettingsTreeEntry> {
        Vec::new()
    }

    fn handle_settings_action(&mut self, _ctx: &mut SceneContext, _action: &SettingsTreeAction) {}

    /// Called when the advertised topics change.
    fn topics_changed(&mut self, _ctx: &mut SceneContext) {}

    /// Updates poses and expires content before the frame is drawn.
    fn start_frame(&mut self, ctx: &mut SceneContext, frame: &FrameInfo) {
        update_renderable_poses(
            self.renderables_mut(),
            &ctx.transform_tree,
            &mut ctx.errors,
            &frame.render_frame_id,
            &frame.fixed_frame_id,
            frame.current_time,
        );
    }

    fn renderables<'a>(&'a self) -> Box<dyn Iterator<Item = &'a Renderable> + 'a>;

    fn renderables_mut<'a>(&'a mut self) -> Box<dyn Iterator<Item = &'a mut Renderable> + 'a>;

    fn remove_all_renderables(&mut self);

    /// Returns true if the click was consumed.
    fn handle_scene_click(&mut self, _ctx: &mut SceneContext, _click: &SceneClick) -> bool {
        false
    }

    fn dispose(&mut self) {
        self.remove_all_renderables();
    }
}

/// The value of an update whose field key is `key`.
pub(crate) fn update_value<'a>(action: &'a SettingsTreeAction, key: &str) -> Option<&'a Value> {
    match action {
        SettingsTreeAction::Update { path, value, .. } if path.last().map(String::as_str) == Some(key) => {
            Some(value)
        }
        _ => None,
    }
}

/// The field key and value of an update under `["topics", topic]`.
pub(crate) fn topic_update(action: &SettingsTreeAction) -> Option<(&str, &str, &Value)> {
    match action {
        SettingsTreeAction::Update { path, value, .. } if path.len() == 3 && path[0] == "topics" => {
            Some((path[1].as_str(), path[2].as_str(), value))
        }
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::transforms::Transform;

    /// A context with `map -> base_link` at the origin.
    pub fn context() -> SceneContext {
        let mut ctx = SceneContext::new(RendererConfig::default());
        ctx.transform_tree
            .add_transform("map", "base_link", 0, Transform::IDENTITY);
        ctx
    }

    pub fn frame(current_time: Time) -> FrameInfo {
        FrameInfo {
            current_time,
            render_frame_id: "map".into(),
            fixed_frame_id: "map".into(),
        }
    }
}
