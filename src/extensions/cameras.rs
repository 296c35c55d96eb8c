use glam::DVec3;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    color::ColorRgba,
    extensions::{
        primitives::{self, LineMode},
        topic_renderables::TopicRenderables,
        SceneContext, SceneExtension, Subscription,
    },
    messages::{camera_info::PinholeModel, schemas, Message, MessageEvent},
    scene_graph::{Primitive, Renderable},
    settings::{topic_path, SettingsTreeAction, SettingsTreeEntry, SettingsTreeField, SettingsTreeNode},
    transforms::{Pose, Transform},
};

pub const EXTENSION_ID: &str = "sceneview.Cameras";
pub const CAMERA_MODEL: &str = "CAMERA_MODEL";

const SCHEMAS: &[&str] = &[schemas::CAMERA_INFO, schemas::CAMERA_CALIBRATION];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CameraInfoSettings {
    pub visible: bool,
    /// Depth of the frustum in metres.
    pub distance: f64,
    pub width: f32,
    pub color: String,
}

impl Default for CameraInfoSettings {
    fn default() -> Self {
        Self {
            visible: true,
            distance: 1.0,
            width: 0.01,
            color: "#7dcfffff".to_string(),
        }
    }
}

/// Edges of the viewing frustum: four rays from the optical centre and the image rectangle.
fn frustum_segments(model: &PinholeModel, depth: f64) -> Vec<DVec3> {
    let corners = model.corners(depth);
    let mut points = Vec::with_capacity(16);
    for (i, corner) in corners.iter().enumerate() {
        points.extend([DVec3::ZERO, *corner]);
        points.extend([*corner, corners[(i + 1) % corners.len()]]);
    }
    points
}

fn camera_primitives(settings: &CameraInfoSettings, model: &PinholeModel) -> Vec<Primitive> {
    let color = ColorRgba::from_hex(&settings.color).unwrap_or(ColorRgba::BLUE);
    vec![primitives::lines(
        &frustum_segments(model, settings.distance),
        |_| color,
        settings.width,
        true,
        LineMode::List,
        Transform::IDENTITY,
    )]
}

#[derive(Default)]
pub struct Cameras {
    topics: TopicRenderables<CameraInfoSettings, PinholeModel>,
}

impl Cameras {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn renderable(&self, topic: &str) -> Option<&Renderable> {
        self.topics.get(topic).map(|entry| &entry.renderable)
    }
}

impl SceneExtension for Cameras {
    fn extension_id(&self) -> &'static str {
        EXTENSION_ID
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        vec![Subscription::only_last(SCHEMAS)]
    }

    fn handle_message(&mut self, ctx: &mut SceneContext, event: &MessageEvent) {
        let Message::CameraInfo(info) = &event.message else {
            return;
        };
        let model = match PinholeModel::from_camera_info(info) {
            Ok(model) => model,
            Err(err) => {
                ctx.errors.add_to_topic(
                    &event.topic,
                    CAMERA_MODEL,
                    format!("Failed to create camera model: {err}"),
                );
                return;
            }
        };
        ctx.errors.remove_from_topic(&event.topic, CAMERA_MODEL);

        let entry = self
            .topics
            .update(ctx, event, &info.header, Pose::IDENTITY, model);
        entry.renderable.settings_visible = entry.settings.visible;
        entry
            .renderable
            .set_primitives(camera_primitives(&entry.settings, &entry.message));
        entry.renderable.details = json!({
            "topic": event.topic,
            "frameId": info.header.frame_id,
            "width": info.width,
            "height": info.height,
            "distortionModel": info.distortion_model,
        });
    }

    fn settings_nodes(&self, ctx: &SceneContext) -> Vec<SettingsTreeEntry> {
        ctx.topics
            .iter()
            .filter(|topic| SCHEMAS.contains(&topic.schema_name.as_str()))
            .map(|topic| {
                let settings: CameraInfoSettings = ctx.config.topic_settings(&topic.name);
                let node = SettingsTreeNode::new(topic.name.clone())
                    .with_visible(settings.visible)
                    .with_field(
                        "distance",
                        SettingsTreeField::number("Distance", settings.distance, Some(0.0), Some(0.1)),
                    )
                    .with_field(
                        "width",
                        SettingsTreeField::number("Line width", settings.width as f64, Some(0.0), Some(0.005)),
                    )
                    .with_field("color", SettingsTreeField::rgba("Color", settings.color.clone()));
                SettingsTreeEntry::new(topic_path(&topic.name), node)
            })
            .collect()
    }

    fn handle_settings_action(&mut self, ctx: &mut SceneContext, action: &SettingsTreeAction) {
        if let Some(entry) = self.topics.apply_update(ctx, action) {
            entry.renderable.settings_visible = entry.settings.visible;
            entry
                .renderable
                .set_primitives(camera_primitives(&entry.settings, &entry.message));
        }
    }

    fn topics_changed(&mut self, ctx: &mut SceneContext) {
        self.topics.retain_advertised(ctx);
    }

    fn renderables<'a>(&'a self) -> Box<dyn Iterator<Item = &'a Renderable> + 'a> {
        Box::new(self.topics.renderables())
    }

    fn renderables_mut<'a>(&'a mut self) -> Box<dyn Iterator<Item = &'a mut Renderable> + 'a> {
        Box::new(self.topics.renderables_mut())
    }

    fn remove_all_renderables(&mut self) {
        self.topics.clear();
    }
}
