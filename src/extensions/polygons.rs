use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    color::ColorRgba,
    extensions::{
        primitives::{self, LineMode},
        topic_renderables::TopicRenderables,
        SceneContext, SceneExtension, Subscription,
    },
    messages::{schemas, Message, MessageEvent, PolygonStamped},
    scene_graph::{Primitive, Renderable},
    settings::{topic_path, SettingsTreeAction, SettingsTreeEntry, SettingsTreeField, SettingsTreeNode},
    transforms::{Pose, Transform},
};

pub const EXTENSION_ID: &str = "sceneview.Polygons";

const SCHEMAS: &[&str] = &[schemas::POLYGON_STAMPED];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PolygonSettings {
    pub visible: bool,
    pub line_width: f32,
    pub color: String,
}

impl Default for PolygonSettings {
    fn default() -> Self {
        Self {
            visible: true,
            line_width: 0.1,
            color: "#7dcfffff".to_string(),
        }
    }
}

fn polygon_primitives(settings: &PolygonSettings, polygon: &PolygonStamped) -> Vec<Primitive> {
    let color = ColorRgba::from_hex(&settings.color).unwrap_or(ColorRgba::BLUE);
    vec![primitives::lines(
        &polygon.points,
        |_| color,
        settings.line_width,
        true,
        LineMode::Loop,
        Transform::IDENTITY,
    )]
}

#[derive(Default)]
pub struct Polygons {
    topics: TopicRenderables<PolygonSettings, PolygonStamped>,
}

impl Polygons {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn renderable(&self, topic: &str) -> Option<&Renderable> {
        self.topics.get(topic).map(|entry| &entry.renderable)
    }
}

impl SceneExtension for Polygons {
    fn extension_id(&self) -> &'static str {
        EXTENSION_ID
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        vec![Subscription::only_last(SCHEMAS)]
    }

    fn handle_message(&mut self, ctx: &mut SceneContext, event: &MessageEvent) {
        let Message::PolygonStamped(polygon) = &event.message else {
            return;
        };
        let entry = self
            .topics
            .update(ctx, event, &polygon.header, Pose::IDENTITY, polygon.clone());
        entry.renderable.settings_visible = entry.settings.visible;
        entry
            .renderable
            .set_primitives(polygon_primitives(&entry.settings, &entry.message));
        entry.renderable.details = json!({
            "topic": event.topic,
            "frameId": polygon.header.frame_id,
            "points": polygon.points.len(),
        });
    }

    fn settings_nodes(&self, ctx: &SceneContext) -> Vec<SettingsTreeEntry> {
        ctx.topics
            .iter()
            .filter(|topic| topic.schema_name == schemas::POLYGON_STAMPED)
            .map(|topic| {
                let settings: PolygonSettings = ctx.config.topic_settings(&topic.name);
                let node = SettingsTreeNode::new(topic.name.clone())
                    .with_visible(settings.visible)
                    .with_field(
                        "lineWidth",
                        SettingsTreeField::number("Line width", settings.line_width as f64, Some(0.0), Some(0.01)),
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
                .set_primitives(polygon_primitives(&entry.settings, &entry.message));
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
