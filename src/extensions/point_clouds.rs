use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    extensions::{
        point_colors::{packed_color_value, ColorMode, ColorModeSettings, PointColorizer},
        topic_update, FrameInfo, SceneContext, SceneExtension, Subscription,
    },
    messages::{schemas, Message, MessageEvent, PointCloud},
    scene_graph::{
        update_renderable_poses, Geometry, HistoryEntry, LinesGeometry, Primitive,
        PointShape, PointsGeometry, RenderObjectHistory, Renderable, RenderableUserData,
    },
    settings::{
        topic_path, SelectOption, SettingsTreeAction, SettingsTreeEntry, SettingsTreeField,
        SettingsTreeNode,
    },
    time::{secs_to_nanos, Time},
};

pub const EXTENSION_ID: &str = "sceneview.PointClouds";
pub const INVALID_POINT_CLOUD: &str = "INVALID_POINT_CLOUD";

const SCHEMAS: &[&str] = &[schemas::POINT_CLOUD2, schemas::POINT_CLOUD];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PointCloudSettings {
    pub visible: bool,
    pub point_size: f32,
    pub point_shape: PointShape,
    /// Seconds a cloud stays visible after newer ones arrive.
    pub decay_time: f64,
    pub stixels_enabled: bool,
    #[serde(flatten)]
    pub color: ColorModeSettings,
}

impl Default for PointCloudSettings {
    fn default() -> Self {
        Self {
            visible: true,
            point_size: 2.0,
            point_shape: PointShape::Circle,
            decay_time: 0.0,
            stixels_enabled: false,
            color: ColorModeSettings::default(),
        }
    }
}

/// Shared node fields of the streaming point extensions.
pub(crate) fn point_settings_fields(
    point_size: f32,
    point_shape: PointShape,
    decay_time: f64,
) -> Vec<(String, SettingsTreeField)> {
    vec![
        (
            "pointSize".to_string(),
            SettingsTreeField::number("Point size", point_size as f64, Some(1.0), Some(1.0)),
        ),
        (
            "pointShape".to_string(),
            SettingsTreeField::select(
                "Point shape",
                vec![
                    SelectOption::new("Circle", "circle"),
                    SelectOption::new("Square", "square"),
                ],
                serde_json::to_value(point_shape).unwrap_or_default(),
            ),
        ),
        (
            "decayTime".to_string(),
            SettingsTreeField::number("Decay time", decay_time, Some(0.0), Some(0.5)),
        ),
    ]
}

/// Render history of one topic together with the message each entry was built from, so the
/// retained entries can be rebuilt when settings change.
#[derive(Debug)]
pub(crate) struct TopicHistory<M> {
    pub history: RenderObjectHistory,
    sources: HashMap<u32, Arc<M>>,
}

impl<M> TopicHistory<M> {
    pub fn new(decay_time: f64) -> Self {
        Self {
            history: RenderObjectHistory::new(secs_to_nanos(decay_time)),
            sources: HashMap::new(),
        }
    }

    pub fn push(&mut self, receive_time: Time, renderable: Renderable, source: M) {
        self.sources.insert(renderable.pick_id(), Arc::new(source));
        self.history.add_history_entry(HistoryEntry {
            receive_time,
            message_time: renderable.user_data.message_time,
            renderable,
        });
        self.retain_sources();
    }

    pub fn prune(&mut self, current_time: Time) {
        self.history.update_history_from_current_time(current_time);
        self.retain_sources();
    }

    /// Applies a decay time given in seconds and collapses the history when asked to.
    pub fn update_decay(&mut self, decay_time: f64, collapse: bool) {
        let decay_time = secs_to_nanos(decay_time);
        if decay_time != self.history.decay_time() {
            self.history.set_decay_time(decay_time);
        }
        if collapse {
            self.history.clear_history();
        }
        self.retain_sources();
    }

    /// Replaces the primitives of every retained entry.
    pub fn rebuild(&mut self, mut primitives: impl FnMut(&M) -> Vec<Primitive>) {
        for renderable in self.history.renderables_mut() {
            if let Some(source) = self.sources.get(&renderable.pick_id()) {
                renderable.set_primitives(primitives(source));
            }
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        for renderable in self.history.renderables_mut() {
            renderable.settings_visible = visible;
        }
    }

    pub fn latest_source(&self) -> Option<&M> {
        let latest = self.history.latest()?;
        self.sources
            .get(&latest.renderable.pick_id())
            .map(Arc::as_ref)
    }

    fn retain_sources(&mut self) {
        let live: HashSet<u32> = self
            .history
            .renderables()
            .map(Renderable::pick_id)
            .collect();
        self.sources.retain(|id, _| live.contains(id));
    }
}

struct TopicClouds {
    settings: PointCloudSettings,
    field_names: Vec<String>,
    history: TopicHistory<PointCloud>,
}

#[derive(Default)]
pub struct PointClouds {
    topics: BTreeMap<String, TopicClouds>,
}

impl PointClouds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self, topic: &str) -> Option<&RenderObjectHistory> {
        self.topics.get(topic).map(|entry| &entry.history.history)
    }

    fn settings_for(ctx: &SceneContext, topic: &str, cloud: &PointCloud) -> PointCloudSettings {
        let mut settings: PointCloudSettings = ctx.config.topic_settings(topic);
        let has_color_mode = ctx
            .config
            .topics
            .get(topic)
            .is_some_and(|value| value.get("colorMode").is_some());
        if !has_color_mode {
            let names: Vec<&str> = cloud.fields.iter().map(|f| f.name.as_str()).collect();
            settings.color = ColorModeSettings::for_fields(&names);
        }
        settings
    }
}

/// Point (and optional stixel) primitives of a validated cloud, positioned in the cloud frame.
pub fn cloud_primitives(cloud: &PointCloud, settings: &PointCloudSettings) -> Vec<Primitive> {
    let (Some(x), Some(y), Some(z)) = (cloud.field("x"), cloud.field("y"), cloud.field("z")) else {
        return Vec::new();
    };
    let count = cloud.point_count();
    let positions: Vec<[f32; 3]> = (0..count)
        .into_par_iter()
        .map(|i| {
            [
                cloud.read(x, i) as f32,
                cloud.read(y, i) as f32,
                cloud.read(z, i) as f32,
            ]
        })
        .collect();

    let color_field = settings
        .color
        .color_field
        .as_deref()
        .and_then(|name| cloud.field(name));
    let values: Vec<f64> = match (settings.color.color_mode, color_field) {
        (ColorMode::Flat, _) | (_, None) => Vec::new(),
        (ColorMode::Rgb | ColorMode::Rgba, Some(field)) => (0..count)
            .into_par_iter()
            .map(|i| packed_color_value(cloud, &field.name, i).unwrap_or(0.0))
            .collect(),
        (_, Some(field)) => (0..count)
            .into_par_iter()
            .map(|i| cloud.read(field, i))
            .collect(),
    };
    let colors: Vec<[u8; 4]> = if values.is_empty() {
        vec![settings.color.flat().to_rgba8(); count]
    } else {
        let colorizer = PointColorizer::new(&settings.color, &values);
        values.par_iter().map(|value| colorizer.color(*value)).collect()
    };

    let (positions, colors): (Vec<[f32; 3]>, Vec<[u8; 4]>) = positions
        .into_iter()
        .zip(colors)
        .filter(|(position, _)| position.iter().all(|v| v.is_finite()))
        .unzip();

    let mut points = PointsGeometry::new(settings.point_size, settings.point_shape);
    points.buffer.set_positions_colors(&positions, &colors);
    let mut primitives = vec![Primitive::new(Geometry::Points(points))];

    if settings.stixels_enabled {
        let mut stixel_points = Vec::with_capacity(positions.len() * 2);
        let mut stixel_colors = Vec::with_capacity(colors.len() * 2);
        for (position, color) in positions.iter().zip(&colors) {
            stixel_points.extend([*position, [position[0], position[1], 0.0]]);
            stixel_colors.extend([*color, *color]);
        }
        let mut lines = LinesGeometry::new(1.0, false);
        lines.set_segments(&stixel_points, &stixel_colors);
        primitives.push(Primitive::new(Geometry::Lines(lines)));
    }
    primitives
}

/// Every field carries a numeric type, so any of them can drive a colour map.
fn field_names(cloud: &PointCloud) -> Vec<String> {
    cloud.fields.iter().map(|field| field.name.clone()).collect()
}

impl SceneExtension for PointClouds {
    fn extension_id(&self) -> &'static str {
        EXTENSION_ID
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        vec![Subscription::all(SCHEMAS)]
    }

    fn handle_message(&mut self, ctx: &mut SceneContext, event: &MessageEvent) {
        let Message::PointCloud(cloud) = &event.message else {
            return;
        };
        let topic = event.topic.as_str();
        let validation = cloud.validate();
        ctx.errors.error_if_false(
            validation.is_ok(),
            &topic_path(topic),
            INVALID_POINT_CLOUD,
            validation
                .as_ref()
                .err()
                .map(|err| format!("Invalid point cloud: {err}"))
                .unwrap_or_default(),
        );
        if validation.is_err() {
            return;
        }

        let entry = self.topics.entry(topic.to_string()).or_insert_with(|| {
            let settings = Self::settings_for(ctx, topic, cloud);
            TopicClouds {
                history: TopicHistory::new(settings.decay_time),
                settings,
                field_names: Vec::new(),
            }
        });
        let fields = field_names(cloud);
        if fields != entry.field_names {
            entry.field_names = fields;
            ctx.invalidate_settings();
        }

        let mut user_data = RenderableUserData::new(&cloud.header.frame_id, topic_path(topic));
        user_data.receive_time = event.receive_time;
        user_data.message_time = cloud.header.stamp;
        user_data.pose = cloud.pose;
        user_data.topic = Some(topic.to_string());

        let mut renderable = Renderable::new(topic, user_data);
        renderable.settings_visible = entry.settings.visible;
        renderable.set_primitives(cloud_primitives(cloud, &entry.settings));
        renderable.details = json!({
            "topic": topic,
            "frameId": cloud.header.frame_id,
            "points": cloud.point_count(),
        });
        entry
            .history
            .push(event.receive_time, renderable, cloud.clone());
    }

    fn settings_nodes(&self, ctx: &SceneContext) -> Vec<SettingsTreeEntry> {
        ctx.topics
            .iter()
            .filter(|topic| SCHEMAS.contains(&topic.schema_name.as_str()))
            .map(|topic| {
                let (settings, fields) = match self.topics.get(&topic.name) {
                    Some(entry) => (entry.settings.clone(), entry.field_names.clone()),
                    None => (ctx.config.topic_settings(&topic.name), Vec::new()),
                };
                let mut node = SettingsTreeNode::new(topic.name.clone())
                    .with_visible(settings.visible);
                for (key, field) in
                    point_settings_fields(settings.point_size, settings.point_shape, settings.decay_time)
                {
                    node = node.with_field(key, field);
                }
                node = node.with_field(
                    "stixelsEnabled",
                    SettingsTreeField::boolean("Stixels", settings.stixels_enabled),
                );
                node = settings.color.add_fields_to(node, &fields);
                SettingsTreeEntry::new(topic_path(&topic.name), node)
            })
            .collect()
    }

    fn handle_settings_action(&mut self, ctx: &mut SceneContext, action: &SettingsTreeAction) {
        let Some((topic, key, value)) = topic_update(action) else {
            return;
        };
        ctx.config.set_topic_setting(topic, key, value.clone());
        ctx.invalidate_settings();
        let Some(entry) = self.topics.get_mut(topic) else {
            return;
        };

        let previous = std::mem::replace(&mut entry.settings, ctx.config.topic_settings(topic));
        let settings = &entry.settings;
        let stixels_changed = previous.stixels_enabled != settings.stixels_enabled;
        entry
            .history
            .update_decay(settings.decay_time, stixels_changed);
        entry.history.set_visible(settings.visible);
        if previous != *settings {
            entry
                .history
                .rebuild(|cloud| cloud_primitives(cloud, settings));
        }
    }

    fn topics_changed(&mut self, ctx: &mut SceneContext) {
        let advertised: HashSet<&str> = ctx.topics.iter().map(|t| t.name.as_str()).collect();
        self.topics.retain(|topic, _| {
            let keep = advertised.contains(topic.as_str());
            if !keep {
                ctx.errors.clear_topic(topic);
            }
            keep
        });
        ctx.invalidate_settings();
    }

    fn start_frame(&mut self, ctx: &mut SceneContext, frame: &FrameInfo) {
        for entry in self.topics.values_mut() {
            entry.history.prune(frame.current_time);
        }
        update_renderable_poses(
            self.renderables_mut(),
            &ctx.transform_tree,
            &mut ctx.errors,
            &frame.render_frame_id,
            &frame.fixed_frame_id,
            frame.current_time,
        );
    }

    fn renderables<'a>(&'a self) -> Box<dyn Iterator<Item = &'a Renderable> + 'a> {
        Box::new(
            self.topics
                .values()
                .flat_map(|entry| entry.history.history.renderables()),
        )
    }

    fn renderables_mut<'a>(&'a mut self) -> Box<dyn Iterator<Item = &'a mut Renderable> + 'a> {
        Box::new(
            self.topics
                .values_mut()
                .flat_map(|entry| entry.history.history.renderables_mut()),
        )
    }

    fn remove_all_renderables(&mut self) {
        self.topics.clear();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        extensions::test_support::{context, frame},
        messages::{point_cloud::test_support::xyzi_cloud, Topic},
        time::NANOS_PER_SEC,
    };

    fn event(receive_time: Time, cloud: PointCloud) -> MessageEvent {
        MessageEvent::new("/points", schemas::POINT_CLOUD2, receive_time, Message::PointCloud(cloud))
    }

    fn update(key: &str, value: serde_json::Value) -> SettingsTreeAction {
        SettingsTreeAction::Update {
            path: vec!["topics".into(), "/points".into(), key.into()],
            input: "number".into(),
            value,
        }
    }

    fn point_count(renderable: &Renderable) -> usize {
        match &renderable.primitives[0].geometry {
            Geometry::Points(points) => points.buffer.len(),
            other => panic!("unexpected geometry {other:?}"),
        }
    }

    #[test]
    fn builds_colored_points() {
        let mut ctx = context();
        let mut extension = PointClouds::new();
        let cloud = xyzi_cloud("base_link", 0, &[[1.0, 2.0, 3.0, 0.0], [4.0, 5.0, 6.0, 1.0]]);
        extension.handle_message(&mut ctx, &event(0, cloud));

        let renderable = extension.renderables().next().unwrap();
        assert_eq!(point_count(renderable), 2);
        let Geometry::Points(points) = &renderable.primitives[0].geometry else {
            unreachable!()
        };
        assert_eq!(points.buffer.float32("position").unwrap()[..3], [1.0, 2.0, 3.0]);
        let colors = points.buffer.uint8("color").unwrap();
        assert_ne!(colors[..4], colors[4..8]);
    }

    #[test]
    fn invalid_cloud_keeps_previous_render() {
        let mut ctx = context();
        let mut extension = PointClouds::new();
        extension.handle_message(&mut ctx, &event(0, xyzi_cloud("base_link", 0, &[[0.0; 4]; 3])));

        let mut broken = xyzi_cloud("base_link", 1, &[[0.0; 4]; 5]);
        broken.data.truncate(70);
        extension.handle_message(&mut ctx, &event(1, broken));

        assert!(ctx.errors.has_error(&topic_path("/points"), INVALID_POINT_CLOUD));
        let history = extension.history("/points").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(point_count(&history.latest().unwrap().renderable), 3);

        extension.handle_message(&mut ctx, &event(2, xyzi_cloud("base_link", 2, &[[0.0; 4]; 4])));
        assert!(!ctx.errors.has_error(&topic_path("/points"), INVALID_POINT_CLOUD));
    }

    #[test]
    fn decay_keeps_recent_clouds() {
        let mut ctx = context();
        ctx.config.topics.insert("/points".into(), json!({ "decayTime": 1.0 }));
        let mut extension = PointClouds::new();
        for i in 0..4u64 {
            let stamp = i * NANOS_PER_SEC / 2;
            extension.handle_message(&mut ctx, &event(stamp, xyzi_cloud("base_link", stamp, &[[0.0; 4]])));
        }
        extension.start_frame(&mut ctx, &frame(3 * NANOS_PER_SEC / 2));
        assert_eq!(extension.history("/points").unwrap().len(), 3);
        assert!(extension.renderables().all(Renderable::visible));

        extension.handle_settings_action(&mut ctx, &update("decayTime", json!(0.0)));
        assert_eq!(extension.history("/points").unwrap().len(), 1);
    }

    #[test]
    fn stixel_toggle_collapses_history() {
        let mut ctx = context();
        ctx.config.topics.insert("/points".into(), json!({ "decayTime": 10.0 }));
        let mut extension = PointClouds::new();
        for stamp in 0..3 {
            extension.handle_message(&mut ctx, &event(stamp, xyzi_cloud("base_link", stamp, &[[1.0; 4]])));
        }
        assert_eq!(extension.history("/points").unwrap().len(), 3);

        extension.handle_settings_action(&mut ctx, &update("stixelsEnabled", json!(true)));
        let history = extension.history("/points").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().renderable.primitives.len(), 2);
        assert_eq!(history.decay_time(), 10 * NANOS_PER_SEC);
    }

    #[test]
    fn decay_and_stixel_updates_commute() {
        let orders = [
            [("decayTime", json!(0.0)), ("stixelsEnabled", json!(true))],
            [("stixelsEnabled", json!(true)), ("decayTime", json!(0.0))],
        ];
        for order in orders {
            let mut ctx = context();
            ctx.config.topics.insert("/points".into(), json!({ "decayTime": 10.0 }));
            let mut extension = PointClouds::new();
            for stamp in 0..3 {
                extension.handle_message(&mut ctx, &event(stamp, xyzi_cloud("base_link", stamp, &[[1.0; 4]])));
            }
            for (key, value) in order {
                extension.handle_settings_action(&mut ctx, &update(key, value));
            }
            let history = extension.history("/points").unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history.decay_time(), 0);
            assert_eq!(history.latest().unwrap().renderable.primitives.len(), 2);
        }
    }

    #[test]
    fn settings_nodes_follow_topics() {
        let mut ctx = context();
        ctx.topics = vec![
            Topic::new("/points", schemas::POINT_CLOUD2),
            Topic::new("/scan", schemas::LASER_SCAN),
        ];
        let extension = PointClouds::new();
        let nodes = extension.settings_nodes(&ctx);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].path, topic_path("/points"));
        assert!(nodes[0].node.field("decayTime").is_some());
    }
}
