use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    extensions::{
        point_clouds::{point_settings_fields, TopicHistory},
        point_colors::{ColorMode, ColorModeSettings, PointColorizer},
        topic_update, FrameInfo, SceneContext, SceneExtension, Subscription,
    },
    messages::{schemas, LaserScan, Message, MessageEvent},
    scene_graph::{
        update_renderable_poses, Geometry, PointShape, PointsGeometry, Primitive,
        RenderObjectHistory, Renderable, RenderableUserData,
    },
    settings::{topic_path, SettingsTreeAction, SettingsTreeEntry, SettingsTreeNode},
};

pub const EXTENSION_ID: &str = "sceneview.LaserScans";
pub const INVALID_LASER_SCAN: &str = "INVALID_LASER_SCAN";

const SCHEMAS: &[&str] = &[schemas::LASER_SCAN, schemas::FOXGLOVE_LASER_SCAN];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LaserScanSettings {
    pub visible: bool,
    pub point_size: f32,
    pub point_shape: PointShape,
    pub decay_time: f64,
    #[serde(flatten)]
    pub color: ColorModeSettings,
}

impl Default for LaserScanSettings {
    fn default() -> Self {
        Self {
            visible: true,
            point_size: 4.0,
            point_shape: PointShape::Square,
            decay_time: 0.0,
            color: ColorModeSettings::default(),
        }
    }
}

fn scan_fields(scan: &LaserScan) -> Vec<String> {
    let mut fields = vec!["range".to_string()];
    if !scan.intensities.is_empty() {
        fields.push("intensity".to_string());
    }
    fields
}

/// Points of the in-range rays, in the scan frame.
pub fn scan_primitives(scan: &LaserScan, settings: &LaserScanSettings) -> Vec<Primitive> {
    let rays: Vec<(usize, [f32; 3])> = scan
        .points()
        .map(|(index, point)| (index, point.as_vec3().to_array()))
        .collect();

    let value_of = |index: usize| -> Option<f64> {
        match settings.color.color_field.as_deref()? {
            "range" => scan.ranges.get(index).map(|v| *v as f64),
            "intensity" => scan.intensities.get(index).map(|v| *v as f64),
            _ => None,
        }
    };
    let values: Vec<f64> = match settings.color.color_mode {
        ColorMode::Flat => Vec::new(),
        _ => rays
            .iter()
            .map_while(|(index, _)| value_of(*index))
            .collect(),
    };

    let positions: Vec<[f32; 3]> = rays.iter().map(|(_, point)| *point).collect();
    let colors: Vec<[u8; 4]> = if values.len() == positions.len() && !values.is_empty() {
        let colorizer = PointColorizer::new(&settings.color, &values);
        values.iter().map(|value| colorizer.color(*value)).collect()
    } else {
        vec![settings.color.flat().to_rgba8(); positions.len()]
    };

    let mut points = PointsGeometry::new(settings.point_size, settings.point_shape);
    points.buffer.set_positions_colors(&positions, &colors);
    vec![Primitive::new(Geometry::Points(points))]
}

struct TopicScans {
    settings: LaserScanSettings,
    fields: Vec<String>,
    history: TopicHistory<LaserScan>,
}

#[derive(Default)]
pub struct LaserScans {
    topics: BTreeMap<String, TopicScans>,
}

impl LaserScans {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self, topic: &str) -> Option<&RenderObjectHistory> {
        self.topics.get(topic).map(|entry| &entry.history.history)
    }
}

impl SceneExtension for LaserScans {
    fn extension_id(&self) -> &'static str {
        EXTENSION_ID
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        vec![Subscription::all(SCHEMAS)]
    }

    fn handle_message(&mut self, ctx: &mut SceneContext, event: &MessageEvent) {
        let Message::LaserScan(scan) = &event.message else {
            return;
        };
        let topic = event.topic.as_str();
        let validation = scan.validate();
        ctx.errors.error_if_false(
            validation.is_ok(),
            &topic_path(topic),
            INVALID_LASER_SCAN,
            validation
                .as_ref()
                .err()
                .map(|err| format!("Invalid laser scan: {err}"))
                .unwrap_or_default(),
        );
        if validation.is_err() {
            return;
        }

        let entry = self.topics.entry(topic.to_string()).or_insert_with(|| {
            let mut settings: LaserScanSettings = ctx.config.topic_settings(topic);
            let has_color_mode = ctx
                .config
                .topics
                .get(topic)
                .is_some_and(|value| value.get("colorMode").is_some());
            if !has_color_mode && !scan.intensities.is_empty() {
                settings.color = ColorModeSettings::for_fields(&["intensity"]);
            }
            TopicScans {
                history: TopicHistory::new(settings.decay_time),
                settings,
                fields: Vec::new(),
            }
        });
        let fields = scan_fields(scan);
        if fields != entry.fields {
            entry.fields = fields;
            ctx.invalidate_settings();
        }

        let mut user_data = RenderableUserData::new(&scan.header.frame_id, topic_path(topic));
        user_data.receive_time = event.receive_time;
        user_data.message_time = scan.header.stamp;
        user_data.pose = scan.pose;
        user_data.topic = Some(topic.to_string());

        let mut renderable = Renderable::new(topic, user_data);
        renderable.settings_visible = entry.settings.visible;
        renderable.set_primitives(scan_primitives(scan, &entry.settings));
        renderable.details = json!({
            "topic": topic,
            "frameId": scan.header.frame_id,
            "rays": scan.ranges.len(),
        });
        entry.history.push(event.receive_time, renderable, scan.clone());
    }

    fn settings_nodes(&self, ctx: &SceneContext) -> Vec<SettingsTreeEntry> {
        ctx.topics
            .iter()
            .filter(|topic| SCHEMAS.contains(&topic.schema_name.as_str()))
            .map(|topic| {
                let (settings, fields) = match self.topics.get(&topic.name) {
                    Some(entry) => (entry.settings.clone(), entry.fields.clone()),
                    None => (ctx.config.topic_settings(&topic.name), Vec::new()),
                };
                let mut node = SettingsTreeNode::new(topic.name.clone())
                    .with_visible(settings.visible);
                for (key, field) in
                    point_settings_fields(settings.point_size, settings.point_shape, settings.decay_time)
                {
                    node = node.with_field(key, field);
                }
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
        entry.history.update_decay(settings.decay_time, false);
        entry.history.set_visible(settings.visible);
        if previous != *settings {
            entry.history.rebuild(|scan| scan_primitives(scan, settings));
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
    use std::f64::consts::PI;

    use super::*;
    use crate::{
        extensions::test_support::{context, frame},
        messages::Header,
        transforms::Pose,
    };

    fn scan(stamp: u64, ranges: Vec<f32>, intensities: Vec<f32>) -> LaserScan {
        LaserScan {
            header: Header::new(stamp, "base_link"),
            pose: Pose::IDENTITY,
            start_angle: -PI / 2.0,
            end_angle: PI / 2.0,
            ranges,
            intensities,
            range_min: 0.1,
            range_max: 30.0,
        }
    }

    fn event(stamp: u64, scan: LaserScan) -> MessageEvent {
        MessageEvent::new("/scan", schemas::LASER_SCAN, stamp, Message::LaserScan(scan))
    }

    #[test]
    fn out_of_range_rays_are_dropped() {
        let mut ctx = context();
        let mut extension = LaserScans::new();
        extension.handle_message(
            &mut ctx,
            &event(0, scan(0, vec![1.0, f32::NAN, 100.0, 2.0], vec![1.0, 2.0, 3.0, 4.0])),
        );
        extension.start_frame(&mut ctx, &frame(0));

        let renderable = extension.renderables().next().unwrap();
        assert!(renderable.visible());
        let Geometry::Points(points) = &renderable.primitives[0].geometry else {
            panic!("expected points");
        };
        assert_eq!(points.buffer.len(), 2);
    }

    #[test]
    fn intensity_mismatch_is_a_topic_error() {
        let mut ctx = context();
        let mut extension = LaserScans::new();
        extension.handle_message(&mut ctx, &event(0, scan(0, vec![1.0, 2.0], vec![1.0])));
        assert!(ctx.errors.has_error(&topic_path("/scan"), INVALID_LASER_SCAN));
        assert!(extension.history("/scan").is_none());
    }

    #[test]
    fn settings_update_recolors_retained_scans() {
        let mut ctx = context();
        let mut extension = LaserScans::new();
        extension.handle_message(&mut ctx, &event(0, scan(0, vec![1.0, 2.0], vec![])));
        extension.handle_settings_action(
            &mut ctx,
            &SettingsTreeAction::Update {
                path: vec!["topics".into(), "/scan".into(), "flatColor".into()],
                input: "rgba".into(),
                value: json!("#ff0000ff"),
            },
        );
        let renderable = extension.renderables().next().unwrap();
        let Geometry::Points(points) = &renderable.primitives[0].geometry else {
            panic!("expected points");
        };
        assert_eq!(points.buffer.uint8("color").unwrap()[..4], [255, 0, 0, 255]);
    }
}
