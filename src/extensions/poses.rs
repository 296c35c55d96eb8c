use glam::DVec3;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    color::ColorRgba,
    extensions::{
        primitives, topic_renderables::TopicRenderables, SceneContext, SceneExtension,
        Subscription,
    },
    messages::{schemas, Message, MessageEvent},
    scene_graph::{
        shapes::{self, ArrowDimensions},
        Geometry, Primitive, Renderable,
    },
    settings::{
        topic_path, SelectOption, SettingsTreeAction, SettingsTreeEntry, SettingsTreeField,
        SettingsTreeNode,
    },
    transforms::Transform,
};

pub const EXTENSION_ID: &str = "sceneview.Poses";
pub const INVALID_COVARIANCE: &str = "INVALID_COVARIANCE";

const SCHEMAS: &[&str] = &[schemas::POSE_STAMPED, schemas::POSE_WITH_COVARIANCE_STAMPED];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoseDisplay {
    #[default]
    Arrow,
    Axis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PoseSettings {
    pub visible: bool,
    #[serde(rename = "type")]
    pub display: PoseDisplay,
    /// Arrow length, shaft diameter and head diameter.
    pub arrow_scale: [f32; 3],
    pub axis_scale: f32,
    pub color: String,
    pub show_covariance: bool,
    pub covariance_color: String,
}

impl Default for PoseSettings {
    fn default() -> Self {
        Self {
            visible: true,
            display: PoseDisplay::Arrow,
            arrow_scale: [1.0, 0.15, 0.3],
            axis_scale: 1.0,
            color: "#ff6b6bff".to_string(),
            show_covariance: true,
            covariance_color: "#c6c6c640".to_string(),
        }
    }
}

/// Standard deviations of the position, when the message carried a covariance.
type PositionStdDev = Option<DVec3>;

fn pose_primitives(settings: &PoseSettings, std_dev: PositionStdDev) -> Vec<Primitive> {
    let mut result = match settings.display {
        PoseDisplay::Arrow => {
            let [length, shaft, head] = settings.arrow_scale;
            let dims = ArrowDimensions::from_scale(length, shaft, head, 0.0);
            let color = ColorRgba::from_hex(&settings.color).unwrap_or(ColorRgba::RED);
            primitives::arrow(&dims, color, Transform::IDENTITY)
        }
        PoseDisplay::Axis => vec![Primitive::new(Geometry::Lines(shapes::axes(
            settings.axis_scale,
            2.0,
        )))],
    };
    if let (true, Some(std_dev)) = (settings.show_covariance, std_dev) {
        let color = ColorRgba::from_hex(&settings.covariance_color)
            .unwrap_or(ColorRgba::WHITE.with_alpha(0.25));
        result.push(primitives::sphere(std_dev * 2.0, color, Transform::IDENTITY));
    }
    result
}

#[derive(Default)]
pub struct Poses {
    topics: TopicRenderables<PoseSettings, PositionStdDev>,
}

impl Poses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn renderable(&self, topic: &str) -> Option<&Renderable> {
        self.topics.get(topic).map(|entry| &entry.renderable)
    }
}

impl SceneExtension for Poses {
    fn extension_id(&self) -> &'static str {
        EXTENSION_ID
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        vec![Subscription::only_last(SCHEMAS)]
    }

    fn handle_message(&mut self, ctx: &mut SceneContext, event: &MessageEvent) {
        let (header, pose, std_dev) = match &event.message {
            Message::PoseStamped(msg) => (&msg.header, msg.pose, None),
            Message::PoseWithCovarianceStamped(msg) => {
                if let Err(err) = msg.validate() {
                    ctx.errors.add_to_topic(
                        &event.topic,
                        INVALID_COVARIANCE,
                        format!("Invalid pose covariance: {err}"),
                    );
                    return;
                }
                ctx.errors
                    .remove_from_topic(&event.topic, INVALID_COVARIANCE);
                (&msg.header, msg.pose, Some(msg.position_std_dev()))
            }
            _ => return,
        };

        let entry = self.topics.update(ctx, event, header, pose, std_dev);
        entry.renderable.settings_visible = entry.settings.visible;
        entry
            .renderable
            .set_primitives(pose_primitives(&entry.settings, std_dev));
        entry.renderable.details = json!({
            "topic": event.topic,
            "frameId": header.frame_id,
            "position": pose.position.to_array(),
        });
    }

    fn settings_nodes(&self, ctx: &SceneContext) -> Vec<SettingsTreeEntry> {
        ctx.topics
            .iter()
            .filter(|topic| SCHEMAS.contains(&topic.schema_name.as_str()))
            .map(|topic| {
                let settings: PoseSettings = ctx.config.topic_settings(&topic.name);
                let mut node = SettingsTreeNode::new(topic.name.clone())
                    .with_visible(settings.visible)
                    .with_field(
                        "type",
                        SettingsTreeField::select(
                            "Type",
                            vec![
                                SelectOption::new("Arrow", "arrow"),
                                SelectOption::new("Axis", "axis"),
                            ],
                            serde_json::to_value(settings.display).unwrap_or_default(),
                        ),
                    );
                node = match settings.display {
                    PoseDisplay::Arrow => node.with_field(
                        "color",
                        SettingsTreeField::rgba("Color", settings.color.clone()),
                    ),
                    PoseDisplay::Axis => node.with_field(
                        "axisScale",
                        SettingsTreeField::number("Scale", settings.axis_scale as f64, Some(0.0), Some(0.5)),
                    ),
                };
                if topic.schema_name == schemas::POSE_WITH_COVARIANCE_STAMPED {
                    node = node
                        .with_field(
                            "showCovariance",
                            SettingsTreeField::boolean("Covariance", settings.show_covariance),
                        )
                        .with_field(
                            "covarianceColor",
                            SettingsTreeField::rgba("Covariance color", settings.covariance_color.clone()),
                        );
                }
                SettingsTreeEntry::new(topic_path(&topic.name), node)
            })
            .collect()
    }

    fn handle_settings_action(&mut self, ctx: &mut SceneContext, action: &SettingsTreeAction) {
        if let Some(entry) = self.topics.apply_update(ctx, action) {
            entry.renderable.settings_visible = entry.settings.visible;
            entry
                .renderable
                .set_primitives(pose_primitives(&entry.settings, entry.message));
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        extensions::test_support::{context, frame},
        messages::{Header, PoseStamped, PoseWithCovarianceStamped},
        transforms::Pose,
    };

    fn with_covariance(variance: f64) -> MessageEvent {
        let mut covariance = [0.0; 36];
        for i in 0..6 {
            covariance[i * 7] = variance;
        }
        MessageEvent::new(
            "/estimate",
            schemas::POSE_WITH_COVARIANCE_STAMPED,
            0,
            Message::PoseWithCovarianceStamped(PoseWithCovarianceStamped {
                header: Header::new(0, "base_link"),
                pose: Pose::IDENTITY,
                covariance,
            }),
        )
    }

    #[test]
    fn draws_arrow_and_covariance() {
        let mut ctx = context();
        let mut extension = Poses::new();
        extension.handle_message(&mut ctx, &with_covariance(0.25));
        extension.start_frame(&mut ctx, &frame(0));

        let renderable = extension.renderable("/estimate").unwrap();
        assert!(renderable.visible());
        assert_eq!(renderable.primitives.len(), 3);
        let Geometry::Mesh(ellipsoid) = &renderable.primitives[2].geometry else {
            panic!("expected mesh");
        };
        assert_eq!(ellipsoid.instances[0].model[0][0], 1.0);
    }

    #[test]
    fn invalid_covariance_keeps_previous_pose() {
        let mut ctx = context();
        let mut extension = Poses::new();
        extension.handle_message(&mut ctx, &with_covariance(1.0));
        extension.handle_message(&mut ctx, &with_covariance(-1.0));
        assert!(ctx.errors.has_error(&topic_path("/estimate"), INVALID_COVARIANCE));
        assert_eq!(extension.renderable("/estimate").unwrap().primitives.len(), 3);
    }

    #[test]
    fn axis_display() {
        let mut ctx = context();
        ctx.config.topics.insert("/goal".into(), json!({ "type": "axis" }));
        let mut extension = Poses::new();
        let msg = PoseStamped {
            header: Header::new(0, "base_link"),
            pose: Pose::IDENTITY,
        };
        extension.handle_message(
            &mut ctx,
            &MessageEvent::new("/goal", schemas::POSE_STAMPED, 0, Message::PoseStamped(msg)),
        );
        let renderable = extension.renderable("/goal").unwrap();
        assert_eq!(renderable.primitives.len(), 1);
        assert!(matches!(renderable.primitives[0].geometry, Geometry::Lines(_)));
    }
}
