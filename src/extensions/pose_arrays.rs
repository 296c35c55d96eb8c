use glam::{DVec3, Mat4};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    color::ColorRgba,
    extensions::{
        primitives::{self, LineMode},
        topic_renderables::TopicRenderables,
        SceneContext, SceneExtension, Subscription,
    },
    messages::{schemas, Message, MessageEvent, PoseArray},
    scene_graph::{
        shapes::{self, ArrowDimensions},
        Geometry, LinesGeometry, MeshInstance, Primitive, Renderable,
    },
    settings::{
        topic_path, SelectOption, SettingsTreeAction, SettingsTreeEntry, SettingsTreeField,
        SettingsTreeNode,
    },
    transforms::{Pose, Transform},
};

pub const EXTENSION_ID: &str = "sceneview.PoseArrays";

const SCHEMAS: &[&str] = &[schemas::POSE_ARRAY, schemas::NAV_PATH];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoseArrayDisplay {
    Arrow,
    Axis,
    Line,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PoseArraySettings {
    pub visible: bool,
    /// Defaults to a line for paths and arrows otherwise.
    #[serde(rename = "type")]
    pub display: Option<PoseArrayDisplay>,
    pub arrow_scale: [f32; 3],
    pub axis_scale: f32,
    pub line_width: f32,
    pub color: String,
}

impl Default for PoseArraySettings {
    fn default() -> Self {
        Self {
            visible: true,
            display: None,
            arrow_scale: [1.0, 0.15, 0.3],
            axis_scale: 1.0,
            line_width: 0.2,
            color: "#7dcfffff".to_string(),
        }
    }
}

struct PoseList {
    poses: Vec<Pose>,
    is_path: bool,
}

impl PoseArraySettings {
    fn display_for(&self, is_path: bool) -> PoseArrayDisplay {
        self.display.unwrap_or(if is_path {
            PoseArrayDisplay::Line
        } else {
            PoseArrayDisplay::Arrow
        })
    }
}

fn pose_array_primitives(settings: &PoseArraySettings, list: &PoseList) -> Vec<Primitive> {
    let color = ColorRgba::from_hex(&settings.color).unwrap_or(ColorRgba::BLUE);
    match settings.display_for(list.is_path) {
        PoseArrayDisplay::Arrow => {
            let [length, shaft, head] = settings.arrow_scale;
            let (shaft_part, head_part) =
                shapes::arrow_parts(&ArrowDimensions::from_scale(length, shaft, head, 0.0));
            let instances = |part: Mat4| -> Vec<MeshInstance> {
                list.poses
                    .iter()
                    .map(|pose| MeshInstance::new(pose.matrix().as_mat4() * part, color))
                    .collect()
            };
            vec![
                primitives::instanced(shapes::cylinder(12, 1.0, 1.0), instances(shaft_part)),
                primitives::instanced(shapes::cylinder(12, 1.0, 0.0), instances(head_part)),
            ]
        }
        PoseArrayDisplay::Axis => {
            let length = settings.axis_scale as f64;
            let colors = [ColorRgba::RED, ColorRgba::GREEN, ColorRgba::BLUE].map(|c| c.to_rgba8());
            let mut points = Vec::with_capacity(list.poses.len() * 6);
            let mut point_colors = Vec::with_capacity(list.poses.len() * 6);
            for pose in &list.poses {
                let transform = Transform::from_pose(pose);
                for (axis, color) in [DVec3::X, DVec3::Y, DVec3::Z].into_iter().zip(colors) {
                    points.push(primitives::to_f32(pose.position));
                    points.push(primitives::to_f32(transform.transform_point(axis * length)));
                    point_colors.extend([color, color]);
                }
            }
            let mut lines = LinesGeometry::new(2.0, false);
            lines.set_segments(&points, &point_colors);
            vec![Primitive::new(Geometry::Lines(lines))]
        }
        PoseArrayDisplay::Line => {
            let positions: Vec<DVec3> = list.poses.iter().map(|pose| pose.position).collect();
            vec![primitives::lines(
                &positions,
                |_| color,
                settings.line_width,
                true,
                LineMode::Strip,
                Transform::IDENTITY,
            )]
        }
    }
}

#[derive(Default)]
pub struct PoseArrays {
    topics: TopicRenderables<PoseArraySettings, PoseList>,
}

impl PoseArrays {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn renderable(&self, topic: &str) -> Option<&Renderable> {
        self.topics.get(topic).map(|entry| &entry.renderable)
    }
}

impl SceneExtension for PoseArrays {
    fn extension_id(&self) -> &'static str {
        EXTENSION_ID
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        vec![Subscription::only_last(SCHEMAS)]
    }

    fn handle_message(&mut self, ctx: &mut SceneContext, event: &MessageEvent) {
        let (array, is_path) = match &event.message {
            Message::PoseArray(array) => (array.clone(), false),
            Message::NavPath(path) => (PoseArray::from(path), true),
            _ => return,
        };
        let list = PoseList {
            poses: array.poses,
            is_path,
        };
        let entry = self
            .topics
            .update(ctx, event, &array.header, Pose::IDENTITY, list);
        entry.renderable.settings_visible = entry.settings.visible;
        entry
            .renderable
            .set_primitives(pose_array_primitives(&entry.settings, &entry.message));
        entry.renderable.details = json!({
            "topic": event.topic,
            "frameId": array.header.frame_id,
            "poses": entry.message.poses.len(),
        });
    }

    fn settings_nodes(&self, ctx: &SceneContext) -> Vec<SettingsTreeEntry> {
        ctx.topics
            .iter()
            .filter(|topic| SCHEMAS.contains(&topic.schema_name.as_str()))
            .map(|topic| {
                let settings: PoseArraySettings = ctx.config.topic_settings(&topic.name);
                let display = settings.display_for(topic.schema_name == schemas::NAV_PATH);
                let mut node = SettingsTreeNode::new(topic.name.clone())
                    .with_visible(settings.visible)
                    .with_field(
                        "type",
                        SettingsTreeField::select(
                            "Type",
                            vec![
                                SelectOption::new("Arrow", "arrow"),
                                SelectOption::new("Axis", "axis"),
                                SelectOption::new("Line", "line"),
                            ],
                            serde_json::to_value(display).unwrap_or_default(),
                        ),
                    );
                node = match display {
                    PoseArrayDisplay::Axis => node.with_field(
                        "axisScale",
                        SettingsTreeField::number("Scale", settings.axis_scale as f64, Some(0.0), Some(0.5)),
                    ),
                    PoseArrayDisplay::Line => node
                        .with_field(
                            "lineWidth",
                            SettingsTreeField::number("Line width", settings.line_width as f64, Some(0.0), Some(0.05)),
                        )
                        .with_field("color", SettingsTreeField::rgba("Color", settings.color.clone())),
                    PoseArrayDisplay::Arrow => {
                        node.with_field("color", SettingsTreeField::rgba("Color", settings.color.clone()))
                    }
                };
                SettingsTreeEntry::new(topic_path(&topic.name), node)
            })
            .collect()
    }

    fn handle_settings_action(&mut self, ctx: &mut SceneContext, action: &SettingsTreeAction) {
        if let Some(entry) = self.topics.apply_update(ctx, action) {
            entry.renderable.settings_visible = entry.settings.visible;
            entry
                .renderable
                .set_primitives(pose_array_primitives(&entry.settings, &entry.message));
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
        extensions::test_support::context,
        messages::{Header, NavPath, PoseStamped},
    };

    fn poses() -> Vec<Pose> {
        (0..3)
            .map(|i| Pose::from_position(DVec3::new(i as f64, 0.0, 0.0)))
            .collect()
    }

    #[test]
    fn arrays_draw_instanced_arrows() {
        let mut ctx = context();
        let mut extension = PoseArrays::new();
        let array = PoseArray {
            header: Header::new(0, "base_link"),
            poses: poses(),
        };
        extension.handle_message(
            &mut ctx,
            &MessageEvent::new("/particles", schemas::POSE_ARRAY, 0, Message::PoseArray(array)),
        );
        let renderable = extension.renderable("/particles").unwrap();
        assert_eq!(renderable.primitives.len(), 2);
        let Geometry::Mesh(shaft) = &renderable.primitives[0].geometry else {
            panic!("expected mesh");
        };
        assert_eq!(shaft.instances.len(), 3);
    }

    #[test]
    fn paths_default_to_lines() {
        let mut ctx = context();
        let mut extension = PoseArrays::new();
        let path = NavPath {
            header: Header::new(0, "base_link"),
            poses: poses()
                .into_iter()
                .map(|pose| PoseStamped {
                    header: Header::new(0, "base_link"),
                    pose,
                })
                .collect(),
        };
        extension.handle_message(
            &mut ctx,
            &MessageEvent::new("/plan", schemas::NAV_PATH, 0, Message::NavPath(path)),
        );
        let renderable = extension.renderable("/plan").unwrap();
        let Geometry::Lines(lines) = &renderable.primitives[0].geometry else {
            panic!("expected lines");
        };
        assert_eq!(lines.segment_count(), 2);
    }
}
