use std::collections::{BTreeMap, BTreeSet};

use glam::DVec3;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    color::ColorRgba,
    config::TransformDisplaySettings,
    extensions::{
        primitives::{self, LineMode},
        FrameInfo, SceneContext, SceneExtension,
    },
    scene_graph::{shapes, update_renderable_poses, Geometry, Primitive, Renderable, RenderableUserData},
    settings::{SettingsPath, SettingsTreeAction, SettingsTreeEntry, SettingsTreeNode},
    time::Time,
    transforms::{Transform, TransformTree},
};

pub const EXTENSION_ID: &str = "sceneview.FrameAxes";
pub const CYCLE_DETECTED: &str = "CYCLE_DETECTED";

const FRAME_PREFIX: &str = "frame:";

/// Settings path of a coordinate frame's node.
pub fn frame_settings_path(frame_id: &str) -> SettingsPath {
    vec!["transforms".to_string(), format!("{FRAME_PREFIX}{frame_id}")]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    pub visible: bool,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self { visible: true }
    }
}

struct FrameEntry {
    renderable: Renderable,
    /// Parent origin in this frame when the primitives were last built.
    parent_offset: Option<DVec3>,
    display: TransformDisplaySettings,
}

/// Origin of the parent frame expressed in `frame_id` at `time`.
fn parent_offset(tree: &TransformTree, frame_id: &str, time: Time) -> Option<DVec3> {
    let frame = tree.frame(frame_id)?;
    frame.parent_id()?;
    let to_parent: Transform = frame.transform_at(time, tree.max_delta())?;
    Some(to_parent.inverse().transform_point(DVec3::ZERO))
}

fn frame_primitives(display: &TransformDisplaySettings, parent_offset: Option<DVec3>) -> Vec<Primitive> {
    let mut result = vec![Primitive::new(Geometry::Lines(shapes::axes(
        display.axis_scale as f32,
        display.line_width as f32 * 1.5,
    )))];
    if let Some(offset) = parent_offset {
        let color = ColorRgba::from_hex(&display.line_color).unwrap_or(ColorRgba::WHITE);
        result.push(primitives::lines(
            &[DVec3::ZERO, offset],
            |_| color,
            display.line_width as f32,
            false,
            LineMode::List,
            Transform::IDENTITY,
        ));
    }
    result
}

#[derive(Default)]
pub struct FrameAxes {
    frames: BTreeMap<String, FrameEntry>,
}

impl FrameAxes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn axes(&self, frame_id: &str) -> Option<&Renderable> {
        self.frames.get(frame_id).map(|entry| &entry.renderable)
    }

    fn sync_frames(&mut self, ctx: &mut SceneContext) {
        let known: BTreeSet<&str> = ctx.transform_tree.frames().map(|f| f.id()).collect();
        let before = self.frames.len();
        self.frames.retain(|id, _| known.contains(id.as_str()));
        let mut changed = self.frames.len() != before;

        for id in known {
            if self.frames.contains_key(id) {
                continue;
            }
            let mut user_data = RenderableUserData::new(id, frame_settings_path(id));
            user_data.frame_locked = true;
            let mut renderable = Renderable::new(id, user_data);
            renderable.details = json!({ "frameId": id });
            self.frames.insert(
                id.to_string(),
                FrameEntry {
                    renderable,
                    parent_offset: None,
                    display: ctx.config.scene.transforms.clone(),
                },
            );
            changed = true;
        }
        if changed {
            ctx.invalidate_settings();
        }
    }
}

impl SceneExtension for FrameAxes {
    fn extension_id(&self) -> &'static str {
        EXTENSION_ID
    }

    fn settings_nodes(&self, ctx: &SceneContext) -> Vec<SettingsTreeEntry> {
        let mut root = SettingsTreeNode::new("Transforms").with_order(3);
        for entry in ctx.transform_tree.frame_list() {
            let settings: FrameSettings = ctx.config.transform_settings(&entry.id);
            root = root.with_child(
                format!("{FRAME_PREFIX}{}", entry.id),
                SettingsTreeNode::new(entry.id.clone()).with_visible(settings.visible),
            );
        }
        vec![SettingsTreeEntry::new(vec!["transforms".into()], root)]
    }

    fn handle_settings_action(&mut self, ctx: &mut SceneContext, action: &SettingsTreeAction) {
        let SettingsTreeAction::Update { path, value, .. } = action else {
            return;
        };
        let [root, node, key] = path.as_slice() else {
            return;
        };
        let Some(frame_id) = node.strip_prefix(FRAME_PREFIX) else {
            return;
        };
        if root != "transforms" {
            return;
        }
        ctx.config.set_transform_setting(frame_id, key, value.clone());
        ctx.invalidate_settings();
        if let Some(entry) = self.frames.get_mut(frame_id) {
            let settings: FrameSettings = ctx.config.transform_settings(frame_id);
            entry.renderable.settings_visible = settings.visible;
        }
    }

    fn start_frame(&mut self, ctx: &mut SceneContext, frame: &FrameInfo) {
        self.sync_frames(ctx);
        let display = &ctx.config.scene.transforms;
        for (id, entry) in &mut self.frames {
            let offset = parent_offset(&ctx.transform_tree, id, frame.current_time);
            let stale = entry.renderable.primitives.is_empty()
                || entry.parent_offset != offset
                || entry.display != *display;
            if stale {
                entry.renderable.set_primitives(frame_primitives(display, offset));
                entry.parent_offset = offset;
                entry.display = display.clone();
            }
            let settings: FrameSettings = ctx.config.transform_settings(id);
            entry.renderable.settings_visible = settings.visible;
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
        Box::new(self.frames.values().map(|entry| &entry.renderable))
    }

    fn renderables_mut<'a>(&'a mut self) -> Box<dyn Iterator<Item = &'a mut Renderable> + 'a> {
        Box::new(self.frames.values_mut().map(|entry| &mut entry.renderable))
    }

    fn remove_all_renderables(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::test_support::{context, frame};

    #[test]
    fn draws_axes_and_parent_link() {
        let mut ctx = context();
        ctx.transform_tree.add_transform(
            "base_link",
            "lidar",
            0,
            Transform::from_translation(DVec3::new(0.0, 0.0, 2.0)),
        );
        let mut extension = FrameAxes::new();
        extension.start_frame(&mut ctx, &frame(0));

        let map = extension.axes("map").unwrap();
        assert_eq!(map.primitives.len(), 1);
        let lidar = extension.axes("lidar").unwrap();
        assert_eq!(lidar.primitives.len(), 2);
        assert!(lidar.visible());
        assert!(lidar.world_pose().position.abs_diff_eq(DVec3::new(0.0, 0.0, 2.0), 1e-9));
        assert!(ctx.take_settings_invalidated());

        let nodes = extension.settings_nodes(&ctx);
        assert!(nodes[0].node.child("frame:lidar").is_some());
    }

    #[test]
    fn frames_can_be_hidden() {
        let mut ctx = context();
        let mut extension = FrameAxes::new();
        extension.start_frame(&mut ctx, &frame(0));
        extension.handle_settings_action(
            &mut ctx,
            &SettingsTreeAction::Update {
                path: vec!["transforms".into(), "frame:base_link".into(), "visible".into()],
                input: "boolean".into(),
                value: json!(false),
            },
        );
        extension.start_frame(&mut ctx, &frame(0));
        assert!(!extension.axes("base_link").unwrap().visible());
        assert!(extension.axes("map").unwrap().visible());
    }

    #[test]
    fn cleared_tree_drops_axes() {
        let mut ctx = context();
        let mut extension = FrameAxes::new();
        extension.start_frame(&mut ctx, &frame(0));
        ctx.transform_tree.clear();
        extension.start_frame(&mut ctx, &frame(0));
        assert_eq!(extension.renderables().count(), 0);
    }
}
