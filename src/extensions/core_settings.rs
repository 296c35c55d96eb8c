//! Renderer-wide settings: follow frame and mode, scene appearance and the camera.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
    config::FollowMode,
    extensions::{SceneContext, SceneExtension},
    scene_graph::Renderable,
    settings::{SelectOption, SettingsTreeAction, SettingsTreeEntry, SettingsTreeField, SettingsTreeNode},
};

pub const EXTENSION_ID: &str = "sceneview.CoreSettings";

/// Replaces the serde field `key` of `target`. Returns false and leaves `target` untouched if
/// the result does not deserialize.
pub(crate) fn set_serde_field<T: Serialize + DeserializeOwned>(target: &mut T, key: &str, value: Value) -> bool {
    let Ok(Value::Object(mut map)) = serde_json::to_value(&*target) else {
        return false;
    };
    map.insert(key.to_string(), value);
    match serde_json::from_value(Value::Object(map)) {
        Ok(updated) => {
            *target = updated;
            true
        }
        Err(err) => {
            log::warn!("Rejected setting {key}: {err}");
            false
        }
    }
}

#[derive(Default)]
pub struct CoreSettings;

impl CoreSettings {
    pub fn new() -> Self {
        Self
    }

    fn general_node(ctx: &SceneContext) -> SettingsTreeNode {
        let mut frames = vec![SelectOption::new("(auto)", Value::Null)];
        frames.extend(ctx.transform_tree.frame_list().into_iter().map(|entry| {
            let label = format!("{}{}", "  ".repeat(entry.depth), entry.id);
            SelectOption::new(label, entry.id)
        }));
        let follow_tf = ctx
            .config
            .follow_tf
            .clone()
            .map_or(Value::Null, Value::String);
        SettingsTreeNode::new("Frame")
            .with_order(0)
            .with_field("followTf", SettingsTreeField::select("Display frame", frames, follow_tf))
            .with_field(
                "followMode",
                SettingsTreeField::select(
                    "Follow mode",
                    vec![
                        SelectOption::new("Pose", "follow-pose"),
                        SelectOption::new("Position", "follow-position"),
                        SelectOption::new("Fixed", "follow-none"),
                    ],
                    serde_json::to_value(ctx.config.follow_mode).unwrap_or_default(),
                ),
            )
    }

    fn scene_node(ctx: &SceneContext) -> SettingsTreeNode {
        let scene = &ctx.config.scene;
        let transforms = &scene.transforms;
        SettingsTreeNode::new("Scene")
            .with_order(1)
            .with_field(
                "backgroundColor",
                SettingsTreeField::rgba("Background", scene.background_color.clone().unwrap_or_default()),
            )
            .with_field(
                "labelScaleFactor",
                SettingsTreeField::number("Label scale", scene.label_scale_factor, Some(0.0), Some(0.1)),
            )
            .with_field("enableStats", SettingsTreeField::boolean("Render stats", scene.enable_stats))
            .with_field(
                "ignoreColladaUpAxis",
                SettingsTreeField::boolean("Ignore COLLADA up axis", scene.ignore_collada_up_axis),
            )
            .with_child(
                "transforms",
                SettingsTreeNode::new("Transforms")
                    .with_field("showLabel", SettingsTreeField::boolean("Labels", transforms.show_label))
                    .with_field(
                        "axisScale",
                        SettingsTreeField::number("Axis scale", transforms.axis_scale, Some(0.0), Some(0.1)),
                    )
                    .with_field(
                        "lineWidth",
                        SettingsTreeField::number("Line width", transforms.line_width, Some(0.0), Some(0.5)),
                    )
                    .with_field("lineColor", SettingsTreeField::rgba("Line color", transforms.line_color.clone())),
            )
    }

    fn camera_node(ctx: &SceneContext) -> SettingsTreeNode {
        let camera = &ctx.config.camera_state;
        SettingsTreeNode::new("View")
            .with_order(2)
            .with_field("distance", SettingsTreeField::number("Distance", camera.distance, Some(0.0), Some(1.0)))
            .with_field("perspective", SettingsTreeField::boolean("3D", camera.perspective))
            .with_field("phi", SettingsTreeField::number("Phi", camera.phi, Some(0.0), Some(1.0)))
            .with_field(
                "thetaOffset",
                SettingsTreeField::number("Theta", camera.theta_offset, None, Some(1.0)),
            )
            .with_field("fovy", SettingsTreeField::number("Y-axis FOV", camera.fovy, Some(1.0), Some(1.0)))
            .with_field("near", SettingsTreeField::number("Near", camera.near, Some(0.0), Some(0.1)))
            .with_field("far", SettingsTreeField::number("Far", camera.far, Some(0.0), Some(100.0)))
    }
}

impl SceneExtension for CoreSettings {
    fn extension_id(&self) -> &'static str {
        EXTENSION_ID
    }

    fn settings_nodes(&self, ctx: &SceneContext) -> Vec<SettingsTreeEntry> {
        vec![
            SettingsTreeEntry::new(vec!["general".into()], Self::general_node(ctx)),
            SettingsTreeEntry::new(vec!["scene".into()], Self::scene_node(ctx)),
            SettingsTreeEntry::new(vec!["cameraState".into()], Self::camera_node(ctx)),
        ]
    }

    fn handle_settings_action(&mut self, ctx: &mut SceneContext, action: &SettingsTreeAction) {
        let SettingsTreeAction::Update { path, value, .. } = action else {
            return;
        };
        let path: Vec<&str> = path.iter().map(String::as_str).collect();
        let changed = match path.as_slice() {
            ["general", "followTf"] => {
                ctx.config.follow_tf = value.as_str().filter(|id| !id.is_empty()).map(str::to_string);
                log::info!("Display frame set to {:?}", ctx.config.follow_tf);
                true
            }
            ["general", "followMode"] => match serde_json::from_value::<FollowMode>(value.clone()) {
                Ok(mode) => {
                    ctx.config.follow_mode = mode;
                    true
                }
                Err(err) => {
                    log::warn!("Rejected follow mode {value}: {err}");
                    false
                }
            },
            ["scene", "backgroundColor"] => {
                ctx.config.scene.background_color =
                    value.as_str().filter(|hex| !hex.is_empty()).map(str::to_string);
                true
            }
            ["scene", "transforms", key] => {
                set_serde_field(&mut ctx.config.scene.transforms, key, value.clone())
            }
            ["scene", key] => set_serde_field(&mut ctx.config.scene, key, value.clone()),
            ["cameraState", key] => set_serde_field(&mut ctx.config.camera_state, key, value.clone()),
            _ => false,
        };
        if changed {
            ctx.invalidate_settings();
        }
    }

    fn renderables<'a>(&'a self) -> Box<dyn Iterator<Item = &'a Renderable> + 'a> {
        Box::new(std::iter::empty())
    }

    fn renderables_mut<'a>(&'a mut self) -> Box<dyn Iterator<Item = &'a mut Renderable> + 'a> {
        Box::new(std::iter::empty())
    }

    fn remove_all_renderables(&mut self) {}
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::extensions::test_support::context;

    fn update(path: &[&str], value: Value) -> SettingsTreeAction {
        SettingsTreeAction::Update {
            path: path.iter().map(|s| s.to_string()).collect(),
            input: String::new(),
            value,
        }
    }

    #[test]
    fn lists_frames_for_follow_selection() {
        let ctx = context();
        let nodes = CoreSettings::new().settings_nodes(&ctx);
        let general = &nodes[0].node;
        let field = general.field("followTf").unwrap();
        let serialized = serde_json::to_value(field).unwrap();
        let values: Vec<_> = serialized["options"]
            .as_array()
            .unwrap()
            .iter()
            .map(|option| option["value"].clone())
            .collect();
        assert_eq!(values, vec![Value::Null, json!("map"), json!("base_link")]);
    }

    #[test]
    fn updates_write_through_to_config() {
        let mut ctx = context();
        let mut core = CoreSettings::new();
        core.handle_settings_action(&mut ctx, &update(&["general", "followTf"], json!("base_link")));
        core.handle_settings_action(&mut ctx, &update(&["general", "followMode"], json!("follow-none")));
        core.handle_settings_action(&mut ctx, &update(&["scene", "enableStats"], json!(true)));
        core.handle_settings_action(&mut ctx, &update(&["scene", "transforms", "axisScale"], json!(2.5)));
        core.handle_settings_action(&mut ctx, &update(&["cameraState", "distance"], json!(5.0)));

        assert_eq!(ctx.config.follow_tf.as_deref(), Some("base_link"));
        assert_eq!(ctx.config.follow_mode, FollowMode::None);
        assert!(ctx.config.scene.enable_stats);
        assert_eq!(ctx.config.scene.transforms.axis_scale, 2.5);
        assert_eq!(ctx.config.camera_state.distance, 5.0);
        assert!(ctx.take_settings_invalidated());
    }

    #[test]
    fn malformed_values_are_ignored() {
        let mut ctx = context();
        let mut core = CoreSettings::new();
        core.handle_settings_action(&mut ctx, &update(&["cameraState", "distance"], json!("far")));
        assert_eq!(ctx.config.camera_state.distance, 20.0);
        assert!(!ctx.take_settings_invalidated());
    }
}
