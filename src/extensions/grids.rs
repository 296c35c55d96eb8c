//! User-added reference grids stored as custom layers.

use std::collections::BTreeMap;

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    color::ColorRgba,
    extensions::{FrameInfo, SceneContext, SceneExtension},
    scene_graph::{shapes, update_renderable_poses, Geometry, Picking, Primitive, Renderable, RenderableUserData},
    settings::{
        SettingsPath, SettingsTreeAction, SettingsTreeEntry, SettingsTreeField, SettingsTreeNode,
        SettingsTreeNodeAction,
    },
    transforms::Pose,
};

pub const EXTENSION_ID: &str = "sceneview.Grids";
pub const LAYER_ID: &str = "sceneview.Grid";

const ADD_GRID: &str = "add-grid";
const DELETE: &str = "delete";

fn layer_path(instance_id: &str) -> SettingsPath {
    vec!["layers".to_string(), instance_id.to_string()]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GridSettings {
    pub layer_id: String,
    pub label: String,
    pub visible: bool,
    /// Follows the display frame when unset.
    pub frame_id: Option<String>,
    pub size: f32,
    pub divisions: u32,
    pub line_width: f32,
    pub color: String,
    pub position: [f64; 3],
    /// Roll, pitch and yaw in degrees.
    pub rotation: [f64; 3],
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            layer_id: LAYER_ID.to_string(),
            label: "Grid".to_string(),
            visible: true,
            frame_id: None,
            size: 10.0,
            divisions: 10,
            line_width: 1.0,
            color: "#248eff".to_string(),
            position: [0.0; 3],
            rotation: [0.0; 3],
        }
    }
}

impl GridSettings {
    fn pose(&self) -> Pose {
        let [roll, pitch, yaw] = self.rotation.map(f64::to_radians);
        Pose::new(
            DVec3::from(self.position),
            DQuat::from_euler(glam::EulerRot::ZYX, yaw, pitch, roll),
        )
    }
}

struct GridLayer {
    settings: GridSettings,
    renderable: Renderable,
}

fn grid_primitive(settings: &GridSettings) -> Primitive {
    let color = ColorRgba::from_hex(&settings.color).unwrap_or(ColorRgba::WHITE);
    Primitive::new(Geometry::Lines(shapes::grid(
        settings.size,
        settings.divisions,
        color,
        settings.line_width,
    )))
    .with_picking(Picking::Disabled)
}

/// Grid layers found in the config.
fn configured_grids(ctx: &SceneContext) -> BTreeMap<String, GridSettings> {
    ctx.config
        .layers
        .keys()
        .map(|id| (id.clone(), ctx.config.layer_settings::<GridSettings>(id)))
        .filter(|(_, settings)| settings.layer_id == LAYER_ID)
        .collect()
}

#[derive(Default)]
pub struct Grids {
    layers: BTreeMap<String, GridLayer>,
    next_id: u32,
}

impl Grids {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(&self, instance_id: &str) -> Option<&Renderable> {
        self.layers.get(instance_id).map(|layer| &layer.renderable)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn add_grid(&mut self, ctx: &mut SceneContext) -> String {
        let instance_id = loop {
            self.next_id += 1;
            let id = format!("grid-{}", self.next_id);
            if !ctx.config.layers.contains_key(&id) {
                break id;
            }
        };
        let settings = GridSettings::default();
        match serde_json::to_value(&settings) {
            Ok(value) => {
                ctx.config.layers.insert(instance_id.clone(), value);
            }
            Err(err) => log::error!("Failed to store grid layer: {err}"),
        }
        log::info!("Added grid layer {instance_id}");
        instance_id
    }

    /// Brings the renderables in line with the configured layers.
    fn sync_layers(&mut self, ctx: &SceneContext, render_frame_id: &str) {
        let configured = configured_grids(ctx);
        self.layers.retain(|id, _| configured.contains_key(id));
        for (id, settings) in configured {
            let frame_id = settings.frame_id.as_deref().unwrap_or(render_frame_id);
            let layer = self.layers.entry(id.clone()).or_insert_with(|| GridLayer {
                settings: settings.clone(),
                renderable: Renderable::new(id.clone(), RenderableUserData::new(frame_id, layer_path(&id))),
            });
            if layer.renderable.primitives.is_empty() || layer.settings != settings {
                layer.renderable.set_primitives(vec![grid_primitive(&settings)]);
            }
            layer.renderable.user_data.frame_id = frame_id.to_string();
            layer.renderable.user_data.pose = settings.pose();
            layer.renderable.user_data.frame_locked = true;
            layer.renderable.settings_visible = settings.visible;
            layer.renderable.details = json!({ "layer": id, "label": settings.label });
            layer.settings = settings;
        }
    }
}

impl SceneExtension for Grids {
    fn extension_id(&self) -> &'static str {
        EXTENSION_ID
    }

    fn settings_nodes(&self, ctx: &SceneContext) -> Vec<SettingsTreeEntry> {
        let mut entries = vec![SettingsTreeEntry::new(
            vec!["layers".into()],
            SettingsTreeNode::new("Custom layers")
                .with_order(5)
                .with_action(SettingsTreeNodeAction::new(ADD_GRID, "Add grid")),
        )];
        for (id, settings) in configured_grids(ctx) {
            let node = SettingsTreeNode::new(settings.label.clone())
                .with_visible(settings.visible)
                .with_action(SettingsTreeNodeAction::new(DELETE, "Delete"))
                .with_field("label", SettingsTreeField::string("Label", settings.label.clone()))
                .with_field(
                    "frameId",
                    SettingsTreeField::string("Frame", settings.frame_id.clone().unwrap_or_default()),
                )
                .with_field("size", SettingsTreeField::number("Size", settings.size as f64, Some(0.0), Some(1.0)))
                .with_field(
                    "divisions",
                    SettingsTreeField::number("Divisions", settings.divisions as f64, Some(1.0), Some(1.0)),
                )
                .with_field(
                    "lineWidth",
                    SettingsTreeField::number("Line width", settings.line_width as f64, Some(0.0), Some(0.5)),
                )
                .with_field("color", SettingsTreeField::rgba("Color", settings.color.clone()));
            entries.push(SettingsTreeEntry::new(layer_path(&id), node));
        }
        entries
    }

    fn handle_settings_action(&mut self, ctx: &mut SceneContext, action: &SettingsTreeAction) {
        let path: Vec<&str> = action.path().iter().map(String::as_str).collect();
        match (action, path.as_slice()) {
            (SettingsTreeAction::PerformNodeAction { id, .. }, ["layers"]) if id == ADD_GRID => {
                self.add_grid(ctx);
            }
            (SettingsTreeAction::PerformNodeAction { id, .. }, ["layers", instance_id]) if id == DELETE => {
                ctx.config.layers.remove(*instance_id);
                ctx.errors.clear_path(&layer_path(instance_id));
                log::info!("Deleted layer {instance_id}");
            }
            (SettingsTreeAction::Update { value, .. }, ["layers", instance_id, "frameId"]) => {
                let frame_id = value.as_str().filter(|id| !id.is_empty()).map(str::to_string);
                ctx.config
                    .set_layer_setting(instance_id, "frameId", json!(frame_id));
            }
            (SettingsTreeAction::Update { value, .. }, ["layers", instance_id, key]) => {
                ctx.config.set_layer_setting(instance_id, key, value.clone());
            }
            _ => return,
        }
        ctx.invalidate_settings();
        let render_frame_id = ctx.render_frame_id.clone().unwrap_or_default();
        self.sync_layers(ctx, &render_frame_id);
    }

    fn start_frame(&mut self, ctx: &mut SceneContext, frame: &FrameInfo) {
        self.sync_layers(ctx, &frame.render_frame_id);
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
        Box::new(self.layers.values().map(|layer| &layer.renderable))
    }

    fn renderables_mut<'a>(&'a mut self) -> Box<dyn Iterator<Item = &'a mut Renderable> + 'a> {
        Box::new(self.layers.values_mut().map(|layer| &mut layer.renderable))
    }

    fn remove_all_renderables(&mut self) {
        self.layers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::test_support::{context, frame};

    fn perform(path: &[&str], id: &str) -> SettingsTreeAction {
        SettingsTreeAction::PerformNodeAction {
            path: path.iter().map(|s| s.to_string()).collect(),
            id: id.into(),
        }
    }

    #[test]
    fn add_configure_and_delete_grid() {
        let mut ctx = context();
        let mut grids = Grids::new();
        grids.handle_settings_action(&mut ctx, &perform(&["layers"], ADD_GRID));
        assert_eq!(grids.layer_count(), 1);
        assert!(ctx.config.layers.contains_key("grid-1"));

        grids.handle_settings_action(
            &mut ctx,
            &SettingsTreeAction::Update {
                path: vec!["layers".into(), "grid-1".into(), "divisions".into()],
                input: "number".into(),
                value: json!(4),
            },
        );
        grids.start_frame(&mut ctx, &frame(0));
        let renderable = grids.layer("grid-1").unwrap();
        assert!(renderable.visible());
        let Geometry::Lines(lines) = &renderable.primitives[0].geometry else {
            panic!("expected lines");
        };
        assert_eq!(lines.segment_count(), 10);

        let nodes = grids.settings_nodes(&ctx);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].path, layer_path("grid-1"));

        grids.handle_settings_action(&mut ctx, &perform(&["layers", "grid-1"], DELETE));
        assert_eq!(grids.layer_count(), 0);
        assert!(ctx.config.layers.is_empty());
    }

    #[test]
    fn restores_layers_from_config() {
        let mut ctx = context();
        ctx.config.layers.insert(
            "saved".into(),
            json!({ "layerId": LAYER_ID, "frameId": "base_link", "position": [0.0, 0.0, 1.0] }),
        );
        ctx.config
            .layers
            .insert("other".into(), json!({ "layerId": "someone.Else" }));
        let mut grids = Grids::new();
        grids.start_frame(&mut ctx, &frame(0));
        assert_eq!(grids.layer_count(), 1);
        let renderable = grids.layer("saved").unwrap();
        assert_eq!(renderable.user_data.frame_id, "base_link");
        assert!(renderable.world_pose().position.abs_diff_eq(DVec3::Z, 1e-9));
    }
}
