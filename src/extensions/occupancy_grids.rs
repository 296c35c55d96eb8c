use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    color::ColorRgba,
    extensions::{topic_renderables::TopicRenderables, SceneContext, SceneExtension, Subscription},
    messages::{schemas, Message, MessageEvent, OccupancyGrid},
    scene_graph::{Geometry, Primitive, Renderable, TexturedGeometry},
    settings::{
        topic_path, SelectOption, SettingsTreeAction, SettingsTreeEntry, SettingsTreeField,
        SettingsTreeNode,
    },
};

pub const EXTENSION_ID: &str = "sceneview.OccupancyGrids";
pub const INVALID_OCCUPANCY_GRID: &str = "INVALID_OCCUPANCY_GRID";

const SCHEMAS: &[&str] = &[schemas::OCCUPANCY_GRID];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridColorScheme {
    #[default]
    Map,
    Costmap,
    Raw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OccupancyGridSettings {
    pub visible: bool,
    pub color_mode: GridColorScheme,
    pub alpha: f32,
    pub unknown_color: String,
    pub invalid_color: String,
    pub frame_locked: bool,
}

impl Default for OccupancyGridSettings {
    fn default() -> Self {
        Self {
            visible: true,
            color_mode: GridColorScheme::Map,
            alpha: 1.0,
            unknown_color: "#808080ff".to_string(),
            invalid_color: "#ff00ffff".to_string(),
            frame_locked: false,
        }
    }
}

struct Palette {
    scheme: GridColorScheme,
    alpha: u8,
    unknown: [u8; 4],
    invalid: [u8; 4],
}

impl Palette {
    fn new(settings: &OccupancyGridSettings) -> Self {
        let alpha = (settings.alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
        let parse = |hex: &str, fallback: ColorRgba| {
            ColorRgba::from_hex(hex).unwrap_or(fallback).to_rgba8()
        };
        Self {
            scheme: settings.color_mode,
            alpha,
            unknown: parse(&settings.unknown_color, ColorRgba::new(0.5, 0.5, 0.5, 1.0)),
            invalid: parse(&settings.invalid_color, ColorRgba::new(1.0, 0.0, 1.0, 1.0)),
        }
    }

    fn color(&self, value: i8) -> [u8; 4] {
        match self.scheme {
            GridColorScheme::Raw => {
                let v = value as u8;
                [v, v, v, self.alpha]
            }
            GridColorScheme::Map => match value {
                -1 => [self.unknown[0], self.unknown[1], self.unknown[2], self.alpha],
                0..=100 => {
                    let v = 255 - (value as u32 * 255 / 100) as u8;
                    [v, v, v, self.alpha]
                }
                _ => self.invalid,
            },
            GridColorScheme::Costmap => match value {
                -1 | 0 => [0, 0, 0, 0],
                1..=98 => {
                    let t = (value - 1) as f32 / 97.0;
                    let c = ColorRgba::BLUE.lerp(&ColorRgba::RED, t).to_rgba8();
                    [c[0], c[1], c[2], self.alpha]
                }
                // Inscribed and lethal cells
                99 => [0, 255, 255, self.alpha],
                100 => [255, 0, 255, self.alpha],
                _ => self.invalid,
            },
        }
    }
}

/// RGBA8 texels of the grid, row 0 at the grid origin.
pub fn grid_texels(grid: &OccupancyGrid, settings: &OccupancyGridSettings) -> Vec<u8> {
    let palette = Palette::new(settings);
    grid.data
        .iter()
        .flat_map(|value| palette.color(*value))
        .collect()
}

fn grid_primitives(settings: &OccupancyGridSettings, grid: &OccupancyGrid) -> Vec<Primitive> {
    let info = &grid.info;
    let quad = TexturedGeometry::quad(
        info.width as f32 * info.resolution,
        info.height as f32 * info.resolution,
        info.width,
        info.height,
        grid_texels(grid, settings),
    );
    vec![Primitive::new(Geometry::Textured(quad))]
}

#[derive(Default)]
pub struct OccupancyGrids {
    topics: TopicRenderables<OccupancyGridSettings, OccupancyGrid>,
}

impl OccupancyGrids {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn renderable(&self, topic: &str) -> Option<&Renderable> {
        self.topics.get(topic).map(|entry| &entry.renderable)
    }
}

impl SceneExtension for OccupancyGrids {
    fn extension_id(&self) -> &'static str {
        EXTENSION_ID
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        vec![Subscription::only_last(SCHEMAS)]
    }

    fn handle_message(&mut self, ctx: &mut SceneContext, event: &MessageEvent) {
        let Message::OccupancyGrid(grid) = &event.message else {
            return;
        };
        if let Err(err) = grid.validate() {
            ctx.errors.add_to_topic(
                &event.topic,
                INVALID_OCCUPANCY_GRID,
                format!("Invalid occupancy grid: {err}"),
            );
            return;
        }
        ctx.errors
            .remove_from_topic(&event.topic, INVALID_OCCUPANCY_GRID);

        let entry = self
            .topics
            .update(ctx, event, &grid.header, grid.info.origin, grid.clone());
        entry.renderable.settings_visible = entry.settings.visible;
        entry.renderable.user_data.frame_locked = entry.settings.frame_locked;
        entry
            .renderable
            .set_primitives(grid_primitives(&entry.settings, &entry.message));
        entry.renderable.details = json!({
            "topic": event.topic,
            "frameId": grid.header.frame_id,
            "width": grid.info.width,
            "height": grid.info.height,
            "resolution": grid.info.resolution,
        });
    }

    fn settings_nodes(&self, ctx: &SceneContext) -> Vec<SettingsTreeEntry> {
        ctx.topics
            .iter()
            .filter(|topic| topic.schema_name == schemas::OCCUPANCY_GRID)
            .map(|topic| {
                let settings: OccupancyGridSettings = ctx.config.topic_settings(&topic.name);
                let mut node = SettingsTreeNode::new(topic.name.clone())
                    .with_visible(settings.visible)
                    .with_field(
                        "colorMode",
                        SettingsTreeField::select(
                            "Color scheme",
                            vec![
                                SelectOption::new("Map", "map"),
                                SelectOption::new("Costmap", "costmap"),
                                SelectOption::new("Raw", "raw"),
                            ],
                            serde_json::to_value(settings.color_mode).unwrap_or_default(),
                        ),
                    )
                    .with_field(
                        "alpha",
                        SettingsTreeField::number("Alpha", settings.alpha as f64, Some(0.0), Some(0.1)),
                    );
                if settings.color_mode == GridColorScheme::Map {
                    node = node
                        .with_field(
                            "unknownColor",
                            SettingsTreeField::rgba("Unknown color", settings.unknown_color.clone()),
                        )
                        .with_field(
                            "invalidColor",
                            SettingsTreeField::rgba("Invalid color", settings.invalid_color.clone()),
                        );
                }
                node = node.with_field(
                    "frameLocked",
                    SettingsTreeField::boolean("Frame lock", settings.frame_locked),
                );
                SettingsTreeEntry::new(topic_path(&topic.name), node)
            })
            .collect()
    }

    fn handle_settings_action(&mut self, ctx: &mut SceneContext, action: &SettingsTreeAction) {
        if let Some(entry) = self.topics.apply_update(ctx, action) {
            entry.renderable.settings_visible = entry.settings.visible;
            entry.renderable.user_data.frame_locked = entry.settings.frame_locked;
            let texels = grid_texels(&entry.message, &entry.settings);
            let (width, height) = (entry.message.info.width, entry.message.info.height);
            for primitive in &mut entry.renderable.primitives {
                if let Geometry::Textured(quad) = &mut primitive.geometry {
                    quad.set_image(width, height, texels.clone());
                }
            }
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
    use glam::DVec3;
    use serde_json::json;

    use super::*;
    use crate::{
        extensions::test_support::{context, frame},
        messages::{Header, MapMetaData},
        transforms::Pose,
    };

    fn grid(data: Vec<i8>) -> MessageEvent {
        let grid = OccupancyGrid {
            header: Header::new(0, "base_link"),
            info: MapMetaData {
                resolution: 0.5,
                width: 2,
                height: 2,
                origin: Pose::from_position(DVec3::new(-1.0, -1.0, 0.0)),
            },
            data,
        };
        MessageEvent::new("/map", schemas::OCCUPANCY_GRID, 0, Message::OccupancyGrid(grid))
    }

    #[test]
    fn map_scheme_colors_cells() {
        let mut ctx = context();
        let mut extension = OccupancyGrids::new();
        extension.handle_message(&mut ctx, &grid(vec![0, 100, -1, 50]));
        extension.start_frame(&mut ctx, &frame(0));

        let renderable = extension.renderable("/map").unwrap();
        assert_eq!(renderable.world_pose().position, DVec3::new(-1.0, -1.0, 0.0));
        let Geometry::Textured(quad) = &renderable.primitives[0].geometry else {
            panic!("expected textured quad");
        };
        assert_eq!(quad.vertices[2].position, [1.0, 1.0, 0.0]);
        assert_eq!(&quad.rgba[0..4], &[255, 255, 255, 255]);
        assert_eq!(&quad.rgba[4..8], &[0, 0, 0, 255]);
        assert_eq!(&quad.rgba[8..12], &[128, 128, 128, 255]);
    }

    #[test]
    fn size_mismatch_keeps_last_grid() {
        let mut ctx = context();
        let mut extension = OccupancyGrids::new();
        extension.handle_message(&mut ctx, &grid(vec![0; 4]));
        extension.handle_message(&mut ctx, &grid(vec![0; 3]));
        assert!(ctx.errors.has_error(&topic_path("/map"), INVALID_OCCUPANCY_GRID));
        assert_eq!(extension.renderable("/map").unwrap().primitives.len(), 1);
    }

    #[test]
    fn costmap_scheme_is_transparent_when_free() {
        let mut ctx = context();
        ctx.config.topics.insert("/map".into(), json!({ "colorMode": "costmap" }));
        let mut extension = OccupancyGrids::new();
        extension.handle_message(&mut ctx, &grid(vec![0, 100, 99, 1]));
        let Geometry::Textured(quad) = &extension.renderable("/map").unwrap().primitives[0].geometry else {
            panic!("expected textured quad");
        };
        assert_eq!(quad.rgba[3], 0);
        assert_eq!(&quad.rgba[4..8], &[255, 0, 255, 255]);
        assert_eq!(&quad.rgba[12..16], &[0, 0, 255, 255]);
    }
}
