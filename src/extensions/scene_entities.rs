use std::{
    collections::{hash_map::DefaultHasher, BTreeMap, HashSet},
    hash::{Hash, Hasher},
};

use glam::{DVec3, Mat4};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    color::ColorRgba,
    extensions::{
        primitives::{self, local, LineMode},
        topic_update, FrameInfo, SceneContext, SceneExtension, Subscription,
    },
    messages::{
        scene_update::{DeletionKind, LinePrimitive, LineType, ModelPrimitive, TriangleListPrimitive},
        schemas, Message, MessageEvent, SceneEntity, SceneUpdate,
    },
    models::{ModelCache, ModelEntry, ModelLoadOptions},
    scene_graph::{
        shapes::ArrowDimensions, update_renderable_poses, Geometry, Primitive, Renderable,
        RenderableUserData,
    },
    settings::{topic_path, SettingsTreeAction, SettingsTreeEntry, SettingsTreeField, SettingsTreeNode},
    time::Time,
    transforms::Pose,
};

pub const EXTENSION_ID: &str = "sceneview.SceneEntities";
pub const MODEL_LOAD_FAILED: &str = "MODEL_LOAD_FAILED";

const SCHEMAS: &[&str] = &[schemas::SCENE_UPDATE];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SceneEntitySettings {
    pub visible: bool,
    /// Draw texts as anchor points.
    pub show_text_anchors: bool,
}

impl Default for SceneEntitySettings {
    fn default() -> Self {
        Self {
            visible: true,
            show_text_anchors: true,
        }
    }
}

/// Cache key of a model primitive. Inline data is keyed by its content.
fn model_key(model: &ModelPrimitive) -> String {
    if model.data.is_empty() {
        return model.url.clone();
    }
    let mut hasher = DefaultHasher::new();
    model.data.hash(&mut hasher);
    format!("embedded:{:016x}", hasher.finish())
}

#[derive(Default)]
struct BuiltEntity {
    primitives: Vec<Primitive>,
    pending_models: Vec<String>,
    errors: Vec<String>,
}

fn indexed_points(points: &[DVec3], indices: &[u32]) -> Vec<DVec3> {
    if indices.is_empty() {
        return points.to_vec();
    }
    indices
        .iter()
        .filter_map(|&i| points.get(i as usize).copied())
        .collect()
}

fn indexed_color(colors: &[ColorRgba], indices: &[u32], fallback: ColorRgba, i: usize) -> ColorRgba {
    let index = if indices.is_empty() {
        Some(i)
    } else {
        indices.get(i).map(|&index| index as usize)
    };
    index.and_then(|index| colors.get(index)).copied().unwrap_or(fallback)
}

fn line_primitive(line: &LinePrimitive) -> Primitive {
    let points = indexed_points(&line.points, &line.indices);
    let mode = match line.line_type {
        LineType::Strip => LineMode::Strip,
        LineType::Loop => LineMode::Loop,
        LineType::List => LineMode::List,
    };
    primitives::lines(
        &points,
        |i| indexed_color(&line.colors, &line.indices, line.color, i),
        line.thickness as f32,
        !line.scale_invariant,
        mode,
        local(&line.pose),
    )
}

fn triangle_primitive(triangles: &TriangleListPrimitive) -> Primitive {
    let points = indexed_points(&triangles.points, &triangles.indices);
    primitives::triangles(
        &points,
        |i| indexed_color(&triangles.colors, &triangles.indices, triangles.color, i),
        DVec3::ONE,
        local(&triangles.pose),
    )
}

fn model_primitives(model: &ModelPrimitive, models: &mut ModelCache, built: &mut BuiltEntity) {
    let key = model_key(model);
    if key.is_empty() {
        built.errors.push("Model primitive has neither a URL nor data".to_string());
        return;
    }
    let options = ModelLoadOptions {
        embedded_data: (!model.data.is_empty()).then(|| model.data.clone()),
        ..Default::default()
    };
    match models.load(&key, options) {
        ModelEntry::Loading => built.pending_models.push(key),
        ModelEntry::Failed(message) => {
            built.errors.push(format!("Failed to load model {key}: {message}"))
        }
        ModelEntry::Loaded(id) => {
            let Some(loaded) = models.model(id) else {
                built.errors.push(format!("Model {key} is no longer cached"));
                return;
            };
            let tint = model.override_color.then_some(model.color);
            let root = Mat4::from_scale(model.scale.as_vec3());
            built.primitives.extend(
                loaded
                    .to_meshes(root, tint)
                    .into_iter()
                    .map(|mesh| Primitive::new(Geometry::Mesh(mesh)).with_local(local(&model.pose))),
            );
        }
    }
}

fn entity_primitives(
    entity: &SceneEntity,
    settings: &SceneEntitySettings,
    models: &mut ModelCache,
) -> BuiltEntity {
    let mut built = BuiltEntity::default();
    let out = &mut built.primitives;
    for arrow in &entity.arrows {
        let dims = ArrowDimensions::from_scale(
            (arrow.shaft_length + arrow.head_length) as f32,
            arrow.shaft_diameter as f32,
            arrow.head_diameter as f32,
            arrow.head_length as f32,
        );
        out.extend(primitives::arrow(&dims, arrow.color, local(&arrow.pose)));
    }
    out.extend(
        entity
            .cubes
            .iter()
            .map(|cube| primitives::cube(cube.size, cube.color, local(&cube.pose))),
    );
    out.extend(
        entity
            .spheres
            .iter()
            .map(|sphere| primitives::sphere(sphere.size, sphere.color, local(&sphere.pose))),
    );
    out.extend(entity.cylinders.iter().map(|cylinder| {
        primitives::cylinder(
            cylinder.size,
            cylinder.bottom_scale as f32,
            cylinder.top_scale as f32,
            cylinder.color,
            local(&cylinder.pose),
        )
    }));
    out.extend(entity.lines.iter().map(line_primitive));
    out.extend(entity.triangles.iter().map(triangle_primitive));
    if settings.show_text_anchors {
        out.extend(
            entity
                .texts
                .iter()
                .map(|text| primitives::anchor(text.color, local(&text.pose))),
        );
    }
    for model in &entity.models {
        model_primitives(model, models, &mut built);
    }
    built
}

struct EntityEntry {
    entity: SceneEntity,
    renderable: Renderable,
    expires_at: Option<Time>,
    pending_models: Vec<String>,
}

#[derive(Default)]
struct TopicEntities {
    settings: SceneEntitySettings,
    entities: BTreeMap<String, EntityEntry>,
}

#[derive(Default)]
pub struct SceneEntities {
    topics: BTreeMap<String, TopicEntities>,
}

impl SceneEntities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(&self, topic: &str, id: &str) -> Option<&Renderable> {
        self.topics
            .get(topic)?
            .entities
            .get(id)
            .map(|entry| &entry.renderable)
    }

    pub fn entity_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, |t| t.entities.len())
    }

    fn apply_update(&mut self, ctx: &mut SceneContext, topic: &str, receive_time: Time, update: &SceneUpdate) {
        let entry = self.topics.entry(topic.to_string()).or_insert_with(|| TopicEntities {
            settings: ctx.config.topic_settings(topic),
            entities: BTreeMap::new(),
        });

        for deletion in &update.deletions {
            match deletion.kind {
                DeletionKind::MatchingId => {
                    entry.entities.remove(&deletion.id);
                }
                DeletionKind::All => entry.entities.clear(),
            }
        }

        let mut errors = Vec::new();
        for entity in &update.entities {
            let built = entity_primitives(entity, &entry.settings, &mut ctx.models);
            errors.extend(built.errors);

            let mut user_data = RenderableUserData::new(&entity.frame_id, topic_path(topic));
            user_data.receive_time = receive_time;
            user_data.message_time = entity.timestamp;
            user_data.pose = Pose::IDENTITY;
            user_data.topic = Some(topic.to_string());
            user_data.frame_locked = entity.frame_locked;

            let slot = entry
                .entities
                .entry(entity.id.clone())
                .or_insert_with(|| EntityEntry {
                    entity: entity.clone(),
                    renderable: Renderable::new(entity.id.clone(), user_data.clone()),
                    expires_at: None,
                    pending_models: Vec::new(),
                });
            slot.entity = entity.clone();
            slot.renderable.user_data = user_data;
            slot.renderable.settings_visible = entry.settings.visible;
            slot.renderable.set_primitives(built.primitives);
            slot.renderable.details = json!({
                "topic": topic,
                "id": entity.id,
                "frameId": entity.frame_id,
                "texts": entity.texts.iter().map(|text| text.text.as_str()).collect::<Vec<_>>(),
            });
            slot.pending_models = built.pending_models;
            slot.expires_at =
                (entity.lifetime > 0).then(|| receive_time.saturating_add(entity.lifetime));
        }

        if errors.is_empty() {
            ctx.errors.remove_from_topic(topic, MODEL_LOAD_FAILED);
        } else {
            ctx.errors
                .add_to_topic(topic, MODEL_LOAD_FAILED, errors.join("\n"));
        }
    }

    fn rebuild_topic(entry: &mut TopicEntities, models: &mut ModelCache) -> Vec<String> {
        let mut errors = Vec::new();
        for slot in entry.entities.values_mut() {
            let built = entity_primitives(&slot.entity, &entry.settings, models);
            errors.extend(built.errors);
            slot.renderable.settings_visible = entry.settings.visible;
            slot.renderable.set_primitives(built.primitives);
            slot.pending_models = built.pending_models;
        }
        errors
    }
}

impl SceneExtension for SceneEntities {
    fn extension_id(&self) -> &'static str {
        EXTENSION_ID
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        vec![Subscription::all(SCHEMAS)]
    }

    fn handle_message(&mut self, ctx: &mut SceneContext, event: &MessageEvent) {
        if let Message::SceneUpdate(update) = &event.message {
            self.apply_update(ctx, &event.topic, event.receive_time, update);
        }
    }

    fn settings_nodes(&self, ctx: &SceneContext) -> Vec<SettingsTreeEntry> {
        ctx.topics
            .iter()
            .filter(|topic| topic.schema_name == schemas::SCENE_UPDATE)
            .map(|topic| {
                let settings: SceneEntitySettings = ctx.config.topic_settings(&topic.name);
                let node = SettingsTreeNode::new(topic.name.clone())
                    .with_visible(settings.visible)
                    .with_field(
                        "showTextAnchors",
                        SettingsTreeField::boolean("Text anchors", settings.show_text_anchors),
                    );
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
        entry.settings = ctx.config.topic_settings(topic);
        Self::rebuild_topic(entry, &mut ctx.models);
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
        let now = frame.current_time;
        for (topic, entry) in &mut self.topics {
            entry
                .entities
                .retain(|_, slot| slot.expires_at.map_or(true, |t| now <= t));

            let settings = &entry.settings;
            let mut errors = Vec::new();
            for slot in entry.entities.values_mut() {
                let settled = !slot.pending_models.is_empty()
                    && slot
                        .pending_models
                        .iter()
                        .all(|key| ctx.models.entry(key) != Some(&ModelEntry::Loading));
                if settled {
                    let built = entity_primitives(&slot.entity, settings, &mut ctx.models);
                    errors.extend(built.errors);
                    slot.renderable.set_primitives(built.primitives);
                    slot.pending_models = built.pending_models;
                }
            }
            if !errors.is_empty() {
                ctx.errors
                    .add_to_topic(topic, MODEL_LOAD_FAILED, errors.join("\n"));
            }
        }

        update_renderable_poses(
            self.renderables_mut(),
            &ctx.transform_tree,
            &mut ctx.errors,
            &frame.render_frame_id,
            &frame.fixed_frame_id,
            now,
        );
    }

    fn renderables<'a>(&'a self) -> Box<dyn Iterator<Item = &'a Renderable> + 'a> {
        Box::new(
            self.topics
                .values()
                .flat_map(|topic| topic.entities.values())
                .map(|slot| &slot.renderable),
        )
    }

    fn renderables_mut<'a>(&'a mut self) -> Box<dyn Iterator<Item = &'a mut Renderable> + 'a> {
        Box::new(
            self.topics
                .values_mut()
                .flat_map(|topic| topic.entities.values_mut())
                .map(|slot| &mut slot.renderable),
        )
    }

    fn remove_all_renderables(&mut self) {
        self.topics.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        extensions::test_support::{context, frame},
        messages::scene_update::{CubePrimitive, SceneEntityDeletion, TextPrimitive},
        models::gltf_loader::test_support::triangle_glb,
        time::NANOS_PER_SEC,
    };

    fn cube_entity(id: &str) -> SceneEntity {
        SceneEntity {
            frame_id: "base_link".into(),
            id: id.into(),
            cubes: vec![CubePrimitive {
                pose: Pose::from_position(DVec3::new(0.0, 0.0, 1.0)),
                size: DVec3::splat(0.5),
                color: ColorRgba::GREEN,
            }],
            ..Default::default()
        }
    }

    fn event(receive_time: Time, update: SceneUpdate) -> MessageEvent {
        MessageEvent::new("/scene", schemas::SCENE_UPDATE, receive_time, Message::SceneUpdate(update))
    }

    #[test]
    fn entities_replace_and_delete_by_id() {
        let mut ctx = context();
        let mut extension = SceneEntities::new();
        extension.handle_message(
            &mut ctx,
            &event(0, SceneUpdate { deletions: vec![], entities: vec![cube_entity("a"), cube_entity("b")] }),
        );
        assert_eq!(extension.entity_count("/scene"), 2);
        let renderable = extension.entity("/scene", "a").unwrap();
        assert_eq!(renderable.primitives[0].local.translation, DVec3::Z);

        let deletion = SceneEntityDeletion {
            timestamp: 0,
            kind: DeletionKind::MatchingId,
            id: "a".into(),
        };
        extension.handle_message(
            &mut ctx,
            &event(1, SceneUpdate { deletions: vec![deletion], entities: vec![] }),
        );
        assert!(extension.entity("/scene", "a").is_none());
        assert_eq!(extension.entity_count("/scene"), 1);
    }

    #[test]
    fn deletions_apply_before_new_entities() {
        let mut ctx = context();
        let mut extension = SceneEntities::new();
        extension.handle_message(
            &mut ctx,
            &event(0, SceneUpdate { deletions: vec![], entities: vec![cube_entity("a")] }),
        );
        let deletion = SceneEntityDeletion {
            timestamp: 1,
            kind: DeletionKind::All,
            id: String::new(),
        };
        extension.handle_message(
            &mut ctx,
            &event(1, SceneUpdate { deletions: vec![deletion], entities: vec![cube_entity("b")] }),
        );
        assert!(extension.entity("/scene", "a").is_none());
        assert!(extension.entity("/scene", "b").is_some());
    }

    #[test]
    fn lifetime_and_text_anchor() {
        let mut ctx = context();
        let mut extension = SceneEntities::new();
        let mut entity = cube_entity("label");
        entity.lifetime = NANOS_PER_SEC;
        entity.texts.push(TextPrimitive {
            pose: Pose::IDENTITY,
            billboard: true,
            font_size: 12.0,
            color: ColorRgba::WHITE,
            text: "hello".into(),
        });
        extension.handle_message(
            &mut ctx,
            &event(0, SceneUpdate { deletions: vec![], entities: vec![entity] }),
        );
        let renderable = extension.entity("/scene", "label").unwrap();
        assert_eq!(renderable.primitives.len(), 2);
        assert_eq!(renderable.details["texts"][0], "hello");

        extension.start_frame(&mut ctx, &frame(2 * NANOS_PER_SEC));
        assert_eq!(extension.entity_count("/scene"), 0);
    }

    #[test]
    fn embedded_models_load_inline() {
        let mut ctx = context();
        let mut extension = SceneEntities::new();
        let mut entity = cube_entity("robot");
        entity.cubes.clear();
        entity.models.push(ModelPrimitive {
            pose: Pose::IDENTITY,
            scale: DVec3::ONE,
            color: ColorRgba::WHITE,
            override_color: false,
            url: String::new(),
            media_type: "model/gltf-binary".into(),
            data: triangle_glb(),
        });
        extension.handle_message(
            &mut ctx,
            &event(0, SceneUpdate { deletions: vec![], entities: vec![entity] }),
        );
        ctx.models.wait_for_pending(Duration::from_secs(1));
        extension.start_frame(&mut ctx, &frame(0));
        assert_eq!(extension.entity("/scene", "robot").unwrap().primitives.len(), 1);
        assert!(!ctx.errors.has_error(&topic_path("/scene"), MODEL_LOAD_FAILED));
    }
}
