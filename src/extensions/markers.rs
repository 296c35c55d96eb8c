use std::collections::{BTreeMap, HashSet};

use glam::Mat4;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    color::ColorRgba,
    extensions::{
        primitives::{self, LineMode},
        FrameInfo, SceneContext, SceneExtension, Subscription,
    },
    messages::{schemas, Marker, MarkerAction, MarkerType, Message, MessageEvent},
    models::{ModelCache, ModelEntry, ModelLoadOptions},
    scene_graph::{
        shapes::{self, ArrowDimensions},
        update_renderable_poses, Geometry, Primitive, Renderable, RenderableUserData,
        MISSING_TRANSFORM,
    },
    settings::{
        topic_path, SettingsTreeAction, SettingsTreeEntry, SettingsTreeField, SettingsTreeNode,
    },
    time::Time,
    transforms::Transform,
};

pub const EXTENSION_ID: &str = "sceneview.Markers";
pub const INVALID_MARKER: &str = "INVALID_MARKER";
pub const MESH_LOAD_FAILED: &str = "MESH_LOAD_FAILED";

const SCHEMAS: &[&str] = &[schemas::MARKER, schemas::MARKER_ARRAY];
const NAMESPACE_PREFIX: &str = "ns:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceSettings {
    pub visible: bool,
}

impl Default for NamespaceSettings {
    fn default() -> Self {
        Self { visible: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarkerTopicSettings {
    pub visible: bool,
    /// Replaces every marker colour when set.
    pub color: Option<String>,
    pub namespaces: BTreeMap<String, NamespaceSettings>,
}

impl Default for MarkerTopicSettings {
    fn default() -> Self {
        Self {
            visible: true,
            color: None,
            namespaces: BTreeMap::new(),
        }
    }
}

impl MarkerTopicSettings {
    fn namespace_visible(&self, ns: &str) -> bool {
        self.visible && self.namespaces.get(ns).map_or(true, |ns| ns.visible)
    }

    fn color_override(&self) -> Option<ColorRgba> {
        self.color.as_deref().and_then(ColorRgba::from_hex)
    }
}

enum Built {
    Ready(Vec<Primitive>),
    /// Waiting for the model at this URL.
    Pending(String),
}

struct MarkerEntry {
    marker: Marker,
    renderable: Renderable,
    expires_at: Option<Time>,
    pending_model: Option<String>,
    mesh_error: Option<String>,
}

impl MarkerEntry {
    fn apply_built(&mut self, built: Result<Built, String>) {
        match built {
            Ok(Built::Ready(primitives)) => {
                self.renderable.set_primitives(primitives);
                self.pending_model = None;
                self.mesh_error = None;
            }
            Ok(Built::Pending(url)) => {
                self.pending_model = Some(url);
                self.mesh_error = None;
            }
            Err(message) => {
                self.pending_model = None;
                self.mesh_error = Some(message);
            }
        }
    }
}

#[derive(Default)]
struct TopicMarkers {
    settings: MarkerTopicSettings,
    namespaces: BTreeMap<String, BTreeMap<i32, MarkerEntry>>,
}

impl TopicMarkers {
    fn entries_mut(&mut self) -> impl Iterator<Item = &mut MarkerEntry> {
        self.namespaces.values_mut().flat_map(|ns| ns.values_mut())
    }

    /// Mirrors the mesh failures of the remaining markers into the topic error.
    fn sync_mesh_errors(&self, ctx: &mut SceneContext, topic: &str) {
        let messages: Vec<&str> = self
            .namespaces
            .values()
            .flat_map(|ns| ns.values())
            .filter_map(|entry| entry.mesh_error.as_deref())
            .collect();
        ctx.errors
            .error_if_false(messages.is_empty(), &topic_path(topic), MESH_LOAD_FAILED, messages.join("\n"));
    }

    fn apply_visibility(&mut self) {
        let settings = &self.settings;
        for (ns, markers) in &mut self.namespaces {
            let visible = settings.namespace_visible(ns);
            for entry in markers.values_mut() {
                entry.renderable.settings_visible = visible;
            }
        }
    }
}

#[derive(Default)]
pub struct Markers {
    topics: BTreeMap<String, TopicMarkers>,
}

impl Markers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marker(&self, topic: &str, ns: &str, id: i32) -> Option<&Renderable> {
        self.topics
            .get(topic)?
            .namespaces
            .get(ns)?
            .get(&id)
            .map(|entry| &entry.renderable)
    }

    pub fn marker_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map_or(0, |t| t.namespaces.values().map(BTreeMap::len).sum())
    }

    /// Adds or replaces one marker. An invalid marker leaves the scene untouched and returns
    /// the reason.
    fn add_marker(
        &mut self,
        ctx: &mut SceneContext,
        topic: &str,
        receive_time: Time,
        marker: &Marker,
    ) -> Result<(), String> {
        let kind = marker
            .kind()
            .map_err(|err| format!("Marker {}:{}: {err}", marker.ns, marker.id))?;

        let entry = self.topics.entry(topic.to_string()).or_insert_with(|| TopicMarkers {
            settings: ctx.config.topic_settings(topic),
            namespaces: BTreeMap::new(),
        });
        if !entry.namespaces.contains_key(&marker.ns) {
            ctx.invalidate_settings();
        }
        let visible = entry.settings.namespace_visible(&marker.ns);
        let color_override = entry.settings.color_override();
        let markers = entry.namespaces.entry(marker.ns.clone()).or_default();

        let built = marker_primitives(marker, kind, color_override, &mut ctx.models);

        let mut user_data = RenderableUserData::new(&marker.header.frame_id, topic_path(topic));
        user_data.receive_time = receive_time;
        user_data.message_time = marker.header.stamp;
        user_data.pose = marker.pose;
        user_data.topic = Some(topic.to_string());
        user_data.frame_locked = marker.frame_locked;

        let slot = markers.entry(marker.id).or_insert_with(|| MarkerEntry {
            marker: marker.clone(),
            renderable: Renderable::new(format!("{}:{}", marker.ns, marker.id), user_data.clone()),
            expires_at: None,
            pending_model: None,
            mesh_error: None,
        });
        slot.marker = marker.clone();
        slot.renderable.user_data = user_data;
        slot.renderable.settings_visible = visible;
        slot.renderable.details = json!({
            "topic": topic,
            "ns": marker.ns,
            "id": marker.id,
            "type": format!("{kind:?}"),
            "frameId": marker.header.frame_id,
            "text": marker.text,
        });
        slot.expires_at = (marker.lifetime > 0).then(|| receive_time.saturating_add(marker.lifetime));
        slot.apply_built(built);
        Ok(())
    }

    fn delete_marker(&mut self, topic: &str, marker: &Marker) {
        let Some(entry) = self.topics.get_mut(topic) else {
            return;
        };
        match marker.action {
            MarkerAction::Delete => {
                if let Some(markers) = entry.namespaces.get_mut(&marker.ns) {
                    markers.remove(&marker.id);
                }
            }
            MarkerAction::DeleteAll if marker.ns.is_empty() => {
                for markers in entry.namespaces.values_mut() {
                    markers.clear();
                }
            }
            MarkerAction::DeleteAll => {
                if let Some(markers) = entry.namespaces.get_mut(&marker.ns) {
                    markers.clear();
                }
            }
            MarkerAction::Add => {}
        }
    }

    fn update_namespace(ctx: &mut SceneContext, topic: &str, ns: &str, visible: bool) -> MarkerTopicSettings {
        let mut settings: MarkerTopicSettings = ctx.config.topic_settings(topic);
        settings.namespaces.entry(ns.to_string()).or_default().visible = visible;
        match serde_json::to_value(&settings) {
            Ok(value) => {
                ctx.config.topics.insert(topic.to_string(), value);
            }
            Err(err) => log::error!("Failed to store marker settings for {topic}: {err}"),
        }
        settings
    }
}

/// Primitives of one marker, relative to the marker pose.
fn marker_primitives(
    marker: &Marker,
    kind: MarkerType,
    color_override: Option<ColorRgba>,
    models: &mut ModelCache,
) -> Result<Built, String> {
    let color = color_override.unwrap_or(marker.color);
    let color_at = |i: usize| color_override.unwrap_or_else(|| marker.point_color(i));
    let scale = marker.scale;
    let identity = Transform::IDENTITY;

    let primitives = match kind {
        MarkerType::Arrow if marker.points.len() >= 2 => primitives::arrow_between(
            marker.points[0],
            marker.points[1],
            scale.x as f32,
            scale.y as f32,
            scale.z as f32,
            color,
            identity,
        ),
        MarkerType::Arrow => {
            let dims = ArrowDimensions::from_scale(scale.x as f32, scale.y as f32, scale.z as f32, 0.0);
            primitives::arrow(&dims, color, identity)
        }
        MarkerType::Cube => vec![primitives::cube(scale, color, identity)],
        MarkerType::Sphere => vec![primitives::sphere(scale, color, identity)],
        MarkerType::Cylinder => vec![primitives::cylinder(scale, 1.0, 1.0, color, identity)],
        MarkerType::LineStrip => vec![primitives::lines(
            &marker.points,
            color_at,
            scale.x as f32,
            true,
            LineMode::Strip,
            identity,
        )],
        MarkerType::LineList => vec![primitives::lines(
            &marker.points,
            color_at,
            scale.x as f32,
            true,
            LineMode::List,
            identity,
        )],
        MarkerType::CubeList => vec![primitives::shape_list(
            shapes::cube(),
            &marker.points,
            scale,
            color_at,
            identity,
        )],
        MarkerType::SphereList => vec![primitives::shape_list(
            shapes::sphere(12, 8),
            &marker.points,
            scale,
            color_at,
            identity,
        )],
        MarkerType::Points => vec![primitives::points(
            &marker.points,
            color_at,
            scale.x as f32,
            true,
            identity,
        )],
        MarkerType::TextViewFacing => vec![primitives::anchor(color, identity)],
        MarkerType::TriangleList => vec![primitives::triangles(
            &marker.points,
            color_at,
            scale,
            identity,
        )],
        MarkerType::MeshResource => {
            let url = marker.mesh_resource.as_str();
            if url.is_empty() {
                return Err(format!("Marker {}:{} has no mesh resource", marker.ns, marker.id));
            }
            match models.load(url, ModelLoadOptions::default()) {
                ModelEntry::Loading => return Ok(Built::Pending(url.to_string())),
                ModelEntry::Failed(message) => {
                    return Err(format!("Failed to load mesh {url}: {message}"))
                }
                ModelEntry::Loaded(id) => {
                    let Some(model) = models.model(id) else {
                        return Err(format!("Mesh {url} is no longer cached"));
                    };
                    let tint = if marker.mesh_use_embedded_materials && color_override.is_none() {
                        None
                    } else {
                        Some(color)
                    };
                    model
                        .to_meshes(Mat4::from_scale(scale.as_vec3()), tint)
                        .into_iter()
                        .map(|mesh| Primitive::new(Geometry::Mesh(mesh)))
                        .collect()
                }
            }
        }
    };
    Ok(Built::Ready(primitives))
}

impl SceneExtension for Markers {
    fn extension_id(&self) -> &'static str {
        EXTENSION_ID
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        vec![Subscription::all(SCHEMAS)]
    }

    fn handle_message(&mut self, ctx: &mut SceneContext, event: &MessageEvent) {
        let markers = match &event.message {
            Message::Marker(marker) => std::slice::from_ref(marker),
            Message::MarkerArray(markers) => markers.as_slice(),
            _ => return,
        };
        let mut invalid = Vec::new();
        for marker in markers {
            match marker.action {
                MarkerAction::Add => {
                    if let Err(message) = self.add_marker(ctx, &event.topic, event.receive_time, marker) {
                        invalid.push(message);
                    }
                }
                MarkerAction::Delete | MarkerAction::DeleteAll => {
                    self.delete_marker(&event.topic, marker)
                }
            }
        }
        ctx.errors.error_if_false(
            invalid.is_empty(),
            &topic_path(&event.topic),
            INVALID_MARKER,
            invalid.join("\n"),
        );
        if let Some(entry) = self.topics.get(&event.topic) {
            entry.sync_mesh_errors(ctx, &event.topic);
        }
    }

    fn settings_nodes(&self, ctx: &SceneContext) -> Vec<SettingsTreeEntry> {
        ctx.topics
            .iter()
            .filter(|topic| SCHEMAS.contains(&topic.schema_name.as_str()))
            .map(|topic| {
                let settings: MarkerTopicSettings = ctx.config.topic_settings(&topic.name);
                let mut node = SettingsTreeNode::new(topic.name.clone())
                    .with_visible(settings.visible)
                    .with_field(
                        "color",
                        SettingsTreeField::rgba("Color", settings.color.clone().unwrap_or_default()),
                    );
                if let Some(entry) = self.topics.get(&topic.name) {
                    for ns in entry.namespaces.keys() {
                        let visible = settings.namespaces.get(ns).map_or(true, |s| s.visible);
                        let label = if ns.is_empty() { "(default)" } else { ns.as_str() };
                        node = node.with_child(
                            format!("{NAMESPACE_PREFIX}{ns}"),
                            SettingsTreeNode::new(label).with_visible(visible),
                        );
                    }
                }
                SettingsTreeEntry::new(topic_path(&topic.name), node)
            })
            .collect()
    }

    fn handle_settings_action(&mut self, ctx: &mut SceneContext, action: &SettingsTreeAction) {
        let SettingsTreeAction::Update { path, value, .. } = action else {
            return;
        };
        let settings = match path.as_slice() {
            [root, topic, key] if root == "topics" => {
                let value = match (key.as_str(), value.as_str()) {
                    ("color", Some("")) => serde_json::Value::Null,
                    _ => value.clone(),
                };
                ctx.config.set_topic_setting(topic, key, value);
                (topic, ctx.config.topic_settings::<MarkerTopicSettings>(topic))
            }
            [root, topic, ns, key] if root == "topics" && key == "visible" => {
                let Some(ns) = ns.strip_prefix(NAMESPACE_PREFIX) else {
                    return;
                };
                let visible = value.as_bool().unwrap_or(true);
                (topic, Self::update_namespace(ctx, topic, ns, visible))
            }
            _ => return,
        };
        ctx.invalidate_settings();

        let (topic, settings) = settings;
        let Some(entry) = self.topics.get_mut(topic.as_str()) else {
            return;
        };
        let color_changed = entry.settings.color != settings.color;
        entry.settings = settings;
        entry.apply_visibility();
        if color_changed {
            let color_override = entry.settings.color_override();
            for slot in entry.entries_mut() {
                let Ok(kind) = slot.marker.kind() else {
                    continue;
                };
                if let Ok(Built::Ready(primitives)) =
                    marker_primitives(&slot.marker, kind, color_override, &mut ctx.models)
                {
                    slot.renderable.set_primitives(primitives);
                }
            }
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
        let now = frame.current_time;
        for (topic, entry) in &mut self.topics {
            for markers in entry.namespaces.values_mut() {
                markers.retain(|_, slot| slot.expires_at.map_or(true, |t| now <= t));
            }

            let color_override = entry.settings.color_override();
            for slot in entry.entries_mut() {
                let Some(url) = slot.pending_model.clone() else {
                    continue;
                };
                match ctx.models.entry(&url) {
                    Some(ModelEntry::Loading) => continue,
                    Some(ModelEntry::Failed(message)) => {
                        slot.apply_built(Err(format!("Failed to load mesh {url}: {message}")));
                    }
                    _ => {
                        let Ok(kind) = slot.marker.kind() else {
                            continue;
                        };
                        slot.apply_built(marker_primitives(&slot.marker, kind, color_override, &mut ctx.models));
                    }
                }
            }
            entry.sync_mesh_errors(ctx, topic);
            if entry.namespaces.values().all(BTreeMap::is_empty) {
                ctx.errors.remove_from_topic(topic, MISSING_TRANSFORM);
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
                .flat_map(|topic| topic.namespaces.values())
                .flat_map(|markers| markers.values())
                .map(|slot| &slot.renderable),
        )
    }

    fn renderables_mut<'a>(&'a mut self) -> Box<dyn Iterator<Item = &'a mut Renderable> + 'a> {
        Box::new(
            self.topics
                .values_mut()
                .flat_map(|topic| topic.namespaces.values_mut())
                .flat_map(|markers| markers.values_mut())
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

    use glam::DVec3;

    use super::*;
    use crate::{
        extensions::test_support::{context, frame},
        messages::Topic,
        models::gltf_loader::test_support::triangle_glb,
        time::NANOS_PER_SEC,
    };

    fn event(receive_time: Time, marker: Marker) -> MessageEvent {
        MessageEvent::new("/markers", schemas::MARKER, receive_time, Message::Marker(marker))
    }

    fn cube(ns: &str, id: i32) -> Marker {
        Marker::new("base_link", ns, id, MarkerType::Cube)
    }

    #[test]
    fn add_modify_delete() {
        let mut ctx = context();
        let mut extension = Markers::new();
        extension.handle_message(&mut ctx, &event(0, cube("a", 1)));
        let pick_id = extension.marker("/markers", "a", 1).unwrap().pick_id();

        let mut moved = cube("a", 1);
        moved.pose.position = DVec3::new(1.0, 0.0, 0.0);
        extension.handle_message(&mut ctx, &event(1, moved));
        let renderable = extension.marker("/markers", "a", 1).unwrap();
        assert_eq!(renderable.pick_id(), pick_id);
        assert_eq!(renderable.user_data.pose.position, DVec3::X);

        let mut delete = cube("a", 1);
        delete.action = MarkerAction::Delete;
        extension.handle_message(&mut ctx, &event(2, delete));
        assert!(extension.marker("/markers", "a", 1).is_none());
    }

    #[test]
    fn delete_all_respects_namespace() {
        let mut ctx = context();
        let mut extension = Markers::new();
        let batch = vec![cube("a", 1), cube("a", 2), cube("b", 1)];
        extension.handle_message(
            &mut ctx,
            &MessageEvent::new("/markers", schemas::MARKER_ARRAY, 0, Message::MarkerArray(batch)),
        );
        assert_eq!(extension.marker_count("/markers"), 3);

        let mut delete_a = cube("a", 0);
        delete_a.action = MarkerAction::DeleteAll;
        extension.handle_message(&mut ctx, &event(1, delete_a));
        assert_eq!(extension.marker_count("/markers"), 1);

        let mut delete_all = cube("", 0);
        delete_all.action = MarkerAction::DeleteAll;
        extension.handle_message(&mut ctx, &event(2, delete_all));
        assert_eq!(extension.marker_count("/markers"), 0);
    }

    #[test]
    fn lifetimes_expire() {
        let mut ctx = context();
        let mut extension = Markers::new();
        let mut marker = cube("a", 1);
        marker.lifetime = NANOS_PER_SEC;
        extension.handle_message(&mut ctx, &event(0, marker));
        extension.handle_message(&mut ctx, &event(0, cube("a", 2)));

        extension.start_frame(&mut ctx, &frame(NANOS_PER_SEC));
        assert_eq!(extension.marker_count("/markers"), 2);
        extension.start_frame(&mut ctx, &frame(NANOS_PER_SEC + 1));
        assert_eq!(extension.marker_count("/markers"), 1);
        assert!(extension.marker("/markers", "a", 2).unwrap().visible());
    }

    #[test]
    fn unknown_type_is_reported() {
        let mut ctx = context();
        let mut extension = Markers::new();
        let mut marker = cube("a", 1);
        marker.marker_type = 42;
        extension.handle_message(&mut ctx, &event(0, marker));
        assert!(ctx.errors.has_error(&topic_path("/markers"), INVALID_MARKER));
        assert_eq!(extension.marker_count("/markers"), 0);
    }

    #[test]
    fn line_strip_uses_point_colors() {
        let mut ctx = context();
        let mut extension = Markers::new();
        let mut marker = Marker::new("base_link", "lines", 0, MarkerType::LineStrip);
        marker.points = vec![DVec3::ZERO, DVec3::X, DVec3::Y];
        marker.colors = vec![ColorRgba::RED, ColorRgba::GREEN, ColorRgba::BLUE];
        extension.handle_message(&mut ctx, &event(0, marker));

        let renderable = extension.marker("/markers", "lines", 0).unwrap();
        let Geometry::Lines(lines) = &renderable.primitives[0].geometry else {
            panic!("expected lines");
        };
        assert_eq!(lines.segment_count(), 2);
        assert_eq!(lines.buffer.uint8("color").unwrap()[..4], [255, 0, 0, 255]);
    }

    #[test]
    fn namespace_visibility() {
        let mut ctx = context();
        ctx.topics = vec![Topic::new("/markers", schemas::MARKER)];
        let mut extension = Markers::new();
        extension.handle_message(&mut ctx, &event(0, cube("a", 1)));
        extension.handle_message(&mut ctx, &event(0, cube("b", 1)));

        let nodes = extension.settings_nodes(&ctx);
        assert!(nodes[0].node.child("ns:a").is_some());

        extension.handle_settings_action(
            &mut ctx,
            &SettingsTreeAction::Update {
                path: vec!["topics".into(), "/markers".into(), "ns:a".into(), "visible".into()],
                input: "boolean".into(),
                value: json!(false),
            },
        );
        assert!(!extension.marker("/markers", "a", 1).unwrap().settings_visible);
        assert!(extension.marker("/markers", "b", 1).unwrap().settings_visible);
        let nodes = extension.settings_nodes(&ctx);
        assert_eq!(nodes[0].node.child("ns:a").unwrap().visible, Some(false));
    }

    #[test]
    fn mesh_resources_load_asynchronously() {
        let path = std::env::temp_dir().join(format!("sceneview-marker-{}.glb", std::process::id()));
        std::fs::write(&path, triangle_glb()).unwrap();

        let mut ctx = context();
        let mut extension = Markers::new();
        let mut marker = Marker::new("base_link", "mesh", 0, MarkerType::MeshResource);
        marker.mesh_resource = format!("file://{}", path.display());
        extension.handle_message(&mut ctx, &event(0, marker));
        assert!(extension.marker("/markers", "mesh", 0).unwrap().primitives.is_empty());

        ctx.models.wait_for_pending(Duration::from_secs(10));
        extension.start_frame(&mut ctx, &frame(0));
        std::fs::remove_file(&path).unwrap();

        let renderable = extension.marker("/markers", "mesh", 0).unwrap();
        assert_eq!(renderable.primitives.len(), 1);
        assert!(!ctx.errors.has_error(&topic_path("/markers"), MESH_LOAD_FAILED));
    }

    #[test]
    fn invalid_marker_in_batch_stays_reported() {
        let mut ctx = context();
        let mut extension = Markers::new();
        let mut bad = cube("a", 1);
        bad.marker_type = 42;
        let batch = vec![bad, cube("a", 2)];
        extension.handle_message(
            &mut ctx,
            &MessageEvent::new("/markers", schemas::MARKER_ARRAY, 0, Message::MarkerArray(batch)),
        );
        assert!(ctx.errors.has_error(&topic_path("/markers"), INVALID_MARKER));
        assert_eq!(extension.marker_count("/markers"), 1);

        extension.handle_message(&mut ctx, &event(1, cube("a", 3)));
        assert!(!ctx.errors.has_error(&topic_path("/markers"), INVALID_MARKER));
    }

    #[test]
    fn missing_transform_clears_after_delete() {
        let mut ctx = context();
        let mut extension = Markers::new();
        extension.handle_message(&mut ctx, &event(0, Marker::new("nowhere", "a", 1, MarkerType::Cube)));
        extension.start_frame(&mut ctx, &frame(0));
        assert!(ctx.errors.has_error(&topic_path("/markers"), MISSING_TRANSFORM));

        let mut delete = Marker::new("nowhere", "a", 1, MarkerType::Cube);
        delete.action = MarkerAction::Delete;
        extension.handle_message(&mut ctx, &event(1, delete));
        extension.start_frame(&mut ctx, &frame(1));
        assert_eq!(extension.marker_count("/markers"), 0);
        assert!(!ctx.errors.has_error(&topic_path("/markers"), MISSING_TRANSFORM));
    }

    #[test]
    fn failed_mesh_keeps_last_render_until_a_load_succeeds() {
        let path = std::env::temp_dir().join(format!("sceneview-retry-{}.glb", std::process::id()));
        std::fs::write(&path, triangle_glb()).unwrap();

        let mut ctx = context();
        let mut extension = Markers::new();
        extension.handle_message(&mut ctx, &event(0, cube("mesh", 0)));

        let mut broken = Marker::new("base_link", "mesh", 0, MarkerType::MeshResource);
        broken.mesh_resource = "/no/such/mesh.glb".into();
        extension.handle_message(&mut ctx, &event(1, broken));
        ctx.models.wait_for_pending(Duration::from_secs(10));
        extension.start_frame(&mut ctx, &frame(1));
        assert!(ctx.errors.has_error(&topic_path("/markers"), MESH_LOAD_FAILED));
        let renderable = extension.marker("/markers", "mesh", 0).unwrap();
        assert_eq!(renderable.primitives.len(), 1);
        assert!(matches!(renderable.primitives[0].geometry, Geometry::Mesh(_)));

        let mut fixed = Marker::new("base_link", "mesh", 0, MarkerType::MeshResource);
        fixed.mesh_resource = format!("file://{}", path.display());
        extension.handle_message(&mut ctx, &event(2, fixed));
        ctx.models.wait_for_pending(Duration::from_secs(10));
        extension.start_frame(&mut ctx, &frame(2));
        std::fs::remove_file(&path).unwrap();

        assert!(!ctx.errors.has_error(&topic_path("/markers"), MESH_LOAD_FAILED));
        assert_eq!(extension.marker("/markers", "mesh", 0).unwrap().primitives.len(), 1);
    }
}
