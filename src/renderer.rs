//! The scene orchestrator. Owns the extensions, the shared scene context, the settings tree and
//! optionally a GPU renderer, and drives them one animation frame at a time.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{mpsc::Receiver, Arc},
};

use glam::{Mat4, Vec2};
use serde::Serialize;

use crate::{
    camera::Camera,
    color::ColorRgba,
    config::{FollowMode, RendererConfig},
    error::{ConfigError, RenderResult},
    extensions::{
        frame_axes::{frame_settings_path, CYCLE_DETECTED},
        registry::ExtensionRegistry,
        FilterQueue, FrameInfo, PublishEvent, SceneClick, SceneContext, SceneExtension, ToolKind,
    },
    messages::{FrameTransform, Message, MessageEvent, Topic},
    rendering::{RenderStats, SceneRenderer, NO_HIT},
    scene_graph::{clear_stale_missing_transforms, Geometry, Renderable},
    settings::{
        LayerErrors, SettingsManager, SettingsPath, SettingsTreeAction, SettingsTreeChanged,
        SettingsTreeNode,
    },
    time::{to_secs, Time},
    transforms::{normalize_frame_id, AddTransformResult, Transform, TransformTree},
};

/// Frames preferred as the render frame when no follow frame is configured, best first.
pub const DEFAULT_FOLLOW_FRAMES: &[&str] = &["base_link", "odom", "map", "earth"];

const DEFAULT_VIEWPORT: Vec2 = Vec2::new(800.0, 600.0);

const DEFAULT_BACKGROUND: ColorRgba = ColorRgba::new(0.07, 0.07, 0.09, 1.0);

/// What a click resolved to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickedObject {
    pub object_id: u32,
    /// Index of the point or mesh instance under the cursor, for instanced renderables.
    pub instance_index: Option<u32>,
    pub extension_id: &'static str,
    pub name: String,
    pub topic: Option<String>,
    pub settings_path: SettingsPath,
    pub details: serde_json::Value,
}

pub struct Renderer {
    ctx: SceneContext,
    extensions: Vec<Box<dyn SceneExtension>>,
    settings: SettingsManager,
    gpu: Option<SceneRenderer>,
    camera: Camera,
    viewport: Vec2,
    stats: RenderStats,
    animation_frame_queued: bool,
    settings_built: bool,
    known_frames: usize,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self::with_registry(config, &ExtensionRegistry::with_builtin())
    }

    pub fn with_registry(config: RendererConfig, registry: &ExtensionRegistry) -> Self {
        let mut ctx = SceneContext::new(config);
        let settings = SettingsManager::new(Some(ctx.errors.subscribe()));
        let extensions = registry.instantiate();
        for extension in &extensions {
            log::debug!("Registered extension {}", extension.extension_id());
        }
        log::info!("Renderer created with {} extensions", extensions.len());

        let camera = Camera::new(ctx.config.camera_state.clone());
        Self {
            ctx,
            extensions,
            settings,
            gpu: None,
            camera,
            viewport: DEFAULT_VIEWPORT,
            stats: RenderStats::default(),
            animation_frame_queued: true,
            settings_built: false,
            known_frames: 0,
        }
    }

    /// Attaches the GPU side. Without one, frames still update the scene but draw nothing.
    pub fn attach_gpu(&mut self, gpu: SceneRenderer) {
        self.viewport = gpu.resolution();
        self.gpu = Some(gpu);
        self.queue_animation_frame();
    }

    pub fn gpu(&self) -> Option<&SceneRenderer> {
        self.gpu.as_ref()
    }

    pub fn gpu_mut(&mut self) -> Option<&mut SceneRenderer> {
        self.gpu.as_mut()
    }

    pub fn context(&self) -> &SceneContext {
        &self.ctx
    }

    pub fn config(&self) -> &RendererConfig {
        &self.ctx.config
    }

    /// The config with the current camera state written back.
    pub fn config_json(&mut self) -> Result<String, ConfigError> {
        self.ctx.config.camera_state = self.camera.state.clone();
        self.ctx.config.to_json()
    }

    pub fn transform_tree(&self) -> &TransformTree {
        &self.ctx.transform_tree
    }

    pub fn errors(&self) -> &LayerErrors {
        &self.ctx.errors
    }

    pub fn extension_ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.extensions.iter().map(|ext| ext.extension_id())
    }

    pub fn renderables(&self) -> impl Iterator<Item = &Renderable> + '_ {
        self.extensions.iter().flat_map(|ext| ext.renderables())
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        self.queue_animation_frame();
        &mut self.camera
    }

    pub fn resolution(&self) -> Vec2 {
        self.gpu
            .as_ref()
            .map_or(self.viewport, SceneRenderer::resolution)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.viewport = Vec2::new(width as f32, height as f32);
        if let Some(gpu) = &mut self.gpu {
            gpu.resize(width, height);
        }
        self.queue_animation_frame();
    }

    pub fn set_debug_picking(&mut self, enabled: bool) {
        if let Some(gpu) = &mut self.gpu {
            gpu.debug_picking = enabled;
        }
        self.queue_animation_frame();
    }

    pub fn debug_picking(&self) -> bool {
        self.gpu.as_ref().is_some_and(|gpu| gpu.debug_picking)
    }

    // Settings

    pub fn settings_tree(&self) -> Arc<SettingsTreeNode> {
        self.settings.tree()
    }

    pub fn subscribe_settings(&mut self) -> Receiver<SettingsTreeChanged> {
        self.settings.subscribe()
    }

    pub fn subscribe_publish(&mut self) -> Receiver<PublishEvent> {
        self.ctx.subscribe_publish()
    }

    /// Routes a settings-tree action to the extensions owning the nodes along its path.
    pub fn handle_settings_action(&mut self, action: SettingsTreeAction) {
        let handlers = self.settings.handle_action(&action);
        if handlers.is_empty() {
            log::warn!("No handler for settings action {action:?}");
            return;
        }
        self.ctx.config.camera_state = self.camera.state.clone();
        for key in handlers {
            if let Some(extension) = self.extensions.iter_mut().find(|ext| ext.extension_id() == key) {
                extension.handle_settings_action(&mut self.ctx, &action);
            }
        }
        self.camera.state = self.ctx.config.camera_state.clone();
        // Settings actions usually change what a node shows
        self.ctx.invalidate_settings();
        self.sync_settings();
        self.queue_animation_frame();
    }

    fn sync_settings(&mut self) {
        let invalidated = self.ctx.take_settings_invalidated();
        let frame_count = self.ctx.transform_tree.frame_count();
        if self.settings_built && !invalidated && frame_count == self.known_frames {
            return;
        }
        for extension in &self.extensions {
            let entries = extension.settings_nodes(&self.ctx);
            self.settings.set_nodes_for_key(extension.extension_id(), entries);
        }
        self.settings_built = true;
        self.known_frames = frame_count;
    }

    // Topics and messages

    /// The schemas any extension subscribes to, plus the transform schemas handled here.
    pub fn subscribed_schemas(&self) -> BTreeSet<&'static str> {
        let mut schemas: BTreeSet<&'static str> =
            crate::messages::schemas::TRANSFORMS.iter().copied().collect();
        for extension in &self.extensions {
            for subscription in extension.subscriptions() {
                schemas.extend(subscription.schema_names.iter().copied());
            }
        }
        schemas
    }

    pub fn set_topics(&mut self, topics: Vec<Topic>) {
        if self.ctx.topics == topics {
            return;
        }
        log::debug!("Topics changed: {} topics", topics.len());
        self.ctx.topics = topics;
        for extension in &mut self.extensions {
            extension.topics_changed(&mut self.ctx);
        }
        self.ctx.invalidate_settings();
        self.sync_settings();
        self.queue_animation_frame();
    }

    /// Applies a batch. Transforms go first so everything else in the batch can resolve
    /// against them; other messages reach their subscribers in receive-time order.
    pub fn add_message_events(&mut self, mut events: Vec<MessageEvent>) {
        if events.is_empty() {
            return;
        }
        events.sort_by_key(|event| event.receive_time);

        for event in events.iter().filter(|event| event.is_transform()) {
            match &event.message {
                Message::FrameTransform(transform) => self.add_frame_transform(transform),
                Message::FrameTransforms(transforms) => {
                    for transform in transforms {
                        self.add_frame_transform(transform);
                    }
                }
                _ => {}
            }
        }

        let mut last_by_topic: HashMap<&str, usize> = HashMap::new();
        for (index, event) in events.iter().enumerate() {
            last_by_topic.insert(event.topic.as_str(), index);
        }

        for (index, event) in events.iter().enumerate() {
            if event.is_transform() {
                continue;
            }
            let is_last = last_by_topic.get(event.topic.as_str()) == Some(&index);
            for extension in &mut self.extensions {
                let wants = extension.subscriptions().iter().any(|subscription| {
                    subscription
                        .schema_names
                        .iter()
                        .any(|schema| *schema == event.schema_name)
                        && (subscription.filter_queue == FilterQueue::All || is_last)
                });
                if wants {
                    extension.handle_message(&mut self.ctx, event);
                }
            }
        }

        self.sync_settings();
        self.queue_animation_frame();
    }

    fn add_frame_transform(&mut self, transform: &FrameTransform) {
        let parent = normalize_frame_id(&transform.parent_frame_id).to_string();
        let child = normalize_frame_id(&transform.child_frame_id).to_string();
        self.add_transform(
            &parent,
            &child,
            transform.timestamp,
            Transform::new(transform.translation, transform.rotation),
        );
    }

    // Coordinate frames

    pub fn add_transform(
        &mut self,
        parent_frame_id: &str,
        child_frame_id: &str,
        stamp: Time,
        transform: Transform,
    ) -> AddTransformResult {
        let parent = normalize_frame_id(parent_frame_id);
        let child = normalize_frame_id(child_frame_id);
        let result = self
            .ctx
            .transform_tree
            .add_transform(parent, child, stamp, transform);
        let path = frame_settings_path(child);
        match result {
            AddTransformResult::CycleDetected => {
                log::warn!("Transform {parent} -> {child} would create a cycle");
                self.ctx.errors.add(
                    &path,
                    CYCLE_DETECTED,
                    format!("Transform tree cycle detected: Received transform with parent \"{parent}\" and child \"{child}\", but \"{child}\" is already an ancestor of \"{parent}\""),
                );
            }
            AddTransformResult::Updated => {
                self.ctx.errors.remove(&path, CYCLE_DETECTED);
                self.queue_animation_frame();
            }
            AddTransformResult::Noop => {}
        }
        result
    }

    pub fn add_coordinate_frame(&mut self, frame_id: &str) {
        if self
            .ctx
            .transform_tree
            .add_coordinate_frame(normalize_frame_id(frame_id))
        {
            self.queue_animation_frame();
        }
    }

    pub fn remove_transform(&mut self, child_frame_id: &str, parent_frame_id: &str, stamp: Time) {
        let removed = self.ctx.transform_tree.remove_transform(
            normalize_frame_id(child_frame_id),
            normalize_frame_id(parent_frame_id),
            stamp,
        );
        if removed {
            self.queue_animation_frame();
        }
    }

    /// Sets the frame the camera follows. `None` picks one automatically.
    pub fn set_follow_frame_id(&mut self, frame_id: Option<&str>) {
        let frame_id = frame_id.map(|id| normalize_frame_id(id).to_string());
        if self.ctx.config.follow_tf != frame_id {
            log::info!("Follow frame set to {frame_id:?}");
            self.ctx.config.follow_tf = frame_id;
            self.ctx.invalidate_settings();
            self.queue_animation_frame();
        }
    }

    pub fn render_frame_id(&self) -> Option<&str> {
        self.ctx.render_frame_id.as_deref()
    }

    pub fn fixed_frame_id(&self) -> Option<&str> {
        self.ctx.fixed_frame_id.as_deref()
    }

    /// The frame to follow: the configured one if it exists, else the first present default,
    /// else the root with the most descendants.
    fn follow_candidate(&self) -> Option<String> {
        let tree = &self.ctx.transform_tree;
        if let Some(follow) = &self.ctx.config.follow_tf {
            if tree.has_frame(follow) {
                return Some(follow.clone());
            }
        }
        if let Some(id) = DEFAULT_FOLLOW_FRAMES.iter().find(|id| tree.has_frame(id)) {
            return Some(id.to_string());
        }
        tree.frames()
            .filter(|frame| tree.root_of(frame.id()) == Some(frame.id()))
            .map(|frame| (tree.descendant_count(frame.id()), frame.id()))
            // Ties resolve to the smallest id so the choice is stable
            .max_by(|(a_count, a_id), (b_count, b_id)| a_count.cmp(b_count).then(b_id.cmp(a_id)))
            .map(|(_, id)| id.to_string())
    }

    fn select_frames(&mut self) {
        let follow = self.follow_candidate();
        let fixed = follow.as_deref().and_then(|id| {
            self.ctx
                .transform_tree
                .root_of(id)
                .map(str::to_string)
        });
        let render = match self.ctx.config.follow_mode {
            FollowMode::None => fixed.clone(),
            FollowMode::Pose | FollowMode::Position => follow,
        };

        if render != self.ctx.render_frame_id || fixed != self.ctx.fixed_frame_id {
            log::info!("Render frame {render:?}, fixed frame {fixed:?}");
            self.ctx.render_frame_id = render;
            self.ctx.fixed_frame_id = fixed;
        }
    }

    fn update_follow_transform(&mut self) {
        self.camera.follow_transform = match (
            self.ctx.config.follow_mode,
            &self.ctx.render_frame_id,
            &self.ctx.fixed_frame_id,
        ) {
            (FollowMode::Position, Some(render), Some(fixed)) => self
                .ctx
                .transform_tree
                .transform_to_ancestor(fixed, render, self.ctx.current_time)
                .map_or(Mat4::IDENTITY, |fixed_from_render| {
                    Mat4::from_quat(fixed_from_render.rotation.as_quat())
                }),
            _ => Mat4::IDENTITY,
        };
    }

    // Time

    pub fn current_time(&self) -> Time {
        self.ctx.current_time
    }

    /// Moves the playback clock. Seeking backwards drops all scene state.
    pub fn set_current_time(&mut self, time: Time) {
        if time < self.ctx.current_time {
            log::info!(
                "Seek backwards from {:.3}s to {:.3}s, clearing scene",
                to_secs(self.ctx.current_time),
                to_secs(time)
            );
            self.clear(true);
        }
        self.ctx.current_time = time;
        self.queue_animation_frame();
    }

    /// Removes every renderable. Transform history is kept unless `clear_transforms`.
    pub fn clear(&mut self, clear_transforms: bool) {
        for extension in &mut self.extensions {
            extension.remove_all_renderables();
        }
        if clear_transforms {
            self.ctx.transform_tree.clear();
            self.ctx.errors.clear_path(&["transforms".to_string()]);
        }
        self.ctx.invalidate_settings();
        self.sync_settings();
        self.queue_animation_frame();
    }

    // Frames

    pub fn queue_animation_frame(&mut self) {
        self.animation_frame_queued = true;
    }

    /// Returns whether a frame was requested since the last call, and resets the request.
    pub fn take_animation_frame_request(&mut self) -> bool {
        std::mem::take(&mut self.animation_frame_queued)
    }

    /// Runs one tick: finished model loads, frame selection, `start_frame` on every extension,
    /// settings and error sync, then the GPU render if one is attached.
    pub fn animation_frame(&mut self) -> RenderResult<()> {
        self.animation_frame_queued = false;
        let loaded = self.ctx.models.poll();
        if !loaded.is_empty() {
            log::debug!("{} model loads finished", loaded.len());
        }

        self.select_frames();
        let frame = FrameInfo {
            current_time: self.ctx.current_time,
            render_frame_id: self.ctx.render_frame_id.clone().unwrap_or_default(),
            fixed_frame_id: self.ctx.fixed_frame_id.clone().unwrap_or_default(),
        };
        for extension in &mut self.extensions {
            extension.start_frame(&mut self.ctx, &frame);
        }
        clear_stale_missing_transforms(
            &mut self.ctx.errors,
            self.extensions.iter().flat_map(|ext| ext.renderables()),
        );
        self.sync_settings();
        self.settings.sync_errors();
        self.update_follow_transform();

        if let Some(gpu) = &mut self.gpu {
            let background = self
                .ctx
                .config
                .scene
                .background_color
                .as_deref()
                .and_then(ColorRgba::from_hex)
                .unwrap_or(DEFAULT_BACKGROUND);
            let renderables = self
                .extensions
                .iter_mut()
                .flat_map(|ext| ext.renderables_mut());
            self.stats = gpu.render(renderables, &self.camera, background)?;
            if self.ctx.config.scene.enable_stats {
                log::trace!("Frame stats {:?}", self.stats);
            }
        }
        Ok(())
    }

    // Interaction

    pub fn active_tool(&self) -> Option<ToolKind> {
        self.ctx.active_tool
    }

    pub fn set_active_tool(&mut self, tool: Option<ToolKind>) {
        log::debug!("Active tool {tool:?}");
        self.ctx.active_tool = tool;
        self.queue_animation_frame();
    }

    /// Offers a click to the active tool first; if no tool consumes it, picks the object
    /// under the cursor.
    pub fn handle_click(&mut self, cursor: Vec2) -> RenderResult<Option<PickedObject>> {
        let ray = self.camera.screen_ray(cursor, self.resolution());
        let click = SceneClick {
            cursor,
            ray,
            ground_point: ray.and_then(|ray| ray.intersect_ground(0.0)),
            render_frame_id: self.ctx.render_frame_id.clone(),
        };
        for extension in &mut self.extensions {
            if extension.handle_scene_click(&mut self.ctx, &click) {
                log::debug!("Click consumed by {}", extension.extension_id());
                self.queue_animation_frame();
                return Ok(None);
            }
        }
        self.pick(cursor.x, cursor.y)
    }

    /// Resolves the object under window pixel `(x, y)` in the last rendered frame.
    pub fn pick(&mut self, x: f32, y: f32) -> RenderResult<Option<PickedObject>> {
        let Some(gpu) = &mut self.gpu else {
            return Ok(None);
        };
        let object_id = gpu.pick(x, y)?;
        if object_id == NO_HIT {
            return Ok(None);
        }

        let found = self.extensions.iter().find_map(|ext| {
            ext.renderables()
                .find(|renderable| renderable.pick_id() == object_id)
                .map(|renderable| (ext.extension_id(), renderable))
        });
        let Some((extension_id, renderable)) = found else {
            log::debug!("Picked id {object_id} has no renderable");
            return Ok(None);
        };

        let instanced = renderable.primitives.iter().any(|primitive| match &primitive.geometry {
            Geometry::Points(_) => true,
            Geometry::Mesh(mesh) => mesh.instances.len() > 1,
            _ => false,
        });
        let instance_index = if instanced {
            Some(gpu.pick_instance(x, y, object_id)?).filter(|index| *index != NO_HIT)
        } else {
            None
        };

        Ok(Some(PickedObject {
            object_id,
            instance_index,
            extension_id,
            name: renderable.name.clone(),
            topic: renderable.user_data.topic.clone(),
            settings_path: renderable.user_data.settings_path.clone(),
            details: renderable.details.clone(),
        }))
    }

    pub fn dispose(&mut self) {
        for extension in &mut self.extensions {
            extension.dispose();
        }
        self.gpu = None;
    }
}

#[cfg(test)]
mod tests {
    use glam::{DQuat, DVec3};

    use super::*;
    use crate::{
        extensions::markers,
        messages::{schemas, Header, Marker, MarkerAction, MarkerType, PoseStamped},
        scene_graph::MISSING_TRANSFORM,
        settings::topic_path,
        time::NANOS_PER_SEC,
        transforms::Pose,
    };

    fn tf(receive_time: Time, parent: &str, child: &str, x: f64) -> MessageEvent {
        MessageEvent::new(
            "/tf",
            schemas::TF,
            receive_time,
            Message::FrameTransform(FrameTransform {
                timestamp: receive_time,
                parent_frame_id: parent.to_string(),
                child_frame_id: child.to_string(),
                translation: DVec3::new(x, 0.0, 0.0),
                rotation: DQuat::IDENTITY,
            }),
        )
    }

    fn marker_event(receive_time: Time, marker: Marker) -> MessageEvent {
        MessageEvent::new("/markers", schemas::MARKER, receive_time, Message::Marker(marker))
    }

    fn pose(receive_time: Time, x: f64) -> MessageEvent {
        MessageEvent::new(
            "/pose",
            schemas::POSE_STAMPED,
            receive_time,
            Message::PoseStamped(PoseStamped {
                header: Header::new(receive_time, "base_link"),
                pose: Pose::from_position(DVec3::new(x, 0.0, 0.0)),
            }),
        )
    }

    #[test]
    fn subscribed_schemas_cover_transforms_and_extensions() {
        let renderer = Renderer::new(RendererConfig::default());
        let schemas = renderer.subscribed_schemas();
        assert!(schemas.contains(schemas::TF));
        assert!(schemas.contains(schemas::POINT_CLOUD2));
        assert!(schemas.contains(schemas::MARKER_ARRAY));
    }

    #[test]
    fn transforms_are_normalized_and_resolved() {
        let mut renderer = Renderer::new(RendererConfig::default());
        renderer.add_message_events(vec![
            tf(0, "/base", "sensor", 0.0),
            tf(10 * NANOS_PER_SEC, "base", "/sensor", 10.0),
        ]);

        let tree = renderer.transform_tree();
        assert!(tree.has_frame("base"));
        assert!(!tree.has_frame("/base"));
        let resolved = tree
            .apply(&Pose::IDENTITY, "base", "base", "sensor", 5 * NANOS_PER_SEC, 5 * NANOS_PER_SEC)
            .unwrap();
        assert!(resolved.position.abs_diff_eq(DVec3::new(5.0, 0.0, 0.0), 1e-9));
    }

    #[test]
    fn cycles_are_reported_on_the_frame() {
        let mut renderer = Renderer::new(RendererConfig::default());
        renderer.add_transform("a", "b", 0, Transform::IDENTITY);
        let result = renderer.add_transform("b", "a", 0, Transform::IDENTITY);
        assert_eq!(result, AddTransformResult::CycleDetected);
        assert!(renderer
            .errors()
            .has_error(&frame_settings_path("a"), CYCLE_DETECTED));
    }

    #[test]
    fn selects_default_follow_frame() {
        let mut renderer = Renderer::new(RendererConfig::default());
        renderer.add_transform("map", "odom", 0, Transform::IDENTITY);
        renderer.add_transform("odom", "base_link", 0, Transform::IDENTITY);
        renderer.animation_frame().unwrap();
        assert_eq!(renderer.render_frame_id(), Some("base_link"));
        assert_eq!(renderer.fixed_frame_id(), Some("map"));

        renderer.set_follow_frame_id(Some("/odom"));
        renderer.animation_frame().unwrap();
        assert_eq!(renderer.render_frame_id(), Some("odom"));
    }

    #[test]
    fn falls_back_to_largest_root() {
        let mut renderer = Renderer::new(RendererConfig::default());
        renderer.add_transform("world", "a", 0, Transform::IDENTITY);
        renderer.add_transform("a", "b", 0, Transform::IDENTITY);
        renderer.add_transform("lonely", "c", 0, Transform::IDENTITY);
        renderer.animation_frame().unwrap();
        assert_eq!(renderer.render_frame_id(), Some("world"));
    }

    #[test]
    fn follow_none_renders_in_fixed_frame() {
        let config = RendererConfig {
            follow_mode: FollowMode::None,
            ..Default::default()
        };
        let mut renderer = Renderer::new(config);
        renderer.add_transform("map", "base_link", 0, Transform::IDENTITY);
        renderer.animation_frame().unwrap();
        assert_eq!(renderer.render_frame_id(), Some("map"));
    }

    #[test]
    fn messages_are_delivered_in_receive_time_order() {
        let mut renderer = Renderer::new(RendererConfig::default());
        renderer.set_topics(vec![Topic::new("/pose", schemas::POSE_STAMPED)]);
        renderer.add_message_events(vec![pose(2, 2.0), tf(0, "map", "base_link", 0.0), pose(1, 1.0)]);

        let renderable = renderer
            .renderables()
            .find(|r| r.user_data.topic.as_deref() == Some("/pose"))
            .unwrap();
        assert_eq!(renderable.details["position"][0], 2.0);
    }

    #[test]
    fn backward_seek_clears_scene() {
        let mut renderer = Renderer::new(RendererConfig::default());
        renderer.set_topics(vec![Topic::new("/pose", schemas::POSE_STAMPED)]);
        renderer.set_current_time(5);
        renderer.add_message_events(vec![tf(5, "map", "base_link", 0.0), pose(5, 1.0)]);
        assert!(renderer.renderables().any(|r| r.user_data.topic.is_some()));

        renderer.set_current_time(1);
        assert_eq!(renderer.current_time(), 1);
        assert!(renderer.transform_tree().is_empty());
        assert!(!renderer.renderables().any(|r| r.user_data.topic.is_some()));
    }

    #[test]
    fn settings_tree_is_built_on_first_frame() {
        let mut renderer = Renderer::new(RendererConfig::default());
        let changes = renderer.subscribe_settings();
        renderer.add_transform("map", "base_link", 0, Transform::IDENTITY);
        renderer.animation_frame().unwrap();

        let tree = renderer.settings_tree();
        assert!(tree.children.contains_key("general"));
        assert!(tree.children.contains_key("transforms"));
        assert!(changes.try_recv().is_ok());
    }

    #[test]
    fn frame_requests_are_consumed() {
        let mut renderer = Renderer::new(RendererConfig::default());
        assert!(renderer.take_animation_frame_request());
        assert!(!renderer.take_animation_frame_request());
        renderer.add_coordinate_frame("map");
        assert!(renderer.take_animation_frame_request());
    }

    #[test]
    fn picking_without_gpu_finds_nothing() {
        let mut renderer = Renderer::new(RendererConfig::default());
        assert_eq!(renderer.pick(10.0, 10.0).unwrap(), None);
    }

    #[test]
    fn config_round_trips_camera_state() {
        let mut renderer = Renderer::new(RendererConfig::default());
        renderer.camera_mut().state.distance = 42.0;
        let json = renderer.config_json().unwrap();
        let config = RendererConfig::from_json(&json).unwrap();
        assert_eq!(config.camera_state.distance, 42.0);
    }

    #[test]
    fn marker_lifetimes_expire_before_any_transform() {
        let mut renderer = Renderer::new(RendererConfig::default());
        renderer.set_topics(vec![Topic::new("/markers", schemas::MARKER)]);
        let mut marker = Marker::new("base_link", "a", 1, MarkerType::Cube);
        marker.lifetime = NANOS_PER_SEC;
        renderer.add_message_events(vec![marker_event(0, marker)]);
        renderer.animation_frame().unwrap();
        assert!(renderer.renderables().any(|r| r.user_data.topic.as_deref() == Some("/markers")));
        assert!(renderer.errors().paths_with_errors().is_empty());

        renderer.set_current_time(2 * NANOS_PER_SEC);
        renderer.animation_frame().unwrap();
        assert_eq!(renderer.render_frame_id(), None);
        assert!(!renderer.renderables().any(|r| r.user_data.topic.as_deref() == Some("/markers")));
    }

    #[test]
    fn missing_transform_clears_once_the_renderable_is_gone() {
        let mut renderer = Renderer::new(RendererConfig::default());
        renderer.set_topics(vec![Topic::new("/markers", schemas::MARKER)]);
        renderer.add_message_events(vec![
            tf(0, "map", "base_link", 0.0),
            marker_event(0, Marker::new("nowhere", "a", 1, MarkerType::Cube)),
        ]);
        renderer.animation_frame().unwrap();
        let path = topic_path("/markers");
        assert!(renderer.errors().has_error(&path, MISSING_TRANSFORM));
        let marker_error = |renderer: &Renderer| {
            renderer
                .settings_tree()
                .child("topics")
                .and_then(|topics| topics.child("/markers"))
                .and_then(|node| node.error.clone())
        };
        assert!(marker_error(&renderer).is_some());

        let mut delete = Marker::new("nowhere", "a", 1, MarkerType::Cube);
        delete.action = MarkerAction::Delete;
        renderer.add_message_events(vec![marker_event(1, delete)]);
        renderer.animation_frame().unwrap();
        assert!(!renderer.errors().has_error(&path, MISSING_TRANSFORM));
        assert!(!renderer.errors().has_error(&path, markers::INVALID_MARKER));
        assert_eq!(marker_error(&renderer), None);
    }
}
