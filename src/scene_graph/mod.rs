pub mod geometry;
pub mod history;
pub mod renderable;
pub mod shapes;

use std::collections::{BTreeMap, BTreeSet};

pub use geometry::{AttributeData, DynamicBufferGeometry};
pub use history::{HistoryEntry, RenderObjectHistory};
pub use renderable::{
    Geometry, LinesGeometry, MeshGeometry, MeshInstance, MeshVertex, Picking, PointShape,
    PointsGeometry, PoseUpdate, Primitive, Renderable, RenderableUserData, TexturedGeometry,
    TexturedVertex,
};

use crate::{
    settings::{LayerErrors, SettingsPath},
    time::Time,
    transforms::TransformTree,
};

pub const MISSING_TRANSFORM: &str = "MISSING_TRANSFORM";

/// Resolves every renderable's pose and reports missing transforms once per settings path.
/// Does nothing while no render frame exists.
pub fn update_renderable_poses<'a>(
    renderables: impl Iterator<Item = &'a mut Renderable>,
    tree: &TransformTree,
    errors: &mut LayerErrors,
    render_frame_id: &str,
    fixed_frame_id: &str,
    current_time: Time,
) {
    if render_frame_id.is_empty() {
        return;
    }
    let mut missing: BTreeMap<SettingsPath, Option<String>> = BTreeMap::new();
    for renderable in renderables {
        let update = renderable.update_pose(tree, render_frame_id, fixed_frame_id, current_time);
        let slot = missing
            .entry(renderable.user_data.settings_path.clone())
            .or_insert(None);
        if update == PoseUpdate::MissingTransform && slot.is_none() {
            *slot = Some(format!(
                "Missing transform from frame <{}> to frame <{}>",
                renderable.user_data.frame_id, render_frame_id
            ));
        }
    }

    for (path, message) in missing {
        match message {
            Some(message) => errors.add(&path, MISSING_TRANSFORM, message),
            None => errors.remove(&path, MISSING_TRANSFORM),
        }
    }
}

/// Drops MISSING_TRANSFORM from every path that no longer has a renderable.
pub fn clear_stale_missing_transforms<'a>(
    errors: &mut LayerErrors,
    renderables: impl Iterator<Item = &'a Renderable>,
) {
    let live: BTreeSet<&SettingsPath> = renderables
        .map(|renderable| &renderable.user_data.settings_path)
        .collect();
    for path in errors.paths_with_error(MISSING_TRANSFORM) {
        if !live.contains(&path) {
            errors.remove(&path, MISSING_TRANSFORM);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{settings::topic_path, transforms::Transform};

    #[test]
    fn missing_transforms_are_reported_per_path() {
        let mut tree = TransformTree::new();
        tree.add_transform("map", "base_link", 0, Transform::IDENTITY);
        let mut errors = LayerErrors::new();

        let mut renderables = vec![
            Renderable::new("ok", RenderableUserData::new("base_link", topic_path("/a"))),
            Renderable::new("lost", RenderableUserData::new("lidar", topic_path("/a"))),
            Renderable::new("ok", RenderableUserData::new("map", topic_path("/b"))),
        ];
        update_renderable_poses(renderables.iter_mut(), &tree, &mut errors, "map", "map", 0);
        assert!(errors.has_error(&topic_path("/a"), MISSING_TRANSFORM));
        assert!(!errors.has_error(&topic_path("/b"), MISSING_TRANSFORM));

        tree.add_transform("base_link", "lidar", 0, Transform::IDENTITY);
        update_renderable_poses(renderables.iter_mut(), &tree, &mut errors, "map", "map", 0);
        assert!(!errors.has_error(&topic_path("/a"), MISSING_TRANSFORM));
        assert!(renderables.iter().all(Renderable::visible));
    }

    #[test]
    fn nothing_is_posed_without_a_render_frame() {
        let tree = TransformTree::new();
        let mut errors = LayerErrors::new();
        let mut renderables = vec![Renderable::new("a", RenderableUserData::new("lidar", topic_path("/a")))];
        update_renderable_poses(renderables.iter_mut(), &tree, &mut errors, "", "", 0);
        assert!(errors.paths_with_errors().is_empty());
    }

    #[test]
    fn stale_missing_transforms_are_cleared() {
        let tree = TransformTree::new();
        let mut errors = LayerErrors::new();
        let mut renderables = vec![
            Renderable::new("gone", RenderableUserData::new("nowhere", topic_path("/gone"))),
            Renderable::new("kept", RenderableUserData::new("nowhere", topic_path("/kept"))),
        ];
        update_renderable_poses(renderables.iter_mut(), &tree, &mut errors, "map", "map", 0);
        assert_eq!(errors.paths_with_error(MISSING_TRANSFORM).len(), 2);

        renderables.remove(0);
        clear_stale_missing_transforms(&mut errors, renderables.iter());
        assert!(!errors.has_error(&topic_path("/gone"), MISSING_TRANSFORM));
        assert!(errors.has_error(&topic_path("/kept"), MISSING_TRANSFORM));
    }
}
