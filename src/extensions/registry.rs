use crate::{
    error::RegistryError,
    extensions::{
        cameras, core_settings, frame_axes, grids, laser_scans, markers, measurement_tool,
        occupancy_grids, point_clouds, polygons, pose_arrays, poses, publish_click_tool,
        scene_entities, SceneExtension,
    },
};

pub type ExtensionFactory = fn() -> Box<dyn SceneExtension>;

/// Extensions the renderer depends on. They can not be replaced.
pub const RESERVED_EXTENSIONS: &[&str] = &[
    core_settings::EXTENSION_ID,
    measurement_tool::EXTENSION_ID,
    publish_click_tool::EXTENSION_ID,
];

/// Extension factories by id, instantiated in registration order.
pub struct ExtensionRegistry {
    factories: Vec<(String, ExtensionFactory)>,
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl ExtensionRegistry {
    pub fn empty() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        let builtin: [(&str, ExtensionFactory); 14] = [
            (core_settings::EXTENSION_ID, || Box::new(core_settings::CoreSettings::new())),
            (frame_axes::EXTENSION_ID, || Box::new(frame_axes::FrameAxes::new())),
            (grids::EXTENSION_ID, || Box::new(grids::Grids::new())),
            (point_clouds::EXTENSION_ID, || Box::new(point_clouds::PointClouds::new())),
            (laser_scans::EXTENSION_ID, || Box::new(laser_scans::LaserScans::new())),
            (markers::EXTENSION_ID, || Box::new(markers::Markers::new())),
            (poses::EXTENSION_ID, || Box::new(poses::Poses::new())),
            (pose_arrays::EXTENSION_ID, || Box::new(pose_arrays::PoseArrays::new())),
            (cameras::EXTENSION_ID, || Box::new(cameras::Cameras::new())),
            (polygons::EXTENSION_ID, || Box::new(polygons::Polygons::new())),
            (occupancy_grids::EXTENSION_ID, || Box::new(occupancy_grids::OccupancyGrids::new())),
            (scene_entities::EXTENSION_ID, || Box::new(scene_entities::SceneEntities::new())),
            (measurement_tool::EXTENSION_ID, || Box::new(measurement_tool::MeasurementTool::new())),
            (publish_click_tool::EXTENSION_ID, || {
                Box::new(publish_click_tool::PublishClickTool::new())
            }),
        ];
        for (id, factory) in builtin {
            registry.factories.push((id.to_string(), factory));
        }
        registry
    }

    /// Adds an extension or replaces a previously registered one with the same id.
    pub fn register(&mut self, id: &str, factory: ExtensionFactory) -> Result<(), RegistryError> {
        if RESERVED_EXTENSIONS.contains(&id) {
            return Err(RegistryError::Reserved(id.to_string()));
        }
        match self.factories.iter_mut().find(|(existing, _)| existing == id) {
            Some(slot) => {
                log::info!("Replacing extension {id}");
                slot.1 = factory;
            }
            None => {
                log::debug!("Registering extension {id}");
                self.factories.push((id.to_string(), factory));
            }
        }
        Ok(())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.factories.iter().map(|(id, _)| id.as_str())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.iter().any(|(existing, _)| existing == id)
    }

    pub fn instantiate(&self) -> Vec<Box<dyn SceneExtension>> {
        self.factories.iter().map(|(_, factory)| factory()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_graph::Renderable;

    struct Empty;

    impl SceneExtension for Empty {
        fn extension_id(&self) -> &'static str {
            "test.Empty"
        }

        fn renderables<'a>(&'a self) -> Box<dyn Iterator<Item = &'a Renderable> + 'a> {
            Box::new(std::iter::empty())
        }

        fn renderables_mut<'a>(&'a mut self) -> Box<dyn Iterator<Item = &'a mut Renderable> + 'a> {
            Box::new(std::iter::empty())
        }

        fn remove_all_renderables(&mut self) {}
    }

    #[test]
    fn builtin_ids_match_instances() {
        let registry = ExtensionRegistry::with_builtin();
        let ids: Vec<&str> = registry.ids().collect();
        let instances = registry.instantiate();
        assert_eq!(ids.len(), instances.len());
        for (id, instance) in ids.iter().zip(&instances) {
            assert_eq!(*id, instance.extension_id());
        }
    }

    #[test]
    fn reserved_extensions_can_not_be_replaced() {
        let mut registry = ExtensionRegistry::with_builtin();
        for id in RESERVED_EXTENSIONS {
            assert!(matches!(
                registry.register(id, || Box::new(Empty)),
                Err(RegistryError::Reserved(_))
            ));
        }

        let count = registry.ids().count();
        registry.register(grids::EXTENSION_ID, || Box::new(Empty)).unwrap();
        assert_eq!(registry.ids().count(), count);
        registry.register("test.Empty", || Box::new(Empty)).unwrap();
        assert!(registry.contains("test.Empty"));
        assert_eq!(registry.instantiate().len(), count + 1);
    }
}
