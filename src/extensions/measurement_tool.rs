use glam::DVec3;
use serde_json::json;

use crate::{
    color::ColorRgba,
    extensions::{
        primitives::{self, LineMode},
        SceneClick, SceneContext, SceneExtension, ToolKind,
    },
    scene_graph::{shapes, Picking, Renderable, RenderableUserData},
    transforms::Transform,
};

pub const EXTENSION_ID: &str = "sceneview.MeasurementTool";

const MARKER_COLOR: ColorRgba = ColorRgba::new(1.0, 0.42, 0.42, 1.0);

/// Measures the distance between two clicks on the ground plane.
#[derive(Default)]
pub struct MeasurementTool {
    points: Vec<DVec3>,
    renderable: Option<Renderable>,
}

impl MeasurementTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distance of the completed measurement.
    pub fn distance(&self) -> Option<f64> {
        match self.points.as_slice() {
            [a, b] => Some(a.distance(*b)),
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.points.clear();
        self.renderable = None;
    }

    fn rebuild(&mut self, frame_id: &str) {
        let mut user_data = RenderableUserData::new(frame_id, vec![EXTENSION_ID.to_string()]);
        user_data.frame_locked = true;
        let renderable = self
            .renderable
            .get_or_insert_with(|| Renderable::new("measurement", user_data.clone()));
        renderable.user_data = user_data;

        let mut primitives = vec![primitives::shape_list(
            shapes::sphere(12, 8),
            &self.points,
            DVec3::splat(0.1),
            |_| MARKER_COLOR,
            Transform::IDENTITY,
        )
        .with_picking(Picking::Disabled)];
        if self.points.len() == 2 {
            primitives.push(
                primitives::lines(
                    &self.points,
                    |_| MARKER_COLOR,
                    2.0,
                    false,
                    LineMode::List,
                    Transform::IDENTITY,
                )
                .with_picking(Picking::Disabled),
            );
        }
        renderable.set_primitives(primitives);
        let distance = self.distance();
        if let Some(renderable) = self.renderable.as_mut() {
            renderable.details = json!({ "distance": distance });
        }
    }
}

impl SceneExtension for MeasurementTool {
    fn extension_id(&self) -> &'static str {
        EXTENSION_ID
    }

    fn handle_scene_click(&mut self, ctx: &mut SceneContext, click: &SceneClick) -> bool {
        if ctx.active_tool != Some(ToolKind::Measure) {
            return false;
        }
        let (Some(point), Some(frame_id)) = (click.ground_point, click.render_frame_id.as_deref()) else {
            return true;
        };
        if self.points.len() >= 2 {
            self.points.clear();
        }
        self.points.push(point);
        self.rebuild(frame_id);
        if let Some(distance) = self.distance() {
            log::info!("Measured {distance:.3} m in {frame_id}");
        }
        true
    }

    fn renderables<'a>(&'a self) -> Box<dyn Iterator<Item = &'a Renderable> + 'a> {
        Box::new(self.renderable.iter())
    }

    fn renderables_mut<'a>(&'a mut self) -> Box<dyn Iterator<Item = &'a mut Renderable> + 'a> {
        Box::new(self.renderable.iter_mut())
    }

    fn remove_all_renderables(&mut self) {
        self.reset();
    }
}
