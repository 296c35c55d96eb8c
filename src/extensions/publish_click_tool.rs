//! Publishes points and poses picked on the ground plane.

use glam::{DQuat, DVec3};

use crate::{
    color::ColorRgba,
    config::{PublishKind, PublishSettings},
    extensions::{primitives, PublishEvent, SceneClick, SceneContext, SceneExtension, ToolKind},
    scene_graph::{Picking, Renderable, RenderableUserData},
    transforms::{Pose, Transform},
};

pub const EXTENSION_ID: &str = "sceneview.PublishClickTool";

const PREVIEW_COLOR: ColorRgba = ColorRgba::new(0.0, 0.9, 0.45, 1.0);

/// Covariance of a pose estimate, row-major 6x6 over x, y, z, roll, pitch and yaw.
pub fn pose_estimate_covariance(settings: &PublishSettings) -> Vec<f64> {
    let mut covariance = vec![0.0; 36];
    covariance[0] = settings.pose_estimate_x_deviation.powi(2);
    covariance[7] = settings.pose_estimate_y_deviation.powi(2);
    covariance[35] = settings.pose_estimate_theta_deviation.powi(2);
    covariance
}

/// Pose at `position` facing `toward` in the ground plane.
fn pose_facing(position: DVec3, toward: DVec3) -> Pose {
    let delta = toward - position;
    let yaw = if delta.x == 0.0 && delta.y == 0.0 {
        0.0
    } else {
        delta.y.atan2(delta.x)
    };
    Pose::new(position, DQuat::from_rotation_z(yaw))
}

#[derive(Default)]
pub struct PublishClickTool {
    /// Position of a pose waiting for its orientation click.
    pending: Option<DVec3>,
    preview: Option<Renderable>,
}

impl PublishClickTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn show_preview(&mut self, position: DVec3, frame_id: &str) {
        let mut user_data = RenderableUserData::new(frame_id, vec![EXTENSION_ID.to_string()]);
        user_data.frame_locked = true;
        user_data.pose = Pose::from_position(position);
        let mut renderable = Renderable::new("publish-preview", user_data);
        renderable.set_primitives(vec![primitives::sphere(
            DVec3::splat(0.15),
            PREVIEW_COLOR,
            Transform::IDENTITY,
        )
        .with_picking(Picking::Disabled)]);
        self.preview = Some(renderable);
    }

    fn finish(&mut self) {
        self.pending = None;
        self.preview = None;
    }
}

impl SceneExtension for PublishClickTool {
    fn extension_id(&self) -> &'static str {
        EXTENSION_ID
    }

    fn handle_scene_click(&mut self, ctx: &mut SceneContext, click: &SceneClick) -> bool {
        if ctx.active_tool != Some(ToolKind::Publish) {
            self.finish();
            return false;
        }
        let (Some(point), Some(frame_id)) = (click.ground_point, click.render_frame_id.clone()) else {
            return true;
        };
        let settings = &ctx.config.publish;
        let event = match (settings.kind, self.pending) {
            (PublishKind::Point, _) => PublishEvent::Point {
                topic: settings.point_topic.clone(),
                frame_id,
                point,
            },
            (_, None) => {
                self.pending = Some(point);
                self.show_preview(point, &frame_id);
                return true;
            }
            (PublishKind::Pose, Some(position)) => PublishEvent::Pose {
                topic: settings.pose_topic.clone(),
                frame_id,
                pose: pose_facing(position, point),
            },
            (PublishKind::PoseEstimate, Some(position)) => PublishEvent::PoseEstimate {
                topic: settings.pose_estimate_topic.clone(),
                frame_id,
                pose: pose_facing(position, point),
                covariance: pose_estimate_covariance(settings),
            },
        };
        self.finish();
        ctx.publish(event);
        ctx.active_tool = None;
        true
    }

    fn renderables<'a>(&'a self) -> Box<dyn Iterator<Item = &'a Renderable> + 'a> {
        Box::new(self.preview.iter())
    }

    fn renderables_mut<'a>(&'a mut self) -> Box<dyn Iterator<Item = &'a mut Renderable> + 'a> {
        Box::new(self.preview.iter_mut())
    }

    fn remove_all_renderables(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::Vec2;

    use super::*;
    use crate::extensions::test_support::context;

    fn click(x: f64, y: f64) -> SceneClick {
        SceneClick {
            cursor: Vec2::ZERO,
            ray: None,
            ground_point: Some(DVec3::new(x, y, 0.0)),
            render_frame_id: Some("map".into()),
        }
    }

    #[test]
    fn publishes_point_on_first_click() {
        let mut ctx = context();
        let rx = ctx.subscribe_publish();
        ctx.active_tool = Some(ToolKind::Publish);
        let mut tool = PublishClickTool::new();
        assert!(tool.handle_scene_click(&mut ctx, &click(1.0, 2.0)));
        assert_eq!(
            rx.try_recv().unwrap(),
            PublishEvent::Point {
                topic: "/clicked_point".into(),
                frame_id: "map".into(),
                point: DVec3::new(1.0, 2.0, 0.0),
            }
        );
        assert_eq!(ctx.active_tool, None);
    }

    #[test]
    fn pose_estimate_takes_two_clicks() {
        let mut ctx = context();
        let rx = ctx.subscribe_publish();
        ctx.config.publish.kind = PublishKind::PoseEstimate;
        ctx.active_tool = Some(ToolKind::Publish);
        let mut tool = PublishClickTool::new();

        tool.handle_scene_click(&mut ctx, &click(1.0, 1.0));
        assert!(tool.is_pending());
        assert_eq!(tool.renderables().count(), 1);
        assert!(rx.try_recv().is_err());

        tool.handle_scene_click(&mut ctx, &click(1.0, 3.0));
        let PublishEvent::PoseEstimate { topic, pose, covariance, .. } = rx.try_recv().unwrap() else {
            panic!("expected a pose estimate");
        };
        assert_eq!(topic, "/initialpose");
        assert!(pose.position.abs_diff_eq(DVec3::new(1.0, 1.0, 0.0), 1e-9));
        let (_, _, yaw) = pose.orientation.to_euler(glam::EulerRot::XYZ);
        assert_relative_eq!(yaw, std::f64::consts::FRAC_PI_2, epsilon = 1e-9);
        assert_eq!(covariance.len(), 36);
        assert_relative_eq!(covariance[0], 0.25);
        assert_relative_eq!(covariance[7], 0.25);
        assert!(!tool.is_pending());
        assert_eq!(tool.renderables().count(), 0);
    }

    #[test]
    fn inactive_tool_passes_clicks_through() {
        let mut ctx = context();
        let mut tool = PublishClickTool::new();
        assert!(!tool.handle_scene_click(&mut ctx, &click(0.0, 0.0)));
    }
}
