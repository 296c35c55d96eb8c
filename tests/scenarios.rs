use glam::{DQuat, DVec3};
use sceneview::{
    extensions::point_clouds::INVALID_POINT_CLOUD,
    messages::{schemas, FrameTransform, Message, MessageEvent, PointCloud, Topic},
    scene_graph::{Geometry, Renderable},
    settings::topic_path,
    time::{Time, NANOS_PER_SEC},
    transforms::Pose,
    Renderer, RendererConfig,
};

fn tf(time: Time, parent: &str, child: &str, translation: DVec3) -> MessageEvent {
    MessageEvent::new(
        "/tf",
        schemas::TF,
        time,
        Message::FrameTransform(FrameTransform {
            timestamp: time,
            parent_frame_id: parent.to_string(),
            child_frame_id: child.to_string(),
            translation,
            rotation: DQuat::IDENTITY,
        }),
    )
}

fn cloud_event(time: Time, cloud: PointCloud) -> MessageEvent {
    MessageEvent::new("/points", schemas::POINT_CLOUD2, time, Message::PointCloud(cloud))
}

fn point_count(renderer: &Renderer) -> Option<usize> {
    let renderable: &Renderable = renderer
        .renderables()
        .filter(|r| r.user_data.topic.as_deref() == Some("/points"))
        .last()?;
    renderable
        .primitives
        .iter()
        .find_map(|primitive| match &primitive.geometry {
            Geometry::Points(points) => Some(points.buffer.len()),
            _ => None,
        })
}

#[test]
fn transform_is_interpolated_between_samples() {
    let mut renderer = Renderer::new(RendererConfig::default());
    renderer.add_message_events(vec![
        tf(0, "base", "sensor", DVec3::ZERO),
        tf(10 * NANOS_PER_SEC, "base", "sensor", DVec3::new(10.0, 0.0, 0.0)),
    ]);

    let at = 5 * NANOS_PER_SEC;
    let pose = renderer
        .transform_tree()
        .apply(&Pose::IDENTITY, "base", "base", "sensor", at, at)
        .unwrap();
    assert!(pose.position.abs_diff_eq(DVec3::new(5.0, 0.0, 0.0), 1e-9));
}

#[test]
fn broken_point_cloud_keeps_last_render() {
    let mut renderer = Renderer::new(RendererConfig::default());
    renderer.set_topics(vec![Topic::new("/points", schemas::POINT_CLOUD2)]);
    renderer.add_message_events(vec![
        tf(0, "map", "base_link", DVec3::ZERO),
        cloud_event(0, PointCloud::from_xyzi("base_link", 0, &[[1.0, 0.0, 0.0, 1.0]; 3])),
    ]);
    renderer.animation_frame().unwrap();
    assert_eq!(point_count(&renderer), Some(3));

    let mut broken = PointCloud::from_xyzi("base_link", 1, &[[2.0, 0.0, 0.0, 1.0]; 5]);
    broken.data.pop();
    renderer.set_current_time(1);
    renderer.add_message_events(vec![cloud_event(1, broken)]);
    renderer.animation_frame().unwrap();

    assert!(renderer
        .errors()
        .has_error(&topic_path("/points"), INVALID_POINT_CLOUD));
    assert_eq!(point_count(&renderer), Some(3));

    renderer.set_current_time(2);
    renderer.add_message_events(vec![cloud_event(
        2,
        PointCloud::from_xyzi("base_link", 2, &[[0.0; 4]; 4]),
    )]);
    assert!(!renderer
        .errors()
        .has_error(&topic_path("/points"), INVALID_POINT_CLOUD));
    assert_eq!(point_count(&renderer), Some(4));
}

#[test]
fn errors_show_up_in_the_settings_tree() {
    let mut renderer = Renderer::new(RendererConfig::default());
    renderer.set_topics(vec![Topic::new("/points", schemas::POINT_CLOUD2)]);
    let mut broken = PointCloud::from_xyzi("base_link", 0, &[[0.0; 4]; 2]);
    broken.point_stride = 0;
    renderer.add_message_events(vec![cloud_event(0, broken)]);
    renderer.animation_frame().unwrap();

    let tree = renderer.settings_tree();
    let node = tree
        .child("topics")
        .and_then(|topics| topics.child("/points"))
        .unwrap();
    assert!(node.error.is_some());
}

#[test]
fn missing_transform_hides_renderable_until_it_arrives() {
    let mut renderer = Renderer::new(RendererConfig::default());
    renderer.set_topics(vec![Topic::new("/points", schemas::POINT_CLOUD2)]);
    renderer.add_message_events(vec![
        tf(0, "map", "base_link", DVec3::ZERO),
        cloud_event(0, PointCloud::from_xyzi("lidar", 0, &[[1.0; 4]])),
    ]);
    renderer.animation_frame().unwrap();
    let visible = |renderer: &Renderer| {
        renderer
            .renderables()
            .filter(|r| r.user_data.topic.as_deref() == Some("/points"))
            .all(Renderable::visible)
    };
    assert!(!visible(&renderer));
    assert!(renderer
        .errors()
        .has_error(&topic_path("/points"), sceneview::scene_graph::MISSING_TRANSFORM));

    renderer.add_message_events(vec![tf(0, "base_link", "lidar", DVec3::Z)]);
    renderer.animation_frame().unwrap();
    assert!(visible(&renderer));
    assert!(renderer.errors().paths_with_errors().is_empty());
}
