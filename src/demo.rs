//! A synthetic player: a robot driving in a circle with a lidar, a scan, a few markers and a
//! goal pose. Used by the windowed shell and by tests that need a busy scene.

use std::f64::consts::{PI, TAU};

use glam::{DQuat, DVec3};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    color::ColorRgba,
    messages::{
        schemas, FrameTransform, Header, LaserScan, Marker, MarkerType, Message, MessageEvent,
        PointCloud, PoseStamped, Topic,
    },
    time::{to_secs, Time},
    transforms::Pose,
};

const CLOUD_POINTS: usize = 2000;
const SCAN_RAYS: usize = 360;
const DRIVE_RADIUS: f64 = 3.0;
const DRIVE_SPEED: f64 = 0.2;

pub struct SyntheticPlayer {
    rng: StdRng,
    ticks: u64,
}

impl SyntheticPlayer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ticks: 0,
        }
    }

    pub fn topics() -> Vec<Topic> {
        vec![
            Topic::new("/tf", schemas::TF),
            Topic::new("/lidar/points", schemas::POINT_CLOUD2),
            Topic::new("/scan", schemas::LASER_SCAN),
            Topic::new("/markers", schemas::MARKER_ARRAY),
            Topic::new("/goal", schemas::POSE_STAMPED),
        ]
    }

    /// Everything published at `time`.
    pub fn batch(&mut self, time: Time) -> Vec<MessageEvent> {
        self.ticks += 1;
        let mut events = vec![
            MessageEvent::new("/tf", schemas::TF, time, Message::FrameTransforms(robot_transforms(time))),
            MessageEvent::new(
                "/lidar/points",
                schemas::POINT_CLOUD2,
                time,
                Message::PointCloud(self.cloud(time)),
            ),
            MessageEvent::new("/scan", schemas::LASER_SCAN, time, Message::LaserScan(self.scan(time))),
        ];
        // Slow topics
        if self.ticks % 30 == 1 {
            events.push(MessageEvent::new(
                "/markers",
                schemas::MARKER_ARRAY,
                time,
                Message::MarkerArray(markers(time)),
            ));
            events.push(MessageEvent::new(
                "/goal",
                schemas::POSE_STAMPED,
                time,
                Message::PoseStamped(PoseStamped {
                    header: Header::new(time, "map"),
                    pose: Pose::new(DVec3::new(-2.0, 2.0, 0.0), DQuat::from_rotation_z(PI / 4.0)),
                }),
            ));
        }
        events
    }

    /// A noisy ring of returns around the sensor with a slow wave in height.
    fn cloud(&mut self, time: Time) -> PointCloud {
        let phase = to_secs(time) as f32;
        let points: Vec<[f32; 4]> = (0..CLOUD_POINTS)
            .map(|i| {
                let angle = i as f32 / CLOUD_POINTS as f32 * std::f32::consts::TAU;
                let radius = 4.0 + self.rng.gen_range(-0.15..0.15);
                let z = (angle * 3.0 + phase).sin() * 0.4 + self.rng.gen_range(-0.05..0.05);
                [radius * angle.cos(), radius * angle.sin(), z, (z + 0.5).clamp(0.0, 1.0)]
            })
            .collect();
        PointCloud::from_xyzi("lidar", time, &points)
    }

    fn scan(&mut self, time: Time) -> LaserScan {
        let ranges = (0..SCAN_RAYS)
            .map(|i| {
                let angle = i as f32 / SCAN_RAYS as f32 * std::f32::consts::TAU;
                5.0 + (angle * 4.0).cos() * 0.8 + self.rng.gen_range(-0.05..0.05)
            })
            .collect();
        LaserScan {
            header: Header::new(time, "lidar"),
            pose: Pose::IDENTITY,
            start_angle: -PI,
            end_angle: PI,
            ranges,
            intensities: Vec::new(),
            range_min: 0.1,
            range_max: 10.0,
        }
    }
}

fn robot_transforms(time: Time) -> Vec<FrameTransform> {
    let angle = to_secs(time) * DRIVE_SPEED;
    let edge = |parent: &str, child: &str, translation: DVec3, rotation: DQuat| FrameTransform {
        timestamp: time,
        parent_frame_id: parent.to_string(),
        child_frame_id: child.to_string(),
        translation,
        rotation,
    };
    vec![
        edge("map", "odom", DVec3::ZERO, DQuat::IDENTITY),
        edge(
            "odom",
            "base_link",
            DVec3::new(DRIVE_RADIUS * angle.cos(), DRIVE_RADIUS * angle.sin(), 0.0),
            DQuat::from_rotation_z((angle + PI / 2.0) % TAU),
        ),
        edge("base_link", "lidar", DVec3::new(0.2, 0.0, 0.5), DQuat::IDENTITY),
    ]
}

fn markers(time: Time) -> Vec<Marker> {
    let mut cube = Marker::new("map", "landmarks", 0, MarkerType::Cube);
    cube.pose = Pose::from_position(DVec3::new(2.0, 0.0, 0.5));
    cube.color = ColorRgba::new(0.2, 0.6, 1.0, 1.0);

    let mut sphere = Marker::new("map", "landmarks", 1, MarkerType::Sphere);
    sphere.pose = Pose::from_position(DVec3::new(-2.0, -1.0, 0.5));
    sphere.scale = DVec3::splat(0.6);
    sphere.color = ColorRgba::new(1.0, 0.4, 0.2, 0.8);

    let mut path = Marker::new("map", "route", 0, MarkerType::LineStrip);
    path.scale = DVec3::splat(0.05);
    path.color = ColorRgba::GREEN;
    path.points = (0..=64)
        .map(|i| {
            let angle = i as f64 / 64.0 * TAU;
            DVec3::new(DRIVE_RADIUS * angle.cos(), DRIVE_RADIUS * angle.sin(), 0.0)
        })
        .collect();

    for marker in [&mut cube, &mut sphere, &mut path] {
        marker.header.stamp = time;
    }
    vec![cube, sphere, path]
}
