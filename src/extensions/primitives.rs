//! Builders for the primitives markers, poses and scene entities are made of.

use glam::{DQuat, DVec3, Mat4, Vec3};

use crate::{
    color::ColorRgba,
    scene_graph::{
        shapes::{self, ArrowDimensions},
        Geometry, LinesGeometry, MeshGeometry, MeshInstance, MeshVertex, PointShape,
        PointsGeometry, Primitive,
    },
    transforms::{Pose, Transform},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineMode {
    Strip,
    Loop,
    List,
}

pub fn to_f32(point: DVec3) -> [f32; 3] {
    point.as_vec3().to_array()
}

pub fn local(pose: &Pose) -> Transform {
    Transform::from_pose(pose)
}

/// A mesh drawn once per instance.
pub fn instanced(mesh: MeshGeometry, instances: Vec<MeshInstance>) -> Primitive {
    let mut mesh = mesh;
    mesh.set_instances(instances);
    Primitive::new(Geometry::Mesh(mesh))
}

/// A unit shape scaled by `size`.
pub fn shape(mesh: MeshGeometry, size: DVec3, color: ColorRgba, local: Transform) -> Primitive {
    let scale = Mat4::from_scale(size.as_vec3());
    instanced(mesh, vec![MeshInstance::new(scale, color)]).with_local(local)
}

pub fn cube(size: DVec3, color: ColorRgba, local: Transform) -> Primitive {
    shape(shapes::cube(), size, color, local)
}

pub fn sphere(size: DVec3, color: ColorRgba, local: Transform) -> Primitive {
    shape(shapes::sphere(20, 12), size, color, local)
}

pub fn cylinder(
    size: DVec3,
    bottom_scale: f32,
    top_scale: f32,
    color: ColorRgba,
    local: Transform,
) -> Primitive {
    shape(shapes::cylinder(20, bottom_scale, top_scale), size, color, local)
}

/// Shaft and head of an arrow pointing along +X of `local`.
pub fn arrow(dims: &ArrowDimensions, color: ColorRgba, local: Transform) -> Vec<Primitive> {
    let (shaft, head) = shapes::arrow_parts(dims);
    vec![
        instanced(shapes::cylinder(16, 1.0, 1.0), vec![MeshInstance::new(shaft, color)])
            .with_local(local),
        instanced(shapes::cylinder(16, 1.0, 0.0), vec![MeshInstance::new(head, color)])
            .with_local(local),
    ]
}

/// An arrow from `start` to `end`.
pub fn arrow_between(
    start: DVec3,
    end: DVec3,
    shaft_diameter: f32,
    head_diameter: f32,
    head_length: f32,
    color: ColorRgba,
    local: Transform,
) -> Vec<Primitive> {
    let direction = end - start;
    let length = direction.length();
    if length <= f64::EPSILON {
        return Vec::new();
    }
    let rotation = DQuat::from_rotation_arc(DVec3::X, direction / length);
    let placement = local * Transform::new(start, rotation);
    let dims = ArrowDimensions::from_scale(length as f32, shaft_diameter, head_diameter, head_length);
    arrow(&dims, color, placement)
}

/// One instance of `mesh` per point, each scaled by `size`.
pub fn shape_list(
    mesh: MeshGeometry,
    points: &[DVec3],
    size: DVec3,
    color_at: impl Fn(usize) -> ColorRgba,
    local: Transform,
) -> Primitive {
    let scale = size.as_vec3();
    let instances = points
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let model = Mat4::from_scale_rotation_translation(
                scale,
                glam::Quat::IDENTITY,
                point.as_vec3(),
            );
            MeshInstance::new(model, color_at(i))
        })
        .collect();
    instanced(mesh, instances).with_local(local)
}

pub fn lines(
    points: &[DVec3],
    color_at: impl Fn(usize) -> ColorRgba,
    width: f32,
    world_units: bool,
    mode: LineMode,
    local: Transform,
) -> Primitive {
    let positions: Vec<[f32; 3]> = points.iter().copied().map(to_f32).collect();
    let colors: Vec<[u8; 4]> = (0..points.len()).map(|i| color_at(i).to_rgba8()).collect();
    let mut geometry = LinesGeometry::new(width, world_units);
    match mode {
        LineMode::Strip => geometry.set_strip(&positions, &colors, false),
        LineMode::Loop => geometry.set_strip(&positions, &colors, true),
        LineMode::List => geometry.set_segments(&positions, &colors),
    }
    Primitive::new(Geometry::Lines(geometry)).with_local(local)
}

pub fn points(
    points: &[DVec3],
    color_at: impl Fn(usize) -> ColorRgba,
    size: f32,
    world_units: bool,
    local: Transform,
) -> Primitive {
    let positions: Vec<[f32; 3]> = points.iter().copied().map(to_f32).collect();
    let colors: Vec<[u8; 4]> = (0..points.len()).map(|i| color_at(i).to_rgba8()).collect();
    let mut geometry = PointsGeometry::new(size, PointShape::Square);
    geometry.world_units = world_units;
    geometry.buffer.set_positions_colors(&positions, &colors);
    Primitive::new(Geometry::Points(geometry)).with_local(local)
}

/// Marks where a text label is anchored.
pub fn anchor(color: ColorRgba, local: Transform) -> Primitive {
    points(&[DVec3::ZERO], |_| color, 6.0, false, local)
}

/// Triangles from consecutive point triples, with per-vertex colours when `color_at` is given.
pub fn triangles(
    points: &[DVec3],
    color_at: impl Fn(usize) -> ColorRgba,
    scale: DVec3,
    local: Transform,
) -> Primitive {
    let count = points.len() / 3 * 3;
    let mut vertices = Vec::with_capacity(count);
    for (t, triangle) in points[..count].chunks_exact(3).enumerate() {
        let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|p| p.as_vec3());
        let normal = (b - a).cross(c - a).normalize_or(Vec3::Z);
        for (k, position) in [a, b, c].into_iter().enumerate() {
            vertices.push(MeshVertex {
                position: position.to_array(),
                normal: normal.to_array(),
                color: color_at(t * 3 + k).to_vec4().to_array(),
            });
        }
    }
    let indices = (0..count as u32).collect();
    let mesh = MeshGeometry::new(vertices, indices);
    let instance = MeshInstance::new(Mat4::from_scale(scale.as_vec3()), ColorRgba::WHITE);
    instanced(mesh, vec![instance]).with_local(local)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrow_between_points_along_direction() {
        let parts = arrow_between(
            DVec3::ZERO,
            DVec3::new(0.0, 2.0, 0.0),
            0.1,
            0.2,
            0.5,
            ColorRgba::RED,
            Transform::IDENTITY,
        );
        assert_eq!(parts.len(), 2);
        let tip = parts[1]
            .local
            .transform_point(DVec3::new(2.0, 0.0, 0.0));
        assert!(tip.abs_diff_eq(DVec3::new(0.0, 2.0, 0.0), 1e-9));
        assert!(arrow_between(DVec3::X, DVec3::X, 0.1, 0.2, 0.0, ColorRgba::RED, Transform::IDENTITY).is_empty());
    }

    #[test]
    fn triangles_drop_incomplete_tail() {
        let points = [DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z];
        let primitive = triangles(&points, |_| ColorRgba::GREEN, DVec3::ONE, Transform::IDENTITY);
        let Geometry::Mesh(mesh) = &primitive.geometry else {
            panic!("expected mesh");
        };
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.vertices[0].normal, [0.0, 0.0, 1.0]);
        assert_eq!(mesh.vertices[2].color, [0.0, 1.0, 0.0, 1.0]);
    }
}
