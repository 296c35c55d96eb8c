//! Unit meshes shared by markers, poses and scene entities.
//!
//! Every shape is centred on the origin with unit extents so that callers scale it through the
//! instance matrix. Arrows point along +X.

use std::f32::consts::TAU;

use glam::{Mat4, Quat, Vec3};

use crate::{
    color::ColorRgba,
    scene_graph::renderable::{LinesGeometry, MeshGeometry, MeshVertex},
};

const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

fn vertex(position: Vec3, normal: Vec3) -> MeshVertex {
    MeshVertex {
        position: position.to_array(),
        normal: normal.normalize_or_zero().to_array(),
        color: WHITE,
    }
}

/// Unit cube from -0.5 to 0.5 on every axis.
pub fn cube() -> MeshGeometry {
    let faces = [
        (Vec3::X, Vec3::Y, Vec3::Z),
        (Vec3::NEG_X, Vec3::NEG_Y, Vec3::Z),
        (Vec3::Y, Vec3::NEG_X, Vec3::Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u, v) in faces {
        let base = vertices.len() as u32;
        let center = normal * 0.5;
        for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            vertices.push(vertex(center + u * su + v * sv, normal));
        }
        indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    MeshGeometry::new(vertices, indices)
}

/// Unit-diameter UV sphere.
pub fn sphere(segments: u32, rings: u32) -> MeshGeometry {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let mut vertices = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);
    for ring in 0..=rings {
        let theta = ring as f32 / rings as f32 * std::f32::consts::PI;
        for segment in 0..=segments {
            let phi = segment as f32 / segments as f32 * TAU;
            let normal = Vec3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos());
            vertices.push(vertex(normal * 0.5, normal));
        }
    }

    let mut indices = Vec::with_capacity((segments * rings * 6) as usize);
    let row = segments + 1;
    for ring in 0..rings {
        for segment in 0..segments {
            let a = ring * row + segment;
            let b = a + row;
            indices.extend([a, b, a + 1, a + 1, b, b + 1]);
        }
    }
    MeshGeometry::new(vertices, indices)
}

/// Unit-diameter cylinder along Z from -0.5 to 0.5. The bottom and top radii are scaled by
/// `bottom_scale` and `top_scale`; a zero scale yields a cone.
pub fn cylinder(segments: u32, bottom_scale: f32, top_scale: f32) -> MeshGeometry {
    let segments = segments.max(3);
    let (r0, r1) = (0.5 * bottom_scale, 0.5 * top_scale);
    let slope = r0 - r1;
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for i in 0..=segments {
        let angle = i as f32 / segments as f32 * TAU;
        let (sin, cos) = angle.sin_cos();
        let normal = Vec3::new(cos, sin, slope);
        vertices.push(vertex(Vec3::new(cos * r0, sin * r0, -0.5), normal));
        vertices.push(vertex(Vec3::new(cos * r1, sin * r1, 0.5), normal));
    }
    for i in 0..segments {
        let a = i * 2;
        indices.extend([a, a + 2, a + 1, a + 1, a + 2, a + 3]);
    }

    for (z, radius, normal) in [(-0.5, r0, Vec3::NEG_Z), (0.5, r1, Vec3::Z)] {
        if radius <= 0.0 {
            continue;
        }
        let center = vertices.len() as u32;
        vertices.push(vertex(Vec3::new(0.0, 0.0, z), normal));
        for i in 0..=segments {
            let angle = i as f32 / segments as f32 * TAU;
            let (sin, cos) = angle.sin_cos();
            vertices.push(vertex(Vec3::new(cos * radius, sin * radius, z), normal));
        }
        for i in 0..segments {
            let (a, b) = (center + 1 + i, center + 2 + i);
            if normal.z > 0.0 {
                indices.extend([center, a, b]);
            } else {
                indices.extend([center, b, a]);
            }
        }
    }
    MeshGeometry::new(vertices, indices)
}

/// Dimensions of an arrow pointing along +X from the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrowDimensions {
    pub shaft_length: f32,
    pub shaft_diameter: f32,
    pub head_length: f32,
    pub head_diameter: f32,
}

impl ArrowDimensions {
    /// Proportions used for a marker arrow of the given length and scale.
    pub fn from_scale(length: f32, shaft_diameter: f32, head_diameter: f32, head_length: f32) -> Self {
        let head_length = if head_length > 0.0 {
            head_length.min(length)
        } else {
            length * 0.23
        };
        Self {
            shaft_length: (length - head_length).max(0.0),
            shaft_diameter,
            head_length,
            head_diameter,
        }
    }
}

/// Instance matrices placing a unit cylinder as the shaft and a unit cone as the head.
pub fn arrow_parts(dims: &ArrowDimensions) -> (Mat4, Mat4) {
    let to_x = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
    let shaft = Mat4::from_scale_rotation_translation(
        Vec3::new(dims.shaft_diameter, dims.shaft_diameter, dims.shaft_length),
        to_x,
        Vec3::new(dims.shaft_length * 0.5, 0.0, 0.0),
    );
    let head = Mat4::from_scale_rotation_translation(
        Vec3::new(dims.head_diameter, dims.head_diameter, dims.head_length),
        to_x,
        Vec3::new(dims.shaft_length + dims.head_length * 0.5, 0.0, 0.0),
    );
    (shaft, head)
}

/// A red, green and blue triad of `length` along X, Y and Z.
pub fn axes(length: f32, width: f32) -> LinesGeometry {
    let mut lines = LinesGeometry::new(width, false);
    let points = [
        [0.0, 0.0, 0.0],
        [length, 0.0, 0.0],
        [0.0, 0.0, 0.0],
        [0.0, length, 0.0],
        [0.0, 0.0, 0.0],
        [0.0, 0.0, length],
    ];
    let (r, g, b) = (
        ColorRgba::RED.to_rgba8(),
        ColorRgba::GREEN.to_rgba8(),
        ColorRgba::BLUE.to_rgba8(),
    );
    lines.set_segments(&points, &[r, r, g, g, b, b]);
    lines
}

/// A square grid on the XY plane centred on the origin.
pub fn grid(size: f32, divisions: u32, color: ColorRgba, width: f32) -> LinesGeometry {
    let divisions = divisions.max(1);
    let half = size * 0.5;
    let step = size / divisions as f32;
    let mut points = Vec::with_capacity((divisions as usize + 1) * 4);
    for i in 0..=divisions {
        let offset = -half + step * i as f32;
        points.extend([[offset, -half, 0.0], [offset, half, 0.0]]);
        points.extend([[-half, offset, 0.0], [half, offset, 0.0]]);
    }
    let colors = vec![color.to_rgba8(); points.len()];
    let mut lines = LinesGeometry::new(width, false);
    lines.set_segments(&points, &colors);
    lines
}

/// Wireframe edges of an axis-aligned unit cube, as segments.
pub fn cube_edges() -> Vec<[f32; 3]> {
    let corner = |i: u32| {
        [
            if i & 1 == 0 { -0.5 } else { 0.5 },
            if i & 2 == 0 { -0.5 } else { 0.5 },
            if i & 4 == 0 { -0.5 } else { 0.5 },
        ]
    };
    let mut points = Vec::with_capacity(24);
    for a in 0..8u32 {
        for bit in [1, 2, 4] {
            if a & bit == 0 {
                points.extend([corner(a), corner(a | bit)]);
            }
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_has_six_faces() {
        let cube = cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert!(cube
            .vertices
            .iter()
            .all(|v| v.position.iter().all(|c| c.abs() <= 0.5 + f32::EPSILON)));
    }

    #[test]
    fn indices_stay_in_bounds() {
        for mesh in [sphere(12, 8), cylinder(16, 1.0, 0.0), cylinder(16, 1.0, 1.0)] {
            let count = mesh.vertices.len() as u32;
            assert!(mesh.indices.iter().all(|index| *index < count));
            assert_eq!(mesh.indices.len() % 3, 0);
        }
    }

    #[test]
    fn arrow_head_ends_at_length() {
        let dims = ArrowDimensions::from_scale(1.0, 0.05, 0.1, 0.0);
        let (_, head) = arrow_parts(&dims);
        let tip = head.transform_point3(Vec3::new(0.0, 0.0, 0.5));
        assert!(tip.abs_diff_eq(Vec3::X, 1e-5));
    }

    #[test]
    fn grid_and_edges_line_counts() {
        assert_eq!(grid(10.0, 10, ColorRgba::WHITE, 1.0).segment_count(), 22);
        assert_eq!(cube_edges().len(), 24);
        assert_eq!(axes(1.0, 2.0).segment_count(), 3);
    }
}
