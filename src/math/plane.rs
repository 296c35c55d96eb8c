use glam::DVec3;

/// The plane `normal · p = distance`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: DVec3,
    pub distance: f64,
}

impl Plane {
    pub fn new(normal: DVec3, distance: f64) -> Self {
        Self {
            normal: normal.normalize_or_zero(),
            distance,
        }
    }

    /// Horizontal plane at height `z`.
    pub fn ground(z: f64) -> Self {
        Self::new(DVec3::Z, z)
    }

    pub fn signed_distance_to_point(&self, point: DVec3) -> f64 {
        self.normal.dot(point) - self.distance
    }
}
