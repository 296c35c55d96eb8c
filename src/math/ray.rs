use glam::DVec3;

use crate::math::plane::Plane;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: DVec3,
    /// Unit length.
    pub direction: DVec3,
}

impl Ray {
    pub fn new(origin: DVec3, direction: DVec3) -> Option<Self> {
        let direction = direction.try_normalize()?;
        Some(Self { origin, direction })
    }

    pub fn between(from: DVec3, to: DVec3) -> Option<Self> {
        Self::new(from, to - from)
    }

    pub fn at(&self, t: f64) -> DVec3 {
        self.origin + self.direction * t
    }

    /// The first intersection in front of the origin.
    pub fn intersect_plane(&self, plane: &Plane) -> Option<DVec3> {
        let denom = plane.normal.dot(self.direction);
        if denom.abs() < 1e-12 {
            return None;
        }
        let t = -plane.signed_distance_to_point(self.origin) / denom;
        (t >= 0.0).then(|| self.at(t))
    }

    pub fn intersect_ground(&self, z: f64) -> Option<DVec3> {
        self.intersect_plane(&Plane::ground(z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hits_ground_in_front_only() {
        let ray = Ray::new(DVec3::new(1.0, 1.0, 5.0), DVec3::new(0.0, 0.0, -2.0)).unwrap();
        assert_eq!(ray.intersect_ground(0.0), Some(DVec3::new(1.0, 1.0, 0.0)));

        let away = Ray::new(DVec3::new(0.0, 0.0, 5.0), DVec3::Z).unwrap();
        assert_eq!(away.intersect_ground(0.0), None);

        let parallel = Ray::new(DVec3::new(0.0, 0.0, 5.0), DVec3::X).unwrap();
        assert_eq!(parallel.intersect_ground(0.0), None);
        assert!(Ray::new(DVec3::ZERO, DVec3::ZERO).is_none());
    }
}
