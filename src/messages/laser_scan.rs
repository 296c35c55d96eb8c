use glam::DVec3;

use crate::{error::MessageError, messages::Header, transforms::Pose};

/// A planar scan. Ray `i` is at angle `start_angle + i * (end_angle - start_angle) / (n - 1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct LaserScan {
    pub header: Header,
    pub pose: Pose,
    pub start_angle: f64,
    pub end_angle: f64,
    pub ranges: Vec<f32>,
    /// Empty, or one value per range.
    pub intensities: Vec<f32>,
    pub range_min: f32,
    pub range_max: f32,
}

impl LaserScan {
    pub fn validate(&self) -> Result<(), MessageError> {
        if !self.intensities.is_empty() && self.intensities.len() != self.ranges.len() {
            return Err(MessageError::IntensityLength {
                intensities: self.intensities.len(),
                ranges: self.ranges.len(),
            });
        }
        Ok(())
    }

    pub fn angle_increment(&self) -> f64 {
        if self.ranges.len() < 2 {
            0.0
        } else {
            (self.end_angle - self.start_angle) / (self.ranges.len() - 1) as f64
        }
    }

    /// Cartesian points of in-range rays, with the index of the ray each came from.
    pub fn points(&self) -> impl Iterator<Item = (usize, DVec3)> + '_ {
        let increment = self.angle_increment();
        let (min, max) = (self.range_min, self.range_max);
        self.ranges
            .iter()
            .enumerate()
            .filter(move |(_, range)| range.is_finite() && **range >= min && **range <= max)
            .map(move |(i, range)| {
                let angle = self.start_angle + increment * i as f64;
                let range = *range as f64;
                (i, DVec3::new(range * angle.cos(), range * angle.sin(), 0.0))
            })
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use super::*;

    fn scan(ranges: Vec<f32>, intensities: Vec<f32>) -> LaserScan {
        LaserScan {
            header: Header::new(0, "laser"),
            pose: Pose::IDENTITY,
            start_angle: 0.0,
            end_angle: FRAC_PI_2,
            ranges,
            intensities,
            range_min: 0.1,
            range_max: 10.0,
        }
    }

    #[test]
    fn projects_and_clips_rays() {
        let scan = scan(vec![1.0, 50.0, 2.0], vec![]);
        let points: Vec<_> = scan.points().collect();
        assert_eq!(points.len(), 2);
        assert!(points[0].1.abs_diff_eq(DVec3::X, 1e-12));
        assert_eq!(points[1].0, 2);
        assert!(points[1].1.abs_diff_eq(DVec3::new(0.0, 2.0, 0.0), 1e-12));
    }

    #[test]
    fn intensity_length_must_match() {
        assert!(scan(vec![1.0, 2.0], vec![1.0]).validate().is_err());
        assert!(scan(vec![1.0, 2.0], vec![]).validate().is_ok());
    }
}
