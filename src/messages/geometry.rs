use glam::DVec3;

use crate::{error::MessageError, messages::Header, transforms::Pose};

#[derive(Debug, Clone, PartialEq)]
pub struct PoseStamped {
    pub header: Header,
    pub pose: Pose,
}

/// A pose with a row-major 6x6 covariance over (x, y, z, rot x, rot y, rot z).
#[derive(Debug, Clone, PartialEq)]
pub struct PoseWithCovarianceStamped {
    pub header: Header,
    pub pose: Pose,
    pub covariance: [f64; 36],
}

impl PoseWithCovarianceStamped {
    pub fn validate(&self) -> Result<(), MessageError> {
        let finite = self.covariance.iter().all(|value| value.is_finite());
        let diagonal_ok = (0..6).all(|i| self.covariance[i * 7] >= 0.0);
        if finite && diagonal_ok {
            Ok(())
        } else {
            Err(MessageError::InvalidCovariance)
        }
    }

    /// Standard deviations along x, y and z.
    pub fn position_std_dev(&self) -> DVec3 {
        DVec3::new(
            self.covariance[0].max(0.0).sqrt(),
            self.covariance[7].max(0.0).sqrt(),
            self.covariance[14].max(0.0).sqrt(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoseArray {
    pub header: Header,
    pub poses: Vec<Pose>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavPath {
    pub header: Header,
    pub poses: Vec<PoseStamped>,
}

impl From<&NavPath> for PoseArray {
    /// Poses of a path are taken as expressed in the path's frame.
    fn from(path: &NavPath) -> Self {
        PoseArray {
            header: path.header.clone(),
            poses: path.poses.iter().map(|pose| pose.pose).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolygonStamped {
    pub header: Header,
    pub points: Vec<DVec3>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covariance_validation() {
        let mut msg = PoseWithCovarianceStamped {
            header: Header::new(0, "map"),
            pose: Pose::IDENTITY,
            covariance: [0.0; 36],
        };
        msg.covariance[0] = 4.0;
        assert!(msg.validate().is_ok());
        assert_eq!(msg.position_std_dev().x, 2.0);

        msg.covariance[7] = -1.0;
        assert_eq!(msg.validate(), Err(MessageError::InvalidCovariance));
        msg.covariance[7] = f64::NAN;
        assert!(msg.validate().is_err());
    }
}
