use glam::DVec3;

use crate::{error::MessageError, messages::Header};

const SUPPORTED_DISTORTION: &[&str] = &["", "plumb_bob", "rational_polynomial"];

#[derive(Debug, Clone, PartialEq)]
pub struct CameraInfo {
    pub header: Header,
    pub width: u32,
    pub height: u32,
    pub distortion_model: String,
    pub d: Vec<f64>,
    /// Row-major 3x3 intrinsic matrix.
    pub k: [f64; 9],
    /// Row-major 3x4 projection matrix.
    pub p: [f64; 12],
}

/// A pinhole model built from a calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinholeModel {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: u32,
    pub height: u32,
}

impl PinholeModel {
    pub fn from_camera_info(info: &CameraInfo) -> Result<Self, MessageError> {
        if !SUPPORTED_DISTORTION.contains(&info.distortion_model.as_str()) {
            return Err(MessageError::UnsupportedDistortion(
                info.distortion_model.clone(),
            ));
        }
        if info.width == 0 || info.height == 0 {
            return Err(MessageError::InvalidIntrinsics(format!(
                "image size {}x{}",
                info.width, info.height
            )));
        }

        // Prefer the projection matrix, falling back to K when P is unset
        let (fx, fy, cx, cy) = if info.p[0] != 0.0 && info.p[5] != 0.0 {
            (info.p[0], info.p[5], info.p[2], info.p[6])
        } else {
            (info.k[0], info.k[4], info.k[2], info.k[5])
        };
        if !(fx.is_finite() && fy.is_finite() && fx > 0.0 && fy > 0.0) {
            return Err(MessageError::InvalidIntrinsics(format!(
                "focal lengths fx={fx} fy={fy}"
            )));
        }

        Ok(Self {
            fx,
            fy,
            cx,
            cy,
            width: info.width,
            height: info.height,
        })
    }

    /// The ray through pixel `(u, v)`, scaled to `depth` along +Z of the optical frame.
    pub fn project_pixel(&self, u: f64, v: f64, depth: f64) -> DVec3 {
        DVec3::new((u - self.cx) / self.fx * depth, (v - self.cy) / self.fy * depth, depth)
    }

    /// Image corners at `depth`, clockwise from the top-left.
    pub fn corners(&self, depth: f64) -> [DVec3; 4] {
        let (w, h) = (self.width as f64, self.height as f64);
        [
            self.project_pixel(0.0, 0.0, depth),
            self.project_pixel(w, 0.0, depth),
            self.project_pixel(w, h, depth),
            self.project_pixel(0.0, h, depth),
        ]
    }
}
