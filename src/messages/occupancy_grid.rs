use crate::{error::MessageError, messages::Header, transforms::Pose};

#[derive(Debug, Clone, PartialEq)]
pub struct MapMetaData {
    /// Metres per cell.
    pub resolution: f32,
    pub width: u32,
    pub height: u32,
    pub origin: Pose,
}

/// Row-major cells starting at the origin. Values are occupancy in `[0, 100]`, `-1` unknown.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyGrid {
    pub header: Header,
    pub info: MapMetaData,
    pub data: Vec<i8>,
}

impl OccupancyGrid {
    pub fn validate(&self) -> Result<(), MessageError> {
        let expected = self.info.width as usize * self.info.height as usize;
        if self.data.len() != expected {
            return Err(MessageError::GridSizeMismatch {
                data_len: self.data.len(),
                width: self.info.width,
                height: self.info.height,
            });
        }
        if !(self.info.resolution.is_finite() && self.info.resolution > 0.0) {
            return Err(MessageError::Invalid(format!(
                "invalid grid resolution {}",
                self.info.resolution
            )));
        }
        Ok(())
    }
}
