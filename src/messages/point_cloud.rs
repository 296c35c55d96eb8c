use crate::{error::MessageError, messages::Header, time::Time, transforms::Pose};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericType {
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Float32,
    Float64,
}

impl NumericType {
    pub fn size(self) -> usize {
        match self {
            NumericType::Uint8 | NumericType::Int8 => 1,
            NumericType::Uint16 | NumericType::Int16 => 2,
            NumericType::Uint32 | NumericType::Int32 | NumericType::Float32 => 4,
            NumericType::Float64 => 8,
        }
    }

    /// Reads a little-endian value at `offset`. The caller guarantees bounds.
    pub fn read(self, data: &[u8], offset: usize) -> f64 {
        let bytes = &data[offset..offset + self.size()];
        match self {
            NumericType::Uint8 => bytes[0] as f64,
            NumericType::Int8 => bytes[0] as i8 as f64,
            NumericType::Uint16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            NumericType::Int16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            NumericType::Uint32 => u32::from_le_bytes(four(bytes)) as f64,
            NumericType::Int32 => i32::from_le_bytes(four(bytes)) as f64,
            NumericType::Float32 => f32::from_le_bytes(four(bytes)) as f64,
            NumericType::Float64 => {
                let mut b = [0u8; 8];
                b.copy_from_slice(bytes);
                f64::from_le_bytes(b)
            }
        }
    }
}

fn four(bytes: &[u8]) -> [u8; 4] {
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointField {
    pub name: String,
    pub offset: usize,
    pub numeric_type: NumericType,
}

impl PointField {
    pub fn new(name: impl Into<String>, offset: usize, numeric_type: NumericType) -> Self {
        Self {
            name: name.into(),
            offset,
            numeric_type,
        }
    }
}

/// Packed point records in little-endian byte order.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    pub header: Header,
    /// Offset of the cloud origin relative to the header frame.
    pub pose: Pose,
    pub point_stride: usize,
    pub fields: Vec<PointField>,
    pub data: Vec<u8>,
}

impl PointCloud {
    /// A cloud of packed little-endian `f32` x, y, z and intensity.
    pub fn from_xyzi(frame_id: &str, stamp: Time, points: &[[f32; 4]]) -> Self {
        let mut data = Vec::with_capacity(points.len() * 16);
        for point in points {
            for value in point {
                data.extend_from_slice(&value.to_le_bytes());
            }
        }
        Self {
            header: Header::new(stamp, frame_id),
            pose: Pose::IDENTITY,
            point_stride: 16,
            fields: vec![
                PointField::new("x", 0, NumericType::Float32),
                PointField::new("y", 4, NumericType::Float32),
                PointField::new("z", 8, NumericType::Float32),
                PointField::new("intensity", 12, NumericType::Float32),
            ],
            data,
        }
    }

    pub fn field(&self, name: &str) -> Option<&PointField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn point_count(&self) -> usize {
        if self.point_stride == 0 {
            0
        } else {
            self.data.len() / self.point_stride
        }
    }

    /// Checks that the data is a whole number of points, every field fits inside a point and
    /// the position fields exist.
    pub fn validate(&self) -> Result<(), MessageError> {
        if self.point_stride == 0 {
            return Err(MessageError::ZeroStride);
        }
        if self.data.len() % self.point_stride != 0 {
            return Err(MessageError::StrideMismatch {
                data_len: self.data.len(),
                stride: self.point_stride,
            });
        }
        for field in &self.fields {
            if field.offset + field.numeric_type.size() > self.point_stride {
                return Err(MessageError::FieldOutOfBounds {
                    name: field.name.clone(),
                    offset: field.offset,
                    stride: self.point_stride,
                });
            }
        }
        for axis in ["x", "y", "z"] {
            if self.field(axis).is_none() {
                return Err(MessageError::MissingField(axis.to_string()));
            }
        }
        Ok(())
    }

    /// Reads `field` of point `index`. Only valid after [`PointCloud::validate`] succeeded.
    pub fn read(&self, field: &PointField, index: usize) -> f64 {
        field
            .numeric_type
            .read(&self.data, index * self.point_stride + field.offset)
    }
}


#[cfg(test)]
mod tests {
    use super::{test_support::xyzi_cloud, *};

    #[test]
    fn reads_fields() {
        let cloud = xyzi_cloud("lidar", 0, &[[1.0, 2.0, 3.0, 0.5], [4.0, 5.0, 6.0, 1.0]]);
        cloud.validate().unwrap();
        let y = cloud.field("y").unwrap();
        assert_eq!(cloud.read(y, 1), 5.0);
        assert_eq!(cloud.point_count(), 2);
    }

    #[test]
    fn rejects_bad_layouts() {
        let mut cloud = xyzi_cloud("lidar", 0, &[[1.0, 2.0, 3.0, 0.5]]);
        cloud.data.pop();
        assert_eq!(
            cloud.validate(),
            Err(MessageError::StrideMismatch {
                data_len: 15,
                stride: 16
            })
        );

        let mut cloud = xyzi_cloud("lidar", 0, &[[1.0, 2.0, 3.0, 0.5]]);
        cloud.fields[3].offset = 14;
        assert!(matches!(
            cloud.validate(),
            Err(MessageError::FieldOutOfBounds { .. })
        ));

        let mut cloud = xyzi_cloud("lidar", 0, &[]);
        cloud.fields.remove(2);
        assert_eq!(
            cloud.validate(),
            Err(MessageError::MissingField("z".into()))
        );
    }

    #[test]
    fn reads_signed_integers() {
        let data = (-3i16).to_le_bytes();
        assert_eq!(NumericType::Int16.read(&data, 0), -3.0);
        assert_eq!(NumericType::Int8.read(&[0xff], 0), -1.0);
    }
}
