use thiserror::Error;

/// Errors raised by the GPU layer.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("no compatible GPU adapter: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to create GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),

    #[error("buffer mapping failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    #[error("readback channel closed before the buffer was mapped")]
    ReadbackCanceled,

    #[error("surface reports no supported formats")]
    UnsupportedSurface,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone)]
pub enum AssetError {
    #[error("unsupported URI scheme in {0}")]
    UnsupportedScheme(String),

    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("asset request was aborted")]
    Aborted,

    #[error("failed to decode glTF: {0}")]
    Gltf(String),

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("model loader unavailable: {0}")]
    Runtime(String),
}

impl From<gltf::Error> for AssetError {
    fn from(error: gltf::Error) -> Self {
        AssetError::Gltf(error.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("extension id {0} is reserved")]
    Reserved(String),
}

/// Validation failures for incoming message records. These never leave the renderer; they
/// are reported on the owning topic's settings path.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MessageError {
    #[error("data length {data_len} is not a multiple of point_stride {stride}")]
    StrideMismatch { data_len: usize, stride: usize },

    #[error("point_stride must be greater than zero")]
    ZeroStride,

    #[error("field {name} at offset {offset} exceeds point_stride {stride}")]
    FieldOutOfBounds {
        name: String,
        offset: usize,
        stride: usize,
    },

    #[error("point cloud is missing required field {0}")]
    MissingField(String),

    #[error("intensities length {intensities} does not match ranges length {ranges}")]
    IntensityLength { intensities: usize, ranges: usize },

    #[error("covariance contains non-finite values or a negative diagonal")]
    InvalidCovariance,

    #[error("occupancy grid data length {data_len} does not match {width}x{height}")]
    GridSizeMismatch {
        data_len: usize,
        width: u32,
        height: u32,
    },

    #[error("unsupported marker type {0}")]
    UnknownMarkerType(i32),

    #[error("unsupported distortion model {0}")]
    UnsupportedDistortion(String),

    #[error("invalid camera intrinsics: {0}")]
    InvalidIntrinsics(String),

    #[error("{0}")]
    Invalid(String),
}

pub type RenderResult<T> = std::result::Result<T, RenderError>;
pub type AssetResult<T> = std::result::Result<T, AssetError>;
