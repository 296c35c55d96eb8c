pub mod plane;
pub mod ray;

pub use plane::Plane;
pub use ray::Ray;
