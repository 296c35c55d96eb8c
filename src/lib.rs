pub mod camera;
pub mod color;
pub mod config;
pub mod demo;
pub mod error;
pub mod extensions;
pub mod math;
pub mod messages;
pub mod models;
pub mod renderer;
pub mod rendering;
pub mod scene_graph;
pub mod settings;
pub mod time;
pub mod transforms;

pub use config::RendererConfig;
pub use renderer::{PickedObject, Renderer};
