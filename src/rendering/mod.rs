pub mod config;
pub mod draw_uniforms;
pub mod gpu_context;
pub mod gpu_geometry;
pub mod picker;
pub mod pipelines;
pub mod render_list;
pub mod scene_renderer;
pub mod stats;
pub mod texture;

pub use config::GpuOptions;
pub use picker::{NO_HIT, PICK_SIZE};
pub use scene_renderer::SceneRenderer;
pub use stats::RenderStats;
