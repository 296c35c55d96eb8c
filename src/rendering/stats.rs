use serde::Serialize;

/// Counters of the last rendered frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderStats {
    pub renderables: u32,
    pub draw_calls: u32,
    pub points: u64,
    pub line_segments: u64,
    pub triangles: u64,
    pub pipelines: u32,
}
