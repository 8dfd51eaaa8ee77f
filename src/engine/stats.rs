use serde::Serialize;

/// Running counters for the pipeline, one instance per pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub ticks: u64,
    pub headset_frames_submitted: u64,
    pub not_visible_submissions: u64,
    pub submission_failures: u64,
    pub skipped_invisible_ticks: u64,
    pub preview_frames: u64,
    pub pose_query_failures: u64,
    pub input_query_failures: u64,
    pub status_query_failures: u64,
    pub target_failures: u64,
    pub recenters: u64,
}

impl PipelineStats {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
