pub mod engine;
pub mod logging;
pub mod render;
pub mod vr;

pub use engine::config::{PipelineConfig, PreviewStrategy};
pub use engine::{HeadsetOutcome, StereoPipeline, TickReport};
