//! Pipeline orchestration module.

mod orchestrator;
mod replay;
mod stats;

pub use orchestrator::{Pipeline, PipelineConfig};
pub use replay::{read_events, ReplayRecord};
pub use stats::PipelineStats;
