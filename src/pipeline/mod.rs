// Cleaning pipeline: ingestion, processing (normalize / match / validate), and export

pub mod cancel;
pub mod export;
pub mod ingestion;
pub mod pipeline;
pub mod processing;
pub mod report;

use serde::Serialize;
use std::fmt;

pub use cancel::CancelToken;
pub use pipeline::{PipelineOutput, PipelineRun};

/// Lifecycle of one pipeline invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Ingesting,
    Normalizing,
    Matching,
    Validating,
    Exporting,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Ingesting => "ingesting",
            Stage::Normalizing => "normalizing",
            Stage::Matching => "matching",
            Stage::Validating => "validating",
            Stage::Exporting => "exporting",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }

    /// Stage that follows a successful `self`
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Idle => Some(Stage::Ingesting),
            Stage::Ingesting => Some(Stage::Normalizing),
            Stage::Normalizing => Some(Stage::Matching),
            Stage::Matching => Some(Stage::Validating),
            Stage::Validating => Some(Stage::Exporting),
            Stage::Exporting => Some(Stage::Done),
            Stage::Done | Stage::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
