pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod pages;
pub mod pipeline;

// Domain data shapes shared across layers
pub mod domain;

// Application use cases and their infrastructure adapters
pub mod app;
pub mod infra;

pub mod observability;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pages::PageRegistry;
pub use pipeline::{CancelToken, PipelineOutput, PipelineRun, Stage};
