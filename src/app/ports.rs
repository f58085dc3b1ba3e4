use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;

use crate::pipeline::export::ExportedFile;
use crate::pipeline::report::RunReport;

/// Destination for the files a run produces
#[async_trait]
pub trait ExportSinkPort: Send + Sync {
    /// Store the exported table; returns where it went
    async fn write_export(&self, file: &ExportedFile) -> Result<PathBuf>;

    /// Store the run report as JSON; returns where it went
    async fn write_report(&self, report: &RunReport) -> Result<PathBuf>;
}
