use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::app::ports::ExportSinkPort;
use crate::pipeline::export::ExportedFile;
use crate::pipeline::report::RunReport;

/// Writes exports (and reports) into a local directory
pub struct FsExportSink {
    dir: PathBuf,
    report_path: Option<PathBuf>,
}

impl FsExportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            report_path: None,
        }
    }

    /// Write the report here instead of `report_<run_id>.json` in the output dir
    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

#[async_trait]
impl ExportSinkPort for FsExportSink {
    async fn write_export(&self, file: &ExportedFile) -> Result<PathBuf> {
        let path = self.dir.join(&file.file_name);
        write_file(&path, &file.bytes).await?;
        Ok(path)
    }

    async fn write_report(&self, report: &RunReport) -> Result<PathBuf> {
        let path = self
            .report_path
            .clone()
            .unwrap_or_else(|| self.dir.join(format!("report_{}.json", report.run_id)));
        let json = report.to_json().context("failed to serialize run report")?;
        write_file(&path, json.as_bytes()).await?;
        Ok(path)
    }
}
