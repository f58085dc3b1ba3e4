use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::app::ports::ExportSinkPort;
use crate::config::PipelineConfig;
use crate::pipeline::ingestion::InputFile;
use crate::pipeline::processing::matching::ReferenceVocabulary;
use crate::pipeline::{CancelToken, PipelineOutput, PipelineRun};

/// What a finished cleaning run left behind
#[derive(Debug)]
pub struct CleanOutcome {
    pub output: PipelineOutput,
    pub export_path: PathBuf,
    /// Extra exports and the updated vocabulary, in the order produced
    pub extra_paths: Vec<PathBuf>,
    pub report_path: Option<PathBuf>,
}

/// Use case for running one page over a set of input files and storing the
/// results through a sink
pub struct CleanUseCase {
    config: Arc<PipelineConfig>,
    vocabulary: Option<Arc<ReferenceVocabulary>>,
    sink: Box<dyn ExportSinkPort>,
    write_report: bool,
}

impl CleanUseCase {
    pub fn new(config: Arc<PipelineConfig>, sink: Box<dyn ExportSinkPort>) -> Self {
        Self {
            config,
            vocabulary: None,
            sink,
            write_report: false,
        }
    }

    pub fn with_vocabulary(mut self, vocabulary: Arc<ReferenceVocabulary>) -> Self {
        self.vocabulary = Some(vocabulary);
        self
    }

    /// Also store the run report
    pub fn with_report(mut self) -> Self {
        self.write_report = true;
        self
    }

    /// Run the pipeline on a blocking worker, then hand the export (and
    /// report) to the sink. Nothing is written when the pipeline fails.
    pub async fn run(&self, inputs: Vec<InputFile>, cancel: CancelToken) -> Result<CleanOutcome> {
        let config = Arc::clone(&self.config);
        let vocabulary = self.vocabulary.clone();

        let output = tokio::task::spawn_blocking(move || {
            let mut run = PipelineRun::new(config).with_cancel(cancel);
            if let Some(vocabulary) = vocabulary {
                run = run.with_vocabulary(vocabulary);
            }
            run.execute(&inputs)
        })
        .await
        .context("pipeline worker stopped unexpectedly")??;

        let export_path = self
            .sink
            .write_export(&output.export)
            .await
            .context("failed to store export")?;
        info!("Export written to {}", export_path.display());

        let mut extra_paths = Vec::new();
        for file in output.files().skip(1) {
            let path = self
                .sink
                .write_export(file)
                .await
                .with_context(|| format!("failed to store {}", file.file_name))?;
            info!("Extra file written to {}", path.display());
            extra_paths.push(path);
        }

        let report_path = if self.write_report {
            let path = self
                .sink
                .write_report(&output.report)
                .await
                .context("failed to store run report")?;
            info!("Report written to {}", path.display());
            Some(path)
        } else {
            None
        };

        Ok(CleanOutcome {
            output,
            export_path,
            extra_paths,
            report_path,
        })
    }
}
