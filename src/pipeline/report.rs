use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::ingestion::{SchemaReport, SourceInfo};
use super::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteLevel {
    Info,
    Warning,
}

/// One line of the "processing steps" list shown to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepNote {
    pub stage: Stage,
    pub level: NoteLevel,
    pub message: String,
}

impl StepNote {
    pub fn info(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            level: NoteLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            level: NoteLevel::Warning,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ColumnMatchSummary {
    pub column: String,
    pub accepted: usize,
    pub review: usize,
    pub empty: usize,
    /// Codes handed out to names the vocabulary did not know
    pub new_codes: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationSummary {
    pub clean: usize,
    pub flagged: usize,
    pub rejected: usize,
    /// Failing rows per rule id
    pub issues_by_rule: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub file_name: String,
    pub format: String,
    pub rows: usize,
    pub columns: usize,
    pub bytes: usize,
}

/// Record of one pipeline invocation, written next to the export as JSON
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub page: String,
    pub started_at: DateTime<Utc>,
    pub inputs: Vec<SourceInfo>,
    pub rows_in: usize,
    pub columns_in: usize,
    pub rows_out: usize,
    pub columns_out: usize,
    pub schema: SchemaReport,
    pub steps: Vec<StepNote>,
    pub matching: Vec<ColumnMatchSummary>,
    pub validation: ValidationSummary,
    pub export: Option<ExportSummary>,
    /// `[[extra_export]]` files and the updated vocabulary, when written
    pub extra_exports: Vec<ExportSummary>,
    /// Wall-clock seconds spent per stage
    pub durations: BTreeMap<String, f64>,
}

impl RunReport {
    pub fn new(run_id: String, page: String) -> Self {
        Self {
            run_id,
            page,
            started_at: Utc::now(),
            inputs: Vec::new(),
            rows_in: 0,
            columns_in: 0,
            rows_out: 0,
            columns_out: 0,
            schema: SchemaReport::default(),
            steps: Vec::new(),
            matching: Vec::new(),
            validation: ValidationSummary::default(),
            export: None,
            extra_exports: Vec::new(),
            durations: BTreeMap::new(),
        }
    }

    pub fn warnings(&self) -> impl Iterator<Item = &StepNote> {
        self.steps.iter().filter(|n| n.level == NoteLevel::Warning)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
