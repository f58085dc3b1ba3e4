//! Simple metrics module for the cleaning pipeline
//!
//! Records through the `metrics` facade using Prometheus naming conventions.
//! No recorder is installed by the library; without one every call is a no-op.

use std::fmt;

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Ingestion
    RowsIngested,
    FilesIngested,

    // Matching
    MatchDecisions,

    // Validation
    ValidationIssues,

    // Pipeline
    StageDuration,
    Runs,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::RowsIngested => "xenergy_rows_ingested_total",
            MetricName::FilesIngested => "xenergy_files_ingested_total",
            MetricName::MatchDecisions => "xenergy_match_decisions_total",
            MetricName::ValidationIssues => "xenergy_validation_issues_total",
            MetricName::StageDuration => "xenergy_stage_duration_seconds",
            MetricName::Runs => "xenergy_runs_total",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            RowsIngested,
            FilesIngested,
            MatchDecisions,
            ValidationIssues,
            StageDuration,
            Runs,
        ]
        .into_iter()
    }

    /// (phase, description, unit)
    pub fn metadata(&self) -> (&'static str, &'static str, Option<&'static str>) {
        match self {
            MetricName::RowsIngested => ("ingestion", "Rows read from uploaded files", Some("rows")),
            MetricName::FilesIngested => ("ingestion", "Uploaded files parsed", Some("files")),
            MetricName::MatchDecisions => ("matching", "Match results by decision", None),
            MetricName::ValidationIssues => ("validation", "Validation issues by severity", None),
            MetricName::StageDuration => ("pipeline", "Wall-clock time per stage", Some("seconds")),
            MetricName::Runs => ("pipeline", "Pipeline invocations by outcome", None),
        }
    }
}

// ============================================================================
// Ingestion Metrics
// ============================================================================

pub mod ingestion {
    use super::MetricName;

    pub fn rows_ingested(rows: usize) {
        ::metrics::counter!(MetricName::RowsIngested.as_str()).increment(rows as u64);
    }

    pub fn files_ingested(files: usize) {
        ::metrics::counter!(MetricName::FilesIngested.as_str()).increment(files as u64);
    }
}

// ============================================================================
// Matching Metrics
// ============================================================================

pub mod matching {
    use super::MetricName;

    pub fn decision(decision: &'static str) {
        ::metrics::counter!(MetricName::MatchDecisions.as_str(), "decision" => decision)
            .increment(1);
    }
}

// ============================================================================
// Validation Metrics
// ============================================================================

pub mod validation {
    use super::MetricName;

    pub fn issue(severity: &'static str) {
        ::metrics::counter!(MetricName::ValidationIssues.as_str(), "severity" => severity)
            .increment(1);
    }
}

// ============================================================================
// Pipeline Metrics
// ============================================================================

pub mod pipeline {
    use super::MetricName;

    pub fn stage_duration(stage: &'static str, secs: f64) {
        ::metrics::histogram!(MetricName::StageDuration.as_str(), "stage" => stage).record(secs);
    }

    pub fn run_finished(outcome: &'static str) {
        ::metrics::counter!(MetricName::Runs.as_str(), "outcome" => outcome).increment(1);
    }
}
