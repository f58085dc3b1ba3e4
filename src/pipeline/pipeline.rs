use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::domain::Table;
use crate::error::{MatchError, PipelineError, Result, StageError};
use crate::observability::metrics;
use crate::pipeline::cancel::{CancelToken, Cancelled};
use crate::pipeline::export::{ExportedFile, Exporter};
use crate::pipeline::ingestion::{Ingested, Ingestor, InputFile};
use crate::pipeline::processing::matching::{ColumnMatches, Matcher, NewCodes, ReferenceVocabulary};
use crate::pipeline::processing::reshape::pivot;
use crate::pipeline::processing::validation::{ValidationOutcome, Validator};
use crate::pipeline::report::{RunReport, StepNote};
use crate::pipeline::Stage;

/// Everything one successful run produces
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Normalized table with match and validation columns, rejected rows included
    pub table: Table,
    pub matches: Vec<ColumnMatches>,
    pub validation: ValidationOutcome,
    pub export: ExportedFile,
    /// One file per `[[extra_export]]`, in configuration order
    pub extra_exports: Vec<ExportedFile>,
    /// Vocabulary with this run's new codes, when configured and any were added
    pub vocabulary_export: Option<ExportedFile>,
    pub report: RunReport,
}

impl PipelineOutput {
    /// Every file the run produced, main export first
    pub fn files(&self) -> impl Iterator<Item = &ExportedFile> {
        std::iter::once(&self.export)
            .chain(&self.extra_exports)
            .chain(&self.vocabulary_export)
    }
}

/// One invocation of a page's pipeline over a set of input files.
///
/// Runs `Idle -> Ingesting -> Normalizing -> Matching -> Validating ->
/// Exporting -> Done`; any stage error moves it to `Failed` and is returned
/// with the stage it came from. A run executes at most once.
pub struct PipelineRun {
    id: Uuid,
    config: Arc<PipelineConfig>,
    vocabulary: Option<Arc<ReferenceVocabulary>>,
    cancel: CancelToken,
    stage: Stage,
    history: Vec<Stage>,
}

impl PipelineRun {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            vocabulary: None,
            cancel: CancelToken::new(),
            stage: Stage::Idle,
            history: vec![Stage::Idle],
        }
    }

    /// Extra vocabulary entries, merged after the configured ones
    pub fn with_vocabulary(mut self, vocabulary: Arc<ReferenceVocabulary>) -> Self {
        self.vocabulary = Some(vocabulary);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Stages entered so far, starting with `Idle`
    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    #[instrument(skip_all, fields(run_id = %self.id, page = %self.config.page, inputs = inputs.len()))]
    pub fn execute(&mut self, inputs: &[InputFile]) -> Result<PipelineOutput> {
        if self.stage != Stage::Idle {
            return Err(PipelineError::new(self.stage, StageError::AlreadyExecuted));
        }

        let started = Instant::now();
        match self.run_stages(inputs) {
            Ok(mut output) => {
                self.transition(Stage::Done);
                output
                    .report
                    .durations
                    .insert("total".to_string(), started.elapsed().as_secs_f64());
                metrics::pipeline::run_finished("done");
                info!(
                    "Run finished: {} rows in, {} rows exported as {}",
                    output.report.rows_in, output.export.rows, output.export.file_name
                );
                Ok(output)
            }
            Err(e) => {
                self.transition(Stage::Failed);
                if e.is_cancelled() {
                    metrics::pipeline::run_finished("cancelled");
                    warn!("Run cancelled during {}", e.stage);
                } else {
                    metrics::pipeline::run_finished("failed");
                    warn!("Run failed: {}", e);
                }
                Err(e)
            }
        }
    }

    fn run_stages(&mut self, inputs: &[InputFile]) -> Result<PipelineOutput> {
        let mut report = RunReport::new(self.id.to_string(), self.config.page.clone());

        // Ingesting
        let timer = self.enter(Stage::Ingesting)?;
        let ingested = Ingestor::new(self.config.ingest.clone())
            .ingest_many(inputs)
            .map_err(|e| PipelineError::new(Stage::Ingesting, e))?;
        metrics::ingestion::files_ingested(inputs.len());
        metrics::ingestion::rows_ingested(ingested.table.row_count());
        record_ingestion(&mut report, &ingested);
        finish(&mut report, Stage::Ingesting, timer);

        // Normalizing
        let timer = self.enter(Stage::Normalizing)?;
        let normalizer = self
            .config
            .normalizer()
            .map_err(|e| PipelineError::new(Stage::Normalizing, e))?;
        let normalized = normalizer.normalize(&ingested.table);
        report.steps.extend(normalized.notes);
        let mut table = normalized.table;
        if let Some(config) = &self.config.pivot {
            let pivoted = pivot(&table, config)
                .map_err(|e| PipelineError::new(Stage::Normalizing, e))?;
            report.steps.push(StepNote::info(
                Stage::Normalizing,
                format!(
                    "Pivoted {} rows into {} rows",
                    table.row_count(),
                    pivoted.table.row_count()
                ),
            ));
            if pivoted.dropped_rows > 0 {
                report.steps.push(StepNote::warning(
                    Stage::Normalizing,
                    format!(
                        "{} rows without index or key dropped by pivot",
                        pivoted.dropped_rows
                    ),
                ));
            }
            if pivoted.ignored_keys > 0 {
                report.steps.push(StepNote::info(
                    Stage::Normalizing,
                    format!("{} readings with unlisted keys ignored", pivoted.ignored_keys),
                ));
            }
            table = pivoted.table;
        }
        finish(&mut report, Stage::Normalizing, timer);

        // Matching
        let timer = self.enter(Stage::Matching)?;
        let (matches, updated_vocabulary) = self.match_columns(&mut table, &mut report)?;
        finish(&mut report, Stage::Matching, timer);

        // Validating
        let timer = self.enter(Stage::Validating)?;
        let validator = Validator::new(&self.config.validate)
            .map_err(|e| PipelineError::new(Stage::Validating, e))?;
        let mut validation = validator
            .validate(&table, &self.cancel)
            .map_err(|c| PipelineError::new(Stage::Validating, c))?;
        report.steps.append(&mut validation.notes);
        report.validation = validation.summary();
        if validator.rule_count() > 0 {
            validation.annotate(&mut table);
        }
        finish(&mut report, Stage::Validating, timer);

        // Exporting
        let timer = self.enter(Stage::Exporting)?;
        let exporter = Exporter::new(self.config.export.clone())
            .map_err(|e| PipelineError::new(Stage::Exporting, e))?;
        let export = exporter
            .export(&table, &validation.rejected_mask())
            .map_err(|e| PipelineError::new(Stage::Exporting, e))?;
        if !export.skipped_columns.is_empty() {
            report.steps.push(StepNote::warning(
                Stage::Exporting,
                format!(
                    "Selected columns not found: {}",
                    export.skipped_columns.join(", ")
                ),
            ));
        }
        report.rows_out = export.rows;
        report.columns_out = export.columns;
        report.export = Some(export.summary());

        let mut extra_exports = Vec::with_capacity(self.config.extra_export.len());
        for config in &self.config.extra_export {
            self.check_cancel(Stage::Exporting)?;
            let file = Exporter::new(config.clone())
                .and_then(|exporter| exporter.export(&table, &validation.rejected_mask()))
                .map_err(|e| PipelineError::new(Stage::Exporting, e))?;
            report.extra_exports.push(file.summary());
            extra_exports.push(file);
        }

        let vocabulary_export = match (&self.config.vocabulary_export, updated_vocabulary) {
            (Some(config), Some(vocabulary)) => {
                let file = Exporter::new(config.export_config())
                    .and_then(|exporter| exporter.export(&vocabulary, &[]))
                    .map_err(|e| PipelineError::new(Stage::Exporting, e))?;
                report.steps.push(StepNote::info(
                    Stage::Exporting,
                    format!("Updated vocabulary written to {}", file.file_name),
                ));
                report.extra_exports.push(file.summary());
                Some(file)
            }
            _ => None,
        };
        finish(&mut report, Stage::Exporting, timer);

        Ok(PipelineOutput {
            table,
            matches,
            validation,
            export,
            extra_exports,
            vocabulary_export,
            report,
        })
    }

    /// Match every configured column. Also returns the vocabulary with this
    /// run's new codes when a vocabulary export is configured and codes were added.
    fn match_columns(
        &self,
        table: &mut Table,
        report: &mut RunReport,
    ) -> Result<(Vec<ColumnMatches>, Option<Table>)> {
        let Some(matching) = &self.config.matching else {
            report
                .steps
                .push(StepNote::info(Stage::Matching, "No matching configured"));
            return Ok((Vec::new(), None));
        };
        if matching.columns.iter().all(|c| c.is_empty()) {
            return Err(PipelineError::new(Stage::Matching, MatchError::NoColumns));
        }

        let vocabulary = self
            .resolve_vocabulary()
            .map_err(|e| PipelineError::new(Stage::Matching, e))?;
        let matcher = Matcher::new(vocabulary, matching.settings())
            .map_err(|e| PipelineError::new(Stage::Matching, e))?;
        // shared by all matched columns: a new name gets one code per run
        let mut new_codes = NewCodes::new(matcher.vocabulary());

        let mut results = Vec::with_capacity(matching.columns.len());
        for column in &matching.columns {
            self.check_cancel(Stage::Matching)?;
            let Some(idx) = column.resolve(table) else {
                warn!("Match column {} not found", column);
                report.steps.push(StepNote::warning(
                    Stage::Matching,
                    format!("Column '{column}' not found, matching skipped"),
                ));
                continue;
            };

            let matches = matcher.match_column(table, idx, &mut new_codes);
            let summary = matches.summary(&new_codes);
            report.steps.push(StepNote::info(
                Stage::Matching,
                format!(
                    "Column '{}': {} accepted, {} for review, {} empty",
                    summary.column, summary.accepted, summary.review, summary.empty
                ),
            ));
            for (name, code) in &summary.new_codes {
                report.steps.push(StepNote::info(
                    Stage::Matching,
                    format!("New entry '{name}' assigned code {code}"),
                ));
            }
            report.matching.push(summary);
            matches.annotate(table);
            results.push(matches);
        }

        let updated = match &self.config.vocabulary_export {
            Some(export) if !new_codes.is_empty() => Some(new_codes.updated_vocabulary(
                matcher.vocabulary(),
                &export.name_header,
                &export.code_header,
            )),
            _ => None,
        };
        Ok((results, updated))
    }

    fn resolve_vocabulary(&self) -> std::result::Result<Arc<ReferenceVocabulary>, MatchError> {
        let configured = self.config.vocabulary()?.unwrap_or_default();
        Ok(match &self.vocabulary {
            Some(extra) if configured.is_empty() => Arc::clone(extra),
            Some(extra) => Arc::new(configured.merged(extra)),
            None => Arc::new(configured),
        })
    }

    fn enter(&mut self, stage: Stage) -> Result<Instant> {
        self.transition(stage);
        self.check_cancel(stage)?;
        Ok(Instant::now())
    }

    fn transition(&mut self, stage: Stage) {
        debug!("Stage {} -> {}", self.stage, stage);
        self.stage = stage;
        self.history.push(stage);
    }

    fn check_cancel(&self, stage: Stage) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::new(stage, Cancelled));
        }
        Ok(())
    }
}

fn record_ingestion(report: &mut RunReport, ingested: &Ingested) {
    report.rows_in = ingested.table.row_count();
    report.columns_in = ingested.table.column_count();
    report.inputs = ingested.sources.clone();
    report.schema = ingested.schema.clone();

    let schema = &ingested.schema;
    if !schema.missing_columns.is_empty() {
        report.steps.push(StepNote::warning(
            Stage::Ingesting,
            format!("Expected columns missing: {}", schema.missing_columns.join(", ")),
        ));
    }
    if !schema.unexpected_columns.is_empty() {
        report.steps.push(StepNote::info(
            Stage::Ingesting,
            format!("Unexpected columns: {}", schema.unexpected_columns.join(", ")),
        ));
    }
    if schema.padded_rows > 0 || schema.truncated_rows > 0 {
        report.steps.push(StepNote::warning(
            Stage::Ingesting,
            format!(
                "{} short rows padded, {} long rows truncated",
                schema.padded_rows, schema.truncated_rows
            ),
        ));
    }
    report.steps.push(StepNote::info(
        Stage::Ingesting,
        format!(
            "Read {} rows x {} columns from {} file(s)",
            report.rows_in,
            report.columns_in,
            ingested.sources.len()
        ),
    ));
}

fn finish(report: &mut RunReport, stage: Stage, started: Instant) {
    let secs = started.elapsed().as_secs_f64();
    metrics::pipeline::stage_duration(stage.as_str(), secs);
    report.durations.insert(stage.as_str().to_string(), secs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Value;

    fn config(toml: &str) -> Arc<PipelineConfig> {
        Arc::new(PipelineConfig::from_toml_str(toml).unwrap())
    }

    fn csv(text: &str) -> InputFile {
        InputFile::new("input.csv", text.as_bytes().to_vec())
    }

    #[test]
    fn test_happy_path_walks_every_stage() {
        let mut run = PipelineRun::new(config(
            r#"
            page = "t"
            [[normalize]]
            column = "city"
            transforms = ["trim", "fold_accents", "lowercase"]
            [[validate]]
            id = "city"
            column = "city"
            check = "required"
            "#,
        ));
        let output = run.execute(&[csv("city\nSÃO PAULO \n\n")]).unwrap();
        assert_eq!(
            run.history(),
            &[
                Stage::Idle,
                Stage::Ingesting,
                Stage::Normalizing,
                Stage::Matching,
                Stage::Validating,
                Stage::Exporting,
                Stage::Done
            ]
        );
        assert_eq!(output.table.get(0, 0), Some(&Value::text("sao paulo")));
        assert_eq!(output.report.run_id, run.id().to_string());
        assert!(output.report.durations.contains_key("total"));
        assert_eq!(
            String::from_utf8(output.export.bytes).unwrap(),
            "city,validation_status,validation_issues\nsao paulo,clean,\n"
        );
    }

    #[test]
    fn test_cancelled_before_start_fails_in_ingesting() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut run = PipelineRun::new(config("page = \"t\"")).with_cancel(cancel);
        let err = run.execute(&[csv("a\n1\n")]).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.stage, Stage::Ingesting);
        assert_eq!(run.stage(), Stage::Failed);
    }

    #[test]
    fn test_error_carries_originating_stage() {
        let mut run = PipelineRun::new(config(
            "page = \"t\"\n[export]\nformat = \"parquet\"\n",
        ));
        let err = run.execute(&[csv("a\n1\n")]).unwrap_err();
        assert_eq!(err.stage, Stage::Exporting);
        assert!(err.to_string().starts_with("exporting stage failed"));
        assert_eq!(run.history().last(), Some(&Stage::Failed));
    }

    #[test]
    fn test_empty_input_fails_in_ingesting() {
        let mut run = PipelineRun::new(config("page = \"t\""));
        let err = run.execute(&[csv("   \n")]).unwrap_err();
        assert_eq!(err.stage, Stage::Ingesting);
    }

    #[test]
    fn test_run_executes_once() {
        let mut run = PipelineRun::new(config("page = \"t\""));
        run.execute(&[csv("a\n1\n")]).unwrap();
        let err = run.execute(&[csv("a\n1\n")]).unwrap_err();
        assert!(matches!(err.source, StageError::AlreadyExecuted));
        assert_eq!(run.stage(), Stage::Done);
    }

    #[test]
    fn test_supplied_vocabulary_is_used() {
        let mut run = PipelineRun::new(config(
            "page = \"t\"\n[matching]\ncolumns = [\"op\"]\nthreshold = 0.6\n",
        ))
        .with_vocabulary(Arc::new(ReferenceVocabulary::from_names(&["Petrobras", "Vale"])));
        let output = run.execute(&[csv("op\npetrobras sa\n")]).unwrap();
        assert_eq!(output.matches.len(), 1);
        assert_eq!(
            output.matches[0].results[0].canonical.as_deref(),
            Some("Petrobras")
        );
        assert_eq!(output.table.columns()[1], "op_match");
    }

    #[test]
    fn test_new_codes_shared_across_matched_columns() {
        let mut run = PipelineRun::new(config(
            r#"
            page = "t"
            [matching]
            columns = ["op_day", "op_night"]
            threshold = 0.9
            unmatched_code = 25
            assign_new_codes = true
            vocabulary = [{ name = "Jose Perez", code = 13 }]
            "#,
        ));
        let output = run
            .execute(&[csv("op_day,op_night\nRaul Soto,Luis Vargas\nJose Perez,Raul Soto\n")])
            .unwrap();

        let codes = |i: usize| -> Vec<Option<i64>> {
            output.matches[i].results.iter().map(|r| r.code).collect()
        };
        assert_eq!(codes(0), vec![Some(14), Some(13)]);
        assert_eq!(codes(1), vec![Some(15), Some(14)]);
        assert_eq!(output.report.matching[0].new_codes.len(), 1);
        assert_eq!(output.report.matching[1].new_codes.get("Raul Soto"), Some(&14));
        assert_eq!(output.report.matching[1].new_codes.get("Luis Vargas"), Some(&15));
        assert!(output.vocabulary_export.is_none());
    }

    #[test]
    fn test_validation_columns_do_not_overwrite_input() {
        let mut run = PipelineRun::new(config(
            r#"
            page = "t"
            [[validate]]
            id = "a"
            column = "a"
            check = "required"
            severity = "reject"
            "#,
        ));
        let output = run.execute(&[csv("a,validation_status\nx,keep-me\n")]).unwrap();
        assert_eq!(
            String::from_utf8(output.export.bytes).unwrap(),
            "a,validation_status,validation_status_1,validation_issues\nx,keep-me,clean,\n"
        );
    }

    #[test]
    fn test_pivot_and_extra_exports() {
        let mut run = PipelineRun::new(config(
            r#"
            page = "t"
            [ingest]
            columns = ["Source", "Code", "Timestamp", "Value"]

            [[derive]]
            column = "Number"
            from = "Source"
            transforms = [{ extract = { pattern = "(\\d+)" } }, "to_number"]

            [[derive]]
            column = "Hour"
            from = "Timestamp"
            transforms = [{ date_part = { part = "hour", day_first = true } }]

            [pivot]
            index = ["Number", "Hour"]
            key = "Code"
            value = "Value"
            columns = ["P80", "P50"]

            [[extra_export]]
            format = "txt"
            file_base = "wide"
            "#,
        ));
        let output = run
            .execute(&[csv(
                "Shovel65,P80,24/07/2025 0:01,5.64\nShovel65,P50,24/07/2025 0:01,2.1\nShovel12,P80,24/07/2025 3:30,7\n",
            )])
            .unwrap();
        assert_eq!(output.table.columns(), &["Number", "Hour", "P80", "P50"]);
        assert_eq!(output.table.row_count(), 2);
        assert_eq!(output.extra_exports.len(), 1);
        assert_eq!(output.extra_exports[0].file_name, "wide.txt");
        assert_eq!(
            String::from_utf8(output.extra_exports[0].bytes.clone()).unwrap(),
            "Number\tHour\tP80\tP50\n12\t3\t7\t\n65\t0\t5.64\t2.1\n"
        );
        assert_eq!(output.report.extra_exports[0].file_name, "wide.txt");
        assert_eq!(output.files().count(), 2);
    }

    #[test]
    fn test_vocabulary_export_only_with_new_codes() {
        let page = r#"
            page = "t"
            [matching]
            columns = ["Operador"]
            threshold = 0.9
            assign_new_codes = true
            vocabulary = [{ name = "Jose Perez", code = 13 }, { name = "Hugo Garcia", code = 11 }]
            [vocabulary_export]
            format = "csv"
            file_base = "Operators_Updated"
            name_header = "Operador"
            code_header = "Codigo"
        "#;
        let output = PipelineRun::new(config(page))
            .execute(&[csv("Operador\nLuis Vargas\nJose Perez\n")])
            .unwrap();
        let file = output.vocabulary_export.unwrap();
        assert_eq!(file.file_name, "Operators_Updated.csv");
        assert_eq!(
            String::from_utf8(file.bytes).unwrap(),
            "Operador,Codigo\nHugo Garcia,11\nJose Perez,13\nLuis Vargas,14\n"
        );

        let known_only = PipelineRun::new(config(page))
            .execute(&[csv("Operador\nJose Perez\n")])
            .unwrap();
        assert!(known_only.vocabulary_export.is_none());
        assert!(known_only.report.extra_exports.is_empty());
    }

    #[test]
    fn test_matching_without_vocabulary_fails_in_matching() {
        let mut run = PipelineRun::new(config(
            "page = \"t\"\n[matching]\ncolumns = [\"op\"]\n",
        ));
        let err = run.execute(&[csv("op\nx\n")]).unwrap_err();
        assert_eq!(err.stage, Stage::Matching);
        assert!(matches!(
            err.source,
            StageError::Match(MatchError::EmptyVocabulary)
        ));
    }
}
