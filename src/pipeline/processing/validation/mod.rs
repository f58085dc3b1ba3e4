//! Validator: evaluates ordered rules against every row and classifies rows.

pub mod predicates;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, instrument, warn};

use crate::constants::{VALIDATION_ISSUES_COLUMN, VALIDATION_STATUS_COLUMN};
use crate::domain::{ColumnRef, OneOrMany, Table, Value};
use crate::error::ValidationError;
use crate::pipeline::cancel::{CancelToken, Cancelled};
use crate::pipeline::report::{StepNote, ValidationSummary};
use crate::pipeline::Stage;

pub use predicates::{Check, Predicate};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Row stays in every export, marked flagged
    #[default]
    Flag,
    /// Row is marked rejected and left out of `exclude_rejected` exports
    Reject,
}

/// One `[[validate]]` entry
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationRule {
    pub id: String,
    #[serde(alias = "column")]
    pub columns: OneOrMany,
    pub check: Check,
    /// Failure reason; the check's default reason when absent
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub severity: Severity,
}

impl ValidationRule {
    pub fn new(id: &str, columns: &[&str], check: Check) -> Self {
        Self {
            id: id.to_string(),
            columns: OneOrMany::Many(columns.iter().map(|c| ColumnRef::parse(c)).collect()),
            check,
            reason: None,
            severity: Severity::Flag,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }
}

/// A failing (rule, row) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub rule_id: String,
    pub row: usize,
    /// First column that failed; `None` for row-level checks
    pub column: Option<String>,
    pub reason: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Clean,
    Flagged,
    Rejected,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Clean => "clean",
            RowStatus::Flagged => "flagged",
            RowStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    id: String,
    columns: Vec<ColumnRef>,
    predicate: Predicate,
    reason: String,
    severity: Severity,
}

#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    /// Issues in rule order, then row order
    pub issues: Vec<ValidationIssue>,
    pub row_status: Vec<RowStatus>,
    pub notes: Vec<StepNote>,
}

impl ValidationOutcome {
    pub fn rejected_mask(&self) -> Vec<bool> {
        self.row_status
            .iter()
            .map(|s| *s == RowStatus::Rejected)
            .collect()
    }

    pub fn issues_for_row(&self, row: usize) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.row == row)
    }

    pub fn summary(&self) -> ValidationSummary {
        let mut summary = ValidationSummary::default();
        for status in &self.row_status {
            match status {
                RowStatus::Clean => summary.clean += 1,
                RowStatus::Flagged => summary.flagged += 1,
                RowStatus::Rejected => summary.rejected += 1,
            }
        }
        let mut by_rule: BTreeMap<String, usize> = BTreeMap::new();
        for issue in &self.issues {
            *by_rule.entry(issue.rule_id.clone()).or_default() += 1;
        }
        summary.issues_by_rule = by_rule;
        summary
    }

    /// Add `validation_status` and `validation_issues` columns. An input
    /// column of the same name is kept and the new one is suffixed.
    pub fn annotate(&self, table: &mut Table) {
        let mut messages: Vec<Vec<String>> = vec![Vec::new(); self.row_status.len()];
        for issue in &self.issues {
            if let Some(list) = messages.get_mut(issue.row) {
                list.push(format!("{}: {}", issue.rule_id, issue.reason));
            }
        }
        table.add_column(
            VALIDATION_STATUS_COLUMN,
            self.row_status
                .iter()
                .map(|s| Value::text(s.as_str()))
                .collect(),
        );
        table.add_column(
            VALIDATION_ISSUES_COLUMN,
            messages
                .into_iter()
                .map(|m| {
                    if m.is_empty() {
                        Value::Null
                    } else {
                        Value::Text(m.join("; "))
                    }
                })
                .collect(),
        );
    }
}

pub struct Validator {
    rules: Vec<CompiledRule>,
}

impl Validator {
    /// Compile rules in configuration order
    pub fn new(rules: &[ValidationRule]) -> Result<Self, ValidationError> {
        let mut ids = HashSet::new();
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let id = rule.id.trim();
            if id.is_empty() {
                return Err(ValidationError::EmptyRuleId);
            }
            if !ids.insert(id.to_string()) {
                return Err(ValidationError::DuplicateRuleId(id.to_string()));
            }
            let columns: Vec<ColumnRef> = rule
                .columns
                .clone()
                .into_vec()
                .into_iter()
                .filter(|c| !c.is_empty())
                .collect();
            if columns.is_empty() {
                return Err(ValidationError::NoColumns(id.to_string()));
            }
            compiled.push(CompiledRule {
                id: id.to_string(),
                columns,
                predicate: rule.check.compile(id)?,
                reason: rule
                    .reason
                    .clone()
                    .unwrap_or_else(|| rule.check.default_reason().to_string()),
                severity: rule.severity,
            });
        }
        debug!("Compiled {} validation rules", compiled.len());
        Ok(Self { rules: compiled })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Evaluate every rule against every row. No short-circuit: a row carries
    /// one issue per failing rule.
    #[instrument(skip_all, fields(rows = table.row_count(), rules = self.rules.len()))]
    pub fn validate(
        &self,
        table: &Table,
        cancel: &CancelToken,
    ) -> Result<ValidationOutcome, Cancelled> {
        let mut issues = Vec::new();
        let mut notes = Vec::new();

        for rule in &self.rules {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }

            let resolved: Vec<(usize, &ColumnRef)> = rule
                .columns
                .iter()
                .filter_map(|c| c.resolve(table).map(|idx| (idx, c)))
                .collect();
            if resolved.is_empty() {
                warn!("Rule {} skipped, no columns found", rule.id);
                notes.push(StepNote::warning(
                    Stage::Validating,
                    format!("Rule '{}' skipped: columns not found", rule.id),
                ));
                continue;
            }
            if resolved.len() < rule.columns.len() {
                let missing: Vec<String> = rule
                    .columns
                    .iter()
                    .filter(|c| c.resolve(table).is_none())
                    .map(|c| c.to_string())
                    .collect();
                notes.push(StepNote::warning(
                    Stage::Validating,
                    format!("Rule '{}': columns not found: {}", rule.id, missing.join(", ")),
                ));
            }

            let before = issues.len();
            for row in 0..table.row_count() {
                let failing = if rule.predicate.is_row_level() {
                    let any = resolved
                        .iter()
                        .any(|(idx, _)| table.get(row, *idx).is_some_and(|v| !v.is_missing()));
                    (!any).then_some(None)
                } else {
                    resolved
                        .iter()
                        .find(|(idx, _)| {
                            let value = table.get(row, *idx).unwrap_or(&Value::Null);
                            !rule.predicate.holds(value)
                        })
                        .map(|(idx, _)| Some(table.columns()[*idx].clone()))
                };

                if let Some(column) = failing {
                    issues.push(ValidationIssue {
                        rule_id: rule.id.clone(),
                        row,
                        column,
                        reason: rule.reason.clone(),
                        severity: rule.severity,
                    });
                }
            }

            let failed = issues.len() - before;
            notes.push(StepNote::info(
                Stage::Validating,
                format!("Rule '{}': {} rows failed ({})", rule.id, failed, rule.reason),
            ));
        }

        let mut row_status = vec![RowStatus::Clean; table.row_count()];
        for issue in &issues {
            crate::observability::metrics::validation::issue(match issue.severity {
                Severity::Flag => "flag",
                Severity::Reject => "reject",
            });
            let status = &mut row_status[issue.row];
            *status = match (issue.severity, *status) {
                (Severity::Reject, _) | (_, RowStatus::Rejected) => RowStatus::Rejected,
                _ => RowStatus::Flagged,
            };
        }

        info!(
            "Validation found {} issues across {} rows",
            issues.len(),
            table.row_count()
        );
        Ok(ValidationOutcome {
            issues,
            row_status,
            notes,
        })
    }
}
