//! Normalizer: declarative per-column cleanup applied to a whole table,
//! plus derived columns computed from existing ones.

pub mod transforms;

use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::domain::{ColumnRef, Table, Value};
use crate::error::NormalizationError;
use crate::pipeline::report::StepNote;
use crate::pipeline::Stage;

pub use transforms::{CompiledTransform, DateField, Transform};

/// Transforms applied, in order, to one column
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NormalizationRule {
    pub column: ColumnRef,
    pub transforms: Vec<Transform>,
}

impl NormalizationRule {
    pub fn new(column: &str, transforms: Vec<Transform>) -> Self {
        Self {
            column: ColumnRef::parse(column),
            transforms,
        }
    }
}

/// A new column computed from an existing one, e.g. `Day` from a date
/// column or `Fase` from a blast id
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeriveRule {
    pub column: String,
    pub from: ColumnRef,
    /// Applied to a copy of the source cell; empty copies it as is
    #[serde(default)]
    pub transforms: Vec<Transform>,
    /// Place the new column right after this one instead of at the end
    #[serde(default)]
    pub after: Option<ColumnRef>,
}

impl DeriveRule {
    pub fn new(column: &str, from: &str, transforms: Vec<Transform>) -> Self {
        Self {
            column: column.to_string(),
            from: ColumnRef::parse(from),
            transforms,
            after: None,
        }
    }

    pub fn after(mut self, column: &str) -> Self {
        self.after = Some(ColumnRef::parse(column));
        self
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    column: ColumnRef,
    steps: Vec<CompiledTransform>,
}

#[derive(Debug, Clone)]
struct CompiledDerive {
    name: String,
    from: ColumnRef,
    after: Option<ColumnRef>,
    steps: Vec<CompiledTransform>,
}

/// Output of one normalization pass
#[derive(Debug, Clone)]
pub struct Normalized {
    pub table: Table,
    pub notes: Vec<StepNote>,
    /// Cells rewritten across all rules
    pub changed_cells: usize,
}

/// Applies compiled rules to tables. Holds no state between calls.
#[derive(Debug, Clone)]
pub struct Normalizer {
    derived: Vec<CompiledDerive>,
    rules: Vec<CompiledRule>,
}

impl Normalizer {
    /// Compile the rules, rejecting malformed ones up front
    pub fn new(rules: &[NormalizationRule]) -> Result<Self, NormalizationError> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let label = rule.column.to_string();
            if rule.column.is_empty() {
                return Err(NormalizationError::EmptyRule(
                    "rule without a column".to_string(),
                ));
            }
            if rule.transforms.is_empty() {
                return Err(NormalizationError::EmptyRule(format!(
                    "rule for {label} lists no transforms"
                )));
            }
            let steps = rule
                .transforms
                .iter()
                .map(|t| t.compile(&label))
                .collect::<Result<Vec<_>, _>>()?;
            compiled.push(CompiledRule {
                column: rule.column.clone(),
                steps,
            });
        }
        debug!("Compiled {} normalization rules", compiled.len());
        Ok(Self {
            derived: Vec::new(),
            rules: compiled,
        })
    }

    /// Add derive rules; they run before the normalization rules, on the
    /// cells as ingested
    pub fn with_derived(mut self, rules: &[DeriveRule]) -> Result<Self, NormalizationError> {
        for rule in rules {
            let name = rule.column.trim();
            if name.is_empty() || rule.from.is_empty() {
                return Err(NormalizationError::EmptyRule(
                    "derive rule needs both column and from".to_string(),
                ));
            }
            let steps = rule
                .transforms
                .iter()
                .map(|t| t.compile(name))
                .collect::<Result<Vec<_>, _>>()?;
            self.derived.push(CompiledDerive {
                name: name.to_string(),
                from: rule.from.clone(),
                after: rule.after.clone(),
                steps,
            });
        }
        debug!("Compiled {} derive rules", self.derived.len());
        Ok(self)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn derived_count(&self) -> usize {
        self.derived.len()
    }

    /// Add the derived columns, then rewrite the configured columns. Row
    /// count is unchanged; the column set only grows by derived columns.
    #[instrument(skip_all, fields(rows = table.row_count(), rules = self.rules.len()))]
    pub fn normalize(&self, table: &Table) -> Normalized {
        let mut out = table.clone();
        let mut notes = Vec::new();
        let mut changed_cells = 0;

        for derive in &self.derived {
            self.derive_column(derive, &mut out, &mut notes);
        }

        for rule in &self.rules {
            let Some(target) = rule.column.resolve(&out) else {
                warn!("Column {} not found, skipping normalization rule", rule.column);
                notes.push(StepNote::warning(
                    Stage::Normalizing,
                    format!("Column '{}' not found, rule skipped", rule.column),
                ));
                continue;
            };

            let label = rule.column.to_string();
            let sources = resolve_sources(&rule.steps, &label, &out, &mut notes);
            let mut changed = 0;
            for row in 0..out.row_count() {
                let original = out.get(row, target).cloned().unwrap_or(Value::Null);
                let mut value = original.clone();
                for (step, source) in rule.steps.iter().zip(&sources) {
                    let source_value = source.and_then(|idx| out.get(row, idx));
                    value = step.apply(value, source_value);
                }
                if value != original {
                    changed += 1;
                    out.set(row, target, value);
                }
            }

            let name = out.columns()[target].clone();
            debug!("Column {}: {} values changed", name, changed);
            notes.push(StepNote::info(
                Stage::Normalizing,
                format!("Column '{name}': {changed} values changed"),
            ));
            changed_cells += changed;
        }

        info!("Normalization rewrote {} cells", changed_cells);
        Normalized {
            table: out,
            notes,
            changed_cells,
        }
    }

    fn derive_column(
        &self,
        derive: &CompiledDerive,
        table: &mut Table,
        notes: &mut Vec<StepNote>,
    ) {
        let Some(from) = derive.from.resolve(table) else {
            warn!("Column {} not found, cannot derive {}", derive.from, derive.name);
            notes.push(StepNote::warning(
                Stage::Normalizing,
                format!(
                    "Column '{}' not found, '{}' not derived",
                    derive.from, derive.name
                ),
            ));
            return;
        };

        let sources = resolve_sources(&derive.steps, &derive.name, table, notes);
        let values: Vec<Value> = (0..table.row_count())
            .map(|row| {
                let mut value = table.get(row, from).cloned().unwrap_or(Value::Null);
                for (step, source) in derive.steps.iter().zip(&sources) {
                    let source_value = source.and_then(|idx| table.get(row, idx));
                    value = step.apply(value, source_value);
                }
                value
            })
            .collect();
        let filled = values.iter().filter(|v| !v.is_missing()).count();

        let at = match &derive.after {
            Some(anchor) => match anchor.resolve(table) {
                Some(idx) => idx + 1,
                None => {
                    notes.push(StepNote::warning(
                        Stage::Normalizing,
                        format!("Column '{anchor}' not found, '{}' appended", derive.name),
                    ));
                    table.column_count()
                }
            },
            None => table.column_count(),
        };
        let source_name = table.columns()[from].clone();
        let name = table.insert_column(at, &derive.name, values);
        debug!("Derived {} from {}: {} values", name, source_name, filled);
        notes.push(StepNote::info(
            Stage::Normalizing,
            format!("Column '{name}' derived from '{source_name}': {filled} values"),
        ));
    }
}

/// Source column per step; only `fill_from` steps have one
fn resolve_sources(
    steps: &[CompiledTransform],
    label: &str,
    table: &Table,
    notes: &mut Vec<StepNote>,
) -> Vec<Option<usize>> {
    steps
        .iter()
        .map(|step| match step {
            CompiledTransform::FillFrom { column, .. } => {
                let idx = column.resolve(table);
                if idx.is_none() {
                    notes.push(StepNote::warning(
                        Stage::Normalizing,
                        format!("Fill source '{column}' for '{label}' not found"),
                    ));
                }
                idx
            }
            _ => None,
        })
        .collect()
}
