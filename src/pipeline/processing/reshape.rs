//! Long-to-wide reshaping: one row per reading becomes one row per index key.

use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::domain::{ColumnRef, Table, Value};
use crate::error::NormalizationError;

/// `[pivot]` section of a page
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PivotConfig {
    /// Columns identifying one output row
    pub index: Vec<ColumnRef>,
    /// Column whose values name the output columns
    pub key: ColumnRef,
    /// Column holding the cell values
    pub value: ColumnRef,
    /// Output columns, in order; empty takes every key in first-seen order
    #[serde(default)]
    pub columns: Vec<String>,
}

/// Result of one pivot
#[derive(Debug, Clone)]
pub struct Pivoted {
    pub table: Table,
    /// Input rows with a missing index cell or key
    pub dropped_rows: usize,
    /// Readings whose key is not an output column
    pub ignored_keys: usize,
}

struct Group {
    index: Vec<Value>,
    cells: Vec<Value>,
}

/// Spread `value` across one column per `key`, one row per distinct index.
///
/// Rows missing any index cell or the key are dropped. The first non-missing
/// reading of a key wins. Output rows are sorted by index, numbers before text.
pub fn pivot(table: &Table, config: &PivotConfig) -> Result<Pivoted, NormalizationError> {
    let resolve = |col: &ColumnRef| {
        col.resolve(table)
            .ok_or_else(|| NormalizationError::MissingPivotColumn(col.to_string()))
    };
    if config.index.is_empty() {
        return Err(NormalizationError::EmptyRule(
            "pivot names no index columns".to_string(),
        ));
    }
    let index: Vec<usize> = config.index.iter().map(resolve).collect::<Result<_, _>>()?;
    let key = resolve(&config.key)?;
    let value = resolve(&config.value)?;

    let mut columns = config.columns.clone();
    if columns.is_empty() {
        for cell in table.column_values(key) {
            if let Some(text) = key_text(cell) {
                if !columns.contains(&text) {
                    columns.push(text);
                }
            }
        }
    }
    let slots: HashMap<&str, usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i))
        .collect();

    let mut groups: Vec<Group> = Vec::new();
    let mut by_index: HashMap<Vec<String>, usize> = HashMap::new();
    let mut dropped_rows = 0;
    let mut ignored_keys = 0;

    for row in table.rows() {
        let cells: Vec<&Value> = index.iter().map(|&i| &row[i]).collect();
        let Some(key_name) = key_text(&row[key]) else {
            dropped_rows += 1;
            continue;
        };
        if cells.iter().any(|v| v.is_missing()) {
            dropped_rows += 1;
            continue;
        }
        let Some(&slot) = slots.get(key_name.as_str()) else {
            ignored_keys += 1;
            continue;
        };

        let group_key: Vec<String> = cells
            .iter()
            .map(|v| v.as_text().map(|t| t.into_owned()).unwrap_or_default())
            .collect();
        let at = *by_index.entry(group_key).or_insert_with(|| {
            groups.push(Group {
                index: cells.iter().map(|v| (*v).clone()).collect(),
                cells: vec![Value::Null; columns.len()],
            });
            groups.len() - 1
        });
        let cell = &mut groups[at].cells[slot];
        if cell.is_missing() && !row[value].is_missing() {
            *cell = row[value].clone();
        }
    }

    groups.sort_by(|a, b| compare_rows(&a.index, &b.index));

    let mut names: Vec<String> = index.iter().map(|&i| table.columns()[i].clone()).collect();
    names.extend(columns);
    let mut out = Table::new(Vec::new());
    for name in names {
        out.add_column(&name, Vec::new());
    }
    for group in groups {
        let mut row = group.index;
        row.extend(group.cells);
        out.push_row(row);
    }

    debug!(
        "Pivot dropped {} rows, ignored {} readings",
        dropped_rows, ignored_keys
    );
    info!(
        "Pivoted {} rows into {} rows x {} columns",
        table.row_count(),
        out.row_count(),
        out.column_count()
    );
    Ok(Pivoted {
        table: out,
        dropped_rows,
        ignored_keys,
    })
}

fn key_text(value: &Value) -> Option<String> {
    if value.is_missing() {
        return None;
    }
    value.as_text().map(|t| t.trim().to_string())
}

fn compare_rows(a: &[Value], b: &[Value]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| compare_cells(x, y))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

fn compare_cells(a: &Value, b: &Value) -> Ordering {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.as_text().cmp(&b.as_text()),
    }
}
