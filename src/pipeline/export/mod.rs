//! Exporter: serializes a (possibly annotated) table for download.

pub mod delimited;
pub mod spreadsheet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};

use crate::constants::{DEFAULT_FILE_BASE, DEFAULT_SHEET_NAME, DEFAULT_VOCABULARY_FILE_BASE};
use crate::domain::{ColumnRef, Table};
use crate::error::ExportError;
use crate::pipeline::report::ExportSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Xlsx,
    /// Tab-separated text
    Txt,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Xlsx => "xlsx",
            OutputFormat::Txt => "txt",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "xlsx" => Ok(OutputFormat::Xlsx),
            "txt" => Ok(OutputFormat::Txt),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Which rows reach the exported file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowFilter {
    #[default]
    All,
    ExcludeRejected,
}

/// `[export]` section of a page, and each `[[extra_export]]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ExportConfig {
    /// `csv`, `xlsx` or `txt`; checked when the exporter is built
    pub format: String,
    /// Field separator for `csv`; `txt` always uses tabs
    pub delimiter: char,
    pub file_base: String,
    /// Column whose date range becomes the `_ddmmyy_ddmmyy` file suffix
    pub date_column: Option<ColumnRef>,
    /// Columns to keep, in order; empty keeps all
    pub columns: Vec<String>,
    pub rows: RowFilter,
    pub sheet_name: String,
    /// Output header for selected columns, keyed by column reference
    pub rename: BTreeMap<String, String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: "csv".to_string(),
            delimiter: ',',
            file_base: DEFAULT_FILE_BASE.to_string(),
            date_column: None,
            columns: Vec::new(),
            rows: RowFilter::All,
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            rename: BTreeMap::new(),
        }
    }
}

/// `[vocabulary_export]` section: the reference vocabulary plus the codes
/// handed out during the run, written only when a run adds codes
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct VocabularyExportConfig {
    pub format: String,
    pub file_base: String,
    pub name_header: String,
    pub code_header: String,
    pub sheet_name: String,
}

impl Default for VocabularyExportConfig {
    fn default() -> Self {
        Self {
            format: "xlsx".to_string(),
            file_base: DEFAULT_VOCABULARY_FILE_BASE.to_string(),
            name_header: "Nombre".to_string(),
            code_header: "Codigo".to_string(),
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
        }
    }
}

impl VocabularyExportConfig {
    /// Export settings for the name/code table
    pub fn export_config(&self) -> ExportConfig {
        ExportConfig {
            format: self.format.clone(),
            file_base: self.file_base.clone(),
            sheet_name: self.sheet_name.clone(),
            ..Default::default()
        }
    }
}

/// A serialized table ready for download
#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub file_name: String,
    pub format: OutputFormat,
    pub bytes: Vec<u8>,
    pub rows: usize,
    pub columns: usize,
    /// Requested columns the table does not have
    pub skipped_columns: Vec<String>,
}

impl ExportedFile {
    pub fn summary(&self) -> ExportSummary {
        ExportSummary {
            file_name: self.file_name.clone(),
            format: self.format.to_string(),
            rows: self.rows,
            columns: self.columns,
            bytes: self.bytes.len(),
        }
    }
}

pub struct Exporter {
    config: ExportConfig,
    format: OutputFormat,
    delimiter: u8,
}

impl Exporter {
    pub fn new(config: ExportConfig) -> Result<Self, ExportError> {
        let format = config.format.parse::<OutputFormat>()?;
        if !config.delimiter.is_ascii() {
            return Err(ExportError::InvalidDelimiter(config.delimiter.to_string()));
        }
        let delimiter = config.delimiter as u8;
        Ok(Self {
            config,
            format,
            delimiter,
        })
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Serialize `table`. `rejected` marks rows to drop under `exclude_rejected`;
    /// the input table is never modified.
    #[instrument(skip_all, fields(format = %self.format, rows = table.row_count()))]
    pub fn export(&self, table: &Table, rejected: &[bool]) -> Result<ExportedFile, ExportError> {
        let (columns, skipped_columns) = self.select_columns(table);
        let exclude = self.config.rows == RowFilter::ExcludeRejected;
        let mut selected = table.select(&columns, |row| {
            !(exclude && rejected.get(row).copied().unwrap_or(false))
        });
        self.rename_columns(&mut selected);
        debug!(
            "Exporting {} of {} rows, {} columns",
            selected.row_count(),
            table.row_count(),
            selected.column_count()
        );

        let bytes = match self.format {
            OutputFormat::Csv => delimited::write(&selected, self.delimiter)?,
            OutputFormat::Xlsx => spreadsheet::write(&selected, &self.config.sheet_name)?,
            OutputFormat::Txt => delimited::write(&selected, b'\t')?,
        };

        // date range comes from the exported rows of the full table
        let suffix = self
            .config
            .date_column
            .as_ref()
            .and_then(|col| col.resolve(table))
            .map(|idx| {
                let dates = table
                    .column_values(idx)
                    .enumerate()
                    .filter(|(row, _)| !(exclude && rejected.get(*row).copied().unwrap_or(false)))
                    .filter_map(|(_, v)| v.as_date());
                date_range_suffix(dates)
            })
            .unwrap_or_default();
        let file_name = format!(
            "{}{}.{}",
            self.config.file_base,
            suffix,
            self.format.extension()
        );

        info!("Exported {} ({} bytes)", file_name, bytes.len());
        Ok(ExportedFile {
            file_name,
            format: self.format,
            rows: selected.row_count(),
            columns: selected.column_count(),
            bytes,
            skipped_columns,
        })
    }

    fn rename_columns(&self, selected: &mut Table) {
        for (from, to) in &self.config.rename {
            match ColumnRef::parse(from).resolve(selected) {
                Some(idx) => {
                    selected.rename_column(idx, to);
                }
                None => warn!("Rename source {} not among exported columns", from),
            }
        }
    }

    fn select_columns(&self, table: &Table) -> (Vec<usize>, Vec<String>) {
        if self.config.columns.is_empty() {
            return ((0..table.column_count()).collect(), Vec::new());
        }
        let mut picked = Vec::new();
        let mut skipped = Vec::new();
        for name in &self.config.columns {
            match ColumnRef::parse(name).resolve(table) {
                Some(idx) if !picked.contains(&idx) => picked.push(idx),
                Some(_) => {}
                None => skipped.push(name.clone()),
            }
        }
        (picked, skipped)
    }
}

/// `_{min:%d%m%y}_{max:%d%m%y}` over the given dates, empty when there are none
pub fn date_range_suffix(dates: impl IntoIterator<Item = NaiveDate>) -> String {
    let mut range: Option<(NaiveDate, NaiveDate)> = None;
    for d in dates {
        range = Some(match range {
            None => (d, d),
            Some((lo, hi)) => (lo.min(d), hi.max(d)),
        });
    }
    match range {
        Some((lo, hi)) => format!("_{}_{}", lo.format("%d%m%y"), hi.format("%d%m%y")),
        None => String::new(),
    }
}
