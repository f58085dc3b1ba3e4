//! Ingestion: turns uploaded bytes (delimited text or spreadsheet) into a [`Table`].

pub mod delimited;
pub mod spreadsheet;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

use crate::domain::{Table, Value};
use crate::error::IngestError;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

/// Physical family of an input or output file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    #[serde(alias = "csv", alias = "txt", alias = "tsv")]
    Delimited,
    #[serde(alias = "xlsx", alias = "xls", alias = "xlsm", alias = "xlsb", alias = "ods")]
    Spreadsheet,
}

impl InputFormat {
    pub fn from_extension(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "txt" | "tsv" => Some(InputFormat::Delimited),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Some(InputFormat::Spreadsheet),
            _ => None,
        }
    }

    /// Sniff by magic bytes: ZIP and OLE containers are spreadsheets
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) {
            InputFormat::Spreadsheet
        } else {
            InputFormat::Delimited
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    #[serde(alias = "utf-8")]
    Utf8,
    #[serde(alias = "latin-1", alias = "iso-8859-1")]
    Latin1,
}

/// Ingestion options of a page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct IngestConfig {
    /// Declared input format; wins over extension and sniffing
    pub format: Option<InputFormat>,
    /// Declared delimiter for text inputs; sniffed when absent
    pub delimiter: Option<char>,
    pub encoding: Encoding,
    /// Worksheet to read; the first one when absent
    pub sheet: Option<String>,
    pub infer_types: bool,
    /// Columns the page expects; differences are reported, never fatal
    pub expected_columns: Vec<String>,
    /// Header for inputs that have none; every row is then data
    pub columns: Vec<String>,
    /// Lines of delimited inputs matching this pattern are dropped before parsing
    pub skip_lines: Option<String>,
}

impl IngestConfig {
    pub fn skip_pattern(&self) -> Result<Option<Regex>, IngestError> {
        match &self.skip_lines {
            Some(pattern) => Ok(Some(Regex::new(pattern)?)),
            None => Ok(None),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            format: None,
            delimiter: None,
            encoding: Encoding::Utf8,
            sheet: None,
            infer_types: true,
            expected_columns: Vec::new(),
            columns: Vec::new(),
            skip_lines: None,
        }
    }
}

/// One uploaded file
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, IngestError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, bytes })
    }

    /// Hex SHA-256 of the file contents
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

/// Schema-mismatch conditions found while ingesting
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaReport {
    pub missing_columns: Vec<String>,
    pub unexpected_columns: Vec<String>,
    /// Rows shorter than the header, padded with nulls
    pub padded_rows: usize,
    /// Rows longer than the header, extra cells dropped
    pub truncated_rows: usize,
}

impl SchemaReport {
    pub fn is_clean(&self) -> bool {
        self.missing_columns.is_empty()
            && self.unexpected_columns.is_empty()
            && self.padded_rows == 0
            && self.truncated_rows == 0
    }

    fn absorb(&mut self, other: SchemaReport) {
        self.padded_rows += other.padded_rows;
        self.truncated_rows += other.truncated_rows;
    }
}

/// Where an ingested table came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    pub name: String,
    pub format: InputFormat,
    pub bytes: usize,
    pub rows: usize,
    pub sha256: String,
}

#[derive(Debug, Clone)]
pub struct Ingested {
    pub table: Table,
    pub schema: SchemaReport,
    pub sources: Vec<SourceInfo>,
}

pub struct Ingestor {
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Parse a single input file
    #[instrument(skip(self, input), fields(file = %input.name, bytes = input.bytes.len()))]
    pub fn ingest(&self, input: &InputFile) -> Result<Ingested, IngestError> {
        let format = self.resolve_format(input);
        debug!("Reading {} as {:?}", input.name, format);

        let raw = match format {
            InputFormat::Delimited => self.read_delimited(&input.bytes)?,
            InputFormat::Spreadsheet => {
                spreadsheet::read_rows(&input.bytes, self.config.sheet.as_deref())?
            }
        };

        let (table, mut schema) = self.build_table(raw)?;
        self.check_expected(&table, &mut schema);

        info!(
            "Ingested {} rows x {} columns from {}",
            table.row_count(),
            table.column_count(),
            input.name
        );

        let source = SourceInfo {
            name: input.name.clone(),
            format,
            bytes: input.bytes.len(),
            rows: table.row_count(),
            sha256: input.fingerprint(),
        };
        Ok(Ingested {
            table,
            schema,
            sources: vec![source],
        })
    }

    /// Parse several files and concatenate them; columns are the union in
    /// first-seen order
    pub fn ingest_many(&self, inputs: &[InputFile]) -> Result<Ingested, IngestError> {
        let (first, rest) = inputs.split_first().ok_or(IngestError::NoInputs)?;

        let mut merged = self.ingest(first)?;
        for input in rest {
            let next = self.ingest(input)?;
            merged.table.append(next.table);
            merged.schema.absorb(next.schema);
            merged.sources.extend(next.sources);
        }

        if inputs.len() > 1 {
            // re-check against the merged header
            merged.schema.missing_columns.clear();
            merged.schema.unexpected_columns.clear();
            let mut schema = std::mem::take(&mut merged.schema);
            self.check_expected(&merged.table, &mut schema);
            merged.schema = schema;
            info!(
                "Merged {} files into {} rows x {} columns",
                inputs.len(),
                merged.table.row_count(),
                merged.table.column_count()
            );
        }
        Ok(merged)
    }

    fn resolve_format(&self, input: &InputFile) -> InputFormat {
        self.config
            .format
            .or_else(|| InputFormat::from_extension(&input.name))
            .unwrap_or_else(|| InputFormat::sniff(&input.bytes))
    }

    fn read_delimited(&self, bytes: &[u8]) -> Result<Vec<Vec<Value>>, IngestError> {
        let mut text = delimited::decode(bytes, self.config.encoding)?;
        if let Some(skip) = self.config.skip_pattern()? {
            let before = text.lines().count();
            text = text
                .lines()
                .filter(|line| !skip.is_match(line))
                .collect::<Vec<_>>()
                .join("\n");
            debug!("Skipped {} lines", before - text.lines().count());
        }
        if text.trim().is_empty() {
            return Err(IngestError::Empty);
        }

        let delimiter = match self.config.delimiter {
            Some(c) if c.is_ascii() => c as u8,
            Some(c) => {
                warn!("Ignoring non-ASCII delimiter {:?}, sniffing instead", c);
                delimited::sniff_delimiter(text.as_bytes())
            }
            None => delimited::sniff_delimiter(text.as_bytes()),
        };
        debug!("Using delimiter {:?}", delimiter as char);

        let infer = self.config.infer_types;
        let records = delimited::read_records(&text, delimiter)?;
        Ok(records
            .into_iter()
            .map(|record| {
                record
                    .into_iter()
                    .map(|cell| text_cell(&cell, infer))
                    .collect()
            })
            .collect())
    }

    fn build_table(&self, raw: Vec<Vec<Value>>) -> Result<(Table, SchemaReport), IngestError> {
        let mut rows = raw.into_iter().peekable();
        let header = if self.config.columns.is_empty() {
            let header_row = rows.next().ok_or(IngestError::Empty)?;
            if header_row.iter().all(Value::is_missing) {
                return Err(IngestError::Empty);
            }
            clean_headers(
                header_row
                    .iter()
                    .map(|v| v.as_text().map(|t| t.into_owned()).unwrap_or_default()),
            )
        } else {
            if rows.peek().is_none() {
                return Err(IngestError::Empty);
            }
            clean_headers(self.config.columns.iter().cloned())
        };
        let width = header.len();
        let mut table = Table::new(header);
        let mut schema = SchemaReport::default();

        for row in rows {
            // spreadsheet ranges keep trailing blank lines
            if row.iter().all(Value::is_null) {
                continue;
            }
            let row = self.retype(row);
            if row.len() < width {
                schema.padded_rows += 1;
            } else if row.len() > width {
                if row[width..].iter().all(Value::is_missing) {
                    table.push_row(row);
                    continue;
                }
                schema.truncated_rows += 1;
            }
            table.push_row(row);
        }

        if schema.padded_rows + schema.truncated_rows > 0 {
            warn!(
                "Row width mismatch: {} padded, {} truncated",
                schema.padded_rows, schema.truncated_rows
            );
        }
        Ok((table, schema))
    }

    /// Spreadsheet text cells go through the same inference as CSV cells
    fn retype(&self, row: Vec<Value>) -> Vec<Value> {
        if !self.config.infer_types {
            return row;
        }
        row.into_iter()
            .map(|v| match v {
                Value::Text(s) => Value::infer(&s),
                other => other,
            })
            .collect()
    }

    fn check_expected(&self, table: &Table, schema: &mut SchemaReport) {
        let expected = &self.config.expected_columns;
        if expected.is_empty() {
            return;
        }
        schema.missing_columns = expected
            .iter()
            .filter(|e| !table.columns().iter().any(|c| c == *e))
            .cloned()
            .collect();
        schema.unexpected_columns = table
            .columns()
            .iter()
            .filter(|c| !expected.contains(c))
            .cloned()
            .collect();
        if !schema.missing_columns.is_empty() {
            warn!("Expected columns missing: {:?}", schema.missing_columns);
        }
    }
}

fn text_cell(cell: &str, infer: bool) -> Value {
    if infer {
        Value::infer(cell)
    } else if cell.is_empty() {
        Value::Null
    } else {
        Value::Text(cell.to_string())
    }
}

/// Trim headers, name blank ones `Unnamed: {i}` and suffix duplicates `.1`, `.2`, ...
pub fn clean_headers(raw: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for (i, name) in raw.into_iter().enumerate() {
        let base = match name.trim() {
            "" => format!("Unnamed: {i}"),
            trimmed => trimmed.to_string(),
        };
        let mut candidate = base.clone();
        let mut n = 0;
        while seen.contains(&candidate) {
            n += 1;
            candidate = format!("{base}.{n}");
        }
        seen.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv(name: &str, body: &str) -> InputFile {
        InputFile::new(name, body.as_bytes().to_vec())
    }

    #[test]
    fn test_ingest_semicolon_csv() {
        let ingestor = Ingestor::new(IngestConfig::default());
        let out = ingestor
            .ingest(&csv("qaqc.csv", "Date;Density;Borehole\n2024-01-05;1.2;01A_402\n"))
            .unwrap();
        assert_eq!(out.table.columns(), &["Date", "Density", "Borehole"]);
        assert_eq!(out.table.get(0, 1), Some(&Value::Number(1.2)));
        assert_eq!(out.table.get(0, 2), Some(&Value::text("01A_402")));
        assert!(out.schema.is_clean());
    }

    #[test]
    fn test_empty_input() {
        let ingestor = Ingestor::new(IngestConfig::default());
        assert!(matches!(ingestor.ingest(&csv("a.csv", "")), Err(IngestError::Empty)));
        assert!(matches!(ingestor.ingest(&csv("a.csv", " \n\n ")), Err(IngestError::Empty)));
    }

    #[test]
    fn test_header_only_is_not_empty() {
        let ingestor = Ingestor::new(IngestConfig::default());
        let out = ingestor.ingest(&csv("a.csv", "a,b\n")).unwrap();
        assert_eq!(out.table.column_count(), 2);
        assert_eq!(out.table.row_count(), 0);
    }

    #[test]
    fn test_ragged_rows_reported() {
        let ingestor = Ingestor::new(IngestConfig::default());
        let out = ingestor
            .ingest(&csv("a.csv", "a,b,c\n1,2\n1,2,3,4\n1,2,3\n"))
            .unwrap();
        assert_eq!(out.table.row_count(), 3);
        assert_eq!(out.schema.padded_rows, 1);
        assert_eq!(out.schema.truncated_rows, 1);
        assert_eq!(out.table.get(0, 2), Some(&Value::Null));
    }

    #[test]
    fn test_expected_columns() {
        let ingestor = Ingestor::new(IngestConfig {
            expected_columns: vec!["Date".into(), "Density".into()],
            ..Default::default()
        });
        let out = ingestor.ingest(&csv("a.csv", "Date,Extra\n2024-01-01,x\n")).unwrap();
        assert_eq!(out.schema.missing_columns, vec!["Density"]);
        assert_eq!(out.schema.unexpected_columns, vec!["Extra"]);
    }

    #[test]
    fn test_headerless_input_with_skipped_lines() {
        let ingestor = Ingestor::new(IngestConfig {
            columns: vec!["Source".into(), "Code".into(), "Timestamp".into(), "Value".into()],
            skip_lines: Some("(?i)^data source".into()),
            ..Default::default()
        });
        let out = ingestor
            .ingest(&csv(
                "frag.txt",
                "Data Source: shovel feed\nShovel65,P80,24/07/2025 0:01,5.64\nShovel65,P50,24/07/2025 0:01,2.1\n",
            ))
            .unwrap();
        assert_eq!(out.table.columns(), &["Source", "Code", "Timestamp", "Value"]);
        assert_eq!(out.table.row_count(), 2);
        assert_eq!(out.table.get(0, 1), Some(&Value::text("P80")));
        assert_eq!(out.table.get(1, 3), Some(&Value::Number(2.1)));

        let only_skipped = ingestor.ingest(&csv("frag.txt", "data source\n"));
        assert!(matches!(only_skipped, Err(IngestError::Empty)));

        let bad = Ingestor::new(IngestConfig {
            skip_lines: Some("(".into()),
            ..Default::default()
        });
        assert!(matches!(
            bad.ingest(&csv("a.csv", "a\n1\n")),
            Err(IngestError::SkipPattern(_))
        ));
    }

    #[test]
    fn test_clean_headers() {
        let headers = clean_headers(
            [" Date ", "", "Date", "Date"].iter().map(|s| s.to_string()),
        );
        assert_eq!(headers, vec!["Date", "Unnamed: 1", "Date.1", "Date.2"]);
    }

    #[test]
    fn test_infer_types_off_keeps_text() {
        let ingestor = Ingestor::new(IngestConfig {
            infer_types: false,
            ..Default::default()
        });
        let out = ingestor.ingest(&csv("a.csv", "Modelo,x\n053,\n")).unwrap();
        assert_eq!(out.table.get(0, 0), Some(&Value::text("053")));
        assert_eq!(out.table.get(0, 1), Some(&Value::Null));
    }

    #[test]
    fn test_ingest_many_union() {
        let ingestor = Ingestor::new(IngestConfig::default());
        let out = ingestor
            .ingest_many(&[csv("a.csv", "a,b\n1,2\n"), csv("b.csv", "b;c\n3;4\n")])
            .unwrap();
        assert_eq!(out.table.columns(), &["a", "b", "c"]);
        assert_eq!(out.table.row_count(), 2);
        assert_eq!(out.table.get(1, 0), Some(&Value::Null));
        assert_eq!(out.sources.len(), 2);
        assert!(matches!(ingestor.ingest_many(&[]), Err(IngestError::NoInputs)));
    }

    #[test]
    fn test_format_resolution() {
        assert_eq!(InputFormat::from_extension("Book1.XLSX"), Some(InputFormat::Spreadsheet));
        assert_eq!(InputFormat::from_extension("data.csv"), Some(InputFormat::Delimited));
        assert_eq!(InputFormat::from_extension("upload"), None);
        assert_eq!(InputFormat::sniff(b"PK\x03\x04rest"), InputFormat::Spreadsheet);
        assert_eq!(InputFormat::sniff(b"a,b"), InputFormat::Delimited);
    }
}
