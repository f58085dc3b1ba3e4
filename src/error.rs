use thiserror::Error;

use crate::pipeline::cancel::Cancelled;
use crate::pipeline::Stage;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("input contains no header row")]
    Empty,

    #[error("input is not valid UTF-8 (byte offset {offset}); declare encoding = \"latin1\" for legacy exports")]
    Encoding { offset: usize },

    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("spreadsheet could not be read: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("worksheet not found: {0}")]
    MissingSheet(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no input files supplied")]
    NoInputs,

    #[error("invalid skip_lines pattern: {0}")]
    SkipPattern(#[from] regex::Error),
}

#[derive(Error, Debug)]
pub enum NormalizationError {
    #[error("invalid regex in rule for column {column}: {source}")]
    InvalidPattern {
        column: String,
        #[source]
        source: regex::Error,
    },

    #[error("empty normalization rule: {0}")]
    EmptyRule(String),

    #[error("capture group {group} not present in pattern for column {column}")]
    InvalidGroup { column: String, group: usize },

    #[error("unknown Unicode normalization form: {0} (expected nfc, nfd, nfkc or nfkd)")]
    UnknownUnicodeForm(String),

    #[error("invalid parameter in rule for column {column}: {message}")]
    InvalidParameter { column: String, message: String },

    #[error("pivot column not found: {0}")]
    MissingPivotColumn(String),
}

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("reference vocabulary is empty")]
    EmptyVocabulary,

    #[error("match threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("matching configured without columns")]
    NoColumns,

    #[error("vocabulary file could not be read: {0}")]
    VocabularyFile(String),
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("validation rule without an id")]
    EmptyRuleId,

    #[error("duplicate validation rule id: {0}")]
    DuplicateRuleId(String),

    #[error("validation rule {0} names no columns")]
    NoColumns(String),

    #[error("invalid regex in validation rule {rule}: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("validation rule {0} has an empty allowed set")]
    EmptyAllowedSet(String),

    #[error("validation rule {rule} has min {min} greater than max {max}")]
    InvalidRange { rule: String, min: f64, max: f64 },

    #[error("validation rule {rule} has an invalid date format: {format}")]
    InvalidDateFormat { rule: String, format: String },
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("delimiter must be a single ASCII character, got {0:?}")]
    InvalidDelimiter(String),

    #[error("CSV writing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("spreadsheet writing failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("too many columns for a worksheet: {0}")]
    TooManyColumns(usize),

    #[error("too many rows for a worksheet: {0}")]
    TooManyRows(usize),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration could not be read from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML deserialization failed: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown page: {0}")]
    UnknownPage(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure of one pipeline stage
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("cancelled")]
    Cancelled,

    #[error("pipeline run already executed")]
    AlreadyExecuted,
}

impl From<Cancelled> for StageError {
    fn from(_: Cancelled) -> Self {
        StageError::Cancelled
    }
}

/// A pipeline failure with the stage it originated in
#[derive(Error, Debug)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: StageError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: impl Into<StageError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.source, StageError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
