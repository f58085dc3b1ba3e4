use chrono::{Datelike, Timelike};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use unicode_normalization::UnicodeNormalization;

use crate::domain::text::{collapse_whitespace, fold_accents, title_case};
use crate::domain::{ColumnRef, Value};
use crate::error::NormalizationError;

/// One declarative cleanup step, as written in page configuration.
///
/// Unit steps are plain strings (`"trim"`); parameterised steps are single-key
/// tables (`{ replace = { pattern = "\\s+", with = " " } }`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    Trim,
    CollapseWhitespace,
    Lowercase,
    Uppercase,
    TitleCase,
    Unicode {
        form: String,
    },
    #[serde(alias = "unicode_fold")]
    FoldAccents,
    Replace {
        pattern: String,
        #[serde(default)]
        with: String,
    },
    /// Capture `group` of the first match, null without one. When `group`
    /// sits in an alternation branch that did not match, the first group
    /// that did is used.
    Extract {
        pattern: String,
        #[serde(default = "default_group")]
        group: usize,
    },
    Map {
        values: BTreeMap<String, Value>,
        #[serde(default)]
        case_insensitive: bool,
    },
    ToNumber,
    MaxInteger,
    NullIf {
        values: Vec<String>,
    },
    NullIfMatches {
        pattern: String,
    },
    FillMissing {
        value: Value,
    },
    FillFrom {
        column: ColumnRef,
        #[serde(default)]
        zero_as_missing: bool,
        /// Multiply numeric fills by this factor
        #[serde(default)]
        scale: Option<f64>,
    },
    DatePart {
        part: DateField,
        #[serde(default)]
        day_first: bool,
    },
}

fn default_group() -> usize {
    1
}

/// Calendar or clock component read by `date_part`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateField {
    Day,
    Month,
    Year,
    Hour,
    Minute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnicodeForm {
    Nfc,
    Nfd,
    Nfkc,
    Nfkd,
}

impl UnicodeForm {
    pub fn parse(raw: &str) -> Result<Self, NormalizationError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "nfc" => Ok(UnicodeForm::Nfc),
            "nfd" => Ok(UnicodeForm::Nfd),
            "nfkc" => Ok(UnicodeForm::Nfkc),
            "nfkd" => Ok(UnicodeForm::Nfkd),
            _ => Err(NormalizationError::UnknownUnicodeForm(raw.to_string())),
        }
    }

    fn apply(&self, s: &str) -> String {
        match self {
            UnicodeForm::Nfc => s.nfc().collect(),
            UnicodeForm::Nfd => s.nfd().collect(),
            UnicodeForm::Nfkc => s.nfkc().collect(),
            UnicodeForm::Nfkd => s.nfkd().collect(),
        }
    }
}

/// A [`Transform`] with its patterns compiled and its lookups indexed
#[derive(Debug, Clone)]
pub enum CompiledTransform {
    Text(TextStep),
    Extract { regex: Regex, group: usize },
    Map {
        values: HashMap<String, Value>,
        case_insensitive: bool,
    },
    ToNumber,
    MaxInteger,
    NullIf(HashSet<String>),
    NullIfMatches(Regex),
    FillMissing(Value),
    FillFrom {
        column: ColumnRef,
        zero_as_missing: bool,
        scale: Option<f64>,
    },
    DatePart {
        part: DateField,
        day_first: bool,
    },
}

/// Transforms that rewrite text cells and leave every other value alone
#[derive(Debug, Clone)]
pub enum TextStep {
    Trim,
    CollapseWhitespace,
    Lowercase,
    Uppercase,
    TitleCase,
    Unicode(UnicodeForm),
    FoldAccents,
    Replace { regex: Regex, with: String },
}

impl TextStep {
    fn apply(&self, s: &str) -> String {
        match self {
            TextStep::Trim => s.trim().to_string(),
            TextStep::CollapseWhitespace => collapse_whitespace(s),
            TextStep::Lowercase => s.to_lowercase(),
            TextStep::Uppercase => s.to_uppercase(),
            TextStep::TitleCase => title_case(s),
            TextStep::Unicode(form) => form.apply(s),
            TextStep::FoldAccents => fold_accents(s),
            TextStep::Replace { regex, with } => regex.replace_all(s, with.as_str()).into_owned(),
        }
    }
}

fn compile_regex(column: &str, pattern: &str) -> Result<Regex, NormalizationError> {
    Regex::new(pattern).map_err(|source| NormalizationError::InvalidPattern {
        column: column.to_string(),
        source,
    })
}

impl Transform {
    /// Validate and compile; `column` only labels errors
    pub fn compile(&self, column: &str) -> Result<CompiledTransform, NormalizationError> {
        Ok(match self {
            Transform::Trim => CompiledTransform::Text(TextStep::Trim),
            Transform::CollapseWhitespace => CompiledTransform::Text(TextStep::CollapseWhitespace),
            Transform::Lowercase => CompiledTransform::Text(TextStep::Lowercase),
            Transform::Uppercase => CompiledTransform::Text(TextStep::Uppercase),
            Transform::TitleCase => CompiledTransform::Text(TextStep::TitleCase),
            Transform::Unicode { form } => {
                CompiledTransform::Text(TextStep::Unicode(UnicodeForm::parse(form)?))
            }
            Transform::FoldAccents => CompiledTransform::Text(TextStep::FoldAccents),
            Transform::Replace { pattern, with } => {
                if pattern.is_empty() {
                    return Err(NormalizationError::EmptyRule(format!(
                        "replace on {column} has an empty pattern"
                    )));
                }
                CompiledTransform::Text(TextStep::Replace {
                    regex: compile_regex(column, pattern)?,
                    with: with.clone(),
                })
            }
            Transform::Extract { pattern, group } => {
                let regex = compile_regex(column, pattern)?;
                if *group >= regex.captures_len() {
                    return Err(NormalizationError::InvalidGroup {
                        column: column.to_string(),
                        group: *group,
                    });
                }
                CompiledTransform::Extract {
                    regex,
                    group: *group,
                }
            }
            Transform::Map {
                values,
                case_insensitive,
            } => {
                if values.is_empty() {
                    return Err(NormalizationError::EmptyRule(format!(
                        "map on {column} has no entries"
                    )));
                }
                let values = values
                    .iter()
                    .map(|(k, v)| (map_key(k, *case_insensitive), v.clone()))
                    .collect();
                CompiledTransform::Map {
                    values,
                    case_insensitive: *case_insensitive,
                }
            }
            Transform::ToNumber => CompiledTransform::ToNumber,
            Transform::MaxInteger => CompiledTransform::MaxInteger,
            Transform::NullIf { values } => {
                if values.is_empty() {
                    return Err(NormalizationError::EmptyRule(format!(
                        "null_if on {column} has no values"
                    )));
                }
                CompiledTransform::NullIf(values.iter().map(|v| v.trim().to_string()).collect())
            }
            Transform::NullIfMatches { pattern } => {
                CompiledTransform::NullIfMatches(compile_regex(column, pattern)?)
            }
            Transform::FillMissing { value } => CompiledTransform::FillMissing(value.clone()),
            Transform::FillFrom {
                column: source,
                zero_as_missing,
                scale,
            } => {
                if source.is_empty() {
                    return Err(NormalizationError::EmptyRule(format!(
                        "fill_from on {column} names no source column"
                    )));
                }
                if scale.is_some_and(|f| !f.is_finite()) {
                    return Err(NormalizationError::InvalidParameter {
                        column: column.to_string(),
                        message: "fill_from scale must be finite".to_string(),
                    });
                }
                CompiledTransform::FillFrom {
                    column: source.clone(),
                    zero_as_missing: *zero_as_missing,
                    scale: *scale,
                }
            }
            Transform::DatePart { part, day_first } => CompiledTransform::DatePart {
                part: *part,
                day_first: *day_first,
            },
        })
    }
}

fn map_key(s: &str, case_insensitive: bool) -> String {
    let s = s.trim();
    if case_insensitive {
        s.to_lowercase()
    } else {
        s.to_string()
    }
}

/// Text form that numeric-aware transforms read: text and numbers only
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s.clone()),
        Value::Number(_) => value.as_text().map(|t| t.into_owned()),
        _ => None,
    }
}

fn is_zero(value: &Value) -> bool {
    value.as_number() == Some(0.0)
}

impl CompiledTransform {
    /// Rewrite one cell. `source` is the same-row cell of a `fill_from`
    /// source column, when that column exists.
    pub fn apply(&self, value: Value, source: Option<&Value>) -> Value {
        match self {
            CompiledTransform::Text(step) => match value {
                Value::Text(s) => Value::Text(step.apply(&s)),
                other => other,
            },
            CompiledTransform::Extract { regex, group } => match scalar_text(&value) {
                Some(text) => regex
                    .captures(&text)
                    .and_then(|caps| {
                        caps.get(*group)
                            .or_else(|| (1..caps.len()).find_map(|i| caps.get(i)))
                    })
                    .map(|m| Value::Text(m.as_str().to_string()))
                    .unwrap_or(Value::Null),
                None => value,
            },
            CompiledTransform::Map {
                values,
                case_insensitive,
            } => match scalar_text(&value) {
                Some(text) => values
                    .get(&map_key(&text, *case_insensitive))
                    .cloned()
                    .unwrap_or(value),
                None => value,
            },
            CompiledTransform::ToNumber => {
                if let Value::Text(_) = value {
                    value.as_number().map(Value::Number).unwrap_or(Value::Null)
                } else {
                    value
                }
            }
            CompiledTransform::MaxInteger => {
                if matches!(value, Value::Number(n) if n.fract() == 0.0) {
                    return value;
                }
                match scalar_text(&value) {
                    Some(text) => max_integer(&text).map(Value::Number).unwrap_or(Value::Null),
                    None => value,
                }
            }
            CompiledTransform::NullIf(values) => match scalar_text(&value) {
                Some(text) if values.contains(text.trim()) => Value::Null,
                _ => value,
            },
            CompiledTransform::NullIfMatches(regex) => match scalar_text(&value) {
                Some(text) if regex.is_match(&text) => Value::Null,
                _ => value,
            },
            CompiledTransform::FillMissing(fill) => {
                if value.is_missing() {
                    fill.clone()
                } else {
                    value
                }
            }
            CompiledTransform::FillFrom {
                zero_as_missing,
                scale,
                ..
            } => {
                let absent =
                    |v: &Value| v.is_missing() || (*zero_as_missing && is_zero(v));
                if !absent(&value) {
                    return value;
                }
                match source {
                    Some(src) if !absent(src) => match (scale, src.as_number()) {
                        (Some(factor), Some(n)) => Value::Number(n * factor),
                        (Some(_), None) => Value::Null,
                        (None, _) => src.clone(),
                    },
                    _ if *zero_as_missing && is_zero(&value) => Value::Null,
                    _ => value,
                }
            }
            CompiledTransform::DatePart { part, day_first } => {
                if value.is_missing() {
                    return Value::Null;
                }
                match value.as_datetime(*day_first) {
                    Some(dt) => Value::Number(match part {
                        DateField::Day => dt.day() as f64,
                        DateField::Month => dt.month() as f64,
                        DateField::Year => dt.year() as f64,
                        DateField::Hour => dt.hour() as f64,
                        DateField::Minute => dt.minute() as f64,
                    }),
                    None => Value::Null,
                }
            }
        }
    }
}

/// Largest run of ASCII digits in `s`, as a number. Runs too long to be
/// finite are ignored.
fn max_integer(s: &str) -> Option<f64> {
    s.split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty())
        .filter_map(|run| run.parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .fold(None, |best: Option<f64>, n| Some(best.map_or(n, |b| b.max(n))))
}
