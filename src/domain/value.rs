use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Cow;
use std::fmt;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DATETIME_INPUT_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const DAY_FIRST_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d.%m.%Y %H:%M",
];
const MONTH_FIRST_FORMATS: &[&str] = &["%m/%d/%Y %H:%M:%S", "%m/%d/%Y %H:%M"];
const DAY_FIRST_DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];
const MONTH_FIRST_DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%m-%d-%Y"];

/// A single table cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Text(String),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Type a raw text cell the way the ingestor does: empty cells are null,
    /// numbers, booleans and ISO dates are recognised, everything else stays text.
    pub fn infer(raw: &str) -> Self {
        if raw.is_empty() {
            return Value::Null;
        }
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Text(raw.to_string());
        }
        if let Some(n) = parse_number(trimmed) {
            return Value::Number(n);
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Value::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Value::Bool(false);
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
            return Value::Date(date);
        }
        if let Some(dt) = parse_datetime(trimmed) {
            return Value::DateTime(dt);
        }
        Value::Text(raw.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null or text made only of whitespace
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Canonical text form, `None` for null
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Number(n) => Some(Cow::Owned(format_number(*n))),
            Value::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
            Value::Date(d) => Some(Cow::Owned(d.format(DATE_FORMAT).to_string())),
            Value::DateTime(dt) => Some(Cow::Owned(dt.format(DATETIME_FORMAT).to_string())),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => parse_number(s.trim()),
            _ => None,
        }
    }

    /// Calendar date of a typed date/date-time cell, or of text holding one
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date()),
            Value::Text(s) => {
                let s = s.trim();
                NaiveDate::parse_from_str(s, DATE_FORMAT)
                    .or_else(|_| NaiveDate::parse_from_str(s, "%d/%m/%Y"))
                    .or_else(|_| NaiveDate::parse_from_str(s, "%d-%m-%Y"))
                    .ok()
                    .or_else(|| parse_datetime(s).map(|dt| dt.date()))
            }
            _ => None,
        }
    }
}

impl Value {
    /// Date and time of a typed date/date-time cell, or of text holding one.
    /// ISO forms are always accepted; `day_first` decides how `01/02/2024`
    /// reads. Bare dates are taken at midnight.
    pub fn as_datetime(&self, day_first: bool) -> Option<NaiveDateTime> {
        match self {
            Value::Date(d) => d.and_hms_opt(0, 0, 0),
            Value::DateTime(dt) => Some(*dt),
            Value::Text(s) => {
                let s = s.trim();
                let (with_time, date_only) = if day_first {
                    (DAY_FIRST_FORMATS, DAY_FIRST_DATE_FORMATS)
                } else {
                    (MONTH_FIRST_FORMATS, MONTH_FIRST_DATE_FORMATS)
                };
                parse_datetime(s)
                    .or_else(|| {
                        NaiveDate::parse_from_str(s, DATE_FORMAT)
                            .ok()
                            .and_then(|d| d.and_hms_opt(0, 0, 0))
                    })
                    .or_else(|| {
                        with_time
                            .iter()
                            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                    })
                    .or_else(|| {
                        date_only
                            .iter()
                            .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                            .and_then(|d| d.and_hms_opt(0, 0, 0))
                    })
            }
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => f.write_str(&text),
            None => Ok(()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Literal cell values written in page configuration files
#[derive(Deserialize)]
#[serde(untagged)]
enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Literal::deserialize(deserializer)? {
            Literal::Bool(b) => Value::Bool(b),
            Literal::Int(i) => Value::Number(i as f64),
            Literal::Float(f) => Value::Number(f),
            Literal::Text(s) => Value::Text(s),
        })
    }
}

/// Integral values print without a fractional part
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn parse_number(s: &str) -> Option<f64> {
    // Rust accepts "inf"/"NaN" spellings that spreadsheets never mean as numbers
    if !s.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    DATETIME_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_types() {
        assert_eq!(Value::infer(""), Value::Null);
        assert_eq!(Value::infer("12"), Value::Number(12.0));
        assert_eq!(Value::infer(" 3.5 "), Value::Number(3.5));
        assert_eq!(Value::infer("TRUE"), Value::Bool(true));
        assert_eq!(
            Value::infer("2024-01-05"),
            Value::Date(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())
        );
        assert_eq!(Value::infer("2024-13-01"), Value::text("2024-13-01"));
        assert_eq!(Value::infer("NaN"), Value::text("NaN"));
        assert_eq!(Value::infer("SÃO PAULO "), Value::text("SÃO PAULO "));
    }

    #[test]
    fn test_text_form_round_trips_through_inference() {
        let values = vec![
            Value::Number(402.0),
            Value::Number(0.1),
            Value::Number(-7.25),
            Value::Bool(false),
            Value::Date(NaiveDate::from_ymd_opt(2023, 12, 25).unwrap()),
            Value::infer("2023-12-25 20:00:00"),
        ];
        for value in values {
            let text = value.as_text().unwrap().into_owned();
            assert_eq!(Value::infer(&text), value, "round trip of {text}");
        }
    }

    #[test]
    fn test_as_datetime_day_first() {
        use chrono::{Datelike, Timelike};

        let dt = Value::text("24/07/2025 0:01").as_datetime(true).unwrap();
        assert_eq!((dt.day(), dt.month(), dt.year()), (24, 7, 2025));
        assert_eq!((dt.hour(), dt.minute()), (0, 1));

        let ambiguous = Value::text("01/02/2024");
        assert_eq!(ambiguous.as_datetime(true).unwrap().month(), 2);
        assert_eq!(ambiguous.as_datetime(false).unwrap().month(), 1);

        let iso = Value::infer("2024-03-09");
        assert_eq!(iso.as_datetime(true).unwrap().day(), 9);
        assert_eq!(Value::text("mañana").as_datetime(true), None);
        assert_eq!(Value::Number(45000.0).as_datetime(true), None);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(53.0), "53");
        assert_eq!(format_number(2.5), "2.5");
    }

    #[test]
    fn test_missing() {
        assert!(Value::Null.is_missing());
        assert!(Value::text("  ").is_missing());
        assert!(!Value::Number(0.0).is_missing());
    }
}
