use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;

use crate::domain::Value;
use crate::error::ValidationError;

/// Predicate of a validation rule, as written in page configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    Required,
    Numeric,
    Date {
        #[serde(default = "default_date_format")]
        format: String,
    },
    Allowed {
        values: Vec<Value>,
        #[serde(default)]
        case_insensitive: bool,
    },
    Range {
        min: Option<f64>,
        max: Option<f64>,
        #[serde(default)]
        exclusive_min: bool,
        #[serde(default)]
        exclusive_max: bool,
    },
    Matches {
        pattern: String,
    },
    NotMatches {
        pattern: String,
    },
    AnyPresent,
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

impl Check {
    pub fn default_reason(&self) -> &'static str {
        match self {
            Check::Required => "missing value",
            Check::Numeric => "not a number",
            Check::Date { .. } => "invalid date",
            Check::Allowed { .. } => "value not allowed",
            Check::Range { .. } => "out of range",
            Check::Matches { .. } => "does not match pattern",
            Check::NotMatches { .. } => "matches forbidden pattern",
            Check::AnyPresent => "all values missing",
        }
    }

    pub fn compile(&self, rule: &str) -> Result<Predicate, ValidationError> {
        let regex = |pattern: &str| {
            Regex::new(pattern).map_err(|source| ValidationError::InvalidPattern {
                rule: rule.to_string(),
                source,
            })
        };

        Ok(match self {
            Check::Required => Predicate::Required,
            Check::Numeric => Predicate::Numeric,
            Check::Date { format } => {
                let invalid = format.trim().is_empty()
                    || StrftimeItems::new(format).any(|item| matches!(item, Item::Error));
                if invalid {
                    return Err(ValidationError::InvalidDateFormat {
                        rule: rule.to_string(),
                        format: format.clone(),
                    });
                }
                Predicate::Date {
                    format: format.clone(),
                }
            }
            Check::Allowed {
                values,
                case_insensitive,
            } => {
                if values.is_empty() {
                    return Err(ValidationError::EmptyAllowedSet(rule.to_string()));
                }
                let values = values
                    .iter()
                    .filter_map(|v| v.as_text())
                    .map(|t| fold_case(t.trim(), *case_insensitive))
                    .collect();
                Predicate::Allowed {
                    values,
                    case_insensitive: *case_insensitive,
                }
            }
            Check::Range {
                min,
                max,
                exclusive_min,
                exclusive_max,
            } => {
                if let (Some(lo), Some(hi)) = (min, max) {
                    if lo > hi {
                        return Err(ValidationError::InvalidRange {
                            rule: rule.to_string(),
                            min: *lo,
                            max: *hi,
                        });
                    }
                }
                Predicate::Range {
                    min: *min,
                    max: *max,
                    exclusive_min: *exclusive_min,
                    exclusive_max: *exclusive_max,
                }
            }
            Check::Matches { pattern } => Predicate::Matches(regex(pattern)?),
            Check::NotMatches { pattern } => Predicate::NotMatches(regex(pattern)?),
            Check::AnyPresent => Predicate::AnyPresent,
        })
    }
}

fn fold_case(s: &str, case_insensitive: bool) -> String {
    if case_insensitive {
        s.to_lowercase()
    } else {
        s.to_string()
    }
}

/// Compiled predicate
#[derive(Debug, Clone)]
pub enum Predicate {
    Required,
    Numeric,
    Date {
        format: String,
    },
    Allowed {
        values: HashSet<String>,
        case_insensitive: bool,
    },
    Range {
        min: Option<f64>,
        max: Option<f64>,
        exclusive_min: bool,
        exclusive_max: bool,
    },
    Matches(Regex),
    NotMatches(Regex),
    AnyPresent,
}

impl Predicate {
    /// Whether the predicate spans all of a rule's columns at once
    pub fn is_row_level(&self) -> bool {
        matches!(self, Predicate::AnyPresent)
    }

    /// Single-cell check. Missing values pass everything except `required`.
    pub fn holds(&self, value: &Value) -> bool {
        if value.is_missing() {
            return !matches!(self, Predicate::Required | Predicate::AnyPresent);
        }
        match self {
            Predicate::Required | Predicate::AnyPresent => true,
            Predicate::Numeric => value.as_number().is_some(),
            Predicate::Date { format } => is_date(value, format),
            Predicate::Allowed {
                values,
                case_insensitive,
            } => value
                .as_text()
                .map(|t| values.contains(&fold_case(t.trim(), *case_insensitive)))
                .unwrap_or(false),
            Predicate::Range {
                min,
                max,
                exclusive_min,
                exclusive_max,
            } => match value.as_number() {
                Some(n) => {
                    let above = match min {
                        Some(lo) if *exclusive_min => n > *lo,
                        Some(lo) => n >= *lo,
                        None => true,
                    };
                    let below = match max {
                        Some(hi) if *exclusive_max => n < *hi,
                        Some(hi) => n <= *hi,
                        None => true,
                    };
                    above && below
                }
                None => false,
            },
            Predicate::Matches(regex) => value
                .as_text()
                .map(|t| regex.is_match(&t))
                .unwrap_or(false),
            Predicate::NotMatches(regex) => value
                .as_text()
                .map(|t| !regex.is_match(&t))
                .unwrap_or(true),
        }
    }
}

/// Typed dates always pass; text must parse with `format`
fn is_date(value: &Value, format: &str) -> bool {
    match value {
        Value::Date(_) | Value::DateTime(_) => true,
        Value::Text(s) => {
            let s = s.trim();
            NaiveDate::parse_from_str(s, format).is_ok()
                || NaiveDateTime::parse_from_str(s, format).is_ok()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(check: Check) -> Predicate {
        check.compile("rule").unwrap()
    }

    #[test]
    fn test_date_rejects_month_13() {
        let p = compile(Check::Date {
            format: default_date_format(),
        });
        assert!(!p.holds(&Value::infer("2024-13-01")));
        assert!(p.holds(&Value::infer("2024-12-01")));
        assert!(p.holds(&Value::Null));
        assert_eq!(
            Check::Date {
                format: default_date_format()
            }
            .default_reason(),
            "invalid date"
        );
    }

    #[test]
    fn test_custom_date_format() {
        let p = compile(Check::Date {
            format: "%d/%m/%Y".into(),
        });
        assert!(p.holds(&Value::text("05/01/2024")));
        assert!(!p.holds(&Value::text("2024/01/05")));
    }

    #[test]
    fn test_invalid_date_format() {
        let err = Check::Date {
            format: "%Y-%Q".into(),
        }
        .compile("d")
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidDateFormat { .. }));
    }

    #[test]
    fn test_range() {
        let p = compile(Check::Range {
            min: Some(0.0),
            max: None,
            exclusive_min: false,
            exclusive_max: false,
        });
        assert!(p.holds(&Value::Number(0.0)));
        assert!(!p.holds(&Value::Number(-1.5)));
        assert!(!p.holds(&Value::text("abc")));

        let exclusive = compile(Check::Range {
            min: Some(0.0),
            max: Some(10.0),
            exclusive_min: true,
            exclusive_max: true,
        });
        assert!(!exclusive.holds(&Value::Number(0.0)));
        assert!(!exclusive.holds(&Value::Number(10.0)));
        assert!(exclusive.holds(&Value::Number(5.0)));
    }

    #[test]
    fn test_invalid_range() {
        let err = Check::Range {
            min: Some(5.0),
            max: Some(1.0),
            exclusive_min: false,
            exclusive_max: false,
        }
        .compile("r")
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidRange { .. }));
    }

    #[test]
    fn test_allowed_compares_text_forms() {
        let p = compile(Check::Allowed {
            values: vec![Value::Number(1.0), Value::text("Produccion")],
            case_insensitive: true,
        });
        assert!(p.holds(&Value::Number(1.0)));
        assert!(p.holds(&Value::text(" PRODUCCION")));
        assert!(!p.holds(&Value::text("Buffer")));
        assert!(matches!(
            Check::Allowed {
                values: vec![],
                case_insensitive: false
            }
            .compile("a"),
            Err(ValidationError::EmptyAllowedSet(_))
        ));
    }

    #[test]
    fn test_patterns() {
        let aux = compile(Check::NotMatches {
            pattern: "(?i)aux|p0\\d".into(),
        });
        assert!(!aux.holds(&Value::text("Aux1")));
        assert!(aux.holds(&Value::Number(402.0)));
        let matches = compile(Check::Matches {
            pattern: "^\\d+$".into(),
        });
        assert!(matches.holds(&Value::Number(12.0)));
        assert!(!matches.holds(&Value::text("12a")));
    }

    #[test]
    fn test_required_and_numeric() {
        assert!(!compile(Check::Required).holds(&Value::text("  ")));
        assert!(compile(Check::Numeric).holds(&Value::text("1.5")));
        assert!(!compile(Check::Numeric).holds(&Value::text("-")));
    }

    #[test]
    fn test_check_deserialize() {
        #[derive(Deserialize)]
        struct R {
            checks: Vec<Check>,
        }
        let r: R = toml::from_str(
            r#"checks = ["required", { date = {} }, { range = { min = 0 } }, { allowed = { values = [1, "G2"] } }]"#,
        )
        .unwrap();
        assert_eq!(r.checks[0], Check::Required);
        assert_eq!(
            r.checks[1],
            Check::Date {
                format: "%Y-%m-%d".into()
            }
        );
        assert!(matches!(r.checks[2], Check::Range { min: Some(m), max: None, .. } if m == 0.0));
    }
}
