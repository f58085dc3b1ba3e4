use calamine::{open_workbook_auto_from_rs, Data, DataType, Reader};
use std::io::Cursor;

use crate::domain::Value;
use crate::error::IngestError;

/// Read the configured (or first) worksheet into raw rows, header row first
pub fn read_rows(bytes: &[u8], sheet: Option<&str>) -> Result<Vec<Vec<Value>>, IngestError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;

    let sheet_name = match sheet {
        Some(name) => workbook
            .sheet_names()
            .into_iter()
            .find(|s| s == name || s.trim().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| IngestError::MissingSheet(name.to_string()))?,
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or(IngestError::Empty)?,
    };

    let range = workbook.worksheet_range(&sheet_name)?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_value).collect())
        .collect())
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::Int(i) => Value::Number(*i as f64),
        Data::Float(f) => Value::Number(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) if s.is_empty() => Value::Null,
        Data::String(s) => Value::Text(s.clone()),
        Data::DateTime(_) => match cell.as_datetime() {
            Some(dt) if dt.time() == chrono::NaiveTime::MIN => Value::Date(dt.date()),
            Some(dt) => Value::DateTime(dt),
            None => Value::Text(cell.to_string()),
        },
        Data::DateTimeIso(s) => Value::infer(s),
        Data::DurationIso(s) => Value::Text(s.clone()),
    }
}
