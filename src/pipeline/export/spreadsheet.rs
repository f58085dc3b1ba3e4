use rust_xlsxwriter::{Format, Workbook};

use crate::domain::{Table, Value};
use crate::error::ExportError;

const MAX_COLUMNS: usize = 16_384;
const MAX_ROWS: usize = 1_048_576;

/// Serialize a table as a single-sheet XLSX workbook with a bold header row.
/// Dates are written as ISO text so they read back unchanged.
pub fn write(table: &Table, sheet_name: &str) -> Result<Vec<u8>, ExportError> {
    if table.column_count() > MAX_COLUMNS {
        return Err(ExportError::TooManyColumns(table.column_count()));
    }
    if table.row_count() + 1 > MAX_ROWS {
        return Err(ExportError::TooManyRows(table.row_count()));
    }

    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet_name)?;

        for (col, name) in table.columns().iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, name.as_str(), &header)?;
        }

        for (r, row) in table.rows().iter().enumerate() {
            let row_num = (r + 1) as u32;
            for (c, value) in row.iter().enumerate() {
                let col = c as u16;
                match value {
                    Value::Null => {}
                    Value::Number(n) => {
                        worksheet.write_number(row_num, col, *n)?;
                    }
                    Value::Bool(b) => {
                        worksheet.write_boolean(row_num, col, *b)?;
                    }
                    Value::Text(s) => {
                        worksheet.write_string(row_num, col, s.as_str())?;
                    }
                    Value::Date(_) | Value::DateTime(_) => {
                        let text = value.as_text().map(|t| t.into_owned()).unwrap_or_default();
                        worksheet.write_string(row_num, col, text)?;
                    }
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}
