use csv::WriterBuilder;

use crate::domain::Table;
use crate::error::ExportError;

/// Serialize a table as delimited text with a header row
pub fn write(table: &Table, delimiter: u8) -> Result<Vec<u8>, ExportError> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());

    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(
            row.iter()
                .map(|v| v.as_text().map(|t| t.into_owned()).unwrap_or_default()),
        )?;
    }

    writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}
