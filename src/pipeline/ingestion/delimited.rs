use csv::ReaderBuilder;

use super::Encoding;
use crate::error::IngestError;

const SNIFF_WINDOW: usize = 2048;

/// Guess the field delimiter from the head of the input.
///
/// `;` wins when it occurs more often than `,`; tab only when it beats both.
pub fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let head = &bytes[..bytes.len().min(SNIFF_WINDOW)];
    let count = |needle: u8| head.iter().filter(|&&b| b == needle).count();
    let (commas, semicolons, tabs) = (count(b','), count(b';'), count(b'\t'));

    if tabs > commas && tabs > semicolons {
        b'\t'
    } else if semicolons > commas {
        b';'
    } else {
        b','
    }
}

/// Decode input bytes to text. UTF-8 drops a leading BOM; Latin-1 maps every
/// byte to the code point of the same value and cannot fail.
pub fn decode(bytes: &[u8], encoding: Encoding) -> Result<String, IngestError> {
    match encoding {
        Encoding::Utf8 => {
            let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
            std::str::from_utf8(bytes)
                .map(str::to_string)
                .map_err(|e| IngestError::Encoding {
                    offset: e.valid_up_to(),
                })
        }
        Encoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
    }
}

/// Raw records of a delimited text file, header row included
pub fn read_records(text: &str, delimiter: u8) -> Result<Vec<Vec<String>>, IngestError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        records.push(record.iter().map(str::to_string).collect());
    }
    Ok(records)
}
