use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use crate::domain::text::header_key;
use crate::domain::{Table, Value};
use crate::error::MatchError;
use crate::pipeline::ingestion::{IngestConfig, Ingestor, InputFile};

const NAME_HINTS: &[&str] = &["name", "nombre", "operador", "operator"];
const CODE_HINTS: &[&str] = &["code", "codigo", "cod", "id"];

/// A trusted name, optionally carrying a numeric code (operator name -> ID)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalEntry {
    pub name: String,
    pub code: Option<i64>,
}

/// Vocabulary entry as written in page configuration: a bare name or a
/// `{ name, code }` table
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum VocabularyItem {
    Name(String),
    Coded { name: String, code: Option<i64> },
}

impl From<VocabularyItem> for CanonicalEntry {
    fn from(item: VocabularyItem) -> Self {
        match item {
            VocabularyItem::Name(name) => CanonicalEntry { name, code: None },
            VocabularyItem::Coded { name, code } => CanonicalEntry { name, code },
        }
    }
}

/// Immutable set of canonical entries. Share across runs with `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReferenceVocabulary {
    entries: Vec<CanonicalEntry>,
}

impl ReferenceVocabulary {
    /// Keep entries in order, dropping blank names and repeated names
    pub fn new(entries: impl IntoIterator<Item = CanonicalEntry>) -> Self {
        let mut seen = HashSet::new();
        let entries = entries
            .into_iter()
            .map(|e| CanonicalEntry {
                name: e.name.trim().to_string(),
                code: e.code,
            })
            .filter(|e| !e.name.is_empty() && seen.insert(e.name.clone()))
            .collect();
        Self { entries }
    }

    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        Self::new(names.iter().map(|n| CanonicalEntry {
            name: n.as_ref().to_string(),
            code: None,
        }))
    }

    pub fn from_items(items: &[VocabularyItem]) -> Self {
        Self::new(items.iter().cloned().map(CanonicalEntry::from))
    }

    pub fn entries(&self) -> &[CanonicalEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_codes(&self) -> bool {
        self.entries.iter().any(|e| e.code.is_some())
    }

    pub fn max_code(&self) -> Option<i64> {
        self.entries.iter().filter_map(|e| e.code).max()
    }

    /// Union of two vocabularies; entries of `self` win on repeated names
    pub fn merged(&self, other: &ReferenceVocabulary) -> Self {
        Self::new(self.entries.iter().chain(other.entries.iter()).cloned())
    }

    /// Read a name/code table. The name column is found by header hints
    /// (`name`, `nombre`, `operador`), the code column likewise (`code`,
    /// `codigo`, `cod`); a single-column table is names only.
    pub fn from_table(table: &Table) -> Result<Self, MatchError> {
        let columns = table.columns();
        let find = |hints: &[&str], skip: Option<usize>| {
            columns.iter().enumerate().position(|(i, c)| {
                Some(i) != skip && hints.iter().any(|h| header_key(c).contains(h))
            })
        };

        let name_col = find(NAME_HINTS, None)
            .or(if columns.len() == 1 { Some(0) } else { None })
            .ok_or_else(|| {
                MatchError::VocabularyFile(format!(
                    "no name column among {:?}",
                    columns
                ))
            })?;
        let code_col = find(CODE_HINTS, Some(name_col));
        debug!("Vocabulary columns: name={} code={:?}", name_col, code_col);

        let entries = table.rows().iter().filter_map(|row| {
            let name = row[name_col].as_text()?.trim().to_string();
            let code = code_col.and_then(|c| code_of(&row[c]));
            Some(CanonicalEntry { name, code })
        });
        let vocabulary = Self::new(entries);
        if vocabulary.is_empty() {
            return Err(MatchError::EmptyVocabulary);
        }
        Ok(vocabulary)
    }

    /// Load a vocabulary spreadsheet or CSV from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MatchError> {
        let path = path.as_ref();
        let input = InputFile::from_path(path)
            .map_err(|e| MatchError::VocabularyFile(format!("{}: {e}", path.display())))?;
        let ingested = Ingestor::new(IngestConfig::default())
            .ingest(&input)
            .map_err(|e| MatchError::VocabularyFile(format!("{}: {e}", path.display())))?;
        let vocabulary = Self::from_table(&ingested.table)?;
        info!(
            "Loaded {} vocabulary entries from {}",
            vocabulary.len(),
            path.display()
        );
        Ok(vocabulary)
    }
}

impl From<Vec<CanonicalEntry>> for ReferenceVocabulary {
    fn from(entries: Vec<CanonicalEntry>) -> Self {
        Self::new(entries)
    }
}

/// Parse a cell into a canonical entry code
pub fn code_of(value: &Value) -> Option<i64> {
    value
        .as_number()
        .filter(|n| n.fract() == 0.0)
        .map(|n| n as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupes_and_drops_blank() {
        let vocab = ReferenceVocabulary::from_names(&["Vale", " Vale ", "", "Petrobras"]);
        assert_eq!(vocab.len(), 2);
        assert!(!vocab.has_codes());
    }

    #[test]
    fn test_from_table_detects_columns() {
        let table = Table::from_text_rows(
            &["Código", "Nombre Operador"],
            &[&["12", "Juan Pérez"], &["30", "Raúl Soto"], &["x", "Ana"], &["7", ""]],
        );
        let vocab = ReferenceVocabulary::from_table(&table).unwrap();
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.entries()[0].name, "Juan Pérez");
        assert_eq!(vocab.entries()[0].code, Some(12));
        assert_eq!(vocab.entries()[2].code, None);
        assert_eq!(vocab.max_code(), Some(30));
    }

    #[test]
    fn test_from_table_without_name_column() {
        let table = Table::from_text_rows(&["a", "b"], &[&["1", "2"]]);
        assert!(matches!(
            ReferenceVocabulary::from_table(&table),
            Err(MatchError::VocabularyFile(_))
        ));
    }

    #[test]
    fn test_items_deserialize() {
        #[derive(Deserialize)]
        struct Cfg {
            vocabulary: Vec<VocabularyItem>,
        }
        let cfg: Cfg =
            toml::from_str(r#"vocabulary = ["Vale", { name = "Petrobras", code = 7 }]"#).unwrap();
        let vocab = ReferenceVocabulary::from_items(&cfg.vocabulary);
        assert_eq!(vocab.entries()[1].code, Some(7));
    }
}
