use serde::{Deserialize, Deserializer};
use std::fmt;

use super::table::Table;
use super::text::header_key;

/// A column named by a rule: either exactly, or by `~frag1|frag2` containment
/// over accent-folded, lowercased header names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    Exact(String),
    Containing(Vec<String>),
}

impl ColumnRef {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().strip_prefix('~') {
            Some(rest) => ColumnRef::Containing(
                rest.split('|')
                    .map(header_key)
                    .filter(|f| !f.is_empty())
                    .collect(),
            ),
            None => ColumnRef::Exact(raw.trim().to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ColumnRef::Exact(name) => name.is_empty(),
            ColumnRef::Containing(fragments) => fragments.is_empty(),
        }
    }

    /// Index of the first table column this reference names
    pub fn resolve(&self, table: &Table) -> Option<usize> {
        self.resolve_in(table.columns())
    }

    pub fn resolve_in(&self, columns: &[String]) -> Option<usize> {
        match self {
            ColumnRef::Exact(name) => columns
                .iter()
                .position(|c| c == name)
                .or_else(|| columns.iter().position(|c| c.trim() == name)),
            ColumnRef::Containing(fragments) => columns.iter().position(|c| {
                let key = header_key(c);
                fragments.iter().any(|f| key.contains(f.as_str()))
            }),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Exact(name) => f.write_str(name),
            ColumnRef::Containing(fragments) => write!(f, "~{}", fragments.join("|")),
        }
    }
}

impl From<&str> for ColumnRef {
    fn from(raw: &str) -> Self {
        ColumnRef::parse(raw)
    }
}

impl<'de> Deserialize<'de> for ColumnRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(ColumnRef::parse(&raw))
    }
}

/// One column or a list of them in configuration files
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(ColumnRef),
    Many(Vec<ColumnRef>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<ColumnRef> {
        match self {
            OneOrMany::One(c) => vec![c],
            OneOrMany::Many(cs) => cs,
        }
    }
}
