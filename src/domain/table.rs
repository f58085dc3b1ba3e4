use serde::Serialize;

use super::value::Value;

/// In-memory tabular dataset: named columns plus ordered rows of cells.
///
/// Every row holds exactly one cell per column. Column names are unique.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from text cells, typing each with [`Value::infer`].
    /// Mostly a convenience for tests and small inline datasets.
    pub fn from_text_rows(columns: &[&str], rows: &[&[&str]]) -> Self {
        let mut table = Table::new(columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            table.push_row(row.iter().map(|cell| Value::infer(cell)).collect());
        }
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row, padding with nulls or truncating to the column count
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, row: usize, column: usize) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    pub fn set(&mut self, row: usize, column: usize, value: Value) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(column)) {
            *cell = value;
        }
    }

    /// Cells of one column, top to bottom
    pub fn column_values(&self, column: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |r| &r[column])
    }

    /// `name`, or the first free `name_1`, `name_2`, ... when it is taken
    pub fn unique_name(&self, name: &str) -> String {
        if self.column_index(name).is_none() {
            return name.to_string();
        }
        (1..)
            .map(|n| format!("{name}_{n}"))
            .find(|candidate| self.column_index(candidate).is_none())
            .unwrap_or_else(|| name.to_string())
    }

    /// Append a derived column. Existing columns are never overwritten: a
    /// taken name gets a numeric suffix. Returns the name actually used.
    /// `values` shorter than the table leave the remaining cells null.
    pub fn add_column(&mut self, name: &str, values: Vec<Value>) -> String {
        let at = self.columns.len();
        self.insert_column(at, name, values)
    }

    /// Like [`Table::add_column`], but placed at position `at` (clamped to
    /// the column count)
    pub fn insert_column(&mut self, at: usize, name: &str, values: Vec<Value>) -> String {
        let at = at.min(self.columns.len());
        let name = self.unique_name(name);
        self.columns.insert(at, name.clone());
        let mut values = values.into_iter();
        for row in &mut self.rows {
            row.insert(at, values.next().unwrap_or(Value::Null));
        }
        name
    }

    /// Rename column `index`; the new name is made unique among the others
    pub fn rename_column(&mut self, index: usize, name: &str) -> Option<String> {
        if index >= self.columns.len() {
            return None;
        }
        if self.columns[index] == name {
            return Some(name.to_string());
        }
        let name = self.unique_name(name);
        self.columns[index] = name.clone();
        Some(name)
    }

    /// Concatenate `other` below this table. The column set becomes the union
    /// in first-seen order; cells a side does not have are null.
    pub fn append(&mut self, other: Table) {
        let mut mapping = Vec::with_capacity(other.columns.len());
        for name in &other.columns {
            let idx = match self.column_index(name) {
                Some(idx) => idx,
                None => {
                    self.columns.push(name.clone());
                    for row in &mut self.rows {
                        row.push(Value::Null);
                    }
                    self.columns.len() - 1
                }
            };
            mapping.push(idx);
        }

        let width = self.columns.len();
        for source in other.rows {
            let mut row = vec![Value::Null; width];
            for (value, &idx) in source.into_iter().zip(&mapping) {
                row[idx] = value;
            }
            self.rows.push(row);
        }
    }

    /// Project onto the given column indices (in that order) and rows
    pub fn select(&self, columns: &[usize], keep_row: impl Fn(usize) -> bool) -> Table {
        let names = columns.iter().map(|&i| self.columns[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .enumerate()
            .filter(|(i, _)| keep_row(*i))
            .map(|(_, row)| columns.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Table {
            columns: names,
            rows,
        }
    }
}
