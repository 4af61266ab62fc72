use std::collections::HashMap;
use std::sync::Arc;

use crate::types::RowValues;

/// Column names shared by every row of one result, plus a name → index cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Columns {
    names: Arc<Vec<String>>,
    index: Arc<HashMap<String, usize>>,
}

impl Columns {
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        // first occurrence wins for duplicated column labels
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            index.entry(name.clone()).or_insert(i);
        }
        Self {
            names: Arc::new(names),
            index: Arc::new(index),
        }
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

impl From<Vec<String>> for Columns {
    fn from(names: Vec<String>) -> Self {
        Columns::new(names)
    }
}

/// One associative row: ordered column names and the values fetched for them.
///
/// Rows are always copies. Nothing a caller holds aliases a native buffer, so a
/// row stays valid after the cursor advances.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Columns,
    values: Vec<RowValues>,
}

impl Row {
    /// Create a new row; missing trailing values read as `Null`.
    #[must_use]
    pub fn new(columns: Columns, mut values: Vec<RowValues>) -> Self {
        if values.len() < columns.len() {
            values.resize(columns.len(), RowValues::Null);
        }
        Self { columns, values }
    }

    #[must_use]
    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        self.columns.names()
    }

    #[must_use]
    pub fn values(&self) -> &[RowValues] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<RowValues> {
        self.values
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.columns
            .position(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.values.get(index)
    }

    /// Iterate `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RowValues)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name_and_index() {
        let columns = Columns::new(vec!["id".into(), "name".into()]);
        let row = Row::new(
            columns,
            vec![RowValues::Int(7), RowValues::Text("alice".into())],
        );
        assert_eq!(row.get("name"), Some(&RowValues::Text("alice".into())));
        assert_eq!(row.get_by_index(0), Some(&RowValues::Int(7)));
        assert_eq!(row.get("missing"), None);
        let pairs: Vec<_> = row.iter().map(|(k, _)| k).collect();
        assert_eq!(pairs, vec!["id", "name"]);
    }

    #[test]
    fn short_rows_are_padded_with_null() {
        let columns = Columns::new(vec!["a".into(), "b".into()]);
        let row = Row::new(columns, vec![RowValues::Int(1)]);
        assert_eq!(row.get("b"), Some(&RowValues::Null));
    }

    #[test]
    fn duplicate_labels_resolve_to_first_column() {
        let columns = Columns::new(vec!["x".into(), "x".into()]);
        let row = Row::new(columns, vec![RowValues::Int(1), RowValues::Int(2)]);
        assert_eq!(row.get("x"), Some(&RowValues::Int(1)));
    }
}
