//! Result rows and shared column metadata.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Column labels shared across all rows in a result set.
///
/// Wrapped in `Arc` so all rows from the same query share the same column
/// information. Row processors resolve labels to indexes once, up front.
#[derive(Debug, Clone, Default)]
pub struct ColumnInfo {
    /// Column labels in order
    names: Vec<String>,
    /// Label -> index mapping for O(1) lookup
    name_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Create new column info from a list of column labels.
    pub fn new(names: Vec<String>) -> Self {
        let name_to_index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            names,
            name_to_index,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Get the index of a column by label.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Check if a column exists.
    pub fn contains(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }

    /// Get all column labels.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A single fetched row.
#[derive(Debug, Clone)]
pub struct Row {
    /// Column values in order
    values: Vec<Value>,
    /// Shared column metadata
    columns: Arc<ColumnInfo>,
}

impl Row {
    /// Create a new row with its own column metadata.
    ///
    /// For multiple rows from the same result set, prefer `with_columns`.
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        let columns = Arc::new(ColumnInfo::new(column_names));
        Self { values, columns }
    }

    /// Create a new row with shared column metadata.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// Get the shared column metadata.
    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column label.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Get a value by label, failing when the label is not part of the result.
    pub fn try_get(&self, name: &str) -> Result<&Value> {
        self.get_by_name(name).ok_or_else(|| {
            Error::Type(TypeError {
                expected: "column",
                actual: format!("column '{}' not found", name),
                column: Some(name.to_string()),
            })
        })
    }

    /// Iterate over (column_label, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_columns_lookup() {
        let cols = Arc::new(ColumnInfo::new(vec![
            "users_id".to_string(),
            "users_name".to_string(),
        ]));
        let a = Row::with_columns(Arc::clone(&cols), vec![Value::from(1), Value::from("ann")]);
        let b = Row::with_columns(Arc::clone(&cols), vec![Value::from(2), Value::from("bob")]);

        assert_eq!(a.get_by_name("users_name"), Some(&Value::from("ann")));
        assert_eq!(b.get(0), Some(&Value::from(2)));
        assert!(Arc::ptr_eq(&a.column_info(), &b.column_info()));
        assert_eq!(cols.index_of("users_name"), Some(1));
    }

    #[test]
    fn try_get_missing_column() {
        let row = Row::new(vec!["users_id".to_string()], vec![Value::from(1)]);
        let err = row.try_get("users_name").unwrap_err();
        assert!(err.to_string().contains("users_name"));
        assert_eq!(row.iter().count(), 1);
    }
}
