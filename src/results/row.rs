use std::collections::HashMap;
use std::sync::Arc;

use crate::types::DbValue;

/// A single materialized row.
///
/// Column names and the name-to-index map are shared (via `Arc`) by every row of the
/// table that produced it.
#[derive(Debug, Clone)]
pub struct DataRow {
    pub(crate) columns: Arc<Vec<String>>,
    pub(crate) index: Arc<HashMap<String, usize>>,
    /// The values for this row, in column order
    pub values: Vec<DbValue>,
}

impl DataRow {
    /// Build a standalone row, computing its own column index.
    #[must_use]
    pub fn new(columns: Arc<Vec<String>>, values: Vec<DbValue>) -> Self {
        let index = Arc::new(column_index(&columns));
        Self {
            columns,
            index,
            values,
        }
    }

    pub(crate) fn from_parts(
        columns: Arc<Vec<String>>,
        index: Arc<HashMap<String, usize>>,
        values: Vec<DbValue>,
    ) -> Self {
        Self {
            columns,
            index,
            values,
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get the index of a column by name
    #[must_use]
    pub fn column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.index.get(column_name) {
            return Some(idx);
        }
        // Fall back to a case-insensitive scan
        self.columns
            .iter()
            .position(|col| col.eq_ignore_ascii_case(column_name))
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&DbValue> {
        self.column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&DbValue> {
        self.values.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn into_values(self) -> Vec<DbValue> {
        self.values
    }
}

pub(crate) fn column_index(columns: &[String]) -> HashMap<String, usize> {
    let mut map = HashMap::with_capacity(columns.len());
    for (i, name) in columns.iter().enumerate() {
        // first occurrence wins for duplicate column names
        map.entry(name.clone()).or_insert(i);
    }
    map
}
