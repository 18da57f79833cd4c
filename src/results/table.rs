use std::collections::HashMap;
use std::sync::Arc;

use super::row::{DataRow, column_index};
use crate::types::DbValue;

/// One fully materialized rectangular result set.
#[derive(Debug, Clone, Default)]
pub struct DataTable {
    columns: Arc<Vec<String>>,
    index: Arc<HashMap<String, usize>>,
    rows: Vec<DataRow>,
}

impl DataTable {
    /// Create an empty table with the given column names.
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self::with_capacity(columns, 0)
    }

    /// Create an empty table with preallocated row capacity.
    #[must_use]
    pub fn with_capacity(columns: Vec<String>, capacity: usize) -> Self {
        let index = Arc::new(column_index(&columns));
        Self {
            columns: Arc::new(columns),
            index,
            rows: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Append a row. Values beyond the column count are kept as-is; callers build rows
    /// from the same statement that produced the columns.
    pub fn push_row(&mut self, values: Vec<DbValue>) {
        self.rows.push(DataRow::from_parts(
            Arc::clone(&self.columns),
            Arc::clone(&self.index),
            values,
        ));
    }

    #[must_use]
    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    #[must_use]
    pub fn row(&self, index: usize) -> Option<&DataRow> {
        self.rows.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of the first column of the first row, if any.
    #[must_use]
    pub fn first_value(&self) -> Option<&DbValue> {
        self.rows.first().and_then(|row| row.get_by_index(0))
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<DataRow> {
        self.rows
    }
}

impl<'a> IntoIterator for &'a DataTable {
    type Item = &'a DataRow;
    type IntoIter = std::slice::Iter<'a, DataRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Zero or more materialized result sets, in the order the command produced them.
#[derive(Debug, Clone, Default)]
pub struct DataSet {
    tables: Vec<DataTable>,
}

impl DataSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_table(&mut self, table: DataTable) {
        self.tables.push(table);
    }

    #[must_use]
    pub fn tables(&self) -> &[DataTable] {
        &self.tables
    }

    #[must_use]
    pub fn table(&self, index: usize) -> Option<&DataTable> {
        self.tables.get(index)
    }

    #[must_use]
    pub fn first_table(&self) -> Option<&DataTable> {
        self.tables.first()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Take the first result set, or an empty table when the command returned none.
    #[must_use]
    pub fn into_first_table(self) -> DataTable {
        self.tables.into_iter().next().unwrap_or_default()
    }

    #[must_use]
    pub fn into_tables(self) -> Vec<DataTable> {
        self.tables
    }
}
