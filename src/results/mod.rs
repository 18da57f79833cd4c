//! Materialized result shapes: rows, tables and multi-table sets.

mod row;
mod table;

pub(crate) use row::column_index;
pub use row::DataRow;
pub use table::{DataSet, DataTable};
