use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tokio_postgres::{Row, SimpleQueryMessage, Statement};

use crate::error::SessionError;
use crate::results::{DataSet, DataTable};
use crate::types::DbValue;

/// Extracts a [`DbValue`] from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns `SessionError` if the column cannot be retrieved or `idx` is out of range.
pub fn postgres_extract_value(row: &Row, idx: usize) -> Result<DbValue, SessionError> {
    let Some(column) = row.columns().get(idx) else {
        return Err(SessionError::BackendFailure(format!(
            "column index {idx} out of range for a row of {} columns",
            row.len()
        )));
    };
    let type_info = column.type_();

    match type_info.name() {
        "int2" => {
            let val: Option<i16> = row.try_get(idx)?;
            Ok(val.map_or(DbValue::Null, |v| DbValue::Int(i64::from(v))))
        }
        "int4" => {
            let val: Option<i32> = row.try_get(idx)?;
            Ok(val.map_or(DbValue::Null, |v| DbValue::Int(i64::from(v))))
        }
        "int8" => {
            let val: Option<i64> = row.try_get(idx)?;
            Ok(val.map_or(DbValue::Null, DbValue::Int))
        }
        "float4" => {
            let val: Option<f32> = row.try_get(idx)?;
            Ok(val.map_or(DbValue::Null, |v| DbValue::Float(f64::from(v))))
        }
        "float8" => {
            let val: Option<f64> = row.try_get(idx)?;
            Ok(val.map_or(DbValue::Null, DbValue::Float))
        }
        "bool" => {
            let val: Option<bool> = row.try_get(idx)?;
            Ok(val.map_or(DbValue::Null, DbValue::Bool))
        }
        "timestamp" => {
            let val: Option<NaiveDateTime> = row.try_get(idx)?;
            Ok(val.map_or(DbValue::Null, DbValue::Timestamp))
        }
        "timestamptz" => {
            let val: Option<DateTime<Utc>> = row.try_get(idx)?;
            Ok(val.map_or(DbValue::Null, |v| DbValue::Timestamp(v.naive_utc())))
        }
        "date" => {
            let val: Option<NaiveDate> = row.try_get(idx)?;
            Ok(val
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map_or(DbValue::Null, DbValue::Timestamp))
        }
        "json" | "jsonb" => {
            let val: Option<Value> = row.try_get(idx)?;
            Ok(val.map_or(DbValue::Null, DbValue::Json))
        }
        "bytea" => {
            let val: Option<Vec<u8>> = row.try_get(idx)?;
            Ok(val.map_or(DbValue::Null, DbValue::Blob))
        }
        // text, varchar, bpchar, name, and anything else with a text representation
        _ => {
            let val: Option<String> = row.try_get(idx)?;
            Ok(val.map_or(DbValue::Null, DbValue::Text))
        }
    }
}

pub(crate) fn column_names(stmt: &Statement) -> Vec<String> {
    stmt.columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect()
}

pub(crate) fn row_values(row: &Row) -> Result<Vec<DbValue>, SessionError> {
    (0..row.len())
        .map(|idx| postgres_extract_value(row, idx))
        .collect()
}

/// Build a table using statement metadata for column names.
///
/// # Errors
/// Returns errors from row value extraction.
pub fn build_table(stmt: &Statement, rows: &[Row]) -> Result<DataTable, SessionError> {
    let mut table = DataTable::with_capacity(column_names(stmt), rows.len());
    for row in rows {
        table.push_row(row_values(row)?);
    }
    Ok(table)
}

/// Result of a simple-protocol round trip: one table per row-returning statement and
/// the rows changed by the others.
#[derive(Debug, Default)]
pub(crate) struct SimpleOutcome {
    pub(crate) set: DataSet,
    pub(crate) rows_affected: u64,
}

/// Fold simple-protocol messages into tables. Values arrive in text form.
pub(crate) fn fold_simple(messages: Vec<SimpleQueryMessage>) -> SimpleOutcome {
    let mut outcome = SimpleOutcome::default();
    let mut current: Option<DataTable> = None;
    for message in messages {
        match message {
            SimpleQueryMessage::RowDescription(columns) => {
                let names = columns.iter().map(|c| c.name().to_string()).collect();
                current = Some(DataTable::new(names));
            }
            SimpleQueryMessage::Row(row) => {
                let table = current.get_or_insert_with(|| {
                    DataTable::new(row.columns().iter().map(|c| c.name().to_string()).collect())
                });
                let values = (0..row.len())
                    .map(|idx| row.get(idx).map_or(DbValue::Null, |s| DbValue::Text(s.to_owned())))
                    .collect();
                table.push_row(values);
            }
            SimpleQueryMessage::CommandComplete(count) => match current.take() {
                Some(table) => outcome.set.push_table(table),
                None => outcome.rows_affected += count,
            },
            _ => {}
        }
    }
    outcome
}
