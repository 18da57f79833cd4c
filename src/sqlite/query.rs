use rusqlite::fallible_iterator::FallibleIterator;
use rusqlite::types::Value;
use rusqlite::{Batch, Connection, Statement};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::params::NamedParams;
use crate::driver::RowMessage;
use crate::error::SessionError;
use crate::results::{DataSet, DataTable};
use crate::types::DbValue;

/// What to do with the rest of a batch after a row-returning statement.
pub(crate) enum Step {
    Continue,
    Stop,
}

/// Extract a [`DbValue`] from a `SQLite` row.
///
/// # Errors
///
/// Returns `SessionError` if the value cannot be read.
pub fn sqlite_extract_value(row: &rusqlite::Row<'_>, idx: usize) -> Result<DbValue, SessionError> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => DbValue::Null,
        Value::Integer(i) => DbValue::Int(i),
        Value::Real(f) => DbValue::Float(f),
        Value::Text(s) => DbValue::Text(s),
        Value::Blob(b) => DbValue::Blob(b),
    })
}

fn column_names(stmt: &Statement<'_>) -> Vec<String> {
    stmt.column_names()
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn total_changes(conn: &Connection) -> Result<u64, SessionError> {
    let total: i64 = conn.query_row("SELECT total_changes()", [], |row| row.get(0))?;
    Ok(u64::try_from(total).unwrap_or_default())
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), SessionError> {
    if cancel.is_cancelled() {
        Err(SessionError::Cancelled)
    } else {
        Ok(())
    }
}

/// Run every statement in `sql`, handing row-returning ones to `on_rows`.
///
/// Statements without result columns are executed directly. Returns the number of rows
/// the whole batch changed; `SELECT`s and DDL contribute nothing.
pub(crate) fn run_batch<F>(
    conn: &Connection,
    sql: &str,
    params: &NamedParams,
    cancel: &CancellationToken,
    mut on_rows: F,
) -> Result<u64, SessionError>
where
    F: FnMut(&mut Statement<'_>) -> Result<Step, SessionError>,
{
    let before = total_changes(conn)?;
    let mut batch = Batch::new(conn, sql);
    while let Some(mut stmt) = batch.next()? {
        ensure_live(cancel)?;
        params.bind(&mut stmt)?;
        if stmt.column_count() == 0 {
            stmt.raw_execute()?;
        } else if let Step::Stop = on_rows(&mut stmt)? {
            break;
        }
    }
    let after = total_changes(conn)?;
    Ok(after.saturating_sub(before))
}

/// Step through a bound statement, discarding rows.
pub(crate) fn drain(stmt: &mut Statement<'_>, cancel: &CancellationToken) -> Result<Step, SessionError> {
    let mut rows = stmt.raw_query();
    while rows.next()?.is_some() {
        ensure_live(cancel)?;
    }
    Ok(Step::Continue)
}

/// Materialize a bound statement into a table.
pub(crate) fn build_table(
    stmt: &mut Statement<'_>,
    cancel: &CancellationToken,
) -> Result<DataTable, SessionError> {
    let columns = column_names(stmt);
    let col_count = columns.len();
    let mut table = DataTable::with_capacity(columns, 10);
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        ensure_live(cancel)?;
        let mut values = Vec::with_capacity(col_count);
        for idx in 0..col_count {
            values.push(sqlite_extract_value(row, idx)?);
        }
        table.push_row(values);
    }
    Ok(table)
}

pub(crate) fn execute_batch(
    conn: &Connection,
    sql: &str,
    params: &NamedParams,
    cancel: &CancellationToken,
) -> Result<u64, SessionError> {
    run_batch(conn, sql, params, cancel, |stmt| drain(stmt, cancel))
}

/// First column of the first row of the first row-returning statement.
pub(crate) fn query_scalar(
    conn: &Connection,
    sql: &str,
    params: &NamedParams,
    cancel: &CancellationToken,
) -> Result<Option<DbValue>, SessionError> {
    let mut scalar: Option<Option<DbValue>> = None;
    run_batch(conn, sql, params, cancel, |stmt| {
        if scalar.is_some() {
            return drain(stmt, cancel);
        }
        let mut rows = stmt.raw_query();
        scalar = Some(match rows.next()? {
            Some(row) => Some(sqlite_extract_value(row, 0)?),
            None => None,
        });
        Ok(Step::Continue)
    })?;
    Ok(scalar.flatten())
}

/// One table per row-returning statement, in order.
pub(crate) fn query_sets(
    conn: &Connection,
    sql: &str,
    params: &NamedParams,
    cancel: &CancellationToken,
) -> Result<DataSet, SessionError> {
    let mut set = DataSet::new();
    run_batch(conn, sql, params, cancel, |stmt| {
        set.push_table(build_table(stmt, cancel)?);
        Ok(Step::Continue)
    })?;
    Ok(set)
}

/// Feed a cursor: column names of the first row-returning statement go to `columns`,
/// its rows to `rows`. Statements after it still run once the rows are consumed.
/// Stops early if the consumer hangs up.
pub(crate) fn stream_batch(
    conn: &Connection,
    sql: &str,
    params: &NamedParams,
    cancel: &CancellationToken,
    columns: oneshot::Sender<Result<Vec<String>, SessionError>>,
    rows: &mpsc::Sender<RowMessage>,
) {
    let mut columns = Some(columns);
    let res = run_batch(conn, sql, params, cancel, |stmt| {
        let Some(columns_tx) = columns.take() else {
            return drain(stmt, cancel);
        };
        let names = column_names(stmt);
        let col_count = names.len();
        if columns_tx.send(Ok(names)).is_err() {
            return Ok(Step::Stop);
        }
        let mut cursor = stmt.raw_query();
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(col_count);
            for idx in 0..col_count {
                values.push(sqlite_extract_value(row, idx)?);
            }
            if rows.blocking_send(Ok(values)).is_err() {
                return Ok(Step::Stop);
            }
        }
        Ok(Step::Continue)
    });

    match (res, columns) {
        (Ok(_), Some(columns_tx)) => {
            let _ = columns_tx.send(Ok(Vec::new()));
        }
        (Ok(_), None) => {}
        (Err(err), Some(columns_tx)) => {
            let _ = columns_tx.send(Err(err));
        }
        (Err(err), None) => {
            let _ = rows.blocking_send(Err(err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);
             INSERT INTO t (name) VALUES ('a'), ('b'), ('c');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn batch_counts_changes_not_selects() {
        let conn = setup();
        let cancel = CancellationToken::new();
        let changed = execute_batch(
            &conn,
            "UPDATE t SET name = 'z' WHERE id < 3; SELECT * FROM t; DELETE FROM t WHERE id = 3;",
            &NamedParams::default(),
            &cancel,
        )
        .unwrap();
        assert_eq!(changed, 3);

        let ddl = execute_batch(&conn, "CREATE TABLE u (x INT)", &NamedParams::default(), &cancel)
            .unwrap();
        assert_eq!(ddl, 0);
    }

    #[test]
    fn sets_and_scalar() {
        let conn = setup();
        let cancel = CancellationToken::new();
        let set = query_sets(
            &conn,
            "SELECT id FROM t ORDER BY id; UPDATE t SET name = 'q'; SELECT name FROM t WHERE id = 1",
            &NamedParams::default(),
            &cancel,
        )
        .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.tables()[0].len(), 3);
        assert_eq!(set.tables()[1].first_value(), Some(&DbValue::Text("q".into())));

        let none = query_scalar(&conn, "SELECT id FROM t WHERE id > 99", &NamedParams::default(), &cancel)
            .unwrap();
        assert!(none.is_none());
        let null = query_scalar(&conn, "SELECT NULL", &NamedParams::default(), &cancel).unwrap();
        assert_eq!(null, Some(DbValue::Null));
    }

    #[test]
    fn cancelled_token_stops_before_first_statement() {
        let conn = setup();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = execute_batch(&conn, "DELETE FROM t", &NamedParams::default(), &cancel)
            .unwrap_err();
        assert!(err.is_cancelled());
        let left: i64 = conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(left, 3);
    }
}
