use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::config::SqliteConnectOptions;
use super::params::NamedParams;
use super::query;
use crate::command::{Command, CommandKind};
use crate::driver::{
    DbConnection, Interrupt, NoInterrupt, ROW_BUFFER, RowStream, interrupt_on_cancel,
};
use crate::error::SessionError;
use crate::results::DataSet;
use crate::types::{ConnectionState, DbValue};

/// Shared handle to the raw connection; blocking work locks it from `spawn_blocking`.
pub(crate) type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

struct SqliteInterrupt(rusqlite::InterruptHandle);

impl Interrupt for SqliteInterrupt {
    fn interrupt(&self) {
        self.0.interrupt();
    }
}

/// A single `SQLite` connection driven through the blocking pool.
pub struct SqliteConnection {
    options: SqliteConnectOptions,
    conn: Option<SharedSqliteConnection>,
    interrupt: Arc<dyn Interrupt>,
    state: ConnectionState,
}

impl SqliteConnection {
    #[must_use]
    pub fn new(options: SqliteConnectOptions) -> Self {
        Self {
            options,
            conn: None,
            interrupt: Arc::new(NoInterrupt),
            state: ConnectionState::Unopened,
        }
    }

    #[must_use]
    pub fn options(&self) -> &SqliteConnectOptions {
        &self.options
    }

    fn handle(&self) -> Result<SharedSqliteConnection, SessionError> {
        self.conn
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| SessionError::InvalidState("SQLite connection is not open".into()))
    }

    /// Run `func` against the raw connection on the blocking pool, interrupting it if
    /// `cancel` fires.
    async fn run<F, R>(&self, cancel: &CancellationToken, func: F) -> Result<R, SessionError>
    where
        F: FnOnce(&rusqlite::Connection, &CancellationToken) -> Result<R, SessionError>
            + Send
            + 'static,
        R: Send + 'static,
    {
        let handle = self.handle()?;
        let token = cancel.clone();
        interrupt_on_cancel(
            run_blocking(handle, move |conn| func(conn, &token)),
            cancel,
            self.interrupt.as_ref(),
        )
        .await
    }

    async fn run_sql(&self, sql: &'static str) -> Result<(), SessionError> {
        run_blocking(self.handle()?, move |conn| {
            conn.execute_batch(sql).map_err(SessionError::from)
        })
        .await
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("options", &self.options)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

pub(crate) async fn run_blocking<F, R>(
    conn: SharedSqliteConnection,
    func: F,
) -> Result<R, SessionError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, SessionError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| SessionError::BackendFailure(format!("sqlite spawn_blocking join error: {e}")))?
}

fn reject_procedures(command: &Command) -> Result<(), SessionError> {
    if command.kind() == CommandKind::StoredProcedure {
        Err(SessionError::InvalidArgument(
            "SQLite has no stored procedures".into(),
        ))
    } else {
        Ok(())
    }
}

#[async_trait]
impl DbConnection for SqliteConnection {
    const BACKEND: &'static str = "SQLite";

    fn from_connection_string(connection_string: &str) -> Result<Self, SessionError> {
        Ok(Self::new(SqliteConnectOptions::parse(connection_string)?))
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    async fn open(&mut self) -> Result<(), SessionError> {
        if self.state.is_open() {
            return Ok(());
        }
        let options = self.options.clone();
        let conn = tokio::task::spawn_blocking(move || options.connect()).await??;
        self.interrupt = Arc::new(SqliteInterrupt(conn.get_interrupt_handle()));
        self.conn = Some(Arc::new(Mutex::new(conn)));
        self.state = ConnectionState::Open;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SessionError> {
        if let Some(handle) = self.conn.take() {
            // a cursor producer may still hold the lock; it releases the last
            // reference when it finishes
            self.interrupt.interrupt();
            drop(handle);
            self.state = ConnectionState::Closed;
        }
        self.interrupt = Arc::new(NoInterrupt);
        Ok(())
    }

    fn interrupt_handle(&self) -> Arc<dyn Interrupt> {
        Arc::clone(&self.interrupt)
    }

    async fn begin(&mut self, cancel: &CancellationToken) -> Result<(), SessionError> {
        self.run(cancel, |conn, _| {
            conn.execute_batch("BEGIN").map_err(SessionError::from)
        })
        .await
    }

    async fn commit(&mut self) -> Result<(), SessionError> {
        self.run_sql("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), SessionError> {
        run_blocking(self.handle()?, |conn| {
            // an interrupted write or a full disk already rolled it back
            if conn.is_autocommit() {
                return Ok(());
            }
            conn.execute_batch("ROLLBACK").map_err(SessionError::from)
        })
        .await
    }

    async fn transaction_active(&mut self) -> Result<bool, SessionError> {
        let Some(handle) = self.conn.as_ref().map(Arc::clone) else {
            return Ok(false);
        };
        run_blocking(handle, |conn| Ok(!conn.is_autocommit())).await
    }

    async fn execute(
        &mut self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<u64, SessionError> {
        reject_procedures(command)?;
        let sql = command.command_text().to_owned();
        let params = NamedParams::from_command(command);
        self.run(cancel, move |conn, token| {
            query::execute_batch(conn, &sql, &params, token)
        })
        .await
    }

    async fn query_scalar(
        &mut self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<Option<DbValue>, SessionError> {
        reject_procedures(command)?;
        let sql = command.command_text().to_owned();
        let params = NamedParams::from_command(command);
        self.run(cancel, move |conn, token| {
            query::query_scalar(conn, &sql, &params, token)
        })
        .await
    }

    async fn query_stream(
        &mut self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<RowStream, SessionError> {
        reject_procedures(command)?;
        let handle = self.handle()?;
        let sql = command.command_text().to_owned();
        let params = NamedParams::from_command(command);
        let token = cancel.clone();
        let (columns_tx, columns_rx) = oneshot::channel();
        let (rows_tx, rows_rx) = mpsc::channel(ROW_BUFFER);

        tokio::task::spawn_blocking(move || {
            let guard = handle.blocking_lock();
            query::stream_batch(&guard, &sql, &params, &token, columns_tx, &rows_tx);
        });

        let columns = interrupt_on_cancel(
            async {
                columns_rx.await.map_err(|_| {
                    SessionError::BackendFailure("SQLite cursor producer stopped".into())
                })?
            },
            cancel,
            self.interrupt.as_ref(),
        )
        .await?;
        Ok(RowStream::new(columns, rows_rx, Arc::clone(&self.interrupt)))
    }

    async fn query_sets(
        &mut self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<DataSet, SessionError> {
        reject_procedures(command)?;
        let sql = command.command_text().to_owned();
        let params = NamedParams::from_command(command);
        self.run(cancel, move |conn, token| {
            query::query_sets(conn, &sql, &params, token)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_memory() -> SqliteConnection {
        let mut conn = SqliteConnection::from_connection_string(":memory:").unwrap();
        conn.open().await.unwrap();
        conn
    }

    #[tokio::test]
    async fn transaction_state_follows_the_database() {
        let cancel = CancellationToken::new();
        let mut conn = open_memory().await;
        assert!(!conn.transaction_active().await.unwrap());

        conn.begin(&cancel).await.unwrap();
        assert!(conn.transaction_active().await.unwrap());

        // ended behind our back: rollback still succeeds
        conn.execute(&Command::text("ROLLBACK"), &cancel).await.unwrap();
        assert!(!conn.transaction_active().await.unwrap());
        conn.rollback().await.unwrap();

        conn.begin(&cancel).await.unwrap();
        conn.commit().await.unwrap();
        assert!(!conn.transaction_active().await.unwrap());
        assert!(conn.commit().await.is_err());
    }

    #[tokio::test]
    async fn closed_handle_has_no_transaction() {
        let cancel = CancellationToken::new();
        let mut conn = open_memory().await;
        conn.begin(&cancel).await.unwrap();
        conn.close().unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.transaction_active().await.unwrap());
    }
}
