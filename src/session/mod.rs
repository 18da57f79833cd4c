//! The session: one connection, at most one transaction, five execution shapes.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::command::Command;
use crate::config::{ConnectionProvisioner, SessionOptions};
use crate::driver::{DbConnection, RowStream, abandon_on_cancel};
use crate::error::SessionError;
use crate::logger::{DbLogger, NullLogger};
use crate::results::{DataSet, DataTable};
use crate::types::{ConnectionState, DbValue};

mod blocking;
mod builder;
mod reader;
mod shared;

pub use blocking::{BlockingDataReader, BlockingSession};
pub use builder::CommandBuilder;
pub use reader::DataReader;
pub use shared::SharedSession;

/// Result shape requested by an execution operation; names the operation in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shape {
    NonQuery,
    Scalar,
    Reader,
    DataTable,
    DataSet,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Shape::NonQuery => "NonQuery",
            Shape::Scalar => "Scalar",
            Shape::Reader => "Reader",
            Shape::DataTable => "DataTable",
            Shape::DataSet => "DataSet",
        })
    }
}

#[derive(Debug)]
struct Transaction {
    id: u64,
}

/// One connection plus its transaction scope.
///
/// The connection opens on first use. Outside a transaction it is closed again as
/// soon as each statement (or reader) completes; inside one it stays open until
/// commit or rollback:
/// ```rust,no_run
/// use sql_session::prelude::*;
///
/// # async fn demo() -> Result<(), SessionError> {
/// let cancel = CancellationToken::new();
/// let mut session: Session<SqliteConnection> =
///     Session::new(SessionOptions::new("Data Source=app.db"))?;
///
/// session.begin_transaction(&cancel).await?;
/// session
///     .execute_non_query(
///         Command::text("INSERT INTO users (id, name) VALUES (@id, @name)")
///             .bind("id", 1)
///             .bind("name", "alice"),
///         &cancel,
///     )
///     .await?;
/// session.commit_transaction().await?;
/// # Ok(())
/// # }
/// ```
pub struct Session<C: DbConnection> {
    connection: C,
    transaction: Option<Transaction>,
    logger: Arc<dyn DbLogger>,
    next_transaction_id: u64,
    disposed: bool,
}

impl<C: DbConnection> Session<C> {
    /// Build a session with an unopened connection.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidArgument` if the connection string is blank or
    /// the backend rejects its syntax.
    pub fn new(options: SessionOptions) -> Result<Self, SessionError> {
        let provisioner = ConnectionProvisioner::<C>::with_connection_string(options.connection_string)?;
        Ok(Self::from_connection(provisioner.create_connection()?))
    }

    /// Wrap a connection handle built elsewhere.
    #[must_use]
    pub fn from_connection(connection: C) -> Self {
        Self {
            connection,
            transaction: None,
            logger: Arc::new(NullLogger),
            next_transaction_id: 0,
            disposed: false,
        }
    }

    /// Install a logger; `None` restores the [`NullLogger`].
    pub fn set_logger(&mut self, logger: Option<Arc<dyn DbLogger>>) {
        self.logger = logger.unwrap_or_else(|| Arc::new(NullLogger));
    }

    #[must_use]
    pub fn logger(&self) -> &Arc<dyn DbLogger> {
        &self.logger
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Start a fluent command against this session.
    pub fn command(&mut self, text: impl Into<String>) -> CommandBuilder<'_, C> {
        CommandBuilder::new(self, Command::text(text))
    }

    /// Begin the session's transaction, opening the connection if needed.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState` if a transaction is already active,
    /// `SessionError::Cancelled` if `cancel` fires first, or the backend's error.
    #[instrument(skip_all, fields(backend = C::BACKEND, transaction = tracing::field::Empty))]
    pub async fn begin_transaction(&mut self, cancel: &CancellationToken) -> Result<(), SessionError> {
        self.logger.log_info("Beginning transaction");
        let res = self.begin_inner(cancel).await;
        self.report("Error beginning transaction", res)
    }

    async fn begin_inner(&mut self, cancel: &CancellationToken) -> Result<(), SessionError> {
        self.ensure_live()?;
        if self.transaction.is_some() {
            return Err(SessionError::InvalidState(
                "a transaction is already active".into(),
            ));
        }
        self.ensure_open(cancel).await?;
        if let Err(err) = self.connection.begin(cancel).await {
            self.release()?;
            return Err(err);
        }
        self.next_transaction_id += 1;
        let id = self.next_transaction_id;
        self.transaction = Some(Transaction { id });
        tracing::Span::current().record("transaction", id);
        tracing::debug!(transaction = id, "transaction started");
        Ok(())
    }

    /// Commit the active transaction and close the connection.
    ///
    /// A failed commit leaves the transaction in place so the caller can roll back,
    /// unless the backend ended it as part of the failure.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState` when no transaction is active, or the
    /// backend's error.
    #[instrument(skip_all, fields(backend = C::BACKEND))]
    pub async fn commit_transaction(&mut self) -> Result<(), SessionError> {
        self.logger.log_info("Committing transaction");
        let res = self.commit_inner().await;
        self.report("Error committing transaction", res)
    }

    async fn commit_inner(&mut self) -> Result<(), SessionError> {
        self.ensure_live()?;
        let Some(transaction) = self.transaction.as_ref() else {
            return Err(SessionError::InvalidState("no active transaction".into()));
        };
        let id = transaction.id;
        if let Err(err) = self.connection.commit().await {
            self.reconcile().await;
            return Err(err);
        }
        self.transaction = None;
        tracing::debug!(transaction = id, "transaction committed");
        self.release()
    }

    /// Roll back the active transaction and close the connection. A no-op when no
    /// transaction is active.
    ///
    /// # Errors
    /// Returns the backend's error; the transaction is kept in that case.
    #[instrument(skip_all, fields(backend = C::BACKEND))]
    pub async fn rollback_transaction(&mut self) -> Result<(), SessionError> {
        self.logger.log_info("Rolling back transaction");
        let res = self.rollback_inner().await;
        self.report("Error rolling back transaction", res)
    }

    async fn rollback_inner(&mut self) -> Result<(), SessionError> {
        let Some(transaction) = self.transaction.as_ref() else {
            return Ok(());
        };
        let id = transaction.id;
        if let Err(err) = self.connection.rollback().await {
            self.reconcile().await;
            return Err(err);
        }
        self.transaction = None;
        tracing::debug!(transaction = id, "transaction rolled back");
        self.release()
    }

    /// Run a command and return the number of rows it changed.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidArgument` for blank text or unbound markers,
    /// `SessionError::Cancelled` if `cancel` fires first, or the backend's error.
    #[instrument(skip_all, fields(backend = C::BACKEND, category = tracing::field::Empty))]
    pub async fn execute_non_query(
        &mut self,
        command: impl Into<Command>,
        cancel: &CancellationToken,
    ) -> Result<u64, SessionError> {
        let command = self.start(Shape::NonQuery, command.into());
        let res = self.non_query_inner(&command, cancel).await;
        self.finish(Shape::NonQuery, &command, res)
    }

    /// Run a command and return the first column of its first row; `None` when it
    /// produced no rows, `Some(DbValue::Null)` for a SQL NULL.
    ///
    /// # Errors
    /// Same as [`execute_non_query`](Self::execute_non_query).
    #[instrument(skip_all, fields(backend = C::BACKEND, category = tracing::field::Empty))]
    pub async fn execute_scalar(
        &mut self,
        command: impl Into<Command>,
        cancel: &CancellationToken,
    ) -> Result<Option<DbValue>, SessionError> {
        let command = self.start(Shape::Scalar, command.into());
        let res = self.scalar_inner(&command, cancel).await;
        self.finish(Shape::Scalar, &command, res)
    }

    /// Run a command and materialize its first result set.
    ///
    /// # Errors
    /// Same as [`execute_non_query`](Self::execute_non_query).
    #[instrument(skip_all, fields(backend = C::BACKEND, category = tracing::field::Empty))]
    pub async fn execute_data_table(
        &mut self,
        command: impl Into<Command>,
        cancel: &CancellationToken,
    ) -> Result<DataTable, SessionError> {
        let command = self.start(Shape::DataTable, command.into());
        let res = self
            .data_set_inner(&command, cancel)
            .await
            .map(DataSet::into_first_table);
        self.finish(Shape::DataTable, &command, res)
    }

    /// Run a command and materialize every result set it produces.
    ///
    /// # Errors
    /// Same as [`execute_non_query`](Self::execute_non_query).
    #[instrument(skip_all, fields(backend = C::BACKEND, category = tracing::field::Empty))]
    pub async fn execute_data_set(
        &mut self,
        command: impl Into<Command>,
        cancel: &CancellationToken,
    ) -> Result<DataSet, SessionError> {
        let command = self.start(Shape::DataSet, command.into());
        let res = self.data_set_inner(&command, cancel).await;
        self.finish(Shape::DataSet, &command, res)
    }

    /// Run a command and return a forward-only cursor over its first result set.
    ///
    /// Outside a transaction the connection stays open until the reader is exhausted
    /// or dropped; the reader borrows the session for that long.
    ///
    /// # Errors
    /// Same as [`execute_non_query`](Self::execute_non_query).
    #[instrument(skip_all, fields(backend = C::BACKEND, category = tracing::field::Empty))]
    pub async fn execute_reader(
        &mut self,
        command: impl Into<Command>,
        cancel: &CancellationToken,
    ) -> Result<DataReader<'_, C>, SessionError> {
        let command = self.start(Shape::Reader, command.into());
        match self.open_stream(&command, cancel).await {
            Ok(stream) => {
                let owns_connection = self.transaction.is_none();
                Ok(DataReader::new(self, command, stream, owns_connection))
            }
            Err(err) => self.finish(Shape::Reader, &command, Err(err)),
        }
    }

    async fn open_stream(
        &mut self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<RowStream, SessionError> {
        self.prepare(command, cancel).await?;
        let res = self.connection.query_stream(command, cancel).await;
        if res.is_err() {
            self.reconcile().await;
            self.release()?;
        }
        res
    }

    /// Drop any transaction and close the connection. Idempotent.
    ///
    /// The backend discards an uncommitted transaction when its connection closes.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Some(transaction) = self.transaction.take() {
            tracing::debug!(transaction = transaction.id, "discarding transaction on dispose");
        }
        if let Err(err) = self.connection.close() {
            self.logger.log_error("Error closing connection", Some(&err));
        }
    }

    /// Roll back any transaction, then close the connection. Idempotent.
    pub async fn dispose_async(&mut self) {
        if self.disposed {
            return;
        }
        if self.transaction.is_some() && self.connection.state().is_open() {
            if let Err(err) = self.connection.rollback().await {
                self.logger
                    .log_error("Error rolling back transaction on dispose", Some(&err));
            }
        }
        self.dispose();
    }

    fn start(&self, shape: Shape, command: Command) -> Command {
        tracing::Span::current().record("category", tracing::field::debug(command.category()));
        self.logger
            .log_info(&format!("Executing {shape}: {}", command.command_text()));
        command
    }

    fn finish<T>(
        &self,
        shape: Shape,
        command: &Command,
        res: Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        self.report(
            &format!("Error executing {shape}: {}", command.command_text()),
            res,
        )
    }

    fn report<T>(&self, message: &str, res: Result<T, SessionError>) -> Result<T, SessionError> {
        if let Err(err) = &res {
            self.logger.log_error(message, Some(err));
        }
        res
    }

    fn ensure_live(&self) -> Result<(), SessionError> {
        if self.disposed {
            Err(SessionError::InvalidState("session has been disposed".into()))
        } else {
            Ok(())
        }
    }

    async fn ensure_open(&mut self, cancel: &CancellationToken) -> Result<(), SessionError> {
        if self.connection.state().is_open() {
            return Ok(());
        }
        abandon_on_cancel(self.connection.open(), cancel).await
    }

    /// Close the connection unless a transaction still needs it.
    fn release(&mut self) -> Result<(), SessionError> {
        if self.transaction.is_none() {
            self.connection.close()?;
        }
        Ok(())
    }

    async fn prepare(&mut self, command: &Command, cancel: &CancellationToken) -> Result<(), SessionError> {
        self.ensure_live()?;
        if command.command_text().trim().is_empty() {
            return Err(SessionError::InvalidArgument(
                "command text must not be empty".into(),
            ));
        }
        self.ensure_open(cancel).await
    }

    /// Forget a transaction the backend ended on its own and close its connection.
    async fn reconcile(&mut self) {
        let Some(transaction) = self.transaction.as_ref() else {
            return;
        };
        let id = transaction.id;
        match self.connection.transaction_active().await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(transaction = id, "transaction ended by the backend");
                self.transaction = None;
                if let Err(err) = self.connection.close() {
                    tracing::warn!(transaction = id, error = %err, "closing connection failed");
                }
            }
            Err(err) => {
                tracing::warn!(transaction = id, error = %err, "transaction state unknown");
            }
        }
    }

    /// Close a standalone statement's connection, keeping the statement's error
    /// ahead of any close error.
    async fn settle<T>(&mut self, res: Result<T, SessionError>) -> Result<T, SessionError> {
        if res.is_err() {
            self.reconcile().await;
        }
        let released = self.release();
        let value = res?;
        released?;
        Ok(value)
    }

    async fn non_query_inner(
        &mut self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<u64, SessionError> {
        self.prepare(command, cancel).await?;
        let res = self.connection.execute(command, cancel).await;
        self.settle(res).await
    }

    async fn scalar_inner(
        &mut self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<Option<DbValue>, SessionError> {
        self.prepare(command, cancel).await?;
        let res = self.connection.query_scalar(command, cancel).await;
        self.settle(res).await
    }

    async fn data_set_inner(
        &mut self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<DataSet, SessionError> {
        self.prepare(command, cancel).await?;
        let res = self.connection.query_sets(command, cancel).await;
        self.settle(res).await
    }
}

impl<C: DbConnection> Drop for Session<C> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<C: DbConnection + fmt::Debug> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("connection", &self.connection)
            .field("transaction", &self.transaction)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}
