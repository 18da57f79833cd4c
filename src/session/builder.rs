use tokio_util::sync::CancellationToken;

use super::{DataReader, Session};
use crate::command::{Command, CommandKind};
use crate::driver::DbConnection;
use crate::error::SessionError;
use crate::params::Parameter;
use crate::results::{DataSet, DataTable};
use crate::types::DbValue;

/// Fluent builder for one command execution against a session.
///
/// ```rust,no_run
/// use sql_session::prelude::*;
///
/// # async fn demo(session: &mut Session<SqliteConnection>) -> Result<(), SessionError> {
/// let name = session
///     .command("SELECT name FROM users WHERE id = @id")
///     .bind("id", 7)
///     .scalar()
///     .await?;
/// # let _ = name;
/// # Ok(())
/// # }
/// ```
pub struct CommandBuilder<'s, C: DbConnection> {
    session: &'s mut Session<C>,
    command: Command,
    cancel: CancellationToken,
}

impl<'s, C: DbConnection> CommandBuilder<'s, C> {
    pub(super) fn new(session: &'s mut Session<C>, command: Command) -> Self {
        Self {
            session,
            command,
            cancel: CancellationToken::new(),
        }
    }

    /// Bind one named value.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<DbValue>) -> Self {
        self.command = self.command.bind(name, value);
        self
    }

    /// Bind a collection of named values or pre-built parameters.
    #[must_use]
    pub fn bind_all<I, P>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Parameter>,
    {
        self.command = self.command.bind_all(parameters);
        self
    }

    /// Interpret the text as something other than plain SQL.
    #[must_use]
    pub fn kind(mut self, kind: CommandKind) -> Self {
        self.command = Command::new(self.command.command_text().to_owned(), kind)
            .bind_all(self.command.parameters().iter().cloned());
        self
    }

    /// Cancel the execution when `cancel` fires.
    #[must_use]
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The command as built so far.
    #[must_use]
    pub fn as_command(&self) -> &Command {
        &self.command
    }

    /// Execute and return rows affected.
    ///
    /// # Errors
    /// See [`Session::execute_non_query`].
    pub async fn non_query(self) -> Result<u64, SessionError> {
        self.session.execute_non_query(self.command, &self.cancel).await
    }

    /// Execute and return the first column of the first row.
    ///
    /// # Errors
    /// See [`Session::execute_scalar`].
    pub async fn scalar(self) -> Result<Option<DbValue>, SessionError> {
        self.session.execute_scalar(self.command, &self.cancel).await
    }

    /// Execute and materialize the first result set.
    ///
    /// # Errors
    /// See [`Session::execute_data_table`].
    pub async fn table(self) -> Result<DataTable, SessionError> {
        self.session.execute_data_table(self.command, &self.cancel).await
    }

    /// Execute and materialize every result set.
    ///
    /// # Errors
    /// See [`Session::execute_data_set`].
    pub async fn set(self) -> Result<DataSet, SessionError> {
        self.session.execute_data_set(self.command, &self.cancel).await
    }

    /// Execute and return a cursor over the first result set.
    ///
    /// # Errors
    /// See [`Session::execute_reader`].
    pub async fn reader(self) -> Result<DataReader<'s, C>, SessionError> {
        let Self {
            session,
            command,
            cancel,
        } = self;
        session.execute_reader(command, &cancel).await
    }
}
