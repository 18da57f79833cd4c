use std::fmt;

use tokio_util::sync::CancellationToken;

use super::{Session, Shape};
use crate::command::Command;
use crate::driver::{DbConnection, RowStream};
use crate::error::SessionError;
use crate::results::{DataRow, DataTable};

/// Forward-only cursor over a command's first result set.
///
/// Holds the session exclusively. When the command ran outside a transaction the
/// reader owns the connection's lifetime: it is closed once the rows run out, on
/// [`close`](Self::close), or when the reader is dropped.
pub struct DataReader<'a, C: DbConnection> {
    session: &'a mut Session<C>,
    command: Command,
    columns: Vec<String>,
    stream: Option<RowStream>,
    owns_connection: bool,
}

impl<'a, C: DbConnection> DataReader<'a, C> {
    pub(super) fn new(
        session: &'a mut Session<C>,
        command: Command,
        stream: RowStream,
        owns_connection: bool,
    ) -> Self {
        Self {
            session,
            command,
            columns: stream.columns().to_vec(),
            stream: Some(stream),
            owns_connection,
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether the cursor has been exhausted or closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Fetch the next row; `None` once the result set is exhausted.
    ///
    /// # Errors
    /// Returns `SessionError::Cancelled` if `cancel` fires, or the backend's error.
    /// Either way the cursor is closed.
    pub async fn next_row(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<DataRow>, SessionError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        match stream.next(cancel).await {
            Ok(Some(row)) => Ok(Some(row)),
            Ok(None) => {
                self.finish()?;
                Ok(None)
            }
            Err(err) => {
                // the cursor's error wins over any close error
                let _ = self.finish();
                if !self.owns_connection {
                    self.session.reconcile().await;
                }
                self.session.logger.log_error(
                    &format!(
                        "Error executing {}: {}",
                        Shape::Reader,
                        self.command.command_text()
                    ),
                    Some(&err),
                );
                Err(err)
            }
        }
    }

    /// Drain the remaining rows into a table.
    ///
    /// # Errors
    /// Same as [`next_row`](Self::next_row).
    pub async fn into_table(mut self, cancel: &CancellationToken) -> Result<DataTable, SessionError> {
        let mut table = DataTable::new(self.columns.clone());
        while let Some(row) = self.next_row(cancel).await? {
            table.push_row(row.into_values());
        }
        Ok(table)
    }

    /// Stop reading and release the connection if this reader owns it.
    ///
    /// # Errors
    /// Returns the backend's error if closing the connection fails.
    pub fn close(mut self) -> Result<(), SessionError> {
        self.finish()
    }

    fn finish(&mut self) -> Result<(), SessionError> {
        // drop the stream first so a producer stops before its connection goes away
        if self.stream.take().is_none() {
            return Ok(());
        }
        if self.owns_connection {
            self.session.release()?;
        }
        Ok(())
    }
}

impl<C: DbConnection> Drop for DataReader<'_, C> {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            self.session
                .logger
                .log_error("Error closing reader connection", Some(&err));
        }
    }
}

impl<C: DbConnection> fmt::Debug for DataReader<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataReader")
            .field("command", &self.command.command_text())
            .field("columns", &self.columns)
            .field("closed", &self.stream.is_none())
            .finish_non_exhaustive()
    }
}
