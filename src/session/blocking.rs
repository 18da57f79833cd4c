use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};
use tokio_util::sync::CancellationToken;

use super::{DataReader, Session};
use crate::command::Command;
use crate::config::SessionOptions;
use crate::driver::DbConnection;
use crate::error::SessionError;
use crate::logger::DbLogger;
use crate::results::{DataRow, DataSet, DataTable};
use crate::types::{ConnectionState, DbValue};

/// Synchronous facade over [`Session`], driving it on a private current-thread runtime.
///
/// Must not be used from inside an async context; blocking there panics.
pub struct BlockingSession<C: DbConnection> {
    // dropped before the runtime so disposal still has a reactor
    session: Session<C>,
    runtime: Runtime,
    cancel: CancellationToken,
}

impl<C: DbConnection> BlockingSession<C> {
    /// # Errors
    /// Returns `SessionError::InvalidArgument` for a bad connection string, or
    /// `SessionError::BackendFailure` if the runtime cannot be started.
    pub fn new(options: SessionOptions) -> Result<Self, SessionError> {
        Self::from_session(Session::new(options)?)
    }

    /// # Errors
    /// Returns `SessionError::BackendFailure` if the runtime cannot be started.
    pub fn from_session(session: Session<C>) -> Result<Self, SessionError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SessionError::BackendFailure(format!("failed to start runtime: {e}")))?;
        Ok(Self {
            session,
            runtime,
            cancel: CancellationToken::new(),
        })
    }

    /// Token observed by every call; cancel it from another thread to interrupt.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn set_logger(&mut self, logger: Option<Arc<dyn DbLogger>>) {
        self.session.set_logger(logger);
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.session.connection_state()
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.session.in_transaction()
    }

    /// # Errors
    /// See [`Session::begin_transaction`].
    pub fn begin_transaction(&mut self) -> Result<(), SessionError> {
        self.runtime
            .block_on(self.session.begin_transaction(&self.cancel))
    }

    /// # Errors
    /// See [`Session::commit_transaction`].
    pub fn commit_transaction(&mut self) -> Result<(), SessionError> {
        self.runtime.block_on(self.session.commit_transaction())
    }

    /// # Errors
    /// See [`Session::rollback_transaction`].
    pub fn rollback_transaction(&mut self) -> Result<(), SessionError> {
        self.runtime.block_on(self.session.rollback_transaction())
    }

    /// # Errors
    /// See [`Session::execute_non_query`].
    pub fn execute_non_query(&mut self, command: impl Into<Command>) -> Result<u64, SessionError> {
        self.runtime
            .block_on(self.session.execute_non_query(command, &self.cancel))
    }

    /// # Errors
    /// See [`Session::execute_scalar`].
    pub fn execute_scalar(
        &mut self,
        command: impl Into<Command>,
    ) -> Result<Option<DbValue>, SessionError> {
        self.runtime
            .block_on(self.session.execute_scalar(command, &self.cancel))
    }

    /// # Errors
    /// See [`Session::execute_data_table`].
    pub fn execute_data_table(
        &mut self,
        command: impl Into<Command>,
    ) -> Result<DataTable, SessionError> {
        self.runtime
            .block_on(self.session.execute_data_table(command, &self.cancel))
    }

    /// # Errors
    /// See [`Session::execute_data_set`].
    pub fn execute_data_set(&mut self, command: impl Into<Command>) -> Result<DataSet, SessionError> {
        self.runtime
            .block_on(self.session.execute_data_set(command, &self.cancel))
    }

    /// # Errors
    /// See [`Session::execute_reader`].
    pub fn execute_reader(
        &mut self,
        command: impl Into<Command>,
    ) -> Result<BlockingDataReader<'_, C>, SessionError> {
        let reader = self
            .runtime
            .block_on(self.session.execute_reader(command, &self.cancel))?;
        Ok(BlockingDataReader {
            runtime: &self.runtime,
            cancel: &self.cancel,
            inner: reader,
        })
    }

    /// Drop any transaction and close the connection. Idempotent.
    pub fn dispose(&mut self) {
        self.session.dispose();
    }

    /// Roll back any transaction, then close the connection. Idempotent.
    pub fn dispose_with_rollback(&mut self) {
        self.runtime.block_on(self.session.dispose_async());
    }

    #[must_use]
    pub fn into_inner(self) -> Session<C> {
        self.session
    }
}

/// Blocking counterpart of [`DataReader`].
pub struct BlockingDataReader<'a, C: DbConnection> {
    runtime: &'a Runtime,
    cancel: &'a CancellationToken,
    inner: DataReader<'a, C>,
}

impl<C: DbConnection> BlockingDataReader<'_, C> {
    #[must_use]
    pub fn columns(&self) -> &[String] {
        self.inner.columns()
    }

    /// # Errors
    /// See [`DataReader::next_row`].
    pub fn next_row(&mut self) -> Result<Option<DataRow>, SessionError> {
        self.runtime.block_on(self.inner.next_row(self.cancel))
    }

    /// # Errors
    /// See [`DataReader::close`].
    pub fn close(self) -> Result<(), SessionError> {
        self.inner.close()
    }
}

impl<C: DbConnection> Iterator for BlockingDataReader<'_, C> {
    type Item = Result<DataRow, SessionError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}
