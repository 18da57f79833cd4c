//! The narrow capability interface a backend implements.
//!
//! [`Session`](crate::Session) only ever talks to a [`DbConnection`]; everything
//! backend-specific (parameter encoding, result decoding, how a statement is
//! interrupted) lives behind it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::command::Command;
use crate::error::SessionError;
use crate::results::{DataRow, DataSet, column_index};
use crate::types::{ConnectionState, DbValue};

/// Rows buffered between a cursor's producer and its consumer.
pub const ROW_BUFFER: usize = 64;

/// One physical connection to a backend.
///
/// `begin`, `commit` and `rollback` act on the connection's single transaction; the
/// session guarantees they are only called in the right order and that every
/// statement issued while a transaction is open belongs to it.
#[async_trait]
pub trait DbConnection: Send {
    /// Backend label used in log messages.
    const BACKEND: &'static str;

    /// Build an unopened handle. Validates the connection string syntax only.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidArgument` if the string cannot be parsed.
    fn from_connection_string(connection_string: &str) -> Result<Self, SessionError>
    where
        Self: Sized;

    fn state(&self) -> ConnectionState;

    /// Establish the link. Dropping the future must leave the handle unopened.
    async fn open(&mut self) -> Result<(), SessionError>;

    /// Release the link. Closing an unopened or closed handle is a no-op; an
    /// uncommitted transaction is discarded by the backend.
    ///
    /// # Errors
    /// Returns the backend's error if it refuses to release the connection.
    fn close(&mut self) -> Result<(), SessionError>;

    /// Handle that aborts whatever statement is currently running on this connection.
    fn interrupt_handle(&self) -> Arc<dyn Interrupt>;

    async fn begin(&mut self, cancel: &CancellationToken) -> Result<(), SessionError>;

    async fn commit(&mut self) -> Result<(), SessionError>;

    /// Roll back the open transaction. Succeeds when the backend has already ended it.
    async fn rollback(&mut self) -> Result<(), SessionError>;

    /// Whether the backend still holds a transaction on this connection.
    ///
    /// A backend can end a transaction on its own, e.g. `SQLite` rolls back when a
    /// write inside it is interrupted. Always `false` for a closed handle.
    async fn transaction_active(&mut self) -> Result<bool, SessionError>;

    /// Run the command and return the number of affected rows.
    async fn execute(
        &mut self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<u64, SessionError>;

    /// First column of the first row, `None` when the command returns no rows.
    async fn query_scalar(
        &mut self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<Option<DbValue>, SessionError>;

    /// Start a forward-only cursor over the command's first result set.
    async fn query_stream(
        &mut self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<RowStream, SessionError>;

    /// Materialize every result set the command produces.
    async fn query_sets(
        &mut self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<DataSet, SessionError>;
}

/// Aborts the statement currently running on a connection.
pub trait Interrupt: Send + Sync {
    fn interrupt(&self);
}

/// Interrupt for connections that cannot abort a running statement.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInterrupt;

impl Interrupt for NoInterrupt {
    fn interrupt(&self) {}
}

pub(crate) type RowMessage = Result<Vec<DbValue>, SessionError>;

/// Receiving half of a cursor: column names plus rows pushed by a producer task.
///
/// Dropping the stream closes the channel, which stops the producer at its next row.
pub struct RowStream {
    columns: Arc<Vec<String>>,
    index: Arc<HashMap<String, usize>>,
    rows: mpsc::Receiver<RowMessage>,
    interrupt: Arc<dyn Interrupt>,
}

impl RowStream {
    pub(crate) fn new(
        columns: Vec<String>,
        rows: mpsc::Receiver<RowMessage>,
        interrupt: Arc<dyn Interrupt>,
    ) -> Self {
        let index = Arc::new(column_index(&columns));
        Self {
            columns: Arc::new(columns),
            index,
            rows,
            interrupt,
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Next row, `None` once the producer is exhausted.
    ///
    /// # Errors
    /// Returns `SessionError::Cancelled` if `cancel` fires while waiting, or the
    /// backend's error if fetching the row failed.
    pub async fn next(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<DataRow>, SessionError> {
        if cancel.is_cancelled() {
            self.interrupt.interrupt();
            return Err(SessionError::Cancelled);
        }
        let message = tokio::select! {
            biased;
            message = self.rows.recv() => message,
            () = cancel.cancelled() => {
                self.interrupt.interrupt();
                return Err(SessionError::Cancelled);
            }
        };
        match message {
            None => Ok(None),
            Some(Ok(values)) => Ok(Some(DataRow::from_parts(
                Arc::clone(&self.columns),
                Arc::clone(&self.index),
                values,
            ))),
            Some(Err(err)) if err.is_interrupted() => Err(SessionError::Cancelled),
            Some(Err(err)) => Err(err),
        }
    }
}

impl std::fmt::Debug for RowStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

/// Race `fut` against `cancel`, dropping `fut` if the token fires first.
///
/// For steps whose abandonment leaves no trace, such as an open that has not
/// completed yet.
///
/// # Errors
/// Returns `SessionError::Cancelled`, or whatever `fut` returns.
pub async fn abandon_on_cancel<F, T>(
    fut: F,
    cancel: &CancellationToken,
) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, SessionError>>,
{
    if cancel.is_cancelled() {
        return Err(SessionError::Cancelled);
    }
    tokio::select! {
        biased;
        res = fut => res,
        () = cancel.cancelled() => Err(SessionError::Cancelled),
    }
}

/// Race `fut` against `cancel`, interrupting the backend if the token fires first.
///
/// After an interrupt the statement is still awaited: if it completed anyway its real
/// result is returned, so the caller never loses track of work the backend did.
///
/// # Errors
/// Returns `SessionError::Cancelled` if the statement was aborted or never started,
/// otherwise whatever `fut` returns.
pub async fn interrupt_on_cancel<F, T>(
    fut: F,
    cancel: &CancellationToken,
    interrupt: &dyn Interrupt,
) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, SessionError>>,
{
    if cancel.is_cancelled() {
        return Err(SessionError::Cancelled);
    }
    tokio::pin!(fut);
    let first = tokio::select! {
        biased;
        res = &mut fut => Some(res),
        () = cancel.cancelled() => None,
    };
    let res = match first {
        Some(res) => res,
        None => {
            interrupt.interrupt();
            fut.await
        }
    };
    match res {
        Err(err) if err.is_interrupted() => Err(SessionError::Cancelled),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Flag(AtomicBool);

    impl Interrupt for Flag {
        fn interrupt(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn pre_cancelled_never_polls() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let polled = AtomicBool::new(false);
        let res = abandon_on_cancel(
            async {
                polled.store(true, Ordering::SeqCst);
                Ok(1)
            },
            &cancel,
        )
        .await;
        assert!(matches!(res, Err(SessionError::Cancelled)));
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn interrupt_fires_and_completed_work_wins() {
        let cancel = CancellationToken::new();
        let flag = Flag::default();
        let trigger = cancel.clone();
        let res = interrupt_on_cancel(
            async move {
                trigger.cancel();
                tokio::task::yield_now().await;
                Ok::<_, SessionError>(7)
            },
            &cancel,
            &flag,
        )
        .await;
        assert_eq!(res.unwrap(), 7);
        assert!(flag.0.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn interrupted_backend_error_maps_to_cancelled() {
        let cancel = CancellationToken::new();
        let flag = Flag::default();
        let trigger = cancel.clone();
        let res: Result<(), _> = interrupt_on_cancel(
            async move {
                trigger.cancel();
                tokio::task::yield_now().await;
                Err(SessionError::Cancelled)
            },
            &cancel,
            &flag,
        )
        .await;
        assert!(matches!(res, Err(SessionError::Cancelled)));
    }

    #[tokio::test]
    async fn row_stream_ends_and_respects_cancel() {
        let (tx, rx) = mpsc::channel(4);
        let mut stream = RowStream::new(vec!["n".into()], rx, Arc::new(NoInterrupt));
        tx.send(Ok(vec![DbValue::Int(1)])).await.unwrap();
        drop(tx);

        let cancel = CancellationToken::new();
        let row = stream.next(&cancel).await.unwrap().unwrap();
        assert_eq!(row.get("n"), Some(&DbValue::Int(1)));
        assert!(stream.next(&cancel).await.unwrap().is_none());

        cancel.cancel();
        assert!(matches!(
            stream.next(&cancel).await,
            Err(SessionError::Cancelled)
        ));
    }
}
