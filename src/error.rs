use thiserror::Error;

#[cfg(feature = "sqlite")]
use rusqlite;
#[cfg(feature = "postgres")]
use tokio_postgres;

#[derive(Debug, Error)]
pub enum SessionError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Backend failure: {0}")]
    BackendFailure(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Coarse classification of a [`SessionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input to a provisioning or binding call.
    InvalidArgument,
    /// The session state forbids the operation (e.g. commit with no transaction).
    InvalidState,
    /// The driver or database reported an error.
    BackendFailure,
    /// The caller's cancellation token fired before the operation completed.
    Cancelled,
}

impl SessionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            #[cfg(feature = "sqlite")]
            SessionError::SqliteError(_) => ErrorKind::BackendFailure,
            #[cfg(feature = "postgres")]
            SessionError::PostgresError(_) => ErrorKind::BackendFailure,
            SessionError::BackendFailure(_) => ErrorKind::BackendFailure,
            SessionError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            SessionError::InvalidState(_) => ErrorKind::InvalidState,
            SessionError::Cancelled => ErrorKind::Cancelled,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SessionError::Cancelled)
    }

    /// True when the driver aborted the statement because it was interrupted
    /// on our request (`sqlite3_interrupt`, Postgres query cancel).
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        match self {
            #[cfg(feature = "sqlite")]
            SessionError::SqliteError(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::OperationInterrupted
            }
            #[cfg(feature = "postgres")]
            SessionError::PostgresError(err) => {
                err.code() == Some(&tokio_postgres::error::SqlState::QUERY_CANCELED)
            }
            SessionError::Cancelled => true,
            _ => false,
        }
    }
}

impl From<tokio::task::JoinError> for SessionError {
    fn from(err: tokio::task::JoinError) -> Self {
        SessionError::BackendFailure(format!("blocking task join error: {err}"))
    }
}
