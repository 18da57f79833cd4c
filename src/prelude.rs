//! Convenient imports for common functionality.

pub use crate::command::{Command, CommandCategory, CommandKind};
pub use crate::config::{ConnectionProvisioner, SessionOptions};
pub use crate::error::{ErrorKind, SessionError};
pub use crate::logger::{DbLogger, LogLevel, NullLogger, TracingLogger};
pub use crate::params::{Parameter, bind_parameters};
pub use crate::results::{DataRow, DataSet, DataTable};
pub use crate::session::{BlockingSession, DataReader, Session, SharedSession};
pub use crate::types::{ConnectionState, DbValue};
pub use tokio_util::sync::CancellationToken;

#[cfg(feature = "postgres")]
pub use crate::postgres::PostgresConnection;
#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteConnection;
