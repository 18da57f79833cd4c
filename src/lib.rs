//! Single-connection database sessions with explicit transaction scope.
//!
//! A [`Session`] owns one connection and at most one transaction. Commands run in
//! five shapes (non-query, scalar, reader, table, set), every call takes a
//! [`CancellationToken`](tokio_util::sync::CancellationToken), and outside a
//! transaction the connection is closed again as soon as each statement completes.
//!
//! ```rust,no_run
//! use sql_session::prelude::*;
//!
//! # async fn demo() -> Result<(), SessionError> {
//! let cancel = CancellationToken::new();
//! let mut session: Session<SqliteConnection> = SessionOptions::builder("Data Source=app.db")
//!     .logger(std::sync::Arc::new(TracingLogger::default()))
//!     .build()?;
//!
//! let one = session.execute_scalar("SELECT 1", &cancel).await?;
//! assert_eq!(one.and_then(|v| v.to_i64()), Some(1));
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod driver;
pub mod error;
pub mod logger;
pub mod params;
pub mod prelude;
pub mod results;
pub mod session;
pub mod translation;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use command::{Command, CommandCategory, CommandKind};
pub use config::{ConnectionProvisioner, SessionOptions, SessionOptionsBuilder};
pub use driver::{DbConnection, Interrupt, RowStream};
pub use error::{ErrorKind, SessionError};
pub use logger::{DbLogger, LogLevel, NullLogger, TracingLogger};
pub use params::{Parameter, bind_parameters};
pub use results::{DataRow, DataSet, DataTable};
pub use session::{
    BlockingDataReader, BlockingSession, CommandBuilder, DataReader, Session, SharedSession,
};
pub use types::{ConnectionState, DbValue};

#[cfg(feature = "postgres")]
pub use postgres::PostgresConnection;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteConnection;
