//! `SQLite` backend on rusqlite.
//!
//! Every call runs on tokio's blocking pool against a single `rusqlite::Connection`;
//! cancellation goes through `sqlite3_interrupt`.

pub mod config;
pub mod connection;
pub mod params;
pub mod query;

pub use config::{SqliteConnectOptions, SqliteOpenMode};
pub use connection::SqliteConnection;
pub use params::db_value_to_sqlite_value;
pub use query::sqlite_extract_value;
