//! Postgres backend on `tokio-postgres`.
//!
//! `@name` markers are rewritten to `$N` before a command reaches the server;
//! cancellation sends a protocol-level cancel request.

pub mod config;
pub mod connection;
pub mod params;
pub mod query;

pub use config::parse_config;
pub use connection::PostgresConnection;
pub use params::positional_values;
pub use query::{build_table, postgres_extract_value};
