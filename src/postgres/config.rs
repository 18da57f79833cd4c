use std::str::FromStr;

use tokio_postgres::Config as PgConfig;

use crate::error::SessionError;

/// Parse a libpq-style (`host=... user=...`) or URL-style (`postgresql://...`)
/// connection string.
///
/// # Errors
/// Returns `SessionError::InvalidArgument` if the string does not parse or names no
/// host or user.
pub fn parse_config(connection_string: &str) -> Result<PgConfig, SessionError> {
    let trimmed = connection_string.trim();
    if trimmed.is_empty() {
        return Err(SessionError::InvalidArgument(
            "Postgres connection string is empty".into(),
        ));
    }
    let config = PgConfig::from_str(trimmed).map_err(|e| {
        SessionError::InvalidArgument(format!("Postgres connection string: {e}"))
    })?;

    if config.get_hosts().is_empty() {
        return Err(SessionError::InvalidArgument(
            "Postgres connection string: host is required".into(),
        ));
    }
    if config.get_user().is_none() {
        return Err(SessionError::InvalidArgument(
            "Postgres connection string: user is required".into(),
        ));
    }
    Ok(config)
}
