use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Deserialize;

use crate::driver::DbConnection;
use crate::error::SessionError;
use crate::logger::DbLogger;
use crate::session::Session;

/// Environment variable read by [`SessionOptions::from_default_env`].
pub const DEFAULT_CONNECTION_ENV: &str = "SQL_SESSION_CONNECTION_STRING";

/// Configuration for one [`Session`].
///
/// Deserializable so it can sit inside an application's own config file:
/// ```rust
/// use sql_session::SessionOptions;
///
/// let opts: SessionOptions =
///     serde_json::from_str(r#"{ "connection_string": "Data Source=app.db" }"#).unwrap();
/// assert_eq!(opts.connection_string, "Data Source=app.db");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionOptions {
    pub connection_string: String,
}

impl SessionOptions {
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }

    /// Read the connection string from the environment variable `var`.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidArgument` if the variable is unset or not UTF-8.
    pub fn from_env(var: &str) -> Result<Self, SessionError> {
        std::env::var(var).map(Self::new).map_err(|e| {
            SessionError::InvalidArgument(format!("environment variable {var}: {e}"))
        })
    }

    /// [`from_env`](Self::from_env) with [`DEFAULT_CONNECTION_ENV`].
    ///
    /// # Errors
    /// Returns `SessionError::InvalidArgument` if the variable is unset or not UTF-8.
    pub fn from_default_env() -> Result<Self, SessionError> {
        Self::from_env(DEFAULT_CONNECTION_ENV)
    }

    /// Start a fluent builder.
    #[must_use]
    pub fn builder(connection_string: impl Into<String>) -> SessionOptionsBuilder {
        SessionOptionsBuilder::new(connection_string)
    }

    /// Reject empty or whitespace-only connection strings.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidArgument` when the connection string is blank.
    pub fn validate(&self) -> Result<(), SessionError> {
        require_connection_string(&self.connection_string)
    }
}

/// Fluent builder for a [`Session`].
#[derive(Clone)]
pub struct SessionOptionsBuilder {
    opts: SessionOptions,
    logger: Option<Arc<dyn DbLogger>>,
}

impl SessionOptionsBuilder {
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            opts: SessionOptions::new(connection_string),
            logger: None,
        }
    }

    #[must_use]
    pub fn logger(mut self, logger: Arc<dyn DbLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    #[must_use]
    pub fn finish(self) -> SessionOptions {
        self.opts
    }

    /// Build a session over backend `C`.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidArgument` if the connection string is blank or
    /// the backend rejects its syntax.
    pub fn build<C: DbConnection>(self) -> Result<Session<C>, SessionError> {
        let mut session = Session::new(self.opts)?;
        session.set_logger(self.logger);
        Ok(session)
    }
}

impl fmt::Debug for SessionOptionsBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptionsBuilder")
            .field("opts", &self.opts)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

fn require_connection_string(connection_string: &str) -> Result<(), SessionError> {
    if connection_string.trim().is_empty() {
        Err(SessionError::InvalidArgument(
            "connection string must not be empty".into(),
        ))
    } else {
        Ok(())
    }
}

/// Builds unopened connection handles of backend `C`.
///
/// Construction only validates syntax; nothing is opened, pooled or retried.
pub struct ConnectionProvisioner<C> {
    connection_string: Option<String>,
    _backend: PhantomData<fn() -> C>,
}

impl<C: DbConnection> ConnectionProvisioner<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            connection_string: None,
            _backend: PhantomData,
        }
    }

    /// Provisioner with a default connection string already stored.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidArgument` when the string is blank.
    pub fn with_connection_string(connection_string: impl Into<String>) -> Result<Self, SessionError> {
        let mut provisioner = Self::new();
        provisioner.set_connection_string(connection_string)?;
        Ok(provisioner)
    }

    /// Store the default connection string.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidArgument` when the string is blank.
    pub fn set_connection_string(&mut self, connection_string: impl Into<String>) -> Result<(), SessionError> {
        let connection_string = connection_string.into();
        require_connection_string(&connection_string)?;
        self.connection_string = Some(connection_string);
        Ok(())
    }

    #[must_use]
    pub fn connection_string(&self) -> Option<&str> {
        self.connection_string.as_deref()
    }

    /// New unopened handle from the stored connection string.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState` when no connection string was set, or
    /// `SessionError::InvalidArgument` when the backend rejects it.
    pub fn create_connection(&self) -> Result<C, SessionError> {
        let Some(connection_string) = self.connection_string.as_deref() else {
            return Err(SessionError::InvalidState(
                "no connection string has been set".into(),
            ));
        };
        C::from_connection_string(connection_string)
    }

    /// New unopened handle from `connection_string`. The stored default is left alone.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidArgument` when the string is blank or the backend
    /// rejects it.
    pub fn create_connection_with(&self, connection_string: &str) -> Result<C, SessionError> {
        require_connection_string(connection_string)?;
        C::from_connection_string(connection_string)
    }
}

impl<C: DbConnection> Default for ConnectionProvisioner<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for ConnectionProvisioner<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProvisioner")
            .field("connection_string", &self.connection_string)
            .finish()
    }
}
