use std::time::Duration;

use rusqlite::OpenFlags;

use crate::error::SessionError;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// How the database file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqliteOpenMode {
    #[default]
    ReadWriteCreate,
    ReadWrite,
    ReadOnly,
    Memory,
}

/// Parsed `SQLite` connection string.
///
/// Accepts either a bare path (`app.db`, `:memory:`) or `key=value` pairs separated by
/// `;`, e.g. `Data Source=app.db;Mode=ReadWrite;Foreign Keys=True`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConnectOptions {
    pub data_source: String,
    pub mode: SqliteOpenMode,
    pub busy_timeout: Duration,
    pub foreign_keys: Option<bool>,
    pub journal_mode: Option<String>,
}

impl SqliteConnectOptions {
    #[must_use]
    pub fn new(data_source: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            mode: SqliteOpenMode::default(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            foreign_keys: None,
            journal_mode: None,
        }
    }

    /// Parse a connection string.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidArgument` for empty strings, unknown keys or
    /// malformed values.
    pub fn parse(connection_string: &str) -> Result<Self, SessionError> {
        let trimmed = connection_string.trim();
        if trimmed.is_empty() {
            return Err(invalid("connection string is empty"));
        }
        if !trimmed.contains('=') {
            return Ok(Self::new(trimmed));
        }

        let mut data_source = None;
        let mut opts = Self::new(String::new());
        for pair in trimmed.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((key, value)) = pair.split_once('=') else {
                return Err(invalid(&format!("expected key=value, got `{pair}`")));
            };
            let value = value.trim();
            match normalize_key(key).as_str() {
                "datasource" | "filename" => data_source = Some(value.to_owned()),
                "mode" => opts.mode = parse_mode(value)?,
                "defaulttimeout" | "busytimeout" => {
                    let secs: u64 = value
                        .parse()
                        .map_err(|_| invalid(&format!("timeout must be whole seconds: `{value}`")))?;
                    opts.busy_timeout = Duration::from_secs(secs);
                }
                "foreignkeys" => opts.foreign_keys = Some(parse_bool(value)?),
                "journalmode" => {
                    if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphabetic()) {
                        return Err(invalid(&format!("invalid journal mode `{value}`")));
                    }
                    opts.journal_mode = Some(value.to_ascii_uppercase());
                }
                "version" => {
                    if value != "3" {
                        return Err(invalid(&format!("unsupported SQLite version `{value}`")));
                    }
                }
                other => return Err(invalid(&format!("unknown connection string key `{other}`"))),
            }
        }

        opts.data_source = match (data_source, opts.mode) {
            (Some(source), _) if !source.is_empty() => source,
            (_, SqliteOpenMode::Memory) => ":memory:".to_owned(),
            _ => return Err(invalid("connection string has no Data Source")),
        };
        Ok(opts)
    }

    pub(crate) fn is_memory(&self) -> bool {
        self.mode == SqliteOpenMode::Memory || self.data_source == ":memory:"
    }

    pub(crate) fn open_flags(&self) -> OpenFlags {
        let base = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        match self.mode {
            SqliteOpenMode::ReadWriteCreate | SqliteOpenMode::Memory => {
                base | OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            }
            SqliteOpenMode::ReadWrite => base | OpenFlags::SQLITE_OPEN_READ_WRITE,
            SqliteOpenMode::ReadOnly => base | OpenFlags::SQLITE_OPEN_READ_ONLY,
        }
    }

    /// Open the database and apply the configured pragmas. Blocking.
    pub(crate) fn connect(&self) -> Result<rusqlite::Connection, SessionError> {
        let conn = if self.is_memory() {
            rusqlite::Connection::open_in_memory_with_flags(self.open_flags())?
        } else {
            rusqlite::Connection::open_with_flags(&self.data_source, self.open_flags())?
        };
        conn.busy_timeout(self.busy_timeout)?;
        if let Some(enabled) = self.foreign_keys {
            conn.execute_batch(if enabled {
                "PRAGMA foreign_keys = ON;"
            } else {
                "PRAGMA foreign_keys = OFF;"
            })?;
        }
        if let Some(mode) = &self.journal_mode {
            // journal_mode reports the mode it settled on
            let _applied: String =
                conn.query_row(&format!("PRAGMA journal_mode = {mode}"), [], |row| row.get(0))?;
        }
        Ok(conn)
    }
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn parse_mode(value: &str) -> Result<SqliteOpenMode, SessionError> {
    match normalize_key(value).as_str() {
        "readwritecreate" => Ok(SqliteOpenMode::ReadWriteCreate),
        "readwrite" => Ok(SqliteOpenMode::ReadWrite),
        "readonly" => Ok(SqliteOpenMode::ReadOnly),
        "memory" => Ok(SqliteOpenMode::Memory),
        _ => Err(invalid(&format!("unknown open mode `{value}`"))),
    }
}

fn parse_bool(value: &str) -> Result<bool, SessionError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(&format!("expected a boolean, got `{value}`"))),
    }
}

fn invalid(msg: &str) -> SessionError {
    SessionError::InvalidArgument(format!("SQLite connection string: {msg}"))
}
