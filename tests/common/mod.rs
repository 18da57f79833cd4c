#![allow(dead_code)]

use std::error::Error;
use std::sync::{Arc, Mutex};

use sql_session::prelude::*;
use tempfile::tempdir;

pub fn unique_db_path(prefix: &str) -> String {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join(format!("{prefix}.db"));
    // Leak the tempdir so the file outlives every connection the test opens.
    std::mem::forget(dir);
    path.to_string_lossy().into_owned()
}

/// Records every event so tests can assert on what the session logged.
#[derive(Default)]
pub struct RecordingLogger {
    events: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<(LogLevel, String)> {
        self.events.lock().expect("logger lock").clone()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.events().iter().filter(|(l, _)| *l == level).count()
    }

    pub fn clear(&self) {
        self.events.lock().expect("logger lock").clear();
    }
}

impl DbLogger for RecordingLogger {
    fn log_info(&self, message: &str) {
        self.events
            .lock()
            .expect("logger lock")
            .push((LogLevel::Info, message.to_owned()));
    }

    fn log_error(&self, message: &str, cause: Option<&(dyn Error + 'static)>) {
        let line = match cause {
            Some(cause) => format!("{message}: {cause}"),
            None => message.to_owned(),
        };
        self.events
            .lock()
            .expect("logger lock")
            .push((LogLevel::Error, line));
    }
}

/// Session over a fresh file with a `people` table already created.
pub async fn people_session(prefix: &str) -> Result<Session<SqliteConnection>, SessionError> {
    let path = unique_db_path(prefix);
    let mut session: Session<SqliteConnection> = Session::new(SessionOptions::new(path))?;
    let cancel = CancellationToken::new();
    session
        .execute_non_query(
            "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score REAL)",
            &cancel,
        )
        .await?;
    Ok(session)
}

pub async fn count_people(session: &mut Session<SqliteConnection>) -> Result<i64, SessionError> {
    let value = session
        .execute_scalar("SELECT COUNT(*) FROM people", &CancellationToken::new())
        .await?;
    Ok(value.and_then(|v| v.to_i64()).unwrap_or_default())
}
