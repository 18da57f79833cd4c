//! Diagnostic sink for session operations.
//!
//! The session never decides whether to log: every operation emits one info event
//! before touching the backend and one error event when it fails. A [`DbLogger`] only
//! decides where those events go.

use std::error::Error;

/// Severity levels understood by [`TracingLogger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    None,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Capability accepting leveled, free-text database events.
///
/// Implementations must not panic; the session calls them on every path, including
/// error paths.
pub trait DbLogger: Send + Sync {
    fn log_info(&self, message: &str);

    fn log_error(&self, message: &str, cause: Option<&(dyn Error + 'static)>);
}

/// Default sink: a best-effort `trace`-level write that never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl DbLogger for NullLogger {
    fn log_info(&self, message: &str) {
        tracing::trace!(target: "sql_session::null_logger", "{message}");
    }

    fn log_error(&self, message: &str, cause: Option<&(dyn Error + 'static)>) {
        match cause {
            Some(cause) => {
                tracing::trace!(target: "sql_session::null_logger", error = %cause, "{message}");
            }
            None => tracing::trace!(target: "sql_session::null_logger", "{message}"),
        }
    }
}

/// Forwards session events to `tracing`, dropping anything above `level`.
#[derive(Debug, Clone, Copy)]
pub struct TracingLogger {
    level: LogLevel,
}

impl TracingLogger {
    #[must_use]
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }

    #[must_use]
    pub fn level(&self) -> LogLevel {
        self.level
    }

    fn enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::None && level <= self.level
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

impl DbLogger for TracingLogger {
    fn log_info(&self, message: &str) {
        if self.enabled(LogLevel::Info) {
            tracing::info!(target: "sql_session", "{message}");
        }
    }

    fn log_error(&self, message: &str, cause: Option<&(dyn Error + 'static)>) {
        if !self.enabled(LogLevel::Error) {
            return;
        }
        match cause {
            Some(cause) => tracing::error!(target: "sql_session", error = %cause, "{message}"),
            None => tracing::error!(target: "sql_session", "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_threshold() {
        let quiet = TracingLogger::new(LogLevel::Error);
        assert!(quiet.enabled(LogLevel::Error));
        assert!(!quiet.enabled(LogLevel::Info));

        let off = TracingLogger::new(LogLevel::None);
        assert!(!off.enabled(LogLevel::Error));
        assert!(!off.enabled(LogLevel::None));

        assert!(TracingLogger::default().enabled(LogLevel::Info));
    }

    #[test]
    fn null_logger_accepts_everything() {
        let logger = NullLogger;
        let cause = std::io::Error::other("boom");
        logger.log_info("hello");
        logger.log_error("failed", Some(&cause));
        logger.log_error("failed", None);
    }
}
