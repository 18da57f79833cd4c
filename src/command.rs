use std::sync::LazyLock;

use regex::Regex;

use crate::params::Parameter;
use crate::types::DbValue;

/// How the backend should interpret the command text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommandKind {
    /// Plain SQL in the backend's native dialect.
    #[default]
    Text,
    /// The text names a stored procedure; bound parameters become its arguments.
    StoredProcedure,
}

/// Identifies the category of a command, for logging and tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCategory {
    Unknown,
    Select,
    Insert,
    Update,
    Delete,
    StoredProcedure,
    Maintenance,
    Utility,
    Security,
}

static LEADING_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    // skip leading whitespace, line comments and block comments
    Regex::new(r"^(?:\s+|--[^\n]*(?:\n|$)|/\*(?s:.*?)\*/)*([A-Za-z]+)")
        .expect("leading keyword pattern is valid")
});

impl CommandCategory {
    /// Classify a command by its kind and leading SQL keyword.
    #[must_use]
    pub fn classify(kind: CommandKind, text: &str) -> Self {
        if kind == CommandKind::StoredProcedure {
            return CommandCategory::StoredProcedure;
        }
        let Some(keyword) = LEADING_KEYWORD
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_ascii_uppercase())
        else {
            return CommandCategory::Unknown;
        };
        match keyword.as_str() {
            "SELECT" | "WITH" | "VALUES" | "SHOW" | "EXPLAIN" => CommandCategory::Select,
            "INSERT" | "REPLACE" | "COPY" => CommandCategory::Insert,
            "UPDATE" | "MERGE" | "UPSERT" => CommandCategory::Update,
            "DELETE" | "TRUNCATE" => CommandCategory::Delete,
            "CALL" | "EXEC" | "EXECUTE" => CommandCategory::StoredProcedure,
            "CREATE" | "ALTER" | "DROP" | "VACUUM" | "ANALYZE" | "REINDEX" | "CLUSTER" => {
                CommandCategory::Maintenance
            }
            "GRANT" | "REVOKE" => CommandCategory::Security,
            "PRAGMA" | "SET" | "BEGIN" | "COMMIT" | "ROLLBACK" | "ATTACH" | "DETACH" => {
                CommandCategory::Utility
            }
            _ => CommandCategory::Unknown,
        }
    }
}

/// A command text, its bound parameters and how to interpret the text.
///
/// Built fluently; every `bind` goes through the parameter binder, so names are
/// canonicalized to carry the `@` marker and repeated names keep their first value:
/// ```rust
/// use sql_session::prelude::*;
///
/// let cmd = Command::text("SELECT * FROM users WHERE id = @id AND name = @name")
///     .bind("id", 7)
///     .bind("@name", None::<String>);
/// assert_eq!(cmd.parameters()[0].name(), "@id");
/// assert!(cmd.parameters()[1].value().is_null());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    text: String,
    kind: CommandKind,
    parameters: Vec<Parameter>,
}

impl Command {
    #[must_use]
    pub fn new(text: impl Into<String>, kind: CommandKind) -> Self {
        Self {
            text: text.into(),
            kind,
            parameters: Vec::new(),
        }
    }

    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(text, CommandKind::Text)
    }

    #[must_use]
    pub fn stored_procedure(name: impl Into<String>) -> Self {
        Self::new(name, CommandKind::StoredProcedure)
    }

    /// Bind one named value.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<DbValue>) -> Self {
        self.push_parameter(Parameter::new(name, value));
        self
    }

    /// Bind a collection of named values or pre-built parameters.
    #[must_use]
    pub fn bind_all<I, P>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Parameter>,
    {
        for parameter in parameters {
            self.push_parameter(parameter.into());
        }
        self
    }

    #[must_use]
    pub fn command_text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Look up a bound parameter by name (with or without the marker).
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        let canonical = crate::params::canonical_name(name);
        self.parameters.iter().find(|p| p.name() == canonical)
    }

    #[must_use]
    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameter(name).is_some()
    }

    #[must_use]
    pub fn category(&self) -> CommandCategory {
        CommandCategory::classify(self.kind, &self.text)
    }

    /// Append a parameter that is already canonical, unless its name is taken.
    /// Returns whether the parameter was added.
    pub(crate) fn push_parameter(&mut self, parameter: Parameter) -> bool {
        if self.parameters.iter().any(|p| p.name() == parameter.name()) {
            return false;
        }
        self.parameters.push(parameter);
        true
    }
}

impl From<&str> for Command {
    fn from(text: &str) -> Self {
        Command::text(text)
    }
}

impl From<String> for Command {
    fn from(text: String) -> Self {
        Command::text(text)
    }
}

impl From<&String> for Command {
    fn from(text: &String) -> Self {
        Command::text(text.as_str())
    }
}
