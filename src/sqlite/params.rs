use rusqlite::Statement;
use rusqlite::types::Value;

use crate::command::Command;
use crate::error::SessionError;
use crate::types::DbValue;

/// Convert a single [`DbValue`] to a rusqlite `Value`.
///
/// `SQLite` has no boolean, timestamp or JSON storage class: booleans become integers,
/// timestamps ISO-8601 text and JSON its serialized text.
#[must_use]
pub fn db_value_to_sqlite_value(value: &DbValue) -> Value {
    match value {
        DbValue::Int(i) => Value::Integer(*i),
        DbValue::Float(f) => Value::Real(*f),
        DbValue::Text(s) => Value::Text(s.clone()),
        DbValue::Bool(b) => Value::Integer(i64::from(*b)),
        DbValue::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        DbValue::Null => Value::Null,
        DbValue::Json(jval) => Value::Text(jval.to_string()),
        DbValue::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Named parameters converted once, ready to move into a blocking task.
#[derive(Debug, Clone, Default)]
pub(crate) struct NamedParams(Vec<(String, Value)>);

impl NamedParams {
    pub(crate) fn from_command(command: &Command) -> Self {
        Self(
            command
                .parameters()
                .iter()
                .map(|p| (p.name().to_owned(), db_value_to_sqlite_value(p.value())))
                .collect(),
        )
    }

    fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Bind every parameter `stmt` references. Values the statement never mentions
    /// are ignored.
    pub(crate) fn bind(&self, stmt: &mut Statement<'_>) -> Result<(), SessionError> {
        for idx in 1..=stmt.parameter_count() {
            let Some(name) = stmt.parameter_name(idx).map(str::to_owned) else {
                return Err(SessionError::InvalidArgument(format!(
                    "positional parameter {idx} is not supported; use @name markers"
                )));
            };
            let Some(value) = self.get(&name) else {
                return Err(SessionError::InvalidArgument(format!(
                    "no value bound for parameter {name}"
                )));
            };
            stmt.raw_bind_parameter(idx, value)?;
        }
        Ok(())
    }
}
