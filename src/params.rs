//! Parameter binding.
//!
//! Named parameters use the `@name` convention. Names are canonicalized when a
//! [`Parameter`] is built, so `id` and `@id` refer to the same slot, and absent values
//! are bound as [`DbValue::Null`].

use crate::command::Command;
use crate::error::SessionError;
use crate::types::DbValue;

/// Bind-marker prefix carried by every canonical parameter name.
pub const BIND_MARKER: char = '@';

/// Prefix `name` with [`BIND_MARKER`] unless it already carries it.
#[must_use]
pub fn canonical_name(name: &str) -> String {
    canonical_name_with(name, BIND_MARKER)
}

/// Prefix `name` with `marker` unless it already carries it.
#[must_use]
pub fn canonical_name_with(name: &str, marker: char) -> String {
    if name.starts_with(marker) {
        name.to_owned()
    } else {
        let mut canonical = String::with_capacity(name.len() + marker.len_utf8());
        canonical.push(marker);
        canonical.push_str(name);
        canonical
    }
}

/// A named value bound to a command.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    value: DbValue,
}

impl Parameter {
    /// Build a parameter; `None` values become [`DbValue::Null`].
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<DbValue>) -> Self {
        let name = name.into();
        Self {
            name: canonical_name(&name),
            value: value.into(),
        }
    }

    /// Canonical name, including the `@` marker.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without the marker, as Postgres named-argument notation expects it.
    #[must_use]
    pub fn bare_name(&self) -> &str {
        self.name.strip_prefix(BIND_MARKER).unwrap_or(&self.name)
    }

    #[must_use]
    pub fn value(&self) -> &DbValue {
        &self.value
    }

    #[must_use]
    pub fn into_value(self) -> DbValue {
        self.value
    }
}

impl<K, V> From<(K, V)> for Parameter
where
    K: Into<String>,
    V: Into<DbValue>,
{
    fn from((name, value): (K, V)) -> Self {
        Parameter::new(name, value)
    }
}

/// Attach `parameters` to `command`, skipping any name it already carries.
///
/// A missing command is an `InvalidArgument`; a missing or empty parameter collection
/// is a no-op.
///
/// # Errors
/// Returns `SessionError::InvalidArgument` when `command` is `None`.
pub fn bind_parameters<I, P>(
    command: Option<&mut Command>,
    parameters: Option<I>,
) -> Result<(), SessionError>
where
    I: IntoIterator<Item = P>,
    P: Into<Parameter>,
{
    let Some(command) = command else {
        return Err(SessionError::InvalidArgument(
            "command must not be null when binding parameters".into(),
        ));
    };
    let Some(parameters) = parameters else {
        return Ok(());
    };
    for parameter in parameters {
        command.push_parameter(parameter.into());
    }
    Ok(())
}
