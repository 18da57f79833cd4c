use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

/// A value read from or bound to the database.
///
/// `DbValue::Null` is the explicit database-null marker; the binder substitutes it for
/// absent parameter values so no backend ever sees an omitted slot:
/// ```rust
/// use sql_session::prelude::*;
///
/// let values = vec![
///     DbValue::Int(1),
///     DbValue::from("alice"),
///     DbValue::from(None::<i64>),
/// ];
/// assert!(values[2].is_null());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    Json(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl DbValue {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let DbValue::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let DbValue::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DbValue::Bool(value) => Some(*value),
            DbValue::Int(1) => Some(true),
            DbValue::Int(0) => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let DbValue::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let DbValue::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let DbValue::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            // Try "YYYY-MM-DD HH:MM:SS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            // Try "YYYY-MM-DD HH:MM:SS.SSS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt);
            }
        }
        None
    }

    /// Lenient integer conversion for scalar results.
    ///
    /// Backends disagree on how they hand back `COUNT(*)` or a literal `1` (integer,
    /// numeric text, float), so callers converting a scalar should go through here.
    #[must_use]
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            DbValue::Int(i) => Some(*i),
            DbValue::Bool(b) => Some(i64::from(*b)),
            #[allow(clippy::cast_possible_truncation)]
            DbValue::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            DbValue::Text(s) => s.trim().parse().ok(),
            DbValue::Json(v) => v.as_i64(),
            _ => None,
        }
    }

    /// Lenient floating point conversion for scalar results.
    #[must_use]
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            DbValue::Float(f) => Some(*f),
            #[allow(clippy::cast_precision_loss)]
            DbValue::Int(i) => Some(*i as f64),
            DbValue::Text(s) => s.trim().parse().ok(),
            DbValue::Json(v) => v.as_f64(),
            _ => None,
        }
    }
}

impl From<i64> for DbValue {
    fn from(value: i64) -> Self {
        DbValue::Int(value)
    }
}

impl From<i32> for DbValue {
    fn from(value: i32) -> Self {
        DbValue::Int(i64::from(value))
    }
}

impl From<f64> for DbValue {
    fn from(value: f64) -> Self {
        DbValue::Float(value)
    }
}

impl From<bool> for DbValue {
    fn from(value: bool) -> Self {
        DbValue::Bool(value)
    }
}

impl From<&str> for DbValue {
    fn from(value: &str) -> Self {
        DbValue::Text(value.to_owned())
    }
}

impl From<String> for DbValue {
    fn from(value: String) -> Self {
        DbValue::Text(value)
    }
}

impl From<NaiveDateTime> for DbValue {
    fn from(value: NaiveDateTime) -> Self {
        DbValue::Timestamp(value)
    }
}

impl From<JsonValue> for DbValue {
    fn from(value: JsonValue) -> Self {
        DbValue::Json(value)
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(value: Vec<u8>) -> Self {
        DbValue::Blob(value)
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(DbValue::Null, Into::into)
    }
}

/// Lifecycle state of a connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Created but never opened.
    Unopened,
    /// Live link to the backend.
    Open,
    /// Previously open, now released (or disposed).
    Closed,
}

impl ConnectionState {
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}
