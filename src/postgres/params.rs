use std::error::Error;

use chrono::{TimeZone, Utc};
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_util::bytes;

use crate::command::Command;
use crate::error::SessionError;
use crate::types::DbValue;

/// Values for `$1..$N`, looked up by the canonical marker names a translated command
/// references.
///
/// # Errors
/// Returns `SessionError::InvalidArgument` if a referenced name has no bound value.
pub fn positional_values(command: &Command, names: &[String]) -> Result<Vec<DbValue>, SessionError> {
    names
        .iter()
        .map(|name| {
            command
                .parameter(name)
                .map(|p| p.value().clone())
                .ok_or_else(|| {
                    SessionError::InvalidArgument(format!("no value bound for parameter {name}"))
                })
        })
        .collect()
}

/// Borrow values as the trait objects `tokio-postgres` binds.
#[must_use]
pub fn as_refs(values: &[DbValue]) -> Vec<&(dyn ToSql + Sync)> {
    values.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

impl ToSql for DbValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            DbValue::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                _ => i.to_sql_checked(ty, out),
            },
            DbValue::Float(f) => match *ty {
                #[allow(clippy::cast_possible_truncation)]
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                _ => f.to_sql_checked(ty, out),
            },
            DbValue::Text(s) => s.to_sql_checked(ty, out),
            DbValue::Bool(b) => b.to_sql_checked(ty, out),
            DbValue::Timestamp(dt) => match *ty {
                Type::TIMESTAMPTZ => Utc.from_utc_datetime(dt).to_sql(ty, out),
                Type::DATE => dt.date().to_sql(ty, out),
                _ => dt.to_sql_checked(ty, out),
            },
            DbValue::Null => Ok(IsNull::Yes),
            DbValue::Json(jsval) => jsval.to_sql_checked(ty, out),
            DbValue::Blob(bytes) => bytes.to_sql_checked(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::TEXT
                | Type::VARCHAR
                | Type::CHAR
                | Type::BPCHAR
                | Type::NAME
                | Type::UNKNOWN
                | Type::BOOL
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::DATE
                | Type::JSON
                | Type::JSONB
                | Type::BYTEA
        )
    }

    to_sql_checked!();
}
