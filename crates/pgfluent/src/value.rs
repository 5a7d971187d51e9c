//! Dynamic SQL values: JSON scalars bound as statement parameters, and
//! result rows decoded back into JSON objects.
//!
//! Payloads arrive as `serde_json::Value`, so parameter types are not known
//! until Postgres infers them from the statement context. `SqlValue::to_sql`
//! delegates to the primitive `ToSql` impl matching the inferred type, which
//! also lets text values coerce to uuid/timestamp/int targets.

use crate::error::{QueryError, QueryResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::error::Error;
use tokio_postgres::Row;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use uuid::Uuid;

/// A parameter value carried by a statement before its Postgres type is known.
#[derive(Clone, Debug)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(Value),
}

impl SqlValue {
    /// Convert a JSON scalar into a bindable value. Arrays and objects bind
    /// as json/jsonb parameters.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::Int(i)
                } else {
                    SqlValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => SqlValue::Text(s),
            other => SqlValue::Json(other),
        }
    }
}

type ToSqlError = Box<dyn Error + Sync + Send>;

fn unsupported(value: &SqlValue, ty: &Type) -> ToSqlError {
    format!("cannot bind {:?} as postgres type {}", value, ty).into()
}

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut bytes::BytesMut) -> Result<IsNull, ToSqlError> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                Type::TEXT | Type::VARCHAR => b.to_string().to_sql(ty, out),
                Type::JSON | Type::JSONB => Value::Bool(*b).to_sql(ty, out),
                _ => Err(unsupported(self, ty)),
            },
            SqlValue::Int(i) => match *ty {
                Type::INT2 => (*i as i16).to_sql(ty, out),
                Type::INT4 => (*i as i32).to_sql(ty, out),
                Type::INT8 => i.to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                Type::NUMERIC => Decimal::from(*i).to_sql(ty, out),
                Type::TEXT | Type::VARCHAR => i.to_string().to_sql(ty, out),
                Type::JSON | Type::JSONB => Value::from(*i).to_sql(ty, out),
                _ => Err(unsupported(self, ty)),
            },
            SqlValue::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::FLOAT8 => f.to_sql(ty, out),
                Type::NUMERIC => Decimal::try_from(*f)?.to_sql(ty, out),
                Type::TEXT | Type::VARCHAR => f.to_string().to_sql(ty, out),
                Type::JSON | Type::JSONB => Value::from(*f).to_sql(ty, out),
                _ => Err(unsupported(self, ty)),
            },
            SqlValue::Text(s) => match *ty {
                Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => s.to_sql(ty, out),
                Type::UUID => Uuid::parse_str(s)?.to_sql(ty, out),
                Type::BOOL => s.parse::<bool>()?.to_sql(ty, out),
                Type::INT2 => s.parse::<i16>()?.to_sql(ty, out),
                Type::INT4 => s.parse::<i32>()?.to_sql(ty, out),
                Type::INT8 => s.parse::<i64>()?.to_sql(ty, out),
                Type::FLOAT4 => s.parse::<f32>()?.to_sql(ty, out),
                Type::FLOAT8 => s.parse::<f64>()?.to_sql(ty, out),
                Type::NUMERIC => s.parse::<Decimal>()?.to_sql(ty, out),
                Type::TIMESTAMPTZ => DateTime::parse_from_rfc3339(s)?
                    .with_timezone(&Utc)
                    .to_sql(ty, out),
                Type::TIMESTAMP => s.parse::<NaiveDateTime>()?.to_sql(ty, out),
                Type::DATE => s.parse::<NaiveDate>()?.to_sql(ty, out),
                Type::JSON | Type::JSONB => Value::String(s.clone()).to_sql(ty, out),
                _ => Err(unsupported(self, ty)),
            },
            SqlValue::Json(v) => match *ty {
                Type::JSON | Type::JSONB => v.to_sql(ty, out),
                Type::TEXT | Type::VARCHAR => v.to_string().to_sql(ty, out),
                _ => Err(unsupported(self, ty)),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // Compatibility is decided per-value in to_sql; accepting everything
        // keeps type inference in Postgres' hands.
        true
    }

    to_sql_checked!();
}

/// Decode a result row into a JSON object keyed by column name.
pub fn row_to_json(row: &Row) -> QueryResult<Map<String, Value>> {
    let mut out = Map::with_capacity(row.columns().len());
    for (idx, col) in row.columns().iter().enumerate() {
        let name = col.name().to_string();
        let value = decode_column(row, idx, col.type_())
            .map_err(|e| QueryError::decode(&name, e.to_string()))?;
        out.insert(name, value);
    }
    Ok(out)
}

fn decode_column(row: &Row, idx: usize, ty: &Type) -> Result<Value, tokio_postgres::Error> {
    let value = match *ty {
        Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)?
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| Value::from(v as i64))
            .unwrap_or(Value::Null),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|v| Value::from(v as i64))
            .unwrap_or(Value::Null),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(idx)?
            .map(Value::from)
            .unwrap_or(Value::Null),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| Value::from(v as f64))
            .unwrap_or(Value::Null),
        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)?
            .map(Value::from)
            .unwrap_or(Value::Null),
        // numeric is carried as a string so precision is never lost
        Type::NUMERIC => row
            .try_get::<_, Option<Decimal>>(idx)?
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<Value>>(idx)?
            .unwrap_or(Value::Null),
        Type::UUID => row
            .try_get::<_, Option<Uuid>>(idx)?
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|v| Value::String(v.to_rfc3339()))
            .unwrap_or(Value::Null),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<_, Option<String>>(idx)?
            .map(Value::String)
            .unwrap_or(Value::Null),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_scalars_map_to_sql_values() {
        assert!(matches!(SqlValue::from_json(json!(null)), SqlValue::Null));
        assert!(matches!(SqlValue::from_json(json!(true)), SqlValue::Bool(true)));
        assert!(matches!(SqlValue::from_json(json!(42)), SqlValue::Int(42)));
        assert!(matches!(SqlValue::from_json(json!("x")), SqlValue::Text(_)));
    }

    #[test]
    fn json_composites_bind_as_json() {
        assert!(matches!(
            SqlValue::from_json(json!({"a": 1})),
            SqlValue::Json(_)
        ));
        assert!(matches!(SqlValue::from_json(json!([1, 2])), SqlValue::Json(_)));
    }

    #[test]
    fn fractional_numbers_map_to_float() {
        assert!(matches!(SqlValue::from_json(json!(1.5)), SqlValue::Float(_)));
    }

    fn binds_as(value: SqlValue, ty: &Type) -> bool {
        let mut buf = bytes::BytesMut::new();
        value.to_sql_checked(ty, &mut buf).is_ok()
    }

    #[test]
    fn numeric_columns_bind_through_decimal() {
        assert!(binds_as(SqlValue::Int(42), &Type::NUMERIC));
        assert!(binds_as(SqlValue::Float(12.5), &Type::NUMERIC));
        assert!(binds_as(SqlValue::Text("99.95".to_string()), &Type::NUMERIC));
        assert!(!binds_as(SqlValue::Text("not a number".to_string()), &Type::NUMERIC));
    }

    #[test]
    fn numeric_columns_decode_through_decimal_not_string() {
        use tokio_postgres::types::FromSql;
        // The generic text fallback cannot read numeric columns; the decoder
        // must route them through Decimal.
        assert!(!<String as FromSql>::accepts(&Type::NUMERIC));
        assert!(<Decimal as FromSql>::accepts(&Type::NUMERIC));
    }

    #[test]
    fn every_scalar_binds_to_jsonb() {
        assert!(binds_as(SqlValue::Bool(true), &Type::JSONB));
        assert!(binds_as(SqlValue::Int(1), &Type::JSONB));
        assert!(binds_as(SqlValue::Float(1.5), &Type::JSONB));
        assert!(binds_as(SqlValue::Text("x".to_string()), &Type::JSONB));
    }
}
