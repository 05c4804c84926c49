//! Conversion between semantic values and driver values.
//!
//! Reading applies a node's custom converter after the driver value has
//! been converted to the converter's stored type; writing applies it
//! before. `NULL` always maps to `NULL`.

use crate::error::{CoreError, CoreResult};
use crate::model::{Definitions, NodeType, SemanticType};
use crate::types::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rowgraph_sql::{JdbcType, SqlValue};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// Converts a driver value read from `node`'s column.
///
/// # Errors
///
/// Returns `TypeConversion` if the value does not fit the node's type, and
/// `Configuration` if the node names an unregistered converter.
pub fn from_sql(definitions: &dyn Definitions, node: &NodeType, value: SqlValue) -> CoreResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let jdbc_type = node.jdbc_type();
    match node.type_converter() {
        Some(id) => {
            let converter = converter(definitions, id)?;
            let stored = read(node, &converter.backwards_type(), jdbc_type, value)?;
            converter.convert_forwards(stored)
        }
        None => read(node, node.semantic_type(), jdbc_type, value),
    }
}

/// Converts a semantic value for binding to `node`'s column.
///
/// # Errors
///
/// Returns `TypeConversion` if the value does not fit the node's type, and
/// `Configuration` if the node names an unregistered converter.
pub fn to_sql(definitions: &dyn Definitions, node: &NodeType, value: &Value) -> CoreResult<SqlValue> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }
    let jdbc_type = node.jdbc_type();
    match node.type_converter() {
        Some(id) => {
            let converter = converter(definitions, id)?;
            let stored = converter.convert_backwards(value.clone())?;
            write(node, &converter.backwards_type(), jdbc_type, stored)
        }
        None => write(node, node.semantic_type(), jdbc_type, value.clone()),
    }
}

/// Converts an assigned value to the type `node` holds in memory.
///
/// Integers widen to longs and decimals, dates widen to timestamps, and
/// strings naming a variant become enum values. Any other mismatch is
/// rejected, so equal rows always carry equal values.
///
/// # Errors
///
/// Returns `TypeConversion` for values of another type, and
/// `Configuration` if the node names an unregistered converter.
pub fn coerce(definitions: &dyn Definitions, node: &NodeType, value: Value) -> CoreResult<Value> {
    match node.type_converter() {
        Some(id) => coerce_to(node, &converter(definitions, id)?.forwards_type(), value),
        None => coerce_to(node, node.semantic_type(), value),
    }
}

fn coerce_to(node: &NodeType, semantic: &SemanticType, value: Value) -> CoreResult<Value> {
    let converted = match (semantic, value) {
        (_, Value::Null) => Value::Null,
        (SemanticType::Long, Value::Integer(v)) => Value::Long(i64::from(v)),
        (SemanticType::Decimal, Value::Integer(v)) => Value::Decimal(Decimal::from(v)),
        (SemanticType::Decimal, Value::Long(v)) => Value::Decimal(Decimal::from(v)),
        (SemanticType::UtilDate, Value::Date(d)) => Value::Timestamp(d.and_time(NaiveTime::MIN)),
        (SemanticType::Enum(e), Value::String(s) | Value::Enum(s)) if e.ordinal_of(&s).is_some() => Value::Enum(s),
        (semantic, value) if holds(semantic, &value) => value,
        (semantic, value) => return Err(mismatch(node, semantic, &value)),
    };
    Ok(converted)
}

fn holds(semantic: &SemanticType, value: &Value) -> bool {
    matches!(
        (semantic, value),
        (SemanticType::Decimal, Value::Decimal(_))
            | (SemanticType::Boolean, Value::Boolean(_))
            | (SemanticType::Integer, Value::Integer(_))
            | (SemanticType::Long, Value::Long(_))
            | (SemanticType::SqlDate, Value::Date(_))
            | (SemanticType::UtilDate, Value::Timestamp(_))
            | (SemanticType::String, Value::String(_))
            | (SemanticType::Uuid, Value::Uuid(_))
            | (SemanticType::Bytes, Value::Bytes(_))
    )
}

/// Returns an epoch-millisecond view of a lock or timestamp value.
#[must_use]
pub fn as_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Long(v) => Some(*v),
        Value::Integer(v) => Some(i64::from(*v)),
        Value::Timestamp(ts) => Some(ts.and_utc().timestamp_millis()),
        _ => None,
    }
}

/// Converts epoch milliseconds to a timestamp.
#[must_use]
pub fn from_millis(millis: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

fn converter(definitions: &dyn Definitions, id: &str) -> CoreResult<std::sync::Arc<dyn crate::model::TypeConverter>> {
    definitions
        .type_converter(id)
        .ok_or_else(|| CoreError::configuration(format!("type converter '{id}' is not registered")))
}

fn mismatch(node: &NodeType, expected: &SemanticType, found: &dyn std::fmt::Debug) -> CoreError {
    CoreError::type_conversion(format!(
        "cannot convert {found:?} for node '{}' to {expected:?}",
        node.name()
    ))
}

fn read(node: &NodeType, semantic: &SemanticType, jdbc_type: Option<JdbcType>, value: SqlValue) -> CoreResult<Value> {
    let fail = |v: &SqlValue| mismatch(node, semantic, v);
    let converted = match (semantic, &value) {
        (SemanticType::Decimal, SqlValue::Decimal(d)) => Some(Value::Decimal(*d)),
        (SemanticType::Decimal, SqlValue::Integer(i)) => Some(Value::Decimal(Decimal::from(*i))),
        (SemanticType::Decimal, SqlValue::Double(f)) => Decimal::from_f64(*f).map(Value::Decimal),
        (SemanticType::Decimal, SqlValue::Text(s)) => s.trim().parse().ok().map(Value::Decimal),

        (SemanticType::Boolean, SqlValue::Boolean(b)) => Some(Value::Boolean(*b)),
        (SemanticType::Boolean, SqlValue::Integer(0)) => Some(Value::Boolean(false)),
        (SemanticType::Boolean, SqlValue::Integer(1)) => Some(Value::Boolean(true)),

        (SemanticType::Enum(e), SqlValue::Integer(i)) => usize::try_from(*i)
            .ok()
            .and_then(|i| e.variant(i))
            .map(|v| Value::Enum(v.to_string())),
        (SemanticType::Enum(e), SqlValue::Text(s)) => match e.ordinal_of(s) {
            Some(_) => Some(Value::Enum(s.clone())),
            None => s
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| e.variant(i))
                .map(|v| Value::Enum(v.to_string())),
        },

        (SemanticType::Integer, SqlValue::Integer(i)) => i32::try_from(*i).ok().map(Value::Integer),
        (SemanticType::Integer, SqlValue::Text(s)) => s.trim().parse().ok().map(Value::Integer),

        (SemanticType::Long, SqlValue::Integer(i)) => Some(Value::Long(*i)),
        (SemanticType::Long, SqlValue::Timestamp(ts)) => Some(Value::Long(ts.and_utc().timestamp_millis())),
        (SemanticType::Long, SqlValue::Text(s)) if jdbc_type == Some(JdbcType::Timestamp) => {
            parse_timestamp(s).map(|ts| Value::Long(ts.and_utc().timestamp_millis()))
        }
        (SemanticType::Long, SqlValue::Text(s)) => s.trim().parse().ok().map(Value::Long),

        (SemanticType::SqlDate, SqlValue::Date(d)) => Some(Value::Date(*d)),
        (SemanticType::SqlDate, SqlValue::Timestamp(ts)) => Some(Value::Date(ts.date())),
        (SemanticType::SqlDate, SqlValue::Text(s)) => parse_date(s).map(Value::Date),

        (SemanticType::UtilDate, SqlValue::Timestamp(ts)) => Some(Value::Timestamp(*ts)),
        (SemanticType::UtilDate, SqlValue::Date(d)) => Some(Value::Timestamp(d.and_time(NaiveTime::MIN))),
        (SemanticType::UtilDate, SqlValue::Integer(ms)) => from_millis(*ms).map(Value::Timestamp),
        (SemanticType::UtilDate, SqlValue::Text(s)) => parse_timestamp(s).map(Value::Timestamp),

        (SemanticType::String, SqlValue::Text(s)) => {
            if jdbc_type.is_some_and(JdbcType::is_fixed_char) {
                Some(Value::String(s.trim().to_string()))
            } else {
                Some(Value::String(s.clone()))
            }
        }
        (SemanticType::String, SqlValue::Uuid(u)) => Some(Value::String(u.to_string())),

        (SemanticType::Uuid, SqlValue::Uuid(u)) => Some(Value::Uuid(*u)),
        (SemanticType::Uuid, SqlValue::Text(s)) => Uuid::parse_str(s.trim()).ok().map(Value::Uuid),
        (SemanticType::Uuid, SqlValue::Bytes(b)) => Uuid::from_slice(b).ok().map(Value::Uuid),

        (SemanticType::Bytes, SqlValue::Bytes(b)) => Some(Value::Bytes(b.clone())),
        _ => None,
    };
    converted.ok_or_else(|| fail(&value))
}

fn write(node: &NodeType, semantic: &SemanticType, jdbc_type: Option<JdbcType>, value: Value) -> CoreResult<SqlValue> {
    let integral = jdbc_type.is_some_and(JdbcType::is_integral);
    let textual = matches!(
        jdbc_type,
        Some(JdbcType::Varchar | JdbcType::Char | JdbcType::Nvarchar | JdbcType::Clob)
    );
    let binary = matches!(jdbc_type, Some(JdbcType::Blob | JdbcType::Varbinary));

    let converted = match (semantic, value) {
        (_, Value::Null) => Some(SqlValue::Null),
        (SemanticType::Enum(e), Value::Enum(name) | Value::String(name)) => e
            .ordinal_of(&name)
            .and_then(|i| i64::try_from(i).ok())
            .map(SqlValue::Integer),
        (_, Value::Boolean(b)) if integral => Some(SqlValue::Integer(i64::from(b))),
        (_, Value::Boolean(b)) => Some(SqlValue::Boolean(b)),
        (_, Value::Integer(i)) => Some(SqlValue::Integer(i64::from(i))),
        (_, Value::Long(ms)) if jdbc_type == Some(JdbcType::Timestamp) => from_millis(ms).map(SqlValue::Timestamp),
        (_, Value::Long(l)) => Some(SqlValue::Integer(l)),
        (_, Value::Decimal(d)) => Some(SqlValue::Decimal(d)),
        (_, Value::String(s)) => Some(SqlValue::Text(s)),
        (_, Value::Uuid(u)) if textual => Some(SqlValue::Text(u.to_string())),
        (_, Value::Uuid(u)) if binary => Some(SqlValue::Bytes(u.as_bytes().to_vec())),
        (_, Value::Uuid(u)) => Some(SqlValue::Uuid(u)),
        (_, Value::Bytes(b)) => Some(SqlValue::Bytes(b)),
        (_, Value::Date(d)) => Some(SqlValue::Date(d)),
        (_, Value::Timestamp(ts)) if jdbc_type == Some(JdbcType::Date) => Some(SqlValue::Date(ts.date())),
        (_, Value::Timestamp(ts)) => Some(SqlValue::Timestamp(ts)),
        (_, Value::Enum(name)) => {
            return Err(CoreError::type_conversion(format!(
                "node '{}' is not an enum, cannot write variant '{name}'",
                node.name()
            )))
        }
    };
    converted.ok_or_else(|| {
        CoreError::type_conversion(format!(
            "value for node '{}' does not fit {semantic:?}",
            node.name()
        ))
    })
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text.get(..10).unwrap_or(text), "%Y-%m-%d").ok()
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| parse_date(text).map(|d| d.and_time(NaiveTime::MIN)))
}
