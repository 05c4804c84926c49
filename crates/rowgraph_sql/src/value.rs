//! Driver-level values and column types.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::fmt;
use uuid::Uuid;

/// The JDBC type of a mapped column.
///
/// Drives parameter binding and the interpretation of values read back
/// from the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JdbcType {
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// 16-bit integer.
    SmallInt,
    /// Exact decimal.
    Decimal,
    /// Exact numeric (alias of decimal on most vendors).
    Numeric,
    /// Double precision float.
    Double,
    /// Variable length character data.
    Varchar,
    /// Fixed length character data (blank padded).
    Char,
    /// Variable length national character data.
    Nvarchar,
    /// Character large object.
    Clob,
    /// Boolean.
    Boolean,
    /// Single bit.
    Bit,
    /// Calendar date without time.
    Date,
    /// Date and time.
    Timestamp,
    /// Binary large object.
    Blob,
    /// Variable length binary data.
    Varbinary,
    /// Native UUID.
    Uuid,
}

impl JdbcType {
    /// Returns `true` for blank-padded character types.
    #[must_use]
    pub const fn is_fixed_char(self) -> bool {
        matches!(self, Self::Char)
    }

    /// Returns `true` for integral numeric types.
    #[must_use]
    pub const fn is_integral(self) -> bool {
        matches!(self, Self::Integer | Self::BigInt | Self::SmallInt)
    }
}

impl fmt::Display for JdbcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::SmallInt => "SMALLINT",
            Self::Decimal => "DECIMAL",
            Self::Numeric => "NUMERIC",
            Self::Double => "DOUBLE",
            Self::Varchar => "VARCHAR",
            Self::Char => "CHAR",
            Self::Nvarchar => "NVARCHAR",
            Self::Clob => "CLOB",
            Self::Boolean => "BOOLEAN",
            Self::Bit => "BIT",
            Self::Date => "DATE",
            Self::Timestamp => "TIMESTAMP",
            Self::Blob => "BLOB",
            Self::Varbinary => "VARBINARY",
            Self::Uuid => "UUID",
        };
        f.write_str(name)
    }
}

/// A value as exchanged with the driver.
///
/// Drivers return whatever representation they store (SQLite, for
/// instance, hands back dates as text); the engine converts per column
/// type and semantic type.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// Signed integer of any width.
    Integer(i64),
    /// Floating point value.
    Double(f64),
    /// Exact decimal value.
    Decimal(Decimal),
    /// Character data.
    Text(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// Calendar date.
    Date(NaiveDate),
    /// Date and time.
    Timestamp(NaiveDateTime),
    /// UUID.
    Uuid(Uuid),
}

impl SqlValue {
    /// Returns `true` if this is SQL NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the integer payload, if any.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "'{v}'"),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Self::Date(v) => write!(f, "{v}"),
            Self::Timestamp(v) => write!(f, "{v}"),
            Self::Uuid(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_detection() {
        assert!(SqlValue::Null.is_null());
        assert!(!SqlValue::Integer(0).is_null());
    }

    #[test]
    fn conversions() {
        assert_eq!(SqlValue::from("x").as_str(), Some("x"));
        assert_eq!(SqlValue::from(7_i32).as_i64(), Some(7));
        assert_eq!(SqlValue::from(true), SqlValue::Boolean(true));
    }

    #[test]
    fn jdbc_type_classification() {
        assert!(JdbcType::Char.is_fixed_char());
        assert!(!JdbcType::Varchar.is_fixed_char());
        assert!(JdbcType::BigInt.is_integral());
        assert_eq!(JdbcType::Timestamp.to_string(), "TIMESTAMP");
    }
}
