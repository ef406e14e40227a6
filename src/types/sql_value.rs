use serde::{Deserialize, Serialize};

use crate::error::{RelExecError, Result};

/// Represents a SQL value in a driver-agnostic way.
/// Used both for bound parameters and for decoded column values.
/// Drivers are responsible for converting these to and from their native types.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// Declared data type of a bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DbType {
    Boolean,
    Int16,
    Int32,
    Int64,
    Float64,
    Text,
    Binary,
}

impl DbType {
    pub fn name(self) -> &'static str {
        match self {
            DbType::Boolean => "boolean",
            DbType::Int16 => "int16",
            DbType::Int32 => "int32",
            DbType::Int64 => "int64",
            DbType::Float64 => "float64",
            DbType::Text => "text",
            DbType::Binary => "binary",
        }
    }
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// The natural declared type of this value. NULL has none.
    pub fn db_type(&self) -> Option<DbType> {
        match self {
            SqlValue::Null => None,
            SqlValue::Bool(_) => Some(DbType::Boolean),
            SqlValue::Int16(_) => Some(DbType::Int16),
            SqlValue::Int32(_) => Some(DbType::Int32),
            SqlValue::Int64(_) => Some(DbType::Int64),
            SqlValue::Float64(_) => Some(DbType::Float64),
            SqlValue::Text(_) => Some(DbType::Text),
            SqlValue::Bytes(_) => Some(DbType::Binary),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.db_type().map_or("null", DbType::name)
    }

    /// Converts this value into the representation of `target`.
    /// Integer narrowing is checked; text is never parsed into numbers.
    /// `what` names the parameter or column in the error.
    pub fn coerce(&self, target: DbType, what: &str) -> Result<SqlValue> {
        let mismatch = || RelExecError::TypeMismatch {
            target: what.to_string(),
            expected: target.name(),
            found: self.type_name(),
        };

        let value = match (self, target) {
            (SqlValue::Null, _) => SqlValue::Null,
            (SqlValue::Bool(b), DbType::Boolean) => SqlValue::Bool(*b),
            (SqlValue::Int16(v), DbType::Int16) => SqlValue::Int16(*v),
            (SqlValue::Int16(v), DbType::Int32) => SqlValue::Int32(i32::from(*v)),
            (SqlValue::Int16(v), DbType::Int64) => SqlValue::Int64(i64::from(*v)),
            (SqlValue::Int32(v), DbType::Int16) => {
                SqlValue::Int16(i16::try_from(*v).map_err(|_| mismatch())?)
            }
            (SqlValue::Int32(v), DbType::Int32) => SqlValue::Int32(*v),
            (SqlValue::Int32(v), DbType::Int64) => SqlValue::Int64(i64::from(*v)),
            (SqlValue::Int64(v), DbType::Int16) => {
                SqlValue::Int16(i16::try_from(*v).map_err(|_| mismatch())?)
            }
            (SqlValue::Int64(v), DbType::Int32) => {
                SqlValue::Int32(i32::try_from(*v).map_err(|_| mismatch())?)
            }
            (SqlValue::Int64(v), DbType::Int64) => SqlValue::Int64(*v),
            (SqlValue::Int16(v), DbType::Float64) => SqlValue::Float64(f64::from(*v)),
            (SqlValue::Int32(v), DbType::Float64) => SqlValue::Float64(f64::from(*v)),
            (SqlValue::Float64(v), DbType::Float64) => SqlValue::Float64(*v),
            (SqlValue::Text(s), DbType::Text) => SqlValue::Text(s.clone()),
            (SqlValue::Bytes(b), DbType::Binary) => SqlValue::Bytes(b.clone()),
            _ => return Err(mismatch()),
        };
        Ok(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i16> for SqlValue {
    fn from(value: i16) -> Self {
        SqlValue::Int16(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int32(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int64(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float64(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Bytes(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}

/// Conversion from a decoded column value into a Rust type.
/// Used by [`Row::get`](crate::types::Row::get) for typed field lookup.
pub trait FromSqlValue: Sized {
    /// `column` is only used to describe a failed conversion.
    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self>;
}

fn mismatch(column: &str, expected: &'static str, value: &SqlValue) -> RelExecError {
    RelExecError::TypeMismatch {
        target: column.to_string(),
        expected,
        found: value.type_name(),
    }
}

impl FromSqlValue for bool {
    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self> {
        match value {
            SqlValue::Bool(b) => Ok(*b),
            other => Err(mismatch(column, "boolean", other)),
        }
    }
}

impl FromSqlValue for i16 {
    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self> {
        match value.coerce(DbType::Int16, column)? {
            SqlValue::Int16(v) => Ok(v),
            _ => Err(mismatch(column, "int16", value)),
        }
    }
}

impl FromSqlValue for i32 {
    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self> {
        match value.coerce(DbType::Int32, column)? {
            SqlValue::Int32(v) => Ok(v),
            _ => Err(mismatch(column, "int32", value)),
        }
    }
}

impl FromSqlValue for i64 {
    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self> {
        match value.coerce(DbType::Int64, column)? {
            SqlValue::Int64(v) => Ok(v),
            _ => Err(mismatch(column, "int64", value)),
        }
    }
}

impl FromSqlValue for f64 {
    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self> {
        match value.coerce(DbType::Float64, column)? {
            SqlValue::Float64(v) => Ok(v),
            _ => Err(mismatch(column, "float64", value)),
        }
    }
}

impl FromSqlValue for String {
    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self> {
        match value {
            SqlValue::Text(s) => Ok(s.clone()),
            other => Err(mismatch(column, "text", other)),
        }
    }
}

impl FromSqlValue for Vec<u8> {
    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self> {
        match value {
            SqlValue::Bytes(b) => Ok(b.clone()),
            other => Err(mismatch(column, "binary", other)),
        }
    }
}

impl FromSqlValue for SqlValue {
    fn from_sql_value(value: &SqlValue, _column: &str) -> Result<Self> {
        Ok(value.clone())
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(value: &SqlValue, column: &str) -> Result<Self> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql_value(other, column).map(Some),
        }
    }
}
