use std::sync::Arc;

use crate::error::{RelExecError, Result};

use super::sql_value::{FromSqlValue, SqlValue};

/// Driver-agnostic result set produced by one statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    /// Column names in order
    columns: Arc<[String]>,
    /// Rows, where each row is a vector of values in column order
    rows: Vec<Vec<SqlValue>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns: columns.into(),
            rows,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the number of rows in this result set.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if this result set contains no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Consumes the set, yielding row accessors in row order.
    pub fn into_rows(self) -> impl Iterator<Item = Row> {
        let columns = self.columns;
        self.rows.into_iter().map(move |values| Row {
            columns: Arc::clone(&columns),
            values,
        })
    }
}

/// Read-only accessor for a single row handed to a row mapper.
/// Fields are looked up by column name, case-sensitively, first match wins.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Creates a standalone row; rows normally come from [`ResultSet::into_rows`].
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self {
            columns: columns.into(),
            values,
        }
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Gets the raw value of a column, if present.
    pub fn value(&self, column: &str) -> Option<&SqlValue> {
        self.position(column).and_then(|i| self.values.get(i))
    }

    /// Gets a typed value by column name.
    /// Fails when the column is missing or the value does not convert.
    pub fn get<T: FromSqlValue>(&self, column: &str) -> Result<T> {
        let value = self
            .value(column)
            .ok_or_else(|| RelExecError::ColumnNotFound(column.to_string()))?;
        T::from_sql_value(value, column)
    }

    /// Gets a typed value, falling back to `default` when the column is missing or NULL.
    /// Conversion failures on a present, non-NULL value are still errors.
    pub fn get_or<T: FromSqlValue>(&self, column: &str, default: T) -> Result<T> {
        match self.value(column) {
            None | Some(SqlValue::Null) => Ok(default),
            Some(value) => T::from_sql_value(value, column),
        }
    }

    /// Gets a typed value by zero-based column position.
    pub fn get_by_index<T: FromSqlValue>(&self, index: usize) -> Result<T> {
        let value = self
            .values
            .get(index)
            .ok_or_else(|| RelExecError::ColumnNotFound(format!("#{index}")))?;
        let column = self.columns.get(index).map_or("", String::as_str);
        T::from_sql_value(value, column)
    }

    /// True when the column is missing or holds NULL.
    pub fn is_null(&self, column: &str) -> bool {
        self.value(column).map_or(true, SqlValue::is_null)
    }

    /// Returns all column names in this row.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the number of columns in this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if this row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Number of rows affected by a write or DDL statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowsAffected {
    Count(u64),
    /// The statement does not report a count (DDL and similar).
    NotApplicable,
}

impl RowsAffected {
    /// Integer form of [`RowsAffected::NotApplicable`].
    pub const NOT_APPLICABLE_SENTINEL: i64 = -1;

    /// The count as an integer, with `-1` standing for "not applicable".
    /// Counts beyond `i64::MAX` saturate.
    pub fn as_i64(self) -> i64 {
        match self {
            RowsAffected::Count(n) => i64::try_from(n).unwrap_or(i64::MAX),
            RowsAffected::NotApplicable => Self::NOT_APPLICABLE_SENTINEL,
        }
    }

    /// Folds the outcome of another statement of the same command into this one.
    /// Counts add up; the result is only `NotApplicable` when neither side reports a count.
    pub fn combine(self, other: RowsAffected) -> RowsAffected {
        match (self, other) {
            (RowsAffected::Count(a), RowsAffected::Count(b)) => {
                RowsAffected::Count(a.saturating_add(b))
            }
            (RowsAffected::Count(n), RowsAffected::NotApplicable)
            | (RowsAffected::NotApplicable, RowsAffected::Count(n)) => RowsAffected::Count(n),
            (RowsAffected::NotApplicable, RowsAffected::NotApplicable) => {
                RowsAffected::NotApplicable
            }
        }
    }
}
