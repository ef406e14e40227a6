use serde::{Deserialize, Serialize};

use super::sql_value::{DbType, SqlValue};

/// Direction of a bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl ParameterDirection {
    /// Whether the value travels to the database and so must match a placeholder.
    pub fn is_input(self) -> bool {
        matches!(self, ParameterDirection::Input | ParameterDirection::InputOutput)
    }
}

/// A named parameter attached to a [`Command`](super::Command).
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    pub value: SqlValue,
    pub db_type: DbType,
    pub direction: ParameterDirection,
}

impl Parameter {
    /// Creates an input parameter whose type is inferred from the value.
    /// NULL values default to [`DbType::Text`].
    /// The name may be written with or without the leading `@`.
    pub fn new(name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        let value = value.into();
        let db_type = value.db_type().unwrap_or(DbType::Text);
        Self {
            name: normalize_name(name.into()),
            value,
            db_type,
            direction: ParameterDirection::Input,
        }
    }

    pub fn with_type(mut self, db_type: DbType) -> Self {
        self.db_type = db_type;
        self
    }

    pub fn with_direction(mut self, direction: ParameterDirection) -> Self {
        self.direction = direction;
        self
    }

    /// The parameter name without the `@` prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value converted to the declared type.
    pub fn typed_value(&self) -> crate::Result<SqlValue> {
        self.value.coerce(self.db_type, &format!("@{}", self.name))
    }
}

fn normalize_name(name: String) -> String {
    match name.strip_prefix('@') {
        Some(stripped) => stripped.to_string(),
        None => name,
    }
}
