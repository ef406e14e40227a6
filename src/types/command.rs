use std::time::Duration;

use super::parameter::{Parameter, ParameterDirection};
use super::sql_value::{DbType, SqlValue};

/// The mutable command a parameter binder populates before execution.
///
/// Holds the query text (fixed at creation), the bound parameters in binding
/// order and an optional per-command timeout.
#[derive(Debug, Clone)]
pub struct Command {
    text: String,
    parameters: Vec<Parameter>,
    timeout: Option<Duration>,
}

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Vec::new(),
            timeout: None,
        }
    }

    /// Bind an input parameter, inferring its type from the value.
    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> &mut Self {
        self.add_parameter(Parameter::new(name, value))
    }

    /// Bind an input parameter with a declared type.
    pub fn bind_typed(
        &mut self,
        name: impl Into<String>,
        value: impl Into<SqlValue>,
        db_type: DbType,
    ) -> &mut Self {
        self.add_parameter(Parameter::new(name, value).with_type(db_type))
    }

    /// Declare an output parameter of the given type.
    pub fn bind_output(&mut self, name: impl Into<String>, db_type: DbType) -> &mut Self {
        self.add_parameter(
            Parameter::new(name, SqlValue::Null)
                .with_type(db_type)
                .with_direction(ParameterDirection::Output),
        )
    }

    pub fn add_parameter(&mut self, parameter: Parameter) -> &mut Self {
        self.parameters.push(parameter);
        self
    }

    /// Overrides the executor's default timeout for this command only.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Looks up a parameter by name, with or without the `@` prefix.
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        let name = name.strip_prefix('@').unwrap_or(name);
        self.parameters.iter().find(|p| p.name() == name)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}
