use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Command, ResultSet, RowsAffected};

/// Trait for database driver implementations, one per supported engine.
/// Drivers are responsible for:
/// - Opening connections from a connection string
/// - Translating `@name` placeholders and `SqlValue` parameters to native form
/// - Executing commands and converting results to `ResultSet`s
#[async_trait]
pub trait Driver: Send + Sync {
    /// Stable identifier of the engine this driver talks to, e.g. `postgres`.
    fn invariant_name(&self) -> &'static str;

    /// Other names the driver answers to in a [`DriverRegistry`](crate::DriverRegistry).
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// Open a new connection to the target described by `connection_string`.
    async fn connect(&self, connection_string: &str) -> Result<Box<dyn Connection>>;
}

/// An open connection, used by exactly one executor call at a time.
#[async_trait]
pub trait Connection: Send {
    /// Run every statement of the command and return one result set per
    /// row-returning statement, in statement order.
    async fn query(&mut self, command: &Command) -> Result<Vec<ResultSet>>;

    /// Run every statement of the command and report the rows affected.
    async fn execute(&mut self, command: &Command) -> Result<RowsAffected>;

    /// Ask the engine to abandon the statement in flight, if it supports that.
    async fn cancel(&mut self) -> Result<()> {
        Ok(())
    }
}
