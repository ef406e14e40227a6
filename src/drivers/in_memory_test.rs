use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{RelExecError, Result};
use crate::sql::{bind_named, PlaceholderStyle};
use crate::traits::{Connection, Driver};
use crate::types::{Command, Parameter, ResultSet, RowsAffected, SqlValue};

/// Invariant name of [`InMemoryTestDriver`].
pub const IN_MEMORY_INVARIANT_NAME: &str = "in-memory";

/// A recorded command execution for verification.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    pub sql: String,
    pub parameters: Vec<Parameter>,
}

impl RecordedQuery {
    /// Name/value pairs in binding order.
    pub fn bound_values(&self) -> Vec<(String, SqlValue)> {
        self.parameters
            .iter()
            .map(|p| (p.name().to_string(), p.value.clone()))
            .collect()
    }
}

/// A scripted outcome for the next command.
#[derive(Debug, Clone, PartialEq)]
pub enum InMemoryResponse {
    /// Result sets for a read. An execute receiving this reports the total row count.
    ResultSets(Vec<ResultSet>),
    /// Outcome of an execute. A read receiving this yields no result sets.
    Affected(RowsAffected),
    /// The engine rejects the command.
    Error { code: Option<String>, message: String },
}

impl InMemoryResponse {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        InMemoryResponse::Error {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn affected(count: u64) -> Self {
        InMemoryResponse::Affected(RowsAffected::Count(count))
    }
}

impl From<ResultSet> for InMemoryResponse {
    fn from(set: ResultSet) -> Self {
        InMemoryResponse::ResultSets(vec![set])
    }
}

impl From<Vec<ResultSet>> for InMemoryResponse {
    fn from(sets: Vec<ResultSet>) -> Self {
        InMemoryResponse::ResultSets(sets)
    }
}

#[derive(Debug)]
struct State {
    responses: VecDeque<InMemoryResponse>,
    recorded_queries: Vec<RecordedQuery>,
    connection_strings: Vec<String>,
    cancel_requests: usize,
}

/// An in-memory database driver for testing.
///
/// Allows configuring expected responses and verifying executed commands.
/// Commands are validated with the same placeholder rules real drivers apply,
/// so binder/query mismatches fail here too.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use relexec::drivers::{InMemoryTestDriver, InMemoryTestResponseBuilder};
/// use relexec::types::SqlValue;
///
/// let driver = Arc::new(
///     InMemoryTestDriver::new().with_response(
///         InMemoryTestResponseBuilder::new()
///             .columns(&["id", "name"])
///             .row(vec![SqlValue::Int32(1), "Alice".into()])
///             .build(),
///     ),
/// );
/// ```
pub struct InMemoryTestDriver {
    state: Arc<Mutex<State>>,
    default_response: InMemoryResponse,
    connect_error: Option<String>,
    latency: Option<Duration>,
    cancel_latency: Option<Duration>,
}

impl InMemoryTestDriver {
    /// Create a new in-memory test driver with no pre-configured responses.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                responses: VecDeque::new(),
                recorded_queries: Vec::new(),
                connection_strings: Vec::new(),
                cancel_requests: 0,
            })),
            default_response: InMemoryResponse::ResultSets(Vec::new()),
            connect_error: None,
            latency: None,
            cancel_latency: None,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    /// Add a response to be returned by the next command.
    /// Responses are returned in FIFO order.
    pub fn with_response(self, response: impl Into<InMemoryResponse>) -> Self {
        self.state().responses.push_back(response.into());
        self
    }

    /// Set a default response to use when no queued responses remain.
    pub fn with_default_response(mut self, response: impl Into<InMemoryResponse>) -> Self {
        self.default_response = response.into();
        self
    }

    /// Make every connection attempt fail with the given message.
    pub fn with_connect_error(mut self, message: impl Into<String>) -> Self {
        self.connect_error = Some(message.into());
        self
    }

    /// Delay every command by `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Delay every cancel request by `latency` after counting it,
    /// like a server that does not answer cancellation.
    pub fn with_cancel_latency(mut self, latency: Duration) -> Self {
        self.cancel_latency = Some(latency);
        self
    }

    /// Get all recorded commands that have been executed.
    pub fn recorded_queries(&self) -> Vec<RecordedQuery> {
        self.state().recorded_queries.clone()
    }

    /// Get the last recorded command, if any.
    pub fn last_query(&self) -> Option<RecordedQuery> {
        self.state().recorded_queries.last().cloned()
    }

    /// Number of connections opened so far.
    pub fn connection_count(&self) -> usize {
        self.state().connection_strings.len()
    }

    /// Connection strings of every connection opened so far.
    pub fn connection_strings(&self) -> Vec<String> {
        self.state().connection_strings.clone()
    }

    /// Number of cancel requests received from connections.
    pub fn cancel_requests(&self) -> usize {
        self.state().cancel_requests
    }

    /// Assert that the last command matches the expected SQL and bound values.
    pub fn assert_last_query(&self, expected_sql: &str, expected_params: &[(&str, SqlValue)]) {
        let last = self.last_query().expect("No queries were recorded");
        assert_eq!(
            last.sql, expected_sql,
            "SQL mismatch.\nExpected: {}\nActual: {}",
            expected_sql, last.sql
        );
        let expected: Vec<(String, SqlValue)> = expected_params
            .iter()
            .map(|(name, value)| (name.trim_start_matches('@').to_string(), value.clone()))
            .collect();
        let actual = last.bound_values();
        assert_eq!(
            actual, expected,
            "Parameters mismatch.\nExpected: {:?}\nActual: {:?}",
            expected, actual
        );
    }

    /// Assert that exactly n commands were executed.
    pub fn assert_query_count(&self, expected: usize) {
        let actual = self.state().recorded_queries.len();
        assert_eq!(
            actual, expected,
            "Query count mismatch. Expected: {}, Actual: {}",
            expected, actual
        );
    }
}

impl Default for InMemoryTestDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Driver for InMemoryTestDriver {
    fn invariant_name(&self) -> &'static str {
        IN_MEMORY_INVARIANT_NAME
    }

    async fn connect(&self, connection_string: &str) -> Result<Box<dyn Connection>> {
        if let Some(message) = &self.connect_error {
            return Err(RelExecError::ConnectionFailed(message.clone()));
        }
        self.state()
            .connection_strings
            .push(connection_string.to_string());

        Ok(Box::new(InMemoryConnection {
            state: Arc::clone(&self.state),
            default_response: self.default_response.clone(),
            latency: self.latency,
            cancel_latency: self.cancel_latency,
        }))
    }
}

/// Connection handed out by [`InMemoryTestDriver`]; shares the driver's script.
struct InMemoryConnection {
    state: Arc<Mutex<State>>,
    default_response: InMemoryResponse,
    latency: Option<Duration>,
    cancel_latency: Option<Duration>,
}

impl InMemoryConnection {
    /// Validate, record, wait out the latency, then pop the next response.
    async fn respond(&self, command: &Command) -> Result<InMemoryResponse> {
        bind_named(command, PlaceholderStyle::Named)?;

        lock(&self.state).recorded_queries.push(RecordedQuery {
            sql: command.text().to_string(),
            parameters: command.parameters().to_vec(),
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let response = lock(&self.state)
            .responses
            .pop_front()
            .unwrap_or_else(|| self.default_response.clone());
        Ok(response)
    }
}

fn rejected(code: Option<String>, message: String) -> RelExecError {
    RelExecError::QueryFailed {
        message,
        code,
        source: None,
    }
}

#[async_trait]
impl Connection for InMemoryConnection {
    async fn query(&mut self, command: &Command) -> Result<Vec<ResultSet>> {
        match self.respond(command).await? {
            InMemoryResponse::ResultSets(sets) => Ok(sets),
            InMemoryResponse::Affected(_) => Ok(Vec::new()),
            InMemoryResponse::Error { code, message } => Err(rejected(code, message)),
        }
    }

    async fn execute(&mut self, command: &Command) -> Result<RowsAffected> {
        match self.respond(command).await? {
            InMemoryResponse::Affected(affected) => Ok(affected),
            InMemoryResponse::ResultSets(sets) => Ok(RowsAffected::Count(
                sets.iter().map(|s| s.len() as u64).sum(),
            )),
            InMemoryResponse::Error { code, message } => Err(rejected(code, message)),
        }
    }

    async fn cancel(&mut self) -> Result<()> {
        lock(&self.state).cancel_requests += 1;
        if let Some(latency) = self.cancel_latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

/// Builder for creating test responses easily.
/// Call [`next_result_set`](Self::next_result_set) to start another result set.
pub struct InMemoryTestResponseBuilder {
    finished: Vec<ResultSet>,
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
}

impl InMemoryTestResponseBuilder {
    pub fn new() -> Self {
        Self {
            finished: Vec::new(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Set the column names for the current result set.
    pub fn columns(mut self, cols: &[&str]) -> Self {
        self.columns = cols.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Add a row of values to the current result set.
    pub fn row(mut self, values: Vec<SqlValue>) -> Self {
        self.rows.push(values);
        self
    }

    /// Add a row of text values to the current result set.
    pub fn text_row(self, values: &[&str]) -> Self {
        let values = values.iter().map(|s| SqlValue::from(*s)).collect();
        self.row(values)
    }

    /// Close the current result set and start a new one.
    pub fn next_result_set(mut self) -> Self {
        let columns = std::mem::take(&mut self.columns);
        let rows = std::mem::take(&mut self.rows);
        self.finished.push(ResultSet::new(columns, rows));
        self
    }

    /// Build the response holding every result set.
    pub fn build(self) -> InMemoryResponse {
        let mut sets = self.finished;
        sets.push(ResultSet::new(self.columns, self.rows));
        InMemoryResponse::ResultSets(sets)
    }
}

impl Default for InMemoryTestResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_multiple_result_sets() {
        let response = InMemoryTestResponseBuilder::new()
            .columns(&["a"])
            .text_row(&["x"])
            .next_result_set()
            .columns(&["b"])
            .build();

        match response {
            InMemoryResponse::ResultSets(sets) => {
                assert_eq!(sets.len(), 2);
                assert_eq!(sets[0].len(), 1);
                assert_eq!(sets[1].columns(), &["b".to_string()]);
                assert!(sets[1].is_empty());
            }
            _ => panic!("Expected result sets"),
        }
    }

    #[tokio::test]
    async fn test_connection_records_and_pops_in_order() {
        let driver = InMemoryTestDriver::new()
            .with_response(InMemoryResponse::affected(3))
            .with_response(InMemoryResponse::error("42P01", "relation does not exist"));
        let mut conn = driver.connect("memory://").await.unwrap();

        let mut command = Command::new("DELETE FROM t WHERE id = @id");
        command.bind("id", 9);
        assert_eq!(conn.execute(&command).await.unwrap(), RowsAffected::Count(3));

        let err = conn.execute(&command).await.unwrap_err();
        match err {
            RelExecError::QueryFailed { code, .. } => assert_eq!(code.as_deref(), Some("42P01")),
            other => panic!("Expected QueryFailed, got {other:?}"),
        }

        driver.assert_query_count(2);
        driver.assert_last_query("DELETE FROM t WHERE id = @id", &[("@id", SqlValue::Int32(9))]);
    }

    #[tokio::test]
    async fn test_connection_rejects_mismatched_parameters_without_recording() {
        let driver = InMemoryTestDriver::new();
        let mut conn = driver.connect("memory://").await.unwrap();

        let mut command = Command::new("SELECT 1");
        command.bind("stray", 1);
        assert!(matches!(
            conn.query(&command).await,
            Err(RelExecError::UnreferencedParameter(_))
        ));
        driver.assert_query_count(0);
    }

    #[tokio::test]
    async fn test_connect_error() {
        let driver = InMemoryTestDriver::new().with_connect_error("refused");
        let err = driver.connect("memory://").await.err().unwrap();
        assert!(matches!(err, RelExecError::ConnectionFailed(_)));
        assert_eq!(driver.connection_count(), 0);
    }
}
