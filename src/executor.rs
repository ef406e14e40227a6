use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::ExecutorConfig;
use crate::drivers::TokioPostgresDriver;
use crate::error::{BoxError, RelExecError, Result};
use crate::provider::{DriverConnectionProvider, DriverRegistry};
use crate::traits::{Connection, ConnectionProvider, Driver};
use crate::types::{Command, ResultSet, Row, RowsAffected};

/// Upper bound on the driver-side cancel request sent after a call is abandoned.
/// An unreachable server must not hold the caller past its own deadline.
const CANCEL_REQUEST_TIMEOUT: Duration = Duration::from_millis(500);

/// Main entry point for relexec.
///
/// Runs parameterized queries through a [`ConnectionProvider`] and maps the
/// returned rows with a caller-supplied mapper. Holds no state between calls
/// apart from its identity and default timeout, so one executor can be shared
/// by any number of concurrent callers; each call acquires its own connection.
#[derive(Clone)]
pub struct Executor {
    invariant_name: String,
    connection_string: String,
    provider: Arc<dyn ConnectionProvider>,
    command_timeout: Option<Duration>,
}

impl Executor {
    /// Create an executor over an explicit connection provider.
    pub fn new(
        invariant_name: impl Into<String>,
        connection_string: impl Into<String>,
        provider: Arc<dyn ConnectionProvider>,
    ) -> Self {
        Self {
            invariant_name: invariant_name.into(),
            connection_string: connection_string.into(),
            provider,
            command_timeout: None,
        }
    }

    /// Create an executor that opens one connection per call through `driver`.
    /// Useful for testing or using alternative database drivers.
    pub fn with_driver(driver: Arc<dyn Driver>, connection_string: impl Into<String>) -> Self {
        let connection_string = connection_string.into();
        let invariant_name = driver.invariant_name();
        let provider = DriverConnectionProvider::new(driver, connection_string.clone());
        Self::new(invariant_name, connection_string, Arc::new(provider))
    }

    /// Create a PostgreSQL executor for the given connection string.
    ///
    /// # Example
    /// ```ignore
    /// let executor = Executor::postgres("host=localhost user=app dbname=app");
    /// ```
    pub fn postgres(connection_string: impl Into<String>) -> Self {
        Self::with_driver(Arc::new(TokioPostgresDriver::new()), connection_string)
    }

    /// Select the driver by the configured invariant name.
    pub fn from_config(registry: &DriverRegistry, config: &ExecutorConfig) -> Result<Self> {
        let driver = registry.get(&config.invariant_name)?;
        let provider = DriverConnectionProvider::new(driver, config.connection_string.clone());
        let executor = Self::new(
            config.invariant_name.clone(),
            config.connection_string.clone(),
            Arc::new(provider),
        );
        Ok(match config.command_timeout() {
            Some(timeout) => executor.with_command_timeout(timeout),
            None => executor,
        })
    }

    /// Default timeout for every call; a binder may override it per command.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Identifier of the database vendor behind this executor.
    pub fn invariant_name(&self) -> &str {
        &self.invariant_name
    }

    /// Identifier of the target database.
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Run `query` and map every row of every result set.
    ///
    /// `binder` runs once, before anything is sent. `mapper` runs once per row,
    /// in result-set then row order, and receives the zero-based index of the
    /// result set the row belongs to. The first mapper error aborts the call
    /// and no rows are returned.
    pub async fn read<T, B, M, E>(&self, query: &str, binder: B, mapper: M) -> Result<Vec<T>>
    where
        B: FnOnce(&mut Command),
        M: Fn(&Row, usize) -> std::result::Result<T, E>,
        E: Into<BoxError>,
    {
        self.read_with_cancellation(query, binder, mapper, &CancellationToken::new())
            .await
    }

    /// [`read`](Self::read) that fails with `Cancelled` once `cancel` fires.
    pub async fn read_with_cancellation<T, B, M, E>(
        &self,
        query: &str,
        binder: B,
        mapper: M,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>>
    where
        B: FnOnce(&mut Command),
        M: Fn(&Row, usize) -> std::result::Result<T, E>,
        E: Into<BoxError>,
    {
        let command = prepare(query, binder)?;
        let timeout = command.timeout().or(self.command_timeout);
        let mut connection = self.acquire(cancel, timeout).await?;

        let outcome = guarded(cancel, timeout, connection.query(&command)).await;
        let sets = self.settle(connection, outcome).await?;

        let results = map_result_sets(sets, &mapper)?;
        tracing::debug!(
            invariant_name = %self.invariant_name,
            rows = results.len(),
            "read completed"
        );
        Ok(results)
    }

    /// Run `query` and return exactly one mapped row.
    pub async fn read_single<T, B, M, E>(&self, query: &str, binder: B, mapper: M) -> Result<T>
    where
        B: FnOnce(&mut Command),
        M: Fn(&Row, usize) -> std::result::Result<T, E>,
        E: Into<BoxError>,
    {
        let mut results = self.read(query, binder, mapper).await?;
        if results.len() != 1 {
            return Err(RelExecError::UnexpectedRowCount {
                expected: 1,
                actual: results.len(),
            });
        }
        results.pop().ok_or(RelExecError::UnexpectedRowCount {
            expected: 1,
            actual: 0,
        })
    }

    /// Run `query` and return the mapped row, if there is one.
    /// More than one row is an error.
    pub async fn read_optional<T, B, M, E>(
        &self,
        query: &str,
        binder: B,
        mapper: M,
    ) -> Result<Option<T>>
    where
        B: FnOnce(&mut Command),
        M: Fn(&Row, usize) -> std::result::Result<T, E>,
        E: Into<BoxError>,
    {
        let mut results = self.read(query, binder, mapper).await?;
        if results.len() > 1 {
            return Err(RelExecError::UnexpectedRowCount {
                expected: 1,
                actual: results.len(),
            });
        }
        Ok(results.pop())
    }

    /// Run a write or DDL statement and return the rows affected.
    ///
    /// Statements that do not report a count yield
    /// [`RowsAffected::NotApplicable`] (`-1` via [`RowsAffected::as_i64`]).
    /// Whatever the engine applied before a failure stays applied; atomicity
    /// across statements is the database's transaction semantics.
    pub async fn execute<B>(&self, query: &str, binder: B) -> Result<RowsAffected>
    where
        B: FnOnce(&mut Command),
    {
        self.execute_with_cancellation(query, binder, &CancellationToken::new())
            .await
    }

    /// [`execute`](Self::execute) that fails with `Cancelled` once `cancel` fires.
    pub async fn execute_with_cancellation<B>(
        &self,
        query: &str,
        binder: B,
        cancel: &CancellationToken,
    ) -> Result<RowsAffected>
    where
        B: FnOnce(&mut Command),
    {
        let command = prepare(query, binder)?;
        let timeout = command.timeout().or(self.command_timeout);
        let mut connection = self.acquire(cancel, timeout).await?;

        let outcome = guarded(cancel, timeout, connection.execute(&command)).await;
        let affected = self.settle(connection, outcome).await?;

        tracing::debug!(
            invariant_name = %self.invariant_name,
            rows_affected = affected.as_i64(),
            "execute completed"
        );
        Ok(affected)
    }

    async fn acquire(
        &self,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<Box<dyn Connection>> {
        guarded(cancel, timeout, self.provider.acquire()).await
    }

    /// On cancellation or timeout, ask the engine to drop the statement.
    /// The request gets at most [`CANCEL_REQUEST_TIMEOUT`]; a failed or stalled
    /// request is logged and the caller sees the original error.
    async fn settle<O>(&self, mut connection: Box<dyn Connection>, outcome: Result<O>) -> Result<O> {
        if let Err(err @ (RelExecError::Cancelled | RelExecError::Timeout(_))) = &outcome {
            tracing::debug!(invariant_name = %self.invariant_name, error = %err, "abandoning statement");
            match tokio::time::timeout(CANCEL_REQUEST_TIMEOUT, connection.cancel()).await {
                Ok(Ok(())) => {}
                Ok(Err(cancel_err)) => tracing::warn!(
                    invariant_name = %self.invariant_name,
                    error = %cancel_err,
                    "failed to cancel in-flight statement"
                ),
                Err(_) => tracing::warn!(
                    invariant_name = %self.invariant_name,
                    limit_ms = CANCEL_REQUEST_TIMEOUT.as_millis() as u64,
                    "cancel request for in-flight statement timed out"
                ),
            }
        }
        outcome
    }
}

fn prepare<B>(query: &str, binder: B) -> Result<Command>
where
    B: FnOnce(&mut Command),
{
    if query.trim().is_empty() {
        return Err(RelExecError::EmptyQuery);
    }
    let mut command = Command::new(query);
    binder(&mut command);
    Ok(command)
}

/// Races `work` against the cancellation token and the optional timeout.
/// Cancellation wins ties, including a token cancelled before the call.
async fn guarded<F, O>(cancel: &CancellationToken, timeout: Option<Duration>, work: F) -> Result<O>
where
    F: Future<Output = Result<O>>,
{
    let timed = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| RelExecError::Timeout(limit))?,
            None => work.await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RelExecError::Cancelled),
        outcome = timed => outcome,
    }
}

fn map_result_sets<T, M, E>(sets: Vec<ResultSet>, mapper: &M) -> Result<Vec<T>>
where
    M: Fn(&Row, usize) -> std::result::Result<T, E>,
    E: Into<BoxError>,
{
    let total = sets.iter().map(ResultSet::len).sum();
    let mut results = Vec::with_capacity(total);

    for (result_set, set) in sets.into_iter().enumerate() {
        for (row_index, row) in set.into_rows().enumerate() {
            let value = mapper(&row, result_set).map_err(|e| RelExecError::Mapping {
                result_set,
                row: row_index,
                source: e.into(),
            })?;
            results.push(value);
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SqlValue;

    fn set(column: &str, values: &[i32]) -> ResultSet {
        ResultSet::new(
            vec![column.to_string()],
            values.iter().map(|v| vec![SqlValue::Int32(*v)]).collect(),
        )
    }

    #[test]
    fn test_map_result_sets_orders_by_set_then_row() {
        let sets = vec![set("a", &[1, 2]), set("b", &[]), set("c", &[3])];
        let mapped = map_result_sets(sets, &|row: &Row, index: usize| {
            let column = ["a", "b", "c"][index];
            row.get::<i32>(column).map(|v| (index, v))
        })
        .unwrap();

        assert_eq!(mapped, vec![(0, 1), (0, 2), (2, 3)]);
    }

    #[test]
    fn test_map_result_sets_reports_failing_position() {
        let sets = vec![set("a", &[1]), set("b", &[2, 3])];
        let err = map_result_sets(sets, &|row: &Row, _: usize| -> Result<i32> {
            let v: i32 = row.get_by_index(0)?;
            if v == 3 {
                return Err(RelExecError::query("three"));
            }
            Ok(v)
        })
        .unwrap_err();

        match err {
            RelExecError::Mapping {
                result_set, row, ..
            } => {
                assert_eq!(result_set, 1);
                assert_eq!(row, 1);
            }
            other => panic!("Expected Mapping error, got {other:?}"),
        }
    }

    #[test]
    fn test_prepare_rejects_blank_query_before_binding() {
        let mut called = false;
        let err = prepare("   ", |_| called = true).unwrap_err();
        assert!(matches!(err, RelExecError::EmptyQuery));
        assert!(!called);
    }

    #[tokio::test]
    async fn test_guarded_times_out() {
        let cancel = CancellationToken::new();
        let err = guarded(&cancel, Some(Duration::from_millis(10)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, RelExecError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_guarded_prefers_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = guarded(&cancel, None, async { Ok(1) }).await.unwrap_err();
        assert!(matches!(err, RelExecError::Cancelled));
    }
}
