use async_trait::async_trait;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, Column as PgColumn, NoTls, Row as PgRow, Statement};

use crate::error::{RelExecError, Result};
use crate::sql::{bind_named, BoundStatement, PlaceholderStyle, StatementKind};
use crate::traits::{Connection, Driver};
use crate::types::{Command, DbType, ResultSet, RowsAffected, SqlValue};

/// Invariant name of [`TokioPostgresDriver`].
pub const POSTGRES_INVARIANT_NAME: &str = "postgres";

type PgParam = Box<dyn ToSql + Sync + Send>;

/// PostgreSQL driver implementation using tokio-postgres.
///
/// - `@name` placeholders become `$n`; each statement of a multi-statement
///   query is prepared and run on its own, in order.
/// - Parameter values are converted to the types the server inferred for them.
/// - Statements returning no columns contribute no result set to a read.
/// - Affected rows are reported for SELECT, INSERT, UPDATE, DELETE, MERGE,
///   COPY, WITH and VALUES statements; anything else (DDL, SET, ...) is
///   [`RowsAffected::NotApplicable`].
/// - Only input parameters are supported.
/// - Decoded column types: bool, int2/4/8, float4/8, text, varchar, bpchar,
///   name and bytea. Cast other types in the query (e.g. `::text`).
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioPostgresDriver;

impl TokioPostgresDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for TokioPostgresDriver {
    fn invariant_name(&self) -> &'static str {
        POSTGRES_INVARIANT_NAME
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["postgresql"]
    }

    async fn connect(&self, connection_string: &str) -> Result<Box<dyn Connection>> {
        let (client, connection) = tokio_postgres::connect(connection_string, NoTls)
            .await
            .map_err(|e| RelExecError::ConnectionFailed(e.to_string()))?;

        // The task ends once the client is dropped.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "PostgreSQL connection error");
            }
        });

        Ok(Box::new(PostgresConnection { client }))
    }
}

struct PostgresConnection {
    client: Client,
}

impl PostgresConnection {
    async fn prepare(&self, bound: &BoundStatement) -> Result<(Statement, Vec<PgParam>)> {
        let statement = self.client.prepare(&bound.text).await.map_err(map_error)?;
        let params = bound
            .names
            .iter()
            .zip(&bound.values)
            .zip(statement.params())
            .map(|((name, value), ty)| to_postgres_param(name, value, ty))
            .collect::<Result<Vec<_>>>()?;
        Ok((statement, params))
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn query(&mut self, command: &Command) -> Result<Vec<ResultSet>> {
        let statements = bind(command)?;
        let mut sets = Vec::with_capacity(statements.len());

        for bound in &statements {
            let (statement, params) = self.prepare(bound).await?;
            let refs = param_refs(&params);

            if statement.columns().is_empty() {
                self.client
                    .execute(&statement, &refs)
                    .await
                    .map_err(map_error)?;
                continue;
            }

            let rows = self
                .client
                .query(&statement, &refs)
                .await
                .map_err(map_error)?;
            sets.push(decode_result_set(statement.columns(), &rows)?);
        }

        Ok(sets)
    }

    async fn execute(&mut self, command: &Command) -> Result<RowsAffected> {
        let statements = bind(command)?;
        let mut affected = RowsAffected::NotApplicable;

        for bound in &statements {
            let (statement, params) = self.prepare(bound).await?;
            let refs = param_refs(&params);
            let count = self
                .client
                .execute(&statement, &refs)
                .await
                .map_err(map_error)?;

            let outcome = match bound.kind() {
                StatementKind::RowCounting => RowsAffected::Count(count),
                StatementKind::Other => RowsAffected::NotApplicable,
            };
            affected = affected.combine(outcome);
        }

        Ok(affected)
    }

    async fn cancel(&mut self) -> Result<()> {
        self.client
            .cancel_token()
            .cancel_query(NoTls)
            .await
            .map_err(|e| RelExecError::ConnectionFailed(e.to_string()))
    }
}

fn bind(command: &Command) -> Result<Vec<BoundStatement>> {
    if let Some(param) = command.parameters().iter().find(|p| !p.direction.is_input()) {
        return Err(RelExecError::UnsupportedParameter {
            name: param.name().to_string(),
            reason: format!(
                "{:?} parameters are not supported by the PostgreSQL driver",
                param.direction
            ),
        });
    }
    bind_named(command, PlaceholderStyle::Dollar)
}

fn param_refs(params: &[PgParam]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|b| b.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

/// The `DbType` a PostgreSQL type round-trips through, if supported.
fn db_type_for(ty: &Type) -> Option<DbType> {
    let db_type = if *ty == Type::BOOL {
        DbType::Boolean
    } else if *ty == Type::INT2 {
        DbType::Int16
    } else if *ty == Type::INT4 {
        DbType::Int32
    } else if *ty == Type::INT8 {
        DbType::Int64
    } else if *ty == Type::FLOAT4 || *ty == Type::FLOAT8 {
        DbType::Float64
    } else if *ty == Type::TEXT
        || *ty == Type::VARCHAR
        || *ty == Type::BPCHAR
        || *ty == Type::NAME
        || *ty == Type::UNKNOWN
    {
        DbType::Text
    } else if *ty == Type::BYTEA {
        DbType::Binary
    } else {
        return None;
    };
    Some(db_type)
}

/// Convert a bound value to a boxed ToSql trait object for the server-inferred type.
fn to_postgres_param(name: &str, value: &SqlValue, ty: &Type) -> Result<PgParam> {
    let target = format!("@{name}");
    let db_type = db_type_for(ty);

    let value = match db_type {
        Some(db_type) => value.coerce(db_type, &target)?,
        None => value.clone(),
    };

    let param: PgParam = match value {
        SqlValue::Null => null_for(db_type),
        SqlValue::Float64(v) if *ty == Type::FLOAT4 => Box::new(narrow_to_float4(v, &target)?),
        SqlValue::Bool(b) => Box::new(b),
        SqlValue::Int16(v) => Box::new(v),
        SqlValue::Int32(v) => Box::new(v),
        SqlValue::Int64(v) => Box::new(v),
        SqlValue::Float64(v) => Box::new(v),
        SqlValue::Text(s) => Box::new(s),
        SqlValue::Bytes(b) => Box::new(b),
    };
    Ok(param)
}

/// Finite values beyond the float4 range are rejected; precision beyond
/// float4's 24-bit mantissa is rounded away.
fn narrow_to_float4(value: f64, target: &str) -> Result<f32> {
    let narrowed = value as f32;
    if value.is_finite() && !narrowed.is_finite() {
        return Err(RelExecError::TypeMismatch {
            target: target.to_string(),
            expected: "float4",
            found: "float64",
        });
    }
    Ok(narrowed)
}

/// A NULL typed so that tokio-postgres accepts it for the parameter's type.
fn null_for(db_type: Option<DbType>) -> PgParam {
    match db_type {
        Some(DbType::Boolean) => Box::new(None::<bool>),
        Some(DbType::Int16) => Box::new(None::<i16>),
        Some(DbType::Int32) => Box::new(None::<i32>),
        Some(DbType::Int64) => Box::new(None::<i64>),
        Some(DbType::Float64) => Box::new(None::<f64>),
        Some(DbType::Binary) => Box::new(None::<Vec<u8>>),
        Some(DbType::Text) | None => Box::new(None::<String>),
    }
}

fn decode_result_set(columns: &[PgColumn], rows: &[PgRow]) -> Result<ResultSet> {
    let names = columns.iter().map(|c| c.name().to_string()).collect();
    let values = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .enumerate()
                .map(|(i, col)| decode_value(row, i, col))
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ResultSet::new(names, values))
}

/// Convert a row value at a given index to a SqlValue.
fn decode_value(row: &PgRow, index: usize, column: &PgColumn) -> Result<SqlValue> {
    let ty = column.type_();
    let decoded = match db_type_for(ty) {
        Some(DbType::Boolean) => row.try_get::<_, Option<bool>>(index).map(SqlValue::from),
        Some(DbType::Int16) => row.try_get::<_, Option<i16>>(index).map(SqlValue::from),
        Some(DbType::Int32) => row.try_get::<_, Option<i32>>(index).map(SqlValue::from),
        Some(DbType::Int64) => row.try_get::<_, Option<i64>>(index).map(SqlValue::from),
        Some(DbType::Float64) if *ty == Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(index)
            .map(|v| SqlValue::from(v.map(f64::from))),
        Some(DbType::Float64) => row.try_get::<_, Option<f64>>(index).map(SqlValue::from),
        Some(DbType::Text) => row.try_get::<_, Option<String>>(index).map(SqlValue::from),
        Some(DbType::Binary) => row.try_get::<_, Option<Vec<u8>>>(index).map(SqlValue::from),
        None => {
            return Err(RelExecError::UnsupportedType {
                column: column.name().to_string(),
                type_name: ty.name().to_string(),
            })
        }
    };
    decoded.map_err(map_error)
}

/// Closed connections are connection errors; everything else is a query
/// error carrying the SQLSTATE and the native error.
fn map_error(err: tokio_postgres::Error) -> RelExecError {
    if err.is_closed() {
        return RelExecError::ConnectionFailed(err.to_string());
    }
    let code = err.code().map(|state| state.code().to_string());
    let message = err
        .as_db_error()
        .map(|db| db.message().to_string())
        .unwrap_or_else(|| err.to_string());
    RelExecError::QueryFailed {
        message,
        code,
        source: Some(Box::new(err)),
    }
}
