//! relexec - A driver-agnostic executor for parameterized SQL
//!
//! Queries carry no literal user data: values travel as named `@parameters`
//! attached by a binder closure, and rows come back through a mapper closure
//! that also learns which result set each row belongs to.
//!
//! # Example
//! ```ignore
//! use relexec::{Executor, RowsAffected};
//!
//! let executor = Executor::postgres("host=localhost user=app dbname=app");
//!
//! // Read two result sets with one call
//! let names: Vec<String> = executor
//!     .read(
//!         "SELECT name FROM users WHERE team = @team; SELECT name FROM guests",
//!         |cmd| {
//!             cmd.bind("team", 7);
//!         },
//!         |row, _set| row.get::<String>("name"),
//!     )
//!     .await?;
//!
//! // Write
//! let affected = executor
//!     .execute("UPDATE users SET active = @active WHERE id = @id", |cmd| {
//!         cmd.bind("active", false).bind("id", 42);
//!     })
//!     .await?;
//! assert_eq!(affected, RowsAffected::Count(1));
//! ```

pub mod config;
pub mod drivers;
pub mod error;
pub mod provider;
pub mod sql;
pub mod traits;
pub mod types;

mod executor;

// Re-export main types for convenient access
pub use config::ExecutorConfig;
pub use error::{ErrorKind, RelExecError, Result};
pub use executor::Executor;
pub use provider::{DriverConnectionProvider, DriverRegistry};
pub use tokio_util::sync::CancellationToken;
pub use traits::{Connection, ConnectionProvider, Driver};
pub use types::{
    Command, DbType, FromSqlValue, Parameter, ParameterDirection, ResultSet, Row, RowsAffected,
    SqlValue,
};
