mod command;
mod parameter;
mod row;
mod sql_value;

pub use command::Command;
pub use parameter::{Parameter, ParameterDirection};
pub use row::{ResultSet, Row, RowsAffected};
pub use sql_value::{DbType, FromSqlValue, SqlValue};
