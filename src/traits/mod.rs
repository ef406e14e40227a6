mod driver;
mod provider;

pub use driver::{Connection, Driver};
pub use provider::ConnectionProvider;
