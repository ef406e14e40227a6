use async_trait::async_trait;

use crate::error::Result;

use super::driver::Connection;

/// Source of connections for an executor.
///
/// Implementations may pool; the executor only requires that each connection
/// handed out is used by a single call and dropped (or returned) afterwards.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn Connection>>;
}
