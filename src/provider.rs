use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::drivers::TokioPostgresDriver;
use crate::error::{RelExecError, Result};
use crate::traits::{Connection, ConnectionProvider, Driver};

/// Connection provider that opens a fresh connection per call and closes it
/// when the call drops it. No pooling.
pub struct DriverConnectionProvider {
    driver: Arc<dyn Driver>,
    connection_string: String,
}

impl DriverConnectionProvider {
    pub fn new(driver: Arc<dyn Driver>, connection_string: impl Into<String>) -> Self {
        Self {
            driver,
            connection_string: connection_string.into(),
        }
    }
}

#[async_trait]
impl ConnectionProvider for DriverConnectionProvider {
    async fn acquire(&self) -> Result<Box<dyn Connection>> {
        self.driver.connect(&self.connection_string).await
    }
}

/// Maps invariant names to drivers. Lookups are case-insensitive.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the PostgreSQL driver.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TokioPostgresDriver::new()));
        registry
    }

    /// Register a driver under its invariant name and aliases,
    /// replacing any driver previously registered under those names.
    pub fn register(&mut self, driver: Arc<dyn Driver>) -> &mut Self {
        let names = std::iter::once(driver.invariant_name()).chain(driver.aliases().iter().copied());
        for name in names {
            self.drivers
                .insert(name.to_ascii_lowercase(), Arc::clone(&driver));
        }
        self
    }

    pub fn get(&self, invariant_name: &str) -> Result<Arc<dyn Driver>> {
        self.drivers
            .get(&invariant_name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| RelExecError::UnknownDriver(invariant_name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
