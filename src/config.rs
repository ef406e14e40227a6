use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RelExecError, Result};

pub const ENV_INVARIANT_NAME: &str = "RELEXEC_INVARIANT_NAME";
pub const ENV_CONNECTION_STRING: &str = "RELEXEC_CONNECTION_STRING";
pub const ENV_COMMAND_TIMEOUT_MS: &str = "RELEXEC_COMMAND_TIMEOUT_MS";

/// Settings needed to build an [`Executor`](crate::Executor) from a
/// [`DriverRegistry`](crate::DriverRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub invariant_name: String,
    pub connection_string: String,
    /// Default statement timeout in milliseconds. Absent means no timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout_ms: Option<u64>,
}

impl ExecutorConfig {
    pub fn new(invariant_name: impl Into<String>, connection_string: impl Into<String>) -> Self {
        Self {
            invariant_name: invariant_name.into(),
            connection_string: connection_string.into(),
            command_timeout_ms: None,
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_ms.map(Duration::from_millis)
    }

    /// Load from `RELEXEC_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup using the `RELEXEC_*` key names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| RelExecError::InvalidConfig(format!("{key} is not set")))
        };

        let command_timeout_ms = match lookup(ENV_COMMAND_TIMEOUT_MS) {
            Some(raw) if !raw.trim().is_empty() => Some(raw.trim().parse::<u64>().map_err(|e| {
                RelExecError::InvalidConfig(format!("{ENV_COMMAND_TIMEOUT_MS}={raw}: {e}"))
            })?),
            _ => None,
        };

        Ok(Self {
            invariant_name: required(ENV_INVARIANT_NAME)?,
            connection_string: required(ENV_CONNECTION_STRING)?,
            command_timeout_ms,
        })
    }
}
