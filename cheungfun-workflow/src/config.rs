//! Workflow configuration.
//!
//! Configuration is plain serde data so it can live in a JSON file next to
//! the rest of an application's settings. Environment variables prefixed with
//! `CHEUNGFUN_WORKFLOW_` override file values.

use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use tracing::debug;

use crate::{
    context::duration_ms,
    error::{Result, WorkflowError},
    retry::RetryConfig,
};

/// Prefix of the environment variables read by [`WorkflowConfig::from_env`]
pub const ENV_PREFIX: &str = "CHEUNGFUN_WORKFLOW_";

/// Runtime settings of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Workflow name, used in logs
    pub name: String,
    /// Run timeout in milliseconds
    pub timeout_ms: u64,
    /// Capacity of the per-run event queue
    pub queue_capacity: usize,
    /// Period of the dispatcher's idle check in milliseconds
    pub tick_interval_ms: u64,
    /// How long the run must stay idle before it is considered finished
    pub idle_grace_ms: u64,
    /// Retry settings for steps registered without their own policy
    pub default_retry: Option<RetryConfig>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            name: "workflow".to_string(),
            timeout_ms: 300_000,
            queue_capacity: 1024,
            tick_interval_ms: 10,
            idle_grace_ms: 50,
            default_retry: None,
        }
    }
}

impl WorkflowConfig {
    /// Default configuration with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the run timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the event queue capacity
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the idle check period
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_ms = duration_ms(interval);
        self
    }

    /// Set the idle grace interval
    #[must_use]
    pub fn with_idle_grace(mut self, grace: Duration) -> Self {
        self.idle_grace_ms = duration_ms(grace);
        self
    }

    /// Set the retry settings inherited by steps without their own policy
    #[must_use]
    pub fn with_default_retry(mut self, retry: RetryConfig) -> Self {
        self.default_retry = Some(retry);
        self
    }

    /// Run timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Idle check period
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Idle grace interval
    pub fn idle_grace(&self) -> Duration {
        Duration::from_millis(self.idle_grace_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(WorkflowError::configuration("timeout_ms must be greater than 0"));
        }
        if self.queue_capacity == 0 {
            return Err(WorkflowError::configuration(
                "queue_capacity must be greater than 0",
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(WorkflowError::configuration(
                "tick_interval_ms must be greater than 0",
            ));
        }
        if let Some(retry) = &self.default_retry {
            retry.validate()?;
        }
        Ok(())
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            WorkflowError::configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        debug!("Loaded workflow config from {}", path.display());
        Self::from_json_str(&content)
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(std::env::vars())?;
        Ok(config)
    }

    /// Apply `CHEUNGFUN_WORKFLOW_*` overrides from `vars`.
    ///
    /// Unknown variables are ignored; malformed numbers are a configuration
    /// error.
    pub fn apply_env<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(setting) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();
            match setting {
                "NAME" => self.name = value.to_string(),
                "TIMEOUT_MS" => self.timeout_ms = parse_env(key.as_ref(), value)?,
                "QUEUE_CAPACITY" => self.queue_capacity = parse_env(key.as_ref(), value)?,
                "TICK_INTERVAL_MS" => self.tick_interval_ms = parse_env(key.as_ref(), value)?,
                "IDLE_GRACE_MS" => self.idle_grace_ms = parse_env(key.as_ref(), value)?,
                _ => {}
            }
        }
        self.validate()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| WorkflowError::configuration(format!("invalid value '{value}' for {key}")))
}
