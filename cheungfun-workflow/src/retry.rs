//! Retry policy for failing steps.
//!
//! The delay before retry `n` (1-based) is
//! `min(max_delay, initial_delay * multiplier^(n-1))`.

use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc, time::Duration};

use crate::error::WorkflowError;

/// Predicate deciding whether an error is worth another attempt
pub type RetryPredicate = Arc<dyn Fn(&WorkflowError) -> bool + Send + Sync>;

/// Geometric back-off retry policy
#[derive(Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
    /// Growth factor applied per retry
    pub multiplier: f64,
    predicate: Option<RetryPredicate>,
}

impl RetryPolicy {
    /// Create a policy with the given retry budget and default timings
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Set the delay before the first retry
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay cap
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the growth factor
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Decide retryability with a custom predicate instead of
    /// [`WorkflowError::is_retryable`]
    #[must_use]
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&WorkflowError) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Whether `error` may be retried
    pub fn should_retry(&self, error: &WorkflowError) -> bool {
        if error.is_terminal() {
            return false;
        }
        match &self.predicate {
            Some(predicate) => predicate(error),
            None => error.is_retryable(),
        }
    }

    /// Delay before retry `attempt` (1-based)
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.max(0.0).powi(i32::try_from(exponent).unwrap_or(i32::MAX));
        #[allow(clippy::cast_precision_loss)]
        let nanos = self.initial_delay.as_nanos() as f64 * factor;
        #[allow(clippy::cast_precision_loss)]
        let cap = self.max_delay.as_nanos() as f64;
        if !nanos.is_finite() || nanos >= cap {
            self.max_delay
        } else {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let nanos = nanos.round() as u64;
            Duration::from_nanos(nanos)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            predicate: None,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .field("custom_predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Serializable form of a [`RetryPolicy`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: u64,
    /// Upper bound for any delay in milliseconds
    pub max_delay_ms: u64,
    /// Growth factor applied per retry
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Validate the retry settings
    pub fn validate(&self) -> crate::Result<()> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(WorkflowError::configuration(format!(
                "retry multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(WorkflowError::configuration(
                "retry max_delay_ms must not be smaller than initial_delay_ms",
            ));
        }
        Ok(())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy::new(config.max_retries)
            .with_initial_delay(Duration::from_millis(config.initial_delay_ms))
            .with_max_delay(Duration::from_millis(config.max_delay_ms))
            .with_multiplier(config.multiplier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_delays_grow_geometrically_and_cap() {
        let policy = RetryPolicy::new(5)
            .with_initial_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(50))
            .with_multiplier(2.0);

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(20));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(40));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(50));
        assert_eq!(policy.delay_for_attempt(30), Duration::from_millis(50));
    }

    #[test]
    fn test_custom_predicate() {
        let policy = RetryPolicy::new(2).with_predicate(|err| err.to_string().contains("transient"));
        assert!(policy.should_retry(&WorkflowError::handler("transient glitch")));
        assert!(!policy.should_retry(&WorkflowError::handler("permanent")));
        // Cancellation is never retried, whatever the predicate says.
        let eager = RetryPolicy::new(2).with_predicate(|_| true);
        assert!(!eager.should_retry(&WorkflowError::Cancelled));
    }

    #[test]
    fn test_config_conversion_and_validation() {
        let config = RetryConfig {
            max_retries: 4,
            initial_delay_ms: 5,
            max_delay_ms: 40,
            multiplier: 3.0,
        };
        assert!(config.validate().is_ok());
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_retries, 4);
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(15));

        let bad = RetryConfig {
            multiplier: 0.5,
            ..RetryConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
