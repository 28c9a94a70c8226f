//! Health monitoring configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the health monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Bounded window for a single liveness probe
    pub probe_timeout: Duration,

    /// Consecutive failures before an agent flips to unavailable
    pub failure_threshold: u32,

    /// Per-agent cap on retained failure entries; oldest are evicted
    pub max_error_log: usize,

    /// Retry behavior for `with_retry`
    pub retry: RetryConfig,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            failure_threshold: 3,
            max_error_log: 32,
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the initial attempt (total attempts = max_retries + 1)
    pub max_retries: u32,

    /// Delay before the first retry
    pub retry_delay: Duration,

    /// Multiplier applied to the delay after each failed attempt
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        }
    }
}
