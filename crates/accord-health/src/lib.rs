//! Agent liveness tracking for Accord.
//!
//! The [`HealthMonitor`] keeps a rolling [`accord_types::AgentHealth`]
//! record per agent: bounded-timeout probes, consecutive-failure counting
//! with a threshold flip to `Unavailable`, a bounded per-agent error log,
//! and a generic [`HealthMonitor::with_retry`] wrapper with exponential
//! backoff that returns `None` instead of an error when an agent stays
//! unreachable. Status changes fan out on a broadcast channel.
//!
//! Health checking runs independently of active negotiations; the only
//! state it shares with solicitation is the per-agent status flag.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod monitor;
pub mod probe;

pub use config::{HealthConfig, RetryConfig};
pub use error::{HealthError, HealthResult};
pub use monitor::{HealthEvent, HealthMonitor, HEALTH_EVENT_CAPACITY};
pub use probe::{AgentProbe, AlwaysReachableProbe};
