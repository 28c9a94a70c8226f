//! Agent liveness types

use crate::ids::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Liveness state of a registered agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Reachable and eligible for solicitation
    Active,
    /// Crossed the consecutive-failure threshold; excluded from matching
    Unavailable,
    /// The agent announced its own departure; only an explicit reset revives it
    Exiting,
}

impl AgentStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, AgentStatus::Active)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Active => write!(f, "active"),
            AgentStatus::Unavailable => write!(f, "unavailable"),
            AgentStatus::Exiting => write!(f, "exiting"),
        }
    }
}

/// Classified cause of a failed probe or invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The bounded probe window elapsed
    Timeout,
    /// The agent could not be reached at all
    Unreachable,
    /// The agent answered with an error
    Error,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Unreachable => write!(f, "unreachable"),
            FailureKind::Error => write!(f, "error"),
        }
    }
}

/// A single recorded probe failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeFailure {
    pub kind: FailureKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Outcome of a successful health probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeReport {
    pub agent_id: AgentId,
    pub status: AgentStatus,

    /// Probe round-trip latency
    #[serde(with = "duration_millis")]
    pub latency: Duration,

    pub checked_at: DateTime<Utc>,
}

/// Rolling liveness record for one agent.
///
/// `consecutive_failures` only ever grows until a successful probe or an
/// explicit reset clears it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealth {
    pub agent_id: AgentId,
    pub status: AgentStatus,
    pub reachable: bool,
    pub last_probe_at: Option<DateTime<Utc>>,

    /// Latency of the most recent successful probe
    #[serde(with = "duration_millis_opt")]
    pub last_latency: Option<Duration>,

    pub consecutive_failures: u32,

    /// Bounded log of recent failures, oldest first
    pub recent_errors: Vec<ProbeFailure>,
}

impl AgentHealth {
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            status: AgentStatus::Active,
            reachable: true,
            last_probe_at: None,
            last_latency: None,
            consecutive_failures: 0,
            recent_errors: Vec::new(),
        }
    }
}

/// Serde helper for Duration
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Serde helper for Option<Duration>
mod duration_millis_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration
            .map(|d| d.as_millis() as u64)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
