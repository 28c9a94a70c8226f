//! Liveness probe trait

use crate::error::HealthResult;
use accord_types::AgentId;
use async_trait::async_trait;

/// A single reachability check against one agent.
///
/// Resolve `Ok(())` when the agent answered; the error variant drives the
/// failure classification (`Unreachable` vs `Error`). The monitor itself
/// imposes the probe timeout, so implementations may block on I/O freely.
#[async_trait]
pub trait AgentProbe: Send + Sync {
    async fn probe(&self, agent_id: &AgentId) -> HealthResult<()>;
}

/// Probe that always succeeds.
///
/// Used when liveness signals come from somewhere else (invocation
/// failures still feed the failure counters through `with_retry`).
pub struct AlwaysReachableProbe;

#[async_trait]
impl AgentProbe for AlwaysReachableProbe {
    async fn probe(&self, _agent_id: &AgentId) -> HealthResult<()> {
        Ok(())
    }
}
