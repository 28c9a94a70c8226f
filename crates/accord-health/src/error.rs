//! Health monitoring error types

use accord_types::AgentId;
use thiserror::Error;

/// Errors from probes and retried operations
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("probe timed out after {timeout_ms}ms: {agent_id}")]
    ProbeTimeout { agent_id: AgentId, timeout_ms: u64 },

    #[error("agent unreachable: {agent_id}: {reason}")]
    Unreachable { agent_id: AgentId, reason: String },

    #[error("operation failed for {agent_id}: {reason}")]
    OperationFailed { agent_id: AgentId, reason: String },
}

pub type HealthResult<T> = Result<T, HealthError>;
