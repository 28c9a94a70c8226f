//! Engine error types

use accord_events::EventError;
use accord_health::HealthError;
use accord_registry::RegistryError;
use accord_signal::SignalError;
use accord_types::{NegotiationId, NegotiationStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("negotiation {0} not found")]
    SessionNotFound(NegotiationId),

    #[error("negotiation {negotiation_id} cannot move from {from} to {to}")]
    InvalidTransition {
        negotiation_id: NegotiationId,
        from: NegotiationStatus,
        to: NegotiationStatus,
    },

    #[error("negotiation {negotiation_id} is {status}, user actions apply to completed negotiations only")]
    UserActionUnavailable {
        negotiation_id: NegotiationId,
        status: NegotiationStatus,
    },

    #[error("negotiation {negotiation_id} did not reach a terminal status in time")]
    WaitTimeout { negotiation_id: NegotiationId },

    #[error("engine is shutting down")]
    ShuttingDown,

    /// Raised by formulation or invocation collaborators.
    #[error("collaborator failed: {reason}")]
    Collaborator { reason: String },

    /// Raised by durable store implementations.
    #[error("store failed: {reason}")]
    Store { reason: String },

    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Health(#[from] HealthError),

    #[error(transparent)]
    Event(#[from] EventError),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
