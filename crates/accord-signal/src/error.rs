//! Signal-plane error types

use thiserror::Error;

/// Errors from encoding and projection
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("embedding provider unavailable: {reason}")]
    EmbeddingUnavailable { reason: String },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

pub type SignalResult<T> = Result<T, SignalError>;
