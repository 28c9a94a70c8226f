//! Event distribution error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("stream transport failed: {reason}")]
    Transport { reason: String },
}

pub type EventResult<T> = std::result::Result<T, EventError>;
