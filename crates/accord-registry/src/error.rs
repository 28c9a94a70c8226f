//! Registry error types

use accord_signal::SignalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("agent loader failed: {reason}")]
    LoaderFailure { reason: String },

    #[error(transparent)]
    Signal(#[from] SignalError),
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
