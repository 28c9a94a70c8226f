//! Hypervector encoding and resonance matching for Accord.
//!
//! Free text becomes a dense embedding (via an [`EmbeddingProvider`]
//! collaborator), the embedding is pushed through a fixed, pre-seeded sign
//! projection into a high-dimensional bipolar [`HyperVector`], and demand
//! vectors are matched against agent vectors by normalized Hamming
//! similarity. The projection is constant across process restarts, so
//! identical text always yields a bit-identical hypervector.
//!
//! # Example
//!
//! ```
//! use accord_signal::{HashEmbedder, HypervectorEncoder, SignalConfig, resonance_score};
//! use std::sync::Arc;
//!
//! # async fn demo() -> accord_signal::SignalResult<()> {
//! let config = SignalConfig {
//!     embedding_dimension: 64,
//!     signal_dimension: 512,
//!     ..SignalConfig::default()
//! };
//! let embedder = Arc::new(HashEmbedder::new(config.embedding_dimension));
//! let encoder = HypervectorEncoder::new(&config, embedder)?;
//!
//! let a = encoder.encode("build an online store").await?;
//! let b = encoder.encode("build an online store").await?;
//! assert_eq!(resonance_score(&a, &b), 1.0);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod encoder;
pub mod error;
pub mod matcher;
pub mod projection;
pub mod vector;

pub use encoder::{
    EmbeddingProvider, HashEmbedder, HypervectorEncoder, SignalConfig,
    DEFAULT_EMBEDDING_DIMENSION, DEFAULT_PROJECTION_SEED, DEFAULT_SIGNAL_DIMENSION,
};
pub use error::{SignalError, SignalResult};
pub use matcher::{find_resonant_agents, resonance_score};
pub use projection::SignProjection;
pub use vector::HyperVector;
