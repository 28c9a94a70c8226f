//! Text-to-hypervector encoding

use crate::error::{SignalError, SignalResult};
use crate::projection::SignProjection;
use crate::vector::HyperVector;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
pub const DEFAULT_SIGNAL_DIMENSION: usize = 10_000;
pub const DEFAULT_PROJECTION_SEED: u64 = 0x00ac_c04d_5eed;

/// Signal-plane configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Dense embedding dimension E produced by the provider
    pub embedding_dimension: usize,

    /// Hypervector dimension D; large (10k) for stable similarity
    /// statistics under random projection
    pub signal_dimension: usize,

    /// Seed of the fixed projection matrix; changing it invalidates every
    /// previously derived hypervector
    pub projection_seed: u64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            signal_dimension: DEFAULT_SIGNAL_DIMENSION,
            projection_seed: DEFAULT_PROJECTION_SEED,
        }
    }
}

/// External embedding collaborator.
///
/// May fail transiently; failures surface as
/// [`SignalError::EmbeddingUnavailable`] and callers decide whether to
/// retry, fall back, or abort the session.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed free text into a dense vector of `dimension()` components.
    async fn embed(&self, text: &str) -> SignalResult<Vec<f32>>;

    fn dimension(&self) -> usize;
}

/// Deterministic offline embedder using sha2 feature hashing.
///
/// Each token lands in four signed buckets derived from its digest, so the
/// same text always produces the same embedding without any network call,
/// and texts sharing tokens land near each other.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> SignalResult<Vec<f32>> {
        let mut acc = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            for chunk in digest.chunks_exact(8) {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(chunk);
                let raw = u64::from_le_bytes(buf);

                let index = (raw as usize) % self.dimension;
                let sign = if raw & (1 << 63) != 0 { 1.0 } else { -1.0 };
                acc[index] += sign;
            }
        }
        Ok(acc)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Text encoder: embedding collaborator + fixed sign projection.
pub struct HypervectorEncoder {
    provider: Arc<dyn EmbeddingProvider>,
    projection: SignProjection,
}

impl HypervectorEncoder {
    /// Fails when the provider's dimension does not match the configured
    /// embedding dimension.
    pub fn new(
        config: &SignalConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> SignalResult<Self> {
        if provider.dimension() != config.embedding_dimension {
            return Err(SignalError::DimensionMismatch {
                expected: config.embedding_dimension,
                actual: provider.dimension(),
            });
        }
        let projection = SignProjection::new(
            config.embedding_dimension,
            config.signal_dimension,
            config.projection_seed,
        );
        Ok(Self {
            provider,
            projection,
        })
    }

    /// Encode text into a hypervector: embed, project, binarize.
    pub async fn encode(&self, text: &str) -> SignalResult<HyperVector> {
        let embedding = self.provider.embed(text).await?;
        let signal = self.projection.project(&embedding)?;
        tracing::trace!(
            text_len = text.len(),
            signal_dimension = signal.dimension(),
            "encoded text"
        );
        Ok(signal)
    }

    pub fn signal_dimension(&self) -> usize {
        self.projection.output_dim()
    }
}

impl std::fmt::Debug for HypervectorEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HypervectorEncoder")
            .field("provider_dimension", &self.provider.dimension())
            .field("projection", &self.projection)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::resonance_score;

    fn test_config() -> SignalConfig {
        SignalConfig {
            embedding_dimension: 32,
            signal_dimension: 1024,
            ..SignalConfig::default()
        }
    }

    fn make_encoder() -> HypervectorEncoder {
        let config = test_config();
        HypervectorEncoder::new(&config, Arc::new(HashEmbedder::new(32))).unwrap()
    }

    #[tokio::test]
    async fn test_identical_text_encodes_identically() {
        let encoder = make_encoder();
        let a = encoder.encode("build an online store").await.unwrap();
        let b = encoder.encode("build an online store").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_determinism_across_encoder_instances() {
        let a = make_encoder().encode("payment integration").await.unwrap();
        let b = make_encoder().encode("payment integration").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_shared_tokens_score_above_disjoint() {
        let encoder = make_encoder();
        let demand = encoder
            .encode("build an online store with cart and payment")
            .await
            .unwrap();
        let related = encoder
            .encode("shopping cart and checkout for an online store")
            .await
            .unwrap();
        let unrelated = encoder
            .encode("tune crankshaft harmonics on diesel engines")
            .await
            .unwrap();

        assert!(
            resonance_score(&demand, &related) > resonance_score(&demand, &unrelated),
            "related text should resonate more strongly"
        );
    }

    #[tokio::test]
    async fn test_provider_dimension_checked() {
        let config = test_config();
        let err = HypervectorEncoder::new(&config, Arc::new(HashEmbedder::new(16))).unwrap_err();
        assert!(matches!(err, SignalError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        let tokens: Vec<String> = tokenize("Build an Online-Store!").collect();
        assert_eq!(tokens, vec!["build", "an", "online", "store"]);
    }
}
