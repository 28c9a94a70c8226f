//! Fixed sign random projection
//!
//! Projects a dense embedding of dimension E into a bipolar hypervector of
//! dimension D (D >> E) and binarizes by sign. The matrix is sampled once
//! from a seeded RNG, so the mapping is constant across process restarts:
//! relative similarity survives the projection (Johnson-Lindenstrauss) and
//! identical embeddings always land on identical hypervectors.

use crate::error::{SignalError, SignalResult};
use crate::vector::HyperVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;

/// Pre-seeded E x D sign projection.
///
/// Weights are materialized output-major (D rows of E) at construction;
/// with the default 384 x 10000 shape that is ~15 MB, paid once per
/// encoder.
pub struct SignProjection {
    input_dim: usize,
    output_dim: usize,
    seed: u64,
    weights: Vec<f32>,
}

impl SignProjection {
    pub fn new(input_dim: usize, output_dim: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let weights = (0..input_dim * output_dim)
            .map(|_| rng.gen_range(-1.0f32..1.0))
            .collect();
        Self {
            input_dim,
            output_dim,
            seed,
            weights,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Project and binarize: component j of the result is the sign of the
    /// dot product between row j and the embedding (>= 0 maps to +1).
    pub fn project(&self, embedding: &[f32]) -> SignalResult<HyperVector> {
        if embedding.len() != self.input_dim {
            return Err(SignalError::DimensionMismatch {
                expected: self.input_dim,
                actual: embedding.len(),
            });
        }

        let bits = (0..self.output_dim).map(|j| {
            let row = &self.weights[j * self.input_dim..(j + 1) * self.input_dim];
            let dot: f32 = row.iter().zip(embedding).map(|(w, x)| w * x).sum();
            dot >= 0.0
        });
        Ok(HyperVector::from_bits(self.output_dim, bits))
    }
}

impl fmt::Debug for SignProjection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignProjection")
            .field("input_dim", &self.input_dim)
            .field("output_dim", &self.output_dim)
            .field("seed", &self.seed)
            .finish()
    }
}
