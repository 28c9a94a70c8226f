//! Bit-packed bipolar hypervectors
//!
//! Components are restricted to {-1, +1} and stored one bit per component
//! (set bit = +1), 64 components per word. Similarity runs entirely on
//! XOR + popcount over the packed words.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A fixed-width bipolar vector of dimension D.
///
/// Derived from text, never mutated. Bits at positions >= `dimension` in
/// the last word are always zero, so popcounts over the words are exact.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HyperVector {
    words: Vec<u64>,
    dimension: usize,
}

impl HyperVector {
    /// Build from a bit iterator; `true` maps to +1. Consumes at most
    /// `dimension` bits.
    pub fn from_bits(dimension: usize, bits: impl IntoIterator<Item = bool>) -> Self {
        let mut words = vec![0u64; dimension.div_ceil(64)];
        for (i, bit) in bits.into_iter().take(dimension).enumerate() {
            if bit {
                words[i / 64] |= 1 << (i % 64);
            }
        }
        Self { words, dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Component at `index` as +1 or -1. Panics if out of range.
    pub fn component(&self, index: usize) -> i8 {
        assert!(index < self.dimension, "component index out of range");
        if self.words[index / 64] >> (index % 64) & 1 == 1 {
            1
        } else {
            -1
        }
    }

    /// Number of +1 components.
    pub fn count_positive(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Number of differing components. Mismatched dimensions count as
    /// maximally distant.
    pub fn hamming_distance(&self, other: &Self) -> usize {
        if self.dimension != other.dimension {
            return self.dimension.max(other.dimension);
        }
        self.words
            .iter()
            .zip(&other.words)
            .map(|(a, b)| (a ^ b).count_ones() as usize)
            .sum()
    }

    /// Number of equal components.
    pub fn matching_components(&self, other: &Self) -> usize {
        self.dimension.saturating_sub(self.hamming_distance(other))
    }
}

impl fmt::Debug for HyperVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperVector")
            .field("dimension", &self.dimension)
            .field("positive", &self.count_positive())
            .finish()
    }
}
