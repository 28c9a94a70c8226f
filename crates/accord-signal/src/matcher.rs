//! Resonance scoring and ranked agent activation

use crate::vector::HyperVector;
use accord_types::{ActivatedAgent, AgentId};

/// Normalized Hamming similarity in [0, 1].
///
/// `score(v, v) == 1.0`, symmetric; mismatched dimensions score 0.0.
pub fn resonance_score(a: &HyperVector, b: &HyperVector) -> f64 {
    if a.dimension() == 0 {
        return 0.0;
    }
    a.matching_components(b) as f64 / a.dimension() as f64
}

/// Score every candidate against the demand vector, keep those at or above
/// `threshold`, rank them, and truncate to `limit`.
///
/// Ranking is descending by score; ties break by ascending registration
/// sequence, so results are reproducible for identical inputs. An empty
/// result is a normal outcome, not an error.
pub fn find_resonant_agents<'a, I>(
    demand: &HyperVector,
    candidates: I,
    threshold: f64,
    limit: usize,
) -> Vec<ActivatedAgent>
where
    I: IntoIterator<Item = (AgentId, &'a HyperVector, u64)>,
{
    let mut scored: Vec<(ActivatedAgent, u64)> = candidates
        .into_iter()
        .map(|(agent_id, signal, seq)| {
            let score = resonance_score(demand, signal);
            (ActivatedAgent { agent_id, score }, seq)
        })
        .filter(|(activated, _)| activated.score >= threshold)
        .collect();

    scored.sort_by(|(a, seq_a), (b, seq_b)| {
        b.score.total_cmp(&a.score).then(seq_a.cmp(seq_b))
    });
    scored.truncate(limit);
    scored.into_iter().map(|(activated, _)| activated).collect()
}
