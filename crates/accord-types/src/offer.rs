//! Offers returned by solicited agents

use crate::ids::{AgentId, NegotiationId, OfferId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An agent's response to a solicited demand.
///
/// At most one offer per (negotiation, agent) pair survives collection;
/// offers are never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub negotiation_id: NegotiationId,
    pub agent_id: AgentId,

    /// Offer body produced by the agent
    pub content: String,

    /// The agent's own confidence in the offer, in [0, 1]
    pub confidence: f64,

    /// Resonance score the agent was activated with
    pub resonance_score: f64,

    pub created_at: DateTime<Utc>,
}

impl Offer {
    pub fn new(
        negotiation_id: NegotiationId,
        agent_id: AgentId,
        content: impl Into<String>,
        confidence: f64,
        resonance_score: f64,
    ) -> Self {
        Self {
            id: OfferId::generate(),
            negotiation_id,
            agent_id,
            content: content.into(),
            confidence,
            resonance_score,
            created_at: Utc::now(),
        }
    }
}
