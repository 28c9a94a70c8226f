//! Collaborator seams the engine drives at its boundaries
//!
//! Formulation, agent invocation, and persistence are all external
//! concerns. The engine talks to them through these traits; the bundled
//! implementations keep a deployment working with no external services
//! attached.

use crate::error::EngineResult;
use accord_registry::AgentDescriptor;
use accord_types::{
    Demand, Formulation, NegotiationId, NegotiationSession, ProtocolEventEnvelope,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// Enriches raw demand text before encoding.
///
/// Failures are recoverable: the engine falls back to the raw text with
/// low confidence rather than aborting the session.
#[async_trait]
pub trait FormulationProvider: Send + Sync {
    async fn formulate(&self, demand: &Demand) -> EngineResult<Formulation>;
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "for", "in", "of", "on", "or", "the", "to", "with",
];

const MAX_KEYWORDS: usize = 8;

/// Offline formulator: keyword extraction plus aspect annotation.
///
/// Deterministic, so identical demands always formulate identically.
pub struct HeuristicFormulator;

#[async_trait]
impl FormulationProvider for HeuristicFormulator {
    async fn formulate(&self, demand: &Demand) -> EngineResult<Formulation> {
        let mut keywords: Vec<String> = Vec::new();
        for token in demand.text.split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            let token = token.to_lowercase();
            if STOPWORDS.contains(&token.as_str()) || keywords.contains(&token) {
                continue;
            }
            keywords.push(token);
            if keywords.len() == MAX_KEYWORDS {
                break;
            }
        }

        let mut enriched = demand.text.clone();
        if !demand.preferences.required_aspects.is_empty() {
            enriched.push_str("; required: ");
            enriched.push_str(&demand.preferences.required_aspects.join(", "));
        }
        if !demand.preferences.optional_aspects.is_empty() {
            enriched.push_str("; optional: ");
            enriched.push_str(&demand.preferences.optional_aspects.join(", "));
        }

        let confidence = (0.5 + 0.05 * keywords.len() as f64).min(0.9);
        Ok(Formulation {
            enriched_text: enriched,
            keywords,
            confidence,
            fell_back: false,
        })
    }
}

/// What an activated agent is asked to respond to.
#[derive(Debug, Clone)]
pub struct OfferRequest {
    pub negotiation_id: NegotiationId,

    /// Effective demand text, enriched when a formulation is present
    pub demand_text: String,

    /// Structured context carried over from the demand
    pub context: BTreeMap<String, String>,
}

/// An agent's drafted response before the engine stamps it into an
/// [`Offer`](accord_types::Offer).
#[derive(Debug, Clone)]
pub struct OfferDraft {
    pub content: String,
    pub confidence: f64,
}

/// Invokes an agent against a solicitation.
///
/// `Ok(None)` means the agent declined, which is a valid non-answer.
/// Errors are retried by the health monitor; an agent whose retries are
/// exhausted counts as unresponsive.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn generate_offer(
        &self,
        agent: &AgentDescriptor,
        request: &OfferRequest,
    ) -> EngineResult<Option<OfferDraft>>;
}

/// Write-behind persistence seam.
///
/// The engine treats store failures as degradation: they are logged and
/// the negotiation continues.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn save_session(&self, session: &NegotiationSession) -> EngineResult<()>;
    async fn save_event(&self, envelope: &ProtocolEventEnvelope) -> EngineResult<()>;
}

/// Store that keeps nothing.
pub struct NullStore;

#[async_trait]
impl DurableStore for NullStore {
    async fn save_session(&self, _session: &NegotiationSession) -> EngineResult<()> {
        Ok(())
    }

    async fn save_event(&self, _envelope: &ProtocolEventEnvelope) -> EngineResult<()> {
        Ok(())
    }
}

/// Store that keeps everything in memory, in write order.
#[derive(Default)]
pub struct MemoryStore {
    sessions: DashMap<NegotiationId, NegotiationSession>,
    events: Mutex<Vec<ProtocolEventEnvelope>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self, id: &NegotiationId) -> Option<NegotiationSession> {
        self.sessions.get(id).map(|s| s.clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub async fn events(&self) -> Vec<ProtocolEventEnvelope> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn save_session(&self, session: &NegotiationSession) -> EngineResult<()> {
        self.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn save_event(&self, envelope: &ProtocolEventEnvelope) -> EngineResult<()> {
        self.events.lock().await.push(envelope.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_types::{DemandPreferences, SceneId};

    #[tokio::test]
    async fn test_heuristic_formulator_extracts_keywords() {
        let demand = Demand::new(
            SceneId::new("scene-1"),
            "Build an online store with cart and payment",
        );
        let formulation = HeuristicFormulator.formulate(&demand).await.unwrap();

        assert_eq!(
            formulation.keywords,
            vec!["build", "online", "store", "cart", "payment"]
        );
        assert!(!formulation.fell_back);
        assert!(formulation.confidence > 0.5);
    }

    #[tokio::test]
    async fn test_heuristic_formulator_annotates_aspects() {
        let demand = Demand::new(SceneId::new("scene-1"), "build an online store")
            .with_preferences(DemandPreferences::required(["payment integration"]));
        let formulation = HeuristicFormulator.formulate(&demand).await.unwrap();

        assert!(formulation.enriched_text.contains("required: payment integration"));
    }

    #[tokio::test]
    async fn test_heuristic_formulator_is_deterministic() {
        let demand = Demand::new(SceneId::new("scene-1"), "tune the search index");
        let a = HeuristicFormulator.formulate(&demand).await.unwrap();
        let b = HeuristicFormulator.formulate(&demand).await.unwrap();
        assert_eq!(a.enriched_text, b.enriched_text);
        assert_eq!(a.keywords, b.keywords);
    }

    #[tokio::test]
    async fn test_memory_store_keeps_write_order() {
        use accord_types::{ProtocolEvent, ProtocolEventEnvelope};

        let store = MemoryStore::new();
        let first = NegotiationId::generate();
        let second = NegotiationId::generate();
        for id in [first, second] {
            store
                .save_event(&ProtocolEventEnvelope::new(
                    ProtocolEvent::FormulationConfirmed {
                        negotiation_id: id,
                    },
                ))
                .await
                .unwrap();
        }

        let events = store.events().await;
        assert_eq!(events[0].negotiation_id, Some(first));
        assert_eq!(events[1].negotiation_id, Some(second));
    }
}
