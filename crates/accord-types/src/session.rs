//! Negotiation session state

use crate::demand::{Demand, Formulation};
use crate::gap::GapAnalysis;
use crate::ids::{AgentId, NegotiationId, SceneId};
use crate::offer::Offer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle stage of a negotiation.
///
/// `Formulating → Resonating → CollectingOffers → {Completed | Failed}`;
/// the two terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStatus {
    Formulating,
    Resonating,
    CollectingOffers,
    Completed,
    Failed,
}

impl NegotiationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NegotiationStatus::Completed | NegotiationStatus::Failed)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: NegotiationStatus) -> bool {
        use NegotiationStatus::*;
        matches!(
            (*self, next),
            (Formulating, Resonating)
                | (Resonating, CollectingOffers)
                | (Resonating, Failed)
                | (CollectingOffers, Completed)
        )
    }
}

impl fmt::Display for NegotiationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationStatus::Formulating => write!(f, "formulating"),
            NegotiationStatus::Resonating => write!(f, "resonating"),
            NegotiationStatus::CollectingOffers => write!(f, "collecting_offers"),
            NegotiationStatus::Completed => write!(f, "completed"),
            NegotiationStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Why a negotiation ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// No registered agent cleared the resonance threshold
    NoResonantAgents,
    /// The embedding collaborator was unavailable and the session aborted
    EmbeddingUnavailable,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoResonantAgents => write!(f, "no resonant agents"),
            FailureReason::EmbeddingUnavailable => write!(f, "embedding unavailable"),
        }
    }
}

/// How the demand owner judged a delivered result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UserAction {
    Accept,
    Reject,
    Modify { instructions: String },
}

/// An agent activated by resonance matching, with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivatedAgent {
    pub agent_id: AgentId,
    pub score: f64,
}

/// One negotiation from demand submission to terminal state.
///
/// Mutated only by the state machine that owns it; a session whose status
/// is terminal is never written again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationSession {
    pub id: NegotiationId,
    pub scene_id: SceneId,
    pub demand: Demand,
    pub status: NegotiationStatus,

    /// Present once the formulation stage ran (fallback included)
    pub formulation: Option<Formulation>,

    /// Agents activated by resonance, ranked
    pub activated_agents: Vec<ActivatedAgent>,

    /// Offers that arrived before the barrier completed
    pub offers: Vec<Offer>,

    pub gap_analysis: Option<GapAnalysis>,

    /// Child sessions spawned for high-severity gaps
    pub sub_negotiations: Vec<NegotiationId>,

    pub failure: Option<FailureReason>,
    pub user_action: Option<UserAction>,

    /// Recursion depth; zero for user-submitted demands
    pub depth: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NegotiationSession {
    pub fn new(demand: Demand) -> Self {
        Self::with_depth(demand, 0)
    }

    pub fn with_depth(demand: Demand, depth: u32) -> Self {
        let now = Utc::now();
        Self {
            id: NegotiationId::generate(),
            scene_id: demand.scene_id.clone(),
            demand,
            status: NegotiationStatus::Formulating,
            formulation: None,
            activated_agents: Vec::new(),
            offers: Vec::new(),
            gap_analysis: None,
            sub_negotiations: Vec::new(),
            failure: None,
            user_action: None,
            depth,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Text driving encoding and solicitation: the enriched formulation when
    /// present, the raw demand text otherwise.
    pub fn effective_text(&self) -> &str {
        self.formulation
            .as_ref()
            .map(|f| f.enriched_text.as_str())
            .unwrap_or(&self.demand.text)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
