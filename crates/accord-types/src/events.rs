//! Protocol lifecycle events
//!
//! Every stage transition in a negotiation publishes one of these events;
//! subscribers and the replay history consume the envelope form.

use crate::gap::RecommendedAction;
use crate::health::AgentStatus;
use crate::ids::{AgentId, DemandId, GapId, NegotiationId, OfferId, SceneId, SubscriptionId};
use crate::session::{ActivatedAgent, FailureReason, UserAction};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping every protocol event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Event severity
    pub severity: EventSeverity,

    /// Scene correlation, when the publisher runs inside a scene
    pub scene_id: Option<SceneId>,

    /// Negotiation correlation, extracted from the event payload
    pub negotiation_id: Option<NegotiationId>,

    /// Demand correlation
    pub demand_id: Option<DemandId>,

    /// The actual event
    pub event: ProtocolEvent,
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level event
    Debug,
    /// Informational event
    Info,
    /// Warning event
    Warning,
    /// Error event
    Error,
    /// Critical event requiring immediate attention
    Critical,
}

/// Protocol lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    // ═══════════════════════════════════════════════════════════════════
    // NEGOTIATION LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════
    /// A demand entered the pipeline and a session was created
    DemandSubmitted {
        negotiation_id: NegotiationId,
        demand_id: DemandId,
        scene_id: SceneId,
        text: String,
    },

    /// The formulation stage finished (fallback included)
    FormulationCompleted {
        negotiation_id: NegotiationId,
        enriched_text: String,
        keywords: Vec<String>,
        confidence: f64,
        fell_back: bool,
    },

    /// The demand owner confirmed the formulation
    FormulationConfirmed {
        negotiation_id: NegotiationId,
    },

    /// Resonance matching activated a ranked set of agents
    ResonanceActivated {
        negotiation_id: NegotiationId,
        activated: Vec<ActivatedAgent>,
    },

    /// The negotiation reached `Completed`
    NegotiationCompleted {
        negotiation_id: NegotiationId,
        offer_count: usize,
    },

    /// The negotiation reached `Failed`
    NegotiationFailed {
        negotiation_id: NegotiationId,
        reason: FailureReason,
    },

    // ═══════════════════════════════════════════════════════════════════
    // OFFER COLLECTION
    // ═══════════════════════════════════════════════════════════════════
    /// An offer arrived before the barrier completed
    OfferReceived {
        negotiation_id: NegotiationId,
        agent_id: AgentId,
        offer_id: OfferId,
        resonance_score: f64,
    },

    /// The agent declined to offer (a valid non-answer)
    OfferDeclined {
        negotiation_id: NegotiationId,
        agent_id: AgentId,
    },

    /// An offer arrived after the barrier completed and was dropped
    LateOfferDropped {
        negotiation_id: NegotiationId,
        agent_id: AgentId,
    },

    /// The wait-barrier resolved
    BarrierCompleted {
        negotiation_id: NegotiationId,
        collected: usize,
        unresponsive: usize,
        timed_out: bool,
    },

    // ═══════════════════════════════════════════════════════════════════
    // GAP DECOMPOSITION
    // ═══════════════════════════════════════════════════════════════════
    /// Gap analysis finished over the collected offers
    GapsIdentified {
        negotiation_id: NegotiationId,
        gap_count: usize,
        high_severity: usize,
        recommended_action: RecommendedAction,
    },

    /// A nested negotiation was spawned for a gap
    SubDemandSpawned {
        negotiation_id: NegotiationId,
        child_id: NegotiationId,
        gap_id: GapId,
    },

    // ═══════════════════════════════════════════════════════════════════
    // AGENTS
    // ═══════════════════════════════════════════════════════════════════
    /// An agent registered or refreshed its descriptor
    AgentRegistered {
        agent_id: AgentId,
        refreshed: bool,
    },

    /// The health monitor changed an agent's status
    AgentStatusChanged {
        agent_id: AgentId,
        from: AgentStatus,
        to: AgentStatus,
    },

    // ═══════════════════════════════════════════════════════════════════
    // BOUNDARY
    // ═══════════════════════════════════════════════════════════════════
    /// The demand owner accepted/rejected/amended a delivered result
    UserActionRecorded {
        negotiation_id: NegotiationId,
        action: UserAction,
    },

    /// First event on a freshly attached event stream
    StreamHandshake {
        subscription_id: SubscriptionId,
    },
}

impl ProtocolEvent {
    /// Stable dotted name for counters and subscription filters
    pub fn event_type(&self) -> &'static str {
        match self {
            ProtocolEvent::DemandSubmitted { .. } => "demand.submitted",
            ProtocolEvent::FormulationCompleted { .. } => "formulation.completed",
            ProtocolEvent::FormulationConfirmed { .. } => "formulation.confirmed",
            ProtocolEvent::ResonanceActivated { .. } => "resonance.activated",
            ProtocolEvent::NegotiationCompleted { .. } => "negotiation.completed",
            ProtocolEvent::NegotiationFailed { .. } => "negotiation.failed",
            ProtocolEvent::OfferReceived { .. } => "offer.received",
            ProtocolEvent::OfferDeclined { .. } => "offer.declined",
            ProtocolEvent::LateOfferDropped { .. } => "offer.late_dropped",
            ProtocolEvent::BarrierCompleted { .. } => "barrier.completed",
            ProtocolEvent::GapsIdentified { .. } => "gap.identified",
            ProtocolEvent::SubDemandSpawned { .. } => "subdemand.spawned",
            ProtocolEvent::AgentRegistered { .. } => "agent.registered",
            ProtocolEvent::AgentStatusChanged { .. } => "agent.status_changed",
            ProtocolEvent::UserActionRecorded { .. } => "user.action",
            ProtocolEvent::StreamHandshake { .. } => "stream.handshake",
        }
    }

    /// Negotiation the event belongs to, when it has one
    pub fn negotiation_id(&self) -> Option<NegotiationId> {
        match self {
            ProtocolEvent::DemandSubmitted { negotiation_id, .. }
            | ProtocolEvent::FormulationCompleted { negotiation_id, .. }
            | ProtocolEvent::FormulationConfirmed { negotiation_id }
            | ProtocolEvent::ResonanceActivated { negotiation_id, .. }
            | ProtocolEvent::NegotiationCompleted { negotiation_id, .. }
            | ProtocolEvent::NegotiationFailed { negotiation_id, .. }
            | ProtocolEvent::OfferReceived { negotiation_id, .. }
            | ProtocolEvent::OfferDeclined { negotiation_id, .. }
            | ProtocolEvent::LateOfferDropped { negotiation_id, .. }
            | ProtocolEvent::BarrierCompleted { negotiation_id, .. }
            | ProtocolEvent::GapsIdentified { negotiation_id, .. }
            | ProtocolEvent::SubDemandSpawned { negotiation_id, .. }
            | ProtocolEvent::UserActionRecorded { negotiation_id, .. } => Some(*negotiation_id),
            ProtocolEvent::AgentRegistered { .. }
            | ProtocolEvent::AgentStatusChanged { .. }
            | ProtocolEvent::StreamHandshake { .. } => None,
        }
    }

    /// Demand the event belongs to, when the payload carries it
    pub fn demand_id(&self) -> Option<DemandId> {
        match self {
            ProtocolEvent::DemandSubmitted { demand_id, .. } => Some(*demand_id),
            _ => None,
        }
    }
}

impl ProtocolEventEnvelope {
    /// Create a new envelope; severity is inferred and correlation ids are
    /// extracted from the payload.
    pub fn new(event: ProtocolEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            severity: Self::infer_severity(&event),
            scene_id: None,
            negotiation_id: event.negotiation_id(),
            demand_id: event.demand_id(),
            event,
        }
    }

    /// Attach the scene the publisher runs under
    pub fn with_scene(mut self, scene_id: SceneId) -> Self {
        self.scene_id = Some(scene_id);
        self
    }

    /// Attach a demand correlation the payload does not carry itself
    pub fn with_demand(mut self, demand_id: DemandId) -> Self {
        self.demand_id = Some(demand_id);
        self
    }

    /// Infer severity from event type
    fn infer_severity(event: &ProtocolEvent) -> EventSeverity {
        match event {
            ProtocolEvent::NegotiationFailed { .. } => EventSeverity::Error,

            ProtocolEvent::LateOfferDropped { .. }
            | ProtocolEvent::BarrierCompleted { timed_out: true, .. } => EventSeverity::Warning,

            ProtocolEvent::GapsIdentified { high_severity, .. } if *high_severity > 0 => {
                EventSeverity::Warning
            }

            ProtocolEvent::AgentStatusChanged {
                to: AgentStatus::Unavailable,
                ..
            } => EventSeverity::Warning,

            _ => EventSeverity::Info,
        }
    }
}
