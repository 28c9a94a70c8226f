//! Shared data model for the Accord resonance negotiation engine.
//!
//! Every subsystem exchanges the types defined here. The crate carries ids,
//! demand and offer payloads, gap analysis results, session state, and the
//! protocol event envelope; nothing operational lives in it.

#![deny(unsafe_code)]

pub mod demand;
pub mod events;
pub mod gap;
pub mod health;
pub mod ids;
pub mod offer;
pub mod session;

pub use demand::{Demand, DemandPreferences, Formulation};
pub use events::{EventSeverity, ProtocolEvent, ProtocolEventEnvelope};
pub use gap::{Gap, GapAnalysis, GapKind, GapSeverity, RecommendedAction, SubDemand};
pub use health::{AgentHealth, AgentStatus, FailureKind, ProbeFailure, ProbeReport};
pub use ids::{AgentId, DemandId, GapId, NegotiationId, OfferId, SceneId, SubscriptionId};
pub use offer::Offer;
pub use session::{
    ActivatedAgent, FailureReason, NegotiationSession, NegotiationStatus, UserAction,
};
