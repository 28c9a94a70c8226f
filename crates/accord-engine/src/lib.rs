//! Resonance negotiation orchestration for Accord.
//!
//! The engine takes a free-text demand through the full pipeline:
//! formulation (with a user confirmation gate), hypervector encoding,
//! resonance matching against the agent registry, parallel offer
//! collection behind a wait-barrier, gap analysis of the collected
//! offers, and recursive decomposition of high-severity gaps into
//! nested negotiations. Every stage publishes a protocol event.
//!
//! External concerns plug in through the collaborator traits in
//! [`collaborators`]; the bundled implementations keep the whole engine
//! runnable offline.

#![deny(unsafe_code)]

pub mod barrier;
pub mod collaborators;
pub mod config;
pub mod engine;
pub mod error;
pub mod gaps;
pub mod sessions;

pub use barrier::{BarrierOutcome, OfferBarrier, ResponseOutcome};
pub use collaborators::{
    AgentInvoker, DurableStore, FormulationProvider, HeuristicFormulator, MemoryStore,
    NullStore, OfferDraft, OfferRequest,
};
pub use config::{EngineConfig, MatchSettings, NegotiationConfig};
pub use engine::{
    DemandReceipt, DemandSubmission, EngineBuilder, NegotiationEngine, NegotiationOutcome,
};
pub use error::{EngineError, EngineResult};
pub use gaps::{create_sub_demands, GapAnalyzer, GapConfig};
pub use sessions::SessionMap;
