//! Agent registry for the Accord negotiation engine
//!
//! Holds the descriptors of every known agent together with the
//! hypervector signal derived from its profile. Registration is an upsert,
//! initialization is idempotent under concurrency, and availability is
//! filtered through the health monitor so matching never solicits an agent
//! that cannot answer.

#![deny(unsafe_code)]

pub mod agent;
pub mod error;
pub mod loader;
pub mod registry;

pub use agent::{AgentDescriptor, AgentProfile, AgentRegistration, RegisterOutcome};
pub use error::{RegistryError, RegistryResult};
pub use loader::{AgentLoader, StaticLoader};
pub use registry::{AgentRegistry, RegistrySnapshot};
