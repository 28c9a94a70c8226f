//! Agent descriptors held by the registry

use accord_signal::HyperVector;
use accord_types::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Self-description an agent registers under.
///
/// The profile text is what gets encoded into the agent's signal, so the
/// wording here directly shapes which demands the agent resonates with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    pub description: String,
    pub capabilities: Vec<String>,
}

impl AgentProfile {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        capabilities: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            capabilities,
        }
    }

    /// The text the signal is derived from. Name, description, and
    /// capabilities all contribute tokens.
    pub fn resonance_text(&self) -> String {
        let mut text = String::with_capacity(
            self.name.len() + self.description.len() + self.capabilities.len() * 16,
        );
        text.push_str(&self.name);
        text.push(' ');
        text.push_str(&self.description);
        for capability in &self.capabilities {
            text.push(' ');
            text.push_str(capability);
        }
        text
    }
}

/// Registration input: an identity plus its profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegistration {
    pub id: AgentId,
    pub profile: AgentProfile,
}

impl AgentRegistration {
    pub fn new(id: AgentId, profile: AgentProfile) -> Self {
        Self { id, profile }
    }
}

/// Fully derived registry entry.
///
/// `registration_seq` is assigned once at first registration and survives
/// profile refreshes; the matcher uses it to break score ties in favor of
/// earlier registrations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: AgentId,
    pub profile: AgentProfile,
    pub signal: HyperVector,
    pub registration_seq: u64,
    pub registered_at: DateTime<Utc>,
    pub refreshed_at: DateTime<Utc>,
}

/// Result of an upsert.
#[derive(Debug, Clone)]
pub struct RegisterOutcome {
    pub descriptor: AgentDescriptor,
    /// True when an existing registration was refreshed in place.
    pub refreshed: bool,
}
