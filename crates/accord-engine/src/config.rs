//! Engine configuration

use crate::gaps::GapConfig;
use accord_events::BusConfig;
use accord_health::HealthConfig;
use accord_signal::SignalConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Negotiation pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationConfig {
    /// Minimum resonance score an agent must reach to be activated.
    /// Unrelated signals concentrate near 0.5 under sign projection, so
    /// the default sits just above chance.
    pub resonance_threshold: f64,

    /// Agents activated per negotiation at most
    pub activation_limit: usize,

    /// How long the barrier waits for offers before completing with
    /// whatever arrived
    pub offer_timeout: Duration,

    /// Deepest nesting level that may still spawn sub-negotiations
    pub max_recursion_depth: u32,

    /// Confidence recorded when formulation fails and the raw demand
    /// text is used instead
    pub fallback_confidence: f64,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            resonance_threshold: 0.55,
            activation_limit: 8,
            offer_timeout: Duration::from_secs(30),
            max_recursion_depth: 2,
            fallback_confidence: 0.1,
        }
    }
}

/// Matching knobs resolved per negotiation at submission time.
#[derive(Debug, Clone, Copy)]
pub struct MatchSettings {
    pub resonance_threshold: f64,
    pub activation_limit: usize,
}

/// Aggregate configuration for a fully assembled engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub signal: SignalConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub events: BusConfig,

    #[serde(default)]
    pub negotiation: NegotiationConfig,

    #[serde(default)]
    pub gaps: GapConfig,
}
