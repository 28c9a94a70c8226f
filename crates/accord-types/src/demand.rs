//! Demand payloads entering the negotiation pipeline

use crate::ids::{DemandId, SceneId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A free-text requirement submitted under a scene.
///
/// Immutable once submitted; the negotiation session that was created for
/// it is the sole owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Demand {
    pub id: DemandId,

    /// Scene the demand was raised under
    pub scene_id: SceneId,

    /// Raw requirement text as submitted
    pub text: String,

    /// Optional structured context attached by the caller
    #[serde(default)]
    pub context: BTreeMap<String, String>,

    /// Aspect preferences consulted by gap analysis
    #[serde(default)]
    pub preferences: DemandPreferences,

    pub submitted_at: DateTime<Utc>,
}

impl Demand {
    pub fn new(scene_id: SceneId, text: impl Into<String>) -> Self {
        Self {
            id: DemandId::generate(),
            scene_id,
            text: text.into(),
            context: BTreeMap::new(),
            preferences: DemandPreferences::default(),
            submitted_at: Utc::now(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_preferences(mut self, preferences: DemandPreferences) -> Self {
        self.preferences = preferences;
        self
    }
}

/// Aspects the demand owner cares about, used to grade offer coverage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemandPreferences {
    /// Aspects that must be covered; a miss is a high-severity gap
    #[serde(default)]
    pub required_aspects: Vec<String>,

    /// Aspects that are nice to have; a miss is a medium-severity gap
    #[serde(default)]
    pub optional_aspects: Vec<String>,
}

impl DemandPreferences {
    pub fn required(aspects: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            required_aspects: aspects.into_iter().map(Into::into).collect(),
            optional_aspects: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.required_aspects.is_empty() && self.optional_aspects.is_empty()
    }
}

/// Output of the formulation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Formulation {
    /// Enriched requirement text used for encoding and solicitation
    pub enriched_text: String,

    /// Keywords extracted from the demand
    pub keywords: Vec<String>,

    /// Collaborator confidence in the enrichment, in [0, 1]
    pub confidence: f64,

    /// True when the collaborator failed and the raw text was kept instead
    pub fell_back: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demand_context_builder() {
        let demand = Demand::new(SceneId::new("scene-1"), "build a store")
            .with_context("budget", "low")
            .with_context("deadline", "friday");

        assert_eq!(demand.context.len(), 2);
        assert_eq!(demand.context.get("budget").map(String::as_str), Some("low"));
    }

    #[test]
    fn test_preferences_required_constructor() {
        let prefs = DemandPreferences::required(["cart", "payment integration"]);
        assert_eq!(prefs.required_aspects.len(), 2);
        assert!(prefs.optional_aspects.is_empty());
        assert!(!prefs.is_empty());
    }
}
