//! Subscription filters

use accord_types::{NegotiationId, ProtocolEventEnvelope, SceneId};
use serde::{Deserialize, Serialize};

/// Criteria an envelope must satisfy to reach a subscriber.
///
/// Unset fields match everything; set fields are combined with AND. A
/// scene filter catches an entire negotiation tree, since sub-negotiations
/// inherit their parent's scene.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    pub negotiation_id: Option<NegotiationId>,
    pub scene_id: Option<SceneId>,
    /// Dotted event type names, e.g. `"negotiation.completed"`.
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// A filter that matches every envelope.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn negotiation(mut self, id: NegotiationId) -> Self {
        self.negotiation_id = Some(id);
        self
    }

    pub fn scene(mut self, id: SceneId) -> Self {
        self.scene_id = Some(id);
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types
            .get_or_insert_with(Vec::new)
            .push(event_type.into());
        self
    }

    pub fn matches(&self, envelope: &ProtocolEventEnvelope) -> bool {
        if let Some(negotiation_id) = self.negotiation_id {
            if envelope.negotiation_id != Some(negotiation_id) {
                return false;
            }
        }
        if let Some(ref scene_id) = self.scene_id {
            if envelope.scene_id.as_ref() != Some(scene_id) {
                return false;
            }
        }
        if let Some(ref event_types) = self.event_types {
            if !event_types.iter().any(|t| t == envelope.event.event_type()) {
                return false;
            }
        }
        true
    }
}
