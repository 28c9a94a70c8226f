//! Requirement gaps and recursive decomposition payloads

use crate::demand::Demand;
use crate::ids::{DemandId, GapId, NegotiationId, OfferId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How badly a gap undermines the delivered plan.
///
/// Ordered so that `Low < Medium < High`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum GapSeverity {
    Low,
    Medium,
    High,
}

impl fmt::Display for GapSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GapSeverity::Low => write!(f, "low"),
            GapSeverity::Medium => write!(f, "medium"),
            GapSeverity::High => write!(f, "high"),
        }
    }
}

/// What kind of shortfall was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    /// No offer covers the aspect at all
    MissingAspect,
    /// The aspect is only covered by low-confidence offers
    WeakCoverage,
}

/// A detected shortfall between the demand and the collected offers.
///
/// Read-only once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gap {
    pub id: GapId,
    pub negotiation_id: NegotiationId,
    pub severity: GapSeverity,
    pub kind: GapKind,

    /// The demand aspect this gap concerns
    pub aspect: String,

    pub description: String,

    /// Offers that partially touch the aspect, if any
    #[serde(default)]
    pub related_offers: Vec<OfferId>,

    /// Candidate sub-demand texts that would close the gap
    #[serde(default)]
    pub suggested_sub_demands: Vec<String>,
}

/// What the engine should do with the collected offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    /// Coverage is complete, deliver as-is
    Deliver,
    /// Deliver, flagging the remaining medium/low gaps
    DeliverWithGap,
    /// Spawn sub-negotiations for the high-severity gaps
    Recursive,
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecommendedAction::Deliver => write!(f, "deliver"),
            RecommendedAction::DeliverWithGap => write!(f, "deliver_with_gap"),
            RecommendedAction::Recursive => write!(f, "recursive"),
        }
    }
}

/// Outcome of analyzing collected offers against the demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapAnalysis {
    pub gaps: Vec<Gap>,
    pub recommended_action: RecommendedAction,
}

impl GapAnalysis {
    pub fn high_severity_count(&self) -> usize {
        self.gaps
            .iter()
            .filter(|g| g.severity == GapSeverity::High)
            .count()
    }
}

/// A demand derived from a gap, negotiated in a nested session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubDemand {
    /// The derived demand itself, ready for submission
    pub demand: Demand,
    pub parent_negotiation_id: NegotiationId,
    pub parent_demand_id: DemandId,
    pub gap_id: GapId,
}
