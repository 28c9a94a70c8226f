//! Coverage grading of collected offers and sub-demand derivation

use accord_types::{
    Demand, DemandPreferences, Formulation, Gap, GapAnalysis, GapId, GapKind, GapSeverity,
    NegotiationId, NegotiationSession, Offer, RecommendedAction, SubDemand,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Tunables for gap analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapConfig {
    /// Offers below this confidence do not count as solid coverage
    #[serde(default = "default_min_offer_confidence")]
    pub min_offer_confidence: f64,
}

fn default_min_offer_confidence() -> f64 {
    0.4
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            min_offer_confidence: default_min_offer_confidence(),
        }
    }
}

/// Grades collected offers against the demand's aspects.
///
/// Aspects come from the demand's preferences first, then from formulation
/// keywords that no declared aspect already mentions. A required aspect with
/// no coverage is high severity; an optional or derived one is medium; an
/// aspect covered only by low-confidence offers is low.
#[derive(Debug, Clone)]
pub struct GapAnalyzer {
    config: GapConfig,
}

impl GapAnalyzer {
    pub fn new(config: GapConfig) -> Self {
        Self { config }
    }

    /// Grade `offers` against the demand, producing gaps and a recommended
    /// action. Runs on whatever arrived; an empty offer list grades every
    /// aspect as missing.
    pub fn analyze(
        &self,
        negotiation_id: NegotiationId,
        demand: &Demand,
        formulation: Option<&Formulation>,
        offers: &[Offer],
    ) -> GapAnalysis {
        let mut gaps = Vec::new();

        for (aspect, miss_severity) in aspect_candidates(demand, formulation) {
            let covering: Vec<&Offer> =
                offers.iter().filter(|o| covers(o, &aspect)).collect();

            if covering.is_empty() {
                gaps.push(Gap {
                    id: GapId::generate(),
                    negotiation_id,
                    severity: miss_severity,
                    kind: GapKind::MissingAspect,
                    aspect: aspect.clone(),
                    description: format!("no collected offer covers \"{aspect}\""),
                    related_offers: Vec::new(),
                    suggested_sub_demands: vec![format!(
                        "Provide {aspect} for: {}",
                        demand.text
                    )],
                });
            } else if covering
                .iter()
                .all(|o| o.confidence < self.config.min_offer_confidence)
            {
                gaps.push(Gap {
                    id: GapId::generate(),
                    negotiation_id,
                    severity: GapSeverity::Low,
                    kind: GapKind::WeakCoverage,
                    aspect: aspect.clone(),
                    description: format!(
                        "\"{aspect}\" is covered only by low-confidence offers"
                    ),
                    related_offers: covering.iter().map(|o| o.id).collect(),
                    suggested_sub_demands: vec![format!(
                        "Strengthen {aspect} coverage for: {}",
                        demand.text
                    )],
                });
            }
        }

        let recommended_action = if gaps.iter().any(|g| g.severity == GapSeverity::High) {
            RecommendedAction::Recursive
        } else if gaps.is_empty() {
            RecommendedAction::Deliver
        } else {
            RecommendedAction::DeliverWithGap
        };

        GapAnalysis {
            gaps,
            recommended_action,
        }
    }
}

/// Derive one sub-demand per gap, each linked back to the parent session
/// through its context and carrying the gap aspect as a required aspect.
pub fn create_sub_demands(
    session: &NegotiationSession,
    analysis: &GapAnalysis,
) -> Vec<SubDemand> {
    analysis
        .gaps
        .iter()
        .map(|gap| {
            let text = gap
                .suggested_sub_demands
                .first()
                .cloned()
                .unwrap_or_else(|| {
                    format!("Provide {} for: {}", gap.aspect, session.demand.text)
                });

            let demand = Demand::new(session.scene_id.clone(), text)
                .with_context("parent_negotiation_id", session.id.to_string())
                .with_context("parent_demand_id", session.demand.id.to_string())
                .with_context("gap_aspect", gap.aspect.clone())
                .with_preferences(DemandPreferences::required([gap.aspect.clone()]));

            SubDemand {
                demand,
                parent_negotiation_id: session.id,
                parent_demand_id: session.demand.id,
                gap_id: gap.id,
            }
        })
        .collect()
}

/// Aspects to grade, in declaration order, each with the severity a total
/// miss earns. Formulation keywords already mentioned by a declared aspect
/// are skipped so one shortfall is not reported twice.
fn aspect_candidates(
    demand: &Demand,
    formulation: Option<&Formulation>,
) -> Vec<(String, GapSeverity)> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates = Vec::new();

    for aspect in &demand.preferences.required_aspects {
        if seen.insert(aspect.to_lowercase()) {
            candidates.push((aspect.clone(), GapSeverity::High));
        }
    }
    for aspect in &demand.preferences.optional_aspects {
        if seen.insert(aspect.to_lowercase()) {
            candidates.push((aspect.clone(), GapSeverity::Medium));
        }
    }

    if let Some(formulation) = formulation {
        for keyword in &formulation.keywords {
            let lowered = keyword.to_lowercase();
            let mentioned = seen.iter().any(|aspect| aspect.contains(&lowered));
            if !mentioned && seen.insert(lowered) {
                candidates.push((keyword.clone(), GapSeverity::Medium));
            }
        }
    }

    candidates
}

/// An offer covers an aspect when every word of the aspect appears in the
/// offer content, case-insensitively.
fn covers(offer: &Offer, aspect: &str) -> bool {
    let content = offer.content.to_lowercase();
    aspect
        .to_lowercase()
        .split_whitespace()
        .all(|word| content.contains(word))
}
