// src/core/coordinator.rs
//! Fuses heterogeneous proposals into one base-bid change per campaign.
//! `coordinate` is a pure fold over the proposal list.

use crate::config::{BidLimits, CoordinatorConfig};
use crate::reasons::{ReasonFact, ReasonRenderer, RuleId};
use crate::types::{BidProposal, CoordinationResult};
use crate::utils::precision::{bid_from_f64, bid_to_f64, normalize_bid};
use rust_decimal::Decimal;
use tracing::warn;

/// Snapshot of a campaign's current bid layers.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinationInput {
    pub campaign_id: String,
    pub current_base_bid: Decimal,
    /// Highest placement adjustment as a fraction, e.g. 0.5 for +50%.
    pub current_placement_multiplier: f64,
    pub current_dayparting_multiplier: f64,
    pub historical_avg_cpc: Option<Decimal>,
}

#[derive(Debug, Clone, Default)]
struct Blend {
    weighted_sum: f64,
    weight: f64,
    used: usize,
    warnings: Vec<String>,
    facts: Vec<ReasonFact>,
}

impl Blend {
    fn absorb(mut self, proposal: &BidProposal, config: &CoordinatorConfig) -> Self {
        let m = proposal.suggested_multiplier;
        let c = proposal.confidence;
        let (lo, hi) = config.multiplier_bounds;

        if !c.is_finite() || !(0.0..=1.0).contains(&c) || !m.is_finite() || m < lo || m > hi {
            self.warnings.push(format!(
                "ignored {:?} proposal for {}: multiplier {m}, confidence {c}",
                proposal.source, proposal.subject_id
            ));
            self.facts.push(
                ReasonFact::new(RuleId::ProposalAnomaly)
                    .with("multiplier", m)
                    .with("confidence", c),
            );
            return self;
        }
        if c < config.min_confidence {
            self.facts
                .push(ReasonFact::new(RuleId::ProposalExcluded).with("confidence", c));
            return self;
        }

        self.weighted_sum += m * c;
        self.weight += c;
        self.used += 1;
        self
    }

    fn multiplier(&self) -> Option<f64> {
        (self.weight > 0.0).then(|| self.weighted_sum / self.weight)
    }
}

/// Worst-case CPC allowed: a multiple of the historical average when one is
/// known, never above the absolute cap.
pub fn cpc_ceiling(historical_avg_cpc: Option<Decimal>, config: &CoordinatorConfig) -> Decimal {
    match historical_avg_cpc.filter(|c| *c > Decimal::ZERO) {
        Some(avg) => {
            (avg * bid_from_f64(config.max_cpc_history_multiple)).min(config.absolute_max_cpc)
        }
        None => config.absolute_max_cpc,
    }
}

pub fn coordinate(
    input: &CoordinationInput,
    proposals: &[BidProposal],
    limits: &BidLimits,
    config: &CoordinatorConfig,
    renderer: &dyn ReasonRenderer,
) -> CoordinationResult {
    let blend = proposals
        .iter()
        .fold(Blend::default(), |acc, p| acc.absorb(p, config));
    let mut warnings = blend.warnings.clone();
    let mut facts = blend.facts.clone();

    let original = input.current_base_bid;
    let combined = match blend.multiplier() {
        Some(m) => {
            facts.push(
                ReasonFact::new(RuleId::ProposalsBlended)
                    .with("count", blend.used as f64)
                    .with("multiplier", m),
            );
            m
        }
        None => {
            facts.push(ReasonFact::new(RuleId::NoEligibleProposals));
            1.0
        }
    };

    let candidate = normalize_bid(original * bid_from_f64(combined), limits.tick)
        .clamp(limits.min_bid, limits.max_bid);

    let mut placement = input.current_placement_multiplier;
    if !placement.is_finite() || placement < -1.0 {
        warnings.push(format!("placement multiplier {placement} is implausible, treated as 0"));
        placement = 0.0;
    }
    let mut dayparting = input.current_dayparting_multiplier;
    if !dayparting.is_finite() || dayparting <= 0.0 {
        warnings.push(format!("dayparting multiplier {dayparting} is implausible, treated as 1"));
        dayparting = 1.0;
    }
    let theoretical_max_cpc = candidate * bid_from_f64((1.0 + placement) * dayparting);
    let ceiling = cpc_ceiling(input.historical_avg_cpc, config);

    let tripped = theoretical_max_cpc > ceiling;
    let (final_base_bid, effective_multiplier) = if tripped {
        facts.push(
            ReasonFact::new(RuleId::CircuitBreakerTripped)
                .with("theoretical_max_cpc", bid_to_f64(theoretical_max_cpc))
                .with("ceiling", bid_to_f64(ceiling)),
        );
        warn!(
            campaign_id = %input.campaign_id,
            %candidate,
            %theoretical_max_cpc,
            %ceiling,
            "circuit breaker tripped, keeping base bid"
        );
        (original, 1.0)
    } else {
        (candidate, combined)
    };

    CoordinationResult {
        campaign_id: input.campaign_id.clone(),
        original_base_bid: original,
        final_base_bid,
        candidate_base_bid: candidate,
        theoretical_max_cpc,
        effective_multiplier,
        circuit_breaker_triggered: tripped,
        warnings,
        reason: renderer.render(&facts),
        facts,
    }
}
