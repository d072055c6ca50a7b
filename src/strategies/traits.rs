// src/strategies/traits.rs
use crate::config::BidLimits;
use crate::error::EngineResult;
use crate::reasons::{ReasonFact, RuleId};
use crate::strategies::sparse::GroupPriors;
use crate::types::{BidProposal, GoalConfig, TargetMetrics};
use crate::utils::precision::{bid_from_f64, bid_to_f64, change_window, normalize_bid};
use rust_decimal::Decimal;

/// Everything a bid estimator may read for one target.
#[derive(Debug, Clone, Copy)]
pub struct EstimationContext<'a> {
    pub metrics: &'a TargetMetrics,
    pub goal: &'a GoalConfig,
    pub priors: &'a GroupPriors,
    pub limits: &'a BidLimits,
}

pub trait BidEstimator: Send + Sync {
    fn name(&self) -> &'static str;

    fn estimate(&self, ctx: &EstimationContext<'_>) -> EngineResult<BidProposal>;
}

/// Rounds `raw` to a tick, caps the step at `max_change_pct` of `current`,
/// then clamps into the bid range. Facts record whichever bound bit.
pub fn bound_bid(
    raw: f64,
    current: Decimal,
    max_change_pct: f64,
    limits: &BidLimits,
) -> (Decimal, Vec<ReasonFact>) {
    let mut facts = Vec::new();
    let rounded = normalize_bid(bid_from_f64(raw), limits.tick);

    let (lower, upper) = change_window(current, max_change_pct, limits.tick);
    let capped = rounded.clamp(lower, upper);
    if capped != rounded {
        facts.push(
            ReasonFact::new(RuleId::ChangeCapped)
                .with("cap_pct", max_change_pct * 100.0)
                .with("wanted", raw),
        );
    }

    let clamped = capped.clamp(limits.min_bid, limits.max_bid);
    if clamped != capped {
        facts.push(
            ReasonFact::new(RuleId::BidRangeClamped)
                .with("min", bid_to_f64(limits.min_bid))
                .with("max", bid_to_f64(limits.max_bid)),
        );
    }
    (clamped, facts)
}

pub fn multiplier(new_bid: Decimal, current: Decimal) -> f64 {
    if current.is_zero() {
        return 1.0;
    }
    bid_to_f64(new_bid / current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn caps_before_clamping() {
        let limits = BidLimits::default();
        let (bid, facts) = bound_bid(3.0, dec("1.00"), 0.25, &limits);
        assert_eq!(bid, dec("1.25"));
        assert_eq!(facts[0].rule, RuleId::ChangeCapped);
    }

    #[test]
    fn range_wins_over_change_window() {
        let limits = BidLimits::default();
        let (bid, facts) = bound_bid(0.01, dec("0.11"), 0.25, &limits);
        assert_eq!(bid, dec("0.10"));
        assert!(facts.iter().any(|f| f.rule == RuleId::BidRangeClamped));
    }

    #[test]
    fn untouched_bid_has_no_facts() {
        let (bid, facts) = bound_bid(1.1, dec("1.00"), 0.25, &BidLimits::default());
        assert_eq!(bid, dec("1.10"));
        assert!(facts.is_empty());
    }
}
