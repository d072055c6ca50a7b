// src/reasons.rs
//! Decisions explain themselves as a list of structured facts. Text is only
//! produced at the edge by a [`ReasonRenderer`], so tests assert on facts.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    DataSufficient,
    SparseFallback,
    GoalMaximizeSales,
    GoalTargetAcos,
    GoalTargetRoas,
    GoalDailySpendLimit,
    GoalDailyCost,
    NoQualifyingPoint,
    ChangeCapped,
    BidRangeClamped,
    InventoryPause,
    InventoryCritical,
    InventoryLow,
    OrganicRankSuppressed,
    OverrideFloor,
    PlacementScored,
    PlacementUnreliable,
    NoReliablePeer,
    PlacementBand,
    PlacementCapped,
    CooldownActive,
    ProposalExcluded,
    ProposalAnomaly,
    ProposalsBlended,
    NoEligibleProposals,
    CircuitBreakerTripped,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evidence {
    pub key: &'static str,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasonFact {
    pub rule: RuleId,
    pub evidence: Vec<Evidence>,
}

impl ReasonFact {
    pub fn new(rule: RuleId) -> Self {
        Self {
            rule,
            evidence: Vec::new(),
        }
    }

    pub fn with(mut self, key: &'static str, value: f64) -> Self {
        self.evidence.push(Evidence { key, value });
        self
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.evidence.iter().find(|e| e.key == key).map(|e| e.value)
    }
}

pub trait ReasonRenderer: Send + Sync {
    fn render(&self, facts: &[ReasonFact]) -> String;
}

/// English one-liners joined with "; ".
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextRenderer;

impl PlainTextRenderer {
    fn line(fact: &ReasonFact) -> String {
        let v = |key: &str| fact.get(key).unwrap_or(0.0);
        match fact.rule {
            RuleId::DataSufficient => format!(
                "{:.0} clicks / {:.0} orders, market curve used",
                v("clicks"),
                v("orders")
            ),
            RuleId::SparseFallback => format!(
                "sparse data ({:.0} clicks / {:.0} orders), smoothed CVR {:.2}% x CPA {:.2}",
                v("clicks"),
                v("orders"),
                v("smoothed_cvr") * 100.0,
                v("target_cpa")
            ),
            RuleId::GoalMaximizeSales => format!(
                "highest bid with marginal revenue >= marginal cost: {:.2}",
                v("bid")
            ),
            RuleId::GoalTargetAcos => format!(
                "highest bid within {:.1}% ACoS: {:.2}",
                v("target"),
                v("bid")
            ),
            RuleId::GoalTargetRoas => format!(
                "highest bid reaching ROAS {:.2}: {:.2}",
                v("target"),
                v("bid")
            ),
            RuleId::GoalDailySpendLimit => format!(
                "highest bid within daily spend {:.2}: {:.2}",
                v("target"),
                v("bid")
            ),
            RuleId::GoalDailyCost => format!(
                "bid closest to daily cost {:.2}: {:.2}",
                v("target"),
                v("bid")
            ),
            RuleId::NoQualifyingPoint => format!(
                "no curve point meets the goal, falling back to {:.2}",
                v("bid")
            ),
            RuleId::ChangeCapped => format!(
                "change capped at {:.0}% (wanted {:.2})",
                v("cap_pct"),
                v("wanted")
            ),
            RuleId::BidRangeClamped => format!(
                "clamped to bid range [{:.2}, {:.2}]",
                v("min"),
                v("max")
            ),
            RuleId::InventoryPause => "out of stock, paused".to_string(),
            RuleId::InventoryCritical | RuleId::InventoryLow => {
                let level = match fact.rule {
                    RuleId::InventoryCritical => "critical",
                    _ => "low",
                };
                match fact.get("inventory_days") {
                    Some(days) => format!(
                        "inventory {level} ({days:.0} days of cover), bid x{:.2}",
                        v("multiplier")
                    ),
                    None => format!("inventory {level}, bid x{:.2}", v("multiplier")),
                }
            }
            RuleId::OrganicRankSuppressed => format!(
                "organic rank #{:.0}, bid x{:.2}",
                v("rank"),
                v("multiplier")
            ),
            RuleId::OverrideFloor => format!("floored at {:.2}", v("floor")),
            RuleId::PlacementScored => format!(
                "score {:.1} (confidence {:.1})",
                v("score"),
                v("confidence")
            ),
            RuleId::PlacementUnreliable => format!(
                "insufficient data (confidence {:.1}), no change",
                v("confidence")
            ),
            RuleId::NoReliablePeer => "no placement in this campaign has reliable data".to_string(),
            RuleId::PlacementBand => format!(
                "{:.0}% of best placement, suggests {:+.1}pp",
                v("relative") * 100.0,
                v("suggested")
            ),
            RuleId::PlacementCapped => format!("step limited to {:.1}pp", v("limit")),
            RuleId::CooldownActive => format!(
                "cooldown, {:.0} days remaining",
                v("remaining_days")
            ),
            RuleId::ProposalExcluded => format!(
                "proposal below confidence floor ({:.2})",
                v("confidence")
            ),
            RuleId::ProposalAnomaly => format!(
                "implausible proposal ignored (x{:.2}, confidence {:.2})",
                v("multiplier"),
                v("confidence")
            ),
            RuleId::ProposalsBlended => format!(
                "{:.0} proposals blended to x{:.3}",
                v("count"),
                v("multiplier")
            ),
            RuleId::NoEligibleProposals => "no eligible proposals, bid unchanged".to_string(),
            RuleId::CircuitBreakerTripped => format!(
                "circuit breaker: worst-case CPC {:.2} exceeds {:.2}",
                v("theoretical_max_cpc"),
                v("ceiling")
            ),
        }
    }
}

impl ReasonRenderer for PlainTextRenderer {
    fn render(&self, facts: &[ReasonFact]) -> String {
        facts.iter().map(Self::line).collect::<Vec<_>>().join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_facts_in_order() {
        let facts = vec![
            ReasonFact::new(RuleId::InventoryCritical)
                .with("multiplier", 0.5)
                .with("inventory_days", 2.0),
            ReasonFact::new(RuleId::OverrideFloor).with("floor", 0.02),
        ];
        let text = PlainTextRenderer.render(&facts);
        assert_eq!(text, "inventory critical (2 days of cover), bid x0.50; floored at 0.02");
    }

    #[test]
    fn inventory_level_without_days_omits_cover() {
        let fact = ReasonFact::new(RuleId::InventoryLow).with("multiplier", 0.7);
        assert_eq!(PlainTextRenderer.render(&[fact]), "inventory low, bid x0.70");
    }

    #[test]
    fn get_returns_evidence_by_key() {
        let fact = ReasonFact::new(RuleId::CooldownActive).with("remaining_days", 3.0);
        assert_eq!(fact.get("remaining_days"), Some(3.0));
        assert_eq!(fact.get("missing"), None);
    }
}
