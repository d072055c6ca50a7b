// src/strategies/sparse.rs
use crate::config::{BidLimits, SparseConfig};
use crate::error::EngineResult;
use crate::reasons::{ReasonFact, RuleId};
use crate::strategies::traits::{bound_bid, multiplier, BidEstimator, EstimationContext};
use crate::types::{BidProposal, GoalConfig, ProposalSource, TargetMetrics};
use tracing::debug;

/// Pooled conversion rate and order value of an ad group, used as the prior
/// for its data-poor targets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupPriors {
    pub cvr: f64,
    pub aov: f64,
}

impl GroupPriors {
    pub fn from_targets(targets: &[TargetMetrics], config: &SparseConfig) -> Self {
        let (clicks, orders, sales) = targets
            .iter()
            .fold((0.0, 0.0, 0.0), |(c, o, s), t| (c + t.clicks, o + t.orders, s + t.sales));

        Self {
            cvr: if clicks > 0.0 && orders > 0.0 {
                orders / clicks
            } else {
                config.default_prior_cvr
            },
            aov: if orders > 0.0 && sales > 0.0 {
                sales / orders
            } else {
                config.default_aov
            },
        }
    }
}

/// Which rule produced the target cost per acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpaBasis {
    TargetAcos,
    TargetRoas,
    AovShare,
}

/// Conservative rule for targets that fail the sufficiency gate. It never
/// fits anything to the observations, it only shrinks the observed CVR
/// toward the group prior.
#[derive(Debug, Clone)]
pub struct SparseDataEstimator {
    config: SparseConfig,
}

impl SparseDataEstimator {
    pub fn new(config: SparseConfig) -> Self {
        Self { config }
    }

    pub fn smoothed_cvr(&self, clicks: f64, orders: f64, prior_cvr: f64) -> f64 {
        let k = self.config.prior_strength;
        (orders + k * prior_cvr) / (clicks + k)
    }

    pub fn target_cpa(
        &self,
        metrics: &TargetMetrics,
        group_avg_aov: f64,
        goal: &GoalConfig,
    ) -> (f64, CpaBasis) {
        match (goal.target_acos, goal.target_roas) {
            (Some(acos), _) if acos > 0.0 && metrics.orders >= 1.0 => {
                (acos / 100.0 * (metrics.sales / metrics.orders), CpaBasis::TargetAcos)
            }
            (_, Some(roas)) if roas > 0.0 => (group_avg_aov / roas, CpaBasis::TargetRoas),
            _ => (self.config.fallback_cpa_aov_share * group_avg_aov, CpaBasis::AovShare),
        }
    }

    pub fn confidence(metrics: &TargetMetrics) -> f64 {
        0.2 + 0.2 * (metrics.clicks / 15.0).min(1.0)
    }

    pub fn estimate_sparse_bid(
        &self,
        metrics: &TargetMetrics,
        priors: &GroupPriors,
        goal: &GoalConfig,
        limits: &BidLimits,
    ) -> BidProposal {
        let cvr = self.smoothed_cvr(metrics.clicks, metrics.orders, priors.cvr);
        let (cpa, basis) = self.target_cpa(metrics, priors.aov, goal);
        let theoretical = cvr * cpa;

        let mut facts = vec![ReasonFact::new(RuleId::SparseFallback)
            .with("clicks", metrics.clicks)
            .with("orders", metrics.orders)
            .with("smoothed_cvr", cvr)
            .with("target_cpa", cpa)
            .with("theoretical_bid", theoretical)];

        let (new_bid, bound_facts) =
            bound_bid(theoretical, metrics.current_bid, self.config.max_change_pct, limits);
        facts.extend(bound_facts);
        debug!(
            target_id = %metrics.target_id,
            smoothed_cvr = cvr,
            cpa,
            ?basis,
            %new_bid,
            "sparse estimate"
        );

        BidProposal {
            source: ProposalSource::SparseData,
            subject_id: metrics.target_id.clone(),
            suggested_multiplier: multiplier(new_bid, metrics.current_bid),
            suggested_bid: Some(new_bid),
            confidence: Self::confidence(metrics),
            facts,
        }
    }
}

impl BidEstimator for SparseDataEstimator {
    fn name(&self) -> &'static str {
        "sparse_data"
    }

    fn estimate(&self, ctx: &EstimationContext<'_>) -> EngineResult<BidProposal> {
        Ok(self.estimate_sparse_bid(ctx.metrics, ctx.priors, ctx.goal, ctx.limits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Counters, TargetKind};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn sparse_target(clicks: f64, orders: f64, sales: f64, bid: &str) -> TargetMetrics {
        TargetMetrics::new(
            "kw-thin",
            TargetKind::Keyword,
            Counters {
                impressions: 400.0,
                clicks,
                spend: clicks * 0.8,
                sales,
                orders,
            },
            dec(bid),
            14,
        )
        .unwrap()
    }

    fn estimator() -> SparseDataEstimator {
        SparseDataEstimator::new(SparseConfig::default())
    }

    #[test]
    fn worked_example_is_capped_at_twenty_percent() {
        let target = sparse_target(10.0, 2.0, 60.0, "1.00");
        let priors = GroupPriors { cvr: 0.05, aov: 30.0 };
        let est = estimator();

        let cvr = est.smoothed_cvr(10.0, 2.0, 0.05);
        assert!((cvr - 0.1864).abs() < 1e-3);
        let (cpa, basis) = est.target_cpa(&target, 30.0, &GoalConfig::default());
        assert_eq!(cpa, 9.0);
        assert_eq!(basis, CpaBasis::AovShare);

        let goal = GoalConfig::default();
        let proposal = est.estimate_sparse_bid(&target, &priors, &goal, &BidLimits::default());
        assert_eq!(proposal.suggested_bid, Some(dec("1.20")));
        assert!(proposal.facts.iter().any(|f| f.rule == RuleId::ChangeCapped));
        let theoretical = proposal.facts[0].get("theoretical_bid").unwrap();
        assert!((theoretical - 1.677).abs() < 0.01);
    }

    #[test]
    fn target_acos_needs_an_order() {
        let goal = GoalConfig {
            target_acos: Some(25.0),
            target_roas: Some(4.0),
            ..GoalConfig::default()
        };
        let est = estimator();

        let with_order = sparse_target(10.0, 1.0, 40.0, "1.00");
        assert_eq!(est.target_cpa(&with_order, 30.0, &goal), (10.0, CpaBasis::TargetAcos));

        let no_order = sparse_target(10.0, 0.0, 0.0, "1.00");
        assert_eq!(est.target_cpa(&no_order, 30.0, &goal), (7.5, CpaBasis::TargetRoas));
    }

    #[test]
    fn zero_data_drifts_down_within_cap() {
        // prior 0.05 over 1 pseudo-click: cvr 0.05/1 = 0.05, bid 0.05 * 9 = 0.45
        let target = sparse_target(0.0, 0.0, 0.0, "1.00");
        let priors = GroupPriors { cvr: 0.05, aov: 30.0 };
        let (goal, limits) = (GoalConfig::default(), BidLimits::default());
        let proposal = estimator().estimate_sparse_bid(&target, &priors, &goal, &limits);
        assert_eq!(proposal.suggested_bid, Some(dec("0.80")));
        assert!(proposal.confidence < 0.3);
    }

    #[test]
    fn group_priors_pool_siblings() {
        let config = SparseConfig::default();
        let targets = vec![
            sparse_target(100.0, 5.0, 150.0, "1.00"),
            sparse_target(100.0, 5.0, 250.0, "1.00"),
        ];
        let priors = GroupPriors::from_targets(&targets, &config);
        assert_eq!(priors.cvr, 0.05);
        assert_eq!(priors.aov, 40.0);

        let empty = GroupPriors::from_targets(&[], &config);
        assert_eq!(empty.cvr, config.default_prior_cvr);
        assert_eq!(empty.aov, config.default_aov);
    }
}
