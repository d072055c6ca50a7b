// src/core/engine.rs
use crate::config::EngineConfig;
use crate::core::cooldown::{CooldownKey, CooldownLedger};
use crate::core::coordinator::{coordinate, CoordinationInput};
use crate::error::{EngineError, EngineResult};
use crate::placement::planner::PlacementAdjustmentPlanner;
use crate::placement::scorer::{Benchmarks, PlacementEfficiencyScorer};
use crate::reasons::{PlainTextRenderer, ReasonRenderer};
use crate::strategies::curve::{is_data_sufficient, BidCurveOptimizer};
use crate::strategies::overrides::{apply_overrides, OverrideOutcome};
use crate::strategies::sparse::{GroupPriors, SparseDataEstimator};
use crate::strategies::traits::{multiplier, BidEstimator, EstimationContext};
use crate::types::{
    AccountTotals, ActionType, BatchReport, BatchSummary, BidDecision, BidProposal,
    BiddingStrategyMode, BusinessSignals, CoordinationResult, GoalConfig, ItemOutcome,
    PlacementAdjustmentDecision, PlacementMetrics, PlacementType, TargetMetrics,
};
use crate::utils::precision::bid_to_f64;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct TargetInput {
    pub metrics: TargetMetrics,
    pub signals: Option<BusinessSignals>,
}

/// A row that failed boundary validation; reported as skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedItem {
    pub id: String,
    pub error: EngineError,
}

/// Everything one campaign's evaluation reads, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignSnapshot {
    pub campaign_id: String,
    pub goal: GoalConfig,
    pub bidding_strategy: BiddingStrategyMode,
    pub base_bid: Decimal,
    /// Current placement adjustments in percent.
    pub placement_adjustments: BTreeMap<PlacementType, f64>,
    pub dayparting_multiplier: f64,
    pub historical_avg_cpc: Option<Decimal>,
    pub account_totals: AccountTotals,
    pub targets: Vec<TargetInput>,
    pub placements: Vec<PlacementMetrics>,
    /// Time-of-day and other externally computed proposals.
    pub external_proposals: Vec<BidProposal>,
    pub rejected: Vec<RejectedItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetEvaluation {
    /// `None` when the bid does not move.
    pub decision: Option<BidDecision>,
    /// Post-override proposal for the coordinator; `None` when paused.
    pub proposal: Option<BidProposal>,
    pub overrides: Option<OverrideOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignEvaluation {
    pub campaign_id: String,
    pub evaluated_at: DateTime<Utc>,
    pub bids: BatchReport<BidDecision>,
    pub placements: BatchReport<PlacementAdjustmentDecision>,
    /// Every placement decision, including blocked and unchanged ones.
    pub placement_decisions: Vec<PlacementAdjustmentDecision>,
    pub coordination: CoordinationResult,
    pub summary: BatchSummary,
}

impl CampaignEvaluation {
    /// Cooldown slots this evaluation reserved: one per placement that
    /// actually changes. Commit them once the evaluation is stored.
    pub fn cooldown_reservations(&self) -> Vec<CooldownKey> {
        self.placement_decisions
            .iter()
            .filter(|d| !d.blocked_by_cooldown && d.new_percent != d.previous_percent)
            .map(|d| CooldownKey::placement(&self.campaign_id, d.placement_type))
            .collect()
    }
}

pub struct DecisionEngine {
    config: EngineConfig,
    curve: BidCurveOptimizer,
    sparse: SparseDataEstimator,
    scorer: PlacementEfficiencyScorer,
    planner: PlacementAdjustmentPlanner,
    renderer: Box<dyn ReasonRenderer>,
}

impl DecisionEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_renderer(config, Box::new(PlainTextRenderer))
    }

    pub fn with_renderer(config: EngineConfig, renderer: Box<dyn ReasonRenderer>) -> Self {
        Self {
            curve: BidCurveOptimizer::new(config.curve.clone()),
            sparse: SparseDataEstimator::new(config.sparse.clone()),
            scorer: PlacementEfficiencyScorer::new(config.placement.clone()),
            planner: PlacementAdjustmentPlanner::new(config.placement.clone()),
            renderer,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn estimator_for(&self, metrics: &TargetMetrics) -> &dyn BidEstimator {
        if is_data_sufficient(metrics.clicks, metrics.orders, &self.config.curve) {
            &self.curve
        } else {
            &self.sparse
        }
    }

    /// Estimator, then overrides, for one target. Pure: identical inputs give
    /// identical results.
    pub fn evaluate_target(
        &self,
        input: &TargetInput,
        goal: &GoalConfig,
        priors: &GroupPriors,
    ) -> EngineResult<TargetEvaluation> {
        let metrics = &input.metrics;
        // resolve up front so a bad goal fails both paths the same way
        goal.resolve()?;
        if let Some(signals) = &input.signals {
            signals.validate()?;
        }

        let estimator = self.estimator_for(metrics);
        let ctx = EstimationContext {
            metrics,
            goal,
            priors,
            limits: &self.config.bids,
        };
        let mut proposal = estimator.estimate(&ctx)?;
        let estimated = proposal.suggested_bid.unwrap_or(metrics.current_bid);
        debug!(
            target_id = %metrics.target_id,
            estimator = estimator.name(),
            %estimated,
            "target estimated"
        );

        let overrides = input
            .signals
            .as_ref()
            .map(|s| apply_overrides(estimated, s, &self.config.overrides, self.config.bids.tick));
        let (new_bid, paused) = match &overrides {
            Some(o) if !o.actions.is_empty() => {
                proposal.facts.extend(o.facts.iter().cloned());
                (o.final_bid, o.paused())
            }
            _ => (estimated, false),
        };

        let previous = metrics.current_bid;
        proposal.suggested_bid = Some(new_bid);
        proposal.suggested_multiplier = multiplier(new_bid, previous);

        let decision = (new_bid != previous).then(|| {
            let action_type = if paused {
                ActionType::Set
            } else if new_bid > previous {
                ActionType::Increase
            } else {
                ActionType::Decrease
            };
            BidDecision {
                target_id: metrics.target_id.clone(),
                target_type: metrics.kind,
                previous_bid: previous,
                new_bid,
                action_type,
                change_percent: (bid_to_f64(new_bid) / bid_to_f64(previous) - 1.0) * 100.0,
                reason: self.renderer.render(&proposal.facts),
                facts: proposal.facts.clone(),
            }
        });

        Ok(TargetEvaluation {
            decision,
            proposal: (!paused).then_some(proposal),
            overrides,
        })
    }

    /// Evaluates every target of a campaign. One target's failure never
    /// stops its siblings.
    pub fn evaluate_targets(
        &self,
        snapshot: &CampaignSnapshot,
    ) -> (BatchReport<BidDecision>, Vec<BidProposal>) {
        let valid: Vec<TargetMetrics> =
            snapshot.targets.iter().map(|t| t.metrics.clone()).collect();
        let priors = GroupPriors::from_targets(&valid, &self.config.sparse);
        let mut proposals = Vec::new();

        let rejected = snapshot.rejected.iter().map(|r| ItemOutcome::Skipped {
            id: r.id.clone(),
            reason: r.error.to_string(),
        });

        let evaluated: Vec<ItemOutcome<BidDecision>> = snapshot
            .targets
            .iter()
            .map(|input| {
                let id = input.metrics.target_id.clone();
                match self.evaluate_target(input, &snapshot.goal, &priors) {
                    Ok(eval) => {
                        proposals.extend(eval.proposal);
                        match eval.decision {
                            Some(decision) => ItemOutcome::Applied { id, decision },
                            None => ItemOutcome::Skipped {
                                id,
                                reason: "no change".into(),
                            },
                        }
                    }
                    Err(e @ EngineError::Validation { .. }) => ItemOutcome::Skipped {
                        id,
                        reason: e.to_string(),
                    },
                    Err(e) => {
                        warn!(
                            campaign_id = %snapshot.campaign_id,
                            target_id = %id,
                            error = %e,
                            "target evaluation failed"
                        );
                        ItemOutcome::error(id, &e)
                    }
                }
            })
            .collect();

        (rejected.chain(evaluated).collect(), proposals)
    }

    pub fn benchmarks(&self, totals: &AccountTotals) -> Benchmarks {
        Benchmarks::from_account(totals, &self.config.placement.bounds)
    }

    /// Scores and plans every placement. A ledger failure fails the whole
    /// placement stage of this campaign, nothing else, and leaves no
    /// reservation behind.
    pub fn evaluate_placements(
        &self,
        snapshot: &CampaignSnapshot,
        ledger: &dyn CooldownLedger,
        now: DateTime<Utc>,
    ) -> EngineResult<(Vec<PlacementAdjustmentDecision>, Option<BidProposal>)> {
        let benchmarks = self.benchmarks(&snapshot.account_totals);
        let scores: Vec<_> = snapshot
            .placements
            .iter()
            .map(|m| self.scorer.score(m, &benchmarks))
            .collect();

        let suggestions = self.planner.plan(
            &snapshot.campaign_id,
            &scores,
            &snapshot.placement_adjustments,
            snapshot.bidding_strategy,
            ledger,
            now,
        )?;
        let decisions = suggestions
            .into_iter()
            .map(|s| s.into_decision(&snapshot.campaign_id, self.renderer.as_ref()))
            .collect();
        Ok((decisions, self.planner.bid_proposal(&snapshot.campaign_id, &scores)))
    }

    /// Worst-case placement uplift: the largest of the current and newly
    /// planned percentages, as a fraction.
    fn worst_case_placement(
        snapshot: &CampaignSnapshot,
        decisions: &[PlacementAdjustmentDecision],
    ) -> f64 {
        let planned = decisions.iter().map(|d| d.new_percent.max(d.previous_percent));
        let current = snapshot.placement_adjustments.values().copied();
        planned.chain(current).fold(0.0_f64, f64::max) / 100.0
    }

    pub fn coordinate(
        &self,
        snapshot: &CampaignSnapshot,
        proposals: &[BidProposal],
        placement_uplift: f64,
    ) -> CoordinationResult {
        let input = CoordinationInput {
            campaign_id: snapshot.campaign_id.clone(),
            current_base_bid: snapshot.base_bid,
            current_placement_multiplier: placement_uplift,
            current_dayparting_multiplier: snapshot.dayparting_multiplier,
            historical_avg_cpc: snapshot.historical_avg_cpc,
        };
        coordinate(
            &input,
            proposals,
            &self.config.bids,
            &self.config.coordinator,
            self.renderer.as_ref(),
        )
    }

    /// Full pipeline for one campaign: targets, placements, then the
    /// coordinator over every proposal they produced plus external ones.
    /// Placement changes come back holding cooldown reservations, see
    /// [`CampaignEvaluation::cooldown_reservations`].
    pub fn evaluate_campaign(
        &self,
        snapshot: &CampaignSnapshot,
        ledger: &dyn CooldownLedger,
        now: DateTime<Utc>,
    ) -> CampaignEvaluation {
        let (bids, mut proposals) = self.evaluate_targets(snapshot);

        let planned = self.evaluate_placements(snapshot, ledger, now);
        let (placements, placement_decisions) = match planned {
            Ok((decisions, proposal)) => {
                proposals.extend(proposal);
                let report: BatchReport<PlacementAdjustmentDecision> = decisions
                    .iter()
                    .map(|d| {
                        let id = format!("{}/{}", d.campaign_id, d.placement_type);
                        if d.new_percent != d.previous_percent {
                            ItemOutcome::Applied { id, decision: d.clone() }
                        } else {
                            ItemOutcome::Skipped { id, reason: d.reason.clone() }
                        }
                    })
                    .collect();
                (report, decisions)
            }
            Err(e) => {
                warn!(campaign_id = %snapshot.campaign_id, error = %e, "placement stage failed");
                let id = format!("{}/placements", snapshot.campaign_id);
                (std::iter::once(ItemOutcome::error(id, &e)).collect(), Vec::new())
            }
        };

        proposals.extend(snapshot.external_proposals.iter().cloned());
        let uplift = Self::worst_case_placement(snapshot, &placement_decisions);
        let coordination = self.coordinate(snapshot, &proposals, uplift);

        let mut summary = BatchSummary::default();
        summary.merge(bids.summary.clone());
        summary.merge(placements.summary.clone());
        let base_id = format!("{}/base_bid", snapshot.campaign_id);
        if coordination.final_base_bid != coordination.original_base_bid {
            summary.applied += 1;
        } else {
            summary.skipped += 1;
            summary.reasons.insert(base_id, coordination.reason.clone());
        }

        info!(
            campaign_id = %snapshot.campaign_id,
            applied = summary.applied,
            skipped = summary.skipped,
            errors = summary.errors,
            breaker = coordination.circuit_breaker_triggered,
            "campaign evaluated"
        );

        CampaignEvaluation {
            campaign_id: snapshot.campaign_id.clone(),
            evaluated_at: now,
            bids,
            placements,
            placement_decisions,
            coordination,
            summary,
        }
    }

    /// Sequential batch over many campaigns. Callers wanting parallelism run
    /// `evaluate_campaign` from their own pool; campaigns share nothing but
    /// the ledger.
    pub fn evaluate_batch(
        &self,
        snapshots: &[CampaignSnapshot],
        ledger: &dyn CooldownLedger,
        now: DateTime<Utc>,
    ) -> (Vec<CampaignEvaluation>, BatchSummary) {
        let mut summary = BatchSummary::default();
        let evaluations = snapshots
            .iter()
            .map(|s| {
                let evaluation = self.evaluate_campaign(s, ledger, now);
                summary.merge(evaluation.summary.clone());
                evaluation
            })
            .collect();
        (evaluations, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cooldown::InMemoryCooldownLedger;
    use crate::error::ErrorKind;
    use crate::types::{Counters, GoalKind, InventoryLevel, TargetKind};
    use chrono::TimeZone;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn target(id: &str, clicks: f64, orders: f64, sales: f64, bid: &str) -> TargetInput {
        TargetInput {
            metrics: TargetMetrics::new(
                id,
                TargetKind::Keyword,
                Counters {
                    impressions: clicks * 50.0,
                    clicks,
                    spend: clicks * 0.7,
                    sales,
                    orders,
                },
                dec(bid),
                14,
            )
            .unwrap(),
            signals: None,
        }
    }

    fn snapshot(targets: Vec<TargetInput>) -> CampaignSnapshot {
        CampaignSnapshot {
            campaign_id: "camp-1".into(),
            goal: GoalConfig::default(),
            bidding_strategy: BiddingStrategyMode::Fixed,
            base_bid: dec("1.00"),
            placement_adjustments: BTreeMap::new(),
            dayparting_multiplier: 1.0,
            historical_avg_cpc: None,
            account_totals: AccountTotals::default(),
            targets,
            placements: Vec::new(),
            external_proposals: Vec::new(),
            rejected: Vec::new(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 6, 0, 0).unwrap()
    }

    #[test]
    fn rich_target_uses_curve_and_sparse_uses_fallback() {
        let engine = DecisionEngine::new(EngineConfig::default());
        let priors = GroupPriors { cvr: 0.05, aov: 30.0 };
        let goal = GoalConfig::default();

        let rich_input = target("kw-1", 100.0, 10.0, 500.0, "1.00");
        let rich = engine.evaluate_target(&rich_input, &goal, &priors).unwrap();
        assert_eq!(rich.proposal.unwrap().source, crate::types::ProposalSource::BidCurve);

        let thin_input = target("kw-2", 10.0, 2.0, 60.0, "1.00");
        let thin = engine.evaluate_target(&thin_input, &goal, &priors).unwrap();
        let decision = thin.decision.unwrap();
        assert_eq!(decision.new_bid, dec("1.20"));
        assert_eq!(decision.action_type, ActionType::Increase);
        assert!((decision.change_percent - 20.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_stock_target_is_set_to_zero_and_leaves_coordination() {
        let engine = DecisionEngine::new(EngineConfig::default());
        let mut input = target("kw-3", 100.0, 10.0, 500.0, "1.00");
        input.signals = Some(BusinessSignals {
            inventory_level: Some(InventoryLevel::OutOfStock),
            ..BusinessSignals::default()
        });
        let eval = engine
            .evaluate_target(&input, &GoalConfig::default(), &GroupPriors { cvr: 0.05, aov: 30.0 })
            .unwrap();
        let decision = eval.decision.unwrap();
        assert_eq!(decision.new_bid, Decimal::ZERO);
        assert_eq!(decision.action_type, ActionType::Set);
        assert!(eval.proposal.is_none());
    }

    #[test]
    fn batch_isolates_failures() {
        let engine = DecisionEngine::new(EngineConfig::default());
        let mut snap = snapshot(vec![target("kw-1", 10.0, 2.0, 60.0, "1.00")]);
        snap.rejected.push(RejectedItem {
            id: "kw-bad".into(),
            error: EngineError::validation("clicks", "missing"),
        });
        let mut bad_signals = target("kw-2", 10.0, 2.0, 60.0, "1.00");
        bad_signals.signals = Some(BusinessSignals {
            inventory_days: Some(-1.0),
            ..BusinessSignals::default()
        });
        snap.targets.push(bad_signals);

        let (report, proposals) = engine.evaluate_targets(&snap);
        assert_eq!(report.summary.applied, 1);
        assert_eq!(report.summary.skipped, 2);
        assert_eq!(proposals.len(), 1);
    }

    #[test]
    fn missing_goal_parameter_is_per_target_error() {
        let engine = DecisionEngine::new(EngineConfig::default());
        let mut snap = snapshot(vec![target("kw-1", 100.0, 10.0, 500.0, "1.00")]);
        snap.goal.kind = GoalKind::TargetAcos;

        let evaluation = engine.evaluate_campaign(&snap, &InMemoryCooldownLedger::new(), now());
        assert_eq!(evaluation.bids.summary.errors, 1);
        match &evaluation.bids.outcomes[0] {
            ItemOutcome::Error { kind, .. } => assert_eq!(*kind, ErrorKind::Config),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(evaluation.coordination.final_base_bid, dec("1.00"));
    }

    #[test]
    fn campaign_evaluation_is_repeatable() {
        let engine = DecisionEngine::new(EngineConfig::default());
        let snap = snapshot(vec![
            target("kw-1", 100.0, 10.0, 500.0, "1.00"),
            target("kw-2", 10.0, 2.0, 60.0, "1.00"),
        ]);
        let ledger = InMemoryCooldownLedger::new();
        let first = engine.evaluate_campaign(&snap, &ledger, now());
        let second = engine.evaluate_campaign(&snap, &ledger, now());
        assert_eq!(first, second);
        assert!(first.coordination.final_base_bid > dec("1.00"));
    }

    #[test]
    fn worst_case_placement_uses_larger_of_current_and_planned() {
        let mut snap = snapshot(Vec::new());
        snap.placement_adjustments.insert(PlacementType::TopOfSearch, 50.0);
        let decisions = vec![PlacementAdjustmentDecision {
            campaign_id: "camp-1".into(),
            placement_type: PlacementType::ProductPage,
            previous_percent: 60.0,
            new_percent: 80.0,
            reason: String::new(),
            confidence: 1.0,
            blocked_by_cooldown: false,
            facts: Vec::new(),
        }];
        assert_eq!(DecisionEngine::worst_case_placement(&snap, &decisions), 0.8);
    }
}
