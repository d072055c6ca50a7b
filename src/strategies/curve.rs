// src/strategies/curve.rs
use crate::config::{BidLimits, CurveConfig};
use crate::error::EngineResult;
use crate::reasons::{ReasonFact, RuleId};
use crate::strategies::metrics::DerivedMetrics;
use crate::strategies::traits::{bound_bid, multiplier, BidEstimator, EstimationContext};
use crate::types::{BidProposal, Goal, ProposalSource, TargetMetrics};
use crate::utils::precision::{bid_to_f64, ratio};
use tracing::debug;

/// The curve path needs both click and order volume; anything thinner goes
/// to the sparse estimator.
pub fn is_data_sufficient(clicks: f64, orders: f64, config: &CurveConfig) -> bool {
    clicks >= config.min_clicks && orders >= config.min_orders
}

/// One simulated bid level. Volumes are window totals, `daily_spend` is
/// spend divided by the window length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    pub bid: f64,
    pub impressions: f64,
    pub clicks: f64,
    pub conversions: f64,
    pub sales: f64,
    pub spend: f64,
    pub daily_spend: f64,
    /// Percent; infinite when the point has no sales.
    pub acos: f64,
    pub roas: f64,
    /// Forward differences to the next point; `None` on the last point.
    pub marginal_revenue: Option<f64>,
    pub marginal_cost: Option<f64>,
}

/// Synthetic market curve over `[min_bid, max_bid]` using a logarithmic
/// click elasticity around the current bid.
pub fn build_market_curve(
    metrics: &TargetMetrics,
    limits: &BidLimits,
    config: &CurveConfig,
) -> Vec<CurvePoint> {
    let derived = DerivedMetrics::from(metrics);
    let base_bid = bid_to_f64(metrics.current_bid);
    let min = bid_to_f64(limits.min_bid);
    let max = bid_to_f64(limits.max_bid);
    let step = (max - min) / (config.steps - 1) as f64;
    let days = f64::from(metrics.window_days);

    let mut points: Vec<CurvePoint> = (0..config.steps)
        .map(|i| {
            let bid = min + step * i as f64;
            let lift = 1.0 + config.elasticity * (bid / base_bid).ln();
            let clicks = (metrics.clicks * lift).max(0.0);
            let conversions = clicks * derived.cvr;
            let sales = conversions * derived.aov;
            let spend = clicks * bid * config.cpc_to_bid_ratio;
            CurvePoint {
                bid,
                impressions: ratio(clicks, derived.ctr),
                clicks,
                conversions,
                sales,
                spend,
                daily_spend: spend / days,
                acos: if sales > 0.0 { spend / sales * 100.0 } else { f64::INFINITY },
                roas: ratio(sales, spend),
                marginal_revenue: None,
                marginal_cost: None,
            }
        })
        .collect();

    for i in 0..points.len().saturating_sub(1) {
        let next = points[i + 1];
        points[i].marginal_revenue = Some(next.sales - points[i].sales);
        points[i].marginal_cost = Some(next.spend - points[i].spend);
    }
    points
}

fn qualifies(point: &CurvePoint, goal: Goal) -> bool {
    match goal {
        Goal::MaximizeSales => match (point.marginal_revenue, point.marginal_cost) {
            (Some(revenue), Some(cost)) => revenue >= cost,
            _ => false,
        },
        Goal::TargetAcos(target) => point.acos <= target,
        Goal::TargetRoas(target) => point.roas >= target,
        Goal::DailySpendLimit(limit) => point.daily_spend <= limit,
        // handled by exact minimisation
        Goal::DailyCost(_) => false,
    }
}

/// Picks the goal-optimal point. Threshold goals keep the LAST qualifying
/// point of an ascending scan, i.e. the highest bid still meeting the goal.
/// Returns `None` when nothing qualifies.
pub fn select_point(points: &[CurvePoint], goal: Goal) -> Option<&CurvePoint> {
    if let Goal::DailyCost(target) = goal {
        // later (higher) bids win ties
        return points.iter().fold(None, |best: Option<&CurvePoint>, p| match best {
            Some(b) if (b.daily_spend - target).abs() < (p.daily_spend - target).abs() => Some(b),
            _ => Some(p),
        });
    }
    points.iter().filter(|p| qualifies(p, goal)).last()
}

fn goal_fact(goal: Goal, bid: f64) -> ReasonFact {
    let (rule, target) = match goal {
        Goal::MaximizeSales => (RuleId::GoalMaximizeSales, 0.0),
        Goal::TargetAcos(t) => (RuleId::GoalTargetAcos, t),
        Goal::TargetRoas(t) => (RuleId::GoalTargetRoas, t),
        Goal::DailySpendLimit(t) => (RuleId::GoalDailySpendLimit, t),
        Goal::DailyCost(t) => (RuleId::GoalDailyCost, t),
    };
    ReasonFact::new(rule).with("target", target).with("bid", bid)
}

/// Data-rich estimator: market curve plus goal selection, capped at
/// `max_change_pct` per step.
#[derive(Debug, Clone)]
pub struct BidCurveOptimizer {
    config: CurveConfig,
}

impl BidCurveOptimizer {
    pub fn new(config: CurveConfig) -> Self {
        Self { config }
    }

    pub fn confidence(metrics: &TargetMetrics) -> f64 {
        0.5 + 0.25 * (metrics.clicks / 100.0).min(1.0) + 0.25 * (metrics.orders / 20.0).min(1.0)
    }

    pub fn optimize_bid(
        &self,
        metrics: &TargetMetrics,
        goal: Goal,
        limits: &BidLimits,
    ) -> BidProposal {
        let curve = build_market_curve(metrics, limits, &self.config);
        let mut facts = vec![ReasonFact::new(RuleId::DataSufficient)
            .with("clicks", metrics.clicks)
            .with("orders", metrics.orders)];

        let chosen = match select_point(&curve, goal) {
            Some(point) => {
                facts.push(goal_fact(goal, point.bid));
                point.bid
            }
            None => {
                let floor = curve
                    .first()
                    .map(|p| p.bid)
                    .unwrap_or_else(|| bid_to_f64(limits.min_bid));
                facts.push(ReasonFact::new(RuleId::NoQualifyingPoint).with("bid", floor));
                floor
            }
        };

        let (new_bid, bound_facts) =
            bound_bid(chosen, metrics.current_bid, self.config.max_change_pct, limits);
        facts.extend(bound_facts);
        debug!(
            target_id = %metrics.target_id,
            curve_bid = chosen,
            %new_bid,
            "bid curve selection"
        );

        BidProposal {
            source: ProposalSource::BidCurve,
            subject_id: metrics.target_id.clone(),
            suggested_multiplier: multiplier(new_bid, metrics.current_bid),
            suggested_bid: Some(new_bid),
            confidence: Self::confidence(metrics),
            facts,
        }
    }
}

impl BidEstimator for BidCurveOptimizer {
    fn name(&self) -> &'static str {
        "bid_curve"
    }

    fn estimate(&self, ctx: &EstimationContext<'_>) -> EngineResult<BidProposal> {
        let goal = ctx.goal.resolve()?;
        Ok(self.optimize_bid(ctx.metrics, goal, ctx.limits))
    }
}
