// src/types.rs
use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::reasons::ReasonFact;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Keyword,
    ProductTarget,
}

/// Rolling performance for one keyword or product target. Only constructed
/// through [`TargetMetrics::new`], so every instance has non-negative counts
/// and a positive bid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetMetrics {
    pub target_id: String,
    pub kind: TargetKind,
    pub impressions: f64,
    pub clicks: f64,
    pub spend: f64,
    pub sales: f64,
    pub orders: f64,
    pub current_bid: Decimal,
    pub window_days: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Counters {
    pub impressions: f64,
    pub clicks: f64,
    pub spend: f64,
    pub sales: f64,
    pub orders: f64,
}

impl Counters {
    fn validate(&self) -> EngineResult<()> {
        for (field, value) in [
            ("impressions", self.impressions),
            ("clicks", self.clicks),
            ("spend", self.spend),
            ("sales", self.sales),
            ("orders", self.orders),
        ] {
            if !value.is_finite() || value < 0.0 {
                let message = format!("must be a non-negative number, got {value}");
                return Err(EngineError::validation(field, message));
            }
        }
        Ok(())
    }
}

impl TargetMetrics {
    pub fn new(
        target_id: impl Into<String>,
        kind: TargetKind,
        counters: Counters,
        current_bid: Decimal,
        window_days: u32,
    ) -> EngineResult<Self> {
        counters.validate()?;
        if current_bid <= Decimal::ZERO {
            let message = format!("must be positive, got {current_bid}");
            return Err(EngineError::validation("current_bid", message));
        }
        if window_days == 0 {
            return Err(EngineError::validation("window_days", "must be at least 1"));
        }
        Ok(Self {
            target_id: target_id.into(),
            kind,
            impressions: counters.impressions,
            clicks: counters.clicks,
            spend: counters.spend,
            sales: counters.sales,
            orders: counters.orders,
            current_bid,
            window_days,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryLevel {
    Normal,
    Low,
    Critical,
    OutOfStock,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessSignals {
    pub inventory_level: Option<InventoryLevel>,
    pub inventory_days: Option<f64>,
    pub organic_rank: Option<u32>,
}

impl BusinessSignals {
    pub fn validate(&self) -> EngineResult<()> {
        match self.inventory_days {
            Some(days) if !days.is_finite() || days < 0.0 => Err(EngineError::validation(
                "inventory_days",
                format!("must be >= 0, got {days}"),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementType {
    TopOfSearch,
    RestOfSearch,
    ProductPage,
}

impl fmt::Display for PlacementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TopOfSearch => "top_of_search",
            Self::RestOfSearch => "rest_of_search",
            Self::ProductPage => "product_page",
        };
        f.write_str(name)
    }
}

/// Metrics for one placement slot over `window_days`, with the most recent
/// `exclude_recent_days` left out for attribution delay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacementMetrics {
    pub campaign_id: String,
    pub placement: PlacementType,
    pub impressions: f64,
    pub clicks: f64,
    pub spend: f64,
    pub sales: f64,
    pub orders: f64,
    pub window_days: u32,
    pub exclude_recent_days: u32,
}

impl PlacementMetrics {
    pub fn new(
        campaign_id: impl Into<String>,
        placement: PlacementType,
        counters: Counters,
        window_days: u32,
        exclude_recent_days: u32,
    ) -> EngineResult<Self> {
        counters.validate()?;
        if window_days < exclude_recent_days {
            return Err(EngineError::validation(
                "window_days",
                format!("{window_days}d window cannot exclude {exclude_recent_days} recent days"),
            ));
        }
        Ok(Self {
            campaign_id: campaign_id.into(),
            placement,
            impressions: counters.impressions,
            clicks: counters.clicks,
            spend: counters.spend,
            sales: counters.sales,
            orders: counters.orders,
            window_days,
            exclude_recent_days,
        })
    }
}

/// Trailing account-level totals used to derive dynamic benchmarks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountTotals {
    pub clicks: f64,
    pub spend: f64,
    pub sales: f64,
    pub orders: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiddingStrategyMode {
    #[default]
    Fixed,
    DownOnly,
    UpAndDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalKind {
    #[default]
    MaximizeSales,
    TargetAcos,
    TargetRoas,
    DailySpendLimit,
    DailyCost,
}

/// Goal as configured by the account owner. Parameters for goals other than
/// the active one are still read by the sparse path (target ACoS / ROAS).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalConfig {
    #[serde(default)]
    pub kind: GoalKind,
    pub target_acos: Option<f64>,
    pub target_roas: Option<f64>,
    pub daily_spend_limit: Option<f64>,
    pub daily_cost_target: Option<f64>,
}

/// A goal with its required parameter present.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Goal {
    MaximizeSales,
    /// Percent, e.g. 30.0.
    TargetAcos(f64),
    TargetRoas(f64),
    DailySpendLimit(f64),
    DailyCost(f64),
}

impl GoalConfig {
    pub fn resolve(&self) -> EngineResult<Goal> {
        fn required(value: Option<f64>, name: &str) -> EngineResult<f64> {
            match value {
                Some(v) if v.is_finite() && v > 0.0 => Ok(v),
                Some(v) => Err(EngineError::Config(format!("{name} must be positive, got {v}"))),
                None => Err(EngineError::Config(format!("goal requires {name}"))),
            }
        }

        Ok(match self.kind {
            GoalKind::MaximizeSales => Goal::MaximizeSales,
            GoalKind::TargetAcos => Goal::TargetAcos(required(self.target_acos, "target_acos")?),
            GoalKind::TargetRoas => Goal::TargetRoas(required(self.target_roas, "target_roas")?),
            GoalKind::DailySpendLimit => {
                Goal::DailySpendLimit(required(self.daily_spend_limit, "daily_spend_limit")?)
            }
            GoalKind::DailyCost => {
                Goal::DailyCost(required(self.daily_cost_target, "daily_cost_target")?)
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalSource {
    BidCurve,
    SparseData,
    Placement,
    TimeOfDay,
}

/// One signal source's suggested change to a base bid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BidProposal {
    pub source: ProposalSource,
    pub subject_id: String,
    pub suggested_multiplier: f64,
    pub suggested_bid: Option<Decimal>,
    pub confidence: f64,
    pub facts: Vec<ReasonFact>,
}

impl BidProposal {
    /// External proposals (time-of-day schedules and the like) arrive as a
    /// bare multiplier.
    pub fn external(
        source: ProposalSource,
        subject_id: impl Into<String>,
        multiplier: f64,
        confidence: f64,
    ) -> Self {
        Self {
            source,
            subject_id: subject_id.into(),
            suggested_multiplier: multiplier,
            suggested_bid: None,
            confidence,
            facts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Increase,
    Decrease,
    Set,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BidDecision {
    pub target_id: String,
    pub target_type: TargetKind,
    pub previous_bid: Decimal,
    pub new_bid: Decimal,
    pub action_type: ActionType,
    /// Percent, e.g. 20.0 for +20%.
    pub change_percent: f64,
    pub reason: String,
    pub facts: Vec<ReasonFact>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacementAdjustmentDecision {
    pub campaign_id: String,
    pub placement_type: PlacementType,
    pub previous_percent: f64,
    pub new_percent: f64,
    pub reason: String,
    pub confidence: f64,
    pub blocked_by_cooldown: bool,
    pub facts: Vec<ReasonFact>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinationResult {
    pub campaign_id: String,
    pub original_base_bid: Decimal,
    pub final_base_bid: Decimal,
    /// Candidate bid before the circuit breaker ran; kept when rejected.
    pub candidate_base_bid: Decimal,
    pub theoretical_max_cpc: Decimal,
    pub effective_multiplier: f64,
    pub circuit_breaker_triggered: bool,
    pub warnings: Vec<String>,
    pub reason: String,
    pub facts: Vec<ReasonFact>,
}

/// Tagged per-item result of a batch evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome<T> {
    Applied { id: String, decision: T },
    Skipped { id: String, reason: String },
    Error { id: String, kind: ErrorKind, message: String },
}

impl<T> ItemOutcome<T> {
    pub fn error(id: impl Into<String>, err: &EngineError) -> Self {
        Self::Error {
            id: id.into(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Applied { id, .. } | Self::Skipped { id, .. } | Self::Error { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub applied: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Skip and error messages keyed by item id.
    pub reasons: BTreeMap<String, String>,
}

impl BatchSummary {
    pub fn record<T>(&mut self, outcome: &ItemOutcome<T>) {
        match outcome {
            ItemOutcome::Applied { .. } => self.applied += 1,
            ItemOutcome::Skipped { id, reason } => {
                self.skipped += 1;
                self.reasons.insert(id.clone(), reason.clone());
            }
            ItemOutcome::Error { id, message, .. } => {
                self.errors += 1;
                self.reasons.insert(id.clone(), message.clone());
            }
        }
    }

    pub fn merge(&mut self, other: BatchSummary) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.errors += other.errors;
        self.reasons.extend(other.reasons);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport<T> {
    pub outcomes: Vec<ItemOutcome<T>>,
    pub summary: BatchSummary,
}

impl<T> FromIterator<ItemOutcome<T>> for BatchReport<T> {
    fn from_iter<I: IntoIterator<Item = ItemOutcome<T>>>(iter: I) -> Self {
        let mut summary = BatchSummary::default();
        let outcomes = iter
            .into_iter()
            .inspect(|o| summary.record(o))
            .collect();
        Self { outcomes, summary }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(clicks: f64, orders: f64) -> Counters {
        Counters {
            impressions: 1000.0,
            clicks,
            spend: 10.0,
            sales: 50.0,
            orders,
        }
    }

    #[test]
    fn target_metrics_rejects_negative_fields() {
        let negative = counters(-1.0, 0.0);
        let err = TargetMetrics::new("kw-1", TargetKind::Keyword, negative, Decimal::ONE, 14)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn target_metrics_rejects_zero_bid() {
        let valid = counters(5.0, 1.0);
        let err = TargetMetrics::new("kw-1", TargetKind::Keyword, valid, Decimal::ZERO, 14)
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { field: "current_bid", .. }));
    }

    #[test]
    fn goal_without_parameter_is_config_error() {
        let goal = GoalConfig {
            kind: GoalKind::TargetAcos,
            ..GoalConfig::default()
        };
        assert!(matches!(goal.resolve(), Err(EngineError::Config(_))));
    }

    #[test]
    fn batch_report_counts_outcomes() {
        let report: BatchReport<u32> = vec![
            ItemOutcome::Applied { id: "a".into(), decision: 1 },
            ItemOutcome::Skipped { id: "b".into(), reason: "no change".into() },
            ItemOutcome::error("c", &EngineError::Config("missing".into())),
        ]
        .into_iter()
        .collect();

        assert_eq!(report.summary.applied, 1);
        assert_eq!(report.summary.skipped, 1);
        assert_eq!(report.summary.errors, 1);
        assert_eq!(report.summary.reasons["b"], "no change");
    }
}
