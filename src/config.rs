// src/config.rs

use crate::error::{EngineError, EngineResult};
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Bid range and currency precision shared by every bid-producing path.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BidLimits {
    pub min_bid: Decimal,
    pub max_bid: Decimal,
    pub tick: Decimal,
}

impl Default for BidLimits {
    fn default() -> Self {
        Self {
            min_bid: Decimal::new(10, 2),
            max_bid: Decimal::new(500, 2),
            tick: Decimal::new(1, 2),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CurveConfig {
    pub steps: usize,
    pub elasticity: f64,
    /// Average CPC paid as a fraction of the bid ceiling.
    pub cpc_to_bid_ratio: f64,
    pub max_change_pct: f64,
    pub min_clicks: f64,
    pub min_orders: f64,
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self {
            steps: 50,
            elasticity: 0.5,
            cpc_to_bid_ratio: 0.7,
            max_change_pct: 0.25,
            min_clicks: 15.0,
            min_orders: 3.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SparseConfig {
    /// Pseudo-click weight of the group prior.
    pub prior_strength: f64,
    pub max_change_pct: f64,
    pub fallback_cpa_aov_share: f64,
    pub default_prior_cvr: f64,
    pub default_aov: f64,
}

impl Default for SparseConfig {
    fn default() -> Self {
        Self {
            prior_strength: 1.0,
            max_change_pct: 0.20,
            fallback_cpa_aov_share: 0.3,
            default_prior_cvr: 0.05,
            default_aov: 30.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OverrideConfig {
    pub critical_days: f64,
    pub low_days: f64,
    pub critical_multiplier: f64,
    pub low_multiplier: f64,
    pub organic_rank_threshold: u32,
    pub organic_multiplier: f64,
    pub floor_bid: Decimal,
}

impl Default for OverrideConfig {
    fn default() -> Self {
        Self {
            critical_days: 3.0,
            low_days: 7.0,
            critical_multiplier: 0.5,
            low_multiplier: 0.7,
            organic_rank_threshold: 10,
            organic_multiplier: 0.7,
            floor_bid: Decimal::new(2, 2),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScoreWeights {
    pub roas: f64,
    pub acos: f64,
    pub cvr: f64,
    pub cpc: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            roas: 0.35,
            acos: 0.25,
            cvr: 0.25,
            cpc: 0.15,
        }
    }
}

/// Lower and upper clamp for each dynamic benchmark, plus the value used
/// when the account has no usable history for that metric.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BenchmarkBounds {
    pub roas: (f64, f64),
    pub acos: (f64, f64),
    pub cvr: (f64, f64),
    pub cpc: (f64, f64),
    pub fallback_roas: f64,
    pub fallback_acos: f64,
    pub fallback_cvr: f64,
    pub fallback_cpc: f64,
}

impl Default for BenchmarkBounds {
    fn default() -> Self {
        Self {
            roas: (2.0, 10.0),
            acos: (10.0, 50.0),
            cvr: (0.02, 0.30),
            cpc: (0.20, 3.00),
            fallback_roas: 4.0,
            fallback_acos: 25.0,
            fallback_cvr: 0.10,
            fallback_cpc: 1.00,
        }
    }
}

/// One row of the placement confidence table. Rows are checked top-down and
/// the first whose thresholds are all met wins.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ConfidenceTier {
    pub min_orders: f64,
    pub min_clicks: f64,
    pub min_spend: f64,
    pub confidence: f64,
    pub reliable: bool,
}

impl ConfidenceTier {
    const fn new(
        min_orders: f64,
        min_clicks: f64,
        min_spend: f64,
        confidence: f64,
        reliable: bool,
    ) -> Self {
        Self {
            min_orders,
            min_clicks,
            min_spend,
            confidence,
            reliable,
        }
    }
}

/// Relative-score band: placements scoring at least `min_relative` of the
/// best reliable peer get `delta_pct` (before confidence scaling).
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AdjustmentBand {
    pub min_relative: f64,
    pub delta_pct: f64,
}

/// Largest single-call change allowed at or above `min_confidence`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StepCap {
    pub min_confidence: f64,
    pub max_delta_pct: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PlacementConfig {
    pub window_days: u32,
    pub exclude_recent_days: u32,
    pub benchmark_window_days: u32,
    pub weights: ScoreWeights,
    pub bounds: BenchmarkBounds,
    pub tiers: Vec<ConfidenceTier>,
    pub floor_confidence: f64,
    /// Checked top-down, first match wins.
    pub bands: Vec<AdjustmentBand>,
    pub step_caps: Vec<StepCap>,
    pub fallback_step_cap_pct: f64,
    /// Large existing adjustments may move by this share of themselves.
    pub proportional_step: f64,
    pub cooldown_days: i64,
    pub min_adjustment_pct: f64,
    /// Ceiling when the platform already raises and lowers bids itself.
    pub auto_bidding_ceiling_pct: f64,
    pub default_ceiling_pct: f64,
    pub max_bid_proposal_pct: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            window_days: 14,
            exclude_recent_days: 3,
            benchmark_window_days: 30,
            weights: ScoreWeights::default(),
            bounds: BenchmarkBounds::default(),
            tiers: vec![
                ConfidenceTier::new(20.0, 200.0, 100.0, 1.0, true),
                ConfidenceTier::new(10.0, 100.0, 50.0, 0.8, true),
                ConfidenceTier::new(5.0, 50.0, 25.0, 0.6, true),
                ConfidenceTier::new(2.0, 20.0, 0.0, 0.4, false),
            ],
            floor_confidence: 0.2,
            bands: vec![
                AdjustmentBand { min_relative: 0.9, delta_pct: 30.0 },
                AdjustmentBand { min_relative: 0.7, delta_pct: 15.0 },
                AdjustmentBand { min_relative: 0.5, delta_pct: -10.0 },
                AdjustmentBand { min_relative: 0.0, delta_pct: -25.0 },
            ],
            step_caps: vec![
                StepCap { min_confidence: 0.8, max_delta_pct: 20.0 },
                StepCap { min_confidence: 0.6, max_delta_pct: 10.0 },
            ],
            fallback_step_cap_pct: 5.0,
            proportional_step: 0.25,
            cooldown_days: 7,
            min_adjustment_pct: -50.0,
            auto_bidding_ceiling_pct: 100.0,
            default_ceiling_pct: 200.0,
            max_bid_proposal_pct: 0.10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub min_confidence: f64,
    /// Proposals outside this multiplier band are treated as anomalies.
    pub multiplier_bounds: (f64, f64),
    pub max_cpc_history_multiple: f64,
    pub absolute_max_cpc: Decimal,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            multiplier_bounds: (0.1, 5.0),
            max_cpc_history_multiple: 3.0,
            absolute_max_cpc: Decimal::new(1000, 2),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RunnerConfig {
    pub target_window_days: u32,
    pub attribution_delay_days: u32,
    pub snapshot_path: String,
    pub journal_path: String,
    pub log_dir: String,
    pub max_concurrent_campaigns: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            target_window_days: 30,
            attribution_delay_days: 3,
            snapshot_path: "snapshot.json".to_string(),
            journal_path: "decisions.jsonl".to_string(),
            log_dir: "logs".to_string(),
            max_concurrent_campaigns: 8,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub bids: BidLimits,
    pub curve: CurveConfig,
    pub sparse: SparseConfig,
    pub overrides: OverrideConfig,
    pub placement: PlacementConfig,
    pub coordinator: CoordinatorConfig,
    pub runner: RunnerConfig,
}

impl EngineConfig {
    /// Layers an optional settings file and `BIDPILOT__*` environment
    /// variables over the built-in defaults.
    pub fn load(path: &str) -> EngineResult<Self> {
        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("BIDPILOT").separator("__"));

        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        let bids = &self.bids;
        if bids.min_bid <= Decimal::ZERO || bids.min_bid >= bids.max_bid {
            return Err(EngineError::Config(format!(
                "bid range [{}, {}] is empty or non-positive",
                bids.min_bid, bids.max_bid
            )));
        }
        if bids.tick <= Decimal::ZERO {
            return Err(EngineError::Config("bid tick must be positive".into()));
        }
        if self.curve.steps < 2 {
            return Err(EngineError::Config("curve needs at least 2 steps".into()));
        }
        for (name, pct) in [
            ("curve.max_change_pct", self.curve.max_change_pct),
            ("sparse.max_change_pct", self.sparse.max_change_pct),
        ] {
            if !(pct > 0.0 && pct <= 1.0) {
                return Err(EngineError::Config(format!("{name} must be in (0, 1], got {pct}")));
            }
        }
        if self.sparse.prior_strength <= 0.0 {
            return Err(EngineError::Config("sparse.prior_strength must be positive".into()));
        }

        let p = &self.placement;
        if p.window_days < p.exclude_recent_days {
            return Err(EngineError::Config(format!(
                "placement window {}d is shorter than the excluded {}d",
                p.window_days, p.exclude_recent_days
            )));
        }
        if p.cooldown_days < 0 {
            return Err(EngineError::Config("placement.cooldown_days must be >= 0".into()));
        }
        if p.bands.is_empty() {
            return Err(EngineError::Config("placement.bands must not be empty".into()));
        }
        let w = &p.weights;
        let total = w.roas + w.acos + w.cvr + w.cpc;
        if (total - 1.0).abs() > 1e-6 {
            return Err(EngineError::Config(format!("score weights sum to {total}, expected 1")));
        }

        let c = &self.coordinator;
        if !(0.0..=1.0).contains(&c.min_confidence) {
            return Err(EngineError::Config("coordinator.min_confidence must be in [0, 1]".into()));
        }
        if c.absolute_max_cpc <= Decimal::ZERO {
            return Err(EngineError::Config("coordinator.absolute_max_cpc must be positive".into()));
        }
        if self.runner.target_window_days <= self.runner.attribution_delay_days {
            return Err(EngineError::Config(
                "runner.target_window_days must exceed attribution_delay_days".into(),
            ));
        }
        if self.runner.max_concurrent_campaigns == 0 {
            return Err(EngineError::Config("runner.max_concurrent_campaigns must be >= 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.placement.tiers.len(), 4);
        assert_eq!(config.bids.min_bid, Decimal::new(10, 2));
    }

    #[test]
    fn rejects_window_shorter_than_exclusion() {
        let mut config = EngineConfig::default();
        config.placement.window_days = 2;
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn rejects_unbalanced_weights() {
        let mut config = EngineConfig::default();
        config.placement.weights.roas = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reads_toml_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Settings.toml");
        std::fs::write(
            &path,
            "[bids]\nmin_bid = 0.2\nmax_bid = 3.0\n\n[curve]\nsteps = 20\n",
        )
        .unwrap();

        let config = EngineConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.bids.min_bid, Decimal::new(2, 1));
        assert_eq!(config.curve.steps, 20);
        assert_eq!(config.sparse.max_change_pct, 0.20);
    }
}
