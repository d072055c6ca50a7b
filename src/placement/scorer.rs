// src/placement/scorer.rs
use crate::config::{BenchmarkBounds, ConfidenceTier, PlacementConfig};
use crate::strategies::metrics::DerivedMetrics;
use crate::types::{AccountTotals, PlacementMetrics, PlacementType};
use crate::utils::precision::ratio;
use serde::Serialize;

/// Account baselines a placement is scored against. ACoS is a percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Benchmarks {
    pub roas: f64,
    pub acos: f64,
    pub cvr: f64,
    pub cpc: f64,
}

impl Benchmarks {
    /// Derives baselines from the trailing account totals, clamping each into
    /// its configured band. Metrics the account cannot support (no sales, no
    /// clicks) use the configured fallback.
    pub fn from_account(totals: &AccountTotals, bounds: &BenchmarkBounds) -> Self {
        let clamp = |value: f64, (lo, hi): (f64, f64)| value.clamp(lo, hi);
        let has_sales = totals.sales > 0.0 && totals.spend > 0.0;
        let has_clicks = totals.clicks > 0.0;

        Self {
            roas: if has_sales {
                clamp(totals.sales / totals.spend, bounds.roas)
            } else {
                bounds.fallback_roas
            },
            acos: if has_sales {
                clamp(totals.spend / totals.sales * 100.0, bounds.acos)
            } else {
                bounds.fallback_acos
            },
            cvr: if has_clicks && totals.orders > 0.0 {
                clamp(totals.orders / totals.clicks, bounds.cvr)
            } else {
                bounds.fallback_cvr
            },
            cpc: if has_clicks && totals.spend > 0.0 {
                clamp(totals.spend / totals.clicks, bounds.cpc)
            } else {
                bounds.fallback_cpc
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacementScore {
    pub placement: PlacementType,
    /// 0..=100.
    pub raw_score: f64,
    pub confidence: f64,
    pub is_reliable: bool,
}

/// Scores one placement slot's ROI efficiency against dynamic benchmarks.
#[derive(Debug, Clone)]
pub struct PlacementEfficiencyScorer {
    config: PlacementConfig,
}

impl PlacementEfficiencyScorer {
    pub fn new(config: PlacementConfig) -> Self {
        Self { config }
    }

    /// First tier whose order, click and spend thresholds are all met.
    pub fn confidence(&self, orders: f64, clicks: f64, spend: f64) -> (f64, bool) {
        self.config
            .tiers
            .iter()
            .find(|t: &&ConfidenceTier| {
                orders >= t.min_orders && clicks >= t.min_clicks && spend >= t.min_spend
            })
            .map(|t| (t.confidence, t.reliable))
            .unwrap_or((self.config.floor_confidence, false))
    }

    pub fn score(&self, metrics: &PlacementMetrics, benchmarks: &Benchmarks) -> PlacementScore {
        let d = DerivedMetrics::from_counts(
            metrics.impressions,
            metrics.clicks,
            metrics.spend,
            metrics.sales,
            metrics.orders,
        );
        let unit = |v: f64| v.clamp(0.0, 1.0);

        // hitting the benchmark scores 0.5 on each axis
        let roas = unit(ratio(d.roas, 2.0 * benchmarks.roas));
        let acos = if metrics.sales > 0.0 {
            unit(1.0 - ratio(d.acos, 2.0 * benchmarks.acos))
        } else {
            0.0
        };
        let cvr = unit(ratio(d.cvr, 2.0 * benchmarks.cvr));
        let cpc = if metrics.clicks > 0.0 {
            unit(1.0 - ratio(d.cpc, 2.0 * benchmarks.cpc))
        } else {
            0.0
        };

        let w = &self.config.weights;
        let raw_score = 100.0 * (w.roas * roas + w.acos * acos + w.cvr * cvr + w.cpc * cpc);
        let (confidence, is_reliable) =
            self.confidence(metrics.orders, metrics.clicks, metrics.spend);

        PlacementScore {
            placement: metrics.placement,
            raw_score: raw_score.clamp(0.0, 100.0),
            confidence,
            is_reliable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Counters;

    fn scorer() -> PlacementEfficiencyScorer {
        PlacementEfficiencyScorer::new(PlacementConfig::default())
    }

    fn placement(clicks: f64, orders: f64, spend: f64, sales: f64) -> PlacementMetrics {
        PlacementMetrics::new(
            "camp-1",
            PlacementType::TopOfSearch,
            Counters {
                impressions: clicks * 40.0,
                clicks,
                spend,
                sales,
                orders,
            },
            14,
            3,
        )
        .unwrap()
    }

    #[test]
    fn confidence_table() {
        let s = scorer();
        assert_eq!(s.confidence(25.0, 250.0, 150.0), (1.0, true));
        assert_eq!(s.confidence(12.0, 120.0, 60.0), (0.8, true));
        assert_eq!(s.confidence(5.0, 50.0, 25.0), (0.6, true));
        assert_eq!(s.confidence(3.0, 30.0, 10.0), (0.4, false));
        assert_eq!(s.confidence(1.0, 10.0, 5.0), (0.2, false));
    }

    #[test]
    fn clicks_alone_do_not_buy_confidence() {
        assert_eq!(scorer().confidence(1.0, 5000.0, 900.0), (0.2, false));
    }

    #[test]
    fn benchmark_placement_scores_fifty() {
        let bench = Benchmarks {
            roas: 4.0,
            acos: 25.0,
            cvr: 0.1,
            cpc: 1.0,
        };
        // ROAS 4, ACoS 25%, CVR 10%, CPC 1.00
        let score = scorer().score(&placement(100.0, 10.0, 100.0, 400.0), &bench);
        assert!((score.raw_score - 50.0).abs() < 1e-9);
        assert!(score.is_reliable);
    }

    #[test]
    fn no_sales_scores_low() {
        let bench =
            Benchmarks::from_account(&AccountTotals::default(), &BenchmarkBounds::default());
        let score = scorer().score(&placement(100.0, 0.0, 100.0, 0.0), &bench);
        // only the CPC axis contributes
        assert!((score.raw_score - 7.5).abs() < 1e-9);
    }

    #[test]
    fn benchmarks_are_clamped() {
        let bounds = BenchmarkBounds::default();
        let totals = AccountTotals {
            clicks: 1000.0,
            spend: 10.0,
            sales: 1000.0,
            orders: 900.0,
        };
        let b = Benchmarks::from_account(&totals, &bounds);
        assert_eq!(b.roas, 10.0);
        assert_eq!(b.acos, 10.0);
        assert_eq!(b.cvr, 0.30);
        assert_eq!(b.cpc, 0.20);
    }
}
