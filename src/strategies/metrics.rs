// src/strategies/metrics.rs
use crate::types::TargetMetrics;
use crate::utils::precision::ratio;

/// Ratios derived from raw counters. Every ratio is 0 when its denominator
/// is 0, so a target with no sales has ACoS 0 here; callers that care check
/// `sales` themselves.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerivedMetrics {
    /// Percent.
    pub acos: f64,
    pub roas: f64,
    pub ctr: f64,
    pub cvr: f64,
    pub cpc: f64,
    pub aov: f64,
}

impl DerivedMetrics {
    pub fn from_counts(impressions: f64, clicks: f64, spend: f64, sales: f64, orders: f64) -> Self {
        Self {
            acos: ratio(spend, sales) * 100.0,
            roas: ratio(sales, spend),
            ctr: ratio(clicks, impressions),
            cvr: ratio(orders, clicks),
            cpc: ratio(spend, clicks),
            aov: ratio(sales, orders),
        }
    }
}

impl From<&TargetMetrics> for DerivedMetrics {
    fn from(m: &TargetMetrics) -> Self {
        Self::from_counts(m.impressions, m.clicks, m.spend, m.sales, m.orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_ratios() {
        let d = DerivedMetrics::from_counts(1000.0, 50.0, 25.0, 100.0, 4.0);
        assert_eq!(d.acos, 25.0);
        assert_eq!(d.roas, 4.0);
        assert_eq!(d.ctr, 0.05);
        assert_eq!(d.cvr, 0.08);
        assert_eq!(d.cpc, 0.5);
        assert_eq!(d.aov, 25.0);
    }

    #[test]
    fn zero_denominators_yield_zero() {
        let d = DerivedMetrics::from_counts(0.0, 0.0, 3.0, 0.0, 0.0);
        assert_eq!(d, DerivedMetrics::default());
    }
}
