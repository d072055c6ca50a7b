// src/connectors/messages.rs
//! Loosely typed rows as collaborators hand them over. Every field is
//! optional on the wire; conversion into the engine's types rejects missing
//! or invalid values instead of defaulting them.

use crate::error::{EngineError, EngineResult};
use crate::types::{
    AccountTotals, BiddingStrategyMode, BidProposal, BusinessSignals, Counters, GoalConfig,
    PlacementMetrics, PlacementType, ProposalSource, TargetKind, TargetMetrics,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

fn required(value: Option<f64>, field: &'static str) -> EngineResult<f64> {
    value.ok_or_else(|| EngineError::validation(field, "missing"))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetRow {
    pub target_id: String,
    #[serde(rename = "type")]
    pub target_type: Option<TargetKind>,
    pub impressions: Option<f64>,
    pub clicks: Option<f64>,
    pub spend: Option<f64>,
    pub sales: Option<f64>,
    pub orders: Option<f64>,
    pub current_bid: Option<Decimal>,
}

impl TargetRow {
    pub fn into_metrics(self, window_days: u32) -> EngineResult<TargetMetrics> {
        let kind = self
            .target_type
            .ok_or_else(|| EngineError::validation("type", "missing"))?;
        let counters = Counters {
            impressions: required(self.impressions, "impressions")?,
            clicks: required(self.clicks, "clicks")?,
            spend: required(self.spend, "spend")?,
            sales: required(self.sales, "sales")?,
            orders: required(self.orders, "orders")?,
        };
        let bid = self
            .current_bid
            .ok_or_else(|| EngineError::validation("current_bid", "missing"))?;
        TargetMetrics::new(self.target_id, kind, counters, bid, window_days)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlacementRow {
    pub placement: Option<PlacementType>,
    pub impressions: Option<f64>,
    pub clicks: Option<f64>,
    pub spend: Option<f64>,
    pub sales: Option<f64>,
    pub orders: Option<f64>,
}

impl PlacementRow {
    pub fn into_metrics(
        self,
        campaign_id: &str,
        window_days: u32,
        exclude_recent_days: u32,
    ) -> EngineResult<PlacementMetrics> {
        let placement = self
            .placement
            .ok_or_else(|| EngineError::validation("placement", "missing"))?;
        let counters = Counters {
            impressions: required(self.impressions, "impressions")?,
            clicks: required(self.clicks, "clicks")?,
            spend: required(self.spend, "spend")?,
            sales: required(self.sales, "sales")?,
            orders: required(self.orders, "orders")?,
        };
        PlacementMetrics::new(campaign_id, placement, counters, window_days, exclude_recent_days)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalProposalRow {
    pub source: ProposalSource,
    pub multiplier: f64,
    pub confidence: f64,
}

impl ExternalProposalRow {
    pub fn into_proposal(self, campaign_id: &str) -> BidProposal {
        BidProposal::external(self.source, campaign_id, self.multiplier, self.confidence)
    }
}

/// Campaign-level settings and current bid layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSettings {
    pub account_id: String,
    #[serde(default)]
    pub goal: GoalConfig,
    pub base_bid: Decimal,
    #[serde(default)]
    pub placement_adjustments: BTreeMap<PlacementType, f64>,
    #[serde(default = "one")]
    pub dayparting_multiplier: f64,
    pub historical_avg_cpc: Option<Decimal>,
    #[serde(default)]
    pub external_proposals: Vec<ExternalProposalRow>,
}

fn one() -> f64 {
    1.0
}

/// One campaign as stored in a snapshot file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub campaign_id: String,
    pub settings: CampaignSettings,
    #[serde(default)]
    pub bidding_strategy: BiddingStrategyMode,
    #[serde(default)]
    pub targets: Vec<TargetRow>,
    #[serde(default)]
    pub placements: Vec<PlacementRow>,
    /// Keyed by target id.
    #[serde(default)]
    pub signals: HashMap<String, BusinessSignals>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(default)]
    pub campaigns: Vec<CampaignRecord>,
    /// Trailing totals keyed by account id.
    #[serde(default)]
    pub accounts: HashMap<String, AccountTotals>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_row_converts() {
        let row: TargetRow = serde_json::from_str(
            r#"{"target_id":"kw-1","type":"keyword","impressions":900,"clicks":30,
                "spend":21.5,"sales":120,"orders":4,"current_bid":"0.85"}"#,
        )
        .unwrap();
        let metrics = row.into_metrics(14).unwrap();
        assert_eq!(metrics.clicks, 30.0);
        assert_eq!(metrics.current_bid, Decimal::new(85, 2));
    }

    #[test]
    fn missing_field_is_rejected_not_defaulted() {
        let json = r#"{"target_id":"kw-2","type":"keyword","clicks":30,"current_bid":1}"#;
        let row: TargetRow = serde_json::from_str(json).unwrap();
        let err = row.into_metrics(14).unwrap_err();
        assert_eq!(err, EngineError::validation("impressions", "missing"));
    }

    #[test]
    fn placement_row_needs_placement() {
        let row = PlacementRow {
            clicks: Some(1.0),
            ..PlacementRow::default()
        };
        assert!(matches!(
            row.into_metrics("c", 14, 3),
            Err(EngineError::Validation { field: "placement", .. })
        ));
    }

    #[test]
    fn settings_defaults() {
        let settings: CampaignSettings =
            serde_json::from_str(r#"{"account_id":"acc-1","base_bid":"1.10"}"#).unwrap();
        assert_eq!(settings.dayparting_multiplier, 1.0);
        assert!(settings.external_proposals.is_empty());
        assert!(settings.historical_avg_cpc.is_none());
    }
}
