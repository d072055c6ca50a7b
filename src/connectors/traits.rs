// src/connectors/traits.rs
use crate::connectors::messages::{CampaignSettings, PlacementRow, TargetRow};
use crate::core::engine::CampaignEvaluation;
use crate::types::{AccountTotals, BiddingStrategyMode, BusinessSignals};
use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Read side of the surrounding system: metrics, business facts and
/// campaign settings. Windows are in days; `exclude_recent_days` trims the
/// attribution-delay tail.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn campaign_ids(&self) -> Result<Vec<String>>;

    async fn campaign_settings(&self, campaign_id: &str) -> Result<CampaignSettings>;

    async fn target_metrics(
        &self,
        campaign_id: &str,
        window_days: u32,
        exclude_recent_days: u32,
    ) -> Result<Vec<TargetRow>>;

    async fn placement_metrics(
        &self,
        campaign_id: &str,
        window_days: u32,
        exclude_recent_days: u32,
    ) -> Result<Vec<PlacementRow>>;

    async fn business_signals(&self, target_id: &str) -> Result<Option<BusinessSignals>>;

    async fn account_totals(&self, account_id: &str, window_days: u32) -> Result<AccountTotals>;

    async fn bidding_strategy_mode(&self, campaign_id: &str) -> Result<BiddingStrategyMode>;
}

/// Write side: persists decisions for later execution against the ad
/// platform.
#[async_trait]
pub trait DecisionSink: Send + Sync {
    async fn persist(&self, run_id: Uuid, evaluation: &CampaignEvaluation) -> Result<()>;
}
