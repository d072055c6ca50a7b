// src/connectors/snapshot.rs
use crate::connectors::messages::{
    CampaignRecord, CampaignSettings, PlacementRow, SnapshotDocument, TargetRow,
};
use crate::connectors::traits::MetricsSource;
use crate::types::{AccountTotals, BiddingStrategyMode, BusinessSignals};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

/// Serves metrics from a pre-aggregated JSON snapshot. The rows were
/// aggregated when the snapshot was taken, so window arguments are accepted
/// and ignored.
#[derive(Debug, Clone, Default)]
pub struct JsonSnapshotSource {
    campaigns: HashMap<String, CampaignRecord>,
    order: Vec<String>,
    signals: HashMap<String, BusinessSignals>,
    accounts: HashMap<String, AccountTotals>,
}

impl JsonSnapshotSource {
    pub fn from_document(document: SnapshotDocument) -> Self {
        let mut source = Self {
            accounts: document.accounts,
            ..Self::default()
        };
        for record in document.campaigns {
            source
                .signals
                .extend(record.signals.iter().map(|(k, v)| (k.clone(), v.clone())));
            source.order.push(record.campaign_id.clone());
            source.campaigns.insert(record.campaign_id.clone(), record);
        }
        source
    }

    pub async fn load(path: &str) -> Result<Self> {
        let data = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading snapshot {path}"))?;
        let document: SnapshotDocument =
            serde_json::from_str(&data).with_context(|| format!("parsing snapshot {path}"))?;
        info!(path, campaigns = document.campaigns.len(), "snapshot loaded");
        Ok(Self::from_document(document))
    }

    fn campaign(&self, campaign_id: &str) -> Result<&CampaignRecord> {
        self.campaigns
            .get(campaign_id)
            .ok_or_else(|| anyhow!("unknown campaign {campaign_id}"))
    }
}

#[async_trait]
impl MetricsSource for JsonSnapshotSource {
    async fn campaign_ids(&self) -> Result<Vec<String>> {
        Ok(self.order.clone())
    }

    async fn campaign_settings(&self, campaign_id: &str) -> Result<CampaignSettings> {
        Ok(self.campaign(campaign_id)?.settings.clone())
    }

    async fn target_metrics(
        &self,
        campaign_id: &str,
        _window_days: u32,
        _exclude_recent_days: u32,
    ) -> Result<Vec<TargetRow>> {
        Ok(self.campaign(campaign_id)?.targets.clone())
    }

    async fn placement_metrics(
        &self,
        campaign_id: &str,
        _window_days: u32,
        _exclude_recent_days: u32,
    ) -> Result<Vec<PlacementRow>> {
        Ok(self.campaign(campaign_id)?.placements.clone())
    }

    async fn business_signals(&self, target_id: &str) -> Result<Option<BusinessSignals>> {
        Ok(self.signals.get(target_id).cloned())
    }

    async fn account_totals(&self, account_id: &str, _window_days: u32) -> Result<AccountTotals> {
        Ok(self.accounts.get(account_id).copied().unwrap_or_default())
    }

    async fn bidding_strategy_mode(&self, campaign_id: &str) -> Result<BiddingStrategyMode> {
        Ok(self.campaign(campaign_id)?.bidding_strategy)
    }
}
