// src/core/runner.rs
use crate::config::EngineConfig;
use crate::connectors::traits::{DecisionSink, MetricsSource};
use crate::core::cooldown::CooldownLedger;
use crate::core::engine::{CampaignSnapshot, DecisionEngine, RejectedItem, TargetInput};
use crate::error::{EngineError, EngineResult};
use crate::types::{BatchSummary, ItemOutcome};
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

fn source_error(err: anyhow::Error) -> EngineError {
    EngineError::Source(format!("{err:#}"))
}

/// Pulls everything one campaign needs from the source and validates it at
/// the boundary. Bad rows become [`RejectedItem`]s; only campaign-level
/// failures (settings, account totals) fail the whole snapshot.
pub async fn load_campaign_snapshot<M>(
    source: &M,
    campaign_id: &str,
    config: &EngineConfig,
) -> EngineResult<CampaignSnapshot>
where
    M: MetricsSource + ?Sized,
{
    let runner = &config.runner;
    let placement = &config.placement;

    let settings = source.campaign_settings(campaign_id).await.map_err(source_error)?;
    let bidding_strategy = source.bidding_strategy_mode(campaign_id).await.map_err(source_error)?;
    let account_totals = source
        .account_totals(&settings.account_id, placement.benchmark_window_days)
        .await
        .map_err(source_error)?;

    let mut targets = Vec::new();
    let mut rejected = Vec::new();
    let rows = source
        .target_metrics(campaign_id, runner.target_window_days, runner.attribution_delay_days)
        .await
        .map_err(source_error)?;
    let effective_days = runner.target_window_days - runner.attribution_delay_days;
    for row in rows {
        let id = row.target_id.clone();
        let signals = match source.business_signals(&id).await {
            Ok(signals) => signals,
            Err(e) => {
                rejected.push(RejectedItem { id, error: source_error(e) });
                continue;
            }
        };
        match row.into_metrics(effective_days) {
            Ok(metrics) => targets.push(TargetInput { metrics, signals }),
            Err(error) => rejected.push(RejectedItem { id, error }),
        }
    }

    let mut placements = Vec::new();
    let rows = source
        .placement_metrics(campaign_id, placement.window_days, placement.exclude_recent_days)
        .await
        .map_err(source_error)?;
    for (i, row) in rows.into_iter().enumerate() {
        match row.into_metrics(campaign_id, placement.window_days, placement.exclude_recent_days) {
            Ok(metrics) => placements.push(metrics),
            Err(error) => rejected.push(RejectedItem {
                id: format!("{campaign_id}/placement-{i}"),
                error,
            }),
        }
    }

    Ok(CampaignSnapshot {
        campaign_id: campaign_id.to_string(),
        goal: settings.goal,
        bidding_strategy,
        base_bid: settings.base_bid,
        placement_adjustments: settings.placement_adjustments,
        dayparting_multiplier: settings.dayparting_multiplier,
        historical_avg_cpc: settings.historical_avg_cpc,
        account_totals,
        targets,
        placements,
        external_proposals: settings
            .external_proposals
            .into_iter()
            .map(|p| p.into_proposal(campaign_id))
            .collect(),
        rejected,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// One entry per campaign, sorted by id. `Applied` means evaluated and
    /// persisted.
    pub campaigns: Vec<ItemOutcome<BatchSummary>>,
    pub summary: BatchSummary,
}

/// Caller-side driver: the engine itself never does I/O or spawns work.
pub struct CampaignRunner<M, S> {
    engine: Arc<DecisionEngine>,
    source: Arc<M>,
    sink: Arc<S>,
    ledger: Arc<dyn CooldownLedger>,
    max_concurrent: usize,
}

impl<M, S> CampaignRunner<M, S>
where
    M: MetricsSource,
    S: DecisionSink,
{
    pub fn new(
        engine: Arc<DecisionEngine>,
        source: Arc<M>,
        sink: Arc<S>,
        ledger: Arc<dyn CooldownLedger>,
    ) -> Self {
        let max_concurrent = engine.config().runner.max_concurrent_campaigns.max(1);
        Self {
            engine,
            source,
            sink,
            ledger,
            max_concurrent,
        }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let ids = self.source.campaign_ids().await?;
        info!(%run_id, campaigns = ids.len(), "run started");

        let mut campaigns: Vec<ItemOutcome<BatchSummary>> = stream::iter(ids)
            .map(|id| self.run_campaign(run_id, id, now))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;
        campaigns.sort_by(|a, b| a.id().cmp(b.id()));

        let mut summary = BatchSummary::default();
        for outcome in &campaigns {
            match outcome {
                ItemOutcome::Applied { decision, .. } => summary.merge(decision.clone()),
                other => summary.record(other),
            }
        }
        info!(
            %run_id,
            applied = summary.applied,
            skipped = summary.skipped,
            errors = summary.errors,
            "run finished"
        );

        Ok(RunReport {
            run_id,
            started_at: now,
            campaigns,
            summary,
        })
    }

    /// `Applied` only once the sink stored the evaluation; the placement
    /// cooldowns it reserved are committed then and released otherwise.
    async fn run_campaign(
        &self,
        run_id: Uuid,
        campaign_id: String,
        now: DateTime<Utc>,
    ) -> ItemOutcome<BatchSummary> {
        let loaded =
            load_campaign_snapshot(self.source.as_ref(), &campaign_id, self.engine.config()).await;
        let snapshot = match loaded {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(%campaign_id, error = %e, "snapshot unavailable, campaign skipped");
                return ItemOutcome::error(campaign_id, &e);
            }
        };

        let evaluation = self.engine.evaluate_campaign(&snapshot, self.ledger.as_ref(), now);
        let reservations = evaluation.cooldown_reservations();

        if let Err(e) = self.sink.persist(run_id, &evaluation).await {
            let err = EngineError::Persistence(format!("{e:#}"));
            error!(%campaign_id, error = %err, "failed to persist decisions");
            // nothing was stored, so the placements never changed
            if let Err(release_err) = self.ledger.release_all(&reservations) {
                warn!(%campaign_id, error = %release_err, "cooldown release failed");
            }
            return ItemOutcome::error(campaign_id, &err);
        }
        if let Err(e) = self.ledger.commit_all(&reservations) {
            error!(%campaign_id, error = %e, "persisted, but cooldown commit failed");
            return ItemOutcome::error(campaign_id, &e);
        }
        ItemOutcome::Applied {
            id: campaign_id,
            decision: evaluation.summary,
        }
    }
}
