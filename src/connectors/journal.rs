// src/connectors/journal.rs
use crate::connectors::traits::DecisionSink;
use crate::core::cooldown::CooldownKey;
use crate::core::engine::CampaignEvaluation;
use crate::types::PlacementType;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Serialize)]
struct JournalEntry<'a> {
    run_id: Uuid,
    recorded_at: String,
    evaluation: &'a CampaignEvaluation,
}

/// The slice of a journal line needed to rebuild cooldown history.
#[derive(Deserialize)]
struct JournaledLine {
    evaluation: JournaledEvaluation,
}

#[derive(Deserialize)]
struct JournaledEvaluation {
    campaign_id: String,
    evaluated_at: DateTime<Utc>,
    placement_decisions: Vec<JournaledPlacement>,
}

#[derive(Deserialize)]
struct JournaledPlacement {
    placement_type: PlacementType,
    previous_percent: f64,
    new_percent: f64,
    blocked_by_cooldown: bool,
}

/// Appends one JSON line per evaluated campaign.
pub struct JsonlJournal {
    path: String,
    // serialises appends from concurrent campaign tasks
    write_lock: Mutex<()>,
}

impl JsonlJournal {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Every placement change already journaled, keyed for the cooldown
    /// ledger and stamped with its evaluation time. A missing journal is an
    /// empty history. Lines that do not parse are skipped with a warning.
    pub async fn cooldown_history(&self) -> Result<Vec<(CooldownKey, DateTime<Utc>)>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("reading journal {}", self.path)),
        };

        let mut history = Vec::new();
        for (number, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: JournaledLine = match serde_json::from_str(line) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(path = %self.path, line = number + 1, error = %e, "journal line skipped");
                    continue;
                }
            };
            let evaluation = entry.evaluation;
            history.extend(
                evaluation
                    .placement_decisions
                    .iter()
                    .filter(|p| !p.blocked_by_cooldown && p.new_percent != p.previous_percent)
                    .map(|p| {
                        let key = CooldownKey::placement(&evaluation.campaign_id, p.placement_type);
                        (key, evaluation.evaluated_at)
                    }),
            );
        }
        info!(path = %self.path, changes = history.len(), "cooldown history loaded");
        Ok(history)
    }
}

#[async_trait]
impl DecisionSink for JsonlJournal {
    async fn persist(&self, run_id: Uuid, evaluation: &CampaignEvaluation) -> Result<()> {
        let entry = JournalEntry {
            run_id,
            recorded_at: Utc::now().to_rfc3339(),
            evaluation,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening journal {}", self.path))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        debug!(campaign_id = %evaluation.campaign_id, path = %self.path, "decisions journaled");
        Ok(())
    }
}
