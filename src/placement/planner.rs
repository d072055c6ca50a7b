// src/placement/planner.rs
use crate::config::PlacementConfig;
use crate::core::cooldown::{CooldownCheck, CooldownKey, CooldownLedger};
use crate::error::EngineResult;
use crate::placement::scorer::PlacementScore;
use crate::reasons::{ReasonFact, ReasonRenderer, RuleId};
use crate::types::{
    BidProposal, BiddingStrategyMode, PlacementAdjustmentDecision, PlacementType, ProposalSource,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacementAdjustmentSuggestion {
    pub placement: PlacementType,
    pub current_percent: f64,
    pub new_percent: f64,
    pub delta: f64,
    pub confidence: f64,
    pub relative_score: Option<f64>,
    pub blocked_by_cooldown: bool,
    pub cooldown_remaining_days: Option<i64>,
    pub facts: Vec<ReasonFact>,
}

impl PlacementAdjustmentSuggestion {
    fn unchanged(placement: PlacementType, current: f64, confidence: f64) -> Self {
        Self {
            placement,
            current_percent: current,
            new_percent: current,
            delta: 0.0,
            confidence,
            relative_score: None,
            blocked_by_cooldown: false,
            cooldown_remaining_days: None,
            facts: Vec::new(),
        }
    }

    fn block_for_cooldown(&mut self, remaining_days: i64) {
        self.new_percent = self.current_percent;
        self.delta = 0.0;
        self.blocked_by_cooldown = true;
        self.cooldown_remaining_days = Some(remaining_days);
        self.facts.push(
            ReasonFact::new(RuleId::CooldownActive).with("remaining_days", remaining_days as f64),
        );
    }

    pub fn into_decision(
        self,
        campaign_id: &str,
        renderer: &dyn ReasonRenderer,
    ) -> PlacementAdjustmentDecision {
        PlacementAdjustmentDecision {
            campaign_id: campaign_id.to_string(),
            placement_type: self.placement,
            previous_percent: self.current_percent,
            new_percent: self.new_percent,
            reason: renderer.render(&self.facts),
            confidence: self.confidence,
            blocked_by_cooldown: self.blocked_by_cooldown,
            facts: self.facts,
        }
    }
}

/// Turns placement scores into bounded, cooldown-gated weight changes.
#[derive(Debug, Clone)]
pub struct PlacementAdjustmentPlanner {
    config: PlacementConfig,
}

impl PlacementAdjustmentPlanner {
    pub fn new(config: PlacementConfig) -> Self {
        Self { config }
    }

    pub fn cooldown_window(&self) -> Duration {
        Duration::days(self.config.cooldown_days)
    }

    fn band_delta(&self, relative: f64) -> f64 {
        self.config
            .bands
            .iter()
            .find(|b| relative >= b.min_relative)
            .or_else(|| self.config.bands.last())
            .map(|b| b.delta_pct)
            .unwrap_or(0.0)
    }

    fn step_limit(&self, confidence: f64, current: f64) -> f64 {
        let tier_cap = self
            .config
            .step_caps
            .iter()
            .find(|c| confidence >= c.min_confidence)
            .map(|c| c.max_delta_pct)
            .unwrap_or(self.config.fallback_step_cap_pct);
        tier_cap.max(current.abs() * self.config.proportional_step)
    }

    pub fn ceiling(&self, mode: BiddingStrategyMode) -> f64 {
        match mode {
            BiddingStrategyMode::UpAndDown => self.config.auto_bidding_ceiling_pct,
            BiddingStrategyMode::Fixed | BiddingStrategyMode::DownOnly => {
                self.config.default_ceiling_pct
            }
        }
    }

    /// Pure part of planning: the change a score asks for, ignoring cooldown.
    pub fn propose(
        &self,
        score: &PlacementScore,
        best_reliable: Option<f64>,
        current: f64,
        mode: BiddingStrategyMode,
    ) -> PlacementAdjustmentSuggestion {
        let mut suggestion =
            PlacementAdjustmentSuggestion::unchanged(score.placement, current, score.confidence);
        suggestion.facts.push(
            ReasonFact::new(RuleId::PlacementScored)
                .with("score", score.raw_score)
                .with("confidence", score.confidence),
        );

        if !score.is_reliable {
            suggestion.facts.push(
                ReasonFact::new(RuleId::PlacementUnreliable).with("confidence", score.confidence),
            );
            return suggestion;
        }
        let Some(best) = best_reliable.filter(|b| *b > 0.0) else {
            suggestion.facts.push(ReasonFact::new(RuleId::NoReliablePeer));
            return suggestion;
        };

        let relative = score.raw_score / best;
        let raw = self.band_delta(relative) * score.confidence;
        suggestion.relative_score = Some(relative);
        suggestion.facts.push(
            ReasonFact::new(RuleId::PlacementBand)
                .with("relative", relative)
                .with("suggested", raw),
        );

        let limit = self.step_limit(score.confidence, current);
        let bounded = raw.clamp(-limit, limit);
        if bounded != raw {
            suggestion.facts.push(ReasonFact::new(RuleId::PlacementCapped).with("limit", limit));
        }

        let new_percent = (current + bounded)
            .clamp(self.config.min_adjustment_pct, self.ceiling(mode))
            .round();
        suggestion.new_percent = new_percent;
        suggestion.delta = new_percent - current;
        suggestion
    }

    /// Plans every placement of one campaign. Placements that change hold a
    /// cooldown reservation on return; the caller commits or releases them.
    /// On error every reservation taken so far is released.
    pub fn plan(
        &self,
        campaign_id: &str,
        scores: &[PlacementScore],
        current_adjustments: &BTreeMap<PlacementType, f64>,
        mode: BiddingStrategyMode,
        ledger: &dyn CooldownLedger,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<PlacementAdjustmentSuggestion>> {
        let best_reliable = scores
            .iter()
            .filter(|s| s.is_reliable)
            .map(|s| s.raw_score)
            .fold(None, |best: Option<f64>, s| Some(best.map_or(s, |b| b.max(s))));

        let mut suggestions = Vec::with_capacity(scores.len());
        let mut reserved = Vec::new();
        for score in scores {
            let current = current_adjustments.get(&score.placement).copied().unwrap_or(0.0);
            let key = CooldownKey::placement(campaign_id, score.placement);
            let planned = self
                .cooldown_block(&key, score, current, ledger, now)
                .and_then(|blocked| match blocked {
                    Some(blocked) => Ok(blocked),
                    None => {
                        let proposed = self.propose(score, best_reliable, current, mode);
                        self.reserve(&key, proposed, ledger, now)
                    }
                });
            match planned {
                Ok(suggestion) => {
                    if suggestion.delta != 0.0 {
                        reserved.push(key);
                    }
                    suggestions.push(suggestion);
                }
                Err(e) => {
                    if let Err(release_err) = ledger.release_all(&reserved) {
                        warn!(campaign_id, error = %release_err, "cooldown release failed");
                    }
                    return Err(e);
                }
            }
        }
        Ok(suggestions)
    }

    /// An unchanged, blocked suggestion when the placement is still inside
    /// its window.
    fn cooldown_block(
        &self,
        key: &CooldownKey,
        score: &PlacementScore,
        current: f64,
        ledger: &dyn CooldownLedger,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<PlacementAdjustmentSuggestion>> {
        let last = ledger.last_adjusted(key)?;
        let CooldownCheck::Active { remaining_days, .. } =
            CooldownCheck::evaluate(last, now, self.cooldown_window())
        else {
            return Ok(None);
        };
        let mut blocked =
            PlacementAdjustmentSuggestion::unchanged(score.placement, current, score.confidence);
        blocked.block_for_cooldown(remaining_days);
        debug!(%key, remaining_days, "placement in cooldown");
        Ok(Some(blocked))
    }

    fn reserve(
        &self,
        key: &CooldownKey,
        mut suggestion: PlacementAdjustmentSuggestion,
        ledger: &dyn CooldownLedger,
        now: DateTime<Utc>,
    ) -> EngineResult<PlacementAdjustmentSuggestion> {
        if suggestion.delta == 0.0 {
            return Ok(suggestion);
        }
        let check = ledger.try_reserve(key, now, self.cooldown_window())?;
        // lost a race against a concurrent evaluation
        if let CooldownCheck::Active { remaining_days, .. } = check {
            suggestion.block_for_cooldown(remaining_days);
        } else {
            info!(
                %key,
                from = suggestion.current_percent,
                to = suggestion.new_percent,
                "placement adjustment planned"
            );
        }
        Ok(suggestion)
    }

    /// Campaign-level base-bid signal from placement efficiency: neutral at a
    /// score of 50, at most `max_bid_proposal_pct` either way. `None` when no
    /// placement is reliable.
    pub fn bid_proposal(
        &self,
        campaign_id: &str,
        scores: &[PlacementScore],
    ) -> Option<BidProposal> {
        let reliable: Vec<&PlacementScore> = scores.iter().filter(|s| s.is_reliable).collect();
        let weight: f64 = reliable.iter().map(|s| s.confidence).sum();
        if weight <= 0.0 {
            return None;
        }
        let mean_score = reliable.iter().map(|s| s.raw_score * s.confidence).sum::<f64>() / weight;
        let cap = self.config.max_bid_proposal_pct;
        let shift = ((mean_score - 50.0) / 50.0 * cap).clamp(-cap, cap);

        Some(BidProposal {
            source: ProposalSource::Placement,
            subject_id: campaign_id.to_string(),
            suggested_multiplier: 1.0 + shift,
            suggested_bid: None,
            confidence: weight / reliable.len() as f64,
            facts: vec![ReasonFact::new(RuleId::PlacementScored)
                .with("score", mean_score)
                .with("confidence", weight / reliable.len() as f64)],
        })
    }
}
