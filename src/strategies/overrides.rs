// src/strategies/overrides.rs
//! Business overrides applied after either bid estimator. Inventory
//! protection is checked first and, once it fires, organic-rank suppression
//! is never consulted.

use crate::config::OverrideConfig;
use crate::reasons::{ReasonFact, RuleId};
use crate::types::{BusinessSignals, InventoryLevel};
use crate::utils::precision::{bid_from_f64, bid_to_f64, normalize_bid};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryAction {
    None,
    Reduce,
    Pause,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideAction {
    Pause,
    InventoryReduce,
    OrganicRankSuppress,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InventoryProtection {
    pub level: InventoryLevel,
    pub multiplier: f64,
    pub adjusted_bid: Decimal,
    pub action: InventoryAction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverrideOutcome {
    pub final_bid: Decimal,
    /// Multiplier of the stage that fired: 1 when none did, 0 when paused.
    pub multiplier: f64,
    pub actions: Vec<OverrideAction>,
    pub facts: Vec<ReasonFact>,
}

impl OverrideOutcome {
    pub fn paused(&self) -> bool {
        self.actions.contains(&OverrideAction::Pause)
    }
}

/// Explicit level and days-of-cover both count; the more severe one wins.
pub fn effective_inventory_level(
    signals: &BusinessSignals,
    config: &OverrideConfig,
) -> InventoryLevel {
    let explicit = signals.inventory_level.unwrap_or(InventoryLevel::Normal);
    let days = signals.inventory_days;
    match explicit {
        InventoryLevel::OutOfStock => InventoryLevel::OutOfStock,
        InventoryLevel::Critical => InventoryLevel::Critical,
        _ if days.is_some_and(|d| d <= config.critical_days) => InventoryLevel::Critical,
        InventoryLevel::Low => InventoryLevel::Low,
        _ if days.is_some_and(|d| d <= config.low_days) => InventoryLevel::Low,
        _ => InventoryLevel::Normal,
    }
}

pub fn calculate_inventory_protection(
    bid: Decimal,
    signals: &BusinessSignals,
    config: &OverrideConfig,
) -> InventoryProtection {
    let level = effective_inventory_level(signals, config);
    let (multiplier, action) = match level {
        InventoryLevel::OutOfStock => (0.0, InventoryAction::Pause),
        InventoryLevel::Critical => (config.critical_multiplier, InventoryAction::Reduce),
        InventoryLevel::Low => (config.low_multiplier, InventoryAction::Reduce),
        InventoryLevel::Normal => (1.0, InventoryAction::None),
    };
    InventoryProtection {
        level,
        multiplier,
        adjusted_bid: bid * bid_from_f64(multiplier),
        action,
    }
}

/// Strict two-stage precedence: inventory, then organic rank only when the
/// inventory stage took no action. The result is floored at
/// `config.floor_bid` unless paused.
pub fn apply_overrides(
    base_bid: Decimal,
    signals: &BusinessSignals,
    config: &OverrideConfig,
    tick: Decimal,
) -> OverrideOutcome {
    let inventory = calculate_inventory_protection(base_bid, signals, config);
    let mut facts = Vec::new();
    let mut actions = Vec::new();

    let (bid, multiplier) = match inventory.action {
        InventoryAction::Pause => {
            facts.push(ReasonFact::new(RuleId::InventoryPause));
            actions.push(OverrideAction::Pause);
            return OverrideOutcome {
                final_bid: Decimal::ZERO,
                multiplier: 0.0,
                actions,
                facts,
            };
        }
        InventoryAction::Reduce => {
            let rule = match inventory.level {
                InventoryLevel::Critical => RuleId::InventoryCritical,
                _ => RuleId::InventoryLow,
            };
            let mut fact = ReasonFact::new(rule).with("multiplier", inventory.multiplier);
            if let Some(days) = signals.inventory_days {
                fact = fact.with("inventory_days", days);
            }
            facts.push(fact);
            actions.push(OverrideAction::InventoryReduce);
            (inventory.adjusted_bid, inventory.multiplier)
        }
        InventoryAction::None => match signals.organic_rank {
            Some(rank) if rank <= config.organic_rank_threshold => {
                facts.push(
                    ReasonFact::new(RuleId::OrganicRankSuppressed)
                        .with("rank", f64::from(rank))
                        .with("multiplier", config.organic_multiplier),
                );
                actions.push(OverrideAction::OrganicRankSuppress);
                let multiplier = config.organic_multiplier;
                (base_bid * bid_from_f64(multiplier), multiplier)
            }
            _ => (base_bid, 1.0),
        },
    };

    let mut final_bid = normalize_bid(bid, tick);
    if final_bid < config.floor_bid {
        final_bid = config.floor_bid;
        facts.push(
            ReasonFact::new(RuleId::OverrideFloor).with("floor", bid_to_f64(config.floor_bid)),
        );
    }

    OverrideOutcome {
        final_bid,
        multiplier,
        actions,
        facts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn signals(
        level: Option<InventoryLevel>,
        days: Option<f64>,
        rank: Option<u32>,
    ) -> BusinessSignals {
        BusinessSignals {
            inventory_level: level,
            inventory_days: days,
            organic_rank: rank,
        }
    }

    fn protect(bid: &str, level: InventoryLevel) -> InventoryProtection {
        let signals = signals(Some(level), None, None);
        calculate_inventory_protection(dec(bid), &signals, &OverrideConfig::default())
    }

    fn apply(bid: &str, signals: BusinessSignals) -> OverrideOutcome {
        apply_overrides(dec(bid), &signals, &OverrideConfig::default(), dec("0.01"))
    }

    fn level_of(level: Option<InventoryLevel>, days: f64) -> InventoryLevel {
        effective_inventory_level(&signals(level, Some(days), None), &OverrideConfig::default())
    }

    #[test]
    fn critical_halves_bid() {
        let p = protect("1.00", InventoryLevel::Critical);
        assert_eq!(p.adjusted_bid, dec("0.50"));
        assert_eq!(p.action, InventoryAction::Reduce);
    }

    #[test]
    fn out_of_stock_pauses() {
        let p = protect("1.00", InventoryLevel::OutOfStock);
        assert_eq!(p.adjusted_bid, Decimal::ZERO);
        assert_eq!(p.action, InventoryAction::Pause);

        let outcome = apply("1.00", signals(Some(InventoryLevel::OutOfStock), None, Some(1)));
        assert_eq!(outcome.final_bid, Decimal::ZERO);
        assert!(outcome.paused());
    }

    #[test]
    fn days_of_cover_drive_level() {
        assert_eq!(level_of(None, 2.0), InventoryLevel::Critical);
        assert_eq!(level_of(None, 6.0), InventoryLevel::Low);
        assert_eq!(level_of(Some(InventoryLevel::Low), 1.0), InventoryLevel::Critical);
        assert_eq!(level_of(None, 30.0), InventoryLevel::Normal);
    }

    #[test]
    fn inventory_takes_precedence_over_organic_rank() {
        let outcome = apply("1.00", signals(Some(InventoryLevel::Critical), None, Some(5)));
        assert_eq!(outcome.multiplier, 0.5);
        assert_eq!(outcome.final_bid, dec("0.50"));
        assert_eq!(outcome.actions, vec![OverrideAction::InventoryReduce]);
    }

    #[test]
    fn inventory_fact_names_level_and_only_known_days() {
        let outcome = apply("1.00", signals(Some(InventoryLevel::Low), None, None));
        let fact = &outcome.facts[0];
        assert_eq!(fact.rule, RuleId::InventoryLow);
        assert_eq!(fact.get("multiplier"), Some(0.7));
        assert_eq!(fact.get("inventory_days"), None);

        let outcome = apply("1.00", signals(None, Some(2.0), None));
        let fact = &outcome.facts[0];
        assert_eq!(fact.rule, RuleId::InventoryCritical);
        assert_eq!(fact.get("inventory_days"), Some(2.0));
    }

    #[test]
    fn organic_rank_suppresses_when_stock_is_healthy() {
        let outcome = apply("1.00", signals(None, Some(60.0), Some(10)));
        assert_eq!(outcome.final_bid, dec("0.70"));
        assert_eq!(outcome.actions, vec![OverrideAction::OrganicRankSuppress]);

        let unranked = apply("1.00", signals(None, None, Some(11)));
        assert_eq!(unranked.final_bid, dec("1.00"));
        assert!(unranked.actions.is_empty());
    }

    #[test]
    fn reduced_bid_is_floored() {
        let outcome = apply("0.02", signals(Some(InventoryLevel::Critical), None, None));
        assert_eq!(outcome.final_bid, dec("0.02"));
        assert!(outcome.facts.iter().any(|f| f.rule == RuleId::OverrideFloor));
    }
}
