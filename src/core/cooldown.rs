// src/core/cooldown.rs
use crate::error::{EngineError, EngineResult};
use crate::types::PlacementType;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CooldownKey {
    pub entity: String,
    pub signal: String,
}

impl CooldownKey {
    pub fn placement(campaign_id: &str, placement: PlacementType) -> Self {
        Self {
            entity: campaign_id.to_string(),
            signal: format!("placement:{placement}"),
        }
    }
}

impl fmt::Display for CooldownKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity, self.signal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownCheck {
    Clear,
    Active {
        last: DateTime<Utc>,
        remaining_days: i64,
    },
}

impl CooldownCheck {
    /// A timestamp in the future (clock skew between writers) counts as
    /// "just adjusted".
    pub fn evaluate(last: Option<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) -> Self {
        let Some(last) = last else {
            return Self::Clear;
        };
        let elapsed = (now - last).max(Duration::zero());
        if elapsed >= window {
            return Self::Clear;
        }
        let remaining = window - elapsed;
        let day = Duration::days(1).num_seconds();
        let remaining_days = (remaining.num_seconds() + day - 1) / day;
        Self::Active {
            last,
            remaining_days: remaining_days.max(1),
        }
    }
}

/// Last-adjustment timestamps per (entity, signal).
///
/// Planning only reserves a slot. The reservation blocks other callers at
/// once, but it becomes history only through `commit`, which the caller runs
/// after the decisions are stored. `release` drops a reservation whose
/// decisions were never stored. `try_reserve` must be a single atomic
/// check-and-set so two concurrent evaluations cannot both pass the same
/// cooldown.
pub trait CooldownLedger: Send + Sync {
    /// Latest committed or reserved adjustment.
    fn last_adjusted(&self, key: &CooldownKey) -> EngineResult<Option<DateTime<Utc>>>;

    /// Reserves `now` and returns `Clear` if no adjustment happened within
    /// `window`; otherwise leaves the record untouched and returns `Active`.
    fn try_reserve(
        &self,
        key: &CooldownKey,
        now: DateTime<Utc>,
        window: Duration,
    ) -> EngineResult<CooldownCheck>;

    fn commit(&self, key: &CooldownKey) -> EngineResult<()>;

    fn release(&self, key: &CooldownKey) -> EngineResult<()>;

    fn commit_all(&self, keys: &[CooldownKey]) -> EngineResult<()> {
        keys.iter().try_for_each(|key| self.commit(key))
    }

    /// Releases every key, even past a failing one; returns the first error.
    fn release_all(&self, keys: &[CooldownKey]) -> EngineResult<()> {
        keys.iter()
            .map(|key| self.release(key))
            .fold(Ok(()), |first, result| first.and(result))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Slot {
    committed: Option<DateTime<Utc>>,
    reserved: Option<DateTime<Utc>>,
}

impl Slot {
    fn latest(&self) -> Option<DateTime<Utc>> {
        self.committed.max(self.reserved)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCooldownLedger {
    slots: Mutex<HashMap<CooldownKey, Slot>>,
}

impl InMemoryCooldownLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger pre-loaded with committed adjustments, e.g. the placement
    /// changes read back from the decision journal.
    pub fn from_history<I>(history: I) -> EngineResult<Self>
    where
        I: IntoIterator<Item = (CooldownKey, DateTime<Utc>)>,
    {
        let ledger = Self::new();
        for (key, at) in history {
            ledger.record(key, at)?;
        }
        Ok(ledger)
    }

    /// Records a committed adjustment. Never moves a record backwards.
    pub fn record(&self, key: CooldownKey, at: DateTime<Utc>) -> EngineResult<()> {
        let mut slots = self.lock()?;
        let slot = slots.entry(key).or_default();
        slot.committed = slot.committed.max(Some(at));
        Ok(())
    }

    fn lock(&self) -> EngineResult<MutexGuard<'_, HashMap<CooldownKey, Slot>>> {
        self.slots
            .lock()
            .map_err(|_| EngineError::Ledger("cooldown ledger lock poisoned".into()))
    }
}

impl CooldownLedger for InMemoryCooldownLedger {
    fn last_adjusted(&self, key: &CooldownKey) -> EngineResult<Option<DateTime<Utc>>> {
        Ok(self.lock()?.get(key).and_then(Slot::latest))
    }

    fn try_reserve(
        &self,
        key: &CooldownKey,
        now: DateTime<Utc>,
        window: Duration,
    ) -> EngineResult<CooldownCheck> {
        let mut slots = self.lock()?;
        let slot = slots.entry(key.clone()).or_default();
        let check = CooldownCheck::evaluate(slot.latest(), now, window);
        if check == CooldownCheck::Clear {
            slot.reserved = Some(now);
        }
        Ok(check)
    }

    fn commit(&self, key: &CooldownKey) -> EngineResult<()> {
        if let Some(slot) = self.lock()?.get_mut(key) {
            slot.committed = slot.committed.max(slot.reserved.take());
        }
        Ok(())
    }

    fn release(&self, key: &CooldownKey) -> EngineResult<()> {
        let mut slots = self.lock()?;
        let emptied = match slots.get_mut(key) {
            Some(slot) => {
                slot.reserved = None;
                slot.committed.is_none()
            }
            None => false,
        };
        if emptied {
            slots.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::thread;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn remaining_days_round_up() {
        let later = at(3) + Duration::hours(1);
        let check = CooldownCheck::evaluate(Some(at(1)), later, Duration::days(7));
        assert_eq!(
            check,
            CooldownCheck::Active {
                last: at(1),
                remaining_days: 5
            }
        );
        assert_eq!(
            CooldownCheck::evaluate(Some(at(1)), at(8), Duration::days(7)),
            CooldownCheck::Clear
        );
    }

    #[test]
    fn reservation_blocks_second_caller() {
        let ledger = InMemoryCooldownLedger::new();
        let key = CooldownKey::placement("camp-1", PlacementType::TopOfSearch);
        let week = Duration::days(7);
        assert_eq!(ledger.try_reserve(&key, at(1), week).unwrap(), CooldownCheck::Clear);
        assert!(matches!(
            ledger.try_reserve(&key, at(2), week).unwrap(),
            CooldownCheck::Active { remaining_days: 6, .. }
        ));
        assert_eq!(ledger.last_adjusted(&key).unwrap(), Some(at(1)));
    }

    #[test]
    fn released_reservation_leaves_no_trace() {
        let ledger = InMemoryCooldownLedger::new();
        let key = CooldownKey::placement("camp-1", PlacementType::TopOfSearch);
        ledger.try_reserve(&key, at(1), Duration::days(7)).unwrap();
        ledger.release(&key).unwrap();
        assert_eq!(ledger.last_adjusted(&key).unwrap(), None);
        assert_eq!(
            ledger.try_reserve(&key, at(2), Duration::days(7)).unwrap(),
            CooldownCheck::Clear
        );
    }

    #[test]
    fn release_falls_back_to_committed_history() {
        let ledger = InMemoryCooldownLedger::new();
        let key = CooldownKey::placement("camp-1", PlacementType::ProductPage);
        ledger.record(key.clone(), at(1)).unwrap();
        ledger.try_reserve(&key, at(9), Duration::days(7)).unwrap();
        ledger.release(&key).unwrap();
        assert_eq!(ledger.last_adjusted(&key).unwrap(), Some(at(1)));

        ledger.try_reserve(&key, at(10), Duration::days(7)).unwrap();
        ledger.commit_all(std::slice::from_ref(&key)).unwrap();
        ledger.release(&key).unwrap();
        assert_eq!(ledger.last_adjusted(&key).unwrap(), Some(at(10)));
    }

    #[test]
    fn history_seeds_committed_records() {
        let key = CooldownKey::placement("camp-1", PlacementType::ProductPage);
        let history = [(key.clone(), at(5)), (key.clone(), at(2))];
        let ledger = InMemoryCooldownLedger::from_history(history).unwrap();
        assert_eq!(ledger.last_adjusted(&key).unwrap(), Some(at(5)));
        assert!(matches!(
            ledger.try_reserve(&key, at(8), Duration::days(7)).unwrap(),
            CooldownCheck::Active { remaining_days: 4, .. }
        ));
    }

    #[test]
    fn concurrent_reserve_has_one_winner() {
        let ledger = Arc::new(InMemoryCooldownLedger::new());
        let key = CooldownKey::placement("camp-9", PlacementType::RestOfSearch);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                let key = key.clone();
                thread::spawn(move || {
                    ledger
                        .try_reserve(&key, at(1), Duration::days(7))
                        .unwrap()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|c| *c == CooldownCheck::Clear)
            .count();
        assert_eq!(winners, 1);
    }
}
