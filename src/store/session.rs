//! Day-keyed session store.
//!
//! Holds the in-memory [`DayStats`] for the days touched by this run on top of
//! an injected [`DayRepository`]. There are no timers here: the monitor flushes
//! at window boundaries and on stop. Every mutation is a synchronous
//! read-modify-write of one day object.

use crate::store::day::{DayStats, ScoreSample};
use crate::store::repository::{validate_day_key, DayRepository, StoreError};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub struct SessionStore {
    repository: Box<dyn DayRepository>,
    timezone: Tz,
    days: BTreeMap<String, DayStats>,
}

impl SessionStore {
    pub fn new(repository: Box<dyn DayRepository>, timezone: Tz) -> Self {
        Self {
            repository,
            timezone,
            days: BTreeMap::new(),
        }
    }

    /// The ISO date key for `now` in the store's time zone.
    pub fn day_key(&self, now: DateTime<Utc>) -> String {
        now.with_timezone(&self.timezone)
            .format("%Y-%m-%d")
            .to_string()
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// The day record for `day`: from memory, else from the repository, else
    /// freshly zeroed with `started_at = now`.
    pub fn get_or_create(&mut self, day: &str, now: DateTime<Utc>) -> &mut DayStats {
        let repository = &self.repository;
        self.days.entry(day.to_string()).or_insert_with(|| {
            match repository.get(day) {
                Ok(Some(stats)) => {
                    debug!(day, "Resuming stored day");
                    stats
                }
                Ok(None) => DayStats::new(day, now),
                Err(e) => {
                    warn!(day, "Could not load stored day, starting fresh: {e}");
                    DayStats::new(day, now)
                }
            }
        })
    }

    /// The record for the day containing `now`.
    pub fn today(&mut self, now: DateTime<Utc>) -> &mut DayStats {
        let key = self.day_key(now);
        self.get_or_create(&key, now)
    }

    /// A day already loaded by this store.
    pub fn get(&self, day: &str) -> Option<&DayStats> {
        self.days.get(day)
    }

    /// Read a day from memory or the repository without creating it.
    pub fn load(&self, day: &str) -> Result<Option<DayStats>, StoreError> {
        match self.days.get(day) {
            Some(stats) => Ok(Some(stats.clone())),
            None => self.repository.get(day),
        }
    }

    /// Append a scored window to a day's history.
    pub fn append(&mut self, day: &str, sample: ScoreSample, now: DateTime<Utc>) {
        self.get_or_create(day, now).append_score(sample);
    }

    /// Credit active time and keystrokes to a file within a day.
    pub fn attribute_file(
        &mut self,
        day: &str,
        key: &str,
        delta_active_ms: u64,
        delta_keystrokes: u64,
        now: DateTime<Utc>,
    ) {
        self.get_or_create(day, now)
            .attribute_file(key, delta_active_ms, delta_keystrokes);
    }

    /// Hand the records of two days to `f` at once, for carrying state across
    /// midnight. Both are created if needed.
    pub fn roll_over(
        &mut self,
        from: &str,
        to: &str,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut DayStats, &mut DayStats),
    ) {
        if from == to {
            return;
        }
        self.get_or_create(from, now);
        let Some(mut old) = self.days.remove(from) else {
            return;
        };
        f(&mut old, self.get_or_create(to, now));
        self.days.insert(from.to_string(), old);
    }

    /// Wipe a day, in memory and in the repository, and start it over at
    /// `now`. Callers confirm with the user before getting here.
    pub fn reset(&mut self, day: &str, now: DateTime<Utc>) -> Result<&mut DayStats, StoreError> {
        validate_day_key(day)?;
        self.repository.remove(day)?;
        self.days.insert(day.to_string(), DayStats::new(day, now));
        Ok(self.get_or_create(day, now))
    }

    /// Persist every loaded day. Only the most recent day stays in memory;
    /// older ones are history from here on.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        for stats in self.days.values() {
            self.repository.put(stats)?;
        }

        if let Some(latest) = self.days.keys().next_back().cloned() {
            self.days.retain(|day, _| *day == latest);
        }
        Ok(())
    }

    /// Keys of every persisted day plus any not yet flushed.
    pub fn days(&self) -> Result<Vec<String>, StoreError> {
        let mut days = self.repository.days()?;
        for day in self.days.keys() {
            if !days.contains(day) {
                days.push(day.clone());
            }
        }
        days.sort();
        Ok(days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::repository::MemoryDayRepository;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 23, 30, 0).unwrap()
    }

    fn store() -> SessionStore {
        SessionStore::new(Box::new(MemoryDayRepository::new()), Tz::UTC)
    }

    #[test]
    fn test_lazy_create() {
        let mut store = store();
        assert!(store.get("2024-01-15").is_none());

        let day = store.today(t0());
        assert_eq!(day.day, "2024-01-15");
        assert_eq!(day.started_at, t0());
        assert_eq!(day.keystrokes, 0);

        // A second lookup returns the same object, not a fresh one.
        store.today(t0()).keystrokes = 3;
        assert_eq!(store.today(t0() + Duration::minutes(5)).keystrokes, 3);
    }

    #[test]
    fn test_day_key_uses_timezone() {
        let utc = store();
        assert_eq!(utc.day_key(t0()), "2024-01-15");

        let tokyo = SessionStore::new(Box::new(MemoryDayRepository::new()), chrono_tz::Asia::Tokyo);
        assert_eq!(tokyo.day_key(t0()), "2024-01-16");
    }

    #[test]
    fn test_append_and_attribute() {
        let mut store = store();
        store.append(
            "2024-01-15",
            ScoreSample {
                at: t0(),
                score: 2.5,
                triggered: false,
            },
            t0(),
        );
        store.attribute_file("2024-01-15", "main.rs", 1_500, 4, t0());

        let day = store.get("2024-01-15").unwrap();
        assert_eq!(day.scores.len(), 1);
        assert_eq!(day.per_file["main.rs"].active_ms, 1_500);
        assert_eq!(day.per_file["main.rs"].keystrokes, 4);
    }

    #[test]
    fn test_flush_persists_and_resumes() {
        let mut store = store();
        store.today(t0()).keystrokes = 11;
        store.today(t0() + Duration::hours(1)).keystrokes = 2; // next day
        store.flush().unwrap();

        // Only the latest day stays resident; the earlier one is history.
        assert!(store.get("2024-01-15").is_none());
        assert!(store.get("2024-01-16").is_some());

        let reloaded = store.load("2024-01-15").unwrap().unwrap();
        assert_eq!(reloaded.keystrokes, 11);
        assert_eq!(store.get_or_create("2024-01-15", Utc::now()).keystrokes, 11);
        assert_eq!(store.days().unwrap(), vec!["2024-01-15", "2024-01-16"]);
    }

    #[test]
    fn test_roll_over_hands_both_days() {
        let mut store = store();
        store.today(t0()).keystrokes = 5;
        let midnight = Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 0).unwrap();

        store.roll_over("2024-01-15", "2024-01-16", midnight, |old, new| {
            old.keystrokes += 1;
            new.keystrokes = old.keystrokes * 10;
        });

        assert_eq!(store.get("2024-01-15").unwrap().keystrokes, 6);
        let new = store.get("2024-01-16").unwrap();
        assert_eq!(new.keystrokes, 60);
        assert_eq!(new.started_at, midnight);
    }

    #[test]
    fn test_reset() {
        let mut store = store();
        store.today(t0()).keystrokes = 50;
        store.flush().unwrap();

        let later = t0() + Duration::minutes(10);
        let fresh = store.reset("2024-01-15", later).unwrap();
        assert_eq!(fresh.keystrokes, 0);
        assert_eq!(fresh.started_at, later);
        assert!(store.reset("yesterday", later).is_err());
    }
}
