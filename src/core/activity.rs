//! Active/idle time accounting.
//!
//! Turns irregular "activity happened at T" signals into a continuous
//! timeline on a [`DayStats`]. Two independent triggers drive the
//! {Active, Idle} state machine: activity arrival ([`TimeAccountant::mark_activity`])
//! and a periodic check ([`TimeAccountant::check_idle`]). Both advance the same
//! tick, so the interval around a transition is credited exactly once:
//!
//! ```text
//!   last tick ──── active ────▶ idle check ──── idle ────▶ activity
//!                               (tick moves here)         (span closed, tick moves here)
//! ```

use crate::collector::types::FileKey;
use crate::store::day::{DayStats, IdleEvent};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Default idle threshold in milliseconds.
pub const DEFAULT_IDLE_MS: u64 = 60_000;

/// Result of recording activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityOutcome {
    /// Milliseconds credited to active time
    pub active_ms: u64,
    /// Duration of the idle span closed by this activity, if it ended one
    pub resumed_after_ms: Option<u64>,
}

/// Tracks the accounting cursor between calls.
#[derive(Debug, Clone, Default)]
pub struct TimeAccountant {
    /// Time up to which the timeline has been credited
    last_tick: Option<DateTime<Utc>>,
    /// File that receives per-file attribution when none is given
    current_file: Option<FileKey>,
}

impl TimeAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_file(&self) -> Option<&str> {
        self.current_file.as_deref()
    }

    /// Change the file that activity is attributed to by default.
    pub fn set_current_file(&mut self, file: Option<FileKey>) {
        self.current_file = file;
    }

    /// Record activity at `now`, optionally in `file`.
    ///
    /// Closes an open idle span first, then credits the time since the last
    /// tick to active time (and to the file, when one is known).
    pub fn mark_activity(
        &mut self,
        day: &mut DayStats,
        now: DateTime<Utc>,
        file: Option<&str>,
    ) -> ActivityOutcome {
        if let Some(file) = file {
            if self.current_file.as_deref() != Some(file) {
                self.current_file = Some(file.to_string());
            }
        }

        let mut resumed_after_ms = None;
        if day.currently_idle {
            let duration_ms = day.close_idle_span(now).unwrap_or(0);
            day.currently_idle = false;
            day.idle_events.push(IdleEvent::resume(now, duration_ms));
            // The idle span already covers everything up to now.
            self.last_tick = Some(now);
            resumed_after_ms = Some(duration_ms);
            debug!(duration_ms, "Resumed after idle");
        }

        let active_ms = self.credit_active(day, now);
        if day.last_activity_at.map_or(true, |last| now > last) {
            day.last_activity_at = Some(now);
        }

        ActivityOutcome {
            active_ms,
            resumed_after_ms,
        }
    }

    /// Periodic idle check. Returns `true` when this call moved the day into
    /// the idle state.
    pub fn check_idle(&mut self, day: &mut DayStats, now: DateTime<Utc>, idle_threshold_ms: u64) -> bool {
        if day.currently_idle {
            return false;
        }

        let Some(last_activity) = day.last_activity_at else {
            return false;
        };

        let quiet_ms = (now - last_activity).num_milliseconds();
        if quiet_ms < 0 || (quiet_ms as u64) < idle_threshold_ms {
            return false;
        }

        // The quiet stretch before the threshold was crossed counts as active,
        // exactly like any shorter pause would.
        self.credit_active(day, now);
        day.open_idle_span_at(now);
        debug!(quiet_ms, "Entered idle");
        true
    }

    /// Carry state across a day boundary at `now`: an open idle span in the
    /// old day is closed there and reopened in the new day.
    pub fn roll_over(&mut self, old: &mut DayStats, new: &mut DayStats, now: DateTime<Utc>) {
        if old.currently_idle {
            old.close_idle_span(now);
            new.open_idle_span_at(now);
        } else {
            self.credit_active(old, now);
        }
        self.last_tick = Some(now);
    }

    /// Credit `now - last_tick` (bounded below by the day start) as active
    /// time and advance the tick. The first tick of a run credits nothing.
    fn credit_active(&mut self, day: &mut DayStats, now: DateTime<Utc>) -> u64 {
        let delta_ms = match self.last_tick {
            Some(last) => {
                let from = last.max(day.started_at);
                (now - from).num_milliseconds().max(0) as u64
            }
            None => 0,
        };

        if delta_ms > 0 {
            day.active_ms += delta_ms;
            if let Some(file) = self.current_file.as_deref() {
                day.attribute_file(file, delta_ms, 0);
            }
        }

        if self.last_tick.map_or(true, |last| now > last) {
            self.last_tick = Some(now);
        }
        delta_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::day::IdleEventKind;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    fn day() -> DayStats {
        DayStats::new("2024-01-15", t(0))
    }

    #[test]
    fn test_idle_scenario() {
        let mut day = day();
        let mut acc = TimeAccountant::new();

        acc.mark_activity(&mut day, t(0), Some("main.rs"));
        assert!(!acc.check_idle(&mut day, t(59_000), 60_000));
        assert!(acc.check_idle(&mut day, t(65_000), 60_000));
        assert!(day.currently_idle);

        let open = day.open_idle_span().copied().unwrap();
        assert_eq!(open.kind, IdleEventKind::Idle);
        assert_eq!(open.at, t(65_000));
        assert_eq!(open.duration_ms, None);

        // Already idle: a second check changes nothing.
        assert!(!acc.check_idle(&mut day, t(68_000), 60_000));
        assert_eq!(day.idle_events.len(), 1);

        let outcome = acc.mark_activity(&mut day, t(70_000), Some("main.rs"));
        assert_eq!(outcome.resumed_after_ms, Some(5_000));
        assert_eq!(outcome.active_ms, 0);
        assert_eq!(day.idle_events[0].duration_ms, Some(5_000));
        assert_eq!(day.idle_events[1].kind, IdleEventKind::Resume);
        assert_eq!(day.idle_ms, 5_000);
        assert_eq!(day.active_ms, 65_000);
        assert_eq!(day.accounted_ms(), 70_000);
        assert!(!day.currently_idle);
    }

    #[test]
    fn test_active_time_per_file() {
        let mut day = day();
        let mut acc = TimeAccountant::new();

        acc.mark_activity(&mut day, t(0), Some("a.rs"));
        acc.mark_activity(&mut day, t(1_000), Some("a.rs"));
        acc.mark_activity(&mut day, t(3_000), Some("b.rs"));
        acc.mark_activity(&mut day, t(3_500), None);

        assert_eq!(day.active_ms, 3_500);
        assert_eq!(day.per_file["a.rs"].active_ms, 1_000);
        assert_eq!(day.per_file["b.rs"].active_ms, 2_500);
        assert_eq!(day.file_active_ms(), day.active_ms);
    }

    #[test]
    fn test_activity_without_file_skips_attribution() {
        let mut day = day();
        let mut acc = TimeAccountant::new();

        acc.mark_activity(&mut day, t(0), None);
        acc.mark_activity(&mut day, t(2_000), None);

        assert_eq!(day.active_ms, 2_000);
        assert!(day.per_file.is_empty());
    }

    #[test]
    fn test_first_tick_credits_nothing() {
        let mut day = day();
        let mut acc = TimeAccountant::new();

        let outcome = acc.mark_activity(&mut day, t(30_000), Some("a.rs"));
        assert_eq!(outcome.active_ms, 0);
        assert_eq!(day.last_activity_at, Some(t(30_000)));
    }

    #[test]
    fn test_restart_resumes_without_duplicating() {
        let mut day = day();
        let mut acc = TimeAccountant::new();
        acc.mark_activity(&mut day, t(0), None);
        acc.mark_activity(&mut day, t(10_000), None);
        assert_eq!(day.active_ms, 10_000);

        // A new accountant (restart) on the same persisted day.
        let mut acc = TimeAccountant::new();
        acc.mark_activity(&mut day, t(500_000), None);
        assert_eq!(day.active_ms, 10_000);
        acc.mark_activity(&mut day, t(501_000), None);
        assert_eq!(day.active_ms, 11_000);
    }

    #[test]
    fn test_out_of_order_timestamps_credit_nothing() {
        let mut day = day();
        let mut acc = TimeAccountant::new();
        acc.mark_activity(&mut day, t(5_000), None);
        acc.mark_activity(&mut day, t(4_000), None);
        assert_eq!(day.active_ms, 0);
        assert_eq!(day.last_activity_at, Some(t(5_000)));
    }

    #[test]
    fn test_check_idle_without_activity() {
        let mut day = day();
        let mut acc = TimeAccountant::new();
        assert!(!acc.check_idle(&mut day, t(600_000), 60_000));
        assert!(!day.currently_idle);
    }

    #[test]
    fn test_roll_over_while_idle() {
        let mut old = day();
        let mut acc = TimeAccountant::new();
        acc.mark_activity(&mut old, t(0), None);
        acc.check_idle(&mut old, t(60_000), 60_000);

        let midnight = t(120_000);
        let mut new = DayStats::new("2024-01-16", midnight);
        acc.roll_over(&mut old, &mut new, midnight);

        assert!(!old.currently_idle);
        assert_eq!(old.idle_ms, 60_000);
        assert!(new.currently_idle);

        acc.mark_activity(&mut new, t(130_000), None);
        assert_eq!(new.idle_ms, 10_000);
        assert_eq!(new.active_ms, 0);
        assert!(new.accounted_ms() <= 10_000);
    }

    fn interleaving() -> impl Strategy<Value = Vec<(i64, bool, Option<&'static str>)>> {
        let file = prop_oneof![Just(None), Just(Some("a.rs")), Just(Some("b.rs"))];
        prop::collection::vec((0i64..90_000, any::<bool>(), file), 1..200)
    }

    proptest! {
        #[test]
        fn test_accounting_never_exceeds_wall_time(steps in interleaving()) {
            let mut day = day();
            let mut acc = TimeAccountant::new();

            let mut now = 0i64;
            for (gap, activity, file) in steps {
                now += gap;
                if activity {
                    acc.mark_activity(&mut day, t(now), file);
                } else {
                    acc.check_idle(&mut day, t(now), 60_000);
                }

                prop_assert!(day.accounted_ms() <= now as u64);
                prop_assert!(day.file_active_ms() <= day.active_ms);
                prop_assert!(day.idle_events.iter().filter(|e| e.is_open()).count() <= 1);
            }
        }
    }
}
