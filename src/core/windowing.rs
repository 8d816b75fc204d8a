//! Fixed-cadence scheduling against event time.
//!
//! The monitor runs two cadences: the idle check (every few seconds) and the
//! window tick (once per window). Both are driven by [`IntervalGate`], which
//! is advanced by whatever clock the caller uses. Live runs pass wall-clock
//! time, replays pass event timestamps, so the same code produces the same
//! windows in both cases.

use chrono::{DateTime, Duration, Utc};

/// After a long stall (suspend, paused replay) a bounded gate replays at most
/// this many overdue ticks before realigning to the current time.
pub const MAX_CATCH_UP_TICKS: usize = 3;

/// A repeating deadline.
#[derive(Debug, Clone)]
pub struct IntervalGate {
    interval: Duration,
    next_due: Option<DateTime<Utc>>,
    /// `None` replays every overdue tick
    max_catch_up: Option<usize>,
}

impl IntervalGate {
    /// Create a gate with the given period that replays at most
    /// [`MAX_CATCH_UP_TICKS`] overdue ticks. Non-positive periods are clamped
    /// to one millisecond.
    pub fn new(interval: Duration) -> Self {
        let interval = if interval <= Duration::zero() {
            Duration::milliseconds(1)
        } else {
            interval
        };
        Self {
            interval,
            next_due: None,
            max_catch_up: Some(MAX_CATCH_UP_TICKS),
        }
    }

    /// A gate that replays every overdue tick. Suited to cheap checks whose
    /// outcome depends on exactly when they run.
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            max_catch_up: None,
            ..Self::new(interval)
        }
    }

    /// Start the cadence: the first tick is due one interval after `now`.
    /// A deadline past the representable range leaves the gate unstarted.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.next_due = now.checked_add_signed(self.interval);
    }

    pub fn is_started(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.next_due
    }

    /// Time left until the next tick, zero if one is already due.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.next_due.map(|due| (due - now).max(Duration::zero()))
    }

    /// Every tick due at or before `now`, oldest first.
    ///
    /// A gate that has not been started starts at `now` and yields nothing.
    /// When a bounded gate has more ticks overdue than its limit, only the
    /// most recent ones are yielded and the cadence restarts from `now`.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let Some(mut due) = self.next_due else {
            self.start(now);
            return Vec::new();
        };

        let mut ticks = Vec::new();
        let mut next = Some(due);
        while due <= now {
            ticks.push(due);
            next = due.checked_add_signed(self.interval);
            match next {
                Some(n) => due = n,
                None => break,
            }
        }

        if let Some(limit) = self.max_catch_up {
            if ticks.len() > limit {
                ticks.drain(..ticks.len() - limit);
                next = now.checked_add_signed(self.interval);
            }
        }

        self.next_due = next;
        ticks
    }

    /// Stop the cadence until the next `start` or `due`.
    pub fn reset(&mut self) {
        self.next_due = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn test_first_call_starts_gate() {
        let mut gate = IntervalGate::new(Duration::seconds(60));
        assert!(!gate.is_started());
        assert!(gate.due(t(0)).is_empty());
        assert_eq!(gate.next_due(), Some(t(60)));
    }

    #[test]
    fn test_ticks_fire_on_schedule() {
        let mut gate = IntervalGate::new(Duration::seconds(60));
        gate.start(t(0));

        assert!(gate.due(t(59)).is_empty());
        assert_eq!(gate.due(t(60)), vec![t(60)]);
        assert!(gate.due(t(61)).is_empty());
        assert_eq!(gate.due(t(185)), vec![t(120), t(180)]);
        assert_eq!(gate.next_due(), Some(t(240)));
        assert_eq!(gate.remaining(t(230)), Some(Duration::seconds(10)));
    }

    #[test]
    fn test_long_stall_realigns() {
        let mut gate = IntervalGate::new(Duration::seconds(5));
        gate.start(t(0));

        let ticks = gate.due(t(3_600));
        assert_eq!(ticks.len(), MAX_CATCH_UP_TICKS);
        assert_eq!(ticks.last().copied(), Some(t(3_600)));
        assert_eq!(gate.next_due(), Some(t(3_605)));
    }

    #[test]
    fn test_unbounded_replays_everything() {
        let mut gate = IntervalGate::unbounded(Duration::seconds(5));
        gate.start(t(0));

        let ticks = gate.due(t(200));
        assert_eq!(ticks.len(), 40);
        assert_eq!(ticks[0], t(5));
        assert_eq!(gate.next_due(), Some(t(205)));
    }

    #[test]
    fn test_deadline_out_of_range_stays_unstarted() {
        let mut gate = IntervalGate::new(Duration::days(1));
        gate.start(DateTime::<Utc>::MAX_UTC);
        assert!(!gate.is_started());
        assert!(gate.due(DateTime::<Utc>::MAX_UTC).is_empty());
    }

    #[test]
    fn test_reset() {
        let mut gate = IntervalGate::new(Duration::zero());
        assert_eq!(gate.interval(), Duration::milliseconds(1));
        gate.start(t(0));
        gate.reset();
        assert!(gate.remaining(t(0)).is_none());
    }
}
