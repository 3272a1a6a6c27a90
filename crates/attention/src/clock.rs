//! Attentive / distracted time accounting
//!
//! Every processed frame closes the interval that started at the previous
//! frame (or at `start`) and charges it to that frame's resolved status.

use std::time::{Duration, Instant};

use crate::state::AttentionStatus;

/// Accumulated session time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockTotals {
    pub attentive: Duration,
    pub distracted: Duration,
}

impl ClockTotals {
    /// Whole seconds, truncated
    pub fn attentive_secs(&self) -> i64 {
        self.attentive.as_secs() as i64
    }

    pub fn distracted_secs(&self) -> i64 {
        self.distracted.as_secs() as i64
    }

    pub fn total(&self) -> Duration {
        self.attentive + self.distracted
    }
}

/// Interval time accountant
#[derive(Debug, Clone, Default)]
pub struct AttentionClock {
    interval_start: Option<Instant>,
    last_bucket: Option<AttentionStatus>,
    totals: ClockTotals,
}

impl AttentionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an interval at `now`; totals are kept
    pub fn start(&mut self, now: Instant) {
        self.interval_start = Some(now);
    }

    pub fn is_running(&self) -> bool {
        self.interval_start.is_some()
    }

    /// Charge the time since the interval start to `bucket` and restart the interval
    pub fn tick(&mut self, now: Instant, bucket: AttentionStatus) {
        let Some(start) = self.interval_start else {
            return;
        };
        self.charge(now.saturating_duration_since(start), bucket);
        self.last_bucket = Some(bucket);
        self.interval_start = Some(now);
    }

    /// Flush the open interval into the last ticked bucket and close it
    pub fn stop(&mut self, now: Instant) -> ClockTotals {
        if let (Some(start), Some(bucket)) = (self.interval_start, self.last_bucket) {
            self.charge(now.saturating_duration_since(start), bucket);
        }
        self.interval_start = None;
        self.totals
    }

    pub fn totals(&self) -> ClockTotals {
        self.totals
    }

    /// Zero the totals and forget the interval
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn charge(&mut self, elapsed: Duration, bucket: AttentionStatus) {
        match bucket {
            AttentionStatus::Attentive => self.totals.attentive += elapsed,
            AttentionStatus::Distracted => self.totals.distracted += elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tick_charges_gap() {
        let t0 = Instant::now();
        let mut clock = AttentionClock::new();
        clock.start(t0);
        clock.tick(t0 + Duration::from_secs(5), AttentionStatus::Attentive);

        let totals = clock.totals();
        assert_eq!(totals.attentive, Duration::from_secs(5));
        assert_eq!(totals.distracted, Duration::ZERO);
    }

    #[test]
    fn test_tick_without_start_is_ignored() {
        let mut clock = AttentionClock::new();
        clock.tick(Instant::now(), AttentionStatus::Distracted);
        assert_eq!(clock.totals(), ClockTotals::default());
    }

    #[test]
    fn test_stop_without_ticks_records_nothing() {
        let t0 = Instant::now();
        let mut clock = AttentionClock::new();
        clock.start(t0);
        let totals = clock.stop(t0 + Duration::from_secs(3));
        assert_eq!(totals, ClockTotals::default());
        assert!(!clock.is_running());
    }

    #[test]
    fn test_stop_flushes_to_last_bucket() {
        let t0 = Instant::now();
        let mut clock = AttentionClock::new();
        clock.start(t0);
        clock.tick(t0 + Duration::from_secs(1), AttentionStatus::Attentive);
        clock.tick(t0 + Duration::from_secs(3), AttentionStatus::Distracted);
        let totals = clock.stop(t0 + Duration::from_secs(4));
        assert_eq!(totals.attentive, Duration::from_secs(1));
        assert_eq!(totals.distracted, Duration::from_secs(3));
    }

    #[test]
    fn test_restart_after_stop_skips_idle_time() {
        let t0 = Instant::now();
        let mut clock = AttentionClock::new();
        clock.start(t0);
        clock.tick(t0 + Duration::from_secs(2), AttentionStatus::Attentive);
        clock.stop(t0 + Duration::from_secs(2));

        // ticks while stopped are ignored
        clock.tick(t0 + Duration::from_secs(50), AttentionStatus::Distracted);
        clock.start(t0 + Duration::from_secs(60));
        clock.tick(t0 + Duration::from_secs(61), AttentionStatus::Attentive);

        assert_eq!(clock.totals().attentive, Duration::from_secs(3));
        assert_eq!(clock.totals().distracted, Duration::ZERO);
    }

    #[test]
    fn test_whole_seconds_truncate() {
        let totals = ClockTotals {
            attentive: Duration::from_millis(120_900),
            distracted: Duration::from_millis(999),
        };
        assert_eq!(totals.attentive_secs(), 120);
        assert_eq!(totals.distracted_secs(), 0);
    }

    proptest! {
        #[test]
        fn prop_totals_never_decrease_and_sum_to_elapsed(
            steps in prop::collection::vec((0u64..500, any::<bool>()), 1..50)
        ) {
            let t0 = Instant::now();
            let mut clock = AttentionClock::new();
            clock.start(t0);

            let mut now = t0;
            let mut previous = clock.totals();
            for (gap_ms, attentive) in steps {
                now += Duration::from_millis(gap_ms);
                let bucket = if attentive { AttentionStatus::Attentive } else { AttentionStatus::Distracted };
                clock.tick(now, bucket);
                let current = clock.totals();
                prop_assert!(current.attentive >= previous.attentive);
                prop_assert!(current.distracted >= previous.distracted);
                previous = current;
            }
            prop_assert_eq!(clock.stop(now).total(), now - t0);
        }
    }
}
