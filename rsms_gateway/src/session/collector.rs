// session/collector.rs: collection interval and alarm window bookkeeping
//
// Pure state machine: the caller supplies the clock, the built sample, the
// alarm evaluation and the login state; the collector says what to do.

use crate::telemetry::RetentionRing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectPolicy {
    pub initial_interval: u64,
    pub relaxed_interval: u64,
    pub alarm_window: u64,
    pub retention: usize,
}

impl Default for CollectPolicy {
    fn default() -> Self {
        Self {
            initial_interval: 1,
            relaxed_interval: 10,
            alarm_window: 30,
            retention: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Publish as a realtime report now.
    Send,
    /// Not logged in: straight to the reissue queue.
    Enqueue,
    /// Interval has not elapsed.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    /// Ring contents to append to the reissue queue before anything else.
    pub backfill: Vec<Vec<u8>>,
    pub dispatch: Dispatch,
}

#[derive(Debug)]
pub struct Collector {
    policy: CollectPolicy,
    ring: RetentionRing,
    interval: u64,
    alarm_start: Option<u64>,
    last_collect: Option<u64>,
}

impl Collector {
    pub fn new(policy: CollectPolicy) -> Self {
        Self {
            policy,
            ring: RetentionRing::new(policy.retention),
            interval: policy.initial_interval,
            alarm_start: None,
            last_collect: None,
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn in_alarm_window(&self) -> bool {
        self.alarm_start.is_some()
    }

    pub fn ring(&self) -> &RetentionRing {
        &self.ring
    }

    /// One collection tick at `now` (seconds on a monotonic clock).
    pub fn tick(
        &mut self,
        now: u64,
        sample: &[u8],
        max_alarm: bool,
        logged_in: bool,
    ) -> TickOutcome {
        // rising edge: history as it stood before this sample
        let backfill = if max_alarm && self.alarm_start.is_none() {
            self.alarm_start = Some(now);
            self.interval = self.policy.initial_interval;
            self.ring.to_vec()
        } else {
            Vec::new()
        };

        self.ring.push(sample.to_vec());

        if let Some(start) = self.alarm_start {
            if now.saturating_sub(start) <= self.policy.alarm_window {
                self.interval = self.policy.initial_interval;
            } else if !max_alarm {
                self.alarm_start = None;
                self.interval = self.policy.relaxed_interval;
            }
        }

        let due = match self.last_collect {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.interval,
        };
        let dispatch = if !due {
            Dispatch::Skip
        } else {
            self.last_collect = Some(now);
            if logged_in { Dispatch::Send } else { Dispatch::Enqueue }
        };

        TickOutcome { backfill, dispatch }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector(retention: usize) -> Collector {
        Collector::new(CollectPolicy {
            retention,
            ..CollectPolicy::default()
        })
    }

    #[test]
    fn first_tick_is_due() {
        let mut c = collector(30);
        let out = c.tick(0, &[1], false, true);
        assert!(out.backfill.is_empty());
        assert_eq!(out.dispatch, Dispatch::Send);
        assert_eq!(c.tick(0, &[2], false, false).dispatch, Dispatch::Skip);
        assert_eq!(c.tick(1, &[3], false, false).dispatch, Dispatch::Enqueue);
    }

    #[test]
    fn rising_edge_backfills_prior_samples_only() {
        let mut c = collector(30);
        for (t, label) in [(0, 1u8), (1, 2), (2, 3)] {
            c.tick(t, &[label], false, true);
        }
        let out = c.tick(3, &[4], true, true);
        assert_eq!(out.backfill, vec![vec![1], vec![2], vec![3]]);
        assert_eq!(out.dispatch, Dispatch::Send);
        assert!(c.in_alarm_window());

        // still level 3: no second backfill
        assert!(c.tick(4, &[5], true, true).backfill.is_empty());
    }

    #[test]
    fn backfill_is_bounded_by_ring() {
        let mut c = collector(3);
        for t in 0..5u64 {
            c.tick(t, &[t as u8], false, true);
        }
        let out = c.tick(5, &[5], true, false);
        assert_eq!(out.backfill, vec![vec![2], vec![3], vec![4]]);
    }

    #[test]
    fn window_holds_then_relaxes() {
        let mut c = collector(30);
        c.tick(100, &[0], true, true);
        c.tick(129, &[0], true, true);
        assert_eq!(c.interval(), 1);
        assert!(c.in_alarm_window());

        c.tick(131, &[0], false, true);
        assert_eq!(c.interval(), 10);
        assert!(!c.in_alarm_window());
    }

    #[test]
    fn persisting_alarm_keeps_window_open() {
        let mut c = collector(30);
        c.tick(0, &[0], true, true);
        c.tick(45, &[0], true, true);
        assert!(c.in_alarm_window());
        assert_eq!(c.interval(), 1);
    }

    #[test]
    fn relaxed_interval_gates_dispatch() {
        let mut c = collector(30);
        c.tick(0, &[0], true, true);
        c.tick(31, &[0], false, true);
        assert_eq!(c.interval(), 10);
        assert_eq!(c.tick(35, &[0], false, true).dispatch, Dispatch::Skip);
        assert_eq!(c.tick(41, &[0], false, true).dispatch, Dispatch::Send);
        // ring still sees every tick
        assert_eq!(c.ring().len(), 4);
    }

    #[test]
    fn new_alarm_after_relaxing_tightens_again() {
        let mut c = collector(30);
        c.tick(0, &[0], true, true);
        c.tick(31, &[0], false, true);
        let out = c.tick(32, &[9], true, true);
        assert_eq!(out.backfill.len(), 2);
        assert_eq!(c.interval(), 1);
        assert_eq!(out.dispatch, Dispatch::Send);
    }
}
