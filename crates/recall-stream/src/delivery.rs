use std::time::Duration;

use tokio::time::Instant;

/// Default coalescing window, roughly one display frame.
pub const DEFAULT_COALESCE_INTERVAL: Duration = Duration::from_millis(16);

/// Coalesces answer updates into at most one push per interval.
///
/// The scheduler only tracks *when* a push is due; the caller reads the
/// current accumulated answer at push time, so bursts of tokens cost one
/// render instead of one per token.
#[derive(Debug)]
pub struct DeliveryScheduler {
    interval: Duration,
    deadline: Option<Instant>,
}

impl DeliveryScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Records an answer change observed at `now`.
    ///
    /// Arms a deadline one interval out unless one is already pending.
    pub fn notify(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.interval);
        }
    }

    /// Pending push deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true (and disarms) when the pending push is due at `now`.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Disarms any pending deadline ahead of a synchronous final push.
    ///
    /// Returns whether a push was still pending.
    pub fn flush(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// Drops a pending push without delivering it.
    pub fn discard(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }
}

impl Default for DeliveryScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_COALESCE_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_within_one_window_yields_one_push() {
        let mut scheduler = DeliveryScheduler::default();
        let t0 = Instant::now();
        let mut pushes = 0;
        for i in 0..100u64 {
            let now = t0 + Duration::from_micros(i * 100);
            scheduler.notify(now);
            if scheduler.take_due(now) {
                pushes += 1;
            }
        }
        assert_eq!(pushes, 0);
        assert_eq!(scheduler.deadline(), Some(t0 + DEFAULT_COALESCE_INTERVAL));
        assert!(scheduler.take_due(t0 + DEFAULT_COALESCE_INTERVAL));
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn next_change_after_push_arms_a_new_window() {
        let mut scheduler = DeliveryScheduler::new(Duration::from_millis(10));
        let t0 = Instant::now();
        scheduler.notify(t0);
        assert!(!scheduler.take_due(t0 + Duration::from_millis(9)));
        assert!(scheduler.take_due(t0 + Duration::from_millis(10)));
        assert!(!scheduler.take_due(t0 + Duration::from_millis(20)));

        let t1 = t0 + Duration::from_millis(25);
        scheduler.notify(t1);
        assert_eq!(scheduler.deadline(), Some(t1 + Duration::from_millis(10)));
    }

    #[test]
    fn flush_and_discard_leave_no_pending_deadline() {
        let mut scheduler = DeliveryScheduler::default();
        scheduler.notify(Instant::now());
        assert!(scheduler.flush());
        assert!(scheduler.deadline().is_none());
        assert!(!scheduler.flush());
        scheduler.notify(Instant::now());
        scheduler.discard();
        assert!(!scheduler.is_pending());
    }
}
