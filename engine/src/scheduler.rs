//! Usage counting and the debounced discard timer.

use crate::timer::{take_if_current, TimerHandle};

/// Tracks how many consumers hold the record and the pending discard, if any.
///
/// At most one discard timer is live: arming replaces (and so cancels) the
/// previous one.
#[derive(Debug, Default)]
pub(crate) struct DiscardScheduler {
    usages: usize,
    timer: Option<TimerHandle>,
    deferred: bool,
}

impl DiscardScheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn usages(&self) -> usize {
        self.usages
    }

    /// Register a consumer. Returns `true` if a pending discard was canceled.
    pub(crate) fn acquire(&mut self) -> bool {
        self.usages += 1;
        self.deferred = false;
        self.cancel()
    }

    /// Drop a consumer and return the remaining count.
    pub(crate) fn release(&mut self) -> usize {
        self.usages = self.usages.saturating_sub(1);
        self.usages
    }

    pub(crate) fn arm(&mut self, timer: TimerHandle) {
        self.timer = Some(timer);
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Cancel the pending discard. Idempotent.
    pub(crate) fn cancel(&mut self) -> bool {
        self.timer.take().is_some()
    }

    /// Consume the timer if `id` is the one currently armed.
    pub(crate) fn take_fired(&mut self, id: u64) -> bool {
        take_if_current(&mut self.timer, id)
    }

    /// Remember a discard requested before the record was ready.
    pub(crate) fn defer(&mut self) {
        self.deferred = true;
    }

    pub(crate) fn take_deferred(&mut self) -> bool {
        std::mem::take(&mut self.deferred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::{TimerKind, Timers};
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[test]
    fn usages_never_go_negative() {
        let mut scheduler = DiscardScheduler::new();
        assert_eq!(scheduler.release(), 0);
        scheduler.acquire();
        scheduler.acquire();
        assert_eq!(scheduler.release(), 1);
        assert_eq!(scheduler.usages(), 1);
    }

    #[tokio::test]
    async fn acquire_cancels_armed_timer() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut timers = Timers::new(tx);
        let mut scheduler = DiscardScheduler::new();

        scheduler.arm(timers.start(TimerKind::Discard, Duration::from_secs(1)));
        assert!(scheduler.is_armed());
        assert!(scheduler.acquire());
        assert!(!scheduler.is_armed());
        assert!(!scheduler.cancel());
    }

    #[tokio::test]
    async fn stale_firing_is_not_taken() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut timers = Timers::new(tx);
        let mut scheduler = DiscardScheduler::new();

        let stale = timers.start(TimerKind::Discard, Duration::from_secs(1));
        let stale_id = stale.id();
        scheduler.arm(stale);
        scheduler.arm(timers.start(TimerKind::Discard, Duration::from_secs(1)));

        assert!(!scheduler.take_fired(stale_id));
        assert!(scheduler.is_armed());
    }

    #[test]
    fn deferred_discard_is_taken_once() {
        let mut scheduler = DiscardScheduler::new();
        scheduler.defer();
        assert!(scheduler.take_deferred());
        assert!(!scheduler.take_deferred());
    }
}
