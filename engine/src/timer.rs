//! Cancelable timers that report back through the record's completion queue.

use crate::lifecycle::Completion;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What a timer was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    Discard,
    ReadTimeout,
    Subscribe,
}

/// A live timer. Dropping the handle cancels it.
#[derive(Debug)]
pub(crate) struct TimerHandle {
    id: u64,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Clear `slot` if it holds the timer with `id`. Returns whether it did.
pub(crate) fn take_if_current(slot: &mut Option<TimerHandle>, id: u64) -> bool {
    if slot.as_ref().is_some_and(|timer| timer.id() == id) {
        *slot = None;
        true
    } else {
        false
    }
}

/// Spawns timers for one record.
///
/// Every timer gets a fresh id. A firing is only honored by its owner if the
/// id still matches the handle it holds, so a firing that was already queued
/// when its timer got canceled is ignored.
#[derive(Debug)]
pub(crate) struct Timers {
    next_id: u64,
    completions: mpsc::UnboundedSender<Completion>,
}

impl Timers {
    pub(crate) fn new(completions: mpsc::UnboundedSender<Completion>) -> Self {
        Self {
            next_id: 0,
            completions,
        }
    }

    /// Start a timer. Must be called from within a Tokio runtime.
    pub(crate) fn start(&mut self, kind: TimerKind, delay: Duration) -> TimerHandle {
        self.next_id += 1;
        let id = self.next_id;
        let completions = self.completions.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = completions.send(Completion::TimerFired { kind, id });
        });

        TimerHandle { id, task }
    }
}
