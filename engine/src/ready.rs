//! Ready gate.
//!
//! Consumers that ask for the record before its first successful load are
//! queued here and released once, in registration order.

use crate::error::{Error, Result};
use std::collections::VecDeque;

/// A queued consumer waiting for readiness.
pub type ReadyWaiter = Box<dyn FnOnce(Result<()>) + Send + 'static>;

#[derive(Default)]
pub struct ReadyGate {
    open: bool,
    waiters: VecDeque<ReadyWaiter>,
}

impl ReadyGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Queue `waiter`, or run it right away if the gate is already open.
    pub fn register(&mut self, waiter: ReadyWaiter) {
        if self.open {
            waiter(Ok(()));
        } else {
            self.waiters.push_back(waiter);
        }
    }

    /// Open the gate and release queued waiters. Opening twice is a no-op.
    pub fn open(&mut self) -> usize {
        if self.open {
            return 0;
        }
        self.open = true;
        self.drain(|| Ok(()))
    }

    /// Release queued waiters with an error, leaving the gate closed.
    pub fn fail(&mut self, error: &Error) -> usize {
        self.drain(|| Err(error.clone()))
    }

    /// Close the gate again once the record is torn down.
    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn waiting(&self) -> usize {
        self.waiters.len()
    }

    fn drain(&mut self, outcome: impl Fn() -> Result<()>) -> usize {
        let released = self.waiters.len();
        while let Some(waiter) = self.waiters.pop_front() {
            waiter(outcome());
        }
        released
    }
}

impl std::fmt::Debug for ReadyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadyGate")
            .field("open", &self.open)
            .field("waiters", &self.waiters.len())
            .finish()
    }
}
