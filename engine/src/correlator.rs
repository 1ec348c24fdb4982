//! Write acknowledgment correlation.
//!
//! Writes that ask for an acknowledgment get a correlation id, sequential per
//! record starting at `"1"`. The acknowledgment carrying that id resolves the
//! pending write exactly once.

use crate::error::Result;
use crate::operation::WriteCallback;
use crate::CorrelationId;
use std::collections::HashMap;

/// Pending writes keyed by correlation id.
#[derive(Default)]
pub struct WriteCorrelator {
    next_id: u64,
    pending: HashMap<CorrelationId, WriteCallback>,
}

impl WriteCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a correlation id and park `callback` under it.
    pub fn register(&mut self, callback: WriteCallback) -> CorrelationId {
        self.next_id += 1;
        let correlation_id = self.next_id.to_string();
        self.pending.insert(correlation_id.clone(), callback);
        correlation_id
    }

    /// Resolve the write registered under `correlation_id`.
    ///
    /// Returns `false` for unknown or already resolved ids.
    pub fn resolve(&mut self, correlation_id: &str, result: Result<()>) -> bool {
        match self.pending.remove(correlation_id) {
            Some(callback) => {
                callback(result);
                true
            }
            None => false,
        }
    }

    /// Resolve every pending write with an error built per write.
    ///
    /// Writes are resolved in correlation id order.
    pub fn fail_all(&mut self, error: impl Fn() -> crate::Error) -> usize {
        let mut pending: Vec<_> = self.pending.drain().collect();
        pending.sort_by_key(|(id, _)| id.parse::<u64>().unwrap_or(u64::MAX));

        let count = pending.len();
        for (_, callback) in pending {
            callback(Err(error()));
        }
        count
    }

    /// Number of writes still awaiting an acknowledgment.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl std::fmt::Debug for WriteCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteCorrelator")
            .field("next_id", &self.next_id)
            .field("pending", &self.pending.len())
            .finish()
    }
}
