use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use super::registry::CallbackId;

/// FIFO of callback ids waiting to be run on the consumer thread.
///
/// Ids may outlive their registration; the consumer checks each one against
/// the registry before running it.
#[derive(Debug, Default)]
pub struct ReadyQueue {
    ids: Mutex<VecDeque<CallbackId>>,
    pushed: Condvar,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<CallbackId>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_all(&self, ids: &[CallbackId]) {
        if ids.is_empty() {
            return;
        }
        self.lock().extend(ids.iter().copied());
        self.pushed.notify_all();
    }

    /// Remove up to `max` ids from the front
    pub fn pop_up_to(&self, max: usize) -> Vec<CallbackId> {
        let mut ids = self.lock();
        let count = max.min(ids.len());
        ids.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until at least `min_count` ids are queued or `deadline` passes.
    ///
    /// With `min_count == 0` there is nothing to wait for except the
    /// deadline itself, so the full time elapses.
    pub fn wait_for(&self, min_count: usize, deadline: Instant) -> usize {
        let mut ids = self.lock();
        loop {
            if min_count > 0 && ids.len() >= min_count {
                return ids.len();
            }
            let now = Instant::now();
            if now >= deadline {
                return ids.len();
            }
            ids = self
                .pushed
                .wait_timeout(ids, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}
