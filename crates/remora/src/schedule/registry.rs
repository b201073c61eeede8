//! Timing table shared between the consumer and the scheduler thread.
//!
//! The registry holds only ids, intervals and due times. Callback bodies
//! never enter it, so it can be shared across threads while the bodies stay
//! on the consumer thread.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::{Error, Result};

use super::queue::ReadyQueue;

/// Opaque, never-reused identity of a registered callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

impl CallbackId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Waiting for its next due time
    Scheduled,
    /// Sitting in the ready queue; not queued again until drained
    Queued,
}

#[derive(Debug)]
struct Entry {
    interval: Duration,
    next_due: Instant,
    state: EntryState,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<CallbackId, Entry>,
    shutdown: bool,
}

pub struct CallbackRegistry {
    state: Mutex<State>,
    changed: Condvar,
    next_id: AtomicU64,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            changed: Condvar::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an entry first due one `interval` from now
    pub fn register(&self, interval: Duration) -> Result<CallbackId> {
        if interval.is_zero() {
            return Err(Error::InvalidInterval(interval));
        }

        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = Entry {
            interval,
            next_due: Instant::now() + interval,
            state: EntryState::Scheduled,
        };
        self.lock().entries.insert(id, entry);
        self.changed.notify_all();

        trace!("Registered {} every {:?}", id, interval);
        Ok(id)
    }

    /// Remove an entry; returns `false` if it was not registered
    pub fn unregister(&self, id: CallbackId) -> bool {
        let removed = self.lock().entries.remove(&id).is_some();
        if removed {
            self.changed.notify_all();
            trace!("Unregistered {}", id);
        }
        removed
    }

    /// Remove every entry, returning how many there were
    pub fn clear(&self) -> usize {
        let count = {
            let mut state = self.lock();
            let count = state.entries.len();
            state.entries.clear();
            count
        };
        self.changed.notify_all();
        count
    }

    pub fn contains(&self, id: CallbackId) -> bool {
        self.lock().entries.contains_key(&id)
    }

    pub fn state(&self, id: CallbackId) -> Option<EntryState> {
        self.lock().entries.get(&id).map(|e| e.state)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue every scheduled entry that is due at `now`.
    ///
    /// Each due entry is pushed once, in due-time order, and moves to
    /// [`EntryState::Queued`]. Its next due time advances by whole intervals
    /// until it is in the future, so a late sweep coalesces missed ticks.
    pub fn sweep(&self, now: Instant, queue: &ReadyQueue) -> usize {
        let mut state = self.lock();

        let mut due: Vec<(Instant, CallbackId)> = state
            .entries
            .iter()
            .filter(|(_, e)| e.state == EntryState::Scheduled && e.next_due <= now)
            .map(|(id, e)| (e.next_due, *id))
            .collect();
        if due.is_empty() {
            return 0;
        }
        due.sort();

        let ids: Vec<CallbackId> = due.into_iter().map(|(_, id)| id).collect();
        for id in &ids {
            if let Some(entry) = state.entries.get_mut(id) {
                entry.state = EntryState::Queued;
                entry.next_due = advance(entry.next_due, entry.interval, now);
            }
        }

        // Pushed under the registry lock so concurrent sweeps stay in order
        queue.push_all(&ids);
        trace!("Sweep queued {} callback(s)", ids.len());
        ids.len()
    }

    /// Return a dequeued entry to [`EntryState::Scheduled`].
    ///
    /// An entry that sat in the queue past its next due time skips the ticks
    /// it missed, so draining never replays a tick straight away.
    ///
    /// Returns `false` when the entry was removed in the meantime, in which
    /// case the queued id is a tombstone and must not run.
    pub fn mark_drained(&self, id: CallbackId, now: Instant) -> bool {
        let found = match self.lock().entries.get_mut(&id) {
            Some(entry) => {
                entry.state = EntryState::Scheduled;
                if entry.next_due <= now {
                    entry.next_due = advance(entry.next_due, entry.interval, now);
                }
                true
            }
            None => false,
        };
        if found {
            self.changed.notify_all();
        }
        found
    }

    /// Block until the earliest scheduled entry is due, the registry changes,
    /// or `idle` passes with nothing scheduled.
    ///
    /// Returns `false` once [`CallbackRegistry::shutdown`] has been called.
    pub(crate) fn wait_for_due(&self, idle: Duration) -> bool {
        let state = self.lock();
        if state.shutdown {
            return false;
        }

        let now = Instant::now();
        let timeout = state
            .entries
            .values()
            .filter(|e| e.state == EntryState::Scheduled)
            .map(|e| e.next_due.saturating_duration_since(now))
            .min()
            .unwrap_or(idle);
        if timeout.is_zero() {
            return true;
        }

        let (state, _) = self
            .changed
            .wait_timeout(state, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        !state.shutdown
    }

    /// Wake and stop any scheduler waiting on this registry
    pub(crate) fn shutdown(&self) {
        self.lock().shutdown = true;
        self.changed.notify_all();
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Next due time after `next_due`, skipping ticks that are already past.
fn advance(next_due: Instant, interval: Duration, now: Instant) -> Instant {
    let next = next_due + interval;
    if next > now {
        return next;
    }
    let behind = now.duration_since(next).as_nanos();
    let skipped = behind / interval.as_nanos() + 1;
    let skipped = u32::try_from(skipped).unwrap_or(u32::MAX);
    next + interval.saturating_mul(skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_register_rejects_zero_interval() {
        let registry = CallbackRegistry::new();
        let err = registry.register(Duration::ZERO).unwrap_err();
        assert!(matches!(err, Error::InvalidInterval(d) if d.is_zero()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let registry = CallbackRegistry::new();
        let a = registry.register(ms(10)).unwrap();
        let b = registry.register(ms(10)).unwrap();
        assert!(b > a);

        registry.unregister(a);
        let c = registry.register(ms(10)).unwrap();
        assert!(c > b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_sweep_queues_only_due_entries() {
        let registry = CallbackRegistry::new();
        let queue = ReadyQueue::new();
        let fast = registry.register(ms(10)).unwrap();
        let slow = registry.register(ms(60_000)).unwrap();

        let now = Instant::now() + ms(20);
        assert_eq!(registry.sweep(now, &queue), 1);
        assert_eq!(queue.pop_up_to(usize::MAX), vec![fast]);
        assert_eq!(registry.state(fast), Some(EntryState::Queued));
        assert_eq!(registry.state(slow), Some(EntryState::Scheduled));
    }

    #[test]
    fn test_queued_entry_is_not_queued_twice() {
        let registry = CallbackRegistry::new();
        let queue = ReadyQueue::new();
        let id = registry.register(ms(10)).unwrap();

        let start = Instant::now();
        assert_eq!(registry.sweep(start + ms(15), &queue), 1);
        assert_eq!(registry.sweep(start + ms(25), &queue), 0);
        assert_eq!(registry.sweep(start + ms(500), &queue), 0);
        assert_eq!(queue.len(), 1);

        assert!(registry.mark_drained(queue.pop_up_to(1)[0], start + ms(30)));
        assert_eq!(registry.sweep(start + ms(505), &queue), 1);
        assert_eq!(queue.pop_up_to(usize::MAX), vec![id]);
    }

    #[test]
    fn test_late_drain_skips_missed_ticks() {
        let registry = CallbackRegistry::new();
        let queue = ReadyQueue::new();
        let id = registry.register(ms(100)).unwrap();

        let start = Instant::now();
        assert_eq!(registry.sweep(start + ms(150), &queue), 1);
        // Drained well after the tick at ~200ms
        assert!(registry.mark_drained(queue.pop_up_to(1)[0], start + ms(260)));
        assert_eq!(registry.state(id), Some(EntryState::Scheduled));

        assert_eq!(registry.sweep(start + ms(260), &queue), 0);
        assert_eq!(registry.sweep(start + ms(290), &queue), 0);
        assert_eq!(registry.sweep(start + ms(310), &queue), 1);
    }

    #[test]
    fn test_sweep_orders_by_due_time() {
        let registry = CallbackRegistry::new();
        let queue = ReadyQueue::new();
        let late = registry.register(ms(30)).unwrap();
        let early = registry.register(ms(10)).unwrap();

        registry.sweep(Instant::now() + ms(40), &queue);
        assert_eq!(queue.pop_up_to(usize::MAX), vec![early, late]);
    }

    #[test]
    fn test_mark_drained_reports_tombstones() {
        let registry = CallbackRegistry::new();
        let queue = ReadyQueue::new();
        let id = registry.register(ms(1)).unwrap();
        registry.sweep(Instant::now() + ms(5), &queue);

        assert!(registry.unregister(id));
        assert!(!registry.mark_drained(id, Instant::now()));
        assert!(!registry.unregister(id));
    }

    #[test]
    fn test_clear() {
        let registry = CallbackRegistry::new();
        registry.register(ms(10)).unwrap();
        registry.register(ms(20)).unwrap();
        assert_eq!(registry.clear(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_advance_keeps_cadence() {
        let t0 = Instant::now();
        // On time: exactly one interval later
        assert_eq!(advance(t0, ms(100), t0), t0 + ms(100));
        // 350ms late: the 100/200/300 ticks are coalesced, next is 400
        assert_eq!(advance(t0, ms(100), t0 + ms(350)), t0 + ms(400));
        // Landing exactly on a tick moves past it
        assert_eq!(advance(t0, ms(100), t0 + ms(200)), t0 + ms(300));
    }

    #[test]
    fn test_wait_for_due_returns_false_after_shutdown() {
        let registry = CallbackRegistry::new();
        registry.shutdown();
        assert!(registry.is_shutdown());
        assert!(!registry.wait_for_due(ms(1000)));
    }

    #[test]
    fn test_wait_for_due_returns_when_entry_due() {
        let registry = CallbackRegistry::new();
        registry.register(ms(20)).unwrap();

        let start = Instant::now();
        assert!(registry.wait_for_due(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
