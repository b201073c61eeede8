use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::config::SchedulerConfig;
use crate::error::{Error, Result};

use super::queue::ReadyQueue;
use super::registry::{CallbackId, CallbackRegistry};
use super::scheduler::Scheduler;

type Body = Box<dyn FnMut() -> anyhow::Result<()>>;

/// Outcome of a single [`CallbackHost::poll`]
#[derive(Debug, Default)]
pub struct PollReport {
    /// Bodies that were invoked, including ones that failed
    pub executed: usize,
    /// Queued ids whose callback was gone by the time they were drained
    pub skipped: usize,
    pub faults: Vec<Error>,
}

impl PollReport {
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

/// Consumer-side owner of callback bodies.
///
/// Bodies are stored here and only ever invoked from [`CallbackHost::poll`],
/// on the thread that owns the host. The background [`Scheduler`] sees ids
/// and due times only. The host is deliberately `!Send`, so bodies may
/// capture non-thread-safe state such as `Rc` or a process handle.
pub struct CallbackHost {
    registry: Arc<CallbackRegistry>,
    queue: Arc<ReadyQueue>,
    bodies: RefCell<HashMap<CallbackId, Body>>,
    scheduler: Scheduler,
}

impl CallbackHost {
    pub fn new() -> Result<Self> {
        Self::with_config(&SchedulerConfig::default())
    }

    pub fn with_config(config: &SchedulerConfig) -> Result<Self> {
        let registry = Arc::new(CallbackRegistry::new());
        let queue = Arc::new(ReadyQueue::new());
        let scheduler = Scheduler::spawn(Arc::clone(&registry), Arc::clone(&queue), config)?;

        Ok(Self {
            registry,
            queue,
            bodies: RefCell::new(HashMap::new()),
            scheduler,
        })
    }

    /// Schedule `body` to become runnable every `interval`, starting one
    /// interval from now.
    pub fn register<F>(&self, interval: Duration, body: F) -> Result<CallbackId>
    where
        F: FnMut() -> anyhow::Result<()> + 'static,
    {
        let id = self.registry.register(interval)?;
        self.bodies.borrow_mut().insert(id, Box::new(body));
        Ok(id)
    }

    /// Remove a callback. An id that is already queued is skipped when
    /// drained. Returns `false` for an unknown id.
    pub fn unregister(&self, id: CallbackId) -> bool {
        let removed = self.registry.unregister(id);
        // Dropped outside the borrow in case the body owns something whose
        // drop calls back into the host
        let body = self.bodies.borrow_mut().remove(&id);
        drop(body);
        removed
    }

    pub fn clear(&self) -> usize {
        let count = self.registry.clear();
        let bodies = std::mem::take(&mut *self.bodies.borrow_mut());
        drop(bodies);
        count
    }

    pub fn active_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_registered(&self, id: CallbackId) -> bool {
        self.registry.contains(id)
    }

    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn scheduler_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Run callbacks that are due, on this thread.
    ///
    /// With a zero `timeout` this never blocks: it runs whatever is due right
    /// now. Otherwise it waits until `min_count` callbacks have run or the
    /// timeout passes; with `min_count == 0` the whole timeout is waited out
    /// and everything that became due is run once. At most `min_count`
    /// callbacks run when it is nonzero. Queued ids of removed callbacks are
    /// skipped and do not count toward `min_count`.
    pub fn poll(&self, min_count: usize, timeout: Duration) -> PollReport {
        let deadline = Instant::now() + timeout;
        let mut report = PollReport::default();
        self.registry.sweep(Instant::now(), &self.queue);

        if min_count == 0 {
            if !timeout.is_zero() {
                self.queue.wait_for(0, deadline);
                self.registry.sweep(Instant::now(), &self.queue);
            }
            for id in self.queue.pop_up_to(usize::MAX) {
                self.run_one(id, &mut report);
            }
            return report;
        }

        loop {
            let wanted = min_count - report.executed;
            if !timeout.is_zero() {
                self.queue.wait_for(wanted, deadline);
                self.registry.sweep(Instant::now(), &self.queue);
            }
            for id in self.queue.pop_up_to(wanted) {
                self.run_one(id, &mut report);
            }

            if report.executed >= min_count || timeout.is_zero() || Instant::now() >= deadline {
                return report;
            }
        }
    }

    /// Run the body behind a drained id and record the outcome
    fn run_one(&self, id: CallbackId, report: &mut PollReport) {
        if !self.registry.mark_drained(id, Instant::now()) {
            trace!("Skipping removed callback {}", id);
            report.skipped += 1;
            return;
        }

        // Absent while the same callback is already running further up
        // the stack (re-entrant poll)
        let body = self.bodies.borrow_mut().remove(&id);
        let Some(mut body) = body else {
            report.skipped += 1;
            return;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body()));
        report.executed += 1;

        let message = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{e:#}")),
            Err(payload) => Some(format!("panicked: {}", panic_message(&*payload))),
        };
        if let Some(message) = message {
            warn!("Callback {} failed: {}", id, message);
            report.faults.push(Error::CallbackFault { id, message });
        }

        if self.registry.contains(id) {
            self.bodies.borrow_mut().insert(id, body);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
