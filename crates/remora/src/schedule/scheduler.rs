use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::config::SchedulerConfig;
use crate::error::Result;

use super::queue::ReadyQueue;
use super::registry::CallbackRegistry;

/// Background thread that moves due callbacks into the ready queue.
///
/// The thread only does timing bookkeeping. It never sees a callback body.
pub struct Scheduler {
    registry: Arc<CallbackRegistry>,
    thread: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn spawn(
        registry: Arc<CallbackRegistry>,
        queue: Arc<ReadyQueue>,
        config: &SchedulerConfig,
    ) -> Result<Self> {
        let idle = Duration::from_millis(config.idle_wait_ms.max(1));
        let thread = {
            let registry = Arc::clone(&registry);
            thread::Builder::new()
                .name(config.thread_name.clone())
                .spawn(move || run(&registry, &queue, idle))?
        };

        debug!("Scheduler thread '{}' started", config.thread_name);
        Ok(Self {
            registry,
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the thread and wait for it to exit. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.registry.shutdown();
        if thread.join().is_err() {
            warn!("Scheduler thread panicked");
        } else {
            debug!("Scheduler thread stopped");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(registry: &CallbackRegistry, queue: &ReadyQueue, idle: Duration) {
    while registry.wait_for_due(idle) {
        let queued = registry.sweep(Instant::now(), queue);
        if queued > 0 {
            trace!("Scheduler woke: {} due, {} waiting", queued, queue.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            idle_wait_ms: 50,
            thread_name: "remora-test-scheduler".to_string(),
        }
    }

    #[test]
    fn test_scheduler_queues_due_entries() {
        let registry = Arc::new(CallbackRegistry::new());
        let queue = Arc::new(ReadyQueue::new());
        let _scheduler = Scheduler::spawn(Arc::clone(&registry), Arc::clone(&queue), &config())
            .unwrap();

        let id = registry.register(Duration::from_millis(10)).unwrap();
        let start = Instant::now();
        assert_eq!(queue.wait_for(1, start + Duration::from_secs(5)), 1);
        assert_eq!(queue.pop_up_to(1), vec![id]);
    }

    #[test]
    fn test_queued_entry_not_requeued_until_drained() {
        let registry = Arc::new(CallbackRegistry::new());
        let queue = Arc::new(ReadyQueue::new());
        let _scheduler = Scheduler::spawn(Arc::clone(&registry), Arc::clone(&queue), &config())
            .unwrap();

        registry.register(Duration::from_millis(5)).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_shutdown_joins_thread() {
        let registry = Arc::new(CallbackRegistry::new());
        let queue = Arc::new(ReadyQueue::new());
        let mut scheduler =
            Scheduler::spawn(Arc::clone(&registry), queue, &config()).unwrap();
        assert!(scheduler.is_running());

        let start = Instant::now();
        scheduler.shutdown();
        assert!(!scheduler.is_running());
        assert!(start.elapsed() < Duration::from_secs(5));

        // Second call is a no-op
        scheduler.shutdown();
    }
}
