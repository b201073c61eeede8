//! Periodic callback scheduling.
//!
//! Timing and execution are split across two threads:
//!
//! - the [`Scheduler`] thread wakes when the earliest entry in the
//!   [`CallbackRegistry`] is due and pushes its id onto the [`ReadyQueue`];
//! - the consumer calls [`CallbackHost::poll`], which drains the queue and runs
//!   the bodies on its own thread.
//!
//! An entry already sitting in the queue is not queued again, so a consumer
//! that polls late runs each callback once rather than once per missed tick.

mod host;
mod queue;
mod registry;
mod scheduler;

pub use host::{CallbackHost, PollReport};
pub use queue::ReadyQueue;
pub use registry::{CallbackId, CallbackRegistry, EntryState};
pub use scheduler::Scheduler;
