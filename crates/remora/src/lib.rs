//! # remora
//!
//! Attach to a running process, read and write its memory, and sample it on a
//! schedule.
//!
//! This crate provides:
//! - Process lookup and handles (`/proc` on Linux, Win32 on Windows)
//! - Typed remote reads/writes through [`ProcessMemory`]
//! - Local byte buffers with bounds-checked typed access ([`MemoryBuffer`])
//! - Multi-level pointer chain resolution ([`PointerChain`], [`PointerPath`])
//! - Periodic callbacks driven by a background scheduler thread and run on
//!   the caller's thread ([`CallbackHost`])
//! - TOML configuration for watch lists ([`Config`])

pub mod config;
pub mod error;
pub mod memory;
pub mod schedule;

pub use config::{Config, PollConfig, SchedulerConfig, TargetConfig, WatchSpec};
pub use error::{Error, Result};
pub use memory::{
    AddressExpr, ChainBreak, MemoryAccessor, MemoryBuffer, ModuleInfo, PointerChain, PointerPath,
    PointerWidth, ProcessHandle, ProcessInfo, ProcessMemory, ProcessTarget, Scalar,
    StringEncoding, Value, ValueType, find_processes,
};
pub use schedule::{CallbackHost, CallbackId, CallbackRegistry, PollReport, ReadyQueue, Scheduler};
