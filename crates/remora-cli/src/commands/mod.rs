//! CLI command implementations.

pub mod chain;
pub mod hexdump;
pub mod info;
pub mod read;
pub mod watch;
pub mod write;

use anyhow::{Context, Result};
use remora::{AddressExpr, ProcessHandle, ProcessMemory, ProcessTarget};

/// Open the target or fail with the reason
pub(crate) fn open(target: &ProcessTarget) -> Result<ProcessHandle> {
    ProcessHandle::try_open(target).with_context(|| format!("Failed to open {target}"))
}

/// Resolve `address` and then follow `offsets` from it
pub(crate) fn locate(mem: &impl ProcessMemory, address: &AddressExpr, offsets: &[i64]) -> Result<u64> {
    let base = address.resolve(mem)?;
    Ok(remora::memory::chain::resolve(mem, base, offsets)?)
}
