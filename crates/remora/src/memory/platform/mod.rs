//! OS-specific process access.
//!
//! Each backend exposes the same `RawProcess` surface and a
//! `list_processes` function; the rest of the crate never touches the OS
//! directly.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub(crate) use linux::{RawProcess, list_processes};

#[cfg(target_os = "windows")]
mod windows;
#[cfg(target_os = "windows")]
pub(crate) use self::windows::{RawProcess, list_processes};

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
mod unsupported;
#[cfg(not(any(target_os = "linux", target_os = "windows")))]
pub(crate) use unsupported::{RawProcess, list_processes};
