//! Win32 backend: `ReadProcessMemory`/`WriteProcessMemory` for transfers,
//! Toolhelp32 snapshots for processes and modules.

use std::ffi::c_void;
use std::io;
use std::mem::size_of;

use tracing::debug;
use windows::Win32::Foundation::{BOOL, CloseHandle, HANDLE};
use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW, Module32NextW, PROCESSENTRY32W,
    Process32FirstW, Process32NextW, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS,
};
use windows::Win32::System::Threading::{
    GetExitCodeProcess, IsWow64Process, OpenProcess, PROCESS_QUERY_INFORMATION,
    PROCESS_VM_OPERATION, PROCESS_VM_READ, PROCESS_VM_WRITE,
};

use crate::error::{Error, Result};
use crate::memory::process::{ModuleInfo, ProcessInfo};
use crate::memory::value::PointerWidth;

/// `GetExitCodeProcess` result for a running process
const STILL_ACTIVE: u32 = 259;

pub(crate) struct RawProcess {
    pid: u32,
    handle: HANDLE,
}

impl RawProcess {
    pub fn open(pid: u32) -> Result<Self> {
        let full = PROCESS_VM_READ | PROCESS_VM_WRITE | PROCESS_VM_OPERATION | PROCESS_QUERY_INFORMATION;

        // SAFETY: OpenProcess has no memory-safety preconditions; the returned
        // handle is owned by RawProcess and closed on drop.
        let handle = unsafe { OpenProcess(full, false, pid) }
            .or_else(|e| {
                debug!("Full access to pid {} denied ({}), trying read-only", pid, e);
                // SAFETY: as above.
                unsafe { OpenProcess(PROCESS_VM_READ | PROCESS_QUERY_INFORMATION, false, pid) }
            })
            .map_err(|e| Error::InvalidHandle(format!("OpenProcess({pid}) failed: {e}")))?;

        Ok(Self { pid, handle })
    }

    pub fn is_alive(&self) -> bool {
        let mut code = 0u32;
        // SAFETY: handle is a live process handle; code is a valid out pointer.
        let queried = unsafe { GetExitCodeProcess(self.handle, &mut code) };
        queried.is_ok() && code == STILL_ACTIVE
    }

    pub fn read(&self, address: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut transferred = 0usize;
        // SAFETY: buf is a valid writable region of buf.len() bytes; the remote
        // address is validated by the OS, which fails instead of faulting.
        unsafe {
            ReadProcessMemory(
                self.handle,
                address as *const c_void,
                buf.as_mut_ptr().cast(),
                buf.len(),
                Some(&raw mut transferred),
            )
        }
        .map_err(io::Error::other)?;

        if transferred != buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("partial read: {} of {} bytes", transferred, buf.len()),
            ));
        }
        Ok(())
    }

    pub fn write(&self, address: u64, bytes: &[u8]) -> io::Result<()> {
        let mut transferred = 0usize;
        // SAFETY: bytes is a valid readable region; the remote address is
        // validated by the OS.
        unsafe {
            WriteProcessMemory(
                self.handle,
                address as *const c_void,
                bytes.as_ptr().cast(),
                bytes.len(),
                Some(&raw mut transferred),
            )
        }
        .map_err(io::Error::other)?;

        if transferred != bytes.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("partial write: {} of {} bytes", transferred, bytes.len()),
            ));
        }
        Ok(())
    }

    pub fn image_name(&self) -> Option<String> {
        // The first module in a Toolhelp snapshot is the executable itself
        self.modules().ok()?.into_iter().next().map(|m| m.name)
    }

    pub fn pointer_width(&self) -> PointerWidth {
        if cfg!(target_pointer_width = "32") {
            return PointerWidth::Bits32;
        }
        let mut wow64 = BOOL::default();
        // SAFETY: handle is a live process handle; wow64 is a valid out pointer.
        let queried = unsafe { IsWow64Process(self.handle, &mut wow64) };
        if queried.is_ok() && wow64.as_bool() {
            PointerWidth::Bits32
        } else {
            PointerWidth::Bits64
        }
    }

    /// Modules in snapshot order (executable first)
    pub fn modules(&self) -> Result<Vec<ModuleInfo>> {
        // SAFETY: CreateToolhelp32Snapshot has no memory-safety preconditions.
        let snapshot =
            unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, self.pid) }
                .map_err(|e| Error::Io(io::Error::other(e)))?;
        let snapshot = SnapshotGuard(snapshot);

        let mut entry = MODULEENTRY32W {
            dwSize: size_of::<MODULEENTRY32W>() as u32,
            ..Default::default()
        };
        let mut modules = Vec::new();

        // SAFETY: entry is initialised with the correct dwSize and outlives the calls.
        let mut more = unsafe { Module32FirstW(snapshot.0, &mut entry) }.is_ok();
        while more {
            modules.push(ModuleInfo {
                name: wide_to_string(&entry.szModule),
                base: entry.modBaseAddr as u64,
                size: entry.modBaseSize as u64,
            });
            // SAFETY: as above.
            more = unsafe { Module32NextW(snapshot.0, &mut entry) }.is_ok();
        }

        Ok(modules)
    }
}

impl Drop for RawProcess {
    fn drop(&mut self) {
        // SAFETY: handle was returned by OpenProcess and is closed exactly once.
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}

struct SnapshotGuard(HANDLE);

impl Drop for SnapshotGuard {
    fn drop(&mut self) {
        // SAFETY: the snapshot handle is owned by this guard.
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

fn wide_to_string(wide: &[u16]) -> String {
    let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..len])
}

pub(crate) fn list_processes() -> Result<Vec<ProcessInfo>> {
    // SAFETY: CreateToolhelp32Snapshot has no memory-safety preconditions.
    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
        .map_err(|e| Error::Io(io::Error::other(e)))?;
    let snapshot = SnapshotGuard(snapshot);

    let mut entry = PROCESSENTRY32W {
        dwSize: size_of::<PROCESSENTRY32W>() as u32,
        ..Default::default()
    };
    let mut processes = Vec::new();

    // SAFETY: entry is initialised with the correct dwSize and outlives the calls.
    let mut more = unsafe { Process32FirstW(snapshot.0, &mut entry) }.is_ok();
    while more {
        processes.push(ProcessInfo {
            pid: entry.th32ProcessID,
            name: wide_to_string(&entry.szExeFile),
        });
        // SAFETY: as above.
        more = unsafe { Process32NextW(snapshot.0, &mut entry) }.is_ok();
    }

    Ok(processes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_to_string() {
        let wide: Vec<u16> = "game.exe\0junk".encode_utf16().collect();
        assert_eq!(wide_to_string(&wide), "game.exe");
    }

    #[test]
    fn test_list_processes_includes_self() {
        let pid = std::process::id();
        assert!(list_processes().unwrap().iter().any(|p| p.pid == pid));
    }
}
