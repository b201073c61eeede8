use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::platform::{self, RawProcess};
use super::value::PointerWidth;

/// How to pick the process to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessTarget {
    Pid(u32),
    /// Image name, matched case-insensitively; `*` and `?` act as wildcards
    Name(String),
}

impl FromStr for ProcessTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::ProcessNotFound("empty process identifier".to_string()));
        }
        if s.bytes().all(|b| b.is_ascii_digit()) {
            let pid = s
                .parse()
                .map_err(|_| Error::ProcessNotFound(format!("pid {s} is out of range")))?;
            return Ok(Self::Pid(pid));
        }
        Ok(Self::Name(s.to_string()))
    }
}

impl From<u32> for ProcessTarget {
    fn from(pid: u32) -> Self {
        Self::Pid(pid)
    }
}

impl From<&str> for ProcessTarget {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl fmt::Display for ProcessTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pid(pid) => write!(f, "pid {pid}"),
            Self::Name(name) => write!(f, "{name:?}"),
        }
    }
}

/// A module (executable image or shared library) mapped in the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub base: u64,
    pub size: u64,
}

impl ModuleInfo {
    pub fn contains(&self, address: u64) -> bool {
        address >= self.base && address - self.base < self.size
    }
}

/// Process id and image name, as reported by process enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

/// Handle to a target process.
///
/// A handle that failed to open is still a value: [`ProcessHandle::is_valid`]
/// reports `false` and every memory operation on it fails with
/// [`Error::InvalidHandle`].
pub struct ProcessHandle {
    pub pid: u32,
    pub name: String,
    pub base_address: u64,
    pub module_size: u64,
    pub pointer_width: PointerWidth,
    modules: HashMap<String, ModuleInfo>,
    raw: Option<RawProcess>,
    open_error: Option<String>,
}

impl ProcessHandle {
    /// Open a process, returning an invalid handle instead of an error.
    pub fn open(target: impl Into<ProcessTarget>) -> Self {
        let target = target.into();
        match Self::try_open(&target) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to open {}: {}", target, e);
                let mut handle = Self::invalid(e.to_string());
                if let ProcessTarget::Pid(pid) = target {
                    handle.pid = pid;
                }
                handle
            }
        }
    }

    pub fn try_open(target: &ProcessTarget) -> Result<Self> {
        let pid = match target {
            ProcessTarget::Pid(pid) => *pid,
            ProcessTarget::Name(pattern) => find_pid_by_name(pattern)?,
        };

        let raw = RawProcess::open(pid)?;
        let name = raw.image_name().unwrap_or_default();
        let pointer_width = raw.pointer_width();

        let mut handle = Self {
            pid,
            name,
            base_address: 0,
            module_size: 0,
            pointer_width,
            modules: HashMap::new(),
            raw: Some(raw),
            open_error: None,
        };
        if let Err(e) = handle.refresh_modules() {
            warn!("Failed to enumerate modules of pid {}: {}", pid, e);
        }

        debug!(
            "Opened pid {} ({}, {}, base {:#x}, {} modules)",
            handle.pid,
            handle.name,
            handle.pointer_width,
            handle.base_address,
            handle.modules.len()
        );
        Ok(handle)
    }

    /// A handle that refers to no process
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            pid: 0,
            name: String::new(),
            base_address: 0,
            module_size: 0,
            pointer_width: PointerWidth::default(),
            modules: HashMap::new(),
            raw: None,
            open_error: Some(reason.into()),
        }
    }

    /// `true` while the handle is open and the process has not exited
    pub fn is_valid(&self) -> bool {
        self.raw.as_ref().is_some_and(RawProcess::is_alive)
    }

    /// Why opening failed, for invalid handles
    pub fn open_error(&self) -> Option<&str> {
        self.open_error.as_deref()
    }

    pub(crate) fn raw(&self) -> Result<&RawProcess> {
        self.raw.as_ref().ok_or_else(|| {
            Error::InvalidHandle(
                self.open_error
                    .clone()
                    .unwrap_or_else(|| "process is not open".to_string()),
            )
        })
    }

    /// Re-read the module table, returning how many modules were found
    pub fn refresh_modules(&mut self) -> Result<usize> {
        let modules = self.raw()?.modules()?;

        self.modules = modules
            .into_iter()
            .map(|m| (m.name.to_ascii_lowercase(), m))
            .collect();

        if let Some(image) = self.module(&self.name).cloned() {
            self.base_address = image.base;
            self.module_size = image.size;
        }
        Ok(self.modules.len())
    }

    /// Look up a module by name, case-insensitively
    pub fn module(&self, name: &str) -> Option<&ModuleInfo> {
        self.modules.get(&name.to_ascii_lowercase())
    }

    /// Base address of the primary executable module
    pub fn image_base(&self) -> u64 {
        self.base_address
    }

    /// All cached modules sorted by base address
    pub fn modules(&self) -> Vec<&ModuleInfo> {
        let mut modules: Vec<_> = self.modules.values().collect();
        modules.sort_by_key(|m| m.base);
        modules
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("base_address", &format_args!("{:#x}", self.base_address))
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// List running processes whose image name matches `pattern`, lowest pid first
pub fn find_processes(pattern: &str) -> Result<Vec<ProcessInfo>> {
    let mut matches: Vec<_> = platform::list_processes()?
        .into_iter()
        .filter(|p| name_matches(pattern, &p.name))
        .collect();
    matches.sort_by_key(|p| p.pid);
    Ok(matches)
}

fn find_pid_by_name(pattern: &str) -> Result<u32> {
    find_processes(pattern)?
        .first()
        .map(|p| p.pid)
        .ok_or_else(|| Error::ProcessNotFound(pattern.to_string()))
}

/// Case-insensitive image name match.
///
/// Without wildcards the pattern must equal the name, ignoring a trailing
/// `.exe` on either side.
pub(crate) fn name_matches(pattern: &str, name: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let name = name.to_ascii_lowercase();

    if pattern.contains(['*', '?']) {
        return wildcard_match(pattern.as_bytes(), name.as_bytes());
    }

    let strip = |s: &str| s.strip_suffix(".exe").unwrap_or(s).to_string();
    strip(&pattern) == strip(&name)
}

fn wildcard_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some(b'*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == b'?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryAccessor, ProcessMemory};

    const MISSING_PID: u32 = 0x7FFF_FFF0;

    #[test]
    fn test_target_parse() {
        assert_eq!("1234".parse::<ProcessTarget>().unwrap(), ProcessTarget::Pid(1234));
        assert_eq!(
            "game.exe".parse::<ProcessTarget>().unwrap(),
            ProcessTarget::Name("game.exe".to_string())
        );
        assert!("".parse::<ProcessTarget>().is_err());
        assert!("99999999999".parse::<ProcessTarget>().is_err());
    }

    #[test]
    fn test_name_matches() {
        assert!(name_matches("Game.exe", "game.exe"));
        assert!(name_matches("game", "GAME.EXE"));
        assert!(name_matches("game.exe", "game"));
        assert!(!name_matches("game", "gamer.exe"));
        assert!(name_matches("gam*", "gamer.exe"));
        assert!(name_matches("*.exe", "launcher.exe"));
        assert!(name_matches("g?me*", "game_x64.exe"));
        assert!(!name_matches("*.dll", "launcher.exe"));
    }

    #[test]
    fn test_nonexistent_pid_is_invalid() {
        let process = ProcessHandle::open(MISSING_PID);
        assert!(!process.is_valid());
        assert_eq!(process.pid, MISSING_PID);
        assert!(process.open_error().is_some());

        let accessor = MemoryAccessor::new(&process);
        assert!(accessor.read_bytes(0x1000, 4).unwrap_err().is_invalid_handle());
    }

    #[test]
    fn test_nonexistent_name_is_invalid() {
        let process = ProcessHandle::open("no-such-process-4b1d9e.exe");
        assert!(!process.is_valid());
        assert!(ProcessHandle::try_open(&"no-such-process-4b1d9e.exe".into()).is_err());
    }

    #[test]
    fn test_module_contains() {
        let module = ModuleInfo {
            name: "game.exe".to_string(),
            base: 0x1000,
            size: 0x100,
        };
        assert!(module.contains(0x1000));
        assert!(module.contains(0x10FF));
        assert!(!module.contains(0x1100));
        assert!(!module.contains(0xFFF));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_open_self_and_read_local_value() {
        let value: u64 = 0x0123_4567_89AB_CDEF;
        let address = std::ptr::addr_of!(value) as u64;

        let process = ProcessHandle::open(std::process::id());
        assert!(process.is_valid());
        assert!(process.image_base() != 0);
        assert!(process.module(&process.name).is_some());

        let accessor = MemoryAccessor::new(&process);
        assert_eq!(accessor.read::<u64>(address).unwrap(), value);
        assert!(accessor.read::<u64>(0).unwrap_err().is_out_of_bounds());
        std::hint::black_box(&value);
    }
}
