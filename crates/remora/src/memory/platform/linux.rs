//! procfs backend: `/proc/<pid>/mem` for transfers, `/proc/<pid>/maps` for
//! modules.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::process::{ModuleInfo, ProcessInfo};
use crate::memory::value::PointerWidth;

pub(crate) struct RawProcess {
    pid: u32,
    root: PathBuf,
    mem: File,
    writable: bool,
}

impl RawProcess {
    pub fn open(pid: u32) -> Result<Self> {
        let root = PathBuf::from(format!("/proc/{pid}"));
        if !root.exists() {
            return Err(Error::ProcessNotFound(format!("pid {pid}")));
        }

        let mem_path = root.join("mem");
        let (mem, writable) = match File::options().read(true).write(true).open(&mem_path) {
            Ok(file) => (file, true),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                debug!("pid {} memory is not writable, opening read-only", pid);
                let file = File::open(&mem_path).map_err(|e| open_error(pid, e))?;
                (file, false)
            }
            Err(e) => return Err(open_error(pid, e)),
        };

        Ok(Self {
            pid,
            root,
            mem,
            writable,
        })
    }

    pub fn is_alive(&self) -> bool {
        match fs::read_to_string(self.root.join("stat")) {
            Ok(stat) => !matches!(process_state(&stat), Some('Z' | 'X') | None),
            Err(_) => false,
        }
    }

    pub fn read(&self, address: u64, buf: &mut [u8]) -> io::Result<()> {
        self.mem.read_exact_at(buf, address)
    }

    pub fn write(&self, address: u64, bytes: &[u8]) -> io::Result<()> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("pid {} was opened read-only", self.pid),
            ));
        }
        self.mem.write_all_at(bytes, address)
    }

    pub fn image_name(&self) -> Option<String> {
        image_name_at(&self.root)
    }

    pub fn pointer_width(&self) -> PointerWidth {
        let mut ident = [0u8; 5];
        let read = File::open(self.root.join("exe")).and_then(|mut f| f.read_exact(&mut ident));
        match (read, &ident) {
            (Ok(()), [0x7F, b'E', b'L', b'F', 1]) => PointerWidth::Bits32,
            _ => PointerWidth::Bits64,
        }
    }

    pub fn modules(&self) -> Result<Vec<ModuleInfo>> {
        let maps = fs::read_to_string(self.root.join("maps"))?;
        Ok(parse_maps(&maps))
    }
}

fn open_error(pid: u32, e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::NotFound => Error::ProcessNotFound(format!("pid {pid}")),
        io::ErrorKind::PermissionDenied => {
            Error::InvalidHandle(format!("access to pid {pid} denied"))
        }
        _ => Error::Io(e),
    }
}

fn image_name_at(root: &Path) -> Option<String> {
    if let Some(name) = fs::read_link(root.join("exe"))
        .ok()
        .and_then(|exe| exe.file_name().map(|n| n.to_string_lossy().into_owned()))
    {
        return Some(name);
    }
    fs::read_to_string(root.join("comm"))
        .ok()
        .map(|comm| comm.trim_end().to_string())
}

/// State letter from `/proc/<pid>/stat` (the field after the parenthesised comm)
fn process_state(stat: &str) -> Option<char> {
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.trim_start().chars().next()
}

/// Group file-backed mappings by file name.
fn parse_maps(maps: &str) -> Vec<ModuleInfo> {
    let mut ranges: BTreeMap<String, (u64, u64)> = BTreeMap::new();

    for line in maps.lines() {
        let mut fields = line.splitn(6, ' ');
        let Some(range) = fields.next() else {
            continue;
        };
        let Some(path) = fields.nth(4).map(str::trim) else {
            continue;
        };
        if !path.starts_with('/') {
            continue;
        }
        let path = path.strip_suffix(" (deleted)").unwrap_or(path);
        let Some(name) = Path::new(path).file_name() else {
            continue;
        };

        let Some((start, end)) = range.split_once('-') else {
            continue;
        };
        let (Ok(start), Ok(end)) = (
            u64::from_str_radix(start, 16),
            u64::from_str_radix(end, 16),
        ) else {
            continue;
        };

        let entry = ranges
            .entry(name.to_string_lossy().into_owned())
            .or_insert((start, end));
        entry.0 = entry.0.min(start);
        entry.1 = entry.1.max(end);
    }

    let mut modules: Vec<_> = ranges
        .into_iter()
        .map(|(name, (base, end))| ModuleInfo {
            name,
            base,
            size: end - base,
        })
        .collect();
    modules.sort_by_key(|m| m.base);
    modules
}

pub(crate) fn list_processes() -> Result<Vec<ProcessInfo>> {
    let mut processes = Vec::new();
    for entry in fs::read_dir("/proc")? {
        let Ok(entry) = entry else {
            continue;
        };
        let Some(pid) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u32>().ok())
        else {
            continue;
        };
        if let Some(name) = image_name_at(&entry.path()) {
            processes.push(ProcessInfo { pid, name });
        }
    }
    Ok(processes)
}
