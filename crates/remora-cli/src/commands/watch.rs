//! Periodic sampling of the values listed in a watch file.
//!
//! Each `[[watch]]` entry becomes one callback on a [`CallbackHost`]. The
//! callbacks run on this thread from the poll loop, resolve their pointer
//! path fresh every time and print the value when it changes.

use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;
use remora::{
    CallbackHost, Config, MemoryAccessor, PointerPath, ProcessHandle, ProcessMemory,
    ProcessTarget, Value, ValueType, WatchSpec,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::shutdown::ShutdownSignal;

const REATTACH_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
    /// Print every sample instead of only changes
    pub all: bool,
}

/// Latest outcome of a sample
#[derive(Debug, Clone, PartialEq)]
enum Reading {
    Value { address: u64, value: Value },
    Unavailable(String),
}

#[derive(Serialize)]
struct SampleLine<'a> {
    timestamp: DateTime<Utc>,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<String>,
    #[serde(rename = "type")]
    value_type: ValueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

struct Sampler {
    name: String,
    path: PointerPath,
    value_type: ValueType,
    output: Output,
    last: Option<Reading>,
}

impl Sampler {
    fn new(spec: &WatchSpec, output: Output) -> Self {
        Self {
            name: spec.name.clone(),
            path: spec.path(),
            value_type: spec.value_type,
            output,
            last: None,
        }
    }

    /// Take one sample. Fails only when the target itself is gone; a broken
    /// chain is reported as a reading.
    fn sample<M: ProcessMemory>(&mut self, mem: &M) -> Result<()> {
        let reading = match self.read(mem) {
            Ok((address, value)) => Reading::Value { address, value },
            Err(e) if e.is_invalid_handle() => return Err(e.into()),
            Err(e) => Reading::Unavailable(e.to_string()),
        };

        if let Some(line) = self.observe(reading, Utc::now()) {
            println!("{line}");
        }
        Ok(())
    }

    fn read<M: ProcessMemory>(&self, mem: &M) -> remora::Result<(u64, Value)> {
        let address = self.path.resolve(mem)?;
        let value = mem.read_value(self.value_type, address)?;
        Ok((address, value))
    }

    /// Record `reading` and return the line to print, if any
    fn observe(&mut self, reading: Reading, now: DateTime<Utc>) -> Option<String> {
        let changed = self.last.as_ref() != Some(&reading);
        let line = (changed || self.output.all).then(|| self.format(&reading, now));
        self.last = Some(reading);
        line
    }

    fn format(&self, reading: &Reading, now: DateTime<Utc>) -> String {
        if self.output.json {
            let line = match reading {
                Reading::Value { address, value } => SampleLine {
                    timestamp: now,
                    name: &self.name,
                    address: Some(format!("{address:#x}")),
                    value_type: self.value_type,
                    value: Some(*value),
                    error: None,
                },
                Reading::Unavailable(reason) => SampleLine {
                    timestamp: now,
                    name: &self.name,
                    address: None,
                    value_type: self.value_type,
                    value: None,
                    error: Some(reason),
                },
            };
            return serde_json::to_string(&line).unwrap_or_default();
        }

        let time = now.format("%H:%M:%S%.3f");
        match reading {
            Reading::Value { address, value } => format!(
                "{} {} = {} {}",
                time.dimmed(),
                self.name.bold(),
                value.green(),
                format!("({} @ {:#x})", self.value_type, address).dimmed()
            ),
            Reading::Unavailable(reason) => format!(
                "{} {} {}",
                time.dimmed(),
                self.name.bold(),
                reason.yellow()
            ),
        }
    }
}

/// Run the watch loop until Ctrl+C
pub fn run(
    config_path: &Path,
    target: Option<ProcessTarget>,
    json: bool,
    all: bool,
) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    if config.watch.is_empty() {
        bail!("{} has no [[watch]] entries", config_path.display());
    }
    let target = target
        .or_else(|| config.target.target())
        .context("No target process: pass --pid/--name or set [target] in the config")?;

    let shutdown = ShutdownSignal::install()?;
    let output = Output { json, all };

    info!("Waiting for {}... (Ctrl+C to quit)", target);
    while !shutdown.is_shutdown() {
        match ProcessHandle::try_open(&target) {
            Ok(process) => {
                info!("Attached to {} (pid {})", process.name, process.pid);
                watch_process(Rc::new(process), &config, &shutdown, output)?;
                if !shutdown.is_shutdown() {
                    info!("Target exited, waiting for it to restart...");
                }
            }
            Err(e) => debug!("{} not available: {}", target, e),
        }

        if shutdown.wait(REATTACH_DELAY) {
            break;
        }
    }

    info!("Shutdown complete");
    Ok(())
}

fn watch_process(
    process: Rc<ProcessHandle>,
    config: &Config,
    shutdown: &ShutdownSignal,
    output: Output,
) -> Result<()> {
    let host = CallbackHost::with_config(&config.scheduler)?;

    for spec in &config.watch {
        let mut sampler = Sampler::new(spec, output);
        let process = Rc::clone(&process);
        host.register(spec.interval(), move || {
            sampler.sample(&MemoryAccessor::new(&process))
        })?;
        debug!("Watching {} at {} every {:?}", spec.name, spec.path(), spec.interval());
    }

    let timeout = config.poll.timeout();
    while !shutdown.is_shutdown() && process.is_valid() {
        let report = host.poll(0, timeout);
        if report.executed > 0 {
            debug!(
                "Poll ran {} callback(s), {} fault(s)",
                report.executed,
                report.faults.len()
            );
        }
    }

    Ok(())
}
