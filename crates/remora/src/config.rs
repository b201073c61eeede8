//! TOML configuration for the scheduler, polling and watch list.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::{AddressExpr, PointerPath, ProcessTarget, ValueType};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub target: TargetConfig,
    pub scheduler: SchedulerConfig,
    pub poll: PollConfig,
    pub watch: Vec<WatchSpec>,
}

/// Which process to attach to; `pid` wins when both are set
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub pid: Option<u32>,
    pub name: Option<String>,
}

impl TargetConfig {
    pub fn target(&self) -> Option<ProcessTarget> {
        match (self.pid, &self.name) {
            (Some(pid), _) => Some(ProcessTarget::Pid(pid)),
            (None, Some(name)) => Some(ProcessTarget::Name(name.clone())),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How long the scheduler sleeps when nothing is registered
    pub idle_wait_ms: u64,
    pub thread_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_wait_ms: 1000,
            thread_name: "remora-scheduler".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub timeout_ms: u64,
}

impl PollConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { timeout_ms: 50 }
    }
}

/// A value to sample periodically through a pointer path
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSpec {
    pub name: String,
    pub address: AddressExpr,
    #[serde(default)]
    pub offsets: Vec<i64>,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub interval_ms: u64,
}

impl WatchSpec {
    pub fn path(&self) -> PointerPath {
        PointerPath::new(self.address.clone(), self.offsets.clone())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Config {
    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        debug!(
            "Loaded config from {} ({} watch entries)",
            path.display(),
            config.watch.len()
        );
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for watch in &self.watch {
            if watch.name.trim().is_empty() {
                return Err(Error::Config("watch entry with empty name".to_string()));
            }
            if !names.insert(watch.name.as_str()) {
                return Err(Error::Config(format!("duplicate watch name '{}'", watch.name)));
            }
            if watch.interval_ms == 0 {
                return Err(Error::Config(format!(
                    "watch '{}' has a zero interval",
                    watch.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SAMPLE: &str = r#"
[target]
name = "game.exe"

[scheduler]
idle_wait_ms = 250

[poll]
timeout_ms = 20

[[watch]]
name = "health"
address = "game.exe+0x1A2B3C"
offsets = [0x10, 0x48]
type = "f32"
interval_ms = 100

[[watch]]
name = "gold"
address = "0x7FF000"
type = "u32"
interval_ms = 1000
"#;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(SAMPLE).unwrap();

        assert_eq!(
            config.target.target(),
            Some(ProcessTarget::Name("game.exe".to_string()))
        );
        assert_eq!(config.scheduler.idle_wait_ms, 250);
        assert_eq!(config.scheduler.thread_name, "remora-scheduler");
        assert_eq!(config.poll.timeout(), Duration::from_millis(20));

        let health = &config.watch[0];
        assert_eq!(health.value_type, ValueType::F32);
        assert_eq!(health.interval(), Duration::from_millis(100));
        assert_eq!(health.path().to_string(), "[game.exe+0x1a2b3c] -> +0x10 -> +0x48");

        let gold = &config.watch[1];
        assert_eq!(gold.address, AddressExpr::Absolute(0x7F_F000));
        assert!(gold.offsets.is_empty());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert!(config.target.target().is_none());
        assert_eq!(config.scheduler.idle_wait_ms, 1000);
        assert_eq!(config.poll.timeout_ms, 50);
        assert!(config.watch.is_empty());
    }

    #[test]
    fn test_pid_takes_precedence() {
        let config = Config::parse("[target]\npid = 42\nname = \"game.exe\"\n").unwrap();
        assert_eq!(config.target.target(), Some(ProcessTarget::Pid(42)));
    }

    #[test]
    fn test_rejects_zero_interval() {
        let text = "[[watch]]\nname = \"a\"\naddress = \"0x10\"\ntype = \"u8\"\ninterval_ms = 0\n";
        assert!(matches!(Config::parse(text), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let entry = "[[watch]]\nname = \"a\"\naddress = \"0x10\"\ntype = \"u8\"\ninterval_ms = 5\n";
        let text = format!("{entry}{entry}");
        let err = Config::parse(&text).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_rejects_bad_address_and_type() {
        let bad_address =
            "[[watch]]\nname = \"a\"\naddress = \"+0x10\"\ntype = \"u8\"\ninterval_ms = 5\n";
        assert!(Config::parse(bad_address).is_err());

        let bad_type =
            "[[watch]]\nname = \"a\"\naddress = \"0x10\"\ntype = \"u128\"\ninterval_ms = 5\n";
        assert!(Config::parse(bad_type).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.watch.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
