mod commands;
mod shutdown;

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use remora::{AddressExpr, ProcessTarget, StringEncoding, ValueType};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "remora", version)]
#[command(about = "Inspect, patch and watch the memory of a running process")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Process selection shared by every command
#[derive(Args, Clone, Debug)]
pub struct TargetArgs {
    /// Process id
    #[arg(short, long, conflicts_with = "name")]
    pub pid: Option<u32>,

    /// Process image name (case-insensitive, `*` and `?` wildcards)
    #[arg(short, long, env = "REMORA_TARGET")]
    pub name: Option<String>,
}

impl TargetArgs {
    pub fn target(&self) -> Option<ProcessTarget> {
        match (self.pid, &self.name) {
            (Some(pid), _) => Some(ProcessTarget::Pid(pid)),
            (None, Some(name)) => Some(ProcessTarget::Name(name.clone())),
            (None, None) => None,
        }
    }

    pub fn require(&self) -> Result<ProcessTarget> {
        match self.target() {
            Some(target) => Ok(target),
            None => bail!("No target process: pass --pid or --name"),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Show a process and its modules, or list processes
    Info {
        #[command(flatten)]
        target: TargetArgs,

        /// List loaded modules
        #[arg(short, long)]
        modules: bool,

        /// Filter for the process list when no target is given
        #[arg(short, long, default_value = "*")]
        filter: String,
    },
    /// Read a value
    Read {
        #[command(flatten)]
        target: TargetArgs,

        /// Address (`0x1000`, `game.exe+0x20`, `libfoo.so`)
        address: AddressExpr,

        /// Pointer offsets to follow from the address
        #[arg(short, long, value_delimiter = ',', allow_hyphen_values = true, value_parser = parse_offset)]
        offsets: Vec<i64>,

        /// Value type
        #[arg(short = 't', long = "type", default_value = "u32")]
        value_type: ValueType,

        /// Read a terminated string of at most this many bytes instead
        #[arg(short, long)]
        string: Option<usize>,

        /// Encoding for --string
        #[arg(short, long, default_value = "utf8")]
        encoding: StringEncoding,
    },
    /// Write a value
    Write {
        #[command(flatten)]
        target: TargetArgs,

        address: AddressExpr,

        /// New value, parsed according to --type
        #[arg(allow_hyphen_values = true)]
        value: String,

        #[arg(short, long, value_delimiter = ',', allow_hyphen_values = true, value_parser = parse_offset)]
        offsets: Vec<i64>,

        #[arg(short = 't', long = "type", default_value = "u32")]
        value_type: ValueType,
    },
    /// Resolve a pointer chain step by step
    Chain {
        #[command(flatten)]
        target: TargetArgs,

        /// Base address
        address: AddressExpr,

        /// Offsets applied after each dereference
        #[arg(allow_hyphen_values = true, value_parser = parse_offset)]
        offsets: Vec<i64>,

        /// Also read a value of this type at the final address
        #[arg(short = 't', long = "type")]
        value_type: Option<ValueType>,
    },
    /// Dump raw memory bytes
    Hexdump {
        #[command(flatten)]
        target: TargetArgs,

        address: AddressExpr,

        /// Number of bytes
        #[arg(short, long, default_value = "256", value_parser = parse_size)]
        size: usize,

        /// Hide the ASCII column
        #[arg(long)]
        no_ascii: bool,
    },
    /// Sample the values in a watch file until interrupted
    Watch {
        #[command(flatten)]
        target: TargetArgs,

        /// TOML watch file
        #[arg(short, long, default_value = "remora.toml")]
        config: PathBuf,

        /// Print JSON lines instead of text
        #[arg(long)]
        json: bool,

        /// Print every sample, not only changes
        #[arg(long)]
        all: bool,
    },
}

fn parse_offset(s: &str) -> Result<i64, String> {
    remora::memory::parse_offset(s).ok_or_else(|| format!("invalid offset: {s}"))
}

fn parse_size(s: &str) -> Result<usize, String> {
    remora::memory::parse_number(s)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| format!("invalid size: {s}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "remora=debug" } else { "remora=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Info {
            target,
            modules,
            filter,
        } => commands::info::run(target.target(), modules, &filter),
        Command::Read {
            target,
            address,
            offsets,
            value_type,
            string,
            encoding,
        } => {
            let what = match string {
                Some(max_len) => commands::read::ReadKind::String { max_len, encoding },
                None => commands::read::ReadKind::Value(value_type),
            };
            commands::read::run(&target.require()?, &address, &offsets, what)
        }
        Command::Write {
            target,
            address,
            value,
            offsets,
            value_type,
        } => commands::write::run(&target.require()?, &address, &offsets, value_type, &value),
        Command::Chain {
            target,
            address,
            offsets,
            value_type,
        } => commands::chain::run(&target.require()?, &address, &offsets, value_type),
        Command::Hexdump {
            target,
            address,
            size,
            no_ascii,
        } => commands::hexdump::run(&target.require()?, &address, size, !no_ascii),
        Command::Watch {
            target,
            config,
            json,
            all,
        } => commands::watch::run(&config, target.target(), json, all),
    }
}
