//! Process and module information.

use anyhow::Result;
use owo_colors::OwoColorize;
use remora::{ProcessTarget, find_processes};

pub fn run(target: Option<ProcessTarget>, modules: bool, filter: &str) -> Result<()> {
    let Some(target) = target else {
        return list(filter);
    };

    let process = super::open(&target)?;
    println!("{} {}", "pid:".bold(), process.pid);
    println!("{} {}", "name:".bold(), process.name);
    println!("{} {}", "pointer width:".bold(), process.pointer_width);
    println!(
        "{} {:#x} ({:#x} bytes)",
        "image base:".bold(),
        process.base_address,
        process.module_size
    );

    let loaded = process.modules();
    println!("{} {}", "modules:".bold(), loaded.len());
    if modules {
        println!();
        for module in loaded {
            println!(
                "  {:#018x}  {:>10x}  {}",
                module.base,
                module.size,
                module.name.cyan()
            );
        }
    }

    Ok(())
}

fn list(filter: &str) -> Result<()> {
    let processes = find_processes(filter)?;
    if processes.is_empty() {
        println!("No processes match {filter:?}");
        return Ok(());
    }

    for process in processes {
        println!("{:>8}  {}", process.pid, process.name);
    }
    Ok(())
}
