use anyhow::Result;
use remora::{AddressExpr, MemoryAccessor, ProcessMemory, ProcessTarget, Value, ValueType};
use tracing::info;

pub fn run(
    target: &ProcessTarget,
    address: &AddressExpr,
    offsets: &[i64],
    ty: ValueType,
    text: &str,
) -> Result<()> {
    let value = Value::parse(ty, text)?;

    let process = super::open(target)?;
    let mem = MemoryAccessor::new(&process);
    let at = super::locate(&mem, address, offsets)?;

    let previous = mem.read_value(ty, at)?;
    mem.write_value(at, value)?;
    info!("Wrote {} to {:#x}", value, at);
    println!("{:#x}: {} -> {} ({})", at, previous, value, ty);
    Ok(())
}
