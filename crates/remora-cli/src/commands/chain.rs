//! Pointer chain inspection.
//!
//! Prints the address reached after each level so a broken chain shows
//! exactly where it stops:
//!
//! ```text
//! [game.exe+0x1000] -> +0x18 -> +0x40
//!   base  0x140001000
//!   +0x18 0x1f2a3b40018
//!   +0x40 0x1f2a3c00040
//! ```

use anyhow::Result;
use owo_colors::OwoColorize;
use remora::memory::chain;
use remora::{
    AddressExpr, MemoryAccessor, PointerPath, ProcessMemory, ProcessTarget, ValueType,
};

pub fn run(
    target: &ProcessTarget,
    address: &AddressExpr,
    offsets: &[i64],
    value_type: Option<ValueType>,
) -> Result<()> {
    let process = super::open(target)?;
    let mem = MemoryAccessor::new(&process);

    let path = PointerPath::new(address.clone(), offsets);
    println!("{}", path.bold());

    let base = address.resolve(&mem)?;
    println!("  {:<8}{:#x}", "base", base);

    let mut last = base;
    for depth in 1..=offsets.len() {
        let label = format_offset(offsets[depth - 1]);
        match chain::resolve(&mem, base, &offsets[..depth]) {
            Ok(at) => {
                println!("  {:<8}{:#x}", label, at);
                last = at;
            }
            Err(e) => {
                println!("  {:<8}{}", label, e.red());
                return Err(e.into());
            }
        }
    }

    if let Some(ty) = value_type {
        let value = mem.read_value(ty, last)?;
        println!("  {:<8}{} ({})", "value", value.green(), ty);
    }
    Ok(())
}

fn format_offset(offset: i64) -> String {
    if offset < 0 {
        format!("-{:#x}", offset.unsigned_abs())
    } else {
        format!("+{:#x}", offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_offset() {
        assert_eq!(format_offset(0x18), "+0x18");
        assert_eq!(format_offset(-0x10), "-0x10");
        assert_eq!(format_offset(0), "+0x0");
    }
}
