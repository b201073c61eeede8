use anyhow::Result;
use remora::{AddressExpr, MemoryAccessor, ProcessMemory, ProcessTarget, StringEncoding, ValueType};

pub enum ReadKind {
    Value(ValueType),
    String {
        max_len: usize,
        encoding: StringEncoding,
    },
}

pub fn run(target: &ProcessTarget, address: &AddressExpr, offsets: &[i64], what: ReadKind) -> Result<()> {
    let process = super::open(target)?;
    let mem = MemoryAccessor::new(&process);
    let at = super::locate(&mem, address, offsets)?;

    match what {
        ReadKind::Value(ty) => {
            let value = mem.read_value(ty, at)?;
            println!("{:#x}: {} ({})", at, value, ty);
        }
        ReadKind::String { max_len, encoding } => {
            let text = mem.read_string(at, max_len, encoding)?;
            println!("{:#x}: {:?}", at, text);
        }
    }
    Ok(())
}
