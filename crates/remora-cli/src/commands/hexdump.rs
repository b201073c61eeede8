//! Hexdump command implementation.
//!
//! Rows are labelled with absolute addresses:
//!
//! ```text
//! 0x7FF6A000: 48 65 6C 6C 6F 20 57 6F  72 6C 64 00 00 00 00 00  |Hello World.....|
//! ```

use std::fmt::Write;

use anyhow::Result;
use remora::{AddressExpr, MemoryAccessor, ProcessMemory, ProcessTarget};

pub fn run(target: &ProcessTarget, address: &AddressExpr, size: usize, ascii: bool) -> Result<()> {
    let process = super::open(target)?;
    let mem = MemoryAccessor::new(&process);

    let start = address.resolve(&mem)?;
    let buffer = mem.read_buffer(start, size)?;

    println!("Hexdump at {} = 0x{:X} ({} bytes):", address, start, size);
    println!();
    print!("{}", format_dump(start, buffer.as_bytes(), ascii));
    Ok(())
}

fn format_dump(start: u64, bytes: &[u8], ascii: bool) -> String {
    let mut out = String::new();

    for (i, chunk) in bytes.chunks(16).enumerate() {
        let _ = write!(out, "0x{:08X}: ", start + (i as u64) * 16);

        for j in 0..16 {
            if j == 8 {
                out.push(' ');
            }
            match chunk.get(j) {
                Some(byte) => {
                    let _ = write!(out, "{:02X} ", byte);
                }
                None => out.push_str("   "),
            }
        }

        if ascii {
            out.push_str(" |");
            for &byte in chunk {
                out.push(if (0x20..0x7F).contains(&byte) {
                    byte as char
                } else {
                    '.'
                });
            }
            for _ in chunk.len()..16 {
                out.push(' ');
            }
            out.push('|');
        }

        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_row() {
        let dump = format_dump(0x1000, b"Hello World\0\0\0\0\0", true);
        assert_eq!(
            dump,
            "0x00001000: 48 65 6C 6C 6F 20 57 6F  72 6C 64 00 00 00 00 00  |Hello World.....|\n"
        );
    }

    #[test]
    fn test_partial_row_is_padded() {
        let dump = format_dump(0x20, &[0xAB, 0xCD], true);
        let line = dump.lines().next().unwrap();
        assert!(line.starts_with("0x00000020: AB CD "));
        assert!(line.ends_with("|..              |"));
    }

    #[test]
    fn test_without_ascii_and_multiple_rows() {
        let bytes: Vec<u8> = (0..20).collect();
        let dump = format_dump(0, &bytes, false);
        let lines: Vec<_> = dump.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("0x00000010: 10 11 12 13"));
        assert!(!dump.contains('|'));
    }
}
