//! Multi-level pointer chain resolution.
//!
//! A chain `base -> [o1, o2, o3]` is walked as:
//!
//! ```text
//! p1 = *(base)     ; addr = p1 + o1
//! p2 = *(addr)     ; addr = p2 + o2
//! p3 = *(addr)     ; addr = p3 + o3   -> returned
//! ```
//!
//! The result is an address, not a value; callers do the final typed read.
//! A null or unreadable pointer at any step ends the walk immediately.

use std::fmt;

use strum::Display;
use tracing::trace;

use crate::error::{Error, Result};

use super::accessor::ProcessMemory;
use super::address::AddressExpr;

/// Why a chain could not be followed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ChainBreak {
    #[strum(serialize = "null pointer")]
    NullPointer,
    #[strum(serialize = "unreadable pointer")]
    Unreadable,
}

/// Walk `offsets` starting from `base` and return the final address.
pub fn resolve<M: ProcessMemory + ?Sized>(mem: &M, base: u64, offsets: &[i64]) -> Result<u64> {
    let mut current = base;

    for (step, &offset) in offsets.iter().enumerate() {
        let ptr = match mem.read_pointer(current) {
            Ok(0) => {
                trace!("Chain step {} hit null at {:#x}", step, current);
                return Err(Error::BrokenChain {
                    step,
                    address: current,
                    cause: ChainBreak::NullPointer,
                });
            }
            Ok(ptr) => ptr,
            Err(e) => {
                trace!("Chain step {} unreadable at {:#x}: {}", step, current, e);
                return Err(Error::BrokenChain {
                    step,
                    address: current,
                    cause: ChainBreak::Unreadable,
                });
            }
        };
        current = ptr.wrapping_add_signed(offset);
    }

    Ok(current)
}

/// A base address plus offsets, resolved fresh on every call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerChain {
    pub base: u64,
    pub offsets: Vec<i64>,
}

impl PointerChain {
    pub fn new(base: u64, offsets: impl Into<Vec<i64>>) -> Self {
        Self {
            base,
            offsets: offsets.into(),
        }
    }

    pub fn resolve<M: ProcessMemory + ?Sized>(&self, mem: &M) -> Result<u64> {
        resolve(mem, self.base, &self.offsets)
    }
}

/// Like [`PointerChain`], but the base may be module-relative
/// (`game.exe+0x1234`), so the path stays valid across restarts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerPath {
    pub base: AddressExpr,
    pub offsets: Vec<i64>,
}

impl PointerPath {
    pub fn new(base: AddressExpr, offsets: impl Into<Vec<i64>>) -> Self {
        Self {
            base,
            offsets: offsets.into(),
        }
    }

    /// Bind the base against the target's module table
    pub fn to_chain<M: ProcessMemory + ?Sized>(&self, mem: &M) -> Result<PointerChain> {
        Ok(PointerChain::new(self.base.resolve(mem)?, self.offsets.clone()))
    }

    pub fn resolve<M: ProcessMemory + ?Sized>(&self, mem: &M) -> Result<u64> {
        resolve(mem, self.base.resolve(mem)?, &self.offsets)
    }
}

impl fmt::Display for PointerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.base)?;
        for offset in &self.offsets {
            if *offset < 0 {
                write!(f, " -> -{:#x}", offset.unsigned_abs())?;
            } else {
                write!(f, " -> +{:#x}", offset)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::mock::MockMemoryBuilder;
    use crate::memory::value::PointerWidth;

    #[test]
    fn test_resolve_three_levels() {
        let mem = MockMemoryBuilder::new()
            .with_u64(0x1000, 0x2000)
            .with_u64(0x2010, 0x3000)
            .with_u64(0x3020, 0x4000)
            .build();

        assert_eq!(resolve(&mem, 0x1000, &[0x10, 0x20, 0x30]).unwrap(), 0x4030);
        assert_eq!(mem.reads(), vec![0x1000, 0x2010, 0x3020]);
    }

    #[test]
    fn test_empty_chain_returns_base() {
        let mem = MockMemoryBuilder::new().build();
        assert_eq!(resolve(&mem, 0x1234, &[]).unwrap(), 0x1234);
        assert!(mem.reads().is_empty());
    }

    #[test]
    fn test_null_pointer_short_circuits() {
        let mem = MockMemoryBuilder::new()
            .with_u64(0x1000, 0x2000)
            .with_u64(0x2010, 0)
            // Would be read if the null were followed as address 0 + 0x20
            .with_u64(0x20, 0x5000)
            .build();

        let err = resolve(&mem, 0x1000, &[0x10, 0x20, 0x30]).unwrap_err();
        assert!(matches!(
            err,
            Error::BrokenChain {
                step: 1,
                address: 0x2010,
                cause: ChainBreak::NullPointer
            }
        ));
        assert_eq!(mem.reads(), vec![0x1000, 0x2010]);
    }

    #[test]
    fn test_unreadable_pointer_short_circuits() {
        let mem = MockMemoryBuilder::new().with_u64(0x1000, 0xDEAD_0000).build();

        let err = resolve(&mem, 0x1000, &[0x8, 0x10]).unwrap_err();
        assert!(matches!(
            err,
            Error::BrokenChain {
                step: 1,
                address: 0xDEAD_0008,
                cause: ChainBreak::Unreadable
            }
        ));
        assert_eq!(mem.reads().len(), 2);
    }

    #[test]
    fn test_negative_offsets() {
        let mem = MockMemoryBuilder::new().with_u64(0x1000, 0x2000).build();
        assert_eq!(resolve(&mem, 0x1000, &[-0x10]).unwrap(), 0x1FF0);
    }

    #[test]
    fn test_32bit_target() {
        let mem = MockMemoryBuilder::new()
            .with_u32(0x1000, 0x2000)
            .with_u32(0x2004, 0x3000)
            .pointer_width(PointerWidth::Bits32)
            .build();
        let chain = PointerChain::new(0x1000, [4, 8]);
        assert_eq!(chain.resolve(&mem).unwrap(), 0x3008);
    }

    #[test]
    fn test_pointer_path_module_relative() {
        let mem = MockMemoryBuilder::new()
            .with_module("game.exe", 0x40_0000, 0x10_0000)
            .with_u64(0x40_1000, 0x9000)
            .build();

        let path = PointerPath::new("game.exe+0x1000".parse().unwrap(), [0x18]);
        assert_eq!(path.resolve(&mem).unwrap(), 0x9018);
        assert_eq!(path.to_chain(&mem).unwrap().base, 0x40_1000);
        assert_eq!(path.to_string(), "[game.exe+0x1000] -> +0x18");

        let missing = PointerPath::new("other.dll+0x10".parse().unwrap(), [0]);
        assert!(matches!(
            missing.resolve(&mem),
            Err(Error::ModuleNotFound(_))
        ));
    }
}
