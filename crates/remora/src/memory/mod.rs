mod accessor;
mod address;
mod buffer;
pub mod chain;
mod platform;
mod process;
mod value;

#[cfg(test)]
pub mod mock;

pub use accessor::{MemoryAccessor, ProcessMemory};
pub use address::{AddressExpr, parse_number, parse_offset};
pub use buffer::MemoryBuffer;
pub use chain::{ChainBreak, PointerChain, PointerPath};
pub use process::*;
pub use value::{PointerWidth, Scalar, StringEncoding, Value, ValueType};

#[cfg(test)]
pub use mock::{MockMemory, MockMemoryBuilder};
