use tracing::trace;

use crate::error::{Error, Result};

use super::buffer::MemoryBuffer;
use super::process::{ModuleInfo, ProcessHandle};
use super::value::{PointerWidth, Scalar, StringEncoding, Value, ValueType};

/// Granularity of chunked string reads
const PAGE_SIZE: u64 = 0x1000;

/// Read/write access to the address space of a target process.
///
/// Implementors provide raw byte transfer and module lookup; everything else
/// (typed access, pointers, buffers, strings) is layered on top.
pub trait ProcessMemory {
    /// Fill `buf` with the bytes at `address`
    fn read_into(&self, address: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `bytes` to `address`
    fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<()>;

    /// Base address of the primary executable module
    fn image_base(&self) -> u64;

    /// Look up a loaded module by name (case-insensitive)
    fn find_module(&self, name: &str) -> Option<ModuleInfo>;

    fn pointer_width(&self) -> PointerWidth {
        PointerWidth::Bits64
    }

    fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_into(address, &mut buf)?;
        Ok(buf)
    }

    fn read<T: Scalar>(&self, address: u64) -> Result<T>
    where
        Self: Sized,
    {
        let mut raw = [0u8; 8];
        let raw = &mut raw[..T::SIZE];
        self.read_into(address, raw)?;
        T::decode(raw).ok_or(Error::OutOfBounds {
            address,
            len: T::SIZE,
        })
    }

    fn write<T: Scalar>(&self, address: u64, value: T) -> Result<()>
    where
        Self: Sized,
    {
        let mut raw = [0u8; 8];
        value.encode(&mut raw);
        self.write_bytes(address, &raw[..T::SIZE])
    }

    fn read_value(&self, ty: ValueType, address: u64) -> Result<Value> {
        let mut raw = [0u8; 8];
        let raw = &mut raw[..ty.size()];
        self.read_into(address, raw)?;
        ty.decode(raw).ok_or(Error::OutOfBounds {
            address,
            len: ty.size(),
        })
    }

    fn write_value(&self, address: u64, value: Value) -> Result<()> {
        self.write_bytes(address, &value.to_bytes())
    }

    /// Read a pointer-width unsigned integer
    fn read_pointer(&self, address: u64) -> Result<u64> {
        let width = self.pointer_width();
        let mut raw = [0u8; 8];
        let raw = &mut raw[..width.bytes()];
        self.read_into(address, raw)?;
        width.decode(raw).ok_or(Error::OutOfBounds {
            address,
            len: width.bytes(),
        })
    }

    /// Read `len` bytes into a [`MemoryBuffer`] with a single transfer
    fn read_buffer(&self, address: u64, len: usize) -> Result<MemoryBuffer> {
        let mut buffer = MemoryBuffer::new(len);
        self.read_into(address, buffer.as_mut_slice())?;
        Ok(buffer)
    }

    /// Read a terminated string of at most `max_len` bytes.
    ///
    /// Reads one page at a time and stops at the terminator, so a short
    /// string near the end of a mapped region does not need `max_len` bytes
    /// to be readable. An inaccessible page after the first ends the string.
    fn read_string(&self, address: u64, max_len: usize, encoding: StringEncoding) -> Result<String> {
        let mut bytes = Vec::new();
        // Prefix already searched for a terminator, in whole code units
        let mut scanned = 0;

        while bytes.len() < max_len {
            let at = address.wrapping_add(bytes.len() as u64);
            let to_page_end = (PAGE_SIZE - at % PAGE_SIZE) as usize;
            let start = bytes.len();
            bytes.resize(start + to_page_end.min(max_len - start), 0);

            match self.read_into(at, &mut bytes[start..]) {
                Ok(()) => {}
                Err(Error::OutOfBounds { .. }) if start > 0 => {
                    trace!("String at {:#x} runs into unreadable memory at {:#x}", address, at);
                    bytes.truncate(start);
                    break;
                }
                Err(e) => return Err(e),
            }

            if let Some(end) = encoding.find_terminator(&bytes[scanned..]) {
                bytes.truncate(scanned + end);
                return Ok(encoding.decode(&bytes));
            }
            scanned = bytes.len() - bytes.len() % encoding.unit_width();
        }

        MemoryBuffer::from_bytes(bytes).get_string_encoded(0, None, encoding)
    }
}

/// [`ProcessMemory`] over an opened [`ProcessHandle`].
pub struct MemoryAccessor<'a> {
    process: &'a ProcessHandle,
}

impl<'a> MemoryAccessor<'a> {
    pub fn new(process: &'a ProcessHandle) -> Self {
        Self { process }
    }

    pub fn process(&self) -> &ProcessHandle {
        self.process
    }

    /// Classify an OS-level failure: a dead target is an invalid handle,
    /// anything else means the range was not accessible.
    fn access_error(&self, address: u64, len: usize, source: std::io::Error) -> Error {
        if !self.process.is_valid() {
            return Error::InvalidHandle(format!("process {} has exited", self.process.pid));
        }
        trace!(
            "Access of {} bytes at {:#x} failed: {}",
            len, address, source
        );
        Error::OutOfBounds { address, len }
    }
}

impl ProcessMemory for MemoryAccessor<'_> {
    fn read_into(&self, address: u64, buf: &mut [u8]) -> Result<()> {
        let raw = self.process.raw()?;
        if buf.is_empty() {
            return Ok(());
        }
        let len = buf.len();
        raw.read(address, buf)
            .map_err(|e| self.access_error(address, len, e))
    }

    fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<()> {
        let raw = self.process.raw()?;
        if bytes.is_empty() {
            return Ok(());
        }
        raw.write(address, bytes)
            .map_err(|e| self.access_error(address, bytes.len(), e))
    }

    fn image_base(&self) -> u64 {
        self.process.base_address
    }

    fn find_module(&self, name: &str) -> Option<ModuleInfo> {
        self.process.module(name).cloned()
    }

    fn pointer_width(&self) -> PointerWidth {
        self.process.pointer_width
    }
}
