//! Owned local byte region for batching remote reads.
//!
//! A structure is usually read with a single [`ProcessMemory::read_buffer`]
//! call and then picked apart field by field here, instead of issuing one
//! cross-process read per field.
//!
//! [`ProcessMemory::read_buffer`]: super::ProcessMemory::read_buffer

use crate::error::{Error, Result};

use super::value::{Scalar, StringEncoding, Value, ValueType};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryBuffer {
    data: Vec<u8>,
    len: usize,
}

impl MemoryBuffer {
    /// Zero-filled buffer whose logical length equals its capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            len: capacity,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        Self { data: bytes, len }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Logical size: how many bytes hold meaningful data
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn check(&self, offset: usize, width: usize) -> Result<std::ops::Range<usize>> {
        match offset.checked_add(width) {
            Some(end) if end <= self.data.len() => Ok(offset..end),
            _ => Err(Error::BufferOutOfBounds {
                offset,
                width,
                capacity: self.data.len(),
            }),
        }
    }

    pub fn get<T: Scalar>(&self, offset: usize) -> Result<T> {
        let range = self.check(offset, T::SIZE)?;
        T::decode(&self.data[range]).ok_or(Error::BufferOutOfBounds {
            offset,
            width: T::SIZE,
            capacity: self.data.len(),
        })
    }

    pub fn set<T: Scalar>(&mut self, offset: usize, value: T) -> Result<()> {
        let range = self.check(offset, T::SIZE)?;
        value.encode(&mut self.data[range]);
        Ok(())
    }

    pub fn get_value(&self, ty: ValueType, offset: usize) -> Result<Value> {
        let range = self.check(offset, ty.size())?;
        ty.decode(&self.data[range]).ok_or(Error::BufferOutOfBounds {
            offset,
            width: ty.size(),
            capacity: self.data.len(),
        })
    }

    pub fn set_value(&mut self, offset: usize, value: Value) -> Result<()> {
        let bytes = value.to_bytes();
        let range = self.check(offset, bytes.len())?;
        self.data[range].copy_from_slice(&bytes);
        Ok(())
    }

    pub fn get_bytes(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let range = self.check(offset, len)?;
        Ok(&self.data[range])
    }

    pub fn set_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let range = self.check(offset, bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Read `N` consecutive `f32` values
    pub fn get_floats<const N: usize>(&self, offset: usize) -> Result<[f32; N]> {
        let range = self.check(offset, N * f32::SIZE)?;
        let mut out = [0.0f32; N];
        for (slot, chunk) in out
            .iter_mut()
            .zip(self.data[range].chunks_exact(f32::SIZE))
        {
            *slot = f32::decode(chunk).unwrap_or_default();
        }
        Ok(out)
    }

    pub fn set_floats<const N: usize>(&mut self, offset: usize, values: [f32; N]) -> Result<()> {
        let range = self.check(offset, N * f32::SIZE)?;
        for (value, chunk) in values
            .iter()
            .zip(self.data[range].chunks_exact_mut(f32::SIZE))
        {
            value.encode(chunk);
        }
        Ok(())
    }

    pub fn get_vec2(&self, offset: usize) -> Result<[f32; 2]> {
        self.get_floats(offset)
    }

    pub fn get_vec3(&self, offset: usize) -> Result<[f32; 3]> {
        self.get_floats(offset)
    }

    pub fn get_vec4(&self, offset: usize) -> Result<[f32; 4]> {
        self.get_floats(offset)
    }

    /// Read a null-terminated UTF-8 string (invalid sequences are replaced).
    pub fn get_string(&self, offset: usize, max_len: Option<usize>) -> Result<String> {
        self.get_string_encoded(offset, max_len, StringEncoding::Utf8)
    }

    /// Read a terminated string in the given encoding.
    ///
    /// Scanning stops at the terminator, after `max_len` bytes, or at the end
    /// of the buffer, whichever comes first. The scanned prefix is returned
    /// without the terminator.
    pub fn get_string_encoded(
        &self,
        offset: usize,
        max_len: Option<usize>,
        encoding: StringEncoding,
    ) -> Result<String> {
        if offset > self.data.len() {
            return Err(Error::BufferOutOfBounds {
                offset,
                width: 0,
                capacity: self.data.len(),
            });
        }

        let available = self.data.len() - offset;
        let window_len = max_len.map_or(available, |max| max.min(available));
        let window = &self.data[offset..offset + window_len];

        let end = encoding
            .find_terminator(window)
            .unwrap_or(window.len() - window.len() % encoding.unit_width());

        Ok(encoding.decode(&window[..end]))
    }

    /// Reallocate to `new_size` bytes, keeping the first `min(old, new)`
    /// bytes and zero-filling any growth.
    pub fn resize(&mut self, new_size: usize) {
        self.data.resize(new_size, 0);
        self.data.shrink_to_fit();
        self.len = new_size;
    }

    /// Zero every byte; capacity and logical length are unchanged
    pub fn clear(&mut self) {
        self.data.fill(0);
    }
}

impl AsRef<[u8]> for MemoryBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}
