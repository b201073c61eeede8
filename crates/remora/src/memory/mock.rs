//! In-memory stand-in for a target process, for tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};

use super::accessor::ProcessMemory;
use super::process::ModuleInfo;
use super::value::PointerWidth;

/// Sparse address space made of independent byte regions.
///
/// Every `read_into` call records its address so tests can assert exactly
/// which addresses were touched.
pub struct MockMemory {
    regions: RefCell<BTreeMap<u64, Vec<u8>>>,
    modules: HashMap<String, ModuleInfo>,
    image_base: u64,
    pointer_width: PointerWidth,
    reads: RefCell<Vec<u64>>,
}

impl MockMemory {
    /// Addresses passed to `read_into`, in call order
    pub fn reads(&self) -> Vec<u64> {
        self.reads.borrow().clone()
    }

    /// Locate the region fully containing `[address, address + len)`
    fn locate(&self, address: u64, len: usize) -> Option<(u64, usize)> {
        let regions = self.regions.borrow();
        let (&start, bytes) = regions.range(..=address).next_back()?;
        let offset = usize::try_from(address - start).ok()?;
        let end = offset.checked_add(len)?;
        (end <= bytes.len()).then_some((start, offset))
    }
}

impl ProcessMemory for MockMemory {
    fn read_into(&self, address: u64, buf: &mut [u8]) -> Result<()> {
        self.reads.borrow_mut().push(address);
        let (start, offset) = self.locate(address, buf.len()).ok_or(Error::OutOfBounds {
            address,
            len: buf.len(),
        })?;
        let regions = self.regions.borrow();
        buf.copy_from_slice(&regions[&start][offset..offset + buf.len()]);
        Ok(())
    }

    fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<()> {
        let (start, offset) = self.locate(address, bytes.len()).ok_or(Error::OutOfBounds {
            address,
            len: bytes.len(),
        })?;
        let mut regions = self.regions.borrow_mut();
        if let Some(region) = regions.get_mut(&start) {
            region[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
        Ok(())
    }

    fn image_base(&self) -> u64 {
        self.image_base
    }

    fn find_module(&self, name: &str) -> Option<ModuleInfo> {
        self.modules.get(&name.to_ascii_lowercase()).cloned()
    }

    fn pointer_width(&self) -> PointerWidth {
        self.pointer_width
    }
}

#[derive(Default)]
pub struct MockMemoryBuilder {
    regions: BTreeMap<u64, Vec<u8>>,
    modules: HashMap<String, ModuleInfo>,
    image_base: u64,
    pointer_width: PointerWidth,
}

impl MockMemoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `bytes` at `address`; adjacent calls create separate regions
    pub fn with_bytes(mut self, address: u64, bytes: Vec<u8>) -> Self {
        self.regions.insert(address, bytes);
        self
    }

    pub fn with_zeroes(self, address: u64, len: usize) -> Self {
        self.with_bytes(address, vec![0; len])
    }

    pub fn with_u32(self, address: u64, value: u32) -> Self {
        self.with_bytes(address, value.to_le_bytes().to_vec())
    }

    pub fn with_u64(self, address: u64, value: u64) -> Self {
        self.with_bytes(address, value.to_le_bytes().to_vec())
    }

    pub fn with_f32(self, address: u64, value: f32) -> Self {
        self.with_bytes(address, value.to_le_bytes().to_vec())
    }

    /// Register a module; the first one registered becomes the image
    pub fn with_module(mut self, name: &str, base: u64, size: u64) -> Self {
        if self.modules.is_empty() {
            self.image_base = base;
        }
        self.modules.insert(
            name.to_ascii_lowercase(),
            ModuleInfo {
                name: name.to_string(),
                base,
                size,
            },
        );
        self
    }

    pub fn pointer_width(mut self, width: PointerWidth) -> Self {
        self.pointer_width = width;
        self
    }

    pub fn build(self) -> MockMemory {
        MockMemory {
            regions: RefCell::new(self.regions),
            modules: self.modules,
            image_base: self.image_base,
            pointer_width: self.pointer_width,
            reads: RefCell::new(Vec::new()),
        }
    }
}
