//! A minimal in-memory [`ProcessMemoryAdapter`] used by this workspace's
//! test suites. Not part of the public API surface consumed by a real
//! shell — it exists so `memtrace-search` and `memtrace-freeze` can drive
//! the engine/freezer against a target they fully control.

use std::collections::BTreeMap;

use crate::{CoreError, ProcessMemoryAdapter, Protection, Region};

#[derive(Debug, Clone)]
struct Mapping {
    addr: u64,
    bytes: Vec<u8>,
    prot: Protection,
}

/// A fake target address space: a handful of named byte buffers at fixed
/// addresses, plus pause/resume call counters so tests can assert on
/// `PauseGuard`'s RAII behaviour.
#[derive(Debug, Default)]
pub struct FakeAdapter {
    mappings: BTreeMap<u64, Mapping>,
    pub pause_count: u32,
    pub resume_count: u32,
}

impl FakeAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_region(mut self, addr: u64, bytes: Vec<u8>) -> Self {
        self.map(addr, bytes);
        self
    }

    pub fn map(&mut self, addr: u64, bytes: Vec<u8>) {
        self.mappings.insert(
            addr,
            Mapping {
                addr,
                bytes,
                prot: Protection::rw(),
            },
        );
    }

    fn mapping_containing(&self, addr: u64) -> Option<&Mapping> {
        self.mappings
            .range(..=addr)
            .next_back()
            .map(|(_, m)| m)
            .filter(|m| addr < m.addr + m.bytes.len() as u64)
    }

    fn mapping_containing_mut(&mut self, addr: u64) -> Option<&mut Mapping> {
        let key = self
            .mappings
            .range(..=addr)
            .next_back()
            .map(|(&k, _)| k)?;
        let m = self.mappings.get_mut(&key)?;
        if addr < m.addr + m.bytes.len() as u64 {
            Some(m)
        } else {
            None
        }
    }

    fn region_for(mapping: &Mapping, read_data: bool) -> Region {
        let r = Region::new(
            mapping.addr,
            mapping.bytes.len() as u64,
            mapping.prot.readable,
            mapping.prot.writable,
            mapping.prot.executable,
            true,
            true,
            false,
        );
        if read_data && mapping.prot.readable {
            r.with_data(mapping.bytes.clone())
        } else {
            r
        }
    }
}

impl ProcessMemoryAdapter for FakeAdapter {
    fn attach(&mut self, _pid: u32) -> Result<(), CoreError> {
        Ok(())
    }

    fn get_region(&mut self, addr: u64, read_data: bool) -> Result<Region, CoreError> {
        self.mapping_containing(addr)
            .map(|m| Self::region_for(m, read_data))
            .ok_or_else(|| CoreError::OutOfRange(format!("no region contains {addr:#x}")))
    }

    fn get_all_regions(&mut self, read_data: bool) -> Result<Vec<Region>, CoreError> {
        Ok(self
            .mappings
            .values()
            .map(|m| Self::region_for(m, read_data))
            .collect())
    }

    fn get_target_regions(
        &mut self,
        addresses: &[u64],
        read_data: bool,
    ) -> Result<Vec<Region>, CoreError> {
        let mut out = Vec::new();
        for mapping in self.mappings.values() {
            if addresses
                .iter()
                .any(|&a| a >= mapping.addr && a < mapping.addr + mapping.bytes.len() as u64)
            {
                out.push(Self::region_for(mapping, read_data));
            }
        }
        Ok(out)
    }

    fn set_protection(
        &mut self,
        addr: u64,
        _size: u64,
        prot: Protection,
        mask: Protection,
    ) -> Result<(), CoreError> {
        let mapping = self
            .mapping_containing_mut(addr)
            .ok_or_else(|| CoreError::OutOfRange(format!("no region contains {addr:#x}")))?;
        if mask.readable {
            mapping.prot.readable = prot.readable;
        }
        if mask.writable {
            mapping.prot.writable = prot.writable;
        }
        if mask.executable {
            mapping.prot.executable = prot.executable;
        }
        Ok(())
    }

    fn read(&mut self, addr: u64, size: u64) -> Result<Vec<u8>, CoreError> {
        let mapping = self
            .mapping_containing(addr)
            .ok_or_else(|| CoreError::OutOfRange(format!("no region contains {addr:#x}")))?;
        let offset = (addr - mapping.addr) as usize;
        mapping
            .bytes
            .get(offset..offset + size as usize)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| CoreError::OutOfRange(format!("read past end of region at {addr:#x}")))
    }

    fn write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), CoreError> {
        let mapping = self
            .mapping_containing_mut(addr)
            .ok_or_else(|| CoreError::OutOfRange(format!("no region contains {addr:#x}")))?;
        let offset = (addr - mapping.addr) as usize;
        let end = offset + bytes.len();
        if end > mapping.bytes.len() {
            return Err(CoreError::AdapterIo(format!(
                "write past end of region at {addr:#x}"
            )));
        }
        mapping.bytes[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), CoreError> {
        self.pause_count += 1;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), CoreError> {
        self.resume_count += 1;
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), CoreError> {
        Ok(())
    }
}
