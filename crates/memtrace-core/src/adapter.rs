use crate::{CoreError, Region};

/// Protection bits for a memory region, or a mask selecting which bits a
/// `set_protection` call should touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Protection {
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
}

impl Protection {
    #[must_use]
    pub const fn new(readable: bool, writable: bool, executable: bool) -> Self {
        Self {
            readable,
            writable,
            executable,
        }
    }

    #[must_use]
    pub const fn none() -> Self {
        Self::new(false, false, false)
    }

    #[must_use]
    pub const fn rw() -> Self {
        Self::new(true, true, false)
    }
}

/// Uniform read/write/enumerate/protect/pause/resume surface over a target
/// process, consumed by the search engine and the region freezer (spec.md
/// §6). A real implementation of this trait (Mach task ports, region
/// enumeration, etc.) lives outside this workspace.
pub trait ProcessMemoryAdapter {
    /// Establish a task handle for `pid`. Fails with `AdapterIo` if denied.
    fn attach(&mut self, pid: u32) -> Result<(), CoreError>;

    /// The region containing `addr`. Fails with `OutOfRange` if none does.
    fn get_region(&mut self, addr: u64, read_data: bool) -> Result<Region, CoreError>;

    /// All regions, ordered and non-overlapping.
    fn get_all_regions(&mut self, read_data: bool) -> Result<Vec<Region>, CoreError>;

    /// Only the regions containing at least one of `addresses`. Used by
    /// refinement passes so they don't have to re-walk the entire address
    /// space for a handful of surviving results.
    fn get_target_regions(
        &mut self,
        addresses: &[u64],
        read_data: bool,
    ) -> Result<Vec<Region>, CoreError>;

    /// Update the protection bits of `[addr, addr+size)`, touching only the
    /// bits set in `mask`.
    fn set_protection(
        &mut self,
        addr: u64,
        size: u64,
        prot: Protection,
        mask: Protection,
    ) -> Result<(), CoreError>;

    /// Read `size` bytes at `addr`.
    fn read(&mut self, addr: u64, size: u64) -> Result<Vec<u8>, CoreError>;

    /// Write `bytes` at `addr`. Fails with `AdapterIo` on denial.
    fn write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), CoreError>;

    fn pause(&mut self) -> Result<(), CoreError>;
    fn resume(&mut self) -> Result<(), CoreError>;
    fn terminate(&mut self) -> Result<(), CoreError>;
}

/// A process thread's AMD64 general-purpose register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThreadRegisters {
    /// Indexed 0..=15 in the usual rax, rcx, rdx, rbx, rsp, rbp, rsi, rdi,
    /// r8..=r15 order used throughout `memtrace-x86`.
    pub gprs: [u64; 16],
    pub rip: u64,
    pub rflags: u64,
}

/// Optional surface for viewing/editing a target thread's registers. Kept
/// separate from `ProcessMemoryAdapter` so an adapter that only supports
/// memory operations still satisfies the search engine's and freezer's
/// bound (spec.md §6: "used by the shell, not by the search core").
pub trait ThreadRegisterAccess {
    fn list_threads(&mut self) -> Result<Vec<u64>, CoreError>;
    fn read_registers(&mut self, thread: u64) -> Result<ThreadRegisters, CoreError>;
    fn write_registers(&mut self, thread: u64, regs: &ThreadRegisters) -> Result<(), CoreError>;
}
