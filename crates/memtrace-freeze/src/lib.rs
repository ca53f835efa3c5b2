//! A process-wide, thread-safe store of frozen regions plus a single
//! background writer that periodically enforces them (spec.md §4.2).
//!
//! [`RegionFreezer::new`] spawns exactly one writer thread that sweeps the
//! store roughly every [`FreezerConfig::sweep_interval`] and invokes each
//! enabled entry's type-specific write step. Writer errors never bubble up
//! — they are captured per entry and surfaced through [`FrozenRegionInfo`]
//! for listing (spec.md §7, "Freezer writer errors are *always* caught").

mod masked_compare;
mod region;
mod store;
mod write_step;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use memtrace_core::{CoreError, ProcessMemoryAdapter};

pub use masked_compare::{compare_unmasked, masked_compare};
pub use region::FrozenKind;

use region::FrozenEntry;
use store::Store;

/// Tunables the writer thread observes. The ~10 ms sweep interval is the
/// one concrete number spec.md §4.2 names.
#[derive(Debug, Clone, Copy)]
pub struct FreezerConfig {
    pub sweep_interval: Duration,
}

impl Default for FreezerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_millis(10),
        }
    }
}

/// A read-only snapshot of one frozen region, for listing/printing.
/// Ascending-`index` order is the caller's responsibility to preserve
/// (see [`RegionFreezer::list`]).
#[derive(Debug, Clone)]
pub struct FrozenRegionInfo {
    pub name: String,
    pub index: u64,
    pub addr: u64,
    pub enabled: bool,
    pub last_error: Option<String>,
    pub kind: FrozenKind,
}

type SharedAdapter = Arc<Mutex<dyn ProcessMemoryAdapter + Send>>;

/// The freezer itself: owns the triple-indexed store and the background
/// writer thread's lifecycle.
pub struct RegionFreezer {
    store: Arc<Store>,
    should_exit: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl RegionFreezer {
    /// Spawns the background writer against `adapter`, per `config`.
    #[must_use]
    pub fn new(adapter: SharedAdapter, config: FreezerConfig) -> Self {
        let store = Arc::new(Store::new());
        let should_exit = Arc::new(AtomicBool::new(false));

        let thread = {
            let store = store.clone();
            let should_exit = should_exit.clone();
            thread::spawn(move || run_write_loop(&store, &adapter, &should_exit, config))
        };

        Self {
            store,
            should_exit,
            thread: Some(thread),
        }
    }

    /// Freezes a single address to `bytes` (spec.md §3, "Frozen Region
    /// (scalar)"). Returns the new entry's process-monotonic index.
    pub fn freeze(&self, name: impl Into<String>, addr: u64, bytes: Vec<u8>, enabled: bool) -> Result<u64, CoreError> {
        if bytes.is_empty() {
            return Err(CoreError::InvalidArgument(
                "frozen region data must not be empty".to_string(),
            ));
        }
        Ok(self
            .store
            .add(name.into(), addr, FrozenKind::Scalar { bytes }, enabled))
    }

    /// Freezes an array slot region: the writer keeps at least one of
    /// `slot_count` equally sized slots equal to `bytes` under
    /// `value_mask`, preserving other live entries (spec.md §3, "Frozen
    /// Region (array)").
    #[allow(clippy::too_many_arguments)]
    pub fn freeze_array(
        &self,
        name: impl Into<String>,
        addr: u64,
        slot_count: usize,
        bytes: Vec<u8>,
        value_mask: Vec<u8>,
        null_value: Option<Vec<u8>>,
        null_value_mask: Option<Vec<u8>>,
        enabled: bool,
    ) -> Result<u64, CoreError> {
        if bytes.is_empty() {
            return Err(CoreError::InvalidArgument(
                "frozen region data must not be empty".to_string(),
            ));
        }
        if slot_count == 0 {
            return Err(CoreError::InvalidArgument(
                "array freeze requires at least one slot".to_string(),
            ));
        }
        if value_mask.len() != bytes.len() {
            return Err(CoreError::InvalidArgument(format!(
                "value mask length {} does not match data length {}",
                value_mask.len(),
                bytes.len()
            )));
        }
        match (&null_value, &null_value_mask) {
            (Some(nv), Some(nm)) => {
                if nv.len() != bytes.len() || nm.len() != bytes.len() {
                    return Err(CoreError::InvalidArgument(
                        "null value/mask length must match data length".to_string(),
                    ));
                }
            }
            (None, None) => {}
            _ => {
                return Err(CoreError::InvalidArgument(
                    "null value and null value mask must be supplied together".to_string(),
                ));
            }
        }

        Ok(self.store.add(
            name.into(),
            addr,
            FrozenKind::Array {
                bytes,
                slot_count,
                value_mask,
                null_value,
                null_value_mask,
            },
            enabled,
        ))
    }

    pub fn unfreeze_by_name(&self, name: &str) -> usize {
        self.store.unfreeze_by_name(name)
    }

    pub fn unfreeze_by_addr(&self, addr: u64) -> usize {
        self.store.unfreeze_by_addr(addr)
    }

    pub fn unfreeze_by_index(&self, index: u64) -> bool {
        self.store.unfreeze_by_index(index)
    }

    pub fn unfreeze_all(&self) -> usize {
        self.store.unfreeze_all()
    }

    pub fn enable_by_name(&self, name: &str, enabled: bool) -> usize {
        self.store.enable_by_name(name, enabled)
    }

    pub fn enable_by_addr(&self, addr: u64, enabled: bool) -> usize {
        self.store.enable_by_addr(addr, enabled)
    }

    pub fn enable_by_index(&self, index: u64, enabled: bool) -> bool {
        self.store.enable_by_index(index, enabled)
    }

    pub fn enable_all(&self, enabled: bool) -> usize {
        self.store.enable_all(enabled)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.store.count()
    }

    /// All frozen regions, ascending by index.
    #[must_use]
    pub fn list(&self) -> Vec<FrozenRegionInfo> {
        self.store
            .entries_in_index_order()
            .iter()
            .map(to_info)
            .collect()
    }
}

impl Drop for RegionFreezer {
    fn drop(&mut self) {
        self.should_exit.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn to_info(entry: &Arc<FrozenEntry>) -> FrozenRegionInfo {
    FrozenRegionInfo {
        name: entry.name.clone(),
        index: entry.index,
        addr: entry.addr,
        enabled: entry.enabled(),
        last_error: entry.last_error(),
        kind: entry.kind.clone(),
    }
}

fn run_write_loop(store: &Arc<Store>, adapter: &SharedAdapter, should_exit: &Arc<AtomicBool>, config: FreezerConfig) {
    while !should_exit.load(Ordering::SeqCst) {
        sweep_once(store, adapter);
        thread::sleep(config.sweep_interval);
    }
}

/// One sweep: the shared read-lock is held for the whole pass, entries
/// visited in ascending-index order, errors captured per entry (spec.md
/// §4.2, "Lifecycle"; §5, "the writer thread takes the shared lock during
/// a sweep"). Exposed for tests that want to drive a sweep deterministically
/// instead of waiting on the background thread.
fn sweep_once(store: &Arc<Store>, adapter: &SharedAdapter) {
    store.sweep_locked(|entries| {
        let mut count = 0;
        for entry in entries {
            count += 1;
            if !entry.enabled() {
                continue;
            }
            let mut adapter = adapter.lock().expect("freezer adapter poisoned");
            let result = write_step::write_entry(&mut *adapter, entry.addr, &entry.kind);
            if let Err(err) = &result {
                log::debug!("freezer write failed for {:#x}: {err}", entry.addr);
            }
            entry.set_write_result(result);
        }
        log::trace!("freezer sweep visited {count} entries");
    });
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use memtrace_core::test_util::FakeAdapter;

    use super::*;

    fn fast_config() -> FreezerConfig {
        FreezerConfig {
            sweep_interval: Duration::from_millis(2),
        }
    }

    fn wait_for(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        assert!(check(), "condition never became true");
    }

    #[test]
    fn scalar_freeze_enforces_value() {
        let adapter: SharedAdapter = Arc::new(Mutex::new(FakeAdapter::new().with_region(0x1000, vec![0u8; 4])));
        let freezer = RegionFreezer::new(adapter.clone(), fast_config());
        freezer.freeze("hp", 0x1000, vec![0x7F, 0, 0, 0], true).unwrap();

        wait_for(|| adapter.lock().unwrap().read(0x1000, 1).unwrap() == vec![0x7F]);

        // external write gets clobbered back within a sweep or two
        adapter.lock().unwrap().write(0x1000, &[0x00]).unwrap();
        wait_for(|| adapter.lock().unwrap().read(0x1000, 1).unwrap() == vec![0x7F]);
    }

    #[test]
    fn disabled_entry_is_left_alone() {
        let adapter: SharedAdapter = Arc::new(Mutex::new(FakeAdapter::new().with_region(0x1000, vec![0u8; 4])));
        let freezer = RegionFreezer::new(adapter.clone(), fast_config());
        freezer.freeze("hp", 0x1000, vec![0x7F, 0, 0, 0], false).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(adapter.lock().unwrap().read(0x1000, 1).unwrap(), vec![0]);
    }

    #[test]
    fn array_freeze_with_null_mask_fills_empty_slot() {
        // 16 slots of 16 bytes; slot 0 holds unrelated data, slot 4 is zero.
        let mut region = vec![0x11u8; 16 * 16];
        region[4 * 16..4 * 16 + 16].copy_from_slice(&[0u8; 16]);
        let adapter: SharedAdapter = Arc::new(Mutex::new(FakeAdapter::new().with_region(0x3000, region)));
        let freezer = RegionFreezer::new(adapter.clone(), fast_config());

        let value = vec![0xAAu8; 16];
        freezer
            .freeze_array(
                "item",
                0x3000,
                16,
                value.clone(),
                vec![0xFFu8; 16],
                Some(vec![0u8; 16]),
                Some(vec![0xFFu8; 16]),
                true,
            )
            .unwrap();

        wait_for(|| adapter.lock().unwrap().read(0x3000 + 4 * 16, 16).unwrap() == value);

        // overwrite the slot back to zero externally; the writer refills it
        adapter.lock().unwrap().write(0x3000 + 4 * 16, &[0u8; 16]).unwrap();
        wait_for(|| adapter.lock().unwrap().read(0x3000 + 4 * 16, 16).unwrap() == value);
    }

    #[test]
    fn triple_index_unfreeze_by_name_removes_from_all_indexes() {
        let adapter: SharedAdapter = Arc::new(Mutex::new(FakeAdapter::new().with_region(0x1000, vec![0u8; 8])));
        let freezer = RegionFreezer::new(adapter, fast_config());
        freezer.freeze("a", 0x1000, vec![1], true).unwrap();
        freezer.freeze("a", 0x1004, vec![2], true).unwrap();
        freezer.freeze("b", 0x1000, vec![3], true).unwrap();
        assert_eq!(freezer.count(), 3);

        assert_eq!(freezer.unfreeze_by_name("a"), 2);
        assert_eq!(freezer.count(), 1);
        assert_eq!(freezer.unfreeze_by_addr(0x1000), 1);
        assert_eq!(freezer.count(), 0);
    }

    #[test]
    fn enable_by_index_reports_whether_it_changed_anything() {
        let adapter: SharedAdapter = Arc::new(Mutex::new(FakeAdapter::new().with_region(0x1000, vec![0u8; 4])));
        let freezer = RegionFreezer::new(adapter, fast_config());
        let index = freezer.freeze("hp", 0x1000, vec![1, 2, 3, 4], true).unwrap();

        assert!(!freezer.enable_by_index(index, true)); // already enabled
        assert!(freezer.enable_by_index(index, false));
        assert!(!freezer.enable_by_index(999, false)); // unknown index
    }

    #[test]
    fn array_write_out_of_space_records_last_error() {
        let adapter: SharedAdapter = Arc::new(Mutex::new(FakeAdapter::new().with_region(0x3000, vec![0x11u8; 8])));
        let freezer = RegionFreezer::new(adapter, fast_config());
        let index = freezer
            .freeze_array("full", 0x3000, 2, vec![0xAA, 0xAA, 0xAA, 0xAA], vec![0xFF; 4], None, None, true)
            .unwrap();

        wait_for(|| {
            freezer
                .list()
                .into_iter()
                .any(|r| r.index == index && r.last_error.is_some())
        });
    }
}
