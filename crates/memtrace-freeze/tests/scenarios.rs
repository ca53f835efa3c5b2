//! spec.md §8, scenario 4: array freezer with a null mask, driven against
//! the real background writer thread instead of calling the write step
//! directly.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use memtrace_core::ProcessMemoryAdapter;
use memtrace_core::test_util::FakeAdapter;
use memtrace_freeze::{FreezerConfig, RegionFreezer};

type SharedAdapter = Arc<Mutex<dyn ProcessMemoryAdapter + Send>>;

fn fast_config() -> FreezerConfig {
    FreezerConfig {
        sweep_interval: Duration::from_millis(2),
    }
}

fn wait_for(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        thread::sleep(Duration::from_millis(2));
    }
    assert!(check(), "condition never became true within the deadline");
}

#[test]
fn array_freezer_with_null_mask_converges_and_self_heals() {
    // [0x3000, 0x3100) split into 16 slots of 16 bytes. Slot 0 holds
    // unrelated bytes `A`; slot 4 is all zero; the rest are unrelated too.
    let unrelated = [0x5Au8; 16];
    let mut region = vec![];
    for slot in 0..16 {
        if slot == 4 {
            region.extend_from_slice(&[0u8; 16]);
        } else {
            region.extend_from_slice(&unrelated);
        }
    }
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

    let slot4 = 0x3000 + 4 * 16;
    wait_for(|| adapter.lock().unwrap().read(slot4, 16).unwrap() == value);

    // Put slot 4 back to zero; the next sweep must refill it rather than
    // leaving the array without a matching slot.
    adapter.lock().unwrap().write(slot4, &[0u8; 16]).unwrap();
    wait_for(|| adapter.lock().unwrap().read(slot4, 16).unwrap() == value);

    // Slot 0 (the unrelated, non-null entry) must never be touched.
    assert_eq!(adapter.lock().unwrap().read(0x3000, 16).unwrap(), unrelated);
}

#[test]
fn array_freezer_without_null_mask_treats_all_zero_slot_as_empty() {
    let mut region = vec![0x11u8; 4 * 8];
    region[3 * 8..4 * 8].copy_from_slice(&[0u8; 8]);
    let adapter: SharedAdapter = Arc::new(Mutex::new(FakeAdapter::new().with_region(0x4000, region)));
    let freezer = RegionFreezer::new(adapter.clone(), fast_config());

    let value = vec![0x42u8; 8];
    freezer
        .freeze_array("slot", 0x4000, 4, value.clone(), vec![0xFFu8; 8], None, None, true)
        .unwrap();

    wait_for(|| adapter.lock().unwrap().read(0x4000 + 3 * 8, 8).unwrap() == value);
}
