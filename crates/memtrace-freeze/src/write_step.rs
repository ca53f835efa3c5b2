//! The type-specific write steps the background writer invokes per entry
//! (spec.md §4.2, "Scalar write step" / "Array write step").

use memtrace_core::ProcessMemoryAdapter;

use crate::masked_compare::masked_compare;
use crate::region::FrozenKind;

/// Writes `bytes` verbatim at `addr`.
pub(crate) fn write_scalar(
    adapter: &mut dyn ProcessMemoryAdapter,
    addr: u64,
    bytes: &[u8],
) -> Result<(), String> {
    adapter.write(addr, bytes).map_err(|e| e.to_string())
}

/// Scans `slot_count` equally sized slots starting at `addr`, each
/// `bytes.len()` long, and makes sure at least one of them holds `bytes`
/// under `value_mask` without displacing an already-occupied slot
/// (spec.md §9, "Array-freeze precedence").
pub(crate) fn write_array(
    adapter: &mut dyn ProcessMemoryAdapter,
    addr: u64,
    slot_count: usize,
    bytes: &[u8],
    value_mask: &[u8],
    null_value: Option<&[u8]>,
    null_value_mask: Option<&[u8]>,
) -> Result<(), String> {
    let slot_len = bytes.len();
    let total = (slot_len * slot_count) as u64;
    let contents = adapter.read(addr, total).map_err(|e| e.to_string())?;

    let mut first_empty_slot = None;
    for slot in 0..slot_count {
        let offset = slot * slot_len;
        let item = &contents[offset..offset + slot_len];

        match masked_compare(item, bytes, value_mask) {
            0 => return Ok(()), // already holds the value, nothing to do
            1 => {
                // equal on every observed byte, differs only under the mask
                return adapter
                    .write(addr + offset as u64, bytes)
                    .map_err(|e| e.to_string());
            }
            _ => {}
        }

        if first_empty_slot.is_none() {
            let is_empty = match (null_value, null_value_mask) {
                (Some(nv), Some(nm)) => masked_compare(item, nv, nm) >= 0,
                _ => item.iter().all(|&b| b == 0),
            };
            if is_empty {
                first_empty_slot = Some(slot);
            }
        }
    }

    match first_empty_slot {
        Some(slot) => adapter
            .write(addr + (slot * slot_len) as u64, bytes)
            .map_err(|e| e.to_string()),
        None => Err("no available spaces".to_string()),
    }
}

pub(crate) fn write_entry(adapter: &mut dyn ProcessMemoryAdapter, addr: u64, kind: &FrozenKind) -> Result<(), String> {
    match kind {
        FrozenKind::Scalar { bytes } => write_scalar(adapter, addr, bytes),
        FrozenKind::Array {
            bytes,
            slot_count,
            value_mask,
            null_value,
            null_value_mask,
        } => write_array(
            adapter,
            addr,
            *slot_count,
            bytes,
            value_mask,
            null_value.as_deref(),
            null_value_mask.as_deref(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use memtrace_core::test_util::FakeAdapter;

    use super::*;

    #[test]
    fn array_write_fills_first_empty_slot() {
        let mut adapter = FakeAdapter::new().with_region(0x3000, vec![0u8; 4 * 16]);
        let value = vec![0xAAu8; 16];
        let mask = vec![0xFFu8; 16];
        write_array(&mut adapter, 0x3000, 4, &value, &mask, None, None).unwrap();
        let read = adapter.read(0x3000, 64).unwrap();
        assert_eq!(&read[0..16], &value[..]);
        assert_eq!(&read[16..32], &[0u8; 16][..]);
    }

    #[test]
    fn array_write_is_noop_when_value_already_present() {
        let value = vec![0xAAu8; 4];
        let mut buf = vec![0u8; 4];
        buf.extend_from_slice(&value);
        buf.extend_from_slice(&[0u8; 4]);
        let mut adapter = FakeAdapter::new().with_region(0x3000, buf);
        let mask = vec![0xFFu8; 4];
        write_array(&mut adapter, 0x3000, 3, &value, &mask, None, None).unwrap();
        let read = adapter.read(0x3000, 12).unwrap();
        assert_eq!(&read[4..8], &value[..]);
        assert_eq!(&read[8..12], &[0u8; 4][..]);
    }

    #[test]
    fn array_write_errors_when_full() {
        let mut adapter = FakeAdapter::new().with_region(0x3000, vec![0x11u8; 8]);
        let value = vec![0xAAu8; 4];
        let mask = vec![0xFFu8; 4];
        let err = write_array(&mut adapter, 0x3000, 2, &value, &mask, None, None).unwrap_err();
        assert_eq!(err, "no available spaces");
    }
}
