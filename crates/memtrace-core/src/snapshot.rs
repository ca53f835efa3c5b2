use std::sync::Arc;

use crate::Region;

/// An immutable, atomically-captured, ordered set of [`Region`]s.
///
/// Snapshots are never mutated after construction and are cheap to clone:
/// the region list is reference-counted so a search iteration can hold on
/// to the snapshot it was produced from without copying potentially
/// gigabyte-sized region payloads.
#[derive(Debug, Clone)]
pub struct Snapshot {
    regions: Arc<[Region]>,
}

impl Snapshot {
    /// Builds a snapshot from regions already in ascending, non-overlapping
    /// `addr` order. Construction does not re-sort or validate; callers
    /// (adapters) are expected to hand back regions in that order already,
    /// per spec.md's Region invariant.
    #[must_use]
    pub fn new(regions: Vec<Region>) -> Self {
        Self {
            regions: regions.into(),
        }
    }

    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// The region enclosing `addr`, if any. Regions are ordered by `addr`,
    /// so this is a binary search rather than a linear scan.
    #[must_use]
    pub fn region_containing(&self, addr: u64) -> Option<&Region> {
        let idx = self
            .regions
            .partition_point(|r| r.end_addr() <= addr);
        self.regions.get(idx).filter(|r| r.contains(addr))
    }

    /// Index of the first region whose `end_addr()` is strictly greater
    /// than `addr` — i.e. the first region that could possibly contain or
    /// follow `addr`. Used by the search engine's position-synchronous
    /// region-list walks (spec.md §4.1).
    #[must_use]
    pub fn first_region_at_or_after(&self, addr: u64) -> usize {
        self.regions.partition_point(|r| r.end_addr() <= addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(addr: u64, size: u64) -> Region {
        Region::new(addr, size, true, true, false, true, true, false)
    }

    #[test]
    fn finds_enclosing_region() {
        let snap = Snapshot::new(vec![region(0x1000, 0x10), region(0x2000, 0x10)]);
        assert_eq!(snap.region_containing(0x1005).map(|r| r.addr), Some(0x1000));
        assert_eq!(snap.region_containing(0x1800), None);
        assert_eq!(snap.region_containing(0x2000).map(|r| r.addr), Some(0x2000));
    }

    #[test]
    fn clone_shares_storage() {
        let snap = Snapshot::new(vec![region(0x1000, 0x10)]);
        let clone = snap.clone();
        assert_eq!(
            snap.regions().as_ptr() as usize,
            clone.regions().as_ptr() as usize
        );
    }
}
