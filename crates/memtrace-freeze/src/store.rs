//! The triple-indexed frozen-region store (spec.md §9, "Name/address/index
//! triple-indexing"): every region is reachable by its unique `index`, its
//! (non-unique) `name`, and its (non-unique) `addr`, all three kept in
//! sync under one reader-writer lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::region::{FrozenEntry, FrozenKind};

#[derive(Default)]
struct Inner {
    by_index: BTreeMap<u64, Arc<FrozenEntry>>,
    by_name: HashMap<String, Vec<Arc<FrozenEntry>>>,
    by_addr: HashMap<u64, Vec<Arc<FrozenEntry>>>,
    next_index: u64,
}

impl Inner {
    fn insert(&mut self, entry: Arc<FrozenEntry>) {
        self.by_name
            .entry(entry.name.clone())
            .or_default()
            .push(entry.clone());
        self.by_addr
            .entry(entry.addr)
            .or_default()
            .push(entry.clone());
        self.by_index.insert(entry.index, entry);
    }

    fn remove(&mut self, entry: &Arc<FrozenEntry>) {
        self.by_index.remove(&entry.index);
        if let Some(bucket) = self.by_name.get_mut(&entry.name) {
            bucket.retain(|e| e.index != entry.index);
            if bucket.is_empty() {
                self.by_name.remove(&entry.name);
            }
        }
        if let Some(bucket) = self.by_addr.get_mut(&entry.addr) {
            bucket.retain(|e| e.index != entry.index);
            if bucket.is_empty() {
                self.by_addr.remove(&entry.addr);
            }
        }
    }
}

/// Thread-shared store. Add/remove/enable operations take the exclusive
/// lock; the background writer and the read-only listing calls take the
/// shared lock (spec.md §5, "Shared-resource policy").
#[derive(Default)]
pub(crate) struct Store {
    inner: RwLock<Inner>,
}

impl Store {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(
        &self,
        name: String,
        addr: u64,
        kind: FrozenKind,
        enabled: bool,
    ) -> u64 {
        let mut inner = self.inner.write().expect("freezer store poisoned");
        let index = inner.next_index;
        inner.next_index += 1;
        let entry = Arc::new(FrozenEntry::new(name, index, addr, kind, enabled));
        inner.insert(entry);
        index
    }

    pub(crate) fn unfreeze_by_name(&self, name: &str) -> usize {
        let mut inner = self.inner.write().expect("freezer store poisoned");
        let matches = inner.by_name.get(name).cloned().unwrap_or_default();
        for entry in &matches {
            inner.remove(entry);
        }
        matches.len()
    }

    pub(crate) fn unfreeze_by_addr(&self, addr: u64) -> usize {
        let mut inner = self.inner.write().expect("freezer store poisoned");
        let matches = inner.by_addr.get(&addr).cloned().unwrap_or_default();
        for entry in &matches {
            inner.remove(entry);
        }
        matches.len()
    }

    pub(crate) fn unfreeze_by_index(&self, index: u64) -> bool {
        let mut inner = self.inner.write().expect("freezer store poisoned");
        match inner.by_index.get(&index).cloned() {
            Some(entry) => {
                inner.remove(&entry);
                true
            }
            None => false,
        }
    }

    pub(crate) fn unfreeze_all(&self) -> usize {
        let mut inner = self.inner.write().expect("freezer store poisoned");
        let n = inner.by_index.len();
        inner.by_index.clear();
        inner.by_name.clear();
        inner.by_addr.clear();
        n
    }

    pub(crate) fn enable_by_name(&self, name: &str, enabled: bool) -> usize {
        let inner = self.inner.write().expect("freezer store poisoned");
        inner
            .by_name
            .get(name)
            .into_iter()
            .flatten()
            .filter(|e| e.set_enabled(enabled))
            .count()
    }

    pub(crate) fn enable_by_addr(&self, addr: u64, enabled: bool) -> usize {
        let inner = self.inner.write().expect("freezer store poisoned");
        inner
            .by_addr
            .get(&addr)
            .into_iter()
            .flatten()
            .filter(|e| e.set_enabled(enabled))
            .count()
    }

    pub(crate) fn enable_by_index(&self, index: u64, enabled: bool) -> bool {
        let inner = self.inner.write().expect("freezer store poisoned");
        inner
            .by_index
            .get(&index)
            .is_some_and(|e| e.set_enabled(enabled))
    }

    pub(crate) fn enable_all(&self, enabled: bool) -> usize {
        let inner = self.inner.write().expect("freezer store poisoned");
        inner
            .by_index
            .values()
            .filter(|e| e.set_enabled(enabled))
            .count()
    }

    pub(crate) fn count(&self) -> usize {
        self.inner.read().expect("freezer store poisoned").by_index.len()
    }

    /// Ascending-`index` order, for listing (spec.md §4.2).
    pub(crate) fn entries_in_index_order(&self) -> Vec<Arc<FrozenEntry>> {
        self.inner
            .read()
            .expect("freezer store poisoned")
            .by_index
            .values()
            .cloned()
            .collect()
    }

    /// Holds the shared lock for the duration of `f`, handing it the
    /// entries in ascending-`index` order (spec.md §5, "the writer thread
    /// takes the shared lock during a sweep"). `freeze`/`unfreeze_*`/
    /// `enable_*` all take the exclusive lock, so none of them can
    /// interleave with an in-flight sweep.
    pub(crate) fn sweep_locked(&self, f: impl FnOnce(&mut dyn Iterator<Item = &Arc<FrozenEntry>>)) {
        let inner = self.inner.read().expect("freezer store poisoned");
        f(&mut inner.by_index.values());
    }
}
