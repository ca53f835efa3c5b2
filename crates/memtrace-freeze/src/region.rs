//! The frozen-region data model (spec.md §3, "Frozen Region (scalar)" and
//! "Frozen Region (array)").

use std::sync::Mutex;

/// The write-enforcement shape of a frozen region: either a single byte
/// string written verbatim at `addr`, or an array of equally sized slots
/// where the writer only needs *one* slot to hold the value.
#[derive(Debug, Clone)]
pub enum FrozenKind {
    Scalar { bytes: Vec<u8> },
    Array {
        bytes: Vec<u8>,
        slot_count: usize,
        value_mask: Vec<u8>,
        null_value: Option<Vec<u8>>,
        null_value_mask: Option<Vec<u8>>,
    },
}

impl FrozenKind {
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Scalar { bytes } | Self::Array { bytes, .. } => bytes,
        }
    }

    #[must_use]
    pub fn slot_count(&self) -> Option<usize> {
        match self {
            Self::Scalar { .. } => None,
            Self::Array { slot_count, .. } => Some(*slot_count),
        }
    }
}

#[derive(Debug)]
struct EntryState {
    enabled: bool,
    last_error: Option<String>,
}

/// One frozen region: `(name, index, addr, bytes, enabled, last_error?)`
/// per spec.md §3, extended with the array fields when `kind` is
/// `FrozenKind::Array`.
///
/// `name`, `index`, `addr`, and `kind` never change after construction.
/// `enabled` and `last_error` are the only fields the background writer
/// and the enable/disable operations touch after the entry is created, so
/// they live behind their own [`Mutex`] — the writer only ever holds the
/// store's *shared* lock (spec.md §4.2) and still needs to mutate
/// `last_error` through it.
#[derive(Debug)]
pub struct FrozenEntry {
    pub name: String,
    pub index: u64,
    pub addr: u64,
    pub kind: FrozenKind,
    state: Mutex<EntryState>,
}

impl FrozenEntry {
    pub(crate) fn new(name: String, index: u64, addr: u64, kind: FrozenKind, enabled: bool) -> Self {
        Self {
            name,
            index,
            addr,
            kind,
            state: Mutex::new(EntryState {
                enabled,
                last_error: None,
            }),
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.state.lock().expect("frozen entry state poisoned").enabled
    }

    pub(crate) fn set_enabled(&self, enabled: bool) -> bool {
        let mut state = self.state.lock().expect("frozen entry state poisoned");
        let changed = state.enabled != enabled;
        state.enabled = enabled;
        changed
    }

    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.state
            .lock()
            .expect("frozen entry state poisoned")
            .last_error
            .clone()
    }

    pub(crate) fn set_write_result(&self, result: Result<(), String>) {
        let mut state = self.state.lock().expect("frozen entry state poisoned");
        state.last_error = result.err();
    }
}
