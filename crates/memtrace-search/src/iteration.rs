use memtrace_core::Snapshot;

use crate::search_type::SearchType;

/// One step in a [`crate::Search`]'s history (spec.md §3, "Search
/// Iteration"): `(type, all_memory_flag, snapshot?, prev_value_size,
/// results?, annotation, has_valid_results)`.
///
/// Three distinguishable states, driven by `snapshot` and
/// `has_valid_results`:
/// - *Empty*: `snapshot` absent, `has_valid_results = false`.
/// - *Unknown-initial*: `snapshot` present, `has_valid_results = false` —
///   the first pass of an `all` search; results materialize on the next
///   pass, compared against this snapshot's stored bytes.
/// - *Known*: `snapshot` present, `has_valid_results = true`, `results`
///   populated.
#[derive(Debug, Clone)]
pub struct SearchIteration {
    search_type: SearchType,
    all_memory: bool,
    snapshot: Option<Snapshot>,
    prev_value_size: usize,
    results: Option<Vec<u64>>,
    annotation: String,
    has_valid_results: bool,
}

impl SearchIteration {
    /// The empty iteration a freshly-opened [`crate::Search`] starts from.
    #[must_use]
    pub fn empty(search_type: SearchType, all_memory: bool) -> Self {
        Self {
            search_type,
            all_memory,
            snapshot: None,
            prev_value_size: search_type.value_size(),
            results: None,
            annotation: String::new(),
            has_valid_results: false,
        }
    }

    #[must_use]
    pub fn search_type(&self) -> SearchType {
        self.search_type
    }

    #[must_use]
    pub fn all_memory(&self) -> bool {
        self.all_memory
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    #[must_use]
    pub fn prev_value_size(&self) -> usize {
        self.prev_value_size
    }

    #[must_use]
    pub fn results(&self) -> Option<&[u64]> {
        self.results.as_deref()
    }

    #[must_use]
    pub fn annotation(&self) -> &str {
        &self.annotation
    }

    #[must_use]
    pub fn has_valid_results(&self) -> bool {
        self.has_valid_results
    }

    #[must_use]
    pub fn is_empty_state(&self) -> bool {
        self.snapshot.is_none() && !self.has_valid_results
    }

    #[must_use]
    pub fn is_unknown_initial(&self) -> bool {
        self.snapshot.is_some() && !self.has_valid_results
    }

    pub(crate) fn with_unknown_initial(search_type: SearchType, all_memory: bool, snapshot: Snapshot) -> Self {
        Self {
            search_type,
            all_memory,
            snapshot: Some(snapshot),
            prev_value_size: search_type.value_size(),
            results: None,
            annotation: "unknown initial value".to_string(),
            has_valid_results: false,
        }
    }

    pub(crate) fn with_results(
        search_type: SearchType,
        all_memory: bool,
        snapshot: Snapshot,
        prev_value_size: usize,
        results: Vec<u64>,
        annotation: String,
    ) -> Self {
        Self {
            search_type,
            all_memory,
            snapshot: Some(snapshot),
            prev_value_size,
            results: Some(results),
            annotation,
            has_valid_results: true,
        }
    }

    pub(crate) fn with_deleted_results(&self, results: Vec<u64>) -> Self {
        Self {
            search_type: self.search_type,
            all_memory: self.all_memory,
            snapshot: self.snapshot.clone(),
            prev_value_size: self.prev_value_size,
            results: Some(results),
            annotation: self.annotation.clone(),
            has_valid_results: self.has_valid_results,
        }
    }
}
