//! The `Search` engine itself (spec.md §4.1): holds a bounded history of
//! [`SearchIteration`]s for one search type and produces the next one from
//! a fresh [`Snapshot`], a [`Predicate`], and an optional operand.

use memtrace_core::{CancelToken, CoreError, Snapshot};

use crate::eval::evaluate;
use crate::iteration::SearchIteration;
use crate::predicate::Predicate;
use crate::search_type::SearchType;

/// Ceilings the engine enforces while producing a new iteration. Neither
/// bound is named explicitly in the source material; these defaults are a
/// practical middle ground rather than a requirement.
#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    /// Stop scanning once this many results have been collected.
    pub max_results: usize,
    /// How many of the most-recent iterations a [`Search`] retains.
    pub max_iterations: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_results: 64 * 1024,
            max_iterations: 32,
        }
    }
}

/// A named, typed search in progress: a bounded history of iterations that
/// all share a [`SearchType`] and `all_memory` flag (spec.md §3, "Search
/// Iteration").
#[derive(Debug, Clone)]
pub struct Search {
    search_type: SearchType,
    all_memory: bool,
    limits: SearchLimits,
    history: Vec<SearchIteration>,
}

impl Search {
    #[must_use]
    pub fn new(search_type: SearchType, all_memory: bool, limits: SearchLimits) -> Self {
        Self {
            search_type,
            all_memory,
            limits,
            history: vec![SearchIteration::empty(search_type, all_memory)],
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
    pub fn current(&self) -> &SearchIteration {
        self.history.last().expect("history is never empty")
    }

    #[must_use]
    pub fn history(&self) -> &[SearchIteration] {
        &self.history
    }

    /// Pure validation of a prospective `apply` call, with no side effects
    /// (spec.md §4.1, "Validation rules enforced by `can_update`").
    pub fn can_update(&self, predicate: Predicate, operand: Option<&[u8]>) -> Result<(), CoreError> {
        if predicate.is_flag() && self.search_type.is_float() {
            return Err(CoreError::InvalidArgument(format!(
                "flag has no evaluator for {}",
                self.search_type.name()
            )));
        }
        let current = self.current();
        if self.search_type != SearchType::Data {
            if let Some(operand) = operand {
                let expected = self.search_type.value_size();
                if operand.len() != expected {
                    return Err(CoreError::InvalidArgument(format!(
                        "operand for {} must be {expected} bytes, got {}",
                        self.search_type.name(),
                        operand.len()
                    )));
                }
            }
        }
        if current.snapshot().is_none() && operand.is_none() && !predicate.is_all() {
            return Err(CoreError::InvalidArgument(
                "no prior snapshot: an operand or the `all` predicate is required".to_string(),
            ));
        }
        if current.snapshot().is_none()
            && self.search_type == SearchType::Data
            && operand.map_or(true, <[u8]>::is_empty)
            && !predicate.is_all()
        {
            return Err(CoreError::InvalidArgument(
                "data search requires a non-empty operand on the initial pass".to_string(),
            ));
        }
        Ok(())
    }

    /// Produces the next iteration and appends it to history, evicting the
    /// oldest entry if `max_iterations` would be exceeded. On cancellation
    /// the partial scan is discarded and the current iteration is left
    /// unchanged (spec.md §4.1, "Failure semantics").
    pub fn apply(
        &mut self,
        snapshot: Snapshot,
        predicate: Predicate,
        operand: Option<&[u8]>,
        cancel: &CancelToken,
    ) -> Result<(), CoreError> {
        self.can_update(predicate, operand)?;
        let current = self.current().clone();

        let next = if current.snapshot().is_none() {
            if predicate.is_all() {
                SearchIteration::with_unknown_initial(self.search_type, self.all_memory, snapshot)
            } else {
                self.initial_known_pass(snapshot, predicate, operand, cancel)?
            }
        } else if !current.has_valid_results() {
            self.second_pass_against_unknown_initial(&current, snapshot, predicate, operand, cancel)?
        } else {
            self.refinement_pass(&current, snapshot, predicate, operand, cancel)?
        };

        match next {
            Some(iteration) => {
                self.history.push(iteration);
                if self.history.len() > self.limits.max_iterations {
                    let overflow = self.history.len() - self.limits.max_iterations;
                    self.history.drain(0..overflow);
                }
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// `delete(start, end)`: remove all results in `[start, end)` from the
    /// current iteration's result list, preserving order.
    pub fn delete(&mut self, start: u64, end: u64) -> Result<(), CoreError> {
        let current = self.current();
        let results = current.results().ok_or_else(|| {
            CoreError::LogicError("delete called on an iteration with no results".to_string())
        })?;
        let lo = results.partition_point(|&r| r < start);
        let hi = results.partition_point(|&r| r < end);
        let mut kept = results[..lo].to_vec();
        kept.extend_from_slice(&results[hi..]);
        let next = current.with_deleted_results(kept);
        self.history.push(next);
        Ok(())
    }

    fn initial_known_pass(
        &self,
        snapshot: Snapshot,
        predicate: Predicate,
        operand: Option<&[u8]>,
        cancel: &CancelToken,
    ) -> Result<Option<SearchIteration>, CoreError> {
        let stride = if self.search_type == SearchType::Data {
            1
        } else {
            self.search_type.value_size()
        };
        let operand = operand.ok_or_else(|| {
            CoreError::InvalidArgument("initial known pass requires an operand".to_string())
        })?;
        log::trace!("initial known-value pass: {} regions to scan", snapshot.regions().len());
        let mut results = Vec::new();
        'regions: for region in snapshot.regions() {
            let Some(data) = region.data() else { continue };
            let mut offset = 0usize;
            while offset + operand.len() <= data.len() {
                if cancel.is_cancelled() {
                    return Ok(None);
                }
                let candidate = &data[offset..offset + operand.len()];
                if evaluate(self.search_type, predicate, candidate, operand).unwrap_or(false) {
                    results.push(region.addr + offset as u64);
                    if results.len() >= self.limits.max_results {
                        log::debug!("initial known-value pass hit max_results ({})", self.limits.max_results);
                        break 'regions;
                    }
                }
                offset += stride.max(1);
            }
        }
        Ok(Some(SearchIteration::with_results(
            self.search_type,
            self.all_memory,
            snapshot,
            operand.len(),
            results,
            "initial known-value pass".to_string(),
        )))
    }

    fn second_pass_against_unknown_initial(
        &self,
        current: &SearchIteration,
        snapshot: Snapshot,
        predicate: Predicate,
        operand: Option<&[u8]>,
        cancel: &CancelToken,
    ) -> Result<Option<SearchIteration>, CoreError> {
        let old_snapshot = current
            .snapshot()
            .expect("second pass requires a stored initial snapshot");
        let stride = if self.search_type == SearchType::Data {
            1
        } else {
            self.search_type.value_size()
        };
        let value_size = operand.map_or(current.prev_value_size(), <[u8]>::len);
        let old_regions = old_snapshot.regions();
        let mut old_idx = 0usize;
        let mut results = Vec::new();

        log::trace!("second pass against unknown initial: {} regions to scan", snapshot.regions().len());
        for region in snapshot.regions() {
            let Some(new_data) = region.data() else { continue };
            // Bound the old-region cursor by the snapshot's own index rather
            // than always resuming from wherever the last region left off.
            old_idx = old_idx.max(old_snapshot.first_region_at_or_after(region.addr));
            let mut offset = 0usize;
            while offset + value_size <= new_data.len() {
                if cancel.is_cancelled() {
                    return Ok(None);
                }
                let addr = region.addr + offset as u64;
                while old_idx < old_regions.len()
                    && (old_regions[old_idx].end_addr() <= addr || !old_regions[old_idx].has_data())
                {
                    old_idx += 1;
                }
                let Some(old_region) = old_regions.get(old_idx) else {
                    break;
                };
                if addr < old_region.addr {
                    let skip = old_region.addr - addr;
                    offset += skip as usize;
                    continue;
                }
                let candidate = &new_data[offset..offset + value_size];
                let reference = match operand {
                    Some(op) => op,
                    None => match old_region.slice_at(addr, value_size as u64) {
                        Some(bytes) => bytes,
                        None => {
                            offset += stride.max(1);
                            continue;
                        }
                    },
                };
                if evaluate(self.search_type, predicate, candidate, reference).unwrap_or(false) {
                    results.push(addr);
                    if results.len() >= self.limits.max_results {
                        return Ok(Some(SearchIteration::with_results(
                            self.search_type,
                            self.all_memory,
                            snapshot,
                            value_size,
                            results,
                            "second pass against unknown initial value".to_string(),
                        )));
                    }
                }
                offset += stride.max(1);
            }
        }
        Ok(Some(SearchIteration::with_results(
            self.search_type,
            self.all_memory,
            snapshot,
            value_size,
            results,
            "second pass against unknown initial value".to_string(),
        )))
    }

    fn refinement_pass(
        &self,
        current: &SearchIteration,
        snapshot: Snapshot,
        predicate: Predicate,
        operand: Option<&[u8]>,
        cancel: &CancelToken,
    ) -> Result<Option<SearchIteration>, CoreError> {
        let old_snapshot = current
            .snapshot()
            .expect("refinement requires a prior snapshot");
        let value_size = operand.map_or(current.prev_value_size(), <[u8]>::len);
        let mut results = Vec::new();

        for &r in current.results().unwrap_or(&[]) {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            let Some(new_region) = snapshot.region_containing(r) else {
                continue;
            };
            let Some(old_region) = old_snapshot.region_containing(r) else {
                continue;
            };
            if !new_region.contains_span(r, value_size as u64) {
                continue;
            }
            let Some(new_bytes) = new_region.slice_at(r, value_size as u64) else {
                continue;
            };
            let reference = match operand {
                Some(op) => op,
                None => match old_region.slice_at(r, value_size as u64) {
                    Some(bytes) => bytes,
                    None => continue,
                },
            };
            if evaluate(self.search_type, predicate, new_bytes, reference).unwrap_or(false) {
                results.push(r);
            }
        }

        Ok(Some(SearchIteration::with_results(
            self.search_type,
            self.all_memory,
            snapshot,
            value_size,
            results,
            "refinement pass".to_string(),
        )))
    }
}
