//! spec.md §8, scenarios 1-3: iterative integer search, reverse-endian
//! known search, and unknown-value two-pass search.

use memtrace_core::test_util::FakeAdapter;
use memtrace_core::{CancelToken, ProcessMemoryAdapter, Snapshot};
use memtrace_search::{Predicate, Search, SearchLimits, SearchType};

fn snapshot_of(adapter: &mut FakeAdapter) -> Snapshot {
    Snapshot::new(adapter.get_all_regions(true).unwrap())
}

#[test]
fn iterative_integer_search_narrows_to_single_address_then_empties() {
    let mut adapter = FakeAdapter::new().with_region(0x1000, (0u8..=0x0f).collect());
    let mut search = Search::new(SearchType::I8, true, SearchLimits::default());
    let cancel = CancelToken::never_cancelled();

    let snap = snapshot_of(&mut adapter);
    search.apply(snap, Predicate::Eq, Some(&[5u8]), &cancel).unwrap();
    assert_eq!(search.current().results(), Some(&[0x1005][..]));

    adapter.write(0x1005, &[0x06]).unwrap();
    let snap = snapshot_of(&mut adapter);
    search.apply(snap, Predicate::Eq, Some(&[5u8]), &cancel).unwrap();
    assert_eq!(search.current().results(), Some(&[][..]));
}

#[test]
fn reverse_endian_known_search_matches_big_endian_layout() {
    let mut adapter = FakeAdapter::new().with_region(0x2000, vec![0x12, 0x34, 0x56, 0x78]);
    let mut search = Search::new(SearchType::U32Re, true, SearchLimits::default());
    let cancel = CancelToken::never_cancelled();

    let snap = snapshot_of(&mut adapter);
    let operand = 0x1234_5678u32.to_be_bytes();
    search.apply(snap, Predicate::Eq, Some(&operand), &cancel).unwrap();
    assert_eq!(search.current().results(), Some(&[0x2000][..]));
}

#[test]
fn unknown_value_two_pass_finds_the_single_mutated_position() {
    let original: Vec<u8> = (0u8..32).collect();
    let mut adapter = FakeAdapter::new().with_region(0x3000, original);
    let mut search = Search::new(SearchType::I32, true, SearchLimits::default());
    let cancel = CancelToken::never_cancelled();

    let snap = snapshot_of(&mut adapter);
    search.apply(snap, Predicate::All, None, &cancel).unwrap();
    assert!(search.current().is_unknown_initial());
    assert_eq!(search.current().results(), None);

    adapter.write(0x3010, &[0xff, 0xff, 0xff, 0xff]).unwrap();
    let snap = snapshot_of(&mut adapter);
    search.apply(snap, Predicate::Ne, None, &cancel).unwrap();
    assert_eq!(search.current().results(), Some(&[0x3010][..]));
}

#[test]
fn can_update_rejects_flag_on_float_type() {
    let search = Search::new(SearchType::F64, true, SearchLimits::default());
    let err = search.can_update(Predicate::Flag, Some(&[0; 8])).unwrap_err();
    assert!(matches!(err, memtrace_core::CoreError::InvalidArgument(_)));
}

#[test]
fn can_update_rejects_mismatched_operand_length() {
    let search = Search::new(SearchType::U16, true, SearchLimits::default());
    let err = search.can_update(Predicate::Eq, Some(&[0; 3])).unwrap_err();
    assert!(matches!(err, memtrace_core::CoreError::InvalidArgument(_)));
}

#[test]
fn can_update_requires_operand_or_all_without_prior_snapshot() {
    let search = Search::new(SearchType::U32, true, SearchLimits::default());
    assert!(search.can_update(Predicate::Eq, None).is_err());
    assert!(search.can_update(Predicate::All, None).is_ok());
}

#[test]
fn delete_removes_results_in_half_open_range_preserving_order() {
    let mut adapter = FakeAdapter::new().with_region(0x1000, (0u8..=0x0f).collect());
    let mut search = Search::new(SearchType::I8, true, SearchLimits::default());
    let cancel = CancelToken::never_cancelled();

    let snap = snapshot_of(&mut adapter);
    search.apply(snap, Predicate::Ge, Some(&[3u8]), &cancel).unwrap();
    let before = search.current().results().unwrap().to_vec();
    assert!(before.len() > 2);

    let start = before[1];
    let end = before[before.len() - 1];
    search.delete(start, end).unwrap();
    let after = search.current().results().unwrap();
    assert!(after.windows(2).all(|w| w[0] < w[1]));
    assert!(!after.iter().any(|&r| r >= start && r < end));
}

#[test]
fn refinement_results_are_a_subset_of_the_prior_iteration() {
    let mut adapter = FakeAdapter::new().with_region(0x1000, (0u8..=0x0f).collect());
    let mut search = Search::new(SearchType::U8, true, SearchLimits::default());
    let cancel = CancelToken::never_cancelled();

    let snap = snapshot_of(&mut adapter);
    search.apply(snap, Predicate::Ge, Some(&[4u8]), &cancel).unwrap();
    let wide = search.current().results().unwrap().to_vec();

    let snap = snapshot_of(&mut adapter);
    search.apply(snap, Predicate::Ge, Some(&[8u8]), &cancel).unwrap();
    let narrow = search.current().results().unwrap().to_vec();

    assert!(narrow.iter().all(|r| wide.contains(r)));
    assert!(narrow.len() <= wide.len());
}
