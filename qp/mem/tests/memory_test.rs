//! Memory management tests for qp-mem

use qp_core::Signal;
use qp_mem::{EventRef, PoolSet, PoolStats, NO_MARGIN};

fn pools() -> PoolSet {
    let mut set = PoolSet::new();
    assert_eq!(set.init_pool(4, 2), 1);
    assert_eq!(set.init_pool(16, 2), 2);
    set
}

#[test]
fn test_pool_stats_alloc() {
    let mut stats = PoolStats::new(10);
    stats.on_alloc();
    assert_eq!(stats.free_blocks, 9);
    assert_eq!(stats.used_blocks, 1);
}

#[test]
fn test_pool_stats_utilization() {
    let mut stats = PoolStats::new(10);
    stats.on_alloc();
    stats.on_alloc();
    assert_eq!(stats.utilization(), 20);
}

#[test]
fn test_smallest_fit() {
    let mut set = pools();
    let small = set.alloc(Signal(10), &[1, 2, 3], NO_MARGIN).unwrap();
    let large = set.alloc(Signal(11), &[0; 9], NO_MARGIN).unwrap();
    assert_eq!(small.pool_id(), 1);
    assert_eq!(large.pool_id(), 2);
    assert_eq!(set.max_block_size(), 16);
}

#[test]
fn test_fresh_event_has_no_references() {
    let mut set = pools();
    let e = set.alloc(Signal(10), &[7], NO_MARGIN).unwrap();
    let handle = e.pooled().unwrap();
    assert_eq!(set.ref_count(handle), 0);
    assert_eq!(set.payload(handle), &[7]);
}

#[test]
fn test_ref_count_balance_returns_block() {
    let mut set = pools();
    let handle = set
        .alloc(Signal(10), &[], NO_MARGIN)
        .and_then(|e| e.pooled())
        .unwrap();

    set.inc_ref(handle);
    set.inc_ref(handle);
    assert_eq!(set.stats(1).free_blocks, 1);

    assert!(!set.dec_ref(handle));
    assert_eq!(set.ref_count(handle), 1);
    assert!(set.dec_ref(handle));
    assert_eq!(set.stats(1).free_blocks, 2);
}

#[test]
fn test_release_ignores_count() {
    let mut set = pools();
    let handle = set
        .alloc(Signal(12), &[1], NO_MARGIN)
        .and_then(|e| e.pooled())
        .unwrap();
    set.inc_ref(handle);
    set.inc_ref(handle);
    set.release(handle);
    assert_eq!(set.stats(1).free_blocks, 2);
}

#[test]
fn test_margin_allocation_fails_softly() {
    let mut set = pools();
    assert!(set.alloc(Signal(10), &[], 1).is_some());
    assert!(set.alloc(Signal(10), &[], 1).is_none());
    assert_eq!(set.min_free(1), 1);
}

#[test]
fn test_static_events_have_pool_zero() {
    static PAYLOAD: [u8; 2] = [4, 2];
    let e = EventRef::from_static(Signal(12), &PAYLOAD);
    assert_eq!(e.pool_id(), 0);
    assert!(e.is_static());
    assert_eq!(e.signal(), Signal(12));
}

#[test]
#[should_panic(expected = "assertion failed")]
fn test_exhaustion_without_margin_is_fatal() {
    let mut set = pools();
    set.alloc(Signal(10), &[], NO_MARGIN);
    set.alloc(Signal(10), &[], NO_MARGIN);
    set.alloc(Signal(10), &[], NO_MARGIN);
}

#[test]
#[should_panic(expected = "assertion failed")]
fn test_oversized_payload_is_fatal() {
    let mut set = pools();
    set.alloc(Signal(10), &[0; 17], NO_MARGIN);
}

#[test]
#[should_panic(expected = "assertion failed")]
fn test_stale_handle_is_fatal() {
    let mut set = pools();
    let handle = set
        .alloc(Signal(10), &[], NO_MARGIN)
        .and_then(|e| e.pooled())
        .unwrap();
    assert!(set.dec_ref(handle));
    set.dec_ref(handle);
}

#[test]
#[should_panic(expected = "assertion failed")]
fn test_pools_must_grow() {
    let mut set = PoolSet::new();
    set.init_pool(16, 1);
    set.init_pool(8, 1);
}
