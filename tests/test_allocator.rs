// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 lf-concurrent contributors

use lf_concurrent::config::{Flags, SizeClass};
use lf_concurrent::GeneralAllocator;

fn classes_16_64_256() -> GeneralAllocator {
    GeneralAllocator::new(
        vec![
            SizeClass::new(16, 20),
            SizeClass::new(64, 20),
            SizeClass::new(256, 20),
        ],
        Flags::default(),
    )
    .unwrap()
}

// Scenario 4: allocate(30) lands in the 64-byte class (the smallest class
// whose usable payload plus header fits a 30-byte request).
#[test]
fn size_class_selection_picks_smallest_fitting_class() {
    let alloc = classes_16_64_256();
    let p = alloc.gmem_allocate(30, 8);
    assert!(!p.is_null());
    assert!(alloc.gmem_deallocate(p));
}

// A request that fits the smallest class's usable payload lands there even
// though the class's configured slot_bytes (16) is smaller than the header
// carried on top of every slot -- slot_bytes is payload capacity, not the
// physical per-slot stride.
#[test]
fn allocate_request_fitting_smallest_class_uses_it() {
    let alloc = classes_16_64_256();
    let p = alloc.gmem_allocate(4, 8);
    assert!(!p.is_null());
    assert!(alloc.gmem_deallocate(p));
}

// Scenario 5: double-free. First call succeeds with no error counted;
// second call is absorbed (still returns true) and the error counter
// becomes 1.
#[test]
fn double_free_is_absorbed_and_counted_once() {
    let alloc = classes_16_64_256();
    let (_, warn_before) = lf_concurrent::get_error_warning_log_count();
    let p = alloc.gmem_allocate(8, 8);

    assert!(alloc.gmem_deallocate(p));
    let (err_after_first, _) = lf_concurrent::get_error_warning_log_count();

    assert!(alloc.gmem_deallocate(p));
    let (err_after_second, _) = lf_concurrent::get_error_warning_log_count();

    assert_eq!(err_after_second, err_after_first + 1);
    let _ = warn_before;
}

// Oversize boundary: a request bigger than every configured class falls
// through to the system allocator; its header's owner is null (0), which
// this crate surfaces only internally, but the pointer round-trips and
// respects the requested alignment.
#[test]
fn oversize_allocation_respects_alignment_and_round_trips() {
    let alloc = classes_16_64_256();
    let p = alloc.gmem_allocate(5_000, 128);
    assert!(!p.is_null());
    assert_eq!((p as usize) % 128, 0);
    assert!(alloc.gmem_deallocate(p));
}

#[test]
fn null_pointer_deallocate_returns_false() {
    let alloc = classes_16_64_256();
    assert!(!alloc.gmem_deallocate(std::ptr::null_mut()));
}

#[test]
fn prune_is_idempotent_and_statistics_cover_every_class() {
    let alloc = classes_16_64_256();
    let p = alloc.gmem_allocate(8, 8);
    assert!(alloc.gmem_deallocate(p));
    alloc.gmem_prune();
    alloc.gmem_prune();
    assert_eq!(alloc.gmem_get_statistics().len(), 3);
}

// Universal invariant: allocate then immediately deallocate leaves the
// chunk's accounting as if the slot had never been taken (free_slot_cnt
// nets back to its pre-allocation value).
#[test]
fn alloc_dealloc_round_trip_nets_out_free_slot_count() {
    let alloc = classes_16_64_256();
    let before = alloc.gmem_get_statistics()[0].free_slot_cnt;
    let p = alloc.gmem_allocate(4, 8);
    assert!(alloc.gmem_deallocate(p));
    let after = alloc.gmem_get_statistics()[0].free_slot_cnt;
    assert_eq!(before, after);
}
