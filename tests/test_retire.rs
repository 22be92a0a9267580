// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 lf-concurrent contributors

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lf_concurrent::hazard;
use lf_concurrent::retire;

#[test]
fn retire_without_hazard_runs_deleter_inline() {
    let before = retire::pending_count();
    let dropped = Arc::new(AtomicUsize::new(0));
    let d = dropped.clone();
    let mut value = 1u32;
    let p: *mut u32 = &mut value;
    unsafe {
        retire::retire(p, move |_p| {
            d.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(dropped.load(Ordering::SeqCst), 1);
    assert_eq!(retire::pending_count(), before);
}

#[test]
fn retire_always_store_queues_then_prune_drains_it() {
    let mut value = 2u32;
    let p: *mut u32 = &mut value;
    let addr = p as usize;
    let before = retire::pending_count();

    let dropped = Arc::new(AtomicUsize::new(0));
    let d = dropped.clone();
    unsafe {
        retire::retire_always_store(p, move |_p| {
            d.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(retire::pending_count(), before + 1);
    assert!(!hazard::is_hazard(addr));

    retire::prune_once();
    assert_eq!(dropped.load(Ordering::SeqCst), 1);
    assert_eq!(retire::pending_count(), before);
}

#[test]
fn prune_once_on_quiescent_queue_is_a_no_op() {
    let before = retire::pending_count();
    retire::prune_once();
    assert_eq!(retire::pending_count(), before);
}

// A node still hazarded when the daemon is torn down is disposed best-effort
// rather than leaked forever, per the RetireLeakOnShutdown path.
#[test]
fn stop_prune_thread_force_drains_still_hazarded_nodes() {
    let mut value = 3u32;
    let p: *mut u32 = &mut value;
    let addr = p as usize;
    let hp = hazard::acquire_addr(addr);

    let before = retire::pending_count();
    let (_, warn_before) = lf_concurrent::get_error_warning_log_count();

    let dropped = Arc::new(AtomicUsize::new(0));
    let d = dropped.clone();
    unsafe {
        retire::retire_always_store(p, move |_p| {
            d.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(retire::pending_count(), before + 1);

    retire::stop_prune_thread();

    assert_eq!(dropped.load(Ordering::SeqCst), 1, "still-hazarded node must be force-disposed");
    assert_eq!(retire::pending_count(), before);
    let (_, warn_after) = lf_concurrent::get_error_warning_log_count();
    assert!(warn_after > warn_before);

    drop(hp);
}
