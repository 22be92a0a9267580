// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 lf-concurrent contributors
//
// Michael-Scott lock-free FIFO over `node::HazardLink`, with a permanent
// sentinel node so `head != null` always holds. Grounded on
// `od_lockfree_fifo.hpp`'s method surface (`push_back`, `pop_front`,
// `push_front`, `release_sentinel_node`, `introduce_sentinel_node`).
//
// One deliberate deviation from the source's literal step ordering: the
// source invokes its pick-up-value callback *before* the head CAS, relying
// on the callback being a copy that every racing thread may harmlessly
// perform. Because this crate moves `T` out of the node rather than
// copying it, the value is instead taken *after* this thread wins the head
// CAS, which is the only point at which exactly one thread is guaranteed
// to reach it. This preserves invariant (ii) of the source ("every payload
// node is observed by at most one successful pop_front") for non-`Copy`
// `T`, which a pre-CAS move could not.

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

use crate::error::ErrorKind;
use crate::hazard;
use crate::logging::{self, Severity};
use crate::node::{protect_ptr as protect, HazardLink, NodePool};

pub struct Fifo<T> {
    head: AtomicPtr<HazardLink<T>>,
    tail: AtomicPtr<HazardLink<T>>,
    approx_len: AtomicUsize,
    released: AtomicBool,
}

unsafe impl<T: Send> Send for Fifo<T> {}
unsafe impl<T: Send> Sync for Fifo<T> {}

impl<T> Fifo<T> {
    pub fn new() -> Self {
        let sentinel = HazardLink::<T>::new_sentinel();
        Self {
            head: AtomicPtr::new(sentinel),
            tail: AtomicPtr::new(sentinel),
            approx_len: AtomicUsize::new(0),
            released: AtomicBool::new(false),
        }
    }

    pub fn push_back(&self, value: T) {
        let new_node = HazardLink::new_with_value(value);
        let hp = hazard::acquire();
        loop {
            let tail_ptr = protect(&self.tail, &hp);
            let next = unsafe { (*tail_ptr).next.load(Ordering::Acquire) };
            if !next.is_null() {
                let _ = self.tail.compare_exchange(
                    tail_ptr,
                    next,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                continue;
            }
            if unsafe { &(*tail_ptr).next }
                .compare_exchange(ptr::null_mut(), new_node, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let _ = self.tail.compare_exchange(
                    tail_ptr,
                    new_node,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                self.approx_len.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
    }

    /// Prepend `value` at the head, ahead of everything already queued.
    /// Rare relative to `push_back`: converts into a `push_back` on an
    /// empty queue, otherwise ejects the current sentinel in favor of a new
    /// one chained ahead of the old contents.
    pub fn push_front(&self, value: T) {
        let mut pending = Some(value);
        let hp_head = hazard::acquire();
        loop {
            let old_head = protect(&self.head, &hp_head);
            if old_head.is_null() {
                // Released for test teardown; nothing sensible to do.
                return;
            }
            let hp_next = hazard::acquire();
            let next = unsafe { (*old_head).next.load(Ordering::Acquire) };
            if next.is_null() {
                self.push_back(pending.take().expect("value consumed at most once"));
                return;
            }
            hp_next.protect_addr(next as usize);
            // Re-verify old_head->next still points at `next` now that it's
            // published; a concurrent pop_front may have retired old_head.
            if unsafe { (*old_head).next.load(Ordering::Acquire) } != next {
                continue;
            }
            let value_node = HazardLink::new_with_value(pending.take().expect("value consumed at most once"));
            let new_sentinel = HazardLink::<T>::new_sentinel();
            unsafe {
                (*new_sentinel).next.store(value_node, Ordering::Relaxed);
                (*value_node).next.store(next, Ordering::Relaxed);
            }
            if self
                .head
                .compare_exchange(old_head, new_sentinel, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.approx_len.fetch_add(1, Ordering::Relaxed);
                NodePool::recycle(old_head);
                return;
            }
            // Lost the race: reclaim the nodes we built and retry.
            unsafe {
                pending = (*value_node).carrier.take();
                drop(Box::from_raw(value_node));
                drop(Box::from_raw(new_sentinel));
            }
        }
    }

    /// Test-teardown-only: release the queue's sentinel, returning true iff
    /// this call actually released it. Requires the queue to be empty; on a
    /// non-empty queue the release still proceeds (logging a
    /// `PrecondViolation` ERROR) and the remaining chain is leaked, per the
    /// documented behaviour. A second call on an already-released queue
    /// logs a WARN and returns false. Further container operations after a
    /// release are unspecified.
    pub fn release_sentinel_node(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            logging::log(
                Severity::Warn,
                "release_sentinel_node called twice on the same fifo",
            );
            return false;
        }
        let head_ptr = self.head.swap(ptr::null_mut(), Ordering::AcqRel);
        let next = unsafe { (*head_ptr).next.load(Ordering::Acquire) };
        if !next.is_null() {
            logging::log(
                Severity::Error,
                format!(
                    "{}: release_sentinel_node called on a non-empty fifo",
                    ErrorKind::PrecondViolation.as_str()
                ),
            );
            return true;
        }
        unsafe {
            drop(Box::from_raw(head_ptr));
        }
        true
    }

    pub fn pop_front(&self) -> Option<T> {
        let hp_head = hazard::acquire();
        loop {
            let head_ptr = protect(&self.head, &hp_head);
            if head_ptr.is_null() {
                return None;
            }
            let next = unsafe { (*head_ptr).next.load(Ordering::Acquire) };
            if next.is_null() {
                return None;
            }
            if head_ptr == self.tail.load(Ordering::Acquire) {
                let _ = self.tail.compare_exchange(
                    head_ptr,
                    next,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                continue;
            }
            let hp_next = hazard::acquire();
            hp_next.protect_addr(next as usize);
            // Re-verify head has not advanced past `next` while we published it.
            if unsafe { (*head_ptr).next.load(Ordering::Acquire) } != next {
                continue;
            }
            if self
                .head
                .compare_exchange(head_ptr, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let value = unsafe { (*next).carrier.take() };
                self.approx_len.fetch_sub(1, Ordering::Relaxed);
                NodePool::recycle(head_ptr);
                return value;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        let head_ptr = self.head.load(Ordering::Acquire);
        if head_ptr.is_null() {
            return true;
        }
        unsafe { (*head_ptr).next.load(Ordering::Acquire).is_null() }
    }

    pub fn size_approx(&self) -> usize {
        self.approx_len.load(Ordering::Relaxed)
    }
}

impl<T> Default for Fifo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Fifo<T> {
    fn drop(&mut self) {
        let mut remaining = 0u32;
        while self.pop_front().is_some() {
            remaining += 1;
        }
        if remaining > 0 {
            crate::logging::log(
                crate::logging::Severity::Warn,
                format!("DestructorRemainingNodes: fifo dropped with {remaining} node(s) still queued"),
            );
        }
        let sentinel = self.head.load(Ordering::Acquire);
        if !sentinel.is_null() {
            unsafe {
                drop(Box::from_raw(sentinel));
            }
        }
    }
}
