// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 lf-concurrent contributors
//
// Node substrate shared by the FIFO, stack and ordered list: the two link
// flavors (plain atomic next-pointer vs. markable atomic next-pointer), the
// value carrier that owns a node's payload, and a node pool that recycles
// freed nodes through the retire manager instead of truly freeing them.

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::hazard;
use crate::markable::MarkableAtomicLink;
use crate::retire;

/// Verify-exchange publish of a plain `AtomicPtr` into a hazard slot, shared
/// by the FIFO and stack (both use unmarked `HazardLink` next-pointers).
pub(crate) fn protect_ptr<T>(
    src: &AtomicPtr<HazardLink<T>>,
    hp: &hazard::HazardPointer,
) -> *mut HazardLink<T> {
    loop {
        let read1 = src.load(Ordering::Acquire);
        hp.protect_addr(read1 as usize);
        let read2 = src.load(Ordering::Acquire);
        if read1 == read2 {
            return read1;
        }
    }
}

/// Non-atomic next-pointer. Used only inside thread-local staging lists
/// where a single thread has exclusive ownership of the whole chain.
pub struct SimpleLink<T> {
    pub next: *mut T,
}

/// Storage for a node's payload with move-out-once semantics: `take()` may
/// be called at most once per node lifetime (callers enforce this via the
/// container protocol -- a node is taken at most once, by at most one
/// successful pop/remove).
pub struct ValueCarrier<T> {
    value: UnsafeCell<Option<T>>,
}

impl<T> ValueCarrier<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(Some(value)),
        }
    }

    pub fn empty() -> Self {
        Self {
            value: UnsafeCell::new(None),
        }
    }

    /// Move the payload out. Safety: the caller must have exclusive access
    /// to this node (guaranteed by the container's CAS-win protocol) and
    /// must not call this twice.
    ///
    /// # Safety
    /// The caller must hold exclusive ownership of this carrier (i.e. it
    /// must be the sole successful pop/remove of the node owning it).
    pub unsafe fn take(&self) -> Option<T> {
        (*self.value.get()).take()
    }

    /// Read-only peek without consuming, used by the ordered list's
    /// `find_if`/`for_each` which must not disturb the value.
    ///
    /// # Safety
    /// The caller must guarantee no concurrent `take()` races this read.
    pub unsafe fn peek(&self) -> Option<&T> {
        (*self.value.get()).as_ref()
    }
}

// Safety: access is serialized by the owning container's CAS protocol.
unsafe impl<T: Send> Send for ValueCarrier<T> {}
unsafe impl<T: Send> Sync for ValueCarrier<T> {}

/// A node for the FIFO and the stack: a plain atomic next-pointer plus a
/// value carrier. Hazard protection is applied externally by the container
/// (via `hazard::acquire`), not stored per-node.
pub struct HazardLink<T> {
    pub next: AtomicPtr<HazardLink<T>>,
    pub carrier: ValueCarrier<T>,
}

impl<T> HazardLink<T> {
    pub fn new_sentinel() -> *mut Self {
        Box::into_raw(Box::new(Self {
            next: AtomicPtr::new(ptr::null_mut()),
            carrier: ValueCarrier::empty(),
        }))
    }

    pub fn new_with_value(value: T) -> *mut Self {
        Box::into_raw(Box::new(Self {
            next: AtomicPtr::new(ptr::null_mut()),
            carrier: ValueCarrier::new(value),
        }))
    }
}

/// A node for the ordered list: a markable atomic next-pointer (logical
/// delete mark + physical pointer in one word) plus a value carrier.
pub struct MarkableHazardLink<T> {
    pub next: MarkableAtomicLink<MarkableHazardLink<T>>,
    pub carrier: ValueCarrier<T>,
}

impl<T> MarkableHazardLink<T> {
    pub fn new_sentinel() -> *mut Self {
        Box::into_raw(Box::new(Self {
            next: MarkableAtomicLink::null(),
            carrier: ValueCarrier::empty(),
        }))
    }

    pub fn new_with_value(value: T) -> *mut Self {
        Box::into_raw(Box::new(Self {
            next: MarkableAtomicLink::null(),
            carrier: ValueCarrier::new(value),
        }))
    }
}

/// Recycles freed nodes of type `N` through the retire manager rather than
/// dropping them immediately, so a node still visible to some hazard slot
/// is kept alive until a prune sweep confirms it is safe to reuse or drop.
///
/// This crate does not pool the boxed allocation itself (the retire
/// manager's deleter simply drops the `Box`); `NodePool` exists as the
/// named seam the spec describes, and is the integration point a caller
/// wanting true slot reuse would extend.
pub struct NodePool;

impl NodePool {
    /// Retire `node`, deferring its destruction until no hazard pointer
    /// observes its address.
    pub fn recycle<N: Send + 'static>(node: *mut N) {
        if node.is_null() {
            return;
        }
        // Safety: caller guarantees `node` was unlinked and will not be
        // dereferenced again by anyone holding a non-hazarded reference.
        unsafe {
            retire::retire(node, |p: *mut N| {
                drop(Box::from_raw(p));
            });
        }
    }
}
