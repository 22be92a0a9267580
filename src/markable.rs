// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 lf-concurrent contributors
//
// A pointer + 1-bit delete mark packed into a single atomic word, plus the
// verify-exchange protocol used to publish such a pointer into a hazard
// slot without ABA risk. The packing technique (steal the low bit of a
// single atomic machine word rather than a separate bool) mirrors the
// reader-count/writer-flag packing in the teacher's single-word rwlock.

use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::hazard::HazardPointer;

const MARK_BIT: usize = 1;

#[inline]
fn pack<T>(p: *mut T, mark: bool) -> usize {
    debug_assert_eq!(p as usize & MARK_BIT, 0, "pointee must be >= 2-byte aligned");
    (p as usize & !MARK_BIT) | (mark as usize)
}

#[inline]
fn unpack<T>(word: usize) -> (*mut T, bool) {
    ((word & !MARK_BIT) as *mut T, word & MARK_BIT != 0)
}

/// A single atomic word encoding `(*mut T, logically_deleted: bool)`.
pub struct MarkableAtomicLink<T> {
    word: AtomicUsize,
    _marker: PhantomData<*mut T>,
}

impl<T> MarkableAtomicLink<T> {
    pub fn new(ptr: *mut T, mark: bool) -> Self {
        Self {
            word: AtomicUsize::new(pack(ptr, mark)),
            _marker: PhantomData,
        }
    }

    pub fn null() -> Self {
        Self::new(ptr::null_mut(), false)
    }

    pub fn load(&self, order: Ordering) -> (*mut T, bool) {
        unpack(self.word.load(order))
    }

    /// CAS from `(expected_ptr, expected_mark)` to `(new_ptr, new_mark)`.
    pub fn compare_exchange(
        &self,
        expected: (*mut T, bool),
        new: (*mut T, bool),
    ) -> Result<(), (*mut T, bool)> {
        let expected_word = pack(expected.0, expected.1);
        let new_word = pack(new.0, new.1);
        self.word
            .compare_exchange(expected_word, new_word, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| unpack(actual))
    }

    /// Set the delete mark, leaving the pointer bits unchanged, but only if
    /// the current value equals `(expected_ptr, false)`. Returns whether the
    /// mark was set by this call.
    pub fn try_set_mark(&self, expected_ptr: *mut T) -> bool {
        let expected_word = pack(expected_ptr, false);
        let new_word = pack(expected_ptr, true);
        self.word
            .compare_exchange(expected_word, new_word, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Store unconditionally (used only where no concurrent writer can race,
    /// e.g. initializing a freshly allocated node's next link).
    pub fn store(&self, ptr: *mut T, mark: bool, order: Ordering) {
        self.word.store(pack(ptr, mark), order);
    }

    /// Two-phase verify-exchange: publish the current pointer into `hp`,
    /// re-load, and retry until the published value is confirmed stable.
    /// While `hp` holds the returned pointer it is safe to dereference.
    pub fn protect_with(&self, hp: &HazardPointer) -> (*mut T, bool) {
        loop {
            let read1 = self.load(Ordering::Acquire);
            hp.protect_addr(read1.0 as usize);
            let read2 = self.load(Ordering::Acquire);
            if read1.0 as usize == read2.0 as usize && read1.1 == read2.1 {
                return read1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_roundtrip() {
        let mut x = 42u32;
        let p: *mut u32 = &mut x;
        assert_eq!(unpack::<u32>(pack(p, false)), (p, false));
        assert_eq!(unpack::<u32>(pack(p, true)), (p, true));
    }

    #[test]
    fn cas_and_mark() {
        let mut x = 1u64;
        let p: *mut u64 = &mut x;
        let link = MarkableAtomicLink::new(p, false);
        assert!(link.compare_exchange((p, false), (ptr::null_mut(), false)).is_ok());
        assert_eq!(link.load(Ordering::Acquire), (ptr::null_mut(), false));

        let link2 = MarkableAtomicLink::new(p, false);
        assert!(link2.try_set_mark(p));
        assert_eq!(link2.load(Ordering::Acquire), (p, true));
        // Second attempt fails: current value no longer (p, false).
        assert!(!link2.try_set_mark(p));
    }

    #[test]
    fn verify_exchange_publishes_stable_read() {
        let mut x = 7u64;
        let p: *mut u64 = &mut x;
        let link = MarkableAtomicLink::new(p, false);
        let hp = crate::hazard::acquire();
        let (got, mark) = link.protect_with(&hp);
        assert_eq!(got, p);
        assert!(!mark);
        assert!(crate::hazard::is_hazard(p as usize));
    }
}
