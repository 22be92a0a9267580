// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 lf-concurrent contributors
//
// Lock-free push-only chunk list for one size class. Grounded on
// `chunk_list` in `lf_mem_alloc_internal.hpp`: chunks are never removed
// from the chain (`atomic_push_list`), growth doubles the slot count of
// the next chunk and marks existing chunks RESERVED_DELETION
// (`mark_as_reserved_deletion`), and each thread keeps a hint to the chunk
// it last allocated from (`tl_chunk_param::tls_p_hint_chunk`) -- expressed
// here as a `thread_local!` map keyed by this list's address rather than a
// `dynamic_tls` slot, since Rust's TLS already gives per-thread storage
// with a destructor hook.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crate::stats::{ChunkListStatistics, ChunkStatistics};

use super::chunk::{ChunkHeader, ChunkStatus, RecycleOutcome};

thread_local! {
    static HINT: RefCell<HashMap<usize, *mut ChunkHeader>> = RefCell::new(HashMap::new());
}

pub struct ChunkList {
    head: AtomicPtr<ChunkHeader>,
    slot_bytes: usize,
    next_slots_per_chunk: AtomicUsize,
    stats: ChunkListStatistics,
}

impl ChunkList {
    pub fn new(slot_bytes: usize, initial_slots_per_chunk: usize) -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            slot_bytes,
            next_slots_per_chunk: AtomicUsize::new(initial_slots_per_chunk.max(1)),
            stats: ChunkListStatistics::new(),
        }
    }

    pub fn slot_bytes(&self) -> usize {
        self.slot_bytes
    }

    fn list_key(&self) -> usize {
        self as *const Self as usize
    }

    fn hint(&self) -> Option<*mut ChunkHeader> {
        HINT.with(|h| h.borrow().get(&self.list_key()).copied())
    }

    fn set_hint(&self, chunk: *mut ChunkHeader) {
        HINT.with(|h| {
            h.borrow_mut().insert(self.list_key(), chunk);
        });
    }

    fn push_chunk(&self, chunk: *mut ChunkHeader) {
        let mut cur_head = self.head.load(Ordering::Acquire);
        loop {
            unsafe {
                (*chunk).next.store(cur_head, Ordering::Release);
            }
            match self.head.compare_exchange_weak(
                cur_head,
                chunk,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => cur_head = observed,
            }
        }
        // chunk headers are permanent: `chunk_num` only ever grows.
    }

    fn mark_older_chunks_reserved_deletion(&self, keep: *mut ChunkHeader) {
        let mut cur = self.head.load(Ordering::Acquire);
        while !cur.is_null() {
            if cur != keep {
                unsafe {
                    (*cur).set_delete_reservation();
                }
            }
            cur = unsafe { (*cur).next.load(Ordering::Acquire) };
        }
    }

    /// Claim and install a brand-new chunk, doubling the per-chunk slot
    /// count for future growth, then demote every other chunk to
    /// RESERVED_DELETION so their freed slots drain out.
    fn grow(&self) -> Option<*mut ChunkHeader> {
        let slots = self.next_slots_per_chunk.load(Ordering::Acquire);
        let chunk = Box::into_raw(Box::new(ChunkHeader::new_empty(self.slot_bytes, slots)));
        if !unsafe { (*chunk).try_claim_empty() } {
            unreachable!("freshly allocated chunk starts EMPTY");
        }
        if !unsafe { (*chunk).install_buffer() } {
            unsafe {
                drop(Box::from_raw(chunk));
            }
            return None;
        }
        self.push_chunk(chunk);
        self.stats.chunk_num.fetch_add(1, Ordering::Relaxed);
        self.stats.valid_chunk_num.fetch_add(1, Ordering::Relaxed);
        self.stats
            .total_slot_cnt
            .fetch_add(slots, Ordering::Relaxed);
        self.stats.free_slot_cnt.fetch_add(slots, Ordering::Relaxed);
        self.next_slots_per_chunk
            .store(slots.saturating_mul(2).max(1), Ordering::Release);
        self.mark_older_chunks_reserved_deletion(chunk);
        self.set_hint(chunk);
        Some(chunk)
    }

    pub fn allocate_mem_slot(&self) -> Option<*mut u8> {
        if let Some(hint) = self.hint() {
            if let Some(p) = unsafe { (*hint).allocate_slot(&self.stats) } {
                return Some(p);
            }
        }

        let mut cur = self.head.load(Ordering::Acquire);
        while !cur.is_null() {
            if Some(cur) != self.hint() {
                if let Some(p) = unsafe { (*cur).allocate_slot(&self.stats) } {
                    self.set_hint(cur);
                    return Some(p);
                }
            }
            // a RESERVED_DELETION chunk can be reclaimed back into service
            // if nothing else is available; try unsetting the reservation.
            if unsafe { (*cur).status() } == ChunkStatus::ReservedDeletion
                && unsafe { (*cur).unset_delete_reservation() }
            {
                if let Some(p) = unsafe { (*cur).allocate_slot(&self.stats) } {
                    self.set_hint(cur);
                    return Some(p);
                }
            }
            cur = unsafe { (*cur).next.load(Ordering::Acquire) };
        }

        let grown = self.grow()?;
        unsafe { (*grown).allocate_slot(&self.stats) }
    }

    /// Recycle a slot this list's chunk owns, trusting the slot header's
    /// `owner` pointer (validated by the caller before it gets here).
    pub fn recycle_via_owner(
        owner: *const ChunkHeader,
        user_ptr: *mut u8,
        non_reuse: bool,
        stats: &ChunkListStatistics,
    ) -> RecycleOutcome {
        unsafe { (*owner).recycle_slot(user_ptr, non_reuse, stats) }
    }

    /// Address-range recovery scan used when a slot header fails its
    /// checksum check: walk every chunk looking for one whose buffer
    /// contains `user_ptr`.
    pub fn try_recover(&self, user_ptr: *mut u8, non_reuse: bool) -> RecycleOutcome {
        let addr = user_ptr as usize;
        let mut cur = self.head.load(Ordering::Acquire);
        while !cur.is_null() {
            if unsafe { (*cur).contains_addr(addr) } {
                return unsafe { (*cur).recycle_slot_by_addr(user_ptr, non_reuse, &self.stats) };
            }
            cur = unsafe { (*cur).next.load(Ordering::Acquire) };
        }
        RecycleOutcome::NotOwned
    }

    /// Drive every RESERVED_DELETION chunk toward EMPTY where safe.
    pub fn prune(&self) {
        let mut cur = self.head.load(Ordering::Acquire);
        while !cur.is_null() {
            if unsafe { (*cur).try_prune() } {
                self.stats.valid_chunk_num.fetch_sub(1, Ordering::Relaxed);
                self.stats
                    .total_slot_cnt
                    .fetch_sub(unsafe { (*cur).slots_per_chunk() }, Ordering::Relaxed);
                self.stats.free_slot_cnt.fetch_sub(
                    unsafe { (*cur).slots_per_chunk() }.min(self.stats.free_slot_cnt.load(Ordering::Relaxed)),
                    Ordering::Relaxed,
                );
            }
            cur = unsafe { (*cur).next.load(Ordering::Acquire) };
        }
    }

    pub fn get_statistics(&self) -> ChunkStatistics {
        self.stats.snapshot(self.slot_bytes, self.next_slots_per_chunk.load(Ordering::Relaxed))
    }

    /// Whether `owner` is one of this list's chunk headers.
    pub fn contains_chunk(&self, owner: *const ChunkHeader) -> bool {
        let mut cur = self.head.load(Ordering::Acquire);
        while !cur.is_null() {
            if cur as *const ChunkHeader == owner {
                return true;
            }
            cur = unsafe { (*cur).next.load(Ordering::Acquire) };
        }
        false
    }

    pub fn stats(&self) -> &ChunkListStatistics {
        &self.stats
    }
}

impl Drop for ChunkList {
    fn drop(&mut self) {
        let mut cur = self.head.load(Ordering::Acquire);
        while !cur.is_null() {
            let next = unsafe { (*cur).next.load(Ordering::Acquire) };
            unsafe {
                drop(Box::from_raw(cur));
            }
            cur = next;
        }
    }
}
