// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 lf-concurrent contributors
//
// Per-size-class chunk statistics, grounded on
// `lf_mem_alloc_internal.hpp`'s `chunk_list_statistics` (field set kept,
// renamed to match the crate's `snake_case` public surface) plus the
// `chunk_statistics::print()` one-liner from `lf_mem_alloc_type.hpp`.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Live counters for one size class's chunk list. Shared by every chunk in
/// the list and the list itself; cheap to read, monotonic except for the
/// gauges (`chunk_num`, `valid_chunk_num`, `free_slot_cnt`, `consum_cnt`).
#[derive(Default)]
pub struct ChunkListStatistics {
    pub chunk_num: AtomicU32,
    pub valid_chunk_num: AtomicU32,
    pub total_slot_cnt: AtomicUsize,
    pub free_slot_cnt: AtomicUsize,
    pub consum_cnt: AtomicU32,
    pub max_consum_cnt: AtomicU32,
    pub alloc_req_cnt: AtomicU64,
    pub alloc_err_cnt: AtomicU64,
    pub dealloc_req_cnt: AtomicU64,
    pub dealloc_err_cnt: AtomicU64,
    pub alloc_collision_cnt: AtomicU64,
    pub dealloc_collision_cnt: AtomicU64,
}

impl ChunkListStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_alloc_success(&self) {
        self.alloc_req_cnt.fetch_add(1, Ordering::Relaxed);
        self.free_slot_cnt.fetch_sub(1, Ordering::Relaxed);
        let cur = self.consum_cnt.fetch_add(1, Ordering::AcqRel) + 1;
        let mut cur_max = self.max_consum_cnt.load(Ordering::Acquire);
        while cur > cur_max {
            match self.max_consum_cnt.compare_exchange_weak(
                cur_max,
                cur,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => cur_max = observed,
            }
        }
    }

    pub fn record_alloc_failure(&self) {
        self.alloc_req_cnt.fetch_add(1, Ordering::Relaxed);
        self.alloc_err_cnt.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dealloc_success(&self) {
        self.dealloc_req_cnt.fetch_add(1, Ordering::Relaxed);
        self.free_slot_cnt.fetch_add(1, Ordering::Relaxed);
        self.consum_cnt.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_dealloc_failure(&self) {
        self.dealloc_req_cnt.fetch_add(1, Ordering::Relaxed);
        self.dealloc_err_cnt.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, slot_bytes: usize, slots_per_chunk: usize) -> ChunkStatistics {
        ChunkStatistics {
            slot_bytes,
            slots_per_chunk,
            chunk_num: self.chunk_num.load(Ordering::Relaxed),
            valid_chunk_num: self.valid_chunk_num.load(Ordering::Relaxed),
            total_slot_cnt: self.total_slot_cnt.load(Ordering::Relaxed),
            free_slot_cnt: self.free_slot_cnt.load(Ordering::Relaxed),
            consum_cnt: self.consum_cnt.load(Ordering::Relaxed),
            max_consum_cnt: self.max_consum_cnt.load(Ordering::Relaxed),
            alloc_req_cnt: self.alloc_req_cnt.load(Ordering::Relaxed),
            alloc_err_cnt: self.alloc_err_cnt.load(Ordering::Relaxed),
            dealloc_req_cnt: self.dealloc_req_cnt.load(Ordering::Relaxed),
            dealloc_err_cnt: self.dealloc_err_cnt.load(Ordering::Relaxed),
            alloc_collision_cnt: self.alloc_collision_cnt.load(Ordering::Relaxed),
            dealloc_collision_cnt: self.dealloc_collision_cnt.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of one size class's activity, per §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkStatistics {
    pub slot_bytes: usize,
    pub slots_per_chunk: usize,
    pub chunk_num: u32,
    pub valid_chunk_num: u32,
    pub total_slot_cnt: usize,
    pub free_slot_cnt: usize,
    pub consum_cnt: u32,
    pub max_consum_cnt: u32,
    pub alloc_req_cnt: u64,
    pub alloc_err_cnt: u64,
    pub dealloc_req_cnt: u64,
    pub dealloc_err_cnt: u64,
    pub alloc_collision_cnt: u64,
    pub dealloc_collision_cnt: u64,
}

impl ChunkStatistics {
    pub fn print(&self) -> String {
        format!(
            "slot_bytes={} slots_per_chunk={} chunks={}/{} slots={}/{} consum={} max_consum={} alloc={}({} err) dealloc={}({} err) collisions(a/d)={}/{}",
            self.slot_bytes,
            self.slots_per_chunk,
            self.valid_chunk_num,
            self.chunk_num,
            self.free_slot_cnt,
            self.total_slot_cnt,
            self.consum_cnt,
            self.max_consum_cnt,
            self.alloc_req_cnt,
            self.alloc_err_cnt,
            self.dealloc_req_cnt,
            self.dealloc_err_cnt,
            self.alloc_collision_cnt,
            self.dealloc_collision_cnt,
        )
    }
}
