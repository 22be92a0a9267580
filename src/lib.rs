// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 lf-concurrent contributors
//
// Lock-free containers and a hazard-pointer-protected slab allocator: a
// hazard-pointer registry and retire manager for safe memory reclamation, a
// FIFO queue / LIFO stack / ordered singly-linked list built on a shared
// node substrate, and a semi-lock-free multi-size-class slab allocator that
// reclaims chunks under the same hazard-pointer discipline.

pub mod logging;

pub mod error;
pub use error::ConfigError;

pub mod config;
pub use config::{Config, Flags, SizeClass};

pub mod spin_lock;

pub mod hazard;
pub use hazard::{is_hazard, HazardPointer};

pub mod retire;

mod markable;
mod node;

pub mod fifo;
pub use fifo::Fifo;

pub mod stack;
pub use stack::Stack;

pub mod list;
pub use list::OrderedList;

pub mod containers;

pub mod stats;
pub use stats::ChunkStatistics;

pub mod slab;
pub use slab::GeneralAllocator;

pub use logging::{
    get_error_warning_log_count, get_error_warning_log_count_and_reset, set_log_sink, LogSink,
    Severity,
};

/// Allocate `bytes` with the given `alignment` from the crate-wide default
/// allocator. Applications needing a custom size-class table should build
/// their own [`GeneralAllocator`] instead.
pub fn gmem_allocate(bytes: usize, alignment: usize) -> *mut u8 {
    slab::allocator::default_allocator().gmem_allocate(bytes, alignment)
}

/// Deallocate a pointer previously returned by [`gmem_allocate`].
pub fn gmem_deallocate(ptr: *mut u8) -> bool {
    slab::allocator::default_allocator().gmem_deallocate(ptr)
}

/// Drive the default allocator's chunk lists toward freeing reclaimable chunks.
pub fn gmem_prune() {
    slab::allocator::default_allocator().gmem_prune();
}

/// Snapshot per-size-class statistics from the default allocator.
pub fn gmem_get_statistics() -> Vec<ChunkStatistics> {
    slab::allocator::default_allocator().gmem_get_statistics()
}

/// Test-only hook: release every hazard-pointer group and stop the retire
/// manager's prune daemon. Callers must ensure no container or allocator
/// operation is in flight before calling this.
pub fn destroy_all() {
    retire::stop_prune_thread();
    hazard::destroy_all();
}
