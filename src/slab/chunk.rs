// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 lf-concurrent contributors
//
// One chunk: an aligned buffer sliced into fixed-size slots, a per-slot
// status array, and the EMPTY/RESERVED_ALLOCATION/NORMAL/RESERVED_DELETION/
// ANNOUNCEMENT_DELETION/DELETION state machine. Grounded on
// `chunk_header_multi_slot` in `lf_mem_alloc_internal.hpp`: the permanent
// never-freed chunk header, the `status_` CAS-driven lifecycle, and the
// `num_of_accesser_` counter gating the final free.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicPtr, AtomicU32, Ordering};

use crossbeam_utils::CachePadded;

use crate::error::ErrorKind;
use crate::logging::{self, Severity};
use crate::stats::ChunkListStatistics;

use super::index::FreeSlotIndexManager;

/// Alignment guaranteed to every slot payload. Large enough to cover common
/// scalar and SIMD-ish payloads; requests needing more must go through the
/// oversize fallback (see `allocator.rs`), which honours arbitrary
/// alignment directly via `Layout`.
pub const SLOT_ALIGN: usize = 16;

/// Fixed-size prefix in front of every payload this crate hands out,
/// whether carved from a chunk slot or obtained from the oversize
/// fallback. `meta`'s meaning is path-dependent: the in-chunk slot index
/// for chunk-owned slots, or the full allocation size for the oversize
/// path (whose owner is always 0). `meta2` is unused by the chunk path and
/// carries the requested alignment for the oversize path.
#[repr(C, align(16))]
pub(crate) struct SlotHeader {
    pub(crate) owner: usize,
    pub(crate) checksum: usize,
    pub(crate) meta: usize,
    pub(crate) meta2: usize,
}

impl SlotHeader {
    fn new(owner: usize, meta: usize) -> Self {
        Self {
            owner,
            checksum: checksum_for(owner),
            meta,
            meta2: 0,
        }
    }

    pub(crate) fn new_oversize(total_alloc_size: usize, align: usize) -> Self {
        Self {
            owner: 0,
            checksum: checksum_for(0),
            meta: total_alloc_size,
            meta2: align,
        }
    }
}

pub(crate) fn checksum_for(owner: usize) -> usize {
    owner.wrapping_neg().wrapping_sub(1)
}

pub(crate) const HEADER_SIZE: usize = std::mem::size_of::<SlotHeader>();

/// Whether a double-free's error log should carry a captured backtrace.
/// Set once at allocator construction from `Flags::record_backtrace_double_free`
/// (see `allocator.rs::from_config`); only meaningful under the
/// `record_backtrace` feature.
static RECORD_DOUBLE_FREE_BACKTRACE: AtomicBool = AtomicBool::new(false);

pub(crate) fn set_record_double_free_backtrace(on: bool) {
    RECORD_DOUBLE_FREE_BACKTRACE.store(on, Ordering::Relaxed);
}

#[cfg(feature = "record_backtrace")]
fn double_free_backtrace_suffix() -> String {
    if RECORD_DOUBLE_FREE_BACKTRACE.load(Ordering::Relaxed) {
        format!("\ncaptured at free site:\n{:?}", backtrace::Backtrace::new())
    } else {
        String::new()
    }
}

#[cfg(not(feature = "record_backtrace"))]
fn double_free_backtrace_suffix() -> String {
    String::new()
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u32)]
pub enum ChunkStatus {
    Empty = 0,
    ReservedAllocation = 1,
    Normal = 2,
    ReservedDeletion = 3,
    AnnouncementDeletion = 4,
    Deletion = 5,
}

impl ChunkStatus {
    fn from_raw(raw: u32) -> Self {
        match raw {
            0 => ChunkStatus::Empty,
            1 => ChunkStatus::ReservedAllocation,
            2 => ChunkStatus::Normal,
            3 => ChunkStatus::ReservedDeletion,
            4 => ChunkStatus::AnnouncementDeletion,
            5 => ChunkStatus::Deletion,
            other => unreachable!("corrupt chunk status discriminant {other}"),
        }
    }
}

const SLOT_FREE: u8 = 0;
const SLOT_INUSE: u8 = 1;
const SLOT_DISCARDED: u8 = 2;

/// One chunk header. Never freed once allocated -- only its payload buffer
/// cycles between allocated and freed as the chunk moves through the
/// EMPTY/NORMAL/RESERVED_DELETION states.
pub struct ChunkHeader {
    pub next: AtomicPtr<ChunkHeader>,
    status: AtomicU32,
    accessor_count: CachePadded<AtomicI64>,
    /// Usable payload capacity per slot, as configured by the owning size
    /// class. The slot header is carried on top of this, not carved out of
    /// it -- see `slot_stride`.
    slot_bytes: usize,
    /// Physical byte distance between consecutive slots:
    /// `round_up(HEADER_SIZE + slot_bytes, SLOT_ALIGN)`.
    slot_stride: usize,
    slots_per_chunk: usize,
    buffer: AtomicPtr<u8>,
    buffer_layout: std::cell::UnsafeCell<Option<Layout>>,
    slot_status: Vec<std::sync::atomic::AtomicU8>,
    free_index: FreeSlotIndexManager,
}

unsafe impl Send for ChunkHeader {}
unsafe impl Sync for ChunkHeader {}

/// RAII guard bumping the chunk's accessor counter for the duration of an
/// operation that reads the chunk's buffer. The DELETION transition may
/// only proceed once this counter is zero.
struct AccessorGuard<'a> {
    chunk: &'a ChunkHeader,
}

impl<'a> AccessorGuard<'a> {
    fn enter(chunk: &'a ChunkHeader) -> Self {
        chunk.accessor_count.fetch_add(1, Ordering::AcqRel);
        Self { chunk }
    }
}

impl Drop for AccessorGuard<'_> {
    fn drop(&mut self) {
        self.chunk.accessor_count.fetch_sub(1, Ordering::AcqRel);
    }
}

pub enum RecycleOutcome {
    Recycled,
    DoubleFree,
    NotOwned,
}

impl ChunkHeader {
    pub fn new_empty(slot_bytes: usize, slots_per_chunk: usize) -> Self {
        let slot_bytes = slot_bytes.max(1);
        let slot_stride = round_up(HEADER_SIZE + slot_bytes, SLOT_ALIGN);
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
            status: AtomicU32::new(ChunkStatus::Empty as u32),
            accessor_count: CachePadded::new(AtomicI64::new(0)),
            slot_bytes,
            slot_stride,
            slots_per_chunk,
            buffer: AtomicPtr::new(ptr::null_mut()),
            buffer_layout: std::cell::UnsafeCell::new(None),
            slot_status: (0..slots_per_chunk)
                .map(|_| std::sync::atomic::AtomicU8::new(SLOT_FREE))
                .collect(),
            free_index: FreeSlotIndexManager::new(),
        }
    }

    pub fn status(&self) -> ChunkStatus {
        ChunkStatus::from_raw(self.status.load(Ordering::Acquire))
    }

    pub fn slot_bytes(&self) -> usize {
        self.slot_bytes
    }

    pub fn slots_per_chunk(&self) -> usize {
        self.slots_per_chunk
    }

    fn cas_status(&self, from: ChunkStatus, to: ChunkStatus) -> bool {
        self.status
            .compare_exchange(from as u32, to as u32, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// EMPTY -> RESERVED_ALLOCATION. The winning thread must follow up with
    /// either [`Self::install_buffer`] or [`Self::rollback_reserved_to_empty`].
    pub fn try_claim_empty(&self) -> bool {
        self.cas_status(ChunkStatus::Empty, ChunkStatus::ReservedAllocation)
    }

    /// Undo a claim whose buffer installation failed, per the compound-
    /// transition recovery rule: no chunk is left stranded in
    /// RESERVED_ALLOCATION.
    pub fn rollback_reserved_to_empty(&self) {
        let ok = self.cas_status(ChunkStatus::ReservedAllocation, ChunkStatus::Empty);
        debug_assert!(ok, "rollback must be called only by the claiming thread");
    }

    /// Allocate the chunk's backing buffer and publish every slot as free,
    /// then move RESERVED_ALLOCATION -> NORMAL. Returns false (with the
    /// chunk rolled back to EMPTY) if the system allocator fails.
    pub fn install_buffer(&self) -> bool {
        let total = self.slot_stride * self.slots_per_chunk;
        let layout = match Layout::from_size_align(total, SLOT_ALIGN) {
            Ok(l) => l,
            Err(_) => {
                self.rollback_reserved_to_empty();
                return false;
            }
        };
        let ptr = unsafe { alloc(layout) };
        if ptr.is_null() {
            self.rollback_reserved_to_empty();
            return false;
        }
        self.buffer.store(ptr, Ordering::Release);
        unsafe {
            *self.buffer_layout.get() = Some(layout);
        }
        for idx in 0..self.slots_per_chunk as u32 {
            self.free_index.push(idx);
        }
        let ok = self.cas_status(ChunkStatus::ReservedAllocation, ChunkStatus::Normal);
        debug_assert!(ok, "install_buffer must be called only by the claiming thread");
        true
    }

    fn slot_ptr(&self, idx: u32) -> *mut u8 {
        let base = self.buffer.load(Ordering::Acquire);
        unsafe { base.add(idx as usize * self.slot_stride) }
    }

    /// Allocate one slot, if this chunk is NORMAL and has a free index.
    /// `req_size + HEADER_SIZE` must already be known to fit `slot_bytes`
    /// (the allocator's size-class scan guarantees this).
    pub fn allocate_slot(&self, stats: &ChunkListStatistics) -> Option<*mut u8> {
        if self.status() != ChunkStatus::Normal {
            return None;
        }
        let _guard = AccessorGuard::enter(self);
        let idx = self.free_index.pop()?;
        let ok = self.slot_status[idx as usize]
            .compare_exchange(
                SLOT_FREE,
                SLOT_INUSE,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !ok {
            // Should not happen: the index manager only ever hands out
            // indices it was told are free. Treat as a collision and bail.
            stats.alloc_collision_cnt.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let header_ptr = self.slot_ptr(idx) as *mut SlotHeader;
        unsafe {
            header_ptr.write(SlotHeader::new(self as *const Self as usize, idx as usize));
        }
        stats.record_alloc_success();
        Some(unsafe { (header_ptr as *mut u8).add(HEADER_SIZE) })
    }

    /// Recycle a slot previously returned by `allocate_slot`. `user_ptr`
    /// must point at a payload this chunk actually issued.
    pub fn recycle_slot(
        &self,
        user_ptr: *mut u8,
        non_reuse: bool,
        stats: &ChunkListStatistics,
    ) -> RecycleOutcome {
        let _guard = AccessorGuard::enter(self);
        let header_ptr = unsafe { user_ptr.sub(HEADER_SIZE) } as *mut SlotHeader;
        let header = unsafe { &*header_ptr };
        if header.owner != self as *const Self as usize || header.checksum != checksum_for(header.owner) {
            return RecycleOutcome::NotOwned;
        }
        if header.meta >= self.slots_per_chunk {
            return RecycleOutcome::NotOwned;
        }
        let idx = header.meta as u32;
        let target = if non_reuse { SLOT_DISCARDED } else { SLOT_FREE };
        let ok = self.slot_status[idx as usize]
            .compare_exchange(SLOT_INUSE, target, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !ok {
            stats.record_dealloc_failure();
            logging::log(
                Severity::Error,
                format!(
                    "{}: slot {idx} of chunk {:p} double-freed{}",
                    ErrorKind::DoubleFree.as_str(),
                    self as *const Self,
                    double_free_backtrace_suffix(),
                ),
            );
            return RecycleOutcome::DoubleFree;
        }
        stats.record_dealloc_success();
        if !non_reuse {
            self.free_index.push(idx);
        }
        RecycleOutcome::Recycled
    }

    /// Whether `addr` falls inside this chunk's current backing buffer.
    /// Used only by the corrupt-header recovery scan, which cannot trust
    /// the slot header it was handed.
    pub fn contains_addr(&self, addr: usize) -> bool {
        let base = self.buffer.load(Ordering::Acquire) as usize;
        if base == 0 {
            return false;
        }
        let size = self.slot_stride * self.slots_per_chunk;
        addr >= base && addr < base + size
    }

    /// Recover a slot index purely from `user_ptr`'s offset into this
    /// chunk's buffer, bypassing the (possibly corrupt) slot header.
    pub fn recycle_slot_by_addr(
        &self,
        user_ptr: *mut u8,
        non_reuse: bool,
        stats: &ChunkListStatistics,
    ) -> RecycleOutcome {
        let _guard = AccessorGuard::enter(self);
        let base = self.buffer.load(Ordering::Acquire) as usize;
        let addr = user_ptr as usize;
        if base == 0 || addr < base + HEADER_SIZE {
            return RecycleOutcome::NotOwned;
        }
        let offset = addr - HEADER_SIZE - base;
        if offset % self.slot_stride != 0 {
            return RecycleOutcome::NotOwned;
        }
        let idx = offset / self.slot_stride;
        if idx >= self.slots_per_chunk {
            return RecycleOutcome::NotOwned;
        }
        let idx = idx as u32;
        let target = if non_reuse { SLOT_DISCARDED } else { SLOT_FREE };
        let ok = self.slot_status[idx as usize]
            .compare_exchange(SLOT_INUSE, target, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !ok {
            stats.record_dealloc_failure();
            logging::log(
                Severity::Error,
                format!(
                    "{}: slot {idx} of chunk {:p} double-freed (recovered by address scan){}",
                    ErrorKind::DoubleFree.as_str(),
                    self as *const Self,
                    double_free_backtrace_suffix(),
                ),
            );
            return RecycleOutcome::DoubleFree;
        }
        stats.record_dealloc_success();
        if !non_reuse {
            self.free_index.push(idx);
        }
        RecycleOutcome::Recycled
    }

    pub fn set_delete_reservation(&self) -> bool {
        self.cas_status(ChunkStatus::Normal, ChunkStatus::ReservedDeletion)
    }

    pub fn unset_delete_reservation(&self) -> bool {
        self.cas_status(ChunkStatus::ReservedDeletion, ChunkStatus::Normal)
    }

    fn all_slots_reclaimable(&self) -> bool {
        self.slot_status
            .iter()
            .all(|s| s.load(Ordering::Acquire) != SLOT_INUSE)
    }

    /// Drive RESERVED_DELETION toward EMPTY if safe: no live accessor and no
    /// slot still INUSE. Returns true iff the buffer was freed this call.
    pub fn try_prune(&self) -> bool {
        if self.status() != ChunkStatus::ReservedDeletion {
            return false;
        }
        if !self.cas_status(ChunkStatus::ReservedDeletion, ChunkStatus::AnnouncementDeletion) {
            return false;
        }
        // Bounded spin for in-flight accessors to drain; a sweep that is
        // still blocked after this backs off to RESERVED_DELETION for the
        // next scheduled prune rather than spinning indefinitely.
        let mut k = 0u32;
        while self.accessor_count.load(Ordering::Acquire) != 0 && k < 32 {
            crate::spin_lock::adaptive_yield_pub(&mut k);
        }
        if self.accessor_count.load(Ordering::Acquire) != 0 || !self.all_slots_reclaimable() {
            // Not safe yet: back off to RESERVED_DELETION for a later sweep.
            self.status
                .store(ChunkStatus::ReservedDeletion as u32, Ordering::Release);
            return false;
        }
        let ok = self.cas_status(ChunkStatus::AnnouncementDeletion, ChunkStatus::Deletion);
        debug_assert!(ok, "single prune sweep owns this transition");

        let layout = unsafe { (*self.buffer_layout.get()).take() };
        let buf = self.buffer.swap(ptr::null_mut(), Ordering::AcqRel);
        if let (false, Some(layout)) = (buf.is_null(), layout) {
            unsafe {
                dealloc(buf, layout);
            }
        }
        for s in &self.slot_status {
            s.store(SLOT_FREE, Ordering::Release);
        }
        self.free_index.clear();
        let ok = self.cas_status(ChunkStatus::Deletion, ChunkStatus::Empty);
        debug_assert!(ok, "single prune sweep owns this transition");
        true
    }
}

impl Drop for ChunkHeader {
    fn drop(&mut self) {
        if let (buf, Some(layout)) = (*self.buffer.get_mut(), self.buffer_layout.get_mut().take()) {
            if !buf.is_null() {
                unsafe {
                    dealloc(buf, layout);
                }
            }
        }
    }
}

fn round_up(n: usize, align: usize) -> usize {
    (n + align - 1) / align * align
}
