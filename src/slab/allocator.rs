// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 lf-concurrent contributors
//
// General-purpose allocator aggregating one chunk list per size class plus
// an oversize fallback to the system allocator. Grounded on
// `general_mem_allocator`/`gmem_allocate`/`gmem_deallocate` in
// `lf_mem_alloc.cpp` and `lf_mem_alloc_gmem.cpp`.

use std::alloc::{alloc, dealloc, Layout};
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::OnceCell;

use crate::config::{Config, Flags, SizeClass};
use crate::error::{ConfigError, ErrorKind};
use crate::logging::{self, Severity};
use crate::stats::ChunkStatistics;

use super::chunk::{checksum_for, ChunkHeader, RecycleOutcome, SlotHeader, HEADER_SIZE, SLOT_ALIGN};
use super::chunk_list::ChunkList;

pub struct GeneralAllocator {
    classes: Vec<ChunkList>,
    prune_in_progress: AtomicBool,
    non_reuse_slot: bool,
}

impl GeneralAllocator {
    /// Build an allocator from a raw size-class table, validating it the
    /// same way a [`Config`] does.
    pub fn new(size_classes: Vec<SizeClass>, flags: Flags) -> Result<Self, ConfigError> {
        let config = Config::new(size_classes, flags)?;
        Ok(Self::from_config(&config))
    }

    pub fn from_config(config: &Config) -> Self {
        super::chunk::set_record_double_free_backtrace(config.flags.record_backtrace_double_free);
        let classes = config
            .size_classes
            .iter()
            .map(|c| ChunkList::new(c.slot_bytes, c.initial_slots_per_chunk))
            .collect();
        Self {
            classes,
            prune_in_progress: AtomicBool::new(false),
            non_reuse_slot: config.flags.non_reuse_slot,
        }
    }

    fn class_for(&self, bytes: usize) -> Option<&ChunkList> {
        self.classes.iter().find(|c| c.slot_bytes() >= bytes)
    }

    /// Allocate `bytes` with the given `alignment`. Falls through to the
    /// system allocator, honouring `alignment` directly via `Layout`, when
    /// no configured size class is big enough or alignment exceeds what
    /// chunk slots guarantee.
    pub fn gmem_allocate(&self, bytes: usize, alignment: usize) -> *mut u8 {
        if alignment <= SLOT_ALIGN {
            if let Some(list) = self.class_for(bytes) {
                if let Some(p) = list.allocate_mem_slot() {
                    return p;
                }
            }
        }
        self.allocate_oversize(bytes, alignment)
    }

    fn allocate_oversize(&self, bytes: usize, alignment: usize) -> *mut u8 {
        let align = alignment.max(std::mem::align_of::<SlotHeader>());
        let total_size = match HEADER_SIZE.checked_add(bytes) {
            Some(n) => n,
            None => return std::ptr::null_mut(),
        };
        let layout = match Layout::from_size_align(total_size, align) {
            Ok(l) => l,
            Err(_) => return std::ptr::null_mut(),
        };
        let raw = unsafe { alloc(layout) };
        if raw.is_null() {
            return raw;
        }
        let header_ptr = raw as *mut SlotHeader;
        unsafe {
            header_ptr.write(SlotHeader::new_oversize(total_size, align));
            raw.add(HEADER_SIZE)
        }
    }

    /// Deallocate a pointer returned by `gmem_allocate`. Returns false iff
    /// `ptr` is null; a corrupt or unrecognized header is handled per the
    /// error-handling design (recovery scan, then a logged best-effort
    /// system free).
    pub fn gmem_deallocate(&self, ptr: *mut u8) -> bool {
        if ptr.is_null() {
            return false;
        }
        let header_ptr = unsafe { ptr.sub(HEADER_SIZE) } as *const SlotHeader;
        let header = unsafe { &*header_ptr };

        if header.checksum == checksum_for(header.owner) {
            if header.owner == 0 {
                return self.free_oversize(ptr, header.meta, header.meta2);
            }
            let owner_ptr = header.owner as *const ChunkHeader;
            if let Some(list) = self.classes.iter().find(|l| l.contains_chunk(owner_ptr)) {
                return matches!(
                    ChunkList::recycle_via_owner(owner_ptr, ptr, self.non_reuse_slot, list.stats()),
                    RecycleOutcome::Recycled | RecycleOutcome::DoubleFree
                );
            }
        }

        logging::log(
            Severity::Error,
            format!(
                "{}: slot header at {ptr:p} failed checksum validation",
                ErrorKind::CorruptHeader.as_str()
            ),
        );
        for list in &self.classes {
            match list.try_recover(ptr, self.non_reuse_slot) {
                RecycleOutcome::Recycled | RecycleOutcome::DoubleFree => return true,
                RecycleOutcome::NotOwned => continue,
            }
        }
        logging::log(
            Severity::Warn,
            format!(
                "{}: falling back to system free for unrecognized pointer {ptr:p}",
                ErrorKind::UnknownAddress.as_str()
            ),
        );
        false
    }

    fn free_oversize(&self, ptr: *mut u8, total_size: usize, align: usize) -> bool {
        let header_ptr = unsafe { ptr.sub(HEADER_SIZE) };
        let layout = match Layout::from_size_align(total_size, align) {
            Ok(l) => l,
            Err(_) => return false,
        };
        unsafe {
            dealloc(header_ptr, layout);
        }
        true
    }

    /// Drive every size class's chunk lists toward freeing RESERVED_DELETION
    /// chunks. Non-reentrant: a call already in progress is skipped.
    pub fn gmem_prune(&self) {
        if self
            .prune_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        for list in &self.classes {
            list.prune();
        }
        self.prune_in_progress.store(false, Ordering::Release);
    }

    pub fn gmem_get_statistics(&self) -> Vec<ChunkStatistics> {
        self.classes.iter().map(|l| l.get_statistics()).collect()
    }
}

static DEFAULT: OnceCell<GeneralAllocator> = OnceCell::new();

/// The crate-wide default allocator, built from a reasonable small/medium/
/// large size-class table on first use. Applications that need a custom
/// table should construct their own `GeneralAllocator` instead.
pub fn default_allocator() -> &'static GeneralAllocator {
    DEFAULT.get_or_init(|| {
        GeneralAllocator::new(
            vec![
                SizeClass::new(64, 64),
                SizeClass::new(256, 64),
                SizeClass::new(1024, 32),
                SizeClass::new(4096, 16),
            ],
            Flags::default(),
        )
        .expect("built-in default size-class table is valid")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_alloc() -> GeneralAllocator {
        GeneralAllocator::new(
            vec![SizeClass::new(16, 4), SizeClass::new(64, 4), SizeClass::new(256, 4)],
            Flags::default(),
        )
        .unwrap()
    }

    #[test]
    fn size_class_selection_lands_in_expected_class() {
        let alloc = small_alloc();
        let p = alloc.gmem_allocate(30, 8);
        assert!(!p.is_null());
        assert!(alloc.gmem_deallocate(p));
    }

    #[test]
    fn double_free_detected() {
        let alloc = small_alloc();
        let p = alloc.gmem_allocate(8, 8);
        assert!(alloc.gmem_deallocate(p));
        assert!(alloc.gmem_deallocate(p));
    }

    #[test]
    fn oversize_allocation_roundtrips() {
        let alloc = small_alloc();
        let p = alloc.gmem_allocate(10_000, 64);
        assert!(!p.is_null());
        assert_eq!((p as usize) % 64, 0);
        assert!(alloc.gmem_deallocate(p));
    }

    #[test]
    fn null_deallocate_returns_false() {
        let alloc = small_alloc();
        assert!(!alloc.gmem_deallocate(std::ptr::null_mut()));
    }

    #[test]
    fn prune_is_harmless_on_idle_allocator() {
        let alloc = small_alloc();
        alloc.gmem_prune();
        let stats = alloc.gmem_get_statistics();
        assert_eq!(stats.len(), 3);
    }
}
