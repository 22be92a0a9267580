// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 lf-concurrent contributors
//
// Size-class table and runtime flags consumed by the slab allocator.

use crate::error::ConfigError;

/// One allocator size class: `slot_bytes` is the usable payload size (the
/// slot header is added on top); `initial_slots_per_chunk` seeds the first
/// chunk allocated for this class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeClass {
    pub slot_bytes: usize,
    pub initial_slots_per_chunk: usize,
}

impl SizeClass {
    pub const fn new(slot_bytes: usize, initial_slots_per_chunk: usize) -> Self {
        Self {
            slot_bytes,
            initial_slots_per_chunk,
        }
    }
}

/// Runtime configuration flags, mirroring the build-time flag table of the
/// external-interfaces section: `record_backtrace`,
/// `record_backtrace_double_free`, `non_reuse_slot`, `node_pool_profile`.
/// `detail_stats` is a Cargo feature rather than a runtime flag (the extra
/// counters it gates are either compiled in or not).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    pub record_backtrace: bool,
    pub record_backtrace_double_free: bool,
    pub non_reuse_slot: bool,
    pub node_pool_profile: bool,
}

/// Allocator configuration: an ascending size-class table plus runtime flags.
#[derive(Debug, Clone)]
pub struct Config {
    pub size_classes: Vec<SizeClass>,
    pub flags: Flags,
}

impl Config {
    pub fn new(size_classes: Vec<SizeClass>, flags: Flags) -> Result<Self, ConfigError> {
        if size_classes.is_empty() {
            return Err(ConfigError::EmptySizeClassTable);
        }
        for (index, class) in size_classes.iter().enumerate() {
            if class.slot_bytes == 0 {
                return Err(ConfigError::ZeroSlotBytes { index });
            }
            if class.initial_slots_per_chunk == 0 {
                return Err(ConfigError::ZeroSlotsPerChunk { index });
            }
            if index > 0 && size_classes[index - 1].slot_bytes >= class.slot_bytes {
                return Err(ConfigError::UnsortedSizeClasses);
            }
        }
        Ok(Self {
            size_classes,
            flags,
        })
    }
}
