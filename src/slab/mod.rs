// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 lf-concurrent contributors
//
// Semi-lock-free multi-size-class slab allocator. Grounded on
// `lf_mem_alloc_internal.hpp` (the index-manager-based design, the
// canonical one per the original's two competing implementations -- see
// DESIGN.md's Open Question 1 resolution) and `lf_mem_alloc.cpp`/
// `lf_mem_alloc_gmem.cpp` for the general-allocator facade.

pub mod allocator;
pub mod chunk;
pub mod chunk_list;
pub mod index;

pub use allocator::GeneralAllocator;
