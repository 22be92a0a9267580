// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 lf-concurrent contributors
//
// Hazard-pointer registry: per-thread slot groups chained into one global,
// never-shrinking list. A thread claims whole groups (never single slots)
// from the chain, round-robins its own slots within them, and returns them
// to the shared pool on thread exit. `is_hazard` scans every group in the
// chain unconditionally -- unowned groups are always fully zeroed, so
// scanning them is correct, just occasionally wasted work.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

/// Minimum slots per group, per the spec's "fixed small number (>=8)".
pub const SLOTS_PER_GROUP: usize = 8;

struct HazardGroup {
    next: AtomicPtr<HazardGroup>,
    owned: AtomicBool,
    slots: [CachePadded<AtomicUsize>; SLOTS_PER_GROUP],
}

impl HazardGroup {
    fn new() -> Self {
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
            owned: AtomicBool::new(true),
            slots: std::array::from_fn(|_| CachePadded::new(AtomicUsize::new(0))),
        }
    }
}

static HEAD: AtomicPtr<HazardGroup> = AtomicPtr::new(ptr::null_mut());

/// Push a brand-new, already-owned group onto the front of the chain.
fn push_new_group() -> &'static HazardGroup {
    let boxed = Box::new(HazardGroup::new());
    let raw: &'static mut HazardGroup = Box::leak(boxed);
    loop {
        let cur_head = HEAD.load(Ordering::Acquire);
        raw.next.store(cur_head, Ordering::Relaxed);
        if HEAD
            .compare_exchange_weak(cur_head, raw, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return raw;
        }
    }
}

/// Scan the chain for a group whose ownership we can claim; append a new
/// one if none is free.
fn claim_group() -> &'static HazardGroup {
    let mut cur = HEAD.load(Ordering::Acquire);
    while !cur.is_null() {
        // Safety: groups are never freed once linked into the chain.
        let group = unsafe { &*cur };
        if group
            .owned
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return group;
        }
        cur = group.next.load(Ordering::Acquire);
    }
    push_new_group()
}

/// An owned hazard-pointer slot. Dropping it clears the slot and returns it
/// to the owning thread's free list for reuse.
pub struct HazardPointer {
    group: &'static HazardGroup,
    slot: u8,
    _not_send: PhantomData<*const ()>,
}

impl HazardPointer {
    /// Publish `addr` into this slot with release ordering.
    pub fn protect_addr(&self, addr: usize) {
        self.group.slots[self.slot as usize].store(addr, Ordering::Release);
    }

    /// Clear the slot, making the address it held reclaimable once no other
    /// slot protects it.
    pub fn clear(&self) {
        self.group.slots[self.slot as usize].store(0, Ordering::Release);
    }
}

impl Drop for HazardPointer {
    fn drop(&mut self) {
        self.clear();
        CONTEXT.with(|ctx| {
            ctx.borrow_mut().free.push((self.group, self.slot));
        });
    }
}

struct ThreadContext {
    groups: Vec<&'static HazardGroup>,
    free: Vec<(&'static HazardGroup, u8)>,
}

impl ThreadContext {
    fn new() -> Self {
        Self {
            groups: Vec::new(),
            free: Vec::new(),
        }
    }

    fn acquire(&mut self) -> (&'static HazardGroup, u8) {
        if let Some(slot) = self.free.pop() {
            return slot;
        }
        let group = claim_group();
        self.groups.push(group);
        for idx in 1..SLOTS_PER_GROUP as u8 {
            self.free.push((group, idx));
        }
        (group, 0)
    }
}

impl Drop for ThreadContext {
    fn drop(&mut self) {
        for group in &self.groups {
            for slot in group.slots.iter() {
                slot.store(0, Ordering::Release);
            }
            group.owned.store(false, Ordering::Release);
        }
    }
}

thread_local! {
    static CONTEXT: RefCell<ThreadContext> = RefCell::new(ThreadContext::new());
}

/// Obtain an owned hazard slot. Guaranteed to succeed: if the thread's
/// current groups are exhausted, a new group is appended to the chain.
pub fn acquire() -> HazardPointer {
    let (group, slot) = CONTEXT.with(|ctx| ctx.borrow_mut().acquire());
    HazardPointer {
        group,
        slot,
        _not_send: PhantomData,
    }
}

/// Obtain an owned hazard slot already publishing `addr`.
pub fn acquire_addr(addr: usize) -> HazardPointer {
    let hp = acquire();
    hp.protect_addr(addr);
    hp
}

/// Scan every group in the chain for `addr`. Returns true iff some slot,
/// owned or not, currently holds it.
pub fn is_hazard(addr: usize) -> bool {
    if addr == 0 {
        return false;
    }
    let mut cur = HEAD.load(Ordering::Acquire);
    while !cur.is_null() {
        let group = unsafe { &*cur };
        for slot in group.slots.iter() {
            if slot.load(Ordering::Acquire) == addr {
                return true;
            }
        }
        cur = group.next.load(Ordering::Acquire);
    }
    false
}

/// Test-only hook: release ownership of every group and zero every slot.
/// Callers must ensure no hazard pointers are live and the prune daemon is
/// stopped before calling this.
pub fn destroy_all() {
    let mut cur = HEAD.load(Ordering::Acquire);
    while !cur.is_null() {
        let group = unsafe { &*cur };
        for slot in group.slots.iter() {
            slot.store(0, Ordering::Release);
        }
        group.owned.store(false, Ordering::Release);
        cur = group.next.load(Ordering::Acquire);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn acquire_protects_and_clear_unprotects() {
        let hp = acquire_addr(0x1000);
        assert!(is_hazard(0x1000));
        hp.clear();
        assert!(!is_hazard(0x1000));
    }

    #[test]
    fn drop_releases_slot_for_reuse() {
        {
            let _hp = acquire_addr(0x2000);
            assert!(is_hazard(0x2000));
        }
        assert!(!is_hazard(0x2000));
    }

    #[test]
    fn many_threads_each_get_progress() {
        let barrier = std::sync::Arc::new(Barrier::new(16));
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let addr = 0x5000 + i;
                    let hp = acquire_addr(addr);
                    assert!(is_hazard(addr));
                    drop(hp);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn more_than_one_group_worth_of_slots_on_one_thread() {
        let mut held = Vec::new();
        for i in 0..(SLOTS_PER_GROUP * 3) {
            held.push(acquire_addr(0x9000 + i));
        }
        for i in 0..(SLOTS_PER_GROUP * 3) {
            assert!(is_hazard(0x9000 + i));
        }
        drop(held);
    }
}
