// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 lf-concurrent contributors
//
// CAS-based lock-free LIFO over `node::HazardLink`. Grounded on
// `od_lockfree_stack.hpp`: push_front links the new node ahead of the
// current head via CAS; pop_front protects the head with a hazard slot
// before swinging it, and the returned node's `next` is left untouched
// (not nulled) until the node is safely retired, per the source's warning
// about mutating a possibly-still-hazarded node.

use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crate::hazard;
use crate::node::{protect_ptr as protect, HazardLink, NodePool};

pub struct Stack<T> {
    head: AtomicPtr<HazardLink<T>>,
    approx_len: AtomicUsize,
}

unsafe impl<T: Send> Send for Stack<T> {}
unsafe impl<T: Send> Sync for Stack<T> {}

impl<T> Stack<T> {
    pub fn new() -> Self {
        Self {
            head: AtomicPtr::new(std::ptr::null_mut()),
            approx_len: AtomicUsize::new(0),
        }
    }

    pub fn push_front(&self, value: T) {
        let new_node = HazardLink::new_with_value(value);
        loop {
            let cur_head = self.head.load(Ordering::Acquire);
            unsafe {
                (*new_node).next.store(cur_head, Ordering::Relaxed);
            }
            if self
                .head
                .compare_exchange(cur_head, new_node, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.approx_len.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
    }

    pub fn pop_front(&self) -> Option<T> {
        let hp = hazard::acquire();
        loop {
            let head_ptr = protect(&self.head, &hp);
            if head_ptr.is_null() {
                return None;
            }
            let next = unsafe { (*head_ptr).next.load(Ordering::Acquire) };
            if self
                .head
                .compare_exchange(head_ptr, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let value = unsafe { (*head_ptr).carrier.take() };
                self.approx_len.fetch_sub(1, Ordering::Relaxed);
                NodePool::recycle(head_ptr);
                return value;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }

    pub fn count_size(&self) -> usize {
        self.approx_len.load(Ordering::Relaxed)
    }
}

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Stack<T> {
    fn drop(&mut self) {
        let mut remaining = 0u32;
        while self.pop_front().is_some() {
            remaining += 1;
        }
        if remaining > 0 {
            crate::logging::log(
                crate::logging::Severity::Warn,
                format!("DestructorRemainingNodes: stack dropped with {remaining} node(s) still held"),
            );
        }
    }
}
