// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 lf-concurrent contributors
//
// Harris/Michael lock-free ordered singly-linked list over
// `node::MarkableHazardLink`: logical delete mark + physical unlink, with
// every traverser helping unlink any marked node it encounters. `insert`
// is the positioned primitive from `lf_list.hpp::insert(cont_arg, pred)`
// (find the (prev, curr) pair `pred` selects, then link the new node
// between them) specialised to the predicate "no position matches", which
// walks to the end of the list -- so repeated inserts land in traversal
// (insertion) order, matching the end-to-end scenario's expectation.

use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::hazard::{self, HazardPointer};
use crate::node::{MarkableHazardLink, NodePool};

type NodePtr<T> = *mut MarkableHazardLink<T>;

pub struct OrderedList<T> {
    head: NodePtr<T>,
    approx_len: AtomicUsize,
}

unsafe impl<T: Send> Send for OrderedList<T> {}
unsafe impl<T: Send> Sync for OrderedList<T> {}

/// A validated (prev, curr) pair from a completed search, keeping hazard
/// pointers alive for as long as the caller needs to dereference them.
struct Cursor<T> {
    prev: NodePtr<T>,
    curr: NodePtr<T>,
    _hp_prev: Option<HazardPointer>,
    _hp_curr: Option<HazardPointer>,
}

impl<T> OrderedList<T> {
    pub fn new() -> Self {
        Self {
            head: MarkableHazardLink::new_sentinel(),
            approx_len: AtomicUsize::new(0),
        }
    }

    /// Traverse from head, physically unlinking every logically-deleted
    /// node encountered, and stop at the first unmarked node for which
    /// `pred` returns true (or at the end, `curr == null`).
    fn search(&self, pred: &dyn Fn(&T) -> bool) -> Cursor<T> {
        'restart: loop {
            let mut prev = self.head;
            let mut hp_prev: Option<HazardPointer> = None;
            let (mut curr, _) = unsafe { (*prev).next.load(Ordering::Acquire) };

            loop {
                if curr.is_null() {
                    return Cursor {
                        prev,
                        curr: ptr::null_mut(),
                        _hp_prev: hp_prev,
                        _hp_curr: None,
                    };
                }

                let hp_curr = hazard::acquire_addr(curr as usize);
                // Re-verify prev->next still points at curr under hazard
                // protection before trusting a read out of it.
                let (confirm, _) = unsafe { (*prev).next.load(Ordering::Acquire) };
                if confirm != curr {
                    continue 'restart;
                }

                let (next, next_mark) = unsafe { (*curr).next.load(Ordering::Acquire) };
                if next_mark {
                    // curr is logically deleted: try to physically unlink it.
                    match unsafe {
                        (*prev)
                            .next
                            .compare_exchange((curr, false), (next, false))
                    } {
                        Ok(()) => {
                            NodePool::recycle(curr);
                            curr = next;
                            continue;
                        }
                        Err(_) => continue 'restart,
                    }
                }

                let matches = unsafe { (*curr).carrier.peek().map(pred).unwrap_or(false) };
                if matches {
                    return Cursor {
                        prev,
                        curr,
                        _hp_prev: hp_prev,
                        _hp_curr: Some(hp_curr),
                    };
                }

                prev = curr;
                hp_prev = Some(hp_curr);
                curr = next;
            }
        }
    }

    /// Link `new_node` between `prev` and `curr`, the pair a search just
    /// produced. Returns false if `prev` no longer points at `curr`
    /// (another thread won a race for the same position); the caller must
    /// re-search and retry.
    fn insert_to_next_of_prev(&self, new_node: NodePtr<T>, prev: NodePtr<T>, curr: NodePtr<T>) -> bool {
        unsafe {
            (*new_node).next.store(curr, false, Ordering::Relaxed);
        }
        unsafe {
            (*prev)
                .next
                .compare_exchange((curr, false), (new_node, false))
        }
        .is_ok()
    }

    /// Insert `value`. Positioned via `search` with a predicate that never
    /// matches, which walks to the end of the list: repeated calls append,
    /// so traversal order equals insertion order.
    pub fn insert(&self, value: T) {
        let new_node = MarkableHazardLink::new_with_value(value);
        loop {
            let cursor = self.search(&|_: &T| false);
            if self.insert_to_next_of_prev(new_node, cursor.prev, cursor.curr) {
                self.approx_len.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
    }

    /// Return true iff some unmarked node satisfies `pred`.
    pub fn find_if(&self, pred: impl Fn(&T) -> bool) -> bool {
        !self.search(&pred).curr.is_null()
    }

    /// Logically delete the first unmarked node satisfying `pred`, helping
    /// its physical unlink. Returns true iff a node was removed.
    pub fn remove_if(&self, pred: impl Fn(&T) -> bool) -> bool {
        loop {
            let cursor = self.search(&pred);
            if cursor.curr.is_null() {
                return false;
            }
            let (next, _) = unsafe { (*cursor.curr).next.load(Ordering::Acquire) };
            if unsafe { (*cursor.curr).next.try_set_mark(next) } {
                // Best-effort physical unlink; if it fails, a later
                // traverser (including this list's own search) will do it.
                if unsafe {
                    (*cursor.prev)
                        .next
                        .compare_exchange((cursor.curr, false), (next, false))
                }
                .is_ok()
                {
                    NodePool::recycle(cursor.curr);
                }
                self.approx_len.fetch_sub(1, Ordering::Relaxed);
                return true;
            }
            // Someone else marked it first between our search and our mark
            // attempt; re-search and try again.
        }
    }

    /// Visit every unmarked node's value in list order. `f` must not
    /// assume exclusion from concurrent inserts/removes.
    pub fn for_each(&self, mut f: impl FnMut(&T)) {
        let mut prev = self.head;
        let mut _hp_prev: Option<HazardPointer> = None;
        let (mut curr, _) = unsafe { (*prev).next.load(Ordering::Acquire) };
        while !curr.is_null() {
            let hp_curr = hazard::acquire_addr(curr as usize);
            let (confirm, _) = unsafe { (*prev).next.load(Ordering::Acquire) };
            if confirm != curr {
                // Structure changed under us; restart from head for a
                // best-effort consistent-ish traversal.
                prev = self.head;
                _hp_prev = None;
                let (c, _) = unsafe { (*prev).next.load(Ordering::Acquire) };
                curr = c;
                continue;
            }
            let (next, mark) = unsafe { (*curr).next.load(Ordering::Acquire) };
            if !mark {
                if let Some(value) = unsafe { (*curr).carrier.peek() } {
                    f(value);
                }
                prev = curr;
                _hp_prev = Some(hp_curr);
            }
            curr = next;
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.find_if(|_| true)
    }

    /// Approximate size: traverses unmarked nodes, per the spec.
    pub fn size(&self) -> usize {
        let mut n = 0usize;
        self.for_each(|_| n += 1);
        n
    }
}

impl<T> Default for OrderedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for OrderedList<T> {
    fn drop(&mut self) {
        let mut remaining = 0u32;
        let (mut curr, _) = unsafe { (*self.head).next.load(Ordering::Acquire) };
        while !curr.is_null() {
            let (next, _) = unsafe { (*curr).next.load(Ordering::Acquire) };
            unsafe {
                drop(Box::from_raw(curr));
            }
            remaining += 1;
            curr = next;
        }
        if remaining > 0 {
            crate::logging::log(
                crate::logging::Severity::Warn,
                format!("DestructorRemainingNodes: list dropped with {remaining} node(s) still held"),
            );
        }
        unsafe {
            drop(Box::from_raw(self.head));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_find_remove_cycle() {
        let list: OrderedList<i32> = OrderedList::new();
        list.insert(1);
        list.insert(3);
        assert!(!list.find_if(|v| v % 2 == 0));

        list.insert(2);
        let mut seen = Vec::new();
        list.for_each(|v| seen.push(*v));
        assert_eq!(seen, vec![1, 3, 2]);

        assert!(list.remove_if(|v| *v == 3));
        let mut seen2 = Vec::new();
        list.for_each(|v| seen2.push(*v));
        assert_eq!(seen2, vec![1, 2]);

        assert!(list.find_if(|v| *v == 1));
        assert!(list.remove_if(|v| *v == 1));
        assert!(!list.find_if(|v| *v == 1));
    }

    #[test]
    fn remove_on_empty_list_returns_false() {
        let list: OrderedList<i32> = OrderedList::new();
        assert!(!list.remove_if(|v| *v == 42));
        assert!(list.is_empty());
    }

    #[test]
    fn concurrent_insert_and_remove() {
        use std::sync::Arc;
        use std::thread;

        let list = Arc::new(OrderedList::<u64>::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let list = list.clone();
                thread::spawn(move || {
                    for i in 0..200u64 {
                        list.insert(t * 1000 + i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(list.size(), 8 * 200);
        for t in 0..8u64 {
            assert!(list.remove_if(move |v| *v == t * 1000));
        }
        assert_eq!(list.size(), 8 * 200 - 8);
    }
}
