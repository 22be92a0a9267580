// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 lf-concurrent contributors

use std::sync::Arc;
use std::thread;

use lf_concurrent::Stack;

// Scenario 2: single thread LIFO order.
#[test]
fn lifo_order() {
    let s = Stack::new();
    s.push_front(1);
    s.push_front(2);
    s.push_front(3);
    assert_eq!(s.pop_front(), Some(3));
    assert_eq!(s.pop_front(), Some(2));
    assert_eq!(s.pop_front(), Some(1));
}

#[test]
fn pop_on_empty_stack_returns_none() {
    let s = Stack::<u32>::new();
    assert_eq!(s.pop_front(), None);
}

#[test]
fn push_then_pop_round_trip() {
    let s = Stack::new();
    s.push_front("hello");
    assert_eq!(s.pop_front(), Some("hello"));
    assert_eq!(s.pop_front(), None);
}

#[test]
fn concurrent_push_pop_settles_to_seed_count() {
    const THREADS: usize = 16;
    const ITERS: usize = 2_000;
    const SEED: usize = 16;

    let s = Arc::new(Stack::<u64>::new());
    for i in 0..SEED {
        s.push_front(i as u64);
    }
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let s = s.clone();
            thread::spawn(move || {
                for _ in 0..ITERS {
                    s.push_front(1);
                    assert!(s.pop_front().is_some());
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let mut count = 0;
    while s.pop_front().is_some() {
        count += 1;
    }
    assert_eq!(count, SEED);
}
