// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 lf-concurrent contributors
//
// Container benchmarks.
//
// Groups:
//   fifo_push_pop / stack_push_pop — single-thread round trip
//   fifo_contended / stack_contended — N producer threads racing one
//                                      consumer thread, to exercise the
//                                      markable-pointer CAS paths under load
//   list_insert_find_remove — single-thread round trip through the ordered
//                             list's predicate-based API

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use lf_concurrent::{Fifo, OrderedList, Stack};

fn bench_fifo_push_pop(c: &mut Criterion) {
    let fifo: Fifo<u64> = Fifo::new();
    c.bench_function("fifo_push_pop", |b| {
        b.iter(|| {
            fifo.push_back(1);
            black_box(fifo.pop_front());
        });
    });
}

fn bench_stack_push_pop(c: &mut Criterion) {
    let stack: Stack<u64> = Stack::new();
    c.bench_function("stack_push_pop", |b| {
        b.iter(|| {
            stack.push_front(1);
            black_box(stack.pop_front());
        });
    });
}

fn bench_list_insert_find_remove(c: &mut Criterion) {
    let list: OrderedList<u64> = OrderedList::new();
    c.bench_function("list_insert_find_remove", |b| {
        b.iter(|| {
            list.insert(7);
            black_box(list.find_if(|v| *v == 7));
            list.remove_if(|v| *v == 7);
        });
    });
}

const PRODUCERS: usize = 4;
const PER_PRODUCER: usize = 256;

fn bench_fifo_contended(c: &mut Criterion) {
    c.bench_function("fifo_contended", |b| {
        b.iter(|| {
            let fifo = Arc::new(Fifo::<u64>::new());
            let barrier = Arc::new(Barrier::new(PRODUCERS));
            let handles: Vec<_> = (0..PRODUCERS)
                .map(|_| {
                    let fifo = fifo.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        for i in 0..PER_PRODUCER {
                            fifo.push_back(i as u64);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            let drained = AtomicUsize::new(0);
            while fifo.pop_front().is_some() {
                drained.fetch_add(1, Ordering::Relaxed);
            }
            black_box(drained.load(Ordering::Relaxed));
        });
    });
}

fn bench_stack_contended(c: &mut Criterion) {
    c.bench_function("stack_contended", |b| {
        b.iter(|| {
            let stack = Arc::new(Stack::<u64>::new());
            let barrier = Arc::new(Barrier::new(PRODUCERS));
            let handles: Vec<_> = (0..PRODUCERS)
                .map(|_| {
                    let stack = stack.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        for i in 0..PER_PRODUCER {
                            stack.push_front(i as u64);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            while stack.pop_front().is_some() {}
        });
    });
}

criterion_group!(
    benches,
    bench_fifo_push_pop,
    bench_stack_push_pop,
    bench_list_insert_find_remove,
    bench_fifo_contended,
    bench_stack_contended,
);
criterion_main!(benches);
