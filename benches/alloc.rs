// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 lf-concurrent contributors
//
// Allocator benchmarks.
//
// Groups:
//   alloc_dealloc_single_thread — allocate+free round trip per size class,
//                                 against a global-allocator baseline
//   alloc_dealloc_contended     — the same round trip from 8 threads sharing
//                                 one allocator, to surface chunk-list/index
//                                 contention that a single-threaded run can't

use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use lf_concurrent::config::{Flags, SizeClass};
use lf_concurrent::GeneralAllocator;

const SIZES: &[(&str, usize)] = &[("small_48", 48), ("medium_256", 256), ("large_4096", 4096)];

fn make_allocator() -> GeneralAllocator {
    GeneralAllocator::new(
        vec![
            SizeClass::new(64, 256),
            SizeClass::new(256, 128),
            SizeClass::new(4096, 32),
        ],
        Flags::default(),
    )
    .expect("benchmark size-class table is valid")
}

fn bench_global_alloc(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_global");
    for &(label, size) in SIZES {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), &size, |b, &sz| {
            b.iter(|| {
                let v: Vec<u8> = vec![0xABu8; sz];
                black_box(v)
            });
        });
    }
    group.finish();
}

fn bench_alloc_dealloc_single_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_dealloc_single_thread");
    let alloc = make_allocator();

    for &(label, size) in SIZES {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), &size, |b, &sz| {
            b.iter(|| {
                let p = alloc.gmem_allocate(sz, 8);
                black_box(p);
                alloc.gmem_deallocate(p);
            });
        });
    }
    group.finish();
}

fn bench_alloc_dealloc_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_dealloc_contended");
    group.throughput(Throughput::Bytes(64));
    let alloc = Arc::new(make_allocator());

    group.bench_function("threads_8", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let alloc = alloc.clone();
                    thread::spawn(move || {
                        for _ in 0..64 {
                            let p = alloc.gmem_allocate(64, 8);
                            alloc.gmem_deallocate(p);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_global_alloc,
    bench_alloc_dealloc_single_thread,
    bench_alloc_dealloc_contended,
);
criterion_main!(benches);
