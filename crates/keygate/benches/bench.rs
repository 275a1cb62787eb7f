use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use keygate::{IdAllocator, IdGenStatus, SnowflakeId, TimeSource, TokenCodec, hash_password};
use std::{sync::Arc, thread::scope, time::Instant};

struct FixedMockTime {
    millis: u64,
}

impl TimeSource for FixedMockTime {
    fn current_millis(&self) -> u64 {
        self.millis
    }
}

// Number of IDs allocated per benchmark iteration (per-thread for
// multi-threaded).
const TOTAL_IDS: usize = 4096;

/// Hot path: one millisecond's worth of sequence, always `Ready`.
fn bench_try_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocator/mock");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                let allocator =
                    IdAllocator::with_clock(1, FixedMockTime { millis: 1 }).unwrap();
                for _ in 0..TOTAL_IDS {
                    match allocator.try_allocate() {
                        IdGenStatus::Ready { id } => {
                            black_box(id);
                        }
                        IdGenStatus::Pending { .. } => unreachable!(),
                    }
                }
            }
            start.elapsed()
        });
    });

    group.finish();
}

/// Wall clock, including stalls once a millisecond's sequence is spent.
fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocator/system_clock");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    let allocator = IdAllocator::new(1).unwrap();
    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter(|| {
            for _ in 0..TOTAL_IDS {
                black_box(allocator.allocate());
            }
        });
    });

    group.finish();
}

fn bench_allocate_threaded(c: &mut Criterion) {
    const THREADS: usize = 8;

    let mut group = c.benchmark_group("allocator/threaded");
    group.throughput(Throughput::Elements((TOTAL_IDS * THREADS) as u64));

    let allocator = Arc::new(IdAllocator::new(1).unwrap());
    group.bench_function(format!("threads/{THREADS}"), |b| {
        b.iter(|| {
            scope(|s| {
                for _ in 0..THREADS {
                    let allocator = Arc::clone(&allocator);
                    s.spawn(move || {
                        for _ in 0..TOTAL_IDS {
                            black_box(allocator.allocate());
                        }
                    });
                }
            });
        });
    });

    group.finish();
}

fn bench_credentials(c: &mut Criterion) {
    let mut group = c.benchmark_group("credentials");
    let codec = TokenCodec::new(b"bench-secret");
    let token = codec.issue("alice").unwrap();

    group.bench_function("hash_password", |b| b.iter(|| hash_password(black_box("pw"))));
    group.bench_function("issue", |b| b.iter(|| codec.issue(black_box("alice"))));
    group.bench_function("validate", |b| b.iter(|| codec.validate(black_box(&token))));
    group.bench_function("render_id", |b| {
        let id = SnowflakeId::from_components(1 << 40, 1, 7);
        b.iter(|| black_box(id).to_string());
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_try_allocate,
    bench_allocate,
    bench_allocate_threaded,
    bench_credentials
);
criterion_main!(benches);
