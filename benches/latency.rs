//! Benchmark harness using Criterion for latency measurement.
//!
//! Measures:
//! - Place order (no match), on both storage backends
//! - Place order (full match) against queues of varying depth
//! - Cancel of a queue head
//! - Sweeping aggressor crossing many levels
//! - Expiry sweep
//! - Poisson order flow

use arena_lob::{Flat, FlowConfig, GoodTill, Heap, NullSink, OrderBook, OrderFlow, Storage};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

const CAPACITY: u32 = 100_000;

fn book_in<S: Storage>() -> OrderBook<S, NullSink> {
    let mut book = OrderBook::builder()
        .capacity(CAPACITY)
        .range(0, 20_000)
        .sink(NullSink)
        .build_in::<S>()
        .expect("valid bench config");
    book.warm_up();
    book
}

/// Benchmark: Place order that rests (no matching)
fn bench_place_no_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("place_no_match");

    fn run<S: Storage>(b: &mut criterion::Bencher<'_>) {
        let mut book = book_in::<S>();
        let mut cookie = 0u64;
        b.iter(|| {
            cookie += 1;
            if book.size() + 1 >= CAPACITY {
                book.clear_level(9_000);
            }
            black_box(book.place_gtc(100, 9_000, cookie))
        })
    }

    group.bench_function("heap", run::<Heap>);
    group.bench_function("flat", run::<Flat>);
    group.finish();
}

/// Benchmark: Place order that fully matches
fn bench_place_full_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("place_full_match");

    for depth in [1u64, 10, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            let mut book = book_in::<Heap>();

            // Pre-populate with resting orders
            for i in 0..depth {
                book.place_gtc(-100, 10_000, i).unwrap();
            }

            let mut cookie = 1_000u64;
            b.iter(|| {
                cookie += 1;
                let result = book.place_gtc(100, 10_000, cookie);

                // Replenish the matched order
                book.place_gtc(-100, 10_000, cookie + 1_000_000).unwrap();

                black_box(result)
            })
        });
    }

    group.finish();
}

/// Benchmark: Cancel the head of the best bid
fn bench_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("cancel_head");

    for book_size in [100u64, 1_000, 10_000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(book_size),
            book_size,
            |b, &book_size| {
                let mut book = book_in::<Heap>();

                // Pre-populate book: bids below 10000, asks above
                for i in 0..book_size {
                    let offset = 1 + (i % 100) as i64;
                    if i % 2 == 0 {
                        book.place_gtc(100, 10_000 - offset, i).unwrap();
                    } else {
                        book.place_gtc(-100, 10_000 + offset, i).unwrap();
                    }
                }

                let mut cookie = book_size;
                b.iter(|| {
                    let price = book.bid();
                    let id = book.head(price);
                    let result = book.cancel(id, 0);

                    // Replenish at the same price
                    cookie += 1;
                    book.place_gtc(100, price, cookie).unwrap();

                    black_box(result)
                })
            },
        );
    }

    group.finish();
}

/// Benchmark: Aggressor sweeping many sparse levels
fn bench_sweep(c: &mut Criterion) {
    c.bench_function("sweep_100_levels", |b| {
        let mut book = book_in::<Heap>();
        let mut cookie = 0u64;
        b.iter(|| {
            for offset in 0..100 {
                cookie += 1;
                book.place_gtc(-10, 10_000 + offset * 5, cookie).unwrap();
            }
            cookie += 1;
            black_box(book.place(1_000, 10_500, cookie, GoodTill::ImmediateOrCancel))
        })
    });
}

/// Benchmark: Expiry sweep over a populated range
fn bench_expire(c: &mut Criterion) {
    c.bench_function("expire_1000_orders", |b| {
        let mut book = book_in::<Heap>();
        let mut rng = ChaCha8Rng::seed_from_u64(0xDEADBEEF);
        let mut now = 0i64;
        b.iter(|| {
            for i in 0..1_000u64 {
                let price = rng.gen_range(9_000..10_000);
                book.place(10, price, i, GoodTill::Until(now + 1)).unwrap();
            }
            now += 2;
            black_box(book.expire(now))
        })
    });
}

/// Benchmark: Throughput under Poisson order flow
fn bench_flow(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput");
    group.throughput(criterion::Throughput::Elements(1_000));

    group.bench_function("1000_flow_steps", |b| {
        let mut book = OrderBook::builder()
            .capacity(CAPACITY)
            .sink(NullSink)
            .build()
            .expect("valid bench config");
        book.warm_up();
        let mut flow = OrderFlow::new(FlowConfig {
            expire_every: 1_000,
            seed: 0xCAFEBABE,
            ..FlowConfig::default()
        });

        b.iter(|| black_box(flow.drive(&mut book, 1_000)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_place_no_match,
    bench_place_full_match,
    bench_cancel,
    bench_sweep,
    bench_expire,
    bench_flow,
);

criterion_main!(benches);
