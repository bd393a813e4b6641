//! Step-function lookup benches.
//!
//! Compares the cached ascending walk a merge performs against scattered
//! lookups that force a tree search every time.
//!
//! Run:
//!   cargo bench --bench step_lookup_bench

#![forbid(unsafe_code)]

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rle_step::{Composite, Pos, compose, identity, scale_fn, stride_fn};

const LOOKUPS: Pos = 1_000_000;

fn bench_step_lookups(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_lookup_1M");
    group.sample_size(20);

    let strided = stride_fn(3).unwrap();
    group.bench_function("strided_ascending", |b| {
        b.iter(|| {
            let mut cursor = strided.cursor();
            let mut acc = 0;
            for pos in 0..LOOKUPS {
                acc += cursor.at(pos);
            }
            black_box(acc)
        })
    });

    let mut rng = StdRng::seed_from_u64(1);
    let scattered: Vec<Pos> = (0..LOOKUPS)
        .map(|_| rng.random_range(0..rle_step::MAX_SPAN))
        .collect();
    group.bench_function("strided_scattered", |b| {
        b.iter(|| {
            let mut cursor = strided.cursor();
            let mut acc = 0;
            for &pos in &scattered {
                acc += cursor.at(pos);
            }
            black_box(acc)
        })
    });

    let chain = compose(
        &Composite::from(scale_fn(2).unwrap()),
        &Composite::from(identity()).then(stride_fn(5).unwrap()),
    );
    group.bench_function("composite_ascending", |b| {
        b.iter(|| {
            let mut cursor = chain.cursor();
            let mut acc = 0;
            for pos in 0..LOOKUPS {
                acc += cursor.at(pos);
            }
            black_box(acc)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_step_lookups);
criterion_main!(benches);
