//! Chunked, pooled execution must reproduce single-chunk evaluation.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rle_eval::{EvalConfig, EvalPlan, Source, execute, parallelize, run_plan};
use rle_step::{Composite, stride_fn};
use rle_store::{Pos, Store};
use rle_test_utils::{assert_well_formed, init_tracing_for_tests, random_store, runs};
use rle_threading::TaskPool;

type Func = fn(&[i32]) -> i32;

fn fold(values: &[i32]) -> i32 {
    values
        .iter()
        .fold(0_i32, |acc, &v| acc.wrapping_mul(3).wrapping_add(v))
}

fn pooled(parallelism: usize) -> EvalConfig {
    EvalConfig::default()
        .with_parallelism(parallelism)
        .with_split_threshold(4)
        .with_parallel_eval_threshold(0)
        .with_parallel_copy_threshold(0)
}

/// A source of output span `span`, either a plain window or a strided one.
fn random_source(rng: &mut StdRng, span: Pos) -> Source<i32> {
    let values = [0, 1, 2, 5];
    if rng.random_bool(0.5) {
        let lead = rng.random_range(0..5);
        let tail = rng.random_range(0..5);
        let store = random_store(rng, lead + span + tail, 6, &values);
        let step = Composite::default();
        return Source::new(Arc::new(store), step, lead, lead + span);
    }
    let stride = rng.random_range(2..5);
    let start = rng.random_range(0..4);
    let stop = start + (span - 1) * stride + 1;
    let tail = rng.random_range(0..3);
    let store = random_store(rng, stop + tail, 9, &values);
    let step = Composite::from(stride_fn(stride).unwrap().slice(start, stop).unwrap());
    Source::new(Arc::new(store), step, start, stop)
}

/// Expected output, position by position.
fn dense(plan: &EvalPlan<i32, Func>) -> Vec<i32> {
    let mut out = Vec::new();
    for step in &plan.steps {
        let columns: Vec<Vec<i32>> = step
            .sources
            .iter()
            .map(|source| {
                let values = source.store.to_vec();
                let mut cursor = source.step.cursor();
                let base = cursor.at(source.start);
                let mut column = Vec::with_capacity(step.span as usize);
                for pos in source.start..source.stop {
                    if cursor.at(pos + 1) > cursor.at(pos) {
                        column.push(values[pos as usize]);
                    }
                }
                assert_eq!(cursor.at(source.stop) - base, step.span);
                column
            })
            .collect();
        for i in 0..step.span as usize {
            let row: Vec<i32> = columns.iter().map(|column| column[i]).collect();
            out.push((step.func)(&row));
        }
    }
    out
}

#[test]
fn random_plans_match_sequential_evaluation() {
    init_tracing_for_tests();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let pool = TaskPool::new(4).unwrap();
    for _ in 0..150 {
        let mut plan: EvalPlan<i32, Func> = EvalPlan::new();
        for _ in 0..rng.random_range(1..4) {
            let span = rng.random_range(1..160);
            let sources = (0..rng.random_range(1..7))
                .map(|_| random_source(&mut rng, span))
                .collect();
            plan.push(sources, fold as Func).unwrap();
        }
        let expected = dense(&plan);

        let sequential = execute(plan.clone(), &EvalConfig::sequential(), &pool).unwrap();
        assert_well_formed(&sequential);
        assert_eq!(sequential.to_vec(), expected);

        let parallelism = rng.random_range(2..8);
        let parallel = run_plan(plan, &pooled(parallelism), &pool).unwrap();
        assert_eq!(parallel, sequential, "parallelism {parallelism}");
    }
}

#[test]
fn even_and_ragged_splits() {
    init_tracing_for_tests();
    let pool = TaskPool::new(3).unwrap();
    for span in [120, 121, 123] {
        let store = Arc::new(runs(&[(span / 3, 1), (span / 3, 2), (span - 2 * (span / 3), 1)]));
        let other = Arc::new(runs(&[(7, 4), (span - 7, 0)]));
        let mut plan: EvalPlan<i32, Func> = EvalPlan::new();
        plan.push(
            vec![Source::full(Arc::clone(&store)), Source::full(other)],
            fold as Func,
        )
        .unwrap();

        let chunked = parallelize(plan.clone(), &pooled(4));
        assert_eq!(chunked.len(), 4);
        let spans: Vec<Pos> = chunked.steps.iter().map(|step| step.span).collect();
        assert_eq!(spans.iter().sum::<Pos>(), span);
        if span % 4 == 0 {
            assert!(spans.iter().all(|&s| s == span / 4));
        }

        let sequential = execute(plan, &EvalConfig::sequential(), &pool).unwrap();
        let parallel = execute(chunked, &pooled(4), &pool).unwrap();
        assert_eq!(parallel, sequential, "span {span}");
        assert_eq!(parallel.num_runs(), 4);
    }
}

#[test]
fn seams_inside_one_run_disappear() {
    let pool = TaskPool::new(2).unwrap();
    let store = Arc::new(Store::filled(1000, 9_i32).unwrap());
    let mut plan: EvalPlan<i32, Func> = EvalPlan::new();
    plan.push(vec![Source::full(store)], fold as Func).unwrap();
    let out = run_plan(plan, &pooled(7), &pool).unwrap();
    assert_eq!(out.to_string(), "1000=>9");
}
