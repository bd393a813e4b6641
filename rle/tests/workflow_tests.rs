//! End-to-end use of the public API: build, normalize, materialize, flush.

use std::sync::Arc;

use rle::step::{Composite, stride_fn};
use rle::{
    BinaryOp, CompareOp, Error, EvalConfig, Graph, Op, ScalarKind, Source, Store, StoreDebug,
    TaskPool, UnaryOp, ValueCell, materialize, materialize_as, materialize_with, merge, normalize,
    stride_mask,
};
use rle_test_utils::{assert_well_formed, init_tracing_for_tests, runs};

#[test]
fn stacked_slices_normalize_to_leaf_windows() {
    init_tracing_for_tests();
    let mut graph = Graph::new();
    let x = graph.leaf_from(&Store::filled(5, 'a').unwrap()).unwrap();
    let b = graph.leaf_from(&Store::filled(1, 'b').unwrap()).unwrap();
    let head = graph.slice(x, 0, 2, 1).unwrap();
    let inner = graph.stack(&[head, b]).unwrap();
    let tail = graph.slice(x, 3, 5, 1).unwrap();
    let outer = graph.stack(&[inner, tail]).unwrap();
    let picked = graph.slice(outer, 2, 4, 1).unwrap();

    let root = normalize(&mut graph, picked).unwrap();
    assert_eq!(
        graph.display(root).unwrap(),
        "stack(slice(store(1=>b), 0:1:1), slice(store(5=>a), 3:4:1))"
    );
    let out = materialize_as::<char>(&mut graph, picked).unwrap();
    assert_eq!(out.to_string(), "1=>b, 2=>a");
}

#[test]
fn masks_drive_selections() {
    let mask = stride_mask(20, 4, 14, 3, false, true).unwrap();
    assert_eq!(mask.to_vec().iter().filter(|&&v| v).count(), 4);

    let mut graph = Graph::new();
    let m = graph.leaf_from(&mask).unwrap();
    let hot = graph.leaf_from(&Store::filled(20, 9_i16).unwrap()).unwrap();
    let cold = graph.leaf_from(&runs(&[(10, 0_i16), (10, -1)])).unwrap();
    let picked = graph.select(m, hot, cold).unwrap();
    let out = materialize_as::<i16>(&mut graph, picked).unwrap();
    assert_well_formed(&out);
    assert_eq!(
        out.to_string(),
        "4=>0, 5=>9, 7=>0, 8=>9, 10=>0, 11=>9, 13=>-1, 14=>9, 20=>-1"
    );
}

#[test]
fn chained_kernels_on_the_pool() {
    let mut graph = Graph::new();
    let values: Vec<i32> = (0..5000).map(|i| (i / 100) % 7).collect();
    let a = graph.leaf_from(&Store::from_slice(&values).unwrap()).unwrap();
    let negated = graph.unary(a, UnaryOp::Neg).unwrap();
    let shifted = graph.slice(a, 1000, 5000, 1).unwrap();
    let front = graph.slice(negated, 0, 4000, 1).unwrap();
    let sum = graph.binary(shifted, front, BinaryOp::Add).unwrap();
    let zero = graph.leaf_from(&Store::filled(4000, 0_i32).unwrap()).unwrap();
    let positive = graph.compare(sum, zero, CompareOp::Gt).unwrap();
    assert_eq!(graph.kind(positive).unwrap(), ScalarKind::Bool);

    let config = EvalConfig::default()
        .with_parallelism(4)
        .with_split_threshold(256)
        .with_parallel_eval_threshold(0)
        .with_parallel_copy_threshold(0);
    let pool = TaskPool::new(4).unwrap();
    let pooled = materialize_with(&mut graph, positive, &config, &pool).unwrap();
    let inline = materialize_with(&mut graph, positive, &EvalConfig::sequential(), &pool).unwrap();
    assert_eq!(pooled, inline);

    let expected: Vec<ValueCell> = (0..4000)
        .map(|i| ValueCell::Bool(values[i + 1000] - values[i] > 0))
        .collect();
    assert_eq!(pooled.to_vec(), expected);
    assert!(pooled.render_runs_as_table().unwrap().contains("true"));
}

#[test]
fn direct_merges_over_strided_sources() {
    let store = Arc::new(runs(&[(3, 1_u32), (3, 2), (3, 3)]));
    let every_other = Composite::from(stride_fn(2).unwrap().slice(0, 9).unwrap());
    let halves = Source::new(Arc::clone(&store), every_other, 0, 9);
    let front = Source::new(store, Composite::default(), 0, 5);
    let out = merge(&[halves, front], |v: &[u32]| v[0] * 10 + v[1]).unwrap();
    // Every other position against the first five: (1, 1) (1, 1) (2, 1) (3, 2) (3, 2).
    assert_eq!(out.to_string(), "2=>11, 3=>21, 5=>32");
}

#[test]
fn argument_errors_reach_the_caller() {
    let mut graph = Graph::new();
    let a = graph.leaf_from(&Store::filled(4, 1_u8).unwrap()).unwrap();
    let b = graph.leaf_from(&Store::filled(5, 1_u8).unwrap()).unwrap();
    assert!(matches!(
        graph.binary(a, b, BinaryOp::Add),
        Err(Error::InvalidArgumentError(_))
    ));
    assert!(matches!(
        graph.slice(a, 0, 5, 1),
        Err(Error::InvalidArgumentError(_))
    ));
    let c = graph.leaf_from(&Store::filled(4, 'c').unwrap()).unwrap();
    assert!(graph.binary(a, c, BinaryOp::Add).is_err());

    let empty = graph.slice(a, 1, 1, 1).unwrap();
    assert!(materialize(&mut graph, empty).is_err());
    assert!(matches!(graph.op(a).unwrap(), Op::Leaf(_)));
}
