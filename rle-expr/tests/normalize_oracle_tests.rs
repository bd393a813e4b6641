//! Randomized checks of normalization against a dense interpreter.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rle_expr::{BinaryOp, FlatPlan, Graph, Op, OpId, UnaryOp, normalize};
use rle_store::{Pos, Store, ValueCell};

/// Position-by-position interpretation of an expression.
fn dense(graph: &Graph, id: OpId) -> Vec<ValueCell> {
    dense_memo(graph, id, &mut HashMap::new())
}

fn dense_memo(
    graph: &Graph,
    id: OpId,
    memo: &mut HashMap<OpId, Vec<ValueCell>>,
) -> Vec<ValueCell> {
    if let Some(values) = memo.get(&id) {
        return values.clone();
    }
    let values: Vec<ValueCell> = match graph.op(id).unwrap() {
        Op::Leaf(store) => store.to_vec(),
        Op::Slice { input, slice } => {
            let inner = dense_memo(graph, *input, memo);
            (slice.start..slice.stop)
                .step_by(slice.stride as usize)
                .map(|pos| inner[pos as usize])
                .collect()
        }
        Op::Stack(inputs) => inputs
            .iter()
            .flat_map(|&input| dense_memo(graph, input, memo))
            .collect(),
        Op::Merge { inputs, func } => {
            let columns: Vec<Vec<ValueCell>> = inputs
                .iter()
                .map(|&input| dense_memo(graph, input, memo))
                .collect();
            let len = graph.len(id).unwrap() as usize;
            (0..len)
                .map(|i| {
                    let row: Vec<ValueCell> = columns.iter().map(|column| column[i]).collect();
                    func(&row)
                })
                .collect()
        }
        Op::Apply { input, func } => dense_memo(graph, *input, memo)
            .into_iter()
            .map(|v| func(v))
            .collect(),
    };
    memo.insert(id, values.clone());
    values
}

/// Dense interpretation of a flat plan.
fn dense_plan(plan: &FlatPlan) -> Vec<ValueCell> {
    let mut out = Vec::new();
    let mut scratch = Vec::new();
    for piece in &plan.pieces {
        let columns: Vec<Vec<ValueCell>> = piece
            .sources
            .iter()
            .map(|source| {
                let values = source.store.to_vec();
                (source.slice.start..source.slice.stop)
                    .step_by(source.slice.stride as usize)
                    .map(|pos| values[pos as usize])
                    .collect()
            })
            .collect();
        for i in 0..piece.len as usize {
            let row: Vec<ValueCell> = columns.iter().map(|column| column[i]).collect();
            out.push(piece.combine.eval(&row, &mut scratch));
        }
    }
    out
}

fn assert_piece_shape(graph: &Graph, id: OpId) {
    match graph.op(id).unwrap() {
        Op::Slice { input, .. } => {
            assert!(
                matches!(graph.op(*input).unwrap(), Op::Leaf(_)),
                "slice {id} wraps a non-leaf"
            );
        }
        Op::Merge { inputs, .. } => {
            for &input in inputs {
                assert_piece_shape(graph, input);
            }
        }
        Op::Apply { input, .. } => assert_piece_shape(graph, *input),
        Op::Leaf(_) => panic!("leaf {id} is not wrapped in a slice"),
        Op::Stack(_) => panic!("stack {id} below the top level"),
    }
}

fn random_leaf(rng: &mut StdRng, graph: &mut Graph) -> OpId {
    let len = rng.random_range(1..24);
    let mut values = Vec::with_capacity(len);
    while values.len() < len {
        let run = rng.random_range(1..5).min(len - values.len());
        let value = rng.random_range(-3_i32..4);
        values.extend(std::iter::repeat_n(value, run));
    }
    graph.leaf_from(&Store::from_slice(&values).unwrap()).unwrap()
}

fn random_expression(rng: &mut StdRng, graph: &mut Graph) -> Option<OpId> {
    let mut nodes: Vec<OpId> = (0..3).map(|_| random_leaf(rng, graph)).collect();
    for _ in 0..rng.random_range(3..14) {
        let pick = nodes[rng.random_range(0..nodes.len())];
        let len = graph.len(pick).unwrap();
        let next = match rng.random_range(0..5) {
            0 => random_leaf(rng, graph),
            1 => {
                let start: Pos = rng.random_range(0..=len);
                let stop: Pos = rng.random_range(start..=len);
                let stride: Pos = rng.random_range(1..4);
                graph.slice(pick, start, stop, stride).unwrap()
            }
            2 => {
                let other = nodes[rng.random_range(0..nodes.len())];
                let third = nodes[rng.random_range(0..nodes.len())];
                let total = len + graph.len(other).unwrap() + graph.len(third).unwrap();
                if total > 400 {
                    random_leaf(rng, graph)
                } else if rng.random_bool(0.5) {
                    graph.stack(&[pick, other]).unwrap()
                } else {
                    graph.stack(&[third, pick, other]).unwrap()
                }
            }
            3 => {
                let same_len: Vec<OpId> = nodes
                    .iter()
                    .copied()
                    .filter(|&id| graph.len(id).unwrap() == len)
                    .collect();
                let other = same_len[rng.random_range(0..same_len.len())];
                let op = if rng.random_bool(0.5) {
                    BinaryOp::Add
                } else {
                    BinaryOp::Max
                };
                graph.binary(pick, other, op).unwrap()
            }
            _ => graph.unary(pick, UnaryOp::Neg).unwrap(),
        };
        nodes.push(next);
    }
    nodes
        .into_iter()
        .rev()
        .find(|&id| graph.len(id).unwrap() > 0)
}

#[test]
fn normalized_expressions_keep_their_values() {
    let mut rng = StdRng::seed_from_u64(0xda6);
    let mut checked = 0;
    for _ in 0..300 {
        let mut graph = Graph::new();
        let Some(root) = random_expression(&mut rng, &mut graph) else {
            continue;
        };
        let expected = dense(&graph, root);

        let normalized = normalize(&mut graph, root).unwrap();
        assert_eq!(graph.len(normalized).unwrap(), graph.len(root).unwrap());
        let Op::Stack(pieces) = graph.op(normalized).unwrap().clone() else {
            panic!("normalized root is not a stack");
        };
        for &piece in &pieces {
            assert!(graph.len(piece).unwrap() > 0);
            assert_piece_shape(&graph, piece);
        }
        assert_eq!(dense(&graph, normalized), expected);

        let plan = FlatPlan::build(&graph, normalized).unwrap();
        assert_eq!(plan.pieces.len(), pieces.len());
        assert_eq!(dense_plan(&plan), expected);

        let nodes = graph.num_nodes();
        assert_eq!(normalize(&mut graph, normalized).unwrap(), normalized);
        assert_eq!(graph.num_nodes(), nodes);
        checked += 1;
    }
    assert!(checked > 200);
}
