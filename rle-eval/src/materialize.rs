//! Materializing expression graphs.

use std::sync::Arc;

use rle_expr::{Combine, FlatPlan, FLUSH_THRESHOLD, Graph, Op, OpId, normalize};
use rle_result::Result;
use rle_step::Composite;
use rle_store::{Scalar, Store, ValueCell};
use rle_threading::TaskPool;

use crate::config::EvalConfig;
use crate::merge::Source;
use crate::parallel::{EvalPlan, run_plan};

/// Turn a combine tree into a merge function.
///
/// Clones share the tree and each get their own scratch buffer, so chunks of
/// one piece can be evaluated on different workers.
pub fn combine_fn(combine: Combine) -> impl FnMut(&[ValueCell]) -> ValueCell + Clone + Send + 'static {
    let combine = Arc::new(combine);
    let mut scratch = Vec::with_capacity(combine.scratch_depth());
    move |values: &[ValueCell]| combine.eval(values, &mut scratch)
}

/// One step per plan piece, laid out back to back.
pub fn eval_plan(
    plan: &FlatPlan,
) -> Result<EvalPlan<ValueCell, impl FnMut(&[ValueCell]) -> ValueCell + Clone + Send + 'static>> {
    let mut steps = EvalPlan::new();
    for piece in &plan.pieces {
        let sources = piece
            .sources
            .iter()
            .map(|leaf| {
                Source::new(
                    Arc::clone(&leaf.store),
                    Composite::from(leaf.step.clone()),
                    leaf.slice.start,
                    leaf.slice.stop,
                )
            })
            .collect();
        steps.push(sources, combine_fn(piece.combine.clone()))?;
    }
    Ok(steps)
}

/// Evaluate `id` into a store with the default configuration on the shared
/// pool. Leaves are returned as they are.
pub fn materialize(graph: &mut Graph, id: OpId) -> Result<Arc<Store<ValueCell>>> {
    materialize_with(graph, id, &EvalConfig::default(), TaskPool::shared()?)
}

pub fn materialize_with(
    graph: &mut Graph,
    id: OpId,
    config: &EvalConfig,
    pool: &TaskPool,
) -> Result<Arc<Store<ValueCell>>> {
    if let Op::Leaf(store) = graph.op(id)? {
        return Ok(Arc::clone(store));
    }
    let root = normalize(graph, id)?;
    let flat = FlatPlan::build(graph, root)?;
    let store = run_plan(eval_plan(&flat)?, config, pool)?;
    tracing::debug!(
        expression = %id,
        span = store.span(),
        runs = store.num_runs(),
        "materialized expression"
    );
    Ok(Arc::new(store))
}

/// Materialize and read the result back as `T`.
pub fn materialize_as<T: Scalar>(graph: &mut Graph, id: OpId) -> Result<Store<T>> {
    materialize(graph, id)?.to_typed()
}

/// Replace `id` by a leaf holding its materialized store.
pub fn evaluate(graph: &mut Graph, id: OpId) -> Result<OpId> {
    evaluate_with(graph, id, &EvalConfig::default(), TaskPool::shared()?)
}

pub fn evaluate_with(graph: &mut Graph, id: OpId, config: &EvalConfig, pool: &TaskPool) -> Result<OpId> {
    if let Op::Leaf(_) = graph.op(id)? {
        return Ok(id);
    }
    let store = materialize_with(graph, id, config, pool)?;
    graph.leaf(store)
}

/// [`evaluate`] once more than [`FLUSH_THRESHOLD`] nodes are reachable from
/// `id`; otherwise `id` itself.
pub fn flush_if_deep(graph: &mut Graph, id: OpId) -> Result<OpId> {
    if graph.node_count(id)? > FLUSH_THRESHOLD {
        tracing::trace!(expression = %id, "flushing deep expression");
        return evaluate(graph, id);
    }
    Ok(id)
}
