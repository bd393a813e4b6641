//! Multi-step plans: chunking, pooled evaluation, seam stitching.

use std::sync::Arc;
use std::thread;

use rle_result::{Error, Result};
use rle_step::invert;
use rle_store::{Pos, RunValue, Store};
use rle_threading::{TaskPool, run_all};

use crate::config::EvalConfig;
use crate::merge::{Source, capacity, check_sources, merge_runs};

/// One contiguous range `[offset, offset + span)` of a plan's output,
/// produced by merging `sources` with `func`.
#[derive(Clone, Debug)]
pub struct EvalStep<V, F> {
    pub offset: Pos,
    pub span: Pos,
    pub sources: Vec<Source<V>>,
    pub func: F,
}

impl<V: RunValue, F> EvalStep<V, F> {
    fn evaluate<O>(self) -> Result<StepOutput<O>>
    where
        O: RunValue,
        F: FnMut(&[V]) -> O,
    {
        let (ends, vals) = merge_runs(&self.sources, self.func)?;
        Ok(StepOutput {
            offset: self.offset,
            ends,
            vals,
        })
    }
}

/// Steps in output order.
#[derive(Clone, Debug)]
pub struct EvalPlan<V, F> {
    pub steps: Vec<EvalStep<V, F>>,
}

impl<V, F> Default for EvalPlan<V, F> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<V: RunValue, F> EvalPlan<V, F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step covering the next `span` output positions.
    pub fn push(&mut self, sources: Vec<Source<V>>, func: F) -> Result<()> {
        let span = check_sources(&sources)?;
        self.steps.push(EvalStep {
            offset: self.span(),
            span,
            sources,
            func,
        });
        Ok(())
    }

    /// Output span of the whole plan.
    pub fn span(&self) -> Pos {
        self.steps.last().map_or(0, |step| step.offset + step.span)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Split every step longer than `config.split_threshold` into
/// `config.parallelism` contiguous chunks.
///
/// Chunk boundaries sit at `span * i / parallelism`; empty chunks are
/// dropped. Each chunk re-windows every source at the positions its step
/// function maps onto the boundaries. A step whose step functions skip over
/// a boundary (increments wider than one position) is kept whole.
pub fn parallelize<V, F>(plan: EvalPlan<V, F>, config: &EvalConfig) -> EvalPlan<V, F>
where
    V: RunValue,
    F: Clone,
{
    if config.parallelism <= 1 {
        return plan;
    }
    let before = plan.steps.len();
    let mut steps = Vec::with_capacity(before);
    for step in plan.steps {
        if step.span > config.split_threshold {
            steps.extend(split_step(step, config.parallelism));
        } else {
            steps.push(step);
        }
    }
    tracing::debug!(
        before,
        after = steps.len(),
        threshold = config.split_threshold,
        "parallelized plan"
    );
    EvalPlan { steps }
}

fn split_step<V, F>(step: EvalStep<V, F>, parallelism: usize) -> Vec<EvalStep<V, F>>
where
    V: RunValue,
    F: Clone,
{
    let chunks = parallelism as Pos;
    let mut bounds: Vec<Pos> = (0..=chunks).map(|i| step.span * i / chunks).collect();
    bounds.dedup();

    let Some(windows) = chunk_windows(&step.sources, &bounds) else {
        tracing::trace!(
            offset = step.offset,
            span = step.span,
            "step functions are not unit-increment; keeping step whole"
        );
        return vec![step];
    };
    tracing::trace!(
        offset = step.offset,
        span = step.span,
        chunks = bounds.len() - 1,
        "split step"
    );

    bounds
        .windows(2)
        .enumerate()
        .map(|(chunk, pair)| EvalStep {
            offset: step.offset + pair[0],
            span: pair[1] - pair[0],
            sources: step
                .sources
                .iter()
                .zip(&windows)
                .map(|(source, windows)| {
                    let (start, stop) = windows[chunk];
                    Source::new(Arc::clone(&source.store), source.step.clone(), start, stop)
                })
                .collect(),
            func: step.func.clone(),
        })
        .collect()
}

/// Per source, the input window `[s0, s1)` of every chunk, or `None` when a
/// boundary falls between two consecutive outputs of some step function.
fn chunk_windows<V: RunValue>(sources: &[Source<V>], bounds: &[Pos]) -> Option<Vec<Vec<(Pos, Pos)>>> {
    sources
        .iter()
        .map(|source| {
            let mut cursor = source.step.cursor();
            let base = cursor.at(source.start);
            bounds
                .windows(2)
                .map(|pair| {
                    let (c0, c1) = (pair[0], pair[1]);
                    let s0 = invert(base + c0 + 1, source.start, source.stop, |p| cursor.at(p)) - 1;
                    let s1 = invert(base + c1, source.start, source.stop, |p| cursor.at(p));
                    let exact = cursor.at(s0) - base == c0 && cursor.at(s1) - base == c1;
                    exact.then_some((s0, s1))
                })
                .collect::<Option<Vec<_>>>()
        })
        .collect()
}

struct StepOutput<O> {
    offset: Pos,
    ends: Vec<Pos>,
    vals: Vec<O>,
}

/// Evaluate a plan into one store.
///
/// Steps run on `pool` when there is more than one and their combined
/// capacity exceeds `config.parallel_eval_threshold`; each step owns its
/// output buffers. Seams are then stitched in order: when a step ends with
/// the value the next one starts with, its last run is dropped so the next
/// step's first run absorbs it. The surviving runs are then copied into the
/// output at prefix-summed offsets, split across up to `pool.threads()`
/// scoped workers above `config.parallel_copy_threshold`. The copy borrows
/// the output buffers, so it cannot go through the pool's `'static` queue.
pub fn execute<V, O, F>(plan: EvalPlan<V, F>, config: &EvalConfig, pool: &TaskPool) -> Result<Store<O>>
where
    V: RunValue,
    O: RunValue,
    F: FnMut(&[V]) -> O + Send + 'static,
{
    let span = check_plan(&plan)?;
    let capacity: usize = plan.steps.iter().map(|step| capacity(&step.sources)).sum();
    let pooled = config.parallelism > 1
        && plan.steps.len() > 1
        && capacity > config.parallel_eval_threshold;
    tracing::debug!(
        steps = plan.steps.len(),
        capacity,
        span,
        pooled,
        "executing plan"
    );

    let outputs: Vec<StepOutput<O>> = if pooled {
        run_all(pool, plan.steps.into_iter().map(|step| move || step.evaluate()))?
    } else {
        plan.steps
            .into_iter()
            .map(EvalStep::evaluate)
            .collect::<Result<_>>()?
    };

    let keep = stitch(&outputs);
    let total: usize = keep.iter().sum();
    let mut ends: Vec<Pos> = vec![0; total];
    let mut vals: Vec<O> = vec![O::default(); total];
    let mut targets = Vec::with_capacity(outputs.len());
    let (mut ends_rest, mut vals_rest) = (ends.as_mut_slice(), vals.as_mut_slice());
    for (output, &keep) in outputs.iter().zip(&keep) {
        let (ends_dst, rest) = std::mem::take(&mut ends_rest).split_at_mut(keep);
        ends_rest = rest;
        let (vals_dst, rest) = std::mem::take(&mut vals_rest).split_at_mut(keep);
        vals_rest = rest;
        targets.push((output, ends_dst, vals_dst));
    }

    let copy_workers = pool.threads().min(config.parallelism).min(targets.len());
    if copy_workers > 1 && total > config.parallel_copy_threshold {
        tracing::trace!(workers = copy_workers, runs = total, "parallel copy");
        let batch = targets.len().div_ceil(copy_workers);
        thread::scope(|scope| {
            for chunk in targets.chunks_mut(batch) {
                scope.spawn(move || {
                    for (output, ends, vals) in chunk {
                        copy_into(output, ends, vals);
                    }
                });
            }
        });
    } else {
        for (output, ends, vals) in &mut targets {
            copy_into(output, ends, vals);
        }
    }
    drop(targets);

    if ends.last() != Some(&span) || ends.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(Error::Internal(format!(
            "stitched output of {} runs does not cover span {span}",
            ends.len()
        )));
    }
    tracing::trace!(runs = ends.len(), "stitched plan output");
    Ok(Store::from_runs_unchecked(ends, vals))
}

/// [`parallelize`] followed by [`execute`].
pub fn run_plan<V, O, F>(plan: EvalPlan<V, F>, config: &EvalConfig, pool: &TaskPool) -> Result<Store<O>>
where
    V: RunValue,
    O: RunValue,
    F: FnMut(&[V]) -> O + Clone + Send + 'static,
{
    execute(parallelize(plan, config), config, pool)
}

fn check_plan<V: RunValue, F>(plan: &EvalPlan<V, F>) -> Result<Pos> {
    if plan.steps.is_empty() {
        return Err(Error::InvalidArgumentError("plan has no steps".into()));
    }
    let mut expected = 0;
    for (index, step) in plan.steps.iter().enumerate() {
        if step.offset != expected {
            return Err(Error::InvalidArgumentError(format!(
                "step {index} starts at {}, expected {expected}",
                step.offset
            )));
        }
        let span = check_sources(&step.sources)?;
        if span != step.span {
            return Err(Error::InvalidArgumentError(format!(
                "step {index} declares span {} but its sources span {span}",
                step.span
            )));
        }
        expected += span;
    }
    Ok(expected)
}

/// Number of runs each output keeps after folding equal values across seams.
fn stitch<O: RunValue>(outputs: &[StepOutput<O>]) -> Vec<usize> {
    let mut keep: Vec<usize> = outputs.iter().map(|output| output.vals.len()).collect();
    for (left, pair) in outputs.windows(2).enumerate() {
        if pair[0].vals.last() == pair[1].vals.first() {
            keep[left] -= 1;
        }
    }
    keep
}

/// Write the first `ends.len()` runs of `output` at its plan offset.
fn copy_into<O: RunValue>(output: &StepOutput<O>, ends: &mut [Pos], vals: &mut [O]) {
    for (dst, end) in ends.iter_mut().zip(&output.ends) {
        *dst = end + output.offset;
    }
    vals.copy_from_slice(&output.vals[..ends.len()]);
}
