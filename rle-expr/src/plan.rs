//! Flat evaluation plans built from normalized expressions.

use std::fmt;
use std::sync::Arc;

use rle_result::{Error, Result};
use rle_step::{MAX_SPAN, StepFn, identity, stride_fn};
use rle_store::{Pos, ScalarKind, Store, ValueCell};
use rustc_hash::FxHashMap;

use crate::graph::{ApplyFn, Graph, MergeFn, Op, OpId, SliceSpec};

/// A leaf store read through a strided window.
///
/// `step` counts the selected positions below its argument, so a store run
/// ending at `end` ends at `step.at(end)` in the piece's output.
#[derive(Clone, Debug)]
pub struct LeafSource {
    pub store: Arc<Store<ValueCell>>,
    pub slice: SliceSpec,
    pub step: StepFn,
}

impl LeafSource {
    pub fn new(store: Arc<Store<ValueCell>>, slice: SliceSpec) -> Result<Self> {
        if slice.stop > MAX_SPAN {
            return Err(Error::InvalidArgumentError(format!(
                "window end {} exceeds the largest supported span {MAX_SPAN}",
                slice.stop
            )));
        }
        let base = if slice.stride == 1 {
            identity()
        } else {
            stride_fn(slice.stride)?
        };
        let step = base.slice(slice.start, slice.stop)?;
        Ok(Self { store, slice, step })
    }

    /// Number of output positions.
    #[inline]
    pub fn len(&self) -> Pos {
        self.slice.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slice.is_empty()
    }
}

/// How the current values of a piece's sources fold into one output value.
#[derive(Clone)]
pub enum Combine {
    Input(usize),
    Apply(ApplyFn, Box<Combine>),
    Merge(MergeFn, Vec<Combine>),
}

impl Combine {
    /// Evaluate over one value per source.
    ///
    /// Merge operands are staged on `scratch`, which is left as it was
    /// found; reusing it across calls keeps evaluation allocation free.
    pub fn eval(&self, values: &[ValueCell], scratch: &mut Vec<ValueCell>) -> ValueCell {
        match self {
            Combine::Input(index) => values[*index],
            Combine::Apply(func, input) => func(input.eval(values, scratch)),
            Combine::Merge(func, inputs) => {
                let mark = scratch.len();
                for input in inputs {
                    let value = input.eval(values, scratch);
                    scratch.push(value);
                }
                let out = func(&scratch[mark..]);
                scratch.truncate(mark);
                out
            }
        }
    }

    /// Maximum scratch depth `eval` needs.
    pub fn scratch_depth(&self) -> usize {
        match self {
            Combine::Input(_) => 0,
            Combine::Apply(_, input) => input.scratch_depth(),
            Combine::Merge(_, inputs) => inputs
                .iter()
                .enumerate()
                .map(|(i, input)| i + input.scratch_depth())
                .max()
                .unwrap_or(0)
                .max(inputs.len()),
        }
    }
}

impl fmt::Debug for Combine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Combine::Input(index) => write!(f, "${index}"),
            Combine::Apply(_, input) => write!(f, "apply({input:?})"),
            Combine::Merge(_, inputs) => {
                f.write_str("merge(")?;
                for (i, input) in inputs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{input:?}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// One stack-free piece of a normalized expression.
#[derive(Clone, Debug)]
pub struct PlanPiece {
    pub len: Pos,
    pub sources: Vec<LeafSource>,
    pub combine: Combine,
}

/// Pieces in output order.
#[derive(Clone, Debug)]
pub struct FlatPlan {
    pub kind: ScalarKind,
    pub len: Pos,
    pub pieces: Vec<PlanPiece>,
}

impl FlatPlan {
    /// Flatten a normalized expression (see [`crate::normalize`]).
    pub fn build(graph: &Graph, root: OpId) -> Result<Self> {
        let roots = match graph.op(root)? {
            Op::Stack(children) => children.clone(),
            _ => vec![root],
        };
        let pieces = roots
            .into_iter()
            .map(|piece| PieceBuilder::new(graph).build(piece))
            .collect::<Result<Vec<_>>>()?;
        let plan = Self {
            kind: graph.kind(root)?,
            len: graph.len(root)?,
            pieces,
        };
        tracing::debug!(
            pieces = plan.pieces.len(),
            sources = plan.pieces.iter().map(|p| p.sources.len()).sum::<usize>(),
            len = plan.len,
            "built flat plan"
        );
        Ok(plan)
    }
}

struct PieceBuilder<'g> {
    graph: &'g Graph,
    sources: Vec<LeafSource>,
    // Source index of each leaf window already added.
    seen: FxHashMap<OpId, usize>,
}

impl<'g> PieceBuilder<'g> {
    fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            sources: Vec::new(),
            seen: FxHashMap::default(),
        }
    }

    fn build(mut self, piece: OpId) -> Result<PlanPiece> {
        let combine = self.combine(piece)?;
        Ok(PlanPiece {
            len: self.graph.len(piece)?,
            sources: self.sources,
            combine,
        })
    }

    fn combine(&mut self, id: OpId) -> Result<Combine> {
        let graph = self.graph;
        match graph.op(id)? {
            Op::Leaf(store) => self.source(id, store, SliceSpec::full(store.span())),
            Op::Slice { input, slice } => match graph.op(*input)? {
                Op::Leaf(store) => self.source(id, store, *slice),
                _ => Err(Error::Internal(format!(
                    "slice {id} does not wrap a leaf; the expression is not normalized"
                ))),
            },
            Op::Apply { input, func } => Ok(Combine::Apply(
                Arc::clone(func),
                Box::new(self.combine(*input)?),
            )),
            Op::Merge { inputs, func } => {
                let inputs = inputs
                    .iter()
                    .map(|&input| self.combine(input))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Combine::Merge(Arc::clone(func), inputs))
            }
            Op::Stack(_) => Err(Error::Internal(format!(
                "stack {id} inside a plan piece; the expression is not normalized"
            ))),
        }
    }

    fn source(&mut self, id: OpId, store: &Arc<Store<ValueCell>>, slice: SliceSpec) -> Result<Combine> {
        if let Some(&index) = self.seen.get(&id) {
            return Ok(Combine::Input(index));
        }
        let index = self.sources.len();
        self.sources.push(LeafSource::new(Arc::clone(store), slice)?);
        self.seen.insert(id, index);
        Ok(Combine::Input(index))
    }
}
