//! Expression arena.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use rle_result::{Error, Result};
use rle_store::{Pos, Scalar, ScalarKind, Store, ValueCell};
use rustc_hash::{FxHashMap, FxHashSet};

/// Reachable node count above which a façade should materialize an
/// expression instead of growing it further. Deep graphs make normalization
/// and plan construction pay again for work that a flushed leaf pays once.
pub const FLUSH_THRESHOLD: usize = 32;

/// Combining function of an n-ary merge. Receives one current value per
/// operand, in operand order.
pub type MergeFn = Arc<dyn Fn(&[ValueCell]) -> ValueCell + Send + Sync>;

/// Function of a unary apply.
pub type ApplyFn = Arc<dyn Fn(ValueCell) -> ValueCell + Send + Sync>;

/// Stable handle to a node in a [`Graph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(u32);

impl OpId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Positions `start, start + stride, ...` strictly below `stop`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SliceSpec {
    pub start: Pos,
    pub stop: Pos,
    pub stride: Pos,
}

impl SliceSpec {
    #[inline]
    pub fn new(start: Pos, stop: Pos, stride: Pos) -> Self {
        Self {
            start,
            stop,
            stride,
        }
    }

    /// The identity slice over `len` positions.
    #[inline]
    pub fn full(len: Pos) -> Self {
        Self::new(0, len, 1)
    }

    /// Number of selected positions.
    #[inline]
    pub fn len(&self) -> Pos {
        if self.stop <= self.start {
            0
        } else {
            1 + (self.stop - self.start - 1) / self.stride
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the slice selects every one of `len` positions.
    #[inline]
    pub fn is_identity(&self, len: Pos) -> bool {
        self.start == 0 && self.len() == len && (self.stride == 1 || len == 1)
    }

    /// Apply `outer` to the positions this slice selects.
    ///
    /// The result selects exactly the positions the two slices select in
    /// sequence, with `stop` tightened to one past the last of them.
    pub fn then(self, outer: SliceSpec) -> SliceSpec {
        let start = self.start + outer.start * self.stride;
        let stride = self.stride * outer.stride;
        let n = outer.len();
        let stop = if n == 0 {
            start
        } else {
            start + (n - 1) * stride + 1
        };
        SliceSpec {
            start,
            stop,
            stride,
        }
    }
}

impl fmt::Display for SliceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.stop, self.stride)
    }
}

/// Expression node.
#[derive(Clone)]
pub enum Op {
    Leaf(Arc<Store<ValueCell>>),
    Slice { input: OpId, slice: SliceSpec },
    Stack(Vec<OpId>),
    Merge { inputs: Vec<OpId>, func: MergeFn },
    Apply { input: OpId, func: ApplyFn },
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Leaf(store) => f.debug_tuple("Leaf").field(&store.num_runs()).finish(),
            Op::Slice { input, slice } => f
                .debug_struct("Slice")
                .field("input", input)
                .field("slice", slice)
                .finish(),
            Op::Stack(inputs) => f.debug_tuple("Stack").field(inputs).finish(),
            Op::Merge { inputs, .. } => f.debug_struct("Merge").field("inputs", inputs).finish(),
            Op::Apply { input, .. } => f.debug_struct("Apply").field("input", input).finish(),
        }
    }
}

#[derive(Clone, Debug)]
struct Node {
    op: Op,
    len: Pos,
    kind: ScalarKind,
}

/// Append-only arena of expression nodes.
///
/// Nodes are immutable once added and may be shared by any number of
/// parents. Every builder validates its operands before touching the arena,
/// so a failed call leaves the graph unchanged.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    fn node(&self, id: OpId) -> Result<&Node> {
        self.nodes
            .get(id.index())
            .ok_or_else(|| Error::InvalidArgumentError(format!("unknown expression node {id}")))
    }

    pub fn op(&self, id: OpId) -> Result<&Op> {
        Ok(&self.node(id)?.op)
    }

    /// Logical length of the node's output.
    pub fn len(&self, id: OpId) -> Result<Pos> {
        Ok(self.node(id)?.len)
    }

    pub fn kind(&self, id: OpId) -> Result<ScalarKind> {
        Ok(self.node(id)?.kind)
    }

    fn push(&mut self, op: Op, len: Pos, kind: ScalarKind) -> Result<OpId> {
        let index = u32::try_from(self.nodes.len())
            .map_err(|_| Error::internal("expression arena is full"))?;
        self.nodes.push(Node { op, len, kind });
        Ok(OpId(index))
    }

    /// Add a store. Every run must hold the same kind.
    pub fn leaf(&mut self, store: Arc<Store<ValueCell>>) -> Result<OpId> {
        let kind = store.kind();
        if let Some(other) = store.vals().iter().find(|v| v.kind() != kind) {
            return Err(Error::InvalidArgumentError(format!(
                "leaf store mixes {kind} and {} runs",
                other.kind()
            )));
        }
        let len = store.span();
        self.push(Op::Leaf(store), len, kind)
    }

    /// Add a typed store, boxing its runs into cells.
    pub fn leaf_from<T: Scalar>(&mut self, store: &Store<T>) -> Result<OpId> {
        self.leaf(Arc::new(store.to_cells()))
    }

    /// Strided view of `input`. The empty slice (`start == stop`) is allowed.
    pub fn slice(&mut self, input: OpId, start: Pos, stop: Pos, stride: Pos) -> Result<OpId> {
        let node = self.node(input)?;
        if start < 0 || start > stop || stop > node.len {
            return Err(Error::InvalidArgumentError(format!(
                "slice {start}..{stop} is out of bounds for length {}",
                node.len
            )));
        }
        if stride <= 0 {
            return Err(Error::InvalidArgumentError(format!(
                "slice stride must be positive, got {stride}"
            )));
        }
        let slice = SliceSpec::new(start, stop, stride);
        let kind = node.kind;
        self.push(Op::Slice { input, slice }, slice.len(), kind)
    }

    /// Concatenate `inputs`.
    pub fn stack(&mut self, inputs: &[OpId]) -> Result<OpId> {
        let Some(&first) = inputs.first() else {
            return Err(Error::invalid_argument("stack needs at least one input"));
        };
        let kind = self.kind(first)?;
        let mut len = 0;
        for &input in inputs {
            let node = self.node(input)?;
            if node.kind != kind {
                return Err(Error::InvalidArgumentError(format!(
                    "stack mixes {kind} and {} inputs",
                    node.kind
                )));
            }
            len += node.len;
        }
        self.push(Op::Stack(inputs.to_vec()), len, kind)
    }

    /// Elementwise combination of equal-length `inputs`.
    ///
    /// `func` must return cells of `kind`. It is tried once on the first
    /// position of the operands and a cell of another kind is rejected.
    pub fn merge(&mut self, inputs: &[OpId], kind: ScalarKind, func: MergeFn) -> Result<OpId> {
        let len = self.merge_len(inputs)?;
        if len > 0 {
            let mut memo = FxHashMap::default();
            let args = inputs
                .iter()
                .map(|&input| self.lookup(input, 0, &mut memo))
                .collect::<Result<Vec<_>>>()?;
            check_output(kind, func(&args))?;
        }
        self.push_merge(inputs, kind, func)
    }

    /// Elementwise function of `input`. `func` must return cells of `kind`,
    /// which is checked on the first position.
    pub fn apply(&mut self, input: OpId, kind: ScalarKind, func: ApplyFn) -> Result<OpId> {
        if self.len(input)? > 0 {
            let arg = self.value_at(input, 0)?;
            check_output(kind, func(arg))?;
        }
        self.push_apply(input, kind, func)
    }

    /// [`merge`](Self::merge) for functions whose output kind is known.
    pub(crate) fn push_merge(&mut self, inputs: &[OpId], kind: ScalarKind, func: MergeFn) -> Result<OpId> {
        let len = self.merge_len(inputs)?;
        self.push(
            Op::Merge {
                inputs: inputs.to_vec(),
                func,
            },
            len,
            kind,
        )
    }

    /// [`apply`](Self::apply) for functions whose output kind is known.
    pub(crate) fn push_apply(&mut self, input: OpId, kind: ScalarKind, func: ApplyFn) -> Result<OpId> {
        let len = self.len(input)?;
        self.push(Op::Apply { input, func }, len, kind)
    }

    fn merge_len(&self, inputs: &[OpId]) -> Result<Pos> {
        let Some(&first) = inputs.first() else {
            return Err(Error::invalid_argument("merge needs at least one input"));
        };
        let len = self.len(first)?;
        for &input in inputs {
            let other = self.len(input)?;
            if other != len {
                return Err(Error::InvalidArgumentError(format!(
                    "merge operands have different lengths: {len} and {other}"
                )));
            }
        }
        Ok(len)
    }

    /// Value of `id` at `pos`, found by walking the expression down to a
    /// leaf. Each node is visited at most once per position.
    pub fn value_at(&self, id: OpId, pos: Pos) -> Result<ValueCell> {
        let len = self.len(id)?;
        if pos < 0 || pos >= len {
            return Err(Error::InvalidArgumentError(format!(
                "position {pos} outside expression of length {len}"
            )));
        }
        self.lookup(id, pos, &mut FxHashMap::default())
    }

    fn lookup(&self, id: OpId, pos: Pos, memo: &mut FxHashMap<(OpId, Pos), ValueCell>) -> Result<ValueCell> {
        if let Some(&value) = memo.get(&(id, pos)) {
            return Ok(value);
        }
        let value = match self.op(id)? {
            Op::Leaf(store) => store.get(pos)?,
            Op::Slice { input, slice } => self.lookup(*input, slice.start + pos * slice.stride, memo)?,
            Op::Stack(inputs) => {
                let mut rel = pos;
                let mut hit = None;
                for &input in inputs {
                    let len = self.len(input)?;
                    if rel < len {
                        hit = Some(input);
                        break;
                    }
                    rel -= len;
                }
                let input = hit.ok_or_else(|| Error::internal("stack position past its inputs"))?;
                self.lookup(input, rel, memo)?
            }
            Op::Merge { inputs, func } => {
                let args = inputs
                    .iter()
                    .map(|&input| self.lookup(input, pos, memo))
                    .collect::<Result<Vec<_>>>()?;
                func(&args)
            }
            Op::Apply { input, func } => func(self.lookup(*input, pos, memo)?),
        };
        memo.insert((id, pos), value);
        Ok(value)
    }

    fn expect_kind(&self, id: OpId, expected: ScalarKind) -> Result<()> {
        let found = self.kind(id)?;
        if found != expected {
            return Err(Error::KindMismatch {
                expected: expected.name(),
                found: found.name(),
            });
        }
        Ok(())
    }

    /// Typed binary merge.
    pub fn merge2<A, B, O, F>(&mut self, a: OpId, b: OpId, f: F) -> Result<OpId>
    where
        A: Scalar,
        B: Scalar,
        O: Scalar,
        F: Fn(A, B) -> O + Send + Sync + 'static,
    {
        self.expect_kind(a, A::KIND)?;
        self.expect_kind(b, B::KIND)?;
        let func: MergeFn = Arc::new(move |vals: &[ValueCell]| {
            match (A::from_cell(vals[0]), B::from_cell(vals[1])) {
                (Some(a), Some(b)) => f(a, b).into_cell(),
                _ => unreachable!("merge2 operand kinds were checked at construction"),
            }
        });
        self.push_merge(&[a, b], O::KIND, func)
    }

    /// Typed ternary merge.
    pub fn merge3<A, B, C, O, F>(&mut self, a: OpId, b: OpId, c: OpId, f: F) -> Result<OpId>
    where
        A: Scalar,
        B: Scalar,
        C: Scalar,
        O: Scalar,
        F: Fn(A, B, C) -> O + Send + Sync + 'static,
    {
        self.expect_kind(a, A::KIND)?;
        self.expect_kind(b, B::KIND)?;
        self.expect_kind(c, C::KIND)?;
        let func: MergeFn = Arc::new(move |vals: &[ValueCell]| {
            match (
                A::from_cell(vals[0]),
                B::from_cell(vals[1]),
                C::from_cell(vals[2]),
            ) {
                (Some(a), Some(b), Some(c)) => f(a, b, c).into_cell(),
                _ => unreachable!("merge3 operand kinds were checked at construction"),
            }
        });
        self.push_merge(&[a, b, c], O::KIND, func)
    }

    /// Typed unary apply.
    pub fn map<A, O, F>(&mut self, input: OpId, f: F) -> Result<OpId>
    where
        A: Scalar,
        O: Scalar,
        F: Fn(A) -> O + Send + Sync + 'static,
    {
        self.expect_kind(input, A::KIND)?;
        let func: ApplyFn = Arc::new(move |val: ValueCell| match A::from_cell(val) {
            Some(a) => f(a).into_cell(),
            None => unreachable!("map operand kind was checked at construction"),
        });
        self.push_apply(input, O::KIND, func)
    }

    /// Children of a node, in operand order.
    pub fn inputs(&self, id: OpId) -> Result<&[OpId]> {
        Ok(match self.op(id)? {
            Op::Leaf(_) => &[],
            Op::Slice { input, .. } | Op::Apply { input, .. } => std::slice::from_ref(input),
            Op::Stack(inputs) | Op::Merge { inputs, .. } => inputs,
        })
    }

    /// Number of distinct nodes reachable from `id`, itself included.
    pub fn node_count(&self, id: OpId) -> Result<usize> {
        let mut seen = FxHashSet::default();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend_from_slice(self.inputs(next)?);
            }
        }
        Ok(seen.len())
    }

    /// Render the expression rooted at `id`, e.g.
    /// `stack(slice(store(1=>b), 0:1:1), store(5=>a))`.
    pub fn display(&self, id: OpId) -> Result<String> {
        let mut out = String::new();
        self.write_node(&mut out, id)?;
        Ok(out)
    }

    fn write_node(&self, out: &mut String, id: OpId) -> Result<()> {
        let write_err = |_| Error::internal("formatting an expression failed");
        match self.op(id)? {
            Op::Leaf(store) => write!(out, "store({store})").map_err(write_err)?,
            Op::Slice { input, slice } => {
                out.push_str("slice(");
                self.write_node(out, *input)?;
                write!(out, ", {slice})").map_err(write_err)?;
            }
            Op::Stack(inputs) => self.write_list(out, "stack", inputs)?,
            Op::Merge { inputs, .. } => self.write_list(out, "merge", inputs)?,
            Op::Apply { input, .. } => {
                out.push_str("apply(");
                self.write_node(out, *input)?;
                out.push(')');
            }
        }
        Ok(())
    }

    fn write_list(&self, out: &mut String, name: &str, inputs: &[OpId]) -> Result<()> {
        out.push_str(name);
        out.push('(');
        for (i, &input) in inputs.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.write_node(out, input)?;
        }
        out.push(')');
        Ok(())
    }
}

fn check_output(declared: ScalarKind, produced: ValueCell) -> Result<()> {
    if produced.kind() != declared {
        return Err(Error::KindMismatch {
            expected: declared.name(),
            found: produced.kind().name(),
        });
    }
    Ok(())
}
