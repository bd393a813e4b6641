//! Compiles step expressions into flat lookup graphs.
//!
//! Compilation runs in two passes. The first walks the expression to count
//! the distinct nodes and the table entries that must be copied locally; the
//! second allocates both buffers once and fills them in post-order. Each
//! expression node is memoized by identity, so a sub-expression shared by
//! several parents becomes a single compiled node.

use rustc_hash::{FxHashMap, FxHashSet};

use rle_store::Pos;

use crate::expr::{ExprKind, StepExpr};
use crate::luts::Lut;

/// Table storage of a compiled table node.
#[derive(Clone, Copy, Debug)]
pub(crate) enum LutRef {
    Shared(&'static [Pos]),
    Local { offset: usize, len: usize },
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum ExecNode {
    Table {
        span: Pos,
        step: Pos,
        lut: LutRef,
        mask: Pos,
    },
    Stack {
        span: Pos,
        step: Pos,
        loop_span: Pos,
        loop_step: Pos,
        /// `log2(loop_span)` when the loop span is a power of two.
        bit_shift: Option<u32>,
        left: usize,
        right: Option<usize>,
    },
}

impl ExecNode {
    #[inline]
    pub(crate) fn span(&self) -> Pos {
        match self {
            ExecNode::Table { span, .. } | ExecNode::Stack { span, .. } => *span,
        }
    }

    #[inline]
    pub(crate) fn step(&self) -> Pos {
        match self {
            ExecNode::Table { step, .. } | ExecNode::Stack { step, .. } => *step,
        }
    }
}

/// A compiled step-function tree.
#[derive(Debug)]
pub(crate) struct ExecGraph {
    pub(crate) nodes: Vec<ExecNode>,
    tables: Vec<Pos>,
    pub(crate) root: usize,
}

impl ExecGraph {
    #[inline]
    pub(crate) fn lut(&self, lut: LutRef) -> &[Pos] {
        match lut {
            LutRef::Shared(values) => values,
            LutRef::Local { offset, len } => &self.tables[offset..offset + len],
        }
    }

    #[inline]
    pub(crate) fn root_node(&self) -> &ExecNode {
        &self.nodes[self.root]
    }

    pub(crate) fn table_len(&self) -> usize {
        self.tables.len()
    }
}

/// Compile `expr` into an [`ExecGraph`].
pub(crate) fn compile(expr: &StepExpr) -> ExecGraph {
    let (node_count, table_len) = count(expr);
    let mut builder = Builder {
        nodes: Vec::with_capacity(node_count),
        tables: Vec::with_capacity(table_len),
        memo: FxHashMap::default(),
    };
    let root = builder.emit(expr);
    debug_assert_eq!(builder.nodes.len(), node_count);
    debug_assert_eq!(builder.tables.len(), table_len);
    tracing::trace!(
        nodes = node_count,
        table_entries = table_len,
        "compiled step function"
    );
    ExecGraph {
        nodes: builder.nodes,
        tables: builder.tables,
        root,
    }
}

/// First pass: distinct nodes and locally stored table entries.
fn count(expr: &StepExpr) -> (usize, usize) {
    let mut seen: FxHashSet<*const StepExpr> = FxHashSet::default();
    let mut stack = vec![expr];
    let (mut nodes, mut entries) = (0, 0);
    while let Some(node) = stack.pop() {
        if !seen.insert(node as *const StepExpr) {
            continue;
        }
        nodes += 1;
        match &node.kind {
            ExprKind::Table { lut, .. } => {
                if let Lut::Owned(values) = lut {
                    entries += values.len();
                }
            }
            ExprKind::Stack { left, right, .. } => {
                stack.push(left.as_ref());
                if let Some(right) = right {
                    stack.push(right.as_ref());
                }
            }
        }
    }
    (nodes, entries)
}

struct Builder {
    nodes: Vec<ExecNode>,
    tables: Vec<Pos>,
    memo: FxHashMap<*const StepExpr, usize>,
}

impl Builder {
    /// Second pass: post-order emission.
    fn emit(&mut self, expr: &StepExpr) -> usize {
        let key = expr as *const StepExpr;
        if let Some(&index) = self.memo.get(&key) {
            return index;
        }
        let node = match &expr.kind {
            ExprKind::Table { lut, mask } => {
                let lut = match lut {
                    Lut::Shared(values) => LutRef::Shared(*values),
                    Lut::Owned(values) => {
                        let offset = self.tables.len();
                        self.tables.extend_from_slice(values);
                        LutRef::Local {
                            offset,
                            len: values.len(),
                        }
                    }
                };
                ExecNode::Table {
                    span: expr.span,
                    step: expr.step,
                    lut,
                    mask: *mask,
                }
            }
            ExprKind::Stack {
                loop_span,
                loop_step,
                left,
                right,
                ..
            } => {
                let left = self.emit(left);
                let right = right.as_deref().map(|right| self.emit(right));
                let bit_shift = (*loop_span > 0 && (*loop_span as u64).is_power_of_two())
                    .then(|| loop_span.trailing_zeros());
                ExecNode::Stack {
                    span: expr.span,
                    step: expr.step,
                    loop_span: *loop_span,
                    loop_step: *loop_step,
                    bit_shift,
                    left,
                    right,
                }
            }
        };
        let index = self.nodes.len();
        self.nodes.push(node);
        self.memo.insert(key, index);
        index
    }
}
