//! Declarative builders for strided masks.
//!
//! A mask expression is a small tree of constant ranges and repeated
//! stacks. Building it walks the tree once and emits compressed runs, so a
//! mask selecting every third position of a billion-long span costs memory
//! proportional to the number of selected blocks, never to the span.

use std::sync::Arc;

use rle_result::{Error, Result};

use crate::store::{Pos, RunValue, Store, StoreWriter};

#[derive(Debug)]
pub enum MaskExpr<V> {
    /// `span` positions holding `fill`.
    Range { span: Pos, fill: V },
    /// `reps` repetitions of `left` followed by `right`.
    Stack {
        span: Pos,
        reps: Pos,
        left: Arc<MaskExpr<V>>,
        right: Option<Arc<MaskExpr<V>>>,
    },
}

impl<V> MaskExpr<V> {
    #[inline]
    pub fn span(&self) -> Pos {
        match self {
            MaskExpr::Range { span, .. } | MaskExpr::Stack { span, .. } => *span,
        }
    }
}

pub fn range<V>(span: Pos, fill: V) -> Arc<MaskExpr<V>> {
    Arc::new(MaskExpr::Range { span, fill })
}

pub fn stack<V>(
    reps: Pos,
    left: Arc<MaskExpr<V>>,
    right: Option<Arc<MaskExpr<V>>>,
) -> Arc<MaskExpr<V>> {
    let loop_span = left.span() + right.as_ref().map_or(0, |r| r.span());
    Arc::new(MaskExpr::Stack {
        span: reps * loop_span,
        reps,
        left,
        right,
    })
}

/// Truncate `expr` to its first `span` positions.
pub fn clamp<V: RunValue>(span: Pos, expr: &Arc<MaskExpr<V>>) -> Arc<MaskExpr<V>> {
    if span >= expr.span() {
        return Arc::clone(expr);
    }
    match expr.as_ref() {
        MaskExpr::Range { fill, .. } => range(span, *fill),
        MaskExpr::Stack {
            span: total,
            reps,
            left,
            right,
        } => {
            let loop_span = total / reps;
            let body = stack(span / loop_span, Arc::clone(left), right.clone());
            let rem = span % loop_span;
            if rem == 0 {
                body
            } else if rem <= left.span() {
                stack(1, body, Some(clamp(rem, left)))
            } else {
                // rem > left.span() implies the stack has a right child.
                let tail = right
                    .as_ref()
                    .map(|r| clamp(rem - left.span(), r));
                stack(1, body, Some(stack(1, Arc::clone(left), tail)))
            }
        }
    }
}

/// `span` positions where every `stride`-th one (starting at 0) is
/// `include` and the rest are `exclude`.
pub fn strided<V: RunValue>(
    span: Pos,
    stride: Pos,
    exclude: V,
    include: V,
) -> Result<Arc<MaskExpr<V>>> {
    if stride <= 0 {
        return Err(Error::InvalidArgumentError(format!(
            "mask stride must be positive, got {stride}"
        )));
    }
    if span <= 0 {
        return Ok(range(0, exclude));
    }
    if stride == 1 {
        return Ok(range(span, include));
    }
    let reps = 1 + (span - 1) / stride;
    let body = stack(reps, range(1, include), Some(range(stride - 1, exclude)));
    Ok(clamp(span, &body))
}

/// Emit the runs of `expr`.
pub fn build<V: RunValue>(expr: &MaskExpr<V>) -> Result<Store<V>> {
    fn emit<V: RunValue>(expr: &MaskExpr<V>, out: &mut StoreWriter<V>) -> Result<()> {
        match expr {
            MaskExpr::Range { span, fill } => out.push_run(*span, *fill),
            MaskExpr::Stack {
                reps, left, right, ..
            } => {
                for _ in 0..*reps {
                    emit(left, out)?;
                    if let Some(right) = right {
                        emit(right, out)?;
                    }
                }
                Ok(())
            }
        }
    }

    if expr.span() <= 0 {
        return Err(Error::InvalidArgumentError(format!(
            "mask span must be positive, got {}",
            expr.span()
        )));
    }
    let mut out = StoreWriter::new();
    emit(expr, &mut out)?;
    out.finish()
}

/// A mask of `span` positions selecting `start, start + stride, ...` below
/// `stop`.
pub fn stride_mask<V: RunValue>(
    span: Pos,
    start: Pos,
    stop: Pos,
    stride: Pos,
    exclude: V,
    include: V,
) -> Result<Store<V>> {
    if !(0 <= start && start <= stop && stop <= span) {
        return Err(Error::InvalidArgumentError(format!(
            "mask window {start}..{stop} outside span {span}"
        )));
    }
    let middle = strided(stop - start, stride, exclude, include)?;
    let tail = stack(1, middle, Some(range(span - stop, exclude)));
    build(&stack(1, range(start, exclude), Some(tail)))
}
