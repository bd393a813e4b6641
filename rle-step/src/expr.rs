//! Declarative step-function expressions.
//!
//! An expression describes `g(n)`, the accumulated step count over the first
//! `n` positions of its domain, as a tree of two node kinds:
//!
//! - **table** nodes read `g(n) = lut[(n - 1) & mask]` directly. A zero mask
//!   pins every lookup to entry 0, which is how fixed steps are expressed.
//! - **stack** nodes repeat `left` (optionally followed by `right`) `reps`
//!   times, so `g` advances by `loop_step` per repetition. A zero-width
//!   `right` contributes at the first position of the following repetition,
//!   never at the end of the span.
//!
//! Large scaled and strided ranges are decomposed into a repeated table
//! clamped to the requested span, which keeps every table within
//! [`MAX_LUT_SIZE`](crate::MAX_LUT_SIZE) entries while the tree stays two
//! levels deep. Expressions are immutable and shared through [`ExprRef`];
//! the compiler maps each distinct node to exactly one compiled node.

use std::sync::Arc;

use rle_result::{Error, Result};
use rle_store::Pos;

use crate::luts::{Lut, fixed_lut, scaled_lut, strided_lut};
use crate::{MAX_LUT_SIZE, MAX_SPAN};

pub type ExprRef = Arc<StepExpr>;

#[derive(Clone, Debug)]
pub struct StepExpr {
    /// Positions covered.
    pub span: Pos,
    /// `g(span)`: the step accumulated over the whole span.
    pub step: Pos,
    pub kind: ExprKind,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Table {
        lut: Lut,
        mask: Pos,
    },
    Stack {
        reps: Pos,
        loop_span: Pos,
        loop_step: Pos,
        left: ExprRef,
        right: Option<ExprRef>,
    },
}

/// Mask selecting the full offset.
pub const FULL_MASK: Pos = -1;

impl StepExpr {
    /// Reference evaluation of `g(pos)`.
    ///
    /// Positions at or below zero yield 0 and positions past the span yield
    /// the terminal step.
    pub fn eval(&self, pos: Pos) -> Pos {
        if pos <= 0 {
            return 0;
        }
        if pos >= self.span {
            return self.step;
        }
        match &self.kind {
            ExprKind::Table { lut, mask } => lut.as_slice()[((pos - 1) & mask) as usize],
            ExprKind::Stack {
                loop_span,
                loop_step,
                left,
                right,
                ..
            } => {
                // Positions are 1-based here: `rem` is in `1..=loop_span`, so a
                // zero-width trailing child only counts once the next
                // repetition starts.
                let quo = (pos - 1) / loop_span;
                let rem = (pos - 1) % loop_span + 1;
                let base = quo * loop_step;
                if rem <= left.span {
                    base + left.eval(rem)
                } else {
                    let right = right
                        .as_ref()
                        .unwrap_or_else(|| unreachable!("stack remainder past its left child"));
                    base + left.step + right.eval(rem - left.span)
                }
            }
        }
    }
}

/// A direct lookup over `span` positions.
pub fn table(span: Pos, lut: Lut, mask: Pos) -> Result<ExprRef> {
    if span < 0 {
        return Err(Error::InvalidArgumentError(format!(
            "table span must be non-negative, got {span}"
        )));
    }
    let values = lut.as_slice();
    if values.is_empty() {
        return Err(Error::invalid_argument("table lookup must not be empty"));
    }
    if mask != 0 && (span > MAX_LUT_SIZE || span > values.len() as Pos) {
        return Err(Error::InvalidArgumentError(format!(
            "table span {span} exceeds its lookup of {} entries",
            values.len().min(MAX_LUT_SIZE as usize)
        )));
    }
    let step = if span > 0 {
        values[(mask & (span - 1)) as usize]
    } else {
        0
    };
    Ok(Arc::new(StepExpr {
        span,
        step,
        kind: ExprKind::Table { lut, mask },
    }))
}

/// `span` positions that together contribute `step`, all of it at the first
/// position.
pub fn fixed(span: Pos, step: Pos) -> Result<ExprRef> {
    table(span, fixed_lut(step), 0)
}

/// A zero-width node contributing `step`.
///
/// Used as the left child of a stack to offset everything after it.
pub fn shift(step: Pos) -> ExprRef {
    Arc::new(StepExpr {
        span: 0,
        step,
        kind: ExprKind::Table {
            lut: fixed_lut(0),
            mask: 0,
        },
    })
}

/// `g(n) = n * k` over `span` positions.
pub fn scaled(span: Pos, k: Pos) -> Result<ExprRef> {
    check_span(span)?;
    if k < 0 {
        return Err(Error::InvalidArgumentError(format!(
            "scale must be non-negative, got {k}"
        )));
    }
    if span == 0 {
        return Ok(shift(0));
    }
    if span > MAX_LUT_SIZE {
        let reps = 1 + (span - 1) / MAX_LUT_SIZE;
        let body = stack(reps, scaled(MAX_LUT_SIZE, k)?, None)?;
        return Ok(clamp(span, &body));
    }
    table(span, scaled_lut(k, span), FULL_MASK)
}

/// `g(n) = ceil(n / k)` over `span` positions: every `k`-th position,
/// starting at the first, contributes one step.
pub fn strided(span: Pos, k: Pos) -> Result<ExprRef> {
    check_span(span)?;
    if k <= 0 {
        return Err(Error::InvalidArgumentError(format!(
            "stride must be positive, got {k}"
        )));
    }
    if span == 0 {
        return Ok(shift(0));
    }
    if k > MAX_LUT_SIZE {
        let reps = 1 + (span - 1) / k;
        let body = stack(reps, fixed(1, 1)?, Some(fixed(k - 1, 0)?))?;
        return Ok(clamp(span, &body));
    }
    if span > MAX_LUT_SIZE {
        let loop_span = MAX_LUT_SIZE - MAX_LUT_SIZE % k;
        let reps = 1 + (span - 1) / loop_span;
        let body = stack(reps, strided(loop_span, k)?, None)?;
        return Ok(clamp(span, &body));
    }
    table(span, strided_lut(k, span), FULL_MASK)
}

/// `reps` repetitions of `left` followed by `right`.
pub fn stack(reps: Pos, left: ExprRef, right: Option<ExprRef>) -> Result<ExprRef> {
    if reps < 0 {
        return Err(Error::InvalidArgumentError(format!(
            "stack repetitions must be non-negative, got {reps}"
        )));
    }
    let loop_span = left.span + right.as_ref().map_or(0, |r| r.span);
    let loop_step = left.step + right.as_ref().map_or(0, |r| r.step);
    // A zero-width right child is not reached at the end of the last
    // repetition.
    let last_step = match &right {
        Some(right) if right.span == 0 && loop_span > 0 => left.step,
        _ => loop_step,
    };
    let step = if reps == 0 {
        0
    } else {
        (reps - 1) * loop_step + last_step
    };
    Ok(Arc::new(StepExpr {
        span: reps * loop_span,
        step,
        kind: ExprKind::Stack {
            reps,
            loop_span,
            loop_step,
            left,
            right,
        },
    }))
}

/// Truncate `expr` to its first `span` positions.
pub fn clamp(span: Pos, expr: &ExprRef) -> ExprRef {
    if span >= expr.span {
        return Arc::clone(expr);
    }
    let span = span.max(0);
    Arc::new(StepExpr {
        span,
        step: expr.eval(span),
        kind: expr.kind.clone(),
    })
}

fn check_span(span: Pos) -> Result<()> {
    if !(0..=MAX_SPAN).contains(&span) {
        return Err(Error::InvalidArgumentError(format!(
            "step span {span} outside [0, {MAX_SPAN}]"
        )));
    }
    Ok(())
}
