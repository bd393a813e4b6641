//! Compiled step functions and their lookup cursors.

use std::sync::{Arc, LazyLock};

use rle_result::{Error, Result};
use rle_store::Pos;

use crate::MAX_SPAN;
use crate::compile::{ExecGraph, ExecNode, compile};
use crate::expr::{ExprRef, fixed, scaled, shift, strided};

/// An immutable, shareable step function.
///
/// `f(pos) = g(clamp(pos - start, 0, span))`, where `g` is the compiled
/// expression. Cloning is cheap: the compiled graph is reference counted.
/// Lookups go through a [`StepCursor`], which caches the table node it last
/// landed on so that ascending lookups mostly skip the tree walk.
#[derive(Clone, Debug)]
pub struct StepFn {
    start: Pos,
    span: Pos,
    graph: Arc<ExecGraph>,
}

static IDENTITY: LazyLock<StepFn> = LazyLock::new(|| compiled(scaled(MAX_SPAN, 1)));
static ZERO: LazyLock<StepFn> = LazyLock::new(|| build(&shift(0)));

fn compiled(expr: Result<ExprRef>) -> StepFn {
    match expr {
        Ok(expr) => build(&expr),
        Err(err) => unreachable!("built-in step expression rejected: {err}"),
    }
}

impl Default for StepFn {
    /// The zero function.
    fn default() -> Self {
        ZERO.clone()
    }
}

impl StepFn {
    /// Start of the function's domain.
    #[inline]
    pub fn start(&self) -> Pos {
        self.start
    }

    /// Width of the function's domain.
    #[inline]
    pub fn span(&self) -> Pos {
        self.span
    }

    pub fn cursor(&self) -> StepCursor<'_> {
        StepCursor::new(self)
    }

    /// One-off lookup.
    pub fn at(&self, pos: Pos) -> Pos {
        self.cursor().at(pos)
    }

    /// Anchor the function at `start` and truncate it to `stop - start`
    /// positions.
    ///
    /// The result maps `start` to 0, so `stride_fn(k).slice(a, b)` counts the
    /// positions `a, a + k, ...` below `b`.
    pub fn slice(&self, start: Pos, stop: Pos) -> Result<StepFn> {
        if start < 0 || stop < start {
            return Err(Error::InvalidArgumentError(format!(
                "invalid step-function window {start}..{stop}"
            )));
        }
        Ok(StepFn {
            start: self.start + start,
            span: (stop - start).min(self.span - start).max(0),
            graph: Arc::clone(&self.graph),
        })
    }

    /// Terminal value `f(start + span)`.
    pub fn terminal(&self) -> Pos {
        self.at(self.start + self.span)
    }
}

/// Caller-owned lookup state for one [`StepFn`].
///
/// The cursor remembers the `[base, stop)` window of the table node it last
/// reached together with the step accumulated before it. A lookup inside the
/// window is a single table read; anything else walks the tree again.
#[derive(Debug)]
pub struct StepCursor<'a> {
    func: &'a StepFn,
    base: Pos,
    stop: Pos,
    step: Pos,
    lut: &'a [Pos],
    mask: Pos,
}

impl<'a> StepCursor<'a> {
    fn new(func: &'a StepFn) -> Self {
        Self {
            func,
            base: 0,
            stop: 0,
            step: 0,
            lut: &[],
            mask: 0,
        }
    }

    /// Evaluate the function at `pos`.
    #[inline]
    pub fn at(&mut self, pos: Pos) -> Pos {
        let mut rel = pos - self.func.start - 1;
        if rel < self.base || rel >= self.stop {
            if rel >= self.func.span {
                rel = self.func.span - 1;
            }
            if rel < 0 {
                return 0;
            }
            self.search(rel);
        }
        self.step + self.lut[((rel - self.base) & self.mask) as usize]
    }

    fn search(&mut self, rel: Pos) {
        let func: &'a StepFn = self.func;
        let graph: &'a ExecGraph = &func.graph;
        let mut index = graph.root;
        let mut base = 0;
        let mut step = 0;
        let mut stop = func.span.min(graph.root_node().span());
        loop {
            match graph.nodes[index] {
                ExecNode::Table { lut, mask, .. } => {
                    self.base = base;
                    self.stop = stop;
                    self.step = step;
                    self.lut = graph.lut(lut);
                    self.mask = mask;
                    return;
                }
                ExecNode::Stack {
                    loop_span,
                    loop_step,
                    bit_shift,
                    left,
                    right,
                    ..
                } => {
                    let offset = rel - base;
                    let (quo, rem) = match bit_shift {
                        Some(shift) => (offset >> shift, offset & (loop_span - 1)),
                        None => (offset / loop_span, offset % loop_span),
                    };
                    base += quo * loop_span;
                    step += quo * loop_step;
                    let left_node = &graph.nodes[left];
                    if rem < left_node.span() {
                        index = left;
                    } else {
                        base += left_node.span();
                        step += left_node.step();
                        index = match right {
                            Some(right) => right,
                            None => unreachable!("stack remainder past its left child"),
                        };
                    }
                    stop = stop.min(base + graph.nodes[index].span());
                }
            }
        }
    }
}

/// Compile `expr` over its own span.
pub fn build(expr: &ExprRef) -> StepFn {
    StepFn {
        start: 0,
        span: expr.span,
        graph: Arc::new(compile(expr)),
    }
}

/// Compile `expr` anchored at `start` and truncated at `stop`.
pub fn build_window(start: Pos, stop: Pos, expr: &ExprRef) -> Result<StepFn> {
    if stop < start {
        return Err(Error::InvalidArgumentError(format!(
            "invalid step-function window {start}..{stop}"
        )));
    }
    Ok(StepFn {
        start,
        span: expr.span.min(stop - start),
        graph: Arc::new(compile(expr)),
    })
}

/// `f(pos) = pos`.
pub fn identity() -> StepFn {
    IDENTITY.clone()
}

/// `f(pos) = 0`.
pub fn zero() -> StepFn {
    ZERO.clone()
}

/// `f(pos) = k` for every positive position.
pub fn constant(k: Pos) -> Result<StepFn> {
    Ok(build(&fixed(MAX_SPAN, k)?))
}

/// `f(pos) = pos * k`.
pub fn scale_fn(k: Pos) -> Result<StepFn> {
    Ok(build(&scaled(MAX_SPAN, k)?))
}

/// `f(pos) = ceil(pos / k)`: positions `0, k, 2k, ...` each contribute one.
pub fn stride_fn(k: Pos) -> Result<StepFn> {
    Ok(build(&strided(MAX_SPAN, k)?))
}

/// Steps accumulated over `[start, stop)`.
pub fn span(start: Pos, stop: Pos, mut f: impl FnMut(Pos) -> Pos) -> Pos {
    f(stop) - f(start)
}

/// Smallest `pos` in `[start, stop]` with `f(pos) >= target`, or `stop`
/// when no position reaches it. `f` must be non-decreasing.
pub fn invert(target: Pos, start: Pos, stop: Pos, mut f: impl FnMut(Pos) -> Pos) -> Pos {
    let (mut lo, mut hi) = (start, stop);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if f(mid) < target {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}
