//! Step functions: compact, symbolic position remappings.
//!
//! A step function maps a position to the number of "steps" accumulated
//! before it. Slicing a store with stride `k` starting at `a`, for example,
//! is the function counting the selected positions `a, a + k, ...` below a
//! given position, and the output run that a source run lands on is the
//! value of that function at the run's end. Nothing is ever materialized.
//!
//! Functions are described declaratively with [`expr`] (tables, scales,
//! strides, shifts, clamps and repeated stacks), compiled once into a small
//! lookup tree and evaluated through a caller-owned
//! [`StepCursor`] whose one-entry cache makes ascending lookups O(1).
//! [`Composite`] chains functions, applied right to left.
#![forbid(unsafe_code)]

pub use rle_store::Pos;

mod compile;
pub mod composite;
pub mod expr;
pub mod func;
pub mod luts;

pub use composite::{Composite, CompositeCursor, compose};
pub use expr::{ExprRef, StepExpr};
pub use func::{
    StepCursor, StepFn, build, build_window, constant, identity, invert, scale_fn, span,
    stride_fn, zero,
};

/// Maximum number of entries in a compiled lookup table.
pub const MAX_LUT_SIZE: Pos = 1 << 8;

/// Maximum domain of a step function.
pub const MAX_SPAN: Pos = 1 << 30;
