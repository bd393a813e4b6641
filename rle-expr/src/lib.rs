//! Lazy array expressions over run-length stores.
//!
//! Expressions are recorded in a [`Graph`] arena and nothing is computed
//! until a plan is materialized. Before evaluation an expression is
//! normalized in two passes:
//!
//! 1. stacks are pulled to the top, so the root is a single stack whose
//!    pieces contain no stack;
//! 2. slices are pushed down until each one wraps a leaf store directly.
//!
//! Each normalized piece then flattens into a [`PlanPiece`]: a list of leaf
//! sources that all span the piece, plus the [`Combine`] tree that folds
//! their current values into one output value.
#![forbid(unsafe_code)]

pub mod graph;
pub mod kernels;
pub mod normalization;
pub mod plan;

pub use graph::{ApplyFn, FLUSH_THRESHOLD, Graph, MergeFn, Op, OpId, SliceSpec};
pub use kernels::{BinaryOp, CompareOp, UnaryOp};
pub use normalization::{normalize, pull_stacks, push_slices};
pub use plan::{Combine, FlatPlan, LeafSource, PlanPiece};
