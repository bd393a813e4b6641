//! Evaluation of run-length expressions.
//!
//! The core is a k-way [`merge`] of aligned [`Source`]s driven by a
//! tournament tree. Multi-piece plans are described by an [`EvalPlan`]:
//! [`parallelize`] chunks long steps and [`execute`] evaluates the steps,
//! on a [`rle_threading::TaskPool`] when they are large enough, then
//! stitches the partial outputs into one compressed store.
//!
//! [`materialize`] ties this to `rle-expr`: it normalizes an expression,
//! flattens it and runs the resulting plan.
#![forbid(unsafe_code)]

pub mod config;
pub mod materialize;
pub mod merge;
pub mod parallel;

pub use config::EvalConfig;
pub use materialize::{
    combine_fn, eval_plan, evaluate, evaluate_with, flush_if_deep, materialize, materialize_as,
    materialize_with,
};
pub use merge::{HASH_MIN_SOURCES, Source, capacity, check_sources, merge};
pub use parallel::{EvalPlan, EvalStep, execute, parallelize, run_plan};
