//! RLE: compressed arrays built from runs of repeated values.
//!
//! This crate is the entrypoint for the run-length engine. It re-exports the
//! store, the expression graph and the evaluator from the underlying `rle-*`
//! crates.
//!
//! # Quick Start
//!
//! Record an expression lazily and materialize it:
//!
//! ```rust
//! use rle::{BinaryOp, Graph, Store, materialize_as};
//!
//! let mut graph = Graph::new();
//! let a = graph.leaf_from(&Store::from_slice(&[1_i32, 2, 3]).unwrap()).unwrap();
//! let b = graph.leaf_from(&Store::from_slice(&[4_i32, 5, 6]).unwrap()).unwrap();
//! let product = graph.binary(a, b, BinaryOp::Multiply).unwrap();
//! let out = materialize_as::<i32>(&mut graph, product).unwrap();
//! assert_eq!(out.to_string(), "1=>4, 2=>10, 3=>18");
//! ```
//!
//! # Architecture
//!
//! - **Storage** (`rle-store`): run-length stores, value cells, stride masks.
//! - **Step functions** (`rle-step`): compiled position remappings.
//! - **Expressions** (`rle-expr`): the op graph, normalization and flat plans.
//! - **Evaluation** (`rle-eval`, `rle-threading`): the tournament-tree merge
//!   and the chunked plan executor on a worker pool.
//! - **Errors** (`rle-result`): the shared error type.

pub use rle_result::{Error, Result};

pub use rle_store::mask::stride_mask;
pub use rle_store::{Pos, RunValue, Scalar, ScalarKind, Store, StoreDebug, StoreWriter, ValueCell};

pub use rle_expr::{
    BinaryOp, CompareOp, FLUSH_THRESHOLD, Graph, Op, OpId, SliceSpec, UnaryOp, normalize,
};

pub use rle_eval::{
    EvalConfig, EvalPlan, Source, evaluate, evaluate_with, flush_if_deep, materialize,
    materialize_as, materialize_with, merge, run_plan,
};

pub use rle_threading::TaskPool;

/// Step-function construction and lookup.
pub mod step {
    pub use rle_step::{
        Composite, CompositeCursor, MAX_SPAN, StepCursor, StepFn, compose, constant, identity,
        invert, scale_fn, span, stride_fn, zero,
    };
}
