//! Run-length encoded stores.
//!
//! A [`Store`] holds an array as runs of repeated values: parallel vectors of
//! strictly increasing run ends and run values. Everything else in the
//! workspace reads stores and produces new ones; nothing mutates a store in
//! place once it is built.
//!
//! This crate also provides:
//! - [`ValueCell`], the tagged scalar used when stores of different kinds are
//!   combined in one expression,
//! - dense and Arrow conversions,
//! - [`mask`], builders for strided include/exclude masks,
//! - [`StoreDebug`], an Arrow pretty-table rendering for diagnostics.
#![forbid(unsafe_code)]

pub mod conv;
pub mod debug;
pub mod interop;
pub mod mask;
pub mod store;
pub mod value;

pub use debug::StoreDebug;
pub use store::{Pos, RunValue, Store, StoreWriter};
pub use value::{Scalar, ScalarKind, ValueCell};
