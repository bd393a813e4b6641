//! Error types and result definitions shared by every `rle` crate.
//!
//! All crates in the workspace return [`Result<T>`], whose error side is the
//! single [`Error`] enum. Keeping one enum lets errors cross crate boundaries
//! with `?` and lets callers match on the failure category directly.
//!
//! # Error Categories
//!
//! - **Argument errors** ([`Error::InvalidArgumentError`], [`Error::KindMismatch`]):
//!   a caller-supplied precondition was violated (bad slice bounds, unequal
//!   merge lengths, non-positive spans, disagreeing source spans).
//! - **State errors** ([`Error::Internal`]): an internal invariant is broken.
//!   These indicate a bug in the engine rather than caller misuse.
//! - **Task errors** ([`Error::TaskPanicked`], [`Error::PoolClosed`]): failures
//!   carried back from the worker pool.
//! - **Interop errors** ([`Error::Arrow`]): failures converting to or from
//!   Arrow arrays.
//!
//! Paths that are impossible by construction use `unreachable!` instead of an
//! error value, since continuing could corrupt the run-compression invariant.

pub mod error;
pub mod result;

pub use error::Error;
pub use result::Result;
