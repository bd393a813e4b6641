use std::fmt;
use thiserror::Error;

/// Unified error type for all run-length engine operations.
///
/// Errors propagate upward with `?`. Nothing in the engine recovers from an
/// error locally; every failure reaches the immediate caller, including
/// failures raised on worker threads, which travel back through the task
/// handle that scheduled them.
///
/// # Thread Safety
///
/// `Error` is `Send + Sync` so it can be returned from pool tasks.
#[derive(Error, Debug)]
pub enum Error {
    /// Arrow library error raised while converting stores to or from arrays.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Invalid caller input.
    ///
    /// Raised before any computation proceeds, for example:
    /// - a store constructed with a non-positive span or unordered run ends
    /// - slice bounds outside the input, or a zero stride
    /// - merge operands of unequal length
    /// - plan sources that disagree on their output span
    ///
    /// No partial mutation happens when this error is returned.
    #[error("Invalid argument: {0}")]
    InvalidArgumentError(String),

    /// A value cell was read as a scalar kind it does not hold.
    #[error("Kind mismatch: expected {expected}, found {found}")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Internal error indicating a bug or unexpected state.
    ///
    /// Typical sources are a normalization pass meeting a node shape its
    /// previous pass should have removed, or a stitched output whose run
    /// ends are no longer ordered.
    #[error("An internal operation failed: {0}")]
    Internal(String),

    /// A task running on the worker pool panicked.
    ///
    /// The panic payload is captured on the worker and rendered into the
    /// message, so the panic never tears down the worker thread itself.
    #[error("task panicked: {0}")]
    TaskPanicked(String),

    /// Work was submitted to a pool that has already been closed.
    #[error("task pool is closed")]
    PoolClosed,
}

impl Error {
    /// Create an argument error from any displayable value.
    ///
    /// # Examples
    ///
    /// ```
    /// use rle_result::Error;
    ///
    /// fn positive(span: i64) -> Result<i64, Error> {
    ///     if span <= 0 {
    ///         return Err(Error::invalid_argument(format!("span must be positive, got {span}")));
    ///     }
    ///     Ok(span)
    /// }
    ///
    /// assert!(matches!(positive(0), Err(Error::InvalidArgumentError(_))));
    /// ```
    #[inline]
    pub fn invalid_argument<E: fmt::Display>(err: E) -> Self {
        Error::InvalidArgumentError(err.to_string())
    }

    /// Create a state error from any displayable value.
    #[inline]
    pub fn internal<E: fmt::Display>(err: E) -> Self {
        Error::Internal(err.to_string())
    }

    /// Build a [`Error::TaskPanicked`] from a payload returned by
    /// `std::panic::catch_unwind`.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Error::TaskPanicked(message)
    }
}
