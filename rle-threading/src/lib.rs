//! Worker pool for parallel evaluation.
//!
//! [`TaskPool`] runs closures on a fixed set of OS threads fed by a
//! multi-producer/multi-consumer queue. Every submission yields a
//! [`TaskHandle`] that carries the task's value, its error, or the message of
//! a panic back to the submitter. [`run_all`] is the phase barrier the
//! evaluator uses: it submits a batch and waits for every handle before
//! returning.
#![forbid(unsafe_code)]

mod pool;

pub use pool::{TaskHandle, TaskPool, run_all};

/// Worker count used when none is configured: the machine's available
/// parallelism, or 1 when it cannot be determined.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
