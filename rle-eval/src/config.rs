use rle_store::Pos;

/// Steps longer than this are split into chunks when parallelism allows.
pub const DEFAULT_SPLIT_THRESHOLD: Pos = 32 * 1024;
/// Total output capacity above which steps are evaluated on the pool.
pub const DEFAULT_PARALLEL_EVAL_THRESHOLD: usize = 16 * 1024;
/// Total output capacity above which step outputs are compacted on the pool.
pub const DEFAULT_PARALLEL_COPY_THRESHOLD: usize = 16 * 1024;

/// Tuning knobs for plan execution.
///
/// Passed explicitly into [`crate::parallelize`] and [`crate::execute`];
/// there is no process-wide configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvalConfig {
    /// Number of chunks a long step is split into.
    pub parallelism: usize,
    pub split_threshold: Pos,
    pub parallel_eval_threshold: usize,
    pub parallel_copy_threshold: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            parallelism: rle_threading::default_parallelism(),
            split_threshold: DEFAULT_SPLIT_THRESHOLD,
            parallel_eval_threshold: DEFAULT_PARALLEL_EVAL_THRESHOLD,
            parallel_copy_threshold: DEFAULT_PARALLEL_COPY_THRESHOLD,
        }
    }
}

impl EvalConfig {
    /// Everything inline on the calling thread.
    pub fn sequential() -> Self {
        Self {
            parallelism: 1,
            ..Self::default()
        }
    }

    /// Clamped to at least one.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_split_threshold(mut self, threshold: Pos) -> Self {
        self.split_threshold = threshold;
        self
    }

    pub fn with_parallel_eval_threshold(mut self, threshold: usize) -> Self {
        self.parallel_eval_threshold = threshold;
        self
    }

    pub fn with_parallel_copy_threshold(mut self, threshold: usize) -> Self {
        self.parallel_copy_threshold = threshold;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_override_defaults() {
        let config = EvalConfig::default()
            .with_parallelism(0)
            .with_split_threshold(8)
            .with_parallel_eval_threshold(4)
            .with_parallel_copy_threshold(2);
        assert_eq!(config.parallelism, 1);
        assert_eq!(config.split_threshold, 8);
        assert_eq!(config.parallel_eval_threshold, 4);
        assert_eq!(config.parallel_copy_threshold, 2);
        assert!(EvalConfig::default().parallelism >= 1);
        assert_eq!(EvalConfig::sequential().parallelism, 1);
    }
}
