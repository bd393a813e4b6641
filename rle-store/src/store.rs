//! The run-length container.

use std::fmt;

use rle_result::{Error, Result};

/// Logical position inside a store or a step-function domain.
pub type Pos = i64;

/// Values that can be held in a run.
///
/// Blanket-implemented; it only bundles the bounds the evaluator needs to
/// compare, copy, prefill and share values across worker threads.
pub trait RunValue: Copy + PartialEq + Default + fmt::Debug + Send + Sync + 'static {}

impl<T> RunValue for T where T: Copy + PartialEq + Default + fmt::Debug + Send + Sync + 'static {}

/// An ordered sequence of runs `(end_i, value_i)`.
///
/// Position `p` in `[0, span)` holds `vals[i]` for the smallest `i` with
/// `ends[i] > p`. Run ends are strictly increasing and the last end equals
/// the span, so a store is never empty.
///
/// Stores are immutable once built and are shared between expressions and
/// worker threads behind an `Arc`.
#[derive(Clone, Debug, PartialEq)]
pub struct Store<V> {
    ends: Vec<Pos>,
    vals: Vec<V>,
}

impl<V: RunValue> Store<V> {
    /// Build a store from parallel run-end and value vectors.
    pub fn new(ends: Vec<Pos>, vals: Vec<V>) -> Result<Self> {
        if ends.len() != vals.len() {
            return Err(Error::InvalidArgumentError(format!(
                "store has {} run ends but {} values",
                ends.len(),
                vals.len()
            )));
        }
        let Some(&first) = ends.first() else {
            return Err(Error::invalid_argument("store must hold at least one run"));
        };
        if first <= 0 {
            return Err(Error::InvalidArgumentError(format!(
                "store span must be positive, first run ends at {first}"
            )));
        }
        if let Some(w) = ends.windows(2).find(|w| w[0] >= w[1]) {
            return Err(Error::InvalidArgumentError(format!(
                "run ends must be strictly increasing, found {} then {}",
                w[0], w[1]
            )));
        }
        Ok(Self { ends, vals })
    }

    /// A store of `span` positions all holding `value`.
    pub fn filled(span: Pos, value: V) -> Result<Self> {
        if span <= 0 {
            return Err(Error::InvalidArgumentError(format!(
                "store span must be positive, got {span}"
            )));
        }
        Ok(Self {
            ends: vec![span],
            vals: vec![value],
        })
    }

    /// Adopt run buffers produced by the evaluator.
    ///
    /// The caller guarantees the store invariants; they are only re-checked
    /// in debug builds.
    pub fn from_runs_unchecked(ends: Vec<Pos>, vals: Vec<V>) -> Self {
        debug_assert_eq!(ends.len(), vals.len());
        debug_assert!(!ends.is_empty());
        debug_assert!(ends[0] > 0);
        debug_assert!(ends.windows(2).all(|w| w[0] < w[1]));
        Self { ends, vals }
    }

    /// Total logical length.
    #[inline]
    pub fn span(&self) -> Pos {
        self.ends[self.ends.len() - 1]
    }

    /// Number of runs.
    #[inline]
    pub fn num_runs(&self) -> usize {
        self.ends.len()
    }

    /// Index of the run covering `pos`.
    ///
    /// Only meaningful for `pos` in `[0, span)`; callers must guard.
    #[inline]
    pub fn index(&self, pos: Pos) -> usize {
        self.ends.partition_point(|&end| end <= pos)
    }

    /// Value at `pos`, or an argument error outside `[0, span)`.
    pub fn get(&self, pos: Pos) -> Result<V> {
        if pos < 0 || pos >= self.span() {
            return Err(Error::InvalidArgumentError(format!(
                "position {pos} outside store span {}",
                self.span()
            )));
        }
        Ok(self.vals[self.index(pos)])
    }

    #[inline]
    pub fn ends(&self) -> &[Pos] {
        &self.ends
    }

    #[inline]
    pub fn vals(&self) -> &[V] {
        &self.vals
    }

    /// Iterate `(end, value)` pairs in order.
    pub fn runs(&self) -> impl Iterator<Item = (Pos, V)> + '_ {
        self.ends.iter().copied().zip(self.vals.iter().copied())
    }

    /// True when no two adjacent runs hold equal values.
    pub fn is_compressed(&self) -> bool {
        self.vals.windows(2).all(|w| w[0] != w[1])
    }

    pub fn into_parts(self) -> (Vec<Pos>, Vec<V>) {
        (self.ends, self.vals)
    }
}

impl<V: fmt::Display> fmt::Display for Store<V> {
    /// Debug dump in the form `end=>value, end=>value`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (end, val)) in self.ends.iter().zip(&self.vals).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{end}=>{val}")?;
        }
        Ok(())
    }
}

/// Append-only producer of stores.
///
/// Consecutive runs holding equal values are folded together, so the
/// finished store is maximally compressed.
#[derive(Debug, Default)]
pub struct StoreWriter<V> {
    ends: Vec<Pos>,
    vals: Vec<V>,
}

impl<V: RunValue> StoreWriter<V> {
    pub fn new() -> Self {
        Self {
            ends: Vec::new(),
            vals: Vec::new(),
        }
    }

    pub fn with_capacity(runs: usize) -> Self {
        Self {
            ends: Vec::with_capacity(runs),
            vals: Vec::with_capacity(runs),
        }
    }

    /// Span written so far.
    #[inline]
    pub fn span(&self) -> Pos {
        self.ends.last().copied().unwrap_or(0)
    }

    /// Append `len` positions holding `value`. Zero-length runs are ignored.
    pub fn push_run(&mut self, len: Pos, value: V) -> Result<()> {
        if len < 0 {
            return Err(Error::InvalidArgumentError(format!(
                "run length must be non-negative, got {len}"
            )));
        }
        if len == 0 {
            return Ok(());
        }
        let end = self.span() + len;
        self.append(end, value);
        Ok(())
    }

    /// Append a run that ends at `end`.
    pub fn push_end(&mut self, end: Pos, value: V) -> Result<()> {
        if end <= self.span() {
            return Err(Error::InvalidArgumentError(format!(
                "run end {end} does not extend span {}",
                self.span()
            )));
        }
        self.append(end, value);
        Ok(())
    }

    #[inline]
    fn append(&mut self, end: Pos, value: V) {
        match (self.ends.last_mut(), self.vals.last()) {
            (Some(last_end), Some(last_val)) if *last_val == value => *last_end = end,
            _ => {
                self.ends.push(end);
                self.vals.push(value);
            }
        }
    }

    pub fn finish(self) -> Result<Store<V>> {
        Store::new(self.ends, self.vals)
    }
}
