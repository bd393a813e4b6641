//! Store builders and checks.

use rand::Rng;
use rle_store::{Pos, RunValue, Store};

/// Build a store from `(length, value)` pairs. Adjacent equal values are
/// merged, so the result is compressed.
pub fn runs<V: RunValue>(runs: &[(Pos, V)]) -> Store<V> {
    let mut ends = Vec::with_capacity(runs.len());
    let mut vals: Vec<V> = Vec::with_capacity(runs.len());
    let mut end = 0;
    for &(len, value) in runs {
        assert!(len > 0, "run lengths must be positive, got {len}");
        end += len;
        if vals.last() == Some(&value) {
            *ends.last_mut().unwrap() = end;
        } else {
            ends.push(end);
            vals.push(value);
        }
    }
    Store::new(ends, vals).unwrap()
}

/// A store of exactly `span` positions with run lengths in `1..=max_run`
/// and values drawn from `values`.
pub fn random_store<V: RunValue, R: Rng>(rng: &mut R, span: Pos, max_run: Pos, values: &[V]) -> Store<V> {
    assert!(span > 0 && max_run > 0 && !values.is_empty());
    let mut pairs = Vec::new();
    let mut left = span;
    while left > 0 {
        let len = rng.random_range(1..=max_run).min(left);
        pairs.push((len, values[rng.random_range(0..values.len())]));
        left -= len;
    }
    runs(&pairs)
}

/// Panic unless run ends are positive and strictly increasing, the last
/// one equals the span, and no two neighbouring runs hold the same value.
#[track_caller]
pub fn assert_well_formed<V: RunValue>(store: &Store<V>) {
    let ends = store.ends();
    assert_eq!(ends.len(), store.vals().len(), "ends and values differ in length");
    assert!(!ends.is_empty(), "store has no runs");
    assert!(ends[0] > 0, "first run end {} is not positive", ends[0]);
    for (i, pair) in ends.windows(2).enumerate() {
        assert!(pair[0] < pair[1], "run ends {} and {} are not increasing at {i}", pair[0], pair[1]);
    }
    assert_eq!(ends[ends.len() - 1], store.span());
    for (i, pair) in store.vals().windows(2).enumerate() {
        assert!(pair[0] != pair[1], "runs {i} and {} both hold {:?}", i + 1, pair[0]);
    }
}
