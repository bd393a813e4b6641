//! K-way merge of run-length sources.
//!
//! Every source walks its store's runs through a step function and reports
//! the output position where its current value stops holding. A tournament
//! tree keyed by `(end, source)` yields the nearest such end; the combining
//! function is evaluated once per distinct end, so the cost is proportional
//! to the total number of runs rather than the output span.
//!
//! With many sources, runs tend to end together (stacked copies of one
//! store, masks built from the same grid). A small open table keyed by end
//! parks every source after the first that reaches an already claimed end;
//! parked sources sit out of the tree and advance in one sweep when their
//! end is popped. The table is best effort: a slot held by another end
//! sends the source through the tree as usual.

use std::sync::Arc;

use rle_result::{Error, Result};
use rle_step::{Composite, CompositeCursor, MAX_SPAN};
use rle_store::{Pos, RunValue, Store};
use smallvec::SmallVec;

/// Source count at which the end table is used.
pub const HASH_MIN_SOURCES: usize = 4;

const INF: u64 = u64::MAX;
const EMPTY: Pos = -1;

/// A window `[start, stop)` of a store, remapped through `step`.
///
/// The store run ending at `e` ends at `step(min(e, stop)) - step(start)` in
/// the output, so the output span is `step(stop) - step(start)`.
#[derive(Clone, Debug)]
pub struct Source<V> {
    pub store: Arc<Store<V>>,
    pub step: Composite,
    pub start: Pos,
    pub stop: Pos,
}

impl<V: RunValue> Source<V> {
    pub fn new(store: Arc<Store<V>>, step: Composite, start: Pos, stop: Pos) -> Self {
        Self {
            store,
            step,
            start,
            stop,
        }
    }

    /// The whole store through the identity.
    pub fn full(store: Arc<Store<V>>) -> Self {
        let stop = store.span();
        Self::new(store, Composite::default(), 0, stop)
    }

    /// Output span `step(stop) - step(start)`.
    pub fn span(&self) -> Pos {
        let mut cursor = self.step.cursor();
        let base = cursor.at(self.start);
        cursor.at(self.stop) - base
    }

    /// Number of store runs intersecting the window.
    pub fn num_runs(&self) -> usize {
        if self.start >= self.stop {
            return 0;
        }
        self.store.index(self.stop - 1) - self.store.index(self.start) + 1
    }

    fn check_window(&self, index: usize) -> Result<()> {
        if self.start < 0 || self.start >= self.stop || self.stop > self.store.span() {
            return Err(Error::InvalidArgumentError(format!(
                "source {index}: window {}..{} is outside a store of span {}",
                self.start,
                self.stop,
                self.store.span()
            )));
        }
        Ok(())
    }
}

/// Validate a source list and return the common output span.
pub fn check_sources<V: RunValue>(sources: &[Source<V>]) -> Result<Pos> {
    let Some(first) = sources.first() else {
        return Err(Error::InvalidArgumentError(
            "merge needs at least one source".into(),
        ));
    };
    first.check_window(0)?;
    let span = first.span();
    if span <= 0 || span > MAX_SPAN {
        return Err(Error::InvalidArgumentError(format!(
            "source 0: output span {span} is outside 1..={MAX_SPAN}"
        )));
    }
    for (index, source) in sources.iter().enumerate().skip(1) {
        source.check_window(index)?;
        let other = source.span();
        if other != span {
            return Err(Error::InvalidArgumentError(format!(
                "source {index} spans {other}, expected {span}"
            )));
        }
    }
    Ok(span)
}

/// Upper bound on the runs a merge emits: `1 + Σ(runs_i - 1)`.
pub fn capacity<V: RunValue>(sources: &[Source<V>]) -> usize {
    1 + sources
        .iter()
        .map(|source| source.num_runs().saturating_sub(1))
        .sum::<usize>()
}

/// Merge `sources` into one compressed store.
///
/// `func` receives the current value of every source, in source order, once
/// per distinct run end.
pub fn merge<V, O, F>(sources: &[Source<V>], func: F) -> Result<Store<O>>
where
    V: RunValue,
    O: RunValue,
    F: FnMut(&[V]) -> O,
{
    let (ends, vals) = merge_runs(sources, func)?;
    Ok(Store::from_runs_unchecked(ends, vals))
}

pub(crate) fn merge_runs<V, O, F>(sources: &[Source<V>], func: F) -> Result<(Vec<Pos>, Vec<O>)>
where
    V: RunValue,
    O: RunValue,
    F: FnMut(&[V]) -> O,
{
    let span = check_sources(sources)?;
    let capacity = capacity(sources);
    let (mut ends, mut vals) = Merger::new(sources).run(func, capacity);
    if ends.last() != Some(&span) {
        return Err(Error::Internal(format!(
            "merge stopped at {:?}, expected {span}",
            ends.last()
        )));
    }
    ends.shrink_to_fit();
    vals.shrink_to_fit();
    Ok((ends, vals))
}

/// Append a run, extending the last one when the value repeats.
#[inline]
pub(crate) fn push_run<O: PartialEq>(ends: &mut Vec<Pos>, vals: &mut Vec<O>, end: Pos, value: O) {
    if vals.last() == Some(&value) {
        if let Some(last) = ends.last_mut() {
            *last = end;
        }
        return;
    }
    ends.push(end);
    vals.push(value);
}

#[inline]
fn pack(end: Pos, source: usize) -> u64 {
    ((end as u64) << 32) | source as u64
}

struct Cursor<'a, V> {
    ends: &'a [Pos],
    vals: &'a [V],
    step: CompositeCursor<'a>,
    base: Pos,
    stop: Pos,
    span: Pos,
    run: usize,
    // Output end of the current run, 0 before the first.
    end: Pos,
}

impl<'a, V: RunValue> Cursor<'a, V> {
    fn new(source: &'a Source<V>) -> Self {
        let mut step = source.step.cursor();
        let base = step.at(source.start);
        let span = step.at(source.stop) - base;
        Self {
            ends: source.store.ends(),
            vals: source.store.vals(),
            step,
            base,
            stop: source.stop,
            span,
            run: source.store.index(source.start),
            end: 0,
        }
    }

    /// Settle on the first run at or after `self.run` that ends past the
    /// current output end. Runs the step function maps to nothing are
    /// skipped.
    fn seek(&mut self) -> Option<Pos> {
        while self.end < self.span {
            let end = self.step.at(self.ends[self.run].min(self.stop)) - self.base;
            if end > self.end {
                self.end = end;
                return Some(end);
            }
            self.run += 1;
        }
        None
    }

    #[inline]
    fn value(&self) -> V {
        self.vals[self.run]
    }
}

struct Slot {
    key: Pos,
    members: SmallVec<[u32; 8]>,
}

struct Merger<'a, V> {
    cursors: SmallVec<[Cursor<'a, V>; 8]>,
    values: SmallVec<[V; 8]>,
    // 1-based heap layout; leaves start at `leaves`.
    tree: Vec<u64>,
    leaves: usize,
    slots: Vec<Slot>,
    mask: usize,
}

impl<'a, V: RunValue> Merger<'a, V> {
    fn new(sources: &'a [Source<V>]) -> Self {
        let k = sources.len();
        let leaves = k.next_power_of_two();
        let table = if k >= HASH_MIN_SOURCES {
            (4 * k).next_power_of_two()
        } else {
            0
        };
        let mut merger = Self {
            cursors: sources.iter().map(Cursor::new).collect(),
            values: SmallVec::from_elem(V::default(), k),
            tree: vec![INF; 2 * leaves],
            leaves,
            slots: (0..table)
                .map(|_| Slot {
                    key: EMPTY,
                    members: SmallVec::new(),
                })
                .collect(),
            mask: table.saturating_sub(1),
        };
        for source in 0..k {
            merger.seek(source);
        }
        merger
    }

    fn run<O, F>(mut self, mut func: F, capacity: usize) -> (Vec<Pos>, Vec<O>)
    where
        O: RunValue,
        F: FnMut(&[V]) -> O,
    {
        let mut ends = Vec::with_capacity(capacity);
        let mut vals = Vec::with_capacity(capacity);
        let mut prev = 0;
        loop {
            let top = self.tree[1];
            if top == INF {
                break;
            }
            let end = (top >> 32) as Pos;
            let source = (top & 0xffff_ffff) as usize;
            if end != prev {
                push_run(&mut ends, &mut vals, end, func(self.values.as_slice()));
                prev = end;
            }
            self.release(end);
            self.advance(source);
        }
        (ends, vals)
    }

    fn advance(&mut self, source: usize) {
        self.cursors[source].run += 1;
        self.seek(source);
    }

    fn seek(&mut self, source: usize) {
        let cursor = &mut self.cursors[source];
        match cursor.seek() {
            Some(end) => {
                self.values[source] = cursor.value();
                self.schedule(source, end);
            }
            None => self.update(source, INF),
        }
    }

    fn schedule(&mut self, source: usize, end: Pos) {
        if !self.slots.is_empty() {
            let slot = &mut self.slots[end as usize & self.mask];
            if slot.key == end {
                slot.members.push(source as u32);
                self.update(source, INF);
                return;
            }
            if slot.key == EMPTY {
                slot.key = end;
            }
        }
        self.update(source, pack(end, source));
    }

    /// Advance every source parked on `end`.
    fn release(&mut self, end: Pos) {
        if self.slots.is_empty() {
            return;
        }
        let slot = &mut self.slots[end as usize & self.mask];
        if slot.key != end {
            return;
        }
        slot.key = EMPTY;
        let members = std::mem::take(&mut slot.members);
        for &member in &members {
            self.advance(member as usize);
        }
    }

    fn update(&mut self, source: usize, key: u64) {
        let mut node = self.leaves + source;
        self.tree[node] = key;
        while node > 1 {
            node >>= 1;
            self.tree[node] = self.tree[2 * node].min(self.tree[2 * node + 1]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rle_step::{scale_fn, stride_fn};

    fn full<V: RunValue>(values: &[V]) -> Source<V> {
        Source::full(Arc::new(Store::from_slice(values).unwrap()))
    }

    #[test]
    fn products_per_position() {
        let out = merge(&[full(&[1_i32, 2, 3]), full(&[4_i32, 5, 6])], |v: &[i32]| {
            v[0] * v[1]
        })
        .unwrap();
        assert_eq!(out.to_string(), "1=>4, 2=>10, 3=>18");
    }

    #[test]
    fn equal_neighbours_fold() {
        let two = Source::full(Arc::new(Store::filled(10, 2_i32).unwrap()));
        let three = Source::full(Arc::new(Store::filled(10, 3_i32).unwrap()));
        let out = merge(&[two, three], |v: &[i32]| v[0] * v[1]).unwrap();
        assert_eq!(out.to_string(), "10=>6");

        let a = full(&[1_i32, 1, 2, 2, 3]);
        let b = full(&[5_i32, 5, 4, 4, 3]);
        let out = merge(&[a, b], |v: &[i32]| v[0] + v[1]).unwrap();
        assert_eq!(out.to_string(), "5=>6");
        assert_eq!(out.num_runs(), 1);
    }

    #[test]
    fn identity_source_reproduces_store() {
        let store = Arc::new(Store::new(vec![3, 4, 9, 12], vec!['a', 'b', 'a', 'c']).unwrap());
        let out = merge(&[Source::full(Arc::clone(&store))], |v: &[char]| v[0]).unwrap();
        assert_eq!(&out, store.as_ref());
    }

    #[test]
    fn strided_window_skips_unselected_runs() {
        let store = Arc::new(Store::new(vec![4, 8, 12], vec!['a', 'b', 'c']).unwrap());
        let step = Composite::from(stride_fn(3).unwrap().slice(1, 12).unwrap());
        let source = Source::new(Arc::clone(&store), step, 1, 12);
        assert_eq!(source.span(), 4);
        let out = merge(&[source], |v: &[char]| v[0]).unwrap();
        assert_eq!(out.to_string(), "1=>a, 3=>b, 4=>c");

        // Window [5, 7) with stride 3 selects only position 5.
        let step = Composite::from(stride_fn(3).unwrap().slice(5, 7).unwrap());
        let out = merge(&[Source::new(store, step, 5, 7)], |v: &[char]| v[0]).unwrap();
        assert_eq!(out.to_string(), "1=>b");
    }

    #[test]
    fn scaled_sources_stretch_runs() {
        let store = Arc::new(Store::new(vec![2, 3], vec![7_u8, 9]).unwrap());
        let wide = Source::new(store, Composite::from(scale_fn(2).unwrap()), 0, 3);
        let narrow = full(&[1_u8, 1, 1, 2, 2, 2]);
        assert_eq!(wide.span(), 6);
        let out = merge(&[wide, narrow], |v: &[u8]| v[0] + v[1]).unwrap();
        assert_eq!(out.to_string(), "3=>8, 4=>9, 6=>11");

        let short = full(&[1_u8, 2]);
        let store = Arc::new(Store::filled(3, 4_u8).unwrap());
        let wide = Source::new(store, Composite::from(scale_fn(2).unwrap()), 0, 3);
        assert!(matches!(
            merge(&[wide, short], |v: &[u8]| v[0]),
            Err(Error::InvalidArgumentError(_))
        ));
    }

    #[test]
    fn weave_through_a_mixed_mask() {
        use rle_store::ValueCell;

        let cells = |values: &[char]| Arc::new(Store::from_slice(values).unwrap().to_cells());
        let twice = || Composite::from(scale_fn(2).unwrap());
        let mask = Store::from_slice(&[0_i32, 1, 0, 1, 0, 1]).unwrap().to_cells();
        let sources = [
            Source::full(Arc::new(mask)),
            Source::new(cells(&['a', 'c', 'e']), twice(), 0, 3),
            Source::new(cells(&['b', 'd', 'f']), twice(), 0, 3),
        ];
        let out = merge(&sources, |v: &[ValueCell]| {
            if v[0].is_truthy() { v[2] } else { v[1] }
        })
        .unwrap();
        assert_eq!(
            out.to_typed::<char>().unwrap().to_string(),
            "1=>a, 2=>b, 3=>c, 4=>d, 5=>e, 6=>f"
        );
    }

    #[test]
    fn shared_ends_park_in_the_table() {
        let base = Arc::new(Store::new(vec![2, 5, 6, 10], vec![1_i32, 2, 3, 4]).unwrap());
        let other = Arc::new(Store::new(vec![5, 7, 10], vec![10_i32, 20, 30]).unwrap());
        let mut sources: Vec<Source<i32>> = (0..6).map(|_| Source::full(Arc::clone(&base))).collect();
        sources.push(Source::full(Arc::clone(&other)));
        sources.push(Source::full(other));
        assert!(sources.len() >= HASH_MIN_SOURCES);

        let out = merge(&sources, |v: &[i32]| v.iter().sum::<i32>()).unwrap();
        let expected: Vec<i32> = (0..10)
            .map(|pos| {
                let b = base.get(pos).unwrap();
                let o = match pos {
                    0..5 => 10,
                    5..7 => 20,
                    _ => 30,
                };
                6 * b + 2 * o
            })
            .collect();
        assert_eq!(out.to_vec(), expected);
        assert!(out.is_compressed());
        assert_eq!(out.ends(), [2, 5, 6, 7, 10]);
    }

    #[test]
    fn capacity_counts_intersecting_runs() {
        let store = Arc::new(Store::new(vec![3, 6, 9], vec![1_u8, 2, 3]).unwrap());
        let window = Source::new(Arc::clone(&store), Composite::default(), 2, 7);
        assert_eq!(window.num_runs(), 3);
        assert_eq!(window.span(), 5);
        let inner = Source::new(store, Composite::default(), 3, 6);
        assert_eq!(capacity(&[window, inner]), 1 + 2);
    }

    #[test]
    fn invalid_source_lists_are_rejected() {
        let none: [Source<i32>; 0] = [];
        assert!(matches!(
            merge(&none, |v: &[i32]| v[0]),
            Err(Error::InvalidArgumentError(_))
        ));

        let store = Arc::new(Store::filled(5, 1_i32).unwrap());
        let outside = Source::new(Arc::clone(&store), Composite::default(), 2, 8);
        assert!(matches!(
            merge(&[outside], |v: &[i32]| v[0]),
            Err(Error::InvalidArgumentError(_))
        ));
        let empty = Source::new(Arc::clone(&store), Composite::default(), 3, 3);
        assert!(matches!(
            merge(&[empty], |v: &[i32]| v[0]),
            Err(Error::InvalidArgumentError(_))
        ));

        let long = Source::full(Arc::clone(&store));
        let short = Source::new(store, Composite::default(), 0, 4);
        let err = merge(&[long, short], |v: &[i32]| v[0]).unwrap_err();
        assert!(err.to_string().contains("source 1 spans 4, expected 5"), "{err}");
    }
}
