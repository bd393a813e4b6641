//! Expression normalization.
//!
//! Two rewrites run in order before a plan is built:
//! - [`pull_stacks`] distributes slices, merges and applies over stack
//!   children until the only stack left is the root.
//! - [`push_slices`] composes chains of slices and moves them below merges
//!   and applies until every slice wraps a leaf store.
//!
//! Both passes add new nodes to the arena and never modify existing ones, so
//! the input expression stays valid. Both are idempotent: normalizing a
//! normalized expression returns the same node.

use std::sync::Arc;

use rle_result::{Error, Result};
use rle_store::Pos;
use rustc_hash::FxHashMap;

use crate::graph::{Graph, MergeFn, Op, OpId, SliceSpec};

/// Rewrite `root` into its canonical form: a stack of stack-free pieces in
/// which every slice wraps a leaf and every leaf sits under one slice.
///
/// Zero-length expressions have no pieces and are rejected.
pub fn normalize(graph: &mut Graph, root: OpId) -> Result<OpId> {
    let before = graph.num_nodes();
    let pulled = pull_stacks(graph, root)?;
    let pushed = push_slices(graph, pulled)?;
    tracing::debug!(
        root = %root,
        normalized = %pushed,
        reachable = graph.node_count(pushed)?,
        added = graph.num_nodes() - before,
        "normalized expression"
    );
    Ok(pushed)
}

/// First pass: return a stack whose children contain no stack.
pub fn pull_stacks(graph: &mut Graph, root: OpId) -> Result<OpId> {
    let mut pass = PullStacks::default();
    let pieces = pass.pieces(graph, root)?;
    if pieces.is_empty() {
        return Err(Error::invalid_argument(
            "cannot normalize a zero-length expression",
        ));
    }
    if let Op::Stack(children) = graph.op(root)? {
        if *children == pieces {
            return Ok(root);
        }
    }
    graph.stack(&pieces)
}

/// Second pass: push every slice down onto the leaves.
///
/// `root` must be the output of [`pull_stacks`] or a stack-free node.
pub fn push_slices(graph: &mut Graph, root: OpId) -> Result<OpId> {
    let mut pass = PushSlices::default();
    match graph.op(root)?.clone() {
        Op::Stack(children) => {
            let pushed = children
                .iter()
                .map(|&child| pass.push(graph, child, None))
                .collect::<Result<Vec<_>>>()?;
            if pushed == children {
                Ok(root)
            } else {
                graph.stack(&pushed)
            }
        }
        _ => pass.push(graph, root, None),
    }
}

/// `piece[start..stop:stride]`, or `piece` itself when that selects all of it.
fn sub_slice(graph: &mut Graph, piece: OpId, slice: SliceSpec) -> Result<OpId> {
    if slice.is_identity(graph.len(piece)?) {
        Ok(piece)
    } else {
        graph.slice(piece, slice.start, slice.stop, slice.stride)
    }
}

#[derive(Default)]
struct PullStacks {
    memo: FxHashMap<OpId, Vec<OpId>>,
}

impl PullStacks {
    /// The stack-free, non-empty pieces that concatenate to `id`.
    fn pieces(&mut self, graph: &mut Graph, id: OpId) -> Result<Vec<OpId>> {
        if let Some(pieces) = self.memo.get(&id) {
            return Ok(pieces.clone());
        }
        let pieces = if graph.len(id)? == 0 {
            Vec::new()
        } else {
            match graph.op(id)?.clone() {
                Op::Leaf(_) => vec![id],
                Op::Stack(children) => {
                    let mut pieces = Vec::with_capacity(children.len());
                    for child in children {
                        pieces.extend(self.pieces(graph, child)?);
                    }
                    pieces
                }
                Op::Apply { input, func } => {
                    let inner = self.pieces(graph, input)?;
                    if inner == [input] {
                        vec![id]
                    } else {
                        let kind = graph.kind(id)?;
                        inner
                            .into_iter()
                            .map(|piece| graph.push_apply(piece, kind, Arc::clone(&func)))
                            .collect::<Result<_>>()?
                    }
                }
                Op::Slice { input, slice } => self.slice_pieces(graph, id, input, slice)?,
                Op::Merge { inputs, func } => self.merge_pieces(graph, id, &inputs, func)?,
            }
        };
        self.memo.insert(id, pieces.clone());
        Ok(pieces)
    }

    /// Restrict the slice to each piece of its input, dropping pieces that
    /// hold no selected position.
    fn slice_pieces(
        &mut self,
        graph: &mut Graph,
        id: OpId,
        input: OpId,
        slice: SliceSpec,
    ) -> Result<Vec<OpId>> {
        let inner = self.pieces(graph, input)?;
        if inner == [input] {
            return Ok(vec![id]);
        }
        let mut pieces = Vec::new();
        let mut lo: Pos = 0;
        for piece in inner {
            let hi = lo + graph.len(piece)?;
            let stop = slice.stop.min(hi);
            let from = slice.start.max(lo);
            let first =
                slice.start + (from - slice.start + slice.stride - 1) / slice.stride * slice.stride;
            if first < stop {
                let last = first + (stop - first - 1) / slice.stride * slice.stride;
                let local = SliceSpec::new(first - lo, last + 1 - lo, slice.stride);
                pieces.push(sub_slice(graph, piece, local)?);
            }
            lo = hi;
        }
        Ok(pieces)
    }

    /// Split every operand at the union of all operands' seams and merge
    /// segment by segment.
    fn merge_pieces(
        &mut self,
        graph: &mut Graph,
        id: OpId,
        inputs: &[OpId],
        func: MergeFn,
    ) -> Result<Vec<OpId>> {
        let operand_pieces = inputs
            .iter()
            .map(|&input| self.pieces(graph, input))
            .collect::<Result<Vec<_>>>()?;
        if operand_pieces
            .iter()
            .zip(inputs)
            .all(|(pieces, &input)| *pieces == [input])
        {
            return Ok(vec![id]);
        }

        let mut seams = Vec::new();
        for pieces in &operand_pieces {
            let mut end = 0;
            for &piece in pieces {
                end += graph.len(piece)?;
                seams.push(end);
            }
        }
        seams.sort_unstable();
        seams.dedup();

        let kind = graph.kind(id)?;
        // Per operand: index of the piece covering `lo` and that piece's offset.
        let mut cursors = vec![(0usize, 0 as Pos); inputs.len()];
        let mut segments = Vec::with_capacity(seams.len());
        let mut lo: Pos = 0;
        for hi in seams {
            let mut operands = Vec::with_capacity(inputs.len());
            for (pieces, (index, offset)) in operand_pieces.iter().zip(cursors.iter_mut()) {
                let piece = loop {
                    let piece = *pieces.get(*index).ok_or_else(|| {
                        Error::Internal(format!("merge {id} ran out of operand pieces at {lo}"))
                    })?;
                    let len = graph.len(piece)?;
                    if *offset + len > lo {
                        break piece;
                    }
                    *offset += len;
                    *index += 1;
                };
                operands.push(sub_slice(
                    graph,
                    piece,
                    SliceSpec::new(lo - *offset, hi - *offset, 1),
                )?);
            }
            segments.push(graph.push_merge(&operands, kind, Arc::clone(&func))?);
            lo = hi;
        }
        Ok(segments)
    }
}

#[derive(Default)]
struct PushSlices {
    memo: FxHashMap<(OpId, Option<SliceSpec>), OpId>,
}

impl PushSlices {
    /// Rewrite `id`, selected through `slice` (`None` selects everything),
    /// into a tree whose slices all wrap leaves.
    fn push(&mut self, graph: &mut Graph, id: OpId, slice: Option<SliceSpec>) -> Result<OpId> {
        let len = graph.len(id)?;
        let slice = slice.filter(|slice| !slice.is_identity(len));
        if let Some(&done) = self.memo.get(&(id, slice)) {
            return Ok(done);
        }
        let pushed = match graph.op(id)?.clone() {
            Op::Leaf(_) => {
                let slice = slice.unwrap_or(SliceSpec::full(len));
                graph.slice(id, slice.start, slice.stop, slice.stride)?
            }
            Op::Slice { input, slice: inner } => {
                let combined = match slice {
                    Some(outer) => inner.then(outer),
                    None => inner,
                };
                if slice.is_none() && matches!(graph.op(input)?, Op::Leaf(_)) {
                    id
                } else {
                    self.push(graph, input, Some(combined))?
                }
            }
            Op::Apply { input, func } => {
                let pushed = self.push(graph, input, slice)?;
                if pushed == input {
                    id
                } else {
                    let kind = graph.kind(id)?;
                    graph.push_apply(pushed, kind, func)?
                }
            }
            Op::Merge { inputs, func } => {
                let pushed = inputs
                    .iter()
                    .map(|&input| self.push(graph, input, slice))
                    .collect::<Result<Vec<_>>>()?;
                if pushed == inputs {
                    id
                } else {
                    let kind = graph.kind(id)?;
                    graph.push_merge(&pushed, kind, func)?
                }
            }
            Op::Stack(_) => {
                return Err(Error::Internal(format!(
                    "stack {id} found below the top level while pushing slices"
                )));
            }
        };
        self.memo.insert((id, slice), pushed);
        Ok(pushed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rle_store::{Store, ValueCell};

    fn chars(graph: &mut Graph, text: &str) -> OpId {
        let values: Vec<char> = text.chars().collect();
        graph.leaf_from(&Store::from_slice(&values).unwrap()).unwrap()
    }

    #[test]
    fn slice_over_nested_stacks() {
        let mut graph = Graph::new();
        let x = chars(&mut graph, "aaaaa");
        let b = chars(&mut graph, "b");
        let head = graph.slice(x, 0, 2, 1).unwrap();
        let inner = graph.stack(&[head, b]).unwrap();
        let tail = graph.slice(x, 3, 5, 1).unwrap();
        let outer = graph.stack(&[inner, tail]).unwrap();
        let root = graph.slice(outer, 2, 4, 1).unwrap();

        let normalized = normalize(&mut graph, root).unwrap();
        assert_eq!(
            graph.display(normalized).unwrap(),
            "stack(slice(store(1=>b), 0:1:1), slice(store(5=>a), 3:4:1))"
        );
        assert_eq!(graph.len(normalized).unwrap(), 2);
    }

    #[test]
    fn normalization_is_idempotent() {
        let mut graph = Graph::new();
        let x = chars(&mut graph, "abcdef");
        let y = chars(&mut graph, "uvw");
        let stacked = graph.stack(&[x, y]).unwrap();
        let root = graph.slice(stacked, 1, 9, 2).unwrap();
        let once = normalize(&mut graph, root).unwrap();
        let nodes = graph.num_nodes();
        let twice = normalize(&mut graph, once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(graph.num_nodes(), nodes);
    }

    #[test]
    fn strided_slice_skips_pieces_without_selected_positions() {
        let mut graph = Graph::new();
        let a = chars(&mut graph, "aaaa");
        let b = chars(&mut graph, "b");
        let c = chars(&mut graph, "ccccc");
        let stacked = graph.stack(&[a, b, c]).unwrap();
        // Selects 1, 4, 7: a, b, c.
        let root = graph.slice(stacked, 1, 10, 3).unwrap();
        let normalized = normalize(&mut graph, root).unwrap();
        assert_eq!(
            graph.display(normalized).unwrap(),
            "stack(slice(store(4=>a), 1:2:3), slice(store(1=>b), 0:1:1), slice(store(5=>c), 2:3:3))"
        );

        // Selects 0 and 5: a and c; b is skipped.
        let root = graph.slice(stacked, 0, 10, 5).unwrap();
        let normalized = normalize(&mut graph, root).unwrap();
        assert_eq!(
            graph.display(normalized).unwrap(),
            "stack(slice(store(4=>a), 0:1:5), slice(store(5=>c), 0:1:5))"
        );
    }

    #[test]
    fn merges_split_at_every_seam() {
        let mut graph = Graph::new();
        let l1 = graph.leaf_from(&Store::from_slice(&[1_i32, 1]).unwrap()).unwrap();
        let l2 = graph.leaf_from(&Store::from_slice(&[2_i32, 2, 2]).unwrap()).unwrap();
        let r1 = graph.leaf_from(&Store::from_slice(&[3_i32, 3, 3, 3]).unwrap()).unwrap();
        let r2 = graph.leaf_from(&Store::from_slice(&[4_i32]).unwrap()).unwrap();
        let lhs = graph.stack(&[l1, l2]).unwrap();
        let rhs = graph.stack(&[r1, r2]).unwrap();
        let sum = graph.merge2(lhs, rhs, |a: i32, b: i32| a + b).unwrap();

        let normalized = normalize(&mut graph, sum).unwrap();
        assert_eq!(
            graph.display(normalized).unwrap(),
            "stack(\
             merge(slice(store(2=>1), 0:2:1), slice(store(4=>3), 0:2:1)), \
             merge(slice(store(3=>2), 0:2:1), slice(store(4=>3), 2:4:1)), \
             merge(slice(store(3=>2), 2:3:1), slice(store(1=>4), 0:1:1)))"
        );
    }

    #[test]
    fn slices_compose_through_merges_and_applies() {
        let mut graph = Graph::new();
        let x = graph
            .leaf_from(&Store::from_slice(&[0_i32, 1, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap())
            .unwrap();
        let evens = graph.slice(x, 0, 10, 2).unwrap();
        let doubled = graph.map(evens, |v: i32| v * 2).unwrap();
        let sum = graph.merge2(doubled, evens, |a: i32, b: i32| a + b).unwrap();
        let root = graph.slice(sum, 1, 5, 2).unwrap();

        let normalized = normalize(&mut graph, root).unwrap();
        assert_eq!(
            graph.display(normalized).unwrap(),
            "stack(merge(apply(slice(store(1=>0, 2=>1, 3=>2, 4=>3, 5=>4, 6=>5, 7=>6, 8=>7, 9=>8, 10=>9), 2:7:4)), \
             slice(store(1=>0, 2=>1, 3=>2, 4=>3, 5=>4, 6=>5, 7=>6, 8=>7, 9=>8, 10=>9), 2:7:4)))"
        );
    }

    #[test]
    fn identity_slices_collapse_onto_the_leaf_window() {
        let mut graph = Graph::new();
        let x = chars(&mut graph, "abc");
        let full = graph.slice(x, 0, 3, 1).unwrap();
        let again = graph.slice(full, 0, 3, 1).unwrap();
        let normalized = normalize(&mut graph, again).unwrap();
        assert_eq!(
            graph.display(normalized).unwrap(),
            "stack(slice(store(1=>a, 2=>b, 3=>c), 0:3:1))"
        );
    }

    #[test]
    fn zero_length_pieces_are_dropped() {
        let mut graph = Graph::new();
        let x = chars(&mut graph, "abc");
        let empty = graph.slice(x, 2, 2, 1).unwrap();
        let stacked = graph.stack(&[empty, x, empty]).unwrap();
        let normalized = normalize(&mut graph, stacked).unwrap();
        assert_eq!(
            graph.display(normalized).unwrap(),
            "stack(slice(store(1=>a, 2=>b, 3=>c), 0:3:1))"
        );

        let only_empty = graph.stack(&[empty]).unwrap();
        assert!(matches!(
            normalize(&mut graph, only_empty),
            Err(Error::InvalidArgumentError(_))
        ));
    }

    #[test]
    fn stack_below_the_top_is_a_state_error() {
        let mut graph = Graph::new();
        let x = chars(&mut graph, "ab");
        let stacked = graph.stack(&[x, x]).unwrap();
        let wrapped = graph
            .apply(stacked, rle_store::ScalarKind::Char, Arc::new(|v: ValueCell| v))
            .unwrap();
        assert!(matches!(
            push_slices(&mut graph, wrapped),
            Err(Error::Internal(_))
        ));
    }
}
