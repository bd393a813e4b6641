use rle_store::Pos;

use crate::func::{StepCursor, StepFn};

/// A chain of step functions applied in order.
///
/// `Composite::new(vec![f1, f2, f3])` evaluates `f3(f2(f1(pos)))`. The empty
/// chain is the identity. Composing non-decreasing functions keeps the
/// result non-decreasing, so `span(f ∘ g) = f(g(stop)) - f(g(start))`.
#[derive(Clone, Debug, Default)]
pub struct Composite {
    fns: Vec<StepFn>,
}

impl Composite {
    pub fn new(fns: Vec<StepFn>) -> Self {
        Self { fns }
    }

    /// Apply `f` after the current chain.
    pub fn then(mut self, f: StepFn) -> Self {
        self.fns.push(f);
        self
    }

    pub fn fns(&self) -> &[StepFn] {
        &self.fns
    }

    pub fn cursor(&self) -> CompositeCursor<'_> {
        CompositeCursor {
            cursors: self.fns.iter().map(StepFn::cursor).collect(),
        }
    }

    pub fn at(&self, pos: Pos) -> Pos {
        self.cursor().at(pos)
    }
}

impl From<StepFn> for Composite {
    fn from(f: StepFn) -> Self {
        Self { fns: vec![f] }
    }
}

/// `f ∘ g`: `g` is applied first.
pub fn compose(f: &Composite, g: &Composite) -> Composite {
    let mut fns = Vec::with_capacity(f.fns.len() + g.fns.len());
    fns.extend(g.fns.iter().cloned());
    fns.extend(f.fns.iter().cloned());
    Composite { fns }
}

/// One cursor per function in the chain.
#[derive(Debug)]
pub struct CompositeCursor<'a> {
    cursors: Vec<StepCursor<'a>>,
}

impl CompositeCursor<'_> {
    #[inline]
    pub fn at(&mut self, pos: Pos) -> Pos {
        self.cursors.iter_mut().fold(pos, |pos, cursor| cursor.at(pos))
    }
}
