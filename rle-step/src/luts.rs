//! Lookup tables shared by every step function.
//!
//! Scaled, strided and fixed tables for small factors are computed once per
//! process and referenced by all compiled graphs, so building `stride_fn(2)`
//! a thousand times allocates no table memory.

use std::sync::{Arc, LazyLock};

use rle_store::Pos;

use crate::MAX_LUT_SIZE;

/// Largest factor with a shared table.
pub const SHARED_LUT_MAX_K: Pos = 8;

static SCALED_LUTS: LazyLock<Vec<Vec<Pos>>> = LazyLock::new(|| {
    (1..=SHARED_LUT_MAX_K)
        .map(|k| (0..MAX_LUT_SIZE).map(|i| (i + 1) * k).collect())
        .collect()
});

static STRIDED_LUTS: LazyLock<Vec<Vec<Pos>>> = LazyLock::new(|| {
    (1..=SHARED_LUT_MAX_K)
        .map(|k| (0..MAX_LUT_SIZE).map(|i| 1 + i / k).collect())
        .collect()
});

static FIXED_LUTS: LazyLock<Vec<Vec<Pos>>> =
    LazyLock::new(|| (0..=SHARED_LUT_MAX_K).map(|k| vec![k]).collect());

/// Table storage referenced by a table expression.
#[derive(Clone, Debug)]
pub enum Lut {
    Shared(&'static [Pos]),
    Owned(Arc<[Pos]>),
}

impl Lut {
    #[inline]
    pub fn as_slice(&self) -> &[Pos] {
        match self {
            Lut::Shared(values) => values,
            Lut::Owned(values) => values,
        }
    }

    #[inline]
    pub fn is_shared(&self) -> bool {
        matches!(self, Lut::Shared(_))
    }
}

/// `lut[i] = (i + 1) * k` for the first `len` entries.
pub fn scaled_lut(k: Pos, len: Pos) -> Lut {
    if (1..=SHARED_LUT_MAX_K).contains(&k) && len <= MAX_LUT_SIZE {
        return Lut::Shared(&SCALED_LUTS[(k - 1) as usize]);
    }
    Lut::Owned((0..len).map(|i| (i + 1) * k).collect())
}

/// `lut[i] = 1 + i / k` for the first `len` entries.
pub fn strided_lut(k: Pos, len: Pos) -> Lut {
    if (1..=SHARED_LUT_MAX_K).contains(&k) && len <= MAX_LUT_SIZE {
        return Lut::Shared(&STRIDED_LUTS[(k - 1) as usize]);
    }
    Lut::Owned((0..len).map(|i| 1 + i / k).collect())
}

/// Single-entry table holding `step`.
pub fn fixed_lut(step: Pos) -> Lut {
    if (0..=SHARED_LUT_MAX_K).contains(&step) {
        return Lut::Shared(&FIXED_LUTS[step as usize]);
    }
    Lut::Owned(Arc::from(vec![step]))
}
