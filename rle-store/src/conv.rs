//! Dense and typed conversions.

use rle_result::{Error, Result};

use crate::store::{Pos, RunValue, Store, StoreWriter};
use crate::value::{Scalar, ScalarKind, ValueCell};

impl<V: RunValue> Store<V> {
    /// Run-length encode a dense slice.
    pub fn from_slice(values: &[V]) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::invalid_argument(
                "cannot build a store from an empty slice",
            ));
        }
        let mut writer = StoreWriter::new();
        let mut start = 0;
        for i in 1..=values.len() {
            if i == values.len() || values[i] != values[start] {
                writer.push_end(i as Pos, values[start])?;
                start = i;
            }
        }
        writer.finish()
    }

    /// Expand into one value per position.
    pub fn to_vec(&self) -> Vec<V> {
        let mut out = Vec::with_capacity(self.span() as usize);
        let mut prev = 0;
        for (end, val) in self.runs() {
            out.extend(std::iter::repeat_n(val, (end - prev) as usize));
            prev = end;
        }
        out
    }
}

impl<T: Scalar> Store<T> {
    /// Box every run value into a [`ValueCell`].
    pub fn to_cells(&self) -> Store<ValueCell> {
        Store::from_runs_unchecked(
            self.ends().to_vec(),
            self.vals().iter().map(|v| v.into_cell()).collect(),
        )
    }
}

impl Store<ValueCell> {
    /// Unbox every run value, failing on the first cell of another kind.
    pub fn to_typed<T: Scalar>(&self) -> Result<Store<T>> {
        let vals = self
            .vals()
            .iter()
            .map(|cell| cell.get::<T>())
            .collect::<Result<Vec<T>>>()?;
        Ok(Store::from_runs_unchecked(self.ends().to_vec(), vals))
    }

    /// Kind of the first run. Stores built through an expression graph hold
    /// a single kind.
    pub fn kind(&self) -> ScalarKind {
        self.vals()[0].kind()
    }
}
