//! Conversions between stores and Arrow arrays.
//!
//! Dense [`PrimitiveArray`]s are run-length encoded on the way in and
//! expanded on the way out. [`RunArray`]s map run-for-run, using `Int64`
//! run ends to match [`Pos`].

use arrow::array::{Array, AsArray, Int64Array, PrimitiveArray, RunArray};
use arrow::datatypes::{ArrowNativeType, ArrowPrimitiveType, Int64Type};
use rle_result::{Error, Result};

use crate::store::{Pos, RunValue, Store};

impl<V> Store<V>
where
    V: RunValue + ArrowNativeType,
{
    /// Encode a dense, null-free primitive array.
    pub fn from_primitive_array<A>(array: &PrimitiveArray<A>) -> Result<Self>
    where
        A: ArrowPrimitiveType<Native = V>,
    {
        if array.null_count() > 0 {
            return Err(Error::InvalidArgumentError(format!(
                "cannot encode {} nulls into a store",
                array.null_count()
            )));
        }
        Store::from_slice(array.values().as_ref())
    }

    /// Expand into a dense primitive array.
    pub fn to_primitive_array<A>(&self) -> PrimitiveArray<A>
    where
        A: ArrowPrimitiveType<Native = V>,
    {
        let mut prev = 0;
        let values = self.runs().flat_map(move |(end, val)| {
            let len = (end - prev) as usize;
            prev = end;
            std::iter::repeat_n(val, len)
        });
        PrimitiveArray::<A>::from_iter_values(values)
    }

    /// Share the run structure with Arrow's run-end encoding.
    pub fn to_run_array<A>(&self) -> Result<RunArray<Int64Type>>
    where
        A: ArrowPrimitiveType<Native = V>,
    {
        let run_ends = Int64Array::from(self.ends().to_vec());
        let values = PrimitiveArray::<A>::from_iter_values(self.vals().iter().copied());
        Ok(RunArray::<Int64Type>::try_new(&run_ends, &values)?)
    }

    /// Adopt the runs of an unsliced Arrow run array.
    pub fn from_run_array<A>(array: &RunArray<Int64Type>) -> Result<Self>
    where
        A: ArrowPrimitiveType<Native = V>,
    {
        let run_ends = array.run_ends();
        if run_ends.offset() != 0 {
            return Err(Error::invalid_argument(
                "sliced run arrays are not supported",
            ));
        }
        let ends: Vec<Pos> = run_ends.values().to_vec();
        let values = array.values().as_primitive_opt::<A>().ok_or_else(|| {
            Error::InvalidArgumentError(format!(
                "run array values are {}, expected {}",
                array.values().data_type(),
                A::DATA_TYPE
            ))
        })?;
        if values.null_count() > 0 {
            return Err(Error::invalid_argument(
                "cannot encode null run values into a store",
            ));
        }
        if values.len() < ends.len() {
            return Err(Error::InvalidArgumentError(format!(
                "run array has {} ends but only {} values",
                ends.len(),
                values.len()
            )));
        }
        let vals = values.values().as_ref()[..ends.len()].to_vec();
        Store::new(ends, vals)
    }
}
