//! Tagged scalar cell used on the type-erased evaluation path.
//!
//! Expressions that combine stores of different scalar kinds (a boolean mask
//! selecting between two character stores, say) are evaluated over
//! [`ValueCell`] values so the merge evaluator is written once. Reading a
//! cell back as a concrete type is checked: asking for the wrong kind is an
//! error, never a reinterpretation of bits.

use std::fmt;

use rle_result::{Error, Result};

use crate::store::RunValue;

/// Closed set of scalar kinds a [`ValueCell`] can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Char,
    I8,
    I16,
    I32,
    U8,
    U16,
    U32,
    F32,
}

impl ScalarKind {
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Char => "char",
            ScalarKind::I8 => "i8",
            ScalarKind::I16 => "i16",
            ScalarKind::I32 => "i32",
            ScalarKind::U8 => "u8",
            ScalarKind::U16 => "u16",
            ScalarKind::U32 => "u32",
            ScalarKind::F32 => "f32",
        }
    }

    /// Kinds that support arithmetic.
    #[inline]
    pub fn is_numeric(self) -> bool {
        !matches!(self, ScalarKind::Bool | ScalarKind::Char)
    }

    #[inline]
    pub fn is_integer(self) -> bool {
        self.is_numeric() && self != ScalarKind::F32
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A scalar of one of the [`ScalarKind`]s.
///
/// Equality compares the kind and then the bit pattern, so two `F32` cells
/// holding the same NaN compare equal. The evaluator relies on this to fold
/// identical runs deterministically.
#[derive(Clone, Copy, Debug)]
pub enum ValueCell {
    Bool(bool),
    Char(char),
    I8(i8),
    I16(i16),
    I32(i32),
    U8(u8),
    U16(u16),
    U32(u32),
    F32(f32),
}

impl Default for ValueCell {
    fn default() -> Self {
        ValueCell::I32(0)
    }
}

impl PartialEq for ValueCell {
    fn eq(&self, other: &Self) -> bool {
        use ValueCell::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a == b,
            (Char(a), Char(b)) => a == b,
            (I8(a), I8(b)) => a == b,
            (I16(a), I16(b)) => a == b,
            (I32(a), I32(b)) => a == b,
            (U8(a), U8(b)) => a == b,
            (U16(a), U16(b)) => a == b,
            (U32(a), U32(b)) => a == b,
            (F32(a), F32(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl fmt::Display for ValueCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueCell::Bool(v) => write!(f, "{v}"),
            ValueCell::Char(v) => write!(f, "{v}"),
            ValueCell::I8(v) => write!(f, "{v}"),
            ValueCell::I16(v) => write!(f, "{v}"),
            ValueCell::I32(v) => write!(f, "{v}"),
            ValueCell::U8(v) => write!(f, "{v}"),
            ValueCell::U16(v) => write!(f, "{v}"),
            ValueCell::U32(v) => write!(f, "{v}"),
            ValueCell::F32(v) => write!(f, "{v}"),
        }
    }
}

impl ValueCell {
    pub fn kind(&self) -> ScalarKind {
        match self {
            ValueCell::Bool(_) => ScalarKind::Bool,
            ValueCell::Char(_) => ScalarKind::Char,
            ValueCell::I8(_) => ScalarKind::I8,
            ValueCell::I16(_) => ScalarKind::I16,
            ValueCell::I32(_) => ScalarKind::I32,
            ValueCell::U8(_) => ScalarKind::U8,
            ValueCell::U16(_) => ScalarKind::U16,
            ValueCell::U32(_) => ScalarKind::U32,
            ValueCell::F32(_) => ScalarKind::F32,
        }
    }

    /// Read the cell as `T`, failing when it holds another kind.
    pub fn get<T: Scalar>(&self) -> Result<T> {
        T::from_cell(*self).ok_or(Error::KindMismatch {
            expected: T::KIND.name(),
            found: self.kind().name(),
        })
    }

    /// Truthiness used by selects and boolean casts: non-zero is true.
    pub fn is_truthy(&self) -> bool {
        match *self {
            ValueCell::Bool(v) => v,
            ValueCell::Char(v) => v != '\0',
            ValueCell::F32(v) => v != 0.0,
            other => other.as_i64() != 0,
        }
    }

    /// Integer view of the cell. Floats truncate toward zero and saturate.
    pub fn as_i64(&self) -> i64 {
        match *self {
            ValueCell::Bool(v) => v as i64,
            ValueCell::Char(v) => v as i64,
            ValueCell::I8(v) => v as i64,
            ValueCell::I16(v) => v as i64,
            ValueCell::I32(v) => v as i64,
            ValueCell::U8(v) => v as i64,
            ValueCell::U16(v) => v as i64,
            ValueCell::U32(v) => v as i64,
            ValueCell::F32(v) => v as i64,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            ValueCell::F32(v) => v as f64,
            other => other.as_i64() as f64,
        }
    }

    /// Numeric conversion with `as` semantics.
    ///
    /// Integer targets wrap, float sources saturate, and characters map
    /// through their code point (invalid code points become U+FFFD).
    pub fn cast(self, kind: ScalarKind) -> ValueCell {
        if self.kind() == kind {
            return self;
        }
        let float = match self {
            ValueCell::F32(v) => Some(v),
            _ => None,
        };
        macro_rules! int_cast {
            ($variant:ident, $t:ty) => {
                match float {
                    Some(v) => ValueCell::$variant(v as $t),
                    None => ValueCell::$variant(self.as_i64() as $t),
                }
            };
        }
        match kind {
            ScalarKind::Bool => ValueCell::Bool(self.is_truthy()),
            ScalarKind::Char => ValueCell::Char(
                char::from_u32(self.as_i64() as u32).unwrap_or(char::REPLACEMENT_CHARACTER),
            ),
            ScalarKind::I8 => int_cast!(I8, i8),
            ScalarKind::I16 => int_cast!(I16, i16),
            ScalarKind::I32 => int_cast!(I32, i32),
            ScalarKind::U8 => int_cast!(U8, u8),
            ScalarKind::U16 => int_cast!(U16, u16),
            ScalarKind::U32 => int_cast!(U32, u32),
            ScalarKind::F32 => ValueCell::F32(self.as_f64() as f32),
        }
    }
}

/// Concrete scalar types that round-trip through a [`ValueCell`].
pub trait Scalar: RunValue + fmt::Display {
    const KIND: ScalarKind;

    fn into_cell(self) -> ValueCell;

    fn from_cell(cell: ValueCell) -> Option<Self>;
}

macro_rules! impl_scalar {
    ($t:ty, $variant:ident) => {
        impl Scalar for $t {
            const KIND: ScalarKind = ScalarKind::$variant;

            #[inline]
            fn into_cell(self) -> ValueCell {
                ValueCell::$variant(self)
            }

            #[inline]
            fn from_cell(cell: ValueCell) -> Option<Self> {
                match cell {
                    ValueCell::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }

        impl From<$t> for ValueCell {
            #[inline]
            fn from(value: $t) -> Self {
                ValueCell::$variant(value)
            }
        }
    };
}

impl_scalar!(bool, Bool);
impl_scalar!(char, Char);
impl_scalar!(i8, I8);
impl_scalar!(i16, I16);
impl_scalar!(i32, I32);
impl_scalar!(u8, U8);
impl_scalar!(u16, U16);
impl_scalar!(u32, U32);
impl_scalar!(f32, F32);
