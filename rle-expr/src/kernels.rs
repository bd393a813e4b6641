//! Elementwise kernels over value cells.
//!
//! Each builder checks operand kinds once, when the node is added, and
//! installs a cell function that assumes those kinds from then on. Operands
//! must already share a kind: there is no implicit promotion, use
//! [`Graph::cast`] first.

use std::cmp::Ordering;
use std::sync::Arc;

use rle_result::{Error, Result};
use rle_store::{ScalarKind, ValueCell};

use crate::graph::{ApplyFn, Graph, MergeFn, OpId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Min,
    Max,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinaryOp {
    fn supports(self, kind: ScalarKind) -> bool {
        match self {
            BinaryOp::Add
            | BinaryOp::Subtract
            | BinaryOp::Multiply
            | BinaryOp::Divide
            | BinaryOp::Modulo => kind.is_numeric(),
            BinaryOp::Min | BinaryOp::Max => kind.is_numeric() || kind == ScalarKind::Bool,
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
                kind.is_integer() || kind == ScalarKind::Bool
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Logical not for booleans, bitwise not for integers.
    Not,
    Neg,
    Abs,
}

impl UnaryOp {
    fn supports(self, kind: ScalarKind) -> bool {
        match self {
            UnaryOp::Not => kind.is_integer() || kind == ScalarKind::Bool,
            UnaryOp::Neg => matches!(
                kind,
                ScalarKind::I8 | ScalarKind::I16 | ScalarKind::I32 | ScalarKind::F32
            ),
            UnaryOp::Abs => kind.is_numeric(),
        }
    }
}

// Integer arithmetic wraps; division and remainder by zero yield zero.
macro_rules! int_binary {
    ($op:expr, $a:expr, $b:expr) => {{
        let (a, b) = ($a, $b);
        match $op {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Subtract => a.wrapping_sub(b),
            BinaryOp::Multiply => a.wrapping_mul(b),
            BinaryOp::Divide => {
                if b == 0 {
                    0
                } else {
                    a.wrapping_div(b)
                }
            }
            BinaryOp::Modulo => {
                if b == 0 {
                    0
                } else {
                    a.wrapping_rem(b)
                }
            }
            BinaryOp::Min => a.min(b),
            BinaryOp::Max => a.max(b),
            BinaryOp::BitAnd => a & b,
            BinaryOp::BitOr => a | b,
            BinaryOp::BitXor => a ^ b,
        }
    }};
}

fn float_binary(op: BinaryOp, a: f32, b: f32) -> f32 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide => a / b,
        BinaryOp::Modulo => a % b,
        BinaryOp::Min => a.min(b),
        BinaryOp::Max => a.max(b),
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
            unreachable!("bitwise {op:?} on f32 was rejected at construction")
        }
    }
}

fn bool_binary(op: BinaryOp, a: bool, b: bool) -> bool {
    match op {
        BinaryOp::Min | BinaryOp::BitAnd => a & b,
        BinaryOp::Max | BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        _ => unreachable!("arithmetic {op:?} on bool was rejected at construction"),
    }
}

fn binary_cell(op: BinaryOp, lhs: ValueCell, rhs: ValueCell) -> ValueCell {
    use ValueCell::*;
    match (lhs, rhs) {
        (I8(a), I8(b)) => I8(int_binary!(op, a, b)),
        (I16(a), I16(b)) => I16(int_binary!(op, a, b)),
        (I32(a), I32(b)) => I32(int_binary!(op, a, b)),
        (U8(a), U8(b)) => U8(int_binary!(op, a, b)),
        (U16(a), U16(b)) => U16(int_binary!(op, a, b)),
        (U32(a), U32(b)) => U32(int_binary!(op, a, b)),
        (F32(a), F32(b)) => F32(float_binary(op, a, b)),
        (Bool(a), Bool(b)) => Bool(bool_binary(op, a, b)),
        (a, b) => unreachable!("{op:?} on {} and {}", a.kind(), b.kind()),
    }
}

fn order_cells(lhs: ValueCell, rhs: ValueCell) -> Option<Ordering> {
    use ValueCell::*;
    match (lhs, rhs) {
        (Bool(a), Bool(b)) => a.partial_cmp(&b),
        (Char(a), Char(b)) => a.partial_cmp(&b),
        (I8(a), I8(b)) => a.partial_cmp(&b),
        (I16(a), I16(b)) => a.partial_cmp(&b),
        (I32(a), I32(b)) => a.partial_cmp(&b),
        (U8(a), U8(b)) => a.partial_cmp(&b),
        (U16(a), U16(b)) => a.partial_cmp(&b),
        (U32(a), U32(b)) => a.partial_cmp(&b),
        (F32(a), F32(b)) => a.partial_cmp(&b),
        (a, b) => unreachable!("comparing {} with {}", a.kind(), b.kind()),
    }
}

/// NaN is unordered: every comparison with it is false except `NotEq`.
fn compare_cell(op: CompareOp, lhs: ValueCell, rhs: ValueCell) -> bool {
    let ord = order_cells(lhs, rhs);
    match op {
        CompareOp::Eq => ord == Some(Ordering::Equal),
        CompareOp::NotEq => ord != Some(Ordering::Equal),
        CompareOp::Lt => ord == Some(Ordering::Less),
        CompareOp::LtEq => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => ord == Some(Ordering::Greater),
        CompareOp::GtEq => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
    }
}

fn unary_cell(op: UnaryOp, value: ValueCell) -> ValueCell {
    use ValueCell::*;
    match (op, value) {
        (UnaryOp::Not, Bool(v)) => Bool(!v),
        (UnaryOp::Not, I8(v)) => I8(!v),
        (UnaryOp::Not, I16(v)) => I16(!v),
        (UnaryOp::Not, I32(v)) => I32(!v),
        (UnaryOp::Not, U8(v)) => U8(!v),
        (UnaryOp::Not, U16(v)) => U16(!v),
        (UnaryOp::Not, U32(v)) => U32(!v),
        (UnaryOp::Neg, I8(v)) => I8(v.wrapping_neg()),
        (UnaryOp::Neg, I16(v)) => I16(v.wrapping_neg()),
        (UnaryOp::Neg, I32(v)) => I32(v.wrapping_neg()),
        (UnaryOp::Neg, F32(v)) => F32(-v),
        (UnaryOp::Abs, I8(v)) => I8(v.wrapping_abs()),
        (UnaryOp::Abs, I16(v)) => I16(v.wrapping_abs()),
        (UnaryOp::Abs, I32(v)) => I32(v.wrapping_abs()),
        (UnaryOp::Abs, F32(v)) => F32(v.abs()),
        (UnaryOp::Abs, v @ (U8(_) | U16(_) | U32(_))) => v,
        (op, v) => unreachable!("{op:?} on {}", v.kind()),
    }
}

impl Graph {
    fn same_kind(&self, lhs: OpId, rhs: OpId) -> Result<ScalarKind> {
        let expected = self.kind(lhs)?;
        let found = self.kind(rhs)?;
        if expected != found {
            return Err(Error::KindMismatch {
                expected: expected.name(),
                found: found.name(),
            });
        }
        Ok(expected)
    }

    /// Elementwise arithmetic, min/max or bitwise op.
    pub fn binary(&mut self, lhs: OpId, rhs: OpId, op: BinaryOp) -> Result<OpId> {
        let kind = self.same_kind(lhs, rhs)?;
        if !op.supports(kind) {
            return Err(Error::InvalidArgumentError(format!(
                "{op:?} is not defined for {kind}"
            )));
        }
        let func: MergeFn = Arc::new(move |vals: &[ValueCell]| binary_cell(op, vals[0], vals[1]));
        self.push_merge(&[lhs, rhs], kind, func)
    }

    /// Elementwise comparison producing a boolean expression.
    pub fn compare(&mut self, lhs: OpId, rhs: OpId, op: CompareOp) -> Result<OpId> {
        self.same_kind(lhs, rhs)?;
        let func: MergeFn = Arc::new(move |vals: &[ValueCell]| {
            ValueCell::Bool(compare_cell(op, vals[0], vals[1]))
        });
        self.push_merge(&[lhs, rhs], ScalarKind::Bool, func)
    }

    /// `mask ? if_true : if_false`. The mask may be of any kind and is read
    /// through [`ValueCell::is_truthy`].
    pub fn select(&mut self, mask: OpId, if_true: OpId, if_false: OpId) -> Result<OpId> {
        let kind = self.same_kind(if_true, if_false)?;
        let func: MergeFn = Arc::new(|vals: &[ValueCell]| {
            if vals[0].is_truthy() {
                vals[1]
            } else {
                vals[2]
            }
        });
        self.push_merge(&[mask, if_true, if_false], kind, func)
    }

    pub fn unary(&mut self, input: OpId, op: UnaryOp) -> Result<OpId> {
        let kind = self.kind(input)?;
        if !op.supports(kind) {
            return Err(Error::InvalidArgumentError(format!(
                "{op:?} is not defined for {kind}"
            )));
        }
        let func: ApplyFn = Arc::new(move |value| unary_cell(op, value));
        self.push_apply(input, kind, func)
    }

    /// Convert to `kind` with [`ValueCell::cast`] semantics. Casting to the
    /// input's own kind returns the input.
    pub fn cast(&mut self, input: OpId, kind: ScalarKind) -> Result<OpId> {
        if self.kind(input)? == kind {
            return Ok(input);
        }
        let func: ApplyFn = Arc::new(move |value: ValueCell| value.cast(kind));
        self.push_apply(input, kind, func)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rle_store::Store;

    #[test]
    fn integer_arithmetic_wraps_and_guards_zero() {
        use ValueCell::*;
        assert_eq!(binary_cell(BinaryOp::Add, I8(120), I8(10)), I8(-126));
        assert_eq!(binary_cell(BinaryOp::Subtract, U8(1), U8(2)), U8(255));
        assert_eq!(binary_cell(BinaryOp::Divide, I32(7), I32(0)), I32(0));
        assert_eq!(binary_cell(BinaryOp::Modulo, U32(7), U32(0)), U32(0));
        assert_eq!(binary_cell(BinaryOp::Divide, I32(i32::MIN), I32(-1)), I32(i32::MIN));
        assert_eq!(binary_cell(BinaryOp::Modulo, I16(-7), I16(3)), I16(-1));
        assert_eq!(binary_cell(BinaryOp::Max, I16(-7), I16(3)), I16(3));
        assert_eq!(binary_cell(BinaryOp::BitXor, U16(0b1100), U16(0b1010)), U16(0b0110));
    }

    #[test]
    fn float_and_bool_ops() {
        use ValueCell::*;
        assert_eq!(binary_cell(BinaryOp::Divide, F32(1.0), F32(4.0)), F32(0.25));
        assert_eq!(binary_cell(BinaryOp::Min, F32(1.0), F32(-4.0)), F32(-4.0));
        assert_eq!(binary_cell(BinaryOp::BitOr, Bool(false), Bool(true)), Bool(true));
        assert_eq!(binary_cell(BinaryOp::Min, Bool(false), Bool(true)), Bool(false));
    }

    #[test]
    fn comparisons_treat_nan_as_unordered() {
        use ValueCell::*;
        assert!(compare_cell(CompareOp::Lt, Char('a'), Char('b')));
        assert!(compare_cell(CompareOp::GtEq, U8(3), U8(3)));
        assert!(!compare_cell(CompareOp::Eq, F32(f32::NAN), F32(f32::NAN)));
        assert!(compare_cell(CompareOp::NotEq, F32(f32::NAN), F32(1.0)));
        assert!(!compare_cell(CompareOp::LtEq, F32(f32::NAN), F32(1.0)));
    }

    #[test]
    fn unary_ops() {
        use ValueCell::*;
        assert_eq!(unary_cell(UnaryOp::Not, Bool(true)), Bool(false));
        assert_eq!(unary_cell(UnaryOp::Not, U8(0x0f)), U8(0xf0));
        assert_eq!(unary_cell(UnaryOp::Neg, I8(i8::MIN)), I8(i8::MIN));
        assert_eq!(unary_cell(UnaryOp::Abs, F32(-2.5)), F32(2.5));
        assert_eq!(unary_cell(UnaryOp::Abs, U16(9)), U16(9));
    }

    #[test]
    fn builders_check_kinds() {
        let mut graph = Graph::new();
        let ints = graph.leaf_from(&Store::from_slice(&[1_i32, 2, 3]).unwrap()).unwrap();
        let bytes = graph.leaf_from(&Store::from_slice(&[1_u8, 2, 3]).unwrap()).unwrap();
        let chars = graph.leaf_from(&Store::from_slice(&['a', 'b', 'c']).unwrap()).unwrap();
        let flags = graph.leaf_from(&Store::from_slice(&[true, false, true]).unwrap()).unwrap();

        assert!(matches!(
            graph.binary(ints, bytes, BinaryOp::Add),
            Err(Error::KindMismatch { .. })
        ));
        assert!(graph.binary(chars, chars, BinaryOp::Add).is_err());
        assert!(graph.unary(bytes, UnaryOp::Neg).is_err());
        assert!(graph.select(flags, ints, chars).is_err());

        let sum = graph.binary(ints, ints, BinaryOp::Add).unwrap();
        assert_eq!(graph.kind(sum).unwrap(), ScalarKind::I32);
        let lt = graph.compare(chars, chars, CompareOp::Lt).unwrap();
        assert_eq!(graph.kind(lt).unwrap(), ScalarKind::Bool);
        let picked = graph.select(flags, chars, chars).unwrap();
        assert_eq!(graph.kind(picked).unwrap(), ScalarKind::Char);

        let widened = graph.cast(bytes, ScalarKind::I32).unwrap();
        assert_eq!(graph.kind(widened).unwrap(), ScalarKind::I32);
        assert!(graph.binary(ints, widened, BinaryOp::Multiply).is_ok());
        assert_eq!(graph.cast(ints, ScalarKind::I32).unwrap(), ints);
    }
}
