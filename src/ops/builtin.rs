//! Typed semantics of the built-in operators
//!
//! Shared by the factory kernels (monomorphized, opcode fixed at compile
//! time) and the generic kernel builders (opcode chosen at run time).

use super::{BinaryOpcode, IndexUnaryOpcode, UnaryOpcode};
use crate::dtype::{Element, Wide};

#[inline(always)]
fn from_bool<T: Element>(b: bool) -> T {
    if b { T::one() } else { T::zero() }
}

/// Apply a built-in unary operator
#[inline(always)]
pub fn unary<T: Element>(op: UnaryOpcode, x: T) -> T {
    match op {
        UnaryOpcode::Identity => x,
        UnaryOpcode::Ainv => x.ainv(),
        UnaryOpcode::Abs => x.absolute(),
        UnaryOpcode::Minv => T::one().divide(x),
        UnaryOpcode::One => T::one(),
        UnaryOpcode::Lnot => from_bool(!x.is_nonzero()),
    }
}

/// Apply a built-in binary operator whose result type equals its input type
#[inline(always)]
pub fn binary<T: Element>(op: BinaryOpcode, x: T, y: T) -> T {
    match op {
        BinaryOpcode::First => x,
        BinaryOpcode::Second | BinaryOpcode::Any => y,
        BinaryOpcode::Pair => T::one(),
        BinaryOpcode::Plus => x.plus(y),
        BinaryOpcode::Minus => x.minus(y),
        BinaryOpcode::Rminus => y.minus(x),
        BinaryOpcode::Times => x.times(y),
        BinaryOpcode::Div => x.divide(y),
        BinaryOpcode::Min => x.minimum(y),
        BinaryOpcode::Max => x.maximum(y),
        BinaryOpcode::Lor => from_bool(x.is_nonzero() || y.is_nonzero()),
        BinaryOpcode::Land => from_bool(x.is_nonzero() && y.is_nonzero()),
        BinaryOpcode::Lxor => from_bool(x.is_nonzero() != y.is_nonzero()),
        _ => from_bool(compare(op, x, y)),
    }
}

/// Evaluate a built-in comparison operator
#[inline(always)]
pub fn compare<T: Element>(op: BinaryOpcode, x: T, y: T) -> bool {
    match op {
        BinaryOpcode::Eq => x == y,
        BinaryOpcode::Ne => x != y,
        BinaryOpcode::Gt => x > y,
        BinaryOpcode::Lt => x < y,
        BinaryOpcode::Ge => x >= y,
        BinaryOpcode::Le => x <= y,
        _ => false,
    }
}

/// Evaluate a value-dependent selector on `x` against `y`
#[inline(always)]
pub fn value_keep<T: Element>(op: IndexUnaryOpcode, x: T, y: T) -> bool {
    match op {
        IndexUnaryOpcode::ValueEq => x == y,
        IndexUnaryOpcode::ValueNe => x != y,
        IndexUnaryOpcode::ValueGt => x > y,
        IndexUnaryOpcode::ValueGe => x >= y,
        IndexUnaryOpcode::ValueLt => x < y,
        IndexUnaryOpcode::ValueLe => x <= y,
        _ => true,
    }
}

/// Evaluate a position-dependent selector at row `i`, column `j`
#[inline(always)]
pub fn positional_keep(op: IndexUnaryOpcode, i: i64, j: i64, thunk: i64) -> bool {
    let (i, j, t) = (i as i128, j as i128, thunk as i128);
    match op {
        IndexUnaryOpcode::RowIndex => i + t != 0,
        IndexUnaryOpcode::ColIndex => j + t != 0,
        IndexUnaryOpcode::Tril => j <= i + t,
        IndexUnaryOpcode::Triu => j >= i + t,
        IndexUnaryOpcode::Diag => j == i + t,
        IndexUnaryOpcode::Offdiag => j != i + t,
        IndexUnaryOpcode::RowLe => i <= t,
        IndexUnaryOpcode::RowGt => i > t,
        IndexUnaryOpcode::ColLe => j <= t,
        IndexUnaryOpcode::ColGt => j > t,
        IndexUnaryOpcode::NonZombie => i >= 0,
        _ => true,
    }
}

/// Standard identity of a built-in monoid operator
pub fn monoid_identity<T: Element>(op: BinaryOpcode) -> Option<T> {
    match op {
        BinaryOpcode::Plus | BinaryOpcode::Any | BinaryOpcode::Lor | BinaryOpcode::Lxor => {
            Some(T::zero())
        }
        BinaryOpcode::Times | BinaryOpcode::Land => Some(T::one()),
        BinaryOpcode::Min => Some(T::highest()),
        BinaryOpcode::Max => Some(T::lowest()),
        _ => None,
    }
}

/// Standard terminal value of a built-in monoid operator, if it has one
pub fn monoid_terminal<T: Element>(op: BinaryOpcode) -> Option<T> {
    match op {
        BinaryOpcode::Min => Some(T::lowest()),
        BinaryOpcode::Max => Some(T::highest()),
        BinaryOpcode::Lor => Some(T::one()),
        BinaryOpcode::Land => Some(T::zero()),
        BinaryOpcode::Times if !T::DTYPE.is_float() => Some(T::zero()),
        BinaryOpcode::Plus if T::DTYPE.is_bool() => Some(T::one()),
        _ => None,
    }
}

/// Integer view of a value, used for positional thunks
#[inline]
pub fn as_i64<T: Element>(x: T) -> i64 {
    match x.to_wide() {
        Wide::Int(v) => v as i64,
        Wide::Float(v) => v as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_selectors() {
        assert!(!positional_keep(IndexUnaryOpcode::ColIndex, 3, 4, -4));
        assert!(positional_keep(IndexUnaryOpcode::ColIndex, 3, 5, -4));
        assert!(positional_keep(IndexUnaryOpcode::Tril, 2, 2, 0));
        assert!(!positional_keep(IndexUnaryOpcode::Tril, 2, 3, 0));
        assert!(positional_keep(IndexUnaryOpcode::Triu, 2, 3, 1));
        assert!(positional_keep(IndexUnaryOpcode::ColGt, 0, 6, 5));
        assert!(!positional_keep(IndexUnaryOpcode::NonZombie, -2, 0, 0));
    }

    #[test]
    fn test_monoid_constants() {
        assert_eq!(monoid_identity::<u16>(BinaryOpcode::Min), Some(u16::MAX));
        assert_eq!(monoid_terminal::<u16>(BinaryOpcode::Min), Some(0));
        assert_eq!(monoid_terminal::<f64>(BinaryOpcode::Times), None);
        assert_eq!(monoid_terminal::<i32>(BinaryOpcode::Times), Some(0));
        assert_eq!(monoid_identity::<f32>(BinaryOpcode::Max), Some(f32::NEG_INFINITY));
        assert_eq!(monoid_identity::<i8>(BinaryOpcode::Div), None);
    }

    #[test]
    fn test_binary_ops() {
        assert_eq!(binary(BinaryOpcode::Rminus, 3i32, 10), 7);
        assert_eq!(binary(BinaryOpcode::Lxor, 3u8, 0), 1);
        assert_eq!(binary(BinaryOpcode::Ge, 2.0f64, 2.0), 1.0);
        assert_eq!(unary(UnaryOpcode::Minv, 4i32), 0);
        assert_eq!(unary(UnaryOpcode::Minv, 4.0f64), 0.25);
        assert_eq!(unary(UnaryOpcode::Lnot, 0i16), 1);
    }
}
