//! Operators and the operation trait
//!
//! Operators are either built-in (an opcode plus a type, evaluated by typed
//! code and eligible for factory kernels) or user-defined (a Rust closure for
//! the generic kernel plus an optional C definition for specialization).

pub mod builtin;
mod binary;
pub mod dispatch;
mod index_unary;
mod monoid;
mod traits;
mod unary;

pub use binary::{BinaryOp, BinaryOpcode, UserBinaryOp};
pub use index_unary::{IndexUnaryOp, IndexUnaryOpcode, UserIndexUnaryOp};
pub use monoid::{Monoid, Semiring, Terminal};
pub use traits::MatrixOps;
pub use unary::{UnaryOp, UnaryOpcode, UserUnaryOp};

use crate::dtype::{ElemType, Scalar};
use std::sync::Arc;

/// Opcode reported in signatures for any user-defined operator.
pub const USER_OPCODE: u8 = 0xFF;

/// Byte-level unary function `f(z, x)`
pub type UnaryFn = Arc<dyn Fn(&mut [u8], &[u8]) + Send + Sync>;

/// Byte-level binary function `f(z, x, y)`
pub type BinaryFn = Arc<dyn Fn(&mut [u8], &[u8], &[u8]) + Send + Sync>;

/// Byte-level selection predicate `f(x, i, j, y)`
pub type IndexUnaryFn = Arc<dyn Fn(&[u8], i64, i64, &[u8]) -> bool + Send + Sync>;

/// Value transformation applied by `apply` and fused into `transpose`.
#[derive(Clone, Debug)]
pub enum ApplyOp {
    /// `z = f(a)`
    Unary(UnaryOp),
    /// `z = f(s, a)` with a bound first operand
    BindFirst(BinaryOp, Scalar),
    /// `z = f(a, s)` with a bound second operand
    BindSecond(BinaryOp, Scalar),
}

impl ApplyOp {
    /// Output type
    pub fn ztype(&self) -> &ElemType {
        match self {
            ApplyOp::Unary(op) => op.ztype(),
            ApplyOp::BindFirst(op, _) | ApplyOp::BindSecond(op, _) => op.ztype(),
        }
    }

    /// Type the matrix values are cast to before the operator runs
    pub fn input_type(&self) -> &ElemType {
        match self {
            ApplyOp::Unary(op) => op.xtype(),
            ApplyOp::BindFirst(op, _) => op.ytype(),
            ApplyOp::BindSecond(op, _) => op.xtype(),
        }
    }
}
