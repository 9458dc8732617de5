//! Factory kernel table
//!
//! A closed set of precompiled kernels for built-in operators on built-in
//! types. Lookup is a pair of `match` statements: one on the type, one on the
//! opcode. Only operations with no casting qualify; everything else goes to
//! the JIT or generic tier.

use super::typed;
use super::{KernelFn, KernelKind, OpRef, OperationDesc};
use crate::dtype::{DType, ElemType};
use crate::ops::{BinaryOp, BinaryOpcode, IndexUnaryOp, IndexUnaryOpcode, UnaryOp, UnaryOpcode};

macro_rules! per_opcode {
    ($op:expr, $Op:ident, [$($v:ident),* $(,)?], $kernel:ident, $T:ty) => {
        match $op {
            $( $Op::$v => Some(typed::$kernel::<$T, { $Op::$v as u8 }> as KernelFn), )*
            #[allow(unreachable_patterns)]
            _ => None,
        }
    };
}

macro_rules! per_semiring {
    ($add:expr, $mult:expr, [$(($a:ident, $m:ident)),* $(,)?], $T:ty) => {
        match ($add, $mult) {
            $(
                (BinaryOpcode::$a, BinaryOpcode::$m) => Some(
                    typed::mult_add::<$T, { BinaryOpcode::$a as u8 }, { BinaryOpcode::$m as u8 }>
                        as KernelFn,
                ),
            )*
            _ => None,
        }
    };
}

/// Built-in type of `t` if the factory serves it
fn factory_dtype(t: &ElemType) -> Option<DType> {
    let d = t.dtype()?;
    #[cfg(feature = "f16")]
    if matches!(d, DType::F16 | DType::BF16) {
        return None;
    }
    Some(d)
}

/// Returns `Some(d)` when every type is the same built-in `d`
fn uniform<'a>(types: impl IntoIterator<Item = &'a ElemType>) -> Option<DType> {
    let mut it = types.into_iter();
    let d = factory_dtype(it.next()?)?;
    it.all(|t| t.dtype() == Some(d)).then_some(d)
}

/// Factory kernel for `desc`, if one exists
pub fn lookup(desc: &OperationDesc) -> Option<KernelFn> {
    match (desc.kind, &desc.op) {
        (KernelKind::Select, OpRef::IndexUnary(IndexUnaryOp::Builtin { opcode, .. })) => {
            if !opcode.is_value() {
                return None;
            }
            let (x, y, _) = desc.op_types();
            let d = uniform([&desc.a_type, &desc.c_type, &x, y.as_ref()?])?;
            crate::dispatch_dtype!(d, T => {
                per_opcode!(*opcode, IndexUnaryOpcode,
                    [ValueEq, ValueNe, ValueGt, ValueGe, ValueLt, ValueLe],
                    select_value, T)
            })
        }
        (KernelKind::Apply, OpRef::Unary(UnaryOp::Builtin { opcode, ty })) => {
            let d = uniform([&desc.a_type, &desc.c_type, ty])?;
            crate::dispatch_dtype!(d, T => {
                per_opcode!(*opcode, UnaryOpcode,
                    [Identity, Ainv, Abs, Minv, One, Lnot],
                    apply_unary, T)
            })
        }
        (KernelKind::Ewise, OpRef::Binary(op @ BinaryOp::Builtin { opcode, .. })) => {
            let d = uniform([&desc.a_type, desc.b_type.as_ref()?, op.xtype(), op.ytype()])?;
            if desc.c_type != *op.ztype() {
                return None;
            }
            crate::dispatch_dtype!(d, T => {
                if opcode.is_comparison() {
                    per_opcode!(*opcode, BinaryOpcode, [Eq, Ne, Gt, Lt, Ge, Le], ewise_compare, T)
                } else {
                    per_opcode!(*opcode, BinaryOpcode,
                        [First, Second, Pair, Any, Plus, Minus, Rminus, Times, Div, Min, Max,
                         Lor, Land, Lxor],
                        ewise_binary, T)
                }
            })
        }
        (KernelKind::Reduce, OpRef::Monoid(m)) => {
            if !m.is_builtin() {
                return None;
            }
            let opcode = m.op().opcode()?;
            let d = uniform([&desc.a_type, &desc.c_type, m.ty()])?;
            crate::dispatch_dtype!(d, T => {
                per_opcode!(opcode, BinaryOpcode,
                    [Plus, Times, Min, Max, Any, Lor, Land, Lxor],
                    reduce_monoid, T)
            })
        }
        (KernelKind::MultAdd, OpRef::Semiring(s)) => {
            if !s.add().is_builtin() {
                return None;
            }
            let add = s.add().op().opcode()?;
            let mult = s.multiply().opcode()?;
            let d = uniform([
                &desc.a_type,
                desc.b_type.as_ref()?,
                &desc.c_type,
                s.multiply().xtype(),
                s.multiply().ytype(),
            ])?;
            crate::dispatch_dtype!(d, T => {
                per_semiring!(add, mult,
                    [(Plus, Times), (Min, Plus), (Max, Plus), (Lor, Land), (Any, Pair), (Plus, Pair)],
                    T)
            })
        }
        _ => None,
    }
}
