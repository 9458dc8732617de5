//! Binary operators

use super::{BinaryFn, builtin};
use crate::dtype::{Bool, DType, ElemType, Element, read, write};
use crate::error::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// Built-in binary operator codes.
///
/// The numeric values are part of kernel signatures and must stay stable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BinaryOpcode {
    /// `z = x`
    First = 1,
    /// `z = y`
    Second = 2,
    /// `z = 1`
    Pair = 3,
    /// `z = x` or `y`, whichever is cheaper
    Any = 4,
    /// `z = x + y`
    Plus = 5,
    /// `z = x - y`
    Minus = 6,
    /// `z = y - x`
    Rminus = 7,
    /// `z = x * y`
    Times = 8,
    /// `z = x / y`
    Div = 9,
    /// `z = min(x, y)`
    Min = 10,
    /// `z = max(x, y)`
    Max = 11,
    /// `z = (x == y)`
    Eq = 12,
    /// `z = (x != y)`
    Ne = 13,
    /// `z = (x > y)`
    Gt = 14,
    /// `z = (x < y)`
    Lt = 15,
    /// `z = (x >= y)`
    Ge = 16,
    /// `z = (x <= y)`
    Le = 17,
    /// `z = (x != 0) || (y != 0)`
    Lor = 18,
    /// `z = (x != 0) && (y != 0)`
    Land = 19,
    /// `z = (x != 0) != (y != 0)`
    Lxor = 20,
}

impl BinaryOpcode {
    const ALL: [BinaryOpcode; 20] = [
        BinaryOpcode::First,
        BinaryOpcode::Second,
        BinaryOpcode::Pair,
        BinaryOpcode::Any,
        BinaryOpcode::Plus,
        BinaryOpcode::Minus,
        BinaryOpcode::Rminus,
        BinaryOpcode::Times,
        BinaryOpcode::Div,
        BinaryOpcode::Min,
        BinaryOpcode::Max,
        BinaryOpcode::Eq,
        BinaryOpcode::Ne,
        BinaryOpcode::Gt,
        BinaryOpcode::Lt,
        BinaryOpcode::Ge,
        BinaryOpcode::Le,
        BinaryOpcode::Lor,
        BinaryOpcode::Land,
        BinaryOpcode::Lxor,
    ];

    /// Decode a signature opcode; unknown codes decode to `First`
    pub const fn decode(code: u8) -> Self {
        if code >= 1 && code <= 20 {
            Self::ALL[(code - 1) as usize]
        } else {
            BinaryOpcode::First
        }
    }

    /// Returns true for operators producing a boolean from two values
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOpcode::Eq
                | BinaryOpcode::Ne
                | BinaryOpcode::Gt
                | BinaryOpcode::Lt
                | BinaryOpcode::Ge
                | BinaryOpcode::Le
        )
    }

    /// Returns true for operators that only move bytes and so accept any type
    pub const fn is_positional_value(self) -> bool {
        matches!(
            self,
            BinaryOpcode::First | BinaryOpcode::Second | BinaryOpcode::Any
        )
    }

    /// Operator name
    pub const fn name(self) -> &'static str {
        match self {
            BinaryOpcode::First => "first",
            BinaryOpcode::Second => "second",
            BinaryOpcode::Pair => "pair",
            BinaryOpcode::Any => "any",
            BinaryOpcode::Plus => "plus",
            BinaryOpcode::Minus => "minus",
            BinaryOpcode::Rminus => "rminus",
            BinaryOpcode::Times => "times",
            BinaryOpcode::Div => "div",
            BinaryOpcode::Min => "min",
            BinaryOpcode::Max => "max",
            BinaryOpcode::Eq => "eq",
            BinaryOpcode::Ne => "ne",
            BinaryOpcode::Gt => "gt",
            BinaryOpcode::Lt => "lt",
            BinaryOpcode::Ge => "ge",
            BinaryOpcode::Le => "le",
            BinaryOpcode::Lor => "lor",
            BinaryOpcode::Land => "land",
            BinaryOpcode::Lxor => "lxor",
        }
    }
}

/// A caller-defined binary operator `z = f(x, y)`.
pub struct UserBinaryOp {
    name: String,
    xtype: ElemType,
    ytype: ElemType,
    ztype: ElemType,
    func: BinaryFn,
    definition: Option<String>,
}

impl UserBinaryOp {
    /// Operator over raw element bytes
    pub fn new<F>(
        name: impl Into<String>,
        xtype: ElemType,
        ytype: ElemType,
        ztype: ElemType,
        func: F,
    ) -> Self
    where
        F: Fn(&mut [u8], &[u8], &[u8]) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            xtype,
            ytype,
            ztype,
            func: Arc::new(func),
            definition: None,
        }
    }

    /// Operator over built-in types
    pub fn from_fn<X: Element, Y: Element, Z: Element>(
        name: impl Into<String>,
        f: impl Fn(X, Y) -> Z + Send + Sync + 'static,
    ) -> Self {
        Self::new(
            name,
            X::DTYPE.into(),
            Y::DTYPE.into(),
            Z::DTYPE.into(),
            move |z: &mut [u8], x: &[u8], y: &[u8]| write(z, f(read::<X>(x), read::<Y>(y))),
        )
    }

    /// Attach the C definition of `void name (ztype *z, const xtype *x, const ytype *y)`
    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Some(definition.into());
        self
    }

    /// Operator name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// C definition, if any
    pub fn definition(&self) -> Option<&str> {
        self.definition.as_deref()
    }
}

impl fmt::Debug for UserBinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserBinaryOp")
            .field("name", &self.name)
            .field("xtype", &self.xtype)
            .field("ytype", &self.ytype)
            .field("ztype", &self.ztype)
            .field("defined", &self.definition.is_some())
            .finish()
    }
}

/// A binary operator: built-in on one type, or user-defined.
#[derive(Clone, Debug)]
pub enum BinaryOp {
    /// Built-in operator with `x` and `y` of type `ty`
    Builtin {
        /// Operator code
        opcode: BinaryOpcode,
        /// Input type (also the output type, except for comparisons)
        ty: ElemType,
    },
    /// User-defined operator
    User(Arc<UserBinaryOp>),
}

static BOOL_TYPE: ElemType = ElemType::Builtin(DType::Bool);

impl BinaryOp {
    /// Built-in operator; user types only accept First, Second and Any
    pub fn new(opcode: BinaryOpcode, ty: impl Into<ElemType>) -> Result<Self> {
        let ty = ty.into();
        if !ty.is_builtin() && !opcode.is_positional_value() {
            return Err(Error::invalid_argument(
                "opcode",
                format!("{} is not defined on user type {}", opcode.name(), ty),
            ));
        }
        Ok(BinaryOp::Builtin { opcode, ty })
    }

    /// Built-in operator on a built-in type
    pub fn builtin(opcode: BinaryOpcode, ty: DType) -> Self {
        BinaryOp::Builtin {
            opcode,
            ty: ty.into(),
        }
    }

    /// `z = x + y`
    pub fn plus(ty: DType) -> Self {
        Self::builtin(BinaryOpcode::Plus, ty)
    }

    /// `z = x * y`
    pub fn times(ty: DType) -> Self {
        Self::builtin(BinaryOpcode::Times, ty)
    }

    /// `z = y` on any type
    pub fn second(ty: impl Into<ElemType>) -> Self {
        BinaryOp::Builtin {
            opcode: BinaryOpcode::Second,
            ty: ty.into(),
        }
    }

    /// `z = x` on any type
    pub fn first(ty: impl Into<ElemType>) -> Self {
        BinaryOp::Builtin {
            opcode: BinaryOpcode::First,
            ty: ty.into(),
        }
    }

    /// Wrap a user operator
    pub fn user(op: UserBinaryOp) -> Self {
        BinaryOp::User(Arc::new(op))
    }

    /// First input type
    pub fn xtype(&self) -> &ElemType {
        match self {
            BinaryOp::Builtin { ty, .. } => ty,
            BinaryOp::User(u) => &u.xtype,
        }
    }

    /// Second input type
    pub fn ytype(&self) -> &ElemType {
        match self {
            BinaryOp::Builtin { ty, .. } => ty,
            BinaryOp::User(u) => &u.ytype,
        }
    }

    /// Output type
    pub fn ztype(&self) -> &ElemType {
        match self {
            BinaryOp::Builtin { opcode, .. } if opcode.is_comparison() => &BOOL_TYPE,
            BinaryOp::Builtin { ty, .. } => ty,
            BinaryOp::User(u) => &u.ztype,
        }
    }

    /// Built-in opcode, if any
    pub fn opcode(&self) -> Option<BinaryOpcode> {
        match self {
            BinaryOp::Builtin { opcode, .. } => Some(*opcode),
            BinaryOp::User(_) => None,
        }
    }

    /// Returns true for built-in operators
    pub fn is_builtin(&self) -> bool {
        matches!(self, BinaryOp::Builtin { .. })
    }

    /// Display name
    pub fn name(&self) -> String {
        match self {
            BinaryOp::Builtin { opcode, ty } => format!("{}_{}", opcode.name(), ty),
            BinaryOp::User(u) => u.name.clone(),
        }
    }

    /// Byte-level implementation used by the generic kernel
    pub fn to_fn(&self) -> BinaryFn {
        match self {
            BinaryOp::User(u) => u.func.clone(),
            BinaryOp::Builtin { opcode, ty } => {
                let op = *opcode;
                match ty.dtype() {
                    Some(d) if op.is_comparison() => crate::dispatch_dtype!(d, T => {
                        Arc::new(move |z: &mut [u8], x: &[u8], y: &[u8]| {
                            let r = builtin::compare::<T>(op, read(x), read(y));
                            write(z, Bool::from(r))
                        }) as BinaryFn
                    }),
                    Some(d) => crate::dispatch_dtype!(d, T => {
                        Arc::new(move |z: &mut [u8], x: &[u8], y: &[u8]| {
                            write(z, builtin::binary::<T>(op, read(x), read(y)))
                        }) as BinaryFn
                    }),
                    None => {
                        let n = ty.size();
                        if op == BinaryOpcode::First {
                            Arc::new(move |z: &mut [u8], x: &[u8], _y: &[u8]| {
                                z[..n].copy_from_slice(&x[..n])
                            })
                        } else {
                            Arc::new(move |z: &mut [u8], _x: &[u8], y: &[u8]| {
                                z[..n].copy_from_slice(&y[..n])
                            })
                        }
                    }
                }
            }
        }
    }
}
