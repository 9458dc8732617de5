//! Monoids and semirings

use super::{BinaryOp, BinaryOpcode, builtin};
use crate::dtype::{DType, ElemType, Scalar};
use crate::error::{Error, Result};

/// Early-exit condition of a monoid.
#[derive(Clone, Debug, PartialEq)]
pub enum Terminal {
    /// No value absorbs further input
    None,
    /// Once the accumulator equals this value it can no longer change
    Value(Scalar),
    /// Any single value is a valid result (the ANY monoid)
    Any,
}

/// An associative, commutative operator with an identity value.
#[derive(Clone, Debug)]
pub struct Monoid {
    op: BinaryOp,
    identity: Scalar,
    terminal: Terminal,
}

fn standard(opcode: BinaryOpcode, ty: DType) -> Option<(Scalar, Terminal)> {
    crate::dispatch_dtype!(ty, T => {
        let identity = builtin::monoid_identity::<T>(opcode)?;
        let terminal = if opcode == BinaryOpcode::Any {
            Terminal::Any
        } else {
            match builtin::monoid_terminal::<T>(opcode) {
                Some(t) => Terminal::Value(Scalar::new(t)),
                None => Terminal::None,
            }
        };
        Some((Scalar::new(identity), terminal))
    })
}

impl Monoid {
    /// Monoid from any operator whose inputs and output share one type.
    ///
    /// `identity` and `terminal` are cast to that type.
    pub fn new(op: BinaryOp, identity: &Scalar, terminal: Option<&Scalar>) -> Result<Self> {
        let ty = op.ztype().clone();
        if op.xtype() != &ty || op.ytype() != &ty {
            return Err(Error::invalid_argument(
                "op",
                format!("monoid operator {} must have matching input and output types", op.name()),
            ));
        }
        let identity = identity.cast(&ty)?;
        let terminal = match terminal {
            Some(t) => Terminal::Value(t.cast(&ty)?),
            None => Terminal::None,
        };
        Ok(Self {
            op,
            identity,
            terminal,
        })
    }

    /// Built-in monoid with its standard identity and terminal value
    pub fn builtin(opcode: BinaryOpcode, ty: DType) -> Result<Self> {
        match standard(opcode, ty) {
            Some((identity, terminal)) if !opcode.is_comparison() => Ok(Self {
                op: BinaryOp::builtin(opcode, ty),
                identity,
                terminal,
            }),
            _ => Err(Error::invalid_argument(
                "opcode",
                format!("{} does not form a monoid", opcode.name()),
            )),
        }
    }

    fn known(opcode: BinaryOpcode, ty: DType) -> Self {
        // every type has an identity for these operators
        let (identity, terminal) =
            standard(opcode, ty).unwrap_or((Scalar::new(0u8), Terminal::None));
        Self {
            op: BinaryOp::builtin(opcode, ty),
            identity,
            terminal,
        }
    }

    /// `PLUS` monoid, identity 0
    pub fn plus(ty: DType) -> Self {
        Self::known(BinaryOpcode::Plus, ty)
    }

    /// `TIMES` monoid, identity 1
    pub fn times(ty: DType) -> Self {
        Self::known(BinaryOpcode::Times, ty)
    }

    /// `MIN` monoid, identity is the largest value
    pub fn min(ty: DType) -> Self {
        Self::known(BinaryOpcode::Min, ty)
    }

    /// `MAX` monoid, identity is the smallest value
    pub fn max(ty: DType) -> Self {
        Self::known(BinaryOpcode::Max, ty)
    }

    /// `ANY` monoid, terminal after the first value
    pub fn any(ty: DType) -> Self {
        Self::known(BinaryOpcode::Any, ty)
    }

    /// Boolean `LOR` monoid
    pub fn lor() -> Self {
        Self::known(BinaryOpcode::Lor, DType::Bool)
    }

    /// Boolean `LAND` monoid
    pub fn land() -> Self {
        Self::known(BinaryOpcode::Land, DType::Bool)
    }

    /// The operator
    pub fn op(&self) -> &BinaryOp {
        &self.op
    }

    /// Identity value
    pub fn identity(&self) -> &Scalar {
        &self.identity
    }

    /// Early-exit condition
    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    /// Element type
    pub fn ty(&self) -> &ElemType {
        self.op.ztype()
    }

    /// Returns true when operator, identity and terminal are all the built-in defaults
    pub fn is_builtin(&self) -> bool {
        match (&self.op, self.op.ztype().dtype()) {
            (BinaryOp::Builtin { opcode, .. }, Some(d)) => match standard(*opcode, d) {
                Some((identity, terminal)) => {
                    identity == self.identity && terminal == self.terminal
                }
                None => false,
            },
            _ => false,
        }
    }

    /// Terminal value bytes, `None` when the monoid has no plain terminal value
    pub(crate) fn terminal_bytes(&self) -> Option<&[u8]> {
        match &self.terminal {
            Terminal::Value(t) => Some(t.bytes()),
            _ => None,
        }
    }
}

/// A monoid paired with a multiply operator.
#[derive(Clone, Debug)]
pub struct Semiring {
    add: Monoid,
    multiply: BinaryOp,
}

impl Semiring {
    /// Semiring; the multiply output type must equal the monoid type
    pub fn new(add: Monoid, multiply: BinaryOp) -> Result<Self> {
        if multiply.ztype() != add.ty() {
            return Err(Error::domain_mismatch(add.ty(), multiply.ztype(), "semiring"));
        }
        Ok(Self { add, multiply })
    }

    fn known(add: Monoid, multiply: BinaryOpcode, ty: DType) -> Self {
        Self {
            add,
            multiply: BinaryOp::builtin(multiply, ty),
        }
    }

    /// Conventional `(+, *)` semiring
    pub fn plus_times(ty: DType) -> Self {
        Self::known(Monoid::plus(ty), BinaryOpcode::Times, ty)
    }

    /// Tropical `(min, +)` semiring
    pub fn min_plus(ty: DType) -> Self {
        Self::known(Monoid::min(ty), BinaryOpcode::Plus, ty)
    }

    /// `(max, +)` semiring
    pub fn max_plus(ty: DType) -> Self {
        Self::known(Monoid::max(ty), BinaryOpcode::Plus, ty)
    }

    /// `(+, pair)` semiring, counting paths
    pub fn plus_pair(ty: DType) -> Self {
        Self::known(Monoid::plus(ty), BinaryOpcode::Pair, ty)
    }

    /// `(any, pair)` semiring, structural reachability
    pub fn any_pair(ty: DType) -> Self {
        Self::known(Monoid::any(ty), BinaryOpcode::Pair, ty)
    }

    /// Boolean `(or, and)` semiring
    pub fn lor_land() -> Self {
        Self::known(Monoid::lor(), BinaryOpcode::Land, DType::Bool)
    }

    /// The additive monoid
    pub fn add(&self) -> &Monoid {
        &self.add
    }

    /// The multiply operator
    pub fn multiply(&self) -> &BinaryOp {
        &self.multiply
    }

    /// Output type
    pub fn ty(&self) -> &ElemType {
        self.add.ty()
    }

    /// Display name
    pub fn name(&self) -> String {
        format!("{}_{}", self.add.op().name(), self.multiply.name())
    }
}
