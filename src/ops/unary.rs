//! Unary operators

use super::{UnaryFn, builtin};
use crate::dtype::{DType, ElemType, Element, read, write};
use crate::error::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// Built-in unary operator codes.
///
/// The numeric values are part of kernel signatures and must stay stable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UnaryOpcode {
    /// `z = x`
    Identity = 1,
    /// `z = -x`
    Ainv = 2,
    /// `z = |x|`
    Abs = 3,
    /// `z = 1 / x`
    Minv = 4,
    /// `z = 1`
    One = 5,
    /// `z = !(x != 0)`
    Lnot = 6,
}

impl UnaryOpcode {
    /// Decode a signature opcode; unknown codes decode to `Identity`
    pub const fn decode(code: u8) -> Self {
        match code {
            2 => UnaryOpcode::Ainv,
            3 => UnaryOpcode::Abs,
            4 => UnaryOpcode::Minv,
            5 => UnaryOpcode::One,
            6 => UnaryOpcode::Lnot,
            _ => UnaryOpcode::Identity,
        }
    }

    /// Operator name
    pub const fn name(self) -> &'static str {
        match self {
            UnaryOpcode::Identity => "identity",
            UnaryOpcode::Ainv => "ainv",
            UnaryOpcode::Abs => "abs",
            UnaryOpcode::Minv => "minv",
            UnaryOpcode::One => "one",
            UnaryOpcode::Lnot => "lnot",
        }
    }
}

/// A caller-defined unary operator `z = f(x)`.
pub struct UserUnaryOp {
    name: String,
    xtype: ElemType,
    ztype: ElemType,
    func: UnaryFn,
    definition: Option<String>,
}

impl UserUnaryOp {
    /// Operator over raw element bytes
    pub fn new<F>(name: impl Into<String>, xtype: ElemType, ztype: ElemType, func: F) -> Self
    where
        F: Fn(&mut [u8], &[u8]) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            xtype,
            ztype,
            func: Arc::new(func),
            definition: None,
        }
    }

    /// Operator over built-in types
    pub fn from_fn<X: Element, Z: Element>(
        name: impl Into<String>,
        f: impl Fn(X) -> Z + Send + Sync + 'static,
    ) -> Self {
        Self::new(
            name,
            X::DTYPE.into(),
            Z::DTYPE.into(),
            move |z: &mut [u8], x: &[u8]| write(z, f(read::<X>(x))),
        )
    }

    /// Attach the C definition of a function `void name (ztype *z, const xtype *x)`
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

impl fmt::Debug for UserUnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserUnaryOp")
            .field("name", &self.name)
            .field("xtype", &self.xtype)
            .field("ztype", &self.ztype)
            .field("defined", &self.definition.is_some())
            .finish()
    }
}

/// A unary operator: built-in on one type, or user-defined.
#[derive(Clone, Debug)]
pub enum UnaryOp {
    /// Built-in operator with `x` and `z` of type `ty`
    Builtin {
        /// Operator code
        opcode: UnaryOpcode,
        /// Input and output type
        ty: ElemType,
    },
    /// User-defined operator
    User(Arc<UserUnaryOp>),
}

impl UnaryOp {
    /// Built-in operator; only `Identity` accepts user types
    pub fn new(opcode: UnaryOpcode, ty: impl Into<ElemType>) -> Result<Self> {
        let ty = ty.into();
        if !ty.is_builtin() && opcode != UnaryOpcode::Identity {
            return Err(Error::invalid_argument(
                "opcode",
                format!("{} is not defined on user type {}", opcode.name(), ty),
            ));
        }
        Ok(UnaryOp::Builtin { opcode, ty })
    }

    /// `z = x`
    pub fn identity(ty: impl Into<ElemType>) -> Self {
        UnaryOp::Builtin {
            opcode: UnaryOpcode::Identity,
            ty: ty.into(),
        }
    }

    /// Built-in operator on a built-in type
    pub fn builtin(opcode: UnaryOpcode, ty: DType) -> Self {
        UnaryOp::Builtin {
            opcode,
            ty: ty.into(),
        }
    }

    /// Wrap a user operator
    pub fn user(op: UserUnaryOp) -> Self {
        UnaryOp::User(Arc::new(op))
    }

    /// Input type
    pub fn xtype(&self) -> &ElemType {
        match self {
            UnaryOp::Builtin { ty, .. } => ty,
            UnaryOp::User(u) => &u.xtype,
        }
    }

    /// Output type
    pub fn ztype(&self) -> &ElemType {
        match self {
            UnaryOp::Builtin { ty, .. } => ty,
            UnaryOp::User(u) => &u.ztype,
        }
    }

    /// Returns true for built-in operators
    pub fn is_builtin(&self) -> bool {
        matches!(self, UnaryOp::Builtin { .. })
    }

    /// Display name
    pub fn name(&self) -> String {
        match self {
            UnaryOp::Builtin { opcode, ty } => format!("{}_{}", opcode.name(), ty),
            UnaryOp::User(u) => u.name.clone(),
        }
    }

    /// Byte-level implementation used by the generic kernel
    pub fn to_fn(&self) -> UnaryFn {
        match self {
            UnaryOp::User(u) => u.func.clone(),
            UnaryOp::Builtin { opcode, ty } => match ty.dtype() {
                Some(d) => {
                    let op = *opcode;
                    crate::dispatch_dtype!(d, T => {
                        Arc::new(move |z: &mut [u8], x: &[u8]| {
                            write(z, builtin::unary::<T>(op, read::<T>(x)))
                        }) as UnaryFn
                    })
                }
                None => {
                    // identity on a user type
                    let n = ty.size();
                    Arc::new(move |z: &mut [u8], x: &[u8]| z[..n].copy_from_slice(&x[..n]))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_fn() {
        let f = UnaryOp::builtin(UnaryOpcode::Ainv, DType::I32).to_fn();
        let mut z = [0u8; 4];
        f(&mut z, &7i32.to_le_bytes());
        assert_eq!(i32::from_le_bytes(z), -7);
    }

    #[test]
    fn test_user_fn() {
        let op = UnaryOp::user(UserUnaryOp::from_fn("half", |x: f64| (x / 2.0) as f32));
        assert_eq!(op.xtype(), &ElemType::from(DType::F64));
        assert_eq!(op.ztype(), &ElemType::from(DType::F32));
        let mut z = [0u8; 4];
        (op.to_fn())(&mut z, &5.0f64.to_le_bytes());
        assert_eq!(f32::from_le_bytes(z), 2.5);
    }

    #[test]
    fn test_user_type_rejects_arithmetic() {
        use crate::dtype::UserType;
        let u = ElemType::User(Arc::new(UserType::new("blob", 3)));
        assert!(UnaryOp::new(UnaryOpcode::Abs, u.clone()).is_err());
        assert!(UnaryOp::new(UnaryOpcode::Identity, u).is_ok());
    }
}
