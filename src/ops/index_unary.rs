//! Index-unary operators, used as selection predicates

use super::{IndexUnaryFn, builtin};
use crate::dtype::{DType, ElemType, Element, read};
use crate::error::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// Built-in index-unary operator codes.
///
/// Positional operators depend only on the entry's row `i`, column `j` and an
/// integer thunk; value operators compare the entry's value with the thunk.
/// The numeric values are part of kernel signatures and must stay stable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IndexUnaryOpcode {
    /// keep `i + thunk != 0`
    RowIndex = 1,
    /// keep `j + thunk != 0`, so a thunk of `-J` drops column `J`
    ColIndex = 2,
    /// keep `j <= i + thunk`
    Tril = 3,
    /// keep `j >= i + thunk`
    Triu = 4,
    /// keep `j == i + thunk`
    Diag = 5,
    /// keep `j != i + thunk`
    Offdiag = 6,
    /// keep `i <= thunk`
    RowLe = 7,
    /// keep `i > thunk`
    RowGt = 8,
    /// keep `j <= thunk`
    ColLe = 9,
    /// keep `j > thunk`
    ColGt = 10,
    /// keep `x == thunk`
    ValueEq = 11,
    /// keep `x != thunk`
    ValueNe = 12,
    /// keep `x > thunk`
    ValueGt = 13,
    /// keep `x >= thunk`
    ValueGe = 14,
    /// keep `x < thunk`
    ValueLt = 15,
    /// keep `x <= thunk`
    ValueLe = 16,
    /// keep entries that are not zombies; only used when assembling matrices
    NonZombie = 17,
}

impl IndexUnaryOpcode {
    /// Decode a signature opcode; unknown codes decode to `ValueEq`
    pub const fn decode(code: u8) -> Self {
        match code {
            1 => IndexUnaryOpcode::RowIndex,
            2 => IndexUnaryOpcode::ColIndex,
            3 => IndexUnaryOpcode::Tril,
            4 => IndexUnaryOpcode::Triu,
            5 => IndexUnaryOpcode::Diag,
            6 => IndexUnaryOpcode::Offdiag,
            7 => IndexUnaryOpcode::RowLe,
            8 => IndexUnaryOpcode::RowGt,
            9 => IndexUnaryOpcode::ColLe,
            10 => IndexUnaryOpcode::ColGt,
            12 => IndexUnaryOpcode::ValueNe,
            13 => IndexUnaryOpcode::ValueGt,
            14 => IndexUnaryOpcode::ValueGe,
            15 => IndexUnaryOpcode::ValueLt,
            16 => IndexUnaryOpcode::ValueLe,
            17 => IndexUnaryOpcode::NonZombie,
            _ => IndexUnaryOpcode::ValueEq,
        }
    }

    /// Returns true for operators that compare the entry value
    pub const fn is_value(self) -> bool {
        matches!(
            self,
            IndexUnaryOpcode::ValueEq
                | IndexUnaryOpcode::ValueNe
                | IndexUnaryOpcode::ValueGt
                | IndexUnaryOpcode::ValueGe
                | IndexUnaryOpcode::ValueLt
                | IndexUnaryOpcode::ValueLe
        )
    }

    /// Returns true for operators that only inspect the column index
    pub const fn is_column_selector(self) -> bool {
        matches!(
            self,
            IndexUnaryOpcode::ColIndex | IndexUnaryOpcode::ColLe | IndexUnaryOpcode::ColGt
        )
    }

    /// Operator name
    pub const fn name(self) -> &'static str {
        match self {
            IndexUnaryOpcode::RowIndex => "rowindex",
            IndexUnaryOpcode::ColIndex => "colindex",
            IndexUnaryOpcode::Tril => "tril",
            IndexUnaryOpcode::Triu => "triu",
            IndexUnaryOpcode::Diag => "diag",
            IndexUnaryOpcode::Offdiag => "offdiag",
            IndexUnaryOpcode::RowLe => "rowle",
            IndexUnaryOpcode::RowGt => "rowgt",
            IndexUnaryOpcode::ColLe => "colle",
            IndexUnaryOpcode::ColGt => "colgt",
            IndexUnaryOpcode::ValueEq => "valueeq",
            IndexUnaryOpcode::ValueNe => "valuene",
            IndexUnaryOpcode::ValueGt => "valuegt",
            IndexUnaryOpcode::ValueGe => "valuege",
            IndexUnaryOpcode::ValueLt => "valuelt",
            IndexUnaryOpcode::ValueLe => "valuele",
            IndexUnaryOpcode::NonZombie => "nonzombie",
        }
    }
}

/// A caller-defined selection predicate `keep = f(x, i, j, y)`.
pub struct UserIndexUnaryOp {
    name: String,
    xtype: ElemType,
    ytype: ElemType,
    func: IndexUnaryFn,
    definition: Option<String>,
    value_only: bool,
}

impl UserIndexUnaryOp {
    /// Predicate over raw element bytes
    pub fn new<F>(name: impl Into<String>, xtype: ElemType, ytype: ElemType, func: F) -> Self
    where
        F: Fn(&[u8], i64, i64, &[u8]) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            xtype,
            ytype,
            func: Arc::new(func),
            definition: None,
            value_only: false,
        }
    }

    /// Predicate over built-in types
    pub fn from_fn<X: Element, Y: Element>(
        name: impl Into<String>,
        f: impl Fn(X, i64, i64, Y) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::new(
            name,
            X::DTYPE.into(),
            Y::DTYPE.into(),
            move |x: &[u8], i, j, y: &[u8]| f(read::<X>(x), i, j, read::<Y>(y)),
        )
    }

    /// Attach the C definition of
    /// `void name (bool *z, const xtype *x, int64_t i, int64_t j, const ytype *y)`
    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Some(definition.into());
        self
    }

    /// Declare that the predicate ignores `i` and `j`, enabling iso shortcuts
    pub fn value_only(mut self) -> Self {
        self.value_only = true;
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

impl fmt::Debug for UserIndexUnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserIndexUnaryOp")
            .field("name", &self.name)
            .field("xtype", &self.xtype)
            .field("ytype", &self.ytype)
            .field("value_only", &self.value_only)
            .field("defined", &self.definition.is_some())
            .finish()
    }
}

/// A selection predicate: built-in or user-defined.
#[derive(Clone, Debug)]
pub enum IndexUnaryOp {
    /// Built-in operator; value operators compare in `ty`, positional ones use `I64`
    Builtin {
        /// Operator code
        opcode: IndexUnaryOpcode,
        /// Value and thunk type
        ty: DType,
    },
    /// User-defined operator
    User(Arc<UserIndexUnaryOp>),
}

impl IndexUnaryOp {
    /// Built-in operator; value operators need the type they compare in
    pub fn new(opcode: IndexUnaryOpcode, ty: DType) -> Result<Self> {
        if opcode == IndexUnaryOpcode::NonZombie {
            return Err(Error::invalid_argument(
                "opcode",
                "nonzombie is reserved for matrix assembly",
            ));
        }
        let ty = if opcode.is_value() { ty } else { DType::I64 };
        Ok(IndexUnaryOp::Builtin { opcode, ty })
    }

    /// Value operator comparing in `ty`
    pub fn value(opcode: IndexUnaryOpcode, ty: DType) -> Self {
        IndexUnaryOp::Builtin { opcode, ty }
    }

    /// Positional operator with an `i64` thunk
    pub fn positional(opcode: IndexUnaryOpcode) -> Self {
        IndexUnaryOp::Builtin {
            opcode,
            ty: DType::I64,
        }
    }

    pub(crate) fn nonzombie() -> Self {
        Self::positional(IndexUnaryOpcode::NonZombie)
    }

    /// Wrap a user operator
    pub fn user(op: UserIndexUnaryOp) -> Self {
        IndexUnaryOp::User(Arc::new(op))
    }

    /// Built-in opcode, if any
    pub fn opcode(&self) -> Option<IndexUnaryOpcode> {
        match self {
            IndexUnaryOp::Builtin { opcode, .. } => Some(*opcode),
            IndexUnaryOp::User(_) => None,
        }
    }

    /// Returns true if the result depends only on the entry value
    pub fn is_value_only(&self) -> bool {
        match self {
            IndexUnaryOp::Builtin { opcode, .. } => opcode.is_value(),
            IndexUnaryOp::User(u) => u.value_only,
        }
    }

    /// Returns true if the result depends only on the position
    pub fn is_positional(&self) -> bool {
        matches!(self, IndexUnaryOp::Builtin { opcode, .. } if !opcode.is_value())
    }

    /// Type the entry value is cast to before evaluation
    pub fn xtype(&self) -> &ElemType {
        match self {
            IndexUnaryOp::Builtin { ty, .. } => dtype_ref(*ty),
            IndexUnaryOp::User(u) => &u.xtype,
        }
    }

    /// Thunk type
    pub fn ytype(&self) -> &ElemType {
        match self {
            IndexUnaryOp::Builtin { ty, .. } => dtype_ref(*ty),
            IndexUnaryOp::User(u) => &u.ytype,
        }
    }

    /// Returns true for built-in operators
    pub fn is_builtin(&self) -> bool {
        matches!(self, IndexUnaryOp::Builtin { .. })
    }

    /// Display name
    pub fn name(&self) -> String {
        match self {
            IndexUnaryOp::Builtin { opcode, ty } => format!("{}_{}", opcode.name(), ty),
            IndexUnaryOp::User(u) => u.name.clone(),
        }
    }

    /// Byte-level implementation used by the generic kernel
    pub fn to_fn(&self) -> IndexUnaryFn {
        match self {
            IndexUnaryOp::User(u) => u.func.clone(),
            IndexUnaryOp::Builtin { opcode, ty } => {
                let op = *opcode;
                if op.is_value() {
                    crate::dispatch_dtype!(*ty, T => {
                        Arc::new(move |x: &[u8], _i: i64, _j: i64, y: &[u8]| {
                            builtin::value_keep::<T>(op, read(x), read(y))
                        }) as IndexUnaryFn
                    })
                } else {
                    Arc::new(move |_x: &[u8], i: i64, j: i64, y: &[u8]| {
                        builtin::positional_keep(op, i, j, read::<i64>(y))
                    })
                }
            }
        }
    }
}

fn dtype_ref(d: DType) -> &'static ElemType {
    macro_rules! statics {
        ($($name:ident => $v:ident),* $(,)?) => {
            match d {
                $(DType::$v => {
                    static $name: ElemType = ElemType::Builtin(DType::$v);
                    &$name
                })*
                #[cfg(feature = "f16")]
                DType::F16 => {
                    static F16_T: ElemType = ElemType::Builtin(DType::F16);
                    &F16_T
                }
                #[cfg(feature = "f16")]
                DType::BF16 => {
                    static BF16_T: ElemType = ElemType::Builtin(DType::BF16);
                    &BF16_T
                }
            }
        };
    }
    statics!(
        BOOL_T => Bool, I8_T => I8, U8_T => U8, I16_T => I16, U16_T => U16,
        I32_T => I32, U32_T => U32, I64_T => I64, U64_T => U64, F32_T => F32, F64_T => F64,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_ops_use_i64_thunk() {
        let op = IndexUnaryOp::new(IndexUnaryOpcode::Tril, DType::F32).unwrap();
        assert_eq!(op.ytype(), &ElemType::from(DType::I64));
        assert!(op.is_positional());
        assert!(!op.is_value_only());
        assert!(IndexUnaryOp::new(IndexUnaryOpcode::NonZombie, DType::I64).is_err());
    }

    #[test]
    fn test_value_fn() {
        let op = IndexUnaryOp::value(IndexUnaryOpcode::ValueLe, DType::I16);
        let f = op.to_fn();
        assert!(f(&5i16.to_le_bytes(), 0, 0, &5i16.to_le_bytes()));
        assert!(!f(&6i16.to_le_bytes(), 0, 0, &5i16.to_le_bytes()));
    }

    #[test]
    fn test_user_value_only_flag() {
        let op = IndexUnaryOp::user(
            UserIndexUnaryOp::from_fn("even", |x: i32, _i, _j, _y: i32| x % 2 == 0).value_only(),
        );
        assert!(op.is_value_only());
        assert!(!op.is_positional());
    }
}
