//! Element type system for sparx matrices
//!
//! `DType` enumerates the built-in element types. `UserType` describes an opaque
//! fixed-size type supplied by the caller, and `ElemType` is the union of both
//! that every matrix, scalar and operator is tagged with.

mod cast;
mod element;
mod scalar;
mod user;

pub use cast::{CastFn, Wide, cast_fn};
pub(crate) use cast::{builtin_cast_fn, read, write};
pub use element::{Bool, Element};
pub use scalar::Scalar;
pub use user::UserType;

use std::fmt;
use std::sync::Arc;

/// Type code reserved for user-defined element types in kernel signatures.
pub const USER_TYPE_CODE: u8 = 14;

// ============================================================================
// DType Enum
// ============================================================================

/// Built-in element types.
///
/// # Discriminant Values
///
/// Discriminants double as the 4-bit type codes embedded in kernel signatures
/// and must stay stable across releases, since compiled kernels persisted on
/// disk are looked up by those codes. 0 marks "no type", 14 marks a user type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
#[repr(u8)]
pub enum DType {
    /// Boolean, stored as one byte holding 0 or 1
    Bool = 1,
    /// 8-bit signed integer
    I8 = 2,
    /// 8-bit unsigned integer
    U8 = 3,
    /// 16-bit signed integer
    I16 = 4,
    /// 16-bit unsigned integer
    U16 = 5,
    /// 32-bit signed integer
    I32 = 6,
    /// 32-bit unsigned integer
    U32 = 7,
    /// 64-bit signed integer
    I64 = 8,
    /// 64-bit unsigned integer
    U64 = 9,
    /// 32-bit floating point
    F32 = 10,
    /// 64-bit floating point
    F64 = 11,
    /// 16-bit floating point (IEEE 754)
    #[cfg(feature = "f16")]
    F16 = 12,
    /// 16-bit brain floating point
    #[cfg(feature = "f16")]
    BF16 = 13,
}

impl DType {
    /// All built-in types available in this build
    pub const ALL: &'static [DType] = &[
        DType::Bool,
        DType::I8,
        DType::U8,
        DType::I16,
        DType::U16,
        DType::I32,
        DType::U32,
        DType::I64,
        DType::U64,
        DType::F32,
        DType::F64,
        #[cfg(feature = "f16")]
        DType::F16,
        #[cfg(feature = "f16")]
        DType::BF16,
    ];

    /// Size of one element in bytes
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            DType::Bool | DType::I8 | DType::U8 => 1,
            DType::I16 | DType::U16 => 2,
            #[cfg(feature = "f16")]
            DType::F16 | DType::BF16 => 2,
            DType::I32 | DType::U32 | DType::F32 => 4,
            DType::I64 | DType::U64 | DType::F64 => 8,
        }
    }

    /// Stable 4-bit code used in kernel signatures
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Inverse of [`DType::code`]
    pub fn from_code(code: u8) -> Option<DType> {
        DType::ALL.iter().copied().find(|d| d.code() == code)
    }

    /// Returns true if this is a floating point type
    #[inline]
    pub const fn is_float(self) -> bool {
        match self {
            DType::F32 | DType::F64 => true,
            #[cfg(feature = "f16")]
            DType::F16 | DType::BF16 => true,
            _ => false,
        }
    }

    /// Returns true if this is a signed integer type
    #[inline]
    pub const fn is_signed_int(self) -> bool {
        matches!(self, DType::I8 | DType::I16 | DType::I32 | DType::I64)
    }

    /// Returns true if this is an unsigned integer type
    #[inline]
    pub const fn is_unsigned_int(self) -> bool {
        matches!(self, DType::U8 | DType::U16 | DType::U32 | DType::U64)
    }

    /// Returns true if this is an integer type of either signedness
    #[inline]
    pub const fn is_int(self) -> bool {
        self.is_signed_int() || self.is_unsigned_int()
    }

    /// Returns true for the boolean type
    #[inline]
    pub const fn is_bool(self) -> bool {
        matches!(self, DType::Bool)
    }

    /// Name used in diagnostics and kernel names
    pub const fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::I8 => "int8",
            DType::U8 => "uint8",
            DType::I16 => "int16",
            DType::U16 => "uint16",
            DType::I32 => "int32",
            DType::U32 => "uint32",
            DType::I64 => "int64",
            DType::U64 => "uint64",
            DType::F32 => "fp32",
            DType::F64 => "fp64",
            #[cfg(feature = "f16")]
            DType::F16 => "fp16",
            #[cfg(feature = "f16")]
            DType::BF16 => "bf16",
        }
    }

    /// C type spelling for generated kernels, `None` when C has no portable equivalent
    pub const fn c_name(self) -> Option<&'static str> {
        match self {
            DType::Bool => Some("bool"),
            DType::I8 => Some("int8_t"),
            DType::U8 => Some("uint8_t"),
            DType::I16 => Some("int16_t"),
            DType::U16 => Some("uint16_t"),
            DType::I32 => Some("int32_t"),
            DType::U32 => Some("uint32_t"),
            DType::I64 => Some("int64_t"),
            DType::U64 => Some("uint64_t"),
            DType::F32 => Some("float"),
            DType::F64 => Some("double"),
            #[cfg(feature = "f16")]
            DType::F16 | DType::BF16 => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// ElemType
// ============================================================================

/// Element type of a matrix, scalar or operator operand.
#[derive(Clone, Debug)]
pub enum ElemType {
    /// One of the built-in types
    Builtin(DType),
    /// A caller-defined opaque type
    User(Arc<UserType>),
}

impl ElemType {
    /// Size of one element in bytes
    #[inline]
    pub fn size(&self) -> usize {
        match self {
            ElemType::Builtin(d) => d.size_in_bytes(),
            ElemType::User(u) => u.size(),
        }
    }

    /// Signature type code
    #[inline]
    pub fn code(&self) -> u8 {
        match self {
            ElemType::Builtin(d) => d.code(),
            ElemType::User(_) => USER_TYPE_CODE,
        }
    }

    /// The built-in type, if any
    #[inline]
    pub fn dtype(&self) -> Option<DType> {
        match self {
            ElemType::Builtin(d) => Some(*d),
            ElemType::User(_) => None,
        }
    }

    /// Returns true for built-in types
    #[inline]
    pub fn is_builtin(&self) -> bool {
        matches!(self, ElemType::Builtin(_))
    }

    /// The user type, if any
    pub fn user(&self) -> Option<&Arc<UserType>> {
        match self {
            ElemType::Builtin(_) => None,
            ElemType::User(u) => Some(u),
        }
    }

    /// Returns true if values of `self` can be cast to `to`.
    ///
    /// Any built-in type casts to any other; user types only to themselves.
    pub fn castable_to(&self, to: &ElemType) -> bool {
        match (self, to) {
            (ElemType::Builtin(_), ElemType::Builtin(_)) => true,
            _ => self == to,
        }
    }
}

impl PartialEq for ElemType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ElemType::Builtin(a), ElemType::Builtin(b)) => a == b,
            (ElemType::User(a), ElemType::User(b)) => {
                Arc::ptr_eq(a, b) || (a.name() == b.name() && a.size() == b.size())
            }
            _ => false,
        }
    }
}

impl Eq for ElemType {}

impl From<DType> for ElemType {
    fn from(d: DType) -> Self {
        ElemType::Builtin(d)
    }
}

impl From<Arc<UserType>> for ElemType {
    fn from(u: Arc<UserType>) -> Self {
        ElemType::User(u)
    }
}

impl fmt::Display for ElemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElemType::Builtin(d) => write!(f, "{d}"),
            ElemType::User(u) => write!(f, "{}", u.name()),
        }
    }
}
