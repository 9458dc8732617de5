//! Element trait for mapping Rust types to DType

use super::{DType, Wide};
use bytemuck::{Pod, Zeroable};
use std::fmt;

/// Boolean element stored as a single byte holding 0 or 1.
///
/// `bool` itself is not `Pod` (only 0 and 1 are valid bit patterns), so
/// boolean matrices hold this wrapper instead.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct Bool(pub u8);

impl Bool {
    /// True
    pub const TRUE: Bool = Bool(1);
    /// False
    pub const FALSE: Bool = Bool(0);

    /// Value as a native bool
    #[inline]
    pub const fn get(self) -> bool {
        self.0 != 0
    }
}

impl From<bool> for Bool {
    #[inline]
    fn from(b: bool) -> Self {
        Bool(b as u8)
    }
}

impl From<Bool> for bool {
    #[inline]
    fn from(b: Bool) -> Self {
        b.get()
    }
}

impl fmt::Debug for Bool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Trait for types that can be elements of a matrix
///
/// This connects Rust's type system to the runtime `DType`. Besides the
/// conversions, it carries the arithmetic the built-in operators use, with
/// integer semantics fixed so that factory, generic and compiled kernels agree:
/// integer add/sub/mul wrap, and integer division by zero saturates
/// (`0/0 = 0`, `x/0 = MAX` for positive `x`, `MIN` for negative `x`).
pub trait Element:
    Copy + Clone + Send + Sync + Pod + Zeroable + PartialOrd + fmt::Debug + 'static
{
    /// The corresponding DType for this Rust type
    const DTYPE: DType;

    /// Convert to f64
    fn to_f64(self) -> f64;

    /// Convert from f64 (saturating for integers, NaN becomes 0)
    fn from_f64(v: f64) -> Self;

    /// Widen losslessly (floats) or exactly (integers)
    fn to_wide(self) -> Wide;

    /// Narrow from the wide intermediate with cast semantics
    fn from_wide(w: Wide) -> Self;

    /// Zero value
    fn zero() -> Self;

    /// One value
    fn one() -> Self;

    /// Smallest value (negative infinity for floats)
    fn lowest() -> Self;

    /// Largest value (positive infinity for floats)
    fn highest() -> Self;

    /// Returns true unless the value equals zero
    fn is_nonzero(self) -> bool;

    /// `self + rhs`
    fn plus(self, rhs: Self) -> Self;

    /// `self - rhs`
    fn minus(self, rhs: Self) -> Self;

    /// `self * rhs`
    fn times(self, rhs: Self) -> Self;

    /// `self / rhs`
    fn divide(self, rhs: Self) -> Self;

    /// Additive inverse
    fn ainv(self) -> Self;

    /// Absolute value
    fn absolute(self) -> Self;

    /// Minimum, ignoring NaN
    fn minimum(self, rhs: Self) -> Self;

    /// Maximum, ignoring NaN
    fn maximum(self, rhs: Self) -> Self;
}

macro_rules! int_common {
    ($t:ty, $dtype:ident) => {
        const DTYPE: DType = DType::$dtype;

        #[inline]
        fn to_f64(self) -> f64 {
            self as f64
        }

        #[inline]
        fn from_f64(v: f64) -> Self {
            v as $t
        }

        #[inline]
        fn to_wide(self) -> Wide {
            Wide::Int(self as i128)
        }

        #[inline]
        fn from_wide(w: Wide) -> Self {
            match w {
                Wide::Int(v) => v as $t,
                Wide::Float(v) => v as $t,
            }
        }

        #[inline]
        fn zero() -> Self {
            0
        }

        #[inline]
        fn one() -> Self {
            1
        }

        #[inline]
        fn lowest() -> Self {
            <$t>::MIN
        }

        #[inline]
        fn highest() -> Self {
            <$t>::MAX
        }

        #[inline]
        fn is_nonzero(self) -> bool {
            self != 0
        }

        #[inline]
        fn plus(self, rhs: Self) -> Self {
            self.wrapping_add(rhs)
        }

        #[inline]
        fn minus(self, rhs: Self) -> Self {
            self.wrapping_sub(rhs)
        }

        #[inline]
        fn times(self, rhs: Self) -> Self {
            self.wrapping_mul(rhs)
        }

        #[inline]
        fn ainv(self) -> Self {
            self.wrapping_neg()
        }

        #[inline]
        fn minimum(self, rhs: Self) -> Self {
            std::cmp::min(self, rhs)
        }

        #[inline]
        fn maximum(self, rhs: Self) -> Self {
            std::cmp::max(self, rhs)
        }
    };
}

macro_rules! impl_signed_element {
    ($t:ty, $dtype:ident) => {
        impl Element for $t {
            int_common!($t, $dtype);

            #[inline]
            fn divide(self, rhs: Self) -> Self {
                if rhs == 0 {
                    if self == 0 {
                        0
                    } else if self < 0 {
                        <$t>::MIN
                    } else {
                        <$t>::MAX
                    }
                } else {
                    self.wrapping_div(rhs)
                }
            }

            #[inline]
            fn absolute(self) -> Self {
                self.wrapping_abs()
            }
        }
    };
}

macro_rules! impl_unsigned_element {
    ($t:ty, $dtype:ident) => {
        impl Element for $t {
            int_common!($t, $dtype);

            #[inline]
            fn divide(self, rhs: Self) -> Self {
                if rhs == 0 {
                    if self == 0 { 0 } else { <$t>::MAX }
                } else {
                    self / rhs
                }
            }

            #[inline]
            fn absolute(self) -> Self {
                self
            }
        }
    };
}

impl_signed_element!(i8, I8);
impl_signed_element!(i16, I16);
impl_signed_element!(i32, I32);
impl_signed_element!(i64, I64);
impl_unsigned_element!(u8, U8);
impl_unsigned_element!(u16, U16);
impl_unsigned_element!(u32, U32);
impl_unsigned_element!(u64, U64);

macro_rules! impl_float_element {
    ($t:ty, $dtype:ident) => {
        impl Element for $t {
            const DTYPE: DType = DType::$dtype;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                v as $t
            }

            #[inline]
            fn to_wide(self) -> Wide {
                Wide::Float(self as f64)
            }

            #[inline]
            fn from_wide(w: Wide) -> Self {
                match w {
                    Wide::Int(v) => v as $t,
                    Wide::Float(v) => v as $t,
                }
            }

            #[inline]
            fn zero() -> Self {
                0.0
            }

            #[inline]
            fn one() -> Self {
                1.0
            }

            #[inline]
            fn lowest() -> Self {
                <$t>::NEG_INFINITY
            }

            #[inline]
            fn highest() -> Self {
                <$t>::INFINITY
            }

            #[inline]
            fn is_nonzero(self) -> bool {
                self != 0.0
            }

            #[inline]
            fn plus(self, rhs: Self) -> Self {
                self + rhs
            }

            #[inline]
            fn minus(self, rhs: Self) -> Self {
                self - rhs
            }

            #[inline]
            fn times(self, rhs: Self) -> Self {
                self * rhs
            }

            #[inline]
            fn divide(self, rhs: Self) -> Self {
                self / rhs
            }

            #[inline]
            fn ainv(self) -> Self {
                -self
            }

            #[inline]
            fn absolute(self) -> Self {
                self.abs()
            }

            #[inline]
            fn minimum(self, rhs: Self) -> Self {
                self.min(rhs)
            }

            #[inline]
            fn maximum(self, rhs: Self) -> Self {
                self.max(rhs)
            }
        }
    };
}

impl_float_element!(f32, F32);
impl_float_element!(f64, F64);

impl Element for Bool {
    const DTYPE: DType = DType::Bool;

    #[inline]
    fn to_f64(self) -> f64 {
        self.0 as f64
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        Bool::from(v != 0.0)
    }

    #[inline]
    fn to_wide(self) -> Wide {
        Wide::Int(self.get() as i128)
    }

    #[inline]
    fn from_wide(w: Wide) -> Self {
        match w {
            Wide::Int(v) => Bool::from(v != 0),
            Wide::Float(v) => Bool::from(v != 0.0),
        }
    }

    #[inline]
    fn zero() -> Self {
        Bool::FALSE
    }

    #[inline]
    fn one() -> Self {
        Bool::TRUE
    }

    #[inline]
    fn lowest() -> Self {
        Bool::FALSE
    }

    #[inline]
    fn highest() -> Self {
        Bool::TRUE
    }

    #[inline]
    fn is_nonzero(self) -> bool {
        self.get()
    }

    #[inline]
    fn plus(self, rhs: Self) -> Self {
        Bool::from(self.get() || rhs.get())
    }

    #[inline]
    fn minus(self, rhs: Self) -> Self {
        Bool::from(self.get() != rhs.get())
    }

    #[inline]
    fn times(self, rhs: Self) -> Self {
        Bool::from(self.get() && rhs.get())
    }

    #[inline]
    fn divide(self, _rhs: Self) -> Self {
        self
    }

    #[inline]
    fn ainv(self) -> Self {
        self
    }

    #[inline]
    fn absolute(self) -> Self {
        self
    }

    #[inline]
    fn minimum(self, rhs: Self) -> Self {
        Bool::from(self.get() && rhs.get())
    }

    #[inline]
    fn maximum(self, rhs: Self) -> Self {
        Bool::from(self.get() || rhs.get())
    }
}

#[cfg(feature = "f16")]
macro_rules! impl_half_element {
    ($t:ty, $dtype:ident) => {
        impl Element for $t {
            const DTYPE: DType = DType::$dtype;

            #[inline]
            fn to_f64(self) -> f64 {
                self.to_f64()
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                <$t>::from_f64(v)
            }

            #[inline]
            fn to_wide(self) -> Wide {
                Wide::Float(self.to_f64())
            }

            #[inline]
            fn from_wide(w: Wide) -> Self {
                match w {
                    Wide::Int(v) => <$t>::from_f64(v as f64),
                    Wide::Float(v) => <$t>::from_f64(v),
                }
            }

            #[inline]
            fn zero() -> Self {
                <$t>::ZERO
            }

            #[inline]
            fn one() -> Self {
                <$t>::ONE
            }

            #[inline]
            fn lowest() -> Self {
                <$t>::NEG_INFINITY
            }

            #[inline]
            fn highest() -> Self {
                <$t>::INFINITY
            }

            #[inline]
            fn is_nonzero(self) -> bool {
                self.to_f32() != 0.0
            }

            #[inline]
            fn plus(self, rhs: Self) -> Self {
                <$t>::from_f32(self.to_f32() + rhs.to_f32())
            }

            #[inline]
            fn minus(self, rhs: Self) -> Self {
                <$t>::from_f32(self.to_f32() - rhs.to_f32())
            }

            #[inline]
            fn times(self, rhs: Self) -> Self {
                <$t>::from_f32(self.to_f32() * rhs.to_f32())
            }

            #[inline]
            fn divide(self, rhs: Self) -> Self {
                <$t>::from_f32(self.to_f32() / rhs.to_f32())
            }

            #[inline]
            fn ainv(self) -> Self {
                -self
            }

            #[inline]
            fn absolute(self) -> Self {
                <$t>::from_f32(self.to_f32().abs())
            }

            #[inline]
            fn minimum(self, rhs: Self) -> Self {
                <$t>::from_f32(self.to_f32().min(rhs.to_f32()))
            }

            #[inline]
            fn maximum(self, rhs: Self) -> Self {
                <$t>::from_f32(self.to_f32().max(rhs.to_f32()))
            }
        }
    };
}

#[cfg(feature = "f16")]
impl_half_element!(half::f16, F16);
#[cfg(feature = "f16")]
impl_half_element!(half::bf16, BF16);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_division_by_zero() {
        assert_eq!(0i32.divide(0), 0);
        assert_eq!(7i32.divide(0), i32::MAX);
        assert_eq!((-7i32).divide(0), i32::MIN);
        assert_eq!(i32::MIN.divide(-1), i32::MIN);
        assert_eq!(9u8.divide(0), u8::MAX);
        assert_eq!(0u8.divide(0), 0);
    }

    #[test]
    fn test_wrapping_arithmetic() {
        assert_eq!(i8::MAX.plus(1), i8::MIN);
        assert_eq!(0u16.minus(1), u16::MAX);
        assert_eq!(i8::MIN.absolute(), i8::MIN);
        assert_eq!(5u32.ainv(), 5u32.wrapping_neg());
    }

    #[test]
    fn test_float_min_max_ignore_nan() {
        assert_eq!(f64::NAN.minimum(2.0), 2.0);
        assert_eq!(3.0f32.maximum(f32::NAN), 3.0);
    }

    #[test]
    fn test_bool_algebra() {
        let (t, f) = (Bool::TRUE, Bool::FALSE);
        assert_eq!(t.plus(f), t);
        assert_eq!(t.times(f), f);
        assert_eq!(t.minus(t), f);
        assert_eq!(f.maximum(t), t);
        assert_eq!(Bool::from_wide(Wide::Float(f64::NAN)), t);
    }
}
