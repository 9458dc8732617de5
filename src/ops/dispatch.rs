//! DType dispatch utilities
//!
//! `dispatch_dtype!` turns a runtime `DType` into a concrete Rust type bound to
//! an identifier inside a block. It is how the factory table and the generic
//! kernel builders reach monomorphized code from a runtime type tag.
//!
//! ```ignore
//! fn elem_size(dtype: DType) -> usize {
//!     dispatch_dtype!(dtype, T => { std::mem::size_of::<T>() })
//! }
//! ```
//!
//! ## Supported Types
//!
//! - `Bool` -> `crate::dtype::Bool`
//! - `I8`..`I64` -> `i8`..`i64`, `U8`..`U64` -> `u8`..`u64`
//! - `F32` -> `f32`, `F64` -> `f64`
//! - `F16` -> `half::f16`, `BF16` -> `half::bf16` (requires "f16" feature)

/// Macro for runtime dtype dispatch to typed code.
///
/// Every arm evaluates `$body` with `$T` bound to the matching element type,
/// so the body must produce the same type in every arm.
#[macro_export]
macro_rules! dispatch_dtype {
    ($dtype:expr, $T:ident => $body:block) => {
        match $dtype {
            $crate::dtype::DType::Bool => {
                type $T = $crate::dtype::Bool;
                $body
            }
            $crate::dtype::DType::I8 => {
                type $T = i8;
                $body
            }
            $crate::dtype::DType::U8 => {
                type $T = u8;
                $body
            }
            $crate::dtype::DType::I16 => {
                type $T = i16;
                $body
            }
            $crate::dtype::DType::U16 => {
                type $T = u16;
                $body
            }
            $crate::dtype::DType::I32 => {
                type $T = i32;
                $body
            }
            $crate::dtype::DType::U32 => {
                type $T = u32;
                $body
            }
            $crate::dtype::DType::I64 => {
                type $T = i64;
                $body
            }
            $crate::dtype::DType::U64 => {
                type $T = u64;
                $body
            }
            $crate::dtype::DType::F32 => {
                type $T = f32;
                $body
            }
            $crate::dtype::DType::F64 => {
                type $T = f64;
                $body
            }
            #[cfg(feature = "f16")]
            $crate::dtype::DType::F16 => {
                type $T = half::f16;
                $body
            }
            #[cfg(feature = "f16")]
            $crate::dtype::DType::BF16 => {
                type $T = half::bf16;
                $body
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::dtype::{DType, Element};

    fn size_via_dispatch(dtype: DType) -> usize {
        crate::dispatch_dtype!(dtype, T => { std::mem::size_of::<T>() })
    }

    fn dtype_roundtrip(dtype: DType) -> DType {
        crate::dispatch_dtype!(dtype, T => { <T as Element>::DTYPE })
    }

    #[test]
    fn test_dispatch_binds_matching_type() {
        for &d in DType::ALL {
            assert_eq!(size_via_dispatch(d), d.size_in_bytes());
            assert_eq!(dtype_roundtrip(d), d);
        }
    }
}
