//! Byte-level casting between element types

use super::{DType, ElemType, Element};

/// Wide intermediate every built-in type converts through.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Wide {
    /// Any integer or boolean value
    Int(i128),
    /// Any floating point value
    Float(f64),
}

/// Casts one element from the source byte slice into the destination slice.
///
/// `dst` holds at least one element of the target type and `src` at least one
/// element of the source type; neither needs to be aligned.
pub type CastFn = fn(dst: &mut [u8], src: &[u8]);

#[inline]
pub(crate) fn read<T: Element>(bytes: &[u8]) -> T {
    bytemuck::pod_read_unaligned(&bytes[..std::mem::size_of::<T>()])
}

#[inline]
pub(crate) fn write<T: Element>(bytes: &mut [u8], value: T) {
    bytes[..std::mem::size_of::<T>()].copy_from_slice(bytemuck::bytes_of(&value));
}

fn cast_one<A: Element, Z: Element>(dst: &mut [u8], src: &[u8]) {
    let a: A = read(src);
    write(dst, Z::from_wide(a.to_wide()));
}

fn copy_one<const N: usize>(dst: &mut [u8], src: &[u8]) {
    dst[..N].copy_from_slice(&src[..N]);
}

fn cast_from<A: Element>(to: DType) -> CastFn {
    crate::dispatch_dtype!(to, Z => { cast_one::<A, Z> as CastFn })
}

fn builtin_cast(from: DType, to: DType) -> CastFn {
    if from == to {
        return match from.size_in_bytes() {
            1 => copy_one::<1> as CastFn,
            2 => copy_one::<2> as CastFn,
            4 => copy_one::<4> as CastFn,
            _ => copy_one::<8> as CastFn,
        };
    }
    crate::dispatch_dtype!(from, A => { cast_from::<A>(to) })
}

/// Cast routine between two element types.
///
/// Returns `None` when no cast exists (a user type to anything but itself).
/// A cast between identical user types is a plain copy and is reported as
/// `Some(None)` so callers can skip the call.
pub fn cast_fn(from: &ElemType, to: &ElemType) -> Option<Option<CastFn>> {
    match (from, to) {
        (ElemType::Builtin(a), ElemType::Builtin(b)) if a == b => Some(None),
        (ElemType::Builtin(a), ElemType::Builtin(b)) => Some(Some(builtin_cast(*a, *b))),
        _ if from == to => Some(None),
        _ => None,
    }
}

/// Cast that always succeeds for built-in pairs, including the identity.
pub(crate) fn builtin_cast_fn(from: DType, to: DType) -> CastFn {
    builtin_cast(from, to)
}
