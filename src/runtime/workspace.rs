//! Fallible workspace allocation
//!
//! Every per-call buffer (counts, offsets, scratch) goes through these helpers
//! so that exhausting memory surfaces as `Error::OutOfMemory` instead of an
//! abort. Buffers are plain `Vec`s owned by the call and dropped on every exit
//! path, including `?` returns.

use crate::error::{Error, Result};

/// `len` copies of `fill`
pub(crate) fn try_vec<T: Clone>(len: usize, fill: T) -> Result<Vec<T>> {
    let mut v = try_with_capacity(len)?;
    v.resize(len, fill);
    Ok(v)
}

/// Empty vector with room for `cap` elements
pub(crate) fn try_with_capacity<T>(cap: usize) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(cap)
        .map_err(|_| Error::oom(cap, std::mem::size_of::<T>()))?;
    Ok(v)
}

/// Make room for `additional` more elements in `v`
pub(crate) fn try_grow<T>(v: &mut Vec<T>, additional: usize) -> Result<()> {
    v.try_reserve(additional)
        .map_err(|_| Error::oom(v.len().saturating_add(additional), std::mem::size_of::<T>()))
}

/// Copy of a slice
pub(crate) fn try_copy<T: Clone>(src: &[T]) -> Result<Vec<T>> {
    let mut v = try_with_capacity(src.len())?;
    v.extend_from_slice(src);
    Ok(v)
}

/// `nrows * ncols` with overflow reported as an allocation failure
pub(crate) fn dense_len(nrows: usize, ncols: usize) -> Result<usize> {
    nrows.checked_mul(ncols).ok_or_else(|| Error::oom(nrows, ncols))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_vec() {
        let v = try_vec(4, 7i64).unwrap();
        assert_eq!(v, vec![7; 4]);
        assert!(try_vec::<u64>(usize::MAX / 2, 0).is_err());
    }

    #[test]
    fn test_try_grow() {
        let mut v = vec![1u32, 2];
        try_grow(&mut v, 10).unwrap();
        assert!(v.capacity() >= 12);
        assert!(matches!(
            try_grow(&mut v, usize::MAX / 2),
            Err(Error::OutOfMemory { .. })
        ));
        assert_eq!(v, vec![1, 2]);
    }

    #[test]
    fn test_dense_len_overflow() {
        assert_eq!(dense_len(3, 4).unwrap(), 12);
        assert!(dense_len(usize::MAX, 2).is_err());
    }
}
