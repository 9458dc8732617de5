//! Type-erased value storage

use crate::dtype::Element;
use crate::error::{Error, Result};

/// Contiguous array of equally sized elements, 8-byte aligned.
///
/// Backed by `u64` words so that typed views through bytemuck are always
/// aligned for every built-in type.
#[derive(Clone, Debug, Default)]
pub struct Values {
    words: Vec<u64>,
    len: usize,
    size: usize,
}

impl Values {
    /// `len` zeroed elements of `size` bytes; allocation failure is reported
    pub fn try_zeroed(len: usize, size: usize) -> Result<Self> {
        let nbytes = len.checked_mul(size).ok_or_else(|| Error::oom(len, size))?;
        let nwords = nbytes.div_ceil(8);
        let mut words = Vec::new();
        words
            .try_reserve_exact(nwords)
            .map_err(|_| Error::oom(nwords, 8))?;
        words.resize(nwords, 0);
        Ok(Self { words, len, size })
    }

    /// Copy of raw bytes holding whole elements of `size` bytes
    pub fn from_bytes(bytes: &[u8], size: usize) -> Result<Self> {
        if size == 0 || bytes.len() % size != 0 {
            return Err(Error::invalid_argument(
                "bytes",
                format!("{} bytes is not a multiple of element size {}", bytes.len(), size),
            ));
        }
        let mut v = Self::try_zeroed(bytes.len() / size, size)?;
        v.bytes_mut().copy_from_slice(bytes);
        Ok(v)
    }

    /// Copy of a typed slice
    pub fn from_slice<T: Element>(data: &[T]) -> Result<Self> {
        Self::from_bytes(bytemuck::cast_slice(data), std::mem::size_of::<T>())
    }

    /// `len` copies of one element
    pub fn filled(value: &[u8], len: usize) -> Result<Self> {
        let size = value.len();
        let mut v = Self::try_zeroed(len, size)?;
        for chunk in v.bytes_mut().chunks_exact_mut(size.max(1)) {
            chunk.copy_from_slice(value);
        }
        Ok(v)
    }

    /// Number of elements
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if there are no elements
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of one element in bytes
    #[inline]
    pub fn elem_size(&self) -> usize {
        self.size
    }

    /// All element bytes
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.len * self.size]
    }

    /// All element bytes, mutable
    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        let n = self.len * self.size;
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..n]
    }

    /// Bytes of element `k`
    #[inline]
    pub fn get(&self, k: usize) -> &[u8] {
        &self.bytes()[k * self.size..(k + 1) * self.size]
    }

    /// Typed view; `T` must have this storage's element size
    pub fn typed<T: Element>(&self) -> &[T] {
        bytemuck::cast_slice(self.bytes())
    }

    /// Typed mutable view; `T` must have this storage's element size
    pub fn typed_mut<T: Element>(&mut self) -> &mut [T] {
        bytemuck::cast_slice_mut(self.bytes_mut())
    }

    /// Shrink to the first `len` elements
    pub fn truncate(&mut self, len: usize) {
        if len < self.len {
            self.len = len;
            self.words.truncate((len * self.size).div_ceil(8));
        }
    }
}
