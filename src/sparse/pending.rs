//! Single-entry access and deferred structural changes
//!
//! Writes to an existing entry land in place. Inserting a new entry into a
//! compressed matrix only queues a pending tuple, and deleting one only marks
//! it as a zombie; `MatrixOps::wait` folds both back into the pattern.

use super::matrix::{Matrix, PendingTuple, Structure, flip, is_zombie, unflip};
use super::{Format, Values};
use crate::dtype::{ElemType, Element, Scalar};
use crate::error::{Error, Result};
use crate::runtime::workspace::try_with_capacity;
use std::sync::Arc;

impl Matrix {
    fn check_position(&self, row: usize, col: usize) -> Result<()> {
        if row >= self.nrows {
            return Err(Error::IndexOutOfBounds {
                index: row,
                size: self.nrows,
            });
        }
        if col >= self.ncols {
            return Err(Error::IndexOutOfBounds {
                index: col,
                size: self.ncols,
            });
        }
        Ok(())
    }

    /// Storage position of `(row, col)` in a compressed matrix, live or zombie
    pub(crate) fn find_entry(&self, row: usize, col: usize) -> Option<usize> {
        let c = self.compressed()?;
        let k = c.find(col as i64)?;
        let range = c.range(k);
        let row = row as i64;
        if self.jumbled {
            return range.clone().find(|&p| unflip(c.i[p]) == row);
        }
        let slice = &c.i[range.clone()];
        let q = slice.partition_point(|&v| unflip(v) < row);
        (q < slice.len() && unflip(slice[q]) == row).then_some(range.start + q)
    }

    fn write_value(&mut self, p: usize, value: &[u8]) -> Result<()> {
        if self.iso {
            if self.x.get(0) == value {
                return Ok(());
            }
            self.expand_iso()?;
        }
        let size = self.ty.size();
        Arc::make_mut(&mut self.x).bytes_mut()[p * size..(p + 1) * size].copy_from_slice(value);
        Ok(())
    }

    /// Set `A(row, col) = value`, casting to the matrix type
    pub fn set_element_scalar(&mut self, row: usize, col: usize, value: &Scalar) -> Result<()> {
        self.check_position(row, col)?;
        let value = value.cast(&self.ty)?;
        let slot = row + col * self.nrows;
        match &mut self.structure {
            Structure::Full => self.write_value(slot, value.bytes()),
            Structure::Bitmap { .. } => {
                self.write_value(slot, value.bytes())?;
                if let Structure::Bitmap { b, nvals } = &mut self.structure {
                    if b[slot] == 0 {
                        Arc::make_mut(b)[slot] = 1;
                        *nvals += 1;
                    }
                }
                Ok(())
            }
            Structure::Sparse { .. } | Structure::Hypersparse { .. } => {
                match self.find_entry(row, col) {
                    Some(p) => {
                        self.write_value(p, value.bytes())?;
                        self.revive(p);
                        Ok(())
                    }
                    None => {
                        self.pending.try_reserve(1).map_err(|_| {
                            Error::oom(1, std::mem::size_of::<PendingTuple>())
                        })?;
                        self.pending.push(PendingTuple {
                            row: row as i64,
                            col: col as i64,
                            value: value.bytes().to_vec(),
                        });
                        Ok(())
                    }
                }
            }
        }
    }

    /// Set `A(row, col) = value`
    pub fn set_element<T: Element>(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        self.set_element_scalar(row, col, &Scalar::new(value))
    }

    fn revive(&mut self, p: usize) {
        if let Structure::Sparse { i, .. } | Structure::Hypersparse { i, .. } = &mut self.structure
        {
            if is_zombie(i[p]) {
                let i = Arc::make_mut(i);
                i[p] = unflip(i[p]);
                self.nzombies -= 1;
            }
        }
    }

    /// Delete `A(row, col)` if present.
    ///
    /// A full matrix is converted to bitmap first; a compressed matrix keeps a
    /// zombie until the next `wait`.
    pub fn remove_element(&mut self, row: usize, col: usize) -> Result<()> {
        self.check_position(row, col)?;
        self.pending
            .retain(|t| !(t.row == row as i64 && t.col == col as i64));
        if matches!(self.structure, Structure::Full) {
            *self = self.to_format(Format::Bitmap)?;
        }
        let slot = row + col * self.nrows;
        match &mut self.structure {
            Structure::Bitmap { b, nvals } => {
                if b[slot] != 0 {
                    Arc::make_mut(b)[slot] = 0;
                    *nvals -= 1;
                }
            }
            Structure::Sparse { .. } | Structure::Hypersparse { .. } => {
                if let Some(p) = self.find_entry(row, col) {
                    if let Structure::Sparse { i, .. } | Structure::Hypersparse { i, .. } =
                        &mut self.structure
                    {
                        if !is_zombie(i[p]) {
                            Arc::make_mut(i)[p] = flip(row as i64);
                            self.nzombies += 1;
                        }
                    }
                }
            }
            Structure::Full => {}
        }
        Ok(())
    }

    /// Value bytes of `A(row, col)`, looking through pending tuples first
    pub fn get_element_bytes(&self, row: usize, col: usize) -> Result<Option<&[u8]>> {
        self.check_position(row, col)?;
        if let Some(t) = self
            .pending
            .iter()
            .rev()
            .find(|t| t.row == row as i64 && t.col == col as i64)
        {
            return Ok(Some(&t.value));
        }
        let slot = row + col * self.nrows;
        Ok(match &self.structure {
            Structure::Full => Some(self.value(slot)),
            Structure::Bitmap { b, .. } => (b[slot] != 0).then(|| self.value(slot)),
            Structure::Sparse { i, .. } | Structure::Hypersparse { i, .. } => self
                .find_entry(row, col)
                .filter(|&p| !is_zombie(i[p]))
                .map(|p| self.value(p)),
        })
    }

    /// `A(row, col)` as a scalar of the matrix type
    pub fn get_element_scalar(&self, row: usize, col: usize) -> Result<Option<Scalar>> {
        match self.get_element_bytes(row, col)? {
            Some(bytes) => Ok(Some(Scalar::from_bytes(self.ty.clone(), bytes.to_vec())?)),
            None => Ok(None),
        }
    }

    /// `A(row, col)`; `T` must be the matrix type
    pub fn get_element<T: Element>(&self, row: usize, col: usize) -> Result<Option<T>> {
        if self.ty != ElemType::Builtin(T::DTYPE) {
            return Err(Error::domain_mismatch(&self.ty, &T::DTYPE.into(), "get_element"));
        }
        Ok(self
            .get_element_bytes(row, col)?
            .map(bytemuck::pod_read_unaligned))
    }

    /// Pending tuples as a coordinate list, in insertion order.
    ///
    /// The queue itself is left in place; see [`Matrix::clear_pending`].
    pub(crate) fn pending_tuples(&self) -> Result<(Vec<usize>, Vec<usize>, Values)> {
        let size = self.ty.size();
        let n = self.pending.len();
        let mut x = Values::try_zeroed(n, size)?;
        let mut rows = try_with_capacity(n)?;
        let mut cols = try_with_capacity(n)?;
        for (k, t) in self.pending.iter().enumerate() {
            rows.push(t.row as usize);
            cols.push(t.col as usize);
            x.bytes_mut()[k * size..(k + 1) * size].copy_from_slice(&t.value);
        }
        Ok((rows, cols, x))
    }

    /// Drop every pending tuple
    pub(crate) fn clear_pending(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Matrix {
        Matrix::from_csc(3, 2, vec![0, 2, 3], vec![0, 2, 1], &[1i32, 2, 3]).unwrap()
    }

    #[test]
    fn test_overwrite_existing_entry_in_place() {
        let mut a = sample();
        a.set_element(2, 0, 20i32).unwrap();
        assert_eq!(a.npending(), 0);
        assert_eq!(a.get_element::<i32>(2, 0).unwrap(), Some(20));
    }

    #[test]
    fn test_new_entry_is_pending() {
        let mut a = sample();
        a.set_element(1, 0, 7i32).unwrap();
        assert_eq!(a.npending(), 1);
        assert_eq!(a.nvals(), 3);
        assert_eq!(a.get_element::<i32>(1, 0).unwrap(), Some(7));
        a.set_element(1, 0, 8i32).unwrap();
        assert_eq!(a.get_element::<i32>(1, 0).unwrap(), Some(8));
    }

    #[test]
    fn test_remove_and_revive() {
        let mut a = sample();
        a.remove_element(0, 0).unwrap();
        assert_eq!(a.nzombies(), 1);
        assert_eq!(a.nvals(), 2);
        assert_eq!(a.get_element::<i32>(0, 0).unwrap(), None);
        a.check().unwrap();
        a.set_element(0, 0, 5i32).unwrap();
        assert_eq!(a.nzombies(), 0);
        assert_eq!(a.get_element::<i32>(0, 0).unwrap(), Some(5));
    }

    #[test]
    fn test_remove_from_full_converts_to_bitmap() {
        let mut a = Matrix::from_full(2, 2, &[1u8, 2, 3, 4]).unwrap();
        a.remove_element(1, 1).unwrap();
        assert_eq!(a.format(), Format::Bitmap);
        assert_eq!(a.nvals(), 3);
        a.check().unwrap();
    }

    #[test]
    fn test_iso_write_expands_values() {
        let mut a = Matrix::from_csc(2, 1, vec![0, 2], vec![0, 1], &[4u16, 4]).unwrap();
        assert!(a.make_iso());
        a.set_element(1, 0, 4u16).unwrap();
        assert!(a.is_iso());
        a.set_element(1, 0, 6u16).unwrap();
        assert!(!a.is_iso());
        assert_eq!(a.values().typed::<u16>(), &[4, 6]);
    }

    #[test]
    fn test_iso_bitmap_insert_counts_after_write() {
        let mut a = Matrix::from_bitmap(2, 2, vec![1, 0, 0, 1], &[5i32, 0, 0, 5]).unwrap();
        assert!(a.make_iso());
        a.set_element(1, 0, 9i32).unwrap();
        assert!(!a.is_iso());
        assert_eq!(a.nvals(), 3);
        assert_eq!(a.get_element::<i32>(1, 0).unwrap(), Some(9));
        assert_eq!(a.get_element::<i32>(1, 1).unwrap(), Some(5));
        a.check().unwrap();
    }

    #[test]
    fn test_pending_tuples_leave_queue_in_place() {
        let mut a = sample();
        a.set_element(1, 0, 7i32).unwrap();
        a.set_element(0, 1, 8i32).unwrap();
        let (rows, cols, x) = a.pending_tuples().unwrap();
        assert_eq!((rows, cols), (vec![1, 0], vec![0, 1]));
        assert_eq!(x.typed::<i32>(), &[7, 8]);
        assert_eq!(a.npending(), 2);
        a.clear_pending();
        assert!(!a.has_deferred_work());
    }

    #[test]
    fn test_out_of_range() {
        let mut a = sample();
        assert!(a.set_element(3, 0, 1i32).is_err());
        assert!(a.get_element::<i32>(0, 2).is_err());
        assert!(a.get_element::<i64>(0, 0).is_err());
    }
}
