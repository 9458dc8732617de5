//! Conversion between storage formats

use super::matrix::{Matrix, Structure};
use super::{Format, Values};
use crate::error::{Error, Result};
use crate::runtime::workspace::{dense_len, try_vec, try_with_capacity};
use std::sync::Arc;

impl Matrix {
    /// Copy of this matrix in another storage format.
    ///
    /// Index and value buffers are shared with `self` wherever the layout
    /// allows it. Converting to `Full` fails unless every slot holds an entry.
    /// Zombies and pending tuples must be resolved first (see `MatrixOps::wait`).
    pub fn to_format(&self, format: Format) -> Result<Matrix> {
        if format == self.format() {
            return Ok(self.clone());
        }
        if self.has_deferred_work() {
            return Err(Error::InvalidObject(format!(
                "{} pending tuples and {} zombies must be resolved before conversion",
                self.npending(),
                self.nzombies()
            )));
        }
        let mut src = self.clone();
        if src.jumbled && format.is_dense() {
            src.unjumble()?;
        }
        match (src.format(), format) {
            (Format::Sparse, Format::Hypersparse) => src.sparse_to_hyper(),
            (Format::Hypersparse, Format::Sparse) => src.hyper_to_sparse(),
            (Format::Sparse | Format::Hypersparse, Format::Bitmap) => src.compressed_to_bitmap(),
            (Format::Sparse | Format::Hypersparse, Format::Full) => {
                if !src.as_if_full() {
                    return Err(not_full(&src));
                }
                Ok(Matrix {
                    structure: Structure::Full,
                    ..src
                })
            }
            (Format::Bitmap, Format::Full) => {
                if src.nvals() != src.dense_slots() {
                    return Err(not_full(&src));
                }
                Ok(Matrix {
                    structure: Structure::Full,
                    ..src
                })
            }
            (Format::Bitmap, _) => src.bitmap_to_compressed(format),
            (Format::Full, Format::Bitmap) => {
                let n = src.dense_slots();
                Ok(Matrix {
                    structure: Structure::Bitmap {
                        b: Arc::new(try_vec(n, 1u8)?),
                        nvals: n,
                    },
                    ..src
                })
            }
            (Format::Full, _) => src.full_to_compressed(format),
            _ => Ok(src),
        }
    }

    fn sparse_to_hyper(self) -> Result<Matrix> {
        let (p, h, i) = match &self.structure {
            Structure::Sparse { p: sp, i } => {
                let nvec = sp.len() - 1;
                let nonempty = (0..nvec).filter(|&k| sp[k] < sp[k + 1]).count();
                let mut h = try_with_capacity(nonempty)?;
                let mut p = try_with_capacity(nonempty + 1)?;
                for k in 0..nvec {
                    if sp[k] < sp[k + 1] {
                        h.push(k as i64);
                        p.push(sp[k]);
                    }
                }
                p.push(sp[nvec]);
                (p, h, i.clone())
            }
            _ => return Ok(self),
        };
        Ok(Matrix {
            structure: Structure::Hypersparse {
                p: Arc::new(p),
                h: Arc::new(h),
                i,
            },
            ..self
        })
    }

    fn hyper_to_sparse(self) -> Result<Matrix> {
        let (hp, h, i) = match &self.structure {
            Structure::Hypersparse { p, h, i } => (p.clone(), h.clone(), i.clone()),
            _ => return Ok(self),
        };
        let mut p = try_vec(self.ncols + 1, 0i64)?;
        let mut k = 0;
        for j in 0..self.ncols {
            if k < h.len() && h[k] as usize == j {
                k += 1;
            }
            p[j + 1] = hp[k];
        }
        Ok(Matrix {
            structure: Structure::Sparse { p: Arc::new(p), i },
            ..self
        })
    }

    fn compressed_to_bitmap(self) -> Result<Matrix> {
        let n = dense_len(self.nrows, self.ncols)?;
        let size = self.ty.size();
        let mut b = try_vec(n, 0u8)?;
        let mut x = if self.iso {
            Values::from_bytes(self.x.get(0), size)?
        } else {
            Values::try_zeroed(n, size)?
        };
        let mut nvals = 0;
        if let Some(c) = self.compressed() {
            for k in 0..c.nvec() {
                let col = c.vector(k) as usize;
                for p in c.range(k) {
                    let s = c.i[p] as usize + col * self.nrows;
                    b[s] = 1;
                    nvals += 1;
                    if !self.iso {
                        x.bytes_mut()[s * size..(s + 1) * size].copy_from_slice(self.x.get(p));
                    }
                }
            }
        }
        Ok(Matrix {
            structure: Structure::Bitmap {
                b: Arc::new(b),
                nvals,
            },
            x: Arc::new(x),
            jumbled: false,
            ..self
        })
    }

    fn bitmap_to_compressed(self, format: Format) -> Result<Matrix> {
        let (b, nvals) = match &self.structure {
            Structure::Bitmap { b, nvals } => (b.clone(), *nvals),
            _ => return Ok(self),
        };
        let size = self.ty.size();
        let mut p = try_vec(self.ncols + 1, 0i64)?;
        let mut i = try_with_capacity(nvals)?;
        let mut x = if self.iso {
            Values::from_bytes(self.x.get(0), size)?
        } else {
            Values::try_zeroed(nvals, size)?
        };
        for col in 0..self.ncols {
            for row in 0..self.nrows {
                let s = row + col * self.nrows;
                if b[s] != 0 {
                    if !self.iso {
                        let q = i.len();
                        x.bytes_mut()[q * size..(q + 1) * size].copy_from_slice(self.x.get(s));
                    }
                    i.push(row as i64);
                }
            }
            p[col + 1] = i.len() as i64;
        }
        let sparse = Matrix {
            structure: Structure::Sparse {
                p: Arc::new(p),
                i: Arc::new(i),
            },
            x: Arc::new(x),
            ..self
        };
        match format {
            Format::Hypersparse => sparse.sparse_to_hyper(),
            _ => Ok(sparse),
        }
    }

    fn full_to_compressed(self, format: Format) -> Result<Matrix> {
        let nnz = dense_len(self.nrows, self.ncols)?;
        let mut p = try_with_capacity(self.ncols + 1)?;
        p.extend((0..=self.ncols).map(|k| (k * self.nrows) as i64));
        let mut i = try_with_capacity(nnz)?;
        for _ in 0..self.ncols {
            i.extend(0..self.nrows as i64);
        }
        let sparse = Matrix {
            structure: Structure::Sparse {
                p: Arc::new(p),
                i: Arc::new(i),
            },
            ..self
        };
        match format {
            Format::Hypersparse => sparse.sparse_to_hyper(),
            _ => Ok(sparse),
        }
    }
}

fn not_full(m: &Matrix) -> Error {
    Error::invalid_argument(
        "format",
        format!(
            "{} of {} slots hold entries; a full matrix needs all of them",
            m.nvals(),
            m.dense_slots()
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Matrix {
        // [1 . 4]
        // [. 3 .]
        // [2 . 5]
        Matrix::from_csc(3, 3, vec![0, 2, 3, 5], vec![0, 2, 1, 0, 2], &[1i32, 2, 3, 4, 5]).unwrap()
    }

    #[test]
    fn test_round_trip_through_every_format() {
        let a = sample();
        let expected = a.extract_tuples::<i32>().unwrap();
        for f in [Format::Hypersparse, Format::Bitmap, Format::Sparse] {
            let m = a.to_format(f).unwrap();
            m.check().unwrap();
            assert_eq!(m.format(), f);
            assert_eq!(m.extract_tuples::<i32>().unwrap(), expected);
            let back = m.to_format(Format::Sparse).unwrap();
            assert_eq!(back.col_ptrs(), a.col_ptrs());
            assert_eq!(back.row_indices(), a.row_indices());
        }
        assert!(a.to_format(Format::Full).is_err());
    }

    #[test]
    fn test_hyper_list_skips_empty_columns() {
        let a = Matrix::from_csc(2, 4, vec![0, 1, 1, 1, 2], vec![0, 1], &[1u8, 2]).unwrap();
        let h = a.to_format(Format::Hypersparse).unwrap();
        assert_eq!(h.hyper_list().unwrap(), &[0, 3]);
        assert_eq!(h.col_ptrs().unwrap(), &[0, 1, 2]);
        assert!(h.shares_values_with(&a));
    }

    #[test]
    fn test_full_conversions_share_values() {
        let f = Matrix::from_full(2, 2, &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
        let s = f.to_format(Format::Sparse).unwrap();
        s.check().unwrap();
        assert!(s.shares_values_with(&f));
        assert_eq!(s.nvals(), 4);
        let back = s.to_format(Format::Full).unwrap();
        assert_eq!(back.values().typed::<f32>(), &[1.0, 2.0, 3.0, 4.0]);
        let b = f.to_format(Format::Bitmap).unwrap();
        assert_eq!(b.nvals(), 4);
        b.check().unwrap();
    }

    #[test]
    fn test_iso_survives_conversion() {
        let mut a = Matrix::from_csc(3, 2, vec![0, 1, 2], vec![2, 0], &[9i64, 9]).unwrap();
        assert!(a.make_iso());
        for f in Format::ALL {
            if f == Format::Full {
                continue;
            }
            let m = a.to_format(f).unwrap();
            assert!(m.is_iso());
            m.check().unwrap();
            assert_eq!(m.extract_tuples::<i64>().unwrap().2, vec![9, 9]);
        }
    }
}
