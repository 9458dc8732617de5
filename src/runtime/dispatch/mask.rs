//! Write masks

use super::{Client, finished};
use crate::dtype::{CastFn, DType, ElemType, builtin_cast_fn};
use crate::error::{Error, Result};
use crate::sparse::Matrix;
use crate::sparse::matrix::Structure;

/// A mask restricting which entries of a result are kept.
///
/// Without `structural`, an entry of the mask must exist and be nonzero to
/// allow the result entry at its position; with it, existence is enough.
/// `complement` inverts the test.
#[derive(Clone, Debug)]
pub struct Mask {
    matrix: Matrix,
    structural: bool,
    complement: bool,
}

impl Mask {
    /// Valued mask
    pub fn new(matrix: &Matrix) -> Self {
        Self {
            matrix: matrix.shallow_copy(),
            structural: false,
            complement: false,
        }
    }

    /// Use only the pattern of the mask
    pub fn structural(mut self) -> Self {
        self.structural = true;
        self
    }

    /// Invert the mask
    pub fn complement(mut self) -> Self {
        self.complement = !self.complement;
        self
    }

    /// Mask matrix
    pub fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    /// Returns true if only the pattern is used
    pub fn is_structural(&self) -> bool {
        self.structural
    }

    /// Returns true if the mask is complemented
    pub fn is_complement(&self) -> bool {
        self.complement
    }

    /// Value type the mask contributes to a signature, `None` when structural
    pub(crate) fn value_type(&self) -> Option<&ElemType> {
        (!self.structural).then(|| self.matrix.ty())
    }

    pub(crate) fn check_dims(&self, nrows: usize, ncols: usize) -> Result<()> {
        let m = &self.matrix;
        if (m.nrows(), m.ncols()) != (nrows, ncols) {
            return Err(Error::dimension_mismatch((nrows, ncols), (m.nrows(), m.ncols())));
        }
        Ok(())
    }
}

/// Resolved mask ready for per-position queries.
pub(crate) struct MaskView {
    m: Matrix,
    truth: Option<CastFn>,
    complement: bool,
}

impl MaskView {
    pub(crate) fn new(client: &Client, mask: &Mask) -> Result<Self> {
        let mut m = finished(client, &mask.matrix)?;
        m.unjumble()?;
        let truth = if mask.structural {
            None
        } else {
            match m.ty() {
                ElemType::Builtin(d) => Some(builtin_cast_fn(*d, DType::Bool)),
                ElemType::User(_) => {
                    return Err(Error::domain_mismatch(
                        &DType::Bool.into(),
                        m.ty(),
                        "mask",
                    ));
                }
            }
        };
        Ok(Self {
            m,
            truth,
            complement: mask.complement,
        })
    }

    fn value_true(&self, p: usize) -> bool {
        match self.truth {
            Some(f) => {
                let mut b = [0u8];
                f(&mut b, self.m.value(p));
                b[0] != 0
            }
            None => true,
        }
    }

    /// Returns true if the result may hold an entry at `(i, j)`
    pub(crate) fn allows(&self, i: usize, j: usize) -> bool {
        let m = &self.m;
        let set = match &m.structure {
            Structure::Full => self.value_true(i + j * m.nrows()),
            Structure::Bitmap { b, .. } => {
                let p = i + j * m.nrows();
                b[p] != 0 && self.value_true(p)
            }
            Structure::Sparse { .. } | Structure::Hypersparse { .. } => {
                match m.compressed().and_then(|c| {
                    let k = c.find(j as i64)?;
                    let r = c.range(k);
                    let q = c.i[r.clone()].binary_search(&(i as i64)).ok()?;
                    Some(r.start + q)
                }) {
                    Some(p) => self.value_true(p),
                    None => false,
                }
            }
        };
        set != self.complement
    }
}

/// Remove every entry of `c` the mask does not allow
pub(crate) fn apply_mask(client: &Client, c: Matrix, mask: &Mask) -> Result<Matrix> {
    mask.check_dims(c.nrows(), c.ncols())?;
    let view = MaskView::new(client, mask)?;
    super::select::filter(client, &c, |j, _entries, rows, keep| {
        for (flag, &i) in keep.iter_mut().zip(rows) {
            *flag = view.allows(i as usize, j) as u8;
        }
    })
}
