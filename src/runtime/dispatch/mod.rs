//! Format dispatch for every matrix operation
//!
//! Each submodule takes a client and plain matrices and picks the algorithm
//! from the operands' storage state. Per-entry work always goes through a
//! [`Worker`](crate::kernels::Worker) chosen by `Client::worker`, so the
//! algorithms here never depend on which kernel tier serves them.

pub(crate) mod apply;
pub(crate) mod build;
pub(crate) mod ewise;
mod mask;
pub(crate) mod mxm;
pub(crate) mod reduce;
pub(crate) mod select;
pub(crate) mod transpose;
pub(crate) mod wait;

pub use mask::Mask;
pub(crate) use mask::MaskView;

pub(crate) use super::client::Client;
use crate::error::{Error, Result};
use crate::sparse::matrix::Structure;
use crate::sparse::{Matrix, Values};
use std::sync::Arc;

/// Shallow copy of `a` with zombies and pending tuples resolved.
///
/// `a` itself is left untouched; the copy shares every buffer that the
/// resolution does not rewrite.
pub(crate) fn finished(client: &Client, a: &Matrix) -> Result<Matrix> {
    let mut m = a.shallow_copy();
    if m.has_deferred_work() {
        wait::wait(client, &mut m)?;
    }
    Ok(m)
}

/// Apply an optional mask to a freshly computed result
pub(crate) fn masked(client: &Client, c: Matrix, mask: Option<&Mask>) -> Result<Matrix> {
    match mask {
        Some(m) => mask::apply_mask(client, c, m),
        None => Ok(c),
    }
}

/// Both operands must have the same shape
pub(crate) fn check_same_dims(a: &Matrix, b: &Matrix) -> Result<()> {
    if (a.nrows(), a.ncols()) != (b.nrows(), b.ncols()) {
        return Err(Error::dimension_mismatch(
            (a.nrows(), a.ncols()),
            (b.nrows(), b.ncols()),
        ));
    }
    Ok(())
}

/// Copy of `a` with a new pattern; `x` of `None` shares `a`'s values.
///
/// The type, shape, iso and jumbled flags carry over. The result has no
/// zombies and no pending tuples.
pub(crate) fn with_pattern(a: &Matrix, structure: Structure, x: Option<Values>) -> Matrix {
    let mut m = a.shallow_copy();
    m.structure = structure;
    if let Some(x) = x {
        m.x = Arc::new(x);
    }
    m.nzombies = 0;
    m.pending = Vec::new();
    m
}
