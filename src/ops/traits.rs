//! The matrix operation trait.

use crate::dtype::{ElemType, Scalar};
use crate::error::Result;
use crate::ops::{ApplyOp, BinaryOp, IndexUnaryOp, Monoid, Semiring};
use crate::runtime::Mask;
use crate::sparse::{Format, Matrix, Values};

/// Operations over sparse matrices.
///
/// Inputs are never modified by the value-returning methods. A result that
/// shares a buffer with an input is a shallow copy; writing to either later
/// copies the buffer first.
///
/// Operands with zombies or pending tuples are finished on a private copy
/// before the operation runs. `wait` finishes a matrix in place.
///
/// # Masks
///
/// Methods taking `mask` keep only result entries the mask allows. A valued
/// mask allows `(i, j)` when `M(i, j)` exists and is nonzero, a structural
/// mask when it exists; a complemented mask inverts either test.
pub trait MatrixOps {
    /// `C<M> = select(A, op, thunk)`: the entries of `A` for which
    /// `op(A(i,j), i, j, thunk)` holds.
    ///
    /// `thunk` is cast to the operator's thunk type. Positional column
    /// selectors on compressed input keep or drop whole vectors without
    /// visiting their entries.
    fn select(
        &self,
        a: &Matrix,
        op: &IndexUnaryOp,
        thunk: &Scalar,
        mask: Option<&Mask>,
    ) -> Result<Matrix>;

    /// `A = select(A, op, thunk)`; hypersparse vectors left empty are dropped
    fn select_in_place(&self, a: &mut Matrix, op: &IndexUnaryOp, thunk: &Scalar) -> Result<()>;

    /// `C<M> = op(A')`, typed `ctype`.
    ///
    /// Without `ctype` the result takes the operator's output type, or the
    /// type of `A` when there is no operator.
    fn transpose(
        &self,
        a: &Matrix,
        op: Option<&ApplyOp>,
        ctype: Option<&ElemType>,
        mask: Option<&Mask>,
    ) -> Result<Matrix>;

    /// `A = A'`
    fn transpose_in_place(&self, a: &mut Matrix) -> Result<()>;

    /// `C<M> = op(A)` over the pattern of `A`
    fn apply(
        &self,
        a: &Matrix,
        op: &ApplyOp,
        ctype: Option<&ElemType>,
        mask: Option<&Mask>,
    ) -> Result<Matrix>;

    /// `C<M> = A .* B` over the intersection of the patterns
    fn ewise_mult(
        &self,
        a: &Matrix,
        b: &Matrix,
        op: &BinaryOp,
        mask: Option<&Mask>,
    ) -> Result<Matrix>;

    /// `C<M> = A .+ B` over the union of the patterns; entries present in one
    /// operand only are cast to the operator's output type
    fn ewise_add(
        &self,
        a: &Matrix,
        b: &Matrix,
        op: &BinaryOp,
        mask: Option<&Mask>,
    ) -> Result<Matrix>;

    /// Fold every entry with `monoid`; an empty matrix gives its identity
    fn reduce(&self, a: &Matrix, monoid: &Monoid) -> Result<Scalar>;

    /// `C<M> = A * B` over `semiring`
    fn mxm(
        &self,
        a: &Matrix,
        b: &Matrix,
        semiring: &Semiring,
        mask: Option<&Mask>,
    ) -> Result<Matrix>;

    /// Matrix of `ty` from coordinate tuples.
    ///
    /// Repeated coordinates are combined with `dup` in input order; without
    /// `dup` they are an error.
    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        ty: &ElemType,
        nrows: usize,
        ncols: usize,
        rows: &[usize],
        cols: &[usize],
        values: &Values,
        dup: Option<&BinaryOp>,
    ) -> Result<Matrix>;

    /// Finish all deferred work on `a`
    fn wait(&self, a: &mut Matrix) -> Result<()>;

    /// Finished copy of `a` stored in `format`
    fn convert(&self, a: &Matrix, format: Format) -> Result<Matrix>;
}
