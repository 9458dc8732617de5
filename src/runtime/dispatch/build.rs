//! Matrix construction from coordinate tuples

use super::Client;
use super::transpose::sort_keys;
use crate::dtype::ElemType;
use crate::error::{Error, Result};
use crate::kernels::OperationDesc;
use crate::ops::BinaryOp;
use crate::runtime::workspace::{try_vec, try_with_capacity};
use crate::sparse::matrix::Structure;
use crate::sparse::{Matrix, Values};
use log::debug;
use std::sync::Arc;

/// Matrix of `ty` from tuples; duplicates are folded with `dup` in input order.
///
/// Without `dup`, a repeated coordinate is an error. The result is
/// hypersparse when at most one column in sixteen is occupied.
#[allow(clippy::too_many_arguments)]
pub(crate) fn build(
    client: &Client,
    ty: &ElemType,
    nrows: usize,
    ncols: usize,
    rows: &[usize],
    cols: &[usize],
    values: &Values,
    dup: Option<&BinaryOp>,
) -> Result<Matrix> {
    let n = rows.len();
    if cols.len() != n || values.len() != n {
        return Err(Error::invalid_argument(
            "tuples",
            "rows, cols and values must have equal length",
        ));
    }
    if values.elem_size() != ty.size() {
        return Err(Error::invalid_argument(
            "values",
            format!("element size {} does not match {ty}", values.elem_size()),
        ));
    }
    let empty = Matrix::new(ty.clone(), nrows, ncols)?;
    for (&r, &c) in rows.iter().zip(cols) {
        if r >= nrows {
            return Err(Error::IndexOutOfBounds {
                index: r,
                size: nrows,
            });
        }
        if c >= ncols {
            return Err(Error::IndexOutOfBounds {
                index: c,
                size: ncols,
            });
        }
    }
    if n == 0 {
        return Ok(empty);
    }
    let fold = dup
        .map(|op| client.worker(&OperationDesc::ewise(op, ty, ty, ty)))
        .transpose()?;

    let mut keys = try_with_capacity(n)?;
    keys.extend((0..n).map(|k| (cols[k] as i64, rows[k] as i64, k)));
    if !keys.is_sorted() {
        sort_keys(client.parallelism(), &mut keys);
    }

    let size = ty.size();
    let mut p = try_vec(ncols + 1, 0i64)?;
    let mut ci = try_with_capacity(n)?;
    let mut cx = try_with_capacity(n * size)?;
    let mut tmp = try_vec(size, 0u8)?;
    let mut ndup = 0usize;
    for (k, &(col, row, src)) in keys.iter().enumerate() {
        let value = values.get(src);
        if k > 0 && keys[k - 1].0 == col && keys[k - 1].1 == row {
            let Some(worker) = fold.as_ref() else {
                return Err(Error::invalid_argument(
                    "tuples",
                    format!("duplicate entry ({row}, {col}) without a dup operator"),
                ));
            };
            let last = cx.len() - size;
            worker.ewise(&cx[last..], false, value, false, &mut tmp, 1);
            cx[last..].copy_from_slice(&tmp);
            ndup += 1;
            continue;
        }
        ci.push(row);
        cx.extend_from_slice(value);
        p[col as usize + 1] += 1;
    }
    for j in 0..ncols {
        p[j + 1] += p[j];
    }
    let nonempty = (0..ncols).filter(|&j| p[j] < p[j + 1]).count();
    debug!("build: {n} tuples, {ndup} duplicates, {nonempty} of {ncols} columns");

    let structure = if nonempty <= ncols / 16 {
        let mut hp = try_with_capacity(nonempty + 1)?;
        let mut h = try_with_capacity(nonempty)?;
        for j in 0..ncols {
            if p[j] < p[j + 1] {
                h.push(j as i64);
                hp.push(p[j]);
            }
        }
        hp.push(p[ncols]);
        Structure::Hypersparse {
            p: Arc::new(hp),
            h: Arc::new(h),
            i: Arc::new(ci),
        }
    } else {
        Structure::Sparse {
            p: Arc::new(p),
            i: Arc::new(ci),
        }
    };
    let x = Values::from_bytes(&cx, size)?;
    Ok(Matrix::from_parts(ty.clone(), nrows, ncols, structure, x, false))
}
