//! Matrix multiply over a semiring

use super::select::prune_empty_vectors;
use super::{Client, Mask, MaskView, finished};
use crate::error::{Error, Result};
use crate::kernels::{OperationDesc, Worker};
use crate::ops::Semiring;
use crate::runtime::offload::{self, DeviceRequest};
use crate::runtime::slice::{TaskCounts, block_lens, merge_counts, slice_by_cost, split_blocks};
use crate::runtime::workspace::{try_copy, try_grow, try_vec, try_with_capacity};
use crate::sparse::matrix::{Compressed, Structure};
use crate::sparse::{Format, Matrix, Values};
use log::debug;
use std::ops::Range;
use std::sync::Arc;

/// `C<M> = A * B`; the device takes it when the offload decision says so
pub(crate) fn mxm(
    client: &Client,
    a: &Matrix,
    b: &Matrix,
    semiring: &Semiring,
    mask: Option<&Mask>,
) -> Result<Matrix> {
    if a.ncols() != b.nrows() {
        return Err(Error::dimension_mismatch(
            (a.nrows(), a.ncols()),
            (b.nrows(), b.ncols()),
        ));
    }
    if let Some(m) = mask {
        m.check_dims(a.nrows(), b.ncols())?;
    }
    let mut a = finished(client, a)?;
    let mut b = finished(client, b)?;
    a.unjumble()?;
    b.unjumble()?;

    let decision = offload::decide(&client.config().offload, client.device(), semiring, &a, &b, mask)?;
    if let (Some(device), Some(signature)) = (client.device(), decision.signature.as_ref()) {
        if decision.units > 0 {
            debug!("mxm: {} on {} with {} units", semiring.name(), device.name(), decision.units);
            let desc = offload::device_desc(semiring, &a, &b, mask);
            return device.mxm(&DeviceRequest {
                signature,
                desc: &desc,
                a: &a,
                b: &b,
                mask,
                units: decision.units,
            });
        }
    }
    let a = compressed(a)?;
    let b = compressed(b)?;
    let view = mask.map(|m| MaskView::new(client, m)).transpose()?;
    let worker = client.worker(&OperationDesc::mult_add(semiring, a.ty(), b.ty(), false))?;
    debug!("mxm: {} by saxpy, work:{:.0}", semiring.name(), decision.work);
    saxpy(client, &worker, &a, &b, semiring, view.as_ref())
}

fn compressed(m: Matrix) -> Result<Matrix> {
    if m.format().is_compressed() {
        Ok(m)
    } else {
        m.to_format(Format::Sparse)
    }
}

/// Result vectors computed by one task
struct Part {
    counts: TaskCounts,
    rows: Vec<i64>,
    x: Vec<u8>,
}

/// Dense accumulator for one column of C
struct Accumulator {
    w: Vec<u8>,
    occupied: Vec<u8>,
    touched: Vec<i64>,
}

/// Column-by-column saxpy: `C(:,j) = sum_k A(:,k) * B(k,j)` into a dense workspace
fn saxpy(
    client: &Client,
    worker: &Worker,
    a: &Matrix,
    b: &Matrix,
    semiring: &Semiring,
    view: Option<&MaskView>,
) -> Result<Matrix> {
    let (Some(ca), Some(cb)) = (a.compressed(), b.compressed()) else {
        return Err(Error::Internal("mxm: operands are not compressed".into()));
    };
    let c_type = semiring.ty().clone();
    let csize = c_type.size();
    let m = a.nrows();
    let nvec = cb.nvec();

    // flops of each B vector, plus one so empty vectors still cost something
    let a_len = |k: i64| ca.find(k).map_or(0, |v| ca.range(v).len());
    let mut cum = try_vec(nvec + 1, 0i64)?;
    for v in 0..nvec {
        let flops: usize = cb.range(v).map(|q| a_len(cb.i[q])).sum();
        cum[v + 1] = cum[v] + flops as i64 + 1;
    }
    let par = client.parallelism();
    let tasks = slice_by_cost(&cum, par.ntasks(cum[nvec] as f64));

    let parts = par.run_tasks(tasks, |r| -> Result<Part> {
        let mut acc = Accumulator {
            w: try_vec(m * csize, 0u8)?,
            occupied: try_vec(m, 0u8)?,
            touched: try_with_capacity(m)?,
        };
        let mut part = Part {
            counts: TaskCounts {
                kfirst: r.start,
                counts: try_vec(r.len(), 0i64)?,
            },
            rows: Vec::new(),
            x: Vec::new(),
        };
        for (d, v) in r.enumerate() {
            part.counts.counts[d] = column(worker, a, ca, b, cb, v, csize, view, &mut acc, &mut part)? as i64;
        }
        Ok(part)
    });
    let (counts, parts): (Vec<TaskCounts>, Vec<(Vec<i64>, Vec<u8>)>) = parts
        .into_iter()
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .map(|p| (p.counts, (p.rows, p.x)))
        .unzip();
    let merged = merge_counts(nvec, &counts)?;
    let nnz = merged.nnz();

    // stitch the task outputs together
    let lens = block_lens(&merged.task_offsets, nnz);
    let mut ci = try_vec(nnz, 0i64)?;
    let mut cx = Values::try_zeroed(nnz, csize)?;
    let iblocks = split_blocks(&mut ci, lens.iter().copied());
    let xblocks = split_blocks(cx.bytes_mut(), lens.iter().map(|l| l * csize));
    let work: Vec<_> = parts.iter().zip(iblocks).zip(xblocks).collect();
    par.run_tasks(work, |(((rows, x), ib), xb)| {
        ib.copy_from_slice(rows);
        xb.copy_from_slice(x);
    });

    let structure = match cb.h {
        Some(h) => Structure::Hypersparse {
            p: Arc::new(merged.p),
            h: Arc::new(try_copy(h)?),
            i: Arc::new(ci),
        },
        None => Structure::Sparse {
            p: Arc::new(merged.p),
            i: Arc::new(ci),
        },
    };
    let c = Matrix::from_parts(c_type, m, b.ncols(), structure, cx, false);
    prune_empty_vectors(c)
}

/// Compute vector `v` of C into `part`, returning its entry count.
///
/// `acc.touched` has room for every row of A, so only `part` grows here.
#[allow(clippy::too_many_arguments)]
fn column(
    worker: &Worker,
    a: &Matrix,
    ca: Compressed<'_>,
    b: &Matrix,
    cb: Compressed<'_>,
    v: usize,
    csize: usize,
    view: Option<&MaskView>,
    acc: &mut Accumulator,
    part: &mut Part,
) -> Result<usize> {
    let j = cb.vector(v);
    for q in cb.range(v) {
        let Some(ka) = ca.find(cb.i[q]) else {
            continue;
        };
        let ar: Range<usize> = ca.range(ka);
        if ar.is_empty() {
            continue;
        }
        let rows = &ca.i[ar.clone()];
        for &i in rows {
            if acc.occupied[i as usize] == 0 {
                acc.touched.push(i);
            }
        }
        let ax = if a.is_iso() {
            a.values().get(0)
        } else {
            let s = a.ty().size();
            &a.values().bytes()[ar.start * s..ar.end * s]
        };
        worker.mult_add(ax, a.is_iso(), rows, b.value(q), &mut acc.w, &mut acc.occupied);
    }
    acc.touched.sort_unstable();
    try_grow(&mut part.rows, acc.touched.len())?;
    try_grow(&mut part.x, acc.touched.len() * csize)?;
    let mut kept = 0;
    for &i in &acc.touched {
        let i = i as usize;
        acc.occupied[i] = 0;
        if view.is_none_or(|view| view.allows(i, j as usize)) {
            part.rows.push(i as i64);
            part.x.extend_from_slice(&acc.w[i * csize..(i + 1) * csize]);
            kept += 1;
        }
    }
    acc.touched.clear();
    Ok(kept)
}
