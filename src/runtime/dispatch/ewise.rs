//! Element-wise union (add) and intersection (mult)

use super::apply::ValueMap;
use super::select::{filter, prune_empty_vectors};
use super::{Client, check_same_dims, finished};
use crate::dtype::ElemType;
use crate::error::{Error, Result};
use crate::kernels::{OperationDesc, Worker};
use crate::ops::BinaryOp;
use crate::runtime::slice::{
    TaskCounts, block_lens, merge_counts, slice_by_cost, slice_range, slice_vectors, split_blocks,
};
use crate::runtime::workspace::{try_vec, try_with_capacity};
use crate::sparse::matrix::{Compressed, Structure};
use crate::sparse::{Format, Matrix, Values};
use log::debug;
use std::borrow::Cow;
use std::ops::Range;
use std::sync::Arc;

/// Which entries of the two patterns make it into the result.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Combine {
    /// Entries of either operand; lone entries are cast to the result type
    Union,
    /// Entries present in both operands
    Intersection,
}

struct Kernels {
    op: Worker,
    only_a: Option<ValueMap>,
    only_b: Option<ValueMap>,
    csize: usize,
}

/// Value bytes of `m` at positions `r`, or its single value when iso
fn values_at(m: &Matrix, r: Range<usize>) -> &[u8] {
    if m.is_iso() {
        m.values().get(0)
    } else {
        let s = m.ty().size();
        &m.values().bytes()[r.start * s..r.end * s]
    }
}

/// Values of `m` at `positions`, gathered into one buffer unless iso
fn gather<'m>(
    m: &'m Matrix,
    positions: impl Iterator<Item = usize>,
    n: usize,
) -> Result<(Cow<'m, [u8]>, bool)> {
    if m.is_iso() {
        return Ok((Cow::Borrowed(m.values().get(0)), true));
    }
    let mut buf = try_with_capacity(n * m.ty().size())?;
    for p in positions {
        buf.extend_from_slice(m.values().get(p));
    }
    Ok((Cow::Owned(buf), false))
}

/// `C = A (op) B` over the union or intersection of the patterns
pub(crate) fn ewise(
    client: &Client,
    a: &Matrix,
    b: &Matrix,
    op: &BinaryOp,
    combine: Combine,
) -> Result<Matrix> {
    check_same_dims(a, b)?;
    let mut a = finished(client, a)?;
    let mut b = finished(client, b)?;
    a.unjumble()?;
    b.unjumble()?;
    let c_type = op.ztype().clone();
    let union = combine == Combine::Union;
    let k = Kernels {
        op: client.worker(&OperationDesc::ewise(op, a.ty(), b.ty(), &c_type))?,
        only_a: if union {
            Some(ValueMap::new(client, None, a.ty(), &c_type)?)
        } else {
            None
        },
        only_b: if union {
            Some(ValueMap::new(client, None, b.ty(), &c_type)?)
        } else {
            None
        },
        csize: c_type.size(),
    };
    let iso = iso_value(&k, &a, &b, combine)?;

    match (a.format().is_compressed(), b.format().is_compressed()) {
        (true, true) => {
            debug!("ewise: {} {combine:?} by merge", op.name());
            merge(client, &k, &a, &b, combine, iso, c_type)
        }
        (true, false) if !union => {
            debug!("ewise: {} driven by the sparse operand", op.name());
            sparse_driven(client, &k, &a, &b, true, iso, c_type)
        }
        (false, true) if !union => {
            debug!("ewise: {} driven by the sparse operand", op.name());
            sparse_driven(client, &k, &b, &a, false, iso, c_type)
        }
        _ => {
            debug!("ewise: {} {combine:?} over dense slots", op.name());
            let a = bitmap_or_dense(a)?;
            let b = bitmap_or_dense(b)?;
            dense(client, &k, &a, &b, combine, iso, c_type)
        }
    }
}

fn bitmap_or_dense(m: Matrix) -> Result<Matrix> {
    if m.format().is_dense() {
        Ok(m)
    } else {
        m.to_format(Format::Bitmap)
    }
}

/// The single result value when every result entry is known to share it
fn iso_value(k: &Kernels, a: &Matrix, b: &Matrix, combine: Combine) -> Result<Option<Values>> {
    if !(a.is_iso() && b.is_iso()) {
        return Ok(None);
    }
    let mut z = Values::try_zeroed(1, k.csize)?;
    k.op
        .ewise(a.values().get(0), true, b.values().get(0), true, z.bytes_mut(), 1);
    if combine == Combine::Union {
        let mut lone = try_vec(k.csize, 0u8)?;
        for (map, m) in [(&k.only_a, a), (&k.only_b, b)] {
            if let Some(map) = map {
                map.run(m.values().get(0), true, &mut lone, 1);
                if lone != z.bytes() {
                    return Ok(None);
                }
            }
        }
    }
    Ok(Some(z))
}

/// Both operands bitmap or full: one pass over the slots
fn dense(
    client: &Client,
    k: &Kernels,
    a: &Matrix,
    b: &Matrix,
    combine: Combine,
    iso: Option<Values>,
    c_type: ElemType,
) -> Result<Matrix> {
    let n = a.dense_slots();
    let csize = k.csize;
    let (ba, bb) = (a.bitmap(), b.bitmap());
    let class = |s: usize| (ba.is_none_or(|m| m[s] != 0), bb.is_none_or(|m| m[s] != 0));
    let par = client.parallelism();
    let ranges = slice_range(n, par.ntasks(n as f64));
    let mut flags = try_vec(n, 0u8)?;
    let mut z = match iso {
        Some(_) => None,
        None => Some(Values::try_zeroed(n, csize)?),
    };
    let fblocks = split_blocks(&mut flags, ranges.iter().map(|r| r.len()));
    let zblocks: Vec<Option<&mut [u8]>> = match z.as_mut() {
        Some(z) => split_blocks(z.bytes_mut(), ranges.iter().map(|r| r.len() * csize))
            .into_iter()
            .map(Some)
            .collect(),
        None => ranges.iter().map(|_| None).collect(),
    };
    let tasks: Vec<_> = ranges.into_iter().zip(fblocks).zip(zblocks).collect();
    let kept = par.run_tasks(tasks, |((r, fl), mut zb)| {
        let mut kept = 0;
        let mut s = r.start;
        // runs of slots with the same presence pattern share one kernel call
        while s < r.end {
            let cl = class(s);
            let mut e = s + 1;
            while e < r.end && class(e) == cl {
                e += 1;
            }
            let map = match (cl, combine) {
                ((true, true), _) => None,
                ((true, false), Combine::Union) => k.only_a.as_ref(),
                ((false, true), Combine::Union) => k.only_b.as_ref(),
                _ => {
                    s = e;
                    continue;
                }
            };
            let local = s - r.start..e - r.start;
            fl[local.clone()].fill(1);
            kept += e - s;
            if let Some(zb) = zb.as_mut() {
                let out = &mut zb[local.start * csize..local.end * csize];
                match (map, cl.0) {
                    (None, _) => k.op.ewise(
                        values_at(a, s..e),
                        a.is_iso(),
                        values_at(b, s..e),
                        b.is_iso(),
                        out,
                        e - s,
                    ),
                    (Some(map), true) => map.run(values_at(a, s..e), a.is_iso(), out, e - s),
                    (Some(map), false) => map.run(values_at(b, s..e), b.is_iso(), out, e - s),
                }
            }
            s = e;
        }
        kept
    });
    let nvals: usize = kept.into_iter().sum();
    let structure = if nvals == n {
        Structure::Full
    } else {
        Structure::Bitmap {
            b: Arc::new(flags),
            nvals,
        }
    };
    let is_iso = iso.is_some();
    let x = match (iso, z) {
        (Some(x), _) | (None, Some(x)) => x,
        (None, None) => Values::try_zeroed(0, csize)?,
    };
    Ok(Matrix::from_parts(c_type, a.nrows(), a.ncols(), structure, x, is_iso))
}

/// Intersection of a compressed `s` with a dense `d`: the pattern of `s`
/// restricted to the slots present in `d`
fn sparse_driven(
    client: &Client,
    k: &Kernels,
    s: &Matrix,
    d: &Matrix,
    s_is_a: bool,
    iso: Option<Values>,
    c_type: ElemType,
) -> Result<Matrix> {
    let nrows = d.nrows();
    let p = match d.bitmap() {
        Some(bm) => filter(client, s, |j, _, rows, keep| {
            for (flag, &i) in keep.iter_mut().zip(rows) {
                *flag = bm[i as usize + j * nrows];
            }
        })?,
        None => s.shallow_copy(),
    };
    let is_iso = iso.is_some();
    let x = match iso {
        Some(x) => x,
        None => {
            let Some(c) = p.compressed() else {
                return Err(Error::Internal("ewise: filtered operand is not compressed".into()));
            };
            let csize = k.csize;
            let mut z = Values::try_zeroed(c.nnz(), csize)?;
            let par = client.parallelism();
            let tasks = slice_vectors(c.p, par.ntasks(c.nnz() as f64));
            let span = |r: &Range<usize>| c.p[r.start] as usize..c.p[r.end] as usize;
            let blocks = split_blocks(z.bytes_mut(), tasks.iter().map(|r| span(r).len() * csize));
            let done = par.run_tasks(tasks.iter().zip(blocks).collect(), |(r, zb)| -> Result<()> {
                let e = span(r);
                if e.is_empty() {
                    return Ok(());
                }
                let dv = gather(
                    d,
                    r.clone().flat_map(|v| {
                        let j = c.vector(v) as usize;
                        c.range(v).map(move |q| c.i[q] as usize + j * nrows)
                    }),
                    e.len(),
                )?;
                let sv = values_at(&p, e.clone());
                if s_is_a {
                    k.op.ewise(sv, p.is_iso(), &dv.0, dv.1, zb, e.len());
                } else {
                    k.op.ewise(&dv.0, dv.1, sv, p.is_iso(), zb, e.len());
                }
                Ok(())
            });
            done.into_iter().collect::<Result<()>>()?;
            z
        }
    };
    let mut c = p;
    c.ty = c_type;
    c.x = Arc::new(x);
    c.iso = is_iso;
    Ok(c)
}

/// Sorted merge of two index lists
fn merge_rows(a: &[i64], b: &[i64], combine: Combine, mut emit: impl FnMut(i64, Option<usize>, Option<usize>)) {
    let (mut pa, mut pb) = (0, 0);
    while pa < a.len() || pb < b.len() {
        let ia = a.get(pa).copied().unwrap_or(i64::MAX);
        let ib = b.get(pb).copied().unwrap_or(i64::MAX);
        if ia == ib {
            emit(ia, Some(pa), Some(pb));
            pa += 1;
            pb += 1;
        } else if ia < ib {
            if combine == Combine::Union {
                emit(ia, Some(pa), None);
            }
            pa += 1;
        } else {
            if combine == Combine::Union {
                emit(ib, None, Some(pb));
            }
            pb += 1;
        }
    }
}

/// Output vector list: every column, or the merged hyper lists
fn output_vectors(
    ca: Compressed<'_>,
    cb: Compressed<'_>,
    ncols: usize,
    combine: Combine,
) -> Result<(Vec<i64>, bool)> {
    let hyper = match combine {
        Combine::Union => ca.h.is_some() && cb.h.is_some(),
        Combine::Intersection => ca.h.is_some() || cb.h.is_some(),
    };
    if !hyper {
        let mut cols = try_with_capacity(ncols)?;
        cols.extend(0..ncols as i64);
        return Ok((cols, false));
    }
    let cols = match (ca.h, cb.h) {
        (Some(ha), Some(hb)) => {
            let mut cols = try_with_capacity(match combine {
                Combine::Union => ha.len() + hb.len(),
                Combine::Intersection => ha.len().min(hb.len()),
            })?;
            merge_rows(ha, hb, combine, |j, _, _| cols.push(j));
            cols
        }
        (Some(h), None) | (None, Some(h)) => {
            let mut cols = try_with_capacity(h.len())?;
            cols.extend_from_slice(h);
            cols
        }
        (None, None) => Vec::new(),
    };
    Ok((cols, true))
}

/// Entries written by one task, grouped by where their value comes from
#[derive(Default)]
struct Batch {
    both: Vec<(usize, usize, usize)>,
    only_a: Vec<(usize, usize)>,
    only_b: Vec<(usize, usize)>,
}

impl Batch {
    /// Compute every value of the batch into the task's output block
    fn compute(&self, k: &Kernels, a: &Matrix, b: &Matrix, zb: &mut [u8]) -> Result<()> {
        let csize = k.csize;
        let total = zb.len() / csize;
        let n = self.both.len();
        if n > 0 {
            let (xa, a_iso) = gather(a, self.both.iter().map(|t| t.1), n)?;
            let (xb, b_iso) = gather(b, self.both.iter().map(|t| t.2), n)?;
            if n == total {
                k.op.ewise(&xa, a_iso, &xb, b_iso, zb, n);
            } else {
                let mut tmp = try_vec(n * csize, 0u8)?;
                k.op.ewise(&xa, a_iso, &xb, b_iso, &mut tmp, n);
                for (d, t) in self.both.iter().enumerate() {
                    zb[t.0 * csize..(t.0 + 1) * csize].copy_from_slice(&tmp[d * csize..(d + 1) * csize]);
                }
            }
        }
        for (lone, m, map) in [(&self.only_a, a, &k.only_a), (&self.only_b, b, &k.only_b)] {
            let (Some(map), n) = (map, lone.len()) else {
                continue;
            };
            if n == 0 {
                continue;
            }
            let (x, iso) = gather(m, lone.iter().map(|t| t.1), n)?;
            let mut tmp = try_vec(n * csize, 0u8)?;
            map.run(&x, iso, &mut tmp, n);
            for (d, t) in lone.iter().enumerate() {
                zb[t.0 * csize..(t.0 + 1) * csize].copy_from_slice(&tmp[d * csize..(d + 1) * csize]);
            }
        }
        Ok(())
    }
}

/// Both operands compressed: two-phase merge of their vectors
fn merge(
    client: &Client,
    k: &Kernels,
    a: &Matrix,
    b: &Matrix,
    combine: Combine,
    iso: Option<Values>,
    c_type: ElemType,
) -> Result<Matrix> {
    let (Some(ca), Some(cb)) = (a.compressed(), b.compressed()) else {
        return Err(Error::Internal("ewise: merge needs compressed operands".into()));
    };
    let (cols, hyper) = output_vectors(ca, cb, a.ncols(), combine)?;
    let nvec = cols.len();

    // entry ranges of both operands per output vector, and the cost of each
    let empty = 0..0;
    let mut spans = try_with_capacity(nvec)?;
    let mut cum = try_vec(nvec + 1, 0i64)?;
    for (v, &j) in cols.iter().enumerate() {
        let ra = ca.find(j).map_or(empty.clone(), |k| ca.range(k));
        let rb = cb.find(j).map_or(empty.clone(), |k| cb.range(k));
        cum[v + 1] = cum[v] + (ra.len() + rb.len()) as i64 + 1;
        spans.push((ra, rb));
    }
    let par = client.parallelism();
    let tasks = slice_by_cost(&cum, par.ntasks(cum[nvec] as f64));

    let counts = par.run_tasks(tasks.clone(), |r| -> Result<TaskCounts> {
        let mut counts = try_vec(r.len(), 0i64)?;
        for (d, v) in r.clone().enumerate() {
            let (ra, rb) = &spans[v];
            let mut n = 0;
            merge_rows(&ca.i[ra.clone()], &cb.i[rb.clone()], combine, |_, _, _| n += 1);
            counts[d] = n;
        }
        Ok(TaskCounts {
            kfirst: r.start,
            counts,
        })
    });
    let counts = counts.into_iter().collect::<Result<Vec<_>>>()?;
    let merged = merge_counts(nvec, &counts)?;
    let nout = merged.nnz();

    let csize = k.csize;
    let lens = block_lens(&merged.task_offsets, nout);
    let mut i_out = try_vec(nout, 0i64)?;
    let mut z = match iso {
        Some(_) => None,
        None => Some(Values::try_zeroed(nout, csize)?),
    };
    let iblocks = split_blocks(&mut i_out, lens.iter().copied());
    let zblocks: Vec<Option<&mut [u8]>> = match z.as_mut() {
        Some(z) => split_blocks(z.bytes_mut(), lens.iter().map(|l| l * csize))
            .into_iter()
            .map(Some)
            .collect(),
        None => lens.iter().map(|_| None).collect(),
    };
    let work: Vec<_> = tasks.into_iter().zip(iblocks).zip(zblocks).collect();
    let done = par.run_tasks(work, |((r, ib), zb)| -> Result<()> {
        let mut batch = Batch::default();
        let mut q = 0;
        for v in r {
            let (ra, rb) = &spans[v];
            merge_rows(&ca.i[ra.clone()], &cb.i[rb.clone()], combine, |row, pa, pb| {
                ib[q] = row;
                match (pa, pb) {
                    (Some(pa), Some(pb)) => batch.both.push((q, ra.start + pa, rb.start + pb)),
                    (Some(pa), None) => batch.only_a.push((q, ra.start + pa)),
                    (None, Some(pb)) => batch.only_b.push((q, rb.start + pb)),
                    (None, None) => {}
                }
                q += 1;
            });
        }
        match zb {
            Some(zb) => batch.compute(k, a, b, zb),
            None => Ok(()),
        }
    });
    done.into_iter().collect::<Result<()>>()?;

    let structure = if hyper {
        Structure::Hypersparse {
            p: Arc::new(merged.p),
            h: Arc::new(cols),
            i: Arc::new(i_out),
        }
    } else {
        Structure::Sparse {
            p: Arc::new(merged.p),
            i: Arc::new(i_out),
        }
    };
    let is_iso = iso.is_some();
    let x = match (iso, z) {
        (Some(x), _) | (None, Some(x)) => x,
        (None, None) => Values::try_zeroed(0, csize)?,
    };
    let c = Matrix::from_parts(c_type, a.nrows(), a.ncols(), structure, x, is_iso);
    if hyper && combine == Combine::Intersection {
        prune_empty_vectors(c)
    } else {
        Ok(c)
    }
}
