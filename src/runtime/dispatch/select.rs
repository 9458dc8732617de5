//! Selection: keep the entries an index-unary predicate accepts

use super::{Client, finished, with_pattern};
use crate::dtype::Scalar;
use crate::error::Result;
use crate::kernels::{OperationDesc, Rows};
use crate::ops::{IndexUnaryOp, IndexUnaryOpcode};
use crate::runtime::slice::{
    TaskCounts, block_lens, merge_counts, slice_entries, slice_range, split_blocks,
};
use crate::runtime::workspace::{dense_len, try_vec, try_with_capacity};
use crate::sparse::matrix::{Compressed, Structure};
use crate::sparse::{Matrix, Values};
use log::debug;
use std::ops::Range;
use std::sync::Arc;

/// `C = select(A, op, thunk)`
pub(crate) fn select(
    client: &Client,
    a: &Matrix,
    op: &IndexUnaryOp,
    thunk: &Scalar,
) -> Result<Matrix> {
    let thunk = thunk.cast(op.ytype())?;
    let nonzombie = op.opcode() == Some(IndexUnaryOpcode::NonZombie);
    let a = if nonzombie {
        if a.nzombies() == 0 {
            return Ok(a.shallow_copy());
        }
        a.shallow_copy()
    } else {
        finished(client, a)?
    };
    if a.nvals() == 0 && a.nzombies() == 0 {
        return Ok(a);
    }

    if a.is_iso() && op.is_value_only() {
        let worker = client.worker(&OperationDesc::select(op, a.ty()))?;
        let mut keep = [0u8];
        worker.select(a.values().get(0), true, Rows::From(0), 0, thunk.bytes(), &mut keep);
        debug!("select: iso {} keeps {}", op.name(), if keep[0] != 0 { "all" } else { "none" });
        return if keep[0] != 0 {
            Ok(a)
        } else {
            a.empty_like(a.ty())
        };
    }

    if let (Some(opcode), Some(c), Some(t)) = (op.opcode(), a.compressed(), thunk.to_i64()) {
        if let Some(ranges) = kept_vectors(opcode, c, t) {
            let kept: usize = ranges.iter().map(Range::len).sum();
            debug!("select: structural {} keeps {kept} of {} vectors", op.name(), c.nvec());
            return keep_vectors(&a, c, &ranges);
        }
    }

    let worker = client.worker(&OperationDesc::select(op, a.ty()))?;
    let size = a.ty().size();
    let iso = a.is_iso();
    let xin = a.values().bytes();
    let y = thunk.bytes();
    let c = filter(client, &a, |j, entries, rows, keep| {
        let x = if iso {
            xin
        } else {
            &xin[entries.start * size..entries.end * size]
        };
        worker.select(x, iso, Rows::Indices(rows), j as i64, y, keep);
    })?;
    debug!("select: {} kept {} of {} entries", op.name(), c.nvals(), a.nvals());
    Ok(c)
}

/// `A = select(A, op, thunk)`, dropping vectors left empty
pub(crate) fn select_in_place(
    client: &Client,
    a: &mut Matrix,
    op: &IndexUnaryOp,
    thunk: &Scalar,
) -> Result<()> {
    let c = select(client, a, op, thunk)?;
    *a = prune_empty_vectors(c)?;
    Ok(())
}

/// Stored-vector ranges kept by a column selector, or `None` when the
/// operator needs per-entry evaluation
fn kept_vectors(opcode: IndexUnaryOpcode, c: Compressed<'_>, t: i64) -> Option<Vec<Range<usize>>> {
    let nvec = c.nvec();
    match opcode {
        IndexUnaryOpcode::ColLe => Some(vec![0..c.lower_bound(t.saturating_add(1)).0]),
        IndexUnaryOpcode::ColGt => Some(vec![c.lower_bound(t.saturating_add(1)).0..nvec]),
        IndexUnaryOpcode::ColIndex => Some(match t.checked_neg().and_then(|j| c.find(j)) {
            Some(k) => vec![0..k, k + 1..nvec],
            None => vec![0..nvec],
        }),
        _ => None,
    }
}

/// Copy of `a` holding only the stored vectors in `ranges`
fn keep_vectors(a: &Matrix, c: Compressed<'_>, ranges: &[Range<usize>]) -> Result<Matrix> {
    let span = |r: &Range<usize>| c.p[r.start] as usize..c.p[r.end] as usize;
    let nnz: usize = ranges.iter().map(|r| span(r).len()).sum();
    if nnz == c.nnz() {
        return Ok(a.shallow_copy());
    }
    if nnz == 0 {
        return a.empty_like(a.ty());
    }

    let size = a.ty().size();
    let mut i = try_with_capacity(nnz)?;
    let mut x = if a.is_iso() {
        None
    } else {
        Some(Values::try_zeroed(nnz, size)?)
    };
    let mut q = 0;
    for r in ranges {
        let e = span(r);
        i.extend_from_slice(&c.i[e.clone()]);
        if let Some(x) = x.as_mut() {
            x.bytes_mut()[q * size..(q + e.len()) * size]
                .copy_from_slice(&a.values().bytes()[e.start * size..e.end * size]);
        }
        q += e.len();
    }

    let structure = match c.h {
        Some(h) => {
            let nvec: usize = ranges.iter().map(Range::len).sum();
            let mut hp = try_with_capacity(nvec + 1)?;
            let mut hh = try_with_capacity(nvec)?;
            let mut running = 0;
            hp.push(0);
            for r in ranges {
                for k in r.clone() {
                    running += c.p[k + 1] - c.p[k];
                    hh.push(h[k]);
                    hp.push(running);
                }
            }
            Structure::Hypersparse {
                p: Arc::new(hp),
                h: Arc::new(hh),
                i: Arc::new(i),
            }
        }
        None => {
            let mut p = try_vec(c.nvec() + 1, 0i64)?;
            for r in ranges {
                for k in r.clone() {
                    p[k + 1] = c.p[k + 1] - c.p[k];
                }
            }
            for k in 0..c.nvec() {
                p[k + 1] += p[k];
            }
            Structure::Sparse {
                p: Arc::new(p),
                i: Arc::new(i),
            }
        }
    };
    Ok(with_pattern(a, structure, x))
}

/// Keep the entries of `a` flagged by `f`.
///
/// `f(j, entries, rows, keep)` is called once per column, or per part of a
/// column when a column is split between tasks. `entries` are the storage
/// positions of the entries, `rows` their row indices, and `keep` receives
/// one flag per entry. Dense inputs pass every slot of the column, absent
/// bitmap slots are dropped afterwards.
///
/// The result shares the values of `a` when they need no compaction, and
/// `a` itself when nothing is dropped.
pub(crate) fn filter<F>(client: &Client, a: &Matrix, f: F) -> Result<Matrix>
where
    F: Fn(usize, Range<usize>, &[i64], &mut [u8]) + Sync,
{
    match a.compressed() {
        Some(c) => filter_compressed(client, a, c, &f),
        None => filter_dense(client, a, &f),
    }
}

fn filter_compressed<F>(client: &Client, a: &Matrix, c: Compressed<'_>, f: &F) -> Result<Matrix>
where
    F: Fn(usize, Range<usize>, &[i64], &mut [u8]) + Sync,
{
    let nnz = c.nnz();
    if c.nvec() == 0 || nnz == 0 {
        return Ok(a.shallow_copy());
    }
    let par = client.parallelism();
    let slices = slice_entries(c.p, par.ntasks(nnz as f64));

    // phase 1: keep flags and survivors per vector, read-only over `a`
    let mut keep = try_vec(nnz, 0u8)?;
    let blocks = split_blocks(&mut keep, slices.iter().map(|s| s.entries.len()));
    let counts = par.run_tasks(slices.iter().zip(blocks).collect(), |(s, flags)| -> Result<TaskCounts> {
        let mut counts = try_vec(s.nvectors(), 0i64)?;
        for k in s.kfirst..=s.klast {
            let r = s.vector_entries(c.p, k);
            if r.is_empty() {
                continue;
            }
            let local = &mut flags[r.start - s.entries.start..r.end - s.entries.start];
            f(c.vector(k) as usize, r.clone(), &c.i[r], local);
            counts[k - s.kfirst] = local.iter().filter(|&&b| b != 0).count() as i64;
        }
        Ok(TaskCounts {
            kfirst: s.kfirst,
            counts,
        })
    });
    let counts = counts.into_iter().collect::<Result<Vec<_>>>()?;
    let merged = merge_counts(c.nvec(), &counts)?;
    let nout = merged.nnz();
    if nout == nnz {
        return Ok(a.shallow_copy());
    }

    // phase 2: each task writes its survivors into its own output block
    let size = a.ty().size();
    let lens = block_lens(&merged.task_offsets, nout);
    let mut i_out = try_vec(nout, 0i64)?;
    let mut x_out = if a.is_iso() {
        None
    } else {
        Some(Values::try_zeroed(nout, size)?)
    };
    let i_blocks = split_blocks(&mut i_out, lens.iter().copied());
    let x_blocks: Vec<Option<&mut [u8]>> = match x_out.as_mut() {
        Some(x) => split_blocks(x.bytes_mut(), lens.iter().map(|l| l * size))
            .into_iter()
            .map(Some)
            .collect(),
        None => lens.iter().map(|_| None).collect(),
    };
    let xin = a.values().bytes();
    let keep = &keep;
    let tasks: Vec<_> = slices.iter().zip(i_blocks).zip(x_blocks).collect();
    par.run_tasks(tasks, |((s, ib), mut xb)| {
        let flags = &keep[s.entries.clone()];
        let mut q = 0;
        for (d, p) in s.entries.clone().enumerate() {
            if flags[d] == 0 {
                continue;
            }
            ib[q] = c.i[p];
            if let Some(xb) = xb.as_mut() {
                xb[q * size..(q + 1) * size].copy_from_slice(&xin[p * size..(p + 1) * size]);
            }
            q += 1;
        }
    });

    let structure = match c.h {
        Some(_) => Structure::Hypersparse {
            p: Arc::new(merged.p),
            h: match &a.structure {
                Structure::Hypersparse { h, .. } => Arc::clone(h),
                _ => Arc::new(Vec::new()),
            },
            i: Arc::new(i_out),
        },
        None => Structure::Sparse {
            p: Arc::new(merged.p),
            i: Arc::new(i_out),
        },
    };
    Ok(with_pattern(a, structure, x_out))
}

fn filter_dense<F>(client: &Client, a: &Matrix, f: &F) -> Result<Matrix>
where
    F: Fn(usize, Range<usize>, &[i64], &mut [u8]) + Sync,
{
    let (nrows, ncols) = (a.nrows(), a.ncols());
    let n = dense_len(nrows, ncols)?;
    if n == 0 {
        return Ok(a.shallow_copy());
    }
    let par = client.parallelism();
    let cols = slice_range(ncols, par.ntasks(n as f64));
    let present = a.bitmap();
    let mut b = try_vec(n, 0u8)?;
    let blocks = split_blocks(&mut b, cols.iter().map(|r| r.len() * nrows));
    let kept = par.run_tasks(cols.into_iter().zip(blocks).collect(), |(range, flags)| -> Result<usize> {
        let mut rows = try_with_capacity(nrows)?;
        rows.extend(0..nrows as i64);
        let mut kept = 0;
        for (d, j) in range.enumerate() {
            let slots = j * nrows..(j + 1) * nrows;
            let local = &mut flags[d * nrows..(d + 1) * nrows];
            f(j, slots.clone(), &rows, local);
            match present {
                Some(bm) => {
                    for (flag, &e) in local.iter_mut().zip(&bm[slots]) {
                        *flag = (*flag != 0 && e != 0) as u8;
                    }
                }
                None => {
                    for flag in local.iter_mut() {
                        *flag = (*flag != 0) as u8;
                    }
                }
            }
            kept += local.iter().filter(|&&flag| flag != 0).count();
        }
        Ok(kept)
    });
    let nvals = kept.into_iter().sum::<Result<usize>>()?;
    if nvals == a.nvals() {
        return Ok(a.shallow_copy());
    }
    let structure = Structure::Bitmap {
        b: Arc::new(b),
        nvals,
    };
    Ok(with_pattern(a, structure, None))
}

/// Remove empty vectors from the hyper list of `m`
pub(crate) fn prune_empty_vectors(mut m: Matrix) -> Result<Matrix> {
    let pruned = match &m.structure {
        Structure::Hypersparse { p, h, i } if (0..h.len()).any(|k| p[k] == p[k + 1]) => {
            let nonempty = (0..h.len()).filter(|&k| p[k] < p[k + 1]).count();
            let mut hp = try_with_capacity(nonempty + 1)?;
            let mut hh = try_with_capacity(nonempty)?;
            for k in 0..h.len() {
                if p[k] < p[k + 1] {
                    hh.push(h[k]);
                    hp.push(p[k]);
                }
            }
            hp.push(p[h.len()]);
            Some(Structure::Hypersparse {
                p: Arc::new(hp),
                h: Arc::new(hh),
                i: Arc::clone(i),
            })
        }
        _ => None,
    };
    if let Some(structure) = pruned {
        m.structure = structure;
    }
    Ok(m)
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;
    use crate::dtype::DType;
    use crate::ops::builtin::positional_keep;
    use crate::sparse::Format;

    fn sample(format: Format) -> Matrix {
        // 4 x 6, columns 0, 2, 3 and 5 occupied
        let rows = [0, 3, 1, 2, 0, 1, 3];
        let cols = [0, 0, 2, 2, 3, 5, 5];
        let vals = [1i32, 2, 3, 4, 5, 6, 7];
        Matrix::from_tuples(4, 6, &rows, &cols, &vals, format).unwrap()
    }

    fn reference(a: &Matrix, opcode: IndexUnaryOpcode, t: i64) -> Vec<(usize, usize, i32)> {
        let (r, c, v) = a.extract_tuples::<i32>().unwrap();
        (0..r.len())
            .filter(|&k| positional_keep(opcode, r[k] as i64, c[k] as i64, t))
            .map(|k| (r[k], c[k], v[k]))
            .collect()
    }

    fn tuples(a: &Matrix) -> Vec<(usize, usize, i32)> {
        let (r, c, v) = a.extract_tuples::<i32>().unwrap();
        (0..r.len()).map(|k| (r[k], c[k], v[k])).collect()
    }

    #[test]
    fn test_structural_selectors_match_reference() {
        let client = testing::client(1);
        for format in [Format::Sparse, Format::Hypersparse] {
            let a = sample(format);
            for opcode in [
                IndexUnaryOpcode::ColLe,
                IndexUnaryOpcode::ColGt,
                IndexUnaryOpcode::ColIndex,
            ] {
                for t in -7i64..8 {
                    let op = IndexUnaryOp::positional(opcode);
                    let c = select(&client, &a, &op, &Scalar::new(t)).unwrap();
                    c.check().unwrap();
                    assert_eq!(tuples(&c), reference(&a, opcode, t), "{opcode:?} {t} {format}");
                }
            }
        }
        assert_eq!(client.tier_stats(), Default::default());
    }

    #[test]
    fn test_keep_all_is_shallow() {
        let client = testing::client(1);
        let a = sample(Format::Hypersparse);
        let op = IndexUnaryOp::positional(IndexUnaryOpcode::ColLe);
        let c = select(&client, &a, &op, &Scalar::new(100i64)).unwrap();
        assert!(c.shares_values_with(&a));
        let none = select(&client, &a, &op, &Scalar::new(-1i64)).unwrap();
        assert_eq!(none.nvals(), 0);
        assert_eq!(none.format(), Format::Hypersparse);
    }

    #[test]
    fn test_iso_shortcut() {
        let client = testing::client(1);
        let a = Matrix::from_csc_iso(3, 2, vec![0, 2, 3], vec![0, 2, 1], &Scalar::new(4i16)).unwrap();
        let le = IndexUnaryOp::value(IndexUnaryOpcode::ValueLe, DType::I16);
        let all = select(&client, &a, &le, &Scalar::new(5i16)).unwrap();
        assert!(all.shares_values_with(&a));
        assert_eq!(all.nvals(), 3);
        let none = select(&client, &a, &le, &Scalar::new(3i16)).unwrap();
        assert_eq!(none.nvals(), 0);
        assert_eq!((none.nrows(), none.ncols()), (3, 2));
    }

    #[test]
    fn test_value_select_split_across_tasks() {
        let a = sample(Format::Sparse);
        let gt = IndexUnaryOp::value(IndexUnaryOpcode::ValueGt, DType::I32);
        for threads in [1, 3] {
            let client = testing::client(threads);
            let c = select(&client, &a, &gt, &Scalar::new(2i32)).unwrap();
            c.check().unwrap();
            let expected: Vec<_> = tuples(&a).into_iter().filter(|t| t.2 > 2).collect();
            assert_eq!(tuples(&c), expected);
        }
    }

    #[test]
    fn test_dense_select_produces_bitmap() {
        let client = testing::client(2);
        let a = Matrix::from_full(2, 3, &[1.0f64, -1.0, 2.0, -2.0, 3.0, -3.0]).unwrap();
        let tril = IndexUnaryOp::positional(IndexUnaryOpcode::Tril);
        let c = select(&client, &a, &tril, &Scalar::new(0i64)).unwrap();
        assert_eq!(c.format(), Format::Bitmap);
        assert_eq!(c.nvals(), 3);
        assert!(c.shares_values_with(&a));
        c.check().unwrap();
    }

    #[test]
    fn test_in_place_prunes_empty_vectors() {
        let client = testing::client(1);
        let mut a = sample(Format::Hypersparse);
        let rowle = IndexUnaryOp::positional(IndexUnaryOpcode::RowLe);
        select_in_place(&client, &mut a, &rowle, &Scalar::new(0i64)).unwrap();
        a.check().unwrap();
        assert_eq!(a.nvals(), 2);
        assert_eq!(a.hyper_list(), Some(&[0i64, 3][..]));
    }
}
