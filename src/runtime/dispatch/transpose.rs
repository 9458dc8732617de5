//! Transposition with an optional fused value map

use super::apply::{ValueMap, map_values};
use super::{Client, finished};
use crate::dtype::ElemType;
use crate::error::Result;
use crate::ops::ApplyOp;
use crate::runtime::Parallelism;
use crate::runtime::slice::{slice_range, slice_vectors, split_blocks};
use crate::runtime::workspace::{try_vec, try_with_capacity};
use crate::sparse::matrix::{Compressed, Structure};
use crate::sparse::{Matrix, Values};
use log::debug;
use std::sync::Arc;

#[cfg(feature = "rayon")]
use rayon::slice::ParallelSliceMut;

/// `C = op(A')`, typed `c_type`.
///
/// Without a type the result takes the operator's output type, or `A`'s
/// type when there is no operator either.
pub(crate) fn transpose(
    client: &Client,
    a: &Matrix,
    op: Option<&ApplyOp>,
    c_type: Option<&ElemType>,
) -> Result<Matrix> {
    let mut a = finished(client, a)?;
    a.unjumble()?;
    let c_type = c_type
        .or(op.map(ApplyOp::ztype))
        .unwrap_or(a.ty())
        .clone();
    let map = ValueMap::new(client, op, a.ty(), &c_type)?;

    let Some(c) = a.compressed() else {
        debug!("transpose: dense {}x{}", a.nrows(), a.ncols());
        return transpose_dense(client, &a, &map, c_type);
    };
    let nnz = c.nnz();
    if nnz == 0 {
        return Matrix::empty_with_format(c_type, a.ncols(), a.nrows(), a.format());
    }

    if a.ncols() == 1 || a.nrows() == 1 {
        debug!("transpose: relabel {}x{}", a.nrows(), a.ncols());
        let structure = relabel(&a, c)?;
        let x = if map.is_copy() {
            Arc::clone(&a.x)
        } else {
            Arc::new(map_values(client, &map, &a, &c_type)?)
        };
        return Ok(assemble(&a, c_type, structure, x));
    }

    let par = client.parallelism();
    let anrows = a.nrows();
    let ntasks = par.ntasks(nnz as f64);
    let bucket_tasks = ntasks.min((nnz / anrows).max(1));
    let (structure, src) = if anrows <= nnz.saturating_mul(2) && bucket_tasks * 4 >= ntasks {
        debug!("transpose: bucket sort, {bucket_tasks} tasks");
        bucket_sort(par, anrows, c, bucket_tasks)?
    } else {
        debug!("transpose: comparison sort, {ntasks} tasks");
        comparison_sort(par, c, ntasks)?
    };
    let x = gather_values(client, &map, &a, &c_type, nnz, |q| src[q])?;
    Ok(assemble(&a, c_type, structure, Arc::new(x)))
}

fn assemble(a: &Matrix, c_type: ElemType, structure: Structure, x: Arc<Values>) -> Matrix {
    let mut m = a.shallow_copy();
    m.ty = c_type;
    m.nrows = a.ncols();
    m.ncols = a.nrows();
    m.structure = structure;
    m.x = x;
    m.jumbled = false;
    m.nzombies = 0;
    m.pending = Vec::new();
    m
}

/// Values gathered from `src(q)` for every output position `q`, then mapped
fn gather_values<S>(
    client: &Client,
    map: &ValueMap,
    a: &Matrix,
    c_type: &ElemType,
    n: usize,
    src: S,
) -> Result<Values>
where
    S: Fn(usize) -> usize + Sync,
{
    if a.is_iso() {
        return map_values(client, map, a, c_type);
    }
    let asize = a.ty().size();
    let csize = c_type.size();
    let mut x = Values::try_zeroed(n, csize)?;
    let par = client.parallelism();
    let ranges = slice_range(n, par.ntasks(n as f64));
    let blocks = split_blocks(x.bytes_mut(), ranges.iter().map(|r| r.len() * csize));
    let xin = a.values().bytes();
    let done = par.run_tasks(ranges.into_iter().zip(blocks).collect(), |(r, z)| -> Result<()> {
        let mut local = try_vec(r.len() * asize, 0u8)?;
        for (d, q) in r.clone().enumerate() {
            let p = src(q);
            local[d * asize..(d + 1) * asize].copy_from_slice(&xin[p * asize..(p + 1) * asize]);
        }
        map.run(&local, false, z, r.len());
        Ok(())
    });
    done.into_iter().collect::<Result<()>>()?;
    Ok(x)
}

/// Full and bitmap: no pattern to rebuild, only the slot order changes
fn transpose_dense(
    client: &Client,
    a: &Matrix,
    map: &ValueMap,
    c_type: ElemType,
) -> Result<Matrix> {
    let (anrows, ancols) = (a.nrows(), a.ncols());
    let n = a.dense_slots();
    // output slot q holds A(q / ancols, q % ancols)
    let src = |q: usize| q / ancols + (q % ancols) * anrows;
    let structure = match &a.structure {
        Structure::Bitmap { b, nvals } => {
            let par = client.parallelism();
            let ranges = slice_range(n, par.ntasks(n as f64));
            let mut cb = try_vec(n, 0u8)?;
            let blocks = split_blocks(&mut cb, ranges.iter().map(|r| r.len()));
            par.run_tasks(ranges.into_iter().zip(blocks).collect(), |(r, out)| {
                for (d, q) in r.enumerate() {
                    out[d] = b[src(q)];
                }
            });
            Structure::Bitmap {
                b: Arc::new(cb),
                nvals: *nvals,
            }
        }
        _ => Structure::Full,
    };
    let x = gather_values(client, map, a, &c_type, n, src)?;
    Ok(assemble(a, c_type, structure, Arc::new(x)))
}

/// Single row or column: indices swap roles, values keep their order
fn relabel(a: &Matrix, c: Compressed<'_>) -> Result<Structure> {
    let nnz = c.nnz();
    if a.ncols() == 1 {
        // each entry of the column becomes a one-entry vector in row 0
        let mut p = try_with_capacity(nnz + 1)?;
        p.extend(0..=nnz as i64);
        let i = try_vec(nnz, 0i64)?;
        let h = match &a.structure {
            Structure::Sparse { i, .. } | Structure::Hypersparse { i, .. } => Arc::clone(i),
            _ => Arc::new(Vec::new()),
        };
        return Ok(Structure::Hypersparse {
            p: Arc::new(p),
            h,
            i: Arc::new(i),
        });
    }
    // a single row: the column of each entry becomes its row
    let mut i = try_with_capacity(nnz)?;
    for k in 0..c.nvec() {
        let j = c.vector(k);
        i.extend(c.range(k).map(|_| j));
    }
    Ok(Structure::Sparse {
        p: Arc::new(vec![0, nnz as i64]),
        i: Arc::new(i),
    })
}

/// Counting sort by row: one count array per task, merged serially.
///
/// Returns the sparse pattern of the transpose and, for each output
/// position, the input position its value comes from.
fn bucket_sort(
    par: &Parallelism,
    anrows: usize,
    c: Compressed<'_>,
    ntasks: usize,
) -> Result<(Structure, Vec<usize>)> {
    let nnz = c.nnz();
    let tasks = slice_vectors(c.p, ntasks);

    let counts = par.run_tasks(tasks.clone(), |r| -> Result<Vec<i64>> {
        let mut counts = try_vec(anrows, 0i64)?;
        for &row in &c.i[c.p[r.start] as usize..c.p[r.end] as usize] {
            counts[row as usize] += 1;
        }
        Ok(counts)
    });
    let mut cursors = counts.into_iter().collect::<Result<Vec<_>>>()?;

    // turn counts into each task's first write position per row
    let mut cp = try_vec(anrows + 1, 0i64)?;
    let mut running = 0;
    for r in 0..anrows {
        for cursor in cursors.iter_mut() {
            let count = cursor[r];
            cursor[r] = running;
            running += count;
        }
        cp[r + 1] = running;
    }

    let mut ci = try_vec(nnz, 0i64)?;
    let mut src = try_vec(nnz, 0usize)?;
    let ci_addr = ci.as_mut_ptr() as usize;
    let src_addr = src.as_mut_ptr() as usize;
    par.run_tasks(tasks.into_iter().zip(cursors).collect(), |(r, mut cursor)| {
        let ci = ci_addr as *mut i64;
        let srcp = src_addr as *mut usize;
        for k in r {
            let j = c.vector(k);
            for p in c.range(k) {
                let row = c.i[p] as usize;
                let q = cursor[row] as usize;
                cursor[row] += 1;
                // SAFETY: the merged cursors give every task a disjoint set of
                // output positions, all below nnz.
                unsafe {
                    *ci.add(q) = j;
                    *srcp.add(q) = p;
                }
            }
        }
    });

    Ok((
        Structure::Sparse {
            p: Arc::new(cp),
            i: Arc::new(ci),
        },
        src,
    ))
}

/// Sort (row, column) keys of every entry; the result is hypersparse
fn comparison_sort(
    par: &Parallelism,
    c: Compressed<'_>,
    ntasks: usize,
) -> Result<(Structure, Vec<usize>)> {
    let nnz = c.nnz();
    let mut keys = try_vec(nnz, (0i64, 0i64, 0usize))?;
    let tasks = slice_vectors(c.p, ntasks);
    let blocks = split_blocks(
        &mut keys,
        tasks.iter().map(|r| (c.p[r.end] - c.p[r.start]) as usize),
    );
    par.run_tasks(tasks.into_iter().zip(blocks).collect(), |(r, out)| {
        let base = c.p[r.start] as usize;
        for k in r {
            let j = c.vector(k);
            for p in c.range(k) {
                out[p - base] = (c.i[p], j, p);
            }
        }
    });
    sort_keys(par, &mut keys);

    let mut hp = Vec::new();
    let mut h = Vec::new();
    let mut ci = try_with_capacity(nnz)?;
    let mut src = try_with_capacity(nnz)?;
    for (q, &(row, col, p)) in keys.iter().enumerate() {
        if h.last() != Some(&row) {
            h.push(row);
            hp.push(q as i64);
        }
        ci.push(col);
        src.push(p);
    }
    hp.push(nnz as i64);
    Ok((
        Structure::Hypersparse {
            p: Arc::new(hp),
            h: Arc::new(h),
            i: Arc::new(ci),
        },
        src,
    ))
}

#[cfg(feature = "rayon")]
pub(crate) fn sort_keys(par: &Parallelism, keys: &mut [(i64, i64, usize)]) {
    if par.max_threads() > 1 {
        par.install(|| keys.par_sort_unstable());
    } else {
        keys.sort_unstable();
    }
}

#[cfg(not(feature = "rayon"))]
pub(crate) fn sort_keys(_par: &Parallelism, keys: &mut [(i64, i64, usize)]) {
    keys.sort_unstable();
}
