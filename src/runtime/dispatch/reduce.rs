//! Reduction of all entries to a scalar

use super::{Client, finished};
use crate::dtype::Scalar;
use crate::error::Result;
use crate::kernels::{OperationDesc, Worker};
use crate::ops::{Monoid, Terminal};
use crate::runtime::slice::slice_range;
use crate::runtime::workspace::try_copy;
use crate::sparse::Matrix;
use log::debug;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};

/// Entries folded between checks of the early-exit flag
const STRIDE: usize = 4096;

/// Fold every entry of `a` with `monoid`; an empty matrix gives the identity
pub(crate) fn reduce(client: &Client, a: &Matrix, monoid: &Monoid) -> Result<Scalar> {
    let a = finished(client, a)?;
    if a.nvals() == 0 {
        return Ok(monoid.identity().clone());
    }
    let worker = client.worker(&OperationDesc::reduce(monoid, a.ty()))?;
    if a.is_iso() {
        return reduce_iso(&worker, monoid, &a);
    }

    let asize = a.ty().size();
    let n = a.values().len();
    let xv = a.values().bytes();
    let bitmap = a.bitmap();
    let par = client.parallelism();
    let ranges = slice_range(n, par.ntasks(n as f64));
    let stop = AtomicBool::new(false);
    let partials = par.run_tasks(ranges, |r| -> Result<Vec<u8>> {
        let mut acc = try_copy(monoid.identity().bytes())?;
        let fold = |s: Range<usize>, acc: &mut [u8]| {
            worker.reduce(&xv[s.start * asize..s.end * asize], s.len(), acc)
        };
        let mut start = r.start;
        while start < r.end {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            let end = (start + STRIDE).min(r.end);
            let hit = match bitmap {
                None => fold(start..end, &mut acc),
                Some(b) => {
                    let mut hit = false;
                    let mut s = start;
                    while s < end && !hit {
                        if b[s] == 0 {
                            s += 1;
                            continue;
                        }
                        let mut e = s + 1;
                        while e < end && b[e] != 0 {
                            e += 1;
                        }
                        hit = fold(s..e, &mut acc);
                        s = e;
                    }
                    hit
                }
            };
            if hit {
                stop.store(true, Ordering::Relaxed);
                break;
            }
            start = end;
        }
        Ok(acc)
    });

    // a terminal partial absorbs the rest, so stopped tasks never change the result
    let f = monoid.op().to_fn();
    let mut acc = try_copy(monoid.identity().bytes())?;
    let mut tmp = acc.clone();
    for partial in partials {
        f(&mut tmp, &acc, &partial?);
        acc.copy_from_slice(&tmp);
        if monoid.terminal_bytes() == Some(acc.as_slice()) {
            break;
        }
    }
    Scalar::from_bytes(monoid.ty().clone(), acc)
}

/// Fold `n` copies of one value by repeated doubling
fn reduce_iso(worker: &Worker, monoid: &Monoid, a: &Matrix) -> Result<Scalar> {
    let mut power = try_copy(monoid.identity().bytes())?;
    // identity (+) cast(v) is cast(v)
    worker.reduce(a.values().get(0), 1, &mut power);
    if matches!(monoid.terminal(), Terminal::Any) {
        return Scalar::from_bytes(monoid.ty().clone(), power);
    }
    debug!("reduce: {} copies of one value by doubling", a.nvals());
    let f = monoid.op().to_fn();
    let terminal = monoid.terminal_bytes();
    let mut acc = try_copy(monoid.identity().bytes())?;
    let mut tmp = acc.clone();
    let mut n = a.nvals();
    while n > 0 {
        if n & 1 == 1 {
            f(&mut tmp, &acc, &power);
            acc.copy_from_slice(&tmp);
            if terminal == Some(acc.as_slice()) {
                break;
            }
        }
        n >>= 1;
        if n > 0 {
            f(&mut tmp, &power, &power);
            power.copy_from_slice(&tmp);
        }
    }
    Scalar::from_bytes(monoid.ty().clone(), acc)
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;
    use crate::dtype::DType;
    use crate::ops::BinaryOpcode;
    use crate::sparse::Format;

    #[test]
    fn test_reduce_formats_and_threads() {
        let vals: Vec<f64> = (1..=20).map(f64::from).collect();
        let rows: Vec<usize> = (0..20).map(|k| (k * 7) % 10).collect();
        let cols: Vec<usize> = (0..20).map(|k| k / 2).collect();
        let a = Matrix::from_tuples(10, 10, &rows, &cols, &vals, Format::Sparse).unwrap();
        for threads in [1, 4] {
            let client = testing::client(threads);
            for format in [Format::Hypersparse, Format::Sparse, Format::Bitmap] {
                let m = a.to_format(format).unwrap();
                let s = reduce(&client, &m, &Monoid::plus(DType::F64)).unwrap();
                assert_eq!(s.get::<f64>(), Some(210.0), "{format}");
                let s = reduce(&client, &m, &Monoid::max(DType::F64)).unwrap();
                assert_eq!(s.get::<f64>(), Some(20.0));
            }
        }
    }

    #[test]
    fn test_reduce_empty_gives_identity() {
        let client = testing::client(1);
        let a = Matrix::new(DType::I32, 4, 4).unwrap();
        let s = reduce(&client, &a, &Monoid::min(DType::I32)).unwrap();
        assert_eq!(s.get::<i32>(), Some(i32::MAX));
    }

    #[test]
    fn test_reduce_casts_input() {
        let client = testing::client(1);
        let a = Matrix::from_full(2, 2, &[1u8, 2, 3, 250]).unwrap();
        let s = reduce(&client, &a, &Monoid::plus(DType::I64)).unwrap();
        assert_eq!(s.get::<i64>(), Some(256));
    }

    #[test]
    fn test_reduce_iso_by_doubling() {
        let client = testing::client(1);
        let p = vec![0, 5];
        let i = vec![0, 1, 2, 3, 4];
        let a = Matrix::from_csc_iso(8, 1, p, i, &Scalar::new(3i64)).unwrap();
        let s = reduce(&client, &a, &Monoid::plus(DType::I64)).unwrap();
        assert_eq!(s.get::<i64>(), Some(15));
        let s = reduce(&client, &a, &Monoid::times(DType::I64)).unwrap();
        assert_eq!(s.get::<i64>(), Some(243));
        let s = reduce(&client, &a, &Monoid::any(DType::I64)).unwrap();
        assert_eq!(s.get::<i64>(), Some(3));
    }

    #[test]
    fn test_reduce_stops_at_terminal() {
        let client = testing::client(4);
        let mut vals = vec![2i32; 10_000];
        vals[5] = 0;
        let a = Matrix::from_full(100, 100, &vals).unwrap();
        let times = Monoid::builtin(BinaryOpcode::Times, DType::I32).unwrap();
        let s = reduce(&client, &a, &times).unwrap();
        assert_eq!(s.get::<i32>(), Some(0));
    }
}
