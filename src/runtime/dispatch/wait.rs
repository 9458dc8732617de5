//! Finishing deferred work: zombies, pending tuples and jumbled vectors

use super::Client;
use super::build::build;
use super::ewise::{Combine, ewise};
use super::select::select_in_place;
use crate::dtype::Scalar;
use crate::error::Result;
use crate::ops::{BinaryOp, IndexUnaryOp};
use log::debug;

/// Bring `a` to its finished state in place.
///
/// Zombies are dropped first, then pending tuples are assembled (the last
/// write to a coordinate wins) and merged in. The format is kept.
pub(crate) fn wait(client: &Client, a: &mut crate::sparse::Matrix) -> Result<()> {
    if !a.has_deferred_work() {
        return Ok(());
    }
    debug!(
        "wait: {} zombies, {} pending, jumbled {}",
        a.nzombies(),
        a.npending(),
        a.is_jumbled()
    );
    let (rows, cols, x) = a.pending_tuples()?;
    let mut base = a.shallow_copy();
    base.clear_pending();
    if base.nzombies() > 0 {
        select_in_place(client, &mut base, &IndexUnaryOp::nonzombie(), &Scalar::new(0i64))?;
    }
    if rows.is_empty() {
        base.unjumble()?;
        *a = base;
        return Ok(());
    }
    let second = BinaryOp::second(base.ty().clone());
    let t = build(client, base.ty(), base.nrows(), base.ncols(), &rows, &cols, &x, Some(&second))?;
    let mut c = ewise(client, &base, &t, &second, Combine::Union)?;
    if c.format() != base.format() {
        c = c.to_format(base.format())?;
    }
    *a = c;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;
    use crate::sparse::{Format, Matrix};

    #[test]
    fn test_wait_merges_pending_and_drops_zombies() {
        let client = testing::client(2);
        let mut a = Matrix::from_csc(4, 3, vec![0, 2, 3, 4], vec![0, 2, 1, 3], &[1i32, 2, 3, 4]).unwrap();
        a.remove_element(2, 0).unwrap();
        a.set_element(3, 0, 9i32).unwrap();
        a.set_element(0, 2, 7i32).unwrap();
        a.set_element(0, 2, 8i32).unwrap();
        assert!(a.has_deferred_work());
        wait(&client, &mut a).unwrap();
        assert!(!a.has_deferred_work());
        a.check().unwrap();
        assert_eq!(a.format(), Format::Sparse);
        assert_eq!(
            a.extract_tuples::<i32>().unwrap(),
            (vec![0, 3, 1, 0, 3], vec![0, 0, 1, 2, 2], vec![1, 9, 3, 8, 4])
        );
    }

    #[test]
    fn test_wait_works_on_a_copy_until_done() {
        let client = testing::client(1);
        let mut a = Matrix::from_csc(3, 2, vec![0, 1, 2], vec![0, 2], &[1i64, 2]).unwrap();
        a.set_element(1, 0, 5i64).unwrap();
        a.set_element(2, 0, 6i64).unwrap();
        a.remove_element(2, 1).unwrap();
        let before = a.shallow_copy();
        wait(&client, &mut a).unwrap();
        assert_eq!(
            a.extract_tuples::<i64>().unwrap(),
            (vec![0, 1, 2], vec![0, 0, 0], vec![1, 5, 6])
        );
        assert_eq!(before.npending(), 2);
        assert_eq!(before.nzombies(), 1);
    }

    #[test]
    fn test_wait_keeps_hypersparse() {
        let client = testing::client(1);
        let mut a = Matrix::from_hyper_csc(5, 100, vec![0, 1], vec![40], vec![2], &[1.5f64]).unwrap();
        a.set_element(0, 7, 2.5f64).unwrap();
        wait(&client, &mut a).unwrap();
        assert_eq!(a.format(), Format::Hypersparse);
        assert_eq!(a.hyper_list(), Some(&[7, 40][..]));
    }

    #[test]
    fn test_wait_only_zombies() {
        let client = testing::client(1);
        let mut a = Matrix::from_csc(2, 1, vec![0, 2], vec![0, 1], &[1u8, 2]).unwrap();
        a.remove_element(0, 0).unwrap();
        a.remove_element(1, 0).unwrap();
        wait(&client, &mut a).unwrap();
        assert_eq!(a.nvals(), 0);
        assert_eq!(a.nzombies(), 0);
    }
}
