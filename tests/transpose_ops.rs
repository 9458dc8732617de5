//! Transposition and apply across formats and thread counts

mod common;

use common::{create_client, entries, random_matrix};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sparx::dtype::DType;
use sparx::ops::UserUnaryOp;
use sparx::prelude::*;
use std::collections::BTreeMap;

fn transposed<T: Copy>(m: &BTreeMap<(usize, usize), T>) -> BTreeMap<(usize, usize), T> {
    m.iter().map(|(&(i, j), &v)| ((j, i), v)).collect()
}

#[test]
fn test_random_round_trips() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..20 {
        let nrows = rng.random_range(1..60);
        let ncols = rng.random_range(1..60);
        let nnz = rng.random_range(0..=(nrows * ncols).min(150));
        let format = [Format::Sparse, Format::Hypersparse, Format::Bitmap][rng.random_range(0..3)];
        let a = random_matrix(&mut rng, nrows, ncols, nnz, format, |k| k as i64 * 3 - 50);
        let expected = transposed(&entries::<i64>(&a));

        for threads in [1, 2, 5] {
            let client = create_client(threads);
            let t = client.transpose(&a, None, None, None).unwrap();
            t.check().unwrap();
            assert_eq!((t.nrows(), t.ncols()), (ncols, nrows));
            assert_eq!(entries::<i64>(&t), expected);
            let back = client.transpose(&t, None, None, None).unwrap();
            assert_eq!(
                back.extract_tuples::<i64>().unwrap(),
                a.extract_tuples::<i64>().unwrap()
            );
        }
    }
}

#[test]
fn test_full_stays_full() {
    let client = create_client(3);
    let a = Matrix::from_full(3, 2, &[1u16, 2, 3, 4, 5, 6]).unwrap();
    let t = client.transpose(&a, None, None, None).unwrap();
    assert_eq!(t.format(), Format::Full);
    assert_eq!(t.values().typed::<u16>(), &[1, 4, 2, 5, 3, 6]);
}

#[test]
fn test_iso_transpose_stays_iso() {
    let client = create_client(2);
    let a = Matrix::from_csc_iso(3, 3, vec![0, 1, 1, 3], vec![2, 0, 1], &Scalar::new(7i8)).unwrap();
    let t = client.transpose(&a, None, None, None).unwrap();
    assert!(t.is_iso());
    assert_eq!(t.get_element::<i8>(2, 1).unwrap(), Some(7));
    assert_eq!(t.get_element::<i8>(0, 2).unwrap(), Some(7));
    assert_eq!(t.nvals(), 3);
}

#[test]
fn test_transpose_with_operator_and_mask() {
    let client = create_client(2);
    let a = Matrix::from_tuples(2, 3, &[0, 1, 1], &[0, 0, 2], &[1.5f32, -2.0, 4.0], Format::Sparse)
        .unwrap();
    let abs = ApplyOp::Unary(UnaryOp::builtin(UnaryOpcode::Abs, DType::F32));
    let t = client.transpose(&a, Some(&abs), None, None).unwrap();
    assert_eq!(entries::<f32>(&t)[&(0, 1)], 2.0);

    let m = Matrix::from_tuples(3, 2, &[2], &[1], &[1.0f64], Format::Sparse).unwrap();
    let t = client.transpose(&a, Some(&abs), None, Some(&Mask::new(&m))).unwrap();
    assert_eq!(t.extract_tuples::<f32>().unwrap(), (vec![2], vec![1], vec![4.0]));
}

#[test]
fn test_in_place_transpose() {
    let client = create_client(1);
    let mut a = Matrix::from_csc(2, 4, vec![0, 1, 1, 1, 2], vec![1, 0], &[8i32, 9]).unwrap();
    client.transpose_in_place(&mut a).unwrap();
    assert_eq!((a.nrows(), a.ncols()), (4, 2));
    assert_eq!(a.extract_tuples::<i32>().unwrap(), (vec![3, 0], vec![0, 1], vec![9, 8]));
}

#[test]
fn test_apply_bound_and_user_operators() {
    let client = create_client(2);
    let a = Matrix::from_tuples(3, 2, &[0, 2, 1], &[0, 0, 1], &[2i32, 5, 7], Format::Hypersparse)
        .unwrap();

    let minus = BinaryOp::builtin(BinaryOpcode::Minus, DType::I32);
    let c = client
        .apply(&a, &ApplyOp::BindFirst(minus.clone(), Scalar::new(10i32)), None, None)
        .unwrap();
    assert_eq!(c.extract_tuples::<i32>().unwrap().2, vec![8, 5, 3]);
    let c = client
        .apply(&a, &ApplyOp::BindSecond(minus, Scalar::new(10i32)), None, None)
        .unwrap();
    assert_eq!(c.extract_tuples::<i32>().unwrap().2, vec![-8, -5, -3]);
    assert_eq!(c.format(), Format::Hypersparse);

    let half = UnaryOp::user(UserUnaryOp::from_fn::<f64, f64>("half", |x| x / 2.0));
    let c = client.apply(&a, &ApplyOp::Unary(half), None, None).unwrap();
    assert_eq!(c.ty(), &ElemType::from(DType::F64));
    assert_eq!(c.extract_tuples::<f64>().unwrap().2, vec![1.0, 2.5, 3.5]);
}

#[test]
fn test_apply_with_output_cast() {
    let client = create_client(1);
    let a = Matrix::from_full(2, 1, &[-1.75f64, 2.25]).unwrap();
    let ainv = ApplyOp::Unary(UnaryOp::builtin(UnaryOpcode::Ainv, DType::F64));
    let c = client.apply(&a, &ainv, Some(&DType::F32.into()), None).unwrap();
    assert_eq!(c.format(), Format::Full);
    assert_eq!(c.values().typed::<f32>(), &[1.75, -2.25]);
}
