//! Element-wise, reduction, multiply, build and finishing through the client

mod common;

use common::{create_client, entries, random_matrix};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sparx::dtype::DType;
use sparx::ops::UserBinaryOp;
use sparx::prelude::*;
use std::collections::BTreeMap;

const FORMATS: [Format; 3] = [Format::Sparse, Format::Hypersparse, Format::Bitmap];

fn random_pair(rng: &mut StdRng, fa: Format, fb: Format) -> (Matrix, Matrix) {
    let (nrows, ncols) = (rng.random_range(1..30), rng.random_range(1..30));
    let na = rng.random_range(0..=(nrows * ncols).min(80));
    let nb = rng.random_range(0..=(nrows * ncols).min(80));
    let a = random_matrix(rng, nrows, ncols, na, fa, |k| k as i64 + 1);
    let b = random_matrix(rng, nrows, ncols, nb, fb, |k| 1000 * (k as i64 + 1));
    (a, b)
}

#[test]
fn test_ewise_union_and_intersection_random() {
    let mut rng = StdRng::seed_from_u64(21);
    let plus = BinaryOp::plus(DType::I64);
    for fa in FORMATS {
        for fb in FORMATS {
            let (a, b) = random_pair(&mut rng, fa, fb);
            let (ea, eb) = (entries::<i64>(&a), entries::<i64>(&b));
            let mut union = ea.clone();
            for (k, v) in &eb {
                *union.entry(*k).or_insert(0) += v;
            }
            let inter: BTreeMap<_, _> = ea
                .iter()
                .filter_map(|(k, v)| eb.get(k).map(|w| (*k, v + w)))
                .collect();

            for threads in [1, 4] {
                let client = create_client(threads);
                let c = client.ewise_add(&a, &b, &plus, None).unwrap();
                c.check().unwrap();
                assert_eq!(entries::<i64>(&c), union, "{fa} + {fb}");
                let c = client.ewise_mult(&a, &b, &plus, None).unwrap();
                c.check().unwrap();
                assert_eq!(entries::<i64>(&c), inter, "{fa} .* {fb}");
            }
        }
    }
}

#[test]
fn test_ewise_user_operator_and_comparison() {
    let client = create_client(2);
    let a = Matrix::from_tuples(2, 2, &[0, 1], &[0, 1], &[3.0f32, 4.0], Format::Sparse).unwrap();
    let b = Matrix::from_tuples(2, 2, &[0, 1], &[0, 0], &[2.0f32, 5.0], Format::Sparse).unwrap();

    let hypot = BinaryOp::user(UserBinaryOp::from_fn::<f32, f32, f32>("hypot", |x, y| {
        (x * x + y * y).sqrt()
    }));
    let c = client.ewise_mult(&a, &b, &hypot, None).unwrap();
    let got = entries::<f32>(&c);
    assert_eq!(got.len(), 1);
    assert!((got[&(0, 0)] - 13f32.sqrt()).abs() < 1e-6);

    let gt = BinaryOp::builtin(BinaryOpcode::Gt, DType::F32);
    let c = client.ewise_mult(&a, &b, &gt, None).unwrap();
    assert_eq!(c.ty(), &ElemType::from(DType::Bool));
    assert_eq!(c.nvals(), 1);
}

#[test]
fn test_ewise_under_mask() {
    let client = create_client(2);
    let a = Matrix::from_full(2, 2, &[1i32, 2, 3, 4]).unwrap();
    let b = Matrix::from_full(2, 2, &[10i32, 20, 30, 40]).unwrap();
    let m = Matrix::from_tuples(2, 2, &[1], &[1], &[1i32], Format::Sparse).unwrap();
    let c = client
        .ewise_add(&a, &b, &BinaryOp::plus(DType::I32), Some(&Mask::new(&m)))
        .unwrap();
    assert_eq!(c.extract_tuples::<i32>().unwrap(), (vec![1], vec![1], vec![44]));
}

#[test]
fn test_reduce_random_every_format() {
    let mut rng = StdRng::seed_from_u64(5);
    for format in FORMATS {
        let a = random_matrix(&mut rng, 40, 35, 300, format, |k| (k % 17) as i32 - 8);
        let (_, _, v) = a.extract_tuples::<i32>().unwrap();
        for threads in [1, 3] {
            let client = create_client(threads);
            let sum = client.reduce(&a, &Monoid::plus(DType::I64)).unwrap();
            assert_eq!(sum.get::<i64>(), Some(v.iter().map(|&x| x as i64).sum()));
            let min = client.reduce(&a, &Monoid::min(DType::I32)).unwrap();
            assert_eq!(min.get::<i32>(), v.iter().copied().min());
        }
    }
}

#[test]
fn test_reduce_full_and_empty() {
    let client = create_client(2);
    let a = Matrix::from_full(3, 3, &[1.5f64; 9]).unwrap();
    let sum = client.reduce(&a, &Monoid::plus(DType::F64)).unwrap();
    assert_eq!(sum.get::<f64>(), Some(13.5));

    let empty = Matrix::new(DType::F64, 10, 10).unwrap();
    let max = client.reduce(&empty, &Monoid::max(DType::F64)).unwrap();
    assert_eq!(max.get::<f64>(), Some(f64::NEG_INFINITY));
}

fn dense_product(a: &Matrix, b: &Matrix) -> BTreeMap<(usize, usize), i64> {
    let (ea, eb) = (entries::<i64>(a), entries::<i64>(b));
    let mut c = BTreeMap::new();
    for (&(i, k), &x) in &ea {
        for (&(k2, j), &y) in &eb {
            if k == k2 {
                *c.entry((i, j)).or_insert(0) += x * y;
            }
        }
    }
    c
}

#[test]
fn test_mxm_random_every_format() {
    let mut rng = StdRng::seed_from_u64(9);
    let semiring = Semiring::plus_times(DType::I64);
    for fa in FORMATS {
        for fb in [Format::Sparse, Format::Hypersparse, Format::Full] {
            let a = random_matrix(&mut rng, 25, 15, 60, fa, |k| (k % 5) as i64 + 1);
            let nb = if fb == Format::Full { 15 * 20 } else { 50 };
            let b = random_matrix(&mut rng, 15, 20, nb, fb, |k| (k % 3) as i64 - 1);
            let expected = dense_product(&a, &b);
            for threads in [1, 4] {
                let client = create_client(threads);
                let c = client.mxm(&a, &b, &semiring, None).unwrap();
                c.check().unwrap();
                assert_eq!(entries::<i64>(&c), expected, "{fa} * {fb}");
            }
        }
    }
}

#[test]
fn test_mxm_masked_and_boolean() {
    let client = create_client(2);
    // path graph 0 -> 1 -> 2 -> 3, edge (i, j) stored at row j, column i
    let adj = Matrix::from_tuples(4, 4, &[1, 2, 3], &[0, 1, 2], &[1u8, 1, 1], Format::Sparse).unwrap();
    let two_hops = client.mxm(&adj, &adj, &Semiring::any_pair(DType::U8), None).unwrap();
    let reach: Vec<_> = entries::<u8>(&two_hops).into_keys().collect();
    assert_eq!(reach, vec![(2, 0), (3, 1)]);

    let m = Matrix::from_tuples(4, 4, &[2], &[0], &[1u8], Format::Sparse).unwrap();
    let masked = client
        .mxm(&adj, &adj, &Semiring::any_pair(DType::U8), Some(&Mask::new(&m).complement()))
        .unwrap();
    let reach: Vec<_> = entries::<u8>(&masked).into_keys().collect();
    assert_eq!(reach, vec![(3, 1)]);
}

#[test]
fn test_build_with_duplicates() {
    let client = create_client(2);
    let ty: ElemType = DType::F64.into();
    let values = Values::from_slice(&[1.0f64, 2.0, 3.0, 4.0]).unwrap();
    let c = client
        .build(&ty, 3, 3, &[2, 0, 2, 1], &[1, 0, 1, 2], &values, Some(&BinaryOp::plus(DType::F64)))
        .unwrap();
    c.check().unwrap();
    assert_eq!(
        c.extract_tuples::<f64>().unwrap(),
        (vec![0, 2, 1], vec![0, 1, 2], vec![2.0, 4.0, 4.0])
    );

    let err = client.build(&ty, 3, 3, &[2, 2], &[1, 1], &Values::from_slice(&[1.0f64, 2.0]).unwrap(), None);
    assert!(err.is_err());
    let err = client.build(&ty, 3, 3, &[3], &[0], &Values::from_slice(&[1.0f64]).unwrap(), None);
    assert!(matches!(err, Err(Error::IndexOutOfBounds { .. })));
}

#[test]
fn test_pending_work_and_wait() {
    let client = create_client(3);
    let mut a = Matrix::from_tuples(5, 5, &[0, 1, 4], &[0, 2, 4], &[1i32, 2, 3], Format::Sparse).unwrap();
    a.set_element(3, 3, 7i32).unwrap();
    a.set_element(0, 0, 10i32).unwrap();
    a.remove_element(1, 2).unwrap();
    assert_eq!(a.get_element::<i32>(1, 2).unwrap(), None);
    assert_eq!(a.get_element::<i32>(3, 3).unwrap(), Some(7));

    // operations see the finished matrix without changing the input
    let sum = client.reduce(&a, &Monoid::plus(DType::I64)).unwrap();
    assert_eq!(sum.get::<i64>(), Some(20));
    assert!(a.has_deferred_work());

    client.wait(&mut a).unwrap();
    assert!(!a.has_deferred_work());
    a.check().unwrap();
    assert_eq!(
        a.extract_tuples::<i32>().unwrap(),
        (vec![0, 3, 4], vec![0, 3, 4], vec![10, 7, 3])
    );
}

#[test]
fn test_convert_between_formats() {
    let client = create_client(2);
    let a = Matrix::from_tuples(4, 6, &[0, 3, 2], &[1, 1, 5], &[1u64, 2, 3], Format::Sparse).unwrap();
    for format in [Format::Hypersparse, Format::Bitmap, Format::Sparse] {
        let c = client.convert(&a, format).unwrap();
        assert_eq!(c.format(), format);
        c.check().unwrap();
        assert_eq!(entries::<u64>(&c), entries::<u64>(&a));
    }
    let dense = Matrix::from_full(2, 2, &[1u64, 2, 3, 4]).unwrap();
    let sparse = client.convert(&dense, Format::Sparse).unwrap();
    assert_eq!(sparse.col_ptrs(), Some(&[0i64, 2, 4][..]));
}
