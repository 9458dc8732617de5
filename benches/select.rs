//! Selection throughput by format and thread count.
//!
//! - value selectors (ValueLe) on sparse and bitmap matrices
//! - structural column selectors that keep or drop whole vectors
//! - iso shortcut

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sparx::dtype::DType;
use sparx::prelude::*;

fn matrix(n: usize, nnz: usize, format: Format) -> Matrix {
    let mut rng = StdRng::seed_from_u64(42);
    let rows: Vec<usize> = (0..nnz).map(|_| rng.random_range(0..n)).collect();
    let cols: Vec<usize> = (0..nnz).map(|_| rng.random_range(0..n)).collect();
    let vals: Vec<i32> = (0..nnz).map(|_| rng.random_range(-100..100)).collect();
    let ty: ElemType = DType::I32.into();
    let client = Client::without_jit(Config::single_threaded());
    let x = Values::from_slice(&vals).unwrap();
    let a = client
        .build(&ty, n, n, &rows, &cols, &x, Some(&BinaryOp::second(DType::I32)))
        .unwrap();
    client.convert(&a, format).unwrap()
}

fn client(threads: usize) -> Client {
    let mut config = Config::default();
    config.max_threads = threads;
    config.jit.mode = JitMode::Pause;
    Client::without_jit(config)
}

fn bench_value_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_value_le");
    let le = IndexUnaryOp::value(IndexUnaryOpcode::ValueLe, DType::I32);
    let thunk = Scalar::new(0i32);

    for format in [Format::Sparse, Format::Bitmap] {
        let a = matrix(2000, 400_000, format);
        group.throughput(Throughput::Elements(a.nvals() as u64));
        for threads in [1, 4] {
            let client = client(threads);
            let id = BenchmarkId::new(format.to_string(), threads);
            group.bench_with_input(id, &a, |b, a| {
                b.iter(|| black_box(client.select(a, &le, &thunk, None).unwrap()))
            });
        }
    }

    group.finish();
}

fn bench_structural_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_col_le");
    let a = matrix(20_000, 200_000, Format::Hypersparse);
    let op = IndexUnaryOp::positional(IndexUnaryOpcode::ColLe);
    let client = client(1);

    for cut in [100i64, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(cut), &cut, |b, &cut| {
            b.iter(|| black_box(client.select(&a, &op, &Scalar::new(cut), None).unwrap()))
        });
    }

    group.finish();
}

fn bench_iso_select(c: &mut Criterion) {
    let a = matrix(2000, 100_000, Format::Sparse);
    let client = client(1);
    let one = ApplyOp::Unary(UnaryOp::builtin(UnaryOpcode::One, DType::I32));
    let mut iso = client.apply(&a, &one, None, None).unwrap();
    iso.make_iso();
    let le = IndexUnaryOp::value(IndexUnaryOpcode::ValueLe, DType::I32);

    c.bench_function("select_iso", |b| {
        b.iter(|| black_box(client.select(&iso, &le, &Scalar::new(5i32), None).unwrap()))
    });
}

criterion_group!(benches, bench_value_select, bench_structural_select, bench_iso_select);
criterion_main!(benches);
