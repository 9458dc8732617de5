//! JIT cache behavior seen from outside the crate: single-flight
//! specialization, mode transitions and the generic fallback.

mod common;

use common::{FakeBackend, create_client, entries, scratch_dir, test_config};
use proptest::prelude::*;
use sparx::dtype::DType;
use sparx::jit::{JitMode, KernelCache, Signature, Specializer, Target, encode};
use sparx::kernels::{KernelArgs, OperationDesc};
use sparx::prelude::*;
use std::sync::Arc;

/// `z = (f64) x - y` for an i32 left operand and an f64 right operand
unsafe extern "C" fn minus_i32_f64(args: *const KernelArgs) -> i32 {
    let a = unsafe { &*args };
    for k in 0..a.n as usize {
        let x = unsafe { (a.x as *const i32).add(k * a.x_stride as usize).read_unaligned() };
        let y = unsafe { (a.y as *const f64).add(k * a.y_stride as usize).read_unaligned() };
        unsafe { (a.z as *mut f64).add(k).write_unaligned(x as f64 - y) };
    }
    0
}

fn minus_desc() -> OperationDesc {
    let op = BinaryOp::builtin(BinaryOpcode::Minus, DType::F64);
    OperationDesc::ewise(&op, &DType::I32.into(), &DType::F64.into(), &DType::F64.into())
}

fn minus_sig(desc: &OperationDesc) -> Signature {
    encode(desc, Target::Host).key().unwrap()
}

#[test]
fn test_concurrent_requests_compile_once() {
    let backend = FakeBackend::new(minus_i32_f64);
    let specializer = Specializer::new(backend.clone(), scratch_dir("single-flight"));
    let cache = KernelCache::new(JitMode::On);
    let desc = minus_desc();
    let sig = minus_sig(&desc);

    let handles: Vec<_> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..8)
            .map(|_| s.spawn(|| cache.get_or_specialize(&sig, &desc, &specializer)))
            .collect();
        workers.into_iter().map(|w| w.join().unwrap().unwrap()).collect()
    });

    assert_eq!(backend.compiles(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.stats().compiles, 1);
    for h in &handles[1..] {
        assert!(Arc::ptr_eq(&handles[0], h));
    }
}

#[test]
fn test_reset_then_reload_from_disk() {
    let backend = FakeBackend::new(minus_i32_f64);
    let specializer = Specializer::new(backend.clone(), scratch_dir("reset"));
    let cache = KernelCache::new(JitMode::On);
    let desc = minus_desc();
    let sig = minus_sig(&desc);

    assert!(cache.get_or_specialize(&sig, &desc, &specializer).is_some());
    cache.set_mode(JitMode::Reset);
    assert!(cache.is_empty());
    assert_eq!(cache.mode(), JitMode::On);

    // the module compiled before the reset is still on disk
    assert!(cache.get_or_specialize(&sig, &desc, &specializer).is_some());
    assert_eq!(backend.compiles(), 1);
    assert_eq!(cache.stats().loads, 1);
}

#[test]
fn test_reset_during_compile_waits_for_the_build() {
    let backend = FakeBackend::with_delay(minus_i32_f64, std::time::Duration::from_millis(200));
    let specializer = Specializer::new(backend.clone(), scratch_dir("reset-in-flight"));
    let cache = KernelCache::new(JitMode::On);
    let desc = minus_desc();
    let sig = minus_sig(&desc);

    let (first, second) = std::thread::scope(|s| {
        let first = s.spawn(|| cache.get_or_specialize(&sig, &desc, &specializer));
        std::thread::sleep(std::time::Duration::from_millis(50));
        cache.reset();
        let second = s.spawn(|| cache.get_or_specialize(&sig, &desc, &specializer));
        (first.join().unwrap(), second.join().unwrap())
    });

    assert!(first.is_some() && second.is_some());
    assert_eq!(backend.max_concurrent(), 1);
    assert_eq!(backend.compiles(), 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_load_only_never_compiles() {
    let backend = FakeBackend::new(minus_i32_f64);
    let specializer = Specializer::new(backend.clone(), scratch_dir("load-only"));
    let cache = KernelCache::new(JitMode::LoadOnly);
    let desc = minus_desc();
    let sig = minus_sig(&desc);

    assert!(cache.get_or_specialize(&sig, &desc, &specializer).is_none());
    assert_eq!(backend.compiles(), 0);
    assert_eq!(cache.stats().failures, 1);
}

#[test]
fn test_compile_and_load_ignores_disk() {
    let backend = FakeBackend::new(minus_i32_f64);
    let specializer = Specializer::new(backend.clone(), scratch_dir("compile-and-load"));
    let cache = KernelCache::new(JitMode::CompileAndLoad);
    let desc = minus_desc();
    let sig = minus_sig(&desc);

    assert!(cache.get_or_specialize(&sig, &desc, &specializer).is_some());
    cache.set_mode(JitMode::Reset);
    assert!(cache.get_or_specialize(&sig, &desc, &specializer).is_some());
    assert_eq!(backend.compiles(), 2);
}

#[test]
fn test_pause_serves_cached_kernels_only() {
    let backend = FakeBackend::new(minus_i32_f64);
    let specializer = Specializer::new(backend.clone(), scratch_dir("pause"));
    let cache = KernelCache::new(JitMode::Pause);
    let desc = minus_desc();
    let sig = minus_sig(&desc);

    assert!(cache.get_or_specialize(&sig, &desc, &specializer).is_none());
    cache.set_mode(JitMode::On);
    let handle = cache.get_or_specialize(&sig, &desc, &specializer).unwrap();
    cache.set_mode(JitMode::Pause);
    let again = cache.get_or_specialize(&sig, &desc, &specializer).unwrap();
    assert!(Arc::ptr_eq(&handle, &again));
    assert_eq!(backend.compiles(), 1);
}

#[test]
fn test_jit_kernel_runs_through_client() {
    let backend = FakeBackend::new(minus_i32_f64);
    let mut config = test_config(2, "client-jit");
    config.jit.mode = JitMode::On;
    let client = Client::builder(config).backend(backend.clone()).build();

    let a = Matrix::from_csc(3, 2, vec![0, 2, 3], vec![0, 2, 1], &[5i32, 7, 9]).unwrap();
    let b = Matrix::from_csc(3, 2, vec![0, 1, 3], vec![2, 0, 1], &[0.5f64, 1.0, 2.5]).unwrap();
    let minus = BinaryOp::builtin(BinaryOpcode::Minus, DType::F64);
    let c = client.ewise_mult(&a, &b, &minus, None).unwrap();

    assert_eq!(c.ty(), &ElemType::from(DType::F64));
    let got = entries::<f64>(&c);
    assert_eq!(got.len(), 2);
    assert_eq!(got[&(2, 0)], 6.5);
    assert_eq!(got[&(1, 1)], 6.5);
    assert_eq!(backend.compiles(), 1);
    assert!(client.tier_stats().jit >= 1);
}

#[test]
fn test_off_mode_uses_generic_tier_only() {
    let backend = FakeBackend::new(minus_i32_f64);
    let mut config = test_config(2, "off");
    config.jit.mode = JitMode::Off;
    let client = Client::builder(config).backend(backend.clone()).build();

    let a = Matrix::from_csc(3, 3, vec![0, 2, 3, 4], vec![0, 2, 1, 0], &[5i32, 7, 9, 1]).unwrap();
    let b = Matrix::from_csc(3, 3, vec![0, 1, 3, 4], vec![2, 0, 1, 0], &[0.5f64, 1.0, 2.5, 4.0])
        .unwrap();
    let minus = BinaryOp::builtin(BinaryOpcode::Minus, DType::F64);
    let le = IndexUnaryOp::value(IndexUnaryOpcode::ValueLe, DType::I32);

    let c = client.ewise_mult(&a, &b, &minus, None).unwrap();
    let s = client.select(&a, &le, &Scalar::new(6i32), None).unwrap();
    let t = client.transpose(&b, None, Some(&DType::I64.into()), None).unwrap();
    let r = client.reduce(&a, &Monoid::plus(DType::I64)).unwrap();
    let m = client.mxm(&a, &a, &Semiring::plus_times(DType::I32), None).unwrap();

    assert_eq!(entries::<f64>(&c)[&(2, 0)], 6.5);
    assert_eq!(s.nvals(), 2);
    assert_eq!(t.nvals(), 4);
    assert_eq!(r.get::<i64>(), Some(22));
    assert_eq!(entries::<i32>(&m)[&(0, 0)], 32);

    let tiers = client.tier_stats();
    assert_eq!(backend.compiles(), 0);
    assert!(client.cache().is_empty());
    assert_eq!(tiers.factory, 0);
    assert_eq!(tiers.jit, 0);
    assert!(tiers.generic >= 4);
}

#[test]
fn test_pause_client_falls_back_without_compiling() {
    let client = create_client(1);
    let a = Matrix::from_csc(2, 1, vec![0, 2], vec![0, 1], &[4i32, 6]).unwrap();
    let b = Matrix::from_csc(2, 1, vec![0, 1], vec![1], &[1.5f64]).unwrap();
    let minus = BinaryOp::builtin(BinaryOpcode::Minus, DType::F64);
    let c = client.ewise_mult(&a, &b, &minus, None).unwrap();
    assert_eq!(entries::<f64>(&c)[&(1, 0)], 4.5);
    assert_eq!(client.tier_stats().jit, 0);
}

#[test]
#[ignore = "needs a C compiler on PATH"]
#[cfg(feature = "jit")]
fn test_real_compiler_end_to_end() {
    let mut config = test_config(1, "cc");
    config.jit.mode = JitMode::On;
    let client = Client::new(config);
    let a = Matrix::from_csc(2, 1, vec![0, 2], vec![0, 1], &[4i32, 6]).unwrap();
    let b = Matrix::from_csc(2, 1, vec![0, 2], vec![0, 1], &[0.5f64, 1.5]).unwrap();
    let minus = BinaryOp::builtin(BinaryOpcode::Minus, DType::F64);
    let c = client.ewise_mult(&a, &b, &minus, None).unwrap();
    assert_eq!(c.extract_tuples::<f64>().unwrap().2, vec![3.5, 4.5]);
    assert_eq!(client.tier_stats().jit, 1);
    assert_eq!(client.cache().stats().compiles, 1);
}

const OPCODES: [BinaryOpcode; 9] = [
    BinaryOpcode::First,
    BinaryOpcode::Plus,
    BinaryOpcode::Minus,
    BinaryOpcode::Times,
    BinaryOpcode::Div,
    BinaryOpcode::Min,
    BinaryOpcode::Max,
    BinaryOpcode::Eq,
    BinaryOpcode::Lt,
];

const TYPES: [DType; 6] = [
    DType::I8,
    DType::I32,
    DType::I64,
    DType::U16,
    DType::F32,
    DType::F64,
];

fn ewise_desc(op: usize, ty: usize) -> OperationDesc {
    let op = BinaryOp::builtin(OPCODES[op], TYPES[ty]);
    let t: ElemType = TYPES[ty].into();
    OperationDesc::ewise(&op, &t, &t, op.ztype())
}

proptest! {
    #[test]
    fn prop_encoding_is_deterministic_and_distinct(
        op1 in 0..OPCODES.len(),
        ty1 in 0..TYPES.len(),
        op2 in 0..OPCODES.len(),
        ty2 in 0..TYPES.len(),
    ) {
        let k1 = encode(&ewise_desc(op1, ty1), Target::Host).key().unwrap();
        let again = encode(&ewise_desc(op1, ty1), Target::Host).key().unwrap();
        prop_assert_eq!(&k1, &again);
        prop_assert_eq!(k1.kernel_name(), again.kernel_name());

        let k2 = encode(&ewise_desc(op2, ty2), Target::Host).key().unwrap();
        prop_assert_eq!(k1 == k2, (op1, ty1) == (op2, ty2));
    }
}
