//! Accelerator offload: thresholds, policies and the device hand-off

mod common;

use common::test_config;
use parking_lot::Mutex;
use proptest::prelude::*;
use sparx::dtype::DType;
use sparx::jit::{Signature, Target, encode};
use sparx::kernels::OperationDesc;
use sparx::prelude::*;
use sparx::runtime::offload::{DeviceExecutor, DeviceRequest, units_for, work_estimate};
use sparx::runtime::OffloadPolicy;
use std::sync::Arc;

/// Device that records every request and answers with an empty result
struct FakeDevice {
    units: usize,
    supported: bool,
    calls: Mutex<Vec<(usize, Signature)>>,
}

impl FakeDevice {
    fn new(units: usize, supported: bool) -> Arc<Self> {
        Arc::new(Self {
            units,
            supported,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.lock().len()
    }
}

impl DeviceExecutor for FakeDevice {
    fn name(&self) -> &str {
        "fake-device"
    }

    fn available_units(&self) -> usize {
        self.units
    }

    fn supports(&self, _sig: &Signature) -> bool {
        self.supported
    }

    fn mxm(&self, request: &DeviceRequest<'_>) -> Result<Matrix> {
        self.calls.lock().push((request.units, request.signature.clone()));
        Matrix::new(request.desc.c_type.clone(), request.a.nrows(), request.b.ncols())
    }
}

fn client(device: &Arc<FakeDevice>, policy: OffloadPolicy, work_per_unit: f64) -> Client {
    let mut config = test_config(2, "offload");
    config.jit.mode = JitMode::Pause;
    config.offload.policy = policy;
    config.offload.work_per_unit = work_per_unit;
    Client::builder(config).device(device.clone()).build()
}

/// Banded matrix with `width` entries per column
fn banded(n: usize, width: usize) -> Matrix {
    let mut rows = Vec::new();
    let mut cols = Vec::new();
    for j in 0..n {
        for d in 0..width {
            rows.push((j + d) % n);
            cols.push(j);
        }
    }
    let vals = vec![1.0f64; rows.len()];
    Matrix::from_tuples(n, n, &rows, &cols, &vals, Format::Sparse).unwrap()
}

#[test]
fn test_large_multiply_goes_to_device() {
    let device = FakeDevice::new(4, true);
    let a = banded(200, 5);
    // 1000 entries of B, each scaling a column of degree 5
    assert_eq!(work_estimate(&a, &a, None), 5000.0);

    let c = client(&device, OffloadPolicy::Auto, 2000.0)
        .mxm(&a, &a, &Semiring::plus_times(DType::F64), None)
        .unwrap();
    assert_eq!(c.nvals(), 0);
    let calls = device.calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, 2);
    let desc = OperationDesc::mxm_device(
        &Semiring::plus_times(DType::F64),
        a.ty(),
        a.ty(),
        sparx::kernels::OperandFormats {
            c: None,
            a: Some(Format::Sparse),
            b: Some(Format::Sparse),
            m: None,
        },
        Default::default(),
        false,
    );
    assert_eq!(Some(calls[0].1.clone()), encode(&desc, Target::Device).key());
}

#[test]
fn test_small_multiply_stays_on_host() {
    let device = FakeDevice::new(4, true);
    let a = banded(50, 2);
    let c = client(&device, OffloadPolicy::Auto, 1e7)
        .mxm(&a, &a, &Semiring::plus_times(DType::F64), None)
        .unwrap();
    assert_eq!(device.calls(), 0);
    // (A*A)(j+1, j) = A(j+1, j)*A(j, j) + A(j+1, j+1)*A(j+1, j) = 2
    assert_eq!(c.get_element::<f64>(1, 0).unwrap(), Some(2.0));
}

#[test]
fn test_never_policy_ignores_device() {
    let device = FakeDevice::new(8, true);
    let a = banded(100, 4);
    client(&device, OffloadPolicy::Never, 1.0)
        .mxm(&a, &a, &Semiring::plus_times(DType::F64), None)
        .unwrap();
    assert_eq!(device.calls(), 0);
}

#[test]
fn test_unsupported_operation() {
    let device = FakeDevice::new(8, false);
    let a = banded(100, 4);
    let semiring = Semiring::plus_times(DType::F64);

    let c = client(&device, OffloadPolicy::Auto, 1.0).mxm(&a, &a, &semiring, None).unwrap();
    assert_eq!(c.nvals(), 100 * 7);
    assert_eq!(device.calls(), 0);

    let err = client(&device, OffloadPolicy::Require, 1.0).mxm(&a, &a, &semiring, None);
    assert!(matches!(err, Err(Error::Unsupported(_))));
}

#[test]
fn test_dense_operands_are_not_offloaded() {
    let device = FakeDevice::new(8, true);
    let a = Matrix::from_full(20, 20, &[1.0f64; 400]).unwrap();
    let c = client(&device, OffloadPolicy::Auto, 1.0)
        .mxm(&a, &a, &Semiring::plus_times(DType::F64), None)
        .unwrap();
    assert_eq!(device.calls(), 0);
    assert_eq!(c.get_element::<f64>(3, 4).unwrap(), Some(20.0));
}

#[test]
fn test_require_forces_one_unit() {
    let device = FakeDevice::new(3, true);
    let a = banded(10, 1);
    client(&device, OffloadPolicy::Require, 1e12)
        .mxm(&a, &a, &Semiring::plus_times(DType::F64), None)
        .unwrap();
    assert_eq!(device.calls.lock()[0].0, 1);
}

#[test]
fn test_require_without_device() {
    let mut config = test_config(1, "offload-none");
    config.jit.mode = JitMode::Pause;
    config.offload.policy = OffloadPolicy::Require;
    let client = Client::builder(config).build();
    let a = banded(4, 1);
    let err = client.mxm(&a, &a, &Semiring::plus_times(DType::F64), None);
    assert!(matches!(err, Err(Error::Unsupported(_))));
}

proptest! {
    #[test]
    fn prop_units_monotone_in_work(
        work in 0.0f64..1e9,
        extra in 0.0f64..1e9,
        per_unit in 1.0f64..1e7,
        available in 0usize..64,
    ) {
        let u = units_for(work, per_unit, available);
        prop_assert!(u <= available);
        prop_assert!(units_for(work + extra, per_unit, available) >= u);
        if work < per_unit {
            prop_assert_eq!(u, 0);
        }
    }
}
