//! Accelerator offload decision
//!
//! Multiply-like operations may be handed to an external device executor.
//! The decision is a pure function of operand statistics, the configured
//! threshold and what the device reports it can run; the device's own
//! kernels live outside this crate.

use super::config::{OffloadConfig, OffloadPolicy};
use super::dispatch::Mask;
use crate::error::{Error, Result};
use crate::jit::{Signature, Target, encode, mask_type_code};
use crate::kernels::{MaskShape, OperandFormats, OperationDesc};
use crate::ops::Semiring;
use crate::sparse::Matrix;
use log::debug;

/// Everything a device needs to run one multiply.
pub struct DeviceRequest<'a> {
    /// Device signature of the operation
    pub signature: &'a Signature,
    /// Operation descriptor the signature was encoded from
    pub desc: &'a OperationDesc,
    /// Left operand
    pub a: &'a Matrix,
    /// Right operand
    pub b: &'a Matrix,
    /// Optional mask
    pub mask: Option<&'a Mask>,
    /// Number of device units to use
    pub units: usize,
}

/// An external executor for multiply-like operations.
pub trait DeviceExecutor: Send + Sync {
    /// Device name for logs
    fn name(&self) -> &str;

    /// Units currently available
    fn available_units(&self) -> usize;

    /// Returns true if the device has a kernel for `sig`
    fn supports(&self, sig: &Signature) -> bool {
        let _ = sig;
        true
    }

    /// Run the multiply, mask included
    fn mxm(&self, request: &DeviceRequest<'_>) -> Result<Matrix>;
}

/// Average entries per stored vector
fn degree(m: &Matrix) -> f64 {
    m.nvals() as f64 / m.nvec().max(1) as f64
}

/// Work estimate of `C<M> = A * B`.
///
/// Without a mask every entry of B scales one vector of A; with a mask each
/// mask entry costs one dot product bounded by the sparser operand.
pub fn work_estimate(a: &Matrix, b: &Matrix, mask: Option<&Matrix>) -> f64 {
    let adeg = degree(a);
    match mask {
        Some(m) => m.nvals() as f64 * adeg.min(degree(b)),
        None => b.nvals() as f64 * adeg,
    }
}

/// Device units for `work`: zero below `work_per_unit`, then one per
/// `work_per_unit`, capped at `available`.
pub fn units_for(work: f64, work_per_unit: f64, available: usize) -> usize {
    if work_per_unit.is_nan() || work_per_unit <= 0.0 || work.is_nan() || work < work_per_unit {
        return 0;
    }
    let units = (work / work_per_unit).floor();
    if units >= available as f64 {
        available
    } else {
        units as usize
    }
}

/// Outcome of one offload decision.
#[derive(Clone, Debug, PartialEq)]
pub struct OffloadDecision {
    /// Work estimate
    pub work: f64,
    /// Units chosen; zero keeps the operation on the host
    pub units: usize,
    /// Device signature when the device can run the operation
    pub signature: Option<Signature>,
}

/// Descriptor of `C<M> = A * B` as a device sees it
pub(crate) fn device_desc(
    semiring: &Semiring,
    a: &Matrix,
    b: &Matrix,
    mask: Option<&Mask>,
) -> OperationDesc {
    let formats = OperandFormats {
        c: None,
        a: Some(a.format()),
        b: Some(b.format()),
        m: mask.map(|m| m.matrix().format()),
    };
    let shape = mask.map_or(MaskShape::default(), |m| MaskShape {
        present: true,
        structural: m.is_structural(),
        complement: m.is_complement(),
        type_code: mask_type_code(m.value_type()),
    });
    OperationDesc::mxm_device(semiring, a.ty(), b.ty(), formats, shape, false)
}

/// Decide whether `C<M> = A * B` runs on `device`.
///
/// Fails only under [`OffloadPolicy::Require`] when the device cannot take
/// the operation.
pub(crate) fn decide(
    config: &OffloadConfig,
    device: Option<&dyn DeviceExecutor>,
    semiring: &Semiring,
    a: &Matrix,
    b: &Matrix,
    mask: Option<&Mask>,
) -> Result<OffloadDecision> {
    let work = work_estimate(a, b, mask.map(Mask::matrix));
    let mut decision = OffloadDecision {
        work,
        units: 0,
        signature: None,
    };
    let Some(device) = device.filter(|_| config.policy != OffloadPolicy::Never) else {
        if config.policy == OffloadPolicy::Require {
            return Err(Error::Unsupported("no device executor configured".into()));
        }
        return Ok(decision);
    };

    let desc = device_desc(semiring, a, b, mask);
    let sig = match encode(&desc, Target::Device).key() {
        Some(sig) if device.supports(&sig) => sig,
        _ => {
            debug!("offload: work:{work:.0} units:0 (unsupported on {})", device.name());
            if config.policy == OffloadPolicy::Require {
                return Err(Error::Unsupported(format!(
                    "{} cannot run {}",
                    device.name(),
                    semiring.name()
                )));
            }
            return Ok(decision);
        }
    };

    let available = device.available_units();
    let mut units = units_for(work, config.work_per_unit, available);
    if config.policy == OffloadPolicy::Require {
        units = units.max(available.min(1));
        if units == 0 {
            return Err(Error::Unsupported(format!("{} has no free units", device.name())));
        }
    }
    debug!("offload: work:{work:.0} units:{units}");
    decision.units = units;
    decision.signature = Some(sig);
    Ok(decision)
}
