//! Value maps: apply, and the cast/operator step fused into other passes

use super::{Client, finished};
use crate::dtype::{ElemType, Scalar};
use crate::error::Result;
use crate::kernels::{OperationDesc, Worker};
use crate::ops::{ApplyOp, UnaryOp};
use crate::runtime::slice::{slice_range, split_blocks};
use crate::sparse::{Matrix, Values};
use std::sync::Arc;

/// How stored values of one type become values of another.
pub(crate) enum ValueMap {
    /// Same type, no operator
    Copy(usize),
    /// Unary operator or plain cast
    Unary(Worker),
    /// Binary operator with its first operand bound
    BindFirst(Worker, Scalar),
    /// Binary operator with its second operand bound
    BindSecond(Worker, Scalar),
}

impl ValueMap {
    /// Map from `a_type` to `c_type` through `op`, or a plain cast without one
    pub(crate) fn new(
        client: &Client,
        op: Option<&ApplyOp>,
        a_type: &ElemType,
        c_type: &ElemType,
    ) -> Result<Self> {
        Ok(match op {
            None if a_type == c_type => ValueMap::Copy(a_type.size()),
            None => {
                let cast = UnaryOp::identity(c_type.clone());
                ValueMap::Unary(client.worker(&OperationDesc::apply(&cast, a_type, c_type))?)
            }
            Some(ApplyOp::Unary(op)) => {
                ValueMap::Unary(client.worker(&OperationDesc::apply(op, a_type, c_type))?)
            }
            Some(ApplyOp::BindFirst(op, s)) => ValueMap::BindFirst(
                client.worker(&OperationDesc::ewise(op, s.ty(), a_type, c_type))?,
                s.clone(),
            ),
            Some(ApplyOp::BindSecond(op, s)) => ValueMap::BindSecond(
                client.worker(&OperationDesc::ewise(op, a_type, s.ty(), c_type))?,
                s.clone(),
            ),
        })
    }

    /// Returns true if values pass through unchanged
    pub(crate) fn is_copy(&self) -> bool {
        matches!(self, ValueMap::Copy(_))
    }

    /// Map `n` values from `x` (one value when `x_iso`) into `z`
    pub(crate) fn run(&self, x: &[u8], x_iso: bool, z: &mut [u8], n: usize) {
        match self {
            ValueMap::Copy(size) => {
                if x_iso {
                    for dst in z[..n * size].chunks_exact_mut(*size) {
                        dst.copy_from_slice(&x[..*size]);
                    }
                } else {
                    z[..n * size].copy_from_slice(&x[..n * size]);
                }
            }
            ValueMap::Unary(w) => w.apply(x, x_iso, z, n),
            ValueMap::BindFirst(w, s) => w.ewise(s.bytes(), true, x, x_iso, z, n),
            ValueMap::BindSecond(w, s) => w.ewise(x, x_iso, s.bytes(), true, z, n),
        }
    }
}

/// Map every stored value of `a` into a new buffer of `c_type`, in parallel
pub(crate) fn map_values(
    client: &Client,
    map: &ValueMap,
    a: &Matrix,
    c_type: &ElemType,
) -> Result<Values> {
    let csize = c_type.size();
    if a.is_iso() {
        let mut x = Values::try_zeroed(1, csize)?;
        map.run(a.values().get(0), true, x.bytes_mut(), 1);
        return Ok(x);
    }
    let n = a.values().len();
    let mut x = Values::try_zeroed(n, csize)?;
    let asize = a.ty().size();
    let par = client.parallelism();
    let ranges = slice_range(n, par.ntasks(n as f64));
    let blocks = split_blocks(x.bytes_mut(), ranges.iter().map(|r| r.len() * csize));
    let xin = a.values().bytes();
    par.run_tasks(ranges.into_iter().zip(blocks).collect(), |(r, z)| {
        map.run(&xin[r.start * asize..r.end * asize], false, z, r.len());
    });
    Ok(x)
}

/// `C = op(A)`, typed `c_type` (the operator's output type by default)
pub(crate) fn apply(
    client: &Client,
    a: &Matrix,
    op: &ApplyOp,
    c_type: Option<&ElemType>,
) -> Result<Matrix> {
    let a = finished(client, a)?;
    let c_type = c_type.unwrap_or(op.ztype()).clone();
    let map = ValueMap::new(client, Some(op), a.ty(), &c_type)?;
    let x = map_values(client, &map, &a, &c_type)?;
    let mut c = a;
    c.ty = c_type;
    c.x = Arc::new(x);
    Ok(c)
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;
    use crate::dtype::DType;
    use crate::ops::{BinaryOp, BinaryOpcode, UnaryOpcode};

    #[test]
    fn test_apply_keeps_pattern() {
        let client = testing::client(2);
        let a = Matrix::from_csc(3, 2, vec![0, 2, 3], vec![0, 2, 1], &[1.5f64, -2.0, 3.0]).unwrap();
        let abs = ApplyOp::Unary(UnaryOp::builtin(UnaryOpcode::Abs, DType::F64));
        let c = apply(&client, &a, &abs, None).unwrap();
        assert_eq!(c.values().typed::<f64>(), &[1.5, 2.0, 3.0]);
        assert_eq!(c.row_indices(), a.row_indices());
    }

    #[test]
    fn test_apply_with_cast_and_binding() {
        let client = testing::client(1);
        let a = Matrix::from_full(2, 1, &[7i32, 9]).unwrap();
        let minus = ApplyOp::BindFirst(BinaryOp::builtin(BinaryOpcode::Minus, DType::I32), Scalar::new(10i32));
        let c = apply(&client, &a, &minus, Some(&DType::F32.into())).unwrap();
        assert_eq!(c.ty(), &ElemType::from(DType::F32));
        assert_eq!(c.values().typed::<f32>(), &[3.0, 1.0]);

        let div = ApplyOp::BindSecond(BinaryOp::builtin(BinaryOpcode::Div, DType::I32), Scalar::new(2i32));
        let c = apply(&client, &a, &div, None).unwrap();
        assert_eq!(c.values().typed::<i32>(), &[3, 4]);
    }

    #[test]
    fn test_apply_iso_runs_once() {
        let client = testing::client(1);
        let a = Matrix::from_csc_iso(4, 1, vec![0, 3], vec![0, 1, 3], &Scalar::new(2u8)).unwrap();
        let ainv = ApplyOp::Unary(UnaryOp::builtin(UnaryOpcode::Ainv, DType::I16));
        let c = apply(&client, &a, &ainv, None).unwrap();
        assert!(c.is_iso());
        assert_eq!(c.iso_value().unwrap().get::<i16>(), Some(-2));
    }
}
