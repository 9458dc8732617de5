//! Generic kernels
//!
//! Built from the byte-level closure of an operator plus boxed casts for each
//! operand. Correct for every operator and type, including user-defined ones,
//! at the price of two or three indirect calls per entry.

use super::{KernelArgs, KernelKind, OpRef, OperationDesc};
use crate::dtype::{CastFn, ElemType, cast_fn};
use crate::error::{Error, Result};
use crate::ops::{BinaryFn, IndexUnaryFn, Terminal, UnaryFn};

/// Cast (or plain copy) of one operand into the type an operator expects.
#[derive(Clone, Copy)]
struct Conv {
    to_size: usize,
    f: Option<CastFn>,
}

impl Conv {
    fn new(from: &ElemType, to: &ElemType, op: &'static str) -> Result<Self> {
        match cast_fn(from, to) {
            Some(f) => Ok(Self {
                to_size: to.size(),
                f,
            }),
            None => Err(Error::domain_mismatch(to, from, op)),
        }
    }

    /// `src` in the target type, converted through `buf` when needed
    #[inline]
    fn view<'a>(&self, buf: &'a mut [u8], src: &'a [u8]) -> &'a [u8] {
        match self.f {
            Some(f) => {
                f(buf, src);
                buf
            }
            None => src,
        }
    }

    #[inline]
    fn write(&self, dst: &mut [u8], src: &[u8]) {
        match self.f {
            Some(f) => f(dst, src),
            None => dst.copy_from_slice(src),
        }
    }
}

enum Body {
    Select {
        f: IndexUnaryFn,
        x: Conv,
        a_size: usize,
        y_size: usize,
    },
    Apply {
        f: UnaryFn,
        x: Conv,
        z: Conv,
        a_size: usize,
        op_z_size: usize,
        c_size: usize,
    },
    Ewise {
        f: BinaryFn,
        x: Conv,
        y: Conv,
        z: Conv,
        a_size: usize,
        b_size: usize,
        op_z_size: usize,
        c_size: usize,
    },
    Reduce {
        f: BinaryFn,
        x: Conv,
        a_size: usize,
        size: usize,
        terminal: Option<Vec<u8>>,
        any: bool,
    },
    MultAdd {
        mult: BinaryFn,
        add: BinaryFn,
        a: Conv,
        b: Conv,
        a_size: usize,
        b_size: usize,
        c_size: usize,
        flipxy: bool,
    },
}

/// Kernel assembled from operator closures and boxed casts.
pub struct GenericKernel {
    kind: KernelKind,
    body: Body,
}

/// Number of elements a strided operand spans
#[inline]
fn span(n: usize, stride: i64) -> usize {
    match (n, stride) {
        (0, _) => 0,
        (_, 0) => 1,
        _ => n,
    }
}

#[inline]
unsafe fn bytes<'a>(p: *const u8, len: usize) -> &'a [u8] {
    if len == 0 || p.is_null() {
        &[]
    } else {
        // SAFETY: the caller guarantees `p` is valid for `len` bytes.
        unsafe { std::slice::from_raw_parts(p, len) }
    }
}

#[inline]
unsafe fn bytes_mut<'a>(p: *mut u8, len: usize) -> &'a mut [u8] {
    if len == 0 || p.is_null() {
        &mut []
    } else {
        // SAFETY: the caller guarantees `p` is valid and unaliased for `len` bytes.
        unsafe { std::slice::from_raw_parts_mut(p, len) }
    }
}

impl GenericKernel {
    /// Generic kernel for `desc`.
    ///
    /// Fails only when an operand cannot be cast to the operator's type.
    pub fn new(desc: &OperationDesc) -> Result<Self> {
        let (xt, yt, zt) = desc.op_types();
        let body = match (desc.kind, &desc.op) {
            (KernelKind::Select, OpRef::IndexUnary(op)) => Body::Select {
                f: op.to_fn(),
                x: Conv::new(&desc.a_type, &xt, "select")?,
                a_size: desc.a_type.size(),
                y_size: op.ytype().size(),
            },
            (KernelKind::Apply, OpRef::Unary(op)) => Body::Apply {
                f: op.to_fn(),
                x: Conv::new(&desc.a_type, &xt, "apply")?,
                z: Conv::new(&zt, &desc.c_type, "apply")?,
                a_size: desc.a_type.size(),
                op_z_size: zt.size(),
                c_size: desc.c_type.size(),
            },
            (KernelKind::Ewise, OpRef::Binary(op)) => {
                let b_type = desc.b_type.as_ref().unwrap_or(&desc.a_type);
                Body::Ewise {
                    f: op.to_fn(),
                    x: Conv::new(&desc.a_type, &xt, "ewise")?,
                    y: Conv::new(b_type, op.ytype(), "ewise")?,
                    z: Conv::new(&zt, &desc.c_type, "ewise")?,
                    a_size: desc.a_type.size(),
                    b_size: b_type.size(),
                    op_z_size: zt.size(),
                    c_size: desc.c_type.size(),
                }
            }
            (KernelKind::Reduce, OpRef::Monoid(m)) => Body::Reduce {
                f: m.op().to_fn(),
                x: Conv::new(&desc.a_type, m.ty(), "reduce")?,
                a_size: desc.a_type.size(),
                size: m.ty().size(),
                terminal: m.terminal_bytes().map(<[u8]>::to_vec),
                any: matches!(m.terminal(), Terminal::Any),
            },
            (KernelKind::MultAdd, OpRef::Semiring(s)) => {
                let b_type = desc.b_type.as_ref().unwrap_or(&desc.a_type);
                let yt = yt.unwrap_or_else(|| xt.clone());
                let (a_to, b_to) = if desc.flipxy { (&yt, &xt) } else { (&xt, &yt) };
                Body::MultAdd {
                    mult: s.multiply().to_fn(),
                    add: s.add().op().to_fn(),
                    a: Conv::new(&desc.a_type, a_to, "mxm")?,
                    b: Conv::new(b_type, b_to, "mxm")?,
                    a_size: desc.a_type.size(),
                    b_size: b_type.size(),
                    c_size: s.ty().size(),
                    flipxy: desc.flipxy,
                }
            }
            _ => {
                return Err(Error::Unsupported(format!(
                    "no generic {} kernel for {}",
                    desc.kind.name(),
                    desc.op.name()
                )));
            }
        };
        Ok(Self {
            kind: desc.kind,
            body,
        })
    }

    /// Kernel kind
    pub fn kind(&self) -> KernelKind {
        self.kind
    }

    /// Run the kernel.
    ///
    /// # Safety
    ///
    /// `args` must satisfy the contract of this kernel's kind.
    pub unsafe fn run(&self, args: &KernelArgs) -> i32 {
        let n = args.n.max(0) as usize;
        let xs = args.x_stride as usize;
        let ys = args.y_stride as usize;
        match &self.body {
            Body::Select {
                f,
                x,
                a_size,
                y_size,
            } => {
                let xv = unsafe { bytes(args.x, span(n, args.x_stride) * a_size) };
                let thunk = unsafe { bytes(args.y, *y_size) };
                let keep = unsafe { bytes_mut(args.keep, n) };
                let mut buf = vec![0u8; x.to_size];
                for (k, flag) in keep.iter_mut().enumerate() {
                    let off = k * xs * a_size;
                    let v = x.view(&mut buf, &xv[off..off + a_size]);
                    let i = if args.i.is_null() {
                        args.i0 + k as i64
                    } else {
                        unsafe { *args.i.add(k) }
                    };
                    *flag = f(v, i, args.j, thunk) as u8;
                }
                0
            }
            Body::Apply {
                f,
                x,
                z,
                a_size,
                op_z_size,
                c_size,
            } => {
                let xv = unsafe { bytes(args.x, span(n, args.x_stride) * a_size) };
                let out = unsafe { bytes_mut(args.z, n * c_size) };
                let mut bx = vec![0u8; x.to_size];
                let mut bz = vec![0u8; *op_z_size];
                for (k, slot) in out.chunks_exact_mut(*c_size).enumerate() {
                    let off = k * xs * a_size;
                    f(&mut bz, x.view(&mut bx, &xv[off..off + a_size]));
                    z.write(slot, &bz);
                }
                0
            }
            Body::Ewise {
                f,
                x,
                y,
                z,
                a_size,
                b_size,
                op_z_size,
                c_size,
            } => {
                let xv = unsafe { bytes(args.x, span(n, args.x_stride) * a_size) };
                let yv = unsafe { bytes(args.y, span(n, args.y_stride) * b_size) };
                let out = unsafe { bytes_mut(args.z, n * c_size) };
                let mut bx = vec![0u8; x.to_size];
                let mut by = vec![0u8; y.to_size];
                let mut bz = vec![0u8; *op_z_size];
                for (k, slot) in out.chunks_exact_mut(*c_size).enumerate() {
                    let xo = k * xs * a_size;
                    let yo = k * ys * b_size;
                    f(
                        &mut bz,
                        x.view(&mut bx, &xv[xo..xo + a_size]),
                        y.view(&mut by, &yv[yo..yo + b_size]),
                    );
                    z.write(slot, &bz);
                }
                0
            }
            Body::Reduce {
                f,
                x,
                a_size,
                size,
                terminal,
                any,
            } => {
                let xv = unsafe { bytes(args.x, span(n, args.x_stride) * a_size) };
                let acc = unsafe { bytes_mut(args.z, *size) };
                let mut bx = vec![0u8; *size];
                if *any {
                    if n > 0 {
                        x.write(acc, &xv[..*a_size]);
                        return 1;
                    }
                    return 0;
                }
                let mut tmp = vec![0u8; *size];
                for k in 0..n {
                    let off = k * xs * a_size;
                    f(&mut tmp, acc, x.view(&mut bx, &xv[off..off + a_size]));
                    acc.copy_from_slice(&tmp);
                    if terminal.as_deref() == Some(&*acc) {
                        return 1;
                    }
                }
                0
            }
            Body::MultAdd {
                mult,
                add,
                a,
                b,
                a_size,
                b_size,
                c_size,
                flipxy,
            } => {
                let av = unsafe { bytes(args.x, span(n, args.x_stride) * a_size) };
                let bv = unsafe { bytes(args.y, *b_size) };
                let mut ba = vec![0u8; a.to_size];
                let mut bb = vec![0u8; b.to_size];
                let mut t = vec![0u8; *c_size];
                let mut sum = vec![0u8; *c_size];
                let bkj = b.view(&mut bb, bv);
                for k in 0..n {
                    let off = k * xs * a_size;
                    let aik = a.view(&mut ba, &av[off..off + a_size]);
                    if *flipxy {
                        mult(&mut t, bkj, aik);
                    } else {
                        mult(&mut t, aik, bkj);
                    }
                    let row = unsafe { *args.i.add(k) } as usize;
                    let w = unsafe { bytes_mut(args.z.add(row * c_size), *c_size) };
                    let flag = unsafe { &mut *args.keep.add(row) };
                    if *flag != 0 {
                        add(&mut sum, w, &t);
                        w.copy_from_slice(&sum);
                    } else {
                        w.copy_from_slice(&t);
                        *flag = 1;
                    }
                }
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::{DType, UserType};
    use crate::kernels::{Rows, Worker};
    use crate::ops::{
        BinaryOp, BinaryOpcode, IndexUnaryOp, IndexUnaryOpcode, Monoid, UnaryOp, UnaryOpcode,
        UserBinaryOp,
    };
    use std::sync::Arc;

    fn worker(desc: &OperationDesc) -> Worker {
        Worker::Generic(Arc::new(GenericKernel::new(desc).unwrap()))
    }

    #[test]
    fn test_select_casts_input() {
        // i32 values compared against an f64 threshold
        let op = IndexUnaryOp::value(IndexUnaryOpcode::ValueGt, DType::F64);
        let w = worker(&OperationDesc::select(&op, &DType::I32.into()));
        let x: Vec<u8> = [1i32, 5, 3].iter().flat_map(|v| v.to_le_bytes()).collect();
        let mut keep = [0u8; 3];
        w.select(&x, false, Rows::From(0), 0, &2.5f64.to_le_bytes(), &mut keep);
        assert_eq!(keep, [0, 1, 1]);
    }

    #[test]
    fn test_apply_with_output_cast() {
        let op = UnaryOp::builtin(UnaryOpcode::Ainv, DType::F32);
        let w = worker(&OperationDesc::apply(&op, &DType::I8.into(), &DType::I64.into()));
        let x = [3i8 as u8];
        let mut z = [0u8; 16];
        w.apply(&x, true, &mut z, 2);
        assert_eq!(i64::from_le_bytes(z[..8].try_into().unwrap()), -3);
        assert_eq!(i64::from_le_bytes(z[8..].try_into().unwrap()), -3);
    }

    #[test]
    fn test_reduce_any_and_terminal() {
        let x: Vec<u8> = [4i32, 0, 9].iter().flat_map(|v| v.to_le_bytes()).collect();
        let w = worker(&OperationDesc::reduce(&Monoid::any(DType::I32), &DType::I32.into()));
        let mut acc = 0i32.to_le_bytes();
        assert!(w.reduce(&x, 3, &mut acc));
        assert_eq!(i32::from_le_bytes(acc), 4);

        let times = Monoid::builtin(BinaryOpcode::Times, DType::I32).unwrap();
        let w = worker(&OperationDesc::reduce(&times, &DType::I32.into()));
        let mut acc = 1i32.to_le_bytes();
        assert!(w.reduce(&x, 3, &mut acc));
        assert_eq!(i32::from_le_bytes(acc), 0);
    }

    #[test]
    fn test_user_type_ewise() {
        let ty: ElemType = Arc::new(UserType::new("rgb", 3)).into();
        let op = BinaryOp::user(UserBinaryOp::new(
            "rgb_max",
            ty.clone(),
            ty.clone(),
            ty.clone(),
            |z: &mut [u8], x: &[u8], y: &[u8]| {
                for c in 0..3 {
                    z[c] = x[c].max(y[c]);
                }
            },
        ));
        let w = worker(&OperationDesc::ewise(&op, &ty, &ty, &ty));
        let mut z = [0u8; 6];
        w.ewise(&[1, 9, 3, 4, 4, 4], false, &[5, 5, 5], true, &mut z, 2);
        assert_eq!(z, [5, 9, 5, 5, 5, 5]);
        let bad = OperationDesc::ewise(&op, &DType::U8.into(), &ty, &ty);
        assert!(GenericKernel::new(&bad).is_err());
    }
}
