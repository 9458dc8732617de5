//! Monomorphized kernels for built-in operators
//!
//! The opcode is a const parameter, so each instantiation compiles down to a
//! loop over one fixed operation. All element types match; no casts happen.

use super::KernelArgs;
use crate::dtype::Element;
use crate::ops::builtin;
use crate::ops::{BinaryOpcode, IndexUnaryOpcode, UnaryOpcode};

#[inline(always)]
unsafe fn load<T: Element>(p: *const u8, k: usize, stride: i64) -> T {
    // SAFETY: the caller guarantees `p` holds at least `k * stride + 1` values.
    unsafe { (p as *const T).add(k * stride as usize).read_unaligned() }
}

#[inline(always)]
unsafe fn store<T: Element>(p: *mut u8, k: usize, v: T) {
    // SAFETY: the caller guarantees `p` has room for `k + 1` values.
    unsafe { (p as *mut T).add(k).write_unaligned(v) }
}

/// Value selector `keep[k] = x[k] <op> y`
pub(super) unsafe extern "C" fn select_value<T: Element, const OP: u8>(
    args: *const KernelArgs,
) -> i32 {
    let a = unsafe { &*args };
    let op = IndexUnaryOpcode::decode(OP);
    let thunk: T = unsafe { load(a.y, 0, 0) };
    for k in 0..a.n as usize {
        let x: T = unsafe { load(a.x, k, a.x_stride) };
        unsafe { *a.keep.add(k) = builtin::value_keep(op, x, thunk) as u8 };
    }
    0
}

/// `z[k] = op(x[k])`
pub(super) unsafe extern "C" fn apply_unary<T: Element, const OP: u8>(
    args: *const KernelArgs,
) -> i32 {
    let a = unsafe { &*args };
    let op = UnaryOpcode::decode(OP);
    for k in 0..a.n as usize {
        let x: T = unsafe { load(a.x, k, a.x_stride) };
        unsafe { store(a.z, k, builtin::unary(op, x)) };
    }
    0
}

/// `z[k] = op(x[k], y[k])` for operators whose result type is `T`
pub(super) unsafe extern "C" fn ewise_binary<T: Element, const OP: u8>(
    args: *const KernelArgs,
) -> i32 {
    let a = unsafe { &*args };
    let op = BinaryOpcode::decode(OP);
    for k in 0..a.n as usize {
        let x: T = unsafe { load(a.x, k, a.x_stride) };
        let y: T = unsafe { load(a.y, k, a.y_stride) };
        unsafe { store(a.z, k, builtin::binary(op, x, y)) };
    }
    0
}

/// `z[k] = x[k] <op> y[k]` with a boolean result
pub(super) unsafe extern "C" fn ewise_compare<T: Element, const OP: u8>(
    args: *const KernelArgs,
) -> i32 {
    let a = unsafe { &*args };
    let op = BinaryOpcode::decode(OP);
    for k in 0..a.n as usize {
        let x: T = unsafe { load(a.x, k, a.x_stride) };
        let y: T = unsafe { load(a.y, k, a.y_stride) };
        unsafe { *a.z.add(k) = builtin::compare(op, x, y) as u8 };
    }
    0
}

/// Fold `x` into the accumulator at `z` with a built-in monoid
pub(super) unsafe extern "C" fn reduce_monoid<T: Element, const OP: u8>(
    args: *const KernelArgs,
) -> i32 {
    let a = unsafe { &*args };
    let op = BinaryOpcode::decode(OP);
    let n = a.n as usize;
    if op == BinaryOpcode::Any {
        if n > 0 {
            let x: T = unsafe { load(a.x, 0, a.x_stride) };
            unsafe { store(a.z, 0, x) };
            return 1;
        }
        return 0;
    }
    let terminal = builtin::monoid_terminal::<T>(op);
    let mut acc: T = unsafe { load(a.z, 0, 0) };
    for k in 0..n {
        let x: T = unsafe { load(a.x, k, a.x_stride) };
        acc = builtin::binary(op, acc, x);
        if terminal.is_some_and(|t| t == acc) {
            unsafe { store(a.z, 0, acc) };
            return 1;
        }
    }
    unsafe { store(a.z, 0, acc) };
    0
}

/// Saxpy update for a built-in semiring with a commutative multiply
pub(super) unsafe extern "C" fn mult_add<T: Element, const ADD: u8, const MULT: u8>(
    args: *const KernelArgs,
) -> i32 {
    let a = unsafe { &*args };
    let (add, mult) = (BinaryOpcode::decode(ADD), BinaryOpcode::decode(MULT));
    let bkj: T = unsafe { load(a.y, 0, 0) };
    for k in 0..a.n as usize {
        let aik: T = unsafe { load(a.x, k, a.x_stride) };
        let t = builtin::binary(mult, aik, bkj);
        let row = unsafe { *a.i.add(k) } as usize;
        let flag = unsafe { a.keep.add(row) };
        unsafe {
            if *flag != 0 {
                let w: T = load(a.z, row, 1);
                store(a.z, row, builtin::binary(add, w, t));
            } else {
                store(a.z, row, t);
                *flag = 1;
            }
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::KernelFn;

    #[test]
    fn test_select_value_le() {
        let f: KernelFn = select_value::<i16, { IndexUnaryOpcode::ValueLe as u8 }>;
        let x = [3i16, 9, 5, -1];
        let thunk = 5i16;
        let mut keep = [0u8; 4];
        let args = KernelArgs {
            n: 4,
            x: x.as_ptr() as *const u8,
            y: &thunk as *const i16 as *const u8,
            keep: keep.as_mut_ptr(),
            ..Default::default()
        };
        assert_eq!(unsafe { f(&args) }, 0);
        assert_eq!(keep, [1, 0, 1, 1]);
    }

    #[test]
    fn test_reduce_stops_at_terminal() {
        let f: KernelFn = reduce_monoid::<u8, { BinaryOpcode::Min as u8 }>;
        let x = [7u8, 0, 9];
        let mut acc = u8::MAX;
        let args = KernelArgs {
            n: 3,
            x: x.as_ptr(),
            z: &mut acc,
            ..Default::default()
        };
        assert_eq!(unsafe { f(&args) }, 1);
        assert_eq!(acc, 0);
    }

    #[test]
    fn test_mult_add_accumulates() {
        let f: KernelFn = mult_add::<f64, { BinaryOpcode::Plus as u8 }, { BinaryOpcode::Times as u8 }>;
        let a = [2.0f64, 3.0];
        let rows = [1i64, 2];
        let b = 10.0f64;
        let mut w = [0.0f64; 3];
        let mut occupied = [0u8, 1, 0];
        w[1] = 1.0;
        let args = KernelArgs {
            n: 2,
            x: a.as_ptr() as *const u8,
            y: &b as *const f64 as *const u8,
            z: w.as_mut_ptr() as *mut u8,
            keep: occupied.as_mut_ptr(),
            i: rows.as_ptr(),
            ..Default::default()
        };
        unsafe { f(&args) };
        assert_eq!(w, [0.0, 21.0, 30.0]);
        assert_eq!(occupied, [0, 1, 1]);
    }
}
