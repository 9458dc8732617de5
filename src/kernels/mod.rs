//! Per-entry kernels and the contract they share
//!
//! Every kernel, whether monomorphized into this crate (factory), compiled at
//! run time (JIT) or assembled from boxed closures (generic), is called through
//! the same C ABI: a pointer to [`KernelArgs`] in, a status code out. What the
//! fields mean depends on the [`KernelKind`]:
//!
//! | kind     | inputs                                   | output                                |
//! |----------|------------------------------------------|---------------------------------------|
//! | Select   | `x[k]`, row `i[k]` (or `i0 + k`), `j`, thunk `y` | `keep[k]`                      |
//! | Apply    | `x[k]`                                   | `z[k] = f(x[k])`                      |
//! | Ewise    | `x[k]`, `y[k]`                           | `z[k] = f(x[k], y[k])`                |
//! | Reduce   | `x[k]`, accumulator in `z`               | `z`, returns 1 on a terminal value    |
//! | MultAdd  | `x[k]` (a column of A), rows `i[k]`, one `y` (`B(k,j)`) | workspace `z`, flags `keep` |
//!
//! `x_stride` and `y_stride` are element strides, 0 or 1; a stride of 0
//! broadcasts one value (iso matrices, bound scalars).

mod desc;
pub mod factory;
pub(crate) mod generic;
mod typed;

pub use desc::{MaskShape, OpRef, OperandFormats, OperationDesc};
pub use generic::GenericKernel;

use crate::jit::KernelHandle;
use std::fmt;
use std::sync::Arc;

/// Arguments of one kernel call.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct KernelArgs {
    /// Number of entries
    pub n: i64,
    /// First input values
    pub x: *const u8,
    /// Second input values, thunk or `B(k,j)`
    pub y: *const u8,
    /// Output values or accumulator
    pub z: *mut u8,
    /// Per-entry flags (select output, saxpy occupancy)
    pub keep: *mut u8,
    /// Row indices, or null for consecutive rows starting at `i0`
    pub i: *const i64,
    /// First row when `i` is null
    pub i0: i64,
    /// Column index
    pub j: i64,
    /// Element stride of `x`
    pub x_stride: i64,
    /// Element stride of `y`
    pub y_stride: i64,
}

impl Default for KernelArgs {
    fn default() -> Self {
        Self {
            n: 0,
            x: std::ptr::null(),
            y: std::ptr::null(),
            z: std::ptr::null_mut(),
            keep: std::ptr::null_mut(),
            i: std::ptr::null(),
            i0: 0,
            j: 0,
            x_stride: 1,
            y_stride: 1,
        }
    }
}

/// Kernel entry point.
///
/// # Safety
///
/// Every pointer in `KernelArgs` must be valid for the element counts and
/// types of the operation the kernel was built for.
pub type KernelFn = unsafe extern "C" fn(*const KernelArgs) -> i32;

/// Shape of the work a kernel performs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KernelKind {
    /// Per-entry keep flags
    Select = 1,
    /// Unary map with casts
    Apply = 2,
    /// Binary map with casts
    Ewise = 3,
    /// Monoid fold
    Reduce = 4,
    /// Saxpy column update
    MultAdd = 5,
    /// Whole multiply on a device
    Mxm = 6,
}

impl KernelKind {
    /// Name used in kernel symbols
    pub const fn name(self) -> &'static str {
        match self {
            KernelKind::Select => "select",
            KernelKind::Apply => "apply",
            KernelKind::Ewise => "ewise",
            KernelKind::Reduce => "reduce",
            KernelKind::MultAdd => "multadd",
            KernelKind::Mxm => "mxm",
        }
    }
}

/// Kernel tier that served a call.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Precompiled built-in kernel
    Factory,
    /// Runtime-specialized kernel
    Jit,
    /// Boxed-closure fallback
    Generic,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::Factory => "factory",
            Tier::Jit => "jit",
            Tier::Generic => "generic",
        })
    }
}

/// Row indices of the entries handed to a select or saxpy call.
#[derive(Copy, Clone, Debug)]
pub(crate) enum Rows<'a> {
    /// Explicit indices
    Indices(&'a [i64]),
    /// Consecutive rows starting here
    From(i64),
}

/// A callable kernel from any tier.
#[derive(Clone)]
pub enum Worker {
    /// Factory kernel
    Factory(KernelFn),
    /// Specialized kernel kept alive by its handle
    Jit(Arc<KernelHandle>),
    /// Generic kernel
    Generic(Arc<GenericKernel>),
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Worker({})", self.tier())
    }
}

impl Worker {
    /// Tier of this kernel
    pub fn tier(&self) -> Tier {
        match self {
            Worker::Factory(_) => Tier::Factory,
            Worker::Jit(_) => Tier::Jit,
            Worker::Generic(_) => Tier::Generic,
        }
    }

    fn call(&self, args: &KernelArgs) -> i32 {
        match self {
            // SAFETY: callers build `args` from slices sized for the operation
            // this worker was selected for.
            Worker::Factory(f) => unsafe { f(args) },
            Worker::Jit(h) => unsafe { (h.entry())(args) },
            Worker::Generic(g) => unsafe { g.run(args) },
        }
    }

    /// Keep flags for `keep.len()` entries of one column
    pub(crate) fn select(
        &self,
        x: &[u8],
        x_iso: bool,
        rows: Rows<'_>,
        j: i64,
        thunk: &[u8],
        keep: &mut [u8],
    ) {
        let (i, i0) = match rows {
            Rows::Indices(i) => {
                debug_assert!(i.len() >= keep.len());
                (i.as_ptr(), 0)
            }
            Rows::From(i0) => (std::ptr::null(), i0),
        };
        let args = KernelArgs {
            n: keep.len() as i64,
            x: x.as_ptr(),
            y: thunk.as_ptr(),
            keep: keep.as_mut_ptr(),
            i,
            i0,
            j,
            x_stride: (!x_iso) as i64,
            ..Default::default()
        };
        self.call(&args);
    }

    /// `z[k] = f(x[k])` for `n` entries
    pub(crate) fn apply(&self, x: &[u8], x_iso: bool, z: &mut [u8], n: usize) {
        let args = KernelArgs {
            n: n as i64,
            x: x.as_ptr(),
            z: z.as_mut_ptr(),
            x_stride: (!x_iso) as i64,
            ..Default::default()
        };
        self.call(&args);
    }

    /// `z[k] = f(x[k], y[k])` for `n` entries
    pub(crate) fn ewise(
        &self,
        x: &[u8],
        x_iso: bool,
        y: &[u8],
        y_iso: bool,
        z: &mut [u8],
        n: usize,
    ) {
        let args = KernelArgs {
            n: n as i64,
            x: x.as_ptr(),
            y: y.as_ptr(),
            z: z.as_mut_ptr(),
            x_stride: (!x_iso) as i64,
            y_stride: (!y_iso) as i64,
            ..Default::default()
        };
        self.call(&args);
    }

    /// Fold `n` values into `acc`; returns true once a terminal value is reached
    pub(crate) fn reduce(&self, x: &[u8], n: usize, acc: &mut [u8]) -> bool {
        let args = KernelArgs {
            n: n as i64,
            x: x.as_ptr(),
            z: acc.as_mut_ptr(),
            ..Default::default()
        };
        self.call(&args) == 1
    }

    /// `w(i) = add(w(i), mult(a(i), b))` over one column of A
    pub(crate) fn mult_add(
        &self,
        a: &[u8],
        a_iso: bool,
        rows: &[i64],
        b: &[u8],
        w: &mut [u8],
        occupied: &mut [u8],
    ) {
        let args = KernelArgs {
            n: rows.len() as i64,
            x: a.as_ptr(),
            y: b.as_ptr(),
            z: w.as_mut_ptr(),
            keep: occupied.as_mut_ptr(),
            i: rows.as_ptr(),
            x_stride: (!a_iso) as i64,
            y_stride: 0,
            ..Default::default()
        };
        self.call(&args);
    }
}
