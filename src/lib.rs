//! # sparx
//!
//! **Sparse matrix engine with format-aware dispatch and runtime kernel specialization.**
//!
//! sparx evaluates GraphBLAS-style operations (selection, transposition,
//! element-wise union and intersection, reduction, multiplication over
//! semirings) on matrices stored in one of four formats, for built-in and
//! user-defined element types and operators.
//!
//! ## How an operation runs
//!
//! 1. The dispatcher inspects the operands: iso values, storage format,
//!    zombies, pending tuples and jumbled vectors. Structural shortcuts run
//!    directly.
//! 2. Otherwise a kernel is taken from the first tier that has one: the
//!    precompiled factory, the JIT cache (specializing through a C compiler
//!    on a miss), or the generic byte-level kernel.
//! 3. The work is sliced into balanced tasks, run on the client's pool, and
//!    partial results are merged.
//!
//! ## Quick Start
//!
//! ```
//! use sparx::prelude::*;
//!
//! let client = Client::new(Config::single_threaded());
//! let a = Matrix::from_tuples(3, 3, &[0, 1, 2], &[0, 1, 2], &[1.0f64, 2.0, 3.0], Format::Sparse)?;
//! let at = client.transpose(&a, None, None, None)?;
//! let sum = client.reduce(&at, &Monoid::plus(DType::F64))?;
//! assert_eq!(sum.get::<f64>(), Some(6.0));
//! # Ok::<(), sparx::error::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `rayon` (default): multi-threaded dispatch
//! - `jit` (default): kernel specialization through an external C compiler
//! - `f16`: half-precision element types (F16, BF16)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dtype;
pub mod error;
pub mod jit;
pub mod kernels;
pub mod ops;
pub mod runtime;
pub mod sparse;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::dtype::{DType, ElemType, Scalar, UserType};
    pub use crate::error::{Error, Result};
    pub use crate::jit::JitMode;
    pub use crate::ops::{
        ApplyOp, BinaryOp, BinaryOpcode, IndexUnaryOp, IndexUnaryOpcode, MatrixOps, Monoid,
        Semiring, UnaryOp, UnaryOpcode,
    };
    pub use crate::runtime::{Client, Config, Mask};
    pub use crate::sparse::{Format, Matrix, Values};
}
