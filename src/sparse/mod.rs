//! Sparse matrix storage for sparx
//!
//! Matrices are stored by column in one of four formats:
//!
//! - **Hypersparse**: column offsets for the occupied columns only, the sorted
//!   list of those columns, and row indices. O(nnz + nonempty columns) storage.
//!
//! - **Sparse**: column offsets for every column plus row indices (CSC).
//!   O(nnz + ncols) storage.
//!
//! - **Bitmap**: a dense value array plus one existence flag per slot.
//!
//! - **Full**: a dense value array; every slot holds an entry.
//!
//! # Usage
//!
//! ```
//! use sparx::sparse::{Format, Matrix};
//!
//! // [1 . 4]
//! // [. 3 .]
//! let a = Matrix::from_csc(2, 3, vec![0, 1, 2, 3], vec![0, 1, 0], &[1.0f64, 3.0, 4.0])?;
//! assert_eq!(a.nvals(), 3);
//!
//! let h = a.to_format(Format::Hypersparse)?;
//! assert_eq!(h.hyper_list(), Some(&[0i64, 1, 2][..]));
//! # Ok::<(), sparx::error::Error>(())
//! ```
//!
//! # Deferred work
//!
//! A matrix may carry two kinds of unfinished structural change: zombies
//! (deleted entries whose row index is stored flipped) and pending tuples
//! (inserted entries not yet placed in the pattern). Operations that need a
//! clean pattern resolve both first.

mod convert;
mod format;
pub(crate) mod matrix;
mod pending;
mod values;

pub use format::{Format, FormatDesc};
pub use matrix::Matrix;
pub use values::Values;
