//! Error types for sparx

use crate::dtype::ElemType;
use thiserror::Error;

/// Result type alias using sparx's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sparx operations
#[derive(Error, Debug)]
pub enum Error {
    /// Operand dimensions do not agree
    #[error("Dimension mismatch: expected {expected:?}, got {got:?}")]
    DimensionMismatch {
        /// Expected (rows, cols)
        expected: (usize, usize),
        /// Actual (rows, cols)
        got: (usize, usize),
    },

    /// Element types cannot be combined or cast
    #[error("Domain mismatch: cannot use {got} where {expected} is required ({op})")]
    DomainMismatch {
        /// Type the operation requires
        expected: String,
        /// Type that was supplied
        got: String,
        /// Operation name
        op: &'static str,
    },

    /// Out of memory
    #[error("Out of memory: failed to allocate {size} bytes")]
    OutOfMemory {
        /// Requested size in bytes
        size: usize,
    },

    /// Index out of bounds
    #[error("Index {index} out of bounds for dimension of size {size}")]
    IndexOutOfBounds {
        /// The invalid index
        index: usize,
        /// Size of the dimension
        size: usize,
    },

    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// A matrix violates a storage invariant
    #[error("Invalid matrix: {0}")]
    InvalidObject(String),

    /// No execution path can service the request
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Error reported by an external device executor
    #[error("Device error: {0}")]
    Device(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Status code reported to callers for every failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// An allocation failed
    OutOfMemory,
    /// The operation could not be encoded or serviced by any tier
    UnsupportedOperation,
    /// An argument had an invalid value
    InvalidValue,
    /// A row or column index was out of range
    InvalidIndex,
    /// Operand dimensions do not agree
    DimensionMismatch,
    /// Operand types are incompatible
    DomainMismatch,
    /// A matrix is malformed
    InvalidObject,
    /// Internal failure
    Panic,
}

impl Error {
    /// Map this error onto the caller-facing status taxonomy.
    pub fn status(&self) -> Status {
        match self {
            Error::DimensionMismatch { .. } => Status::DimensionMismatch,
            Error::DomainMismatch { .. } => Status::DomainMismatch,
            Error::OutOfMemory { .. } => Status::OutOfMemory,
            Error::IndexOutOfBounds { .. } => Status::InvalidIndex,
            Error::InvalidArgument { .. } => Status::InvalidValue,
            Error::InvalidObject(_) => Status::InvalidObject,
            Error::Unsupported(_) | Error::Device(_) => Status::UnsupportedOperation,
            Error::Internal(_) => Status::Panic,
        }
    }

    /// Create a dimension mismatch error
    pub fn dimension_mismatch(expected: (usize, usize), got: (usize, usize)) -> Self {
        Self::DimensionMismatch { expected, got }
    }

    /// Create a domain mismatch error
    pub fn domain_mismatch(expected: &ElemType, got: &ElemType, op: &'static str) -> Self {
        Self::DomainMismatch {
            expected: expected.to_string(),
            got: got.to_string(),
            op,
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }

    /// Create an out of memory error for `count` elements of `elem_size` bytes
    pub fn oom(count: usize, elem_size: usize) -> Self {
        Self::OutOfMemory {
            size: count.saturating_mul(elem_size),
        }
    }
}
