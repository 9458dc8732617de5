//! Runtime kernel specialization
//!
//! An operation the factory table does not cover is encoded into a
//! [`Signature`], looked up in the [`KernelCache`], and on a miss handed to the
//! [`Specializer`], which generates C source, compiles it with an external
//! toolchain through a [`SpecializerBackend`], loads the module and validates
//! it. Every failure here is recoverable: the caller falls back to the
//! generic kernel.
//!
//! ```text
//! OperationDesc ──encode──▶ Signature ──lookup──▶ KernelHandle
//!                                  │ miss
//!                                  ▼
//!                Specializer: codegen ─▶ load from disk ─▶ validate
//!                                  │ not found / stale
//!                                  ▼
//!                       write source ─▶ compile ─▶ load ─▶ validate ─▶ insert
//! ```

mod backend;
mod cache;
pub mod codegen;
mod signature;
mod specializer;

#[cfg(feature = "jit")]
pub use backend::CcBackend;
pub use backend::{Artifacts, LoadedModule, NullBackend, SpecializerBackend};
pub use cache::{CacheStats, Insert, JitMode, KernelCache};
pub use signature::{Encoded, Signature, Target, encode};
pub(crate) use signature::mask_type_code;
pub use specializer::{Origin, SpecializeError, Specializer};

use crate::kernels::KernelFn;
use std::fmt;
use std::sync::Arc;

/// Version stamp compiled into every generated module.
///
/// Bumped whenever the kernel ABI or the generated templates change, so that
/// artifacts built by an older release are recompiled instead of loaded.
pub const ABI_VERSION: u32 = 3;

/// A loaded, validated kernel.
///
/// Shared by every caller through `Arc`; never mutated once inserted into a
/// cache. The module is kept alive for as long as the handle exists.
pub struct KernelHandle {
    entry: KernelFn,
    fingerprint: u64,
    abi_version: u32,
    module: Option<Arc<dyn LoadedModule>>,
}

impl KernelHandle {
    /// Handle around an entry point and the module that owns it
    pub fn new(
        entry: KernelFn,
        fingerprint: u64,
        abi_version: u32,
        module: Option<Arc<dyn LoadedModule>>,
    ) -> Self {
        Self {
            entry,
            fingerprint,
            abi_version,
            module,
        }
    }

    /// Kernel entry point
    #[inline]
    pub fn entry(&self) -> KernelFn {
        self.entry
    }

    /// Fingerprint of the user definitions the kernel was built from
    #[inline]
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// ABI version the kernel was built for
    #[inline]
    pub fn abi_version(&self) -> u32 {
        self.abi_version
    }

    /// Returns true if a loaded module backs this handle
    pub fn has_module(&self) -> bool {
        self.module.is_some()
    }
}

impl fmt::Debug for KernelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelHandle")
            .field("fingerprint", &format_args!("{:016x}", self.fingerprint))
            .field("abi_version", &self.abi_version)
            .field("module", &self.module.is_some())
            .finish()
    }
}
