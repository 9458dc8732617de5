//! Compiler and loader backends

use super::SpecializeError;
use crate::kernels::KernelFn;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// On-disk locations of one kernel's source and compiled module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifacts {
    /// Kernel name, also the directory name
    pub kernel_name: String,
    /// Directory holding both files
    pub dir: PathBuf,
    /// Generated C source
    pub source: PathBuf,
    /// Compiled shared library
    pub module: PathBuf,
}

impl Artifacts {
    /// Artifact paths for `kernel_name` under `cache_dir`
    pub fn new(cache_dir: &Path, kernel_name: &str) -> Self {
        let dir = cache_dir.join(kernel_name);
        let source = dir.join(format!("{kernel_name}.c"));
        let module = dir.join(module_filename(kernel_name));
        Self {
            kernel_name: kernel_name.to_string(),
            dir,
            source,
            module,
        }
    }
}

#[cfg(feature = "jit")]
fn module_filename(name: &str) -> std::ffi::OsString {
    libloading::library_filename(name)
}

#[cfg(not(feature = "jit"))]
fn module_filename(name: &str) -> std::ffi::OsString {
    format!(
        "{}{}{}",
        std::env::consts::DLL_PREFIX,
        name,
        std::env::consts::DLL_SUFFIX
    )
    .into()
}

/// A loaded module exposing one kernel and its validation queries.
pub trait LoadedModule: Send + Sync {
    /// The kernel entry point, if the module exports one
    fn entry(&self) -> Option<KernelFn>;
    /// ABI version the module was built for
    fn abi_version(&self) -> Option<u32>;
    /// Fingerprint of the definitions the module was built from
    fn fingerprint(&self) -> Option<u64>;
}

/// Compiles generated source and loads the result.
///
/// Implementations must be safe to call from several threads; the kernel
/// cache guarantees that one signature is never compiled twice at once.
pub trait SpecializerBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Load an existing compiled module.
    ///
    /// Returns `SpecializeError::NotFound` when no module exists on disk.
    fn load(&self, artifacts: &Artifacts) -> Result<Arc<dyn LoadedModule>, SpecializeError>;

    /// Compile `artifacts.source` into `artifacts.module`
    fn compile(&self, artifacts: &Artifacts) -> Result<(), SpecializeError>;
}

/// Backend that has nothing on disk and cannot compile.
///
/// Used when no toolchain is configured; every JIT request then falls back
/// to the generic tier.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullBackend;

impl SpecializerBackend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn load(&self, artifacts: &Artifacts) -> Result<Arc<dyn LoadedModule>, SpecializeError> {
        Err(SpecializeError::NotFound(artifacts.module.clone()))
    }

    fn compile(&self, _artifacts: &Artifacts) -> Result<(), SpecializeError> {
        Err(SpecializeError::CompilationFailed(
            "no compiler configured".into(),
        ))
    }
}

#[cfg(feature = "jit")]
pub use cc::CcBackend;

#[cfg(feature = "jit")]
mod cc {
    use super::{Artifacts, LoadedModule, SpecializeError, SpecializerBackend};
    use crate::kernels::KernelFn;
    use libloading::Library;
    use std::process::Command;
    use std::sync::Arc;

    type VersionFn = unsafe extern "C" fn() -> u32;
    type FingerprintFn = unsafe extern "C" fn() -> u64;

    /// Backend driving an external C compiler and loading the result with
    /// `libloading`.
    #[derive(Clone, Debug)]
    pub struct CcBackend {
        compiler: String,
        flags: Vec<String>,
    }

    impl CcBackend {
        /// Backend invoking `compiler` with `flags` before the fixed arguments
        pub fn new(compiler: impl Into<String>, flags: Vec<String>) -> Self {
            Self {
                compiler: compiler.into(),
                flags,
            }
        }

        /// Compiler executable
        pub fn compiler(&self) -> &str {
            &self.compiler
        }
    }

    impl Default for CcBackend {
        fn default() -> Self {
            Self::new("cc", vec!["-O2".to_string()])
        }
    }

    struct DynModule {
        // Symbols copied out of the library stay valid while it is loaded.
        entry: Option<KernelFn>,
        abi_version: Option<u32>,
        fingerprint: Option<u64>,
        _lib: Library,
    }

    // SAFETY: the module only exposes plain function pointers and values read
    // at load time; the library handle itself is never used after loading.
    unsafe impl Send for DynModule {}
    unsafe impl Sync for DynModule {}

    impl LoadedModule for DynModule {
        fn entry(&self) -> Option<KernelFn> {
            self.entry
        }

        fn abi_version(&self) -> Option<u32> {
            self.abi_version
        }

        fn fingerprint(&self) -> Option<u64> {
            self.fingerprint
        }
    }

    impl SpecializerBackend for CcBackend {
        fn name(&self) -> &str {
            &self.compiler
        }

        fn load(&self, artifacts: &Artifacts) -> Result<Arc<dyn LoadedModule>, SpecializeError> {
            if !artifacts.module.exists() {
                return Err(SpecializeError::NotFound(artifacts.module.clone()));
            }
            // SAFETY: the module was produced by `compile` from generated source
            // and runs no initialization code of its own.
            let lib = unsafe { Library::new(&artifacts.module) }
                .map_err(|e| SpecializeError::LoadFailed(e.to_string()))?;

            // SAFETY: symbol types match the prototypes emitted by codegen.
            let (entry, abi_version, fingerprint) = unsafe {
                let entry = lib
                    .get::<KernelFn>(b"sparx_kernel\0")
                    .ok()
                    .map(|s| *s);
                let version = lib
                    .get::<VersionFn>(b"sparx_query_version\0")
                    .ok()
                    .map(|f| f());
                let fingerprint = lib
                    .get::<FingerprintFn>(b"sparx_query_fingerprint\0")
                    .ok()
                    .map(|f| f());
                (entry, version, fingerprint)
            };

            Ok(Arc::new(DynModule {
                entry,
                abi_version,
                fingerprint,
                _lib: lib,
            }))
        }

        fn compile(&self, artifacts: &Artifacts) -> Result<(), SpecializeError> {
            let output = Command::new(&self.compiler)
                .args(&self.flags)
                .args(["-shared", "-fPIC", "-fwrapv", "-o"])
                .arg(&artifacts.module)
                .arg(&artifacts.source)
                .arg("-lm")
                .output()
                .map_err(|e| {
                    SpecializeError::CompilationFailed(format!("{}: {e}", self.compiler))
                })?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(SpecializeError::CompilationFailed(format!(
                    "{} exited with {}: {}",
                    self.compiler,
                    output.status,
                    stderr.trim()
                )));
            }
            Ok(())
        }
    }
}
