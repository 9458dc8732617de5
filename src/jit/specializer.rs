//! Specializer: turns a signature into a loaded, validated kernel

use super::backend::{Artifacts, LoadedModule, NullBackend, SpecializerBackend};
use super::{ABI_VERSION, JitMode, KernelHandle, Signature, codegen};
use crate::kernels::OperationDesc;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Specialization failures. All of them are recoverable: the caller falls
/// back to the generic tier.
#[derive(Error, Debug)]
pub enum SpecializeError {
    /// No compiled module exists on disk
    #[error("no compiled module at {0}")]
    NotFound(PathBuf),

    /// Source generation failed
    #[error("code generation failed: {0}")]
    Codegen(String),

    /// The external compiler failed
    #[error("compilation failed: {0}")]
    CompilationFailed(String),

    /// The module could not be loaded
    #[error("failed to load module: {0}")]
    LoadFailed(String),

    /// The module was built for another ABI version or other definitions
    #[error("stale module: {0}")]
    ValidationMismatch(String),

    /// The module does not export the kernel entry point
    #[error("module {0} has no kernel entry point")]
    MissingEntryPoint(String),

    /// The module is missing or stale and compiling is not allowed
    #[error("compilation disabled in {0:?} mode")]
    CompileDisabled(JitMode),

    /// Filesystem error while writing artifacts
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a specialized kernel came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Loaded from a module already on disk
    Disk,
    /// Compiled in this process
    Compiled,
}

/// Generates, compiles and loads kernels.
#[derive(Clone)]
pub struct Specializer {
    backend: Arc<dyn SpecializerBackend>,
    cache_dir: PathBuf,
}

impl std::fmt::Debug for Specializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Specializer")
            .field("backend", &self.backend.name())
            .field("cache_dir", &self.cache_dir)
            .finish()
    }
}

impl Specializer {
    /// Specializer writing artifacts under `cache_dir`
    pub fn new(backend: Arc<dyn SpecializerBackend>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            cache_dir: cache_dir.into(),
        }
    }

    /// Specializer that can never produce a kernel
    pub fn disabled() -> Self {
        Self::new(Arc::new(NullBackend), std::env::temp_dir().join("sparx-jit"))
    }

    /// Artifact directory root
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Backend name
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Produce a kernel for `sig`.
    ///
    /// Under `LoadOnly` a module already on disk is used as is and a stale one
    /// is an error. Under `CompileAndLoad` the source is always regenerated and
    /// compiled. Under `On` a valid module on disk is reused, otherwise the
    /// kernel is compiled.
    pub fn specialize(
        &self,
        sig: &Signature,
        desc: &OperationDesc,
        mode: JitMode,
    ) -> Result<(KernelHandle, Origin), SpecializeError> {
        let name = sig.kernel_name();
        let fingerprint = desc.fingerprint();
        let artifacts = Artifacts::new(&self.cache_dir, &name);

        if mode.allows_load() {
            match self.backend.load(&artifacts) {
                Ok(module) => match validate(&name, module, fingerprint) {
                    Ok(handle) => {
                        debug!("jit: loaded {name} from {}", artifacts.module.display());
                        return Ok((handle, Origin::Disk));
                    }
                    Err(e @ SpecializeError::ValidationMismatch(_)) => {
                        if !mode.allows_compile() {
                            return Err(e);
                        }
                        warn!("jit: {e}; recompiling {name}");
                    }
                    Err(e) => return Err(e),
                },
                Err(SpecializeError::NotFound(_)) => {}
                Err(e) => {
                    if !mode.allows_compile() {
                        return Err(e);
                    }
                    warn!("jit: {e}; recompiling {name}");
                }
            }
        }

        if !mode.allows_compile() {
            return Err(SpecializeError::CompileDisabled(mode));
        }

        let source = codegen::generate(sig, desc, fingerprint)?;
        std::fs::create_dir_all(&artifacts.dir)?;
        std::fs::write(&artifacts.source, source)?;
        debug!(
            "jit: compiling {name} with {} into {}",
            self.backend.name(),
            artifacts.module.display()
        );
        self.backend.compile(&artifacts)?;
        let module = self.backend.load(&artifacts)?;
        let handle = validate(&name, module, fingerprint)?;
        Ok((handle, Origin::Compiled))
    }
}

fn validate(
    name: &str,
    module: Arc<dyn LoadedModule>,
    fingerprint: u64,
) -> Result<KernelHandle, SpecializeError> {
    let version = module.abi_version();
    if version != Some(ABI_VERSION) {
        return Err(SpecializeError::ValidationMismatch(format!(
            "{name} built for ABI {version:?}, expected {ABI_VERSION}"
        )));
    }
    let found = module.fingerprint();
    if found != Some(fingerprint) {
        return Err(SpecializeError::ValidationMismatch(format!(
            "{name} fingerprint {found:x?} does not match {fingerprint:016x}"
        )));
    }
    let entry = module
        .entry()
        .ok_or_else(|| SpecializeError::MissingEntryPoint(name.to_string()))?;
    Ok(KernelHandle::new(entry, fingerprint, ABI_VERSION, Some(module)))
}
