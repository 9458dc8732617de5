//! Client: the owner of everything shared across operations

use super::config::Config;
use super::dispatch;
use super::offload::DeviceExecutor;
use super::parallel::Parallelism;
use crate::dtype::{ElemType, Scalar};
use crate::error::Result;
use crate::jit::{JitMode, KernelCache, NullBackend, Specializer, SpecializerBackend, Target, encode};
use crate::kernels::{GenericKernel, OperationDesc, Tier, Worker, factory};
use crate::ops::{ApplyOp, BinaryOp, IndexUnaryOp, MatrixOps, Monoid, Semiring};
use crate::runtime::Mask;
use crate::sparse::{Format, Matrix, Values};
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of kernels handed out per tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TierStats {
    /// Factory kernels
    pub factory: u64,
    /// JIT kernels
    pub jit: u64,
    /// Generic kernels
    pub generic: u64,
}

#[derive(Debug, Default)]
struct TierCounters {
    factory: AtomicU64,
    jit: AtomicU64,
    generic: AtomicU64,
}

/// Operation dispatcher.
///
/// A client owns its configuration, thread pool, specializer and optional
/// device executor, and shares its [`KernelCache`] with any other client
/// built from the same `Arc`.
///
/// # Example
///
/// ```
/// use sparx::prelude::*;
///
/// let client = Client::new(Config::single_threaded());
/// let a = Matrix::from_csc(2, 2, vec![0, 1, 2], vec![0, 1], &[3i16, 9])?;
/// let le5 = IndexUnaryOp::value(IndexUnaryOpcode::ValueLe, DType::I16);
/// let c = client.select(&a, &le5, &Scalar::new(5i16), None)?;
/// assert_eq!(c.nvals(), 1);
/// # Ok::<(), sparx::error::Error>(())
/// ```
pub struct Client {
    config: Config,
    cache: Arc<KernelCache>,
    specializer: Specializer,
    device: Option<Arc<dyn DeviceExecutor>>,
    parallelism: Parallelism,
    tiers: TierCounters,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("jit_mode", &self.cache.mode())
            .field("specializer", &self.specializer)
            .field("device", &self.device.as_ref().map(|d| d.name().to_string()))
            .field("parallelism", &self.parallelism)
            .finish()
    }
}

/// Builder for [`Client`] with injectable collaborators.
pub struct ClientBuilder {
    config: Config,
    cache: Option<Arc<KernelCache>>,
    backend: Option<Arc<dyn SpecializerBackend>>,
    device: Option<Arc<dyn DeviceExecutor>>,
}

impl ClientBuilder {
    /// Builder starting from `config`
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cache: None,
            backend: None,
            device: None,
        }
    }

    /// Share an existing kernel cache instead of creating one
    pub fn cache(mut self, cache: Arc<KernelCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use a specific compiler backend
    pub fn backend(mut self, backend: Arc<dyn SpecializerBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Attach a device executor for multiply offload
    pub fn device(mut self, device: Arc<dyn DeviceExecutor>) -> Self {
        self.device = Some(device);
        self
    }

    /// Build the client
    pub fn build(self) -> Client {
        let config = self.config;
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(KernelCache::new(config.jit.mode)));
        let backend = self.backend.unwrap_or_else(|| default_backend(&config));
        let specializer = Specializer::new(backend, config.jit.cache_dir.clone());
        let parallelism = Parallelism::new(config.max_threads, config.chunk);
        debug!(
            "client: {} threads, chunk {}, jit {:?} via {}",
            parallelism.max_threads(),
            config.chunk,
            cache.mode(),
            specializer.backend_name()
        );
        Client {
            config,
            cache,
            specializer,
            device: self.device,
            parallelism,
            tiers: TierCounters::default(),
        }
    }
}

#[cfg(feature = "jit")]
fn default_backend(config: &Config) -> Arc<dyn SpecializerBackend> {
    Arc::new(crate::jit::CcBackend::new(
        config.jit.compiler.clone(),
        config.jit.flags.clone(),
    ))
}

#[cfg(not(feature = "jit"))]
fn default_backend(_config: &Config) -> Arc<dyn SpecializerBackend> {
    Arc::new(NullBackend)
}

impl Default for Client {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Client {
    /// Client with its own kernel cache and the default backend
    pub fn new(config: Config) -> Self {
        ClientBuilder::new(config).build()
    }

    /// Client configured from `SPARX_*` environment variables
    pub fn from_env() -> Self {
        Self::new(Config::from_env())
    }

    /// Client that never specializes: every non-factory kernel is generic
    pub fn without_jit(config: Config) -> Self {
        ClientBuilder::new(config).backend(Arc::new(NullBackend)).build()
    }

    /// Builder with injectable cache, backend and device
    pub fn builder(config: Config) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Kernel cache
    pub fn cache(&self) -> &Arc<KernelCache> {
        &self.cache
    }

    /// Specializer
    pub fn specializer(&self) -> &Specializer {
        &self.specializer
    }

    /// Thread pool settings
    pub fn parallelism(&self) -> &Parallelism {
        &self.parallelism
    }

    /// Device executor, if any
    pub fn device(&self) -> Option<&dyn DeviceExecutor> {
        self.device.as_deref()
    }

    /// Current JIT mode
    pub fn jit_mode(&self) -> JitMode {
        self.cache.mode()
    }

    /// Change the JIT mode; `Reset` clears the cache and keeps the mode
    pub fn set_jit_mode(&self, mode: JitMode) {
        self.cache.set_mode(mode);
    }

    /// Kernels handed out per tier so far
    pub fn tier_stats(&self) -> TierStats {
        TierStats {
            factory: self.tiers.factory.load(Ordering::Relaxed),
            jit: self.tiers.jit.load(Ordering::Relaxed),
            generic: self.tiers.generic.load(Ordering::Relaxed),
        }
    }

    fn count(&self, tier: Tier) {
        let counter = match tier {
            Tier::Factory => &self.tiers.factory,
            Tier::Jit => &self.tiers.jit,
            Tier::Generic => &self.tiers.generic,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Kernel for `desc`: factory, then JIT, then generic.
    ///
    /// With the cache off only the generic tier is used. Fails only when the
    /// operand types cannot be cast to the operator's types.
    pub(crate) fn worker(&self, desc: &OperationDesc) -> Result<Worker> {
        let mode = self.cache.mode();
        if mode != JitMode::Off {
            if let Some(f) = factory::lookup(desc) {
                self.count(Tier::Factory);
                return Ok(Worker::Factory(f));
            }
            if let Some(sig) = encode(desc, Target::Host).key() {
                if let Some(handle) = self.cache.get_or_specialize(&sig, desc, &self.specializer) {
                    debug!("dispatch: {} {} via jit", desc.kind.name(), desc.op.name());
                    self.count(Tier::Jit);
                    return Ok(Worker::Jit(handle));
                }
            }
        }
        let generic = GenericKernel::new(desc)?;
        debug!("dispatch: {} {} via generic", desc.kind.name(), desc.op.name());
        self.count(Tier::Generic);
        Ok(Worker::Generic(Arc::new(generic)))
    }
}

impl MatrixOps for Client {
    fn select(
        &self,
        a: &Matrix,
        op: &IndexUnaryOp,
        thunk: &Scalar,
        mask: Option<&Mask>,
    ) -> Result<Matrix> {
        let c = dispatch::select::select(self, a, op, thunk)?;
        dispatch::masked(self, c, mask)
    }

    fn select_in_place(&self, a: &mut Matrix, op: &IndexUnaryOp, thunk: &Scalar) -> Result<()> {
        dispatch::select::select_in_place(self, a, op, thunk)
    }

    fn transpose(
        &self,
        a: &Matrix,
        op: Option<&ApplyOp>,
        ctype: Option<&ElemType>,
        mask: Option<&Mask>,
    ) -> Result<Matrix> {
        let c = dispatch::transpose::transpose(self, a, op, ctype)?;
        dispatch::masked(self, c, mask)
    }

    fn transpose_in_place(&self, a: &mut Matrix) -> Result<()> {
        let c = dispatch::transpose::transpose(self, a, None, None)?;
        *a = c;
        Ok(())
    }

    fn apply(
        &self,
        a: &Matrix,
        op: &ApplyOp,
        ctype: Option<&ElemType>,
        mask: Option<&Mask>,
    ) -> Result<Matrix> {
        let c = dispatch::apply::apply(self, a, op, ctype)?;
        dispatch::masked(self, c, mask)
    }

    fn ewise_mult(
        &self,
        a: &Matrix,
        b: &Matrix,
        op: &BinaryOp,
        mask: Option<&Mask>,
    ) -> Result<Matrix> {
        let c = dispatch::ewise::ewise(self, a, b, op, dispatch::ewise::Combine::Intersection)?;
        dispatch::masked(self, c, mask)
    }

    fn ewise_add(
        &self,
        a: &Matrix,
        b: &Matrix,
        op: &BinaryOp,
        mask: Option<&Mask>,
    ) -> Result<Matrix> {
        let c = dispatch::ewise::ewise(self, a, b, op, dispatch::ewise::Combine::Union)?;
        dispatch::masked(self, c, mask)
    }

    fn reduce(&self, a: &Matrix, monoid: &Monoid) -> Result<Scalar> {
        dispatch::reduce::reduce(self, a, monoid)
    }

    fn mxm(
        &self,
        a: &Matrix,
        b: &Matrix,
        semiring: &Semiring,
        mask: Option<&Mask>,
    ) -> Result<Matrix> {
        dispatch::mxm::mxm(self, a, b, semiring, mask)
    }

    fn build(
        &self,
        ty: &ElemType,
        nrows: usize,
        ncols: usize,
        rows: &[usize],
        cols: &[usize],
        values: &Values,
        dup: Option<&BinaryOp>,
    ) -> Result<Matrix> {
        dispatch::build::build(self, ty, nrows, ncols, rows, cols, values, dup)
    }

    fn wait(&self, a: &mut Matrix) -> Result<()> {
        dispatch::wait::wait(self, a)
    }

    fn convert(&self, a: &Matrix, format: Format) -> Result<Matrix> {
        let a = dispatch::finished(self, a)?;
        a.to_format(format)
    }
}
