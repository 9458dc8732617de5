//! Common test utilities
#![allow(dead_code)]

use parking_lot::Mutex;
use rand::Rng;
use sparx::dtype::Element;
use sparx::jit::{
    ABI_VERSION, Artifacts, JitMode, LoadedModule, SpecializeError, SpecializerBackend,
};
use sparx::kernels::KernelFn;
use sparx::prelude::*;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Config that never touches the user's kernel cache directory
pub fn test_config(threads: usize, name: &str) -> Config {
    let mut config = Config::single_threaded();
    config.max_threads = threads;
    config.chunk = 1;
    config.jit.cache_dir = scratch_dir(name);
    config
}

/// Client without a compiler; JIT requests fail over to the generic tier
pub fn create_client(threads: usize) -> Client {
    let mut config = test_config(threads, "default");
    config.jit.mode = JitMode::Pause;
    Client::without_jit(config)
}

/// Fresh per-process directory under the system temp dir
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("sparx-test-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// Random pattern with `nnz` distinct entries; entry `k` (column-major) holds `values(k)`
pub fn random_matrix<T: Element>(
    rng: &mut impl Rng,
    nrows: usize,
    ncols: usize,
    nnz: usize,
    format: Format,
    values: impl FnMut(usize) -> T,
) -> Matrix {
    let mut seen = std::collections::BTreeSet::new();
    while seen.len() < nnz {
        seen.insert((rng.random_range(0..ncols), rng.random_range(0..nrows)));
    }
    let rows: Vec<usize> = seen.iter().map(|t| t.1).collect();
    let cols: Vec<usize> = seen.iter().map(|t| t.0).collect();
    let vals: Vec<T> = (0..nnz).map(values).collect();
    Matrix::from_tuples(nrows, ncols, &rows, &cols, &vals, format).unwrap()
}

/// Entries of `m` keyed by (row, col)
pub fn entries<T: Element>(m: &Matrix) -> BTreeMap<(usize, usize), T> {
    let (r, c, v) = m.extract_tuples::<T>().unwrap();
    (0..r.len()).map(|k| ((r[k], c[k]), v[k])).collect()
}

/// Module returned by [`FakeBackend`]
struct FakeModule {
    entry: KernelFn,
}

impl LoadedModule for FakeModule {
    fn entry(&self) -> Option<KernelFn> {
        Some(self.entry)
    }
    fn abi_version(&self) -> Option<u32> {
        Some(ABI_VERSION)
    }
    fn fingerprint(&self) -> Option<u64> {
        // built-in operators only
        Some(0)
    }
}

/// Backend that "compiles" by handing out a fixed entry point.
///
/// Compiles are counted and take `delay` so concurrent requests overlap.
pub struct FakeBackend {
    entry: KernelFn,
    compiled: Mutex<Vec<String>>,
    compiles: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
    delay: std::time::Duration,
}

impl FakeBackend {
    /// Backend serving `entry` for every kernel
    pub fn new(entry: KernelFn) -> Arc<Self> {
        Self::with_delay(entry, std::time::Duration::from_millis(50))
    }

    /// Backend whose compiles each take `delay`
    pub fn with_delay(entry: KernelFn, delay: std::time::Duration) -> Arc<Self> {
        Arc::new(Self {
            entry,
            compiled: Mutex::new(Vec::new()),
            compiles: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            delay,
        })
    }

    /// Toolchain invocations so far
    pub fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    /// Most compiles ever in flight at once
    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

impl SpecializerBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    fn load(
        &self,
        artifacts: &Artifacts,
    ) -> std::result::Result<Arc<dyn LoadedModule>, SpecializeError> {
        if self.compiled.lock().contains(&artifacts.kernel_name) {
            Ok(Arc::new(FakeModule { entry: self.entry }))
        } else {
            Err(SpecializeError::NotFound(artifacts.module.clone()))
        }
    }

    fn compile(&self, artifacts: &Artifacts) -> std::result::Result<(), SpecializeError> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.compiled.lock().push(artifacts.kernel_name.clone());
        Ok(())
    }
}
