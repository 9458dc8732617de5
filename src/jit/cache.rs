//! Process-wide kernel cache
//!
//! One slot per signature. The slot's `OnceCell` is the fast path: once a
//! kernel is set it is read without locking. Builds are arbitrated by a
//! separate per-signature lock table that survives [`KernelCache::reset`], so
//! at most one thread specializes a given signature even across a reset;
//! other threads asking for the same signature wait on it and then see the
//! result. Threads asking for different signatures never contend beyond the
//! brief map locks.

use super::{KernelHandle, Signature, Specializer};
use crate::kernels::OperationDesc;
use log::{debug, warn};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

/// JIT control mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum JitMode {
    /// Clear the cache; the previous mode stays in effect
    Reset = 0,
    /// Never use JIT kernels; the cache is cleared
    Off = 1,
    /// Use kernels already in memory; never load or compile
    Pause = 2,
    /// Always compile, ignoring modules already on disk
    CompileAndLoad = 3,
    /// Load modules from disk; never compile
    LoadOnly = 4,
    /// Load from disk, compile on a miss
    On = 5,
}

impl JitMode {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => JitMode::Off,
            2 => JitMode::Pause,
            3 => JitMode::CompileAndLoad,
            4 => JitMode::LoadOnly,
            _ => JitMode::On,
        }
    }

    /// Modules on disk may be loaded
    pub fn allows_load(self) -> bool {
        matches!(self, JitMode::LoadOnly | JitMode::On)
    }

    /// New modules may be compiled
    pub fn allows_compile(self) -> bool {
        matches!(self, JitMode::CompileAndLoad | JitMode::On)
    }
}

impl FromStr for JitMode {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reset" => Ok(JitMode::Reset),
            "off" | "0" => Ok(JitMode::Off),
            "pause" => Ok(JitMode::Pause),
            "compile" | "compile_and_load" => Ok(JitMode::CompileAndLoad),
            "load" | "load_only" => Ok(JitMode::LoadOnly),
            "on" | "1" => Ok(JitMode::On),
            other => Err(crate::error::Error::invalid_argument(
                "jit mode",
                format!("unknown mode '{other}'"),
            )),
        }
    }
}

/// Outcome of [`KernelCache::insert`].
#[derive(Clone, Debug)]
pub enum Insert {
    /// The handle is now cached
    Accepted,
    /// Another handle was cached first; it is returned and the offered one dropped
    AlreadyPresent(Arc<KernelHandle>),
    /// The cache could not grow; nothing was stored
    Rejected,
}

/// Cache counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from memory
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Kernels compiled in this process
    pub compiles: u64,
    /// Kernels loaded from disk
    pub loads: u64,
    /// Failed specializations
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    compiles: AtomicU64,
    loads: AtomicU64,
    failures: AtomicU64,
}

enum BuildState {
    Idle,
    /// Specialization failed under this mode and cache generation; not
    /// retried until either changes
    Failed(JitMode, u64),
}

struct Slot {
    ready: OnceCell<Arc<KernelHandle>>,
}

impl Slot {
    fn empty() -> Arc<Self> {
        Arc::new(Self {
            ready: OnceCell::new(),
        })
    }
}

/// Concurrent map from signatures to loaded kernels.
pub struct KernelCache {
    mode: AtomicU8,
    slots: RwLock<HashMap<Signature, Arc<Slot>>>,
    builds: Mutex<HashMap<Signature, Arc<Mutex<BuildState>>>>,
    generation: AtomicU64,
    stats: Counters,
}

impl std::fmt::Debug for KernelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelCache")
            .field("mode", &self.mode())
            .field("len", &self.len())
            .finish()
    }
}

impl Default for KernelCache {
    fn default() -> Self {
        Self::new(JitMode::On)
    }
}

impl KernelCache {
    /// Empty cache in `mode`
    pub fn new(mode: JitMode) -> Self {
        let mode = if mode == JitMode::Reset { JitMode::On } else { mode };
        Self {
            mode: AtomicU8::new(mode as u8),
            slots: RwLock::new(HashMap::new()),
            builds: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            stats: Counters::default(),
        }
    }

    /// Current mode
    pub fn mode(&self) -> JitMode {
        JitMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// Change the mode.
    ///
    /// `Reset` clears the cache and keeps the current mode; `Off` clears the
    /// cache and disables the JIT tier.
    pub fn set_mode(&self, mode: JitMode) {
        match mode {
            JitMode::Reset => self.reset(),
            JitMode::Off => {
                self.mode.store(mode as u8, Ordering::Release);
                self.reset();
            }
            _ => self.mode.store(mode as u8, Ordering::Release),
        }
        debug!("jit: mode {:?}", self.mode());
    }

    fn slot(&self, sig: &Signature) -> Option<Arc<Slot>> {
        self.slots.read().get(sig).cloned()
    }

    fn slot_or_insert(&self, sig: &Signature) -> Option<Arc<Slot>> {
        if let Some(slot) = self.slot(sig) {
            return Some(slot);
        }
        let mut slots = self.slots.write();
        if let Some(slot) = slots.get(sig) {
            return Some(slot.clone());
        }
        if slots.try_reserve(1).is_err() {
            return None;
        }
        let slot = Slot::empty();
        slots.insert(sig.clone(), slot.clone());
        Some(slot)
    }

    fn build_lock(&self, sig: &Signature) -> Option<Arc<Mutex<BuildState>>> {
        let mut builds = self.builds.lock();
        if let Some(build) = builds.get(sig) {
            return Some(build.clone());
        }
        if builds.try_reserve(1).is_err() {
            return None;
        }
        let build = Arc::new(Mutex::new(BuildState::Idle));
        builds.insert(sig.clone(), build.clone());
        Some(build)
    }

    /// Cached kernel for `sig`, if any
    pub fn lookup(&self, sig: &Signature) -> Option<Arc<KernelHandle>> {
        let found = self.slot(sig).and_then(|s| s.ready.get().cloned());
        let counter = if found.is_some() {
            &self.stats.hits
        } else {
            &self.stats.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Store `handle` under `sig` unless a kernel is already cached there
    pub fn insert(&self, sig: &Signature, handle: Arc<KernelHandle>) -> Insert {
        let Some(slot) = self.slot_or_insert(sig) else {
            return Insert::Rejected;
        };
        match slot.ready.try_insert(handle) {
            Ok(_) => Insert::Accepted,
            Err((existing, _)) => Insert::AlreadyPresent(existing.clone()),
        }
    }

    /// Drop every cached kernel.
    ///
    /// Builds still in flight keep their lock entry; a caller arriving after
    /// the reset waits for them instead of starting a second build.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.slots.write().clear();
        self.builds
            .lock()
            .retain(|_, build| Arc::strong_count(build) > 1);
    }

    /// Number of signatures with a cached kernel
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|s| s.ready.get().is_some())
            .count()
    }

    /// Returns true if no kernel is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            compiles: self.stats.compiles.load(Ordering::Relaxed),
            loads: self.stats.loads.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
        }
    }

    /// Cached kernel for `sig`, specializing it on a miss as the mode allows.
    ///
    /// Concurrent callers with the same signature trigger at most one
    /// specialization. Returns `None` when no JIT kernel is available; the
    /// caller then uses the generic tier.
    pub fn get_or_specialize(
        &self,
        sig: &Signature,
        desc: &OperationDesc,
        specializer: &Specializer,
    ) -> Option<Arc<KernelHandle>> {
        let mode = self.mode();
        if mode == JitMode::Off {
            return None;
        }
        let fingerprint = desc.fingerprint();

        if let Some(handle) = self.lookup(sig) {
            if handle.fingerprint() == fingerprint {
                return Some(handle);
            }
            warn!(
                "jit: {} cached with fingerprint {:016x}, expected {:016x}; evicting",
                sig.kernel_name(),
                handle.fingerprint(),
                fingerprint
            );
            self.evict(sig);
        }

        if mode == JitMode::Pause {
            return None;
        }

        let build = self.build_lock(sig)?;
        let mut state = build.lock();
        if let Some(handle) = self.slot(sig).and_then(|s| s.ready.get().cloned()) {
            return Some(handle);
        }
        let generation = self.generation.load(Ordering::Acquire);
        if let BuildState::Failed(failed_mode, failed_gen) = *state {
            if failed_mode == mode && failed_gen == generation {
                return None;
            }
        }

        match specializer.specialize(sig, desc, mode) {
            Ok((handle, origin)) => {
                let counter = match origin {
                    super::Origin::Disk => &self.stats.loads,
                    super::Origin::Compiled => &self.stats.compiles,
                };
                counter.fetch_add(1, Ordering::Relaxed);
                *state = BuildState::Idle;
                let handle = Arc::new(handle);
                match self.insert(sig, handle.clone()) {
                    Insert::AlreadyPresent(existing) => Some(existing),
                    Insert::Accepted | Insert::Rejected => Some(handle),
                }
            }
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                debug!("jit: {} unavailable: {e}", sig.kernel_name());
                *state = BuildState::Failed(mode, generation);
                None
            }
        }
    }

    fn evict(&self, sig: &Signature) {
        let mut slots = self.slots.write();
        if let Some(slot) = slots.get(sig) {
            if slot.ready.get().is_some() {
                slots.insert(sig.clone(), Slot::empty());
            }
        }
    }
}
