//! Runtime configuration
//!
//! Every tunable has a default; `Config::from_env` overrides them from
//! `SPARX_*` environment variables. Unparseable values are ignored with a
//! warning rather than failing client construction.

use crate::jit::JitMode;
use log::warn;
use std::path::PathBuf;
use std::str::FromStr;

/// Default minimum work per parallel task
pub const DEFAULT_CHUNK: usize = 64 * 1024;

/// Default work estimate handled by one accelerator unit
pub const DEFAULT_WORK_PER_UNIT: f64 = 1.0e7;

/// JIT settings.
#[derive(Debug, Clone, PartialEq)]
pub struct JitConfig {
    /// Initial cache mode
    pub mode: JitMode,
    /// Root directory for generated sources and compiled modules
    pub cache_dir: PathBuf,
    /// C compiler executable
    pub compiler: String,
    /// Flags passed to the compiler before the fixed ones
    pub flags: Vec<String>,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            mode: JitMode::On,
            cache_dir: default_cache_dir(),
            compiler: "cc".to_string(),
            flags: vec!["-O2".to_string()],
        }
    }
}

fn default_cache_dir() -> PathBuf {
    let base = std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".cache")))
        .unwrap_or_else(std::env::temp_dir);
    base.join("sparx").join(format!("v{}", crate::jit::ABI_VERSION))
}

/// When multiply-like operations may be handed to a device executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffloadPolicy {
    /// Always run on the host
    Never,
    /// Offload when the work estimate and operand support allow it
    Auto,
    /// Fail with `Unsupported` when the device cannot take the operation
    Require,
}

impl FromStr for OffloadPolicy {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" | "off" | "0" => Ok(OffloadPolicy::Never),
            "auto" | "on" | "1" => Ok(OffloadPolicy::Auto),
            "require" | "always" => Ok(OffloadPolicy::Require),
            other => Err(crate::error::Error::invalid_argument(
                "offload policy",
                format!("unknown policy '{other}'"),
            )),
        }
    }
}

/// Accelerator offload settings.
#[derive(Debug, Clone, PartialEq)]
pub struct OffloadConfig {
    /// Offload policy
    pub policy: OffloadPolicy,
    /// Work estimate one device unit is worth; below this nothing is offloaded
    pub work_per_unit: f64,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            policy: OffloadPolicy::Auto,
            work_per_unit: DEFAULT_WORK_PER_UNIT,
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Upper bound on worker threads per operation
    pub max_threads: usize,
    /// Minimum work per task; smaller inputs use fewer threads
    pub chunk: usize,
    /// JIT settings
    pub jit: JitConfig,
    /// Offload settings
    pub offload: OffloadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_threads: num_cpus::get().max(1),
            chunk: DEFAULT_CHUNK,
            jit: JitConfig::default(),
            offload: OffloadConfig::default(),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring {name}={raw:?}: not a valid value");
            None
        }
    }
}

impl Config {
    /// Defaults overridden by `SPARX_*` environment variables
    pub fn from_env() -> Self {
        let mut c = Self::default();
        if let Some(n) = env_parse::<usize>("SPARX_NTHREADS") {
            c.max_threads = n.max(1);
        }
        if let Some(n) = env_parse::<usize>("SPARX_CHUNK") {
            c.chunk = n.max(1);
        }
        if let Some(mode) = env_parse::<JitMode>("SPARX_JIT") {
            c.jit.mode = mode;
        }
        if let Some(dir) = std::env::var_os("SPARX_JIT_CACHE") {
            c.jit.cache_dir = PathBuf::from(dir);
        }
        if let Ok(cc) = std::env::var("SPARX_CC") {
            if !cc.trim().is_empty() {
                c.jit.compiler = cc.trim().to_string();
            }
        }
        if let Ok(flags) = std::env::var("SPARX_CFLAGS") {
            c.jit.flags = flags.split_whitespace().map(str::to_string).collect();
        }
        if let Some(policy) = env_parse::<OffloadPolicy>("SPARX_OFFLOAD") {
            c.offload.policy = policy;
        }
        if let Some(w) = env_parse::<f64>("SPARX_OFFLOAD_WORK") {
            if w > 0.0 {
                c.offload.work_per_unit = w;
            }
        }
        c
    }

    /// Configuration limited to one thread
    pub fn single_threaded() -> Self {
        Self {
            max_threads: 1,
            ..Self::default()
        }
    }
}
