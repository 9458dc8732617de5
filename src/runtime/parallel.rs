//! Thread pool wrapper
//!
//! With the `rayon` feature every client owns a pool capped at its
//! `max_threads`; without it tasks run one after another on the calling
//! thread. Either way tasks own disjoint data, so no locking happens inside
//! an operation.

use super::slice;
use log::warn;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "rayon")]
use std::sync::Arc;

/// Per-client parallel execution settings.
#[derive(Clone)]
pub struct Parallelism {
    max_threads: usize,
    chunk: usize,
    #[cfg(feature = "rayon")]
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl std::fmt::Debug for Parallelism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parallelism")
            .field("max_threads", &self.max_threads)
            .field("chunk", &self.chunk)
            .finish()
    }
}

impl Parallelism {
    /// Pool of `max_threads` workers splitting work in units of `chunk`
    pub fn new(max_threads: usize, chunk: usize) -> Self {
        let max_threads = max_threads.max(1);
        #[cfg(feature = "rayon")]
        let pool = if max_threads > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(max_threads)
                .thread_name(|i| format!("sparx-worker-{i}"))
                .build()
            {
                Ok(pool) => Some(Arc::new(pool)),
                Err(e) => {
                    warn!("thread pool unavailable, running single-threaded: {e}");
                    None
                }
            }
        } else {
            None
        };
        #[cfg(not(feature = "rayon"))]
        if max_threads > 1 {
            warn!("built without rayon; {max_threads} threads requested, using 1");
        }
        Self {
            max_threads,
            chunk: chunk.max(1),
            #[cfg(feature = "rayon")]
            pool,
        }
    }

    /// Serial execution
    pub fn serial() -> Self {
        Self::new(1, super::config::DEFAULT_CHUNK)
    }

    /// Thread cap
    #[inline]
    pub fn max_threads(&self) -> usize {
        #[cfg(feature = "rayon")]
        {
            if self.pool.is_some() { self.max_threads } else { 1 }
        }
        #[cfg(not(feature = "rayon"))]
        {
            1
        }
    }

    /// Minimum work per task
    #[inline]
    pub fn chunk(&self) -> usize {
        self.chunk
    }

    /// Number of tasks worth spawning for `work` units
    pub fn ntasks(&self, work: f64) -> usize {
        slice::nthreads(work, self.chunk, self.max_threads())
    }

    /// Run `f` inside the pool so nested parallel iterators use its threads
    pub fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        #[cfg(feature = "rayon")]
        if let Some(pool) = &self.pool {
            return pool.install(f);
        }
        f()
    }

    /// Run one closure per task and collect the results in task order.
    ///
    /// Tasks typically carry disjoint `&mut` slices of the output.
    pub fn run_tasks<I, R, F>(&self, tasks: Vec<I>, f: F) -> Vec<R>
    where
        I: Send,
        R: Send,
        F: Fn(I) -> R + Sync + Send,
    {
        #[cfg(feature = "rayon")]
        if tasks.len() > 1 && self.pool.is_some() {
            return self.install(|| tasks.into_par_iter().map(&f).collect());
        }
        tasks.into_iter().map(f).collect()
    }
}

impl Default for Parallelism {
    fn default() -> Self {
        Self::serial()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_tasks_preserves_order() {
        let par = Parallelism::new(4, 1);
        let out = par.run_tasks((0..16).collect(), |t: usize| t * t);
        assert_eq!(out, (0..16).map(|t| t * t).collect::<Vec<_>>());
    }

    #[test]
    fn test_disjoint_mut_tasks() {
        let par = Parallelism::new(3, 1);
        let mut data = vec![0u32; 9];
        let tasks: Vec<(usize, &mut [u32])> = data.chunks_mut(3).enumerate().collect();
        par.run_tasks(tasks, |(t, s)| s.fill(t as u32 + 1));
        assert_eq!(data, vec![1, 1, 1, 2, 2, 2, 3, 3, 3]);
    }

    #[test]
    fn test_serial_caps_tasks() {
        let par = Parallelism::serial();
        assert_eq!(par.max_threads(), 1);
        assert_eq!(par.ntasks(1e9), 1);
    }
}
