//! Work slicing
//!
//! Splits an index domain into at most `max_threads` contiguous task ranges.
//! Compressed matrices are split by entries, so one vector may be shared by
//! two (or more) adjacent tasks; the per-task partial counts of such vectors
//! are combined by [`merge_counts`] before any task writes output.
//!
//! ```text
//! entry    0  1  2  3  4  5  6  7  8  9
//! vector   k0 k0 k1 k1 k1 k1 k1 k1 k1 k2
//! task     t0 t0 t0 t1 t1 t1 t2 t2 t2 t2
//! ```
//!
//! t0 owns k0 and the head of k1, t1 the middle of k1, t2 its tail and k2.

use crate::error::Result;
use crate::runtime::workspace::try_vec;
use std::ops::Range;

/// Number of tasks for `work` units, at least one and at most `max_threads`
pub fn nthreads(work: f64, chunk: usize, max_threads: usize) -> usize {
    let chunk = chunk.max(1) as f64;
    let max_threads = max_threads.max(1);
    if work.is_nan() || work <= chunk {
        return 1;
    }
    let n = (work / chunk).floor();
    if n >= max_threads as f64 {
        max_threads
    } else {
        (n as usize).max(1)
    }
}

/// Split `0..n` into `ntasks` near-equal contiguous ranges.
///
/// Returns fewer ranges when `n < ntasks`; never returns an empty range
/// unless `n == 0`, in which case the single range `0..0` is returned.
pub fn slice_range(n: usize, ntasks: usize) -> Vec<Range<usize>> {
    let ntasks = ntasks.clamp(1, n.max(1));
    (0..ntasks)
        .map(|t| (t * n / ntasks)..((t + 1) * n / ntasks))
        .collect()
}

/// Split the items described by the cumulative cost array `cum` (length
/// `n + 1`, non-decreasing, `cum[0] == 0`) into at most `ntasks` contiguous
/// item ranges of roughly equal cost.
///
/// Every item lands in exactly one range; ranges are ordered and non-empty
/// unless there are no items at all.
pub fn slice_by_cost(cum: &[i64], ntasks: usize) -> Vec<Range<usize>> {
    let n = cum.len().saturating_sub(1);
    if n == 0 {
        return vec![0..0];
    }
    let ntasks = ntasks.clamp(1, n);
    let total = cum[n].max(0) as u128;
    let mut out = Vec::with_capacity(ntasks);
    let mut start = 0;
    for t in 1..ntasks {
        let target = (total * t as u128 / ntasks as u128) as i64;
        // first item whose cumulative cost reaches the target
        let cut = cum[1..].partition_point(|&c| c < target).clamp(start, n);
        if cut > start {
            out.push(start..cut);
            start = cut;
        }
    }
    if start < n {
        out.push(start..n);
    }
    out
}

/// Split the vectors of a compressed pattern with offsets `p` so every task
/// holds a similar number of entries; vectors are never shared.
pub fn slice_vectors(p: &[i64], ntasks: usize) -> Vec<Range<usize>> {
    slice_by_cost(p, ntasks)
}

/// Entry range of one task and the vectors it touches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntrySlice {
    /// First vector touched (possibly only its tail)
    pub kfirst: usize,
    /// Last vector touched, inclusive (possibly only its head)
    pub klast: usize,
    /// Entry positions owned by this task
    pub entries: Range<usize>,
}

impl EntrySlice {
    /// Entries of vector `k` owned by this task
    #[inline]
    pub fn vector_entries(&self, p: &[i64], k: usize) -> Range<usize> {
        let start = (p[k] as usize).max(self.entries.start);
        let end = (p[k + 1] as usize).min(self.entries.end);
        start..end.max(start)
    }

    /// Number of vectors touched
    #[inline]
    pub fn nvectors(&self) -> usize {
        self.klast + 1 - self.kfirst
    }
}

/// Split the entries of a compressed pattern with offsets `p` into at most
/// `ntasks` equal ranges.
///
/// Empty vectors between two tasks belong to the later one, so every vector
/// `0..nvec` is touched by at least one slice. A pattern with no vectors
/// yields no slices.
pub fn slice_entries(p: &[i64], ntasks: usize) -> Vec<EntrySlice> {
    let nvec = p.len().saturating_sub(1);
    if nvec == 0 {
        return Vec::new();
    }
    let nnz = p[nvec].max(0) as usize;
    let ntasks = ntasks.clamp(1, nnz.max(1));
    let mut out = Vec::with_capacity(ntasks);
    let mut next_vector = 0;
    for t in 0..ntasks {
        let pstart = t * nnz / ntasks;
        let pend = (t + 1) * nnz / ntasks;
        // vector holding entry `pend - 1`: last k with p[k] <= pend - 1
        let klast = if t + 1 == ntasks {
            nvec - 1
        } else {
            p[1..nvec].partition_point(|&e| (e as usize) < pend)
        };
        out.push(EntrySlice {
            kfirst: next_vector.min(klast),
            klast,
            entries: pstart..pend,
        });
        // the next task starts inside klast unless klast ends exactly here
        next_vector = if p[klast + 1] as usize == pend {
            klast + 1
        } else {
            klast
        };
    }
    out
}

/// Surviving-entry counts of one task, one slot per vector it touches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskCounts {
    /// First vector the counts refer to
    pub kfirst: usize,
    /// `counts[k - kfirst]` entries of vector `k` survive in this task
    pub counts: Vec<i64>,
}

impl TaskCounts {
    /// Total survivors of the task
    pub fn total(&self) -> i64 {
        self.counts.iter().sum()
    }
}

/// Output layout after the count phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedCounts {
    /// Output offsets, one per vector plus the end
    pub p: Vec<i64>,
    /// First output position of each task
    pub task_offsets: Vec<usize>,
}

impl MergedCounts {
    /// Total output entries
    pub fn nnz(&self) -> usize {
        self.p.last().copied().unwrap_or(0) as usize
    }
}

/// Combine per-task partial counts into output offsets.
///
/// Counts of a vector split across several tasks are summed; each task's
/// output is the contiguous block starting at its entry in `task_offsets`.
pub fn merge_counts(nvec: usize, tasks: &[TaskCounts]) -> Result<MergedCounts> {
    let mut p = try_vec(nvec + 1, 0i64)?;
    let mut task_offsets = try_vec(tasks.len(), 0usize)?;
    let mut running = 0usize;
    for (t, task) in tasks.iter().enumerate() {
        task_offsets[t] = running;
        for (d, &c) in task.counts.iter().enumerate() {
            p[task.kfirst + d + 1] += c;
            running += c as usize;
        }
    }
    for k in 0..nvec {
        p[k + 1] += p[k];
    }
    Ok(MergedCounts { p, task_offsets })
}

/// Split `data` into consecutive mutable blocks of the given lengths.
///
/// The lengths must not add up to more than `data.len()`.
pub(crate) fn split_blocks<T>(
    mut data: &mut [T],
    lens: impl IntoIterator<Item = usize>,
) -> Vec<&mut [T]> {
    let mut out = Vec::new();
    for len in lens {
        let (head, tail) = std::mem::take(&mut data).split_at_mut(len);
        out.push(head);
        data = tail;
    }
    out
}

/// Output block length of every task, from its first position and the total
pub(crate) fn block_lens(offsets: &[usize], total: usize) -> Vec<usize> {
    offsets
        .iter()
        .zip(offsets.iter().skip(1).chain(std::iter::once(&total)))
        .map(|(&start, &end)| end - start)
        .collect()
}
