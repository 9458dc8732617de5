//! Properties of the work slicer: every item lands in exactly one task and
//! task counts respect the thread cap.

use proptest::prelude::*;
use sparx::runtime::Parallelism;
use sparx::runtime::slice::{
    TaskCounts, merge_counts, nthreads, slice_by_cost, slice_entries, slice_range,
};

fn offsets(lens: &[i64]) -> Vec<i64> {
    let mut p = vec![0i64];
    for &l in lens {
        p.push(p[p.len() - 1] + l);
    }
    p
}

proptest! {
    #[test]
    fn prop_nthreads_bounded_and_monotone(
        work in 0.0f64..1e9,
        extra in 0.0f64..1e9,
        chunk in 1usize..100_000,
        max_threads in 1usize..64,
    ) {
        let n = nthreads(work, chunk, max_threads);
        prop_assert!(n >= 1 && n <= max_threads);
        prop_assert!(nthreads(work + extra, chunk, max_threads) >= n);
    }

    #[test]
    fn prop_slice_range_partitions(n in 0usize..5000, ntasks in 1usize..64) {
        let ranges = slice_range(n, ntasks);
        prop_assert!(!ranges.is_empty());
        prop_assert!(ranges.len() <= ntasks);
        let mut next = 0;
        for r in &ranges {
            prop_assert_eq!(r.start, next);
            prop_assert!(n == 0 || !r.is_empty());
            next = r.end;
        }
        prop_assert_eq!(next, n);
    }

    #[test]
    fn prop_slice_by_cost_partitions(
        costs in prop::collection::vec(0i64..50, 0..300),
        ntasks in 1usize..32,
    ) {
        let cum = offsets(&costs);
        let ranges = slice_by_cost(&cum, ntasks);
        prop_assert!(ranges.len() <= ntasks.max(1));
        let mut next = 0;
        for r in &ranges {
            prop_assert_eq!(r.start, next);
            prop_assert!(costs.is_empty() || !r.is_empty());
            next = r.end;
        }
        prop_assert_eq!(next, costs.len());
    }

    #[test]
    fn prop_slice_entries_partitions(
        lens in prop::collection::vec(0i64..20, 1..200),
        ntasks in 1usize..32,
    ) {
        let p = offsets(&lens);
        let nnz = p[lens.len()] as usize;
        let slices = slice_entries(&p, ntasks);
        prop_assert!(!slices.is_empty());
        prop_assert!(slices.len() <= ntasks);

        // entries: contiguous, disjoint, complete
        let mut next = 0;
        for s in &slices {
            prop_assert_eq!(s.entries.start, next);
            prop_assert!(s.kfirst <= s.klast);
            next = s.entries.end;
        }
        prop_assert_eq!(next, nnz);

        // vectors: first and last covered, no gaps between tasks
        prop_assert_eq!(slices[0].kfirst, 0);
        prop_assert_eq!(slices[slices.len() - 1].klast, lens.len() - 1);
        for w in slices.windows(2) {
            prop_assert!(w[1].kfirst == w[0].klast || w[1].kfirst == w[0].klast + 1);
        }

        // each vector's entries are owned exactly once
        let mut owned = vec![0i64; lens.len()];
        for s in &slices {
            for k in s.kfirst..=s.klast {
                owned[k] += s.vector_entries(&p, k).len() as i64;
            }
        }
        prop_assert_eq!(owned, lens.clone());

        // counting every entry rebuilds the offsets
        let tasks: Vec<TaskCounts> = slices
            .iter()
            .map(|s| TaskCounts {
                kfirst: s.kfirst,
                counts: (s.kfirst..=s.klast)
                    .map(|k| s.vector_entries(&p, k).len() as i64)
                    .collect(),
            })
            .collect();
        let merged = merge_counts(lens.len(), &tasks).unwrap();
        prop_assert_eq!(merged.nnz(), nnz);
        prop_assert_eq!(merged.p, p);
    }
}

#[test]
fn test_run_tasks_keeps_task_order() {
    let par = Parallelism::new(4, 1);
    assert!(par.ntasks(1e6) <= 4);
    let ranges = slice_range(10_000, par.ntasks(10_000.0));
    let sums = par.run_tasks(ranges.clone(), |r| r.map(|x| x as u64).sum::<u64>());
    let serial: Vec<u64> = ranges.into_iter().map(|r| r.map(|x| x as u64).sum()).collect();
    assert_eq!(sums, serial);
    assert_eq!(sums.iter().sum::<u64>(), 10_000 * 9_999 / 2);
}

#[test]
fn test_serial_pool_runs_one_task() {
    let par = Parallelism::serial();
    assert_eq!(par.max_threads(), 1);
    assert_eq!(par.ntasks(1e12), 1);
}
