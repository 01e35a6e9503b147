use std::thread::{self, Scope};
use std::time::Instant;

use tracing::{debug, trace};

use crate::budget::{BudgetSnapshot, Permit, WorkerBudget};
use crate::config::{SortConfig, resolve_workers};
use crate::sequence::QuickSortable;

/// Outcome of one [`QuickSorter::sort`] call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SortReport {
    pub len: usize,
    pub workers: usize,
    pub min_size_for_concurrency: usize,
    pub budget: BudgetSnapshot,
}

impl SortReport {
    /// Sub-ranges that ran on a task of their own.
    pub fn forks(&self) -> usize {
        self.budget.acquired
    }
}

/// Quicksort whose sub-ranges are spread over at most `workers` concurrent
/// tasks.
///
/// After each partition at most one side is offered to a new task, and only
/// when it holds at least `min_size_for_concurrency` elements and the budget
/// still has a free worker. Everything else is sorted inline.
#[derive(Clone, Copy, Debug)]
pub struct QuickSorter {
    workers: usize,
    min_size: usize,
}

impl Default for QuickSorter {
    fn default() -> Self {
        Self::new(SortConfig::default())
    }
}

impl QuickSorter {
    pub fn new(config: SortConfig) -> Self {
        Self {
            workers: config.resolved_workers(),
            min_size: config.min_size_for_concurrency(),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn min_size_for_concurrency(&self) -> usize {
        self.min_size
    }

    /// Sorts `data` in place and returns once every spawned task is done.
    ///
    /// A panic inside a spawned task still hands its worker back to the
    /// budget and is then re-raised here.
    pub fn sort<S: QuickSortable>(&self, data: S) -> SortReport {
        let len = data.len();
        let budget = WorkerBudget::for_workers(self.workers);
        debug!(
            len,
            workers = self.workers,
            min_size = self.min_size,
            "quicksort start"
        );

        let started = Instant::now();
        thread::scope(|scope| {
            sort_range(scope, &budget, self.min_size, data);
            budget.await_all();
        });

        let report = SortReport {
            len,
            workers: self.workers,
            min_size_for_concurrency: self.min_size,
            budget: budget.snapshot(),
        };
        debug_assert!(report.budget.is_balanced(), "{report:?}");
        debug!(
            forks = report.forks(),
            elapsed = ?started.elapsed(),
            "quicksort done"
        );
        report
    }
}

/// `workers == 0` uses the host's parallelism, `min_size == 0` is treated as 1.
pub fn quick_sort_custom<S: QuickSortable>(data: S, workers: usize, min_size: usize) -> SortReport {
    let sorter = QuickSorter {
        workers: resolve_workers(workers),
        min_size: min_size.max(1),
    };
    sorter.sort(data)
}

/// Sorts `data` on the current task.
///
/// Sides that stay inline go on a heap worklist instead of the call stack, so
/// lopsided partitions (ascending input with a last-element pivot) never
/// deepen it. `second` is pushed before `first`, so `first` is sorted first.
fn sort_range<'scope, 'env, S>(
    scope: &'scope Scope<'scope, 'env>,
    budget: &'scope WorkerBudget,
    min_size: usize,
    data: S,
) where
    S: QuickSortable + 'scope,
{
    let mut pending = vec![data];
    while let Some(mut data) = pending.pop() {
        if data.len() <= 1 {
            continue;
        }

        let pivot = select_pivot(&data);
        let pivot = partition(&mut data, pivot);
        let (first, rest) = data.split_view(pivot);
        let second = rest.suffix(1);

        if first.len() >= min_size
            && let Some(permit) = budget.try_acquire()
        {
            fork(scope, budget, min_size, permit, first);
            push_unsorted(&mut pending, second);
        } else if second.len() >= min_size
            && let Some(permit) = budget.try_acquire()
        {
            fork(scope, budget, min_size, permit, second);
            push_unsorted(&mut pending, first);
        } else {
            push_unsorted(&mut pending, second);
            push_unsorted(&mut pending, first);
        }
    }
}

#[inline]
fn push_unsorted<S: QuickSortable>(pending: &mut Vec<S>, data: S) {
    if data.len() > 1 {
        pending.push(data);
    }
}

fn fork<'scope, 'env, S>(
    scope: &'scope Scope<'scope, 'env>,
    budget: &'scope WorkerBudget,
    min_size: usize,
    permit: Permit<'scope>,
    data: S,
) where
    S: QuickSortable + 'scope,
{
    trace!(len = data.len(), "fork");
    scope.spawn(move || {
        let _permit = permit;
        sort_range(scope, budget, min_size, data);
    });
}

/// Last element, no sampling.
///
/// # Panics
///
/// Panics if `data` is empty.
pub fn select_pivot<S: QuickSortable>(data: &S) -> usize {
    assert!(!data.is_empty(), "no pivot in an empty range");
    data.len() - 1
}

/// Lomuto partition around `data[pivot]`; returns the pivot's final index.
///
/// Everything left of the result is `<=` the pivot, everything right is `>`.
///
/// # Panics
///
/// Panics if `pivot` is not an index of `data`, which includes every call on
/// an empty `data`.
pub fn partition<S: QuickSortable>(data: &mut S, pivot: usize) -> usize {
    assert!(
        pivot < data.len(),
        "pivot {pivot} out of range for length {}",
        data.len()
    );
    let last = data.len() - 1;
    if pivot != last {
        data.swap(pivot, last);
    }

    let mut boundary = 0;
    for i in 0..last {
        if data.less_or_equal(i, last) {
            data.swap(i, boundary);
            boundary += 1;
        }
    }
    data.swap(boundary, last);
    boundary
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::ops::RangeInclusive;
    use std::panic::{self, AssertUnwindSafe};
    use std::thread::ThreadId;

    use parking_lot::Mutex;

    use super::*;
    use crate::sequence::SortBy;

    /// Far below the depth a recursive sort of `ASCENDING_LEN` would need.
    const SMALL_STACK: usize = 256 * 1024;
    const ASCENDING_LEN: u32 = 1 << 15;

    struct Comparison {
        values: [u32; 2],
        thread: ThreadId,
    }

    fn sort_recording(
        values: &mut [u32],
        workers: usize,
        min_size: usize,
    ) -> (SortReport, Vec<Comparison>) {
        let log = Mutex::new(Vec::new());
        let less_or_equal = |a: &u32, b: &u32| {
            log.lock().push(Comparison {
                values: [*a, *b],
                thread: thread::current().id(),
            });
            a <= b
        };
        let report = quick_sort_custom(SortBy::new(values, &less_or_equal), workers, min_size);
        (report, log.into_inner())
    }

    /// Threads that compared any value in `range` after the first partition
    /// around `root_pivot`.
    fn threads_sorting(
        log: &[Comparison],
        root_pivot: u32,
        range: RangeInclusive<u32>,
    ) -> HashSet<ThreadId> {
        log.iter()
            .filter(|c| !c.values.contains(&root_pivot))
            .filter(|c| c.values.iter().any(|v| range.contains(v)))
            .map(|c| c.thread)
            .collect()
    }

    fn sort_ascending_on_small_stack(workers: usize, min_size: usize) -> SortReport {
        thread::Builder::new()
            .stack_size(SMALL_STACK)
            .spawn(move || {
                let mut values = (0..ASCENDING_LEN).collect::<Vec<_>>();
                let report = quick_sort_custom(values.as_mut_slice(), workers, min_size);
                assert!(values.iter().copied().eq(0..ASCENDING_LEN));
                report
            })
            .unwrap()
            .join()
            .unwrap()
    }

    #[test]
    fn partition_places_pivot() {
        let mut values = [5_i32, 3, 8, 3, 9, 1];
        let mut view: &mut [i32] = &mut values;
        let pivot = select_pivot(&view);
        assert_eq!(pivot, 5);
        let at = partition(&mut view, pivot);
        assert_eq!(at, 0);
        assert_eq!(values[0], 1);

        let mut values = [5_i32, 3, 8, 3, 9, 4];
        let mut view: &mut [i32] = &mut values;
        let at = partition(&mut view, 5);
        assert_eq!(at, 2);
        assert_eq!(values[at], 4);
        assert!(values[..at].iter().all(|&x| x <= 4));
        assert!(values[at + 1..].iter().all(|&x| x > 4));
    }

    #[test]
    fn partition_moves_chosen_pivot_to_end_first() {
        let mut values = [7_u32, 2, 9, 4, 6];
        let mut view: &mut [u32] = &mut values;
        let at = partition(&mut view, 0);
        assert_eq!(values[at], 7);
        assert!(values[..at].iter().all(|&x| x <= 7));
        assert!(values[at + 1..].iter().all(|&x| x > 7));
    }

    #[test]
    fn partition_with_duplicates_keeps_equals_left() {
        let mut values = [2_u8, 2, 2, 2];
        let mut view: &mut [u8] = &mut values;
        assert_eq!(partition(&mut view, 3), 3);

        let mut values = [1_u8];
        let mut view: &mut [u8] = &mut values;
        assert_eq!(partition(&mut view, 0), 0);
    }

    #[test]
    fn forks_only_while_budget_lasts() {
        let mut values = (0..4096_u32).map(|i| i.wrapping_mul(2_654_435_761)).collect::<Vec<_>>();
        let report = quick_sort_custom(values.as_mut_slice(), 3, 16);
        assert!(values.is_sorted());
        assert_eq!(report.workers, 3);
        assert_eq!(report.budget.initial, 2);
        assert!(report.forks() >= 1);
        assert!(report.budget.is_balanced());
    }

    #[test]
    fn single_worker_never_forks() {
        let mut values = (0..1000_i64).rev().collect::<Vec<_>>();
        let report = quick_sort_custom(values.as_mut_slice(), 1, 1);
        assert_eq!(report.forks(), 0);
        assert_eq!(values, (0..1000).collect::<Vec<_>>());
    }

    #[test]
    fn zero_threshold_is_clamped() {
        let mut values = vec![3_u16, 1, 2];
        let report = quick_sort_custom(values.as_mut_slice(), 2, 0);
        assert_eq!(report.min_size_for_concurrency, 1);
        assert_eq!(values, [1, 2, 3]);
    }

    #[test]
    fn panicking_task_is_reraised() {
        let caller = thread::current().id();
        let less_or_equal = move |a: &u32, b: &u32| {
            if thread::current().id() != caller {
                panic!("comparator failure off the calling thread");
            }
            a <= b
        };
        let mut values = (0..512_u32).rev().collect::<Vec<_>>();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            quick_sort_custom(SortBy::new(&mut values, &less_or_equal), 4, 2)
        }));
        assert!(result.is_err());
    }

    #[test]
    fn ascending_input_single_worker_keeps_stack_flat() {
        let report = sort_ascending_on_small_stack(1, 16);
        assert_eq!(report.forks(), 0);
        assert_eq!(report.len, ASCENDING_LEN as usize);
    }

    #[test]
    fn ascending_input_above_threshold_keeps_stack_flat() {
        let report = sort_ascending_on_small_stack(4, ASCENDING_LEN as usize + 1);
        assert_eq!(report.forks(), 0);
        assert_eq!(report.budget.available, 3);
    }

    #[test]
    fn short_first_side_forks_second() {
        let caller = thread::current().id();
        let mut values = [1_u32, 9, 8, 7, 6, 5, 4, 3, 2];
        let (report, log) = sort_recording(&mut values, 2, 2);

        assert_eq!(values, [1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(report.forks(), 1);
        assert!(threads_sorting(&log, 2, 1..=1).is_empty());
        let second = threads_sorting(&log, 2, 3..=9);
        assert_eq!(second.len(), 1);
        assert!(!second.contains(&caller));
    }

    #[test]
    fn first_side_forks_before_second() {
        let caller = thread::current().id();
        let mut values = [1_u32, 2, 3, 7, 8, 9, 5];
        let (report, log) = sort_recording(&mut values, 2, 3);

        assert_eq!(values, [1, 2, 3, 5, 7, 8, 9]);
        assert_eq!(report.forks(), 1);
        let first = threads_sorting(&log, 5, 1..=3);
        assert_eq!(first.len(), 1);
        assert!(!first.contains(&caller));
        assert_eq!(threads_sorting(&log, 5, 7..=9), HashSet::from([caller]));
    }

    #[test]
    fn one_fork_per_partition_even_with_spare_workers() {
        let caller = thread::current().id();
        let mut values = [1_u32, 2, 3, 7, 8, 9, 5];
        // Both root sides hold 3; every later side holds at most 2.
        let (report, log) = sort_recording(&mut values, 3, 3);

        assert_eq!(values, [1, 2, 3, 5, 7, 8, 9]);
        assert_eq!(report.budget.initial, 2);
        assert_eq!(report.forks(), 1);
        assert!(!threads_sorting(&log, 5, 1..=3).contains(&caller));
        assert_eq!(threads_sorting(&log, 5, 7..=9), HashSet::from([caller]));
    }

    #[test]
    #[should_panic(expected = "no pivot in an empty range")]
    fn pivot_of_empty_range_panics() {
        let view: &mut [u8] = &mut [];
        select_pivot(&view);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn partition_of_empty_range_panics() {
        let mut view: &mut [u8] = &mut [];
        partition(&mut view, 0);
    }
}
