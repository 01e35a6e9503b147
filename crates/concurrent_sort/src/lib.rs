mod budget;
mod config;
mod engine;
mod sequence;

pub mod calibration;

pub use budget::{BudgetSnapshot, Permit, WorkerBudget};
pub use config::{
    ConfigError, MIN_SIZE_ENV, SortConfig, SortConfigBuilder, WORKERS_ENV, default_min_size,
    host_parallelism,
};
pub use engine::{QuickSorter, SortReport, partition, quick_sort_custom, select_pivot};
pub use sequence::{QuickSortable, SortBy};

/// Sorts with the host's parallelism and the default concurrency threshold.
pub fn quick_sort<T: Ord + Send>(data: &mut [T]) -> SortReport {
    QuickSorter::default().sort(data)
}

/// Like [`quick_sort`], ordered by `less_or_equal` instead of `Ord`.
pub fn quick_sort_by<T, F>(data: &mut [T], less_or_equal: F) -> SortReport
where
    T: Send,
    F: Fn(&T, &T) -> bool + Sync,
{
    QuickSorter::default().sort(SortBy::new(data, &less_or_equal))
}
