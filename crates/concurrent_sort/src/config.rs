use std::thread;

use thiserror::Error;
use tracing::warn;

pub const WORKERS_ENV: &str = "CONCURRENT_SORT_WORKERS";
pub const MIN_SIZE_ENV: &str = "CONCURRENT_SORT_MIN_SIZE";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("minimum slice size for concurrency must be at least 1")]
    ZeroThreshold,
    #[error("invalid value {value:?} for {var}: expected a non-negative integer")]
    InvalidEnv { var: &'static str, value: String },
}

/// Tuning for one sort invocation.
///
/// `workers == 0` stands for the host's available parallelism and is
/// resolved when a sorter is built from the config.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SortConfig {
    workers: usize,
    min_size_for_concurrency: usize,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            min_size_for_concurrency: default_min_size(host_parallelism()),
        }
    }
}

impl SortConfig {
    pub fn builder() -> SortConfigBuilder {
        SortConfigBuilder::default()
    }

    pub(crate) fn from_parts(workers: usize, min_size_for_concurrency: usize) -> Self {
        Self {
            workers,
            min_size_for_concurrency: min_size_for_concurrency.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn resolved_workers(&self) -> usize {
        resolve_workers(self.workers)
    }

    pub fn min_size_for_concurrency(&self) -> usize {
        self.min_size_for_concurrency
    }

    /// Defaults overridden by [`WORKERS_ENV`] and [`MIN_SIZE_ENV`] when set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut builder = Self::builder();
        if let Some(workers) = parse_var(WORKERS_ENV, lookup(WORKERS_ENV))? {
            builder = builder.workers(workers);
        }
        if let Some(min_size) = parse_var(MIN_SIZE_ENV, lookup(MIN_SIZE_ENV))? {
            builder = builder.min_size_for_concurrency(min_size);
        }
        builder.build()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SortConfigBuilder {
    workers: usize,
    min_size_for_concurrency: Option<usize>,
}

impl SortConfigBuilder {
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn min_size_for_concurrency(mut self, min_size: usize) -> Self {
        self.min_size_for_concurrency = Some(min_size);
        self
    }

    pub fn build(self) -> Result<SortConfig, ConfigError> {
        let min_size_for_concurrency = match self.min_size_for_concurrency {
            Some(0) => return Err(ConfigError::ZeroThreshold),
            Some(min_size) => min_size,
            None => default_min_size(resolve_workers(self.workers)),
        };
        Ok(SortConfig {
            workers: self.workers,
            min_size_for_concurrency,
        })
    }
}

fn parse_var(var: &'static str, value: Option<String>) -> Result<Option<usize>, ConfigError> {
    let Some(value) = value else {
        return Ok(None);
    };
    match value.trim().parse() {
        Ok(parsed) => Ok(Some(parsed)),
        Err(_) => Err(ConfigError::InvalidEnv { var, value }),
    }
}

pub fn host_parallelism() -> usize {
    match thread::available_parallelism() {
        Ok(n) => n.get(),
        Err(err) => {
            warn!(%err, "available parallelism unknown, sorting with one worker");
            1
        }
    }
}

pub fn resolve_workers(workers: usize) -> usize {
    if workers == 0 {
        host_parallelism()
    } else {
        workers
    }
}

/// 1.5 slices per worker, the best ratio found by threshold sweeps.
pub fn default_min_size(workers: usize) -> usize {
    (workers * 3 / 2).max(1)
}
