//! Threshold calibration.
//!
//! Sweeps candidate values of `min_size_for_concurrency` for a fixed slice
//! length and worker count, times repeated full sorts of random data at each
//! candidate, and keeps the candidate with the lowest average. The result is
//! meant to be run offline once per machine and fed back through
//! [`Calibration::config`].

use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{SortConfig, resolve_workers};
use crate::engine::quick_sort_custom;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CalibrationError {
    #[error("threshold step must be positive")]
    ZeroStep,
    #[error("thresholds start at 1")]
    ZeroStart,
    #[error("empty sweep: start {start} is above stop {stop}")]
    EmptySweep { start: usize, stop: usize },
    #[error("at least one run per threshold is required")]
    ZeroRuns,
    #[error("{0} runs per threshold is more than can be averaged")]
    TooManyRuns(usize),
    #[error("slice length must be positive")]
    EmptySlice,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CalibrationPlan {
    pub start: usize,
    pub step: usize,
    pub stop: usize,
    pub slice_len: usize,
    pub runs: usize,
    /// `0` uses the host's parallelism.
    pub workers: usize,
    pub seed: u64,
}

impl Default for CalibrationPlan {
    fn default() -> Self {
        Self {
            start: 20,
            step: 5,
            stop: 80,
            slice_len: 1 << 24,
            runs: 1 << 7,
            workers: 0,
            seed: 0x5EED_2026,
        }
    }
}

impl CalibrationPlan {
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.step == 0 {
            return Err(CalibrationError::ZeroStep);
        }
        if self.start == 0 {
            return Err(CalibrationError::ZeroStart);
        }
        if self.start > self.stop {
            return Err(CalibrationError::EmptySweep {
                start: self.start,
                stop: self.stop,
            });
        }
        if self.runs == 0 {
            return Err(CalibrationError::ZeroRuns);
        }
        if u32::try_from(self.runs).is_err() {
            return Err(CalibrationError::TooManyRuns(self.runs));
        }
        if self.slice_len == 0 {
            return Err(CalibrationError::EmptySlice);
        }
        Ok(())
    }

    pub fn thresholds(&self) -> impl Iterator<Item = usize> + use<> {
        (self.start..=self.stop).step_by(self.step.max(1))
    }
}

#[derive(Clone, Debug)]
pub struct ThresholdTiming {
    pub threshold: usize,
    pub samples: Vec<Duration>,
    pub average: Duration,
}

#[derive(Clone, Debug)]
pub struct Calibration {
    pub workers: usize,
    pub best: usize,
    /// Ordered by threshold.
    pub timings: Vec<ThresholdTiming>,
}

impl Calibration {
    pub fn best_timing(&self) -> Option<&ThresholdTiming> {
        self.timings.iter().find(|t| t.threshold == self.best)
    }

    pub fn config(&self) -> SortConfig {
        SortConfig::from_parts(self.workers, self.best)
    }
}

pub fn calibrate(plan: &CalibrationPlan) -> Result<Calibration, CalibrationError> {
    plan.validate()?;
    let workers = resolve_workers(plan.workers);
    let runs = u32::try_from(plan.runs).map_err(|_| CalibrationError::TooManyRuns(plan.runs))?;
    info!(
        slice_len = plan.slice_len,
        workers,
        runs,
        start = plan.start,
        stop = plan.stop,
        step = plan.step,
        "calibrating concurrency threshold"
    );

    let mut data = vec![0_i64; plan.slice_len];
    let mut timings = Vec::new();
    for threshold in plan.thresholds() {
        let mut samples = Vec::with_capacity(plan.runs);
        for run in 0..plan.runs {
            fill_random(&mut data, workers, run_seed(plan.seed, threshold, run));
            let started = Instant::now();
            quick_sort_custom(data.as_mut_slice(), workers, threshold);
            let elapsed = started.elapsed();
            debug_assert!(data.is_sorted());
            debug!(threshold, run, ?elapsed, "calibration run");
            samples.push(elapsed);
        }

        let average = samples.iter().sum::<Duration>() / runs;
        info!(threshold, ?average, "threshold averaged");
        timings.push(ThresholdTiming {
            threshold,
            samples,
            average,
        });
    }

    let best = select_best(&timings).ok_or(CalibrationError::EmptySweep {
        start: plan.start,
        stop: plan.stop,
    })?;
    info!(best, workers, "best concurrency threshold");
    Ok(Calibration {
        workers,
        best,
        timings,
    })
}

/// Lowest average wins; ties go to the earlier (smaller) threshold.
pub fn select_best(timings: &[ThresholdTiming]) -> Option<usize> {
    timings
        .iter()
        .min_by_key(|t| t.average)
        .map(|t| t.threshold)
}

fn fill_random(data: &mut [i64], workers: usize, seed: u64) {
    let chunk_len = data.len().div_ceil(workers.max(1)).max(1);
    thread::scope(|s| {
        for (index, chunk) in data.chunks_mut(chunk_len).enumerate() {
            s.spawn(move || {
                let mut rng = StdRng::seed_from_u64(mix_seed(seed ^ index as u64));
                for value in chunk {
                    *value = rng.random();
                }
            });
        }
    });
}

#[inline]
fn run_seed(seed: u64, threshold: usize, run: usize) -> u64 {
    mix_seed(seed ^ ((threshold as u64) << 32) ^ run as u64)
}

#[inline]
fn mix_seed(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
