//! Seeded synthetic price series for tests, demos and benchmarks.
//!
//! Every generator takes a [`GeneratorConfig`] and draws from a ChaCha20
//! stream seeded by it, so the same config always produces the same series
//! on every platform.

use crate::errors::{validate_parameter, PrepResult, SeriesPrepError};
use crate::time_series::TimeSeries;
use chrono::{DateTime, TimeZone, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Normal};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Length and seed shared by all generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeneratorConfig {
    /// Length of the generated series
    pub length: usize,
    /// Seed for the ChaCha20 stream
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            length: 250,
            seed: 42,
        }
    }
}

/// Reference processes with well-known stationarity properties.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BenchmarkSeriesType {
    /// IID Gaussian noise around zero (stationary)
    WhiteNoise,
    /// Gaussian random walk starting at 100 (one unit root)
    RandomWalk,
    /// Geometric random walk with the given per-step log volatility
    GeometricWalk(f64),
}

fn gaussian(sigma: f64) -> PrepResult<Normal<f64>> {
    validate_parameter(sigma, 0.0, f64::MAX, "sigma")?;
    Normal::new(0.0, sigma).map_err(|e| SeriesPrepError::InvalidParameter {
        parameter: "sigma".to_string(),
        value: sigma,
        constraint: e.to_string(),
    })
}

/// IID `N(0, sigma²)` draws.
pub fn white_noise(config: &GeneratorConfig, sigma: f64) -> PrepResult<Vec<f64>> {
    let normal = gaussian(sigma)?;
    let mut rng = ChaCha20Rng::seed_from_u64(config.seed);
    Ok((0..config.length).map(|_| normal.sample(&mut rng)).collect())
}

/// Random walk `x_0 = start`, `x_t = x_{t-1} + N(0, sigma²)`.
pub fn random_walk(config: &GeneratorConfig, start: f64, sigma: f64) -> PrepResult<Vec<f64>> {
    let steps = white_noise(config, sigma)?;
    let mut level = start;
    Ok(steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            if i > 0 {
                level += step;
            }
            level
        })
        .collect())
}

/// Strictly positive price path `start * exp(cumsum(N(drift, vol²)))`.
pub fn geometric_walk(
    config: &GeneratorConfig,
    start: f64,
    drift: f64,
    volatility: f64,
) -> PrepResult<Vec<f64>> {
    validate_parameter(start, f64::MIN_POSITIVE, f64::MAX, "start")?;
    let log_path = random_walk(config, 0.0, volatility)?;
    Ok(log_path
        .iter()
        .enumerate()
        .map(|(i, x)| start * (x + drift * i as f64).exp())
        .collect())
}

/// Piecewise-constant levels plus Gaussian noise.
///
/// `levels` holds `(length, level)` pairs laid end to end; the config length
/// is ignored in favour of their total.
pub fn step_series(config: &GeneratorConfig, levels: &[(usize, f64)], sigma: f64) -> PrepResult<Vec<f64>> {
    let total: usize = levels.iter().map(|(len, _)| len).sum();
    let noise = white_noise(
        &GeneratorConfig {
            length: total,
            seed: config.seed,
        },
        sigma,
    )?;
    Ok(levels
        .iter()
        .flat_map(|&(len, level)| std::iter::repeat(level).take(len))
        .zip(noise)
        .map(|(level, eps)| level + eps)
        .collect())
}

/// Add `magnitude` to the values at `indices`; out-of-range indices are ignored.
pub fn inject_spikes(values: &mut [f64], indices: &[usize], magnitude: f64) {
    for &i in indices {
        if let Some(v) = values.get_mut(i) {
            *v += magnitude;
        }
    }
}

/// Generate one of the [`BenchmarkSeriesType`] processes.
pub fn generate_benchmark_series(
    series_type: BenchmarkSeriesType,
    config: &GeneratorConfig,
) -> PrepResult<Vec<f64>> {
    match series_type {
        BenchmarkSeriesType::WhiteNoise => white_noise(config, 1.0),
        BenchmarkSeriesType::RandomWalk => random_walk(config, 100.0, 1.0),
        BenchmarkSeriesType::GeometricWalk(vol) => geometric_walk(config, 100.0, 0.0, vol),
    }
}

/// Wrap generated values as a daily series starting 2020-01-01.
pub fn daily_series(values: Vec<f64>) -> PrepResult<TimeSeries> {
    let start: DateTime<Utc> = Utc
        .with_ymd_and_hms(2020, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| SeriesPrepError::invalid_input("invalid start date"))?;
    TimeSeries::from_daily_values(start, values)
}
