//! Descriptive statistics shared by the preparation stages.
//!
//! Every function here returns `NaN` (or `None`) for an undefined statistic
//! instead of an error. Callers treat an undefined statistic as "no signal",
//! which is what the outlier ensemble and the aggregate stationarity score
//! expect.

use statrs::distribution::{ContinuousCDF, Normal};

/// Safe comparison for floating point values (NaN sorts last).
pub fn float_total_cmp(a: &f64, b: &f64) -> std::cmp::Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => std::cmp::Ordering::Equal,
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        (false, false) => a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal),
    }
}

/// Arithmetic mean; `NaN` for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (ddof = 1) using Welford's single pass.
///
/// Returns `None` for fewer than two observations.
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }

    let mut running_mean = 0.0;
    let mut m2 = 0.0;
    for (i, &value) in values.iter().enumerate() {
        let count = (i + 1) as f64;
        let delta = value - running_mean;
        running_mean += delta / count;
        m2 += delta * (value - running_mean);
    }

    Some((m2 / (values.len() - 1) as f64).max(0.0))
}

/// Sample standard deviation (ddof = 1); `None` for fewer than two observations.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    sample_variance(values).map(f64::sqrt)
}

/// Median of already-sorted data (handles even length).
pub fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    }
}

/// Median of unsorted data.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut v = values.to_vec();
    v.sort_by(float_total_cmp);
    median_of_sorted(&v)
}

/// Unscaled median absolute deviation around `med`.
pub fn mad(values: &[f64], med: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut abs_devs: Vec<f64> = values.iter().map(|&x| (x - med).abs()).collect();
    abs_devs.sort_by(float_total_cmp);
    median_of_sorted(&abs_devs)
}

/// Percentile of sorted data with linear interpolation at `(n - 1) * p`.
pub fn percentile(sorted_data: &[f64], p: f64) -> f64 {
    if sorted_data.is_empty() {
        return f64::NAN;
    }

    if p <= 0.0 {
        return sorted_data[0];
    }

    if p >= 1.0 {
        return sorted_data[sorted_data.len() - 1];
    }

    let n = sorted_data.len();
    let index = p * (n - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;

    if lower == upper {
        sorted_data[lower]
    } else {
        let weight = index - lower as f64;
        sorted_data[lower] * (1.0 - weight) + sorted_data[upper] * weight
    }
}

/// Mean over the non-NaN entries; `NaN` when nothing remains.
pub fn nan_mean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Standard normal cumulative distribution function.
pub fn standard_normal_cdf(x: f64) -> f64 {
    match Normal::new(0.0, 1.0) {
        Ok(normal) => normal.cdf(x),
        Err(_) => f64::NAN,
    }
}
