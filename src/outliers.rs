//! Causal rolling-window outlier detection and repair.
//!
//! Each observation is judged only against the observations strictly before
//! it (the *baseline*: at most `window` points). Three independent tests vote:
//!
//! - **Z-score**: distance from the baseline mean in baseline standard deviations
//! - **IQR**: position outside the Tukey fences of the baseline quartiles
//! - **MAD**: distance from the baseline median in median absolute deviations
//!
//! A point is an outlier when at least two tests agree. A test whose statistic
//! is undefined (too few baseline points, zero dispersion) votes "no".
//! Flagged points are replaced with the mean of their own baseline, so the
//! cleaned value at index `i` depends only on raw values before `i`.

use crate::errors::{validate_parameter, PrepResult, SeriesPrepError};
use crate::math_utils::{float_total_cmp, mad, mean, median_of_sorted, percentile, sample_std};
use crate::time_series::TimeSeries;
use log::{debug, info};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;

/// Configuration for [`RollingOutlierDetector`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OutlierConfig {
    /// Maximum number of preceding observations in the baseline
    pub window: usize,
    /// Z-score above which the z-test votes "outlier"
    pub zscore_threshold: f64,
    /// Fence multiplier applied to the interquartile range
    pub iqr_multiplier: f64,
    /// Robust z-score (in MADs) above which the MAD test votes "outlier"
    pub mad_threshold: f64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            window: 10,
            zscore_threshold: 4.0,
            iqr_multiplier: 2.0,
            mad_threshold: 4.0,
        }
    }
}

impl OutlierConfig {
    /// Check that the window is non-zero and thresholds are finite and non-negative.
    pub fn validate(&self) -> PrepResult<()> {
        if self.window == 0 {
            return Err(SeriesPrepError::InvalidParameter {
                parameter: "window".to_string(),
                value: 0.0,
                constraint: ">= 1".to_string(),
            });
        }
        validate_parameter(self.zscore_threshold, 0.0, f64::MAX, "zscore_threshold")?;
        validate_parameter(self.iqr_multiplier, 0.0, f64::MAX, "iqr_multiplier")?;
        validate_parameter(self.mad_threshold, 0.0, f64::MAX, "mad_threshold")?;
        Ok(())
    }
}

/// Individual verdicts of the three tests for one observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OutlierVotes {
    /// Z-score test verdict
    pub zscore: bool,
    /// Interquartile-range test verdict
    pub iqr: bool,
    /// Median-absolute-deviation test verdict
    pub mad: bool,
}

impl OutlierVotes {
    /// Number of tests voting "outlier".
    pub fn agreeing(&self) -> usize {
        [self.zscore, self.iqr, self.mad]
            .iter()
            .filter(|&&v| v)
            .count()
    }

    /// Majority rule: at least two of three tests agree.
    pub fn is_outlier(&self) -> bool {
        (self.zscore && self.iqr) || (self.zscore && self.mad) || (self.iqr && self.mad)
    }
}

/// Boolean outlier flags aligned with a series.
///
/// Only produced by [`RollingOutlierDetector`]; the first entry is always
/// `false` because no baseline exists before the first observation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct OutlierMask {
    flags: Vec<bool>,
}

impl OutlierMask {
    fn from_votes(votes: &[OutlierVotes]) -> Self {
        let mut flags: Vec<bool> = votes.iter().map(OutlierVotes::is_outlier).collect();
        if let Some(first) = flags.first_mut() {
            *first = false;
        }
        Self { flags }
    }

    /// Number of entries (equals the source series length).
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Whether the mask has no entries.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Flag at index `i`; `false` out of range.
    pub fn is_flagged(&self, i: usize) -> bool {
        self.flags.get(i).copied().unwrap_or(false)
    }

    /// All flags in index order.
    pub fn as_slice(&self) -> &[bool] {
        &self.flags
    }

    /// Indices of flagged observations.
    pub fn flagged_indices(&self) -> Vec<usize> {
        self.flags
            .iter()
            .enumerate()
            .filter_map(|(i, &f)| f.then_some(i))
            .collect()
    }

    /// Number of flagged observations.
    pub fn count(&self) -> usize {
        self.flags.iter().filter(|&&f| f).count()
    }
}

/// A raw series together with its mask, votes and repaired counterpart.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CleanedSeries {
    original: TimeSeries,
    cleaned: TimeSeries,
    mask: OutlierMask,
    votes: Vec<OutlierVotes>,
}

impl CleanedSeries {
    /// Input series, untouched.
    pub fn original(&self) -> &TimeSeries {
        &self.original
    }

    /// Series with flagged points replaced by their baseline mean.
    pub fn cleaned(&self) -> &TimeSeries {
        &self.cleaned
    }

    /// Outlier flags aligned with both series.
    pub fn mask(&self) -> &OutlierMask {
        &self.mask
    }

    /// Per-index test verdicts.
    pub fn votes(&self) -> &[OutlierVotes] {
        &self.votes
    }

    /// Consume and return the cleaned series.
    pub fn into_cleaned(self) -> TimeSeries {
        self.cleaned
    }
}

/// Z-score vote against a baseline; abstains when the std is undefined or zero.
pub fn zscore_vote(baseline: &[f64], value: f64, threshold: f64) -> bool {
    match sample_std(baseline) {
        Some(std) if std > 0.0 => ((value - mean(baseline)) / std).abs() > threshold,
        _ => false,
    }
}

/// Tukey-fence vote against the quartiles of `sorted_baseline`.
pub fn iqr_vote(sorted_baseline: &[f64], value: f64, multiplier: f64) -> bool {
    if sorted_baseline.is_empty() {
        return false;
    }
    let q1 = percentile(sorted_baseline, 0.25);
    let q3 = percentile(sorted_baseline, 0.75);
    let iqr = q3 - q1;
    value < q1 - multiplier * iqr || value > q3 + multiplier * iqr
}

/// Robust z-score vote; abstains when the MAD is zero.
pub fn mad_vote(sorted_baseline: &[f64], value: f64, threshold: f64) -> bool {
    if sorted_baseline.is_empty() {
        return false;
    }
    let med = median_of_sorted(sorted_baseline);
    let dispersion = mad(sorted_baseline, med);
    if dispersion > 0.0 {
        (value - med).abs() / dispersion > threshold
    } else {
        false
    }
}

/// Causal three-test ensemble outlier detector.
#[derive(Debug, Clone)]
pub struct RollingOutlierDetector {
    config: OutlierConfig,
}

impl Default for RollingOutlierDetector {
    fn default() -> Self {
        Self {
            config: OutlierConfig::default(),
        }
    }
}

impl RollingOutlierDetector {
    /// Create a detector after validating `config`.
    pub fn new(config: OutlierConfig) -> PrepResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Active configuration.
    pub fn config(&self) -> &OutlierConfig {
        &self.config
    }

    /// Baseline index range for observation `i`: `[max(0, i - window), i)`.
    pub fn baseline_range(&self, i: usize) -> Range<usize> {
        i.saturating_sub(self.config.window)..i
    }

    fn vote(&self, baseline: &[f64], value: f64) -> OutlierVotes {
        if baseline.is_empty() {
            return OutlierVotes::default();
        }
        let mut sorted = baseline.to_vec();
        sorted.sort_by(float_total_cmp);
        OutlierVotes {
            zscore: zscore_vote(baseline, value, self.config.zscore_threshold),
            iqr: iqr_vote(&sorted, value, self.config.iqr_multiplier),
            mad: mad_vote(&sorted, value, self.config.mad_threshold),
        }
    }

    /// Per-index verdicts of all three tests in one forward pass.
    pub fn detect_votes(&self, values: &[f64]) -> Vec<OutlierVotes> {
        (0..values.len())
            .map(|i| self.vote(&values[self.baseline_range(i)], values[i]))
            .collect()
    }

    /// Outlier mask for `series`.
    pub fn detect(&self, series: &TimeSeries) -> OutlierMask {
        OutlierMask::from_votes(&self.detect_votes(series.values()))
    }

    /// Replace each flagged point with the mean of its baseline window.
    ///
    /// Baselines are taken from the raw values, never from already repaired
    /// ones.
    pub fn repair(&self, series: &TimeSeries, mask: &OutlierMask) -> PrepResult<TimeSeries> {
        if mask.len() != series.len() {
            return Err(SeriesPrepError::invalid_input(format!(
                "mask of length {} does not match series of length {}",
                mask.len(),
                series.len()
            )));
        }
        let raw = series.values();
        let repaired = raw
            .iter()
            .enumerate()
            .map(|(i, &value)| {
                if i > 0 && mask.is_flagged(i) {
                    mean(&raw[self.baseline_range(i)])
                } else {
                    value
                }
            })
            .collect();
        series.with_values(repaired)
    }

    /// Detect and repair in one step, keeping series, mask and votes aligned.
    pub fn process_series(&self, series: &TimeSeries) -> PrepResult<CleanedSeries> {
        let votes = self.detect_votes(series.values());
        let mask = OutlierMask::from_votes(&votes);
        let cleaned = self.repair(series, &mask)?;
        debug!(
            "outlier scan: {} of {} points flagged (window={})",
            mask.count(),
            series.len(),
            self.config.window
        );
        Ok(CleanedSeries {
            original: series.clone(),
            cleaned,
            mask,
            votes,
        })
    }

    /// Clean every named series independently.
    pub fn process_batch(
        &self,
        data: &BTreeMap<String, TimeSeries>,
    ) -> PrepResult<BTreeMap<String, CleanedSeries>> {
        #[cfg(feature = "parallel")]
        let cleaned: PrepResult<BTreeMap<String, CleanedSeries>> = {
            use rayon::prelude::*;
            data.par_iter()
                .map(|(name, series)| Ok((name.clone(), self.process_series(series)?)))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let cleaned: PrepResult<BTreeMap<String, CleanedSeries>> = data
            .iter()
            .map(|(name, series)| Ok((name.clone(), self.process_series(series)?)))
            .collect();

        let cleaned = cleaned?;
        for (name, result) in &cleaned {
            info!(
                "{}: {} outliers repaired out of {} points",
                name,
                result.mask().count(),
                result.original().len()
            );
        }
        Ok(cleaned)
    }
}
