//! Cross-entity stationarity transform search.
//!
//! One [`TransformConfig`] is chosen for the whole universe of series: every
//! candidate in the grid `log ∈ {false, true} × diff_order ∈ 0..=max_diff` is
//! applied to each entity, both hypothesis tests are run, and the candidate
//! with the highest `mean(KPSS p) − mean(ADF p)` wins. The winner is returned
//! as an immutable [`TransformSelection`] that the caller passes to
//! [`StationarityTransformer::apply`].

use crate::errors::{PrepResult, SeriesPrepError};
use crate::math_utils::{mean, nan_mean, sample_std};
use crate::stationarity_tests::{test_stationarity, StationarityReport};
use crate::time_series::TimeSeries;
use log::{debug, info, warn};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One point of the transform grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TransformConfig {
    /// Take the natural log first
    pub log_transform: bool,
    /// Number of first differences
    pub diff_order: usize,
}

impl TransformConfig {
    /// Build a config.
    pub fn new(log_transform: bool, diff_order: usize) -> Self {
        Self {
            log_transform,
            diff_order,
        }
    }

    /// Search order: log outer (`false` first), diff order inner.
    pub fn grid(max_diff: usize) -> Vec<Self> {
        [false, true]
            .iter()
            .flat_map(|&log| (0..=max_diff).map(move |d| Self::new(log, d)))
            .collect()
    }
}

/// Transformer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StationarityConfig {
    /// Largest differencing order tried by the search
    pub max_diff: usize,
    /// Standardize with the transformed sample's own mean and std
    pub standardize: bool,
    /// Entities shorter than this after transforming are skipped for a candidate
    pub min_test_length: usize,
}

impl Default for StationarityConfig {
    fn default() -> Self {
        Self {
            max_diff: 2,
            standardize: true,
            min_test_length: 3,
        }
    }
}

impl StationarityConfig {
    /// Check the settings.
    pub fn validate(&self) -> PrepResult<()> {
        if self.min_test_length == 0 {
            return Err(SeriesPrepError::InvalidParameter {
                parameter: "min_test_length".to_string(),
                value: 0.0,
                constraint: ">= 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Aggregate score of one grid point.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CandidateScore {
    /// Evaluated configuration
    pub config: TransformConfig,
    /// NaN-ignoring mean ADF p-value over evaluated entities
    pub mean_adf_pvalue: f64,
    /// NaN-ignoring mean KPSS p-value over evaluated entities
    pub mean_kpss_pvalue: f64,
    /// `mean_kpss_pvalue - mean_adf_pvalue`; NaN when nothing was scored
    pub score: f64,
    /// Entities long enough to be tested
    pub entities_evaluated: usize,
    /// Entities skipped as too short
    pub entities_skipped: usize,
}

impl CandidateScore {
    fn unscored(config: TransformConfig, skipped: usize) -> Self {
        Self {
            config,
            mean_adf_pvalue: f64::NAN,
            mean_kpss_pvalue: f64::NAN,
            score: f64::NAN,
            entities_evaluated: 0,
            entities_skipped: skipped,
        }
    }
}

/// Resolved transform shared by every entity.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TransformSelection {
    config: TransformConfig,
    mean_adf_pvalue: f64,
    mean_kpss_pvalue: f64,
    score: f64,
    candidates: Vec<CandidateScore>,
    overridden: bool,
}

impl TransformSelection {
    /// Winning (or overridden) configuration.
    pub fn config(&self) -> TransformConfig {
        self.config
    }

    /// Mean ADF p-value of the winning candidate.
    pub fn mean_adf_pvalue(&self) -> f64 {
        self.mean_adf_pvalue
    }

    /// Mean KPSS p-value of the winning candidate.
    pub fn mean_kpss_pvalue(&self) -> f64 {
        self.mean_kpss_pvalue
    }

    /// Score of the winning candidate.
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Every grid point in search order.
    pub fn candidates(&self) -> &[CandidateScore] {
        &self.candidates
    }

    /// `true` once [`TransformSelection::with_override`] replaced the winner.
    pub fn is_overridden(&self) -> bool {
        self.overridden
    }

    /// Same search record, different configuration to apply.
    ///
    /// The aggregate p-values and score are taken from the candidate with that
    /// configuration when the search evaluated it, and are NaN otherwise.
    pub fn with_override(&self, config: TransformConfig) -> Self {
        let matching = self.candidates.iter().find(|c| c.config == config);
        Self {
            config,
            mean_adf_pvalue: matching.map_or(f64::NAN, |c| c.mean_adf_pvalue),
            mean_kpss_pvalue: matching.map_or(f64::NAN, |c| c.mean_kpss_pvalue),
            score: matching.map_or(f64::NAN, |c| c.score),
            candidates: self.candidates.clone(),
            overridden: true,
        }
    }
}

/// Result of applying a selection to every entity.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TransformOutput {
    /// Transformed series, timestamps aligned to surviving observations
    pub transformed: BTreeMap<String, TimeSeries>,
    /// Fresh test run per transformed entity (empty unless requested)
    pub reports: BTreeMap<String, StationarityReport>,
    /// Entities the transform left with no observations
    pub insufficient: Vec<String>,
}

/// `values` differenced `order` times; each pass drops the leading value.
pub fn difference(values: &[f64], order: usize) -> Vec<f64> {
    let mut current = values.to_vec();
    for _ in 0..order {
        if current.is_empty() {
            break;
        }
        current = current.windows(2).map(|w| w[1] - w[0]).collect();
    }
    current
}

/// Leading values that `order`-fold differencing discards, one per level:
/// `[x[0], Δx[0], ..., Δ^{order-1} x[0]]`.
pub fn difference_initial_values(values: &[f64], order: usize) -> Vec<f64> {
    let mut initial = Vec::with_capacity(order);
    let mut current = values.to_vec();
    for _ in 0..order {
        match current.first() {
            Some(&first) => initial.push(first),
            None => break,
        }
        current = current.windows(2).map(|w| w[1] - w[0]).collect();
    }
    initial
}

/// Invert `initial_values.len()`-fold differencing.
///
/// Each level re-inserts its dropped initial value and takes a cumulative
/// sum, innermost level first.
pub fn integrate_differences(diffs: &[f64], initial_values: &[f64]) -> Vec<f64> {
    let mut current = diffs.to_vec();
    for &start in initial_values.iter().rev() {
        let mut level = Vec::with_capacity(current.len() + 1);
        let mut acc = start;
        level.push(acc);
        for d in &current {
            acc += d;
            level.push(acc);
        }
        current = level;
    }
    current
}

/// Grid search and application of stationarity transforms.
#[derive(Debug, Clone, Default)]
pub struct StationarityTransformer {
    config: StationarityConfig,
}

impl StationarityTransformer {
    /// Create a transformer.
    pub fn new(config: StationarityConfig) -> PrepResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Current settings.
    pub fn config(&self) -> &StationarityConfig {
        &self.config
    }

    /// Transform raw values.
    ///
    /// Log requires strictly positive input. Standardizing with an undefined
    /// or zero standard deviation leaves every value undefined, so the result
    /// is empty.
    pub fn transform_values(&self, values: &[f64], transform: &TransformConfig) -> PrepResult<Vec<f64>> {
        let mut current = if transform.log_transform {
            if let Some((i, v)) = values.iter().enumerate().find(|(_, v)| !(**v > 0.0)) {
                return Err(SeriesPrepError::invalid_input(format!(
                    "log transform needs strictly positive values; found {} at index {}",
                    v, i
                )));
            }
            values.iter().map(|v| v.ln()).collect()
        } else {
            values.to_vec()
        };

        current = difference(&current, transform.diff_order);

        if self.config.standardize {
            let center = mean(&current);
            current = match sample_std(&current) {
                Some(std) if std > 0.0 => current.iter().map(|v| (v - center) / std).collect(),
                _ => Vec::new(),
            };
        }

        let first_defined = current.iter().position(|v| v.is_finite()).unwrap_or(current.len());
        Ok(current.split_off(first_defined))
    }

    /// Transform a series, keeping the timestamps of surviving observations.
    pub fn transform_series(&self, series: &TimeSeries, transform: &TransformConfig) -> PrepResult<TimeSeries> {
        let values = self.transform_values(series.values(), transform)?;
        if values.is_empty() {
            return Err(SeriesPrepError::InsufficientData {
                required: transform.diff_order + 1,
                actual: series.len(),
            });
        }
        series.with_trailing_values(values)
    }

    /// Test one entity under one candidate; `None` when skipped as too short.
    fn evaluate_entity(&self, values: &[f64], transform: &TransformConfig) -> PrepResult<Option<(f64, f64)>> {
        let transformed = self.transform_values(values, transform)?;
        if transformed.len() < self.config.min_test_length {
            return Ok(None);
        }
        let report = test_stationarity(&transformed);
        Ok(Some((report.adf_pvalue(), report.kpss_pvalue())))
    }

    /// Score one grid point across all entities.
    pub fn evaluate_candidate(
        &self,
        data: &BTreeMap<String, TimeSeries>,
        transform: TransformConfig,
    ) -> CandidateScore {
        if transform.log_transform {
            if let Some(name) = data
                .iter()
                .find(|(_, s)| s.values().iter().any(|&v| !(v > 0.0)))
                .map(|(name, _)| name)
            {
                warn!(
                    "{:?} not applicable: {} has non-positive values",
                    transform, name
                );
                return CandidateScore::unscored(transform, data.len());
            }
        }

        #[cfg(feature = "parallel")]
        let outcomes: Vec<PrepResult<Option<(f64, f64)>>> = {
            use rayon::prelude::*;
            data.par_iter()
                .map(|(_, series)| self.evaluate_entity(series.values(), &transform))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<PrepResult<Option<(f64, f64)>>> = data
            .iter()
            .map(|(_, series)| self.evaluate_entity(series.values(), &transform))
            .collect();

        let mut adf = Vec::with_capacity(outcomes.len());
        let mut kpss = Vec::with_capacity(outcomes.len());
        let mut skipped = 0;
        for ((name, _), outcome) in data.iter().zip(outcomes) {
            match outcome {
                Ok(Some((adf_p, kpss_p))) => {
                    adf.push(adf_p);
                    kpss.push(kpss_p);
                }
                Ok(None) => {
                    debug!("{}: too short under {:?}, skipped", name, transform);
                    skipped += 1;
                }
                Err(e) => {
                    warn!("{}: {:?} failed: {}", name, transform, e);
                    skipped += 1;
                }
            }
        }

        let mean_adf_pvalue = nan_mean(&adf);
        let mean_kpss_pvalue = nan_mean(&kpss);
        let candidate = CandidateScore {
            config: transform,
            mean_adf_pvalue,
            mean_kpss_pvalue,
            score: mean_kpss_pvalue - mean_adf_pvalue,
            entities_evaluated: adf.len(),
            entities_skipped: skipped,
        };
        debug!(
            "{:?}: adf={:.4} kpss={:.4} score={:.4} ({} evaluated, {} skipped)",
            transform,
            candidate.mean_adf_pvalue,
            candidate.mean_kpss_pvalue,
            candidate.score,
            candidate.entities_evaluated,
            candidate.entities_skipped
        );
        candidate
    }

    /// Pick the transform that best drives every entity toward stationarity.
    ///
    /// NaN scores never win; among equal scores the first in search order does.
    pub fn find_best_transformation(
        &self,
        data: &BTreeMap<String, TimeSeries>,
    ) -> PrepResult<TransformSelection> {
        if data.is_empty() {
            return Err(SeriesPrepError::invalid_input("no series to search over"));
        }

        let candidates: Vec<CandidateScore> = TransformConfig::grid(self.config.max_diff)
            .into_iter()
            .map(|transform| self.evaluate_candidate(data, transform))
            .collect();

        let mut best: Option<&CandidateScore> = None;
        for candidate in &candidates {
            if candidate.score.is_nan() {
                continue;
            }
            match best {
                Some(current) if !(candidate.score > current.score) => {}
                _ => best = Some(candidate),
            }
        }

        let best = best.ok_or_else(|| SeriesPrepError::InsufficientData {
            required: self.config.min_test_length,
            actual: data.values().map(TimeSeries::len).max().unwrap_or(0),
        })?;
        info!(
            "selected log_transform={} diff_order={} (score {:.4}, mean ADF p {:.4}, mean KPSS p {:.4})",
            best.config.log_transform,
            best.config.diff_order,
            best.score,
            best.mean_adf_pvalue,
            best.mean_kpss_pvalue
        );

        Ok(TransformSelection {
            config: best.config,
            mean_adf_pvalue: best.mean_adf_pvalue,
            mean_kpss_pvalue: best.mean_kpss_pvalue,
            score: best.score,
            candidates: candidates.clone(),
            overridden: false,
        })
    }

    /// Transform every entity with `selection` and optionally re-test each.
    ///
    /// The tests are always run afresh on the applied output.
    pub fn apply(
        &self,
        selection: &TransformSelection,
        data: &BTreeMap<String, TimeSeries>,
        run_tests: bool,
    ) -> PrepResult<TransformOutput> {
        let transform = selection.config();
        let mut output = TransformOutput::default();
        for (name, series) in data {
            match self.transform_series(series, &transform) {
                Ok(transformed) => {
                    if run_tests {
                        output
                            .reports
                            .insert(name.clone(), test_stationarity(transformed.values()));
                    }
                    output.transformed.insert(name.clone(), transformed);
                }
                Err(SeriesPrepError::InsufficientData { .. }) => {
                    warn!("{}: nothing left after {:?}", name, transform);
                    output.insufficient.push(name.clone());
                }
                Err(e) => return Err(e),
            }
        }
        info!(
            "applied {:?} to {} series ({} left empty)",
            transform,
            output.transformed.len(),
            output.insufficient.len()
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::{daily_series, geometric_walk, random_walk, white_noise, GeneratorConfig};
    use assert_approx_eq::assert_approx_eq;

    fn raw_transformer() -> StationarityTransformer {
        StationarityTransformer::new(StationarityConfig {
            standardize: false,
            ..StationarityConfig::default()
        })
        .unwrap()
    }

    fn walk_universe(count: u64, length: usize) -> BTreeMap<String, TimeSeries> {
        (0..count)
            .map(|seed| {
                let values = random_walk(&GeneratorConfig { length, seed }, 500.0, 1.0).unwrap();
                (format!("W{}", seed), daily_series(values).unwrap())
            })
            .collect()
    }

    #[test]
    fn test_grid_order() {
        let grid = TransformConfig::grid(1);
        assert_eq!(
            grid,
            vec![
                TransformConfig::new(false, 0),
                TransformConfig::new(false, 1),
                TransformConfig::new(true, 0),
                TransformConfig::new(true, 1),
            ]
        );
    }

    #[test]
    fn test_differencing_drops_leading_points() {
        let values = vec![1.0, 4.0, 9.0, 16.0, 25.0, 36.0];
        let t = raw_transformer();
        for d in 0..=3 {
            let out = t.transform_values(&values, &TransformConfig::new(false, d)).unwrap();
            assert_eq!(out.len(), values.len() - d);
        }
        assert_eq!(
            t.transform_values(&values, &TransformConfig::new(false, 2)).unwrap(),
            vec![2.0; 4]
        );
    }

    #[test]
    fn test_integrate_inverts_difference() {
        let values = vec![3.0, -1.5, 2.25, 8.0, 7.5, 0.0, 11.0];
        for d in 0..=3 {
            let diffs = difference(&values, d);
            let initial = difference_initial_values(&values, d);
            assert_eq!(initial.len(), d);
            let rebuilt = integrate_differences(&diffs, &initial);
            assert_eq!(rebuilt.len(), values.len());
            for (a, b) in rebuilt.iter().zip(&values) {
                assert_approx_eq!(a, b, 1e-12);
            }
        }
    }

    #[test]
    fn test_log_requires_positive_values() {
        let t = StationarityTransformer::default();
        let result = t.transform_values(&[1.0, 0.0, 2.0], &TransformConfig::new(true, 0));
        assert!(matches!(result, Err(SeriesPrepError::InvalidInput { .. })));
    }

    #[test]
    fn test_log_then_difference() {
        let t = raw_transformer();
        let out = t
            .transform_values(&[1.0, std::f64::consts::E, 1.0], &TransformConfig::new(true, 1))
            .unwrap();
        assert_approx_eq!(out[0], 1.0, 1e-12);
        assert_approx_eq!(out[1], -1.0, 1e-12);
    }

    #[test]
    fn test_standardize() {
        let t = StationarityTransformer::default();
        let out = t.transform_values(&[1.0, 2.0, 3.0], &TransformConfig::new(false, 0)).unwrap();
        assert_approx_eq!(out[0], -1.0, 1e-12);
        assert_approx_eq!(out[1], 0.0, 1e-12);
        assert_approx_eq!(out[2], 1.0, 1e-12);

        // Zero spread leaves nothing defined.
        let flat = t.transform_values(&[2.0, 4.0, 6.0, 8.0], &TransformConfig::new(false, 1)).unwrap();
        assert!(flat.is_empty());
    }

    #[test]
    fn test_transform_series_keeps_trailing_timestamps() {
        let series = daily_series(vec![10.0, 11.0, 13.0, 12.0, 15.0]).unwrap();
        let out = raw_transformer()
            .transform_series(&series, &TransformConfig::new(false, 2))
            .unwrap();
        assert_eq!(out.values(), &[1.0, -3.0, 4.0]);
        assert_eq!(out.timestamps(), &series.timestamps()[2..]);

        let tiny = daily_series(vec![10.0]).unwrap();
        assert!(matches!(
            raw_transformer().transform_series(&tiny, &TransformConfig::new(false, 1)),
            Err(SeriesPrepError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_search_on_random_walks_differences() {
        let data = walk_universe(4, 300);
        let selection = StationarityTransformer::default().find_best_transformation(&data).unwrap();
        assert!(selection.config().diff_order >= 1);
        assert!(selection.config().diff_order <= 2);
        assert_eq!(selection.candidates().len(), 6);
        assert!(!selection.is_overridden());
        let winner = selection
            .candidates()
            .iter()
            .find(|c| c.config == selection.config())
            .unwrap();
        assert_eq!(winner.score, selection.score());
        assert!(selection
            .candidates()
            .iter()
            .all(|c| c.score.is_nan() || c.score <= selection.score()));
    }

    #[test]
    fn test_search_skips_short_entities() {
        let mut data = walk_universe(2, 120);
        data.insert("SHORT".to_string(), daily_series(vec![5.0, 6.0, 5.5]).unwrap());
        let t = StationarityTransformer::default();
        let candidate = t.evaluate_candidate(&data, TransformConfig::new(false, 1));
        assert_eq!(candidate.entities_evaluated, 2);
        assert_eq!(candidate.entities_skipped, 1);
        assert!(t.find_best_transformation(&data).is_ok());
    }

    #[test]
    fn test_log_candidates_unscored_for_non_positive_entities() {
        let config = GeneratorConfig { length: 150, seed: 21 };
        let mut data = BTreeMap::new();
        data.insert("NOISE".to_string(), daily_series(white_noise(&config, 1.0).unwrap()).unwrap());
        let t = StationarityTransformer::default();
        let selection = t.find_best_transformation(&data).unwrap();
        assert!(!selection.config().log_transform);
        assert!(selection
            .candidates()
            .iter()
            .filter(|c| c.config.log_transform)
            .all(|c| c.score.is_nan()));
    }

    #[test]
    fn test_no_scored_candidate_is_insufficient_data() {
        let mut data = BTreeMap::new();
        data.insert("A".to_string(), daily_series(vec![1.0, 2.0]).unwrap());
        let result = StationarityTransformer::default().find_best_transformation(&data);
        assert!(matches!(result, Err(SeriesPrepError::InsufficientData { .. })));
        let empty = BTreeMap::new();
        assert!(matches!(
            StationarityTransformer::default().find_best_transformation(&empty),
            Err(SeriesPrepError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_apply_runs_fresh_tests_with_override() {
        let config = GeneratorConfig { length: 200, seed: 8 };
        let mut data = BTreeMap::new();
        data.insert(
            "GEO".to_string(),
            daily_series(geometric_walk(&config, 100.0, 0.0005, 0.02).unwrap()).unwrap(),
        );
        data.insert("TINY".to_string(), daily_series(vec![1.0, 2.0]).unwrap());
        let t = StationarityTransformer::default();
        let selection = t.find_best_transformation(&data).unwrap();
        let forced = selection.with_override(TransformConfig::new(true, 2));
        assert!(forced.is_overridden());
        assert_eq!(forced.candidates().len(), selection.candidates().len());
        assert_eq!(forced.config(), TransformConfig::new(true, 2));

        let output = t.apply(&forced, &data, true).unwrap();
        assert_eq!(output.transformed["GEO"].len(), 198);
        assert!(output.reports.contains_key("GEO"));
        assert_eq!(output.insufficient, vec!["TINY".to_string()]);

        let untested = t.apply(&selection, &data, false).unwrap();
        assert!(untested.reports.is_empty());
    }
}
