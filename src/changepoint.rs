//! Penalized optimal partitioning with PELT pruning.
//!
//! The detector returns the breakpoints minimizing
//!
//! ```text
//! sum over segments of cost(segment) + penalty * (#breakpoints)
//! ```
//!
//! over all partitions whose segments hold at least `min_size` points and
//! whose interior boundaries fall on multiples of `jump`. The search is exact
//! optimal partitioning; a start candidate `tau` is discarded for good once
//! `F(tau) + cost(tau, t) > F(t)`. Pruning needs every later target to be at
//! least `min_size` past `t`, so it is only enabled when `jump >= min_size`,
//! and grid points within `min_size` of the end are never targets.

use crate::costs::{CostKind, CostModel, L1Cost, L2Cost, RbfCost};
use crate::errors::{validate_parameter, PrepResult, SeriesPrepError};
use crate::segmentation::{annotate_breakpoints, split_at, BreakpointAnnotation, Segment};
use crate::time_series::TimeSeries;
use log::{debug, info};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for [`ChangePointDetector`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChangePointConfig {
    /// Within-segment cost model
    pub cost: CostKind,
    /// Cost added per breakpoint
    pub penalty: f64,
    /// Minimum segment length
    pub min_size: usize,
    /// Breakpoints are restricted to multiples of this stride
    pub jump: usize,
}

impl Default for ChangePointConfig {
    fn default() -> Self {
        Self {
            cost: CostKind::default(),
            penalty: 10.0,
            min_size: 2,
            jump: 5,
        }
    }
}

impl ChangePointConfig {
    /// Check penalty, minimum size and stride.
    pub fn validate(&self) -> PrepResult<()> {
        if !self.penalty.is_finite() || self.penalty <= 0.0 {
            return Err(SeriesPrepError::InvalidParameter {
                parameter: "penalty".to_string(),
                value: self.penalty,
                constraint: "finite and > 0".to_string(),
            });
        }
        if self.min_size == 0 {
            return Err(SeriesPrepError::InvalidParameter {
                parameter: "min_size".to_string(),
                value: 0.0,
                constraint: ">= 1".to_string(),
            });
        }
        if self.jump == 0 {
            return Err(SeriesPrepError::InvalidParameter {
                parameter: "jump".to_string(),
                value: 0.0,
                constraint: ">= 1".to_string(),
            });
        }
        if let CostKind::Rbf { gamma: Some(gamma) } = self.cost {
            validate_parameter(gamma, f64::MIN_POSITIVE, f64::MAX, "gamma")?;
        }
        Ok(())
    }
}

/// Strictly increasing breakpoint indices inside `(0, series_len)`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawBreakpoints"))]
pub struct Breakpoints {
    indices: Vec<usize>,
    series_len: usize,
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawBreakpoints {
    indices: Vec<usize>,
    series_len: usize,
}

#[cfg(feature = "serde")]
impl TryFrom<RawBreakpoints> for Breakpoints {
    type Error = SeriesPrepError;

    fn try_from(raw: RawBreakpoints) -> PrepResult<Self> {
        Self::new(raw.indices, raw.series_len)
    }
}

impl Breakpoints {
    /// Validate `indices` against a series of length `series_len`.
    pub fn new(indices: Vec<usize>, series_len: usize) -> PrepResult<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i == 0 || i >= series_len) {
            return Err(SeriesPrepError::invalid_input(format!(
                "breakpoint {} outside (0, {})",
                bad, series_len
            )));
        }
        if indices.windows(2).any(|w| w[1] <= w[0]) {
            return Err(SeriesPrepError::invalid_input(
                "breakpoints must be strictly increasing",
            ));
        }
        Ok(Self {
            indices,
            series_len,
        })
    }

    /// No breakpoints: the whole series is one regime.
    pub fn none(series_len: usize) -> Self {
        Self {
            indices: Vec::new(),
            series_len,
        }
    }

    /// Breakpoint indices.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Length of the series these breakpoints belong to.
    pub fn series_len(&self) -> usize {
        self.series_len
    }

    /// Number of breakpoints.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether there are no breakpoints.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of regimes, `len() + 1`.
    pub fn segment_count(&self) -> usize {
        self.indices.len() + 1
    }
}

/// Search output including the optimal objective value.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionResult {
    /// Optimal breakpoints
    pub breakpoints: Breakpoints,
    /// Minimized `sum(cost) + penalty * #breakpoints`
    pub objective: f64,
    /// Segment cost evaluations performed
    pub cost_evals: usize,
    /// Start candidates removed by pruning
    pub candidates_pruned: usize,
}

/// Penalized change-point detector.
#[derive(Debug, Clone, Default)]
pub struct ChangePointDetector {
    config: ChangePointConfig,
}

impl ChangePointDetector {
    /// Create a detector after validating `config`.
    pub fn new(config: ChangePointConfig) -> PrepResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Active configuration.
    pub fn config(&self) -> &ChangePointConfig {
        &self.config
    }

    /// Optimal partition of raw values.
    pub fn partition(&self, values: &[f64]) -> PrepResult<PartitionResult> {
        match self.config.cost {
            CostKind::Rbf { gamma } => self.partition_with(&RbfCost { gamma }, values),
            CostKind::L2 => self.partition_with(&L2Cost, values),
            CostKind::L1 => self.partition_with(&L1Cost, values),
        }
    }

    /// Optimal partition using an explicit cost model.
    pub fn partition_with<C: CostModel>(&self, model: &C, values: &[f64]) -> PrepResult<PartitionResult> {
        if values.is_empty() {
            return Err(SeriesPrepError::invalid_input("cannot partition an empty series"));
        }
        let n = values.len();
        let min_size = self.config.min_size;
        let jump = self.config.jump;
        let beta = self.config.penalty;

        if n < 2 * min_size {
            debug!(
                "{} points cannot hold two segments of {}; single regime",
                n, min_size
            );
            return Ok(PartitionResult {
                breakpoints: Breakpoints::none(n),
                objective: f64::NAN,
                cost_evals: 0,
                candidates_pruned: 0,
            });
        }

        let cache = model.precompute(values)?;

        // A grid point closer than `min_size` to the end cannot start the last
        // segment, so it is neither a breakpoint nor a valid pruning target.
        let mut targets: Vec<usize> = (0..n)
            .step_by(jump)
            .filter(|&k| k >= min_size && n - k >= min_size)
            .collect();
        targets.push(n);

        let mut f = vec![f64::INFINITY; n + 1];
        let mut last_cp = vec![usize::MAX; n + 1];
        f[0] = -beta;
        last_cp[0] = 0;

        let prune = jump >= min_size;
        let mut admissible: Vec<usize> = Vec::new();
        let mut cost_evals = 0usize;
        let mut candidates_pruned = 0usize;
        let mut next_start = 0usize;

        for &t in &targets {
            while next_start + min_size <= t {
                admissible.push(next_start);
                next_start += jump;
            }

            let mut scored: Vec<Option<f64>> = vec![None; admissible.len()];
            let mut best_cost = f64::INFINITY;
            let mut best_tau = usize::MAX;

            for (idx, &tau) in admissible.iter().enumerate() {
                if t <= tau || t - tau < min_size || !f[tau].is_finite() {
                    continue;
                }
                let segment_cost = model.segment_cost(&cache, tau, t);
                cost_evals += 1;
                if !segment_cost.is_finite() {
                    return Err(SeriesPrepError::numerical(
                        format!("non-finite {} cost on [{}, {})", model.name(), tau, t),
                        "changepoint_partition",
                    ));
                }
                let score = f[tau] + segment_cost;
                scored[idx] = Some(score);
                if score + beta < best_cost {
                    best_cost = score + beta;
                    best_tau = tau;
                }
            }

            if best_tau == usize::MAX {
                continue;
            }
            f[t] = best_cost;
            last_cp[t] = best_tau;
            if !prune {
                continue;
            }

            let before = admissible.len();
            admissible = admissible
                .iter()
                .zip(&scored)
                .filter(|(_, score)| score.map_or(true, |s| s <= best_cost))
                .map(|(&tau, _)| tau)
                .collect();
            candidates_pruned += before - admissible.len();
        }

        if !f[n].is_finite() {
            return Err(SeriesPrepError::numerical(
                "no feasible segmentation reached the end of the series",
                "changepoint_partition",
            ));
        }

        let mut indices = Vec::new();
        let mut cursor = n;
        while cursor > 0 {
            let tau = last_cp[cursor];
            if tau == usize::MAX || tau >= cursor {
                return Err(SeriesPrepError::numerical(
                    format!("broken backtrack state at {}", cursor),
                    "changepoint_partition",
                ));
            }
            if tau > 0 {
                indices.push(tau);
            }
            cursor = tau;
        }
        indices.reverse();

        Ok(PartitionResult {
            breakpoints: Breakpoints::new(indices, n)?,
            objective: f[n],
            cost_evals,
            candidates_pruned,
        })
    }

    /// Breakpoints of `series`.
    pub fn detect(&self, series: &TimeSeries) -> PrepResult<Breakpoints> {
        let result = self.partition(series.values())?;
        debug!(
            "{} breakpoints, {} cost evaluations, {} candidates pruned",
            result.breakpoints.len(),
            result.cost_evals,
            result.candidates_pruned
        );
        Ok(result.breakpoints)
    }

    /// Series with aligned breakpoint flags.
    pub fn annotate(&self, series: &TimeSeries) -> PrepResult<BreakpointAnnotation> {
        let breakpoints = self.detect(series)?;
        annotate_breakpoints(series, breakpoints)
    }

    /// Detect breakpoints and slice the series into regimes.
    pub fn detect_and_segment(&self, series: &TimeSeries) -> PrepResult<(Breakpoints, Vec<Segment>)> {
        let breakpoints = self.detect(series)?;
        let segments = split_at(series, breakpoints.indices());
        Ok((breakpoints, segments))
    }

    /// Breakpoints for every named series, computed independently.
    pub fn process_batch(
        &self,
        data: &BTreeMap<String, TimeSeries>,
    ) -> PrepResult<BTreeMap<String, Breakpoints>> {
        #[cfg(feature = "parallel")]
        let detected: PrepResult<BTreeMap<String, Breakpoints>> = {
            use rayon::prelude::*;
            data.par_iter()
                .map(|(name, series)| Ok((name.clone(), self.detect(series)?)))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let detected: PrepResult<BTreeMap<String, Breakpoints>> = data
            .iter()
            .map(|(name, series)| Ok((name.clone(), self.detect(series)?)))
            .collect();

        let detected = detected?;
        for (name, breakpoints) in &detected {
            info!("{}: breakpoints at {:?}", name, breakpoints.indices());
        }
        Ok(detected)
    }
}
