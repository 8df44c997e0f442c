//! Segment cost models for penalized change-point search.
//!
//! Segment conventions use half-open intervals `[start, end)`. Each model
//! precomputes a cache once per series so that a segment cost query during
//! the search is cheap.

use crate::errors::{PrepResult, SeriesPrepError};
use crate::math_utils::{float_total_cmp, median};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A within-segment cost that the optimal partitioning search minimizes.
pub trait CostModel: Send + Sync {
    /// Per-series precomputation.
    type Cache;

    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Build the cache for `values`.
    fn precompute(&self, values: &[f64]) -> PrepResult<Self::Cache>;

    /// Cost of the segment `[start, end)`; callers guarantee `start < end <= n`.
    fn segment_cost(&self, cache: &Self::Cache, start: usize, end: usize) -> f64;
}

/// Cost model selection for [`crate::changepoint::ChangePointConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CostKind {
    /// Gaussian-kernel deviation; `gamma = None` uses the median heuristic.
    Rbf {
        /// Kernel bandwidth parameter
        gamma: Option<f64>,
    },
    /// Squared deviation from the segment mean.
    L2,
    /// Absolute deviation from the segment median.
    L1,
}

impl Default for CostKind {
    fn default() -> Self {
        Self::Rbf { gamma: None }
    }
}

/// Gaussian (RBF) kernel cost.
///
/// With `k(x, y) = exp(-gamma * (x - y)^2)` the cost of a segment `S` is
/// `sum_{i in S} k(x_i, x_i) - (1 / |S|) * sum_{i, j in S} k(x_i, x_j)`, the
/// within-segment scatter in the kernel feature space. It reacts to changes
/// in the whole distribution, not only in the mean.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RbfCost {
    /// Fixed bandwidth; `None` resolves `1 / median(pairwise squared distances)`.
    pub gamma: Option<f64>,
}

/// Cumulative Gram matrix for O(1) block sums.
#[derive(Debug, Clone)]
pub struct RbfCache {
    prefix: Vec<f64>,
    n: usize,
    gamma: f64,
}

impl RbfCache {
    /// Bandwidth actually used.
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    fn block_sum(&self, start: usize, end: usize) -> f64 {
        let w = self.n + 1;
        self.prefix[end * w + end] - self.prefix[start * w + end] - self.prefix[end * w + start]
            + self.prefix[start * w + start]
    }
}

/// Median of all pairwise squared distances, zero distances included.
fn median_pairwise_sq_distance(values: &[f64]) -> f64 {
    let n = values.len();
    let mut distances = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for left in 0..n {
        for right in left + 1..n {
            let delta = values[left] - values[right];
            distances.push(delta * delta);
        }
    }
    if distances.is_empty() {
        return 0.0;
    }

    let mid = distances.len() / 2;
    let (_, upper, _) = distances.select_nth_unstable_by(mid, float_total_cmp);
    let upper = *upper;
    if distances.len() % 2 == 1 {
        upper
    } else {
        let lower = distances[..mid]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        0.5 * (lower + upper)
    }
}

impl CostModel for RbfCost {
    type Cache = RbfCache;

    fn name(&self) -> &'static str {
        "rbf"
    }

    fn precompute(&self, values: &[f64]) -> PrepResult<RbfCache> {
        let gamma = match self.gamma {
            Some(gamma) if gamma.is_finite() && gamma > 0.0 => gamma,
            Some(gamma) => {
                return Err(SeriesPrepError::InvalidParameter {
                    parameter: "gamma".to_string(),
                    value: gamma,
                    constraint: "finite and > 0".to_string(),
                })
            }
            None => {
                let med = median_pairwise_sq_distance(values);
                if med > 0.0 {
                    1.0 / med
                } else {
                    1.0
                }
            }
        };

        let n = values.len();
        let w = n + 1;
        let mut prefix = vec![0.0; w * w];
        for row in 0..n {
            for col in 0..n {
                let delta = values[row] - values[col];
                let k = (-gamma * delta * delta).exp();
                prefix[(row + 1) * w + col + 1] =
                    k + prefix[row * w + col + 1] + prefix[(row + 1) * w + col] - prefix[row * w + col];
            }
        }

        Ok(RbfCache { prefix, n, gamma })
    }

    fn segment_cost(&self, cache: &RbfCache, start: usize, end: usize) -> f64 {
        let len = (end - start) as f64;
        // Diagonal of the Gaussian kernel is identically one.
        let cost = len - cache.block_sum(start, end) / len;
        if cost < 0.0 && cost > -1e-9 {
            0.0
        } else {
            cost
        }
    }
}

/// Squared-error cost around the segment mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct L2Cost;

/// Prefix sums of values and squared values.
#[derive(Debug, Clone)]
pub struct L2Cache {
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl CostModel for L2Cost {
    type Cache = L2Cache;

    fn name(&self) -> &'static str {
        "l2"
    }

    fn precompute(&self, values: &[f64]) -> PrepResult<L2Cache> {
        let mut sum = Vec::with_capacity(values.len() + 1);
        let mut sum_sq = Vec::with_capacity(values.len() + 1);
        sum.push(0.0);
        sum_sq.push(0.0);
        for (i, &v) in values.iter().enumerate() {
            sum.push(sum[i] + v);
            sum_sq.push(sum_sq[i] + v * v);
        }
        Ok(L2Cache { sum, sum_sq })
    }

    fn segment_cost(&self, cache: &L2Cache, start: usize, end: usize) -> f64 {
        let len = (end - start) as f64;
        let s = cache.sum[end] - cache.sum[start];
        let sq = cache.sum_sq[end] - cache.sum_sq[start];
        (sq - s * s / len).max(0.0)
    }
}

/// Absolute-error cost around the segment median.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct L1Cost;

impl CostModel for L1Cost {
    type Cache = Vec<f64>;

    fn name(&self) -> &'static str {
        "l1"
    }

    fn precompute(&self, values: &[f64]) -> PrepResult<Vec<f64>> {
        Ok(values.to_vec())
    }

    fn segment_cost(&self, cache: &Vec<f64>, start: usize, end: usize) -> f64 {
        let segment = &cache[start..end];
        let med = median(segment);
        segment.iter().map(|v| (v - med).abs()).sum()
    }
}
