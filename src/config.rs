//! # Pipeline Configuration
//!
//! Aggregates the settings of every preparation stage and offers presets for
//! common sensitivity levels.

use crate::changepoint::ChangePointConfig;
use crate::costs::CostKind;
use crate::errors::PrepResult;
use crate::outliers::OutlierConfig;
use crate::stationarity::StationarityConfig;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Settings for a full [`crate::pipeline::PreparationPipeline`] run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PipelineConfig {
    /// Rebase every series to 100 at its first observation before cleaning
    pub normalize: bool,
    /// Outlier detection and repair
    pub outlier: OutlierConfig,
    /// Change-point detection
    pub changepoint: ChangePointConfig,
    /// Transform search
    pub stationarity: StationarityConfig,
    /// Re-test every entity after applying the selected transform
    pub run_tests: bool,
}

/// Sensitivity presets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Sensitivity {
    /// Fewer flags and breakpoints
    Conservative,
    /// Defaults
    Standard,
    /// More flags and breakpoints
    Sensitive,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl PipelineConfig {
    /// Default thresholds for every stage.
    pub fn standard() -> Self {
        Self {
            normalize: true,
            outlier: OutlierConfig::default(),
            changepoint: ChangePointConfig::default(),
            stationarity: StationarityConfig::default(),
            run_tests: true,
        }
    }

    /// Wider outlier fences and a heavier breakpoint penalty.
    pub fn conservative() -> Self {
        Self {
            outlier: OutlierConfig {
                window: 20,
                zscore_threshold: 5.0,
                iqr_multiplier: 3.0,
                mad_threshold: 6.0,
            },
            changepoint: ChangePointConfig {
                penalty: 25.0,
                min_size: 10,
                ..ChangePointConfig::default()
            },
            ..Self::standard()
        }
    }

    /// Tighter outlier fences and a lighter breakpoint penalty.
    pub fn sensitive() -> Self {
        Self {
            outlier: OutlierConfig {
                window: 10,
                zscore_threshold: 3.0,
                iqr_multiplier: 1.5,
                mad_threshold: 3.0,
            },
            changepoint: ChangePointConfig {
                cost: CostKind::default(),
                penalty: 3.0,
                min_size: 2,
                jump: 1,
            },
            ..Self::standard()
        }
    }

    /// Preset for a sensitivity level.
    pub fn for_sensitivity(sensitivity: Sensitivity) -> Self {
        match sensitivity {
            Sensitivity::Conservative => Self::conservative(),
            Sensitivity::Standard => Self::standard(),
            Sensitivity::Sensitive => Self::sensitive(),
        }
    }

    /// Validate every stage.
    pub fn validate(&self) -> PrepResult<()> {
        self.outlier.validate()?;
        self.changepoint.validate()?;
        self.stationarity.validate()
    }
}
