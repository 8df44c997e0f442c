//! # Series Prep
//!
//! Cleaning and characterization of historical price series ahead of
//! modeling.
//!
//! This crate takes a universe of daily price series and prepares them in
//! three coupled stages. Each stage is usable on its own, and
//! [`PreparationPipeline`] chains them per ticker.
//!
//! ## Key Features
//!
//! - **Outlier Repair**: causal rolling-window ensemble of z-score, IQR and MAD
//!   tests; a point is an outlier when at least two agree, and is replaced by
//!   the mean of the window before it
//! - **Regime Detection**: penalized optimal partitioning with PELT pruning over
//!   RBF, L2 or L1 segment costs, and slicing into contiguous segments
//! - **Stationarity Search**: one log/difference transform chosen for all
//!   tickers by the spread between KPSS and ADF p-values
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use series_prep::generators::{daily_series, geometric_walk, GeneratorConfig};
//! use series_prep::{InMemorySource, PipelineConfig, PipelineStage, PreparationPipeline};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut source = InMemorySource::new();
//!     for (ticker, seed) in [("AAA", 1), ("BBB", 2)] {
//!         let config = GeneratorConfig { length: 500, seed };
//!         source.insert(ticker, daily_series(geometric_walk(&config, 100.0, 0.0003, 0.015)?)?);
//!     }
//!
//!     let mut pipeline = PreparationPipeline::new(PipelineConfig::default())?;
//!     pipeline.run(&source, &["AAA", "BBB"])?;
//!
//!     if let Some(selection) = pipeline.selection() {
//!         println!("selected {:?} (score {:.3})", selection.config(), selection.score());
//!     }
//!     for (ticker, record) in pipeline.records() {
//!         let cleaned = record.cleaned().map_or(0, |c| c.mask().count());
//!         let transformed = record.series(PipelineStage::Transformed).map_or(0, |s| s.len());
//!         println!("{}: {} outliers repaired, {} transformed points", ticker, cleaned, transformed);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `parallel` (default): per-entity work through rayon
//! - `serde`: serialization of configs, series and results

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;
pub mod linear_algebra;
pub mod math_utils;
pub mod source;
pub mod time_series;

// Preparation stages
pub mod changepoint;
pub mod costs;
pub mod generators;
pub mod outliers;
pub mod pipeline;
pub mod segmentation;
pub mod stationarity;

// Re-exports for convenience - main public API
pub use config::{PipelineConfig, Sensitivity};
pub use errors::{PrepResult, SeriesPrepError};
pub use pipeline::{normalize_to_base, EntityRecord, PipelineStage, PreparationPipeline};
pub use source::{InMemorySource, SeriesSource};
pub use time_series::TimeSeries;

// Outlier exports
pub use outliers::{CleanedSeries, OutlierConfig, OutlierMask, OutlierVotes, RollingOutlierDetector};

// Change-point exports
pub use changepoint::{Breakpoints, ChangePointConfig, ChangePointDetector, PartitionResult};
pub use costs::{CostKind, CostModel, L1Cost, L2Cost, RbfCost};
pub use segmentation::{annotate_breakpoints, segment, split_at, BreakpointAnnotation, Segment};

// Stationarity exports
pub use stationarity::{
    difference, difference_initial_values, integrate_differences, CandidateScore,
    StationarityConfig, StationarityTransformer, TransformConfig, TransformOutput,
    TransformSelection,
};
pub use stationarity_tests::{
    augmented_dickey_fuller, kpss_test, test_stationarity, AdfConfig, KpssConfig, LagCriterion,
    StationarityReport, TestOutcome, TestResult,
};
