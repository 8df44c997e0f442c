//! End-to-end preparation of a universe of price series.
//!
//! A [`PreparationPipeline`] keeps one [`EntityRecord`] per ticker and fills it
//! stage by stage:
//!
//! 1. `load`: raw closes from a [`SeriesSource`]
//! 2. `normalize`: rebase to 100 at the first observation
//! 3. `clean`: rolling ensemble outlier repair
//! 4. `detect_regimes`: breakpoints and segments of the cleaned series
//! 5. `search_transform`: one stationarity transform for all tickers
//! 6. `apply_transform`: transform every ticker, optionally re-testing it
//!
//! Stages that depend on an earlier one fail with
//! [`SeriesPrepError::StateError`] when it has not run.

use crate::changepoint::{Breakpoints, ChangePointDetector};
use crate::config::PipelineConfig;
use crate::errors::{PrepResult, SeriesPrepError};
use crate::outliers::{CleanedSeries, RollingOutlierDetector};
use crate::segmentation::{split_at, Segment};
use crate::source::SeriesSource;
use crate::stationarity::{StationarityTransformer, TransformConfig, TransformSelection};
use crate::stationarity_tests::StationarityReport;
use crate::time_series::TimeSeries;
use log::{info, warn};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Base value of a normalized series.
pub const NORMALIZATION_BASE: f64 = 100.0;

/// Stage whose series an [`EntityRecord`] can hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PipelineStage {
    /// As loaded from the source
    Raw,
    /// Rebased to [`NORMALIZATION_BASE`]
    Normalized,
    /// Outliers repaired
    Cleaned,
    /// Stationarity transform applied
    Transformed,
}

/// Everything the pipeline knows about one ticker.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct EntityRecord {
    raw: TimeSeries,
    normalized: Option<TimeSeries>,
    cleaned: Option<CleanedSeries>,
    breakpoints: Option<Breakpoints>,
    segments: Option<Vec<Segment>>,
    transformed: Option<TimeSeries>,
    report: Option<StationarityReport>,
}

impl EntityRecord {
    /// Record holding only the raw series.
    pub fn new(raw: TimeSeries) -> Self {
        Self {
            raw,
            normalized: None,
            cleaned: None,
            breakpoints: None,
            segments: None,
            transformed: None,
            report: None,
        }
    }

    /// Series at `stage`, if that stage has run.
    pub fn series(&self, stage: PipelineStage) -> Option<&TimeSeries> {
        match stage {
            PipelineStage::Raw => Some(&self.raw),
            PipelineStage::Normalized => self.normalized.as_ref(),
            PipelineStage::Cleaned => self.cleaned.as_ref().map(CleanedSeries::cleaned),
            PipelineStage::Transformed => self.transformed.as_ref(),
        }
    }

    /// Input to cleaning: normalized when available, raw otherwise.
    fn cleaning_input(&self) -> &TimeSeries {
        self.normalized.as_ref().unwrap_or(&self.raw)
    }

    /// Raw series.
    pub fn raw(&self) -> &TimeSeries {
        &self.raw
    }

    /// Outlier cleaning result.
    pub fn cleaned(&self) -> Option<&CleanedSeries> {
        self.cleaned.as_ref()
    }

    /// Breakpoints of the cleaned series.
    pub fn breakpoints(&self) -> Option<&Breakpoints> {
        self.breakpoints.as_ref()
    }

    /// Regimes of the cleaned series.
    pub fn segments(&self) -> Option<&[Segment]> {
        self.segments.as_deref()
    }

    /// Post-transform test results.
    pub fn report(&self) -> Option<&StationarityReport> {
        self.report.as_ref()
    }
}

/// Rebase `series` so that its first observation equals `base`.
pub fn normalize_to_base(series: &TimeSeries, base: f64) -> PrepResult<TimeSeries> {
    let first = series.first_value();
    if first == 0.0 {
        return Err(SeriesPrepError::invalid_input(
            "cannot normalize a series whose first value is zero",
        ));
    }
    series.with_values(series.values().iter().map(|v| v / first * base).collect())
}

/// Stage-by-stage driver over many tickers.
#[derive(Debug, Clone)]
pub struct PreparationPipeline {
    config: PipelineConfig,
    outlier: RollingOutlierDetector,
    changepoint: ChangePointDetector,
    stationarity: StationarityTransformer,
    records: BTreeMap<String, EntityRecord>,
    selection: Option<TransformSelection>,
}

impl PreparationPipeline {
    /// Build every stage from `config`.
    pub fn new(config: PipelineConfig) -> PrepResult<Self> {
        config.validate()?;
        Ok(Self {
            outlier: RollingOutlierDetector::new(config.outlier.clone())?,
            changepoint: ChangePointDetector::new(config.changepoint.clone())?,
            stationarity: StationarityTransformer::new(config.stationarity)?,
            config,
            records: BTreeMap::new(),
            selection: None,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// All records by ticker.
    pub fn records(&self) -> &BTreeMap<String, EntityRecord> {
        &self.records
    }

    /// Record of one ticker.
    pub fn record(&self, ticker: &str) -> PrepResult<&EntityRecord> {
        self.records
            .get(ticker)
            .ok_or_else(|| SeriesPrepError::SeriesNotFound {
                name: ticker.to_string(),
            })
    }

    /// Transform chosen by the last search, if any.
    pub fn selection(&self) -> Option<&TransformSelection> {
        self.selection.as_ref()
    }

    /// Series of every ticker that has reached `stage`.
    pub fn stage_data(&self, stage: PipelineStage) -> BTreeMap<String, TimeSeries> {
        self.records
            .iter()
            .filter_map(|(name, record)| record.series(stage).map(|s| (name.clone(), s.clone())))
            .collect()
    }

    /// Add a raw series, discarding anything derived for that ticker before.
    pub fn insert(&mut self, ticker: impl Into<String>, series: TimeSeries) {
        self.records.insert(ticker.into(), EntityRecord::new(series));
        self.selection = None;
    }

    /// Fetch `tickers` from `source`.
    pub fn load(&mut self, source: &dyn SeriesSource, tickers: &[&str]) -> PrepResult<()> {
        let fetched = source.fetch_many(tickers)?;
        info!("loaded {} series from {}", fetched.len(), source.name());
        for (ticker, series) in fetched {
            self.insert(ticker, series);
        }
        Ok(())
    }

    /// Rebase every raw series to [`NORMALIZATION_BASE`].
    pub fn normalize(&mut self) -> PrepResult<()> {
        for (ticker, record) in self.records.iter_mut() {
            let normalized = normalize_to_base(&record.raw, NORMALIZATION_BASE).map_err(|e| {
                SeriesPrepError::invalid_input(format!("{}: {}", ticker, e))
            })?;
            record.normalized = Some(normalized);
        }
        Ok(())
    }

    /// Repair outliers in every series.
    pub fn clean(&mut self) -> PrepResult<()> {
        let inputs: BTreeMap<String, TimeSeries> = self
            .records
            .iter()
            .map(|(name, record)| (name.clone(), record.cleaning_input().clone()))
            .collect();
        let cleaned = self.outlier.process_batch(&inputs)?;
        for (ticker, result) in cleaned {
            if let Some(record) = self.records.get_mut(&ticker) {
                record.cleaned = Some(result);
            }
        }
        Ok(())
    }

    fn cleaned_data(&self, operation: &str) -> PrepResult<BTreeMap<String, TimeSeries>> {
        let data = self.stage_data(PipelineStage::Cleaned);
        if data.len() != self.records.len() {
            return Err(SeriesPrepError::StateError {
                reason: format!("{} requires clean() to have run", operation),
            });
        }
        Ok(data)
    }

    /// Breakpoints and regimes of every cleaned series.
    pub fn detect_regimes(&mut self) -> PrepResult<()> {
        let cleaned = self.cleaned_data("detect_regimes")?;
        let detected = self.changepoint.process_batch(&cleaned)?;
        for (ticker, breakpoints) in detected {
            if let (Some(record), Some(series)) = (self.records.get_mut(&ticker), cleaned.get(&ticker)) {
                record.segments = Some(split_at(series, breakpoints.indices()));
                record.breakpoints = Some(breakpoints);
            }
        }
        Ok(())
    }

    /// Search the transform shared by all cleaned series.
    pub fn search_transform(&mut self) -> PrepResult<&TransformSelection> {
        let cleaned = self.cleaned_data("search_transform")?;
        let selection = self.stationarity.find_best_transformation(&cleaned)?;
        Ok(self.selection.insert(selection))
    }

    /// Replace the searched transform with `config`.
    pub fn override_transform(&mut self, config: TransformConfig) -> PrepResult<()> {
        let selection = self.selection.as_ref().ok_or_else(|| SeriesPrepError::StateError {
            reason: "override_transform requires search_transform to have run".to_string(),
        })?;
        warn!("overriding selected transform with {:?}", config);
        self.selection = Some(selection.with_override(config));
        Ok(())
    }

    /// Transform every cleaned series with the selected transform.
    pub fn apply_transform(&mut self, run_tests: bool) -> PrepResult<()> {
        let selection = self.selection.as_ref().ok_or_else(|| SeriesPrepError::StateError {
            reason: "apply_transform requires search_transform to have run".to_string(),
        })?;
        let cleaned = self.cleaned_data("apply_transform")?;
        let mut output = self.stationarity.apply(selection, &cleaned, run_tests)?;
        for (ticker, record) in self.records.iter_mut() {
            record.transformed = output.transformed.remove(ticker);
            record.report = output.reports.remove(ticker);
        }
        Ok(())
    }

    /// Load `tickers` and run every stage.
    pub fn run(
        &mut self,
        source: &dyn SeriesSource,
        tickers: &[&str],
    ) -> PrepResult<&BTreeMap<String, EntityRecord>> {
        self.load(source, tickers)?;
        if self.config.normalize {
            self.normalize()?;
        }
        self.clean()?;
        self.detect_regimes()?;
        self.search_transform()?;
        self.apply_transform(self.config.run_tests)?;
        Ok(&self.records)
    }
}
