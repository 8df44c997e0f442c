//! Where raw price series come from.
//!
//! Fetching, caching and persistence live outside this crate. A
//! [`SeriesSource`] is the seam: give it a ticker, get back a validated
//! [`TimeSeries`] of closing prices.

use crate::errors::{PrepResult, SeriesPrepError};
use crate::time_series::TimeSeries;
use std::collections::BTreeMap;

/// Provider of historical price series by ticker.
pub trait SeriesSource: Send + Sync {
    /// Source name for logs.
    fn name(&self) -> &str;

    /// Full available history of `ticker`.
    fn fetch(&self, ticker: &str) -> PrepResult<TimeSeries>;

    /// Fetch several tickers into a name-ordered map.
    fn fetch_many(&self, tickers: &[&str]) -> PrepResult<BTreeMap<String, TimeSeries>> {
        tickers
            .iter()
            .map(|ticker| Ok((ticker.to_string(), self.fetch(ticker)?)))
            .collect()
    }
}

/// Series held in memory, for tests and for callers that already loaded data.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    series: BTreeMap<String, TimeSeries>,
}

impl InMemorySource {
    /// Empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `series` under `ticker`, replacing any previous entry.
    pub fn insert(&mut self, ticker: impl Into<String>, series: TimeSeries) -> &mut Self {
        self.series.insert(ticker.into(), series);
        self
    }

    /// Registered tickers in order.
    pub fn tickers(&self) -> Vec<&str> {
        self.series.keys().map(String::as_str).collect()
    }
}

impl From<BTreeMap<String, TimeSeries>> for InMemorySource {
    fn from(series: BTreeMap<String, TimeSeries>) -> Self {
        Self { series }
    }
}

impl SeriesSource for InMemorySource {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn fetch(&self, ticker: &str) -> PrepResult<TimeSeries> {
        self.series
            .get(ticker)
            .cloned()
            .ok_or_else(|| SeriesPrepError::SeriesNotFound {
                name: ticker.to_string(),
            })
    }
}
