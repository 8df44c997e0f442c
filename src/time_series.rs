//! Validated, immutable price series.
//!
//! A [`TimeSeries`] is an ordered sequence of `(timestamp, value)` pairs whose
//! timestamps are strictly increasing and whose values are finite. Every stage
//! in this crate consumes a series by reference and returns a new one.

use crate::errors::{validate_all_finite, PrepResult, SeriesPrepError};
use chrono::{DateTime, Duration, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Ordered, non-empty series of finite observations.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawTimeSeries"))]
pub struct TimeSeries {
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<f64>,
}

/// Unchecked wire form; deserialization goes through [`TimeSeries::new`].
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawTimeSeries {
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<f64>,
}

#[cfg(feature = "serde")]
impl TryFrom<RawTimeSeries> for TimeSeries {
    type Error = SeriesPrepError;

    fn try_from(raw: RawTimeSeries) -> PrepResult<Self> {
        Self::new(raw.timestamps, raw.values)
    }
}

impl TimeSeries {
    /// Build a series, validating alignment, ordering and finiteness.
    pub fn new(timestamps: Vec<DateTime<Utc>>, values: Vec<f64>) -> PrepResult<Self> {
        if timestamps.len() != values.len() {
            return Err(SeriesPrepError::invalid_input(format!(
                "timestamps ({}) and values ({}) differ in length",
                timestamps.len(),
                values.len()
            )));
        }
        if values.is_empty() {
            return Err(SeriesPrepError::invalid_input("series is empty"));
        }
        if let Some(i) = timestamps.windows(2).position(|w| w[1] <= w[0]) {
            return Err(SeriesPrepError::invalid_input(format!(
                "timestamps must be strictly increasing; violated at index {}",
                i + 1
            )));
        }
        validate_all_finite(&values, "series")?;

        Ok(Self { timestamps, values })
    }

    /// Build a series from `(timestamp, value)` pairs.
    pub fn from_pairs<I>(pairs: I) -> PrepResult<Self>
    where
        I: IntoIterator<Item = (DateTime<Utc>, f64)>,
    {
        let (timestamps, values) = pairs.into_iter().unzip();
        Self::new(timestamps, values)
    }

    /// Build a daily series starting at `start`.
    pub fn from_daily_values(start: DateTime<Utc>, values: Vec<f64>) -> PrepResult<Self> {
        let timestamps = (0..values.len())
            .map(|i| start + Duration::days(i as i64))
            .collect();
        Self::new(timestamps, values)
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always `false`; kept for API symmetry with collections.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Observation values in index order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Timestamps in index order.
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// First observation value.
    pub fn first_value(&self) -> f64 {
        self.values[0]
    }

    /// Iterate over `(timestamp, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.timestamps.iter().copied().zip(self.values.iter().copied())
    }

    /// Contiguous sub-series over the half-open index range.
    pub fn slice(&self, range: Range<usize>) -> PrepResult<Self> {
        if range.start >= range.end || range.end > self.len() {
            return Err(SeriesPrepError::invalid_input(format!(
                "slice {}..{} is empty or outside a series of length {}",
                range.start,
                range.end,
                self.len()
            )));
        }
        Ok(Self {
            timestamps: self.timestamps[range.clone()].to_vec(),
            values: self.values[range].to_vec(),
        })
    }

    /// Same time index, new values.
    pub fn with_values(&self, values: Vec<f64>) -> PrepResult<Self> {
        if values.len() != self.len() {
            return Err(SeriesPrepError::invalid_input(format!(
                "replacement has {} values for a series of length {}",
                values.len(),
                self.len()
            )));
        }
        validate_all_finite(&values, "series")?;
        Ok(Self {
            timestamps: self.timestamps.clone(),
            values,
        })
    }

    /// Align `values` with the trailing timestamps of this series.
    ///
    /// Used after transforms that drop leading observations.
    pub fn with_trailing_values(&self, values: Vec<f64>) -> PrepResult<Self> {
        if values.len() > self.len() {
            return Err(SeriesPrepError::invalid_input(format!(
                "{} trailing values exceed a series of length {}",
                values.len(),
                self.len()
            )));
        }
        let offset = self.len() - values.len();
        Self::new(self.timestamps[offset..].to_vec(), values)
    }

    /// Concatenate consecutive pieces back into one series.
    pub fn concat(parts: &[TimeSeries]) -> PrepResult<Self> {
        let total = parts.iter().map(TimeSeries::len).sum();
        let mut timestamps = Vec::with_capacity(total);
        let mut values = Vec::with_capacity(total);
        for part in parts {
            timestamps.extend_from_slice(&part.timestamps);
            values.extend_from_slice(&part.values);
        }
        Self::new(timestamps, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_rejects_empty_series() {
        let result = TimeSeries::new(vec![], vec![]);
        assert!(matches!(result, Err(SeriesPrepError::InvalidInput { .. })));
    }

    #[test]
    fn test_rejects_non_monotonic_timestamps() {
        let t0 = start();
        let result = TimeSeries::new(vec![t0, t0 + Duration::days(2), t0 + Duration::days(1)], vec![1.0, 2.0, 3.0]);
        match result {
            Err(SeriesPrepError::InvalidInput { reason }) => assert!(reason.contains("index 2")),
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_duplicate_timestamps() {
        let t0 = start();
        assert!(TimeSeries::new(vec![t0, t0], vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_rejects_non_finite_values() {
        assert!(TimeSeries::from_daily_values(start(), vec![1.0, f64::NAN]).is_err());
    }

    #[test]
    fn test_slice_and_concat_round_trip() {
        let series = TimeSeries::from_daily_values(start(), (0..10).map(f64::from).collect()).unwrap();
        let head = series.slice(0..4).unwrap();
        let tail = series.slice(4..10).unwrap();
        assert_eq!(TimeSeries::concat(&[head, tail]).unwrap(), series);
        assert!(series.slice(3..3).is_err());
        assert!(series.slice(5..11).is_err());
    }

    #[test]
    fn test_with_trailing_values_keeps_last_timestamps() {
        let series = TimeSeries::from_daily_values(start(), vec![1.0, 2.0, 4.0, 7.0]).unwrap();
        let diffs = series.with_trailing_values(vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(diffs.timestamps(), &series.timestamps()[1..]);
        assert!(series.with_trailing_values(vec![]).is_err());
    }

    #[test]
    fn test_from_pairs_and_iter_round_trip() {
        let t0 = start();
        let pairs = vec![
            (t0, 101.5),
            (t0 + Duration::days(1), 99.25),
            (t0 + Duration::days(4), 103.0),
        ];
        let series = TimeSeries::from_pairs(pairs.clone()).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.values(), &[101.5, 99.25, 103.0]);
        assert_eq!(series.iter().collect::<Vec<_>>(), pairs);

        let rebuilt = TimeSeries::from_pairs(series.iter()).unwrap();
        assert_eq!(rebuilt, series);

        let unordered = vec![(t0 + Duration::days(1), 1.0), (t0, 2.0)];
        assert!(matches!(
            TimeSeries::from_pairs(unordered),
            Err(SeriesPrepError::InvalidInput { .. })
        ));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_round_trip() {
        let series = TimeSeries::from_daily_values(start(), vec![3.0, 1.5, 2.25]).unwrap();
        let json = serde_json::to_string(&series).unwrap();
        let back: TimeSeries = serde_json::from_str(&json).unwrap();
        assert_eq!(back, series);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize_enforces_invariants() {
        let out_of_order = r#"{
            "timestamps": ["2020-01-02T00:00:00Z", "2020-01-01T00:00:00Z"],
            "values": [1.0, 2.0]
        }"#;
        let err = serde_json::from_str::<TimeSeries>(out_of_order).unwrap_err();
        assert!(err.to_string().contains("strictly increasing"), "{}", err);

        let empty = r#"{"timestamps": [], "values": []}"#;
        assert!(serde_json::from_str::<TimeSeries>(empty).is_err());

        let misaligned = r#"{"timestamps": ["2020-01-01T00:00:00Z"], "values": [1.0, 2.0]}"#;
        assert!(serde_json::from_str::<TimeSeries>(misaligned).is_err());
    }
}
