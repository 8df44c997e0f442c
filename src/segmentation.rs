//! Slicing a series into regimes at breakpoints.

use crate::changepoint::Breakpoints;
use crate::errors::{PrepResult, SeriesPrepError};
use crate::time_series::TimeSeries;
#[cfg(feature = "serde")]
use serde::Serialize;

/// Non-empty contiguous slice `[start, end)` of a parent series.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Segment {
    start: usize,
    end: usize,
    series: TimeSeries,
}

impl Segment {
    /// First index in the parent series.
    pub fn start(&self) -> usize {
        self.start
    }

    /// One past the last index in the parent series.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Always `false`: empty fragments are never produced.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Observations of this regime.
    pub fn series(&self) -> &TimeSeries {
        &self.series
    }
}

/// Split `series` at raw cut indices.
///
/// Cuts are read left to right; a cut that is not past the previous one or
/// that falls outside `(0, len)` would produce an empty or overlapping
/// fragment and is skipped. The returned segments always concatenate back to
/// `series`.
pub fn split_at(series: &TimeSeries, cuts: &[usize]) -> Vec<Segment> {
    let n = series.len();
    let mut segments = Vec::with_capacity(cuts.len() + 1);
    let mut prev = 0;
    for &cut in cuts {
        if cut <= prev || cut >= n {
            continue;
        }
        segments.extend(make_segment(series, prev, cut));
        prev = cut;
    }
    segments.extend(make_segment(series, prev, n));
    segments
}

fn make_segment(series: &TimeSeries, start: usize, end: usize) -> Option<Segment> {
    series.slice(start..end).ok().map(|slice| Segment {
        start,
        end,
        series: slice,
    })
}

/// Split `series` at validated breakpoints.
pub fn segment(series: &TimeSeries, breakpoints: &Breakpoints) -> PrepResult<Vec<Segment>> {
    if breakpoints.series_len() != series.len() {
        return Err(SeriesPrepError::invalid_input(format!(
            "breakpoints computed for length {} applied to a series of length {}",
            breakpoints.series_len(),
            series.len()
        )));
    }
    Ok(split_at(series, breakpoints.indices()))
}

/// A series with per-index breakpoint flags.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct BreakpointAnnotation {
    series: TimeSeries,
    breakpoints: Breakpoints,
    flags: Vec<bool>,
}

impl BreakpointAnnotation {
    /// Annotated series.
    pub fn series(&self) -> &TimeSeries {
        &self.series
    }

    /// Breakpoints the flags were derived from.
    pub fn breakpoints(&self) -> &Breakpoints {
        &self.breakpoints
    }

    /// `true` where a new regime starts.
    pub fn flags(&self) -> &[bool] {
        &self.flags
    }
}

/// Pair a series with flags marking its breakpoints.
pub fn annotate_breakpoints(
    series: &TimeSeries,
    breakpoints: Breakpoints,
) -> PrepResult<BreakpointAnnotation> {
    if breakpoints.series_len() != series.len() {
        return Err(SeriesPrepError::invalid_input(
            "breakpoints do not belong to this series",
        ));
    }
    let mut flags = vec![false; series.len()];
    for &b in breakpoints.indices() {
        flags[b] = true;
    }
    Ok(BreakpointAnnotation {
        series: series.clone(),
        breakpoints,
        flags,
    })
}
