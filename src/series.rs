//! # Time Series
//!
//! A [`Series`] is the one-dimensional projection of a variable along the
//! time dimension: timestamps paired one-to-one with values, in file order.
//! Missing values are `f64::NAN`.
//!
//! All transforms borrow the series and return a new one, so a caller can
//! keep the raw extraction around next to its rescaled or masked variants.

use crate::error::{Error, Result};
use crate::time::format_timestamp;
use chrono::NaiveDateTime;
use polars::prelude::{
    Column, DataFrame, DataType, NamedFrom, Series as ColumnSeries, TimeUnit as ColumnTimeUnit,
};
use serde::Serialize;
use std::ops::Range;

/// Time-indexed values of a single variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    name: String,
    units: Option<String>,
    times: Vec<NaiveDateTime>,
    values: Vec<f64>,
}

/// Summary statistics over the non-missing values of a series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesStats {
    pub count: usize,
    pub valid: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub sum: f64,
    pub mean: Option<f64>,
    pub first_time: Option<NaiveDateTime>,
    pub last_time: Option<NaiveDateTime>,
}

impl Series {
    /// Build a series, checking that timestamps and values pair up.
    pub fn new(
        name: impl Into<String>,
        times: Vec<NaiveDateTime>,
        values: Vec<f64>,
    ) -> Result<Self> {
        if times.len() != values.len() {
            return Err(Error::LengthMismatch {
                expected: format!("{} values", times.len()),
                got: format!("{} values", values.len()),
            });
        }
        Ok(Series {
            name: name.into(),
            units: None,
            times,
            values,
        })
    }

    pub fn with_units(mut self, units: Option<String>) -> Self {
        self.units = units;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(timestamp, value)` pairs in time-index order.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDateTime, f64)> + '_ {
        self.times.iter().copied().zip(self.values.iter().copied())
    }

    /// Divide every value by `factor` (`v ↦ v / factor`).
    ///
    /// With hourly intensities sampled once a minute, `factor = 60` turns
    /// mm/h into the rain amount that fell during each minute.
    pub fn convert_units(&self, factor: f64) -> Series {
        self.map_values(|v| v / factor)
    }

    /// Multiply every value by `factor`; the inverse of [`convert_units`](Self::convert_units).
    pub fn scale(&self, factor: f64) -> Series {
        self.map_values(|v| v * factor)
    }

    /// Replace every value strictly greater than `threshold` with NaN.
    pub fn mask_above(&self, threshold: f64) -> Series {
        self.map_values(|v| if v > threshold { f64::NAN } else { v })
    }

    fn map_values(&self, f: impl Fn(f64) -> f64) -> Series {
        Series {
            name: self.name.clone(),
            units: self.units.clone(),
            times: self.times.clone(),
            values: self.values.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Number of values that are not NaN.
    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_nan()).count()
    }

    pub fn stats(&self) -> SeriesStats {
        let mut valid = 0;
        let mut sum = 0.0;
        let mut min: Option<f64> = None;
        let mut max: Option<f64> = None;

        for &v in self.values.iter().filter(|v| !v.is_nan()) {
            valid += 1;
            sum += v;
            min = Some(min.map_or(v, |m| m.min(v)));
            max = Some(max.map_or(v, |m| m.max(v)));
        }

        SeriesStats {
            count: self.values.len(),
            valid,
            min,
            max,
            sum,
            mean: (valid > 0).then(|| sum / valid as f64),
            first_time: self.times.first().copied(),
            last_time: self.times.last().copied(),
        }
    }

    /// Index ranges of consecutive finite values.
    ///
    /// A line plot draws one segment per run so that missing values leave gaps.
    pub fn finite_runs(&self) -> Vec<Range<usize>> {
        let mut runs = Vec::new();
        let mut start: Option<usize> = None;

        for (i, v) in self.values.iter().enumerate() {
            match (v.is_finite(), start) {
                (true, None) => start = Some(i),
                (false, Some(s)) => {
                    runs.push(s..i);
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            runs.push(s..self.values.len());
        }
        runs
    }

    /// Convert to a two-column DataFrame: `time` (datetime, ms) and the
    /// series name, or `time_value` for the time variable itself. Missing
    /// values become nulls.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let millis: Vec<i64> = self
            .times
            .iter()
            .map(|t| t.and_utc().timestamp_millis())
            .collect();
        let time = ColumnSeries::new("time".into(), millis)
            .cast(&DataType::Datetime(ColumnTimeUnit::Milliseconds, None))?;

        let values: Vec<Option<f64>> = self
            .values
            .iter()
            .map(|&v| (!v.is_nan()).then_some(v))
            .collect();
        let column = if self.name == "time" {
            "time_value"
        } else {
            self.name.as_str()
        };
        let values = ColumnSeries::new(column.into(), values);

        let columns: Vec<Column> = vec![time.into(), values.into()];
        Ok(DataFrame::new(columns)?)
    }
}

impl std::fmt::Display for Series {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        write!(f, "{} ({} steps", self.name, stats.count)?;
        if let (Some(first), Some(last)) = (stats.first_time, stats.last_time) {
            write!(f, ", {} .. {}", format_timestamp(&first), format_timestamp(&last))?;
        }
        if let Some(units) = &self.units {
            write!(f, ", units: {}", units)?;
        }
        write!(f, ")")
    }
}
