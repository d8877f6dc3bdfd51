//! # Spectrum Slices
//!
//! A [`Slice`] is a two-dimensional cross-section of a `(time, y, x)`
//! variable: either the grid at one timestamp or the grid summed over a time
//! range. For disdrometer spectra `y` is fall velocity and `x` is drop
//! diameter, but nothing here depends on that.

use crate::error::{Error, Result};
use crate::time::format_timestamp;
use chrono::NaiveDateTime;
use ndarray::Array2;
use polars::prelude::{Column, DataFrame, NamedFrom, Series as ColumnSeries};
use serde::Serialize;
use std::fmt;

/// A labeled coordinate axis of a slice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axis {
    pub name: String,
    pub units: Option<String>,
    pub values: Vec<f64>,
}

impl Axis {
    pub fn new(name: impl Into<String>, units: Option<String>, values: Vec<f64>) -> Self {
        Axis {
            name: name.into(),
            units,
            values,
        }
    }

    /// Axis whose coordinates are the positions `0..len`, used when a
    /// dimension has no coordinate variable.
    pub fn indexed(name: impl Into<String>, len: usize) -> Self {
        Axis::new(name, None, (0..len).map(|i| i as f64).collect())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Axis label: name plus units in brackets when known.
    pub fn label(&self) -> String {
        match &self.units {
            Some(units) => format!("{} [{}]", self.name, units),
            None => self.name.clone(),
        }
    }

    /// Boundaries of the cells centred on each coordinate.
    ///
    /// Interior edges sit halfway between neighbours; the outer edges extend
    /// by half of the adjacent step. A single coordinate gets a unit-wide cell.
    pub fn cell_edges(&self) -> Vec<f64> {
        let v = &self.values;
        match v.len() {
            0 => Vec::new(),
            1 => vec![v[0] - 0.5, v[0] + 0.5],
            n => {
                let mut edges = Vec::with_capacity(n + 1);
                edges.push(v[0] - (v[1] - v[0]) / 2.0);
                edges.extend(v.windows(2).map(|w| (w[0] + w[1]) / 2.0));
                edges.push(v[n - 1] + (v[n - 1] - v[n - 2]) / 2.0);
                edges
            }
        }
    }
}

/// How a slice was taken from the time dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SliceSelection {
    /// The cross-section at one timestamp.
    At { timestamp: NaiveDateTime },
    /// The sum over every timestamp in `[start, end]`; `steps` were matched.
    Range {
        start: NaiveDateTime,
        end: NaiveDateTime,
        steps: usize,
    },
}

impl fmt::Display for SliceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SliceSelection::At { timestamp } => write!(f, "at {}", format_timestamp(timestamp)),
            SliceSelection::Range { start, end, steps } => write!(
                f,
                "sum of {} steps in [{}, {}]",
                steps,
                format_timestamp(start),
                format_timestamp(end)
            ),
        }
    }
}

/// Two-dimensional grid of a variable, indexed `[[y, x]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    name: String,
    units: Option<String>,
    y: Axis,
    x: Axis,
    data: Array2<f64>,
    selection: SliceSelection,
}

impl Slice {
    /// Build a slice; `data` must have shape `(y.len(), x.len())`.
    pub fn new(
        name: impl Into<String>,
        y: Axis,
        x: Axis,
        data: Array2<f64>,
        selection: SliceSelection,
    ) -> Result<Self> {
        if data.dim() != (y.len(), x.len()) {
            return Err(Error::LengthMismatch {
                expected: format!("grid of shape ({}, {})", y.len(), x.len()),
                got: format!("grid of shape {:?}", data.dim()),
            });
        }
        Ok(Slice {
            name: name.into(),
            units: None,
            y,
            x,
            data,
            selection,
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

    pub fn x(&self) -> &Axis {
        &self.x
    }

    pub fn y(&self) -> &Axis {
        &self.y
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn selection(&self) -> &SliceSelection {
        &self.selection
    }

    /// `(ny, nx)`.
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Smallest and largest finite values, or `None` when every cell is missing.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Sum of all finite cells.
    pub fn total(&self) -> f64 {
        self.data.iter().filter(|v| v.is_finite()).sum()
    }

    /// Multiply every cell by `factor`.
    pub fn scale(&self, factor: f64) -> Slice {
        Slice {
            data: self.data.mapv(|v| v * factor),
            ..self.clone()
        }
    }

    /// Long-format DataFrame with one row per cell: `<y>`, `<x>`, `<name>`.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let (ny, nx) = self.shape();
        let mut ys = Vec::with_capacity(ny * nx);
        let mut xs = Vec::with_capacity(ny * nx);
        let mut values = Vec::with_capacity(ny * nx);

        for ((j, i), &v) in self.data.indexed_iter() {
            ys.push(self.y.values[j]);
            xs.push(self.x.values[i]);
            values.push((!v.is_nan()).then_some(v));
        }

        let columns: Vec<Column> = vec![
            ColumnSeries::new(self.y.name.as_str().into(), ys).into(),
            ColumnSeries::new(self.x.name.as_str().into(), xs).into(),
            ColumnSeries::new(self.name.as_str().into(), values).into(),
        ];
        Ok(DataFrame::new(columns)?)
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (ny, nx) = self.shape();
        write!(
            f,
            "{} {} ({} x {}: {} x {})",
            self.name, self.selection, self.y.name, self.x.name, ny, nx
        )
    }
}
