//! # Dataset Access
//!
//! [`Dataset`] owns an open NetCDF file together with its decoded time
//! index. Variables are looked up by name and read on demand:
//!
//! - [`Dataset::series`] reads a `(time)` variable as a [`Series`];
//! - [`Dataset::slice_at`] reads the `(y, x)` grid of a `(time, y, x)`
//!   variable at one timestamp;
//! - [`Dataset::slice_over_range`] sums that grid over an inclusive time range.
//!
//! Values go through CF decoding on the way in: `_FillValue` and
//! `missing_value` become NaN, then `scale_factor` / `add_offset` apply.
//!
//! The file handle is released by [`Dataset::close`] or on drop. Closing a
//! second time returns [`Error::AlreadyClosed`], as does any read after close.
//! [`with_dataset`] wraps open and close around a closure.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ohprecip::dataset::{with_dataset, OpenOptions};
//!
//! let total = with_dataset("DISDRO_IIUNAM.nc", &OpenOptions::default(), |ds| {
//!     println!("{:?}", ds.variable_names()?);
//!     let per_minute = ds.series("intensity")?.mask_above(400.0).convert_units(60.0);
//!     Ok(per_minute.stats().sum)
//! })?;
//! # Ok::<(), ohprecip::Error>(())
//! ```

use crate::error::{Error, Result};
use crate::series::Series;
use crate::slice::{Axis, Slice, SliceSelection};
use crate::time::{TimeUnits, check_calendar, format_timestamp};
use chrono::NaiveDateTime;
use log::{debug, warn};
use ndarray::Array2;
use netcdf::AttributeValue;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Largest number of time steps read in a single hyperslab when summing a range.
pub const READ_CHUNK_STEPS: usize = 1440;

/// Time dimension name used when none is configured.
pub const DEFAULT_TIME_DIMENSION: &str = "time";

/// Options applied when opening a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    /// Name of the time dimension and of its coordinate variable.
    pub time_dimension: String,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            time_dimension: DEFAULT_TIME_DIMENSION.to_string(),
        }
    }
}

/// Metadata of a dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionInfo {
    pub name: String,
    pub length: usize,
    pub is_unlimited: bool,
}

/// Metadata of a variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableInfo {
    pub name: String,
    pub data_type: String,
    pub dimensions: Vec<String>,
    pub shape: Vec<usize>,
    pub units: Option<String>,
    pub long_name: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

/// An open NetCDF precipitation dataset.
pub struct Dataset {
    path: PathBuf,
    file: Option<netcdf::File>,
    time_dimension: String,
    time_units: TimeUnits,
    times: Vec<NaiveDateTime>,
}

impl Dataset {
    /// Open `path` with the default `time` dimension.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, &OpenOptions::default())
    }

    /// Open `path` and decode its time coordinate.
    ///
    /// # Errors
    ///
    /// - [`Error::FileNotFound`] if `path` does not exist;
    /// - [`Error::Format`] if the NetCDF library cannot open it;
    /// - [`Error::UnknownVariable`] if there is no time coordinate variable;
    /// - [`Error::InvalidTime`] if its units or calendar are not supported.
    pub fn open_with<P: AsRef<Path>>(path: P, options: &OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        debug!("Opening NetCDF file: {}", path.display());
        let file = netcdf::open(path).map_err(|e| Error::Format {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let (time_units, times) = read_time_index(&file, &options.time_dimension)?;
        debug!(
            "Decoded {} time steps ({})",
            times.len(),
            time_units
        );

        Ok(Dataset {
            path: path.to_path_buf(),
            file: Some(file),
            time_dimension: options.time_dimension.clone(),
            time_units,
            times,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn time_dimension(&self) -> &str {
        &self.time_dimension
    }

    pub fn time_units(&self) -> &TimeUnits {
        &self.time_units
    }

    /// The decoded time index, in file order.
    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    /// Position of `timestamp` in the time index.
    pub fn time_position(&self, timestamp: &NaiveDateTime) -> Option<usize> {
        self.times.iter().position(|t| t == timestamp)
    }

    fn file(&self) -> Result<&netcdf::File> {
        self.file.as_ref().ok_or(Error::AlreadyClosed)
    }

    fn lookup<'f>(&self, file: &'f netcdf::File, name: &str) -> Result<netcdf::Variable<'f>> {
        file.variable(name).ok_or_else(|| Error::UnknownVariable {
            name: name.to_string(),
        })
    }

    /// Names of all variables, in declaration order.
    pub fn variable_names(&self) -> Result<Vec<String>> {
        Ok(self.file()?.variables().map(|v| v.name()).collect())
    }

    /// Metadata of every variable, in declaration order.
    pub fn variables(&self) -> Result<Vec<VariableInfo>> {
        Ok(self.file()?.variables().map(|v| variable_info(&v)).collect())
    }

    /// Metadata of one variable.
    pub fn variable(&self, name: &str) -> Result<VariableInfo> {
        let file = self.file()?;
        Ok(variable_info(&self.lookup(file, name)?))
    }

    pub fn dimensions(&self) -> Result<Vec<DimensionInfo>> {
        Ok(self
            .file()?
            .dimensions()
            .map(|d| DimensionInfo {
                name: d.name(),
                length: d.len(),
                is_unlimited: d.is_unlimited(),
            })
            .collect())
    }

    pub fn global_attributes(&self) -> Result<BTreeMap<String, String>> {
        Ok(collect_attributes(self.file()?.attributes()))
    }

    /// Read a one-dimensional `(time)` variable as a series.
    pub fn series(&self, name: &str) -> Result<Series> {
        let file = self.file()?;
        let var = self.lookup(file, name)?;

        let dims = dimension_names(&var);
        if dims.len() != 1 || dims[0] != self.time_dimension {
            return Err(Error::DimensionMismatch {
                name: name.to_string(),
                dimensions: dims,
                expected: format!("expected a single '{}' dimension", self.time_dimension),
            });
        }

        let decoding = Decoding::from_variable(&var);
        let mut values = var.get_values::<f64, _>(..)?;
        decoding.apply_all(&mut values);
        debug!("Read {} values of '{}'", values.len(), name);

        Ok(Series::new(name, self.times.clone(), values)?.with_units(string_attribute(&var, "units")))
    }

    /// The `(y, x)` cross-section of a `(time, y, x)` variable at `timestamp`.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownTimestamp`] if `timestamp` is not in the time index.
    pub fn slice_at(&self, name: &str, timestamp: NaiveDateTime) -> Result<Slice> {
        let file = self.file()?;
        let var = self.lookup(file, name)?;
        let (y, x) = self.grid_axes(file, &var, name)?;

        let index = self
            .time_position(&timestamp)
            .ok_or_else(|| Error::UnknownTimestamp {
                timestamp: format_timestamp(&timestamp),
            })?;

        let decoding = Decoding::from_variable(&var);
        let mut values = var.get_values::<f64, _>((index, .., ..))?;
        decoding.apply_all(&mut values);

        let data = Array2::from_shape_vec((y.len(), x.len()), values).map_err(|e| {
            Error::LengthMismatch {
                expected: format!("grid of shape ({}, {})", y.len(), x.len()),
                got: e.to_string(),
            }
        })?;
        debug!("Read '{}' at time index {}", name, index);

        Ok(Slice::new(name, y, x, data, SliceSelection::At { timestamp })?
            .with_units(string_attribute(&var, "units")))
    }

    /// Sum the `(y, x)` grid of a `(time, y, x)` variable over every time
    /// step in `[start, end]`.
    ///
    /// Missing cells are skipped, so a cell that is missing at every matched
    /// step sums to zero. Returns `Ok(None)` when no time step falls in the
    /// range; that is an empty result, not an error.
    pub fn slice_over_range(
        &self,
        name: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Option<Slice>> {
        let file = self.file()?;
        let var = self.lookup(file, name)?;
        let (y, x) = self.grid_axes(file, &var, name)?;

        let matched: Vec<usize> = self
            .times
            .iter()
            .enumerate()
            .filter(|(_, t)| **t >= start && **t <= end)
            .map(|(i, _)| i)
            .collect();
        if matched.is_empty() {
            debug!(
                "No time steps of '{}' within [{}, {}]",
                name,
                format_timestamp(&start),
                format_timestamp(&end)
            );
            return Ok(None);
        }

        let decoding = Decoding::from_variable(&var);
        let cells = y.len() * x.len();
        let mut sum = vec![0.0; cells];

        let chunks = if cells == 0 {
            Vec::new()
        } else {
            read_chunks(&matched, READ_CHUNK_STEPS)
        };
        for chunk in chunks {
            let steps = chunk.len();
            let mut values = var.get_values::<f64, _>((chunk, .., ..))?;
            decoding.apply_all(&mut values);
            for step in values.chunks_exact(cells).take(steps) {
                for (acc, v) in sum.iter_mut().zip(step) {
                    if !v.is_nan() {
                        *acc += v;
                    }
                }
            }
        }
        debug!("Summed {} time steps of '{}'", matched.len(), name);

        let data = Array2::from_shape_vec((y.len(), x.len()), sum).map_err(|e| {
            Error::LengthMismatch {
                expected: format!("grid of shape ({}, {})", y.len(), x.len()),
                got: e.to_string(),
            }
        })?;
        let selection = SliceSelection::Range {
            start,
            end,
            steps: matched.len(),
        };

        Ok(Some(
            Slice::new(name, y, x, data, selection)?.with_units(string_attribute(&var, "units")),
        ))
    }

    /// Check that `var` is `(time, y, x)` and build its two grid axes.
    fn grid_axes(
        &self,
        file: &netcdf::File,
        var: &netcdf::Variable,
        name: &str,
    ) -> Result<(Axis, Axis)> {
        let dims = var.dimensions();
        if dims.len() != 3 || dims[0].name() != self.time_dimension {
            return Err(Error::DimensionMismatch {
                name: name.to_string(),
                dimensions: dimension_names(var),
                expected: format!("expected ('{}', y, x)", self.time_dimension),
            });
        }
        let y = coordinate_axis(file, &dims[1].name(), dims[1].len())?;
        let x = coordinate_axis(file, &dims[2].name(), dims[2].len())?;
        Ok((y, x))
    }

    /// Release the file handle.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyClosed`] if the dataset was closed before.
    pub fn close(&mut self) -> Result<()> {
        let file = self.file.take().ok_or(Error::AlreadyClosed)?;
        debug!("Closing NetCDF file: {}", self.path.display());
        file.close()?;
        Ok(())
    }
}

impl Drop for Dataset {
    fn drop(&mut self) {
        if self.file.is_some() {
            debug!("Releasing NetCDF file on drop: {}", self.path.display());
        }
    }
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .field("time_dimension", &self.time_dimension)
            .field("time_steps", &self.times.len())
            .finish()
    }
}

/// Open `path`, run `f` on the dataset and close it on every exit path.
///
/// If `f` fails its error is returned even when closing fails as well.
pub fn with_dataset<P, T, F>(path: P, options: &OpenOptions, f: F) -> Result<T>
where
    P: AsRef<Path>,
    F: FnOnce(&Dataset) -> Result<T>,
{
    let mut dataset = Dataset::open_with(path, options)?;
    let result = f(&dataset);
    let closed = dataset.close();

    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!("Failed to close {}: {}", dataset.path().display(), close_err);
            Err(e)
        }
    }
}

fn read_time_index(
    file: &netcdf::File,
    time_dimension: &str,
) -> Result<(TimeUnits, Vec<NaiveDateTime>)> {
    let var = file
        .variable(time_dimension)
        .ok_or_else(|| Error::UnknownVariable {
            name: time_dimension.to_string(),
        })?;

    let dims = dimension_names(&var);
    if dims.len() != 1 || dims[0] != time_dimension {
        return Err(Error::DimensionMismatch {
            name: time_dimension.to_string(),
            dimensions: dims,
            expected: format!("expected a single '{}' dimension", time_dimension),
        });
    }

    let units = string_attribute(&var, "units").ok_or_else(|| Error::InvalidTime {
        reason: format!("time variable '{}' has no 'units' attribute", time_dimension),
    })?;
    check_calendar(string_attribute(&var, "calendar").as_deref())?;
    let units = TimeUnits::parse(&units)?;

    let offsets = var.get_values::<f64, _>(..)?;
    let times = units.decode_all(&offsets)?;
    Ok((units, times))
}

/// Coordinate values of a dimension, or positions when no usable
/// coordinate variable exists.
fn coordinate_axis(file: &netcdf::File, dimension: &str, len: usize) -> Result<Axis> {
    if let Some(var) = file.variable(dimension)
        && var.dimensions().len() == 1
        && var.dimensions()[0].len() == len
    {
        let decoding = Decoding::from_variable(&var);
        let mut values = var.get_values::<f64, _>(..)?;
        decoding.apply_all(&mut values);
        return Ok(Axis::new(dimension, string_attribute(&var, "units"), values));
    }
    debug!("No coordinate variable for '{}', using positions", dimension);
    Ok(Axis::indexed(dimension, len))
}

/// Split sorted time indices into contiguous ranges of at most `max_steps`.
pub(crate) fn read_chunks(indices: &[usize], max_steps: usize) -> Vec<Range<usize>> {
    let mut chunks: Vec<Range<usize>> = Vec::new();
    for &i in indices {
        match chunks.last_mut() {
            Some(last) if last.end == i && last.len() < max_steps => last.end += 1,
            _ => chunks.push(i..i + 1),
        }
    }
    chunks
}

/// CF packing and missing-value attributes of a variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Decoding {
    fill_value: Option<f64>,
    missing_value: Option<f64>,
    scale_factor: f64,
    add_offset: f64,
}

impl Default for Decoding {
    fn default() -> Self {
        Decoding {
            fill_value: None,
            missing_value: None,
            scale_factor: 1.0,
            add_offset: 0.0,
        }
    }
}

impl Decoding {
    fn from_variable(var: &netcdf::Variable) -> Self {
        Decoding {
            fill_value: numeric_attribute(var, "_FillValue"),
            missing_value: numeric_attribute(var, "missing_value"),
            scale_factor: numeric_attribute(var, "scale_factor").unwrap_or(1.0),
            add_offset: numeric_attribute(var, "add_offset").unwrap_or(0.0),
        }
    }

    pub(crate) fn apply(&self, raw: f64) -> f64 {
        if self.fill_value == Some(raw) || self.missing_value == Some(raw) {
            return f64::NAN;
        }
        raw * self.scale_factor + self.add_offset
    }

    pub(crate) fn apply_all(&self, values: &mut [f64]) {
        if *self == Decoding::default() {
            return;
        }
        for v in values.iter_mut() {
            *v = self.apply(*v);
        }
    }
}

fn dimension_names(var: &netcdf::Variable) -> Vec<String> {
    var.dimensions().iter().map(|d| d.name()).collect()
}

fn variable_info(var: &netcdf::Variable) -> VariableInfo {
    VariableInfo {
        name: var.name(),
        data_type: format!("{:?}", var.vartype()),
        dimensions: dimension_names(var),
        shape: var.dimensions().iter().map(|d| d.len()).collect(),
        units: string_attribute(var, "units"),
        long_name: string_attribute(var, "long_name"),
        attributes: collect_attributes(var.attributes()),
    }
}

fn collect_attributes<'a>(
    attributes: impl Iterator<Item = netcdf::Attribute<'a>>,
) -> BTreeMap<String, String> {
    attributes
        .filter_map(|attr| {
            let value = attr.value().ok()?;
            Some((attr.name().to_string(), render_attribute(&value)))
        })
        .collect()
}

fn string_attribute(var: &netcdf::Variable, name: &str) -> Option<String> {
    match var.attribute_value(name)?.ok()? {
        AttributeValue::Str(s) => Some(s),
        AttributeValue::Strs(v) => Some(v.join(" ")),
        _ => None,
    }
}

fn numeric_attribute(var: &netcdf::Variable, name: &str) -> Option<f64> {
    attribute_as_f64(&var.attribute_value(name)?.ok()?)
}

/// First numeric element of an attribute value.
pub(crate) fn attribute_as_f64(value: &AttributeValue) -> Option<f64> {
    match value {
        AttributeValue::Uchar(v) => Some(*v as f64),
        AttributeValue::Schar(v) => Some(*v as f64),
        AttributeValue::Ushort(v) => Some(*v as f64),
        AttributeValue::Short(v) => Some(*v as f64),
        AttributeValue::Uint(v) => Some(*v as f64),
        AttributeValue::Int(v) => Some(*v as f64),
        AttributeValue::Ulonglong(v) => Some(*v as f64),
        AttributeValue::Longlong(v) => Some(*v as f64),
        AttributeValue::Float(v) => Some(*v as f64),
        AttributeValue::Double(v) => Some(*v),
        AttributeValue::Floats(v) => v.first().map(|x| *x as f64),
        AttributeValue::Doubles(v) => v.first().copied(),
        AttributeValue::Shorts(v) => v.first().map(|x| *x as f64),
        AttributeValue::Ints(v) => v.first().map(|x| *x as f64),
        _ => None,
    }
}

/// Human-readable rendering of an attribute value.
pub(crate) fn render_attribute(value: &AttributeValue) -> String {
    fn join<T: ToString>(values: &[T]) -> String {
        values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    match value {
        AttributeValue::Str(s) => s.clone(),
        AttributeValue::Strs(v) => v.join(", "),
        AttributeValue::Uchars(v) => join(v),
        AttributeValue::Schars(v) => join(v),
        AttributeValue::Ushorts(v) => join(v),
        AttributeValue::Shorts(v) => join(v),
        AttributeValue::Uints(v) => join(v),
        AttributeValue::Ints(v) => join(v),
        AttributeValue::Ulonglongs(v) => join(v),
        AttributeValue::Longlongs(v) => join(v),
        AttributeValue::Floats(v) => join(v),
        AttributeValue::Doubles(v) => join(v),
        other => attribute_as_f64(other)
            .map(|v| v.to_string())
            .unwrap_or_else(|| format!("{:?}", other)),
    }
}
