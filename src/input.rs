//! # Job Configuration
//!
//! A job file names a dataset and lists what to do with it: time series to
//! extract, transform, plot and export, and spectrum slices to sum, plot and
//! export. Files are JSON or YAML (chosen by extension).
//!
//! ```yaml
//! dataset: DISDRO_IIUNAM.nc
//! series:
//!   - variable: intensity
//!     transforms:
//!       - { type: range_mask, max: 400 }
//!       - { type: unit_conversion, divisor: 60, units: mm }
//!     plot: { output: intensity.png, y_label: "Precipitation [mm]" }
//! spectra:
//!   - variable: spectrum
//!     selection: { kind: at, timestamp: "2018-08-30 18:20" }
//!     plot: { output: spectrum.png, x_range: [0, 6], y_range: [0, 10] }
//! ```
//!
//! ```rust
//! use ohprecip::input::JobConfig;
//!
//! let json = r#"
//! {
//!   "dataset": "PLUVIO_PREPA2.nc",
//!   "series": [{ "variable": "intensity", "export": "intensity.csv" }]
//! }"#;
//! let config = JobConfig::from_json(json)?;
//! config.validate()?;
//! # Ok::<(), ohprecip::Error>(())
//! ```

use crate::dataset::{DEFAULT_TIME_DIMENSION, OpenOptions};
use crate::error::{Error, Result};
use crate::output::TableFormat;
use crate::plot::{
    AxisLimits, SERIES_FIGURE_SIZE, SLICE_FIGURE_SIZE, SPECTRUM_X_RANGE, SPECTRUM_Y_RANGE,
    SeriesPlotOptions, SlicePlotOptions,
};
use crate::time::parse_timestamp;
use crate::transform::TransformConfig;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A complete job: one dataset, any number of series and spectrum jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Path of the NetCDF file to read.
    pub dataset: String,
    /// Time dimension name; `time` when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_dimension: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<SeriesJob>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spectra: Vec<SpectrumJob>,
}

/// Extract one time series, transform it, then plot and/or export it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesJob {
    pub variable: String,
    /// Applied in order after extraction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<TransformConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot: Option<SeriesPlotConfig>,
    /// Table output; `.parquet`, `.pq` or `.csv`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPlotConfig {
    /// Figure path; `.svg` or a bitmap format.
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// `[start, end]` timestamps of the displayed window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limits: Option<[String; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_limits: Option<[f64; 2]>,
    /// `[width, height]` in pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<[u32; 2]>,
}

/// Take a slice of a `(time, y, x)` variable, then plot and/or export it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumJob {
    pub variable: String,
    pub selection: SelectionConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot: Option<SlicePlotConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<String>,
}

/// Which time steps a spectrum job covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionConfig {
    /// The slice at exactly this timestamp.
    At { timestamp: String },
    /// The sum over every timestamp in `[start, end]`.
    Range { start: String, end: String },
}

/// A parsed [`SelectionConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSelection {
    At(NaiveDateTime),
    Range(NaiveDateTime, NaiveDateTime),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlicePlotConfig {
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Displayed x window; diameters 0-6 mm when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_range: Option<[f64; 2]>,
    /// Displayed y window; velocities 0-10 m/s when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_range: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<[u32; 2]>,
}

impl JobConfig {
    /// Load a job file; `.yaml`/`.yml` are read as YAML, anything else as JSON.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Self::from_json(&content),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid JSON job: {}", e)))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Config(format!("invalid YAML job: {}", e)))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Options for opening [`dataset`](Self::dataset).
    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            time_dimension: self
                .time_dimension
                .clone()
                .unwrap_or_else(|| DEFAULT_TIME_DIMENSION.to_string()),
        }
    }

    /// Check every field that can be checked without opening the dataset.
    pub fn validate(&self) -> Result<()> {
        if self.dataset.trim().is_empty() {
            return Err(Error::Config("dataset path is empty".into()));
        }
        if let Some(dim) = &self.time_dimension
            && dim.trim().is_empty()
        {
            return Err(Error::Config("time_dimension is empty".into()));
        }
        if self.series.is_empty() && self.spectra.is_empty() {
            return Err(Error::Config("job has no series or spectra to process".into()));
        }

        for (i, job) in self.series.iter().enumerate() {
            job.validate()
                .map_err(|e| Error::Config(format!("series[{}]: {}", i, e)))?;
        }
        for (i, job) in self.spectra.iter().enumerate() {
            job.validate()
                .map_err(|e| Error::Config(format!("spectra[{}]: {}", i, e)))?;
        }
        Ok(())
    }

    /// Disdrometer example: intensity series plus spectra at a time and over a day.
    pub fn disdrometer_template() -> Self {
        JobConfig {
            dataset: "DISDRO_IIUNAM.nc".into(),
            time_dimension: None,
            series: vec![SeriesJob {
                variable: "intensity".into(),
                transforms: vec![],
                plot: Some(SeriesPlotConfig {
                    output: "intensity.png".into(),
                    y_label: Some("Intensity [mm/h]".into()),
                    title: None,
                    time_limits: None,
                    value_limits: None,
                    size: None,
                }),
                export: Some("intensity.parquet".into()),
            }],
            spectra: vec![
                SpectrumJob {
                    variable: "spectrum".into(),
                    selection: SelectionConfig::At {
                        timestamp: "2018-08-30 18:20".into(),
                    },
                    plot: Some(SlicePlotConfig {
                        output: "spectrum_1820.png".into(),
                        title: None,
                        x_range: Some([SPECTRUM_X_RANGE.0, SPECTRUM_X_RANGE.1]),
                        y_range: Some([SPECTRUM_Y_RANGE.0, SPECTRUM_Y_RANGE.1]),
                        size: None,
                    }),
                    export: None,
                },
                SpectrumJob {
                    variable: "spectrum".into(),
                    selection: SelectionConfig::Range {
                        start: "2018-08-30 00:00".into(),
                        end: "2018-08-30 23:59".into(),
                    },
                    plot: Some(SlicePlotConfig {
                        output: "spectrum_day.png".into(),
                        title: None,
                        x_range: Some([SPECTRUM_X_RANGE.0, SPECTRUM_X_RANGE.1]),
                        y_range: Some([SPECTRUM_Y_RANGE.0, SPECTRUM_Y_RANGE.1]),
                        size: None,
                    }),
                    export: Some("spectrum_day.csv".into()),
                },
            ],
        }
    }

    /// Rain gauge example: mask implausible intensities, convert to mm per minute.
    pub fn pluviometer_template() -> Self {
        JobConfig {
            dataset: "PLUVIO_PREPA2.nc".into(),
            time_dimension: None,
            series: vec![SeriesJob {
                variable: "intensity".into(),
                transforms: vec![
                    TransformConfig::RangeMask { max: 400.0 },
                    TransformConfig::UnitConversion {
                        divisor: 60.0,
                        units: Some("mm".into()),
                    },
                ],
                plot: Some(SeriesPlotConfig {
                    output: "precipitation.png".into(),
                    y_label: Some("Precipitation [mm]".into()),
                    title: None,
                    time_limits: None,
                    value_limits: None,
                    size: None,
                }),
                export: Some("precipitation.parquet".into()),
            }],
            spectra: vec![],
        }
    }
}

fn check_variable(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Config("variable name is empty".into()));
    }
    Ok(())
}

fn check_output(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(Error::Config("output path is empty".into()));
    }
    Ok(())
}

fn check_export(path: &Option<String>) -> Result<()> {
    if let Some(path) = path {
        check_output(path)?;
        TableFormat::from_path(Path::new(path))?;
    }
    Ok(())
}

/// `[lo, hi]` must be finite with `lo < hi`.
pub(crate) fn check_range(what: &str, range: [f64; 2]) -> Result<(f64, f64)> {
    let [lo, hi] = range;
    if !lo.is_finite() || !hi.is_finite() || lo >= hi {
        return Err(Error::Config(format!(
            "{} must satisfy min < max, got [{}, {}]",
            what, lo, hi
        )));
    }
    Ok((lo, hi))
}

fn check_size(size: Option<[u32; 2]>, default: (u32, u32)) -> Result<(u32, u32)> {
    match size {
        None => Ok(default),
        Some([w, h]) if w > 0 && h > 0 => Ok((w, h)),
        Some([w, h]) => Err(Error::Config(format!("figure size must be positive, got {}x{}", w, h))),
    }
}

impl SeriesJob {
    pub fn validate(&self) -> Result<()> {
        check_variable(&self.variable)?;
        for transform in &self.transforms {
            transform.validate()?;
        }
        if let Some(plot) = &self.plot {
            plot.to_options()?;
        }
        check_export(&self.export)
    }
}

impl SeriesPlotConfig {
    pub fn to_options(&self) -> Result<SeriesPlotOptions> {
        check_output(&self.output)?;
        let time = match &self.time_limits {
            Some([start, end]) => {
                let (start, end) = (parse_timestamp(start)?, parse_timestamp(end)?);
                if start >= end {
                    return Err(Error::Config(format!(
                        "time_limits must satisfy start < end, got [{}, {}]",
                        start, end
                    )));
                }
                Some((start, end))
            }
            None => None,
        };
        let value = self
            .value_limits
            .map(|r| check_range("value_limits", r))
            .transpose()?;

        Ok(SeriesPlotOptions {
            size: check_size(self.size, SERIES_FIGURE_SIZE)?,
            limits: AxisLimits { time, value },
            y_label: self.y_label.clone(),
            title: self.title.clone(),
        })
    }
}

impl SpectrumJob {
    pub fn validate(&self) -> Result<()> {
        check_variable(&self.variable)?;
        self.selection.parse()?;
        if let Some(plot) = &self.plot {
            plot.to_options()?;
        }
        check_export(&self.export)
    }
}

impl SelectionConfig {
    /// Parse the timestamps; a range must not end before it starts.
    pub fn parse(&self) -> Result<TimeSelection> {
        match self {
            SelectionConfig::At { timestamp } => Ok(TimeSelection::At(parse_timestamp(timestamp)?)),
            SelectionConfig::Range { start, end } => {
                let (start, end) = (parse_timestamp(start)?, parse_timestamp(end)?);
                if start > end {
                    return Err(Error::Config(format!(
                        "selection range ends before it starts: [{}, {}]",
                        start, end
                    )));
                }
                Ok(TimeSelection::Range(start, end))
            }
        }
    }
}

impl SlicePlotConfig {
    pub fn to_options(&self) -> Result<SlicePlotOptions> {
        check_output(&self.output)?;
        let x_range = match self.x_range {
            Some(r) => check_range("x_range", r)?,
            None => SPECTRUM_X_RANGE,
        };
        let y_range = match self.y_range {
            Some(r) => check_range("y_range", r)?,
            None => SPECTRUM_Y_RANGE,
        };
        Ok(SlicePlotOptions {
            size: check_size(self.size, SLICE_FIGURE_SIZE)?,
            x_range: Some(x_range),
            y_range: Some(y_range),
            title: self.title.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
dataset: DISDRO_IIUNAM.nc
series:
  - variable: intensity
    transforms:
      - { type: range_mask, max: 400 }
      - { type: unit_conversion, divisor: 60 }
    plot: { output: intensity.png, y_label: "Precipitation [mm]" }
    export: intensity.parquet
spectra:
  - variable: spectrum
    selection: { kind: at, timestamp: "2018-08-30 18:20" }
    plot: { output: spectrum.png, x_range: [0, 6], y_range: [0, 10] }
  - variable: spectrum
    selection: { kind: range, start: "2018-08-30 00:00", end: "2018-08-30 23:59" }
"#;

    #[test]
    fn parses_yaml_job() {
        let config = JobConfig::from_yaml(YAML).unwrap();
        config.validate().unwrap();

        assert_eq!(config.dataset, "DISDRO_IIUNAM.nc");
        assert_eq!(config.open_options().time_dimension, "time");
        assert_eq!(config.series[0].transforms.len(), 2);
        assert_eq!(config.spectra.len(), 2);
        assert!(config.spectra[1].plot.is_none());
        assert!(matches!(
            config.spectra[1].selection.parse().unwrap(),
            TimeSelection::Range(_, _)
        ));

        let options = config.spectra[0].plot.as_ref().unwrap().to_options().unwrap();
        assert_eq!(options.x_range, Some((0.0, 6.0)));
        assert_eq!(options.size, SLICE_FIGURE_SIZE);
    }

    #[test]
    fn parses_json_job_with_time_dimension() {
        let json = r#"{
            "dataset": "rain.nc",
            "time_dimension": "t",
            "series": [{"variable": "intensity"}]
        }"#;
        let config = JobConfig::from_json(json).unwrap();
        config.validate().unwrap();
        assert_eq!(config.open_options().time_dimension, "t");
        assert!(config.spectra.is_empty());
    }

    #[test]
    fn malformed_documents_are_config_errors() {
        assert!(matches!(JobConfig::from_json("{"), Err(Error::Config(_))));
        assert!(matches!(
            JobConfig::from_yaml("series: [}"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            JobConfig::from_json(r#"{"series": []}"#),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn validation_catches_bad_fields() {
        let mut config = JobConfig::pluviometer_template();
        config.dataset = " ".into();
        assert!(config.validate().is_err());

        let mut config = JobConfig::pluviometer_template();
        config.series[0].variable.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("series[0]"));

        let mut config = JobConfig::pluviometer_template();
        config.series[0].export = Some("out.xlsx".into());
        assert!(config.validate().is_err());

        let mut config = JobConfig::pluviometer_template();
        config.series[0].transforms.push(TransformConfig::UnitConversion {
            divisor: 0.0,
            units: None,
        });
        assert!(config.validate().is_err());

        let mut config = JobConfig::disdrometer_template();
        config.spectra[0].plot.as_mut().unwrap().x_range = Some([6.0, 0.0]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("spectra[0]"));

        let mut config = JobConfig::disdrometer_template();
        config.spectra[1].selection = SelectionConfig::Range {
            start: "2018-08-31".into(),
            end: "2018-08-30".into(),
        };
        assert!(config.validate().is_err());

        let mut config = JobConfig::disdrometer_template();
        config.spectra[0].selection = SelectionConfig::At {
            timestamp: "yesterday".into(),
        };
        assert!(config.validate().is_err());

        let empty = JobConfig {
            dataset: "rain.nc".into(),
            time_dimension: None,
            series: vec![],
            spectra: vec![],
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn series_plot_options_parse_limits() {
        let plot = SeriesPlotConfig {
            output: "a.svg".into(),
            y_label: None,
            title: None,
            time_limits: Some(["2018-08-30 00:00".into(), "2018-08-31".into()]),
            value_limits: Some([0.0, 10.0]),
            size: Some([800, 300]),
        };
        let options = plot.to_options().unwrap();
        assert_eq!(options.size, (800, 300));
        assert_eq!(options.limits.value, Some((0.0, 10.0)));
        assert!(options.limits.time.is_some());

        let backwards = SeriesPlotConfig {
            time_limits: Some(["2018-08-31".into(), "2018-08-30".into()]),
            ..plot.clone()
        };
        assert!(backwards.to_options().is_err());

        let zero = SeriesPlotConfig {
            size: Some([0, 300]),
            ..plot
        };
        assert!(zero.to_options().is_err());
    }

    #[test]
    fn templates_round_trip_through_both_formats() {
        for template in [JobConfig::disdrometer_template(), JobConfig::pluviometer_template()] {
            template.validate().unwrap();
            assert_eq!(JobConfig::from_json(&template.to_json().unwrap()).unwrap(), template);
            assert_eq!(JobConfig::from_yaml(&template.to_yaml().unwrap()).unwrap(), template);
        }
    }

    #[test]
    fn from_file_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let yaml_path = dir.path().join("job.yaml");
        fs::write(&yaml_path, YAML).unwrap();
        assert_eq!(JobConfig::from_file(&yaml_path).unwrap().spectra.len(), 2);

        let json_path = dir.path().join("job.json");
        fs::write(&json_path, JobConfig::pluviometer_template().to_json().unwrap()).unwrap();
        assert_eq!(
            JobConfig::from_file(&json_path).unwrap(),
            JobConfig::pluviometer_template()
        );

        assert!(matches!(
            JobConfig::from_file(dir.path().join("missing.json")),
            Err(Error::FileNotFound { .. })
        ));
    }
}
