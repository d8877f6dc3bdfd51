//! # CLI Module
//!
//! Command-line interface of `ohprecip`:
//! - Argument parsing with clap (derive)
//! - Environment variable fallbacks with the `OHPRECIP_` prefix
//! - Value parsers for ranges, timestamps and time windows
//! - Job file templates

use crate::input::{JobConfig, TimeSelection};
use crate::plot::{
    AxisLimits, SERIES_FIGURE_SIZE, SLICE_FIGURE_SIZE, SPECTRUM_X_RANGE, SPECTRUM_Y_RANGE,
    SeriesPlotOptions, SlicePlotOptions,
};
use crate::time::parse_timestamp;
use crate::transform::TransformConfig;
use chrono::NaiveDateTime;
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Reader and viewer for the OH-IIUNAM precipitation database
#[derive(Parser, Debug)]
#[command(name = "ohprecip")]
#[command(about = "Inspect, plot and export OH-IIUNAM precipitation NetCDF files")]
#[command(version)]
#[command(long_about = "
ohprecip reads the OH-IIUNAM high-resolution precipitation database
(disdrometer and rain gauge NetCDF files, one record per minute).

FEATURES:
  • Dataset inspection: dimensions, variables, attributes, time coverage
  • Rain intensity series: masking, unit conversion, line plots, export
  • Drop-size spectra: at one timestamp or summed over a range, as heatmaps
  • Job files: JSON or YAML, with templates
  • Shell completions: bash, zsh, fish and PowerShell

EXAMPLES:
  # What is in the file?
  ohprecip info DISDRO_IIUNAM.nc

  # Rain per minute, ignoring intensities above 400 mm/h
  ohprecip series PLUVIO_PREPA2.nc --mask-above 400 --divide-by 60 \\
    --plot precipitation.png --y-label 'Precipitation [mm]'

  # Spectrum at one minute, and summed over a day
  ohprecip spectrum DISDRO_IIUNAM.nc --at '2018-08-30 18:20' --plot spectrum.png
  ohprecip spectrum DISDRO_IIUNAM.nc --from 2018-08-30 --to '2018-08-30 23:59' \\
    --plot day.png --export day.parquet

  # Run a job file
  ohprecip template disdrometer --format yaml -o job.yaml
  ohprecip run job.yaml
")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode - suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format for structured data
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Job file path (JSON or YAML)
    #[arg(short, long, global = true, env = "OHPRECIP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show dimensions, variables and time coverage of a dataset
    #[command(long_about = "
Show the structure of a dataset: its decoded time coverage, dimensions
and variables. With --detailed, variable and global attributes are
listed as well.

EXAMPLES:
  ohprecip info DISDRO_IIUNAM.nc
  ohprecip info DISDRO_IIUNAM.nc --detailed -n spectrum
  ohprecip info PLUVIO_PREPA2.nc --format json
")]
    Info {
        /// NetCDF file to inspect
        #[arg(value_name = "FILE", env = "OHPRECIP_DATASET")]
        file: PathBuf,

        /// Include attributes
        #[arg(short, long)]
        detailed: bool,

        /// Only show this variable
        #[arg(short = 'n', long)]
        variable: Option<String>,

        /// Output format (overrides --output-format)
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,

        /// Name of the time dimension
        #[arg(long, default_value = "time")]
        time_dimension: String,
    },

    /// Extract a time series, optionally mask and rescale it, then plot or export it
    #[command(long_about = "
Extract a one-dimensional variable along time. Values above --mask-above
are treated as missing, then every value is divided by --divide-by.
Missing values leave gaps in the plot and nulls in the export.

EXAMPLES:
  ohprecip series PLUVIO_PREPA2.nc --mask-above 400 --divide-by 60 --plot p.png
  ohprecip series DISDRO_IIUNAM.nc --export intensity.csv
  ohprecip series DISDRO_IIUNAM.nc --plot day.svg \\
    --time-limits '2018-08-30 00:00,2018-08-31 00:00' --value-limits 0:120
")]
    Series(SeriesArgs),

    /// Plot or export a spectrum at one timestamp or summed over a range
    #[command(long_about = "
Take the (velocity, diameter) grid of a (time, velocity, diameter)
variable, either at exactly one timestamp (--at) or summed over every
record in an inclusive range (--from/--to). Missing cells are skipped
by the sum. A range with no records is reported and produces no output.

EXAMPLES:
  ohprecip spectrum DISDRO_IIUNAM.nc --at '2018-08-30 18:20' --plot s.png
  ohprecip spectrum DISDRO_IIUNAM.nc --from '2018-08-30 00:00' \\
    --to '2018-08-30 23:59' --plot day.svg --x-range 0:8 --y-range 0:12
")]
    Spectrum(SpectrumArgs),

    /// Run a job file
    Run {
        /// Job file (falls back to --config)
        #[arg(value_name = "CONFIG")]
        config: Option<PathBuf>,
    },

    /// Parse and validate a job file without running it
    Validate {
        /// Job file (falls back to --config)
        #[arg(value_name = "CONFIG")]
        config: Option<PathBuf>,

        /// Print the parsed job
        #[arg(short, long)]
        detailed: bool,
    },

    /// Generate an example job file
    #[command(long_about = "
Generate an example job file.

Available templates:
• disdrometer: intensity series plus spectra at a time and over a day
• pluviometer: masked intensity converted to precipitation per minute

EXAMPLES:
  ohprecip template disdrometer
  ohprecip template pluviometer --format yaml -o pluvio.yaml
")]
    Template {
        /// Template type to generate
        #[arg(value_enum)]
        template_type: TemplateType,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Configuration format
        #[arg(long, value_enum, default_value_t = ConfigFormat::Json)]
        format: ConfigFormat,
    },

    /// Generate shell completions
    #[command(long_about = "
Generate shell completion scripts for bash, zsh, fish and PowerShell.

EXAMPLES:
  ohprecip completions bash > ~/.bash_completion.d/ohprecip
  ohprecip completions zsh -o _ohprecip
")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct SeriesArgs {
    /// NetCDF file to read
    #[arg(value_name = "FILE", env = "OHPRECIP_DATASET")]
    pub file: PathBuf,

    /// Variable to extract
    #[arg(short = 'n', long, default_value = "intensity", env = "OHPRECIP_VARIABLE")]
    pub variable: String,

    /// Treat values above this threshold as missing
    #[arg(long, env = "OHPRECIP_MASK_ABOVE", allow_hyphen_values = true)]
    pub mask_above: Option<f64>,

    /// Divide every value by this factor (60 turns mm/h into mm per minute)
    #[arg(long, env = "OHPRECIP_DIVIDE_BY", value_parser = parse_divisor)]
    pub divide_by: Option<f64>,

    /// Units label after --divide-by
    #[arg(long, requires = "divide_by")]
    pub units: Option<String>,

    /// Write a line plot (.svg, otherwise PNG)
    #[arg(long)]
    pub plot: Option<PathBuf>,

    /// Write a table (.parquet, .pq or .csv)
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Y axis label of the plot
    #[arg(long)]
    pub y_label: Option<String>,

    /// Displayed time window: 'START,END'
    #[arg(long, value_parser = parse_time_limits)]
    pub time_limits: Option<TimeLimitsArg>,

    /// Displayed value window: 'MIN:MAX'
    #[arg(long, value_parser = parse_range, allow_hyphen_values = true)]
    pub value_limits: Option<RangeArg>,

    /// Name of the time dimension
    #[arg(long, default_value = "time")]
    pub time_dimension: String,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("selection").required(true).args(["at", "from"])))]
pub struct SpectrumArgs {
    /// NetCDF file to read
    #[arg(value_name = "FILE", env = "OHPRECIP_DATASET")]
    pub file: PathBuf,

    /// Variable to slice
    #[arg(short = 'n', long, default_value = "spectrum")]
    pub variable: String,

    /// Take the grid at exactly this timestamp
    #[arg(long, value_parser = parse_timestamp_arg)]
    pub at: Option<NaiveDateTime>,

    /// First timestamp of a summed range (inclusive)
    #[arg(long, value_parser = parse_timestamp_arg, requires = "to")]
    pub from: Option<NaiveDateTime>,

    /// Last timestamp of a summed range (inclusive)
    #[arg(long, value_parser = parse_timestamp_arg, requires = "from")]
    pub to: Option<NaiveDateTime>,

    /// Write a heatmap (.svg, otherwise PNG)
    #[arg(long)]
    pub plot: Option<PathBuf>,

    /// Write a long-format table (.parquet, .pq or .csv)
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Displayed x (diameter) window: 'MIN:MAX'
    #[arg(long, value_parser = parse_range, allow_hyphen_values = true)]
    pub x_range: Option<RangeArg>,

    /// Displayed y (velocity) window: 'MIN:MAX'
    #[arg(long, value_parser = parse_range, allow_hyphen_values = true)]
    pub y_range: Option<RangeArg>,

    /// Name of the time dimension
    #[arg(long, default_value = "time")]
    pub time_dimension: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON structured output
    Json,
    /// YAML structured output
    Yaml,
    /// CSV output (where applicable)
    Csv,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateType {
    /// Optical disdrometer: intensity and drop-size spectra
    Disdrometer,
    /// Weighing rain gauge: intensity only
    Pluviometer,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON configuration format
    Json,
    /// YAML configuration format
    Yaml,
}

/// A `MIN:MAX` pair from the command line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RangeArg {
    pub min: f64,
    pub max: f64,
}

/// A `START,END` time window from the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeLimitsArg {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Parse a range from a command line argument.
/// Format: min:max
fn parse_range(s: &str) -> Result<RangeArg, String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 {
        return Err("Range must be in format 'min:max'".to_string());
    }

    let min = parts[0]
        .trim()
        .parse::<f64>()
        .map_err(|_| "Invalid minimum value in range")?;
    let max = parts[1]
        .trim()
        .parse::<f64>()
        .map_err(|_| "Invalid maximum value in range")?;

    if !min.is_finite() || !max.is_finite() {
        return Err("Range bounds must be finite".to_string());
    }
    if min >= max {
        return Err("Minimum value must be less than maximum value".to_string());
    }

    Ok(RangeArg { min, max })
}

/// Parse a time window from a command line argument.
/// Format: start,end
fn parse_time_limits(s: &str) -> Result<TimeLimitsArg, String> {
    let (start, end) = s
        .split_once(',')
        .ok_or("Time limits must be in format 'start,end'")?;
    let start = parse_timestamp_arg(start)?;
    let end = parse_timestamp_arg(end)?;

    if start >= end {
        return Err("Start of time limits must be before the end".to_string());
    }
    Ok(TimeLimitsArg { start, end })
}

fn parse_timestamp_arg(s: &str) -> Result<NaiveDateTime, String> {
    parse_timestamp(s.trim()).map_err(|e| e.to_string())
}

fn parse_divisor(s: &str) -> Result<f64, String> {
    let value = s
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid divisor '{}'", s))?;
    if !value.is_finite() || value == 0.0 {
        return Err("Divisor must be finite and non-zero".to_string());
    }
    Ok(value)
}

impl SeriesArgs {
    /// Mask first, then convert, so the threshold applies to raw values.
    pub fn transforms(&self) -> Vec<TransformConfig> {
        let mut transforms = Vec::new();
        if let Some(max) = self.mask_above {
            transforms.push(TransformConfig::RangeMask { max });
        }
        if let Some(divisor) = self.divide_by {
            transforms.push(TransformConfig::UnitConversion {
                divisor,
                units: self.units.clone(),
            });
        }
        transforms
    }

    pub fn plot_options(&self) -> SeriesPlotOptions {
        SeriesPlotOptions {
            size: SERIES_FIGURE_SIZE,
            limits: AxisLimits {
                time: self.time_limits.map(|t| (t.start, t.end)),
                value: self.value_limits.map(|r| (r.min, r.max)),
            },
            y_label: self.y_label.clone(),
            title: None,
        }
    }
}

impl SpectrumArgs {
    pub fn selection(&self) -> Result<TimeSelection, String> {
        match (self.at, self.from, self.to) {
            (Some(at), None, None) => Ok(TimeSelection::At(at)),
            (None, Some(start), Some(end)) if start <= end => Ok(TimeSelection::Range(start, end)),
            (None, Some(_), Some(_)) => Err("--from must not be after --to".to_string()),
            _ => Err("Give either --at or both --from and --to".to_string()),
        }
    }

    pub fn plot_options(&self) -> SlicePlotOptions {
        SlicePlotOptions {
            size: SLICE_FIGURE_SIZE,
            x_range: Some(self.x_range.map_or(SPECTRUM_X_RANGE, |r| (r.min, r.max))),
            y_range: Some(self.y_range.map_or(SPECTRUM_Y_RANGE, |r| (r.min, r.max))),
            title: None,
        }
    }
}

/// The job file of a `run`/`validate` command: the positional argument wins
/// over the global `--config` (or `OHPRECIP_CONFIG`).
pub fn resolve_config_path(positional: Option<PathBuf>, global: Option<PathBuf>) -> Option<PathBuf> {
    positional.or(global)
}

pub fn template(template_type: TemplateType) -> JobConfig {
    match template_type {
        TemplateType::Disdrometer => JobConfig::disdrometer_template(),
        TemplateType::Pluviometer => JobConfig::pluviometer_template(),
    }
}

pub fn render_template(template_type: TemplateType, format: ConfigFormat) -> crate::Result<String> {
    let config = template(template_type);
    match format {
        ConfigFormat::Json => config.to_json(),
        ConfigFormat::Yaml => config.to_yaml(),
    }
}

#[cfg(test)]
static ENV_TEST_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Exclusive access to the `OHPRECIP_*` environment for one test.
///
/// The variables are cleared on creation and restored on drop, so parsing
/// does not depend on what the developer's shell exports.
#[cfg(test)]
pub(crate) struct EnvGuard {
    saved: Vec<(&'static str, Option<String>)>,
    _lock: std::sync::MutexGuard<'static, ()>,
}

#[cfg(test)]
impl EnvGuard {
    const KEYS: [&'static str; 5] = [
        "OHPRECIP_CONFIG",
        "OHPRECIP_DATASET",
        "OHPRECIP_VARIABLE",
        "OHPRECIP_MASK_ABOVE",
        "OHPRECIP_DIVIDE_BY",
    ];

    pub(crate) fn clean() -> Self {
        let lock = ENV_TEST_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let saved = Self::KEYS
            .iter()
            .map(|&key| (key, std::env::var(key).ok()))
            .collect();
        for key in Self::KEYS {
            // SAFETY: every test touching these variables holds ENV_TEST_MUTEX
            unsafe { std::env::remove_var(key) };
        }
        EnvGuard { saved, _lock: lock }
    }

    pub(crate) fn set(&self, key: &str, value: &str) {
        // SAFETY: see `clean`
        unsafe { std::env::set_var(key, value) };
    }
}

#[cfg(test)]
impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            // SAFETY: the lock is released only after this loop
            unsafe {
                match value {
                    Some(v) => std::env::set_var(key, v),
                    None => std::env::remove_var(key),
                }
            }
        }
    }
}
