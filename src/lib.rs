//! # ohprecip
//!
//! Reader and viewer for the OH-IIUNAM high-resolution precipitation
//! database: NetCDF files from optical disdrometers and weighing rain gauges
//! around Mexico City, sampled once a minute.
//!
//! ## Features
//!
//! - **Dataset access**: open a file, list variables, decode the CF time axis
//! - **Series**: extract `intensity`, mask implausible values, convert units
//! - **Spectra**: drop-size/fall-velocity grids at a time or summed over a range
//! - **Figures**: line plots and heatmaps as PNG or SVG
//! - **Export**: Parquet or CSV tables via polars
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ohprecip::Dataset;
//!
//! let mut dataset = Dataset::open("PLUVIO_PREPA2.nc")?;
//! println!("{:?}", dataset.variable_names()?);
//!
//! let per_minute = dataset
//!     .series("intensity")?
//!     .mask_above(400.0)
//!     .convert_units(60.0);
//! println!("{}", per_minute);
//!
//! dataset.close()?;
//! # Ok::<(), ohprecip::Error>(())
//! ```
//!
//! ## Jobs
//!
//! ```rust,no_run
//! use ohprecip::{input::JobConfig, run_job};
//!
//! let config = JobConfig::from_file("disdrometer.yaml")?;
//! let report = run_job(&config)?;
//! println!("{} figures written", report.figures.len());
//! # Ok::<(), ohprecip::Error>(())
//! ```

pub mod cli;
pub mod dataset;
pub mod error;
pub mod info;
pub mod input;
pub mod log;
pub mod output;
pub mod plot;
pub mod series;
pub mod slice;
pub mod time;
pub mod transform;

#[cfg(test)]
mod cli_tests;

pub use crate::dataset::{Dataset, OpenOptions, with_dataset};
pub use crate::error::{Error, Result};
pub use crate::plot::{RenderedFigure, plot_series, plot_slice};
pub use crate::series::Series;
pub use crate::slice::{Axis, Slice, SliceSelection};

use crate::input::{JobConfig, SeriesJob, SpectrumJob, TimeSelection};
use crate::log::{show_dataset_summary, show_series_stats};
use crate::output::write_dataframe;
use crate::time::format_timestamp;
use crate::transform::TransformPipeline;
use ::log::{info, warn};
use std::path::PathBuf;

/// What a job produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobReport {
    pub figures: Vec<RenderedFigure>,
    pub exports: Vec<PathBuf>,
    /// Range selections that matched no time step, as `"variable [start, end]"`.
    pub empty_selections: Vec<String>,
}

/// Run every series and spectrum job of `config` against its dataset.
///
/// The dataset is opened once and closed on every exit path. The first
/// failing job aborts the run. A range selection that matches no time step
/// is logged and recorded in the report instead.
///
/// # Errors
///
/// Validation errors of `config`, and any error from reading, plotting or
/// exporting.
pub fn run_job(config: &JobConfig) -> Result<JobReport> {
    config.validate()?;

    with_dataset(&config.dataset, &config.open_options(), |dataset| {
        show_dataset_summary(dataset)?;

        let mut report = JobReport::default();
        for job in &config.series {
            run_series_job(dataset, job, &mut report)?;
        }
        for job in &config.spectra {
            run_spectrum_job(dataset, job, &mut report)?;
        }
        Ok(report)
    })
}

fn run_series_job(dataset: &Dataset, job: &SeriesJob, report: &mut JobReport) -> Result<()> {
    let pipeline = TransformPipeline::from_configs(&job.transforms)?;
    let series = pipeline.execute(&dataset.series(&job.variable)?);
    show_series_stats(&series);

    if let Some(plot) = &job.plot {
        let figure = plot_series(&series, &plot.output, &plot.to_options()?)?;
        info!("Wrote {}", figure.path.display());
        report.figures.push(figure);
    }
    if let Some(export) = &job.export {
        write_dataframe(&series.to_dataframe()?, export)?;
        info!("Exported {}", export);
        report.exports.push(PathBuf::from(export));
    }
    Ok(())
}

fn run_spectrum_job(dataset: &Dataset, job: &SpectrumJob, report: &mut JobReport) -> Result<()> {
    let slice = match job.selection.parse()? {
        TimeSelection::At(timestamp) => dataset.slice_at(&job.variable, timestamp)?,
        TimeSelection::Range(start, end) => {
            match dataset.slice_over_range(&job.variable, start, end)? {
                Some(slice) => slice,
                None => {
                    let label = format!(
                        "{} [{}, {}]",
                        job.variable,
                        format_timestamp(&start),
                        format_timestamp(&end)
                    );
                    warn!("No time steps in {}, skipping", label);
                    report.empty_selections.push(label);
                    return Ok(());
                }
            }
        }
    };
    info!("{}, total {:.3}", slice, slice.total());

    if let Some(plot) = &job.plot {
        let figure = plot_slice(&slice, &plot.output, &plot.to_options()?)?;
        info!("Wrote {}", figure.path.display());
        report.figures.push(figure);
    }
    if let Some(export) = &job.export {
        write_dataframe(&slice.to_dataframe()?, export)?;
        info!("Exported {}", export);
        report.exports.push(PathBuf::from(export));
    }
    Ok(())
}
