use crate::dataset::Dataset;
use crate::error::Result;
use crate::input::{JobConfig, SelectionConfig};
use crate::series::Series;
use crate::time::format_timestamp;
use log::{debug, info};
use std::time::Duration;

pub fn show_greeting(config_path: &str) {
    info!("=== OH-IIUNAM Precipitation Viewer ===");
    info!("Loading job from: {}", config_path);
}

pub fn config_echo(config: &JobConfig) {
    info!("Configuration:");
    info!("  Dataset: {}", config.dataset);
    if let Some(dim) = &config.time_dimension {
        info!("  Time dimension: {}", dim);
    }
    info!("  Series jobs: {}", config.series.len());
    for (i, job) in config.series.iter().enumerate() {
        let transforms: Vec<&str> = job.transforms.iter().map(|t| t.kind()).collect();
        info!(
            "    Series {}: {} [{}]",
            i + 1,
            job.variable,
            transforms.join(" -> ")
        );
    }
    info!("  Spectrum jobs: {}", config.spectra.len());
    for (i, job) in config.spectra.iter().enumerate() {
        match &job.selection {
            SelectionConfig::At { timestamp } => {
                info!("    Spectrum {}: {} at {}", i + 1, job.variable, timestamp)
            }
            SelectionConfig::Range { start, end } => {
                info!("    Spectrum {}: {} summed over [{}, {}]", i + 1, job.variable, start, end)
            }
        }
    }
}

pub fn show_dataset_summary(dataset: &Dataset) -> Result<()> {
    info!("Dataset: {}", dataset.path().display());
    let times = dataset.times();
    if let (Some(first), Some(last)) = (times.first(), times.last()) {
        info!(
            "  {} time steps from {} to {}",
            times.len(),
            format_timestamp(first),
            format_timestamp(last)
        );
    }
    info!("  Variables: {}", dataset.variable_names()?.join(", "));
    for dim in dataset.dimensions()? {
        debug!("  Dimension {}: {}", dim.name, dim.length);
    }
    Ok(())
}

pub fn show_series_stats(series: &Series) {
    let stats = series.stats();
    info!(
        "{}: {} of {} values valid, total {:.3}{}",
        series.name(),
        stats.valid,
        stats.count,
        stats.sum,
        series.units().map(|u| format!(" {}", u)).unwrap_or_default()
    );
    if let (Some(min), Some(max), Some(mean)) = (stats.min, stats.max, stats.mean) {
        debug!("  min {:.3}, max {:.3}, mean {:.3}", min, max, mean);
    }
}

pub fn show_farewell_with_timing(elapsed: Duration) {
    info!("=== Job completed in {:.2}s ===", elapsed.as_secs_f64());
}
