//! # Dataset Information
//!
//! Summary of an open dataset (time coverage, dimensions, variables and
//! attributes) and its human, JSON, YAML and CSV renderings.

use crate::dataset::{Dataset, DimensionInfo, VariableInfo};
use crate::error::Result;
use crate::time::format_timestamp;
use anyhow::Context;
use chrono::NaiveDateTime;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Coverage of the decoded time coordinate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeCoverage {
    pub dimension: String,
    pub units: String,
    pub steps: usize,
    pub first: Option<NaiveDateTime>,
    pub last: Option<NaiveDateTime>,
}

/// Everything `info` reports about a dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetInfo {
    pub path: String,
    pub file_size: Option<u64>,
    pub time: TimeCoverage,
    pub dimensions: Vec<DimensionInfo>,
    pub variables: Vec<VariableInfo>,
    pub global_attributes: BTreeMap<String, String>,
    pub total_variables: usize,
    pub total_dimensions: usize,
}

impl DatasetInfo {
    /// Gather information from `dataset`.
    ///
    /// With `variable`, only that variable is listed (and it must exist).
    /// Per-variable and global attributes are only kept when `detailed`.
    pub fn collect(dataset: &Dataset, variable: Option<&str>, detailed: bool) -> Result<Self> {
        debug!("Collecting information for {}", dataset.path().display());

        let all_variables = dataset.variables()?;
        let total_variables = all_variables.len();
        let mut variables = match variable {
            Some(name) => vec![dataset.variable(name)?],
            None => all_variables,
        };
        if !detailed {
            for var in &mut variables {
                var.attributes.clear();
            }
        }

        let dimensions = dataset.dimensions()?;
        let global_attributes = if detailed {
            dataset.global_attributes()?
        } else {
            BTreeMap::new()
        };

        let times = dataset.times();
        Ok(DatasetInfo {
            path: dataset.path().display().to_string(),
            file_size: std::fs::metadata(dataset.path()).ok().map(|m| m.len()),
            time: TimeCoverage {
                dimension: dataset.time_dimension().to_string(),
                units: dataset.time_units().to_string(),
                steps: times.len(),
                first: times.first().copied(),
                last: times.last().copied(),
            },
            total_dimensions: dimensions.len(),
            total_variables,
            dimensions,
            variables,
            global_attributes,
        })
    }
}

/// Human-readable report.
pub fn format_info_human(info: &DatasetInfo) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_human(&mut out, info);
    out
}

fn write_human(out: &mut String, info: &DatasetInfo) -> std::fmt::Result {
    writeln!(out, "Dataset Information:")?;
    writeln!(out, "  Path: {}", info.path)?;
    if let Some(size) = info.file_size {
        writeln!(out, "  File Size: {:.2} MB", size as f64 / 1_048_576.0)?;
    }

    let time = &info.time;
    write!(out, "  Time: {} steps of '{}' ({})", time.steps, time.dimension, time.units)?;
    if let (Some(first), Some(last)) = (&time.first, &time.last) {
        write!(out, " from {} to {}", format_timestamp(first), format_timestamp(last))?;
    }
    writeln!(out)?;

    writeln!(out, "  Dimensions: {} total", info.total_dimensions)?;
    for dim in &info.dimensions {
        writeln!(
            out,
            "    {} ({}{})",
            dim.name,
            dim.length,
            if dim.is_unlimited { ", unlimited" } else { "" }
        )?;
    }

    writeln!(out, "  Variables: {} total", info.total_variables)?;
    for var in &info.variables {
        write!(
            out,
            "    {} ({}) - dimensions: [{}]",
            var.name,
            var.data_type,
            var.dimensions.join(", ")
        )?;
        if let Some(units) = &var.units {
            write!(out, " [{}]", units)?;
        }
        if let Some(long_name) = &var.long_name {
            write!(out, " {}", long_name)?;
        }
        writeln!(out)?;
        for (name, value) in &var.attributes {
            writeln!(out, "      @{}: {}", name, value)?;
        }
    }

    if !info.global_attributes.is_empty() {
        writeln!(out, "  Global Attributes:")?;
        for (name, value) in &info.global_attributes {
            writeln!(out, "    @{}: {}", name, value)?;
        }
    }
    Ok(())
}

/// Variables as CSV rows; the most useful tabular view of a dataset.
pub fn format_info_csv(info: &DatasetInfo) -> String {
    let mut out = String::from("variable_name,data_type,dimensions,shape,units,attributes_count\n");
    for var in &info.variables {
        let shape = var
            .shape
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(";");
        out.push_str(&format!(
            "{},{},\"{}\",\"{}\",{},{}\n",
            var.name,
            var.data_type,
            var.dimensions.join(";"),
            shape,
            var.units.as_deref().unwrap_or(""),
            var.attributes.len()
        ));
    }
    out
}

pub fn print_info_human(info: &DatasetInfo) {
    print!("{}", format_info_human(info));
}

pub fn print_info_json(info: &DatasetInfo) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(info).context("Failed to serialize dataset info to JSON")?;
    println!("{}", json);
    Ok(())
}

pub fn print_info_yaml(info: &DatasetInfo) -> anyhow::Result<()> {
    let yaml = serde_yaml::to_string(info).context("Failed to serialize dataset info to YAML")?;
    println!("{}", yaml);
    Ok(())
}

pub fn print_info_csv(info: &DatasetInfo) {
    print!("{}", format_info_csv(info));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DatasetInfo {
        let t0 = NaiveDateTime::parse_from_str("2018-08-30 18:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        DatasetInfo {
            path: "rain.nc".into(),
            file_size: Some(2_097_152),
            time: TimeCoverage {
                dimension: "time".into(),
                units: "minutes since 2018-08-30 00:00:00".into(),
                steps: 3,
                first: Some(t0),
                last: Some(t0 + chrono::TimeDelta::minutes(2)),
            },
            dimensions: vec![DimensionInfo {
                name: "time".into(),
                length: 3,
                is_unlimited: true,
            }],
            variables: vec![VariableInfo {
                name: "intensity".into(),
                data_type: "f64".into(),
                dimensions: vec!["time".into()],
                shape: vec![3],
                units: Some("mm/h".into()),
                long_name: Some("rain intensity".into()),
                attributes: BTreeMap::from([("units".to_string(), "mm/h".to_string())]),
            }],
            global_attributes: BTreeMap::from([("station".to_string(), "A".to_string())]),
            total_variables: 2,
            total_dimensions: 1,
        }
    }

    #[test]
    fn human_report_lists_everything() {
        let text = format_info_human(&sample());
        assert!(text.contains("File Size: 2.00 MB"));
        assert!(text.contains("3 steps of 'time'"));
        assert!(text.contains("from 2018-08-30 18:00:00 to 2018-08-30 18:02:00"));
        assert!(text.contains("time (3, unlimited)"));
        assert!(text.contains("intensity (f64) - dimensions: [time] [mm/h] rain intensity"));
        assert!(text.contains("@units: mm/h"));
        assert!(text.contains("Global Attributes:"));
    }

    #[test]
    fn csv_has_one_row_per_variable() {
        let csv = format_info_csv(&sample());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "intensity,f64,\"time\",\"3\",mm/h,1");
    }

    #[test]
    fn serializes_to_json_and_yaml() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["time"]["steps"], 3);
        assert_eq!(json["variables"][0]["units"], "mm/h");

        let yaml = serde_yaml::to_string(&sample()).unwrap();
        assert!(yaml.contains("total_variables: 2"));
    }
}
