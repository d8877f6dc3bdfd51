//! # Series Transforms
//!
//! A small framework for rescaling and cleaning a [`Series`] after
//! extraction and before plotting or export.
//!
//! ## Built-in Transforms
//! - **UnitConversion**: divide every value by a constant (`mm/h` → `mm` per minute)
//! - **RangeMask**: replace values above a plausibility threshold with NaN
//!
//! ## Example
//! ```rust
//! use ohprecip::transform::{TransformConfig, TransformPipeline};
//!
//! let pipeline = TransformPipeline::from_configs(&[
//!     TransformConfig::RangeMask { max: 400.0 },
//!     TransformConfig::UnitConversion { divisor: 60.0, units: Some("mm".into()) },
//! ])
//! .unwrap();
//! assert_eq!(pipeline.len(), 2);
//! ```

use crate::error::{Error, Result};
use crate::series::Series;
use log::debug;
use serde::{Deserialize, Serialize};

/// A pure transformation of a series.
pub trait SeriesTransform: Send + Sync {
    /// Return the transformed series; `series` itself is left untouched.
    fn apply(&self, series: &Series) -> Series;

    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// One-line description of what the transform does.
    fn description(&self) -> String;
}

/// Serializable form of a transform, as used in job files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformConfig {
    /// Divide every value by `divisor`, optionally relabelling the units.
    UnitConversion {
        divisor: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        units: Option<String>,
    },
    /// Mask every value strictly greater than `max`.
    RangeMask { max: f64 },
}

impl TransformConfig {
    /// Check the parameters without building the transform.
    pub fn validate(&self) -> Result<()> {
        match self {
            TransformConfig::UnitConversion { divisor, .. } => {
                if !divisor.is_finite() || *divisor == 0.0 {
                    return Err(Error::Config(format!(
                        "unit conversion divisor must be finite and non-zero, got {}",
                        divisor
                    )));
                }
            }
            TransformConfig::RangeMask { max } => {
                if max.is_nan() {
                    return Err(Error::Config("range mask threshold must not be NaN".into()));
                }
            }
        }
        Ok(())
    }

    pub fn to_transform(&self) -> Result<Box<dyn SeriesTransform>> {
        self.validate()?;
        match self {
            TransformConfig::UnitConversion { divisor, units } => {
                Ok(Box::new(UnitConversion::new(*divisor, units.clone())))
            }
            TransformConfig::RangeMask { max } => Ok(Box::new(RangeMask::new(*max))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TransformConfig::UnitConversion { .. } => "unit_conversion",
            TransformConfig::RangeMask { .. } => "range_mask",
        }
    }
}

/// `v ↦ v / divisor`.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitConversion {
    divisor: f64,
    units: Option<String>,
}

impl UnitConversion {
    pub fn new(divisor: f64, units: Option<String>) -> Self {
        UnitConversion { divisor, units }
    }
}

impl SeriesTransform for UnitConversion {
    fn apply(&self, series: &Series) -> Series {
        let converted = series.convert_units(self.divisor);
        match &self.units {
            Some(units) => converted.with_units(Some(units.clone())),
            None => converted,
        }
    }

    fn name(&self) -> &str {
        "UnitConversion"
    }

    fn description(&self) -> String {
        format!("divide values by {}", self.divisor)
    }
}

/// Masks implausible values (above `max`) as missing.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeMask {
    max: f64,
}

impl RangeMask {
    pub fn new(max: f64) -> Self {
        RangeMask { max }
    }
}

impl SeriesTransform for RangeMask {
    fn apply(&self, series: &Series) -> Series {
        series.mask_above(self.max)
    }

    fn name(&self) -> &str {
        "RangeMask"
    }

    fn description(&self) -> String {
        format!("mask values above {}", self.max)
    }
}

/// Ordered chain of transforms.
#[derive(Default)]
pub struct TransformPipeline {
    transforms: Vec<Box<dyn SeriesTransform>>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: &[TransformConfig]) -> Result<Self> {
        let mut pipeline = TransformPipeline::new();
        for config in configs {
            pipeline.add(config.to_transform()?);
        }
        Ok(pipeline)
    }

    pub fn add(&mut self, transform: Box<dyn SeriesTransform>) {
        self.transforms.push(transform);
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Apply every transform in order.
    pub fn execute(&self, series: &Series) -> Series {
        let mut current = series.clone();
        for (i, transform) in self.transforms.iter().enumerate() {
            debug!(
                "Transform {} '{}' on '{}': {}",
                i + 1,
                transform.name(),
                series.name(),
                transform.description()
            );
            current = transform.apply(&current);
            debug!(
                "'{}' now has {} of {} valid values",
                current.name(),
                current.valid_count(),
                current.len()
            );
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, TimeDelta};

    fn series(values: Vec<f64>) -> Series {
        let t0 = NaiveDateTime::parse_from_str("2018-08-30 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let times = (0..values.len())
            .map(|i| t0 + TimeDelta::minutes(i as i64))
            .collect();
        Series::new("intensity", times, values)
            .unwrap()
            .with_units(Some("mm/h".into()))
    }

    #[test]
    fn config_from_json() {
        let json = r#"[
            {"type": "range_mask", "max": 400},
            {"type": "unit_conversion", "divisor": 60, "units": "mm"}
        ]"#;
        let configs: Vec<TransformConfig> = serde_json::from_str(json).unwrap();
        assert_eq!(configs[0], TransformConfig::RangeMask { max: 400.0 });
        assert_eq!(configs[0].kind(), "range_mask");
        assert_eq!(
            configs[1],
            TransformConfig::UnitConversion {
                divisor: 60.0,
                units: Some("mm".into())
            }
        );
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let zero = TransformConfig::UnitConversion {
            divisor: 0.0,
            units: None,
        };
        assert!(matches!(zero.validate(), Err(Error::Config(_))));
        assert!(zero.to_transform().is_err());
        assert!(TransformConfig::RangeMask { max: f64::NAN }.validate().is_err());
        assert!(TransformConfig::RangeMask { max: f64::INFINITY }.validate().is_ok());
    }

    #[test]
    fn pipeline_masks_then_converts() {
        let pipeline = TransformPipeline::from_configs(&[
            TransformConfig::RangeMask { max: 400.0 },
            TransformConfig::UnitConversion {
                divisor: 60.0,
                units: Some("mm".into()),
            },
        ])
        .unwrap();

        let source = series(vec![120.0, 450.0, 60.0]);
        let out = pipeline.execute(&source);
        assert_eq!(out.values()[0], 2.0);
        assert!(out.values()[1].is_nan());
        assert_eq!(out.values()[2], 1.0);
        assert_eq!(out.units(), Some("mm"));
        assert_eq!(source.values(), &[120.0, 450.0, 60.0]);
        assert_eq!(source.units(), Some("mm/h"));
    }

    #[test]
    fn empty_pipeline_is_identity() {
        let pipeline = TransformPipeline::new();
        assert!(pipeline.is_empty());
        let source = series(vec![1.0, 2.0]);
        assert_eq!(pipeline.execute(&source), source);
    }
}
