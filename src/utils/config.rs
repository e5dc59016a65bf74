//! Run configuration: sensor, sample count, pacing, filter bounds, optional deadline.
//!
//! Defaults reproduce the reference run: 200 samples every 200 ms from "sensor-A",
//! keeping values in [-50, 100] that are at least 30 °C.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

use crate::pipeline::{
    filter::FilterBounds,
    generator::{NoiseSource, SampleCount},
};
use crate::utils::error::{PipelineError, Result};

pub const DEFAULT_SENSOR_ID: &str = "sensor-A";
pub const DEFAULT_SAMPLES: i64 = 200;
pub const DEFAULT_INTERVAL_MS: u64 = 200;
pub const DEFAULT_MIN_C: f64 = -50.0;
pub const DEFAULT_MAX_C: f64 = 100.0;
pub const DEFAULT_THRESHOLD_C: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sensor_id: String,
    /// `<= 0` runs until cancelled.
    pub samples: i64,
    pub interval: Duration,
    pub bounds: FilterBounds,
    pub noise: NoiseSource,
    /// Cancel the run once this much time has passed.
    pub deadline: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sensor_id: DEFAULT_SENSOR_ID.to_string(),
            samples: DEFAULT_SAMPLES,
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            bounds: FilterBounds::new(DEFAULT_MIN_C, DEFAULT_MAX_C, DEFAULT_THRESHOLD_C),
            noise: NoiseSource::default(),
            deadline: None,
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON config; missing fields fall back to defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn sample_count(&self) -> SampleCount {
        SampleCount::from_signed(self.samples)
    }

    pub fn validate(&self) -> Result<()> {
        let FilterBounds { min, max, threshold } = self.bounds;
        if min.is_nan() || max.is_nan() || threshold.is_nan() {
            return Err(PipelineError::InvalidConfig(
                "filter bounds must not be NaN".into(),
            ));
        }
        if min > max {
            return Err(PipelineError::InvalidConfig(format!(
                "min ({}) must not exceed max ({})",
                min, max
            )));
        }
        let NoiseSource { base, spread } = self.noise;
        if !base.is_finite() || !spread.is_finite() {
            return Err(PipelineError::InvalidConfig(
                "noise base and spread must be finite".into(),
            ));
        }
        if spread < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "noise spread ({}) must not be negative",
                spread
            )));
        }
        // The sampler draws from a range 2*spread wide around base.
        if !(2.0 * spread).is_finite()
            || !self.noise.lower_bound().is_finite()
            || !self.noise.upper_bound().is_finite()
        {
            return Err(PipelineError::InvalidConfig(format!(
                "noise range {} ± {} overflows",
                base, spread
            )));
        }
        if self.sensor_id.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("sensor id is empty".into()));
        }
        Ok(())
    }
}
