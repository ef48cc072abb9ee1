//! Per-user bend-sensor calibration
//!
//! A profile maps raw bend readings onto `[0, 1]` using a rest baseline and
//! a full-flex maximum per sensor. The JSON layout matches what the device
//! calibration tooling writes, either bare or wrapped with user metadata:
//!
//! ```json
//! { "username": "ana", "isCalibrated": true,
//!   "calibrationData": { "sensorBaselines": [..], "sensorMaximums": [..],
//!                        "sensorMinimums": [..], "calibrationTimestamp": 1700000000000 } }
//! ```

use crate::error::{Error, Result};
use crate::types::{Record, FLEX_SENSOR_COUNT};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationProfile {
    pub sensor_baselines: Vec<f32>,
    pub sensor_maximums: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_minimums: Option<Vec<f32>>,
    /// Capture time, milliseconds since the Unix epoch
    pub calibration_timestamp: i64,
}

/// Profile with the user metadata the device tooling stores alongside it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationFile {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_is_calibrated")]
    pub is_calibrated: bool,
    pub calibration_data: CalibrationProfile,
}

fn default_is_calibrated() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProfileDocument {
    Wrapped(CalibrationFile),
    Bare(CalibrationProfile),
}

impl CalibrationProfile {
    /// Build a profile from a rest capture and a full-flex capture
    ///
    /// Baselines are the per-sensor mean at rest, maximums the per-sensor
    /// peak while flexed, minimums the per-sensor floor at rest.
    pub fn from_captures(rest: &[Record], flex: &[Record]) -> Result<Self> {
        if rest.is_empty() {
            return Err(Error::Config("rest capture contains no records".to_string()));
        }
        if flex.is_empty() {
            return Err(Error::Config("flex capture contains no records".to_string()));
        }

        let mut sums = [0.0f64; FLEX_SENSOR_COUNT];
        let mut minimums = [f32::INFINITY; FLEX_SENSOR_COUNT];
        for record in rest {
            for (i, value) in record.flex().into_iter().enumerate() {
                sums[i] += value as f64;
                minimums[i] = minimums[i].min(value);
            }
        }

        let mut maximums = [f32::NEG_INFINITY; FLEX_SENSOR_COUNT];
        for record in flex {
            for (i, value) in record.flex().into_iter().enumerate() {
                maximums[i] = maximums[i].max(value);
            }
        }

        Ok(Self {
            sensor_baselines: sums.iter().map(|s| (s / rest.len() as f64) as f32).collect(),
            sensor_maximums: maximums.to_vec(),
            sensor_minimums: Some(minimums.to_vec()),
            calibration_timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Read a bare or wrapped profile document
    pub fn from_json_str(text: &str) -> Result<Self> {
        let document: ProfileDocument = serde_json::from_str(text)
            .map_err(|e| Error::Config(format!("invalid calibration profile: {}", e)))?;
        let profile = match document {
            ProfileDocument::Wrapped(file) => file.calibration_data,
            ProfileDocument::Bare(profile) => profile,
        };
        profile.validate()?;
        Ok(profile)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sensor_baselines.len() != FLEX_SENSOR_COUNT
            || self.sensor_maximums.len() != FLEX_SENSOR_COUNT
        {
            return Err(Error::Config(format!(
                "calibration profile needs {} baselines and maximums, got {} and {}",
                FLEX_SENSOR_COUNT,
                self.sensor_baselines.len(),
                self.sensor_maximums.len()
            )));
        }
        let all_finite = self
            .sensor_baselines
            .iter()
            .chain(&self.sensor_maximums)
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(Error::Config("calibration profile has non-finite values".to_string()));
        }
        Ok(())
    }

    /// `(raw - baseline) / (max - baseline)` clipped to `[0, 1]`
    ///
    /// A sensor with zero span normalizes to 0.
    pub fn normalize(&self, sensor: usize, raw: f32) -> f32 {
        let (Some(&baseline), Some(&maximum)) =
            (self.sensor_baselines.get(sensor), self.sensor_maximums.get(sensor))
        else {
            return 0.0;
        };
        let span = maximum - baseline;
        if span == 0.0 {
            return 0.0;
        }
        ((raw - baseline) / span).clamp(0.0, 1.0)
    }

    /// Copy of `record` with its bend values normalized
    pub fn apply(&self, record: &Record) -> Record {
        let raw = record.flex();
        let mut normalized = [0.0f32; FLEX_SENSOR_COUNT];
        for (i, value) in normalized.iter_mut().enumerate() {
            *value = self.normalize(i, raw[i]);
        }
        // Normalized values are always finite
        record.with_flex(normalized).unwrap_or(*record)
    }

    /// Wrap with user metadata for saving
    pub fn into_file(self, username: Option<String>) -> CalibrationFile {
        CalibrationFile {
            username,
            is_calibrated: true,
            calibration_data: self,
        }
    }
}
