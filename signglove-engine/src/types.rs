//! Core data model shared by every pipeline stage
//!
//! - [`Record`]: one validated sensor sample (10 finite scalars)
//! - [`ClassProbabilities`]: a per-class distribution summing to 1

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of scalar features in one record
pub const RECORD_ARITY: usize = 10;

/// Number of bend (flex) sensors at the head of each record
pub const FLEX_SENSOR_COUNT: usize = 5;

/// Contract window length (records per inference window)
pub const DEFAULT_WINDOW_LENGTH: usize = 75;

/// Field names of the 10-field wire variant, in order
pub const FIELD_NAMES: [&str; RECORD_ARITY] = [
    "flex1", "flex2", "flex3", "flex4", "flex5", "roll_deg", "pitch_deg", "ax_g", "ay_g", "az_g",
];

/// One sensor sample: five normalized bend values, roll/pitch in degrees,
/// three acceleration components in g
///
/// Invariant: all values are finite. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Record {
    values: [f32; RECORD_ARITY],
}

/// Why a tuple could not become a [`Record`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("expected {expected} values, got {actual}")]
    Arity { expected: usize, actual: usize },

    #[error("value {index} is not finite")]
    NonFinite { index: usize },
}

impl Record {
    /// Validate and wrap 10 values
    pub fn new(values: [f32; RECORD_ARITY]) -> Result<Self, RecordError> {
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(RecordError::NonFinite { index });
        }
        Ok(Self { values })
    }

    /// Validate a slice of exactly 10 values
    pub fn from_slice(values: &[f32]) -> Result<Self, RecordError> {
        let array: [f32; RECORD_ARITY] = values.try_into().map_err(|_| RecordError::Arity {
            expected: RECORD_ARITY,
            actual: values.len(),
        })?;
        Self::new(array)
    }

    /// All-zero record, used for post-padding short windows
    pub const fn zero() -> Self {
        Self {
            values: [0.0; RECORD_ARITY],
        }
    }

    pub fn values(&self) -> &[f32; RECORD_ARITY] {
        &self.values
    }

    /// Bend sensor values (flex1..flex5)
    pub fn flex(&self) -> [f32; FLEX_SENSOR_COUNT] {
        let mut flex = [0.0; FLEX_SENSOR_COUNT];
        flex.copy_from_slice(&self.values[..FLEX_SENSOR_COUNT]);
        flex
    }

    pub fn roll_deg(&self) -> f32 {
        self.values[5]
    }

    pub fn pitch_deg(&self) -> f32 {
        self.values[6]
    }

    /// Acceleration (ax, ay, az) in g
    pub fn accel_g(&self) -> [f32; 3] {
        [self.values[7], self.values[8], self.values[9]]
    }

    /// Copy of this record with the bend values replaced
    pub fn with_flex(&self, flex: [f32; FLEX_SENSOR_COUNT]) -> Result<Self, RecordError> {
        let mut values = self.values;
        values[..FLEX_SENSOR_COUNT].copy_from_slice(&flex);
        Self::new(values)
    }
}

/// Renders the 10-field wire form (`flex1,...,az_g`)
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}

/// Per-class scores summing to 1 (post-softmax)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities(Vec<f32>);

impl ClassProbabilities {
    /// Uniform distribution over `num_classes` classes
    ///
    /// This is the fallback contribution of any sub-model that failed to
    /// load or evaluate.
    pub fn uniform(num_classes: usize) -> Self {
        if num_classes == 0 {
            return Self(Vec::new());
        }
        Self(vec![1.0 / num_classes as f32; num_classes])
    }

    /// Numerically stabilized softmax over raw scores
    ///
    /// Subtracts the maximum before exponentiating. Non-finite logits are
    /// treated as very negative so one bad score cannot poison the output.
    pub fn from_logits(logits: &[f64]) -> Self {
        if logits.is_empty() {
            return Self(Vec::new());
        }

        let max = logits
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(f64::NEG_INFINITY, f64::max);

        if !max.is_finite() {
            return Self::uniform(logits.len());
        }

        let exps: Vec<f64> = logits
            .iter()
            .map(|&v| if v.is_finite() { (v - max).exp() } else { 0.0 })
            .collect();
        let sum: f64 = exps.iter().sum();

        Self(exps.iter().map(|e| (e / sum) as f32).collect())
    }

    /// Accept an already-normalized distribution
    ///
    /// Returns `None` when any value is negative or non-finite, or when the
    /// values do not sum to 1 within `tolerance`.
    pub fn from_distribution(values: Vec<f32>, tolerance: f32) -> Option<Self> {
        if values.is_empty() || values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return None;
        }
        let sum: f64 = values.iter().map(|&v| v as f64).sum();
        if (sum - 1.0).abs() > tolerance as f64 {
            return None;
        }
        Some(Self(values))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn get(&self, class_index: usize) -> Option<f32> {
        self.0.get(class_index).copied()
    }

    /// Index of the highest probability; ties go to the lowest index
    pub fn argmax(&self) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &p) in self.0.iter().enumerate() {
            match best {
                Some((_, best_p)) if p <= best_p => {}
                _ => best = Some((i, p)),
            }
        }
        best.map(|(i, _)| i)
    }
}

impl From<ClassProbabilities> for Vec<f32> {
    fn from(probs: ClassProbabilities) -> Self {
        probs.0
    }
}
