//! Sequence-model adapter
//!
//! The recurrent model itself is an opaque numeric runtime reached through
//! [`SequenceRuntime`]: a `[1, W, 10]` tensor goes in, a `[1, numClasses]`
//! vector comes out. This module only owns the boundary: shape validation at
//! load, buffer marshalling per window, and output checking.

use crate::error::{InferenceError, ModelLoadError};
use crate::types::{ClassProbabilities, RECORD_ARITY};
use crate::window::Window;
use std::fmt;
use std::sync::Arc;

/// Tolerance for treating runtime output as an already-normalized distribution
const DISTRIBUTION_TOLERANCE: f32 = 1e-3;

/// External numeric runtime hosting the sequence model
///
/// Implementations must be callable concurrently from the blocking pool.
pub trait SequenceRuntime: Send + Sync {
    /// Declared input shape, `[batch, timesteps, features]`
    fn input_shape(&self) -> [usize; 3];

    /// Output class count, detected from the artifact
    fn num_classes(&self) -> usize;

    /// Run one forward pass over row-major input data
    fn run(&self, input: &[f32]) -> Result<Vec<f32>, InferenceError>;
}

/// Sequence model wrapped behind the fixed tensor contract
#[derive(Clone)]
pub struct SequenceModelAdapter {
    runtime: Option<Arc<dyn SequenceRuntime>>,
    window_length: usize,
    num_classes: usize,
    degraded_reason: Option<String>,
}

impl fmt::Debug for SequenceModelAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceModelAdapter")
            .field("loaded", &self.runtime.is_some())
            .field("window_length", &self.window_length)
            .field("num_classes", &self.num_classes)
            .field("degraded_reason", &self.degraded_reason)
            .finish()
    }
}

impl SequenceModelAdapter {
    /// Wrap a runtime, checking it against the `[1, window_length, 10]` contract
    pub fn new(runtime: Arc<dyn SequenceRuntime>, window_length: usize) -> Result<Self, ModelLoadError> {
        let expected = [1, window_length, RECORD_ARITY];
        let actual = runtime.input_shape();
        if actual != expected {
            return Err(ModelLoadError::Shape {
                expected: expected.to_vec(),
                actual: actual.to_vec(),
            });
        }

        let num_classes = runtime.num_classes();
        if num_classes < 2 {
            return Err(ModelLoadError::Shape {
                expected: vec![1, 2],
                actual: vec![1, num_classes],
            });
        }

        Ok(Self {
            runtime: Some(runtime),
            window_length,
            num_classes,
            degraded_reason: None,
        })
    }

    /// Adapter with no runtime; every prediction is uniform
    pub fn degraded(window_length: usize, num_classes: usize, reason: impl Into<String>) -> Self {
        Self {
            runtime: None,
            window_length,
            num_classes,
            degraded_reason: Some(reason.into()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.runtime.is_none()
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        self.degraded_reason.as_deref()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn window_length(&self) -> usize {
        self.window_length
    }

    /// Run the model on one window
    ///
    /// The window must already be fixed to `window_length` rows.
    pub fn evaluate(&self, window: &Window) -> Result<ClassProbabilities, InferenceError> {
        let runtime = self.runtime.as_ref().ok_or(InferenceError::NotLoaded)?;

        let input = window.tensor();
        let expected = self.window_length * RECORD_ARITY;
        if input.len() != expected {
            return Err(InferenceError::ShapeMismatch {
                expected,
                actual: input.len(),
            });
        }

        let output = runtime.run(&input)?;
        if output.len() != self.num_classes {
            return Err(InferenceError::OutputClasses {
                expected: self.num_classes,
                actual: output.len(),
            });
        }
        if output.iter().any(|v| !v.is_finite()) {
            return Err(InferenceError::NonFinite);
        }

        // Models exported with a softmax head already return a distribution
        match ClassProbabilities::from_distribution(output.clone(), DISTRIBUTION_TOLERANCE) {
            Some(probabilities) => Ok(probabilities),
            None => {
                let logits: Vec<f64> = output.iter().map(|&v| v as f64).collect();
                Ok(ClassProbabilities::from_logits(&logits))
            }
        }
    }

    /// Class probabilities; uniform when degraded or on runtime failure
    pub fn predict(&self, window: &Window) -> ClassProbabilities {
        self.evaluate(window)
            .unwrap_or_else(|_| ClassProbabilities::uniform(self.num_classes))
    }
}
