//! Error types for signglove-engine
//!
//! Per-line and per-window failures never surface through these types: they
//! are recovered where they happen. What remains are setup errors (config,
//! model loading, session startup) and the typed inference errors a sub-model
//! reports before the engine replaces its output with a uniform fallback.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for signglove-engine
#[derive(Error, Debug)]
pub enum Error {
    /// Shared configuration / IO / serialization errors
    #[error(transparent)]
    Common(#[from] signglove_common::Error),

    /// Configuration values failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// A model artifact could not be loaded
    #[error("Model load error: {0}")]
    ModelLoad(#[from] ModelLoadError),

    /// A sub-model failed for one window
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    /// Session lifecycle errors (e.g. no usable model)
    #[error("Session error: {0}")]
    Session(String),

    /// Device command channel errors
    #[error("Device error: {0}")]
    Device(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using signglove-engine Error
pub type Result<T> = std::result::Result<T, Error>;

/// Typed model-artifact load failure
///
/// Loading is atomic: any of these means no model was loaded and the caller
/// should fall back to the degraded (uniform) predictor.
#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("artifact not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("unparseable artifact: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("tree {tree}: {reason}")]
    Invalid { tree: usize, reason: String },

    #[error("artifact metadata invalid: {0}")]
    Metadata(String),

    #[error("allocation failed while loading {what}")]
    Allocation { what: &'static str },

    #[error("forest has no trees")]
    EmptyForest,

    #[error("tensor shape mismatch: expected {expected:?}, got {actual:?}")]
    Shape { expected: Vec<usize>, actual: Vec<usize> },
}

/// Failure of one sub-model on one window
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("input shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("output had {actual} classes, expected {expected}")]
    OutputClasses { expected: usize, actual: usize },

    #[error("output contained non-finite values")]
    NonFinite,

    #[error("runtime failure: {0}")]
    Runtime(String),

    #[error("evaluation exceeded its {0} ms budget")]
    Timeout(u64),

    #[error("evaluation task failed: {0}")]
    Join(String),

    #[error("model is not loaded")]
    NotLoaded,
}
