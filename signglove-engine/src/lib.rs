//! # SignGlove Engine Library (signglove-engine)
//!
//! Gesture recognition pipeline for a sensor glove.
//!
//! **Purpose:** Reassemble the glove's fragmented telemetry stream into
//! records, window them, run a sequence model and a boosted-tree ensemble on
//! each window, fuse the two and gate the result into letter, space and
//! delete actions.
//!
//! **Architecture:** raw chunks → [`stream`] → [`window`] →
//! ([`models::SequenceModelAdapter`], [`models::TreeEnsembleEvaluator`]) →
//! [`fusion`] → symbol events, orchestrated by [`session`] and exposed over
//! HTTP/SSE by [`api`].

pub mod api;
pub mod calibration;
pub mod config;
pub mod device;
pub mod error;
pub mod fusion;
pub mod models;
pub mod session;
pub mod state;
pub mod stream;
pub mod types;
pub mod window;

pub use error::{Error, InferenceError, ModelLoadError, Result};
pub use state::SharedState;
pub use types::{ClassProbabilities, Record};
