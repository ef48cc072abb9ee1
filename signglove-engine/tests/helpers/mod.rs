//! Test Helper Utilities
//!
//! Shared fixtures for signglove-engine integration tests

#![allow(dead_code)]

pub mod forest;
pub mod runtime;
pub mod session;
pub mod telemetry;

pub use forest::{biased_forest_json, write_temp};
pub use runtime::ScriptedRuntime;
pub use session::{
    drain_events, scripted_session, scripted_session_with_sink, wait_for_gate_streak, wait_for_windows, TestSession,
    TEST_WINDOW,
};
pub use telemetry::{data_line, telemetry_batch, HEADER_LINE};
