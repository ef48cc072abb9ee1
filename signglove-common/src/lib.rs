//! # SignGlove Common Library
//!
//! Shared code for the SignGlove workspace:
//! - Error and result types
//! - Bootstrap configuration file resolution and TOML loading
//! - Event types (GestureEvent enum) and the broadcast EventBus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{EventBus, GestureEvent};
