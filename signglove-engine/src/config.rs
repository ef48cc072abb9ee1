//! Engine configuration
//!
//! Bootstrap TOML, resolved by [`signglove_common::config::ConfigFileResolver`]
//! (CLI flag, `SIGNGLOVE_CONFIG`, user config dir). Every field has a
//! built-in default; CLI flags are applied on top by the binary before
//! [`EngineConfig::validate`] runs.

use crate::error::{Error, Result};
use crate::fusion::{FusionWeights, GateConfig, NeutralPolicy};
use crate::models::labels::{DEFAULT_BACKSPACE_LABEL, DEFAULT_NEUTRAL_LABEL};
use crate::stream::ReassemblerConfig;
use crate::types::DEFAULT_WINDOW_LENGTH;
use serde::{Deserialize, Serialize};
use signglove_common::config::{load_toml_or_default, ConfigFileResolver, LoggingConfig};
use signglove_common::events::WindowMode;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name looked up in the standard locations
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub gate: GateSettings,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Longest partial line kept between chunks
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_length")]
    pub length: usize,
    #[serde(default = "default_window_mode")]
    pub mode: WindowMode,
    /// New records between inferences in sliding mode
    #[serde(default = "default_stride")]
    pub stride: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default)]
    pub tree_model: Option<PathBuf>,
    #[serde(default)]
    pub labels: Option<PathBuf>,
    /// Trailing residual slot of the tree feature vector
    #[serde(default)]
    pub residual: f32,
    /// Per-tree hop budget; 0 uses the tree's node count
    #[serde(default)]
    pub max_tree_hops: usize,
    /// Per-window evaluation budget; 0 disables it
    #[serde(default)]
    pub inference_timeout_ms: u64,
    /// Class count assumed when no model reports one
    #[serde(default)]
    pub num_classes: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    #[serde(default = "default_sequence_weight")]
    pub sequence_weight: f32,
    #[serde(default = "default_tree_weight")]
    pub tree_weight: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateSettings {
    #[serde(default = "default_stability_threshold")]
    pub stability_threshold: u32,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_neutral_label")]
    pub neutral_label: String,
    #[serde(default = "default_backspace_label")]
    pub backspace_label: String,
    #[serde(default)]
    pub neutral_policy: NeutralPolicy,
    #[serde(default = "default_history_len")]
    pub history_len: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default)]
    pub profile: Option<PathBuf>,
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_max_line_bytes() -> usize {
    1024
}

fn default_window_length() -> usize {
    DEFAULT_WINDOW_LENGTH
}

fn default_window_mode() -> WindowMode {
    WindowMode::Batch
}

fn default_stride() -> usize {
    15
}

fn default_sequence_weight() -> f32 {
    0.6
}

fn default_tree_weight() -> f32 {
    0.4
}

fn default_stability_threshold() -> u32 {
    3
}

fn default_confidence_threshold() -> f32 {
    0.5
}

fn default_neutral_label() -> String {
    DEFAULT_NEUTRAL_LABEL.to_string()
}

fn default_backspace_label() -> String {
    DEFAULT_BACKSPACE_LABEL.to_string()
}

fn default_history_len() -> usize {
    16
}

fn default_port() -> u16 {
    5780
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            length: default_window_length(),
            mode: default_window_mode(),
            stride: default_stride(),
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            tree_model: None,
            labels: None,
            residual: 0.0,
            max_tree_hops: 0,
            inference_timeout_ms: 0,
            num_classes: None,
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            sequence_weight: default_sequence_weight(),
            tree_weight: default_tree_weight(),
        }
    }
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            stability_threshold: default_stability_threshold(),
            confidence_threshold: default_confidence_threshold(),
            neutral_label: default_neutral_label(),
            backspace_label: default_backspace_label(),
            neutral_policy: NeutralPolicy::default(),
            history_len: default_history_len(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

impl EngineConfig {
    /// Resolve and load the bootstrap file; absent files yield defaults
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = ConfigFileResolver::new(CONFIG_FILE_NAME).resolve(cli_path);
        let config: Self = load_toml_or_default(path.as_deref())?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window.length == 0 {
            return Err(Error::Config("window.length must be greater than 0".to_string()));
        }
        if self.window.mode == WindowMode::Sliding
            && (self.window.stride == 0 || self.window.stride > self.window.length)
        {
            return Err(Error::Config(format!(
                "window.stride must be within 1..={}, got {}",
                self.window.length, self.window.stride
            )));
        }
        self.delimiter()?;
        if self.stream.max_line_bytes == 0 {
            return Err(Error::Config("stream.max_line_bytes must be greater than 0".to_string()));
        }
        if !self.models.residual.is_finite() {
            return Err(Error::Config("models.residual must be finite".to_string()));
        }
        self.fusion_weights()?;
        if self.gate.stability_threshold == 0 {
            return Err(Error::Config("gate.stability_threshold must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.gate.confidence_threshold) {
            return Err(Error::Config(format!(
                "gate.confidence_threshold must be within [0, 1], got {}",
                self.gate.confidence_threshold
            )));
        }
        Ok(())
    }

    /// Single-character field delimiter
    pub fn delimiter(&self) -> Result<char> {
        let mut chars = self.stream.delimiter.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            (None, _) => Err(Error::Config("stream.delimiter must not be empty".to_string())),
            (Some(_), Some(_)) => Err(Error::Config(format!(
                "stream.delimiter must be a single character, got '{}'",
                self.stream.delimiter
            ))),
        }
    }

    pub fn reassembler_config(&self) -> Result<ReassemblerConfig> {
        Ok(ReassemblerConfig {
            delimiter: self.delimiter()?,
            max_line_bytes: self.stream.max_line_bytes,
        })
    }

    pub fn fusion_weights(&self) -> Result<FusionWeights> {
        FusionWeights::new(self.fusion.sequence_weight, self.fusion.tree_weight)
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            stability_threshold: self.gate.stability_threshold,
            confidence_threshold: self.gate.confidence_threshold,
            neutral_policy: self.gate.neutral_policy,
            history_len: self.gate.history_len,
        }
    }

    pub fn inference_timeout(&self) -> Option<Duration> {
        match self.models.inference_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn max_tree_hops(&self) -> Option<usize> {
        match self.models.max_tree_hops {
            0 => None,
            hops => Some(hops),
        }
    }
}
