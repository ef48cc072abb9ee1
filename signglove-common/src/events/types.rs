//! Supporting types carried inside gesture events

use serde::{Deserialize, Serialize};

/// Text action produced when the gate commits a symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SymbolAction {
    /// Append a letter (or multi-character label) to the transcript
    Append { text: String },
    /// Append a word separator
    Space,
    /// Remove the last character of the transcript
    Delete,
}

impl std::fmt::Display for SymbolAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolAction::Append { text } => write!(f, "Append({})", text),
            SymbolAction::Space => write!(f, "Space"),
            SymbolAction::Delete => write!(f, "Delete"),
        }
    }
}

/// Which of the two sub-models an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Recurrent sequence model behind the runtime adapter
    Sequence,
    /// Boosted tree ensemble
    TreeEnsemble,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::Sequence => write!(f, "sequence"),
            ModelKind::TreeEnsemble => write!(f, "tree_ensemble"),
        }
    }
}

/// Window accumulation strategy of a streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowMode {
    /// Collect exactly one window, infer, clear, repeat
    Batch,
    /// Keep the most recent window and infer every `stride` new records
    Sliding,
}

impl std::fmt::Display for WindowMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowMode::Batch => write!(f, "batch"),
            WindowMode::Sliding => write!(f, "sliding"),
        }
    }
}

impl std::str::FromStr for WindowMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "batch" => Ok(WindowMode::Batch),
            "sliding" => Ok(WindowMode::Sliding),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown window mode '{}' (expected batch or sliding)",
                other
            ))),
        }
    }
}
