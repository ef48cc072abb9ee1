//! Class labels and their symbol semantics

use crate::error::ModelLoadError;
use std::path::Path;
use tracing::warn;

pub const DEFAULT_NEUTRAL_LABEL: &str = "neutral";
pub const DEFAULT_BACKSPACE_LABEL: &str = "backspace";

/// What committing a class means for the transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    Letter(String),
    Neutral,
    Backspace,
}

/// Ordered class names, one per model output class
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSet {
    labels: Vec<String>,
    neutral: String,
    backspace: String,
}

impl LabelSet {
    /// Wrap an explicit label list
    pub fn new(labels: Vec<String>, neutral: impl Into<String>, backspace: impl Into<String>) -> Self {
        Self {
            labels,
            neutral: neutral.into(),
            backspace: backspace.into(),
        }
    }

    /// Default labelling: `A`, `B`, ... then the neutral and backspace sentinels
    ///
    /// Classes past `Z` are named `class_<i>`.
    pub fn default_for(num_classes: usize, neutral: &str, backspace: &str) -> Self {
        let letters = num_classes.saturating_sub(2);
        let mut labels: Vec<String> = (0..letters)
            .map(|i| {
                if i < 26 {
                    char::from(b'A' + i as u8).to_string()
                } else {
                    format!("class_{}", i)
                }
            })
            .collect();
        match num_classes {
            0 => {}
            1 => labels.push(neutral.to_string()),
            _ => {
                labels.push(neutral.to_string());
                labels.push(backspace.to_string());
            }
        }
        Self::new(labels, neutral, backspace)
    }

    /// Parse a JSON array of strings or a newline-separated list
    pub fn parse(text: &str) -> Result<Vec<String>, ModelLoadError> {
        let trimmed = text.trim_start();
        if trimmed.starts_with('[') {
            return Ok(serde_json::from_str(trimmed)?);
        }
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Load labels for a model with `num_classes` outputs
    ///
    /// A missing, unreadable or mismatched file falls back to
    /// [`LabelSet::default_for`].
    pub fn load_or_default(path: Option<&Path>, num_classes: usize, neutral: &str, backspace: &str) -> Self {
        let Some(path) = path else {
            return Self::default_for(num_classes, neutral, backspace);
        };

        let loaded = std::fs::read_to_string(path)
            .map_err(ModelLoadError::from)
            .and_then(|text| Self::parse(&text));

        match loaded {
            Ok(labels) if labels.len() == num_classes => Self::new(labels, neutral, backspace),
            Ok(labels) => {
                warn!(
                    "Label file {} lists {} labels for {} classes, using default labels",
                    path.display(),
                    labels.len(),
                    num_classes
                );
                Self::default_for(num_classes, neutral, backspace)
            }
            Err(e) => {
                warn!("Failed to load labels from {}: {}, using default labels", path.display(), e);
                Self::default_for(num_classes, neutral, backspace)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Label text for a class; `class_<i>` when out of range
    pub fn label(&self, class_index: usize) -> String {
        self.labels
            .get(class_index)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_index))
    }

    pub fn kind(&self, class_index: usize) -> SymbolKind {
        let label = self.label(class_index);
        if label.eq_ignore_ascii_case(&self.neutral) {
            SymbolKind::Neutral
        } else if label.eq_ignore_ascii_case(&self.backspace) {
            SymbolKind::Backspace
        } else {
            SymbolKind::Letter(label)
        }
    }
}
