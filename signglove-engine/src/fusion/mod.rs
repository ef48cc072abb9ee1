//! Fusion & gating
//!
//! [`fuse`] blends the two sub-model distributions into one decision;
//! [`SymbolGate`] debounces the stream of decisions into symbol actions;
//! [`Transcript`] applies those actions to running text.

pub mod gate;
pub mod transcript;

pub use gate::{GateConfig, GateDecision, GatePhase, NeutralPolicy, SymbolGate};
pub use transcript::Transcript;

use crate::error::{Error, Result};
use crate::types::ClassProbabilities;
use serde::{Deserialize, Serialize};

/// Weight-sum tolerance accepted by [`FusionWeights::new`]
pub const WEIGHT_SUM_TOLERANCE: f32 = 1e-3;

/// Blend weights; always sum to 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    sequence: f32,
    tree: f32,
}

impl FusionWeights {
    pub fn new(sequence: f32, tree: f32) -> Result<Self> {
        let in_range = |w: f32| w.is_finite() && (0.0..=1.0).contains(&w);
        if !in_range(sequence) || !in_range(tree) {
            return Err(Error::Config(format!(
                "fusion weights must be within [0, 1], got {} / {}",
                sequence, tree
            )));
        }
        if (sequence + tree - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(Error::Config(format!(
                "fusion weights must sum to 1, got {} + {} = {}",
                sequence,
                tree,
                sequence + tree
            )));
        }
        Ok(Self { sequence, tree })
    }

    pub fn sequence(&self) -> f32 {
        self.sequence
    }

    pub fn tree(&self) -> f32 {
        self.tree
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            sequence: 0.6,
            tree: 0.4,
        }
    }
}

/// Fused distribution plus its best class
#[derive(Debug, Clone, PartialEq)]
pub struct FusedDecision {
    pub probabilities: ClassProbabilities,
    pub best_class: usize,
    pub confidence: f32,
}

impl FusedDecision {
    /// Decision over a uniform distribution; best class 0
    pub fn uniform(num_classes: usize) -> Self {
        let probabilities = ClassProbabilities::uniform(num_classes);
        let confidence = probabilities.get(0).unwrap_or(0.0);
        Self {
            probabilities,
            best_class: 0,
            confidence,
        }
    }
}

/// `fused[c] = w_seq * seq[c] + w_tree * tree[c]`
///
/// Returns `None` when the distributions disagree on class count or are
/// empty. Ties on the best class go to the lowest index.
pub fn fuse(
    sequence: &ClassProbabilities,
    tree: &ClassProbabilities,
    weights: FusionWeights,
) -> Option<FusedDecision> {
    if sequence.len() != tree.len() || sequence.is_empty() {
        return None;
    }

    let fused: Vec<f32> = sequence
        .as_slice()
        .iter()
        .zip(tree.as_slice())
        .map(|(&s, &t)| weights.sequence * s + weights.tree * t)
        .collect();

    let probabilities = ClassProbabilities::from_distribution(fused, 1e-3)?;
    let best_class = probabilities.argmax()?;
    let confidence = probabilities.get(best_class)?;
    Some(FusedDecision {
        probabilities,
        best_class,
        confidence,
    })
}
