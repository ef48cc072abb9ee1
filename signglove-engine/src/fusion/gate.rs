//! Confidence + stability gate
//!
//! Turns the per-window stream of fused decisions into debounced symbol
//! actions. A symbol fires once per streak of identical best classes: at
//! the first window where the streak has reached `stability_threshold` and
//! the best class clears `confidence_threshold`. Holding the same gesture
//! longer never repeats the symbol; the streak has to break first.
//!
//! State is owned by the session's consumer task and reset on every session
//! start and stop.

use super::FusedDecision;
use crate::models::{LabelSet, SymbolKind};
use serde::{Deserialize, Serialize};
use signglove_common::events::SymbolAction;
use std::collections::VecDeque;
use tracing::{debug, trace};

/// What the neutral class does when committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeutralPolicy {
    /// Emit a word separator
    #[default]
    Space,
    /// Emit nothing
    Suppress,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GateConfig {
    pub stability_threshold: u32,
    pub confidence_threshold: f32,
    pub neutral_policy: NeutralPolicy,
    /// Committed class indices kept for observability
    pub history_len: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            stability_threshold: 3,
            confidence_threshold: 0.5,
            neutral_policy: NeutralPolicy::Space,
            history_len: 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePhase {
    /// No streak yet
    Idle,
    /// Streak running, nothing committed for it
    Accumulating,
    /// Symbol already committed for the current streak
    Committed,
}

/// A committed symbol
#[derive(Debug, Clone, PartialEq)]
pub struct GateDecision {
    /// `None` when the neutral class is committed under [`NeutralPolicy::Suppress`]
    pub action: Option<SymbolAction>,
    pub class_index: usize,
    pub label: String,
    pub confidence: f32,
    pub streak: u32,
}

#[derive(Debug, Clone)]
pub struct SymbolGate {
    config: GateConfig,
    labels: LabelSet,
    phase: GatePhase,
    current_class: Option<usize>,
    streak: u32,
    history: VecDeque<usize>,
}

impl SymbolGate {
    pub fn new(config: GateConfig, labels: LabelSet) -> Self {
        Self {
            config,
            labels,
            phase: GatePhase::Idle,
            current_class: None,
            streak: 0,
            history: VecDeque::new(),
        }
    }

    /// Feed one window's decision
    ///
    /// Returns `Some` exactly when this window commits its streak.
    pub fn observe(&mut self, decision: &FusedDecision) -> Option<GateDecision> {
        if self.current_class == Some(decision.best_class) {
            self.streak = self.streak.saturating_add(1);
        } else {
            self.current_class = Some(decision.best_class);
            self.streak = 1;
            self.phase = GatePhase::Accumulating;
        }

        trace!(
            "Gate: class {} streak {} confidence {:.3}",
            decision.best_class,
            self.streak,
            decision.confidence
        );

        if self.phase == GatePhase::Committed {
            return None;
        }
        if self.streak < self.config.stability_threshold
            || decision.confidence < self.config.confidence_threshold
        {
            return None;
        }

        self.phase = GatePhase::Committed;
        self.history.push_back(decision.best_class);
        while self.history.len() > self.config.history_len {
            self.history.pop_front();
        }

        let label = self.labels.label(decision.best_class);
        let action = match self.labels.kind(decision.best_class) {
            SymbolKind::Letter(text) => Some(SymbolAction::Append { text }),
            SymbolKind::Backspace => Some(SymbolAction::Delete),
            SymbolKind::Neutral => match self.config.neutral_policy {
                NeutralPolicy::Space => Some(SymbolAction::Space),
                NeutralPolicy::Suppress => None,
            },
        };
        debug!(
            "Gate committed class {} ({}) after {} windows at {:.3}",
            decision.best_class, label, self.streak, decision.confidence
        );

        Some(GateDecision {
            action,
            class_index: decision.best_class,
            label,
            confidence: decision.confidence,
            streak: self.streak,
        })
    }

    /// Back to `Idle` with empty history
    pub fn reset(&mut self) {
        self.phase = GatePhase::Idle;
        self.current_class = None;
        self.streak = 0;
        self.history.clear();
    }

    pub fn phase(&self) -> GatePhase {
        self.phase
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn current_class(&self) -> Option<usize> {
        self.current_class
    }

    pub fn history(&self) -> Vec<usize> {
        self.history.iter().copied().collect()
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClassProbabilities;

    fn decision(best_class: usize, confidence: f32) -> FusedDecision {
        FusedDecision {
            probabilities: ClassProbabilities::uniform(5),
            best_class,
            confidence,
        }
    }

    fn gate(policy: NeutralPolicy) -> SymbolGate {
        let config = GateConfig {
            neutral_policy: policy,
            ..Default::default()
        };
        SymbolGate::new(config, LabelSet::default_for(5, "neutral", "backspace"))
    }

    #[test]
    fn test_emits_once_on_third_window() {
        let mut gate = gate(NeutralPolicy::Space);
        assert!(gate.observe(&decision(0, 0.9)).is_none());
        assert_eq!(gate.phase(), GatePhase::Accumulating);
        assert!(gate.observe(&decision(0, 0.9)).is_none());

        let committed = gate.observe(&decision(0, 0.9)).unwrap();
        assert_eq!(committed.action, Some(SymbolAction::Append { text: "A".to_string() }));
        assert_eq!(committed.streak, 3);
        assert_eq!(gate.phase(), GatePhase::Committed);

        // Held gesture does not repeat
        for _ in 0..5 {
            assert!(gate.observe(&decision(0, 0.9)).is_none());
        }
        assert_eq!(gate.history(), vec![0]);
    }

    #[test]
    fn test_low_confidence_defers_commit() {
        let mut gate = gate(NeutralPolicy::Space);
        for _ in 0..3 {
            assert!(gate.observe(&decision(1, 0.4)).is_none());
        }
        assert_eq!(gate.phase(), GatePhase::Accumulating);
        let committed = gate.observe(&decision(1, 0.6)).unwrap();
        assert_eq!(committed.streak, 4);
    }

    #[test]
    fn test_broken_streak_restarts() {
        let mut gate = gate(NeutralPolicy::Space);
        gate.observe(&decision(0, 0.9));
        gate.observe(&decision(0, 0.9));
        gate.observe(&decision(1, 0.9));
        assert_eq!(gate.streak(), 1);
        assert!(gate.observe(&decision(0, 0.9)).is_none());
        assert!(gate.observe(&decision(0, 0.9)).is_none());
        assert!(gate.observe(&decision(0, 0.9)).is_some());
    }

    #[test]
    fn test_backspace_and_neutral_actions() {
        let mut gate = gate(NeutralPolicy::Space);
        for _ in 0..2 {
            gate.observe(&decision(4, 0.9));
        }
        assert_eq!(gate.observe(&decision(4, 0.9)).unwrap().action, Some(SymbolAction::Delete));

        for _ in 0..2 {
            gate.observe(&decision(3, 0.9));
        }
        assert_eq!(gate.observe(&decision(3, 0.9)).unwrap().action, Some(SymbolAction::Space));
    }

    #[test]
    fn test_suppressed_neutral_commits_without_action() {
        let mut gate = gate(NeutralPolicy::Suppress);
        gate.observe(&decision(3, 0.9));
        gate.observe(&decision(3, 0.9));
        let committed = gate.observe(&decision(3, 0.9)).unwrap();
        assert_eq!(committed.action, None);
        assert_eq!(gate.phase(), GatePhase::Committed);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut gate = gate(NeutralPolicy::Space);
        for _ in 0..3 {
            gate.observe(&decision(0, 0.9));
        }
        gate.reset();
        assert_eq!(gate.phase(), GatePhase::Idle);
        assert_eq!(gate.streak(), 0);
        assert!(gate.history().is_empty());
        assert!(gate.observe(&decision(0, 0.9)).is_none());
    }

    #[test]
    fn test_history_is_bounded() {
        let config = GateConfig {
            stability_threshold: 1,
            history_len: 2,
            ..Default::default()
        };
        let mut gate = SymbolGate::new(config, LabelSet::default_for(5, "neutral", "backspace"));
        for class in [0, 1, 2] {
            assert!(gate.observe(&decision(class, 0.9)).is_some());
        }
        assert_eq!(gate.history(), vec![1, 2]);
    }
}
