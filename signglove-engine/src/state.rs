//! Shared engine state
//!
//! Thread-safe state read by the HTTP surface and written by the session's
//! consumer task. Counters are lock-free; everything else sits behind a
//! tokio `RwLock` (frequent reads, rare writes).

use crate::fusion::{GatePhase, Transcript};
use serde::Serialize;
use signglove_common::events::{GestureEvent, SymbolAction};
use signglove_common::EventBus;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Broadcast buffer for SSE and CLI subscribers
const EVENT_CAPACITY: usize = 256;

/// Lifecycle of the current streaming session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub active: bool,
    pub session_id: Option<Uuid>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl SessionStatus {
    fn idle() -> Self {
        Self {
            active: false,
            session_id: None,
            started_at: None,
        }
    }
}

/// Gate state as last published by the consumer task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateSnapshot {
    pub phase: GatePhase,
    pub streak: u32,
    pub current_class: Option<usize>,
    pub history: Vec<usize>,
}

impl Default for GateSnapshot {
    fn default() -> Self {
        Self {
            phase: GatePhase::Idle,
            streak: 0,
            current_class: None,
            history: Vec::new(),
        }
    }
}

/// Pipeline counters, cumulative across sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CounterSnapshot {
    pub windows_inferred: u64,
    pub symbols_emitted: u64,
    pub tree_hop_aborts: u64,
    pub evaluation_fallbacks: u64,
}

pub struct SharedState {
    events: EventBus,

    session: RwLock<SessionStatus>,
    gate: RwLock<GateSnapshot>,
    transcript: RwLock<Transcript>,

    windows_inferred: AtomicU64,
    symbols_emitted: AtomicU64,
    /// Trees whose contribution was dropped (bad feature index or hop limit)
    tree_hop_aborts: AtomicU64,
    /// Sub-model evaluations replaced by a uniform fallback
    evaluation_fallbacks: AtomicU64,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            events: EventBus::new(EVENT_CAPACITY),
            session: RwLock::new(SessionStatus::idle()),
            gate: RwLock::new(GateSnapshot::default()),
            transcript: RwLock::new(Transcript::new()),
            windows_inferred: AtomicU64::new(0),
            symbols_emitted: AtomicU64::new(0),
            tree_hop_aborts: AtomicU64::new(0),
            evaluation_fallbacks: AtomicU64::new(0),
        }
    }

    /// Broadcast an event; no subscribers is fine
    pub fn broadcast_event(&self, event: GestureEvent) {
        self.events.emit_lossy(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<GestureEvent> {
        self.events.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    pub async fn session_status(&self) -> SessionStatus {
        self.session.read().await.clone()
    }

    pub async fn set_session_started(&self, session_id: Uuid) {
        *self.session.write().await = SessionStatus {
            active: true,
            session_id: Some(session_id),
            started_at: Some(chrono::Utc::now()),
        };
    }

    /// Mark `session_id` stopped; a status already naming another session is left alone
    pub async fn set_session_stopped(&self, session_id: Uuid) {
        let mut status = self.session.write().await;
        if status.session_id == Some(session_id) {
            *status = SessionStatus::idle();
        }
    }

    pub async fn gate_snapshot(&self) -> GateSnapshot {
        self.gate.read().await.clone()
    }

    pub async fn set_gate_snapshot(&self, snapshot: GateSnapshot) {
        *self.gate.write().await = snapshot;
    }

    pub async fn transcript(&self) -> String {
        self.transcript.read().await.text().to_string()
    }

    /// Apply a committed action; returns the resulting text
    pub async fn apply_action(&self, action: &SymbolAction) -> String {
        let mut transcript = self.transcript.write().await;
        transcript.apply(action);
        transcript.text().to_string()
    }

    pub async fn clear_transcript(&self) {
        self.transcript.write().await.clear();
    }

    pub fn record_window(&self, aborted_trees: usize, fallbacks: usize) {
        self.tree_hop_aborts
            .fetch_add(aborted_trees as u64, Ordering::Relaxed);
        self.evaluation_fallbacks
            .fetch_add(fallbacks as u64, Ordering::Relaxed);
        self.windows_inferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_symbol(&self) {
        self.symbols_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counters(&self) -> CounterSnapshot {
        CounterSnapshot {
            windows_inferred: self.windows_inferred.load(Ordering::Relaxed),
            symbols_emitted: self.symbols_emitted.load(Ordering::Relaxed),
            tree_hop_aborts: self.tree_hop_aborts.load(Ordering::Relaxed),
            evaluation_fallbacks: self.evaluation_fallbacks.load(Ordering::Relaxed),
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_status_transitions() {
        let state = SharedState::new();
        assert!(!state.session_status().await.active);

        let id = Uuid::new_v4();
        state.set_session_started(id).await;
        let status = state.session_status().await;
        assert!(status.active);
        assert_eq!(status.session_id, Some(id));

        state.set_session_stopped(id).await;
        assert_eq!(state.session_status().await, SessionStatus::idle());
    }

    #[tokio::test]
    async fn test_stale_stop_keeps_newer_session() {
        let state = SharedState::new();
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();
        state.set_session_started(old).await;
        state.set_session_started(new).await;

        state.set_session_stopped(old).await;
        let status = state.session_status().await;
        assert!(status.active);
        assert_eq!(status.session_id, Some(new));
    }

    #[tokio::test]
    async fn test_transcript_actions() {
        let state = SharedState::new();
        state.apply_action(&SymbolAction::Append { text: "A".to_string() }).await;
        let text = state.apply_action(&SymbolAction::Space).await;
        assert_eq!(text, "A ");
        state.clear_transcript().await;
        assert_eq!(state.transcript().await, "");
    }

    #[test]
    fn test_counters() {
        let state = SharedState::new();
        state.record_window(2, 1);
        state.record_window(0, 0);
        state.record_symbol();
        let counters = state.counters();
        assert_eq!(counters.windows_inferred, 2);
        assert_eq!(counters.symbols_emitted, 1);
        assert_eq!(counters.tree_hop_aborts, 2);
        assert_eq!(counters.evaluation_fallbacks, 1);
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers() {
        let state = SharedState::new();
        state.broadcast_event(GestureEvent::DeviceMessage {
            text: "# ready".to_string(),
            timestamp: chrono::Utc::now(),
        });
        let mut rx = state.subscribe_events();
        state.broadcast_event(GestureEvent::DeviceMessage {
            text: "# batch".to_string(),
            timestamp: chrono::Utc::now(),
        });
        match rx.recv().await.unwrap() {
            GestureEvent::DeviceMessage { text, .. } => assert_eq!(text, "# batch"),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
