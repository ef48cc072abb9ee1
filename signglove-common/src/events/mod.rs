//! Event types for the SignGlove event system
//!
//! Provides shared event definitions and the EventBus used by the engine,
//! the HTTP/SSE surface and the CLI output path.

mod types;

pub use types::{ModelKind, SymbolAction, WindowMode};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Gesture pipeline events
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GestureEvent {
    /// Streaming session started (gate reset, reassembler active)
    SessionStarted {
        session_id: Uuid,
        window_length: usize,
        mode: WindowMode,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Streaming session stopped; any partial window was discarded
    SessionStopped {
        session_id: Uuid,
        windows_inferred: u64,
        symbols_emitted: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One window went through both sub-models and fusion
    ///
    /// Emitted for every window, committed or not. The degraded flags say
    /// whether a sub-model contributed a uniform fallback for this window.
    WindowInferred {
        session_id: Uuid,
        window_index: u64,
        best_class: usize,
        label: String,
        confidence: f32,
        sequence_degraded: bool,
        tree_degraded: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The gate committed a symbol
    SymbolEmitted {
        session_id: Uuid,
        /// Per-session emission counter, starting at 1
        sequence: u64,
        action: SymbolAction,
        class_index: usize,
        label: String,
        confidence: f32,
        window_index: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A sub-model is running on its uniform fallback
    ModelDegraded {
        model: ModelKind,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Informational control line received from the device (`#` / `$`)
    DeviceMessage {
        text: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl GestureEvent {
    /// Event type name, as used for the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            GestureEvent::SessionStarted { .. } => "SessionStarted",
            GestureEvent::SessionStopped { .. } => "SessionStopped",
            GestureEvent::WindowInferred { .. } => "WindowInferred",
            GestureEvent::SymbolEmitted { .. } => "SymbolEmitted",
            GestureEvent::ModelDegraded { .. } => "ModelDegraded",
            GestureEvent::DeviceMessage { .. } => "DeviceMessage",
        }
    }
}

/// Central event distribution bus
///
/// Wraps a tokio broadcast channel:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use signglove_common::events::{EventBus, GestureEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(GestureEvent::DeviceMessage {
///     text: "# imu ready".to_string(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GestureEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<GestureEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: GestureEvent,
    ) -> Result<usize, broadcast::error::SendError<GestureEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: GestureEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
