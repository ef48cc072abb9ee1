//! Streaming session orchestration
//!
//! One producer path ([`StreamingSession::feed`], callable from any task)
//! pushes raw chunks into the shared reassembler. One consumer task owns the
//! window buffer and the gate, pulls records, runs inference per window in
//! arrival order and publishes events.
//!
//! Stopping cancels the consumer (a partial window is discarded), deactivates
//! the reassembler, tells the device to stop streaming and resets the gate.

pub mod inference;
pub mod setup;

pub use inference::{InferenceEngine, WindowInference};
pub use setup::{build_engine, build_session};

use crate::calibration::CalibrationProfile;
use crate::device::{CommandSink, DeviceCommand};
use crate::error::{Error, Result};
use crate::fusion::SymbolGate;
use crate::state::{CounterSnapshot, GateSnapshot, SessionStatus, SharedState};
use crate::stream::{ReassemblerStats, RecordSource};
use crate::types::DEFAULT_WINDOW_LENGTH;
use crate::window::{Window, WindowBuffer};
use serde::Serialize;
use signglove_common::events::{GestureEvent, ModelKind, WindowMode};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Window accumulation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub window_length: usize,
    pub mode: WindowMode,
    /// New records between inferences in sliding mode
    pub stride: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            window_length: DEFAULT_WINDOW_LENGTH,
            mode: WindowMode::Batch,
            stride: 15,
        }
    }
}

/// Totals for one finished session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub windows_inferred: u64,
    pub symbols_emitted: u64,
}

/// Point-in-time view for `/status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub session: SessionStatus,
    pub mode: WindowMode,
    pub window_length: usize,
    pub num_classes: usize,
    pub labels: Vec<String>,
    pub sequence_degraded: bool,
    pub tree_degraded: bool,
    pub calibrated: bool,
    pub queue_size: usize,
    pub reassembler: ReassemblerStats,
    pub counters: CounterSnapshot,
    pub gate: GateSnapshot,
    pub transcript: String,
}

struct RunningSession {
    id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<ConsumerTotals>,
}

#[derive(Debug, Default, Clone, Copy)]
struct ConsumerTotals {
    windows: u64,
    symbols: u64,
}

pub struct StreamingSession {
    source: RecordSource,
    engine: Arc<InferenceEngine>,
    /// Fresh gate cloned into each run
    gate: SymbolGate,
    commands: Arc<dyn CommandSink>,
    state: Arc<SharedState>,
    calibration: Option<Arc<CalibrationProfile>>,
    settings: SessionSettings,
    running: Mutex<Option<RunningSession>>,
}

impl StreamingSession {
    pub fn new(
        engine: InferenceEngine,
        gate: SymbolGate,
        source: RecordSource,
        commands: Arc<dyn CommandSink>,
        state: Arc<SharedState>,
        settings: SessionSettings,
    ) -> Result<Self> {
        if settings.window_length != engine.window_length() {
            return Err(Error::Session(format!(
                "window length {} does not match the sequence model input length {}",
                settings.window_length,
                engine.window_length()
            )));
        }
        if settings.window_length == 0 {
            return Err(Error::Session("window length must be greater than 0".to_string()));
        }
        if settings.mode == WindowMode::Sliding && (settings.stride == 0 || settings.stride > settings.window_length) {
            return Err(Error::Session(format!(
                "sliding stride must be within 1..={}",
                settings.window_length
            )));
        }

        // Nothing is enqueued until a session starts
        source.set_active(false);

        Ok(Self {
            source,
            engine: Arc::new(engine),
            gate,
            commands,
            state,
            calibration: None,
            settings,
            running: Mutex::new(None),
        })
    }

    /// Normalize bend values with this profile before inference
    pub fn with_calibration(mut self, profile: Option<CalibrationProfile>) -> Self {
        self.calibration = profile.map(Arc::new);
        self
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    pub fn source(&self) -> &RecordSource {
        &self.source
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Feed one raw transport chunk; never waits on inference
    ///
    /// Returns the number of records enqueued. Device control lines found in
    /// the chunk are published as `DeviceMessage` events.
    pub fn feed(&self, chunk: &[u8]) -> usize {
        let enqueued = self.source.feed(chunk);
        for text in self.source.take_control_lines() {
            self.state.broadcast_event(GestureEvent::DeviceMessage {
                text,
                timestamp: chrono::Utc::now(),
            });
        }
        enqueued
    }

    /// Start streaming
    ///
    /// Resets the gate, activates the reassembler, sends `stream` to the
    /// device and spawns the consumer task.
    pub async fn start(&self) -> Result<Uuid> {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            return Err(Error::Session(format!("session {} is already running", current.id)));
        }

        let session_id = Uuid::new_v4();
        let cancel = CancellationToken::new();

        let mut gate = self.gate.clone();
        gate.reset();
        self.state.set_gate_snapshot(GateSnapshot::default()).await;

        self.source.set_active(true);
        if let Err(e) = self.commands.send(&DeviceCommand::Stream).await {
            warn!("Could not start device stream: {}", e);
        }

        let consumer = Consumer {
            session_id,
            source: self.source.clone(),
            engine: Arc::clone(&self.engine),
            gate,
            state: Arc::clone(&self.state),
            calibration: self.calibration.clone(),
            settings: self.settings,
            cancel: cancel.clone(),
            totals: ConsumerTotals::default(),
        };
        let task = tokio::spawn(consumer.run());

        *running = Some(RunningSession {
            id: session_id,
            cancel,
            task,
        });

        self.state.set_session_started(session_id).await;
        self.state.broadcast_event(GestureEvent::SessionStarted {
            session_id,
            window_length: self.settings.window_length,
            mode: self.settings.mode,
            timestamp: chrono::Utc::now(),
        });
        self.report_degraded_models();

        info!(
            "Streaming session {} started ({} mode, window {})",
            session_id, self.settings.mode, self.settings.window_length
        );
        Ok(session_id)
    }

    /// Stop streaming and wait for the consumer to finish
    ///
    /// The lifecycle lock is held until the stop is fully published, so a
    /// concurrent `start` waits for it.
    pub async fn stop(&self) -> Result<SessionSummary> {
        let mut lifecycle = self.running.lock().await;
        let Some(running) = lifecycle.take() else {
            return Err(Error::Session("no session is running".to_string()));
        };

        running.cancel.cancel();
        self.source.set_active(false);
        if let Err(e) = self.commands.send(&DeviceCommand::StreamOff).await {
            warn!("Could not stop device stream: {}", e);
        }

        let totals = match running.task.await {
            Ok(totals) => totals,
            Err(e) => {
                error!("Session {} consumer task failed: {}", running.id, e);
                ConsumerTotals::default()
            }
        };

        self.state.set_gate_snapshot(GateSnapshot::default()).await;
        self.state.set_session_stopped(running.id).await;
        self.state.broadcast_event(GestureEvent::SessionStopped {
            session_id: running.id,
            windows_inferred: totals.windows,
            symbols_emitted: totals.symbols,
            timestamp: chrono::Utc::now(),
        });

        info!(
            "Streaming session {} stopped: {} windows, {} symbols",
            running.id, totals.windows, totals.symbols
        );
        drop(lifecycle);
        Ok(SessionSummary {
            session_id: running.id,
            windows_inferred: totals.windows,
            symbols_emitted: totals.symbols,
        })
    }

    pub async fn status(&self) -> StatusReport {
        StatusReport {
            session: self.state.session_status().await,
            mode: self.settings.mode,
            window_length: self.settings.window_length,
            num_classes: self.engine.num_classes(),
            labels: self.gate.labels().labels().to_vec(),
            sequence_degraded: self.engine.sequence().is_degraded(),
            tree_degraded: self.engine.tree().is_degraded(),
            calibrated: self.calibration.is_some(),
            queue_size: self.source.queue_size(),
            reassembler: self.source.stats(),
            counters: self.state.counters(),
            gate: self.state.gate_snapshot().await,
            transcript: self.state.transcript().await,
        }
    }

    fn report_degraded_models(&self) {
        let degraded = [
            (ModelKind::Sequence, self.engine.sequence().degraded_reason()),
            (ModelKind::TreeEnsemble, self.engine.tree().degraded_reason()),
        ];
        for (model, reason) in degraded {
            let Some(reason) = reason else { continue };
            warn!("{} model running in degraded mode (uniform output): {}", model, reason);
            self.state.broadcast_event(GestureEvent::ModelDegraded {
                model,
                reason: reason.to_string(),
                timestamp: chrono::Utc::now(),
            });
        }
    }
}

/// Consumer side of one session run; owns the window buffer and gate
struct Consumer {
    session_id: Uuid,
    source: RecordSource,
    engine: Arc<InferenceEngine>,
    gate: SymbolGate,
    state: Arc<SharedState>,
    calibration: Option<Arc<CalibrationProfile>>,
    settings: SessionSettings,
    cancel: CancellationToken,
    totals: ConsumerTotals,
}

impl Consumer {
    async fn run(mut self) -> ConsumerTotals {
        match self.settings.mode {
            WindowMode::Batch => self.run_batch().await,
            WindowMode::Sliding => self.run_sliding().await,
        }
        debug!("Session {} consumer exited", self.session_id);
        self.totals
    }

    /// Collect a full window, infer, clear, repeat
    async fn run_batch(&mut self) {
        let length = self.settings.window_length;
        let mut buffer = WindowBuffer::new(length);
        loop {
            let collected = buffer.collect_batch(&self.source, length, &self.cancel).await;
            if collected < length {
                debug!("Discarding partial window of {} records", collected);
                return;
            }
            let window = buffer.to_fixed_length(length);
            buffer.clear();
            self.process(window).await;
        }
    }

    /// Infer once the window first fills, then every `stride` new records
    async fn run_sliding(&mut self) {
        let length = self.settings.window_length;
        let mut buffer = WindowBuffer::new(length);
        let mut since_last: Option<usize> = None;
        while let Some(record) = self.source.next(&self.cancel).await {
            buffer.push(record);
            if !buffer.is_ready() {
                continue;
            }
            let due = match since_last.as_mut() {
                None => true,
                Some(count) => {
                    *count += 1;
                    *count >= self.settings.stride
                }
            };
            if due {
                since_last = Some(0);
                self.process(buffer.to_fixed_length(length)).await;
            }
        }
    }

    async fn process(&mut self, window: Window) {
        let window = match &self.calibration {
            Some(profile) => Window::new(window.records().iter().map(|r| profile.apply(r)).collect()),
            None => window,
        };

        let inference = self.engine.infer(&window).await;
        if self.cancel.is_cancelled() {
            return;
        }

        self.totals.windows += 1;
        let window_index = self.totals.windows;
        self.state
            .record_window(inference.aborted_trees, inference.fallback_count());

        let decision = &inference.decision;
        self.state.broadcast_event(GestureEvent::WindowInferred {
            session_id: self.session_id,
            window_index,
            best_class: decision.best_class,
            label: self.gate.labels().label(decision.best_class),
            confidence: decision.confidence,
            sequence_degraded: inference.sequence_fallback,
            tree_degraded: inference.tree_fallback,
            timestamp: chrono::Utc::now(),
        });

        if let Some(committed) = self.gate.observe(decision) {
            match committed.action {
                Some(action) => {
                    self.totals.symbols += 1;
                    self.state.record_symbol();
                    let text = self.state.apply_action(&action).await;
                    info!(
                        "Symbol {} from class {} ({}) at {:.2}; transcript: {:?}",
                        action, committed.class_index, committed.label, committed.confidence, text
                    );
                    self.state.broadcast_event(GestureEvent::SymbolEmitted {
                        session_id: self.session_id,
                        sequence: self.totals.symbols,
                        action,
                        class_index: committed.class_index,
                        label: committed.label,
                        confidence: committed.confidence,
                        window_index,
                        timestamp: chrono::Utc::now(),
                    });
                }
                None => debug!("Suppressed neutral commit on window {}", window_index),
            }
        }

        self.state
            .set_gate_snapshot(GateSnapshot {
                phase: self.gate.phase(),
                streak: self.gate.streak(),
                current_class: self.gate.current_class(),
                history: self.gate.history(),
            })
            .await;
    }
}
