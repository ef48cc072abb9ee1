//! Streaming session fixtures

use super::ScriptedRuntime;
use signglove_common::events::{GestureEvent, WindowMode};
use signglove_engine::device::{CommandSink, RecordingSink};
use signglove_engine::fusion::{FusionWeights, GateConfig, SymbolGate};
use signglove_engine::models::{LabelSet, SequenceModelAdapter, TreeEnsembleEvaluator};
use signglove_engine::session::{InferenceEngine, SessionSettings, StreamingSession};
use signglove_engine::stream::RecordSource;
use signglove_engine::SharedState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub const TEST_WINDOW: usize = 5;

pub struct TestSession {
    pub session: Arc<StreamingSession>,
    pub runtime: Arc<ScriptedRuntime>,
    pub commands: Arc<RecordingSink>,
    pub state: Arc<SharedState>,
}

/// Session over a scripted sequence runtime and a degraded tree ensemble
pub fn scripted_session(runtime: ScriptedRuntime, labels: LabelSet, mode: WindowMode, stride: usize) -> TestSession {
    let runtime = Arc::new(runtime);
    let commands = Arc::new(RecordingSink::new());
    let state = Arc::new(SharedState::new());
    let session = scripted_session_with_sink(
        runtime.clone(),
        labels,
        mode,
        stride,
        commands.clone(),
        state.clone(),
    );

    TestSession {
        session,
        runtime,
        commands,
        state,
    }
}

/// Same as [`scripted_session`], with caller-supplied device sink and state
pub fn scripted_session_with_sink(
    runtime: Arc<ScriptedRuntime>,
    labels: LabelSet,
    mode: WindowMode,
    stride: usize,
    commands: Arc<dyn CommandSink>,
    state: Arc<SharedState>,
) -> Arc<StreamingSession> {
    let adapter = SequenceModelAdapter::new(runtime, TEST_WINDOW).unwrap();
    let num_classes = adapter.num_classes();
    let engine = InferenceEngine::new(
        adapter,
        TreeEnsembleEvaluator::degraded(num_classes, "not under test"),
        FusionWeights::default(),
    )
    .unwrap();

    let session = StreamingSession::new(
        engine,
        SymbolGate::new(GateConfig::default(), labels),
        RecordSource::default(),
        commands,
        state,
        SessionSettings {
            window_length: TEST_WINDOW,
            mode,
            stride,
        },
    )
    .unwrap();
    Arc::new(session)
}

/// Poll until `windows` windows have been inferred
pub async fn wait_for_windows(state: &SharedState, windows: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.counters().windows_inferred < windows {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {} windows", windows));
}

/// Drain every event currently buffered for `rx`
pub fn drain_events(rx: &mut broadcast::Receiver<GestureEvent>) -> Vec<GestureEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Poll until the published gate snapshot reaches `streak`
pub async fn wait_for_gate_streak(state: &SharedState, streak: u32) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.gate_snapshot().await.streak < streak {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for gate streak {}", streak));
}
