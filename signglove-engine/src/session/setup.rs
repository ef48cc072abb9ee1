//! Building a session from configuration
//!
//! Models load with degraded fallbacks: a missing or broken artifact logs an
//! error and its sub-model answers uniformly. Setup only fails when neither
//! sub-model is usable.

use super::{InferenceEngine, SessionSettings, StreamingSession};
use crate::calibration::CalibrationProfile;
use crate::config::EngineConfig;
use crate::device::CommandSink;
use crate::error::Result;
use crate::fusion::SymbolGate;
use crate::models::{LabelSet, LoadOptions, SequenceModelAdapter, SequenceRuntime, TreeEnsembleEvaluator};
use crate::state::SharedState;
use crate::stream::RecordSource;
use crate::types::RECORD_ARITY;
use std::sync::Arc;
use tracing::{error, info};

/// Load both sub-models and assemble the inference engine
///
/// The class count comes from the sequence model when it loads, else from
/// the tree ensemble, else from `models.num_classes`.
pub fn build_engine(config: &EngineConfig, runtime: Option<Arc<dyn SequenceRuntime>>) -> Result<InferenceEngine> {
    let window_length = config.window.length;

    let sequence = match runtime {
        Some(runtime) => SequenceModelAdapter::new(runtime, window_length).map_err(|e| {
            error!("Sequence model rejected: {}", e);
            e.to_string()
        }),
        None => Err("no sequence runtime available".to_string()),
    };

    let hint = sequence
        .as_ref()
        .ok()
        .map(SequenceModelAdapter::num_classes)
        .or(config.models.num_classes);

    let tree = match &config.models.tree_model {
        Some(path) => {
            let options = LoadOptions {
                num_classes_hint: hint,
                max_hops: config.max_tree_hops(),
                expected_features: Some(window_length * RECORD_ARITY + 1),
            };
            TreeEnsembleEvaluator::load_or_degraded(path, &options, hint.unwrap_or(0))
        }
        None => TreeEnsembleEvaluator::degraded(0, "no tree model configured"),
    };

    let num_classes = sequence
        .as_ref()
        .ok()
        .map(SequenceModelAdapter::num_classes)
        .or_else(|| (!tree.is_degraded()).then(|| tree.num_classes()))
        .or(config.models.num_classes)
        .unwrap_or(0);

    let sequence = sequence
        .unwrap_or_else(|reason| SequenceModelAdapter::degraded(window_length, num_classes, reason));
    // Degraded evaluators report the class count detected above
    let tree = match tree.degraded_reason() {
        Some(reason) => TreeEnsembleEvaluator::degraded(num_classes, reason),
        None => tree,
    };

    let engine = InferenceEngine::new(sequence, tree, config.fusion_weights()?)?
        .with_residual(config.models.residual)
        .with_budget(config.inference_timeout());

    info!(
        "Inference engine ready: {} classes, sequence {}, tree ensemble {}",
        engine.num_classes(),
        if engine.sequence().is_degraded() { "degraded" } else { "loaded" },
        if engine.tree().is_degraded() { "degraded" } else { "loaded" }
    );
    Ok(engine)
}

/// Build a ready-to-start session from configuration
pub fn build_session(
    config: &EngineConfig,
    runtime: Option<Arc<dyn SequenceRuntime>>,
    commands: Arc<dyn CommandSink>,
    state: Arc<SharedState>,
) -> Result<StreamingSession> {
    config.validate()?;
    let engine = build_engine(config, runtime)?;

    let labels = LabelSet::load_or_default(
        config.models.labels.as_deref(),
        engine.num_classes(),
        &config.gate.neutral_label,
        &config.gate.backspace_label,
    );
    let gate = SymbolGate::new(config.gate_config(), labels);

    let calibration = match &config.calibration.profile {
        Some(path) => {
            let profile = CalibrationProfile::load(path)?;
            info!("Loaded calibration profile from {}", path.display());
            Some(profile)
        }
        None => None,
    };

    let settings = SessionSettings {
        window_length: config.window.length,
        mode: config.window.mode,
        stride: config.window.stride,
    };
    let source = RecordSource::new(config.reassembler_config()?);

    Ok(StreamingSession::new(engine, gate, source, commands, state, settings)?.with_calibration(calibration))
}
