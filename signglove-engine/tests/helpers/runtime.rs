//! Stand-in sequence runtime

use signglove_engine::models::SequenceRuntime;
use signglove_engine::InferenceError;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Replays scripted outputs, one per forward pass; the last one repeats
pub struct ScriptedRuntime {
    window_length: usize,
    outputs: Vec<Vec<f32>>,
    fail: bool,
    calls: AtomicUsize,
}

impl ScriptedRuntime {
    pub fn new(window_length: usize, output: Vec<f32>) -> Self {
        Self::scripted(window_length, vec![output])
    }

    pub fn scripted(window_length: usize, outputs: Vec<Vec<f32>>) -> Self {
        assert!(!outputs.is_empty());
        Self {
            window_length,
            outputs,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Runtime whose every forward pass errors
    pub fn failing(window_length: usize, num_classes: usize) -> Self {
        Self {
            window_length,
            outputs: vec![vec![0.0; num_classes]],
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SequenceRuntime for ScriptedRuntime {
    fn input_shape(&self) -> [usize; 3] {
        [1, self.window_length, 10]
    }

    fn num_classes(&self) -> usize {
        self.outputs[0].len()
    }

    fn run(&self, input: &[f32]) -> Result<Vec<f32>, InferenceError> {
        assert_eq!(input.len(), self.window_length * 10);
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(InferenceError::Runtime("scripted failure".to_string()));
        }
        Ok(self.outputs[call.min(self.outputs.len() - 1)].clone())
    }
}
