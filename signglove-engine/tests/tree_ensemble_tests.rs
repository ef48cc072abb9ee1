//! Integration tests for the tree-ensemble evaluator
//!
//! - Hierarchical and flat artifacts describe the same forest
//! - Deterministic, softmax-normalized output
//! - Typed load errors for malformed artifacts
//! - Degraded mode and its effect on fusion

mod helpers;

use helpers::{biased_forest_json, write_temp};
use serde_json::json;
use signglove_engine::fusion::{fuse, FusionWeights};
use signglove_engine::models::{LoadOptions, TreeEnsembleEvaluator, TreeEnsembleModel};
use signglove_engine::{ClassProbabilities, ModelLoadError};
use std::path::Path;
use std::sync::Arc;

const NUM_CLASSES: usize = 3;
const FEATURES: usize = 751;

/// (feature, threshold, left leaf, right leaf) per tree, round-robin classes
const STUMPS: [(i64, f64, f64, f64); 6] = [
    (0, 0.5, 1.2, -0.4),
    (10, 0.3, -0.7, 0.9),
    (22, 45.0, 0.1, 0.6),
    (750, 0.5, 0.3, -0.3),
    (5, 0.25, 0.8, -0.2),
    (749, 0.0, -0.5, 0.5),
];

fn hierarchical_json() -> String {
    let trees: Vec<_> = STUMPS
        .iter()
        .map(|&(feature, threshold, left, right)| {
            json!({
                "left_children": [1, -1, -1],
                "right_children": [2, -1, -1],
                "split_indices": [feature, 0, 0],
                "split_conditions": [threshold, left, right],
            })
        })
        .collect();
    json!({
        "learner": {
            "learner_model_param": { "num_class": NUM_CLASSES.to_string(), "base_score": "5E-1" },
            "gradient_booster": { "model": { "trees": trees, "tree_info": [0, 1, 2, 0, 1, 2] } }
        }
    })
    .to_string()
}

fn flat_json() -> String {
    let trees: Vec<_> = STUMPS
        .iter()
        .map(|&(feature, threshold, left, right)| {
            json!({
                "leftChildren": [1, -1, -1],
                "rightChildren": [2, -1, -1],
                "splitFeatureIndices": [feature, 0, 0],
                "splitThresholds": [threshold, 0.0, 0.0],
                "leafWeights": [0.0, left, right],
            })
        })
        .collect();
    json!({ "numClass": NUM_CLASSES, "baseScore": [0.5, 0.5, 0.5], "trees": trees }).to_string()
}

fn load(json: &str) -> Result<TreeEnsembleModel, ModelLoadError> {
    TreeEnsembleModel::from_json_slice(json.as_bytes(), &LoadOptions::default())
}

/// Deterministic pseudo-random feature vector
fn features(seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..FEATURES)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 33) as f32 / (1u64 << 31) as f32) * 2.0 - 1.0
        })
        .collect()
}

#[test]
fn test_both_shapes_describe_the_same_forest() {
    let hierarchical = load(&hierarchical_json()).unwrap();
    let flat = load(&flat_json()).unwrap();
    assert_eq!(hierarchical.num_classes(), NUM_CLASSES);
    assert_eq!(hierarchical.tree_count(), 6);
    assert_eq!(hierarchical.base_scores(), flat.base_scores());

    for seed in 0..20 {
        let x = features(seed);
        assert_eq!(hierarchical.evaluate(&x), flat.evaluate(&x));
    }
}

#[test]
fn test_round_robin_class_assignment() {
    let model = load(&flat_json()).unwrap();
    let mut x = vec![0.0f32; FEATURES];
    // Tree 0 left (1.2), tree 3 left (0.3) -> class 0
    // Tree 1 left (-0.7), tree 4 left (0.8) -> class 1
    // Tree 2 left (0.1), tree 5 right (0.5) -> class 2
    x[0] = 0.0;
    x[10] = 0.0;
    x[22] = 0.0;
    x[750] = 0.0;
    x[5] = 0.0;
    x[749] = 0.0;
    let prediction = model.evaluate(&x);
    let expected = [0.5 + 1.2 + 0.3, 0.5 - 0.7 + 0.8, 0.5 + 0.1 + 0.5];
    for (raw, want) in prediction.raw_scores.iter().zip(expected) {
        assert!((raw - want).abs() < 1e-6, "raw {} expected {}", raw, want);
    }
    assert_eq!(prediction.aborted_trees, 0);
}

#[test]
fn test_evaluation_is_bit_identical() {
    let model = load(&flat_json()).unwrap();
    let x = features(42);
    let first = model.evaluate(&x).probabilities;
    let second = model.evaluate(&x).probabilities;
    let first_bits: Vec<u32> = first.as_slice().iter().map(|v| v.to_bits()).collect();
    let second_bits: Vec<u32> = second.as_slice().iter().map(|v| v.to_bits()).collect();
    assert_eq!(first_bits, second_bits);
}

#[test]
fn test_softmax_invariants() {
    let model = load(&hierarchical_json()).unwrap();
    for seed in 0..200 {
        let probabilities = model.evaluate(&features(seed)).probabilities;
        assert!(probabilities.as_slice().iter().all(|p| (0.0..=1.0).contains(p)));
        let sum: f32 = probabilities.as_slice().iter().sum();
        assert!((sum - 1.0).abs() < 1e-5, "sum {}", sum);
    }

    // Extreme logits stay finite and normalized
    let extreme = ClassProbabilities::from_logits(&[1e6, -1e6, 0.0]);
    let sum: f32 = extreme.as_slice().iter().sum();
    assert!((sum - 1.0).abs() < 1e-5);
    assert_eq!(extreme.argmax(), Some(0));
}

#[test]
fn test_concurrent_evaluation_matches_sequential() {
    let model = Arc::new(load(&flat_json()).unwrap());
    let expected: Vec<_> = (0..8).map(|seed| model.evaluate(&features(seed))).collect();

    let handles: Vec<_> = (0..8)
        .map(|seed| {
            let model = Arc::clone(&model);
            std::thread::spawn(move || model.evaluate(&features(seed)))
        })
        .collect();
    let actual: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(actual, expected);
}

#[test]
fn test_short_feature_vector_aborts_affected_trees() {
    let model = load(&flat_json()).unwrap();
    // Features 749 and 750 are missing
    let prediction = model.evaluate(&vec![0.0; 700]);
    assert_eq!(prediction.aborted_trees, 2);
    let sum: f32 = prediction.probabilities.as_slice().iter().sum();
    assert!((sum - 1.0).abs() < 1e-5);
}

#[test]
fn test_malformed_artifacts_are_typed_errors() {
    assert!(matches!(load("{\"numClass\": 3, \"trees\": ["), Err(ModelLoadError::Parse(_))));
    assert!(matches!(load("not json at all"), Err(ModelLoadError::Parse(_))));
    assert!(matches!(load(r#"{"numClass": 3, "trees": []}"#), Err(ModelLoadError::EmptyForest)));
    assert!(matches!(load(r#"{"numClass": 1, "trees": []}"#), Err(ModelLoadError::Metadata(_))));
    assert!(matches!(
        load(r#"{"numClass": 3, "trees": [{"leftChildren": [1]}]}"#),
        Err(ModelLoadError::Parse(_))
    ));

    let wrong_base = flat_json().replace("[0.5,0.5,0.5]", "[0.5,0.5]");
    assert!(matches!(load(&wrong_base), Err(ModelLoadError::Metadata(_))));

    let wrong_order = hierarchical_json().replace("[0,1,2,0,1,2]", "[0,0,1,1,2,2]");
    assert!(matches!(load(&wrong_order), Err(ModelLoadError::Metadata(_))));

    let negative_feature = flat_json().replacen("[0,0,0]", "[-3,0,0]", 1);
    assert!(matches!(load(&negative_feature), Err(ModelLoadError::Invalid { tree: 0, .. })));
}

#[test]
fn test_load_from_disk() {
    let file = write_temp(&hierarchical_json());
    let model = TreeEnsembleModel::from_path(file.path(), &LoadOptions::default()).unwrap();
    assert_eq!(model.num_classes(), NUM_CLASSES);

    match TreeEnsembleModel::from_path(Path::new("/nonexistent/model.json"), &LoadOptions::default()) {
        Err(ModelLoadError::NotFound(path)) => assert_eq!(path, Path::new("/nonexistent/model.json")),
        other => panic!("expected NotFound, got {:?}", other.map(|m| m.tree_count())),
    }
}

#[test]
fn test_hop_budget_override() {
    // Depth-2 path: root -> node 1 -> leaf 3
    let json = json!({
        "numClass": 2,
        "trees": [{
            "leftChildren": [1, 3, -1, -1, -1],
            "rightChildren": [2, 4, -1, -1, -1],
            "splitFeatureIndices": [0, 0, 0, 0, 0],
            "splitThresholds": [1.0, 1.0, 0.0, 0.0, 0.0],
            "leafWeights": [0.0, 0.0, 1.0, 2.0, 3.0],
        }]
    })
    .to_string();

    let model = load(&json).unwrap();
    assert_eq!(model.evaluate(&[0.0]).raw_scores, vec![2.0, 0.0]);

    let options = LoadOptions {
        max_hops: Some(1),
        ..Default::default()
    };
    let limited = TreeEnsembleModel::from_json_slice(json.as_bytes(), &options).unwrap();
    let prediction = limited.evaluate(&[0.0]);
    assert_eq!(prediction.aborted_trees, 1);
    assert_eq!(prediction.raw_scores, vec![0.0, 0.0]);
}

#[test]
fn test_degraded_tree_fuses_with_uniform() {
    let broken = write_temp("{ this is not a forest");
    let tree = TreeEnsembleEvaluator::load_or_degraded(broken.path(), &LoadOptions::default(), 4);
    assert!(tree.is_degraded());

    let tree_probs = tree.predict(&features(1));
    assert_eq!(tree_probs, ClassProbabilities::uniform(4));

    let seq = ClassProbabilities::from_distribution(vec![0.1, 0.6, 0.2, 0.1], 1e-5).unwrap();
    let decision = fuse(&seq, &tree_probs, FusionWeights::default()).unwrap();
    assert_eq!(decision.best_class, seq.argmax().unwrap());
    for (c, fused) in decision.probabilities.as_slice().iter().enumerate() {
        let expected = 0.6 * seq.as_slice()[c] + 0.4 * 0.25;
        assert!((fused - expected).abs() < 1e-6);
    }
}

#[test]
fn test_biased_fixture_prefers_its_class() {
    let model = load(&biased_forest_json(5, 2, 3.0)).unwrap();
    assert_eq!(model.evaluate(&features(0)).probabilities.argmax(), Some(2));
}
