//! Tree-ensemble artifact fixtures

use std::io::Write;
use tempfile::NamedTempFile;

/// Flat-format forest of single-leaf trees favouring one class
///
/// One tree per class (round-robin order); the favoured class's tree leaf
/// carries `weight`, every other leaf 0.
pub fn biased_forest_json(num_classes: usize, favoured: usize, weight: f64) -> String {
    let trees: Vec<serde_json::Value> = (0..num_classes)
        .map(|class| {
            let leaf = if class == favoured { weight } else { 0.0 };
            serde_json::json!({
                "leftChildren": [-1],
                "rightChildren": [-1],
                "splitFeatureIndices": [0],
                "splitThresholds": [0.0],
                "leafWeights": [leaf],
            })
        })
        .collect();
    serde_json::json!({
        "numClass": num_classes,
        "baseScore": vec![0.0; num_classes],
        "trees": trees,
    })
    .to_string()
}

/// Write `contents` to a fresh temp file
pub fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}
