//! Scene loading, parsing, and validation logic.
//!
//! A scene describes the nodes sharing one medium and how signals propagate
//! between them:
//!
//! ```json
//! {
//!   "path_loss_parameters": { "path_loss_exponent": 3.0 },
//!   "nodes": [
//!     { "node_id": 0, "position": { "x": 0, "y": 0 } },
//!     { "node_id": 1, "position": { "x": 300, "y": 0 }, "tx_power_dbm": 10 }
//!   ]
//! }
//! ```

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::propagation::Position;
use crate::radio::{PathLossParameters, PhyMode};

/// Error type for scene loading failures.
#[derive(Debug)]
pub enum SceneLoadError {
    FileReadError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for SceneLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneLoadError::FileReadError(msg) => write!(f, "Failed to read file: {}", msg),
            SceneLoadError::ParseError(msg) => write!(f, "Failed to parse JSON: {}", msg),
            SceneLoadError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for SceneLoadError {}

/// A simulated node and the per-node overrides of the bridge configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct Node {
    pub node_id: u32,
    pub position: Position,
    /// Transmit power in dBm. Falls back to the bridge configuration.
    #[serde(default)]
    pub tx_power_dbm: Option<f64>,
    /// PHY profile. Falls back to the bridge configuration.
    #[serde(default)]
    pub phy_mode: Option<PhyMode>,
    /// Executable to bridge this node to, relative to the scene file.
    #[serde(default)]
    pub exec_path: Option<String>,
}

/// Root structure representing the entire scene.
#[derive(Debug, Deserialize)]
pub struct Scene {
    /// Log-distance model parameters. Omitted fields take their defaults.
    #[serde(default)]
    pub path_loss_parameters: PathLossParameters,
    /// Seed for the shadowing generator. Unseeded runs draw from entropy.
    #[serde(default)]
    pub shadowing_seed: Option<u64>,
    /// Propagation speed in m/s. Defaults to the speed of light.
    #[serde(default)]
    pub propagation_speed: Option<f64>,
    /// All nodes present in the scene.
    pub nodes: Vec<Node>,
}

/// Load and parse a scene from a file.
///
/// Relative node `exec_path`s are resolved against the scene file's directory.
pub fn load_scene(path: &Path) -> Result<Scene, SceneLoadError> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))
        .map_err(|e| SceneLoadError::FileReadError(e.to_string()))?;

    let mut scene = parse_scene(&data)?;

    if let Some(parent_dir) = path.parent() {
        for node in &mut scene.nodes {
            if let Some(exec) = node.exec_path.as_mut() {
                if Path::new(exec.as_str()).is_relative() {
                    *exec = parent_dir.join(exec.as_str()).to_string_lossy().to_string();
                }
            }
        }
    }

    Ok(scene)
}

/// Parse and validate a scene from JSON text.
pub fn parse_scene(data: &str) -> Result<Scene, SceneLoadError> {
    let scene: Scene = serde_json::from_str(data)
        .context("Invalid JSON format")
        .map_err(|e| SceneLoadError::ParseError(format!("{:#}", e)))?;

    validate_scene(&scene).map_err(SceneLoadError::ValidationError)?;

    Ok(scene)
}

/// Validate scene configuration.
///
/// Returns `Err(String)` with a description of the first problem found.
pub fn validate_scene(scene: &Scene) -> Result<(), String> {
    const MAX_NODES: usize = 10000;
    const MIN_TX_POWER: f64 = -50.0;
    const MAX_TX_POWER: f64 = 100.0;

    if scene.nodes.is_empty() {
        return Err("Scene must contain at least one node".to_string());
    }
    if scene.nodes.len() > MAX_NODES {
        return Err(format!("Node count {} exceeds maximum of {}", scene.nodes.len(), MAX_NODES));
    }

    let mut node_ids = HashSet::new();
    for node in &scene.nodes {
        if !node_ids.insert(node.node_id) {
            return Err(format!("Duplicate node_id found: {}", node.node_id));
        }
    }

    for node in &scene.nodes {
        if !node.position.is_finite() {
            return Err(format!("Node {} has a non-finite position", node.node_id));
        }
        if let Some(power) = node.tx_power_dbm {
            if !(MIN_TX_POWER..=MAX_TX_POWER).contains(&power) {
                return Err(format!(
                    "Node {} tx_power_dbm {} outside supported range ({} to {} dBm)",
                    node.node_id, power, MIN_TX_POWER, MAX_TX_POWER
                ));
            }
        }
        if node.exec_path.as_deref() == Some("") {
            return Err(format!("Node {} has an empty exec_path", node.node_id));
        }
    }

    scene.path_loss_parameters.validate().map_err(|e| e.to_string())?;

    if let Some(speed) = scene.propagation_speed {
        if !(speed.is_finite() && speed > 0.0) {
            return Err(format!("Invalid propagation_speed {}, must be positive", speed));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_NODES: &str = r#"{
        "path_loss_parameters": { "path_loss_exponent": 2.5, "shadowing_sigma": 1.0 },
        "shadowing_seed": 9,
        "nodes": [
            { "node_id": 0, "position": { "x": 0, "y": 0 } },
            { "node_id": 1, "position": { "x": 300, "y": 0, "z": 2 }, "tx_power_dbm": 10, "phy_mode": "dsss-bpsk" }
        ]
    }"#;

    #[test]
    fn parses_nodes_and_fills_defaults() {
        let scene = parse_scene(TWO_NODES).unwrap();
        assert_eq!(scene.nodes.len(), 2);
        assert_eq!(scene.path_loss_parameters.path_loss_exponent, 2.5);
        assert_eq!(scene.path_loss_parameters.reference_distance, 1.0);
        assert_eq!(scene.path_loss_parameters.path_loss_at_reference_distance, 46.6777);
        assert_eq!(scene.shadowing_seed, Some(9));
        assert_eq!(scene.propagation_speed, None);
        assert_eq!(scene.nodes[1].position, Position::new(300.0, 0.0, 2.0));
        assert_eq!(scene.nodes[1].tx_power_dbm, Some(10.0));
        assert_eq!(scene.nodes[1].phy_mode, Some(PhyMode::DsssBpsk));
        assert_eq!(scene.nodes[0].phy_mode, None);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let data = r#"{ "nodes": [
            { "node_id": 3, "position": { "x": 0, "y": 0 } },
            { "node_id": 3, "position": { "x": 1, "y": 0 } }
        ] }"#;
        match parse_scene(data) {
            Err(SceneLoadError::ValidationError(msg)) => assert!(msg.contains("Duplicate node_id")),
            other => panic!("unexpected result {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn rejects_empty_scene_and_bad_parameters() {
        assert!(matches!(parse_scene(r#"{ "nodes": [] }"#), Err(SceneLoadError::ValidationError(_))));
        let bad_sigma = r#"{ "path_loss_parameters": { "shadowing_sigma": -2 },
            "nodes": [ { "node_id": 0, "position": { "x": 0, "y": 0 } } ] }"#;
        assert!(matches!(parse_scene(bad_sigma), Err(SceneLoadError::ValidationError(_))));
        let bad_speed = r#"{ "propagation_speed": 0,
            "nodes": [ { "node_id": 0, "position": { "x": 0, "y": 0 } } ] }"#;
        assert!(matches!(parse_scene(bad_speed), Err(SceneLoadError::ValidationError(_))));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(parse_scene("{ nodes: "), Err(SceneLoadError::ParseError(_))));
    }

    #[test]
    fn load_resolves_exec_paths_next_to_the_scene() {
        let dir = std::env::temp_dir().join(format!("socket-bridge-scene-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("scene.json");
        std::fs::write(
            &path,
            r#"{ "nodes": [
                { "node_id": 0, "position": { "x": 0, "y": 0 }, "exec_path": "bin/node" },
                { "node_id": 1, "position": { "x": 1, "y": 0 }, "exec_path": "/usr/bin/true" }
            ] }"#,
        )
        .unwrap();
        let scene = load_scene(&path).unwrap();
        assert_eq!(scene.nodes[0].exec_path.as_deref(), Some(dir.join("bin/node").to_str().unwrap()));
        assert_eq!(scene.nodes[1].exec_path.as_deref(), Some("/usr/bin/true"));

        assert!(matches!(load_scene(&dir.join("missing.json")), Err(SceneLoadError::FileReadError(_))));
    }
}
