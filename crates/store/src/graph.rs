//! Graph configuration persistence (§4.8, §6): the set of nodes and edges
//! the lifecycle manager instantiates on load and rewrites on `reload`.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use types::{EdgeRecord, NodeRecord, Pose};

/// The full persisted graph configuration: every node and edge in the DAG.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
}

/// Abstracts over where the graph configuration lives. The real system backs
/// this with a relational database reached over an out-of-scope API surface
/// (§6); this crate only has to persist the equivalent document.
pub trait GraphStore: Send + Sync {
    fn load(&self) -> Result<GraphDocument, StoreError>;
    fn save(&self, doc: &GraphDocument) -> Result<(), StoreError>;
}

/// Reads and writes the whole graph as a single pretty-printed JSON file.
/// Missing file loads as an empty graph, matching a fresh deployment.
pub struct JsonGraphStore {
    path: PathBuf,
}

impl JsonGraphStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl GraphStore for JsonGraphStore {
    fn load(&self) -> Result<GraphDocument, StoreError> {
        if !self.path.exists() {
            return Ok(GraphDocument::default());
        }
        let text = fs::read_to_string(&self.path)
            .map_err(|source| io_err(&self.path, source))?;
        serde_json::from_str(&text).map_err(|source| json_err(&self.path, source))
    }

    fn save(&self, doc: &GraphDocument) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| io_err(parent, source))?;
        }
        let text = serde_json::to_string_pretty(doc).map_err(|source| json_err(&self.path, source))?;
        fs::write(&self.path, text).map_err(|source| io_err(&self.path, source))
    }
}

pub(crate) fn io_err(path: impl AsRef<Path>, source: std::io::Error) -> StoreError {
    StoreError::Io { path: path.as_ref().display().to_string(), source }
}

pub(crate) fn json_err(path: impl AsRef<Path>, source: serde_json::Error) -> StoreError {
    StoreError::Json { path: path.as_ref().display().to_string(), source }
}

/// Sensor pose lives inside the node's type-specific `config` object under the
/// `pose` key; absent or partial poses default to identity.
pub fn node_pose(node: &NodeRecord) -> Pose {
    node.config
        .get("pose")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

/// Returns `node` with its `config.pose` replaced, leaving every other config
/// key untouched.
pub fn with_node_pose(mut node: NodeRecord, pose: Pose) -> NodeRecord {
    let pose_value = serde_json::to_value(pose).expect("Pose always serializes");
    match node.config {
        serde_json::Value::Object(ref mut map) => {
            map.insert("pose".to_string(), pose_value);
        }
        _ => {
            let mut map = serde_json::Map::new();
            map.insert("pose".to_string(), pose_value);
            node.config = serde_json::Value::Object(map);
        }
    }
    node
}
