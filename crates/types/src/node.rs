//! Node/edge graph model and the topic-naming convention.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable opaque node identifier. Identity of a node is its id; `name` is
/// purely cosmetic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters of the id, used in topic naming.
    pub fn short(&self) -> &str {
        let end = self.0.char_indices().nth(8).map(|(i, _)| i).unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Converts a display name into a URL-friendly, stable topic prefix.
///
/// Rules: replace any character outside `[A-Za-z0-9_-]` with `_`, collapse
/// repeated `_`, strip leading/trailing `_`/`-`, default to `"sensor"` if the
/// result is empty. Idempotent: `slug(slug(x)) == slug(x)`.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_underscore = false;
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
            last_was_underscore = c == '_';
        } else if !last_was_underscore {
            out.push('_');
            last_was_underscore = true;
        }
    }
    let trimmed = out.trim_matches(|c| c == '_' || c == '-');
    if trimmed.is_empty() {
        "sensor".to_string()
    } else {
        trimmed.to_string()
    }
}

/// A node's deterministic topic name: `slug(name) + "_" + first8(id)`.
pub fn topic_for(name: &str, id: &NodeId) -> String {
    format!("{}_{}", slug(name), id.short())
}

/// Reserved topics never returned by topic discovery.
pub const SYSTEM_TOPICS: &[&str] = &["system_status", "system_metrics"];

/// Closed enumeration of node types. The tagged sum a statically-typed
/// builder dispatches on (§9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Sensor,
    Crop,
    VoxelDownsample,
    UniformDownsample,
    StatisticalOutlierRemoval,
    RadiusOutlierRemoval,
    PlaneSegmentation,
    DbscanClustering,
    AttributeFilter,
    BoundaryDetection,
    Fusion,
    Calibration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    Sensor,
    Operation,
    Fusion,
    Calibration,
}

impl NodeType {
    pub fn category(self) -> NodeCategory {
        match self {
            NodeType::Sensor => NodeCategory::Sensor,
            NodeType::Fusion => NodeCategory::Fusion,
            NodeType::Calibration => NodeCategory::Calibration,
            _ => NodeCategory::Operation,
        }
    }
}

/// The persisted description of a node, as loaded from the graph store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub category: NodeCategory,
    pub enabled: bool,
    /// Type-specific configuration; parsed by the corresponding node builder.
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

/// A declared directed connection. Ports are structural placeholders; routing
/// uses `source_node_id -> target_node_id` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: String,
    pub source_node_id: NodeId,
    #[serde(default)]
    pub source_port: String,
    pub target_node_id: NodeId,
    #[serde(default)]
    pub target_port: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_replaces_and_collapses() {
        assert_eq!(slug("Front Lidar #1"), "Front_Lidar_1");
        assert_eq!(slug("test__sensor--name"), "test_sensor_name");
        assert_eq!(slug(""), "sensor");
    }

    #[test]
    fn slug_is_idempotent() {
        for name in ["Front Lidar #1", "", "already_slugged", "!!!"] {
            let once = slug(name);
            let twice = slug(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn topic_for_uses_first_eight_of_id() {
        let id = NodeId::from("0123456789abcdef");
        assert_eq!(topic_for("Front Lidar", &id), "Front_Lidar_01234567");
    }

    #[test]
    fn system_topics_contains_reserved_names() {
        assert!(SYSTEM_TOPICS.contains(&"system_status"));
        assert!(SYSTEM_TOPICS.contains(&"system_metrics"));
    }
}
