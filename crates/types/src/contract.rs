//! The uniform node contract every graph node obeys (§4.5).

use crate::FramePayload;
use serde::{Deserialize, Serialize};

/// Health snapshot returned by `PointCloudNode::status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeStatus {
    pub running: bool,
    pub last_error: Option<String>,
    pub frame_age_seconds: Option<f64>,
    /// Operator-specific counters (e.g. `inliers`, `clusters`, `throttled`).
    #[serde(default)]
    pub counters: serde_json::Value,
}

impl NodeStatus {
    pub fn healthy() -> Self {
        Self { running: true, ..Default::default() }
    }

    pub fn with_error(message: impl Into<String>) -> Self {
        Self { running: false, last_error: Some(message.into()), ..Default::default() }
    }
}

/// Every node in the graph transforms an input frame into at most one output
/// frame and reports its own health; resource-owning nodes (sensors) also
/// implement `start`/`stop`.
pub trait PointCloudNode: Send {
    /// Transform one input frame, emitting zero or one output frames. The
    /// router rewrites `source_node_id` on the result to this node's id and
    /// is responsible for all downstream fan-out.
    fn on_input(&mut self, payload: FramePayload) -> Option<FramePayload>;

    fn status(&self) -> NodeStatus;
}
