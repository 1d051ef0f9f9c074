//! Fusion (§4.5): concatenate the latest frame from each of a declared set
//! of upstream sources once every source has contributed at least once.

use std::collections::HashMap;
use types::{FramePayload, NodeId, NodeStatus, PointCloud, PointCloudNode};

/// The source set `S` is derived at build time from inbound edges, not from
/// user-facing config, so it is a constructor argument rather than a
/// deserialized field.
pub struct Fusion {
    sources: Vec<NodeId>,
    latest: HashMap<NodeId, PointCloud>,
    fused_count: u64,
}

impl Fusion {
    pub fn new(sources: Vec<NodeId>) -> Self {
        Self { sources, latest: HashMap::new(), fused_count: 0 }
    }

    fn is_covered(&self) -> bool {
        self.sources.iter().all(|s| self.latest.contains_key(s))
    }
}

impl PointCloudNode for Fusion {
    fn on_input(&mut self, payload: FramePayload) -> Option<FramePayload> {
        self.latest.insert(payload.source_node_id.clone(), payload.points);

        if !self.is_covered() {
            return None;
        }

        let clouds: Vec<&PointCloud> = self.sources.iter().filter_map(|s| self.latest.get(s)).collect();
        let fused = PointCloud::concat(&clouds);
        self.fused_count += 1;
        Some(FramePayload::new(payload.source_node_id, fused, payload.timestamp))
    }

    fn status(&self) -> NodeStatus {
        let mut s = NodeStatus::healthy();
        s.counters = serde_json::json!({
            "fused_count": self.fused_count,
            "sources_covered": self.latest.len(),
            "sources_declared": self.sources.len(),
        });
        s
    }
}
