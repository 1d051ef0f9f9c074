//! The calibration graph node (§4.10): a passthrough that buffers the
//! latest frame per contributing sensor so `CalibrationService::trigger`
//! has something to register against, without ever blocking data flow.

use std::collections::HashMap;
use types::{FramePayload, NodeId, NodeStatus, PointCloud, PointCloudNode};

pub struct CalibrationNode {
    latest_frames: HashMap<NodeId, PointCloud>,
    reference_sensor_id: Option<NodeId>,
    source_sensor_ids: Vec<NodeId>,
}

impl CalibrationNode {
    pub fn new() -> Self {
        Self { latest_frames: HashMap::new(), reference_sensor_id: None, source_sensor_ids: Vec::new() }
    }

    pub fn reference_sensor_id(&self) -> Option<&NodeId> {
        self.reference_sensor_id.as_ref()
    }

    pub fn source_sensor_ids(&self) -> &[NodeId] {
        &self.source_sensor_ids
    }

    pub fn latest_frame(&self, sensor_id: &NodeId) -> Option<&PointCloud> {
        self.latest_frames.get(sensor_id)
    }
}

impl Default for CalibrationNode {
    fn default() -> Self {
        Self::new()
    }
}

impl PointCloudNode for CalibrationNode {
    /// Always forwards the frame unchanged: calibration only observes the
    /// stream, it never gates or rewrites it.
    fn on_input(&mut self, payload: FramePayload) -> Option<FramePayload> {
        let source = payload.source_node_id.clone();
        self.latest_frames.insert(source.clone(), payload.points.clone());

        match &self.reference_sensor_id {
            None => self.reference_sensor_id = Some(source),
            Some(reference) if *reference != source && !self.source_sensor_ids.contains(&source) => {
                self.source_sensor_ids.push(source);
            }
            _ => {}
        }

        Some(payload)
    }

    fn status(&self) -> NodeStatus {
        let mut status = NodeStatus::healthy();
        status.counters = serde_json::json!({
            "reference_sensor_id": self.reference_sensor_id.as_ref().map(|id| id.as_str()),
            "source_sensor_ids": self.source_sensor_ids.iter().map(NodeId::as_str).collect::<Vec<_>>(),
            "buffered_sources": self.latest_frames.len(),
        });
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(source: &str, n: usize) -> FramePayload {
        let data: Vec<f32> = (0..n * 3).map(|i| i as f32).collect();
        FramePayload::new(source.into(), PointCloud::from_flat(data, 3), 0.0)
    }

    #[test]
    fn first_source_becomes_reference_subsequent_become_sources() {
        let mut node = CalibrationNode::new();
        node.on_input(frame("a", 1));
        node.on_input(frame("b", 1));
        node.on_input(frame("c", 1));

        assert_eq!(node.reference_sensor_id(), Some(&"a".into()));
        assert_eq!(node.source_sensor_ids(), &[NodeId::from("b"), NodeId::from("c")]);
    }

    #[test]
    fn always_passes_through_input_unchanged() {
        let mut node = CalibrationNode::new();
        let out = node.on_input(frame("a", 2)).expect("passthrough");
        assert_eq!(out.count(), 2);
    }

    #[test]
    fn repeated_source_does_not_duplicate_in_source_list() {
        let mut node = CalibrationNode::new();
        node.on_input(frame("a", 1));
        node.on_input(frame("b", 1));
        node.on_input(frame("b", 1));
        assert_eq!(node.source_sensor_ids(), &[NodeId::from("b")]);
    }

    #[test]
    fn buffers_keep_only_latest_frame_per_source() {
        let mut node = CalibrationNode::new();
        node.on_input(frame("a", 1));
        node.on_input(frame("a", 5));
        assert_eq!(node.latest_frame(&"a".into()).unwrap().len(), 5);
    }
}
