//! Node registry and downstream map (§5): mutated only by the lifecycle
//! manager, read in short critical sections by the dispatcher and router.
//! Each node instance gets its own mutex so concurrent dispatch to
//! distinct downstream nodes never contends on a shared lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use types::{FramePayload, NodeId, NodeRecord, NodeStatus, PointCloudNode};

/// A live node: its persisted description, deterministic topic name, the
/// boxed operator instance behind its own lock, and the mailbox feeding its
/// own sequential processing task (§5: a single source->target stream is
/// never reordered because each node drains its mailbox one frame at a
/// time, in send order).
pub struct NodeEntry {
    pub record: NodeRecord,
    pub topic: String,
    pub instance: Arc<Mutex<Box<dyn PointCloudNode>>>,
    pub inbox: mpsc::UnboundedSender<FramePayload>,
}

impl NodeEntry {
    pub fn status(&self) -> NodeStatus {
        self.instance.lock().expect("node instance lock poisoned").status()
    }
}

#[derive(Default)]
pub struct NodeRegistry {
    nodes: RwLock<HashMap<NodeId, NodeEntry>>,
    downstream: RwLock<HashMap<NodeId, Vec<NodeId>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: NodeId, entry: NodeEntry) {
        self.nodes.write().expect("node registry lock poisoned").insert(id, entry);
    }

    /// Removes `id`'s entry and prunes it from `downstream` as both a
    /// source and a target, so in-flight payloads referencing it are
    /// dropped by the dispatcher/router rather than misrouted.
    pub fn remove(&self, id: &NodeId) -> Option<NodeEntry> {
        let removed = self.nodes.write().expect("node registry lock poisoned").remove(id);
        let mut downstream = self.downstream.write().expect("downstream map lock poisoned");
        downstream.remove(id);
        for targets in downstream.values_mut() {
            targets.retain(|target| target != id);
        }
        removed
    }

    pub fn clear(&self) {
        self.nodes.write().expect("node registry lock poisoned").clear();
        self.downstream.write().expect("downstream map lock poisoned").clear();
    }

    /// Clones the small pieces a dispatch needs: topic name and a handle
    /// to the node's own mutex. Avoids holding the registry lock while the
    /// node itself runs.
    pub fn lookup(&self, id: &NodeId) -> Option<(NodeRecord, String, Arc<Mutex<Box<dyn PointCloudNode>>>)> {
        let nodes = self.nodes.read().expect("node registry lock poisoned");
        nodes.get(id).map(|entry| (entry.record.clone(), entry.topic.clone(), entry.instance.clone()))
    }

    pub fn topic_of(&self, id: &NodeId) -> Option<String> {
        self.nodes.read().expect("node registry lock poisoned").get(id).map(|entry| entry.topic.clone())
    }

    /// A clone of `id`'s mailbox sender, used to hand it a frame without
    /// taking a lock on its instance or running it inline. Draining this
    /// mailbox is the owning node's own task's job (see `Router::spawn_node`).
    pub fn mailbox_of(&self, id: &NodeId) -> Option<mpsc::UnboundedSender<FramePayload>> {
        self.nodes.read().expect("node registry lock poisoned").get(id).map(|entry| entry.inbox.clone())
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.read().expect("node registry lock poisoned").contains_key(id)
    }

    pub fn set_downstream(&self, source: NodeId, targets: Vec<NodeId>) {
        self.downstream.write().expect("downstream map lock poisoned").insert(source, targets);
    }

    pub fn downstream_of(&self, source: &NodeId) -> Vec<NodeId> {
        self.downstream.read().expect("downstream map lock poisoned").get(source).cloned().unwrap_or_default()
    }

    pub fn all_statuses(&self) -> Vec<(NodeRecord, String, NodeStatus)> {
        self.nodes
            .read()
            .expect("node registry lock poisoned")
            .values()
            .map(|entry| (entry.record.clone(), entry.topic.clone(), entry.status()))
            .collect()
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.read().expect("node registry lock poisoned").keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ops::Crop;
    use types::{NodeCategory, NodeType};

    fn sample_record(id: NodeId) -> NodeRecord {
        NodeRecord {
            id,
            name: "n".to_string(),
            node_type: NodeType::Crop,
            category: NodeCategory::Operation,
            enabled: true,
            config: serde_json::json!({}),
            x: 0.0,
            y: 0.0,
        }
    }

    fn sample_entry(id: NodeId) -> NodeEntry {
        let instance: Box<dyn PointCloudNode> =
            Box::new(Crop::new(ops::CropConfig { min: [0.0; 3], max: [1.0; 3] }));
        let (inbox, _rx) = mpsc::unbounded_channel();
        NodeEntry { record: sample_record(id), topic: "topic".to_string(), instance: Arc::new(Mutex::new(instance)), inbox }
    }

    #[test]
    fn remove_prunes_node_from_downstream_as_source_and_target() {
        let registry = NodeRegistry::new();
        let a = NodeId::new();
        let b = NodeId::new();
        registry.insert(a.clone(), sample_entry(a.clone()));
        registry.insert(b.clone(), sample_entry(b.clone()));
        registry.set_downstream(a.clone(), vec![b.clone()]);
        registry.set_downstream(b.clone(), vec![a.clone()]);

        registry.remove(&b);

        assert!(!registry.contains(&b));
        assert_eq!(registry.downstream_of(&a), Vec::<NodeId>::new());
    }

    #[test]
    fn lookup_on_unknown_id_is_none() {
        let registry = NodeRegistry::new();
        assert!(registry.lookup(&NodeId::new()).is_none());
    }
}
