//! Status aggregator (§4.12): at a fixed ~2 Hz cadence, composes every
//! node's runtime status joined with its persisted category/enabled/topic
//! and broadcasts it on the reserved `system_status` topic. Mirrors
//! `metrics::broadcaster::run`'s single-ticker shape.

use crate::registry::NodeRegistry;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use topics::TopicHub;
use tracing::warn;
use types::NodeStatus;

pub const TOPIC: &str = "system_status";
const BROADCAST_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize)]
struct NodeStatusEntry {
    node_id: String,
    name: String,
    category: types::NodeCategory,
    enabled: bool,
    topic: String,
    #[serde(flatten)]
    status: NodeStatus,
}

#[derive(Debug, Serialize)]
struct StatusSnapshot {
    nodes: Vec<NodeStatusEntry>,
}

pub async fn run(registry: Arc<NodeRegistry>, hub: Arc<TopicHub>) {
    hub.register(TOPIC);
    let mut ticker = tokio::time::interval(BROADCAST_INTERVAL);
    loop {
        ticker.tick().await;
        let nodes = registry
            .all_statuses()
            .into_iter()
            .map(|(record, topic, status)| NodeStatusEntry {
                node_id: record.id.to_string(),
                name: record.name,
                category: record.category,
                enabled: record.enabled,
                topic,
                status,
            })
            .collect();
        let snapshot = StatusSnapshot { nodes };
        match serde_json::to_vec(&snapshot) {
            Ok(bytes) => hub.broadcast(TOPIC, bytes.into()),
            Err(error) => warn!(%error, "failed to serialize status snapshot"),
        }
    }
}
