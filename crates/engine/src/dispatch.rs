//! Ingress dispatcher (§4.4): the single consumer draining the
//! cross-process queue that sensor workers feed. Resolves the owning
//! node's mailbox and hands the payload straight to it, then immediately
//! goes back to `recv` without waiting on that node's own processing, so
//! downstream work never backs up the queue a worker is writing into.
//! Ordering into a given node's mailbox follows from this loop itself
//! being single-consumer and sequential (§5, §8).

use crate::registry::NodeRegistry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;
use types::{FramePayload, NodeId};

/// Runs until `queue` closes (every sensor handle dropped and the sender
/// side with it). Never panics on a missing node — an unknown id is the
/// one allowed loss between ingress and the owning source node.
pub async fn run(mut queue: mpsc::Receiver<(NodeId, FramePayload)>, registry: Arc<NodeRegistry>) {
    while let Some((node_id, payload)) = queue.recv().await {
        let Some(inbox) = registry.mailbox_of(&node_id) else {
            warn!(node = %node_id, "ingress payload for unknown node dropped");
            continue;
        };

        if inbox.send(payload).is_err() {
            warn!(node = %node_id, "node mailbox closed, ingress payload dropped");
        }
    }
}
