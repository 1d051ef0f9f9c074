//! Recording metadata model (§3, §4.9).

use crate::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingStatus {
    Recording,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingRecord {
    pub id: String,
    pub file_path: String,
    pub sensor_id: Option<NodeId>,
    pub node_id: NodeId,
    pub frame_count: u32,
    pub duration_seconds: f64,
    pub file_size_bytes: u64,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub thumbnail_path: Option<String>,
    pub status: RecordingStatus,
}
