//! Wire shapes for a metrics snapshot (§4.13), broadcast verbatim as JSON on
//! `system_metrics`.

use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeMetrics {
    pub node_id: String,
    pub node_name: String,
    pub node_type: String,
    pub last_exec_ms: f64,
    pub avg_exec_ms: f64,
    pub calls_total: u64,
    pub throughput_pps: f64,
    pub last_point_count: usize,
    pub throttled_count: u64,
    pub last_seen_seconds_ago: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TopicMetrics {
    pub messages_per_sec: f64,
    pub bytes_per_sec: f64,
    pub active_connections: u32,
    pub total_messages: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EndpointMetrics {
    pub path: String,
    pub method: String,
    pub avg_latency_ms: f64,
    pub calls_total: u64,
    pub last_status_code: u16,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SystemMetrics {
    pub cpu_percent: f64,
    pub memory_used_mb: f64,
    pub memory_total_mb: f64,
    pub memory_percent: f64,
    pub thread_count: usize,
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: f64,
    pub nodes: Vec<NodeMetrics>,
    pub topics: HashMap<String, TopicMetrics>,
    pub total_connections: u32,
    pub system: SystemMetrics,
    pub endpoints: Vec<EndpointMetrics>,
}
