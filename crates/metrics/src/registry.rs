//! In-memory metrics state: one rolling-window sample per node/topic/
//! endpoint, mutation-protected by a single mutex (contention is not a
//! concern at the call rates involved — a handful of nodes, not per-point).

use crate::model::{EndpointMetrics, MetricsSnapshot, NodeMetrics, SystemMetrics, TopicMetrics};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Instant;

/// Capacity of the rolling exec-time / latency windows (§4.13).
const SAMPLE_CAPACITY: usize = 60;
/// Width of the sliding window used for messages/bytes-per-second.
const RATE_WINDOW: std::time::Duration = std::time::Duration::from_secs(1);
/// A node counts as "running" in the snapshot if it executed within this long.
const RUNNING_WINDOW_SECONDS: f64 = 5.0;

struct NodeSample {
    node_name: String,
    node_type: String,
    last_exec_ms: f64,
    exec_times: VecDeque<f64>,
    calls_total: u64,
    last_point_count: usize,
    throttled_count: u64,
    last_seen: Instant,
}

impl NodeSample {
    fn avg_exec_ms(&self) -> f64 {
        if self.exec_times.is_empty() {
            0.0
        } else {
            self.exec_times.iter().sum::<f64>() / self.exec_times.len() as f64
        }
    }
}

#[derive(Default)]
struct TopicSample {
    messages_window: VecDeque<(Instant, usize)>,
    total_messages: u64,
    total_bytes: u64,
    active_connections: u32,
}

impl TopicSample {
    fn prune(&mut self, now: Instant) {
        while let Some(&(ts, _)) = self.messages_window.front() {
            if now.duration_since(ts) > RATE_WINDOW {
                self.messages_window.pop_front();
            } else {
                break;
            }
        }
    }

    fn messages_per_sec(&self, now: Instant) -> f64 {
        self.messages_window.iter().filter(|(ts, _)| now.duration_since(*ts) <= RATE_WINDOW).count() as f64
    }

    fn bytes_per_sec(&self, now: Instant) -> f64 {
        self.messages_window
            .iter()
            .filter(|(ts, _)| now.duration_since(*ts) <= RATE_WINDOW)
            .map(|(_, size)| *size as f64)
            .sum()
    }
}

struct EndpointSample {
    path: String,
    method: String,
    latencies: VecDeque<f64>,
    calls_total: u64,
    last_status_code: u16,
}

impl EndpointSample {
    fn avg_latency_ms(&self) -> f64 {
        if self.latencies.is_empty() {
            0.0
        } else {
            self.latencies.iter().sum::<f64>() / self.latencies.len() as f64
        }
    }
}

#[derive(Default)]
struct State {
    nodes: HashMap<String, NodeSample>,
    topics: HashMap<String, TopicSample>,
    endpoints: HashMap<String, EndpointSample>,
    system: SystemMetrics,
}

/// Holds every rolling-window sample. Behind a single mutex; all operations
/// are O(1) amortized deque pushes bounded at `SAMPLE_CAPACITY`.
pub struct MetricsRegistry {
    state: Mutex<State>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self { state: Mutex::new(State::default()) }
    }

    pub fn record_node_exec(&self, node_id: &str, node_name: &str, node_type: &str, exec_ms: f64, point_count: usize) {
        let mut state = self.state.lock().expect("metrics lock poisoned");
        let sample = state.nodes.entry(node_id.to_string()).or_insert_with(|| NodeSample {
            node_name: node_name.to_string(),
            node_type: node_type.to_string(),
            last_exec_ms: 0.0,
            exec_times: VecDeque::with_capacity(SAMPLE_CAPACITY),
            calls_total: 0,
            last_point_count: 0,
            throttled_count: 0,
            last_seen: Instant::now(),
        });
        sample.last_exec_ms = exec_ms;
        if sample.exec_times.len() == SAMPLE_CAPACITY {
            sample.exec_times.pop_front();
        }
        sample.exec_times.push_back(exec_ms);
        sample.calls_total += 1;
        sample.last_point_count = point_count;
        sample.last_seen = Instant::now();
    }

    pub fn record_throttled(&self, node_id: &str) {
        let mut state = self.state.lock().expect("metrics lock poisoned");
        if let Some(sample) = state.nodes.get_mut(node_id) {
            sample.throttled_count += 1;
        }
    }

    pub fn record_ws_message(&self, topic: &str, byte_size: usize) {
        let mut state = self.state.lock().expect("metrics lock poisoned");
        let now = Instant::now();
        let sample = state.topics.entry(topic.to_string()).or_default();
        sample.prune(now);
        sample.messages_window.push_back((now, byte_size));
        sample.total_messages += 1;
        sample.total_bytes += byte_size as u64;
    }

    pub fn record_ws_connections(&self, topic: &str, count: u32) {
        let mut state = self.state.lock().expect("metrics lock poisoned");
        state.topics.entry(topic.to_string()).or_default().active_connections = count;
    }

    pub fn record_endpoint(&self, path: &str, method: &str, latency_ms: f64, status_code: u16) {
        let mut state = self.state.lock().expect("metrics lock poisoned");
        let key = format!("{method}:{path}");
        let sample = state.endpoints.entry(key).or_insert_with(|| EndpointSample {
            path: path.to_string(),
            method: method.to_string(),
            latencies: VecDeque::with_capacity(SAMPLE_CAPACITY),
            calls_total: 0,
            last_status_code: status_code,
        });
        if sample.latencies.len() == SAMPLE_CAPACITY {
            sample.latencies.pop_front();
        }
        sample.latencies.push_back(latency_ms);
        sample.calls_total += 1;
        sample.last_status_code = status_code;
    }

    pub fn record_system(&self, system: SystemMetrics) {
        self.state.lock().expect("metrics lock poisoned").system = system;
    }

    pub fn snapshot(&self, timestamp: f64) -> MetricsSnapshot {
        let state = self.state.lock().expect("metrics lock poisoned");
        let now = Instant::now();

        let nodes: Vec<NodeMetrics> = state
            .nodes
            .iter()
            .map(|(id, sample)| {
                let elapsed = now.duration_since(sample.last_seen).as_secs_f64();
                let throughput_pps = if elapsed > 0.0 { sample.last_point_count as f64 / elapsed.max(1.0 / 30.0) } else { 0.0 };
                NodeMetrics {
                    node_id: id.clone(),
                    node_name: sample.node_name.clone(),
                    node_type: sample.node_type.clone(),
                    last_exec_ms: sample.last_exec_ms,
                    avg_exec_ms: sample.avg_exec_ms(),
                    calls_total: sample.calls_total,
                    throughput_pps,
                    last_point_count: sample.last_point_count,
                    throttled_count: sample.throttled_count,
                    last_seen_seconds_ago: elapsed,
                }
            })
            .collect();

        let topics: HashMap<String, TopicMetrics> = state
            .topics
            .iter()
            .map(|(topic, sample)| {
                (
                    topic.clone(),
                    TopicMetrics {
                        messages_per_sec: sample.messages_per_sec(now),
                        bytes_per_sec: sample.bytes_per_sec(now),
                        active_connections: sample.active_connections,
                        total_messages: sample.total_messages,
                        total_bytes: sample.total_bytes,
                    },
                )
            })
            .collect();
        let total_connections = topics.values().map(|t| t.active_connections).sum();

        let endpoints: Vec<EndpointMetrics> = state
            .endpoints
            .values()
            .map(|sample| EndpointMetrics {
                path: sample.path.clone(),
                method: sample.method.clone(),
                avg_latency_ms: sample.avg_latency_ms(),
                calls_total: sample.calls_total,
                last_status_code: sample.last_status_code,
            })
            .collect();

        MetricsSnapshot { timestamp, nodes, topics, total_connections, system: state.system.clone(), endpoints }
    }

    #[cfg(test)]
    fn running_node_count(&self) -> usize {
        let state = self.state.lock().expect("metrics lock poisoned");
        let now = Instant::now();
        state.nodes.values().filter(|n| now.duration_since(n.last_seen).as_secs_f64() < RUNNING_WINDOW_SECONDS).count()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
