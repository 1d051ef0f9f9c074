//! Null-object collector boundary (§4.13): every call site records through
//! a `dyn MetricsCollector` so metrics collection can be switched off
//! without branching at each call site.

use crate::model::{MetricsSnapshot, SystemMetrics};
use crate::registry::MetricsRegistry;
use std::sync::Arc;

pub trait MetricsCollector: Send + Sync {
    fn record_node_exec(&self, node_id: &str, node_name: &str, node_type: &str, exec_ms: f64, point_count: usize);
    fn record_throttled(&self, node_id: &str);
    fn record_ws_message(&self, topic: &str, byte_size: usize);
    fn record_ws_connections(&self, topic: &str, count: u32);
    fn record_endpoint(&self, path: &str, method: &str, latency_ms: f64, status_code: u16);
    fn record_system(&self, system: SystemMetrics);
    fn snapshot(&self, timestamp: f64) -> Option<MetricsSnapshot>;
    fn is_enabled(&self) -> bool;
}

/// Backed by a real [`MetricsRegistry`]. Cheap to clone; share one instance.
pub struct Collector {
    registry: Arc<MetricsRegistry>,
}

impl Collector {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }
}

impl MetricsCollector for Collector {
    fn record_node_exec(&self, node_id: &str, node_name: &str, node_type: &str, exec_ms: f64, point_count: usize) {
        self.registry.record_node_exec(node_id, node_name, node_type, exec_ms, point_count);
    }

    fn record_throttled(&self, node_id: &str) {
        self.registry.record_throttled(node_id);
    }

    fn record_ws_message(&self, topic: &str, byte_size: usize) {
        self.registry.record_ws_message(topic, byte_size);
    }

    fn record_ws_connections(&self, topic: &str, count: u32) {
        self.registry.record_ws_connections(topic, count);
    }

    fn record_endpoint(&self, path: &str, method: &str, latency_ms: f64, status_code: u16) {
        self.registry.record_endpoint(path, method, latency_ms, status_code);
    }

    fn record_system(&self, system: SystemMetrics) {
        self.registry.record_system(system);
    }

    fn snapshot(&self, timestamp: f64) -> Option<MetricsSnapshot> {
        Some(self.registry.snapshot(timestamp))
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Discards everything. Used when metrics collection is disabled in config,
/// so call sites never need an `if collection_enabled` guard.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCollector;

impl MetricsCollector for NullCollector {
    fn record_node_exec(&self, _node_id: &str, _node_name: &str, _node_type: &str, _exec_ms: f64, _point_count: usize) {}
    fn record_throttled(&self, _node_id: &str) {}
    fn record_ws_message(&self, _topic: &str, _byte_size: usize) {}
    fn record_ws_connections(&self, _topic: &str, _count: u32) {}
    fn record_endpoint(&self, _path: &str, _method: &str, _latency_ms: f64, _status_code: u16) {}
    fn record_system(&self, _system: SystemMetrics) {}
    fn snapshot(&self, _timestamp: f64) -> Option<MetricsSnapshot> {
        None
    }
    fn is_enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_collector_reports_disabled_and_no_snapshot() {
        let collector = NullCollector;
        collector.record_node_exec("n1", "Node", "crop", 1.0, 1);
        assert!(!collector.is_enabled());
        assert!(collector.snapshot(0.0).is_none());
    }

    #[test]
    fn real_collector_reports_enabled_and_forwards_to_registry() {
        let registry = Arc::new(MetricsRegistry::new());
        let collector = Collector::new(registry);
        collector.record_node_exec("n1", "Node", "crop", 2.0, 5);
        assert!(collector.is_enabled());
        let snapshot = collector.snapshot(0.0).unwrap();
        assert_eq!(snapshot.nodes.len(), 1);
    }
}
