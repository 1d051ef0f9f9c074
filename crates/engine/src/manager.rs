//! Lifecycle manager (§4.8): the top-level owner of node instances, the
//! downstream map, and the sensor worker subprocesses. `Engine` is the one
//! place allowed to mutate the node registry — the dispatcher and router
//! only ever read it.

use crate::dispatch;
use crate::error::EngineError;
use crate::node_builder::build_node;
use crate::registry::{NodeEntry, NodeRegistry};
use crate::router::Router;
use crate::status;
use crate::throttle::ThrottleController;
use metrics::MetricsCollector;
use recording::RecorderService;
use sensor::{SensorHandle, WorkerMode};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use store::GraphStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use topics::TopicHub;
use tracing::{info, warn};
use types::{NodeCategory, NodeId, NodeRecord};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bound on the cross-process ingress queue; full means drop at the
    /// producing sensor worker (§5).
    pub ingress_capacity: usize,
    /// Path to the current executable, re-exec'd with `sensor-worker` argv
    /// to spawn a worker subprocess.
    pub sensor_worker_exe: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { ingress_capacity: 100, sensor_worker_exe: std::env::current_exe().unwrap_or_else(|_| PathBuf::from("pointgraphd")) }
    }
}

struct RunningState {
    dispatcher_task: JoinHandle<()>,
    status_task: JoinHandle<()>,
    sensor_handles: HashMap<NodeId, SensorHandle>,
}

pub struct Engine {
    graph_store: Arc<dyn GraphStore>,
    registry: Arc<NodeRegistry>,
    throttle: Arc<ThrottleController>,
    hub: Arc<TopicHub>,
    recorder: Arc<RecorderService>,
    metrics: Arc<dyn MetricsCollector>,
    router: Arc<Router>,
    config: EngineConfig,
    running: Mutex<Option<RunningState>>,
}

impl Engine {
    pub fn new(
        graph_store: Arc<dyn GraphStore>,
        hub: Arc<TopicHub>,
        recorder: Arc<RecorderService>,
        metrics: Arc<dyn MetricsCollector>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let registry = Arc::new(NodeRegistry::new());
        let throttle = Arc::new(ThrottleController::new());
        let router = Arc::new(Router::new(hub.clone(), registry.clone(), throttle.clone(), recorder.clone(), metrics.clone()));
        Arc::new(Self { graph_store, registry, throttle, hub, recorder, metrics, router, config, running: Mutex::new(None) })
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().expect("engine running-state lock poisoned").is_some()
    }

    /// Reads persisted nodes and edges, instantiating enabled nodes in the
    /// order `sensor -> operation -> fusion -> calibration`, a practical
    /// topological approximation (true cycles are rejected at edge-save
    /// time, outside the engine). Returns the per-node errors for any node
    /// that was skipped; other nodes still load.
    pub fn load_config(&self) -> Result<Vec<EngineError>, EngineError> {
        let doc = self.graph_store.load()?;
        let mut ordered: Vec<&NodeRecord> = doc.nodes.iter().filter(|n| n.enabled).collect();
        ordered.sort_by_key(|n| category_rank(n.category));

        let mut skipped = Vec::new();
        for record in ordered {
            match build_node(record, &doc.edges) {
                Ok(instance) => {
                    let topic = types::topic_for(&record.name, &record.id);
                    self.hub.register(&topic);
                    self.throttle.register(record.id.clone(), throttle_ms_of(record));
                    let instance: Arc<Mutex<Box<dyn types::PointCloudNode>>> = Arc::new(Mutex::new(instance));
                    let (inbox, node_rx) = mpsc::unbounded_channel();
                    self.registry.insert(
                        record.id.clone(),
                        NodeEntry { record: record.clone(), topic, instance: instance.clone(), inbox },
                    );
                    self.router.spawn_node(record.id.clone(), record.clone(), instance, node_rx);
                }
                Err(error) => {
                    warn!(node = %record.id, %error, "skipping node that failed to build");
                    skipped.push(error);
                }
            }
        }

        let mut downstream: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for edge in &doc.edges {
            if self.registry.contains(&edge.source_node_id) && self.registry.contains(&edge.target_node_id) {
                downstream.entry(edge.source_node_id.clone()).or_default().push(edge.target_node_id.clone());
            }
        }
        for (source, targets) in downstream {
            self.registry.set_downstream(source, targets);
        }

        Ok(skipped)
    }

    /// Spawns a fresh ingress queue, starts every sensor node's worker
    /// subprocess, and spawns the dispatcher and status aggregator tasks.
    pub fn start(self: &Arc<Self>) -> Result<(), EngineError> {
        let (tx, rx) = mpsc::channel(self.config.ingress_capacity);

        let mut sensor_handles = HashMap::new();
        for id in self.registry.ids() {
            let Some((record, _topic, _instance)) = self.registry.lookup(&id) else { continue };
            if record.category != NodeCategory::Sensor {
                continue;
            }
            let Some(mode) = worker_mode_of(&record) else {
                warn!(node = %id, "sensor node has no worker configuration; it will never receive frames");
                continue;
            };
            match SensorHandle::spawn(&self.config.sensor_worker_exe, &mode, id.clone(), tx.clone()) {
                Ok(handle) => {
                    sensor_handles.insert(id, handle);
                }
                Err(error) => warn!(node = %id, %error, "failed to start sensor worker"),
            }
        }

        let dispatcher_task = tokio::spawn(dispatch::run(rx, self.registry.clone()));
        let status_task = tokio::spawn(status::run(self.registry.clone(), self.hub.clone()));

        *self.running.lock().expect("engine running-state lock poisoned") =
            Some(RunningState { dispatcher_task, status_task, sensor_handles });
        info!("engine started");
        Ok(())
    }

    /// Cancels the dispatcher and status tasks, then stops every sensor
    /// worker with a 1-second join deadline before force-terminating.
    pub async fn stop(&self) {
        let Some(state) = self.running.lock().expect("engine running-state lock poisoned").take() else {
            return;
        };
        state.dispatcher_task.abort();
        state.status_task.abort();
        for (id, handle) in state.sensor_handles {
            if tokio::time::timeout(Duration::from_secs(1), handle.stop()).await.is_err() {
                warn!(node = %id, "sensor worker did not stop within the join deadline");
            }
        }
        info!("engine stopped");
    }

    /// Snapshots whether the engine was running, stops it, purges nodes
    /// and their topics (system topics are never touched — they are
    /// registered by the status/metrics tasks, not the node registry), and
    /// reloads from the store. Restarts only if it was running before.
    ///
    /// Live WebSocket subscribers of user topics are not preserved across a
    /// reload; this matches the original source's own behavior and is
    /// documented, not accidental (§9).
    pub async fn reload_config(self: &Arc<Self>) -> Result<Vec<EngineError>, EngineError> {
        let was_running = self.is_running();
        if was_running {
            self.stop().await;
        }
        for id in self.registry.ids() {
            if let Some(topic) = self.registry.topic_of(&id) {
                self.hub.unregister(&topic);
            }
            self.throttle.unregister(&id);
        }
        self.registry.clear();

        let skipped = self.load_config()?;
        if was_running {
            self.start()?;
        }
        Ok(skipped)
    }

    /// Removes a node while the engine may be running and a payload is in
    /// flight (§4.8): the instance is stopped (if a sensor), its topic
    /// unregistered, and it is pruned from `downstream` both as source and
    /// target so any in-flight reference to it is a safe, silent drop.
    pub async fn remove_node(&self, id: &NodeId) -> Result<(), EngineError> {
        if !self.registry.contains(id) {
            return Err(EngineError::NodeNotFound(id.clone()));
        }

        if let Some(mut state) = self.running.lock().expect("engine running-state lock poisoned").take() {
            if let Some(handle) = state.sensor_handles.remove(id) {
                let _ = tokio::time::timeout(Duration::from_secs(1), handle.stop()).await;
            }
            *self.running.lock().expect("engine running-state lock poisoned") = Some(state);
        }

        if let Some(topic) = self.registry.topic_of(id) {
            self.hub.unregister(&topic);
        }
        self.throttle.unregister(id);
        self.router.disarm_recording(id);
        self.registry.remove(id);
        Ok(())
    }

    pub fn graph_store(&self) -> &Arc<dyn GraphStore> {
        &self.graph_store
    }
}

fn category_rank(category: NodeCategory) -> u8 {
    match category {
        NodeCategory::Sensor => 0,
        NodeCategory::Operation => 1,
        NodeCategory::Fusion => 2,
        NodeCategory::Calibration => 3,
    }
}

fn throttle_ms_of(record: &NodeRecord) -> u64 {
    record.config.get("throttle_ms").and_then(|v| v.as_u64()).unwrap_or(0)
}

fn worker_mode_of(record: &NodeRecord) -> Option<WorkerMode> {
    let worker = record.config.get("worker")?;
    match worker.get("mode")?.as_str()? {
        "replay" => Some(WorkerMode::Replay { archive_path: PathBuf::from(worker.get("archive_path")?.as_str()?) }),
        "hardware" => Some(WorkerMode::Hardware { endpoint: worker.get("endpoint")?.as_str()?.to_string() }),
        _ => None,
    }
}
