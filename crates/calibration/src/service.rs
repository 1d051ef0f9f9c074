//! The calibration service (§4.10): resolves reference/source sensors from
//! a [`CalibrationNode`]'s buffers, runs two-stage registration, and manages
//! the pending/accept/reject/rollback/history lifecycle of the results.

use crate::error::CalibrationError;
use crate::node::CalibrationNode;
use crate::registration::{
    global_registration, icp, GlobalRegistrationConfig, LocalIcpConfig, RegistrationResult,
};
use chrono::Utc;
use nalgebra::Vector3;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use store::{GraphStore, HistoryStore};
use transforms::Transform3;
use types::{CalibrationRecord, NodeId, PointCloud, Quality, RegistrationStage};

/// Quality acceptance thresholds plus the registration defaults every
/// `trigger` call inherits unless overridden by `TriggerParams`.
#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    pub global: GlobalRegistrationConfig,
    pub icp: LocalIcpConfig,
    pub min_fitness: f64,
    pub max_rmse: f64,
    pub auto_save: bool,
    pub min_fitness_to_save: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            global: GlobalRegistrationConfig::default(),
            icp: LocalIcpConfig::default(),
            min_fitness: 0.7,
            max_rmse: 0.05,
            auto_save: false,
            min_fitness_to_save: 0.8,
        }
    }
}

/// Per-call overrides for a `trigger` invocation; `None` falls back to the
/// service's [`CalibrationConfig`] default.
#[derive(Debug, Clone, Default)]
pub struct TriggerParams {
    pub reference_sensor_id: Option<NodeId>,
    pub source_sensor_ids: Option<Vec<NodeId>>,
    pub translation_only: Option<bool>,
    pub auto_save: Option<bool>,
    pub min_fitness_to_save: Option<f64>,
}

/// Notified whenever calibration changes a sensor's persisted pose, so the
/// lifecycle manager can reload the graph (§4.8) and pick up the new pose.
pub trait ReloadTrigger: Send + Sync {
    fn request_reload(&self);
}

/// Translation (meters) / rotation (degrees) thresholds past which a global
/// RANSAC stage runs before local ICP (§4.10 step 2b).
const NEED_GLOBAL_TRANSLATION_METERS: f64 = 1.0;
const NEED_GLOBAL_ROTATION_DEGREES: f64 = 30.0;

pub struct CalibrationService {
    graph: Arc<dyn GraphStore>,
    history: Arc<dyn HistoryStore>,
    reload: Option<Arc<dyn ReloadTrigger>>,
    config: CalibrationConfig,
    pending: Mutex<HashMap<NodeId, CalibrationRecord>>,
}

impl CalibrationService {
    pub fn new(graph: Arc<dyn GraphStore>, history: Arc<dyn HistoryStore>, config: CalibrationConfig) -> Self {
        Self { graph, history, reload: None, config, pending: Mutex::new(HashMap::new()) }
    }

    pub fn with_reload_trigger(mut self, reload: Arc<dyn ReloadTrigger>) -> Self {
        self.reload = Some(reload);
        self
    }

    /// Runs registration for every resolved source against the resolved
    /// reference, returning one pending (or immediately-accepted, under
    /// `auto_save`) record per sensor.
    pub fn trigger(
        &self,
        node: &CalibrationNode,
        params: TriggerParams,
    ) -> Result<HashMap<NodeId, CalibrationRecord>, CalibrationError> {
        let reference = params
            .reference_sensor_id
            .or_else(|| node.reference_sensor_id().cloned())
            .ok_or(CalibrationError::NoReferenceFrame)?;
        let sources = params.source_sensor_ids.unwrap_or_else(|| node.source_sensor_ids().to_vec());
        if sources.is_empty() {
            return Err(CalibrationError::NoSourceSensors);
        }

        let reference_points =
            node.latest_frame(&reference).ok_or_else(|| CalibrationError::MissingFrame(reference.clone()))?;
        let reference_vectors = to_vectors(reference_points);

        let doc = self.graph.load()?;
        let translation_only = params.translation_only.unwrap_or(self.config.icp.translation_only);
        let auto_save = params.auto_save.unwrap_or(self.config.auto_save);
        let min_fitness_to_save = params.min_fitness_to_save.unwrap_or(self.config.min_fitness_to_save);

        let mut results = HashMap::new();
        for sensor_id in &sources {
            let source_points =
                node.latest_frame(sensor_id).ok_or_else(|| CalibrationError::MissingFrame(sensor_id.clone()))?;
            let source_vectors = to_vectors(source_points);

            let sensor_node = doc
                .nodes
                .iter()
                .find(|n| &n.id == sensor_id)
                .ok_or_else(|| CalibrationError::UnknownSensor(sensor_id.clone()))?;
            let pose_before = store::node_pose(sensor_node);
            let t_current = Transform3::from_pose(&pose_before);

            let (registration, stages) = register_two_stage(
                &source_vectors,
                &reference_vectors,
                t_current,
                translation_only,
                &self.config.global,
                &self.config.icp,
            );

            let pose_after = registration.transform.to_pose();
            let quality = Quality::classify(registration.fitness, registration.rmse, self.config.min_fitness, self.config.max_rmse);

            let mut record = CalibrationRecord {
                timestamp: Utc::now(),
                sensor_id: sensor_id.clone(),
                reference_sensor_id: reference.clone(),
                fitness: registration.fitness,
                rmse: registration.rmse,
                quality,
                stages_used: stages,
                pose_before,
                pose_after,
                transformation_matrix: matrix_to_rows(&registration.transform),
                accepted: false,
                notes: String::new(),
            };

            if auto_save && registration.fitness >= min_fitness_to_save {
                self.apply(&record)?;
                record.accepted = true;
            } else {
                self.pending.lock().expect("pending lock poisoned").insert(sensor_id.clone(), record.clone());
            }

            results.insert(sensor_id.clone(), record);
        }

        Ok(results)
    }

    /// Accepts pending results for `sensor_ids` (or every pending result if
    /// `None`): persists pose + history and triggers a graph reload.
    pub fn accept(&self, sensor_ids: Option<&[NodeId]>) -> Result<Vec<CalibrationRecord>, CalibrationError> {
        let mut pending = self.pending.lock().expect("pending lock poisoned");
        let keys: Vec<NodeId> = match sensor_ids {
            Some(ids) => ids.to_vec(),
            None => pending.keys().cloned().collect(),
        };

        let mut accepted = Vec::new();
        for id in keys {
            let Some(mut record) = pending.remove(&id) else {
                return Err(CalibrationError::NoPendingResult(id));
            };
            record.accepted = true;
            self.apply(&record)?;
            accepted.push(record);
        }
        Ok(accepted)
    }

    /// Discards every pending result without touching storage.
    pub fn reject(&self) {
        self.pending.lock().expect("pending lock poisoned").clear();
    }

    /// Restores `pose_after` of the record matching `timestamp` for
    /// `sensor_id` and reloads the graph.
    pub fn rollback(&self, sensor_id: &NodeId, timestamp: chrono::DateTime<Utc>) -> Result<(), CalibrationError> {
        let record = self
            .history
            .find_by_timestamp(sensor_id, timestamp)?
            .ok_or_else(|| CalibrationError::RecordNotFound { sensor_id: sensor_id.clone() })?;

        let doc = self.graph.load()?;
        let sensor_node = doc
            .nodes
            .iter()
            .find(|n| &n.id == sensor_id)
            .ok_or_else(|| CalibrationError::UnknownSensor(sensor_id.clone()))?
            .clone();
        self.set_pose(&doc, sensor_node, record.pose_after)?;
        self.trigger_reload();
        Ok(())
    }

    /// Newest-first calibration history for a sensor, capped at `limit` (0
    /// means unlimited).
    pub fn history(&self, sensor_id: &NodeId, limit: usize) -> Result<Vec<CalibrationRecord>, CalibrationError> {
        Ok(self.history.history(sensor_id, limit)?)
    }

    fn apply(&self, record: &CalibrationRecord) -> Result<(), CalibrationError> {
        let doc = self.graph.load()?;
        let sensor_node = doc
            .nodes
            .iter()
            .find(|n| n.id == record.sensor_id)
            .ok_or_else(|| CalibrationError::UnknownSensor(record.sensor_id.clone()))?
            .clone();
        self.set_pose(&doc, sensor_node, record.pose_after)?;
        self.history.save(record)?;
        self.trigger_reload();
        Ok(())
    }

    fn set_pose(
        &self,
        doc: &store::GraphDocument,
        sensor_node: types::NodeRecord,
        pose: types::Pose,
    ) -> Result<(), CalibrationError> {
        let updated = store::with_node_pose(sensor_node, pose);
        let mut doc = doc.clone();
        if let Some(slot) = doc.nodes.iter_mut().find(|n| n.id == updated.id) {
            *slot = updated;
        }
        self.graph.save(&doc)?;
        Ok(())
    }

    fn trigger_reload(&self) {
        if let Some(reload) = &self.reload {
            reload.request_reload();
        }
    }
}

fn to_vectors(points: &PointCloud) -> Vec<Vector3<f64>> {
    (0..points.len())
        .map(|i| {
            let [x, y, z] = points.xyz(i);
            Vector3::new(x as f64, y as f64, z as f64)
        })
        .collect()
}

fn matrix_to_rows(transform: &Transform3) -> types::Matrix4 {
    let m = transform.matrix();
    let mut rows = types::identity_matrix();
    for r in 0..4 {
        for c in 0..4 {
            rows[r][c] = m[(r, c)];
        }
    }
    rows
}

/// Two-stage registration (§4.10 step 2b): a global RANSAC stage runs only
/// when the current pose estimate is far enough off (>1m translation or
/// >30deg rotation from identity) to risk ICP converging on the wrong local
/// minimum, followed by local ICP refinement.
fn register_two_stage(
    source: &[Vector3<f64>],
    target: &[Vector3<f64>],
    initial: Transform3,
    translation_only: bool,
    global_cfg: &GlobalRegistrationConfig,
    icp_cfg: &LocalIcpConfig,
) -> (RegistrationResult, Vec<RegistrationStage>) {
    let mut stages = Vec::new();
    let mut icp_initial = initial;

    let needs_global = initial.translation().norm() > NEED_GLOBAL_TRANSLATION_METERS
        || initial.rotation_angle_from_identity().to_degrees() > NEED_GLOBAL_ROTATION_DEGREES;

    if icp_cfg.enable_global && needs_global {
        if let Some(global) = global_registration(source, target, global_cfg) {
            icp_initial = global.transform;
            stages.push(RegistrationStage::Global);
        }
    }

    let mut result = icp(source, target, icp_initial, icp_cfg);
    stages.push(RegistrationStage::Icp);

    if translation_only {
        result.transform = icp_initial.with_translation_from(&result.transform);
    }

    (result, stages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use store::{JsonGraphStore, JsonHistoryStore};
    use types::{NodeCategory, NodeRecord, NodeType, Pose};

    struct CountingReload(AtomicUsize);
    impl ReloadTrigger for CountingReload {
        fn request_reload(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn cube(offset: [f64; 3]) -> Vec<[f32; 3]> {
        let mut pts = Vec::new();
        for x in 0..5 {
            for y in 0..5 {
                for z in 0..5 {
                    pts.push([
                        x as f32 * 0.1 + offset[0] as f32,
                        y as f32 * 0.1 + offset[1] as f32,
                        z as f32 * 0.1 + offset[2] as f32,
                    ]);
                }
            }
        }
        pts
    }

    fn node_record(id: &str) -> NodeRecord {
        NodeRecord {
            id: id.into(),
            name: id.to_string(),
            node_type: NodeType::Sensor,
            category: NodeCategory::Sensor,
            enabled: true,
            config: serde_json::json!({}),
            x: 0.0,
            y: 0.0,
        }
    }

    fn setup(dir: &std::path::Path) -> (Arc<JsonGraphStore>, Arc<JsonHistoryStore>) {
        let graph = Arc::new(JsonGraphStore::new(dir.join("graph.json")));
        let history = Arc::new(JsonHistoryStore::new(dir.join("history")));
        let mut doc = store::GraphDocument::default();
        doc.nodes.push(node_record("ref"));
        doc.nodes.push(node_record("src"));
        graph.save(&doc).unwrap();
        (graph, history)
    }

    #[test]
    fn trigger_produces_pending_record_for_small_offset() {
        let dir = tempfile::tempdir().unwrap();
        let (graph, history) = setup(dir.path());
        let service = CalibrationService::new(graph, history, CalibrationConfig::default());

        let mut node = CalibrationNode::new();
        node.on_input(types::FramePayload::new(
            "ref".into(),
            PointCloud::from_xyz(&cube([0.0, 0.0, 0.0])),
            0.0,
        ));
        node.on_input(types::FramePayload::new(
            "src".into(),
            PointCloud::from_xyz(&cube([0.05, 0.0, 0.0])),
            0.0,
        ));

        let results = service.trigger(&node, TriggerParams::default()).unwrap();
        assert!(results.contains_key(&NodeId::from("src")));
        assert!(!results[&NodeId::from("src")].accepted);
    }

    #[test]
    fn trigger_without_reference_frame_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (graph, history) = setup(dir.path());
        let service = CalibrationService::new(graph, history, CalibrationConfig::default());
        let node = CalibrationNode::new();
        assert!(matches!(service.trigger(&node, TriggerParams::default()), Err(CalibrationError::NoReferenceFrame)));
    }

    #[test]
    fn accept_persists_pose_and_triggers_reload() {
        let dir = tempfile::tempdir().unwrap();
        let (graph, history) = setup(dir.path());
        let reload = Arc::new(CountingReload(AtomicUsize::new(0)));
        let service =
            CalibrationService::new(graph.clone(), history.clone(), CalibrationConfig::default())
                .with_reload_trigger(reload.clone());

        let mut node = CalibrationNode::new();
        node.on_input(types::FramePayload::new("ref".into(), PointCloud::from_xyz(&cube([0.0, 0.0, 0.0])), 0.0));
        node.on_input(types::FramePayload::new("src".into(), PointCloud::from_xyz(&cube([0.05, 0.0, 0.0])), 0.0));
        service.trigger(&node, TriggerParams::default()).unwrap();

        let accepted = service.accept(None).unwrap();
        assert_eq!(accepted.len(), 1);
        assert_eq!(reload.0.load(Ordering::SeqCst), 1);

        let doc = graph.load().unwrap();
        let src = doc.nodes.iter().find(|n| n.id == NodeId::from("src")).unwrap();
        let pose = store::node_pose(src);
        assert!(!pose.is_identity());

        let hist = service.history(&"src".into(), 0).unwrap();
        assert_eq!(hist.len(), 1);
    }

    #[test]
    fn reject_discards_pending_without_touching_storage() {
        let dir = tempfile::tempdir().unwrap();
        let (graph, history) = setup(dir.path());
        let service = CalibrationService::new(graph.clone(), history, CalibrationConfig::default());

        let mut node = CalibrationNode::new();
        node.on_input(types::FramePayload::new("ref".into(), PointCloud::from_xyz(&cube([0.0, 0.0, 0.0])), 0.0));
        node.on_input(types::FramePayload::new("src".into(), PointCloud::from_xyz(&cube([0.05, 0.0, 0.0])), 0.0));
        service.trigger(&node, TriggerParams::default()).unwrap();
        service.reject();

        assert!(matches!(
            service.accept(Some(&["src".into()])),
            Err(CalibrationError::NoPendingResult(_))
        ));
        let doc = graph.load().unwrap();
        let src = doc.nodes.iter().find(|n| n.id == NodeId::from("src")).unwrap();
        assert!(store::node_pose(src).is_identity());
    }

    #[test]
    fn rollback_restores_pose_after_from_history() {
        let dir = tempfile::tempdir().unwrap();
        let (graph, history) = setup(dir.path());
        let service = CalibrationService::new(graph.clone(), history, CalibrationConfig::default());

        let mut node = CalibrationNode::new();
        node.on_input(types::FramePayload::new("ref".into(), PointCloud::from_xyz(&cube([0.0, 0.0, 0.0])), 0.0));
        node.on_input(types::FramePayload::new("src".into(), PointCloud::from_xyz(&cube([0.05, 0.0, 0.0])), 0.0));
        let results = service.trigger(&node, TriggerParams::default()).unwrap();
        let record = results[&NodeId::from("src")].clone();
        service.accept(None).unwrap();

        // Manually clobber the pose, then roll back to the accepted record.
        let doc = graph.load().unwrap();
        let src = doc.nodes.iter().find(|n| n.id == NodeId::from("src")).unwrap().clone();
        let mut doc2 = doc.clone();
        let idx = doc2.nodes.iter().position(|n| n.id == NodeId::from("src")).unwrap();
        doc2.nodes[idx] = store::with_node_pose(src, Pose::identity());
        graph.save(&doc2).unwrap();

        service.rollback(&"src".into(), record.timestamp).unwrap();
        let doc3 = graph.load().unwrap();
        let src3 = doc3.nodes.iter().find(|n| n.id == NodeId::from("src")).unwrap();
        assert_eq!(store::node_pose(src3), record.pose_after);
    }
}
