//! Recorder service (§4.9): buffers incoming frames per recording, flushes
//! to a `codec` archive on a size/time threshold, and finalizes through a
//! two-phase `stopping -> stopped` transition that also triggers thumbnail
//! generation and persistence.
//!
//! ```text
//! push_frame(id, pts, ts) -> buffer -> flush at >=10 frames or >=1s
//! stop(id) -> status=stopping, snapshot returned immediately
//!          -> background task: drain buffer, writer.finalize(), thumbnail,
//!             store.save(status=stopped)
//! ```
//!
//! Frames for a recording already in `stopping` are silently dropped —
//! there is no well-defined place to put them.

use chrono::Utc;
use codec::{ArchiveError, Writer};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use store::RecordingStore;
use thiserror::Error;
use tracing::{debug, info, warn};
use types::{NodeId, PointCloud, RecordingRecord, RecordingStatus};

const FLUSH_FRAME_THRESHOLD: usize = 10;
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Store(#[from] store::StoreError),
    #[error("recording `{0}` not found")]
    NotFound(String),
}

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub archive_dir: PathBuf,
    pub thumbnail_dir: PathBuf,
}

struct ActiveRecording {
    writer: Writer,
    buffer: Vec<(PointCloud, f64)>,
    last_flush: Instant,
    frame_count: u32,
    last_ts: f64,
    stopping: bool,
    node_id: NodeId,
    sensor_id: Option<NodeId>,
    archive_path: PathBuf,
    started_at: chrono::DateTime<Utc>,
}

impl ActiveRecording {
    fn snapshot(&self, id: &str) -> RecordingRecord {
        RecordingRecord {
            id: id.to_string(),
            file_path: self.archive_path.display().to_string(),
            sensor_id: self.sensor_id.clone(),
            node_id: self.node_id.clone(),
            frame_count: self.frame_count,
            duration_seconds: self.last_ts,
            file_size_bytes: 0,
            started_at: self.started_at,
            metadata: serde_json::json!({}),
            thumbnail_path: None,
            status: if self.stopping { RecordingStatus::Stopping } else { RecordingStatus::Recording },
        }
    }
}

/// Owns every in-progress recording's writer and buffer. Cheap to clone
/// (wraps an `Arc`) so it can be handed to the dispatch path and to a
/// background finalize task at the same time.
#[derive(Clone)]
pub struct RecorderService {
    config: RecorderConfig,
    active: Arc<Mutex<HashMap<String, ActiveRecording>>>,
    store: Arc<dyn RecordingStore>,
}

impl RecorderService {
    pub fn new(config: RecorderConfig, store: Arc<dyn RecordingStore>) -> Self {
        Self { config, active: Arc::new(Mutex::new(HashMap::new())), store }
    }

    /// Starts a new recording for `node_id`. Multiple concurrent recordings
    /// on the same source node are allowed — each gets its own id and file.
    pub fn start(&self, node_id: NodeId, sensor_id: Option<NodeId>) -> Result<RecordingRecord, RecordingError> {
        let id = uuid::Uuid::new_v4().to_string();
        let archive_path = self.config.archive_dir.join(format!("{id}.lidrarch"));
        let writer = Writer::start(&archive_path)?;

        let recording = ActiveRecording {
            writer,
            buffer: Vec::with_capacity(FLUSH_FRAME_THRESHOLD),
            last_flush: Instant::now(),
            frame_count: 0,
            last_ts: 0.0,
            stopping: false,
            node_id,
            sensor_id,
            archive_path,
            started_at: Utc::now(),
        };
        let snapshot = recording.snapshot(&id);
        self.active.lock().expect("recorder lock poisoned").insert(id.clone(), recording);
        info!(recording = %id, "started recording");
        Ok(snapshot)
    }

    /// Buffers one frame. Dropped silently if `id` is stopping or unknown —
    /// there is no recipient for a frame arriving after stop was requested.
    pub fn push_frame(&self, id: &str, points: PointCloud, timestamp: f64) -> Result<(), RecordingError> {
        let mut active = self.active.lock().expect("recorder lock poisoned");
        let Some(recording) = active.get_mut(id) else { return Ok(()) };
        if recording.stopping {
            return Ok(());
        }

        recording.last_ts = timestamp;
        recording.frame_count += 1;
        recording.buffer.push((points, timestamp));

        let should_flush =
            recording.buffer.len() >= FLUSH_FRAME_THRESHOLD || recording.last_flush.elapsed() >= FLUSH_INTERVAL;
        if should_flush {
            flush(recording)?;
        }
        Ok(())
    }

    /// Marks `id` stopping and returns the snapshot immediately; the caller
    /// is expected to drive [`RecorderService::finalize`] afterward (the
    /// engine schedules it on a background task).
    pub fn stop(&self, id: &str) -> Result<RecordingRecord, RecordingError> {
        let mut active = self.active.lock().expect("recorder lock poisoned");
        let recording = active.get_mut(id).ok_or_else(|| RecordingError::NotFound(id.to_string()))?;
        recording.stopping = true;
        Ok(recording.snapshot(id))
    }

    /// Drains the buffer, finalizes the archive, generates a thumbnail, and
    /// persists the final row with status `stopped`. Removes `id` from the
    /// active set regardless of outcome past the writer finalize step.
    pub fn finalize(&self, id: &str) -> Result<RecordingRecord, RecordingError> {
        let recording = {
            let mut active = self.active.lock().expect("recorder lock poisoned");
            active.remove(id).ok_or_else(|| RecordingError::NotFound(id.to_string()))?
        };

        let ActiveRecording { mut writer, buffer, node_id, sensor_id, archive_path, started_at, .. } = recording;
        for (points, ts) in &buffer {
            writer.write_frame(points, *ts)?;
        }

        let metadata = serde_json::json!({
            "node_id": node_id.as_str(),
            "sensor_id": sensor_id.as_ref().map(NodeId::as_str),
        });
        let stats = writer.finalize(&metadata)?;

        let thumbnail_path = self.config.thumbnail_dir.join(format!("{id}.png"));
        let thumbnail_result = thumbnail::generate_from_archive(
            &archive_path,
            &thumbnail_path,
            thumbnail::DEFAULT_WIDTH,
            thumbnail::DEFAULT_HEIGHT,
            thumbnail::View::Top,
        );
        let thumbnail_path = match thumbnail_result {
            Ok(()) => Some(thumbnail_path.display().to_string()),
            Err(error) => {
                warn!(recording = id, %error, "thumbnail generation failed, recording finalized without one");
                None
            }
        };

        let record = RecordingRecord {
            id: id.to_string(),
            file_path: archive_path.display().to_string(),
            sensor_id,
            node_id,
            frame_count: stats.frame_count,
            duration_seconds: stats.duration_seconds,
            file_size_bytes: stats.file_size_bytes,
            started_at,
            metadata,
            thumbnail_path,
            status: RecordingStatus::Stopped,
        };
        self.store.save(&record)?;
        debug!(recording = id, frames = stats.frame_count, "finalized recording");
        Ok(record)
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active.lock().expect("recorder lock poisoned").contains_key(id)
    }

    pub fn snapshot(&self, id: &str) -> Option<RecordingRecord> {
        self.active.lock().expect("recorder lock poisoned").get(id).map(|r| r.snapshot(id))
    }
}

fn flush(recording: &mut ActiveRecording) -> Result<(), RecordingError> {
    for (points, ts) in recording.buffer.drain(..) {
        recording.writer.write_frame(&points, ts)?;
    }
    recording.last_flush = Instant::now();
    Ok(())
}
