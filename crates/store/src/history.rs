//! Calibration history persistence (§4.10): every attempted calibration is
//! kept, accepted or not, so `rollback` can restore an older pose.

use crate::error::StoreError;
use crate::graph::{io_err, json_err};
use std::fs;
use std::path::PathBuf;
use types::{CalibrationRecord, NodeId};

pub trait HistoryStore: Send + Sync {
    fn save(&self, record: &CalibrationRecord) -> Result<(), StoreError>;

    /// Newest-first, capped at `limit` (0 means unlimited).
    fn history(&self, sensor_id: &NodeId, limit: usize) -> Result<Vec<CalibrationRecord>, StoreError>;

    fn find_by_timestamp(
        &self,
        sensor_id: &NodeId,
        timestamp: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<CalibrationRecord>, StoreError>;
}

/// One JSON file per record under `dir/<sensor_id>/<rfc3339-ish timestamp>.json`,
/// read back by directory scan. Calibration is rare enough (operator-triggered,
/// not per-frame) that this never needs an index.
pub struct JsonHistoryStore {
    dir: PathBuf,
}

impl JsonHistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn sensor_dir(&self, sensor_id: &NodeId) -> PathBuf {
        self.dir.join(sensor_id.as_str())
    }

    fn record_path(&self, record: &CalibrationRecord) -> PathBuf {
        let stamp = record.timestamp.timestamp_nanos_opt().unwrap_or(0);
        self.sensor_dir(&record.sensor_id).join(format!("{stamp}.json"))
    }

    fn read_all(&self, sensor_id: &NodeId) -> Result<Vec<CalibrationRecord>, StoreError> {
        let dir = self.sensor_dir(sensor_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| io_err(&dir, e))? {
            let entry = entry.map_err(|e| io_err(&dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let text = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            let record: CalibrationRecord =
                serde_json::from_str(&text).map_err(|e| json_err(&path, e))?;
            records.push(record);
        }
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }
}

impl HistoryStore for JsonHistoryStore {
    fn save(&self, record: &CalibrationRecord) -> Result<(), StoreError> {
        let path = self.record_path(record);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let text = serde_json::to_string_pretty(record).map_err(|e| json_err(&path, e))?;
        fs::write(&path, text).map_err(|e| io_err(&path, e))
    }

    fn history(&self, sensor_id: &NodeId, limit: usize) -> Result<Vec<CalibrationRecord>, StoreError> {
        let mut records = self.read_all(sensor_id)?;
        if limit > 0 && records.len() > limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    fn find_by_timestamp(
        &self,
        sensor_id: &NodeId,
        timestamp: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<CalibrationRecord>, StoreError> {
        Ok(self.read_all(sensor_id)?.into_iter().find(|r| r.timestamp == timestamp))
    }
}
