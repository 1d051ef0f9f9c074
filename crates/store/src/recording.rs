//! Recording metadata persistence (§4.9): one JSON document per recording,
//! keyed by recording id, surviving process restarts independent of the
//! archive files themselves.

use crate::error::StoreError;
use crate::graph::{io_err, json_err};
use std::fs;
use std::path::PathBuf;
use types::{NodeId, RecordingRecord};

pub trait RecordingStore: Send + Sync {
    fn save(&self, record: &RecordingRecord) -> Result<(), StoreError>;
    fn get(&self, id: &str) -> Result<Option<RecordingRecord>, StoreError>;
    fn list_for_node(&self, node_id: &NodeId) -> Result<Vec<RecordingRecord>, StoreError>;
    fn list_all(&self) -> Result<Vec<RecordingRecord>, StoreError>;
    fn delete(&self, id: &str) -> Result<(), StoreError>;
}

pub struct JsonRecordingStore {
    dir: PathBuf,
}

impl JsonRecordingStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl RecordingStore for JsonRecordingStore {
    fn save(&self, record: &RecordingRecord) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        let path = self.path(&record.id);
        let text = serde_json::to_string_pretty(record).map_err(|e| json_err(&path, e))?;
        fs::write(&path, text).map_err(|e| io_err(&path, e))
    }

    fn get(&self, id: &str) -> Result<Option<RecordingRecord>, StoreError> {
        let path = self.path(id);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        Ok(Some(serde_json::from_str(&text).map_err(|e| json_err(&path, e))?))
    }

    fn list_for_node(&self, node_id: &NodeId) -> Result<Vec<RecordingRecord>, StoreError> {
        Ok(self.list_all()?.into_iter().filter(|r| &r.node_id == node_id).collect())
    }

    fn list_all(&self) -> Result<Vec<RecordingRecord>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| io_err(&self.dir, e))? {
            let entry = entry.map_err(|e| io_err(&self.dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let text = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            out.push(serde_json::from_str(&text).map_err(|e| json_err(&path, e))?);
        }
        out.sort_by(|a: &RecordingRecord, b: &RecordingRecord| b.started_at.cmp(&a.started_at));
        Ok(out)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let path = self.path(id);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
        }
        Ok(())
    }
}
