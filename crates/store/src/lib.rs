//! JSON-file persistence for the engine's three collaborator stores: the
//! graph configuration, calibration history, and recording metadata.
//!
//! The production system backs these with a relational database reached
//! through an HTTP API (§6); both are out of scope here. What matters to the
//! rest of the workspace is the trait boundary, so callers can swap in a real
//! database-backed implementation without touching engine logic.

mod error;
mod graph;
mod history;
mod recording;

pub use error::StoreError;
pub use graph::{node_pose, with_node_pose, GraphDocument, GraphStore, JsonGraphStore};
pub use history::{HistoryStore, JsonHistoryStore};
pub use recording::{JsonRecordingStore, RecordingStore};
