//! Error kinds for the engine (§7). The dispatcher and router never
//! surface these to a caller — they fold into `node.last_error` and the
//! engine keeps running; only the lifecycle manager's `load_config` and
//! the calibration/graph boundary return `Result` to an external caller.

use thiserror::Error;
use types::NodeId;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("node `{0}` has a malformed configuration: {1}")]
    Config(NodeId, #[source] serde_json::Error),
    #[error("node `{0}` rejected its configuration: {1}")]
    Operator(NodeId, #[source] ops::ConfigError),
    #[error(transparent)]
    Store(#[from] store::StoreError),
    #[error(transparent)]
    Recording(#[from] recording::RecordingError),
    #[error("node `{0}` not found")]
    NodeNotFound(NodeId),
    #[error("engine is not running")]
    NotRunning,
}
