//! Errors surfaced by the JSON-file persistence layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },

    #[error("malformed json in {path}: {source}")]
    Json { path: String, #[source] source: serde_json::Error },

    #[error("unknown node: {0}")]
    UnknownNode(String),
}
