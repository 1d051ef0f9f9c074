//! Shared data model for the point-cloud DAG engine.
//!
//! Every other crate in the workspace builds on the types defined here:
//! the point cloud representation, the frame payload that flows through the
//! graph, the node/edge persistence model, poses, and calibration/recording
//! records.

mod calibration;
mod contract;
mod node;
mod point;
mod pose;
mod recording;

pub use calibration::{identity_matrix, CalibrationRecord, Matrix4, Quality, RegistrationStage};
pub use contract::{NodeStatus, PointCloudNode};
pub use node::{slug, topic_for, EdgeRecord, NodeCategory, NodeId, NodeRecord, NodeType, SYSTEM_TOPICS};
pub use point::{Channel, FramePayload, PointCloud};
pub use pose::Pose;
pub use recording::{RecordingRecord, RecordingStatus};
