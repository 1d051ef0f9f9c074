use thiserror::Error;
use types::NodeId;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("calibration node has no buffered reference frame yet")]
    NoReferenceFrame,

    #[error("no source sensors to calibrate against the reference")]
    NoSourceSensors,

    #[error("no buffered frame from sensor {0}")]
    MissingFrame(NodeId),

    #[error("unknown sensor node: {0}")]
    UnknownSensor(NodeId),

    #[error("no pending calibration result for sensor {0}")]
    NoPendingResult(NodeId),

    #[error("no calibration record for sensor {sensor_id} at the given timestamp")]
    RecordNotFound { sensor_id: NodeId },

    #[error("registration did not converge for sensor {0}")]
    RegistrationFailed(NodeId),

    #[error(transparent)]
    Store(#[from] store::StoreError),
}
