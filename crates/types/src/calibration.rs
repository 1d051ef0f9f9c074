//! Calibration record model (§3, §4.10).

use crate::{NodeId, Pose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Excellent,
    Good,
    Poor,
}

impl Quality {
    /// `excellent` if fitness >= 0.9 and rmse <= 0.02; else `good` if fitness
    /// >= min_fitness and rmse <= max_rmse; else `poor`.
    pub fn classify(fitness: f64, rmse: f64, min_fitness: f64, max_rmse: f64) -> Quality {
        if fitness >= 0.9 && rmse <= 0.02 {
            Quality::Excellent
        } else if fitness >= min_fitness && rmse <= max_rmse {
            Quality::Good
        } else {
            Quality::Poor
        }
    }

    pub fn is_acceptable(self) -> bool {
        matches!(self, Quality::Excellent | Quality::Good)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStage {
    Global,
    Icp,
}

/// A 4x4 row-major transformation matrix, serialized as nested arrays.
pub type Matrix4 = [[f64; 4]; 4];

pub fn identity_matrix() -> Matrix4 {
    let mut m = [[0.0; 4]; 4];
    for i in 0..4 {
        m[i][i] = 1.0;
    }
    m
}

/// Complete record of a single calibration attempt; stored for history and
/// rollback. `timestamp` is the immutable identity used by `rollback`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub timestamp: DateTime<Utc>,
    pub sensor_id: NodeId,
    pub reference_sensor_id: NodeId,
    pub fitness: f64,
    pub rmse: f64,
    pub quality: Quality,
    pub stages_used: Vec<RegistrationStage>,
    pub pose_before: Pose,
    pub pose_after: Pose,
    pub transformation_matrix: Matrix4,
    pub accepted: bool,
    #[serde(default)]
    pub notes: String,
}
