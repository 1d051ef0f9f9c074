//! Sensor world-space pose: translation in meters, rotation in degrees.

use serde::{Deserialize, Serialize};

/// A sensor's world-space placement. Rotation is stored in degrees at rest
/// (matching the persisted config format); math crates convert to radians
/// internally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Default for Pose {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, z: 0.0, roll: 0.0, pitch: 0.0, yaw: 0.0 }
    }
}

impl Pose {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pose_is_identity() {
        assert!(Pose::default().is_identity());
    }
}
