//! Sensor pose (§4.5): applies a world-space placement to a sensor's
//! positional columns; non-positional channels pass through unchanged.

use transforms::Transform3;
use types::{FramePayload, NodeStatus, Pose, PointCloudNode};

pub struct SensorPose {
    pose: Pose,
    transform: Transform3,
    frames_transformed: u64,
}

impl SensorPose {
    pub fn new(pose: Pose) -> Self {
        Self { pose, transform: Transform3::from_pose(&pose), frames_transformed: 0 }
    }

    pub fn get_pose(&self) -> Pose {
        self.pose
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
        self.transform = Transform3::from_pose(&pose);
    }
}

impl PointCloudNode for SensorPose {
    fn on_input(&mut self, payload: FramePayload) -> Option<FramePayload> {
        self.frames_transformed += 1;
        if self.pose.is_identity() {
            return Some(payload);
        }
        let transform = self.transform;
        let transformed = payload.points.map_positions(|p| transform.transform_point([p[0] as f64, p[1] as f64, p[2] as f64]).map(|v| v as f32));
        Some(FramePayload { points: transformed, ..payload })
    }

    fn status(&self) -> NodeStatus {
        let mut s = NodeStatus::healthy();
        s.counters = serde_json::json!({ "frames_transformed": self.frames_transformed });
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{NodeId, PointCloud};

    #[test]
    fn identity_pose_passes_through_unchanged() {
        let mut sensor = SensorPose::new(Pose::identity());
        let points = PointCloud::from_xyz(&[[1.0, 2.0, 3.0]]);
        let out = sensor.on_input(FramePayload::new(NodeId::from("s"), points, 0.0)).unwrap();
        assert_eq!(out.points.xyz(0), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn translates_positions_by_configured_pose() {
        let mut sensor = SensorPose::new(Pose { x: 10.0, y: 0.0, z: 0.0, roll: 0.0, pitch: 0.0, yaw: 0.0 });
        let points = PointCloud::from_xyz(&[[1.0, 2.0, 3.0]]);
        let out = sensor.on_input(FramePayload::new(NodeId::from("s"), points, 0.0)).unwrap();
        assert_eq!(out.points.xyz(0), [11.0, 2.0, 3.0]);
    }

    #[test]
    fn set_pose_updates_subsequent_transforms() {
        let mut sensor = SensorPose::new(Pose::identity());
        sensor.set_pose(Pose { x: 5.0, y: 0.0, z: 0.0, roll: 0.0, pitch: 0.0, yaw: 0.0 });
        assert_eq!(sensor.get_pose().x, 5.0);
        let points = PointCloud::from_xyz(&[[0.0, 0.0, 0.0]]);
        let out = sensor.on_input(FramePayload::new(NodeId::from("s"), points, 0.0)).unwrap();
        assert_eq!(out.points.xyz(0), [5.0, 0.0, 0.0]);
    }
}
