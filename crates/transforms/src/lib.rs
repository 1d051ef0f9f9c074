//! 3D rigid-body pose math shared by the sensor-pose operator and the ICP
//! calibration engine.
//!
//! Poses are stored at rest as `(x, y, z, roll, pitch, yaw)` with rotation in
//! degrees (§3); internally all composition happens on 4x4 matrices built
//! from a Z-Y-X intrinsic Euler rotation, matching the convention recovered
//! from the original source's `create_transformation_matrix`.

use nalgebra::{Matrix3, Matrix4, Vector3};
use types::Pose;

/// A 3D rigid-body transform: rotation (3x3) + translation (3x1), stored as
/// the 4x4 homogeneous matrix directly so composition is plain matrix
/// multiplication and extraction can follow the exact gimbal-lock-guarded
/// convention used elsewhere in this codebase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform3 {
    inner: Matrix4<f64>,
}

impl Transform3 {
    pub fn identity() -> Self {
        Self { inner: Matrix4::identity() }
    }

    /// Build `T` from a pose: Z-Y-X intrinsic rotation (`R = Rz(yaw) *
    /// Ry(pitch) * Rx(roll)`), translation in the rightmost column.
    pub fn from_pose(pose: &Pose) -> Self {
        let roll = pose.roll.to_radians();
        let pitch = pose.pitch.to_radians();
        let yaw = pose.yaw.to_radians();

        let (cr, sr) = (roll.cos(), roll.sin());
        let (cp, sp) = (pitch.cos(), pitch.sin());
        let (cy, sy) = (yaw.cos(), yaw.sin());

        #[rustfmt::skip]
        let r = Matrix3::new(
            cy * cp, cy * sp * sr - sy * cr, cy * sp * cr + sy * sr,
            sy * cp, sy * sp * sr + cy * cr, sy * sp * cr - cy * sr,
            -sp,     cp * sr,                cp * cr,
        );

        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&r);
        m[(0, 3)] = pose.x;
        m[(1, 3)] = pose.y;
        m[(2, 3)] = pose.z;

        Self { inner: m }
    }

    /// Extract `(x, y, z, roll, pitch, yaw)` from the matrix via translation
    /// plus Z-Y-X Euler decomposition with a gimbal-lock guard: when
    /// `|cos(pitch)| < 1e-6`, yaw is fixed at 0 and roll recovered from
    /// `atan2(-R[1][2], R[1][1])`.
    pub fn to_pose(&self) -> Pose {
        let r = self.rotation();
        let t = self.translation();

        let pitch = (-r[(2, 0)]).atan2((r[(0, 0)].powi(2) + r[(1, 0)].powi(2)).sqrt());

        let (yaw, roll) = if pitch.cos().abs() > 1e-6 {
            (r[(1, 0)].atan2(r[(0, 0)]), r[(2, 1)].atan2(r[(2, 2)]))
        } else {
            (0.0, (-r[(1, 2)]).atan2(r[(1, 1)]))
        };

        Pose {
            x: t.x,
            y: t.y,
            z: t.z,
            roll: roll.to_degrees(),
            pitch: pitch.to_degrees(),
            yaw: yaw.to_degrees(),
        }
    }

    pub fn from_matrix(m: Matrix4<f64>) -> Self {
        Self { inner: m }
    }

    pub fn matrix(&self) -> Matrix4<f64> {
        self.inner
    }

    pub fn rotation(&self) -> Matrix3<f64> {
        self.inner.fixed_view::<3, 3>(0, 0).into()
    }

    pub fn translation(&self) -> Vector3<f64> {
        Vector3::new(self.inner[(0, 3)], self.inner[(1, 3)], self.inner[(2, 3)])
    }

    pub fn inverse(&self) -> Self {
        let r = self.rotation();
        let t = self.translation();
        let r_inv = r.transpose();
        let t_inv = -(r_inv * t);

        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&r_inv);
        m[(0, 3)] = t_inv.x;
        m[(1, 3)] = t_inv.y;
        m[(2, 3)] = t_inv.z;
        Self { inner: m }
    }

    /// Compose transforms: `self * other`. If self is A->B and other is
    /// B->C, result is A->C.
    pub fn compose(&self, other: &Transform3) -> Transform3 {
        Self { inner: self.inner * other.inner }
    }

    pub fn transform_point(&self, p: [f64; 3]) -> [f64; 3] {
        let r = self.rotation();
        let t = self.translation();
        let v = r * Vector3::new(p[0], p[1], p[2]) + t;
        [v.x, v.y, v.z]
    }

    /// Translation-only recomposition used by calibration's `translation_only`
    /// mode: keep `self`'s rotation, replace only translation from `icp`.
    pub fn with_translation_from(&self, icp: &Transform3) -> Transform3 {
        let mut m = self.inner;
        let t = icp.translation();
        m[(0, 3)] = t.x;
        m[(1, 3)] = t.y;
        m[(2, 3)] = t.z;
        Self { inner: m }
    }

    /// Rotation angle (radians) of this transform's rotation block from
    /// identity, via `acos((trace(R) - 1) / 2)` — used by the calibration
    /// engine's "need global registration" test (§4.10.2).
    pub fn rotation_angle_from_identity(&self) -> f64 {
        let r = self.rotation();
        let trace = r[(0, 0)] + r[(1, 1)] + r[(2, 2)];
        ((trace - 1.0) / 2.0).clamp(-1.0, 1.0).acos()
    }
}

impl Default for Transform3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::ops::Mul for Transform3 {
    type Output = Transform3;
    fn mul(self, rhs: Transform3) -> Transform3 {
        self.compose(&rhs)
    }
}

impl std::ops::Mul<&Transform3> for &Transform3 {
    type Output = Transform3;
    fn mul(self, rhs: &Transform3) -> Transform3 {
        self.compose(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn identity_round_trips_to_default_pose() {
        let t = Transform3::identity();
        let pose = t.to_pose();
        assert_relative_eq!(pose.x, 0.0, epsilon = 1e-10);
        assert_relative_eq!(pose.yaw, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn pose_round_trips_through_matrix() {
        let pose = Pose { x: 1.0, y: 2.0, z: 0.5, roll: 5.0, pitch: 10.0, yaw: 30.0 };
        let t = Transform3::from_pose(&pose);
        let back = t.to_pose();
        assert_relative_eq!(back.x, pose.x, epsilon = 1e-9);
        assert_relative_eq!(back.y, pose.y, epsilon = 1e-9);
        assert_relative_eq!(back.z, pose.z, epsilon = 1e-9);
        assert_relative_eq!(back.roll, pose.roll, epsilon = 1e-6);
        assert_relative_eq!(back.pitch, pose.pitch, epsilon = 1e-6);
        assert_relative_eq!(back.yaw, pose.yaw, epsilon = 1e-6);
    }

    #[test]
    fn gimbal_lock_guard_sets_yaw_to_zero() {
        // pitch = 90 degrees drives cos(pitch) to 0.
        let pose = Pose { x: 0.0, y: 0.0, z: 0.0, roll: 20.0, pitch: 90.0, yaw: 40.0 };
        let t = Transform3::from_pose(&pose);
        let back = t.to_pose();
        assert_relative_eq!(back.yaw, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn inverse_composes_to_identity() {
        let pose = Pose { x: 1.0, y: -2.0, z: 3.0, roll: 10.0, pitch: -20.0, yaw: 45.0 };
        let t = Transform3::from_pose(&pose);
        let composed = t.compose(&t.inverse());
        let back = composed.to_pose();
        assert_relative_eq!(back.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(back.y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(back.z, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn transform_point_applies_rotation_then_translation() {
        let pose = Pose { x: 1.0, y: 0.0, z: 0.0, roll: 0.0, pitch: 0.0, yaw: 90.0 };
        let t = Transform3::from_pose(&pose);
        let p = t.transform_point([1.0, 0.0, 0.0]);
        // Rotate (1,0,0) by 90deg yaw -> (0,1,0), then translate by (1,0,0) -> (1,1,0)
        assert_relative_eq!(p[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(p[1], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn rotation_angle_from_identity_is_zero_for_identity() {
        assert_relative_eq!(Transform3::identity().rotation_angle_from_identity(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn rotation_angle_detects_large_rotation() {
        let pose = Pose { x: 0.0, y: 0.0, z: 0.0, roll: 0.0, pitch: 0.0, yaw: 45.0 };
        let t = Transform3::from_pose(&pose);
        assert_relative_eq!(t.rotation_angle_from_identity().to_degrees(), 45.0, epsilon = 1e-6);
    }

    #[test]
    fn with_translation_from_keeps_own_rotation() {
        let base = Transform3::from_pose(&Pose { x: 0.0, y: 0.0, z: 0.0, roll: 0.0, pitch: 0.0, yaw: 30.0 });
        let icp = Transform3::from_pose(&Pose { x: 5.0, y: 6.0, z: 7.0, roll: 0.0, pitch: 0.0, yaw: 99.0 });
        let merged = base.with_translation_from(&icp);
        assert_relative_eq!(merged.translation().x, 5.0, epsilon = 1e-9);
        assert_relative_eq!(merged.to_pose().yaw, 30.0, epsilon = 1e-6);
    }
}
