//! Boundary detection (§4.5): estimate a surface normal per point from its
//! local neighbourhood (PCA), then keep points whose neighbours leave an
//! angular gap wider than `angle_threshold_degrees` when projected onto the
//! tangent plane — points on the rim of a surface patch.

use crate::kdtree::PointIndex;
use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use types::{FramePayload, NodeStatus, PointCloudNode};

#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct BoundaryDetectionConfig {
    pub radius: f32,
    pub max_neighbors: usize,
    pub angle_threshold_degrees: f32,
}

pub struct BoundaryDetection {
    config: BoundaryDetectionConfig,
}

impl BoundaryDetection {
    pub fn new(config: BoundaryDetectionConfig) -> Self {
        Self { config }
    }
}

/// Smallest-eigenvalue eigenvector of the neighbourhood covariance matrix.
fn estimate_normal(neighbours: &[Vector3<f64>]) -> Vector3<f64> {
    let centroid = neighbours.iter().sum::<Vector3<f64>>() / neighbours.len() as f64;
    let mut covariance = Matrix3::zeros();
    for p in neighbours {
        let d = p - centroid;
        covariance += d * d.transpose();
    }
    let eigen = SymmetricEigen::new(covariance);
    let min_idx = eigen.eigenvalues.iter().enumerate().min_by(|a, b| a.1.total_cmp(b.1)).map(|(i, _)| i).unwrap_or(0);
    eigen.eigenvectors.column(min_idx).into_owned()
}

/// True if the point is on a boundary: the widest angular gap between
/// consecutive neighbours, projected onto the tangent plane, exceeds
/// `threshold_radians`.
fn is_boundary_point(center: Vector3<f64>, neighbours: &[Vector3<f64>], threshold_radians: f64) -> bool {
    if neighbours.len() < 2 {
        return true;
    }

    let normal = estimate_normal(neighbours);
    let arbitrary = if normal.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
    let u = normal.cross(&arbitrary).normalize();
    let v = normal.cross(&u).normalize();

    let mut angles: Vec<f64> = neighbours
        .iter()
        .map(|p| {
            let d = p - center;
            (d.dot(&v)).atan2(d.dot(&u))
        })
        .collect();
    angles.sort_by(|a, b| a.total_cmp(b));

    let mut max_gap = 0.0f64;
    for window in angles.windows(2) {
        max_gap = max_gap.max(window[1] - window[0]);
    }
    // wrap-around gap between the last and first angle
    let wrap_gap = (angles[0] + std::f64::consts::TAU) - angles[angles.len() - 1];
    max_gap = max_gap.max(wrap_gap);

    max_gap > threshold_radians
}

impl PointCloudNode for BoundaryDetection {
    fn on_input(&mut self, payload: FramePayload) -> Option<FramePayload> {
        let n = payload.points.len();
        if n == 0 {
            return Some(payload);
        }

        let index = PointIndex::build(&payload.points);
        let radius = self.config.radius as f64;
        let max_neighbors = self.config.max_neighbors;
        let threshold_radians = (self.config.angle_threshold_degrees as f64).to_radians();

        let keep_flags: Vec<bool> = (0..n)
            .map(|i| {
                let mut neighbours = index.within_radius(&payload.points, i, radius);
                neighbours.truncate(max_neighbors);
                let [x, y, z] = payload.points.xyz(i);
                let center = Vector3::new(x as f64, y as f64, z as f64);
                let neighbour_points: Vec<Vector3<f64>> = neighbours
                    .iter()
                    .map(|(j, _)| {
                        let [nx, ny, nz] = payload.points.xyz(*j);
                        Vector3::new(nx as f64, ny as f64, nz as f64)
                    })
                    .collect();
                is_boundary_point(center, &neighbour_points, threshold_radians)
            })
            .collect();

        let kept = payload.points.filter_rows(|i, _| keep_flags[i]);
        Some(FramePayload { points: kept, ..payload })
    }

    fn status(&self) -> NodeStatus {
        NodeStatus::healthy()
    }
}
