//! Shared k-d tree helper for the operators that need nearest-neighbour
//! queries (statistical/radius outlier removal, boundary detection).

use kiddo::{KdTree, SquaredEuclidean};
use types::PointCloud;

/// A k-d tree over a cloud's `(x, y, z)` columns, indexed by row number.
pub struct PointIndex {
    tree: KdTree<f64, 3>,
}

impl PointIndex {
    pub fn build(points: &PointCloud) -> Self {
        let mut tree = KdTree::new();
        for i in 0..points.len() {
            let [x, y, z] = points.xyz(i);
            tree.add(&[x as f64, y as f64, z as f64], i as u64);
        }
        Self { tree }
    }

    /// The `k` nearest neighbours to row `query_idx`, excluding itself.
    /// Returns `(row index, distance)` pairs, nearest first.
    pub fn k_nearest(&self, points: &PointCloud, query_idx: usize, k: usize) -> Vec<(usize, f64)> {
        let [x, y, z] = points.xyz(query_idx);
        let query = [x as f64, y as f64, z as f64];
        self.tree
            .nearest_n::<SquaredEuclidean>(&query, (k + 1) as u32)
            .into_iter()
            .filter(|n| n.item as usize != query_idx)
            .take(k)
            .map(|n| (n.item as usize, n.distance.sqrt()))
            .collect()
    }

    /// All neighbours within `radius` of row `query_idx`, excluding itself.
    pub fn within_radius(&self, points: &PointCloud, query_idx: usize, radius: f64) -> Vec<(usize, f64)> {
        let [x, y, z] = points.xyz(query_idx);
        let query = [x as f64, y as f64, z as f64];
        self.tree
            .within::<SquaredEuclidean>(&query, radius * radius)
            .into_iter()
            .filter(|n| n.item as usize != query_idx)
            .map(|n| (n.item as usize, n.distance.sqrt()))
            .collect()
    }
}
