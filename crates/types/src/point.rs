//! The canonical point-cloud representation shared by every node in the graph.

use crate::NodeId;

/// Named layout of the optional columns beyond `(x, y, z)`, recovered from the
/// sensor's native tensor field map. A frame may carry any width from 3
/// (positions only) up to 14; operators that care about specific channels look
/// them up by [`Channel::index`], not by a fixed struct offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    X,
    Y,
    Z,
    LidarNsec,
    LidarSec,
    T,
    Layer,
    Elevation,
    Ts,
    Azimuth,
    Range,
    Reflector,
    Echo,
    Intensity,
}

impl Channel {
    pub const MAX_WIDTH: usize = 14;

    pub fn index(self) -> usize {
        match self {
            Channel::X => 0,
            Channel::Y => 1,
            Channel::Z => 2,
            Channel::LidarNsec => 3,
            Channel::LidarSec => 4,
            Channel::T => 5,
            Channel::Layer => 6,
            Channel::Elevation => 7,
            Channel::Ts => 8,
            Channel::Azimuth => 9,
            Channel::Range => 10,
            Channel::Reflector => 11,
            Channel::Echo => 12,
            Channel::Intensity => 13,
        }
    }

    pub fn by_name(name: &str) -> Option<Channel> {
        Some(match name {
            "x" => Channel::X,
            "y" => Channel::Y,
            "z" => Channel::Z,
            "lidar_nsec" => Channel::LidarNsec,
            "lidar_sec" => Channel::LidarSec,
            "t" => Channel::T,
            "layer" => Channel::Layer,
            "elevation" => Channel::Elevation,
            "ts" => Channel::Ts,
            "azimuth" => Channel::Azimuth,
            "range" => Channel::Range,
            "reflector" => Channel::Reflector,
            "echo" => Channel::Echo,
            "intensity" => Channel::Intensity,
            _ => return None,
        })
    }
}

/// An `(N x width)` array of 32-bit floats, row-major, width >= 3.
///
/// Columns 0-2 are always Cartesian `(x, y, z)`. Columns beyond that follow
/// [`Channel`] when present. Storage is a flat `Vec<f32>` rather than a
/// struct-of-arrays because width varies per source and per operator output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    data: Vec<f32>,
    width: usize,
}

impl PointCloud {
    /// Builds a cloud from flat row-major data. Panics if `data.len()` is not
    /// a multiple of `width`, or `width < 3` when non-empty.
    pub fn from_flat(data: Vec<f32>, width: usize) -> Self {
        if width == 0 {
            return Self { data: Vec::new(), width: 3 };
        }
        assert!(width >= 3, "point cloud width must be at least 3 (xyz)");
        assert_eq!(data.len() % width, 0, "flat buffer length must be a multiple of width");
        Self { data, width }
    }

    pub fn empty(width: usize) -> Self {
        Self { data: Vec::new(), width: width.max(3) }
    }

    pub fn from_xyz(points: &[[f32; 3]]) -> Self {
        let mut data = Vec::with_capacity(points.len() * 3);
        for p in points {
            data.extend_from_slice(p);
        }
        Self { data, width: 3 }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        if self.width == 0 { 0 } else { self.data.len() / self.width }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    /// Row `i` as a slice of `width` floats.
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.width..(i + 1) * self.width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.width)
    }

    pub fn xyz(&self, i: usize) -> [f32; 3] {
        let r = self.row(i);
        [r[0], r[1], r[2]]
    }

    pub fn channel(&self, i: usize, ch: Channel) -> Option<f32> {
        let idx = ch.index();
        if idx >= self.width {
            return None;
        }
        Some(self.row(i)[idx])
    }

    /// Build a new cloud keeping only the rows for which `keep(index, row)` is true.
    pub fn filter_rows(&self, mut keep: impl FnMut(usize, &[f32]) -> bool) -> PointCloud {
        let mut data = Vec::new();
        for (i, row) in self.rows().enumerate() {
            if keep(i, row) {
                data.extend_from_slice(row);
            }
        }
        PointCloud { data, width: self.width }
    }

    /// Narrow to the first 3 (xyz) columns, discarding any extra channels.
    pub fn narrow_to_xyz(&self) -> PointCloud {
        if self.width == 3 {
            return self.clone();
        }
        let mut data = Vec::with_capacity(self.len() * 3);
        for row in self.rows() {
            data.extend_from_slice(&row[0..3]);
        }
        PointCloud { data, width: 3 }
    }

    /// Concatenate clouds row-wise. If widths differ, all inputs are narrowed
    /// to xyz first (the fusion "narrow-to-3" fallback, §4.5).
    pub fn concat(clouds: &[&PointCloud]) -> PointCloud {
        if clouds.is_empty() {
            return PointCloud::empty(3);
        }
        let uniform_width = clouds.iter().all(|c| c.width == clouds[0].width);
        if uniform_width {
            let width = clouds[0].width;
            let mut data = Vec::new();
            for c in clouds {
                data.extend_from_slice(&c.data);
            }
            PointCloud { data, width }
        } else {
            let mut data = Vec::new();
            for c in clouds {
                let narrowed = c.narrow_to_xyz();
                data.extend_from_slice(&narrowed.data);
            }
            PointCloud { data, width: 3 }
        }
    }

    /// Apply a rigid transform to the positional columns only; extra channels
    /// pass through unchanged.
    pub fn map_positions(&self, mut f: impl FnMut([f32; 3]) -> [f32; 3]) -> PointCloud {
        let mut data = self.data.clone();
        for row in data.chunks_exact_mut(self.width) {
            let transformed = f([row[0], row[1], row[2]]);
            row[0] = transformed[0];
            row[1] = transformed[1];
            row[2] = transformed[2];
        }
        PointCloud { data, width: self.width }
    }
}

/// A frame in flight through the graph.
#[derive(Debug, Clone)]
pub struct FramePayload {
    pub source_node_id: NodeId,
    pub points: PointCloud,
    /// Seconds, float64, flows unchanged through transforms.
    pub timestamp: f64,
    pub extra: Option<serde_json::Value>,
}

impl FramePayload {
    pub fn new(source_node_id: NodeId, points: PointCloud, timestamp: f64) -> Self {
        Self { source_node_id, points, timestamp, extra: None }
    }

    pub fn count(&self) -> usize {
        self.points.len()
    }

    /// Rewrite the emitting node id, as required on every forward (§3).
    pub fn rewritten(mut self, new_source: NodeId) -> Self {
        self.source_node_id = new_source;
        self
    }
}
