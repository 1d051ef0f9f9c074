//! Uniform (stride) downsampling (§4.5): keep every k-th input point.

use crate::error::ConfigError;
use types::{FramePayload, NodeStatus, PointCloudNode};

#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct UniformDownsampleConfig {
    pub k: usize,
}

pub struct UniformDownsample {
    config: UniformDownsampleConfig,
}

impl UniformDownsample {
    pub fn new(config: UniformDownsampleConfig) -> Result<Self, ConfigError> {
        if config.k == 0 {
            return Err(ConfigError::InvalidStride);
        }
        Ok(Self { config })
    }
}

impl PointCloudNode for UniformDownsample {
    fn on_input(&mut self, payload: FramePayload) -> Option<FramePayload> {
        let k = self.config.k;
        let kept = payload.points.filter_rows(|i, _| i % k == 0);
        Some(FramePayload { points: kept, ..payload })
    }

    fn status(&self) -> NodeStatus {
        NodeStatus::healthy()
    }
}
