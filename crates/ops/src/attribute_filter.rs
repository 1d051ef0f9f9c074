//! Attribute filter / `filter_by_key` (§4.5): keep points whose named channel
//! satisfies a comparison against a configured value.

use crate::error::ConfigError;
use serde::Deserialize;
use tracing::warn;
use types::{Channel, FramePayload, NodeStatus, PointCloudNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn is_ordering(self) -> bool {
        matches!(self, CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge)
    }

    fn apply(self, lhs: f32, rhs: f32) -> bool {
        match self {
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttributeFilterConfig {
    pub channel: String,
    pub op: CompareOp,
    pub value: serde_json::Value,
}

enum Comparand {
    Numeric(f32),
    /// Raw string; only `Eq`/`Ne` are permitted against this.
    Text(String),
}

pub struct AttributeFilter {
    channel: Channel,
    op: CompareOp,
    comparand: Comparand,
}

impl AttributeFilter {
    pub fn new(config: AttributeFilterConfig) -> Result<Self, ConfigError> {
        let channel = Channel::by_name(&config.channel).ok_or_else(|| ConfigError::UnknownChannel(config.channel.clone()))?;

        let comparand = match &config.value {
            serde_json::Value::Number(n) => Comparand::Numeric(n.as_f64().unwrap_or(0.0) as f32),
            serde_json::Value::String(s) => match s.parse::<f32>() {
                Ok(f) => Comparand::Numeric(f),
                Err(_) => {
                    if config.op.is_ordering() {
                        return Err(ConfigError::NonNumericOrdering {
                            op: format!("{:?}", config.op),
                            value: s.clone(),
                        });
                    }
                    Comparand::Text(s.clone())
                }
            },
            other => Comparand::Text(other.to_string()),
        };

        Ok(Self { channel, op: config.op, comparand })
    }
}

impl PointCloudNode for AttributeFilter {
    fn on_input(&mut self, payload: FramePayload) -> Option<FramePayload> {
        if self.channel.index() >= payload.points.width() {
            warn!(channel = ?self.channel, "attribute filter channel absent from frame, passing through");
            return Some(payload);
        }

        let channel = self.channel;
        let op = self.op;
        let kept = payload.points.filter_rows(|i, row| {
            let value = row[channel.index()];
            match &self.comparand {
                Comparand::Numeric(rhs) => op.apply(value, *rhs),
                Comparand::Text(rhs) => {
                    let lhs = value.to_string();
                    match op {
                        CompareOp::Eq => lhs == *rhs,
                        CompareOp::Ne => lhs != *rhs,
                        _ => unreachable!("ordering ops on text are rejected at construction"),
                    }
                }
            }
        });
        Some(FramePayload { points: kept, ..payload })
    }

    fn status(&self) -> NodeStatus {
        NodeStatus::healthy()
    }
}
