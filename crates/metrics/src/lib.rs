//! Rolling-window performance metrics (§4.13): per-node exec time and
//! throughput, per-topic message/byte rates, per-endpoint latency, and a
//! best-effort system resource sample, broadcast once a second on
//! `system_metrics`. Collection is opt-in — [`collector::NullCollector`]
//! makes every call site a no-op when disabled.

mod broadcaster;
mod collector;
mod model;
mod probe;
mod registry;

pub use broadcaster::{run as run_broadcaster, TOPIC};
pub use collector::{Collector, MetricsCollector, NullCollector};
pub use model::{EndpointMetrics, MetricsSnapshot, NodeMetrics, SystemMetrics, TopicMetrics};
pub use probe::SystemProbe;
pub use registry::MetricsRegistry;
