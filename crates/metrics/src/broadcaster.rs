//! 1Hz broadcaster of the metrics snapshot onto `system_metrics` (§4.13),
//! with a separate 2Hz system-resource sampling cadence feeding into it.

use crate::collector::MetricsCollector;
use crate::probe::SystemProbe;
use std::sync::Arc;
use std::time::Duration;
use topics::TopicHub;
use tracing::warn;

const BROADCAST_INTERVAL: Duration = Duration::from_secs(1);
const PROBE_INTERVAL: Duration = Duration::from_millis(500);
pub const TOPIC: &str = "system_metrics";

/// Samples system resources at [`PROBE_INTERVAL`] and broadcasts a full
/// snapshot at [`BROADCAST_INTERVAL`]. Skips the broadcast entirely when
/// `collector.is_enabled()` is false, so a disabled collector costs nothing
/// beyond the idle tick.
pub async fn run(collector: Arc<dyn MetricsCollector>, hub: Arc<TopicHub>, started_at: std::time::Instant) {
    hub.register(TOPIC);
    let probe = SystemProbe::new();
    let mut probe_ticker = tokio::time::interval(PROBE_INTERVAL);
    let mut broadcast_ticker = tokio::time::interval(BROADCAST_INTERVAL);

    loop {
        tokio::select! {
            _ = probe_ticker.tick() => {
                if collector.is_enabled() {
                    collector.record_system(probe.sample());
                }
            }
            _ = broadcast_ticker.tick() => {
                if !collector.is_enabled() {
                    continue;
                }
                let Some(snapshot) = collector.snapshot(started_at.elapsed().as_secs_f64()) else { continue };
                match serde_json::to_vec(&snapshot) {
                    Ok(bytes) => hub.broadcast(TOPIC, bytes.into()),
                    Err(error) => warn!(%error, "failed to serialize metrics snapshot"),
                }
            }
        }
    }
}
