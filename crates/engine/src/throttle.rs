//! Throttle controller (§4.6): a per-target minimum inter-delivery
//! interval. Throttling is keyed by the downstream *target*, not the
//! source, so one slow operator absorbs rate mismatch from any upstream
//! feeding it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use types::NodeId;

struct TargetState {
    throttle_ms: u64,
    last_accepted: Option<Instant>,
    throttled_count: u64,
}

#[derive(Default)]
pub struct ThrottleController {
    state: Mutex<HashMap<NodeId, TargetState>>,
}

impl ThrottleController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, target: NodeId, throttle_ms: u64) {
        self.state
            .lock()
            .expect("throttle state lock poisoned")
            .insert(target, TargetState { throttle_ms, last_accepted: None, throttled_count: 0 });
    }

    pub fn unregister(&self, target: &NodeId) {
        self.state.lock().expect("throttle state lock poisoned").remove(target);
    }

    /// Atomically checks and, on acceptance, updates `last_accepted` so two
    /// concurrent dispatches to the same target can never both pass.
    pub fn should_process(&self, target: &NodeId, now: Instant) -> bool {
        let mut state = self.state.lock().expect("throttle state lock poisoned");
        let Some(entry) = state.get_mut(target) else {
            // Unregistered targets are not throttled.
            return true;
        };
        if entry.throttle_ms == 0 {
            entry.last_accepted = Some(now);
            return true;
        }
        let elapsed_ms = entry.last_accepted.map(|last| now.duration_since(last).as_millis() as u64);
        let accept = elapsed_ms.map(|elapsed| elapsed >= entry.throttle_ms).unwrap_or(true);
        if accept {
            entry.last_accepted = Some(now);
        } else {
            entry.throttled_count += 1;
        }
        accept
    }

    pub fn throttled_count(&self, target: &NodeId) -> u64 {
        self.state.lock().expect("throttle state lock poisoned").get(target).map(|entry| entry.throttled_count).unwrap_or(0)
    }
}
