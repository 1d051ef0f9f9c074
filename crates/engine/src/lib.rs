//! The processing engine: node registry, throttle controller, router, and
//! the lifecycle manager that ties them to a graph store, topic hub,
//! recorder, and sensor worker subprocesses.

mod dispatch;
mod error;
mod manager;
mod node_builder;
mod registry;
mod router;
mod status;
mod throttle;

pub use error::EngineError;
pub use manager::{Engine, EngineConfig};
pub use registry::{NodeEntry, NodeRegistry};
pub use router::Router;
pub use throttle::ThrottleController;
