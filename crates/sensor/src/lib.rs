//! Sensor worker (C3, §4.3): every sensor node's frame source runs as a
//! genuine OS child process rather than a thread, so a driver crash can
//! never take the rest of the server down with it. The worker communicates
//! with its parent over a length-prefixed binary protocol on its own
//! stdout; replay and hardware acquisition are both modes of the same
//! `sensor-worker` subcommand rather than separate binaries.

pub mod handle;
pub mod source;
pub mod wire;
pub mod worker;

pub use handle::{SensorError, SensorHandle};
pub use source::{HardwareSource, ReplaySource, SensorSource, SourceError};
pub use wire::{StatusKind, WireError, WorkerMessage, WorkerStatus};
pub use worker::{parse_mode, WorkerMode, SUBCOMMAND};
