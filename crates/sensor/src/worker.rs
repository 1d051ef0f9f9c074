//! The worker process's own main loop (§4.3). `bins/pointgraphd` re-execs
//! itself with a hidden `sensor-worker` subcommand instead of shipping a
//! second binary, so there is exactly one artifact to deploy; `parse_mode`
//! recognizes that subcommand and `run` never returns on success — it owns
//! the process until its stdout pipe breaks or it is killed.

use crate::source::{HardwareSource, ReplaySource, SensorSource, SourceError};
use crate::wire::{encode_frame, encode_status, WorkerStatus};
use std::io::Write;
use std::path::PathBuf;

pub const SUBCOMMAND: &str = "sensor-worker";

#[derive(Debug, Clone)]
pub enum WorkerMode {
    Replay { archive_path: PathBuf },
    Hardware { endpoint: String },
}

impl WorkerMode {
    /// Builds the argv (excluding argv\[0\]) this mode should be re-exec'd with.
    pub fn to_args(&self) -> Vec<String> {
        match self {
            WorkerMode::Replay { archive_path } => vec![
                SUBCOMMAND.to_string(),
                "--mode".to_string(),
                "replay".to_string(),
                "--path".to_string(),
                archive_path.display().to_string(),
            ],
            WorkerMode::Hardware { endpoint } => vec![
                SUBCOMMAND.to_string(),
                "--mode".to_string(),
                "hardware".to_string(),
                "--endpoint".to_string(),
                endpoint.clone(),
            ],
        }
    }
}

/// Parses argv (excluding argv\[0\]) and returns `Some(mode)` iff this
/// process was invoked as a sensor worker rather than as the main daemon.
pub fn parse_mode(args: &[String]) -> Option<WorkerMode> {
    if args.first().map(String::as_str) != Some(SUBCOMMAND) {
        return None;
    }
    let mut mode: Option<&str> = None;
    let mut path: Option<PathBuf> = None;
    let mut endpoint: Option<String> = None;
    let mut iter = args[1..].iter();
    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--mode" => mode = iter.next().map(String::as_str),
            "--path" => path = iter.next().map(PathBuf::from),
            "--endpoint" => endpoint = iter.next().cloned(),
            _ => {}
        }
    }
    match mode? {
        "replay" => Some(WorkerMode::Replay { archive_path: path? }),
        "hardware" => Some(WorkerMode::Hardware { endpoint: endpoint? }),
        _ => None,
    }
}

/// Runs the worker loop to completion, writing every frame and status
/// transition to `out`. Exits (returns) only when the source is permanently
/// exhausted or unavailable — the parent is expected to treat process exit
/// as a disconnect and decide whether to respawn.
pub fn run<W: Write>(mode: WorkerMode, mut out: W) {
    let mut source: Box<dyn SensorSource> = match mode {
        WorkerMode::Replay { archive_path } => match ReplaySource::open(&archive_path) {
            Ok(source) => Box::new(source),
            Err(error) => {
                let _ = encode_status(&mut out, &WorkerStatus::error(error.to_string()));
                return;
            }
        },
        WorkerMode::Hardware { endpoint } => Box::new(HardwareSource::new(endpoint)),
    };

    let _ = encode_status(&mut out, &WorkerStatus::connected());

    loop {
        match source.next_frame() {
            Ok((points, timestamp, delay)) => {
                if encode_frame(&mut out, &points, timestamp).is_err() {
                    return;
                }
                std::thread::sleep(delay);
            }
            Err(SourceError::HardwareUnavailable(_)) => {
                let _ = encode_status(&mut out, &WorkerStatus::error("hardware source unavailable"));
                return;
            }
            Err(error) => {
                let _ = encode_status(&mut out, &WorkerStatus::error(error.to_string()));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_replay_mode_from_argv() {
        let args = vec![
            "sensor-worker".to_string(),
            "--mode".to_string(),
            "replay".to_string(),
            "--path".to_string(),
            "/tmp/rec.lidrarch".to_string(),
        ];
        match parse_mode(&args) {
            Some(WorkerMode::Replay { archive_path }) => {
                assert_eq!(archive_path, PathBuf::from("/tmp/rec.lidrarch"))
            }
            other => panic!("unexpected mode: {other:?}"),
        }
    }

    #[test]
    fn non_worker_argv_is_not_recognized() {
        let args = vec!["--config".to_string(), "pointgraph.toml".to_string()];
        assert!(parse_mode(&args).is_none());
    }

    #[test]
    fn round_trips_through_to_args() {
        let mode = WorkerMode::Hardware { endpoint: "tcp://x".to_string() };
        let args = mode.to_args();
        assert_eq!(parse_mode(&args).map(|m| m.to_args()), Some(args));
    }
}
