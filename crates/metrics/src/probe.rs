//! Best-effort system resource sampling (§4.13 `SystemMetrics`). The
//! original collects these via `psutil`; nothing in this workspace's
//! dependency stack wraps that, so this reads `/proc` directly on Linux and
//! degrades to zeroed output everywhere else rather than fail the broadcast
//! loop. Not meant to be exhaustive — CPU percent in particular is a rough
//! estimate from two `/proc/stat` samples, not a precise per-core figure.

use crate::model::SystemMetrics;
use std::sync::Mutex;

struct CpuSample {
    idle: u64,
    total: u64,
}

/// Samples `/proc/stat` and `/proc/meminfo` once per call. Keeps the
/// previous CPU jiffy counts around so each sample can report a percentage
/// rather than a cumulative counter.
pub struct SystemProbe {
    previous: Mutex<Option<CpuSample>>,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self { previous: Mutex::new(None) }
    }

    pub fn sample(&self) -> SystemMetrics {
        let cpu_percent = self.cpu_percent();
        let (memory_used_mb, memory_total_mb, memory_percent) = read_meminfo();
        let thread_count = read_thread_count();
        SystemMetrics { cpu_percent, memory_used_mb, memory_total_mb, memory_percent, thread_count, queue_depth: 0 }
    }

    fn cpu_percent(&self) -> f64 {
        let Some((idle, total)) = read_proc_stat() else { return 0.0 };
        let mut previous = self.previous.lock().expect("probe lock poisoned");
        let percent = match previous.as_ref() {
            Some(prev) if total > prev.total => {
                let idle_delta = idle.saturating_sub(prev.idle) as f64;
                let total_delta = (total - prev.total) as f64;
                ((total_delta - idle_delta) / total_delta * 100.0).clamp(0.0, 100.0)
            }
            _ => 0.0,
        };
        *previous = Some(CpuSample { idle, total });
        percent
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
fn read_proc_stat() -> Option<(u64, u64)> {
    let contents = std::fs::read_to_string("/proc/stat").ok()?;
    let line = contents.lines().next()?;
    let fields: Vec<u64> = line.split_whitespace().skip(1).filter_map(|f| f.parse().ok()).collect();
    if fields.len() < 4 {
        return None;
    }
    let idle = fields[3];
    let total: u64 = fields.iter().sum();
    Some((idle, total))
}

#[cfg(not(target_os = "linux"))]
fn read_proc_stat() -> Option<(u64, u64)> {
    None
}

#[cfg(target_os = "linux")]
fn read_meminfo() -> (f64, f64, f64) {
    let Ok(contents) = std::fs::read_to_string("/proc/meminfo") else { return (0.0, 0.0, 0.0) };
    let mut total_kb = 0u64;
    let mut available_kb = 0u64;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total_kb = parse_kb(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available_kb = parse_kb(rest);
        }
    }
    if total_kb == 0 {
        return (0.0, 0.0, 0.0);
    }
    let used_kb = total_kb.saturating_sub(available_kb);
    let used_mb = used_kb as f64 / 1024.0;
    let total_mb = total_kb as f64 / 1024.0;
    let percent = used_kb as f64 / total_kb as f64 * 100.0;
    (used_mb, total_mb, percent)
}

#[cfg(not(target_os = "linux"))]
fn read_meminfo() -> (f64, f64, f64) {
    (0.0, 0.0, 0.0)
}

#[cfg(target_os = "linux")]
fn parse_kb(field: &str) -> u64 {
    field.trim().trim_end_matches("kB").trim().parse().unwrap_or(0)
}

#[cfg(target_os = "linux")]
fn read_thread_count() -> usize {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|contents| {
            contents.lines().find_map(|line| line.strip_prefix("Threads:").map(|v| v.trim().parse().ok()).flatten())
        })
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
fn read_thread_count() -> usize {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_never_panics_and_yields_bounded_percent() {
        let probe = SystemProbe::new();
        let first = probe.sample();
        assert!(first.cpu_percent >= 0.0 && first.cpu_percent <= 100.0);
        let second = probe.sample();
        assert!(second.cpu_percent >= 0.0 && second.cpu_percent <= 100.0);
    }
}
