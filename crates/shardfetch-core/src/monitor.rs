//! Host CPU and memory sampling for diagnostics.
//!
//! Reads `/proc/stat` and `/proc/meminfo`, so it only produces samples on
//! Linux. Sampling failures are logged and skipped, never fatal.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const PROC_STAT: &str = "/proc/stat";
const PROC_MEMINFO: &str = "/proc/meminfo";

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unexpected format in {}", path.display())]
    Parse { path: PathBuf },
}

/// Aggregate CPU jiffies from the `cpu` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

/// Parse the aggregate `cpu` line. idle includes iowait.
pub fn parse_cpu_times(stat: &str) -> Option<CpuTimes> {
    let line = stat.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|f| f.parse().ok())
        .collect::<Option<_>>()?;
    if fields.len() < 4 {
        return None;
    }
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    // guest and guest_nice are already counted in user and nice.
    let total = fields.iter().take(8).sum();
    Some(CpuTimes { idle, total })
}

/// Used memory percentage: `1 - MemAvailable / MemTotal`.
pub fn parse_memory_percent(meminfo: &str) -> Option<f64> {
    let field = |name: &str| {
        meminfo.lines().find_map(|line| {
            let rest = line.strip_prefix(name)?.strip_prefix(':')?;
            rest.split_whitespace().next()?.parse::<u64>().ok()
        })
    };
    let total = field("MemTotal")?;
    let available = field("MemAvailable")?;
    if total == 0 {
        return None;
    }
    Some(100.0 * (1.0 - available as f64 / total as f64))
}

/// CPU busy percentage between two readings.
pub fn cpu_percent(prev: CpuTimes, next: CpuTimes) -> f64 {
    let total = next.total.saturating_sub(prev.total);
    if total == 0 {
        return 0.0;
    }
    let idle = next.idle.saturating_sub(prev.idle).min(total);
    100.0 * (total - idle) as f64 / total as f64
}

fn read(path: &str) -> Result<String, MonitorError> {
    fs::read_to_string(path).map_err(|source| MonitorError::Read {
        path: PathBuf::from(path),
        source,
    })
}

fn parse_err(path: &str) -> MonitorError {
    MonitorError::Parse {
        path: Path::new(path).to_path_buf(),
    }
}

pub fn read_cpu_times() -> Result<CpuTimes, MonitorError> {
    parse_cpu_times(&read(PROC_STAT)?).ok_or_else(|| parse_err(PROC_STAT))
}

pub fn read_memory_percent() -> Result<f64, MonitorError> {
    parse_memory_percent(&read(PROC_MEMINFO)?).ok_or_else(|| parse_err(PROC_MEMINFO))
}

/// Stateful sampler: CPU usage is measured since the previous sample.
#[derive(Debug, Default)]
pub struct Monitor {
    prev: Option<CpuTimes>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a sample. The first call only has a CPU baseline and reports 0% CPU.
    pub fn sample(&mut self) -> Result<ResourceSample, MonitorError> {
        let now = read_cpu_times()?;
        let cpu = self.prev.map(|prev| cpu_percent(prev, now)).unwrap_or(0.0);
        self.prev = Some(now);
        Ok(ResourceSample {
            cpu_percent: cpu,
            memory_percent: read_memory_percent()?,
        })
    }
}

/// Log a sample every `interval`, `samples` times (forever when `None`).
/// Returns how many samples were logged successfully.
pub fn run(interval: Duration, samples: Option<u64>) -> u64 {
    let mut monitor = Monitor::new();
    if let Err(e) = monitor.sample() {
        tracing::warn!("resource sampling unavailable: {}", e);
    }
    let mut taken = 0u64;
    let mut ok = 0u64;
    while samples.map_or(true, |n| taken < n) {
        std::thread::sleep(interval);
        taken += 1;
        match monitor.sample() {
            Ok(s) => {
                ok += 1;
                tracing::info!(
                    "CPU usage: {:.1}%   memory usage: {:.1}%",
                    s.cpu_percent,
                    s.memory_percent
                );
            }
            Err(e) => tracing::warn!("resource sample failed: {}", e),
        }
    }
    ok
}
