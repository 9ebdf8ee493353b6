//! Resource usage computation from runtime counters and in-container probes.

use hearth_runtime::RuntimeStats;
use serde::Serialize;

/// Command used to probe root filesystem usage inside a container.
pub const DISK_PROBE_COMMAND: [&str; 3] = ["df", "-P", "/"];

const MIB: u64 = 1024 * 1024;

/// Usage report for one instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceUsage {
    /// CPU percent, scaled by active cores (may exceed 100).
    pub cpu_percent: f64,
    /// Memory used as a percent of the limit.
    pub memory_percent: f64,
    /// Root filesystem usage percent; `None` when the probe failed.
    pub disk_percent: Option<f64>,
    /// Memory used, MiB.
    pub memory_used_mib: u64,
    /// Memory limit, MiB.
    pub memory_total_mib: u64,
}

impl ResourceUsage {
    /// Build a report from a stats snapshot and an optional disk probe result.
    pub fn from_stats(stats: &RuntimeStats, disk_percent: Option<f64>) -> Self {
        Self {
            cpu_percent: cpu_percent(stats.cpu_delta(), stats.system_delta(), stats.online_cpus),
            memory_percent: memory_percent(stats.memory_usage, stats.memory_limit),
            disk_percent,
            memory_used_mib: stats.memory_usage / MIB,
            memory_total_mib: stats.memory_limit / MIB,
        }
    }
}

/// `(cpu_delta / system_delta) * cores * 100`, or 0 when the system delta is not positive.
pub fn cpu_percent(cpu_delta: i128, system_delta: i128, cores: u32) -> f64 {
    if system_delta <= 0 || cpu_delta <= 0 {
        return 0.0;
    }
    (cpu_delta as f64 / system_delta as f64) * f64::from(cores) * 100.0
}

/// `used / limit * 100`, or 0 when the limit is unknown.
pub fn memory_percent(used: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    used as f64 / limit as f64 * 100.0
}

/// Parse the capacity column of POSIX `df -P` output.
///
/// Uses the last data line, so wrapped device names do not matter.
pub fn parse_df_percent(output: &str) -> Option<f64> {
    output
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .last()?
        .split_whitespace()
        .find_map(|field| field.strip_suffix('%'))?
        .parse()
        .ok()
}
