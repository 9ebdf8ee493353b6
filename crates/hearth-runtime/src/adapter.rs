//! Runtime adapter trait and the values it exchanges.

use crate::error::Result;
use crate::spec::ContainerSpec;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::pin::Pin;

/// Streamed exec output, decoded lossily as UTF-8 chunks.
///
/// Chunks are not guaranteed to align with line boundaries.
pub type ExecStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Identity of a container owned by one instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerRef {
    /// Runtime-assigned container ID.
    pub id: String,
    /// Deterministic container name.
    pub name: String,
}

/// Raw counters from a single stats snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Container CPU usage (ns) at this sample.
    pub cpu_total_usage: u64,
    /// Container CPU usage (ns) at the previous sample.
    pub precpu_total_usage: u64,
    /// Host CPU usage (ns) at this sample.
    pub system_cpu_usage: u64,
    /// Host CPU usage (ns) at the previous sample.
    pub presystem_cpu_usage: u64,
    /// Number of CPUs active for the container.
    pub online_cpus: u32,
    /// Memory in use, bytes.
    pub memory_usage: u64,
    /// Memory limit, bytes.
    pub memory_limit: u64,
}

impl RuntimeStats {
    /// Container CPU usage delta between the two samples.
    pub fn cpu_delta(&self) -> i128 {
        i128::from(self.cpu_total_usage) - i128::from(self.precpu_total_usage)
    }

    /// Host CPU usage delta between the two samples.
    pub fn system_delta(&self) -> i128 {
        i128::from(self.system_cpu_usage) - i128::from(self.presystem_cpu_usage)
    }
}

/// Typed interface to the container runtime.
///
/// Every call either returns a typed value or a [`RuntimeError`](crate::RuntimeError)
/// carrying the underlying cause. Implementations never retry; retry policy
/// belongs to the caller.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    /// Create (but do not start) a container from `spec`.
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerRef>;

    /// Start a container.
    async fn start(&self, container: &str) -> Result<()>;

    /// Stop a container.
    async fn stop(&self, container: &str) -> Result<()>;

    /// Restart a container.
    async fn restart(&self, container: &str) -> Result<()>;

    /// Remove a container, killing it first when `force` is set.
    async fn remove(&self, container: &str, force: bool) -> Result<()>;

    /// Read back the host port bound to `guest_port/tcp`, if any.
    async fn host_port(&self, container: &str, guest_port: u16) -> Result<Option<u16>>;

    /// Take a single stats snapshot.
    async fn stats(&self, container: &str) -> Result<RuntimeStats>;

    /// Run `cmd` inside the container and stream its output.
    async fn exec(&self, container: &str, cmd: &[String], tty: bool) -> Result<ExecStream>;

    /// Export the container filesystem as a tar archive at `dest`.
    ///
    /// Returns the archive size in bytes.
    async fn export_filesystem(&self, container: &str, dest: &Path) -> Result<u64>;

    /// Extract the tar archive at `src` over the container's root.
    async fn import_filesystem(&self, container: &str, src: &Path) -> Result<()>;

    /// Run `cmd` without a TTY and collect its whole output.
    async fn exec_output(&self, container: &str, cmd: &[String]) -> Result<String> {
        let mut stream = self.exec(container, cmd, false).await?;
        let mut output = String::new();
        while let Some(chunk) = stream.next().await {
            output.push_str(&chunk?);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_deltas() {
        let stats = RuntimeStats {
            cpu_total_usage: 300,
            precpu_total_usage: 100,
            system_cpu_usage: 1_000,
            presystem_cpu_usage: 2_000,
            ..Default::default()
        };
        assert_eq!(stats.cpu_delta(), 200);
        assert_eq!(stats.system_delta(), -1_000);
    }
}
