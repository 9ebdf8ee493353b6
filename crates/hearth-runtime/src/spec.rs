//! Container creation spec.

use crate::error::{Result, RuntimeError};
use std::collections::HashMap;

/// CPU quota units that make up one full core (the CFS period).
pub const CPU_PERIOD: i64 = 100_000;

/// Restart policy applied by the daemon when the container exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartPolicy {
    /// Never restart.
    No,
    /// Always restart.
    Always,
    /// Restart unless explicitly stopped (default).
    #[default]
    UnlessStopped,
    /// Restart only on non-zero exit.
    OnFailure,
}

impl RestartPolicy {
    /// Parse from the Docker CLI spelling (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "no" | "none" => Some(Self::No),
            "always" => Some(Self::Always),
            "unless-stopped" => Some(Self::UnlessStopped),
            "on-failure" => Some(Self::OnFailure),
            _ => None,
        }
    }
}

/// Everything the runtime needs to create one instance container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    /// Image reference (e.g. `hearth-vps:latest`).
    pub image: String,
    /// Container name, derived from the instance hostname.
    pub name: String,
    /// Allocate a TTY and keep stdin open.
    pub interactive: bool,
    /// Guest port published on an auto-assigned host port (`22/tcp`).
    pub guest_port: u16,
    /// Memory limit in bytes.
    pub memory_bytes: u64,
    /// CPU quota in units of [`CPU_PERIOD`] (100000 = one core).
    pub cpu_quota: i64,
    /// Restart policy.
    pub restart_policy: RestartPolicy,
    /// Descriptive labels.
    pub labels: HashMap<String, String>,
}

impl ContainerSpec {
    /// Create a new spec builder.
    pub fn builder(image: impl Into<String>, name: impl Into<String>) -> ContainerSpecBuilder {
        ContainerSpecBuilder {
            spec: ContainerSpec {
                image: image.into(),
                name: name.into(),
                interactive: true,
                guest_port: 22,
                memory_bytes: 0,
                cpu_quota: CPU_PERIOD,
                restart_policy: RestartPolicy::default(),
                labels: HashMap::new(),
            },
        }
    }

    /// Port key in Docker's `<port>/tcp` form.
    pub fn port_key(&self) -> String {
        format!("{}/tcp", self.guest_port)
    }

    /// Validate the spec.
    pub fn validate(&self) -> Result<()> {
        if self.image.is_empty() {
            return Err(RuntimeError::InvalidSpec("image is required".into()));
        }
        if self.name.is_empty() {
            return Err(RuntimeError::InvalidSpec("name is required".into()));
        }
        if self.memory_bytes == 0 {
            return Err(RuntimeError::InvalidSpec("memory limit must be > 0".into()));
        }
        if self.cpu_quota <= 0 {
            return Err(RuntimeError::InvalidSpec("cpu quota must be > 0".into()));
        }
        if self.guest_port == 0 {
            return Err(RuntimeError::InvalidSpec("guest port must be > 0".into()));
        }
        Ok(())
    }
}

/// Builder for [`ContainerSpec`].
#[derive(Debug, Clone)]
pub struct ContainerSpecBuilder {
    spec: ContainerSpec,
}

impl ContainerSpecBuilder {
    /// Set the guest port to publish.
    pub fn guest_port(mut self, port: u16) -> Self {
        self.spec.guest_port = port;
        self
    }

    /// Set the memory limit in bytes.
    pub fn memory_bytes(mut self, bytes: u64) -> Self {
        self.spec.memory_bytes = bytes;
        self
    }

    /// Set the CPU limit in whole cores.
    pub fn cpu_cores(mut self, cores: u32) -> Self {
        self.spec.cpu_quota = i64::from(cores) * CPU_PERIOD;
        self
    }

    /// Set the restart policy.
    pub fn restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.spec.restart_policy = policy;
        self
    }

    /// Toggle TTY + open stdin.
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.spec.interactive = interactive;
        self
    }

    /// Add a label.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.labels.insert(key.into(), value.into());
        self
    }

    /// Build the spec, validating all fields.
    pub fn build(self) -> Result<ContainerSpec> {
        self.spec.validate()?;
        Ok(self.spec)
    }
}
