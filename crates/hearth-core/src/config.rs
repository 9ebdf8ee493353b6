//! Orchestrator configuration types.

use crate::error::OrchestratorError;
use crate::session::SessionConfig;
use hearth_runtime::RestartPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a [`VpsOrchestrator`](crate::VpsOrchestrator).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Image every instance is created from.
    pub image: String,
    /// Guest port published for shell access (default: 22).
    pub guest_port: u16,
    /// Pause between container start and port read-back (default: 2s).
    pub settle_delay: Duration,
    /// Session bootstrap settings.
    pub session: SessionConfig,
    /// Deadline for the in-container disk probe (default: 5s).
    pub probe_timeout: Duration,
    /// Restart policy for instance containers.
    pub restart_policy: RestartPolicy,
    /// Durable registry file.
    pub registry_path: PathBuf,
    /// Directory holding backup archives, one subdirectory per hostname.
    pub backup_dir: PathBuf,
    /// Instances processed concurrently by batch operations (default: 2).
    pub backup_concurrency: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            image: "hearth-vps:latest".to_string(),
            guest_port: 22,
            settle_delay: Duration::from_secs(2),
            session: SessionConfig::default(),
            probe_timeout: Duration::from_secs(5),
            restart_policy: RestartPolicy::UnlessStopped,
            registry_path: PathBuf::from("vps_instances.json"),
            backup_dir: PathBuf::from("backups"),
            backup_concurrency: 2,
        }
    }
}

impl OrchestratorConfig {
    /// Create a new config builder.
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder::default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.image.is_empty() {
            return Err(OrchestratorError::Config("image is required".into()));
        }
        if self.guest_port == 0 {
            return Err(OrchestratorError::Config("guest_port must be > 0".into()));
        }
        if self.session.command.is_empty() {
            return Err(OrchestratorError::Config("session command is required".into()));
        }
        if self.session.marker.is_empty() {
            return Err(OrchestratorError::Config("session marker is required".into()));
        }
        if self.session.deadline.is_zero() {
            return Err(OrchestratorError::Config("session deadline must be > 0".into()));
        }
        if self.probe_timeout.is_zero() {
            return Err(OrchestratorError::Config("probe_timeout must be > 0".into()));
        }
        if self.registry_path.as_os_str().is_empty() {
            return Err(OrchestratorError::Config("registry_path is required".into()));
        }
        if self.backup_dir.as_os_str().is_empty() {
            return Err(OrchestratorError::Config("backup_dir is required".into()));
        }
        if self.backup_concurrency == 0 {
            return Err(OrchestratorError::Config("backup_concurrency must be > 0".into()));
        }
        Ok(())
    }
}

/// Builder for OrchestratorConfig.
#[derive(Debug, Default)]
pub struct OrchestratorConfigBuilder {
    config: OrchestratorConfig,
}

impl OrchestratorConfigBuilder {
    /// Set the instance image.
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.config.image = image.into();
        self
    }

    /// Set the guest shell port.
    pub fn guest_port(mut self, port: u16) -> Self {
        self.config.guest_port = port;
        self
    }

    /// Set the post-start settle delay.
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.config.settle_delay = delay;
        self
    }

    /// Set the session bootstrap deadline.
    pub fn session_deadline(mut self, deadline: Duration) -> Self {
        self.config.session.deadline = deadline;
        self
    }

    /// Set the shell-sharing command.
    pub fn session_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.session.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Set the marker preceding the session address.
    pub fn session_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.session.marker = marker.into();
        self
    }

    /// Set the host used in fallback SSH commands.
    pub fn fallback_host(mut self, host: impl Into<String>) -> Self {
        self.config.session.fallback_host = host.into();
        self
    }

    /// Set the disk probe deadline.
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    /// Set the container restart policy.
    pub fn restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.config.restart_policy = policy;
        self
    }

    /// Set the registry file path.
    pub fn registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.registry_path = path.into();
        self
    }

    /// Set the backup directory.
    pub fn backup_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.backup_dir = path.into();
        self
    }

    /// Set batch concurrency.
    pub fn backup_concurrency(mut self, n: usize) -> Self {
        self.config.backup_concurrency = n;
        self
    }

    /// Build the configuration, validating all fields.
    pub fn build(self) -> Result<OrchestratorConfig, OrchestratorError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
