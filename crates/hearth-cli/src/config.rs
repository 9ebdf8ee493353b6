//! Configuration for the hearth CLI.
//!
//! Configuration is loaded from environment variables with sensible defaults.

use hearth_core::{OrchestratorConfig, OrchestratorError};
use hearth_runtime::{RestartPolicy, DEFAULT_STOP_TIMEOUT};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the hearth CLI.
#[derive(Debug, Clone)]
pub struct HearthConfig {
    /// JSON file holding the plane catalog.
    pub planes_path: PathBuf,

    /// Durable instance registry.
    pub registry_path: PathBuf,

    /// Directory for backup archives.
    pub backup_dir: PathBuf,

    /// Image instances are created from.
    pub image: String,

    /// Delay between container start and port read-back.
    pub settle_delay: Duration,

    /// Session bootstrap deadline.
    pub session_deadline: Duration,

    /// Host shown in fallback SSH commands.
    pub fallback_host: String,

    /// Stop grace period passed to the Docker runtime.
    pub stop_timeout: Duration,

    /// Deadline for the in-container disk probe.
    pub probe_timeout: Duration,

    /// Instances processed at once by batch commands.
    pub backup_concurrency: usize,

    /// Container restart policy.
    pub restart_policy: RestartPolicy,
}

/// Configuration validation error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("plane catalog not found: {0}")]
    MissingPlanes(PathBuf),

    #[error("registry directory not found: {0}")]
    InvalidRegistryDir(PathBuf),
}

impl Default for HearthConfig {
    fn default() -> Self {
        let orchestrator = OrchestratorConfig::default();
        Self {
            planes_path: PathBuf::from("config.json"),
            registry_path: orchestrator.registry_path,
            backup_dir: orchestrator.backup_dir,
            image: orchestrator.image,
            settle_delay: orchestrator.settle_delay,
            session_deadline: orchestrator.session.deadline,
            fallback_host: orchestrator.session.fallback_host,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            probe_timeout: orchestrator.probe_timeout,
            backup_concurrency: orchestrator.backup_concurrency,
            restart_policy: orchestrator.restart_policy,
        }
    }
}

impl HearthConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `HEARTH_PLANES` | `config.json` |
    /// | `HEARTH_REGISTRY` | `vps_instances.json` |
    /// | `HEARTH_BACKUP_DIR` | `backups` |
    /// | `HEARTH_IMAGE` | `hearth-vps:latest` |
    /// | `HEARTH_SETTLE_SECS` | `2` |
    /// | `HEARTH_SESSION_DEADLINE_SECS` | `30` |
    /// | `HEARTH_FALLBACK_HOST` | `localhost` |
    /// | `HEARTH_STOP_TIMEOUT_SECS` | `10` |
    /// | `HEARTH_PROBE_TIMEOUT_SECS` | `5` |
    /// | `HEARTH_BACKUP_CONCURRENCY` | `2` |
    /// | `HEARTH_RESTART_POLICY` | `unless-stopped` |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();
        let secs = |key: &str, fallback: Duration| {
            lookup(key)
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        Self {
            planes_path: lookup("HEARTH_PLANES")
                .map(PathBuf::from)
                .unwrap_or(default.planes_path),
            registry_path: lookup("HEARTH_REGISTRY")
                .map(PathBuf::from)
                .unwrap_or(default.registry_path),
            backup_dir: lookup("HEARTH_BACKUP_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.backup_dir),
            image: lookup("HEARTH_IMAGE").unwrap_or(default.image),
            settle_delay: secs("HEARTH_SETTLE_SECS", default.settle_delay),
            session_deadline: secs("HEARTH_SESSION_DEADLINE_SECS", default.session_deadline),
            fallback_host: lookup("HEARTH_FALLBACK_HOST").unwrap_or(default.fallback_host),
            stop_timeout: secs("HEARTH_STOP_TIMEOUT_SECS", default.stop_timeout),
            probe_timeout: secs("HEARTH_PROBE_TIMEOUT_SECS", default.probe_timeout),
            backup_concurrency: lookup("HEARTH_BACKUP_CONCURRENCY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.backup_concurrency),
            restart_policy: lookup("HEARTH_RESTART_POLICY")
                .and_then(|v| RestartPolicy::parse(&v))
                .unwrap_or(default.restart_policy),
        }
    }

    /// Build the orchestrator configuration.
    pub fn orchestrator_config(&self) -> Result<OrchestratorConfig, OrchestratorError> {
        OrchestratorConfig::builder()
            .image(&self.image)
            .settle_delay(self.settle_delay)
            .session_deadline(self.session_deadline)
            .fallback_host(&self.fallback_host)
            .probe_timeout(self.probe_timeout)
            .restart_policy(self.restart_policy)
            .registry_path(&self.registry_path)
            .backup_dir(&self.backup_dir)
            .backup_concurrency(self.backup_concurrency)
            .build()
    }

    /// Check that the configured files and directories exist.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.planes_path.exists() {
            return Err(ConfigError::MissingPlanes(self.planes_path.clone()));
        }

        // The registry file is created on first write, so only its directory must exist.
        if let Some(parent) = self.registry_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidRegistryDir(parent.to_path_buf()));
            }
        }

        Ok(())
    }

    /// Validate configuration but only log a warning instead of failing.
    pub fn validate_warn(&self) {
        if let Err(e) = self.validate() {
            tracing::warn!("{e}");
        }
    }
}
