//! # hearth-core
//!
//! VPS lifecycle orchestration for Hearth.
//!
//! This crate provisions, tracks and tears down VPS instances backed by
//! containers, bootstraps a remote-shell session for each, and coordinates
//! usage reporting, backups and restores.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   hearth-core (host)                     │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ┌─────────────────┐     ┌──────────────────────────┐    │
//! │  │ VpsOrchestrator │────▶│  PlaneCatalog            │    │
//! │  │  - provision()  │     │  (sizing tiers)          │    │
//! │  │  - stop/start() │     └──────────────────────────┘    │
//! │  │  - backup()     │     ┌──────────────────────────┐    │
//! │  │  - usage()      │────▶│  InstanceRegistry        │    │
//! │  └─────────────────┘     │  (JSON, per-host locks)  │    │
//! │           │              └──────────────────────────┘    │
//! │           ▼                                              │
//! │  ┌─────────────────────┐                                 │
//! │  │ SessionBootstrapper │  exec + marker scan + deadline  │
//! │  └─────────────────────┘                                 │
//! │           │                                              │
//! └───────────┼──────────────────────────────────────────────┘
//!             ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │          hearth-runtime (RuntimeAdapter / Docker)        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use hearth_core::{OrchestratorConfig, PlaneCatalog, VpsOrchestrator};
//! use hearth_runtime::DockerRuntime;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = Arc::new(DockerRuntime::connect()?);
//! let planes = PlaneCatalog::load(std::path::Path::new("config.json"))?;
//! let config = OrchestratorConfig::builder()
//!     .registry_path("/var/lib/hearth/vps_instances.json")
//!     .backup_dir("/var/lib/hearth/backups")
//!     .build()?;
//!
//! let orchestrator = VpsOrchestrator::open(runtime, planes, config).await?;
//!
//! let vps = orchestrator.provision("1234", "alice", "1").await?;
//! println!("{} reachable via {}", vps.hostname, vps.session);
//!
//! if let Some(usage) = orchestrator.usage(&vps.hostname).await? {
//!     println!("cpu {:.1}%", usage.cpu_percent);
//! }
//!
//! orchestrator.backup(&vps.hostname).await?;
//! orchestrator.delete(&vps.hostname).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Provisioning**: unique hostnames, plane-sized containers, rollback on failure
//! - **Lifecycle**: start, stop, restart, suspend, resume, soft delete
//! - **Sessions**: time-bounded shell-sharing bootstrap with direct fallback
//! - **Usage**: CPU and memory from runtime stats, disk from an in-container probe
//! - **Backups**: filesystem archives, restore in place, fleet-wide batches
//! - **Durability**: crash-safe registry writes, per-hostname locking

mod config;
mod error;
mod instance;
mod orchestrator;
mod plane;
mod registry;
mod session;
mod usage;

#[cfg(test)]
mod testing;

pub use config::{OrchestratorConfig, OrchestratorConfigBuilder};
pub use error::{OrchestratorError, Result};
pub use instance::{
    container_name, hostname_base, hostname_candidate, BackupKind, BackupRecord, BackupStatus,
    InstanceStatus, VpsInstance, HOSTNAME_BASE_MAX,
};
pub use orchestrator::{
    BatchFailure, BatchReport, FleetSummary, VpsOrchestrator, LABEL_CREATED_AT, LABEL_HOSTNAME,
    LABEL_OWNER, LABEL_PLANE,
};
pub use plane::{parse_size, PlaneCatalog, PlaneError, PlaneSpec};
pub use registry::{HostGuard, InstanceRegistry, RegistryError};
pub use session::{SessionBootstrapper, SessionConfig, SessionDescriptor, DEFAULT_SESSION_DEADLINE};
pub use usage::{cpu_percent, memory_percent, parse_df_percent, ResourceUsage, DISK_PROBE_COMMAND};
