//! VPS orchestrator - the single entry point for instance lifecycle.
//!
//! Every hostname-keyed mutation runs under that hostname's registry lock,
//! so a concurrent `stop` and `backup` on the same instance cannot
//! interleave their registry writes. Unknown hostnames yield `Ok(None)`.

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::instance::{
    container_name, hostname_base, BackupKind, BackupRecord, BackupStatus, InstanceStatus,
    VpsInstance,
};
use crate::plane::{PlaneCatalog, PlaneSpec};
use crate::registry::InstanceRegistry;
use crate::session::{SessionBootstrapper, SessionDescriptor};
use crate::usage::{parse_df_percent, ResourceUsage, DISK_PROBE_COMMAND};
use chrono::Utc;
use futures::{stream, StreamExt};
use hearth_runtime::{ContainerRef, ContainerSpec, RuntimeAdapter};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Container label carrying the owner ID.
pub const LABEL_OWNER: &str = "vps.owner_id";
/// Container label carrying the hostname.
pub const LABEL_HOSTNAME: &str = "vps.hostname";
/// Container label carrying the plane ID.
pub const LABEL_PLANE: &str = "vps.plane";
/// Container label carrying the creation time (RFC 3339).
pub const LABEL_CREATED_AT: &str = "vps.created_at";

/// Outcome of a batch operation. One item's failure never aborts the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Hostnames that succeeded, sorted.
    pub succeeded: Vec<String>,
    /// Hostnames that failed with the cause, sorted by hostname.
    pub failed: Vec<BatchFailure>,
}

/// A failed batch item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    /// Instance hostname.
    pub hostname: String,
    /// Rendered error.
    pub error: String,
}

/// Aggregate counts over non-deleted instances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FleetSummary {
    /// Non-deleted instances.
    pub total: usize,
    /// Running instances.
    pub running: usize,
    /// Suspended instances (a subset of `stopped`).
    pub suspended: usize,
    /// Stopped instances, suspended ones included.
    pub stopped: usize,
    /// Instance count per plane ID.
    pub by_plane: BTreeMap<String, usize>,
}

/// Owns every instance lifecycle transition.
pub struct VpsOrchestrator {
    runtime: Arc<dyn RuntimeAdapter>,
    planes: PlaneCatalog,
    registry: InstanceRegistry,
    sessions: SessionBootstrapper,
    config: OrchestratorConfig,
}

impl VpsOrchestrator {
    /// Create an orchestrator over an already loaded registry.
    pub fn new(
        runtime: Arc<dyn RuntimeAdapter>,
        planes: PlaneCatalog,
        registry: InstanceRegistry,
        config: OrchestratorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let sessions = SessionBootstrapper::new(Arc::clone(&runtime), config.session.clone());
        Ok(Self {
            runtime,
            planes,
            registry,
            sessions,
            config,
        })
    }

    /// Create an orchestrator, loading the registry from `config.registry_path`.
    pub async fn open(
        runtime: Arc<dyn RuntimeAdapter>,
        planes: PlaneCatalog,
        config: OrchestratorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let registry = InstanceRegistry::load(&config.registry_path).await?;
        Self::new(runtime, planes, registry, config)
    }

    /// Get the configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Get the underlying registry.
    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    /// All planes, sorted by ID.
    pub fn planes(&self) -> Vec<PlaneSpec> {
        self.planes.list()
    }

    /// Get an instance record, deleted ones included.
    pub async fn get(&self, hostname: &str) -> Option<VpsInstance> {
        self.registry.get(hostname).await
    }

    /// All non-deleted instances, sorted by hostname.
    pub async fn list(&self) -> Vec<VpsInstance> {
        self.registry
            .all()
            .await
            .into_iter()
            .filter(|v| !v.is_deleted())
            .collect()
    }

    /// Non-deleted instances owned by `owner_id`.
    pub async fn instances_for_owner(&self, owner_id: &str) -> Vec<VpsInstance> {
        self.list()
            .await
            .into_iter()
            .filter(|v| v.owner_id == owner_id)
            .collect()
    }

    /// Provision a new running instance for `owner_id` on `plane_id`.
    ///
    /// The hostname is derived from `username`. A container already holding
    /// the derived name is an unrecorded leftover and is force-removed first.
    /// If any step after container creation fails, the container is
    /// force-removed and the original error is returned; nothing is left in
    /// the registry.
    pub async fn provision(
        &self,
        owner_id: &str,
        username: &str,
        plane_id: &str,
    ) -> Result<VpsInstance> {
        let plane = self
            .planes
            .get(plane_id)
            .ok_or_else(|| OrchestratorError::PlaneNotFound(plane_id.to_string()))?;

        let hostname = self.registry.claim_hostname(&hostname_base(username)).await;
        let result = self.provision_claimed(&hostname, owner_id, username, plane).await;
        if result.is_err() {
            self.registry.release_claim(&hostname).await;
        }
        result
    }

    async fn provision_claimed(
        &self,
        hostname: &str,
        owner_id: &str,
        username: &str,
        plane: PlaneSpec,
    ) -> Result<VpsInstance> {
        let start = Instant::now();
        let name = container_name(hostname);
        let created_at = Utc::now();

        let spec = ContainerSpec::builder(&self.config.image, &name)
            .guest_port(self.config.guest_port)
            .memory_bytes(plane.memory_bytes)
            .cpu_cores(plane.cpu)
            .restart_policy(self.config.restart_policy)
            .label(LABEL_OWNER, owner_id)
            .label(LABEL_HOSTNAME, hostname)
            .label(LABEL_PLANE, &plane.id)
            .label(LABEL_CREATED_AT, created_at.to_rfc3339())
            .build()
            .map_err(|e| OrchestratorError::runtime(format!("build spec for {name}"), e))?;

        tracing::info!(hostname = %hostname, owner = %owner_id, plane = %plane.id, "Provisioning instance");

        let container = match self.runtime.create(&spec).await {
            Err(e) if e.is_conflict() => {
                self.remove_orphan(&name).await?;
                self.runtime.create(&spec).await
            }
            created => created,
        }
        .map_err(|e| OrchestratorError::runtime(format!("create {name}"), e))?;

        let instance = VpsInstance::new(
            hostname,
            owner_id,
            username,
            plane,
            container.clone(),
            0,
            SessionDescriptor::Error("not bootstrapped".into()),
            created_at,
        );

        match self.finish_provision(instance).await {
            Ok(instance) => {
                tracing::info!(
                    hostname = %hostname,
                    container = %container.name,
                    ssh_port = instance.ssh_port,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Instance provisioned"
                );
                Ok(instance)
            }
            Err(e) => {
                tracing::warn!(hostname = %hostname, error = %e, "Provisioning failed, rolling back");
                self.discard_container(&container).await;
                Err(e)
            }
        }
    }

    async fn finish_provision(&self, mut instance: VpsInstance) -> Result<VpsInstance> {
        let name = instance.container.name.clone();

        self.runtime
            .start(&name)
            .await
            .map_err(|e| OrchestratorError::runtime(format!("start {name}"), e))?;

        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }

        instance.ssh_port = self
            .runtime
            .host_port(&name, self.config.guest_port)
            .await
            .map_err(|e| OrchestratorError::runtime(format!("inspect {name}"), e))?
            .ok_or_else(|| OrchestratorError::PortAssignmentFailed(instance.hostname.clone()))?;

        instance.session = self.sessions.bootstrap(&name, instance.ssh_port).await;

        self.registry.commit(instance.clone()).await?;
        Ok(instance)
    }

    /// Remove a container holding a claimed name.
    ///
    /// A claimed hostname has no registry record, so a container under its
    /// name was left behind by a provision that never committed.
    async fn remove_orphan(&self, name: &str) -> Result<()> {
        tracing::warn!(container = %name, "Removing orphaned container left by an earlier provision");
        match self.runtime.remove(name, true).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(OrchestratorError::runtime(format!("remove orphan {name}"), e)),
        }
    }

    /// Best-effort force removal during rollback; failures are only logged.
    async fn discard_container(&self, container: &ContainerRef) {
        match self.runtime.remove(&container.name, true).await {
            Ok(()) => tracing::debug!(container = %container.name, "Rolled back container"),
            Err(e) if e.is_not_found() => {}
            Err(e) => tracing::warn!(
                container = %container.name,
                error = %e,
                "Failed to remove container during rollback"
            ),
        }
    }

    /// Look up a record that lifecycle operations may act on.
    async fn live(&self, hostname: &str) -> Result<Option<VpsInstance>> {
        match self.registry.get(hostname).await {
            None => Ok(None),
            Some(vps) if vps.is_deleted() => {
                Err(OrchestratorError::InstanceDeleted(hostname.to_string()))
            }
            Some(vps) => Ok(Some(vps)),
        }
    }

    async fn start_container(&self, vps: &mut VpsInstance) -> Result<()> {
        self.runtime
            .start(&vps.container.name)
            .await
            .map_err(|e| OrchestratorError::runtime(format!("start {}", vps.hostname), e))?;
        vps.mark_running();
        self.renew_session(vps).await;
        Ok(())
    }

    /// Re-read the published port and bootstrap a new session.
    ///
    /// The shell-sharing process dies with the container, and the daemon may
    /// publish a different host port on every start.
    async fn renew_session(&self, vps: &mut VpsInstance) {
        let name = &vps.container.name;
        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }
        match self.runtime.host_port(name, self.config.guest_port).await {
            Ok(Some(port)) => vps.ssh_port = port,
            Ok(None) => tracing::warn!(container = %name, "No published port after start"),
            Err(e) => tracing::warn!(container = %name, error = %e, "Port read-back failed"),
        }
        vps.session = self.sessions.bootstrap(name, vps.ssh_port).await;
    }

    async fn stop_container(&self, vps: &mut VpsInstance) -> Result<()> {
        self.runtime
            .stop(&vps.container.name)
            .await
            .map_err(|e| OrchestratorError::runtime(format!("stop {}", vps.hostname), e))?;
        vps.mark_stopped();
        Ok(())
    }

    /// Start an instance and bootstrap a fresh session. Clears `suspended`.
    pub async fn start(&self, hostname: &str) -> Result<Option<VpsInstance>> {
        let _guard = self.registry.lock(hostname).await;
        let Some(mut vps) = self.live(hostname).await? else {
            return Ok(None);
        };
        self.start_container(&mut vps).await?;
        self.registry.commit(vps.clone()).await?;
        tracing::info!(hostname = %hostname, "Instance started");
        Ok(Some(vps))
    }

    /// Stop an instance.
    pub async fn stop(&self, hostname: &str) -> Result<Option<VpsInstance>> {
        let _guard = self.registry.lock(hostname).await;
        let Some(mut vps) = self.live(hostname).await? else {
            return Ok(None);
        };
        self.stop_container(&mut vps).await?;
        self.registry.commit(vps.clone()).await?;
        tracing::info!(hostname = %hostname, "Instance stopped");
        Ok(Some(vps))
    }

    /// Restart an instance and bootstrap a fresh session.
    pub async fn restart(&self, hostname: &str) -> Result<Option<VpsInstance>> {
        let _guard = self.registry.lock(hostname).await;
        let Some(mut vps) = self.live(hostname).await? else {
            return Ok(None);
        };
        self.runtime
            .restart(&vps.container.name)
            .await
            .map_err(|e| OrchestratorError::runtime(format!("restart {hostname}"), e))?;
        vps.mark_running();
        self.renew_session(&mut vps).await;
        self.registry.commit(vps.clone()).await?;
        tracing::info!(hostname = %hostname, session_resolved = vps.session.is_resolved(), "Instance restarted");
        Ok(Some(vps))
    }

    /// Stop an instance and flag it suspended. The flag is only set if the
    /// stop succeeded.
    pub async fn suspend(&self, hostname: &str) -> Result<Option<VpsInstance>> {
        let _guard = self.registry.lock(hostname).await;
        let Some(mut vps) = self.live(hostname).await? else {
            return Ok(None);
        };
        self.stop_container(&mut vps).await?;
        vps.mark_suspended();
        self.registry.commit(vps.clone()).await?;
        tracing::info!(hostname = %hostname, "Instance suspended");
        Ok(Some(vps))
    }

    /// Start a suspended instance, clearing the flag on success.
    pub async fn resume(&self, hostname: &str) -> Result<Option<VpsInstance>> {
        let _guard = self.registry.lock(hostname).await;
        let Some(mut vps) = self.live(hostname).await? else {
            return Ok(None);
        };
        self.start_container(&mut vps).await?;
        self.registry.commit(vps.clone()).await?;
        tracing::info!(hostname = %hostname, "Instance resumed");
        Ok(Some(vps))
    }

    /// Force-remove the container and mark the instance deleted.
    ///
    /// A container that is already gone counts as removed. Deleting an
    /// already deleted instance is a no-op that keeps the original
    /// `deleted_at`.
    pub async fn delete(&self, hostname: &str) -> Result<Option<VpsInstance>> {
        let _guard = self.registry.lock(hostname).await;
        let Some(mut vps) = self.registry.get(hostname).await else {
            return Ok(None);
        };
        if vps.is_deleted() {
            tracing::debug!(hostname = %hostname, "Instance already deleted");
            return Ok(Some(vps));
        }

        match self.runtime.remove(&vps.container.name, true).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!(hostname = %hostname, "Container already gone");
            }
            Err(e) => return Err(OrchestratorError::runtime(format!("remove {hostname}"), e)),
        }

        vps.mark_deleted(Utc::now());
        self.registry.commit(vps.clone()).await?;
        tracing::info!(hostname = %hostname, "Instance deleted");
        Ok(Some(vps))
    }

    /// Live resource usage. Disk usage is probed inside the container and is
    /// `None` when the probe fails or the instance is not running.
    pub async fn usage(&self, hostname: &str) -> Result<Option<ResourceUsage>> {
        let Some(vps) = self.live(hostname).await? else {
            return Ok(None);
        };
        let name = &vps.container.name;

        let stats = self
            .runtime
            .stats(name)
            .await
            .map_err(|e| OrchestratorError::runtime(format!("stats {hostname}"), e))?;

        let disk_percent = if vps.is_running() {
            self.probe_disk(name).await
        } else {
            None
        };

        Ok(Some(ResourceUsage::from_stats(&stats, disk_percent)))
    }

    async fn probe_disk(&self, container: &str) -> Option<f64> {
        let cmd: Vec<String> = DISK_PROBE_COMMAND.iter().map(|s| s.to_string()).collect();
        let probe = self.runtime.exec_output(container, &cmd);
        match tokio::time::timeout(self.config.probe_timeout, probe).await {
            Err(_) => {
                tracing::warn!(
                    container = %container,
                    timeout_ms = self.config.probe_timeout.as_millis() as u64,
                    "Disk probe timed out"
                );
                None
            }
            Ok(Ok(output)) => {
                let percent = parse_df_percent(&output);
                if percent.is_none() {
                    tracing::warn!(container = %container, "Unrecognized disk probe output");
                }
                percent
            }
            Ok(Err(e)) => {
                tracing::warn!(container = %container, error = %e, "Disk probe failed");
                None
            }
        }
    }

    /// Re-run session bootstrap and store the new descriptor.
    pub async fn refresh_session(&self, hostname: &str) -> Result<Option<VpsInstance>> {
        let _guard = self.registry.lock(hostname).await;
        let Some(mut vps) = self.live(hostname).await? else {
            return Ok(None);
        };
        vps.session = self.sessions.bootstrap(&vps.container.name, vps.ssh_port).await;
        self.registry.commit(vps.clone()).await?;
        Ok(Some(vps))
    }

    /// Capture the instance filesystem.
    ///
    /// A running instance is stopped for the whole capture and started
    /// again afterwards, so it is unreachable until this returns.
    pub async fn backup(&self, hostname: &str) -> Result<Option<BackupRecord>> {
        self.backup_with_kind(hostname, BackupKind::Manual).await
    }

    async fn backup_with_kind(
        &self,
        hostname: &str,
        kind: BackupKind,
    ) -> Result<Option<BackupRecord>> {
        let _guard = self.registry.lock(hostname).await;
        let Some(mut vps) = self.live(hostname).await? else {
            return Ok(None);
        };

        let snapshot_id = new_snapshot_id(&vps, kind);
        let archive = self.archive_path(hostname, &snapshot_id);
        if let Some(dir) = archive.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                OrchestratorError::runtime(format!("create backup dir for {hostname}"), e.into())
            })?;
        }

        let start = Instant::now();
        let (captured, restarted) = self
            .with_container_stopped(
                &vps,
                "backup",
                self.runtime.export_filesystem(&vps.container.name, &archive),
            )
            .await?;

        let record = match captured {
            Ok(size_bytes) => {
                let record = BackupRecord {
                    snapshot_id,
                    created_at: Utc::now(),
                    size_bytes,
                    status: BackupStatus::Completed,
                    kind,
                };
                vps.last_backup_at = Some(record.created_at);
                vps.backups.push(record.clone());
                Ok(record)
            }
            Err(e) => {
                discard_archive(&archive).await;
                Err(OrchestratorError::runtime(format!("export {hostname}"), e))
            }
        };

        let reopened = self.settle_bracket(&mut vps, restarted).await;
        if record.is_ok() || reopened.is_err() {
            if let Err(e) = self.registry.commit(vps.clone()).await {
                // An archive without a record can be neither restored nor pruned.
                if record.is_ok() {
                    discard_archive(&archive).await;
                }
                return Err(e.into());
            }
        }
        let record = record?;
        reopened?;

        tracing::info!(
            hostname = %hostname,
            snapshot = %record.snapshot_id,
            size_bytes = record.size_bytes,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Backup completed"
        );
        Ok(Some(record))
    }

    /// Restore a recorded snapshot into the same container.
    ///
    /// Fails with [`OrchestratorError::SnapshotNotFound`] before touching the
    /// container if the snapshot is not recorded for this instance.
    pub async fn restore_backup(
        &self,
        hostname: &str,
        snapshot_id: &str,
    ) -> Result<Option<VpsInstance>> {
        let _guard = self.registry.lock(hostname).await;
        let Some(mut vps) = self.live(hostname).await? else {
            return Ok(None);
        };
        if vps.backup(snapshot_id).is_none() {
            return Err(OrchestratorError::SnapshotNotFound {
                hostname: hostname.to_string(),
                snapshot_id: snapshot_id.to_string(),
            });
        }

        let archive = self.archive_path(hostname, snapshot_id);
        tokio::fs::metadata(&archive).await.map_err(|e| {
            OrchestratorError::runtime(format!("open archive {}", archive.display()), e.into())
        })?;

        let (imported, restarted) = self
            .with_container_stopped(
                &vps,
                "restore",
                self.runtime.import_filesystem(&vps.container.name, &archive),
            )
            .await?;

        let imported = imported.map_err(|e| OrchestratorError::runtime(format!("import {hostname}"), e));
        if imported.is_ok() {
            vps.last_restore_at = Some(Utc::now());
            vps.restored_from = Some(snapshot_id.to_string());
        }

        let reopened = self.settle_bracket(&mut vps, restarted).await;
        if imported.is_ok() || reopened.is_err() {
            self.registry.commit(vps.clone()).await?;
        }
        imported?;
        reopened?;

        tracing::info!(hostname = %hostname, snapshot = %snapshot_id, "Backup restored");
        Ok(Some(vps))
    }

    /// Stop a running container, run `work`, then start it again.
    ///
    /// A stopped instance is left stopped and `work` runs directly. Returns
    /// the outcomes of the work and of the restart; only the stop aborts.
    async fn with_container_stopped<T>(
        &self,
        vps: &VpsInstance,
        op: &str,
        work: impl Future<Output = hearth_runtime::Result<T>>,
    ) -> Result<(hearth_runtime::Result<T>, hearth_runtime::Result<()>)> {
        let name = &vps.container.name;
        let was_running = vps.is_running();
        if was_running {
            self.runtime.stop(name).await.map_err(|e| {
                OrchestratorError::runtime(format!("{op} {}: stop", vps.hostname), e)
            })?;
        }

        let outcome = work.await;

        let restarted = if was_running {
            self.runtime.start(name).await
        } else {
            Ok(())
        };
        Ok((outcome, restarted))
    }

    /// Record the container as stopped if it could not be started again,
    /// otherwise renew the session of a restarted instance.
    async fn settle_bracket(
        &self,
        vps: &mut VpsInstance,
        restarted: hearth_runtime::Result<()>,
    ) -> Result<()> {
        match restarted {
            Ok(()) => {
                if vps.is_running() {
                    self.renew_session(vps).await;
                }
                Ok(())
            }
            Err(e) => {
                vps.mark_stopped();
                tracing::error!(hostname = %vps.hostname, error = %e, "Instance left stopped");
                Err(OrchestratorError::runtime(format!("start {}", vps.hostname), e))
            }
        }
    }

    fn archive_path(&self, hostname: &str, snapshot_id: &str) -> PathBuf {
        self.config
            .backup_dir
            .join(hostname)
            .join(format!("{snapshot_id}.tar"))
    }

    /// Counts over non-deleted instances. Reads the registry only.
    pub async fn fleet_summary(&self) -> FleetSummary {
        let mut summary = FleetSummary::default();
        for vps in self.list().await {
            summary.total += 1;
            match vps.status() {
                InstanceStatus::Running => summary.running += 1,
                InstanceStatus::Stopped => summary.stopped += 1,
                InstanceStatus::Deleted => {}
            }
            if vps.is_suspended() {
                summary.suspended += 1;
            }
            *summary.by_plane.entry(vps.plane_id.clone()).or_default() += 1;
        }
        summary
    }

    /// Back up every running instance, `backup_concurrency` at a time.
    pub async fn force_backup_all(&self) -> BatchReport {
        let targets: Vec<String> = self
            .list()
            .await
            .into_iter()
            .filter(VpsInstance::is_running)
            .map(|v| v.hostname)
            .collect();
        tracing::info!(instances = targets.len(), "Starting fleet backup");

        self.run_batch(targets, "backup", |hostname| async move {
            self.backup_with_kind(&hostname, BackupKind::Auto)
                .await
                .map(|r| r.is_some())
        })
        .await
    }

    /// Stop every running instance of `owner_id`.
    pub async fn stop_all_for_owner(&self, owner_id: &str) -> BatchReport {
        let targets: Vec<String> = self
            .instances_for_owner(owner_id)
            .await
            .into_iter()
            .filter(VpsInstance::is_running)
            .map(|v| v.hostname)
            .collect();

        self.run_batch(targets, "stop", |hostname| async move {
            self.stop(&hostname).await.map(|v| v.is_some())
        })
        .await
    }

    async fn run_batch<F, Fut>(&self, targets: Vec<String>, op: &str, action: F) -> BatchReport
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let outcomes: Vec<(String, Result<bool>)> = stream::iter(targets)
            .map(|hostname| {
                let fut = action(hostname.clone());
                async move { (hostname, fut.await) }
            })
            .buffer_unordered(self.config.backup_concurrency)
            .collect()
            .await;

        let mut report = BatchReport::default();
        for (hostname, outcome) in outcomes {
            match outcome {
                Ok(true) => report.succeeded.push(hostname),
                Ok(false) => report.failed.push(BatchFailure {
                    error: OrchestratorError::InstanceNotFound(hostname.clone()).to_string(),
                    hostname,
                }),
                Err(e) => {
                    tracing::error!(hostname = %hostname, op = %op, error = %e, "Batch item failed");
                    report.failed.push(BatchFailure {
                        hostname,
                        error: e.to_string(),
                    });
                }
            }
        }
        report.succeeded.sort();
        report.failed.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        tracing::info!(
            op = %op,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Batch finished"
        );
        report
    }
}

/// Remove a backup archive that will not be recorded.
async fn discard_archive(archive: &Path) {
    match tokio::fs::remove_file(archive).await {
        Ok(()) => tracing::debug!(archive = %archive.display(), "Discarded backup archive"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            archive = %archive.display(),
            error = %e,
            "Failed to remove unrecorded backup archive"
        ),
    }
}

/// Fresh snapshot ID, unique among the instance's recorded backups.
fn new_snapshot_id(vps: &VpsInstance, kind: BackupKind) -> String {
    loop {
        let uuid = Uuid::new_v4().simple().to_string();
        let id = match kind {
            BackupKind::Manual => format!("snap-{}", &uuid[..8]),
            BackupKind::Auto => format!("snap-auto-{}", &uuid[..6]),
        };
        if vps.backup(&id).is_none() {
            return id;
        }
    }
}
