//! VPS instance records and the naming rules that key them.

use crate::plane::PlaneSpec;
use crate::session::SessionDescriptor;
use chrono::{DateTime, Utc};
use hearth_runtime::ContainerRef;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of the username-derived part of a hostname.
pub const HOSTNAME_BASE_MAX: usize = 15;

/// Lifecycle status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// Container is running.
    Running,
    /// Container is stopped (possibly suspended).
    Stopped,
    /// Instance was deleted; terminal.
    Deleted,
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// Who asked for a backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    /// Requested for a single instance.
    Manual,
    /// Taken by a fleet-wide batch.
    Auto,
}

/// Outcome recorded for a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    /// Archive fully written.
    Completed,
}

/// A point-in-time filesystem capture of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Unique snapshot ID (`snap-…` or `snap-auto-…`).
    pub snapshot_id: String,
    /// When the capture finished.
    pub created_at: DateTime<Utc>,
    /// Archive size in bytes.
    pub size_bytes: u64,
    /// Capture status.
    pub status: BackupStatus,
    /// Manual or batch.
    pub kind: BackupKind,
}

/// A provisioned VPS, backed by exactly one container for its lifetime.
///
/// `status`, `suspended` and `deleted` are only changed through the
/// transition methods, which keep `suspended` meaningful only while stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpsInstance {
    /// Unique hostname; registry key.
    pub hostname: String,
    /// Owner's user ID.
    pub owner_id: String,
    /// Display name the hostname was derived from.
    pub username: String,
    /// Plane the instance was created with.
    pub plane_id: String,
    /// Plane values at creation time.
    pub plane: PlaneSpec,
    /// Backing container.
    pub container: ContainerRef,
    /// Host port published for the guest shell port.
    pub ssh_port: u16,
    /// Latest remote-shell descriptor.
    pub session: SessionDescriptor,
    status: InstanceStatus,
    suspended: bool,
    deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the latest successful backup.
    pub last_backup_at: Option<DateTime<Utc>>,
    /// Time of the latest successful restore.
    pub last_restore_at: Option<DateTime<Utc>>,
    /// Snapshot the latest restore used.
    pub restored_from: Option<String>,
    /// Snapshots in creation order.
    #[serde(default)]
    pub backups: Vec<BackupRecord>,
}

impl VpsInstance {
    /// Create a freshly provisioned, running instance.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hostname: impl Into<String>,
        owner_id: impl Into<String>,
        username: impl Into<String>,
        plane: PlaneSpec,
        container: ContainerRef,
        ssh_port: u16,
        session: SessionDescriptor,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            owner_id: owner_id.into(),
            username: username.into(),
            plane_id: plane.id.clone(),
            plane,
            container,
            ssh_port,
            session,
            status: InstanceStatus::Running,
            suspended: false,
            deleted: false,
            deleted_at: None,
            created_at,
            last_backup_at: None,
            last_restore_at: None,
            restored_from: None,
            backups: Vec::new(),
        }
    }

    /// Current status.
    pub fn status(&self) -> InstanceStatus {
        self.status
    }

    /// Whether the instance was stopped by an administrative suspend.
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Whether the instance was deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// When the instance was deleted.
    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    /// Whether the container is running.
    pub fn is_running(&self) -> bool {
        self.status == InstanceStatus::Running
    }

    /// Find a snapshot by ID.
    pub fn backup(&self, snapshot_id: &str) -> Option<&BackupRecord> {
        self.backups.iter().find(|b| b.snapshot_id == snapshot_id)
    }

    pub(crate) fn mark_running(&mut self) {
        self.status = InstanceStatus::Running;
        self.suspended = false;
    }

    pub(crate) fn mark_stopped(&mut self) {
        self.status = InstanceStatus::Stopped;
    }

    /// Flag a stopped instance as suspended. Returns false if not stopped.
    pub(crate) fn mark_suspended(&mut self) -> bool {
        if self.status != InstanceStatus::Stopped {
            return false;
        }
        self.suspended = true;
        true
    }

    /// Mark deleted. The first deletion time is kept on repeated calls.
    pub(crate) fn mark_deleted(&mut self, at: DateTime<Utc>) {
        if self.deleted {
            return;
        }
        self.status = InstanceStatus::Deleted;
        self.suspended = false;
        self.deleted = true;
        self.deleted_at = Some(at);
    }

    /// Repair flag combinations that cannot arise through the transitions.
    ///
    /// Returns true if anything changed.
    pub(crate) fn normalize(&mut self) -> bool {
        let mut changed = false;
        if self.deleted && self.status != InstanceStatus::Deleted {
            self.status = InstanceStatus::Deleted;
            changed = true;
        }
        if self.status == InstanceStatus::Deleted && !self.deleted {
            self.deleted = true;
            changed = true;
        }
        if self.suspended && self.status != InstanceStatus::Stopped {
            self.suspended = false;
            changed = true;
        }
        changed
    }
}

/// Normalize a username into a hostname base: ASCII alphanumerics, `-` and
/// `_`, lowercased, at most [`HOSTNAME_BASE_MAX`] characters, `user` if empty.
pub fn hostname_base(username: &str) -> String {
    let clean: String = username
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .map(|c| c.to_ascii_lowercase())
        .take(HOSTNAME_BASE_MAX)
        .collect();
    if clean.is_empty() {
        "user".to_string()
    } else {
        clean
    }
}

/// Hostname candidate for a base: `base-vps`, then `base-vps1`, `base-vps2`, …
pub fn hostname_candidate(base: &str, attempt: u32) -> String {
    if attempt == 0 {
        format!("{base}-vps")
    } else {
        format!("{base}-vps{attempt}")
    }
}

/// Container name for a hostname.
pub fn container_name(hostname: &str) -> String {
    format!("vps-{hostname}")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_instance(hostname: &str) -> VpsInstance {
        VpsInstance::new(
            hostname,
            "42",
            "alice",
            PlaneSpec::new("1", 1, "1GB", "10GB").expect("valid plane"),
            ContainerRef {
                id: format!("id-{hostname}"),
                name: container_name(hostname),
            },
            40022,
            SessionDescriptor::Fallback("ssh root@localhost -p 40022".into()),
            Utc::now(),
        )
    }

    #[test]
    fn test_hostname_base_normalization() {
        assert_eq!(hostname_base("Alice"), "alice");
        assert_eq!(hostname_base("Bob Smith!!"), "bobsmith");
        assert_eq!(hostname_base("dev_ops-01"), "dev_ops-01");
        assert_eq!(hostname_base("averyveryverylongusername"), "averyveryverylo");
        assert_eq!(hostname_base("🌸🌸"), "user");
        assert_eq!(hostname_base(""), "user");
    }

    #[test]
    fn test_hostname_candidates() {
        assert_eq!(hostname_candidate("alice", 0), "alice-vps");
        assert_eq!(hostname_candidate("alice", 1), "alice-vps1");
        assert_eq!(hostname_candidate("alice", 12), "alice-vps12");
        assert_eq!(container_name("alice-vps1"), "vps-alice-vps1");
    }

    #[test]
    fn test_suspend_requires_stopped() {
        let mut vps = sample_instance("alice-vps");
        assert!(!vps.mark_suspended());
        assert!(!vps.is_suspended());

        vps.mark_stopped();
        assert!(vps.mark_suspended());
        assert!(vps.is_suspended());

        vps.mark_running();
        assert!(!vps.is_suspended());
        assert_eq!(vps.status(), InstanceStatus::Running);
    }

    #[test]
    fn test_delete_keeps_first_timestamp() {
        let mut vps = sample_instance("alice-vps");
        let first = Utc::now();
        vps.mark_deleted(first);
        vps.mark_deleted(first + chrono::Duration::seconds(30));
        assert!(vps.is_deleted());
        assert_eq!(vps.status(), InstanceStatus::Deleted);
        assert_eq!(vps.deleted_at(), Some(first));
    }

    #[test]
    fn test_normalize_clears_suspended_on_running() {
        let mut json = serde_json::to_value(sample_instance("alice-vps")).expect("serialize");
        json["suspended"] = serde_json::Value::Bool(true);
        let mut vps: VpsInstance = serde_json::from_value(json).expect("deserialize");
        assert!(vps.normalize());
        assert!(!vps.is_suspended());
        assert!(!vps.normalize());
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(sample_instance("alice-vps")).expect("serialize");
        assert_eq!(json["status"], "running");
        assert_eq!(json["suspended"], false);
        assert_eq!(json["deleted"], false);
        assert_eq!(json["plane_id"], "1");
        assert_eq!(json["container"]["name"], "vps-alice-vps");
    }
}
