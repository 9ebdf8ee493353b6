//! Durable instance registry keyed by hostname.
//!
//! The registry is the only shared mutable state in the orchestrator:
//! - records live in an async `RwLock<HashMap>` snapshot
//! - writes to disk go through a temp file + fsync + rename, so a crash
//!   mid-write leaves the previous file intact
//! - per-hostname mutexes serialize operations on the same instance
//! - hostname claims reserve names for in-flight provisioning
//!
//! Records are never removed once committed. The registry does not query
//! the runtime, so containers changed behind its back (drift) are not
//! detected on load.

use crate::instance::{hostname_candidate, VpsInstance};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Errors from loading or persisting the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// File system error
    #[error("registry I/O error on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Registry file is not valid JSON
    #[error("failed to parse registry {path}: {source}")]
    Parse {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: serde_json::Error,
    },

    /// Records could not be serialized
    #[error("failed to serialize registry: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Blocking I/O task did not complete
    #[error("registry task failed: {0}")]
    Task(String),
}

/// Guard holding exclusive access to one hostname.
pub type HostGuard = OwnedMutexGuard<()>;

/// Durable mapping from hostname to instance record.
pub struct InstanceRegistry {
    path: PathBuf,
    instances: RwLock<HashMap<String, VpsInstance>>,
    host_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    claims: Mutex<HashSet<String>>,
    persist_lock: Mutex<()>,
}

impl InstanceRegistry {
    /// Create an empty registry that persists to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_records(path.into(), HashMap::new())
    }

    fn with_records(path: PathBuf, instances: HashMap<String, VpsInstance>) -> Self {
        Self {
            path,
            instances: RwLock::new(instances),
            host_locks: Mutex::new(HashMap::new()),
            claims: Mutex::new(HashSet::new()),
            persist_lock: Mutex::new(()),
        }
    }

    /// Load the registry from `path`; a missing file yields an empty registry.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let read_path = path.clone();
        let records = tokio::task::spawn_blocking(move || load_sync(&read_path))
            .await
            .map_err(|e| RegistryError::Task(e.to_string()))??;
        tracing::info!(path = %path.display(), instances = records.len(), "Registry loaded");
        Ok(Self::with_records(path, records))
    }

    /// Path of the durable store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a copy of the record for `hostname`.
    pub async fn get(&self, hostname: &str) -> Option<VpsInstance> {
        self.instances.read().await.get(hostname).cloned()
    }

    /// Insert or replace a record in memory only.
    pub async fn put(&self, record: VpsInstance) {
        self.claims.lock().await.remove(&record.hostname);
        self.instances
            .write()
            .await
            .insert(record.hostname.clone(), record);
    }

    /// Snapshot of every record (including deleted ones), sorted by hostname.
    pub async fn all(&self) -> Vec<VpsInstance> {
        let mut records: Vec<_> = self.instances.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        records
    }

    /// Number of records.
    pub async fn len(&self) -> usize {
        self.instances.read().await.len()
    }

    /// Whether the registry has no records.
    pub async fn is_empty(&self) -> bool {
        self.instances.read().await.is_empty()
    }

    /// Write the current records to disk atomically.
    pub async fn persist(&self) -> Result<(), RegistryError> {
        let _persist = self.persist_lock.lock().await;
        let snapshot = self.instances.read().await.clone();
        self.write(snapshot).await
    }

    /// Persist `record` together with the current records, then publish it
    /// in memory. On failure neither disk nor memory change.
    pub async fn commit(&self, record: VpsInstance) -> Result<(), RegistryError> {
        let _persist = self.persist_lock.lock().await;
        let mut snapshot = self.instances.read().await.clone();
        snapshot.insert(record.hostname.clone(), record.clone());
        self.write(snapshot).await?;
        tracing::debug!(hostname = %record.hostname, status = %record.status(), "Registry record committed");
        self.put(record).await;
        Ok(())
    }

    /// Acquire exclusive access to `hostname` for a read-modify-write cycle.
    pub async fn lock(&self, hostname: &str) -> HostGuard {
        let lock = {
            let mut locks = self.host_locks.lock().await;
            Arc::clone(locks.entry(hostname.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Reserve the first free hostname for `base` (`base-vps`, `base-vps1`, …).
    ///
    /// Names of existing records (deleted ones included) and of other
    /// in-flight claims are skipped. Release with [`release_claim`](Self::release_claim)
    /// if the record is never committed.
    pub async fn claim_hostname(&self, base: &str) -> String {
        let instances = self.instances.read().await;
        let mut claims = self.claims.lock().await;
        let mut attempt = 0u32;
        loop {
            let candidate = hostname_candidate(base, attempt);
            if !instances.contains_key(&candidate) && !claims.contains(&candidate) {
                claims.insert(candidate.clone());
                return candidate;
            }
            attempt += 1;
        }
    }

    /// Drop a hostname claim.
    pub async fn release_claim(&self, hostname: &str) {
        self.claims.lock().await.remove(hostname);
    }

    async fn write(&self, snapshot: HashMap<String, VpsInstance>) -> Result<(), RegistryError> {
        let ordered: BTreeMap<_, _> = snapshot.into_iter().collect();
        let content = serde_json::to_vec_pretty(&ordered)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &content))
            .await
            .map_err(|e| RegistryError::Task(e.to_string()))?
    }
}

fn load_sync(path: &Path) -> Result<HashMap<String, VpsInstance>, RegistryError> {
    let content = match std::fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(source) => {
            return Err(RegistryError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut records: HashMap<String, VpsInstance> =
        serde_json::from_slice(&content).map_err(|source| RegistryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    for (key, record) in records.iter_mut() {
        if record.hostname != *key {
            tracing::warn!(key = %key, hostname = %record.hostname, "Record hostname differs from key, using key");
            record.hostname = key.clone();
        }
        if record.normalize() {
            tracing::warn!(hostname = %key, "Normalized inconsistent status flags");
        }
    }
    Ok(records)
}

/// Write `content` to a sibling temp file, fsync it, and rename over `path`.
fn write_atomic(path: &Path, content: &[u8]) -> Result<(), RegistryError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| RegistryError::Io { path, source }
    };

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(io_err(parent))?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    {
        let mut file = std::fs::File::create(&tmp_path).map_err(io_err(&tmp_path))?;
        file.write_all(content).map_err(io_err(&tmp_path))?;
        file.sync_all().map_err(io_err(&tmp_path))?;
    }

    std::fs::rename(&tmp_path, path).map_err(io_err(path))?;

    // Make the rename itself durable.
    #[cfg(unix)]
    if let Ok(dir) = std::fs::File::open(parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}
