//! Plane catalog - named resource tiers selectable at provisioning time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading the plane catalog.
#[derive(Debug, Error)]
pub enum PlaneError {
    /// Size string could not be parsed
    #[error("invalid size {value:?} for plane {plane}: {reason}")]
    InvalidSize {
        /// Plane ID
        plane: String,
        /// Offending value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// Plane declares zero CPU cores
    #[error("plane {0} must have at least one CPU core")]
    NoCpu(String),

    /// Catalog file could not be read
    #[error("failed to read plane catalog {path}: {source}")]
    Read {
        /// Path that was read
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Catalog file is not valid JSON
    #[error("failed to parse plane catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A resource tier, as snapshotted into each instance at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaneSpec {
    /// Plane ID (catalog key).
    pub id: String,
    /// CPU cores.
    pub cpu: u32,
    /// Memory size as configured (e.g. `4GB`).
    pub ram: String,
    /// Disk size as configured (e.g. `40GB`).
    pub disk: String,
    /// Memory size in bytes.
    pub memory_bytes: u64,
    /// Disk size in bytes.
    pub disk_bytes: u64,
}

/// Plane entry as written in the configuration file.
#[derive(Debug, Clone, Deserialize)]
struct PlaneEntry {
    cpu: u32,
    ram: String,
    disk: String,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    planes: BTreeMap<String, PlaneEntry>,
}

impl PlaneSpec {
    /// Build a plane from configured values, parsing the size strings.
    pub fn new(
        id: impl Into<String>,
        cpu: u32,
        ram: impl Into<String>,
        disk: impl Into<String>,
    ) -> Result<Self, PlaneError> {
        let id = id.into();
        let ram = ram.into();
        let disk = disk.into();

        if cpu == 0 {
            return Err(PlaneError::NoCpu(id));
        }
        let memory_bytes = parse_size(&ram).map_err(|reason| PlaneError::InvalidSize {
            plane: id.clone(),
            value: ram.clone(),
            reason,
        })?;
        let disk_bytes = parse_size(&disk).map_err(|reason| PlaneError::InvalidSize {
            plane: id.clone(),
            value: disk.clone(),
            reason,
        })?;

        Ok(Self {
            id,
            cpu,
            ram,
            disk,
            memory_bytes,
            disk_bytes,
        })
    }
}

/// Read-only lookup of plane specs.
///
/// Lookups return owned copies so later catalog reloads never alter
/// instances that were already provisioned.
#[derive(Debug, Clone, Default)]
pub struct PlaneCatalog {
    planes: BTreeMap<String, PlaneSpec>,
}

impl PlaneCatalog {
    /// Build a catalog from already-parsed planes.
    pub fn new(planes: impl IntoIterator<Item = PlaneSpec>) -> Self {
        Self {
            planes: planes.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    /// Parse a catalog from the JSON configuration document.
    ///
    /// A document without a `planes` key yields an empty catalog.
    pub fn from_json(json: &str) -> Result<Self, PlaneError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        let planes = file
            .planes
            .into_iter()
            .map(|(id, entry)| PlaneSpec::new(id, entry.cpu, entry.ram, entry.disk))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(planes))
    }

    /// Load a catalog from a configuration file.
    ///
    /// A missing file yields an empty catalog.
    pub fn load(path: &Path) -> Result<Self, PlaneError> {
        match std::fs::read_to_string(path) {
            Ok(json) => {
                let catalog = Self::from_json(&json)?;
                tracing::info!(path = %path.display(), planes = catalog.len(), "Plane catalog loaded");
                Ok(catalog)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Plane catalog not found, starting empty");
                Ok(Self::default())
            }
            Err(source) => Err(PlaneError::Read {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Look up a plane by ID.
    pub fn get(&self, id: &str) -> Option<PlaneSpec> {
        self.planes.get(id).cloned()
    }

    /// All planes, sorted by ID.
    pub fn list(&self) -> Vec<PlaneSpec> {
        self.planes.values().cloned().collect()
    }

    /// Number of planes.
    pub fn len(&self) -> usize {
        self.planes.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }
}

/// Parse a size string such as `2GB`, `512m`, `1.5 GiB` or `1024` into bytes.
///
/// Units are binary multiples; a bare number is bytes.
pub fn parse_size(input: &str) -> Result<u64, String> {
    let s = input.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    if number.is_empty() {
        return Err("missing number".into());
    }
    let value: f64 = number.parse().map_err(|_| format!("bad number {number:?}"))?;

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1 << 10,
        "m" | "mb" | "mib" => 1 << 20,
        "g" | "gb" | "gib" => 1 << 30,
        "t" | "tb" | "tib" => 1 << 40,
        other => return Err(format!("unknown unit {other:?}")),
    };

    let bytes = value * multiplier as f64;
    if bytes < 1.0 || !bytes.is_finite() || bytes > u64::MAX as f64 {
        return Err("size out of range".into());
    }
    Ok(bytes as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1 << 30;

    #[test]
    fn test_parse_size_units() {
        assert_eq!(parse_size("2GB"), Ok(2 * GIB));
        assert_eq!(parse_size("2g"), Ok(2 * GIB));
        assert_eq!(parse_size("512MB"), Ok(512 << 20));
        assert_eq!(parse_size("1.5 GiB"), Ok(GIB + GIB / 2));
        assert_eq!(parse_size("1024"), Ok(1024));
        assert_eq!(parse_size("1TB"), Ok(1 << 40));
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("GB").is_err());
        assert!(parse_size("2XB").is_err());
        assert!(parse_size("0GB").is_err());
    }

    #[test]
    fn test_catalog_from_json() {
        let catalog = PlaneCatalog::from_json(
            r#"{
                "token": "ignored",
                "planes": {
                    "1": {"cpu": 1, "ram": "2GB", "disk": "20GB"},
                    "2": {"cpu": 2, "ram": "4GB", "disk": "40GB"}
                }
            }"#,
        )
        .expect("valid catalog");

        assert_eq!(catalog.len(), 2);
        let plane = catalog.get("2").expect("plane 2");
        assert_eq!(plane.cpu, 2);
        assert_eq!(plane.memory_bytes, 4 * GIB);
        assert_eq!(plane.disk_bytes, 40 * GIB);
        assert!(catalog.get("9").is_none());

        let ids: Vec<_> = catalog.list().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_catalog_without_planes_is_empty() {
        let catalog = PlaneCatalog::from_json(r#"{"admins": []}"#).expect("valid");
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_catalog_rejects_bad_plane() {
        let err = PlaneCatalog::from_json(r#"{"planes": {"x": {"cpu": 0, "ram": "1GB", "disk": "1GB"}}}"#)
            .expect_err("zero cpu");
        assert!(matches!(err, PlaneError::NoCpu(id) if id == "x"));

        let err = PlaneCatalog::from_json(r#"{"planes": {"y": {"cpu": 1, "ram": "lots", "disk": "1GB"}}}"#)
            .expect_err("bad ram");
        assert!(matches!(err, PlaneError::InvalidSize { .. }));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let catalog = PlaneCatalog::load(&dir.path().join("config.json")).expect("missing ok");
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_lookup_is_a_snapshot() {
        let catalog = PlaneCatalog::new([PlaneSpec::new("1", 1, "1GB", "10GB").expect("valid")]);
        let snapshot = catalog.get("1").expect("plane");
        let reloaded = PlaneCatalog::new([PlaneSpec::new("1", 4, "8GB", "80GB").expect("valid")]);
        assert_eq!(snapshot.cpu, 1);
        assert_eq!(reloaded.get("1").map(|p| p.cpu), Some(4));
    }
}
