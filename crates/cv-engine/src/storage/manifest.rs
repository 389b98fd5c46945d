//! The versioned manifest heading a repo's on-disk store.
//!
//! Readers compare the stored schema version with the current one and apply
//! registered migrations in order; unknown `format` tags are rejected
//! outright. Field evolution is additive: readers ignore unknown fields and
//! writers never rename known ones.

use std::path::Path;

use serde::{Deserialize, Serialize};

use cv_core::{Error, Result};

use super::jsonl;

pub const FORMAT_TAG: &str = "cv-git-storage";
pub const SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryInfo {
    pub id: String,
    pub name: String,
    pub root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestStats {
    #[serde(default)]
    pub files: usize,
    #[serde(default)]
    pub symbols: usize,
    #[serde(default)]
    pub relationships: usize,
    #[serde(default)]
    pub vectors: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingInfo {
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
}

impl Default for EmbeddingInfo {
    fn default() -> Self {
        Self {
            provider: "none".to_string(),
            model: String::new(),
            dimensions: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: String,
    pub format: String,
    pub repository: RepositoryInfo,
    #[serde(default)]
    pub stats: ManifestStats,
    #[serde(default)]
    pub embedding: EmbeddingInfo,
    #[serde(default)]
    pub node_types: Vec<String>,
    #[serde(default)]
    pub edge_types: Vec<String>,
    pub created: String,
    pub updated: String,
}

impl Manifest {
    pub fn new(repository: RepositoryInfo, now_iso: &str) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            format: FORMAT_TAG.to_string(),
            repository,
            stats: ManifestStats::default(),
            embedding: EmbeddingInfo::default(),
            node_types: super::NODE_SHARDS.iter().map(|s| s.to_string()).collect(),
            edge_types: super::EDGE_SHARDS.iter().map(|s| s.to_string()).collect(),
            created: now_iso.to_string(),
            updated: now_iso.to_string(),
        }
    }

    /// Read a manifest, applying migrations for older schema versions.
    ///
    /// Returns `None` when no manifest exists. Unknown format tags and
    /// newer-than-supported versions are errors.
    pub fn read(path: &Path) -> Result<Option<Manifest>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut raw: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| Error::Storage(format!("invalid manifest at {}: {e}", path.display())))?;

        let format = raw.get("format").and_then(|v| v.as_str()).unwrap_or("");
        if format != FORMAT_TAG {
            return Err(Error::Storage(format!(
                "unknown storage format '{format}' (expected '{FORMAT_TAG}')"
            )));
        }

        let version = raw
            .get("version")
            .and_then(|v| v.as_str())
            .unwrap_or("0.0.0")
            .to_string();
        if version_lt(SCHEMA_VERSION, &version) {
            return Err(Error::Storage(format!(
                "manifest version {version} is newer than supported {SCHEMA_VERSION}"
            )));
        }

        for &(through, migrate) in MIGRATIONS {
            if version_lt(&version, through) || version == through {
                migrate(&mut raw);
            }
        }
        raw["version"] = serde_json::json!(SCHEMA_VERSION);

        let manifest: Manifest = serde_json::from_value(raw)
            .map_err(|e| Error::Storage(format!("manifest schema mismatch: {e}")))?;
        Ok(Some(manifest))
    }

    /// Write atomically. `updated` is bumped to `now_iso`, and
    /// `stats.last_sync` never moves backwards.
    pub fn write(&mut self, path: &Path, now_iso: &str) -> Result<()> {
        self.updated = now_iso.to_string();
        jsonl::write_json_atomic(path, self)
    }

    /// Record a sync's stats; `last_sync` is kept monotonic.
    pub fn record_sync(
        &mut self,
        stats: ManifestStats,
        now_iso: &str,
    ) {
        let last_sync = match &self.stats.last_sync {
            // ISO-8601 strings in UTC order lexically.
            Some(previous) if previous.as_str() > now_iso => previous.clone(),
            _ => now_iso.to_string(),
        };
        self.stats = ManifestStats {
            last_sync: Some(last_sync),
            ..stats
        };
    }
}

/// Registered migrations, oldest first: `(last version needing it, fn)`.
type Migration = fn(&mut serde_json::Value);
const MIGRATIONS: &[(&str, Migration)] = &[
    // 0.9.x manifests predate the embedding block.
    ("0.9.9", migrate_add_embedding_block),
];

fn migrate_add_embedding_block(raw: &mut serde_json::Value) {
    if raw.get("embedding").is_none() {
        raw["embedding"] = serde_json::json!({
            "provider": "none",
            "model": "",
            "dimensions": 0,
        });
    }
}

/// Three-part numeric version comparison: is `a` strictly older than `b`?
fn version_lt(a: &str, b: &str) -> bool {
    let parse = |v: &str| -> [u64; 3] {
        let mut parts = v.split('.').map(|p| p.parse::<u64>().unwrap_or(0));
        [
            parts.next().unwrap_or(0),
            parts.next().unwrap_or(0),
            parts.next().unwrap_or(0),
        ]
    };
    parse(a) < parse(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo_info() -> RepositoryInfo {
        RepositoryInfo {
            id: "abc123def456".into(),
            name: "widgets".into(),
            root: "/tmp/widgets".into(),
            remote: Some("github.com/acme/widgets".into()),
        }
    }

    #[test]
    fn roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");

        let mut manifest = Manifest::new(repo_info(), "2026-08-01T00:00:00Z");
        manifest.write(&path, "2026-08-01T00:00:01Z").unwrap();

        let loaded = Manifest::read(&path).unwrap().unwrap();
        assert_eq!(loaded.version, SCHEMA_VERSION);
        assert_eq!(loaded.format, FORMAT_TAG);
        assert_eq!(loaded.repository.id, "abc123def456");
        assert_eq!(loaded.updated, "2026-08-01T00:00:01Z");
    }

    #[test]
    fn missing_manifest_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Manifest::read(&dir.path().join("manifest.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn unknown_format_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, r#"{"version":"1.0.0","format":"something-else"}"#).unwrap();
        let err = Manifest::read(&path).unwrap_err();
        assert!(err.to_string().contains("unknown storage format"));
    }

    #[test]
    fn old_manifest_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(
            &path,
            r#"{
                "version": "0.9.0",
                "format": "cv-git-storage",
                "repository": {"id": "abc", "name": "x", "root": "/x"},
                "created": "2025-01-01T00:00:00Z",
                "updated": "2025-01-01T00:00:00Z"
            }"#,
        )
        .unwrap();

        let manifest = Manifest::read(&path).unwrap().unwrap();
        assert_eq!(manifest.version, SCHEMA_VERSION);
        assert_eq!(manifest.embedding.provider, "none");
    }

    #[test]
    fn last_sync_is_monotonic() {
        let mut manifest = Manifest::new(repo_info(), "2026-08-01T10:00:00Z");
        manifest.record_sync(ManifestStats::default(), "2026-08-01T11:00:00Z");
        assert_eq!(
            manifest.stats.last_sync.as_deref(),
            Some("2026-08-01T11:00:00Z")
        );

        // A clock that stepped backwards must not move lastSync backwards.
        manifest.record_sync(ManifestStats::default(), "2026-08-01T09:00:00Z");
        assert_eq!(
            manifest.stats.last_sync.as_deref(),
            Some("2026-08-01T11:00:00Z")
        );
    }

    #[test]
    fn version_compare() {
        assert!(version_lt("0.9.0", "1.0.0"));
        assert!(version_lt("1.0.0", "1.0.1"));
        assert!(!version_lt("1.0.0", "1.0.0"));
        assert!(!version_lt("1.1.0", "1.0.9"));
    }
}
