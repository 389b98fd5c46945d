//! Portable on-disk format.
//!
//! Everything lives under `<repo>/.cv/`: a versioned manifest, the sync
//! state, JSONL shards per node/edge type, and vector shards per
//! collection. Shards are rewritten wholesale on sync, each through a
//! `.tmp` + atomic-rename cycle, with the manifest written last. The
//! `cache/` and `sessions/` subdirectories are gitignored so the rest of
//! the store can be committed to revision control.

pub mod export;
pub mod hydrate;
pub mod jsonl;
pub mod manifest;

pub use export::{export, ExportContext, ExportResult};
pub use hydrate::{is_loaded, load, load_vectors_only, storage_info, LoadOptions, LoadResult};
pub use manifest::Manifest;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cv_core::{Result, SyncState};

pub const STORE_DIR: &str = ".cv";

/// Node shard names the format is known to contain.
pub const NODE_SHARDS: &[&str] = &[
    "files", "symbols", "modules", "commits", "prds", "devops", "tests",
];

/// Edge shard names the format is known to contain.
pub const EDGE_SHARDS: &[&str] = &[
    "imports", "calls", "contains", "implements", "depends", "triggers", "tests",
];

/// Vector shard names (one per collection).
pub const VECTOR_SHARDS: &[&str] = &["code_chunks", "docstrings", "commits", "prds"];

// ── Line schemas ──

/// One node per line: `{id, type, …fields}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeLine<T> {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub data: T,
}

/// One edge per line: `{source, target, type, metadata?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeLine<M> {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<M>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportEdgeMeta {
    #[serde(default)]
    pub symbols: Vec<String>,
    pub style: String,
    #[serde(default)]
    pub line: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEdgeMeta {
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub is_conditional: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefineEdgeMeta {
    #[serde(default)]
    pub line: u32,
}

/// One vector entry per line: `{id, text, embedding, metadata}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorLine {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Value,
}

// ── Layout ──

/// Paths of one repo's on-disk store.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    dir: PathBuf,
}

impl StoreLayout {
    pub fn new(repo_root: &Path) -> Self {
        Self {
            dir: repo_root.join(STORE_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self) -> bool {
        self.manifest_path().exists()
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join("manifest.json")
    }

    pub fn sync_state_path(&self) -> PathBuf {
        self.dir.join("sync_state.json")
    }

    pub fn node_shard(&self, name: &str) -> PathBuf {
        self.dir.join("graph").join("nodes").join(format!("{name}.jsonl"))
    }

    pub fn edge_shard(&self, name: &str) -> PathBuf {
        self.dir.join("graph").join("edges").join(format!("{name}.jsonl"))
    }

    pub fn vector_shard(&self, name: &str) -> PathBuf {
        self.dir.join("vectors").join(format!("{name}.jsonl"))
    }

    /// Create the directory skeleton and the `.gitignore` covering the
    /// transient subdirectories.
    pub fn ensure_skeleton(&self) -> Result<()> {
        std::fs::create_dir_all(self.dir.join("graph").join("nodes"))?;
        std::fs::create_dir_all(self.dir.join("graph").join("edges"))?;
        std::fs::create_dir_all(self.dir.join("vectors"))?;
        std::fs::create_dir_all(self.dir.join("cache"))?;
        std::fs::create_dir_all(self.dir.join("sessions"))?;

        let gitignore = self.dir.join(".gitignore");
        if !gitignore.exists() {
            std::fs::write(&gitignore, "cache/\nsessions/\n")?;
        }
        Ok(())
    }

    pub fn read_sync_state(&self) -> Result<Option<SyncState>> {
        let path = self.sync_state_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let state = serde_json::from_str(&content).map_err(|e| {
            cv_core::Error::Storage(format!("invalid sync state at {}: {e}", path.display()))
        })?;
        Ok(Some(state))
    }

    pub fn write_sync_state(&self, state: &SyncState) -> Result<()> {
        jsonl::write_json_atomic(&self.sync_state_path(), state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skeleton_creates_dirs_and_gitignore() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.ensure_skeleton().unwrap();

        assert!(layout.dir().join("graph/nodes").is_dir());
        assert!(layout.dir().join("graph/edges").is_dir());
        assert!(layout.dir().join("vectors").is_dir());
        let gitignore = std::fs::read_to_string(layout.dir().join(".gitignore")).unwrap();
        assert!(gitignore.contains("cache/"));
        assert!(gitignore.contains("sessions/"));
    }

    #[test]
    fn node_line_roundtrip_ignores_unknown_fields() {
        let line: NodeLine<cv_core::FileRecord> = serde_json::from_str(
            r#"{"id":"src/a.ts","type":"file","path":"src/a.ts","language":"typescript",
                "size":10,"hash":"","lastModified":"2026-01-01T00:00:00Z","loc":2,
                "complexity":1,"futureField":"ignored"}"#,
        )
        .unwrap();
        assert_eq!(line.id, "src/a.ts");
        assert_eq!(line.data.language, "typescript");
    }

    #[test]
    fn sync_state_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.ensure_skeleton().unwrap();

        assert!(layout.read_sync_state().unwrap().is_none());

        let mut state = SyncState::default();
        state.files = 3;
        state.last_commit_synced = Some("abc123".into());
        layout.write_sync_state(&state).unwrap();

        let loaded = layout.read_sync_state().unwrap().unwrap();
        assert_eq!(loaded.files, 3);
        assert_eq!(loaded.last_commit_synced.as_deref(), Some("abc123"));
    }
}
