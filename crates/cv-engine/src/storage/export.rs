//! Exporter: snapshot the live graph and vector state into the on-disk
//! format after a sync.
//!
//! The exporter owns the shards and rewrites them wholesale; the manifest
//! is written last so a reader never sees a manifest describing shards that
//! do not exist yet. Backend values are coerced defensively — in particular
//! `lastModified`, which different backends hand back as millis, as an ISO
//! string, or as null.

use std::path::Path;

use serde_json::json;

use cv_core::{FileRecord, Parameter, Result, SymbolKind, SymbolRecord, SyncStage, Visibility};

use crate::graph::store::{GraphValue, GraphStore};
use crate::graph::GraphWriter;
use crate::identity;
use crate::storage::manifest::{EmbeddingInfo, Manifest, ManifestStats, RepositoryInfo};
use crate::storage::{
    jsonl, CallEdgeMeta, DefineEdgeMeta, EdgeLine, ImportEdgeMeta, NodeLine, StoreLayout,
    VectorLine, EDGE_SHARDS, NODE_SHARDS, VECTOR_SHARDS,
};
use crate::sync::CancelFlag;
use crate::vector::VectorStore;

const SCROLL_PAGE: usize = 100;

pub struct ExportContext<'a> {
    pub root: &'a Path,
    pub graph: &'a GraphWriter,
    pub vector: Option<&'a VectorStore>,
    /// Prefix collection names with `<repoId>_` when reading.
    pub isolate: bool,
    pub repo_name: String,
    pub remote: Option<String>,
    /// Embedding configuration to record, when a provider ran this sync.
    pub embedding: Option<EmbeddingInfo>,
    pub duration_ms: u64,
    pub cancel: CancelFlag,
}

#[derive(Debug, Clone, Default)]
pub struct ExportResult {
    pub files: usize,
    pub symbols: usize,
    pub edges: usize,
    pub vectors: usize,
}

/// Run the export pipeline. Failures are fatal and carry the Export stage.
pub async fn export(ctx: ExportContext<'_>) -> Result<ExportResult> {
    run(ctx).await.map_err(|e| e.at_stage(SyncStage::Export))
}

async fn run(ctx: ExportContext<'_>) -> Result<ExportResult> {
    let layout = StoreLayout::new(ctx.root);
    layout.ensure_skeleton()?;

    let now = now_iso();
    let mut manifest = match Manifest::read(&layout.manifest_path())? {
        Some(manifest) => manifest,
        None => Manifest::new(
            RepositoryInfo {
                id: ctx.graph.repo_id().to_string(),
                name: ctx.repo_name.clone(),
                root: ctx.root.to_string_lossy().to_string(),
                remote: ctx.remote.clone(),
            },
            &now,
        ),
    };

    let store = ctx.graph.store();
    let repo_id = ctx.graph.repo_id();
    let mut result = ExportResult::default();

    // File nodes.
    ctx.cancel.check()?;
    let files = fetch_files(store, repo_id, &now).await?;
    result.files = files.len();
    let file_lines: Vec<NodeLine<FileRecord>> = files
        .into_iter()
        .map(|file| NodeLine {
            id: file.path.clone(),
            kind: "file".to_string(),
            data: file,
        })
        .collect();
    jsonl::write_shard(&layout.node_shard("files"), &file_lines)?;

    // Symbol nodes.
    ctx.cancel.check()?;
    let symbols = fetch_symbols(store, repo_id).await?;
    result.symbols = symbols.len();
    let symbol_lines: Vec<NodeLine<SymbolRecord>> = symbols
        .into_iter()
        .map(|sym| NodeLine {
            id: sym.qualified_name.clone(),
            kind: "symbol".to_string(),
            data: sym,
        })
        .collect();
    jsonl::write_shard(&layout.node_shard("symbols"), &symbol_lines)?;

    // Edges.
    ctx.cancel.check()?;
    let imports = fetch_import_edges(store, repo_id).await?;
    let calls = fetch_call_edges(store, repo_id).await?;
    let defines = fetch_define_edges(store, repo_id).await?;
    result.edges = imports.len() + calls.len() + defines.len();
    jsonl::write_shard(&layout.edge_shard("imports"), &imports)?;
    jsonl::write_shard(&layout.edge_shard("calls"), &calls)?;
    jsonl::write_shard(&layout.edge_shard("contains"), &defines)?;

    // Remaining known shard types exist even when empty.
    for name in NODE_SHARDS {
        let path = layout.node_shard(name);
        if !path.exists() {
            jsonl::write_shard::<NodeLine<serde_json::Value>>(&path, &[])?;
        }
    }
    for name in EDGE_SHARDS {
        let path = layout.edge_shard(name);
        if !path.exists() {
            jsonl::write_shard::<EdgeLine<serde_json::Value>>(&path, &[])?;
        }
    }

    // Vector collections, scrolled in pages.
    for name in VECTOR_SHARDS {
        ctx.cancel.check()?;
        let lines = match ctx.vector {
            Some(vector) => {
                let collection = if ctx.isolate {
                    identity::scoped_collection(repo_id, name)
                } else {
                    name.to_string()
                };
                scroll_collection(vector, &collection).await?
            }
            None => Vec::new(),
        };
        result.vectors += lines.len();
        jsonl::write_shard(&layout.vector_shard(name), &lines)?;
    }

    // Manifest last.
    ctx.cancel.check()?;
    if let Some(embedding) = ctx.embedding {
        manifest.embedding = embedding;
    }
    manifest.record_sync(
        ManifestStats {
            files: result.files,
            symbols: result.symbols,
            relationships: result.edges,
            vectors: result.vectors,
            last_sync: None,
            duration_ms: ctx.duration_ms,
        },
        &now,
    );
    manifest.write(&layout.manifest_path(), &now)?;

    tracing::info!(
        files = result.files,
        symbols = result.symbols,
        edges = result.edges,
        vectors = result.vectors,
        "exported on-disk store"
    );
    Ok(result)
}

pub(crate) fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Normalize whatever the backend stored for `lastModified` to ISO-8601.
fn coerce_timestamp(value: &GraphValue, now: &str) -> String {
    let from_millis = |ms: i64| {
        chrono::DateTime::from_timestamp_millis(ms)
            .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
    };
    match value {
        GraphValue::Int(ms) => from_millis(*ms).unwrap_or_else(|| now.to_string()),
        GraphValue::String(s) => {
            if let Ok(ms) = s.parse::<i64>() {
                from_millis(ms).unwrap_or_else(|| now.to_string())
            } else {
                s.clone()
            }
        }
        _ => now.to_string(),
    }
}

async fn fetch_files(store: &GraphStore, repo_id: &str, now: &str) -> Result<Vec<FileRecord>> {
    let rows = store
        .query(
            "MATCH (f:File {repoId: $repoId}) \
             RETURN f.path, f.language, f.size, f.hash, f.lastModified, f.loc, f.complexity",
            &[("repoId", json!(repo_id))],
        )
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let path = row.first()?.clone().into_string()?;
            Some(FileRecord {
                path,
                language: row.get(1).and_then(|v| v.clone().into_string()).unwrap_or_default(),
                size: row.get(2).and_then(|v| v.as_i64()).unwrap_or(0) as u64,
                hash: row.get(3).and_then(|v| v.clone().into_string()).unwrap_or_default(),
                last_modified: coerce_timestamp(row.get(4).unwrap_or(&GraphValue::Null), now),
                loc: row.get(5).and_then(|v| v.as_i64()).unwrap_or(0) as u32,
                complexity: row.get(6).and_then(|v| v.as_i64()).unwrap_or(0) as u32,
            })
        })
        .collect())
}

async fn fetch_symbols(store: &GraphStore, repo_id: &str) -> Result<Vec<SymbolRecord>> {
    let rows = store
        .query(
            "MATCH (s:Symbol {repoId: $repoId}) \
             RETURN s.qualifiedName, s.name, s.kind, s.file, s.startLine, s.endLine, \
                    s.signature, s.docstring, s.returnType, s.parameters, s.visibility, \
                    s.isAsync, s.isStatic, s.complexity",
            &[("repoId", json!(repo_id))],
        )
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let qualified_name = row.first()?.clone().into_string()?;
            let kind = row
                .get(2)
                .and_then(|v| v.clone().into_string())
                .and_then(|s| s.parse::<SymbolKind>().ok())
                .unwrap_or_else(|| {
                    tracing::warn!(%qualified_name, "unknown symbol kind, defaulting to variable");
                    SymbolKind::Variable
                });
            let visibility = row
                .get(10)
                .and_then(|v| v.clone().into_string())
                .and_then(|s| s.parse::<Visibility>().ok())
                .unwrap_or(Visibility::Public);
            let parameters = row
                .get(9)
                .map(|v| v.clone().into_string_vec())
                .unwrap_or_default()
                .into_iter()
                .map(|entry| match entry.split_once(": ") {
                    Some((name, hint)) => Parameter {
                        name: name.to_string(),
                        type_hint: Some(hint.to_string()),
                    },
                    None => Parameter {
                        name: entry,
                        type_hint: None,
                    },
                })
                .collect();

            Some(SymbolRecord {
                name: row.get(1).and_then(|v| v.clone().into_string()).unwrap_or_default(),
                qualified_name,
                kind,
                file: row.get(3).and_then(|v| v.clone().into_string()).unwrap_or_default(),
                start_line: row.get(4).and_then(|v| v.as_i64()).unwrap_or(0) as u32,
                end_line: row.get(5).and_then(|v| v.as_i64()).unwrap_or(0) as u32,
                signature: row.get(6).and_then(|v| v.clone().into_string()),
                docstring: row.get(7).and_then(|v| v.clone().into_string()),
                return_type: row.get(8).and_then(|v| v.clone().into_string()),
                parameters,
                visibility,
                is_async: row.get(11).and_then(|v| v.as_bool()).unwrap_or(false),
                is_static: row.get(12).and_then(|v| v.as_bool()).unwrap_or(false),
                complexity: row.get(13).and_then(|v| v.as_i64()).unwrap_or(1) as u32,
                calls: Vec::new(),
            })
        })
        .collect())
}

async fn fetch_import_edges(
    store: &GraphStore,
    repo_id: &str,
) -> Result<Vec<EdgeLine<ImportEdgeMeta>>> {
    let rows = store
        .query(
            "MATCH (a:File {repoId: $repoId})-[r:IMPORTS]->(b:File {repoId: $repoId}) \
             RETURN a.path, b.path, r.symbols, r.style, r.line",
            &[("repoId", json!(repo_id))],
        )
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            Some(EdgeLine {
                source: row.first()?.clone().into_string()?,
                target: row.get(1)?.clone().into_string()?,
                kind: "IMPORTS".to_string(),
                metadata: Some(ImportEdgeMeta {
                    symbols: row.get(2).map(|v| v.clone().into_string_vec()).unwrap_or_default(),
                    style: row
                        .get(3)
                        .and_then(|v| v.clone().into_string())
                        .unwrap_or_else(|| "named".to_string()),
                    line: row.get(4).and_then(|v| v.as_i64()).unwrap_or(0) as u32,
                }),
            })
        })
        .collect())
}

async fn fetch_call_edges(
    store: &GraphStore,
    repo_id: &str,
) -> Result<Vec<EdgeLine<CallEdgeMeta>>> {
    let rows = store
        .query(
            "MATCH (a:Symbol {repoId: $repoId})-[r:CALLS]->(b:Symbol {repoId: $repoId}) \
             RETURN a.qualifiedName, b.qualifiedName, r.line, r.count, r.isConditional",
            &[("repoId", json!(repo_id))],
        )
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            Some(EdgeLine {
                source: row.first()?.clone().into_string()?,
                target: row.get(1)?.clone().into_string()?,
                kind: "CALLS".to_string(),
                metadata: Some(CallEdgeMeta {
                    line: row.get(2).and_then(|v| v.as_i64()).unwrap_or(0) as u32,
                    count: row.get(3).and_then(|v| v.as_i64()).unwrap_or(1) as u32,
                    is_conditional: row.get(4).and_then(|v| v.as_bool()).unwrap_or(false),
                }),
            })
        })
        .collect())
}

async fn fetch_define_edges(
    store: &GraphStore,
    repo_id: &str,
) -> Result<Vec<EdgeLine<DefineEdgeMeta>>> {
    let rows = store
        .query(
            "MATCH (f:File {repoId: $repoId})-[r:DEFINES]->(s:Symbol {repoId: $repoId}) \
             RETURN f.path, s.qualifiedName, r.line",
            &[("repoId", json!(repo_id))],
        )
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            Some(EdgeLine {
                source: row.first()?.clone().into_string()?,
                target: row.get(1)?.clone().into_string()?,
                kind: "DEFINES".to_string(),
                metadata: Some(DefineEdgeMeta {
                    line: row.get(2).and_then(|v| v.as_i64()).unwrap_or(0) as u32,
                }),
            })
        })
        .collect())
}

/// Scroll one collection into vector lines. A missing collection is logged
/// and yields an empty shard.
async fn scroll_collection(vector: &VectorStore, collection: &str) -> Result<Vec<VectorLine>> {
    match vector.collection_exists(collection).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(collection, "vector collection missing, writing empty shard");
            return Ok(Vec::new());
        }
        Err(e) => {
            tracing::warn!(collection, error = %e, "vector collection unreachable, writing empty shard");
            return Ok(Vec::new());
        }
    }

    let mut lines = Vec::new();
    let mut offset = None;
    loop {
        let page = vector.scroll(collection, SCROLL_PAGE, offset).await?;
        for point in page.points {
            let mut metadata = point.payload;
            let text = metadata
                .as_object_mut()
                .and_then(|map| {
                    map.remove(crate::vector::store::CHUNK_ID_KEY);
                    map.remove("text")
                })
                .and_then(|v| v.as_str().map(|s| s.to_string()))
                .unwrap_or_default();
            lines.push(VectorLine {
                id: point.id,
                text,
                embedding: point.vector,
                metadata,
            });
        }
        match page.next {
            Some(next) => offset = Some(next),
            None => break,
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_coercion_covers_backend_shapes() {
        let now = "2026-08-01T00:00:00.000Z";
        // Millis integer.
        let iso = coerce_timestamp(&GraphValue::Int(1_700_000_000_000), now);
        assert!(iso.starts_with("2023-11-14T"));
        // Stringified millis.
        let iso = coerce_timestamp(&GraphValue::String("1700000000000".into()), now);
        assert!(iso.starts_with("2023-11-14T"));
        // Already ISO.
        let iso = coerce_timestamp(
            &GraphValue::String("2026-01-02T03:04:05Z".into()),
            now,
        );
        assert_eq!(iso, "2026-01-02T03:04:05Z");
        // Null falls back to now.
        assert_eq!(coerce_timestamp(&GraphValue::Null, now), now);
    }
}
