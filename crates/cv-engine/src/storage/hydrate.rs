//! Hydrator: replay the on-disk shards back into the live graph and vector
//! stores.
//!
//! The inverse of the exporter; it never writes to disk. Every upsert is
//! MERGE-style, so hydration is safely repeatable, and the whole pass is
//! keyed by the current `repoId` so shared backends stay isolated.

use std::path::Path;

use cv_core::{
    Error, FileRecord, ImportRecord, ImportStyle, Result, SymbolRecord,
};

use crate::graph::GraphWriter;
use crate::identity;
use crate::storage::manifest::Manifest;
use crate::storage::{
    jsonl, CallEdgeMeta, DefineEdgeMeta, EdgeLine, ImportEdgeMeta, NodeLine, StoreLayout,
    VectorLine, VECTOR_SHARDS,
};
use crate::vector::store::{VectorPoint, VectorStore};

const UPSERT_PAGE: usize = 100;

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Clear this repo's graph data before replaying.
    pub replace: bool,
    pub skip_vectors: bool,
    /// Read collections under their `<repoId>_` prefixed names.
    pub isolate: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LoadResult {
    pub files: usize,
    pub symbols: usize,
    pub edges: usize,
    pub vectors: usize,
}

/// Cold-cache probe: does the live graph already hold this repo's data?
pub async fn is_loaded(graph: &GraphWriter) -> Result<bool> {
    graph.has_repo_data().await
}

/// The manifest describing a repo's on-disk store, if one exists.
pub fn storage_info(root: &Path) -> Result<Option<Manifest>> {
    Manifest::read(&StoreLayout::new(root).manifest_path())
}

/// Replay the on-disk store into the live backends.
pub async fn load(
    root: &Path,
    graph: &GraphWriter,
    vector: Option<&VectorStore>,
    opts: LoadOptions,
) -> Result<LoadResult> {
    let layout = StoreLayout::new(root);
    let manifest = Manifest::read(&layout.manifest_path())?.ok_or_else(|| {
        Error::Storage(format!(
            "no on-disk store under {}; run a sync first",
            layout.dir().display()
        ))
    })?;

    if opts.replace {
        graph.clear().await?;
    }

    let mut result = LoadResult::default();

    // Files before symbols, symbols before edges.
    let files: Vec<NodeLine<FileRecord>> = jsonl::read_shard(&layout.node_shard("files"))?;
    for line in &files {
        graph.upsert_file(&line.data).await?;
    }
    result.files = files.len();

    let symbols: Vec<NodeLine<SymbolRecord>> = jsonl::read_shard(&layout.node_shard("symbols"))?;
    for line in &symbols {
        graph.upsert_symbol(&line.data).await?;
    }
    result.symbols = symbols.len();

    let defines: Vec<EdgeLine<DefineEdgeMeta>> = jsonl::read_shard(&layout.edge_shard("contains"))?;
    for edge in &defines {
        let line = edge.metadata.as_ref().map(|m| m.line).unwrap_or(0);
        graph.edge_defines(&edge.source, &edge.target, line).await?;
        result.edges += 1;
    }

    let imports: Vec<EdgeLine<ImportEdgeMeta>> = jsonl::read_shard(&layout.edge_shard("imports"))?;
    for edge in &imports {
        let meta = edge.metadata.clone().unwrap_or_default();
        let record = ImportRecord {
            source: edge.target.clone(),
            imported_symbols: meta.symbols,
            style: parse_style(&meta.style),
            is_external: false,
            line: meta.line,
        };
        graph.edge_imports(&edge.source, &edge.target, &record).await?;
        result.edges += 1;
    }

    let calls: Vec<EdgeLine<CallEdgeMeta>> = jsonl::read_shard(&layout.edge_shard("calls"))?;
    for edge in &calls {
        let meta = edge.metadata.clone().unwrap_or_default();
        graph
            .edge_calls(
                &edge.source,
                &edge.target,
                meta.line,
                meta.count.max(1),
                meta.is_conditional,
            )
            .await?;
        result.edges += 1;
    }

    if let Some(vector) = vector {
        if !opts.skip_vectors {
            result.vectors = replay_vectors(&layout, vector, graph.repo_id(), opts, &manifest).await?;
        }
    }

    tracing::info!(
        files = result.files,
        symbols = result.symbols,
        edges = result.edges,
        vectors = result.vectors,
        "hydrated live backends from disk"
    );
    Ok(result)
}

/// Replay only the vector shards (e.g. after a vector backend wipe).
pub async fn load_vectors_only(
    root: &Path,
    vector: &VectorStore,
    repo_id: &str,
    opts: LoadOptions,
) -> Result<usize> {
    let layout = StoreLayout::new(root);
    let manifest = Manifest::read(&layout.manifest_path())?.ok_or_else(|| {
        Error::Storage(format!(
            "no on-disk store under {}; run a sync first",
            layout.dir().display()
        ))
    })?;
    replay_vectors(&layout, vector, repo_id, opts, &manifest).await
}

async fn replay_vectors(
    layout: &StoreLayout,
    vector: &VectorStore,
    repo_id: &str,
    opts: LoadOptions,
    manifest: &Manifest,
) -> Result<usize> {
    let mut total = 0;
    for name in VECTOR_SHARDS {
        let lines: Vec<VectorLine> = jsonl::read_shard(&layout.vector_shard(name))?;
        if lines.is_empty() {
            continue;
        }

        // Dimension observed in the first entry wins; the manifest is the
        // fallback for malformed shards.
        let dims = lines
            .first()
            .map(|l| l.embedding.len())
            .filter(|d| *d > 0)
            .unwrap_or(manifest.embedding.dimensions);
        if dims == 0 {
            tracing::warn!(shard = name, "no usable dimensionality, skipping shard");
            continue;
        }

        let collection = if opts.isolate {
            identity::scoped_collection(repo_id, name)
        } else {
            name.to_string()
        };
        vector.ensure_collection(&collection, dims).await?;

        for page in lines.chunks(UPSERT_PAGE) {
            let points: Vec<VectorPoint> = page
                .iter()
                .map(|line| {
                    let mut payload = line.metadata.clone();
                    if let serde_json::Value::Object(ref mut map) = payload {
                        map.insert("text".to_string(), serde_json::json!(line.text));
                        map.entry("repoId".to_string())
                            .or_insert_with(|| serde_json::json!(repo_id));
                    }
                    VectorPoint {
                        id: line.id.clone(),
                        vector: line.embedding.clone(),
                        payload,
                    }
                })
                .collect();
            total += points.len();
            vector.upsert_batch(&collection, points).await?;
        }
    }
    Ok(total)
}

fn parse_style(style: &str) -> ImportStyle {
    match style {
        "default" => ImportStyle::Default,
        "namespace" => ImportStyle::Namespace,
        "side-effect" => ImportStyle::SideEffect,
        _ => ImportStyle::Named,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_parsing_defaults_to_named() {
        assert_eq!(parse_style("namespace"), ImportStyle::Namespace);
        assert_eq!(parse_style("side-effect"), ImportStyle::SideEffect);
        assert_eq!(parse_style("default"), ImportStyle::Default);
        assert_eq!(parse_style("anything"), ImportStyle::Named);
    }

    #[test]
    fn storage_info_absent_store_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(storage_info(dir.path()).unwrap().is_none());
    }
}
