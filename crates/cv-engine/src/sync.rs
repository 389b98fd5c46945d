//! Sync driver: full and incremental sync entry points.
//!
//! Stage order within a sync is fixed: Files before Symbols, Symbols before
//! DEFINES, DEFINES before IMPORTS, IMPORTS before CALLS, CALLS before
//! vector embedding, everything before export. Parse failures are per-file
//! sync errors; graph and export failures abort the sync with the stage
//! name attached; vector failures degrade to a warning.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use cv_core::{
    Error, FileRecord, ParsedFile, Result, SyncError, SyncStage, SyncState,
};

use crate::engine::Engine;
use crate::graph::ResolutionIndex;
use crate::identity;
use crate::storage::export::{export, now_iso, ExportContext};
use crate::storage::manifest::EmbeddingInfo;
use crate::storage::StoreLayout;
use crate::vector::writer::EmbeddingRun;
use crate::vector::CODE_CHUNKS_COLLECTION;

/// Cooperative cancellation flag, checked at every suspension point.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Skip the embedding stage even when a provider is available.
    pub skip_vectors: bool,
    /// Prefix vector collection names with `<repoId>_`.
    pub isolate: bool,
}

/// One sync pass over a working tree. Constructed per call by the engine;
/// concurrent syncs on the same tree fail fast at the engine's lock.
pub struct SyncDriver<'a> {
    engine: &'a Engine,
    opts: SyncOptions,
    cancel: CancelFlag,
}

impl<'a> SyncDriver<'a> {
    pub fn new(engine: &'a Engine, opts: SyncOptions, cancel: CancelFlag) -> Self {
        Self {
            engine,
            opts,
            cancel,
        }
    }

    /// Full sync: enumerate, parse, write graph + vectors, export.
    pub async fn full_sync(&self) -> Result<SyncState> {
        let started = Instant::now();

        // ── Enumerate ──
        self.cancel.check()?;
        let tracked = self
            .engine
            .git()
            .tracked_files()
            .map_err(|e| e.at_stage(SyncStage::Enumerate))?;
        let survivors = self.filter_paths(&tracked);
        tracing::info!(
            tracked = tracked.len(),
            survivors = survivors.len(),
            "enumerated working tree"
        );

        let (parsed, mut errors) = self.parse_stage(&survivors).await?;
        let state = self
            .write_stages(parsed, &tracked, &mut errors, true, started)
            .await?;
        Ok(state)
    }

    /// Incremental sync: the same pipeline restricted to the changed list.
    ///
    /// Symbols of each changed file are dropped and re-written; files gone
    /// from the working tree lose their nodes. Call-resolution indices are
    /// rebuilt from the whole live graph plus the new parse results, so a
    /// change in one file can resolve calls into unchanged files.
    pub async fn incremental_sync(&self, changed: &[String]) -> Result<SyncState> {
        let started = Instant::now();

        self.cancel.check()?;
        let tracked = self
            .engine
            .git()
            .tracked_files()
            .map_err(|e| e.at_stage(SyncStage::Enumerate))?;
        let changed_survivors = self.filter_paths(changed);

        // Deleted files drop out of the graph before re-writes.
        let root = self.engine.root();
        let mut to_parse = Vec::new();
        for path in &changed_survivors {
            if root.join(path).exists() {
                to_parse.push(path.clone());
            } else {
                self.engine
                    .graph()
                    .delete_file(path)
                    .await
                    .map_err(|e| e.at_stage(SyncStage::GraphWrite))?;
            }
        }

        let (parsed, mut errors) = self.parse_stage(&to_parse).await?;

        for file in &parsed {
            self.engine
                .graph()
                .delete_file_symbols(&file.path)
                .await
                .map_err(|e| e.at_stage(SyncStage::GraphWrite))?;
        }

        let state = self
            .write_stages(parsed, &tracked, &mut errors, false, started)
            .await?;
        Ok(state)
    }

    fn filter_paths(&self, paths: &[String]) -> Vec<String> {
        let config = self.engine.config();
        let registry = self.engine.parsers();
        paths
            .iter()
            .filter(|path| !config.is_excluded(path))
            .filter(|path| match registry.language_of(path) {
                Some(language) => config.language_included(language),
                None => false,
            })
            .cloned()
            .collect()
    }

    /// Read and parse the given repo-relative paths with bounded fan-out.
    async fn parse_stage(&self, paths: &[String]) -> Result<(Vec<ParsedFile>, Vec<SyncError>)> {
        self.cancel.check().map_err(|e| e.at_stage(SyncStage::Parse))?;
        let root = self.engine.root();

        let mut inputs = Vec::with_capacity(paths.len());
        let mut errors = Vec::new();
        for path in paths {
            match tokio::fs::read(root.join(path)).await {
                Ok(bytes) => match String::from_utf8(bytes) {
                    Ok(content) => inputs.push((path.clone(), content)),
                    Err(_) => {
                        tracing::debug!(file = %path, "skipping non-UTF-8 file");
                        errors.push(SyncError {
                            file: path.clone(),
                            message: "not valid UTF-8".into(),
                        });
                    }
                },
                Err(e) => errors.push(SyncError {
                    file: path.clone(),
                    message: format!("read failed: {e}"),
                }),
            }
        }

        let (parsed, parse_errors) = self
            .engine
            .parsers()
            .parse_batch(
                inputs,
                self.engine.config().parse_concurrency,
                self.cancel.clone(),
            )
            .await
            .map_err(|e| e.at_stage(SyncStage::Parse))?;
        errors.extend(parse_errors);
        Ok((parsed, errors))
    }

    /// Stages 5–10: graph writes, vectors, export, sync state.
    async fn write_stages(
        &self,
        parsed: Vec<ParsedFile>,
        tracked: &[String],
        errors: &mut Vec<SyncError>,
        full: bool,
        started: Instant,
    ) -> Result<SyncState> {
        let graph = self.engine.graph();

        // Blob hashes degrade to empty per file when the index read fails.
        let hashes: HashMap<String, String> = match self.engine.git().blob_hashes() {
            Ok(pairs) => pairs.into_iter().collect(),
            Err(e) => {
                tracing::warn!(error = %e, "blob hashes unavailable, files get empty hashes");
                HashMap::new()
            }
        };

        // ── GraphWrite: files, then symbols + DEFINES ──
        self.cancel.check()?;
        for file in &parsed {
            let record = self.file_record(file, &hashes);
            graph
                .upsert_file(&record)
                .await
                .map_err(|e| e.at_stage(SyncStage::GraphWrite))?;
        }

        for file in &parsed {
            self.cancel.check()?;
            for sym in &file.symbols {
                graph
                    .upsert_symbol(sym)
                    .await
                    .map_err(|e| e.at_stage(SyncStage::GraphWrite))?;
                graph
                    .edge_defines(&file.path, &sym.qualified_name, sym.start_line)
                    .await
                    .map_err(|e| e.at_stage(SyncStage::GraphWrite))?;
            }
        }

        // ── Resolution indices ──
        let mut index = ResolutionIndex::new();
        if !full {
            let live = graph
                .all_symbols()
                .await
                .map_err(|e| e.at_stage(SyncStage::GraphWrite))?;
            for (file, name, qname) in live {
                index.add_file(&file);
                index.add_symbol(&file, &name, &qname);
            }
        }
        for path in tracked {
            index.add_file(path);
        }
        for file in &parsed {
            index.add_parsed_file(file);
        }

        // ── IMPORTS (local, in-graph targets only) ──
        for file in &parsed {
            self.cancel.check()?;
            for import in file.imports.iter().filter(|i| !i.is_external) {
                if let Some(target) = index.resolve_import(&file.path, import) {
                    graph
                        .edge_imports(&file.path, &target, import)
                        .await
                        .map_err(|e| e.at_stage(SyncStage::GraphWrite))?;
                }
            }
        }

        // ── CALLS, aggregated per (source, target) ──
        for file in &parsed {
            self.cancel.check()?;
            for sym in &file.symbols {
                // line of the first site, count of sites, conditional if any
                // site is.
                let mut aggregated: HashMap<String, (u32, u32, bool)> = HashMap::new();
                let mut order: Vec<String> = Vec::new();
                for call in &sym.calls {
                    let Some(target) = index.resolve_call(&file.path, &call.callee) else {
                        continue;
                    };
                    if target == sym.qualified_name {
                        continue;
                    }
                    let entry = aggregated.entry(target.clone()).or_insert_with(|| {
                        order.push(target.clone());
                        (call.line, 0, false)
                    });
                    entry.1 += 1;
                    entry.2 |= call.is_conditional;
                }
                for target in order {
                    let (line, count, is_conditional) = aggregated[&target];
                    graph
                        .edge_calls(&sym.qualified_name, &target, line, count, is_conditional)
                        .await
                        .map_err(|e| e.at_stage(SyncStage::GraphWrite))?;
                }
            }
        }

        // ── VectorWrite (non-fatal) ──
        let embedding_run = self.vector_stage(&parsed, errors).await?;

        // ── Read-back + Export ──
        self.cancel.check()?;
        let stats = graph
            .stats()
            .await
            .map_err(|e| e.at_stage(SyncStage::GraphWrite))?;

        let duration_ms = started.elapsed().as_millis() as u64;
        let export_result = export(ExportContext {
            root: self.engine.root(),
            graph,
            vector: self.engine.vector().map(|v| v.as_ref()),
            isolate: self.opts.isolate,
            repo_name: self.engine.repo_name(),
            remote: self.engine.remote(),
            embedding: embedding_run.as_ref().map(|run| EmbeddingInfo {
                provider: run.provider.clone(),
                model: run.model.clone(),
                dimensions: run.dimensions,
            }),
            duration_ms,
            cancel: self.cancel.clone(),
        })
        .await?;

        // ── Sync state ──
        let now = now_iso();
        let layout = StoreLayout::new(self.engine.root());
        let previous = layout.read_sync_state()?.unwrap_or_default();

        let mut languages = previous.languages.clone();
        if full {
            languages.clear();
        }
        for file in &parsed {
            if let Some(language) = file.language {
                *languages.entry(language.to_string()).or_insert(0) += 1;
            }
        }

        let state = SyncState {
            last_full_sync: if full {
                Some(now.clone())
            } else {
                previous.last_full_sync.clone()
            },
            last_incremental_sync: if full {
                previous.last_incremental_sync.clone()
            } else {
                Some(now.clone())
            },
            last_commit_synced: self
                .engine
                .git()
                .head_hash()
                .unwrap_or(None),
            files: stats.files,
            symbols: stats.symbols,
            relationships: stats.relationships,
            vectors: export_result.vectors,
            languages,
            duration_ms,
            errors: std::mem::take(errors),
        };
        layout.write_sync_state(&state)?;

        tracing::info!(
            files = state.files,
            symbols = state.symbols,
            relationships = state.relationships,
            vectors = state.vectors,
            duration_ms,
            "sync complete"
        );
        Ok(state)
    }

    /// The embedding stage. Missing provider/backend and top-level vector
    /// failures degrade to warnings; the sync completes without embeddings.
    async fn vector_stage(
        &self,
        parsed: &[ParsedFile],
        errors: &mut Vec<SyncError>,
    ) -> Result<Option<EmbeddingRun>> {
        self.cancel.check()?;
        if self.opts.skip_vectors {
            return Ok(None);
        }
        let Some(writer) = self.engine.vector_writer() else {
            tracing::warn!("no vector backend or embedding provider; syncing without embeddings");
            return Ok(None);
        };

        let collection = if self.opts.isolate {
            identity::scoped_collection(self.engine.repo_id(), CODE_CHUNKS_COLLECTION)
        } else {
            CODE_CHUNKS_COLLECTION.to_string()
        };

        match writer
            .write_files(&collection, parsed, self.engine.repo_id())
            .await
        {
            Ok(run) => Ok(Some(run)),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, "vector stage failed; sync continues without embeddings");
                errors.push(SyncError {
                    file: String::new(),
                    message: format!("{}: {e}", SyncStage::VectorWrite),
                });
                Ok(None)
            }
        }
    }

    fn file_record(&self, file: &ParsedFile, hashes: &HashMap<String, String>) -> FileRecord {
        let root = self.engine.root();
        let metadata = std::fs::metadata(root.join(&file.path)).ok();
        let last_modified = metadata
            .as_ref()
            .and_then(|m| m.modified().ok())
            .map(|t| {
                chrono::DateTime::<chrono::Utc>::from(t)
                    .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
            })
            .unwrap_or_else(now_iso);

        FileRecord {
            path: file.path.clone(),
            language: file
                .language
                .map(|l| l.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            size: file.content.len() as u64,
            hash: hashes.get(&file.path).cloned().unwrap_or_default(),
            last_modified,
            loc: file.content.lines().count() as u32,
            complexity: file.symbols.iter().map(|s| s.complexity).sum(),
        }
    }
}
