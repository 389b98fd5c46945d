//! The engine bundle.
//!
//! Dependencies are injected at construction (git workspace, parser set,
//! graph store, optional vector store and embedding chain) and dependency
//! edges point strictly downward: driver → writers → stores. Higher-level
//! features consume this as a read-only façade plus the two sync entry
//! points.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cv_core::{Error, Result, SyncState};

use crate::config::EngineConfig;
use crate::git::GitWorkspace;
use crate::graph::store::{GraphRow, GraphStore};
use crate::graph::GraphWriter;
use crate::hooks;
use crate::identity;
use crate::parser::ParserRegistry;
use crate::storage::hydrate::{self, LoadOptions, LoadResult};
use crate::storage::manifest::Manifest;
use crate::sync::{CancelFlag, SyncDriver, SyncOptions};
use crate::vector::embedding::ProviderChain;
use crate::vector::store::VectorStore;
use crate::vector::writer::VectorWriter;

pub struct Engine {
    config: EngineConfig,
    git: GitWorkspace,
    root: PathBuf,
    repo_id: String,
    parsers: Arc<ParserRegistry>,
    graph: GraphWriter,
    vector: Option<Arc<VectorStore>>,
    embeddings: Option<Arc<ProviderChain>>,
    /// Informal per-tree sync lock; a second sync fails fast.
    sync_lock: tokio::sync::Mutex<()>,
}

impl Engine {
    /// Assemble an engine from its parts.
    pub fn new(
        config: EngineConfig,
        git: GitWorkspace,
        parsers: Arc<ParserRegistry>,
        graph_store: Arc<GraphStore>,
        vector: Option<Arc<VectorStore>>,
        embeddings: Option<Arc<ProviderChain>>,
    ) -> Result<Self> {
        let root = git.root().to_path_buf();
        let repo_id = identity::repo_id(&root)?;
        let graph = GraphWriter::new(graph_store, repo_id.clone());

        Ok(Self {
            config,
            git,
            root,
            repo_id,
            parsers,
            graph,
            vector,
            embeddings,
            sync_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Open a working tree and connect to the backends.
    ///
    /// The graph database is named `cv_<repoId>`. A missing vector backend
    /// or embedding provider degrades to a warning; syncs then run without
    /// embeddings.
    pub async fn connect(root: &Path, config: EngineConfig) -> Result<Self> {
        let git = GitWorkspace::open(root)?;
        let repo_id = identity::repo_id(git.root())?;

        let graph_store = Arc::new(
            GraphStore::connect(
                &config.graph_url,
                identity::graph_name(&repo_id),
                config.connect_timeout,
            )
            .await?,
        );

        let vector = match VectorStore::connect(&config.vector_url, config.probe_timeout).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                tracing::warn!(error = %e, "vector backend unavailable");
                None
            }
        };

        let embeddings = ProviderChain::from_config(&config).await.map(Arc::new);
        if embeddings.is_none() {
            tracing::warn!("no embedding provider configured or probed");
        }

        Self::new(
            config,
            git,
            Arc::new(ParserRegistry::new()),
            graph_store,
            vector,
            embeddings,
        )
    }

    // ── Accessors ──

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    pub fn git(&self) -> &GitWorkspace {
        &self.git
    }

    pub fn parsers(&self) -> &Arc<ParserRegistry> {
        &self.parsers
    }

    pub fn graph(&self) -> &GraphWriter {
        &self.graph
    }

    pub fn vector(&self) -> Option<&Arc<VectorStore>> {
        self.vector.as_ref()
    }

    /// Display name: the working tree's directory name.
    pub fn repo_name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "repository".to_string())
    }

    pub fn remote(&self) -> Option<String> {
        self.git.remote_url("origin")
    }

    /// A vector writer when both a backend and an embedding chain exist.
    pub fn vector_writer(&self) -> Option<VectorWriter> {
        match (&self.vector, &self.embeddings) {
            (Some(store), Some(chain)) => Some(VectorWriter::new(
                Arc::clone(store),
                Arc::clone(chain),
                self.config.embed_batch_size,
            )),
            _ => None,
        }
    }

    // ── Sync ──

    pub async fn full_sync(&self, opts: SyncOptions, cancel: CancelFlag) -> Result<SyncState> {
        let _guard = self
            .sync_lock
            .try_lock()
            .map_err(|_| Error::SyncInProgress)?;
        SyncDriver::new(self, opts, cancel).full_sync().await
    }

    pub async fn incremental_sync(
        &self,
        changed: &[String],
        opts: SyncOptions,
        cancel: CancelFlag,
    ) -> Result<SyncState> {
        let _guard = self
            .sync_lock
            .try_lock()
            .map_err(|_| Error::SyncInProgress)?;
        SyncDriver::new(self, opts, cancel).incremental_sync(changed).await
    }

    // ── Hydration ──

    /// Cold-cache check before a read: replay the on-disk store when the
    /// live graph has nothing for this repo. Returns what was loaded, or
    /// `None` when the graph was already warm.
    pub async fn ensure_loaded(&self, opts: LoadOptions) -> Result<Option<LoadResult>> {
        if hydrate::is_loaded(&self.graph).await? {
            return Ok(None);
        }
        tracing::info!(repo_id = %self.repo_id, "cold cache detected, hydrating from disk");
        self.hydrate(opts).await.map(Some)
    }

    /// Unconditionally replay the on-disk store.
    pub async fn hydrate(&self, opts: LoadOptions) -> Result<LoadResult> {
        hydrate::load(
            &self.root,
            &self.graph,
            self.vector.as_deref(),
            opts,
        )
        .await
    }

    /// The manifest of the on-disk store, if one exists.
    pub fn storage_info(&self) -> Result<Option<Manifest>> {
        hydrate::storage_info(&self.root)
    }

    // ── Queries (pass-through; no query planner) ──

    pub async fn query(
        &self,
        cypher: &str,
        params: &[(&str, serde_json::Value)],
    ) -> Result<Vec<GraphRow>> {
        self.graph.store().query(cypher, params).await
    }

    /// Natural-language search over the code-chunks collection.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        isolate: bool,
    ) -> Result<Vec<crate::vector::VectorHit>> {
        let writer = self.vector_writer().ok_or_else(|| {
            Error::Vector("no vector backend or embedding provider available".into())
        })?;
        let collection = if isolate {
            identity::scoped_collection(&self.repo_id, crate::vector::CODE_CHUNKS_COLLECTION)
        } else {
            crate::vector::CODE_CHUNKS_COLLECTION.to_string()
        };
        writer
            .search(&collection, query, k, &[("repoId", self.repo_id.as_str())])
            .await
    }

    // ── Hooks ──

    pub fn install_hooks(&self) -> Result<()> {
        hooks::install_hooks(&self.root)
    }

    pub fn uninstall_hooks(&self) -> Result<()> {
        hooks::uninstall_hooks(&self.root)
    }
}
