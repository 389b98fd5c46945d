//! Graph writer: translates parsed files into File/Symbol nodes and
//! DEFINES/IMPORTS/CALLS edges.
//!
//! All writes are idempotent (`MERGE … SET`) and stamped with the current
//! `repoId` so many repositories can share one backend. Edge statements
//! `MATCH` both endpoints first: an endpoint missing at write time makes the
//! statement a silent no-op, which is exactly the dangling-edge policy.

use std::sync::Arc;

use serde_json::json;

use cv_core::{FileRecord, GraphStats, ImportRecord, Result, SymbolRecord};

use super::store::GraphStore;

pub struct GraphWriter {
    store: Arc<GraphStore>,
    repo_id: String,
}

impl GraphWriter {
    pub fn new(store: Arc<GraphStore>, repo_id: impl Into<String>) -> Self {
        Self {
            store,
            repo_id: repo_id.into(),
        }
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    pub async fn upsert_file(&self, file: &FileRecord) -> Result<()> {
        self.store
            .query(
                "MERGE (f:File {path: $path, repoId: $repoId}) \
                 SET f.language = $language, f.size = $size, f.hash = $hash, \
                     f.lastModified = $lastModified, f.loc = $loc, f.complexity = $complexity",
                &[
                    ("path", json!(file.path)),
                    ("repoId", json!(self.repo_id)),
                    ("language", json!(file.language)),
                    ("size", json!(file.size)),
                    ("hash", json!(file.hash)),
                    ("lastModified", json!(file.last_modified)),
                    ("loc", json!(file.loc)),
                    ("complexity", json!(file.complexity)),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn upsert_symbol(&self, sym: &SymbolRecord) -> Result<()> {
        // Parameters flatten to `name: type` strings; graph properties hold
        // primitives and primitive arrays only.
        let parameters: Vec<String> = sym
            .parameters
            .iter()
            .map(|p| match &p.type_hint {
                Some(hint) => format!("{}: {hint}", p.name),
                None => p.name.clone(),
            })
            .collect();

        self.store
            .query(
                "MERGE (s:Symbol {qualifiedName: $qualifiedName, repoId: $repoId}) \
                 SET s.name = $name, s.kind = $kind, s.file = $file, \
                     s.startLine = $startLine, s.endLine = $endLine, \
                     s.signature = $signature, s.docstring = $docstring, \
                     s.returnType = $returnType, s.parameters = $parameters, \
                     s.visibility = $visibility, s.isAsync = $isAsync, \
                     s.isStatic = $isStatic, s.complexity = $complexity",
                &[
                    ("qualifiedName", json!(sym.qualified_name)),
                    ("repoId", json!(self.repo_id)),
                    ("name", json!(sym.name)),
                    ("kind", json!(sym.kind.to_string())),
                    ("file", json!(sym.file)),
                    ("startLine", json!(sym.start_line)),
                    ("endLine", json!(sym.end_line)),
                    ("signature", json!(sym.signature)),
                    ("docstring", json!(sym.docstring)),
                    ("returnType", json!(sym.return_type)),
                    ("parameters", json!(parameters)),
                    ("visibility", json!(sym.visibility.to_string())),
                    ("isAsync", json!(sym.is_async)),
                    ("isStatic", json!(sym.is_static)),
                    ("complexity", json!(sym.complexity)),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn edge_defines(&self, file: &str, qualified_name: &str, line: u32) -> Result<()> {
        self.store
            .query(
                "MATCH (f:File {path: $file, repoId: $repoId}), \
                       (s:Symbol {qualifiedName: $qname, repoId: $repoId}) \
                 MERGE (f)-[r:DEFINES]->(s) SET r.line = $line",
                &[
                    ("file", json!(file)),
                    ("qname", json!(qualified_name)),
                    ("repoId", json!(self.repo_id)),
                    ("line", json!(line)),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn edge_imports(
        &self,
        src_file: &str,
        dst_file: &str,
        import: &ImportRecord,
    ) -> Result<()> {
        self.store
            .query(
                "MATCH (a:File {path: $src, repoId: $repoId}), \
                       (b:File {path: $dst, repoId: $repoId}) \
                 MERGE (a)-[r:IMPORTS]->(b) \
                 SET r.symbols = $symbols, r.style = $style, r.line = $line",
                &[
                    ("src", json!(src_file)),
                    ("dst", json!(dst_file)),
                    ("repoId", json!(self.repo_id)),
                    ("symbols", json!(import.imported_symbols)),
                    ("style", json!(import.style.to_string())),
                    ("line", json!(import.line)),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn edge_calls(
        &self,
        src_qname: &str,
        dst_qname: &str,
        line: u32,
        count: u32,
        is_conditional: bool,
    ) -> Result<()> {
        self.store
            .query(
                "MATCH (a:Symbol {qualifiedName: $src, repoId: $repoId}), \
                       (b:Symbol {qualifiedName: $dst, repoId: $repoId}) \
                 MERGE (a)-[r:CALLS]->(b) \
                 SET r.line = $line, r.count = $count, r.isConditional = $isConditional",
                &[
                    ("src", json!(src_qname)),
                    ("dst", json!(dst_qname)),
                    ("repoId", json!(self.repo_id)),
                    ("line", json!(line)),
                    ("count", json!(count)),
                    ("isConditional", json!(is_conditional)),
                ],
            )
            .await?;
        Ok(())
    }

    /// Remove every node and edge belonging to this repo.
    pub async fn clear(&self) -> Result<()> {
        self.store
            .query(
                "MATCH (n {repoId: $repoId}) DETACH DELETE n",
                &[("repoId", json!(self.repo_id))],
            )
            .await?;
        Ok(())
    }

    /// Live counts for this repo, read back after writes.
    pub async fn stats(&self) -> Result<GraphStats> {
        let params = [("repoId", json!(self.repo_id))];

        let count = |rows: Vec<Vec<super::store::GraphValue>>| {
            rows.first()
                .and_then(|row| row.first())
                .and_then(|v| v.as_i64())
                .unwrap_or(0) as usize
        };

        let files = count(
            self.store
                .query("MATCH (f:File {repoId: $repoId}) RETURN count(f)", &params)
                .await?,
        );
        let symbols = count(
            self.store
                .query(
                    "MATCH (s:Symbol {repoId: $repoId}) RETURN count(s)",
                    &params,
                )
                .await?,
        );
        let relationships = count(
            self.store
                .query(
                    "MATCH (a {repoId: $repoId})-[r]->(b {repoId: $repoId}) RETURN count(r)",
                    &params,
                )
                .await?,
        );

        Ok(GraphStats {
            files,
            symbols,
            relationships,
        })
    }

    /// True when any File node carries this repo's id — the cold-cache probe.
    pub async fn has_repo_data(&self) -> Result<bool> {
        let rows = self
            .store
            .query(
                "MATCH (f:File {repoId: $repoId}) RETURN count(f)",
                &[("repoId", json!(self.repo_id))],
            )
            .await?;
        Ok(rows
            .first()
            .and_then(|row| row.first())
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
            > 0)
    }

    /// `(file, shortName, qualifiedName)` for every symbol of this repo in
    /// the live graph. Incremental syncs rebuild the resolution index from
    /// this plus the freshly parsed files.
    pub async fn all_symbols(&self) -> Result<Vec<(String, String, String)>> {
        let rows = self
            .store
            .query(
                "MATCH (s:Symbol {repoId: $repoId}) \
                 RETURN s.file, s.name, s.qualifiedName",
                &[("repoId", json!(self.repo_id))],
            )
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|mut row| {
                if row.len() != 3 {
                    return None;
                }
                let qname = row.pop()?.into_string()?;
                let name = row.pop()?.into_string()?;
                let file = row.pop()?.into_string()?;
                Some((file, name, qname))
            })
            .collect())
    }

    /// Delete the symbols (and their edges) defined in one file, ahead of
    /// re-parsing it during an incremental sync.
    pub async fn delete_file_symbols(&self, file: &str) -> Result<()> {
        self.store
            .query(
                "MATCH (s:Symbol {file: $file, repoId: $repoId}) DETACH DELETE s",
                &[("file", json!(file)), ("repoId", json!(self.repo_id))],
            )
            .await?;
        Ok(())
    }

    /// Delete a File node and everything it defines, for files removed from
    /// the working tree.
    pub async fn delete_file(&self, file: &str) -> Result<()> {
        self.delete_file_symbols(file).await?;
        self.store
            .query(
                "MATCH (f:File {path: $file, repoId: $repoId}) DETACH DELETE f",
                &[("file", json!(file)), ("repoId", json!(self.repo_id))],
            )
            .await?;
        Ok(())
    }
}
