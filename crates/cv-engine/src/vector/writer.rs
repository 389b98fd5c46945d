//! Vector writer: chunk preparation, batched embedding, and upserts into
//! the code-chunks collection.
//!
//! Batching is the throughput lever here — embed requests are grouped into
//! batches of at most 100 inputs and awaited in sequence, not fanned out.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use cv_core::{Chunk, Error, ParsedFile, Result};

use crate::vector::embedding::ProviderChain;
use crate::vector::store::{VectorHit, VectorPoint, VectorStore};

pub const CODE_CHUNKS_COLLECTION: &str = "code_chunks";

/// What a completed embedding pass recorded, for the manifest.
#[derive(Debug, Clone)]
pub struct EmbeddingRun {
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    pub vectors: usize,
}

pub struct VectorWriter {
    store: Arc<VectorStore>,
    chain: Arc<ProviderChain>,
    batch_size: usize,
}

impl VectorWriter {
    pub fn new(store: Arc<VectorStore>, chain: Arc<ProviderChain>, batch_size: usize) -> Self {
        Self {
            store,
            chain,
            batch_size: batch_size.clamp(1, 100),
        }
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    /// Comment-context header prepended to a chunk before embedding.
    fn prepare_text(chunk: &Chunk, language: &str, docstring: Option<&str>) -> String {
        let mut header = format!("// language: {language} | file: {}", chunk.file);
        if let Some(symbol) = &chunk.symbol {
            header.push_str(&format!(" | symbol: {symbol}"));
        }
        let mut text = header;
        if let Some(doc) = docstring {
            for line in doc.lines() {
                text.push_str("\n// ");
                text.push_str(line);
            }
        }
        text.push('\n');
        text.push_str(&chunk.text);
        text
    }

    /// Embed every chunk of the parsed files and upsert them into
    /// `collection`, stamped with `repo_id`.
    ///
    /// When a provider fall-through changes the dimensionality mid-pass, the
    /// collection is rebuilt at the new dimension and the pass restarts, so
    /// a single collection never mixes dimensionalities.
    pub async fn write_files(
        &self,
        collection: &str,
        files: &[ParsedFile],
        repo_id: &str,
    ) -> Result<EmbeddingRun> {
        // Docstrings ride with their symbol's chunk as comment context.
        let mut prepared: Vec<(String, String, serde_json::Value)> = Vec::new();
        for file in files {
            let language = file
                .language
                .map(|l| l.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let docs: HashMap<&str, &str> = file
                .symbols
                .iter()
                .filter_map(|s| {
                    s.docstring
                        .as_deref()
                        .map(|d| (s.qualified_name.as_str(), d))
                })
                .collect();
            for chunk in &file.chunks {
                let docstring = chunk
                    .symbol
                    .as_deref()
                    .and_then(|symbol| docs.get(symbol).copied());
                // The raw chunk text rides in the payload so the exporter can
                // round-trip it to disk without re-reading the working tree.
                let payload = json!({
                    "file": chunk.file,
                    "startLine": chunk.start_line,
                    "endLine": chunk.end_line,
                    "language": language,
                    "symbol": chunk.symbol,
                    "kind": chunk.kind.to_string(),
                    "repoId": repo_id,
                    "text": chunk.text,
                });
                prepared.push((
                    chunk.id(),
                    Self::prepare_text(chunk, &language, docstring),
                    payload,
                ));
            }
        }

        let mut attempts = 0;
        'pass: loop {
            let dims = self.chain.active().dimensions();
            self.store.ensure_collection(collection, dims).await?;

            let mut written = 0;
            for batch in prepared.chunks(self.batch_size) {
                let texts: Vec<String> = batch.iter().map(|(_, text, _)| text.clone()).collect();
                let (vectors, switched) = self.chain.embed_batch(&texts).await?;

                if switched && self.chain.active().dimensions() != dims {
                    attempts += 1;
                    if attempts > 3 {
                        return Err(Error::Embedding {
                            message: "provider chain kept changing dimensionality".into(),
                            permission: false,
                        });
                    }
                    self.store
                        .rebuild_collection(collection, self.chain.active().dimensions())
                        .await?;
                    continue 'pass;
                }

                if vectors.len() != batch.len() {
                    return Err(Error::Embedding {
                        message: format!(
                            "provider returned {} vectors for {} inputs",
                            vectors.len(),
                            batch.len()
                        ),
                        permission: false,
                    });
                }

                let points: Vec<VectorPoint> = batch
                    .iter()
                    .zip(vectors)
                    .map(|((id, _, payload), vector)| VectorPoint {
                        id: id.clone(),
                        vector,
                        payload: payload.clone(),
                    })
                    .collect();
                written += points.len();
                self.store.upsert_batch(collection, points).await?;
            }

            let provider = self.chain.active();
            return Ok(EmbeddingRun {
                provider: provider.name().to_string(),
                model: provider.model().to_string(),
                dimensions: provider.dimensions(),
                vectors: written,
            });
        }
    }

    /// Natural-language search over a collection: embed the query text and
    /// run k-NN with an optional payload filter.
    pub async fn search(
        &self,
        collection: &str,
        query: &str,
        k: usize,
        filter: &[(&str, &str)],
    ) -> Result<Vec<VectorHit>> {
        let vector = self.chain.embed(query).await?;
        self.store.search(collection, vector, k, filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::ChunkKind;

    #[test]
    fn prepared_text_carries_context_header() {
        let chunk = Chunk {
            file: "src/auth.ts".into(),
            start_line: 10,
            end_line: 20,
            text: "function login() {}".into(),
            symbol: Some("src/auth.ts:login".into()),
            kind: ChunkKind::Code,
        };
        let text = VectorWriter::prepare_text(&chunk, "typescript", Some("Logs a user in."));
        assert!(text.starts_with("// language: typescript | file: src/auth.ts | symbol: src/auth.ts:login"));
        assert!(text.contains("// Logs a user in."));
        assert!(text.ends_with("function login() {}"));
    }
}
