//! Embedding providers.
//!
//! The engine receives vectors from a provider; it does not host models.
//! Provider priority at connect time: a remote aggregator key, then a direct
//! first-party key, then a local model server probed on its well-known port.
//! Permission failures fall through the chain; a dimensionality change is
//! the caller's cue to rebuild the collection and update the manifest.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use cv_core::{Error, Result};

use crate::config::EngineConfig;

/// Permission failure marker; triggers the provider fallback chain.
#[derive(Debug, thiserror::Error)]
#[error("permission denied: {0}")]
pub struct PermissionDenied(pub String);

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    fn dimensions(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut vectors = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("provider returned no embedding"))
    }
}

// ── OpenAI-compatible HTTP providers (aggregator + first-party) ──

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingsDatum>,
}

#[derive(Deserialize)]
struct EmbeddingsDatum {
    embedding: Vec<f32>,
}

/// `POST {base}/embeddings` with a bearer key; both the aggregator and the
/// first-party endpoint speak this shape.
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAiCompatibleProvider {
    pub fn openrouter(api_key: String, timeout: Duration) -> Result<Self> {
        Self::new(
            "openrouter",
            "https://openrouter.ai/api/v1",
            api_key,
            "openai/text-embedding-3-large",
            3072,
            timeout,
        )
    }

    pub fn openai(api_key: String, timeout: Duration) -> Result<Self> {
        Self::new(
            "openai",
            "https://api.openai.com/v1",
            api_key,
            "text-embedding-3-small",
            1536,
            timeout,
        )
    }

    fn new(
        name: &str,
        base_url: &str,
        api_key: String,
        model: &str,
        dims: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Embedding {
                message: format!("http client init failed: {e}"),
                permission: false,
            })?;
        Ok(Self {
            client,
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            dims,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "model": self.model, "input": texts }))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(PermissionDenied(format!("{} ({status}): {body}", self.name)).into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} embedding request failed ({status}): {body}", self.name);
        }

        let parsed: EmbeddingsResponse = response.json().await?;
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

// ── Local model server ──

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Local model server (`/api/embed`), probed on its well-known port.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
}

impl OllamaProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Embedding {
                message: format!("http client init failed: {e}"),
                permission: false,
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: "nomic-embed-text".to_string(),
            dims: 768,
        })
    }

    /// Is a model server listening? Probed with its own short timeout.
    pub async fn probe(base_url: &str, probe_timeout: Duration) -> bool {
        let client = match reqwest::Client::builder().timeout(probe_timeout).build() {
            Ok(client) => client,
            Err(_) => return false,
        };
        let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
        matches!(client.get(url).send().await, Ok(r) if r.status().is_success())
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&serde_json::json!({ "model": self.model, "input": texts }))
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!(
                "local embedding request failed ({})",
                response.status()
            );
        }

        let parsed: OllamaEmbedResponse = response.json().await?;
        Ok(parsed.embeddings)
    }
}

// ── Fallback chain ──

/// Ordered providers with fall-through on permission errors.
///
/// The active provider's model and dimensionality are what the manifest
/// records; when a permission failure advances the chain mid-sync, the
/// caller must compare dimensions and rebuild the collection on change.
pub struct ProviderChain {
    providers: Vec<Arc<dyn EmbeddingProvider>>,
    active: AtomicUsize,
}

impl ProviderChain {
    pub fn new(providers: Vec<Arc<dyn EmbeddingProvider>>) -> Option<Self> {
        if providers.is_empty() {
            None
        } else {
            Some(Self {
                providers,
                active: AtomicUsize::new(0),
            })
        }
    }

    /// Build the chain from configuration: aggregator key, first-party key,
    /// local probe — in that priority. A provider that fails to construct
    /// is skipped with a warning.
    pub async fn from_config(config: &EngineConfig) -> Option<Self> {
        let mut providers: Vec<Arc<dyn EmbeddingProvider>> = Vec::new();
        let mut push = |result: Result<Arc<dyn EmbeddingProvider>>| match result {
            Ok(provider) => providers.push(provider),
            Err(e) => tracing::warn!(error = %e, "skipping embedding provider"),
        };

        if let Some(key) = &config.openrouter_api_key {
            push(
                OpenAiCompatibleProvider::openrouter(key.clone(), config.embed_timeout)
                    .map(|p| Arc::new(p) as Arc<dyn EmbeddingProvider>),
            );
        }
        if let Some(key) = &config.openai_api_key {
            push(
                OpenAiCompatibleProvider::openai(key.clone(), config.embed_timeout)
                    .map(|p| Arc::new(p) as Arc<dyn EmbeddingProvider>),
            );
        }
        if OllamaProvider::probe(&config.ollama_url, config.probe_timeout).await {
            push(
                OllamaProvider::new(&config.ollama_url, config.embed_timeout)
                    .map(|p| Arc::new(p) as Arc<dyn EmbeddingProvider>),
            );
        }

        Self::new(providers)
    }

    pub fn active(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.providers[self.active.load(Ordering::Relaxed).min(self.providers.len() - 1)]
    }

    /// Embed one batch with the active provider, falling through the chain
    /// on permission errors. Returns the vectors and whether a fall-through
    /// happened (dimensionality may have changed).
    pub async fn embed_batch(&self, texts: &[String]) -> Result<(Vec<Vec<f32>>, bool)> {
        let mut switched = false;
        loop {
            let index = self.active.load(Ordering::Relaxed);
            let provider = &self.providers[index];
            match provider.embed_batch(texts).await {
                Ok(vectors) => return Ok((vectors, switched)),
                Err(e) if e.downcast_ref::<PermissionDenied>().is_some() => {
                    if index + 1 >= self.providers.len() {
                        return Err(Error::Embedding {
                            message: format!("{}: {e}", provider.name()),
                            permission: true,
                        });
                    }
                    tracing::warn!(
                        provider = provider.name(),
                        next = self.providers[index + 1].name(),
                        "embedding provider rejected credentials, falling through"
                    );
                    self.active.store(index + 1, Ordering::Relaxed);
                    switched = true;
                }
                Err(e) => {
                    return Err(Error::Embedding {
                        message: format!("{}: {e}", provider.name()),
                        permission: false,
                    })
                }
            }
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let (mut vectors, _) = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        vectors.pop().ok_or_else(|| Error::Embedding {
            message: "provider returned no embedding".into(),
            permission: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider {
        name: &'static str,
        dims: usize,
        deny: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        fn name(&self) -> &str {
            self.name
        }
        fn model(&self) -> &str {
            "fixed"
        }
        fn dimensions(&self) -> usize {
            self.dims
        }
        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            if self.deny {
                return Err(PermissionDenied(self.name.to_string()).into());
            }
            Ok(texts.iter().map(|_| vec![0.0; self.dims]).collect())
        }
    }

    #[tokio::test]
    async fn chain_falls_through_on_permission_error() {
        let chain = ProviderChain::new(vec![
            Arc::new(FixedProvider {
                name: "a",
                dims: 3072,
                deny: true,
            }),
            Arc::new(FixedProvider {
                name: "b",
                dims: 1536,
                deny: false,
            }),
        ])
        .unwrap();

        let (vectors, switched) = chain.embed_batch(&["hello".into()]).await.unwrap();
        assert!(switched);
        assert_eq!(vectors[0].len(), 1536);
        assert_eq!(chain.active().dimensions(), 1536);

        // Subsequent batches stay on the fallback without re-switching.
        let (_, switched) = chain.embed_batch(&["again".into()]).await.unwrap();
        assert!(!switched);
    }

    #[tokio::test]
    async fn exhausted_chain_reports_permission_error() {
        let chain = ProviderChain::new(vec![Arc::new(FixedProvider {
            name: "only",
            dims: 768,
            deny: true,
        })])
        .unwrap();

        let err = chain.embed_batch(&["x".into()]).await.unwrap_err();
        assert!(matches!(err, Error::Embedding { permission: true, .. }));
    }

    #[test]
    fn empty_chain_is_none() {
        assert!(ProviderChain::new(Vec::new()).is_none());
    }
}
