//! Engine configuration.
//!
//! Backend URLs come from explicit configuration, per-backend environment
//! overrides (`CV_FALKORDB_URL`, `CV_QDRANT_URL`, `CV_OLLAMA_URL`), or the
//! well-known localhost defaults that the auto-probe targets.

use std::time::Duration;

use cv_core::Language;

pub const DEFAULT_GRAPH_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_VECTOR_URL: &str = "http://127.0.0.1:6334";
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Exclusions applied to the tracked-file list before parsing. Matched as
/// glob patterns against the repo-relative path.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "node_modules/**",
    "**/node_modules/**",
    "target/**",
    "dist/**",
    "build/**",
    ".next/**",
    "out/**",
    "coverage/**",
    "vendor/**",
    ".venv/**",
    "venv/**",
    "**/__pycache__/**",
    "**/*.pyc",
    "**/*.min.js",
    "**/*.min.css",
    "**/*.bundle.js",
    "**/*.test.*",
    "**/*.spec.*",
    "**/*_test.go",
    "**/test_*.py",
];

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cypher graph backend (RESP protocol).
    pub graph_url: String,
    /// Vector backend (qdrant gRPC endpoint).
    pub vector_url: String,
    /// Local model server probed as the embedding fallback.
    pub ollama_url: String,
    pub openrouter_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    /// Prefix collection names with `<repoId>_` on both write and read.
    pub isolate_collections: bool,
    /// Bounded parse fan-out.
    pub parse_concurrency: usize,
    /// Maximum inputs per embedding request.
    pub embed_batch_size: usize,
    /// Per-probe timeout when checking whether a backend is listening.
    pub probe_timeout: Duration,
    /// Connection-establishment window (retried with exponential backoff).
    pub connect_timeout: Duration,
    /// Per-batch embedding timeout.
    pub embed_timeout: Duration,
    /// When set, only these languages survive enumeration.
    pub include_languages: Option<Vec<Language>>,
    pub exclude_patterns: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            graph_url: DEFAULT_GRAPH_URL.to_string(),
            vector_url: DEFAULT_VECTOR_URL.to_string(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            openrouter_api_key: None,
            openai_api_key: None,
            isolate_collections: false,
            parse_concurrency: 10,
            embed_batch_size: 100,
            probe_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(15),
            embed_timeout: Duration::from_secs(30),
            include_languages: None,
            exclude_patterns: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl EngineConfig {
    /// Defaults layered with the per-backend environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("CV_FALKORDB_URL") {
            config.graph_url = url;
        }
        if let Ok(url) = std::env::var("CV_QDRANT_URL") {
            config.vector_url = url;
        }
        if let Ok(url) = std::env::var("CV_OLLAMA_URL") {
            config.ollama_url = url;
        }
        config.openrouter_api_key = std::env::var("CV_OPENROUTER_API_KEY").ok();
        config.openai_api_key = std::env::var("CV_OPENAI_API_KEY").ok();
        config
    }

    /// True when the repo-relative path matches any exclude pattern.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclude_patterns
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .any(|p| p.matches(path))
    }

    /// True when the language passes the include filter (or no filter is set).
    pub fn language_included(&self, language: Language) -> bool {
        match &self.include_languages {
            Some(list) => list.contains(&language),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_excludes_filter_build_outputs() {
        let config = EngineConfig::default();
        assert!(config.is_excluded("node_modules/react/index.js"));
        assert!(config.is_excluded("packages/app/node_modules/x/y.ts"));
        assert!(config.is_excluded("target/debug/build.rs"));
        assert!(config.is_excluded("src/app.test.ts"));
        assert!(config.is_excluded("static/vendor.min.js"));
        assert!(!config.is_excluded("src/app.ts"));
        assert!(!config.is_excluded("src/testing_utils.py"));
    }

    #[test]
    fn language_filter() {
        let mut config = EngineConfig::default();
        assert!(config.language_included(Language::Go));
        config.include_languages = Some(vec![Language::TypeScript, Language::Python]);
        assert!(config.language_included(Language::Python));
        assert!(!config.language_included(Language::Go));
    }
}
