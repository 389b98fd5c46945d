//! Central registry mapping file extensions to language parsers, plus the
//! bounded-parallel dispatch used by the sync driver.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;

use cv_core::{Error, Language, ParsedFile, Result, SyncError};

use super::LanguageParser;
use crate::sync::CancelFlag;

/// Maps file extensions to their language parsers.
///
/// Each parser is wrapped in an `Arc` so multiple extensions (e.g. "ts" and
/// "tsx") share the same parser instance without cloning.
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn LanguageParser>>,
}

impl ParserRegistry {
    /// Create a new registry with all built-in language parsers registered.
    pub fn new() -> Self {
        let mut parsers: HashMap<String, Arc<dyn LanguageParser>> = HashMap::new();

        let all: Vec<Arc<dyn LanguageParser>> = vec![
            Arc::new(super::typescript::TypeScriptParser::new()),
            Arc::new(super::python::PythonParser::new()),
            Arc::new(super::rust::RustParser::new()),
            Arc::new(super::go::GoParser::new()),
            Arc::new(super::java::JavaParser::new()),
        ];

        for parser in all {
            for ext in parser.extensions() {
                parsers.insert(ext.to_string(), Arc::clone(&parser));
            }
        }

        Self { parsers }
    }

    /// Return `true` if the file extension is handled by a registered parser.
    pub fn supports_path(&self, path: &str) -> bool {
        std::path::Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.parsers.contains_key(ext))
            .unwrap_or(false)
    }

    /// Languages a path detects to, without parsing.
    pub fn language_of(&self, path: &str) -> Option<Language> {
        std::path::Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Language::from_extension)
    }

    /// Parse a source file, selecting the parser by file extension unless an
    /// explicit language override is given.
    ///
    /// Returns `Error::UnsupportedLanguage` when no parser is registered for
    /// the extension (or the path has no extension).
    pub fn parse_file(
        &self,
        path: &str,
        source: &str,
        language: Option<Language>,
    ) -> Result<ParsedFile> {
        let parser = match language {
            // One parser can serve several languages (TypeScript also covers
            // JavaScript), so an override is resolved through the extension
            // table rather than the parser's primary language.
            Some(language) => self
                .parsers
                .iter()
                .find(|(ext, _)| Language::from_extension(ext) == Some(language))
                .map(|(_, parser)| parser)
                .ok_or_else(|| Error::UnsupportedLanguage(language.to_string()))?,
            None => {
                super::detect_language(path)?;
                let ext = std::path::Path::new(path)
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or_default();
                self.parsers
                    .get(ext)
                    .ok_or_else(|| Error::UnsupportedLanguage(ext.to_string()))?
            }
        };

        parser.parse(path, source)
    }

    /// Parse many files with bounded parallelism.
    ///
    /// Parsing is CPU-bound and runs on the blocking pool; at most
    /// `concurrency` files are in flight at once. A failure on a single file
    /// becomes a sync error for that path, never a failure of the batch.
    pub async fn parse_batch(
        self: &Arc<Self>,
        files: Vec<(String, String)>,
        concurrency: usize,
        cancel: CancelFlag,
    ) -> Result<(Vec<ParsedFile>, Vec<SyncError>)> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut handles = Vec::with_capacity(files.len());

        for (path, source) in files {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| Error::Cancelled)?;
            let registry = Arc::clone(self);
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let result = registry.parse_file(&path, &source, None);
                (path, result)
            }));
        }

        let mut parsed = Vec::new();
        let mut errors = Vec::new();
        for handle in handles {
            let (path, result) = handle
                .await
                .map_err(|e| Error::Parse {
                    file: String::new(),
                    message: format!("parser task panicked: {e}"),
                })?;
            match result {
                Ok(file) => parsed.push(file),
                Err(e) => {
                    tracing::warn!(file = %path, error = %e, "skipping unparseable file");
                    errors.push(SyncError {
                        file: path,
                        message: e.to_string(),
                    });
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok((parsed, errors))
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_all_extensions() {
        let registry = ParserRegistry::new();
        for path in ["a.ts", "a.tsx", "a.js", "a.jsx", "a.py", "a.rs", "a.go", "A.java"] {
            assert!(registry.supports_path(path), "missing parser for {path}");
        }
        assert!(!registry.supports_path("a.rb"));
        assert!(!registry.supports_path("Makefile"));
    }

    #[test]
    fn parse_file_refuses_unknown_extension() {
        let registry = ParserRegistry::new();
        let err = registry.parse_file("notes.txt", "hello", None).unwrap_err();
        assert!(matches!(err, Error::UnsupportedLanguage(_)));
    }

    #[tokio::test]
    async fn parse_batch_records_per_file_errors() {
        let registry = Arc::new(ParserRegistry::new());
        let files = vec![
            ("good.rs".to_string(), "pub fn ok() {}".to_string()),
            ("bad.xyz".to_string(), "???".to_string()),
        ];
        let (parsed, errors) = registry
            .parse_batch(files, 4, CancelFlag::default())
            .await
            .unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].file, "bad.xyz");
    }

    #[tokio::test]
    async fn parse_batch_honours_cancellation() {
        let registry = Arc::new(ParserRegistry::new());
        let cancel = CancelFlag::default();
        cancel.cancel();
        let files = vec![("a.rs".to_string(), "fn a() {}".to_string())];
        let err = registry.parse_batch(files, 2, cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
