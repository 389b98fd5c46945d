use thiserror::Error;

use crate::types::SyncStage;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Graph backend error: {0}")]
    Graph(String),

    #[error("Vector backend error: {0}")]
    Vector(String),

    #[error("Embedding provider error: {message}")]
    Embedding {
        message: String,
        /// Permission failures trigger the provider fallback chain.
        permission: bool,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cancelled")]
    Cancelled,

    #[error("A sync is already running for this working tree")]
    SyncInProgress,

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: SyncStage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with the sync stage it occurred in.
    ///
    /// `Cancelled` passes through unwrapped so callers can always match on
    /// it directly, and an already-staged error keeps its original stage.
    pub fn at_stage(self, stage: SyncStage) -> Error {
        match self {
            Error::Cancelled => Error::Cancelled,
            Error::Stage { .. } => self,
            other => Error::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// One-line remediation hint for user-visible failures, when one exists.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Error::Graph(_) => Some(
                "start the graph backend (e.g. `docker run -p 6379:6379 falkordb/falkordb`) or set CV_FALKORDB_URL",
            ),
            Error::Vector(_) => Some(
                "start the vector backend (e.g. `docker run -p 6334:6334 qdrant/qdrant`) or set CV_QDRANT_URL",
            ),
            Error::Embedding { .. } => Some(
                "set CV_OPENROUTER_API_KEY / CV_OPENAI_API_KEY, or run a local model server on port 11434",
            ),
            Error::Git(_) => Some("run inside a Git working tree (`git init` if needed)"),
            Error::Storage(_) => Some("run a full sync to rebuild the on-disk store"),
            Error::Stage { source, .. } => source.hint(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_stage_wraps_once() {
        let err = Error::Graph("boom".into()).at_stage(SyncStage::GraphWrite);
        let err = err.at_stage(SyncStage::Export);
        match err {
            Error::Stage { stage, .. } => assert_eq!(stage, SyncStage::GraphWrite),
            other => panic!("expected staged error, got {other}"),
        }
    }

    #[test]
    fn cancelled_is_never_staged() {
        let err = Error::Cancelled.at_stage(SyncStage::Parse);
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn staged_hint_comes_from_source() {
        let err = Error::Graph("down".into()).at_stage(SyncStage::GraphWrite);
        assert!(err.hint().unwrap().contains("graph backend"));
    }
}
