use crate::cache::key::CacheKey;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Failures while walking the agents tree. Any of these blocks startup:
/// ranking tables built from partial metadata would be silently wrong.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("agents directory {path} is not readable: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("missing episode metadata for agent '{agent}' on scenario '{scenario}' (expected {path})")]
    MetadataMissing {
        agent: String,
        scenario: String,
        path: PathBuf,
    },

    #[error("invalid episode metadata at {path}: {reason}")]
    InvalidMetadata { path: PathBuf, reason: String },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced by the artifact store.
///
/// The type is `Clone` so a single in-flight computation can hand the same
/// failure to every caller waiting on that key.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("no episode logs for agent '{}' on scenario '{}'", key.agent, key.scenario)]
    NotFound { key: CacheKey },

    #[error("corrupt artifact at {path}: {reason}")]
    CorruptArtifact { path: PathBuf, reason: String },

    #[error("artifact at {path} has format version {found}, newest supported is {supported}; upgrade gridlens or clear the cache")]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        supported: u32,
    },

    #[error("failed to build analytics for {key}: {reason}")]
    Build { key: CacheKey, reason: String },

    #[error("failed to attach runtime context for agent '{agent}': {reason}")]
    Context { agent: String, reason: String },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ConfigError(pub String);
