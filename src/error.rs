use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::generation::GenerationError;

/// Outcome of a resolution that produced no caption pair.
///
/// `NoMatch` carries the catalog keys to show the user. `GenerationFailed`
/// carries the effective base caption so it can still be displayed.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no catalog entry matched and no base description was provided (known: {})", .known_keys.join(", "))]
    NoMatch { known_keys: Vec<String> },
    #[error("marketing caption generation failed: {source}")]
    GenerationFailed {
        base: String,
        #[source]
        source: GenerationError,
    },
}

impl ResolveError {
    pub fn generation(base: impl Into<String>, source: GenerationError) -> Self {
        Self::GenerationFailed {
            base: base.into(),
            source,
        }
    }

    pub fn is_no_match(&self) -> bool {
        matches!(self, Self::NoMatch { .. })
    }
}

#[derive(Debug, Error)]
pub enum CaptionError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("invalid catalog entry '{key}': {reason}")]
    InvalidCatalogEntry { key: String, reason: String },
    #[error("failed to append to result log {path:?}: {source}")]
    LogWriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CaptionError {
    pub fn invalid_entry(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCatalogEntry {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn log_write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::LogWriteFailed {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CaptionError>;
