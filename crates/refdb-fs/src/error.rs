use std::io;
use std::path::PathBuf;

use refdb_types::TypeError;

/// Errors produced by collection file I/O.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    /// The collection file could not be read.
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    /// The collection file is not a valid JSON entry array.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The collection file could not be written or removed.
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    /// Entries could not be serialized.
    #[error("failed to encode entries: {0}")]
    Encode(serde_json::Error),

    /// A locale or content type uid is not usable as a path component.
    #[error(transparent)]
    InvalidName(#[from] TypeError),
}

/// Convenience alias used throughout the fs crate.
pub type CollectionResult<T> = std::result::Result<T, CollectionError>;
