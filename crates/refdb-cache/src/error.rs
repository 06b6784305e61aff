use refdb_query::QueryError;

/// Errors from fallback cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache lock was poisoned by a panicking writer.
    #[error("cache lock poisoned: {0}")]
    Poisoned(String),

    /// The lookup filter could not be evaluated.
    #[error("invalid cache filter: {0}")]
    Filter(#[from] QueryError),
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
