use thiserror::Error;

use refdb_cache::CacheError;
use refdb_fs::CollectionError;
use refdb_query::QueryError;
use refdb_types::TypeError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryError),

    #[error("invalid document: {0}")]
    InvalidDocument(#[from] TypeError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("content type not found: {content_type} (locale {locale})")]
    ContentTypeNotFound { locale: String, content_type: String },

    #[error("entry {uid} already exists in {content_type}; use upsert to replace it")]
    DuplicateKey { content_type: String, uid: String },

    #[error("collection error: {0}")]
    Collection(#[from] CollectionError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("failed to resolve references into {content_type}: {source}")]
    ReferenceResolution {
        content_type: String,
        #[source]
        source: Box<StoreError>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StoreError {
    /// Malformed or incomplete input, as opposed to a storage fault.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidQuery(_) | Self::InvalidDocument(_) | Self::Validation(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ContentTypeNotFound { .. })
    }

    /// Wrap a nested fetch failure, keeping an existing wrapper as is so a
    /// deep chain reports the innermost target once.
    pub(crate) fn reference(content_type: &str, err: StoreError) -> Self {
        match err {
            Self::ReferenceResolution { .. } => err,
            other => Self::ReferenceResolution {
                content_type: content_type.to_string(),
                source: Box::new(other),
            },
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
