use async_trait::async_trait;
use tracing::warn;

/// Notified when a query targets a content type with no collection file and
/// no applicable fallback, before the store returns
/// [`StoreError::ContentTypeNotFound`](crate::StoreError::ContentTypeNotFound).
///
/// Front ends use this to shape their own not-found response. It is not
/// invoked for missing collections reached through reference resolution;
/// those resolve to nothing.
#[async_trait]
pub trait NotFoundHook: Send + Sync {
    async fn content_type_not_found(&self, locale: &str, content_type: &str);
}

/// Default hook: logs a warning.
pub struct LogNotFound;

#[async_trait]
impl NotFoundHook for LogNotFound {
    async fn content_type_not_found(&self, locale: &str, content_type: &str) {
        warn!(locale, content_type, "content type not found");
    }
}
