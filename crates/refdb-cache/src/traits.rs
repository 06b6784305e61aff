use serde_json::{Map, Value};

use refdb_types::Entry;

use crate::error::CacheResult;

/// A write applied to one (locale, content type) slot.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheUpdate {
    /// Replace the whole collection.
    Replace(Vec<Entry>),
    /// Insert or replace the entry with the same uid.
    Put(Entry),
    /// Drop the entry with this uid.
    Delete(String),
}

/// Process-wide collection cache.
///
/// Implementations must be thread-safe and apply each update atomically per
/// (locale, content type) key. Concurrent writers to the same key race;
/// the last one wins.
pub trait FallbackCache: Send + Sync {
    /// Entries of one collection that match `filter`, in stored order.
    ///
    /// An unknown collection yields an empty list.
    fn get(&self, locale: &str, content_type: &str, filter: &Map<String, Value>) -> CacheResult<Vec<Entry>>;

    /// Apply an update to one collection.
    fn set(&self, locale: &str, content_type: &str, update: CacheUpdate) -> CacheResult<()>;
}
