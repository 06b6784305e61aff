use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::{Map, Value};
use tracing::trace;

use refdb_query::filter_entries;
use refdb_types::Entry;

use crate::error::{CacheError, CacheResult};
use crate::traits::{CacheUpdate, FallbackCache};

type SlotKey = (String, String);

/// In-memory, HashMap-based fallback cache.
///
/// Each (locale, content type) slot holds its entries newest-first, the same
/// order the collection files use. Entries are cloned on read and write.
pub struct InMemoryFallbackCache {
    slots: RwLock<HashMap<SlotKey, Vec<Entry>>>,
}

impl InMemoryFallbackCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Number of cached entries across all slots.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .map(|slots| slots.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Returns `true` if no slot holds any entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every slot.
    pub fn clear(&self) -> CacheResult<()> {
        self.slots
            .write()
            .map_err(|e| CacheError::Poisoned(e.to_string()))?
            .clear();
        Ok(())
    }
}

impl Default for InMemoryFallbackCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackCache for InMemoryFallbackCache {
    fn get(&self, locale: &str, content_type: &str, filter: &Map<String, Value>) -> CacheResult<Vec<Entry>> {
        let entries = {
            let slots = self
                .slots
                .read()
                .map_err(|e| CacheError::Poisoned(e.to_string()))?;
            slots
                .get(&(locale.to_string(), content_type.to_string()))
                .cloned()
                .unwrap_or_default()
        };
        Ok(filter_entries(entries, filter)?)
    }

    fn set(&self, locale: &str, content_type: &str, update: CacheUpdate) -> CacheResult<()> {
        let mut slots = self
            .slots
            .write()
            .map_err(|e| CacheError::Poisoned(e.to_string()))?;
        let slot = slots
            .entry((locale.to_string(), content_type.to_string()))
            .or_default();

        match update {
            CacheUpdate::Replace(entries) => {
                trace!(locale, content_type, count = entries.len(), "cache slot replaced");
                *slot = entries;
            }
            CacheUpdate::Put(entry) => {
                trace!(locale, content_type, uid = %entry.uid, "cache entry put");
                match slot.iter_mut().find(|e| e.uid == entry.uid) {
                    Some(existing) => *existing = entry,
                    None => slot.insert(0, entry),
                }
            }
            CacheUpdate::Delete(uid) => {
                trace!(locale, content_type, uid = %uid, "cache entry deleted");
                slot.retain(|e| e.uid != uid);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryFallbackCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryFallbackCache")
            .field("entry_count", &self.len())
            .finish()
    }
}
