use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use refdb_cache::{CacheUpdate, FallbackCache, InMemoryFallbackCache};
use refdb_fs::{CollectionFiles, PathResolver};
use refdb_query::{filter_entries, paginate, sort_entries, FindOptions, NormalizedQuery, Query};
use refdb_types::names::{keys, ASSETS, CONTENT_TYPES, ROUTES};
use refdb_types::{validate_content_type_uid, validate_locale, Entry, EntryDocument};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::hooks::{LogNotFound, NotFoundHook};
use crate::references::ReferenceIndex;
use crate::resolver::{resolve_entries, ReferenceSet, ReferenceSource};

/// Result of [`Store::find_one`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FindOne {
    /// `{"entry": payload | null}`
    Entry { entry: Option<Value> },
    /// The stored record, for `_remove` queries.
    Raw(Option<Entry>),
}

impl FindOne {
    pub fn is_found(&self) -> bool {
        match self {
            Self::Entry { entry } => entry.is_some(),
            Self::Raw(record) => record.is_some(),
        }
    }

    /// The payload, whichever form was requested.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Entry { entry } => entry.as_ref(),
            Self::Raw(record) => record.as_ref().map(|e| &e.data),
        }
    }
}

/// Result of [`Store::find`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Find {
    /// `{"entries": [...], "count": n}`; `count` only with `include_count`.
    Entries {
        entries: Vec<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        count: Option<usize>,
    },
    /// Stored records, for `_remove` queries.
    Raw(Vec<Entry>),
}

impl Find {
    pub fn len(&self) -> usize {
        match self {
            Self::Entries { entries, .. } => entries.len(),
            Self::Raw(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn payloads(&self) -> Vec<&Value> {
        match self {
            Self::Entries { entries, .. } => entries.iter().collect(),
            Self::Raw(records) => records.iter().map(|e| &e.data).collect(),
        }
    }
}

/// Result of [`Store::count`]. The number sits under `entries`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Count {
    pub entries: usize,
}

/// Input of [`Store::bulk_insert`]: a whole collection's payloads.
#[derive(Clone, Debug, PartialEq, Serialize, serde::Deserialize)]
pub struct BulkInsert {
    #[serde(rename = "_content_type_uid")]
    pub content_type_uid: String,
    pub locale: String,
    pub entries: Vec<Value>,
}

/// File-backed document store with reference resolution.
///
/// Each (locale, content type) pair is one collection file. Writes replace
/// the whole file under a per-collection lock and are mirrored into the
/// fallback cache.
pub struct Store {
    config: StoreConfig,
    files: CollectionFiles,
    cache: Arc<dyn FallbackCache>,
    not_found: Arc<dyn NotFoundHook>,
    indexes: RwLock<IndexCache>,
    /// Collections dropped by `remove` and not written since.
    emptied: RwLock<HashSet<CollectionKey>>,
}

type CollectionKey = (String, String);

/// Reference indexes by (locale, content type). `generation` moves on every
/// change to `_content_types`, so a lookup that raced a write is not kept.
#[derive(Default)]
struct IndexCache {
    generation: u64,
    indexes: HashMap<CollectionKey, Option<Arc<ReferenceIndex>>>,
}

impl Store {
    /// A store using the configured directory layout, an in-memory fallback
    /// cache and a logging not-found hook.
    pub fn new(config: StoreConfig) -> Self {
        let layout = Arc::new(config.layout());
        Self {
            files: CollectionFiles::new(layout),
            config,
            cache: Arc::new(InMemoryFallbackCache::new()),
            not_found: Arc::new(LogNotFound),
            indexes: RwLock::default(),
            emptied: RwLock::default(),
        }
    }

    pub async fn open(config_path: &std::path::Path) -> StoreResult<Self> {
        Ok(Self::new(StoreConfig::load(config_path).await?))
    }

    pub fn with_cache(mut self, cache: Arc<dyn FallbackCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_not_found_hook(mut self, hook: Arc<dyn NotFoundHook>) -> Self {
        self.not_found = hook;
        self
    }

    /// Replace the configured directory layout.
    pub fn with_path_resolver(mut self, resolver: Arc<dyn PathResolver>) -> Self {
        self.files = CollectionFiles::new(resolver);
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<dyn FallbackCache> {
        &self.cache
    }

    /// The first matching entry in stored order.
    pub async fn find_one(&self, query: &Query) -> StoreResult<FindOne> {
        let q = query.normalize()?;
        let content_type = q.require_content_type()?.to_string();
        let records = self.load_or_not_found(&q, &content_type).await?;

        let Some(first) = records.into_iter().next() else {
            return Ok(if q.raw { FindOne::Raw(None) } else { FindOne::Entry { entry: None } });
        };
        let mut found = [first];
        if q.include_references {
            let index = self.resolution_index(&q.locale, &content_type).await?;
            resolve_entries(self, &q.locale, &mut found, index.as_deref(), &ReferenceSet::new()).await?;
        }
        let [record] = found;
        Ok(if q.raw {
            FindOne::Raw(Some(record))
        } else {
            FindOne::Entry { entry: Some(record.data) }
        })
    }

    /// Matching entries, sorted and paginated by `options`.
    pub async fn find(&self, query: &Query, options: &FindOptions) -> StoreResult<Find> {
        let q = query.normalize()?;
        let content_type = q.require_content_type()?.to_string();
        let records = self.load_or_not_found(&q, &content_type).await?;
        let records = self
            .shape_results(&q, &content_type, records, options, &ReferenceSet::new())
            .await?;

        if q.raw {
            return Ok(Find::Raw(records));
        }
        let count = q.include_count.then_some(records.len());
        Ok(Find::Entries {
            entries: records.into_iter().map(|e| e.data).collect(),
            count,
        })
    }

    /// Number of matching entries. References are not resolved.
    pub async fn count(&self, query: &Query) -> StoreResult<Count> {
        let q = query.normalize()?;
        let content_type = q.require_content_type()?.to_string();
        let records = self.load_or_not_found(&q, &content_type).await?;
        Ok(Count { entries: records.len() })
    }

    /// Add a new entry at the front of its collection.
    pub async fn insert(&self, doc: EntryDocument) -> StoreResult<usize> {
        self.write_entry(doc, false).await
    }

    /// Add an entry, replacing any entry with the same `_uid`. The entry
    /// moves to the front of its collection.
    pub async fn upsert(&self, doc: EntryDocument) -> StoreResult<usize> {
        self.write_entry(doc, true).await
    }

    /// Replace a whole collection with `batch.entries`, in the given order.
    pub async fn bulk_insert(&self, batch: BulkInsert) -> StoreResult<usize> {
        let BulkInsert {
            content_type_uid,
            locale,
            entries,
        } = batch;
        validate_content_type_uid(&content_type_uid)?;
        validate_locale(&locale)?;
        self.check_locale(&locale)?;

        let mut records = Vec::with_capacity(entries.len());
        for (i, mut payload) in entries.into_iter().enumerate() {
            let uid = bulk_uid(&content_type_uid, &payload).ok_or_else(|| {
                StoreError::Validation(format!("entry {i} of {content_type_uid} has no uid"))
            })?;
            if records.iter().any(|r: &Entry| r.uid == uid) {
                return Err(StoreError::DuplicateKey {
                    content_type: content_type_uid,
                    uid,
                });
            }
            if content_type_uid == CONTENT_TYPES {
                ReferenceIndex::attach(&mut payload);
            }
            records.push(Entry::new(uid, content_type_uid.clone(), payload));
        }

        let _guard = self.files.lock(&locale, &content_type_uid).await?;
        self.files.write_all(&locale, &content_type_uid, &records).await?;
        info!(locale = %locale, content_type = %content_type_uid, count = records.len(), "collection replaced");
        self.written(&locale, &content_type_uid);
        self.cache.set(&locale, &content_type_uid, CacheUpdate::Replace(records))?;
        Ok(1)
    }

    /// Remove a whole collection or a single entry.
    ///
    /// A query holding exactly the locale and content type deletes the
    /// collection; later reads of it find nothing until it is written again.
    /// A query with a `_uid` deletes that entry. Without a content type
    /// nothing happens and `0` is returned. A missing collection counts as
    /// removed.
    pub async fn remove(&self, query: &Query) -> StoreResult<usize> {
        let q = query.normalize()?;
        let Some(content_type) = q.content_type_uid.as_deref() else {
            return Ok(0);
        };
        let locale = q.locale.as_str();
        self.check_locale(locale)?;

        let _guard = self.files.lock(locale, content_type).await?;

        if query.len() == 2 {
            let existed = self.files.delete(locale, content_type).await?;
            info!(locale, content_type, existed, "collection removed");
            self.cache.set(locale, content_type, CacheUpdate::Replace(Vec::new()))?;
            self.emptied
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert((locale.to_string(), content_type.to_string()));
            if content_type == CONTENT_TYPES {
                self.forget_indexes();
            }
            return Ok(1);
        }

        let uid = q.pinned_uid().ok_or_else(|| {
            StoreError::Validation("remove needs a `_uid`, or only locale and content type to drop the collection".into())
        })?;

        if self.files.exists(locale, content_type).await? {
            let mut records = self.files.read_all(locale, content_type).await?;
            if let Some(pos) = records.iter().position(|e| e.uid == uid) {
                records.remove(pos);
                self.files.write_all(locale, content_type, &records).await?;
                debug!(locale, content_type, uid, "entry removed");
            }
        }
        if content_type == CONTENT_TYPES {
            self.forget_indexes();
        }
        self.cache.set(locale, content_type, CacheUpdate::Delete(uid.to_string()))?;
        Ok(1)
    }

    /// The reference index stored with a content type's definition.
    pub async fn reference_index(&self, locale: &str, content_type: &str) -> StoreResult<Option<ReferenceIndex>> {
        let query = Query::new(locale, CONTENT_TYPES).uid(content_type);
        let q = query.normalize()?;
        let records = self.load(&q, CONTENT_TYPES).await?.unwrap_or_default();
        Ok(records.first().and_then(|e| ReferenceIndex::from_payload(&e.data)))
    }

    async fn write_entry(&self, doc: EntryDocument, replace: bool) -> StoreResult<usize> {
        doc.entry.validate()?;
        validate_locale(&doc.locale)?;
        validate_content_type_uid(&doc.entry.content_type_uid)?;
        self.check_locale(&doc.locale)?;

        let EntryDocument { locale, mut entry } = doc;
        if entry.content_type_uid == CONTENT_TYPES {
            ReferenceIndex::attach(&mut entry.data);
        }
        let content_type = entry.content_type_uid.clone();

        let _guard = self.files.lock(&locale, &content_type).await?;
        let mut records = if self.files.exists(&locale, &content_type).await? {
            self.files.read_all(&locale, &content_type).await?
        } else {
            Vec::new()
        };

        if let Some(pos) = records.iter().position(|e| e.uid == entry.uid) {
            if !replace {
                return Err(StoreError::DuplicateKey {
                    content_type,
                    uid: entry.uid,
                });
            }
            records.remove(pos);
        }

        records.insert(0, entry.clone());
        self.files.write_all(&locale, &content_type, &records).await?;
        debug!(locale = %locale, content_type = %content_type, uid = %entry.uid, replace, "entry written");
        self.written(&locale, &content_type);
        self.cache.set(&locale, &content_type, CacheUpdate::Put(entry))?;
        Ok(1)
    }

    /// Bookkeeping after a collection file was written.
    fn written(&self, locale: &str, content_type: &str) {
        self.emptied
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(locale.to_string(), content_type.to_string()));
        if content_type == CONTENT_TYPES {
            self.forget_indexes();
        }
    }

    fn was_emptied(&self, locale: &str, content_type: &str) -> bool {
        self.emptied
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(locale.to_string(), content_type.to_string()))
    }

    fn forget_indexes(&self) {
        let mut cache = self.indexes.write().unwrap_or_else(PoisonError::into_inner);
        cache.generation += 1;
        cache.indexes.clear();
    }

    /// The reference index used when resolving entries of `content_type`,
    /// loaded once per (locale, content type).
    async fn resolution_index(&self, locale: &str, content_type: &str) -> StoreResult<Option<Arc<ReferenceIndex>>> {
        let key = (locale.to_string(), content_type.to_string());
        let generation = {
            let cache = self.indexes.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(index) = cache.indexes.get(&key) {
                return Ok(index.clone());
            }
            cache.generation
        };

        let index = self.reference_index(locale, content_type).await?.map(Arc::new);
        debug!(locale, content_type, indexed = index.is_some(), "reference index loaded");
        let mut cache = self.indexes.write().unwrap_or_else(PoisonError::into_inner);
        if cache.generation == generation {
            cache.indexes.insert(key, index.clone());
        }
        Ok(index)
    }

    fn check_locale(&self, locale: &str) -> StoreResult<()> {
        if self.config.accepts_locale(locale) {
            Ok(())
        } else {
            Err(StoreError::Validation(format!("unknown locale: {locale}")))
        }
    }

    /// Filtered records of one collection, or `None` when it has no file and
    /// no cache fallback applies. Removed collections and undownloaded assets
    /// are served from the cache.
    async fn load(&self, q: &NormalizedQuery, content_type: &str) -> StoreResult<Option<Vec<Entry>>> {
        self.check_locale(&q.locale)?;
        if self.files.exists(&q.locale, content_type).await? {
            let records = self.files.read_all(&q.locale, content_type).await?;
            return Ok(Some(filter_entries(records, &q.filter)?));
        }
        let undownloaded = content_type == ASSETS && !self.config.assets.download;
        if undownloaded || self.was_emptied(&q.locale, content_type) {
            debug!(locale = %q.locale, content_type, "serving collection from fallback cache");
            return Ok(Some(self.cache.get(&q.locale, content_type, &q.filter)?));
        }
        Ok(None)
    }

    async fn load_or_not_found(&self, q: &NormalizedQuery, content_type: &str) -> StoreResult<Vec<Entry>> {
        match self.load(q, content_type).await? {
            Some(records) => Ok(records),
            None => {
                self.not_found.content_type_not_found(&q.locale, content_type).await;
                Err(StoreError::ContentTypeNotFound {
                    locale: q.locale.clone(),
                    content_type: content_type.to_string(),
                })
            }
        }
    }

    /// Sort, paginate and resolve loaded records.
    async fn shape_results(
        &self,
        q: &NormalizedQuery,
        content_type: &str,
        mut records: Vec<Entry>,
        options: &FindOptions,
        references: &ReferenceSet,
    ) -> StoreResult<Vec<Entry>> {
        sort_entries(&mut records, &options.sort_keys());
        let mut records = paginate(records, options.skip, options.limit);
        if q.include_references && !records.is_empty() {
            let index = self.resolution_index(&q.locale, content_type).await?;
            resolve_entries(self, &q.locale, &mut records, index.as_deref(), references).await?;
        }
        Ok(records)
    }
}

#[async_trait]
impl ReferenceSource for Store {
    async fn fetch_references(
        &self,
        locale: &str,
        content_type: &str,
        uids: Vec<String>,
        references: ReferenceSet,
    ) -> StoreResult<Vec<Entry>> {
        let q = Query::new(locale, content_type)
            .with(keys::UID, json!({ "$in": uids }))
            .raw(true)
            .normalize()?;
        let Some(records) = self.load(&q, content_type).await? else {
            debug!(locale, content_type, "reference target collection missing");
            return Ok(Vec::new());
        };
        self.shape_results(&q, content_type, records, &FindOptions::new().unsorted(), &references)
            .await
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .field("files", &self.files)
            .finish()
    }
}

/// Identity of a bulk-inserted payload: its `uid`, or for routes the uid of
/// the routed entry.
fn bulk_uid(content_type: &str, payload: &Value) -> Option<String> {
    let uid = payload.get(keys::PAYLOAD_UID).and_then(Value::as_str).or_else(|| {
        (content_type == ROUTES)
            .then(|| payload.pointer("/entry/uid").and_then(Value::as_str))
            .flatten()
    })?;
    (!uid.is_empty()).then(|| uid.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use refdb_types::ReferenceField;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> Store {
        Store::new(StoreConfig::with_root(dir.path()))
    }

    fn doc(ct: &str, uid: &str, data: Value) -> EntryDocument {
        EntryDocument::new("en-us", Entry::new(uid, ct, data))
    }

    fn post(uid: &str, rank: i64) -> EntryDocument {
        doc("blog", uid, json!({"uid": uid, "rank": rank, "published_at": format!("2024-01-{rank:02}")}))
    }

    fn ranks(find: &Find) -> Vec<i64> {
        find.payloads().iter().map(|p| p["rank"].as_i64().unwrap()).collect()
    }

    #[tokio::test]
    async fn insert_then_find_one() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert_eq!(store.insert(doc("blog", "p1", json!({"uid": "p1", "title": "Hi"}))).await.unwrap(), 1);

        let found = store.find_one(&Query::new("en-us", "blog").uid("p1")).await.unwrap();
        assert_eq!(found, FindOne::Entry { entry: Some(json!({"uid": "p1", "title": "Hi"})) });

        let raw = store.find_one(&Query::new("en-us", "blog").uid("p1").raw(true)).await.unwrap();
        match raw {
            FindOne::Raw(Some(record)) => {
                assert_eq!(record.uid, "p1");
                assert_eq!(record.content_type_uid, "blog");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn find_one_miss_is_null() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.insert(post("p1", 1)).await.unwrap();
        let found = store.find_one(&Query::new("en-us", "blog").uid("nope")).await.unwrap();
        assert_eq!(serde_json::to_value(&found).unwrap(), json!({"entry": null}));
    }

    #[tokio::test]
    async fn duplicate_insert_fails_upsert_replaces() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.insert(post("p1", 1)).await.unwrap();
        store.insert(post("p2", 2)).await.unwrap();

        let err = store.insert(post("p1", 9)).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { ref uid, .. } if uid == "p1"));

        store.upsert(post("p1", 9)).await.unwrap();
        let all = store
            .find(&Query::new("en-us", "blog"), &FindOptions::new().unsorted())
            .await
            .unwrap();
        assert_eq!(ranks(&all), [9, 2]);
    }

    #[tokio::test]
    async fn insert_requires_identity() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let err = store.insert(doc("blog", "", json!({}))).await.unwrap_err();
        assert!(err.is_validation());
        let err = store.insert(doc("", "p1", json!({}))).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn missing_collection_calls_hook() {
        struct Recording(Mutex<Vec<String>>);

        #[async_trait]
        impl NotFoundHook for Recording {
            async fn content_type_not_found(&self, _locale: &str, content_type: &str) {
                self.0.lock().unwrap().push(content_type.to_string());
            }
        }

        let dir = TempDir::new().unwrap();
        let hook = Arc::new(Recording(Mutex::new(Vec::new())));
        let store = store(&dir).with_not_found_hook(hook.clone());

        let err = store
            .find(&Query::new("en-us", "blog"), &FindOptions::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(hook.0.lock().unwrap().as_slice(), ["blog"]);
    }

    #[tokio::test]
    async fn query_without_content_type_is_invalid() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let query = Query::from_value(json!({"locale": "en-us"})).unwrap();
        assert!(store.find(&query, &FindOptions::new()).await.unwrap_err().is_validation());
        assert!(store.count(&query).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn unknown_locale_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = StoreConfig::with_root(dir.path());
        config.locales.push(crate::config::LocaleConfig::new("en-us"));
        let store = Store::new(config);
        let err = store.insert(EntryDocument::new("de-de", Entry::new("p", "blog", json!({})))).await;
        assert!(err.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn skip_and_limit_over_sorted_entries() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        for rank in [4, 9, 1, 7, 2, 10, 5, 3, 8, 6] {
            store.insert(post(&format!("p{rank}"), rank)).await.unwrap();
        }

        let options = FindOptions::new()
            .with_sort("_data.rank", refdb_query::SortOrder::Asc)
            .with_skip(2)
            .with_limit(3);
        let page = store
            .find(&Query::new("en-us", "blog").include_count(true), &options)
            .await
            .unwrap();
        assert_eq!(ranks(&page), [3, 4, 5]);
        assert!(matches!(page, Find::Entries { count: Some(3), .. }));

        // Default sort: published_at, newest first.
        let newest = store
            .find(&Query::new("en-us", "blog"), &FindOptions::new().with_limit(2))
            .await
            .unwrap();
        assert_eq!(ranks(&newest), [10, 9]);
    }

    #[tokio::test]
    async fn count_uses_entries_key() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        for rank in 1..=10 {
            store.insert(post(&format!("p{rank}"), rank)).await.unwrap();
        }
        let query = Query::new("en-us", "blog").with("_data.rank", json!({"$lte": 4}));
        let count = store.count(&query).await.unwrap();
        assert_eq!(count, Count { entries: 4 });
        assert_eq!(serde_json::to_value(count).unwrap(), json!({"entries": 4}));
    }

    #[tokio::test]
    async fn bulk_insert_keeps_order() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let entries: Vec<Value> = (0..5).map(|i| json!({"uid": format!("e{i}"), "n": i})).collect();
        let batch = BulkInsert {
            content_type_uid: "blog".into(),
            locale: "en-us".into(),
            entries: entries.clone(),
        };
        assert_eq!(store.bulk_insert(batch).await.unwrap(), 1);

        let all = store
            .find(&Query::new("en-us", "blog"), &FindOptions::new().unsorted())
            .await
            .unwrap();
        assert_eq!(all.payloads(), entries.iter().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn bulk_insert_routes_and_missing_uid() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let routes = BulkInsert {
            content_type_uid: ROUTES.into(),
            locale: "en-us".into(),
            entries: vec![json!({"url": "/about", "entry": {"uid": "page-about"}})],
        };
        store.bulk_insert(routes).await.unwrap();
        let found = store
            .find_one(&Query::new("en-us", ROUTES).uid("page-about"))
            .await
            .unwrap();
        assert!(found.is_found());

        let bad = BulkInsert {
            content_type_uid: "blog".into(),
            locale: "en-us".into(),
            entries: vec![json!({"entry": {"uid": "x"}})],
        };
        assert!(store.bulk_insert(bad).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn remove_collection_then_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.insert(post("p1", 1)).await.unwrap();
        store.insert(post("p2", 2)).await.unwrap();

        assert_eq!(store.remove(&Query::new("en-us", "blog")).await.unwrap(), 1);
        let all = store.find(&Query::new("en-us", "blog"), &FindOptions::new()).await.unwrap();
        assert!(all.is_empty());
        assert_eq!(store.count(&Query::new("en-us", "blog")).await.unwrap().entries, 0);
        let one = store.find_one(&Query::new("en-us", "blog").uid("p1")).await.unwrap();
        assert!(!one.is_found());
        assert!(store.cache().get("en-us", "blog", &Default::default()).unwrap().is_empty());

        // Removing again is still success.
        assert_eq!(store.remove(&Query::new("en-us", "blog")).await.unwrap(), 1);

        store.insert(post("p3", 3)).await.unwrap();
        let all = store.find(&Query::new("en-us", "blog"), &FindOptions::new()).await.unwrap();
        assert_eq!(ranks(&all), [3]);
    }

    #[tokio::test]
    async fn remove_with_extra_keys_keeps_collection() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.insert(post("p1", 1)).await.unwrap();

        let flagged = Query::new("en-us", "blog").include_references(false);
        assert!(store.remove(&flagged).await.unwrap_err().is_validation());
        assert_eq!(store.count(&Query::new("en-us", "blog")).await.unwrap().entries, 1);
    }

    #[tokio::test]
    async fn remove_single_entry() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.insert(post("p1", 1)).await.unwrap();
        store.insert(post("p2", 2)).await.unwrap();

        assert_eq!(store.remove(&Query::new("en-us", "blog").uid("p1")).await.unwrap(), 1);
        let all = store
            .find(&Query::new("en-us", "blog"), &FindOptions::new())
            .await
            .unwrap();
        assert_eq!(ranks(&all), [2]);

        let no_type = Query::from_value(json!({"locale": "en-us", "_uid": "p2"})).unwrap();
        assert_eq!(store.remove(&no_type).await.unwrap(), 0);

        let no_uid = Query::new("en-us", "blog").with("_data.rank", json!(2));
        assert!(store.remove(&no_uid).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn writes_mirror_to_cache() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.insert(post("p1", 1)).await.unwrap();
        store.upsert(post("p1", 5)).await.unwrap();
        let cached = store.cache().get("en-us", "blog", &Default::default()).unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].data["rank"], 5);

        store.remove(&Query::new("en-us", "blog").uid("p1")).await.unwrap();
        assert!(store.cache().get("en-us", "blog", &Default::default()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn references_resolve_through_store() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.insert(doc("author", "a1", json!({"uid": "a1", "name": "Ann"}))).await.unwrap();
        store
            .insert(doc(
                "blog",
                "p1",
                json!({"uid": "p1", "authors": ReferenceField::many("author", ["a1"]).to_value()}),
            ))
            .await
            .unwrap();

        let found = store.find_one(&Query::new("en-us", "blog").uid("p1")).await.unwrap();
        assert_eq!(found.payload().unwrap()["authors"][0]["name"], "Ann");

        let unresolved = store
            .find_one(&Query::new("en-us", "blog").uid("p1").include_references(false))
            .await
            .unwrap();
        assert_eq!(
            unresolved.payload().unwrap()["authors"],
            ReferenceField::many("author", ["a1"]).to_value()
        );
    }

    #[tokio::test]
    async fn reference_index_selects_resolved_fields() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .insert(doc(
                CONTENT_TYPES,
                "blog",
                json!({"uid": "blog", "schema": [
                    {"uid": "author", "data_type": "reference", "reference_to": "author"},
                    {"uid": "meta", "data_type": "text"}
                ]}),
            ))
            .await
            .unwrap();
        store.insert(doc("author", "a1", json!({"uid": "a1", "name": "Ann"}))).await.unwrap();
        let meta = json!({"_content_type_id": "author", "values": ["a1"]});
        store
            .insert(doc("blog", "p1", json!({"uid": "p1", "author": "a1", "meta": meta.clone()})))
            .await
            .unwrap();

        let found = store.find_one(&Query::new("en-us", "blog").uid("p1")).await.unwrap();
        let post = found.payload().unwrap();
        assert_eq!(post["author"]["name"], "Ann");
        assert_eq!(post["meta"], meta);

        let listed = store.find(&Query::new("en-us", "blog"), &FindOptions::new()).await.unwrap();
        assert_eq!(listed.payloads()[0]["author"]["name"], "Ann");
        assert_eq!(listed.payloads()[0]["meta"], meta);

        // Redefining the content type takes effect on the next read.
        store
            .upsert(doc(
                CONTENT_TYPES,
                "blog",
                json!({"uid": "blog", "schema": [
                    {"uid": "meta", "data_type": "reference", "reference_to": "author", "multiple": true}
                ]}),
            ))
            .await
            .unwrap();
        let found = store.find_one(&Query::new("en-us", "blog").uid("p1")).await.unwrap();
        let post = found.payload().unwrap();
        assert_eq!(post["author"], "a1");
        assert_eq!(post["meta"][0]["name"], "Ann");
    }

    #[tokio::test]
    async fn already_fetched_sibling_is_not_nested_again() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .insert(doc("author", "a1", json!({"uid": "a1", "friend": ReferenceField::many("author", ["a2"]).to_value()})))
            .await
            .unwrap();
        store.insert(doc("author", "a2", json!({"uid": "a2", "name": "Bob"}))).await.unwrap();
        store
            .insert(doc(
                "blog",
                "p1",
                json!({"uid": "p1", "authors": ReferenceField::many("author", ["a1", "a2"]).to_value()}),
            ))
            .await
            .unwrap();

        let found = store.find_one(&Query::new("en-us", "blog").uid("p1")).await.unwrap();
        let authors = &found.payload().unwrap()["authors"];
        assert_eq!(authors[0]["friend"], json!([]));
        assert_eq!(authors[1]["name"], "Bob");
    }

    #[tokio::test]
    async fn assets_resolve_even_when_already_fetched() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .insert(doc(ASSETS, "i1", json!({"uid": "i1", "related": ReferenceField::one(ASSETS, "i2").to_value()})))
            .await
            .unwrap();
        store.insert(doc(ASSETS, "i2", json!({"uid": "i2", "url": "/i2.png"}))).await.unwrap();
        store
            .insert(doc(
                "blog",
                "p1",
                json!({"uid": "p1", "images": ReferenceField::many(ASSETS, ["i1", "i2"]).to_value()}),
            ))
            .await
            .unwrap();

        let found = store.find_one(&Query::new("en-us", "blog").uid("p1")).await.unwrap();
        let images = &found.payload().unwrap()["images"];
        assert_eq!(images[0]["related"]["url"], "/i2.png");
        assert_eq!(images[1]["url"], "/i2.png");
    }

    #[tokio::test]
    async fn mutual_references_terminate() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .insert(doc("page", "A", json!({"uid": "A", "link": ReferenceField::many("page", ["B"]).to_value()})))
            .await
            .unwrap();
        store
            .insert(doc("page", "B", json!({"uid": "B", "link": ReferenceField::many("page", ["A"]).to_value()})))
            .await
            .unwrap();

        let found = store.find_one(&Query::new("en-us", "page").uid("A")).await.unwrap();
        let a = found.payload().unwrap();
        assert_eq!(a["link"][0]["uid"], "B");
        assert_eq!(a["link"][0]["link"], json!([]));
    }

    #[tokio::test]
    async fn cyclic_asset_terminates() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .insert(doc(ASSETS, "img", json!({"uid": "img", "self": ReferenceField::one(ASSETS, "img").to_value()})))
            .await
            .unwrap();
        store
            .insert(doc("blog", "p1", json!({"uid": "p1", "hero": ReferenceField::one(ASSETS, "img").to_value()})))
            .await
            .unwrap();

        let found = store.find_one(&Query::new("en-us", "blog").uid("p1")).await.unwrap();
        let hero = &found.payload().unwrap()["hero"];
        assert_eq!(hero["uid"], "img");
        assert_eq!(hero["self"], json!({}));
    }

    #[tokio::test]
    async fn missing_reference_target_collection_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .insert(doc("blog", "p1", json!({"uid": "p1", "tags": ReferenceField::many("tag", ["t1"]).to_value()})))
            .await
            .unwrap();
        let found = store.find_one(&Query::new("en-us", "blog").uid("p1")).await.unwrap();
        assert_eq!(found.payload().unwrap()["tags"], json!([]));
    }

    #[tokio::test]
    async fn assets_fall_back_to_cache_when_not_downloaded() {
        let dir = TempDir::new().unwrap();
        let mut config = StoreConfig::with_root(dir.path());
        config.assets.download = false;
        let store = Store::new(config);

        store
            .cache()
            .set("en-us", ASSETS, CacheUpdate::Put(Entry::new("img", ASSETS, json!({"uid": "img"}))))
            .unwrap();
        let found = store
            .find(&Query::new("en-us", ASSETS), &FindOptions::new())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        let err = store.find(&Query::new("en-us", "blog"), &FindOptions::new()).await;
        assert!(err.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn content_types_get_reference_index() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .insert(doc(
                CONTENT_TYPES,
                "blog",
                json!({"uid": "blog", "schema": [
                    {"uid": "author", "data_type": "reference", "reference_to": "author"}
                ]}),
            ))
            .await
            .unwrap();

        let index = store.reference_index("en-us", "blog").await.unwrap().unwrap();
        assert_eq!(index.get("author").unwrap().content_type, "author");
        assert!(store.reference_index("en-us", "other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_inserts_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store(&dir));
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.insert(post(&format!("p{i}"), i)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        let count = store.count(&Query::new("en-us", "blog")).await.unwrap();
        assert_eq!(count.entries, 16);
    }
}
