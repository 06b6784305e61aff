use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use refdb_types::Entry;

use crate::error::{CollectionError, CollectionResult};
use crate::lock::CollectionLocks;
use crate::paths::PathResolver;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Reads and replaces whole collection files.
pub struct CollectionFiles {
    resolver: Arc<dyn PathResolver>,
    locks: CollectionLocks,
}

impl CollectionFiles {
    pub fn new(resolver: Arc<dyn PathResolver>) -> Self {
        Self {
            resolver,
            locks: CollectionLocks::new(),
        }
    }

    /// The file backing one collection.
    pub fn path(&self, locale: &str, content_type: &str) -> CollectionResult<PathBuf> {
        self.resolver.collection_path(locale, content_type)
    }

    /// Exclusive access to one collection for a read-modify-write cycle.
    pub async fn lock(&self, locale: &str, content_type: &str) -> CollectionResult<OwnedMutexGuard<()>> {
        let path = self.path(locale, content_type)?;
        Ok(self.locks.acquire(&path).await)
    }

    pub async fn exists(&self, locale: &str, content_type: &str) -> CollectionResult<bool> {
        let path = self.path(locale, content_type)?;
        fs::try_exists(&path)
            .await
            .map_err(|source| CollectionError::Read { path, source })
    }

    /// Load every entry of a collection in stored order.
    pub async fn read_all(&self, locale: &str, content_type: &str) -> CollectionResult<Vec<Entry>> {
        let path = self.path(locale, content_type)?;
        let bytes = fs::read(&path).await.map_err(|source| CollectionError::Read {
            path: path.clone(),
            source,
        })?;
        let entries: Vec<Entry> = serde_json::from_slice(&bytes)
            .map_err(|source| CollectionError::Parse { path: path.clone(), source })?;
        debug!(path = %path.display(), count = entries.len(), "collection read");
        Ok(entries)
    }

    /// Replace a collection's contents.
    ///
    /// The array is written to a temp file in the same directory and then
    /// renamed over the collection file.
    pub async fn write_all(&self, locale: &str, content_type: &str, entries: &[Entry]) -> CollectionResult<()> {
        let path = self.path(locale, content_type)?;
        let bytes = serde_json::to_vec(entries).map_err(CollectionError::Encode)?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await.map_err(|source| CollectionError::Write {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let temp = temp_path(&path);
        if let Err(source) = fs::write(&temp, &bytes).await {
            return Err(CollectionError::Write { path: temp, source });
        }
        if let Err(source) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(CollectionError::Write { path, source });
        }

        debug!(path = %path.display(), count = entries.len(), bytes = bytes.len(), "collection written");
        Ok(())
    }

    /// Remove a collection file. Returns `true` if it existed.
    pub async fn delete(&self, locale: &str, content_type: &str) -> CollectionResult<bool> {
        let path = self.path(locale, content_type)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "collection deleted");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(CollectionError::Write { path, source }),
        }
    }
}

impl std::fmt::Debug for CollectionFiles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionFiles")
            .field("locks", &self.locks)
            .finish()
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.{n}.tmp", std::process::id()))
}
