//! Mapping from (locale, content type) to collection files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use refdb_types::names::ASSETS;
use refdb_types::{validate_content_type_uid, validate_locale};

use crate::error::CollectionResult;

/// Resolves the directories a locale's collections live in.
///
/// Implementations must be thread-safe. Names are validated before they
/// reach the resolver.
pub trait PathResolver: Send + Sync {
    /// Directory holding the locale's content type collections.
    fn content_dir(&self, locale: &str) -> PathBuf;

    /// Directory holding the locale's asset collection.
    fn asset_dir(&self, locale: &str) -> PathBuf;

    /// The collection file for one content type: `<dir>/<content_type>.json`,
    /// where `<dir>` is the asset directory for `_assets` and the content
    /// directory otherwise.
    fn collection_path(&self, locale: &str, content_type: &str) -> CollectionResult<PathBuf> {
        validate_locale(locale)?;
        validate_content_type_uid(content_type)?;
        let dir = if content_type == ASSETS {
            self.asset_dir(locale)
        } else {
            self.content_dir(locale)
        };
        Ok(dir.join(format!("{content_type}.json")))
    }
}

/// Explicit directories for one locale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocaleDirs {
    pub content_dir: PathBuf,
    pub asset_dir: PathBuf,
}

/// The default layout: `<root>/<locale>/data` and `<root>/<locale>/assets`,
/// with optional per-locale overrides.
#[derive(Clone, Debug)]
pub struct DirectoryLayout {
    root: PathBuf,
    overrides: HashMap<String, LocaleDirs>,
}

impl DirectoryLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            overrides: HashMap::new(),
        }
    }

    /// Pin a locale to explicit directories.
    pub fn with_locale(mut self, locale: impl Into<String>, dirs: LocaleDirs) -> Self {
        self.overrides.insert(locale.into(), dirs);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PathResolver for DirectoryLayout {
    fn content_dir(&self, locale: &str) -> PathBuf {
        match self.overrides.get(locale) {
            Some(dirs) => dirs.content_dir.clone(),
            None => self.root.join(locale).join("data"),
        }
    }

    fn asset_dir(&self, locale: &str) -> PathBuf {
        match self.overrides.get(locale) {
            Some(dirs) => dirs.asset_dir.clone(),
            None => self.root.join(locale).join("assets"),
        }
    }
}
