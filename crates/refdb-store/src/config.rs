use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use refdb_fs::{DirectoryLayout, LocaleDirs};

use crate::error::{StoreError, StoreResult};

/// Configuration for a [`Store`](crate::Store).
///
/// ```toml
/// content_root = "./_content"
///
/// [[locales]]
/// code = "en-us"
///
/// [[locales]]
/// code = "fr-fr"
/// content_dir = "/srv/fr/data"
///
/// [assets]
/// download = false
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root of the default `<root>/<locale>/{data,assets}` layout.
    pub content_root: PathBuf,
    /// Known locales. Empty accepts any locale code.
    pub locales: Vec<LocaleConfig>,
    pub assets: AssetsConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            content_root: PathBuf::from("./_content"),
            locales: Vec::new(),
            assets: AssetsConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleConfig {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_dir: Option<PathBuf>,
}

impl LocaleConfig {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            content_dir: None,
            asset_dir: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Whether asset collections are persisted on disk. When `false`, asset
    /// reads without a backing file are served from the fallback cache.
    pub download: bool,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self { download: true }
    }
}

impl StoreConfig {
    /// A default configuration rooted at `content_root`.
    pub fn with_root(content_root: impl Into<PathBuf>) -> Self {
        Self {
            content_root: content_root.into(),
            ..Default::default()
        }
    }

    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> StoreResult<String> {
        toml::to_string_pretty(self).map_err(|e| StoreError::Config(e.to_string()))
    }

    pub async fn load(path: &Path) -> StoreResult<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Returns `true` if `code` may be queried.
    pub fn accepts_locale(&self, code: &str) -> bool {
        self.locales.is_empty() || self.locales.iter().any(|l| l.code == code)
    }

    /// The on-disk layout described by this configuration.
    pub fn layout(&self) -> DirectoryLayout {
        let mut layout = DirectoryLayout::new(&self.content_root);
        for locale in &self.locales {
            if locale.content_dir.is_none() && locale.asset_dir.is_none() {
                continue;
            }
            let base = self.content_root.join(&locale.code);
            let dirs = LocaleDirs {
                content_dir: locale.content_dir.clone().unwrap_or_else(|| base.join("data")),
                asset_dir: locale.asset_dir.clone().unwrap_or_else(|| base.join("assets")),
            };
            layout = layout.with_locale(locale.code.clone(), dirs);
        }
        layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refdb_fs::PathResolver;

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert_eq!(c.content_root, PathBuf::from("./_content"));
        assert!(c.locales.is_empty());
        assert!(c.assets.download);
        assert!(c.accepts_locale("anything"));
    }

    #[test]
    fn parse_toml() {
        let c = StoreConfig::from_toml_str(
            r#"
            content_root = "/srv/content"

            [[locales]]
            code = "en-us"

            [[locales]]
            code = "fr-fr"
            content_dir = "/fr/data"

            [assets]
            download = false
            "#,
        )
        .unwrap();

        assert_eq!(c.locales.len(), 2);
        assert!(!c.assets.download);
        assert!(c.accepts_locale("en-us"));
        assert!(!c.accepts_locale("de-de"));

        let layout = c.layout();
        assert_eq!(layout.content_dir("fr-fr"), PathBuf::from("/fr/data"));
        assert_eq!(layout.asset_dir("fr-fr"), PathBuf::from("/srv/content/fr-fr/assets"));
        assert_eq!(layout.content_dir("en-us"), PathBuf::from("/srv/content/en-us/data"));
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(StoreConfig::from_toml_str("").unwrap(), StoreConfig::default());
    }

    #[test]
    fn bad_toml_is_config_error() {
        let err = StoreConfig::from_toml_str("locales = 3").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn toml_roundtrip() {
        let mut c = StoreConfig::with_root("/data");
        c.locales.push(LocaleConfig::new("en-us"));
        let text = c.to_toml_string().unwrap();
        assert_eq!(StoreConfig::from_toml_str(&text).unwrap(), c);
    }

    #[tokio::test]
    async fn load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("refdb.toml");
        std::fs::write(&path, "[assets]\ndownload = false\n").unwrap();
        let c = StoreConfig::load(&path).await.unwrap();
        assert!(!c.assets.download);

        let missing = StoreConfig::load(&dir.path().join("nope.toml")).await;
        assert!(matches!(missing, Err(StoreError::Config(_))));
    }
}
