//! Reserved content types, reserved keys, and name validation.
//!
//! Content type uids and locale codes become path components on disk
//! (`<root>/<locale>/data/<content_type>.json`), so both are validated before
//! any path is built:
//! - Must be non-empty
//! - Must not contain whitespace, path separators, or `:`, `*`, `?`
//! - Must not contain `..`

use crate::error::TypeError;

/// The asset content type. Its reference values are literal uids rather than
/// uid lists, and it may be served from the fallback cache.
pub const ASSETS: &str = "_assets";

/// The content-type definition content type. Writes derive a reference index.
pub const CONTENT_TYPES: &str = "_content_types";

/// The routing content type. Bulk inserts take identity from `entry.uid`.
pub const ROUTES: &str = "_routes";

/// Keys of the stored record and of queries.
pub mod keys {
    pub const UID: &str = "_uid";
    pub const CONTENT_TYPE_UID: &str = "_content_type_uid";
    pub const DATA: &str = "_data";
    pub const LOCALE: &str = "locale";
    pub const INCLUDE_REFERENCES: &str = "include_references";
    pub const INCLUDE_COUNT: &str = "include_count";
    pub const REMOVE: &str = "_remove";

    /// Identity field inside an entry payload.
    pub const PAYLOAD_UID: &str = "uid";
    /// Derived reference index stored inside content-type definitions.
    pub const REFERENCES: &str = "_references";
}

/// Query keys that drive control flow and never reach the predicate matcher.
pub const RESERVED_QUERY_KEYS: &[&str] = &[
    keys::LOCALE,
    keys::CONTENT_TYPE_UID,
    keys::INCLUDE_REFERENCES,
    keys::INCLUDE_COUNT,
    keys::REMOVE,
];

/// Returns `true` if `key` is one of the reserved query keys.
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_QUERY_KEYS.contains(&key)
}

const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '/', '\\', ':', '*', '?'];

fn validate_path_component(kind: &str, name: &str) -> Result<(), TypeError> {
    let invalid = |reason: String| TypeError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid(format!("{kind} must not be empty")));
    }
    if let Some(ch) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(invalid(format!("contains forbidden character: {ch:?}")));
    }
    if name.contains("..") {
        return Err(invalid("must not contain '..'".into()));
    }
    Ok(())
}

/// Validate a content type uid before it is used as a file name.
///
/// ```
/// use refdb_types::validate_content_type_uid;
///
/// assert!(validate_content_type_uid("blog_post").is_ok());
/// assert!(validate_content_type_uid("_assets").is_ok());
/// assert!(validate_content_type_uid("../etc").is_err());
/// ```
pub fn validate_content_type_uid(name: &str) -> Result<(), TypeError> {
    validate_path_component("content type uid", name)
}

/// Validate a locale code before it is used as a directory name.
pub fn validate_locale(code: &str) -> Result<(), TypeError> {
    validate_path_component("locale", code)
}
