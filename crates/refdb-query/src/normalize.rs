//! The query normalizer.
//!
//! [`Query`] is the raw mapping a caller hands to the store.
//! [`Query::normalize`] strips the reserved keys into [`NormalizedQuery`]
//! metadata and leaves a pure content filter for the predicate matcher.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use refdb_types::names::keys;
use refdb_types::{validate_content_type_uid, validate_locale};

use crate::error::{QueryError, QueryResult};

/// A raw query: reserved control keys plus content filter keys.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(Map<String, Value>);

impl Query {
    /// A query addressing one content type in one locale.
    pub fn new(locale: impl Into<String>, content_type_uid: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert(keys::LOCALE.into(), Value::String(locale.into()));
        map.insert(
            keys::CONTENT_TYPE_UID.into(),
            Value::String(content_type_uid.into()),
        );
        Self(map)
    }

    /// Wrap a raw JSON value, rejecting anything but an object.
    pub fn from_value(value: Value) -> QueryResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(QueryError::NotAnObject),
        }
    }

    /// Add (or replace) a key. Reserved keys may be set this way too.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Select a single entry by `_uid`.
    pub fn uid(self, uid: impl Into<String>) -> Self {
        self.with(keys::UID, Value::String(uid.into()))
    }

    pub fn include_references(self, include: bool) -> Self {
        self.with(keys::INCLUDE_REFERENCES, Value::Bool(include))
    }

    pub fn include_count(self, include: bool) -> Self {
        self.with(keys::INCLUDE_COUNT, Value::Bool(include))
    }

    /// Return internal records instead of unwrapped payloads.
    pub fn raw(self, raw: bool) -> Self {
        self.with(keys::REMOVE, Value::Bool(raw))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Split the query into control metadata and a pure content filter.
    pub fn normalize(&self) -> QueryResult<NormalizedQuery> {
        let locale = match self.0.get(keys::LOCALE) {
            Some(Value::String(code)) if !code.is_empty() => code.clone(),
            _ => return Err(QueryError::MissingLocale),
        };
        validate_locale(&locale)?;

        let content_type_uid = match self.0.get(keys::CONTENT_TYPE_UID) {
            None | Some(Value::Null) => None,
            Some(Value::String(uid)) => {
                validate_content_type_uid(uid)?;
                Some(uid.clone())
            }
            Some(_) => {
                return Err(QueryError::InvalidReserved {
                    key: keys::CONTENT_TYPE_UID,
                })
            }
        };

        let filter = self
            .0
            .iter()
            .filter(|(key, _)| !refdb_types::names::is_reserved_key(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(NormalizedQuery {
            locale,
            content_type_uid,
            include_references: flag(&self.0, keys::INCLUDE_REFERENCES, true)?,
            include_count: flag(&self.0, keys::INCLUDE_COUNT, false)?,
            raw: flag(&self.0, keys::REMOVE, false)?,
            filter,
        })
    }
}

impl From<Map<String, Value>> for Query {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Query {
    type Error = QueryError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

/// Reads a boolean control flag. Query strings deliver flags as text, so
/// `"true"`/`"false"` and `1`/`0` are accepted alongside JSON booleans.
fn flag(map: &Map<String, Value>, key: &'static str, default: bool) -> QueryResult<bool> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) if s == "true" => Ok(true),
        Some(Value::String(s)) if s == "false" => Ok(false),
        Some(Value::Number(n)) if n.as_i64() == Some(1) => Ok(true),
        Some(Value::Number(n)) if n.as_i64() == Some(0) => Ok(false),
        Some(_) => Err(QueryError::InvalidReserved { key }),
    }
}

/// A query with its reserved keys extracted.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedQuery {
    pub locale: String,
    pub content_type_uid: Option<String>,
    /// Resolve reference fields in the results (default `true`).
    pub include_references: bool,
    /// Attach a `count` to find results (default `false`).
    pub include_count: bool,
    /// Return internal records rather than payloads (the `_remove` key).
    pub raw: bool,
    /// Content filter with every reserved key removed.
    pub filter: Map<String, Value>,
}

impl NormalizedQuery {
    /// The content type, or a validation error when the query has none.
    pub fn require_content_type(&self) -> QueryResult<&str> {
        self.content_type_uid
            .as_deref()
            .ok_or(QueryError::InvalidReserved {
                key: keys::CONTENT_TYPE_UID,
            })
    }

    /// The `_uid` the filter pins, if it pins exactly one by equality.
    pub fn pinned_uid(&self) -> Option<&str> {
        self.filter.get(keys::UID).and_then(Value::as_str)
    }
}
