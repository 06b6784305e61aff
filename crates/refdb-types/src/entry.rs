use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TypeError;
use crate::names::keys;

/// A stored document.
///
/// Collection files hold a JSON array of these records. `uid` is the sole
/// identity key within one (locale, content type) collection; `data` is the
/// schema-less payload handed back to callers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(rename = "_uid")]
    pub uid: String,
    #[serde(rename = "_content_type_uid")]
    pub content_type_uid: String,
    #[serde(rename = "_data", default)]
    pub data: Value,
}

impl Entry {
    pub fn new(uid: impl Into<String>, content_type_uid: impl Into<String>, data: Value) -> Self {
        Self {
            uid: uid.into(),
            content_type_uid: content_type_uid.into(),
            data,
        }
    }

    /// Check the identity fields every persisted entry must carry.
    pub fn validate(&self) -> Result<(), TypeError> {
        if self.uid.is_empty() {
            return Err(TypeError::InvalidField { field: keys::UID });
        }
        if self.content_type_uid.is_empty() {
            return Err(TypeError::InvalidField {
                field: keys::CONTENT_TYPE_UID,
            });
        }
        Ok(())
    }

    /// The record as a JSON object, the form the predicate matcher sees.
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(3);
        map.insert(keys::UID.into(), Value::String(self.uid.clone()));
        map.insert(
            keys::CONTENT_TYPE_UID.into(),
            Value::String(self.content_type_uid.clone()),
        );
        map.insert(keys::DATA.into(), self.data.clone());
        Value::Object(map)
    }
}

/// An entry addressed to a locale: the input of insert and upsert.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntryDocument {
    pub locale: String,
    #[serde(flatten)]
    pub entry: Entry,
}

impl EntryDocument {
    pub fn new(locale: impl Into<String>, entry: Entry) -> Self {
        Self {
            locale: locale.into(),
            entry,
        }
    }

    /// Parse a write request from a raw JSON mapping.
    ///
    /// Keys other than `locale`, `_uid`, `_content_type_uid` and `_data` are
    /// dropped; a missing `_data` becomes `null`.
    pub fn from_value(value: Value) -> Result<Self, TypeError> {
        let Value::Object(mut map) = value else {
            return Err(TypeError::NotAnObject);
        };

        let locale = take_string(&mut map, keys::LOCALE)?;
        let uid = take_string(&mut map, keys::UID)?;
        let content_type_uid = take_string(&mut map, keys::CONTENT_TYPE_UID)?;
        let data = map.remove(keys::DATA).unwrap_or(Value::Null);

        Ok(Self {
            locale,
            entry: Entry::new(uid, content_type_uid, data),
        })
    }
}

impl TryFrom<Value> for EntryDocument {
    type Error = TypeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

fn take_string(map: &mut Map<String, Value>, field: &'static str) -> Result<String, TypeError> {
    match map.remove(field) {
        None | Some(Value::Null) => Err(TypeError::MissingField(field)),
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(_) => Err(TypeError::InvalidField { field }),
    }
}
