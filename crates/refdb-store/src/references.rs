//! Reference index derived from content-type definitions.
//!
//! A `_content_types` entry describes its fields as a `schema` list. Each
//! `reference` field names the content type it points at; each `file` field
//! points at `_assets`. `group` fields nest a `schema`, `blocks` fields nest a
//! list of blocks that each carry a `schema`. The index flattens this into
//! dotted field paths.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use refdb_types::names::{keys, ASSETS};
use refdb_types::ReferenceField;

/// What a reference field points at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceTarget {
    pub content_type: String,
    #[serde(default)]
    pub multiple: bool,
}

/// Field path to reference target, for one content type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceIndex(BTreeMap<String, ReferenceTarget>);

impl ReferenceIndex {
    /// Scan a content-type definition payload.
    pub fn from_definition(definition: &Value) -> Self {
        let mut index = BTreeMap::new();
        if let Some(schema) = definition.get("schema").and_then(Value::as_array) {
            scan_schema(schema, "", &mut index);
        }
        Self(index)
    }

    /// Read an index previously stored under `_references`.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        payload
            .get(keys::REFERENCES)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Compute the index of a definition payload and store it under
    /// `_references`. Non-object payloads are left untouched.
    pub fn attach(definition: &mut Value) -> Self {
        let index = Self::from_definition(definition);
        if let Value::Object(map) = definition {
            map.insert(keys::REFERENCES.into(), index.to_value());
        }
        index
    }

    pub fn get(&self, path: &str) -> Option<&ReferenceTarget> {
        self.0.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ReferenceTarget)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_value(&self) -> Value {
        let map = self
            .0
            .iter()
            .map(|(path, target)| {
                let mut t = Map::with_capacity(2);
                t.insert("content_type".into(), Value::String(target.content_type.clone()));
                t.insert("multiple".into(), Value::Bool(target.multiple));
                (path.clone(), Value::Object(t))
            })
            .collect();
        Value::Object(map)
    }

    /// Rewrite raw uid values at indexed paths into reference fields.
    ///
    /// A string becomes a single-valued reference, an array of strings a
    /// multi-valued one. An object carrying a string `uid` (an inlined asset)
    /// is reduced to that uid. Arrays along a path are walked element-wise.
    /// Values already in reference shape, or of any other shape, are kept.
    /// Returns the number of fields rewritten.
    pub fn shape_entry(&self, payload: &mut Value) -> usize {
        self.0
            .iter()
            .map(|(path, target)| {
                let segments: Vec<&str> = path.split('.').collect();
                shape_at(payload, &segments, target)
            })
            .sum()
    }
}

fn scan_schema(fields: &[Value], prefix: &str, index: &mut BTreeMap<String, ReferenceTarget>) {
    for field in fields {
        let Some(uid) = field.get("uid").and_then(Value::as_str) else {
            continue;
        };
        let path = format!("{prefix}{uid}");
        match field.get("data_type").and_then(Value::as_str) {
            Some("reference") => {
                let Some(content_type) = reference_to(field) else {
                    continue;
                };
                let multiple = field
                    .pointer("/field_metadata/ref_multiple")
                    .and_then(Value::as_bool)
                    .or_else(|| field.get("multiple").and_then(Value::as_bool))
                    .unwrap_or(false);
                index.insert(path, ReferenceTarget { content_type, multiple });
            }
            Some("file") => {
                let multiple = field.get("multiple").and_then(Value::as_bool).unwrap_or(false);
                index.insert(
                    path,
                    ReferenceTarget {
                        content_type: ASSETS.to_string(),
                        multiple,
                    },
                );
            }
            Some("group") => {
                if let Some(schema) = field.get("schema").and_then(Value::as_array) {
                    scan_schema(schema, &format!("{path}."), index);
                }
            }
            Some("blocks") => {
                for block in field.get("blocks").and_then(Value::as_array).into_iter().flatten() {
                    let (Some(block_uid), Some(schema)) = (
                        block.get("uid").and_then(Value::as_str),
                        block.get("schema").and_then(Value::as_array),
                    ) else {
                        continue;
                    };
                    scan_schema(schema, &format!("{path}.{block_uid}."), index);
                }
            }
            _ => {}
        }
    }
}

/// `reference_to` is a content type uid, or a list of them for
/// multi-content-type references; the first one is used.
fn reference_to(field: &Value) -> Option<String> {
    match field.get("reference_to")? {
        Value::String(ct) if !ct.is_empty() => Some(ct.clone()),
        Value::Array(cts) => cts.iter().find_map(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn shape_at(value: &mut Value, segments: &[&str], target: &ReferenceTarget) -> usize {
    if let Value::Array(items) = value {
        return items.iter_mut().map(|item| shape_at(item, segments, target)).sum();
    }
    let Some((first, rest)) = segments.split_first() else {
        return 0;
    };
    let Some(child) = value.as_object_mut().and_then(|map| map.get_mut(*first)) else {
        return 0;
    };
    if !rest.is_empty() {
        return shape_at(child, rest, target);
    }

    match raw_reference(child, target) {
        Some(field) => {
            *child = field.to_value();
            1
        }
        None => 0,
    }
}

/// The reference held by a value found at an indexed path: a stored
/// reference field as is, or a raw uid read per [`ReferenceIndex::shape_entry`].
pub fn reference_at(value: &Value, target: &ReferenceTarget) -> Option<ReferenceField> {
    match value {
        Value::Object(map) => ReferenceField::from_map(map).or_else(|| raw_reference(value, target)),
        _ => raw_reference(value, target),
    }
}

fn raw_reference(value: &Value, target: &ReferenceTarget) -> Option<ReferenceField> {
    match value {
        Value::String(uid) if target.multiple => Some(ReferenceField::many(&target.content_type, [uid.clone()])),
        Value::String(uid) => Some(ReferenceField::one(&target.content_type, uid.clone())),
        Value::Object(map) if ReferenceField::from_map(map).is_none() => map
            .get(keys::PAYLOAD_UID)
            .and_then(Value::as_str)
            .map(|uid| ReferenceField::one(&target.content_type, uid)),
        Value::Array(items) if items.iter().all(Value::is_string) => Some(ReferenceField::many(
            &target.content_type,
            items.iter().filter_map(Value::as_str),
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn blog_definition() -> Value {
        json!({
            "uid": "blog",
            "title": "Blog",
            "schema": [
                {"uid": "title", "data_type": "text"},
                {"uid": "authors", "data_type": "reference", "reference_to": "author",
                 "field_metadata": {"ref_multiple": true}},
                {"uid": "category", "data_type": "reference", "reference_to": ["category"]},
                {"uid": "hero", "data_type": "file"},
                {"uid": "seo", "data_type": "group", "schema": [
                    {"uid": "image", "data_type": "file"}
                ]},
                {"uid": "sections", "data_type": "blocks", "blocks": [
                    {"uid": "quote", "schema": [
                        {"uid": "by", "data_type": "reference", "reference_to": "author"}
                    ]}
                ]}
            ]
        })
    }

    #[test]
    fn index_from_schema() {
        let index = ReferenceIndex::from_definition(&blog_definition());
        let paths: Vec<&str> = index.iter().map(|(p, _)| p).collect();
        assert_eq!(paths, ["authors", "category", "hero", "sections.quote.by", "seo.image"]);
        assert_eq!(
            index.get("authors"),
            Some(&ReferenceTarget { content_type: "author".into(), multiple: true })
        );
        assert_eq!(index.get("category").unwrap().content_type, "category");
        assert!(!index.get("category").unwrap().multiple);
        assert_eq!(index.get("seo.image").unwrap().content_type, ASSETS);
    }

    #[test]
    fn missing_schema_is_empty() {
        assert!(ReferenceIndex::from_definition(&json!({"uid": "x"})).is_empty());
        assert!(ReferenceIndex::from_definition(&json!("not an object")).is_empty());
    }

    #[test]
    fn attach_and_read_back() {
        let mut def = blog_definition();
        let index = ReferenceIndex::attach(&mut def);
        assert_eq!(def["_references"]["authors"], json!({"content_type": "author", "multiple": true}));
        assert_eq!(ReferenceIndex::from_payload(&def), Some(index));
    }

    #[test]
    fn shape_rewrites_raw_uids() {
        let index = ReferenceIndex::from_definition(&blog_definition());
        let mut entry = json!({
            "uid": "post",
            "title": "Hello",
            "authors": ["a1", "a2"],
            "category": "news",
            "hero": {"uid": "img1", "url": "/img1.png"},
            "seo": {"image": "img2"},
            "sections": [{"quote": {"by": "a3"}}, {"quote": {"text": "no author"}}]
        });

        assert_eq!(index.shape_entry(&mut entry), 5);
        assert_eq!(entry["authors"], ReferenceField::many("author", ["a1", "a2"]).to_value());
        assert_eq!(entry["category"], ReferenceField::one("category", "news").to_value());
        assert_eq!(entry["hero"], ReferenceField::one(ASSETS, "img1").to_value());
        assert_eq!(entry["seo"]["image"], ReferenceField::one(ASSETS, "img2").to_value());
        assert_eq!(entry["sections"][0]["quote"]["by"], ReferenceField::one("author", "a3").to_value());
        assert_eq!(entry["title"], "Hello");
    }

    #[test]
    fn shape_is_idempotent() {
        let index = ReferenceIndex::from_definition(&blog_definition());
        let mut entry = json!({"authors": ["a1"], "category": 7});
        assert_eq!(index.shape_entry(&mut entry), 1);
        let once = entry.clone();
        assert_eq!(index.shape_entry(&mut entry), 0);
        assert_eq!(entry, once);
    }

    #[test]
    fn reference_at_reads_stored_and_raw_fields() {
        let one = ReferenceTarget { content_type: "author".into(), multiple: false };
        let many = ReferenceTarget { content_type: "author".into(), multiple: true };
        let stored = ReferenceField::many("page", ["x"]);

        assert_eq!(reference_at(&json!("a1"), &one), Some(ReferenceField::one("author", "a1")));
        assert_eq!(reference_at(&json!("a1"), &many), Some(ReferenceField::many("author", ["a1"])));
        assert_eq!(reference_at(&json!({"uid": "a2", "name": "Bob"}), &one), Some(ReferenceField::one("author", "a2")));
        assert_eq!(reference_at(&stored.to_value(), &one), Some(stored));
        assert_eq!(reference_at(&json!(7), &one), None);
        assert_eq!(reference_at(&json!(["a", 1]), &many), None);
    }
}
