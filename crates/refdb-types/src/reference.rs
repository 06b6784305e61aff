//! Reference fields and the tagged field-shape model.
//!
//! A reference field is a payload object of the form
//! `{"_content_type_id": "<target>", "values": "<uid>" | ["<uid>", ...]}`.
//! [`FieldShape::classify`] decides once per node whether it is a reference,
//! so traversal code matches on a variant instead of probing keys.

use serde_json::{json, Map, Value};

use crate::names::ASSETS;

/// Key naming the referenced content type.
pub const TARGET_KEY: &str = "_content_type_id";

/// Key holding the referenced uid(s).
pub const VALUES_KEY: &str = "values";

/// How many entries a reference field points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cardinality {
    /// A single uid (or, for assets, a literal value). Resolves to one object.
    One(String),
    /// An ordered uid list. Resolves to a list in the same order.
    Many(Vec<String>),
}

/// A link from a payload field to entries of another content type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceField {
    pub target: String,
    pub cardinality: Cardinality,
}

impl ReferenceField {
    pub fn one(target: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            cardinality: Cardinality::One(uid.into()),
        }
    }

    pub fn many<I, S>(target: impl Into<String>, uids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            target: target.into(),
            cardinality: Cardinality::Many(uids.into_iter().map(Into::into).collect()),
        }
    }

    /// Parse a JSON object as a reference field.
    ///
    /// Returns `None` unless the object names a string target and `values`
    /// is a string, an array, null, or absent. Non-string array members are
    /// ignored.
    pub fn from_map(map: &Map<String, Value>) -> Option<Self> {
        let target = map.get(TARGET_KEY)?.as_str()?;
        if target.is_empty() {
            return None;
        }
        let cardinality = match map.get(VALUES_KEY) {
            Some(Value::String(uid)) => Cardinality::One(uid.clone()),
            Some(Value::Array(items)) => Cardinality::Many(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ),
            None | Some(Value::Null) => Cardinality::Many(Vec::new()),
            Some(_) => return None,
        };
        Some(Self {
            target: target.to_string(),
            cardinality,
        })
    }

    /// Returns `true` if this field points into the asset content type.
    pub fn is_asset(&self) -> bool {
        self.target == ASSETS
    }

    /// The referenced uids, in requested order.
    pub fn uids(&self) -> Vec<&str> {
        match &self.cardinality {
            Cardinality::One(uid) => vec![uid.as_str()],
            Cardinality::Many(uids) => uids.iter().map(String::as_str).collect(),
        }
    }

    pub fn to_value(&self) -> Value {
        let values = match &self.cardinality {
            Cardinality::One(uid) => json!(uid),
            Cardinality::Many(uids) => json!(uids),
        };
        let mut map = Map::with_capacity(2);
        map.insert(TARGET_KEY.into(), Value::String(self.target.clone()));
        map.insert(VALUES_KEY.into(), values);
        Value::Object(map)
    }
}

/// Classification of a single JSON node during traversal.
#[derive(Debug)]
pub enum FieldShape<'a> {
    Scalar,
    Object(&'a Map<String, Value>),
    Array(&'a [Value]),
    Reference(ReferenceField),
}

impl<'a> FieldShape<'a> {
    pub fn classify(value: &'a Value) -> Self {
        match value {
            Value::Object(map) => match ReferenceField::from_map(map) {
                Some(field) => Self::Reference(field),
                None => Self::Object(map),
            },
            Value::Array(items) => Self::Array(items),
            _ => Self::Scalar,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference(_))
    }
}
