//! Reference resolution.
//!
//! Each pass scans the entries for reference fields, fetches every field's
//! targets concurrently, and splices the fetched payloads in place. Fetched
//! entries arrive already resolved, so passes repeat until a scan comes back
//! empty.
//!
//! When the entries' content type has a [`ReferenceIndex`], only its declared
//! paths are scanned and a single pass is made. Without one, every node in
//! reference-field shape is resolved.
//!
//! Cycles are cut by a [`ReferenceSet`] threaded through nested fetches.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::{Map, Value};
use tracing::debug;

use refdb_types::names::keys;
use refdb_types::{Cardinality, Entry, FieldShape, ReferenceField};

use crate::error::{StoreError, StoreResult};
use crate::references::{reference_at, ReferenceIndex, ReferenceTarget};

/// Cycle guard for one resolution.
///
/// `ancestors` is the chain of uids from the outermost entry down to the
/// field being resolved. `resolved` records, per parent uid, the uids already
/// fetched beneath it; a candidate is checked against the nearest ancestor
/// that has fetched anything. Each nested fetch gets its own clone, so sibling
/// branches never see each other's state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReferenceSet {
    ancestors: Vec<String>,
    resolved: BTreeMap<String, BTreeSet<String>>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    /// Whether fetching `uid` from the field at `path` would revisit
    /// something. `path` is the field's ancestor chain, nearest last.
    /// With `check_visited` unset only the ancestor chain is consulted.
    pub fn is_cyclic(&self, path: &[String], uid: &str, check_visited: bool) -> bool {
        if path.iter().any(|a| a == uid) {
            return true;
        }
        if !check_visited {
            return false;
        }
        path.iter()
            .rev()
            .find_map(|ancestor| self.resolved.get(ancestor))
            .is_some_and(|seen| seen.contains(uid))
    }

    pub fn record<I, S>(&mut self, parent: &str, uids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resolved
            .entry(parent.to_string())
            .or_default()
            .extend(uids.into_iter().map(Into::into));
    }

    /// A copy for a nested fetch below the field at `path`.
    fn descend(&self, path: &[String]) -> Self {
        Self {
            ancestors: path.to_vec(),
            resolved: self.resolved.clone(),
        }
    }
}

/// Where the resolver fetches referenced entries from.
///
/// Implementations run a raw find over `content_type` selecting `uids`, and
/// resolve the fetched entries' own references under `references`. A missing
/// collection yields no entries rather than an error.
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn fetch_references(
        &self,
        locale: &str,
        content_type: &str,
        uids: Vec<String>,
        references: ReferenceSet,
    ) -> StoreResult<Vec<Entry>>;
}

/// Pointer, field and ancestor chain of a reference found in one payload.
type Found = (String, ReferenceField, Vec<String>);

/// A reference field found during a scan.
#[derive(Debug)]
struct Pending {
    entry: usize,
    pointer: String,
    field: ReferenceField,
    path: Vec<String>,
}

/// Resolve the reference fields in `entries`, in place. With an `index`
/// only the paths it declares are resolved.
pub async fn resolve_entries<S>(
    source: &S,
    locale: &str,
    entries: &mut [Entry],
    index: Option<&ReferenceIndex>,
    references: &ReferenceSet,
) -> StoreResult<()>
where
    S: ReferenceSource + ?Sized,
{
    let mut pass = 0usize;
    loop {
        let pending = scan_entries(entries, index, references);
        if pending.is_empty() {
            return Ok(());
        }
        pass += 1;
        debug!(locale, pass, fields = pending.len(), "resolving references");

        let fetches = pending.iter().map(|p| resolve_field(source, locale, p, references));
        let replacements = try_join_all(fetches).await?;

        for (p, value) in pending.into_iter().zip(replacements) {
            if let Some(slot) = entries[p.entry].data.pointer_mut(&p.pointer) {
                *slot = value;
            }
        }
        // Indexed paths now hold payloads, which a rescan would read as uids.
        if index.is_some() {
            return Ok(());
        }
    }
}

fn scan_entries(entries: &[Entry], index: Option<&ReferenceIndex>, references: &ReferenceSet) -> Vec<Pending> {
    let mut pending = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        let mut path = references.ancestors().to_vec();
        if path.last() != Some(&entry.uid) {
            path.push(entry.uid.clone());
        }
        let mut found = Vec::new();
        match index {
            Some(index) => {
                for (field_path, target) in index.iter() {
                    let segments: Vec<&str> = field_path.split('.').collect();
                    scan_indexed(&entry.data, &segments, target, String::new(), &mut path, &mut found);
                }
            }
            None => scan(&entry.data, String::new(), &mut path, &mut found),
        }
        pending.extend(found.into_iter().map(|(pointer, field, path)| Pending {
            entry: i,
            pointer,
            field,
            path,
        }));
    }
    pending
}

/// Depth-first walk collecting reference fields with their JSON pointer and
/// ancestor chain. Objects with a string `uid` join the chain while their
/// children are walked.
fn scan(value: &Value, pointer: String, path: &mut Vec<String>, found: &mut Vec<Found>) {
    match FieldShape::classify(value) {
        FieldShape::Reference(field) => found.push((pointer, field, path.clone())),
        FieldShape::Object(map) => {
            let pushed = push_owner(map, path);
            for (key, child) in map {
                scan(child, format!("{pointer}/{}", escape_pointer(key)), path, found);
            }
            if pushed {
                path.pop();
            }
        }
        FieldShape::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                scan(child, format!("{pointer}/{i}"), path, found);
            }
        }
        FieldShape::Scalar => {}
    }
}

/// Walk one indexed field path, fanning out over arrays along the way.
fn scan_indexed(
    value: &Value,
    segments: &[&str],
    target: &ReferenceTarget,
    pointer: String,
    path: &mut Vec<String>,
    found: &mut Vec<Found>,
) {
    if let Value::Array(items) = value {
        for (i, item) in items.iter().enumerate() {
            scan_indexed(item, segments, target, format!("{pointer}/{i}"), path, found);
        }
        return;
    }
    let (Some((first, rest)), Value::Object(map)) = (segments.split_first(), value) else {
        return;
    };
    let Some(child) = map.get(*first) else {
        return;
    };
    let pushed = push_owner(map, path);
    let pointer = format!("{pointer}/{}", escape_pointer(first));
    if rest.is_empty() {
        if let Some(field) = reference_at(child, target) {
            found.push((pointer, field, path.clone()));
        }
    } else {
        scan_indexed(child, rest, target, pointer, path, found);
    }
    if pushed {
        path.pop();
    }
}

/// Push an object's string `uid` onto the ancestor chain unless it is
/// already the nearest entry. Returns whether it was pushed.
fn push_owner(map: &Map<String, Value>, path: &mut Vec<String>) -> bool {
    match map.get(keys::PAYLOAD_UID) {
        Some(Value::String(uid)) if path.last() != Some(uid) => {
            path.push(uid.clone());
            true
        }
        _ => false,
    }
}

fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

async fn resolve_field<S>(
    source: &S,
    locale: &str,
    pending: &Pending,
    references: &ReferenceSet,
) -> StoreResult<Value>
where
    S: ReferenceSource + ?Sized,
{
    let field = &pending.field;
    let check_visited = !field.is_asset();
    let wanted: Vec<String> = field
        .uids()
        .into_iter()
        .filter(|uid| !references.is_cyclic(&pending.path, uid, check_visited))
        .map(str::to_string)
        .collect();

    let fetched = if wanted.is_empty() {
        Vec::new()
    } else {
        let mut nested = references.descend(&pending.path);
        if let Some(parent) = pending.path.last() {
            nested.record(parent, wanted.iter().cloned());
        }
        source
            .fetch_references(locale, &field.target, wanted.clone(), nested)
            .await
            .map_err(|e| StoreError::reference(&field.target, e))?
    };

    Ok(arrange(field, &wanted, fetched))
}

/// Build the replacement value: one payload (or `{}`) for single-valued
/// fields, payloads in requested order for multi-valued ones.
fn arrange(field: &ReferenceField, wanted: &[String], fetched: Vec<Entry>) -> Value {
    match field.cardinality {
        Cardinality::One(_) => fetched
            .into_iter()
            .find(|e| wanted.contains(&e.uid))
            .map(|e| e.data)
            .unwrap_or_else(|| Value::Object(Map::new())),
        Cardinality::Many(_) => {
            let mut by_uid: BTreeMap<&str, &Entry> = BTreeMap::new();
            for entry in &fetched {
                by_uid.entry(entry.uid.as_str()).or_insert(entry);
            }
            Value::Array(
                wanted
                    .iter()
                    .filter_map(|uid| by_uid.get(uid.as_str()))
                    .map(|e| e.data.clone())
                    .collect(),
            )
        }
    }
}
