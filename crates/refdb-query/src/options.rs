//! Find options: sort keys, skip and limit.

use serde_json::Value;

use refdb_types::names::keys;
use refdb_types::Entry;

use crate::error::{QueryError, QueryResult};
use crate::value::{get_path, sort_cmp};

/// Sort applied when the caller supplies none: newest published first.
pub const DEFAULT_SORT_FIELD: &str = "_data.published_at";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// `1` sorts ascending; any other direction sorts descending.
    pub fn from_direction(direction: i64) -> Self {
        if direction == 1 {
            Self::Asc
        } else {
            Self::Desc
        }
    }
}

/// One sort key. The path addresses the record; a leading `_data.` is
/// stripped since sorting runs over payloads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub path: String,
    pub order: SortOrder,
}

impl SortKey {
    pub fn new(path: impl Into<String>, order: SortOrder) -> Self {
        Self {
            path: path.into(),
            order,
        }
    }

    fn payload_path(&self) -> &str {
        let prefix = keys::DATA;
        self.path
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(&self.path)
    }
}

/// Options accepted by `find`.
///
/// `sort: None` means the default sort; `Some(vec![])` disables sorting and
/// keeps on-disk order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub sort: Option<Vec<SortKey>>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sort key.
    pub fn with_sort(mut self, path: impl Into<String>, order: SortOrder) -> Self {
        self.sort
            .get_or_insert_with(Vec::new)
            .push(SortKey::new(path, order));
        self
    }

    /// Keep on-disk order.
    pub fn unsorted(mut self) -> Self {
        self.sort = Some(Vec::new());
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The effective sort keys, falling back to [`DEFAULT_SORT_FIELD`]
    /// descending.
    pub fn sort_keys(&self) -> Vec<SortKey> {
        match &self.sort {
            Some(keys) => keys.clone(),
            None => vec![SortKey::new(DEFAULT_SORT_FIELD, SortOrder::Desc)],
        }
    }

    /// Parse `{"sort": {"<path>": 1|-1, ...}, "skip": n, "limit": n}`.
    pub fn from_value(value: &Value) -> QueryResult<Self> {
        let Value::Object(map) = value else {
            return Err(QueryError::InvalidOptions("options must be an object".into()));
        };

        let sort = match map.get("sort") {
            None | Some(Value::Null) => None,
            Some(Value::Object(fields)) => Some(
                fields
                    .iter()
                    .map(|(path, direction)| {
                        direction
                            .as_i64()
                            .map(|d| SortKey::new(path.clone(), SortOrder::from_direction(d)))
                            .ok_or_else(|| {
                                QueryError::InvalidOptions(format!(
                                    "sort direction for `{path}` must be 1 or -1"
                                ))
                            })
                    })
                    .collect::<QueryResult<Vec<_>>>()?,
            ),
            Some(_) => return Err(QueryError::InvalidOptions("sort must be an object".into())),
        };

        Ok(Self {
            sort,
            skip: count(map.get("skip"), "skip")?,
            limit: count(map.get("limit"), "limit")?,
        })
    }
}

fn count(value: Option<&Value>, name: &str) -> QueryResult<Option<usize>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| QueryError::InvalidOptions(format!("{name} must be a non-negative integer"))),
    }
}

/// Stable multi-key sort of entries by their payload fields.
pub fn sort_entries(entries: &mut [Entry], sort: &[SortKey]) {
    if sort.is_empty() {
        return;
    }
    entries.sort_by(|a, b| {
        for key in sort {
            let path = key.payload_path();
            let ordering = sort_cmp(get_path(&a.data, path), get_path(&b.data, path));
            let ordering = match key.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            };
            if ordering.is_ne() {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
}

/// Apply skip/limit. With a limit the window is `skip..skip + limit`;
/// without one, only `skip` items are dropped. A limit of `0` means no
/// limit. Bounds clamp to the input.
pub fn paginate<T>(items: Vec<T>, skip: Option<usize>, limit: Option<usize>) -> Vec<T> {
    let skip = skip.unwrap_or(0);
    match limit.filter(|&l| l > 0) {
        Some(limit) => items.into_iter().skip(skip).take(limit).collect(),
        None if skip > 0 => items.into_iter().skip(skip).collect(),
        None => items,
    }
}
