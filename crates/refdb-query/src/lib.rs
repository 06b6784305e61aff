//! Query handling for refdb.
//!
//! A raw query is a JSON mapping mixing reserved control keys (`locale`,
//! `_content_type_uid`, `include_references`, `include_count`, `_remove`)
//! with content filter keys. This crate splits the two, evaluates filters
//! against stored records, and orders and pages the matches.
//!
//! # Modules
//!
//! - [`normalize`] — [`Query`] builder and [`NormalizedQuery`]
//! - [`matcher`] — Mongo-style predicate evaluation over records
//! - [`options`] — [`FindOptions`]: sort keys, skip and limit
//! - [`value`] — Ordering and equality over JSON values

pub mod error;
pub mod matcher;
pub mod normalize;
pub mod options;
pub mod value;

pub use error::{QueryError, QueryResult};
pub use matcher::{filter_entries, matches};
pub use normalize::{NormalizedQuery, Query};
pub use options::{paginate, sort_entries, FindOptions, SortKey, SortOrder, DEFAULT_SORT_FIELD};
