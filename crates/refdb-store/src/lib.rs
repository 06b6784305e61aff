//! Reference-resolving document store.
//!
//! [`Store`] serves queries over per-(locale, content type) JSON collection
//! files and resolves reference fields into the documents they point at.
//!
//! # Modules
//!
//! - [`config`] — [`StoreConfig`], loaded from TOML
//! - [`store`] — [`Store`] and its result types
//! - [`resolver`] — Breadth-first reference resolution with cycle guard
//! - [`references`] — [`ReferenceIndex`] derived from content-type definitions
//! - [`hooks`] — [`NotFoundHook`] for missing content types
//! - [`error`] — [`StoreError`]

pub mod config;
pub mod error;
pub mod hooks;
pub mod references;
pub mod resolver;
pub mod store;

pub use config::{AssetsConfig, LocaleConfig, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use hooks::{LogNotFound, NotFoundHook};
pub use references::{ReferenceIndex, ReferenceTarget};
pub use resolver::{resolve_entries, ReferenceSet, ReferenceSource};
pub use store::{BulkInsert, Count, Find, FindOne, Store};

pub use refdb_query::{FindOptions, Query, SortKey, SortOrder};
pub use refdb_types::{Entry, EntryDocument, ReferenceField};
