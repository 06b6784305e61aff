//! Collection file storage for refdb.
//!
//! Each (locale, content type) collection is one JSON file holding an array
//! of entries, newest first. Files are only ever replaced whole.
//!
//! # Design Rules
//!
//! 1. A write serializes the full collection to a sibling temp file and
//!    renames it over the target, so readers see the old or the new array.
//! 2. Reads take no lock.
//! 3. Read-modify-write cycles hold the collection's [`CollectionLocks`]
//!    guard; writers to different collections never wait on each other.
//! 4. All I/O errors are propagated with the offending path.

pub mod collection;
pub mod error;
pub mod lock;
pub mod paths;

pub use collection::CollectionFiles;
pub use error::{CollectionError, CollectionResult};
pub use lock::CollectionLocks;
pub use paths::{DirectoryLayout, LocaleDirs, PathResolver};
