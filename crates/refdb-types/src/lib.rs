//! Foundation types for refdb.
//!
//! This crate provides the document and reference model shared by every other
//! refdb crate.
//!
//! # Key Types
//!
//! - [`Entry`] — A stored document: `{_uid, _content_type_uid, _data}`
//! - [`EntryDocument`] — An entry together with the locale it is written to
//! - [`ReferenceField`] — A `{_content_type_id, values}` link to other entries
//! - [`FieldShape`] — Tagged classification of a JSON node
//! - [`names`] — Reserved content types and query keys

pub mod entry;
pub mod error;
pub mod names;
pub mod reference;

pub use entry::{Entry, EntryDocument};
pub use error::TypeError;
pub use names::{validate_content_type_uid, validate_locale};
pub use reference::{Cardinality, FieldShape, ReferenceField};
