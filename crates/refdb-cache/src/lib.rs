//! Fallback cache for refdb.
//!
//! The store mirrors every write into a process-wide cache keyed by
//! (locale, content type). When on-disk persistence is disabled for assets,
//! asset reads are served from this cache instead of a collection file.
//!
//! # Modules
//!
//! - [`error`] — Error types for cache operations
//! - [`traits`] — The [`FallbackCache`] trait and [`CacheUpdate`]
//! - [`memory`] — [`InMemoryFallbackCache`], the default implementation

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{CacheError, CacheResult};
pub use memory::InMemoryFallbackCache;
pub use traits::{CacheUpdate, FallbackCache};
