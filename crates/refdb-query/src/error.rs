//! Error types for query handling.

use refdb_types::TypeError;
use thiserror::Error;

/// Errors raised while normalizing or evaluating a query.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    /// The query (or a nested filter) is not a JSON object.
    #[error("query must be a JSON object")]
    NotAnObject,

    /// No usable `locale` was supplied.
    #[error("query is missing a `locale`")]
    MissingLocale,

    /// A reserved key carries a value of the wrong type.
    #[error("reserved key `{key}` has an invalid value")]
    InvalidReserved { key: &'static str },

    /// A `$`-prefixed operator the matcher does not implement.
    #[error("unknown query operator `{0}`")]
    UnknownOperator(String),

    /// An operator received an operand of the wrong type.
    #[error("operator `{op}` expects {expected}")]
    InvalidOperand { op: String, expected: &'static str },

    /// Sort/skip/limit options could not be parsed.
    #[error("invalid find options: {0}")]
    InvalidOptions(String),

    /// A locale or content type uid is not a valid name.
    #[error(transparent)]
    InvalidName(#[from] TypeError),
}

/// Convenience type alias for query operations.
pub type QueryResult<T> = std::result::Result<T, QueryError>;
