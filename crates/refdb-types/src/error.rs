use thiserror::Error;

/// Errors produced while building or validating refdb types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("document must be a JSON object")]
    NotAnObject,

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` must be a non-empty string")]
    InvalidField { field: &'static str },

    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },
}
