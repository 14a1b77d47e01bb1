use thiserror::Error;

use crate::PromptKind;

/// Errors raised by the attribute model and the template store.
///
/// None of these are fatal: callers either ignore them (`InvalidInput`,
/// `NotFound`) or surface them next to the action that caused them.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("template '{0}' not found")]
    NotFound(String),

    #[error("unknown {kind} field '{field}'")]
    UnknownField { kind: PromptKind, field: String },

    #[error("snapshot does not match the {kind} field set: {message}")]
    ShapeMismatch { kind: PromptKind, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
