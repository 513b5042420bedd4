//! Protocol error types.

use thiserror::Error;

/// Data-model errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// A predicate string could not be parsed.
    #[error("parse error at byte {position}: {message}")]
    Parse { position: usize, message: String },

    /// A document did not have the expected shape.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl Error {
    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            position,
            message: message.into(),
        }
    }
}
