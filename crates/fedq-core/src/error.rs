//! Core error types.

use fedq_proto::Action;
use thiserror::Error;

/// Errors raised while evaluating a connector tree.
#[derive(Debug, Error)]
pub enum Error {
    /// A connector was asked to perform an action it does not implement.
    #[error("{connector}: unsupported action {action} in query [{query}]")]
    UnsupportedAction {
        connector: String,
        action: Action,
        query: String,
    },

    /// The query object is not recognized by the connector.
    #[error("{connector}: invalid object {object:?} in query [{query}]")]
    InvalidObject {
        connector: String,
        object: String,
        query: String,
    },

    /// An entry lacks an attribute that must be present.
    #[error("{connector}: missing attribute {attribute:?}")]
    MissingAttribute { connector: String, attribute: String },

    /// Several source attributes are renamed to the same target.
    #[error("ambiguous rename: {sources:?} all map to {target:?}")]
    AmbiguousRename { target: String, sources: Vec<String> },

    /// Derived attributes depend on each other in a cycle, or probing their
    /// dependencies did not terminate.
    #[error("dependency cycle between derived attributes: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// A derived attribute function failed.
    #[error("failed to compute attribute {attribute:?}: {message}")]
    Lambda { attribute: String, message: String },

    /// A join predicate read an attribute absent from one of the rows.
    #[error("{connector}: join predicate failed on {left} / {right}: {message}")]
    JoinPredicate {
        connector: String,
        left: String,
        right: String,
        message: String,
    },

    /// A child returned a result of the wrong kind.
    #[error("{connector}: expected {expected} from child, got {found}")]
    UnexpectedResult {
        connector: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Cache failure that could not be recovered locally.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Invalid configuration or unknown connector.
    #[error("configuration error: {0}")]
    Config(String),

    /// Data-model error.
    #[error("protocol error: {0}")]
    Protocol(#[from] fedq_proto::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn unsupported_action(connector: &str, query: &fedq_proto::Query) -> Self {
        Error::UnsupportedAction {
            connector: connector.to_string(),
            action: query.action,
            query: query.canonical(),
        }
    }
}

/// Result cache failures. Recoverable: the cache falls back to its child.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem failure.
    #[error("cache I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The result could not be encoded or decoded.
    #[error("cache serialization error: {0}")]
    Serialization(String),

    /// The stored payload is malformed.
    #[error("corrupt cache entry: {0}")]
    Corrupt(String),
}

impl CacheError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
