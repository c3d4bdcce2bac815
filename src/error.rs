//! Error taxonomy shared across the engine.

use thiserror::Error;

/// Result alias used by every engine operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors the engine can surface to callers.
///
/// Lookups by exact key return `Ok(None)` rather than [`Error::NotFound`],
/// so callers can distinguish "nothing matched" from "operation failed".
/// Storage-level errors propagate uncaught; the engine performs no retries.
#[derive(Error, Debug)]
pub enum Error {
    /// An externally-supplied identifier could not be parsed into an [`crate::ident::Id`].
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// The language is not in the fixed supported-language set.
    #[error("unsupported language: {0:?}")]
    UnsupportedLanguage(String),

    /// The index type is not in the fixed index-type set.
    #[error("unsupported index type: {0:?}")]
    UnsupportedIndexType(String),

    /// The singleton meta document has not been created yet.
    #[error("meta registry is not initialised")]
    MetaUninitialized,

    /// An entity that was required to exist is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Database error (wraps sqlx::Error).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Annotation payloads are stored as JSON; decoding them can fail.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error (wraps std::io::Error).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
