//! Error types for key store operations.

use thiserror::Error;

/// Result type alias for key store operations.
pub type KeyResult<T> = Result<T, KeyError>;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid minion id: {0:?}")]
    InvalidId(String),

    #[error("key i/o error for {id}: {source}")]
    Io {
        id: String,
        #[source]
        source: std::io::Error,
    },
}
