//! Error types for the backup trigger.

use thiserror::Error;

/// Result type alias for backup operations.
pub type BackupResult<T> = Result<T, BackupError>;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sync exited with code {code}: {output}")]
    Failed { code: i32, output: String },
}
