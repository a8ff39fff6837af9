//! Ledger error types

use std::path::PathBuf;
use thiserror::Error;

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors raised by ledger persistence and mutation
#[derive(Error, Debug)]
pub enum LedgerError {
    /// State file exists but cannot be read
    #[error("Failed to read state file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// State file content is not valid ledger JSON
    #[error("Failed to parse state file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Atomic persistence failed (temp write or rename)
    #[error("Failed to write state file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A requested finding does not exist in the ledger
    #[error("No finding with id: {id}")]
    UnknownFinding { id: String },

    /// A status transition the ledger does not permit
    #[error("Invalid status transition for {id}: {reason}")]
    InvalidTransition { id: String, reason: String },
}
