//! Backend error handling
//!
//! Typed errors for persistence, session files and change-stream
//! transport, with user-facing messages and recovery hints.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::BookmarkId;

/// Errors reported by the backend collaborators
#[derive(Error, Debug)]
pub enum BackendError {
    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No bookmark with this ID
    #[error("Bookmark not found: {id}")]
    NotFound { id: BookmarkId },

    /// Permission denied accessing path
    #[error("Permission denied: cannot access '{path}'. Check file permissions.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Disk is full or quota exceeded
    #[error(
        "Disk full or quota exceeded while writing to '{path}'. Free up disk space and try again."
    )]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read file
    #[error("Failed to read '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write file
    #[error("Failed to write '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Stored or received data could not be (de)serialized
    #[error("Invalid data: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Could not reach the realtime server
    #[error("Connection to '{url}' failed: {details}")]
    Connection { url: String, details: String },

    /// The realtime server sent something we do not understand
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Subscribing to the change stream failed
    #[error("Subscription failed: {0}")]
    Subscription(String),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl BackendError {
    /// Create an error from an I/O error with path context
    ///
    /// Classifies the error based on its kind (permission, disk full, etc.)
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => BackendError::PermissionDenied {
                path,
                source: error,
            },
            _ if is_disk_full_error(&error) => BackendError::DiskFull {
                path,
                source: error,
            },
            _ => BackendError::WriteError {
                path,
                source: error,
            },
        }
    }

    /// Whether retrying the same operation later may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            BackendError::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            BackendError::DiskFull { .. }
            | BackendError::Connection { .. }
            | BackendError::Subscription(_) => true,
            _ => false,
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            BackendError::DiskFull { .. } => Some("Free up disk space and try again."),
            BackendError::PermissionDenied { .. } => {
                Some("Check file and directory permissions for the data directory.")
            }
            BackendError::Connection { .. } | BackendError::Subscription(_) => {
                Some("Check realtime_url and api_key, and that the server is reachable.")
            }
            _ => None,
        }
    }
}

/// Check if an I/O error indicates disk full condition
fn is_disk_full_error(error: &io::Error) -> bool {
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left")
        || msg.contains("disk full")
        || msg.contains("quota exceeded")
        || msg.contains("not enough space")
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
