//! Backend-neutral poll store errors.

use std::{error::Error, fmt};

use thiserror::Error;

/// Result alias for poll store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Poll store call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOperation {
    /// Opening the backend connection (URI parsing, client setup, initial ping, indexes).
    Connect,
    /// Appending a completed poll record.
    Insert,
    /// Listing stored records.
    List,
    /// Looking up a record by id.
    Find,
    HealthCheck,
}

impl fmt::Display for StorageOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageOperation::Connect => "connect",
            StorageOperation::Insert => "insert poll",
            StorageOperation::List => "list polls",
            StorageOperation::Find => "find poll",
            StorageOperation::HealthCheck => "health check",
        };
        f.write_str(name)
    }
}

/// Error raised by poll stores regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("poll store {operation} failed: {message}")]
    Unavailable {
        operation: StorageOperation,
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Wrap a backend failure of `operation`.
    pub fn unavailable(
        operation: StorageOperation,
        message: String,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        StorageError::Unavailable {
            operation,
            message,
            source: Box::new(source),
        }
    }

    /// The store call that failed.
    pub fn operation(&self) -> StorageOperation {
        match self {
            StorageError::Unavailable { operation, .. } => *operation,
        }
    }
}
