use crate::domain::errors::ValidationError;

/// Errors that can occur during storage operations
///
/// Backend failures keep the original `object_store` error as their source;
/// a missing object is never an error here, callers get `None` instead.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The key was rejected before reaching the backend
    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey {
        key: String,
        reason: ValidationError,
    },

    /// The key passed validation but the backend path encoding refused it
    #[error("Object key '{key}' cannot be used as a storage path: {message}")]
    UnsupportedKey { key: String, message: String },

    #[error("Invalid list limit {limit} (expected 1..={max})")]
    InvalidListLimit { limit: usize, max: usize },

    #[error("Invalid list cursor")]
    InvalidCursor,

    #[error("Invalid bucket configuration: {message}")]
    InvalidBucketConfig { message: String },

    /// Failure reported by the storage backend, passed through untouched
    #[error("Storage backend error during {operation}: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: object_store::Error,
    },

    #[error("Failed to decode object body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl StorageError {
    pub fn backend(operation: &'static str, source: object_store::Error) -> Self {
        StorageError::Backend { operation, source }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
