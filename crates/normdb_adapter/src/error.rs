//! Error types for adapter operations.

use thiserror::Error;

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Errors returned by backend adapters.
///
/// `AdapterError` is `Clone` so a single failed request can be fanned
/// out to every caller waiting on a de-duplicated query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    /// The adapter does not implement this operation.
    #[error("adapter does not support operation: {operation}")]
    Unsupported {
        /// Name of the unsupported operation.
        operation: &'static str,
    },

    /// The requested entity does not exist in the backend.
    #[error("entity not found: {entity} id {id}")]
    NotFound {
        /// Entity type name.
        entity: String,
        /// Display form of the missing id.
        id: String,
    },

    /// The backend failed.
    #[error("backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },
}

impl AdapterError {
    /// Creates an unsupported-operation error.
    pub fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported { operation }
    }

    /// Creates a not-found error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}
