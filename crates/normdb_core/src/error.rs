//! Error types for NormDB core.

use crate::schema::Violation;
use normdb_adapter::AdapterError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in NormDB core operations.
///
/// `CoreError` is `Clone` so the result of a de-duplicated find can be
/// delivered to every waiting caller.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoreError {
    /// A public method received a value of the wrong type.
    #[error("illegal argument: {message}")]
    IllegalArgument {
        /// What was wrong with the argument.
        message: String,
    },

    /// A named secondary index does not exist on the collection.
    #[error("index not found: {name}")]
    IndexNotFound {
        /// Name of the missing index.
        name: String,
    },

    /// No mapper is registered under this entity type name.
    #[error("mapper not found: {name}")]
    MapperNotFound {
        /// Entity type name.
        name: String,
    },

    /// No collection is registered under this entity type name.
    #[error("collection not found: {name}")]
    CollectionNotFound {
        /// Entity type name.
        name: String,
    },

    /// No adapter is registered under this name.
    #[error("adapter not found: {name}")]
    AdapterNotFound {
        /// Adapter registration name.
        name: String,
    },

    /// Record construction or mutation violated schema constraints.
    #[error("validation failed: {} violation(s)", violations.len())]
    Validation {
        /// One descriptor per violated constraint.
        violations: Vec<Violation>,
    },

    /// A backend adapter call failed.
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),
}

impl CoreError {
    /// Creates an illegal-argument error.
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::IllegalArgument {
            message: message.into(),
        }
    }

    /// Creates an index-not-found error.
    pub fn index_not_found(name: impl Into<String>) -> Self {
        Self::IndexNotFound { name: name.into() }
    }

    /// Creates a mapper-not-found error.
    pub fn mapper_not_found(name: impl Into<String>) -> Self {
        Self::MapperNotFound { name: name.into() }
    }

    /// Creates a collection-not-found error.
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::CollectionNotFound { name: name.into() }
    }

    /// Creates an adapter-not-found error.
    pub fn adapter_not_found(name: impl Into<String>) -> Self {
        Self::AdapterNotFound { name: name.into() }
    }

    /// Creates a validation error from violation descriptors.
    pub fn validation(violations: Vec<Violation>) -> Self {
        Self::Validation { violations }
    }
}
