//! Error types for document relations
//!
//! Every failure is returned to the immediate caller. Nothing here retries,
//! and no fallback identifier is ever synthesized.

use thiserror::Error;

/// Result type alias for relation operations
pub type RelationResult<T> = Result<T, RelationError>;

/// Error types for relation resolution and mutation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RelationError {
    /// A value has no known reduction to an identifier
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// The store rejected a save or an array mutation
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// An attach/detach target could not be located by id
    #[error("Unresolved relation: no {model} with key '{id}'")]
    UnresolvedRelation { model: String, id: String },

    /// A record without a key was used where its key is required
    #[error("Record of type {model} has no key")]
    MissingKey { model: String },

    /// The query collaborator failed while reading
    #[error("Query error: {0}")]
    Query(String),
}

impl RelationError {
    /// Shorthand for an unresolved relation target
    pub fn unresolved(model: impl Into<String>, id: impl ToString) -> Self {
        RelationError::UnresolvedRelation {
            model: model.into(),
            id: id.to_string(),
        }
    }

    /// Shorthand for a missing record key
    pub fn missing_key(model: impl Into<String>) -> Self {
        RelationError::MissingKey {
            model: model.into(),
        }
    }

    /// Whether this error came from the persistence collaborator
    pub fn is_persistence(&self) -> bool {
        matches!(self, RelationError::PersistenceFailure(_))
    }
}

impl From<serde_json::Error> for RelationError {
    fn from(err: serde_json::Error) -> Self {
        RelationError::InvalidIdentifier(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelationError::unresolved("Tag", "5f1d7f1e2a4b3c0012345678");
        assert_eq!(
            err.to_string(),
            "Unresolved relation: no Tag with key '5f1d7f1e2a4b3c0012345678'"
        );

        let err = RelationError::missing_key("Post");
        assert_eq!(err.to_string(), "Record of type Post has no key");
    }

    #[test]
    fn test_persistence_classification() {
        assert!(RelationError::PersistenceFailure("disk full".into()).is_persistence());
        assert!(!RelationError::Query("timeout".into()).is_persistence());
    }
}
