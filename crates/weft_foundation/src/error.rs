//! Error types for world operations.
//!
//! Uses `thiserror` for ergonomic error definition. Conditions the world
//! recovers from locally (duplicate ids, double-removes, stale relationship
//! targets) are not errors; only genuinely unexpected states surface here.

use thiserror::Error;

use crate::entity::EntityKey;

/// The main error type for Weft operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind }
    }

    /// Creates an entity not found error.
    #[must_use]
    pub fn entity_not_found(key: EntityKey) -> Self {
        Self::new(ErrorKind::EntityNotFound(key))
    }

    /// Creates a stale entity reference error.
    #[must_use]
    pub fn stale_entity(key: EntityKey) -> Self {
        Self::new(ErrorKind::StaleEntity(key))
    }

    /// Creates a dependency cycle error.
    #[must_use]
    pub fn dependency_cycle(group: impl Into<String>, systems: Vec<String>) -> Self {
        Self::new(ErrorKind::DependencyCycle {
            group: group.into(),
            systems,
        })
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(message.into()))
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Entity was not found in storage.
    #[error("entity not found: {0:?}")]
    EntityNotFound(EntityKey),

    /// Entity handle is stale (generation mismatch).
    #[error("stale entity handle: {0:?}")]
    StaleEntity(EntityKey),

    /// System dependency declarations form a cycle.
    #[error("dependency cycle in group {group:?} involving: {systems:?}")]
    DependencyCycle {
        /// The group whose ordering failed.
        group: String,
        /// Systems left unordered when the sort stalled.
        systems: Vec<String>,
    },

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_not_found_formats_key() {
        let err = Error::entity_not_found(EntityKey::new(42, 1));
        assert!(matches!(err.kind, ErrorKind::EntityNotFound(_)));
        assert!(format!("{err}").contains("42"));
    }

    #[test]
    fn dependency_cycle_lists_systems() {
        let err = Error::dependency_cycle("physics", vec!["a".into(), "b".into()]);
        let msg = format!("{err}");
        assert!(msg.contains("physics"));
        assert!(msg.contains('a'));
        assert!(msg.contains('b'));
    }
}
