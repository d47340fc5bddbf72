//! Core types for the Weft ECS runtime.
//!
//! This crate provides:
//! - [`Key`] - Interned identifiers for component types, relations, and properties
//! - [`EntityKey`] - Generational entity handles
//! - [`Value`] - The dynamic value type for component fields
//! - [`Error`] - Error types for world operations

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod entity;
pub mod error;
pub mod key;
pub mod value;

// Re-export primary types at crate root for convenience
pub use entity::EntityKey;
pub use error::{Error, ErrorKind};
pub use key::{Key, KeyInterner};
pub use value::Value;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
