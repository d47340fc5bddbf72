//! Component data storage.
//!
//! A component is an opaque bag of field values keyed by a stable,
//! interned type key. Components hold only data; behavior lives in
//! systems.

use std::collections::HashMap;

use weft_foundation::{Key, Value};

/// A component instance: a type key plus field values.
///
/// An entity holds at most one component per type key; inserting a second
/// component with the same key overwrites the first.
#[derive(Clone, Debug, PartialEq)]
pub struct Component {
    key: Key,
    fields: HashMap<Key, Value>,
}

impl Component {
    /// Creates a new component with no fields.
    #[must_use]
    pub fn new(key: Key) -> Self {
        Self {
            key,
            fields: HashMap::new(),
        }
    }

    /// Creates a tag component (presence-only, no data).
    #[must_use]
    pub fn tag(key: Key) -> Self {
        Self::new(key)
    }

    /// Adds a field to the component.
    #[must_use]
    pub fn with_field(mut self, name: Key, value: impl Into<Value>) -> Self {
        self.fields.insert(name, value.into());
        self
    }

    /// Returns the component's type key.
    #[must_use]
    pub fn key(&self) -> Key {
        self.key
    }

    /// Gets a field value.
    #[must_use]
    pub fn get(&self, name: Key) -> Option<&Value> {
        self.fields.get(&name)
    }

    /// Sets a field value, returning the previous value if any.
    ///
    /// This is a silent data write; change notifications are the world's
    /// concern.
    pub fn set(&mut self, name: Key, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name, value.into())
    }

    /// Removes a field, returning its value if it was present.
    pub fn remove(&mut self, name: Key) -> Option<Value> {
        self.fields.remove(&name)
    }

    /// Returns true if the component has the named field.
    #[must_use]
    pub fn has(&self, name: Key) -> bool {
        self.fields.contains_key(&name)
    }

    /// Iterates over the component's fields.
    pub fn fields(&self) -> impl Iterator<Item = (Key, &Value)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the component carries no data (a tag).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
