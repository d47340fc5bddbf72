//! String interning for component, relation, and property keys.
//!
//! Component type keys, relation keys, and property names are interned to
//! enable fast equality comparison and cheap set operations in the index
//! maps and the query planner.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Interned key identifier.
///
/// Keys identify component types (`"position"`), relation types
/// (`"parent_of"`), and component properties (`"x"`). They are interned
/// for fast comparison; two keys are equal iff their strings are equal
/// within the same [`KeyInterner`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Key(pub(crate) u32);

impl Key {
    /// Returns the raw index of this key.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.0)
    }
}

/// Interner mapping key strings to [`Key`]s and back.
///
/// Not thread-safe; the world owns one and all interning happens on the
/// control thread.
#[derive(Clone, Debug, Default)]
pub struct KeyInterner {
    /// Key strings, indexed by key id.
    names: Vec<Arc<str>>,
    /// Map from string to key.
    by_name: HashMap<Arc<str>, Key>,
    /// Memoized relation key -> reverse key mapping.
    reverse: HashMap<Key, Key>,
}

impl KeyInterner {
    /// Creates a new empty interner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a key string, returning its [`Key`].
    ///
    /// # Panics
    ///
    /// Panics if the number of interned keys exceeds `u32::MAX`.
    pub fn intern(&mut self, name: &str) -> Key {
        if let Some(&key) = self.by_name.get(name) {
            return key;
        }

        let idx = u32::try_from(self.names.len()).expect("too many interned keys");
        let arc: Arc<str> = name.into();
        self.names.push(arc.clone());

        let key = Key(idx);
        self.by_name.insert(arc, key);
        key
    }

    /// Gets the string for a key.
    #[must_use]
    pub fn resolve(&self, key: Key) -> Option<&str> {
        self.names.get(key.0 as usize).map(AsRef::as_ref)
    }

    /// Looks up a key by its string without interning.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Key> {
        self.by_name.get(name).copied()
    }

    /// Returns the reverse-index key for a relation key.
    ///
    /// The reverse key for relation `"parent_of"` is `"reverse_parent_of"`.
    /// The mapping is memoized.
    pub fn reverse_of(&mut self, relation: Key) -> Key {
        if let Some(&rev) = self.reverse.get(&relation) {
            return rev;
        }

        let name = self
            .resolve(relation)
            .map(|n| format!("reverse_{n}"))
            .unwrap_or_else(|| format!("reverse_#{}", relation.0));
        let rev = self.intern(&name);
        self.reverse.insert(relation, rev);
        rev
    }

    /// Returns the number of interned keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if no keys have been interned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
