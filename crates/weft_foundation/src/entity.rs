//! Entity handles with generational indices.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Non-owning handle to an entity slot in the world.
///
/// The generation counter increments when a slot is reused after removal,
/// so handles to removed entities can be detected as stale. Index sets and
/// relationship targets hold these handles rather than owning references.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityKey {
    /// Index into entity storage.
    pub index: u32,
    /// Generation counter for stale reference detection.
    pub generation: u32,
}

impl EntityKey {
    /// Creates a new entity key with the given index and generation.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns a sentinel value representing "no entity".
    #[must_use]
    pub const fn null() -> Self {
        Self {
            index: u32::MAX,
            generation: 0,
        }
    }

    /// Returns true if this is the null sentinel value.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.index == u32::MAX && self.generation == 0
    }
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "EntityKey(null)")
        } else {
            write!(f, "EntityKey({}v{})", self.index, self.generation)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_key_roundtrip() {
        let key = EntityKey::new(42, 7);
        assert_eq!(key.index, 42);
        assert_eq!(key.generation, 7);
    }

    #[test]
    fn null_is_null() {
        assert!(EntityKey::null().is_null());
        assert!(!EntityKey::new(0, 1).is_null());
    }
}
