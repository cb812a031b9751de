// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Last-known-good position per entity.

use std::collections::HashMap;

use crate::host::{EntityId, Position};

/// A position that passed the location check when it was recorded.
///
/// Only the diagnoser can mint one, so every cached value is validated input.
#[derive(Debug, Clone, PartialEq)]
pub struct SafePosition(Position);

impl SafePosition {
    pub(crate) fn validated(position: Position) -> Self {
        Self(position)
    }

    /// Borrow the underlying position.
    pub fn position(&self) -> &Position {
        &self.0
    }

    /// Unwrap into an owned position.
    pub fn into_inner(self) -> Position {
        self.0
    }
}

/// Mapping from entity to its last validated position. Pure storage.
#[derive(Debug, Default)]
pub struct SafeStateCache {
    entries: HashMap<EntityId, SafePosition>,
}

impl SafeStateCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (or replaces) the entity's safe position.
    pub fn commit(&mut self, id: EntityId, position: SafePosition) {
        self.entries.insert(id, position);
    }

    /// A copy of the cached position, if any.
    pub fn get(&self, id: EntityId) -> Option<Position> {
        self.entries.get(&id).map(|p| p.position().clone())
    }

    /// Drops the entry for `id`. Returns whether one existed.
    pub fn remove(&mut self, id: EntityId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Number of cached entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forgets every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_a_detached_copy() {
        let mut cache = SafeStateCache::new();
        let id = EntityId(7);
        cache.commit(id, SafePosition::validated(Position::new("w", 1.0, 64.0, 2.0)));

        let mut copy = cache.get(id).unwrap_or_else(|| Position::new("", 0.0, 0.0, 0.0));
        copy.y = -999.0;
        assert_eq!(cache.get(id).map(|p| p.y), Some(64.0));
    }

    #[test]
    fn remove_and_clear() {
        let mut cache = SafeStateCache::new();
        cache.commit(EntityId(1), SafePosition::validated(Position::new("w", 0.0, 0.0, 0.0)));
        cache.commit(EntityId(2), SafePosition::validated(Position::new("w", 0.0, 0.0, 0.0)));
        assert!(cache.remove(EntityId(1)));
        assert!(!cache.remove(EntityId(1)));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
