//! Identifier types for engine records.
//!
//! Regions and tokens live in arenas owned by the engine; these wrappers keep
//! the two index spaces apart at the type level.

use crate::util::ArenaIndex;
use core::fmt;

/// Identifies a region in the engine's region arena.
///
/// Regions form a tree; the root is the execution region of a run.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub(crate) ArenaIndex);

impl RegionId {
    pub(crate) const fn from_arena(index: ArenaIndex) -> Self {
        Self(index)
    }

    pub(crate) const fn arena_index(self) -> ArenaIndex {
        self.0
    }

    /// Creates a region id from raw parts, for tests and benchmarks.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(slot: u32, generation: u32) -> Self {
        Self(ArenaIndex::new(slot, generation))
    }
}

impl fmt::Debug for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegionId({}:{})", self.0.slot(), self.0.generation())
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0.slot())
    }
}

/// Identifies a token in the engine's token arena.
///
/// Ids handed to futures and to the site call boundary may outlive the token
/// itself; a lookup with a stale id simply finds nothing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub(crate) ArenaIndex);

impl TokenId {
    pub(crate) const fn from_arena(index: ArenaIndex) -> Self {
        Self(index)
    }

    pub(crate) const fn arena_index(self) -> ArenaIndex {
        self.0
    }

    /// Creates a token id from raw parts, for tests and benchmarks.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(slot: u32, generation: u32) -> Self {
        Self(ArenaIndex::new(slot, generation))
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId({}:{})", self.0.slot(), self.0.generation())
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0.slot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_slot_only() {
        assert_eq!(RegionId::new_for_test(3, 7).to_string(), "R3");
        assert_eq!(TokenId::new_for_test(12, 1).to_string(), "T12");
    }

    #[test]
    fn generations_distinguish_ids() {
        assert_ne!(TokenId::new_for_test(1, 0), TokenId::new_for_test(1, 1));
        assert_eq!(
            format!("{:?}", RegionId::new_for_test(1, 2)),
            "RegionId(1:2)"
        );
    }
}
