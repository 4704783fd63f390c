//! Core type definitions for the local history

use std::fmt;

/// Stable identifier of an entry across renames and moves
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(i32);

impl EntryId {
    /// Id of the synthetic root that holds the top-level entries
    pub const ROOT: EntryId = EntryId(-1);

    pub fn new(id: i32) -> Self {
        Self(id)
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a byte blob inside the content store
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(i32);

impl ContentId {
    pub fn new(id: i32) -> Self {
        Self(id)
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a top-level entry in the change log.
///
/// Positions are only meaningful until the next purge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogIndex(pub usize);

/// Chain of entry ids from the top-level entry down to the target entry,
/// captured when a change is applied. The synthetic root is not part of it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IdPath(Vec<EntryId>);

impl IdPath {
    pub fn new(ids: Vec<EntryId>) -> Self {
        Self(ids)
    }

    pub fn ids(&self) -> &[EntryId] {
        &self.0
    }

    /// Id of the entry the path points at.
    pub fn id(&self) -> EntryId {
        self.0.last().copied().unwrap_or(EntryId::ROOT)
    }

    /// Id of the parent of the entry, the synthetic root for top-level entries.
    pub fn parent_id(&self) -> EntryId {
        if self.0.len() < 2 {
            EntryId::ROOT
        } else {
            self.0[self.0.len() - 2]
        }
    }

    pub fn contains(&self, id: EntryId) -> bool {
        id == EntryId::ROOT || self.0.contains(&id)
    }

    pub fn starts_with(&self, prefix: &IdPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// True when one path is an ancestor-or-self of the other.
    pub fn overlaps(&self, other: &IdPath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}
