//! Ordered change log with transaction grouping

use tracing::debug;

use crate::change::{Change, ChangeSet};
use crate::content::Content;
use crate::error::{LvcsError, LvcsResult};
use crate::tree::EntryTree;
use crate::{EntryId, LogIndex};

/// Committed changes in the order they were applied, plus the changes of
/// the transaction in progress.
///
/// Pending changes are already applied to the tree but are not visible to
/// history queries until the transaction ends.
#[derive(Clone, Debug, Default)]
pub struct ChangeList {
    changes: Vec<Change>,
    pending: Option<Vec<Change>>,
}

impl ChangeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a log read back from persisted state.
    pub fn from_changes(changes: Vec<Change>) -> Self {
        Self {
            changes,
            pending: None,
        }
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn get(&self, index: LogIndex) -> Option<&Change> {
        self.changes.get(index.0)
    }

    /// Changes of the open transaction, in the order they were applied.
    pub fn pending(&self) -> &[Change] {
        self.pending.as_deref().unwrap_or_default()
    }

    pub fn in_change_set(&self) -> bool {
        self.pending.is_some()
    }

    pub fn begin_change_set(&mut self) -> LvcsResult<()> {
        if self.pending.is_some() {
            return Err(LvcsError::TransactionAlreadyOpen);
        }
        self.pending = Some(Vec::new());
        Ok(())
    }

    /// Records an applied change into the open transaction.
    pub fn add_change(&mut self, change: Change) -> LvcsResult<()> {
        self.pending
            .as_mut()
            .ok_or(LvcsError::NoOpenTransaction)?
            .push(change);
        Ok(())
    }

    /// Commits the open transaction. An empty transaction leaves no trace and
    /// a single change is logged as is.
    pub fn end_change_set(&mut self, name: Option<String>) -> LvcsResult<()> {
        let mut pending = self.pending.take().ok_or(LvcsError::NoOpenTransaction)?;
        match pending.len() {
            0 => {}
            1 => self.changes.extend(pending.pop()),
            n => {
                debug!("Committing change set {:?} with {} changes", name, n);
                self.changes
                    .push(Change::ChangeSet(ChangeSet::new(name, pending)));
            }
        }
        Ok(())
    }

    /// Log entries that affected the entry at `path`, newest first, ending
    /// with the change that created it.
    pub fn changes_for(&self, tree: &EntryTree, path: &str) -> LvcsResult<Vec<(LogIndex, &Change)>> {
        Ok(self.changes_for_id(tree.get_entry(path)?.id()))
    }

    /// Same as [`changes_for`](Self::changes_for) for an entry known by id.
    pub fn changes_for_id(&self, id: EntryId) -> Vec<(LogIndex, &Change)> {
        let mut result = Vec::new();
        for (i, change) in self.changes.iter().enumerate().rev() {
            if !change.affects(id) {
                continue;
            }
            result.push((LogIndex(i), change));
            if change.is_creational_for(id) {
                break;
            }
        }
        result
    }

    /// True when `first` was logged before `second`.
    pub fn is_before(&self, first: LogIndex, second: LogIndex, can_be_equal: bool) -> bool {
        if can_be_equal {
            first <= second
        } else {
            first < second
        }
    }

    /// The entry at `index` followed by every later entry that touched the
    /// same entries as some member of the chain, directly or through an
    /// ancestor.
    pub fn get_chain(&self, index: LogIndex) -> Vec<LogIndex> {
        let mut chain = vec![index];
        let Some(_) = self.changes.get(index.0) else {
            return Vec::new();
        };
        for later in index.0 + 1..self.changes.len() {
            let candidate = &self.changes[later];
            if chain
                .iter()
                .any(|member| self.changes[member.0].affects_same_as(candidate))
            {
                chain.push(LogIndex(later));
            }
        }
        chain
    }

    /// Drops the oldest entries older than `cutoff` and returns the contents
    /// they superseded. Log positions taken before the purge are invalid
    /// afterwards.
    pub fn purge_obsolete(&mut self, cutoff: i64) -> Vec<Content> {
        let count = self
            .changes
            .iter()
            .position(|change| change.timestamp() >= cutoff)
            .unwrap_or(self.changes.len());
        let purged: Vec<Change> = self.changes.drain(..count).collect();
        debug!("Purged {} log entries older than {}", purged.len(), cutoff);
        purged
            .iter()
            .flat_map(Change::superseded_contents)
            .collect()
    }
}
