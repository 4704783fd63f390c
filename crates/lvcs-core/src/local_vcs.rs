//! The local history façade: tree mutation, change logging, queries, persistence

use std::borrow::Cow;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::change::{
    Change, ChangeFileContentChange, CreateDirectoryChange, CreateFileChange, DeleteChange,
    MoveChange, PutEntryLabelChange, PutLabelChange, PutSystemLabelChange, RenameChange,
};
use crate::change_list::ChangeList;
use crate::clock::Clock;
use crate::config::LvcsConfig;
use crate::content::Content;
use crate::error::{LvcsError, LvcsResult};
use crate::revisions::{
    walk, ByteContentRetriever, RecentChange, Revision, RevisionKind, RevisionsCollector,
    TimestampComparator,
};
use crate::storage::Storage;
use crate::stream::{Memento, StreamWriter};
use crate::tree::{Entry, EntryRef, EntryTree};
use crate::{EntryId, LogIndex};

/// Local history of one virtual file tree.
///
/// Every mutation is applied to the tree and logged. Outside an explicit
/// change set each mutation is logged on its own; between
/// [`begin_change_set`](Self::begin_change_set) and
/// [`end_change_set`](Self::end_change_set) the mutations are grouped.
pub struct LocalVcs {
    config: LvcsConfig,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    root: EntryTree,
    entry_counter: i32,
    change_list: ChangeList,
    dirty: bool,
}

impl LocalVcs {
    /// Empty history, nothing read from `storage`.
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, config: LvcsConfig) -> Self {
        let root = EntryTree::new(config.case_sensitivity);
        Self {
            config,
            storage,
            clock,
            root,
            entry_counter: 0,
            change_list: ChangeList::new(),
            dirty: false,
        }
    }

    /// Loads the persisted state, or starts empty when there is none.
    pub fn open(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        config: LvcsConfig,
    ) -> LvcsResult<Self> {
        let Some(bytes) = storage.read_state()? else {
            info!("No local history state found, starting empty");
            return Ok(Self::new(storage, clock, config));
        };

        let memento = Memento::decode(&bytes, storage.clone())?;
        let root = EntryTree::from_root_entry(memento.root, config.case_sensitivity).map_err(
            |e| match e {
                LvcsError::Corrupted { .. } => e,
                other => LvcsError::corrupted(format!("inconsistent tree: {other}")),
            },
        )?;
        info!(
            "Loaded local history: {} log entries, entry counter {}",
            memento.changes.len(),
            memento.entry_counter
        );
        Ok(Self {
            config,
            storage,
            clock,
            root,
            entry_counter: memento.entry_counter,
            change_list: memento.changes,
            dirty: false,
        })
    }

    /// Like [`open`](Self::open), but corrupted state is discarded and the
    /// history starts over.
    pub fn open_or_rebuild(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        config: LvcsConfig,
    ) -> LvcsResult<Self> {
        match Self::open(storage.clone(), clock.clone(), config.clone()) {
            Err(e) if e.is_rebuild_needed() => {
                warn!("Discarding local history: {}", e);
                storage.discard_state()?;
                Ok(Self::new(storage, clock, config))
            }
            result => result,
        }
    }

    pub fn config(&self) -> &LvcsConfig {
        &self.config
    }

    pub fn tree(&self) -> &EntryTree {
        &self.root
    }

    pub fn change_list(&self) -> &ChangeList {
        &self.change_list
    }

    /// True when there is state not yet written by [`save`](Self::save).
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn has_entry(&self, path: &str) -> bool {
        self.root.has_entry(path)
    }

    pub fn get_entry(&self, path: &str) -> LvcsResult<EntryRef<'_>> {
        self.root.get_entry(path)
    }

    pub fn find_entry(&self, path: &str) -> Option<EntryRef<'_>> {
        self.root.find_entry(path)
    }

    pub fn roots(&self) -> Vec<EntryRef<'_>> {
        self.root.roots()
    }

    fn next_id(&self) -> EntryId {
        EntryId::new(self.entry_counter)
    }

    fn create_content(&self, bytes: &[u8]) -> Content {
        if bytes.len() > self.config.max_content_length {
            debug!("Content of {} bytes is over the limit, not recorded", bytes.len());
            return Content::Unavailable;
        }
        if bytes.len() <= self.config.inline_content_threshold {
            return Content::Bytes(bytes.to_vec());
        }
        match self.storage.store_content(bytes) {
            Ok(id) => Content::stored(id, self.storage.clone()),
            Err(e) => {
                warn!("Failed to store content, recording it as unavailable: {}", e);
                Content::Unavailable
            }
        }
    }

    /// Releases store entries of contents nothing refers to any more.
    fn dispose(&self, contents: &[Content]) -> LvcsResult<usize> {
        let ids: Vec<_> = contents.iter().filter_map(Content::stored_id).collect();
        if !ids.is_empty() {
            self.storage.purge_contents(&ids)?;
        }
        Ok(ids.len())
    }

    /// Applies `change` and logs it, on its own unless a change set is open.
    /// A change that fails to apply leaves the tree and the log untouched.
    fn apply(&mut self, change: impl Into<Change>) -> LvcsResult<()> {
        let mut change = change.into();
        change.apply_to(&mut self.root)?;
        if self.change_list.in_change_set() {
            self.change_list.add_change(change)?;
        } else {
            self.change_list.begin_change_set()?;
            self.change_list.add_change(change)?;
            self.change_list.end_change_set(None)?;
        }
        self.dirty = true;
        Ok(())
    }

    fn apply_with_content(&mut self, change: impl Into<Change>, content: &Content) -> LvcsResult<()> {
        let result = self.apply(change);
        if result.is_err() {
            if let Err(e) = self.dispose(std::slice::from_ref(content)) {
                warn!("Failed to release content of a rejected change: {}", e);
            }
        }
        result
    }

    /// The tree without the changes of the open change set.
    fn committed_tree(&self) -> LvcsResult<Cow<'_, EntryTree>> {
        let pending = self.change_list.pending();
        if pending.is_empty() {
            return Ok(Cow::Borrowed(&self.root));
        }
        let mut tree = self.root.clone();
        for change in pending.iter().rev() {
            change.revert_on(&mut tree)?;
        }
        Ok(Cow::Owned(tree))
    }

    pub fn create_file(&mut self, path: &str, bytes: &[u8], timestamp: i64) -> LvcsResult<EntryId> {
        let id = self.next_id();
        let content = self.create_content(bytes);
        self.apply_with_content(
            CreateFileChange::new(id, path, content.clone(), timestamp),
            &content,
        )?;
        self.entry_counter += 1;
        debug!("Created file {} with id {}", path, id);
        Ok(id)
    }

    pub fn create_directory(&mut self, path: &str) -> LvcsResult<EntryId> {
        let id = self.next_id();
        self.apply(CreateDirectoryChange::new(id, path, self.clock.now()))?;
        self.entry_counter += 1;
        debug!("Created directory {} with id {}", path, id);
        Ok(id)
    }

    pub fn change_file_content(&mut self, path: &str, bytes: &[u8], timestamp: i64) -> LvcsResult<()> {
        let content = self.create_content(bytes);
        self.apply_with_content(
            ChangeFileContentChange::new(path, content.clone(), timestamp),
            &content,
        )?;
        debug!("Changed content of {}", path);
        Ok(())
    }

    pub fn rename(&mut self, path: &str, new_name: &str) -> LvcsResult<()> {
        self.apply(RenameChange::new(path, new_name, self.clock.now()))?;
        debug!("Renamed {} to {}", path, new_name);
        Ok(())
    }

    /// Moves the entry under `new_parent_path`, the top level for an empty path.
    pub fn move_entry(&mut self, path: &str, new_parent_path: &str) -> LvcsResult<()> {
        self.apply(MoveChange::new(path, new_parent_path, self.clock.now()))?;
        debug!("Moved {} to {:?}", path, new_parent_path);
        Ok(())
    }

    pub fn delete(&mut self, path: &str) -> LvcsResult<()> {
        self.apply(DeleteChange::new(path, self.clock.now()))?;
        debug!("Deleted {}", path);
        Ok(())
    }

    pub fn put_label(&mut self, name: &str, is_global_mark: bool) -> LvcsResult<()> {
        self.apply(PutLabelChange::new(name, self.clock.now(), is_global_mark))
    }

    pub fn put_system_label(&mut self, name: &str, color: i32) -> LvcsResult<()> {
        self.apply(PutSystemLabelChange::new(name, self.clock.now(), color))
    }

    pub fn put_entry_label(&mut self, path: &str, name: &str) -> LvcsResult<()> {
        self.apply(PutEntryLabelChange::new(path, name, self.clock.now()))
    }

    pub fn begin_change_set(&mut self) -> LvcsResult<()> {
        self.change_list.begin_change_set()
    }

    pub fn end_change_set(&mut self, name: Option<&str>) -> LvcsResult<()> {
        self.change_list.end_change_set(name.map(str::to_string))
    }

    /// Revisions of the entry at `path`, newest first.
    /// Changes of an open change set are not part of the history yet.
    pub fn get_revisions_for(&self, path: &str) -> LvcsResult<Vec<Revision>> {
        let id = self.root.get_entry(path)?.id();
        let committed = self.committed_tree()?;
        let entry = committed
            .entry_by_id(id)
            .ok_or_else(|| LvcsError::entry_not_found(path))?;
        let changes = self.change_list.changes_for_id(id);
        debug!("Collecting revisions of {} from {} log entries", path, changes.len());
        let collector = RevisionsCollector::new(id, entry.content().cloned());
        Ok(walk(collector, id, &changes, self.clock.now()))
    }

    /// Bytes of the file at `path` right before the change picked by
    /// `comparator`. `None` when that content was not recorded or is gone
    /// from the store.
    pub fn get_byte_content(
        &self,
        path: &str,
        comparator: &dyn TimestampComparator,
    ) -> LvcsResult<Option<Vec<u8>>> {
        let id = self.root.get_entry(path)?.id();
        let committed = self.committed_tree()?;
        let entry = committed
            .entry_by_id(id)
            .ok_or_else(|| LvcsError::entry_not_found(path))?;
        let current = entry.content().cloned().ok_or_else(|| LvcsError::NotAFile {
            path: path.to_string(),
        })?;
        let changes = self.change_list.changes_for_id(id);
        let retriever = ByteContentRetriever::new(id, current, comparator);
        Ok(walk(retriever, id, &changes, self.clock.now()).bytes())
    }

    /// The most recent named structural change sets, newest first.
    pub fn get_recent_changes(&self) -> Vec<RecentChange> {
        self.change_list
            .changes()
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, change)| !change.is_label() && !change.is_content_change_only())
            .filter_map(|(i, change)| {
                let name = change.name()?.to_string();
                let revision = |kind| Revision {
                    entry_id: EntryId::ROOT,
                    timestamp: change.timestamp(),
                    kind,
                    content: None,
                };
                Some(RecentChange {
                    before: revision(RevisionKind::BeforeChange {
                        index: LogIndex(i),
                        name: Some(name.clone()),
                    }),
                    after: revision(RevisionKind::AfterChange {
                        index: LogIndex(i),
                        name: Some(name.clone()),
                    }),
                    name: Some(name),
                    timestamp: change.timestamp(),
                })
            })
            .take(self.config.recent_changes_limit)
            .collect()
    }

    /// Rebuilds the entry of `revision` as it was at that point, subtree included.
    /// `None` when the entry did not exist then.
    pub fn entry_at(&self, revision: &Revision) -> LvcsResult<Option<Entry>> {
        let mut tree = self.committed_tree()?.into_owned();
        let keep = match &revision.kind {
            RevisionKind::Current => self.change_list.len(),
            RevisionKind::Labeled { index, .. } | RevisionKind::AfterChange { index, .. } => {
                index.0 + 1
            }
            RevisionKind::BeforeChange { index, .. } => index.0,
        };
        let newer = self
            .change_list
            .changes()
            .get(keep..)
            .ok_or(LvcsError::UnknownLogPosition { index: keep })?;
        for change in newer.iter().rev() {
            change.revert_on(&mut tree)?;
        }
        Ok(tree.snapshot(revision.entry_id))
    }

    /// Writes the state if anything changed since the last save. Changes of
    /// an open change set are left out until it is closed.
    pub fn save(&mut self) -> LvcsResult<()> {
        if !self.dirty {
            debug!("Local history unchanged, nothing to save");
            return Ok(());
        }

        let pending = self.change_list.pending().len();
        if pending > 0 {
            warn!(
                "Saving local history with an open change set, {} pending changes left out",
                pending
            );
        }
        let root = self.committed_tree()?.to_root_entry();

        let mut writer = StreamWriter::new(Vec::new());
        writer.write_state(&root, self.entry_counter, &self.change_list)?;
        let bytes = writer.into_inner();
        self.storage.write_state(&bytes)?;
        info!(
            "Saved local history: {} log entries, {} bytes",
            self.change_list.len(),
            bytes.len()
        );

        self.dirty = pending > 0;
        Ok(())
    }

    /// Drops log entries older than `period_ms` before now and releases the
    /// contents only they referred to. Returns how many stored contents were released.
    pub fn purge_obsolete(&mut self, period_ms: i64) -> LvcsResult<usize> {
        let cutoff = self.clock.now().saturating_sub(period_ms);
        let before = self.change_list.len();
        let superseded = self.change_list.purge_obsolete(cutoff);
        let purged = before - self.change_list.len();
        if purged > 0 {
            self.dirty = true;
        }
        let released = self.dispose(&superseded)?;
        info!(
            "Purged {} log entries older than {}, released {} contents",
            purged, cutoff, released
        );
        Ok(released)
    }

    pub fn purge_obsolete_and_save(&mut self) -> LvcsResult<usize> {
        let released = self.purge_obsolete(self.config.purge_period_ms)?;
        self.save()?;
        Ok(released)
    }
}
