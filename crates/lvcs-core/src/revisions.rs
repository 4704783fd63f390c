//! Revision reconstruction.
//!
//! History for an entry is rebuilt by walking the log entries that touched it,
//! newest first, without replaying the tree. The walk is shared; what it
//! produces is decided by a [`ChangeVisitor`]:
//!
//! - a log entry made only of labels goes to [`ChangeVisitor::visit_label`]
//! - any other log entry goes to [`ChangeVisitor::visit_regular`]
//! - an entry nothing touched gets [`ChangeVisitor::nothing_to_visit`]
//! - when the oldest visited entry neither labels nor creates the entry, the
//!   state before it is offered to
//!   [`ChangeVisitor::visit_first_available_non_creational`]
//!
//! A visitor stops the walk early by returning [`ControlFlow::Break`].

use std::ops::ControlFlow;

use crate::change::Change;
use crate::content::Content;
use crate::{EntryId, LogIndex};

/// Picks the change boundary whose content a caller wants.
pub trait TimestampComparator {
    fn is_suitable(&self, timestamp: i64) -> bool;
}

impl<F> TimestampComparator for F
where
    F: Fn(i64) -> bool,
{
    fn is_suitable(&self, timestamp: i64) -> bool {
        self(timestamp)
    }
}

/// Matches the change made exactly at `timestamp`.
pub fn exactly(timestamp: i64) -> impl TimestampComparator {
    move |candidate: i64| candidate == timestamp
}

/// Matches the newest change made at or before `timestamp`.
pub fn at_or_before(timestamp: i64) -> impl TimestampComparator {
    move |candidate: i64| candidate <= timestamp
}

#[derive(Clone, Debug, PartialEq)]
pub enum RevisionKind {
    /// The live state of an entry no retained change touched.
    Current,
    Labeled { index: LogIndex, name: String },
    /// State right after the log entry at `index`.
    AfterChange { index: LogIndex, name: Option<String> },
    /// State right before the log entry at `index`.
    BeforeChange { index: LogIndex, name: Option<String> },
}

/// A historical view of one entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Revision {
    pub entry_id: EntryId,
    pub timestamp: i64,
    pub kind: RevisionKind,
    /// File content at this revision. `None` for directories and labels.
    pub content: Option<Content>,
}

impl Revision {
    pub fn index(&self) -> Option<LogIndex> {
        match &self.kind {
            RevisionKind::Current => None,
            RevisionKind::Labeled { index, .. }
            | RevisionKind::AfterChange { index, .. }
            | RevisionKind::BeforeChange { index, .. } => Some(*index),
        }
    }

    /// Label text or change set name.
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            RevisionKind::Current => None,
            RevisionKind::Labeled { name, .. } => Some(name),
            RevisionKind::AfterChange { name, .. } | RevisionKind::BeforeChange { name, .. } => {
                name.as_deref()
            }
        }
    }

    pub fn is_label(&self) -> bool {
        matches!(self.kind, RevisionKind::Labeled { .. })
    }
}

/// A named structural change with the root state on both sides of it.
#[derive(Clone, Debug, PartialEq)]
pub struct RecentChange {
    pub name: Option<String>,
    pub timestamp: i64,
    pub before: Revision,
    pub after: Revision,
}

pub(crate) trait ChangeVisitor {
    type Output;

    fn visit_label(&mut self, index: LogIndex, change: &Change) -> ControlFlow<Self::Output>;

    fn visit_regular(&mut self, index: LogIndex, change: &Change) -> ControlFlow<Self::Output>;

    fn nothing_to_visit(&mut self, now: i64);

    fn visit_first_available_non_creational(
        &mut self,
        index: LogIndex,
        change: &Change,
    ) -> ControlFlow<Self::Output>;

    fn finish(self) -> Self::Output;
}

/// Runs `visitor` over `changes`, which must be newest first.
pub(crate) fn walk<V: ChangeVisitor>(
    mut visitor: V,
    entry_id: EntryId,
    changes: &[(LogIndex, &Change)],
    now: i64,
) -> V::Output {
    let Some(&(oldest_index, oldest)) = changes.last() else {
        visitor.nothing_to_visit(now);
        return visitor.finish();
    };

    for &(index, change) in changes {
        let flow = if change.is_label() {
            visitor.visit_label(index, change)
        } else {
            visitor.visit_regular(index, change)
        };
        if let ControlFlow::Break(output) = flow {
            return output;
        }
    }

    if !oldest.is_label() && !oldest.is_creational_for(entry_id) {
        if let ControlFlow::Break(output) =
            visitor.visit_first_available_non_creational(oldest_index, oldest)
        {
            return output;
        }
    }
    visitor.finish()
}

/// Builds the revision list of an entry, newest first.
pub(crate) struct RevisionsCollector {
    entry_id: EntryId,
    running: Option<Content>,
    revisions: Vec<Revision>,
}

impl RevisionsCollector {
    /// `current` is the live content, `None` for directories.
    pub(crate) fn new(entry_id: EntryId, current: Option<Content>) -> Self {
        Self {
            entry_id,
            running: current,
            revisions: Vec::new(),
        }
    }

    fn undo(&mut self, change: &Change) {
        if let Some((content, _)) = change.content_before(self.entry_id) {
            self.running = Some(content.clone());
        }
    }
}

impl ChangeVisitor for RevisionsCollector {
    type Output = Vec<Revision>;

    fn visit_label(&mut self, index: LogIndex, change: &Change) -> ControlFlow<Vec<Revision>> {
        self.revisions.push(Revision {
            entry_id: self.entry_id,
            timestamp: change.timestamp(),
            kind: RevisionKind::Labeled {
                index,
                name: change.name().unwrap_or_default().to_string(),
            },
            content: None,
        });
        ControlFlow::Continue(())
    }

    fn visit_regular(&mut self, index: LogIndex, change: &Change) -> ControlFlow<Vec<Revision>> {
        self.revisions.push(Revision {
            entry_id: self.entry_id,
            timestamp: change.timestamp(),
            kind: RevisionKind::AfterChange {
                index,
                name: change.name().map(str::to_string),
            },
            content: self.running.clone(),
        });
        self.undo(change);
        ControlFlow::Continue(())
    }

    fn nothing_to_visit(&mut self, now: i64) {
        self.revisions.push(Revision {
            entry_id: self.entry_id,
            timestamp: now,
            kind: RevisionKind::Current,
            content: self.running.clone(),
        });
    }

    fn visit_first_available_non_creational(
        &mut self,
        index: LogIndex,
        change: &Change,
    ) -> ControlFlow<Vec<Revision>> {
        self.revisions.push(Revision {
            entry_id: self.entry_id,
            timestamp: change.timestamp(),
            kind: RevisionKind::BeforeChange {
                index,
                name: change.name().map(str::to_string),
            },
            content: self.running.clone(),
        });
        ControlFlow::Continue(())
    }

    fn finish(self) -> Vec<Revision> {
        self.revisions
    }
}

/// Finds the content of a file at the boundary picked by a comparator.
///
/// When a log entry's timestamp is suitable, the content from before that
/// entry is the answer. When none is, the content before the oldest visited
/// entry is.
pub(crate) struct ByteContentRetriever<'c> {
    entry_id: EntryId,
    comparator: &'c dyn TimestampComparator,
    running: Content,
}

impl<'c> ByteContentRetriever<'c> {
    pub(crate) fn new(
        entry_id: EntryId,
        current: Content,
        comparator: &'c dyn TimestampComparator,
    ) -> Self {
        Self {
            entry_id,
            comparator,
            running: current,
        }
    }
}

impl ChangeVisitor for ByteContentRetriever<'_> {
    type Output = Content;

    fn visit_label(&mut self, _index: LogIndex, _change: &Change) -> ControlFlow<Content> {
        ControlFlow::Continue(())
    }

    fn visit_regular(&mut self, _index: LogIndex, change: &Change) -> ControlFlow<Content> {
        let before = match change.content_before(self.entry_id) {
            Some((content, _)) => content.clone(),
            None => self.running.clone(),
        };
        if self.comparator.is_suitable(change.timestamp()) {
            return ControlFlow::Break(before);
        }
        self.running = before;
        ControlFlow::Continue(())
    }

    fn nothing_to_visit(&mut self, _now: i64) {}

    fn visit_first_available_non_creational(
        &mut self,
        _index: LogIndex,
        _change: &Change,
    ) -> ControlFlow<Content> {
        ControlFlow::Continue(())
    }

    fn finish(self) -> Content {
        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{
        ChangeFileContentChange, CreateDirectoryChange, CreateFileChange, PutLabelChange,
        RenameChange,
    };
    use crate::change_list::ChangeList;
    use crate::config::CaseSensitivity;
    use crate::tree::EntryTree;

    fn bytes(s: &str) -> Content {
        Content::Bytes(s.as_bytes().to_vec())
    }

    fn record(tree: &mut EntryTree, list: &mut ChangeList, change: impl Into<Change>) {
        let mut change = change.into();
        change.apply_to(tree).unwrap();
        list.begin_change_set().unwrap();
        list.add_change(change).unwrap();
        list.end_change_set(None).unwrap();
    }

    /// File `f` created with c1 at 10, edited to c2 at 20 and c3 at 30.
    fn edited_file() -> (EntryTree, ChangeList) {
        let mut tree = EntryTree::new(CaseSensitivity::Sensitive);
        let mut list = ChangeList::new();
        record(
            &mut tree,
            &mut list,
            CreateFileChange::new(EntryId::new(1), "f", bytes("c1"), 10),
        );
        record(&mut tree, &mut list, ChangeFileContentChange::new("f", bytes("c2"), 20));
        record(&mut tree, &mut list, ChangeFileContentChange::new("f", bytes("c3"), 30));
        (tree, list)
    }

    fn revisions(tree: &EntryTree, list: &ChangeList, path: &str) -> Vec<Revision> {
        let entry = tree.get_entry(path).unwrap();
        let changes = list.changes_for(tree, path).unwrap();
        let collector = RevisionsCollector::new(entry.id(), entry.content().cloned());
        walk(collector, entry.id(), &changes, 1000)
    }

    fn content(
        tree: &EntryTree,
        list: &ChangeList,
        path: &str,
        comparator: &dyn TimestampComparator,
    ) -> Content {
        let entry = tree.get_entry(path).unwrap();
        let changes = list.changes_for(tree, path).unwrap();
        let retriever = ByteContentRetriever::new(
            entry.id(),
            entry.content().cloned().unwrap(),
            comparator,
        );
        walk(retriever, entry.id(), &changes, 1000)
    }

    #[test]
    fn test_revisions_newest_first_with_contents() {
        let (tree, list) = edited_file();
        let revisions = revisions(&tree, &list, "f");

        assert_eq!(revisions.len(), 3);
        let timestamps: Vec<i64> = revisions.iter().map(|r| r.timestamp).collect();
        assert_eq!(timestamps, vec![30, 20, 10]);
        let contents: Vec<Option<Content>> =
            revisions.iter().map(|r| r.content.clone()).collect();
        assert_eq!(
            contents,
            vec![Some(bytes("c3")), Some(bytes("c2")), Some(bytes("c1"))]
        );
        assert!(revisions
            .iter()
            .all(|r| matches!(r.kind, RevisionKind::AfterChange { .. })));
    }

    #[test]
    fn test_untouched_entry_has_current_revision() {
        let tree = {
            let mut tree = EntryTree::new(CaseSensitivity::Sensitive);
            let mut change = Change::from(CreateFileChange::new(EntryId::new(1), "f", bytes("x"), 5));
            change.apply_to(&mut tree).unwrap();
            tree
        };
        let revisions = revisions(&tree, &ChangeList::new(), "f");

        assert_eq!(revisions.len(), 1);
        assert_eq!(revisions[0].kind, RevisionKind::Current);
        assert_eq!(revisions[0].timestamp, 1000);
        assert_eq!(revisions[0].content, Some(bytes("x")));
    }

    #[test]
    fn test_purged_creation_adds_before_revision() {
        let (tree, mut list) = edited_file();
        list.purge_obsolete(15);
        let revisions = revisions(&tree, &list, "f");

        assert_eq!(revisions.len(), 3);
        let last = revisions.last().unwrap();
        assert!(matches!(last.kind, RevisionKind::BeforeChange { .. }));
        assert_eq!(last.index(), Some(LogIndex(0)));
        assert_eq!(last.content, Some(bytes("c1")));
    }

    #[test]
    fn test_labels_are_markers() {
        let (mut tree, mut list) = edited_file();
        record(&mut tree, &mut list, PutLabelChange::new("release", 40, false));
        let revisions = revisions(&tree, &list, "f");

        assert_eq!(revisions.len(), 4);
        assert!(revisions[0].is_label());
        assert_eq!(revisions[0].name(), Some("release"));
        assert_eq!(revisions[0].content, None);
        assert_eq!(revisions[1].content, Some(bytes("c3")));
    }

    #[test]
    fn test_rename_is_a_revision_without_content_change() {
        let (mut tree, mut list) = edited_file();
        record(&mut tree, &mut list, RenameChange::new("f", "g", 40));
        let revisions = revisions(&tree, &list, "g");

        assert_eq!(revisions.len(), 4);
        assert_eq!(revisions[0].content, Some(bytes("c3")));
        assert_eq!(revisions[1].content, Some(bytes("c3")));
    }

    #[test]
    fn test_directory_revisions_have_no_content() {
        let mut tree = EntryTree::new(CaseSensitivity::Sensitive);
        let mut list = ChangeList::new();
        record(&mut tree, &mut list, CreateDirectoryChange::new(EntryId::new(1), "d", 1));
        record(
            &mut tree,
            &mut list,
            CreateFileChange::new(EntryId::new(2), "d/f", bytes("x"), 2),
        );
        let revisions = revisions(&tree, &list, "d");

        assert_eq!(revisions.len(), 2);
        assert!(revisions.iter().all(|r| r.content.is_none()));
    }

    #[test]
    fn test_content_is_taken_before_matching_change() {
        let (tree, list) = edited_file();

        assert_eq!(content(&tree, &list, "f", &exactly(20)), bytes("c1"));
        assert_eq!(content(&tree, &list, "f", &exactly(30)), bytes("c2"));
        assert_eq!(content(&tree, &list, "f", &at_or_before(25)), bytes("c1"));
    }

    #[test]
    fn test_unmatched_comparator_yields_oldest_content() {
        let (tree, list) = edited_file();
        assert_eq!(content(&tree, &list, "f", &exactly(15)), bytes("c1"));
    }

    #[test]
    fn test_label_only_history_yields_current_content() {
        let mut tree = EntryTree::new(CaseSensitivity::Sensitive);
        let mut list = ChangeList::new();
        record(
            &mut tree,
            &mut list,
            CreateFileChange::new(EntryId::new(1), "f", bytes("now"), 1),
        );
        list.purge_obsolete(2);
        record(&mut tree, &mut list, PutLabelChange::new("mark", 3, false));

        assert_eq!(content(&tree, &list, "f", &exactly(3)), bytes("now"));
    }
}
