//! Changes: atomic, reversible mutations of the entry tree.
//!
//! Every change captures the state it replaces when it is applied, together
//! with the id paths of the entries it touched. Captured fields are fixed at
//! apply time; applying the same change twice is rejected.

use std::slice;

use crate::content::Content;
use crate::error::{LvcsError, LvcsResult};
use crate::tree::{Entry, EntryTree};
use crate::{paths, EntryId, IdPath};

#[derive(Clone, Debug, PartialEq)]
pub enum Change {
    CreateFile(CreateFileChange),
    CreateDirectory(CreateDirectoryChange),
    ChangeFileContent(ChangeFileContentChange),
    Rename(RenameChange),
    Move(MoveChange),
    Delete(DeleteChange),
    PutLabel(PutLabelChange),
    PutSystemLabel(PutSystemLabelChange),
    PutEntryLabel(PutEntryLabelChange),
    ChangeSet(ChangeSet),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreateFileChange {
    pub(crate) id: EntryId,
    pub(crate) path: String,
    pub(crate) content: Content,
    pub(crate) timestamp: i64,
    pub(crate) id_path: Option<IdPath>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreateDirectoryChange {
    pub(crate) id: EntryId,
    pub(crate) path: String,
    pub(crate) timestamp: i64,
    pub(crate) id_path: Option<IdPath>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChangeFileContentChange {
    pub(crate) path: String,
    pub(crate) new_content: Content,
    pub(crate) new_timestamp: i64,
    pub(crate) old_content: Option<Content>,
    pub(crate) old_timestamp: i64,
    pub(crate) id_path: Option<IdPath>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenameChange {
    pub(crate) path: String,
    pub(crate) new_name: String,
    pub(crate) timestamp: i64,
    pub(crate) old_name: Option<String>,
    pub(crate) id_path: Option<IdPath>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MoveChange {
    pub(crate) path: String,
    pub(crate) new_parent_path: String,
    pub(crate) timestamp: i64,
    pub(crate) old_parent_path: Option<String>,
    pub(crate) from_id_path: Option<IdPath>,
    pub(crate) to_id_path: Option<IdPath>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteChange {
    pub(crate) path: String,
    pub(crate) timestamp: i64,
    pub(crate) removed: Option<Entry>,
    pub(crate) id_path: Option<IdPath>,
}

/// Global user label.
#[derive(Clone, Debug, PartialEq)]
pub struct PutLabelChange {
    pub(crate) name: String,
    pub(crate) timestamp: i64,
    pub(crate) is_global_mark: bool,
}

/// Global label put by the host itself, e.g. before an external update.
#[derive(Clone, Debug, PartialEq)]
pub struct PutSystemLabelChange {
    pub(crate) name: String,
    pub(crate) timestamp: i64,
    pub(crate) color: i32,
}

/// Label attached to a single entry.
#[derive(Clone, Debug, PartialEq)]
pub struct PutEntryLabelChange {
    pub(crate) path: String,
    pub(crate) name: String,
    pub(crate) timestamp: i64,
    pub(crate) id_path: Option<IdPath>,
}

/// Group of changes logged as one transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeSet {
    pub(crate) name: Option<String>,
    pub(crate) timestamp: i64,
    pub(crate) changes: Vec<Change>,
}

macro_rules! impl_from_change {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Change {
                fn from(change: $ty) -> Self {
                    Change::$variant(change)
                }
            }
        )*
    };
}

impl_from_change!(
    CreateFile(CreateFileChange),
    CreateDirectory(CreateDirectoryChange),
    ChangeFileContent(ChangeFileContentChange),
    Rename(RenameChange),
    Move(MoveChange),
    Delete(DeleteChange),
    PutLabel(PutLabelChange),
    PutSystemLabel(PutSystemLabelChange),
    PutEntryLabel(PutEntryLabelChange),
    ChangeSet(ChangeSet),
);

fn ensure_not_applied<T>(captured: &Option<T>) -> LvcsResult<()> {
    match captured {
        Some(_) => Err(LvcsError::AlreadyApplied),
        None => Ok(()),
    }
}

fn applied<T>(captured: &Option<T>) -> LvcsResult<&T> {
    captured.as_ref().ok_or(LvcsError::NotApplied)
}

fn entry_id_of(tree: &EntryTree, path: &str) -> LvcsResult<EntryId> {
    tree.get_entry(path).map(|entry| entry.id())
}

/// Id of the directory a new entry at `path` goes into.
fn parent_id_of(tree: &EntryTree, path: &str) -> LvcsResult<EntryId> {
    if paths::split(path).is_empty() {
        return Err(LvcsError::InvalidPath {
            path: path.to_string(),
        });
    }
    match paths::parent(path) {
        Some(parent) => tree
            .find_id(&parent)
            .ok_or_else(|| LvcsError::entry_not_found(parent)),
        None => Ok(EntryId::ROOT),
    }
}

/// Directory at `path`, the synthetic root for an empty path.
fn directory_id_of(tree: &EntryTree, path: &str) -> LvcsResult<EntryId> {
    if paths::split(path).is_empty() {
        return Ok(EntryId::ROOT);
    }
    entry_id_of(tree, path)
}

fn captured_id_path(tree: &EntryTree, id: EntryId) -> LvcsResult<IdPath> {
    tree.id_path(id)
        .ok_or_else(|| LvcsError::entry_not_found(id.to_string()))
}

impl CreateFileChange {
    pub fn new(id: EntryId, path: impl Into<String>, content: Content, timestamp: i64) -> Self {
        Self {
            id,
            path: path.into(),
            content,
            timestamp,
            id_path: None,
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    fn apply_to(&mut self, tree: &mut EntryTree) -> LvcsResult<()> {
        ensure_not_applied(&self.id_path)?;
        let parent = parent_id_of(tree, &self.path)?;
        tree.add_file(
            parent,
            self.id,
            paths::name(&self.path),
            self.content.clone(),
            self.timestamp,
        )?;
        self.id_path = Some(captured_id_path(tree, self.id)?);
        Ok(())
    }

    fn revert_on(&self, tree: &mut EntryTree) -> LvcsResult<()> {
        tree.remove(applied(&self.id_path)?.id())?;
        Ok(())
    }
}

impl CreateDirectoryChange {
    pub fn new(id: EntryId, path: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id,
            path: path.into(),
            timestamp,
            id_path: None,
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn apply_to(&mut self, tree: &mut EntryTree) -> LvcsResult<()> {
        ensure_not_applied(&self.id_path)?;
        let parent = parent_id_of(tree, &self.path)?;
        tree.add_directory(parent, self.id, paths::name(&self.path))?;
        self.id_path = Some(captured_id_path(tree, self.id)?);
        Ok(())
    }

    fn revert_on(&self, tree: &mut EntryTree) -> LvcsResult<()> {
        tree.remove(applied(&self.id_path)?.id())?;
        Ok(())
    }
}

impl ChangeFileContentChange {
    pub fn new(path: impl Into<String>, new_content: Content, new_timestamp: i64) -> Self {
        Self {
            path: path.into(),
            new_content,
            new_timestamp,
            old_content: None,
            old_timestamp: 0,
            id_path: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn new_content(&self) -> &Content {
        &self.new_content
    }

    /// Content the file had before this change, once applied.
    pub fn old_content(&self) -> Option<&Content> {
        self.old_content.as_ref()
    }

    pub fn old_timestamp(&self) -> i64 {
        self.old_timestamp
    }

    fn apply_to(&mut self, tree: &mut EntryTree) -> LvcsResult<()> {
        ensure_not_applied(&self.id_path)?;
        let id = entry_id_of(tree, &self.path)?;
        let id_path = captured_id_path(tree, id)?;
        let (old_content, old_timestamp) =
            tree.set_content(id, self.new_content.clone(), self.new_timestamp)?;
        self.old_content = Some(old_content);
        self.old_timestamp = old_timestamp;
        self.id_path = Some(id_path);
        Ok(())
    }

    fn revert_on(&self, tree: &mut EntryTree) -> LvcsResult<()> {
        let id_path = applied(&self.id_path)?;
        let old_content = applied(&self.old_content)?;
        tree.set_content(id_path.id(), old_content.clone(), self.old_timestamp)?;
        Ok(())
    }
}

impl RenameChange {
    pub fn new(path: impl Into<String>, new_name: impl Into<String>, timestamp: i64) -> Self {
        Self {
            path: path.into(),
            new_name: new_name.into(),
            timestamp,
            old_name: None,
            id_path: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn new_name(&self) -> &str {
        &self.new_name
    }

    pub fn old_name(&self) -> Option<&str> {
        self.old_name.as_deref()
    }

    fn apply_to(&mut self, tree: &mut EntryTree) -> LvcsResult<()> {
        ensure_not_applied(&self.id_path)?;
        let id = entry_id_of(tree, &self.path)?;
        let id_path = captured_id_path(tree, id)?;
        self.old_name = Some(tree.rename(id, &self.new_name)?);
        self.id_path = Some(id_path);
        Ok(())
    }

    fn revert_on(&self, tree: &mut EntryTree) -> LvcsResult<()> {
        let id_path = applied(&self.id_path)?;
        let old_name = applied(&self.old_name)?;
        tree.rename(id_path.id(), old_name)?;
        Ok(())
    }
}

impl MoveChange {
    pub fn new(path: impl Into<String>, new_parent_path: impl Into<String>, timestamp: i64) -> Self {
        Self {
            path: path.into(),
            new_parent_path: new_parent_path.into(),
            timestamp,
            old_parent_path: None,
            from_id_path: None,
            to_id_path: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn new_parent_path(&self) -> &str {
        &self.new_parent_path
    }

    pub fn old_parent_path(&self) -> Option<&str> {
        self.old_parent_path.as_deref()
    }

    fn apply_to(&mut self, tree: &mut EntryTree) -> LvcsResult<()> {
        ensure_not_applied(&self.from_id_path)?;
        let id = entry_id_of(tree, &self.path)?;
        let new_parent = directory_id_of(tree, &self.new_parent_path)?;
        let from_id_path = captured_id_path(tree, id)?;
        tree.move_entry(id, new_parent)?;
        self.old_parent_path = Some(paths::parent(&self.path).unwrap_or_default());
        self.from_id_path = Some(from_id_path);
        self.to_id_path = Some(captured_id_path(tree, id)?);
        Ok(())
    }

    fn revert_on(&self, tree: &mut EntryTree) -> LvcsResult<()> {
        let from = applied(&self.from_id_path)?;
        tree.move_entry(from.id(), from.parent_id())?;
        Ok(())
    }
}

impl DeleteChange {
    pub fn new(path: impl Into<String>, timestamp: i64) -> Self {
        Self {
            path: path.into(),
            timestamp,
            removed: None,
            id_path: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The subtree detached by this change.
    pub fn removed(&self) -> Option<&Entry> {
        self.removed.as_ref()
    }

    fn apply_to(&mut self, tree: &mut EntryTree) -> LvcsResult<()> {
        ensure_not_applied(&self.id_path)?;
        let id = entry_id_of(tree, &self.path)?;
        let id_path = captured_id_path(tree, id)?;
        self.removed = Some(tree.remove(id)?);
        self.id_path = Some(id_path);
        Ok(())
    }

    fn revert_on(&self, tree: &mut EntryTree) -> LvcsResult<()> {
        let id_path = applied(&self.id_path)?;
        let removed = applied(&self.removed)?;
        tree.insert(id_path.parent_id(), removed.clone())
    }
}

impl PutLabelChange {
    pub fn new(name: impl Into<String>, timestamp: i64, is_global_mark: bool) -> Self {
        Self {
            name: name.into(),
            timestamp,
            is_global_mark,
        }
    }

    pub fn is_global_mark(&self) -> bool {
        self.is_global_mark
    }
}

impl PutSystemLabelChange {
    pub fn new(name: impl Into<String>, timestamp: i64, color: i32) -> Self {
        Self {
            name: name.into(),
            timestamp,
            color,
        }
    }

    pub fn color(&self) -> i32 {
        self.color
    }
}

impl PutEntryLabelChange {
    pub fn new(path: impl Into<String>, name: impl Into<String>, timestamp: i64) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            timestamp,
            id_path: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn apply_to(&mut self, tree: &EntryTree) -> LvcsResult<()> {
        ensure_not_applied(&self.id_path)?;
        let id = entry_id_of(tree, &self.path)?;
        self.id_path = Some(captured_id_path(tree, id)?);
        Ok(())
    }
}

impl ChangeSet {
    /// Takes its timestamp from the last change.
    pub fn new(name: Option<String>, changes: Vec<Change>) -> Self {
        let timestamp = changes.last().map(Change::timestamp).unwrap_or_default();
        Self {
            name,
            timestamp,
            changes,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    fn apply_to(&mut self, tree: &mut EntryTree) -> LvcsResult<()> {
        for i in 0..self.changes.len() {
            if let Err(e) = self.changes[i].apply_to(tree) {
                for done in self.changes[..i].iter().rev() {
                    done.revert_on(tree)?;
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn revert_on(&self, tree: &mut EntryTree) -> LvcsResult<()> {
        for change in self.changes.iter().rev() {
            change.revert_on(tree)?;
        }
        Ok(())
    }
}

impl Change {
    /// Mutates the tree and captures the replaced state.
    pub fn apply_to(&mut self, tree: &mut EntryTree) -> LvcsResult<()> {
        match self {
            Change::CreateFile(c) => c.apply_to(tree),
            Change::CreateDirectory(c) => c.apply_to(tree),
            Change::ChangeFileContent(c) => c.apply_to(tree),
            Change::Rename(c) => c.apply_to(tree),
            Change::Move(c) => c.apply_to(tree),
            Change::Delete(c) => c.apply_to(tree),
            Change::PutEntryLabel(c) => c.apply_to(tree),
            Change::PutLabel(_) | Change::PutSystemLabel(_) => Ok(()),
            Change::ChangeSet(c) => c.apply_to(tree),
        }
    }

    /// Undoes an applied change on a tree that is in the state right after it.
    pub fn revert_on(&self, tree: &mut EntryTree) -> LvcsResult<()> {
        match self {
            Change::CreateFile(c) => c.revert_on(tree),
            Change::CreateDirectory(c) => c.revert_on(tree),
            Change::ChangeFileContent(c) => c.revert_on(tree),
            Change::Rename(c) => c.revert_on(tree),
            Change::Move(c) => c.revert_on(tree),
            Change::Delete(c) => c.revert_on(tree),
            Change::PutLabel(_) | Change::PutSystemLabel(_) | Change::PutEntryLabel(_) => Ok(()),
            Change::ChangeSet(c) => c.revert_on(tree),
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Change::CreateFile(c) => c.timestamp,
            Change::CreateDirectory(c) => c.timestamp,
            Change::ChangeFileContent(c) => c.new_timestamp,
            Change::Rename(c) => c.timestamp,
            Change::Move(c) => c.timestamp,
            Change::Delete(c) => c.timestamp,
            Change::PutLabel(c) => c.timestamp,
            Change::PutSystemLabel(c) => c.timestamp,
            Change::PutEntryLabel(c) => c.timestamp,
            Change::ChangeSet(c) => c.timestamp,
        }
    }

    /// Display name: the change set name or the label text.
    pub fn name(&self) -> Option<&str> {
        match self {
            Change::PutLabel(c) => Some(&c.name),
            Change::PutSystemLabel(c) => Some(&c.name),
            Change::PutEntryLabel(c) => Some(&c.name),
            Change::ChangeSet(c) => c.name(),
            _ => None,
        }
    }

    pub fn is_label(&self) -> bool {
        match self {
            Change::PutLabel(_) | Change::PutSystemLabel(_) | Change::PutEntryLabel(_) => true,
            Change::ChangeSet(c) => !c.changes.is_empty() && c.changes.iter().all(Change::is_label),
            _ => false,
        }
    }

    pub fn is_content_change_only(&self) -> bool {
        match self {
            Change::ChangeFileContent(_) => true,
            Change::ChangeSet(c) => {
                !c.changes.is_empty() && c.changes.iter().all(Change::is_content_change_only)
            }
            _ => false,
        }
    }

    /// Members of a change set, or the change itself.
    pub fn changes(&self) -> &[Change] {
        match self {
            Change::ChangeSet(c) => &c.changes,
            other => slice::from_ref(other),
        }
    }

    /// All non-set changes, depth first.
    pub fn leaves(&self) -> Vec<&Change> {
        match self {
            Change::ChangeSet(c) => c.changes.iter().flat_map(Change::leaves).collect(),
            other => vec![other],
        }
    }

    pub fn affected_id_paths(&self) -> Vec<&IdPath> {
        match self {
            Change::CreateFile(c) => c.id_path.iter().collect(),
            Change::CreateDirectory(c) => c.id_path.iter().collect(),
            Change::ChangeFileContent(c) => c.id_path.iter().collect(),
            Change::Rename(c) => c.id_path.iter().collect(),
            Change::Move(c) => c.from_id_path.iter().chain(c.to_id_path.iter()).collect(),
            Change::Delete(c) => c.id_path.iter().collect(),
            Change::PutEntryLabel(c) => c.id_path.iter().collect(),
            Change::PutLabel(_) | Change::PutSystemLabel(_) => Vec::new(),
            Change::ChangeSet(c) => c.changes.iter().flat_map(Change::affected_id_paths).collect(),
        }
    }

    /// True when the entry with `id`, or something below it, was touched.
    /// Global labels affect every entry.
    pub fn affects(&self, id: EntryId) -> bool {
        match self {
            Change::PutLabel(_) | Change::PutSystemLabel(_) => true,
            Change::ChangeSet(c) => c.changes.iter().any(|member| member.affects(id)),
            other => other.affected_id_paths().iter().any(|p| p.contains(id)),
        }
    }

    pub fn is_creational_for(&self, id: EntryId) -> bool {
        match self {
            Change::CreateFile(c) => c.id == id,
            Change::CreateDirectory(c) => c.id == id,
            Change::ChangeSet(c) => c.changes.iter().any(|member| member.is_creational_for(id)),
            _ => false,
        }
    }

    /// True when both changes touched the same entry or one another's ancestors.
    pub fn affects_same_as(&self, other: &Change) -> bool {
        let mine = self.affected_id_paths();
        other
            .affected_id_paths()
            .iter()
            .any(|theirs| mine.iter().any(|p| p.overlaps(theirs)))
    }

    /// Content the file `id` had before this change, if the change replaced it.
    pub(crate) fn content_before(&self, id: EntryId) -> Option<(&Content, i64)> {
        self.leaves().into_iter().find_map(|leaf| match leaf {
            Change::ChangeFileContent(c)
                if c.id_path.as_ref().is_some_and(|p| p.id() == id) =>
            {
                c.old_content.as_ref().map(|content| (content, c.old_timestamp))
            }
            _ => None,
        })
    }

    /// Old contents of every applied content change, for disposal on purge.
    pub(crate) fn superseded_contents(&self) -> Vec<Content> {
        self.leaves()
            .into_iter()
            .filter_map(|leaf| match leaf {
                Change::ChangeFileContent(c) => c.old_content.clone(),
                _ => None,
            })
            .collect()
    }
}
