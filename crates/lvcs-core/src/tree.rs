//! Entry tree: directories and files addressable by path or by stable id

use std::collections::HashMap;

use crate::config::CaseSensitivity;
use crate::content::Content;
use crate::error::{LvcsError, LvcsResult};
use crate::{paths, EntryId, IdPath};

/// Tree node. The parent link is an id into the owning tree's node table.
#[derive(Clone, Debug)]
struct Node {
    id: EntryId,
    name: String,
    parent: Option<EntryId>,
    kind: NodeKind,
}

#[derive(Clone, Debug)]
enum NodeKind {
    Directory { children: Vec<EntryId> },
    File { content: Content, timestamp: i64 },
}

/// Detached copy of an entry with its whole subtree.
///
/// This is the shape the codec persists and what a delete keeps for history.
/// A detached entry has no parent; re-inserting it into a tree relinks it.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub id: EntryId,
    pub name: String,
    pub kind: EntryKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EntryKind {
    /// Unnamed container of the top-level entries.
    Root { children: Vec<Entry> },
    Directory { children: Vec<Entry> },
    File { content: Content, timestamp: i64 },
}

impl Entry {
    pub fn root(children: Vec<Entry>) -> Self {
        Self {
            id: EntryId::ROOT,
            name: String::new(),
            kind: EntryKind::Root { children },
        }
    }

    pub fn is_directory(&self) -> bool {
        !matches!(self.kind, EntryKind::File { .. })
    }

    pub fn children(&self) -> &[Entry] {
        match &self.kind {
            EntryKind::Root { children } | EntryKind::Directory { children } => children,
            EntryKind::File { .. } => &[],
        }
    }

    pub fn content(&self) -> Option<&Content> {
        match &self.kind {
            EntryKind::File { content, .. } => Some(content),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> Option<i64> {
        match &self.kind {
            EntryKind::File { timestamp, .. } => Some(*timestamp),
            _ => None,
        }
    }

    pub fn find_child(&self, name: &str, case: CaseSensitivity) -> Option<&Entry> {
        self.children()
            .iter()
            .find(|child| case.names_equal(&child.name, name))
    }
}

/// The live tree. The synthetic root always exists with id [`EntryId::ROOT`].
#[derive(Clone, Debug)]
pub struct EntryTree {
    nodes: HashMap<EntryId, Node>,
    case_sensitivity: CaseSensitivity,
}

impl EntryTree {
    pub fn new(case_sensitivity: CaseSensitivity) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            EntryId::ROOT,
            Node {
                id: EntryId::ROOT,
                name: String::new(),
                parent: None,
                kind: NodeKind::Directory {
                    children: Vec::new(),
                },
            },
        );
        Self {
            nodes,
            case_sensitivity,
        }
    }

    /// Rebuilds a tree from a detached root, relinking every child to its parent.
    pub fn from_root_entry(root: Entry, case_sensitivity: CaseSensitivity) -> LvcsResult<Self> {
        let EntryKind::Root { children } = root.kind else {
            return Err(LvcsError::corrupted("tree snapshot does not start with a root"));
        };
        let mut tree = Self::new(case_sensitivity);
        for child in children {
            tree.insert(EntryId::ROOT, child)?;
        }
        Ok(tree)
    }

    pub fn to_root_entry(&self) -> Entry {
        Entry::root(
            self.children_of(EntryId::ROOT)
                .iter()
                .filter_map(|id| self.snapshot(*id))
                .collect(),
        )
    }

    /// Detached copy of the entry with the given id, `None` if it is not in the tree.
    pub fn snapshot(&self, id: EntryId) -> Option<Entry> {
        if id == EntryId::ROOT {
            return Some(self.to_root_entry());
        }
        let node = self.nodes.get(&id)?;
        let kind = match &node.kind {
            NodeKind::Directory { children } => EntryKind::Directory {
                children: children.iter().filter_map(|c| self.snapshot(*c)).collect(),
            },
            NodeKind::File { content, timestamp } => EntryKind::File {
                content: content.clone(),
                timestamp: *timestamp,
            },
        };
        Some(Entry {
            id: node.id,
            name: node.name.clone(),
            kind,
        })
    }

    pub fn case_sensitivity(&self) -> CaseSensitivity {
        self.case_sensitivity
    }

    /// Resolves a path segment by segment from the root.
    pub fn find_id(&self, path: &str) -> Option<EntryId> {
        let mut current = EntryId::ROOT;
        for segment in paths::split(path) {
            current = self.child_named(current, segment)?;
        }
        Some(current)
    }

    pub fn has_entry(&self, path: &str) -> bool {
        self.find_entry(path).is_some()
    }

    pub fn get_entry(&self, path: &str) -> LvcsResult<EntryRef<'_>> {
        self.find_entry(path)
            .ok_or_else(|| LvcsError::entry_not_found(path))
    }

    pub fn find_entry(&self, path: &str) -> Option<EntryRef<'_>> {
        if paths::split(path).is_empty() {
            return None;
        }
        self.find_id(path).and_then(|id| self.entry_by_id(id))
    }

    pub fn entry_by_id(&self, id: EntryId) -> Option<EntryRef<'_>> {
        self.nodes.get(&id).map(|node| EntryRef { tree: self, node })
    }

    /// Immediate children of the synthetic root.
    pub fn roots(&self) -> Vec<EntryRef<'_>> {
        self.children_of(EntryId::ROOT)
            .iter()
            .filter_map(|id| self.entry_by_id(*id))
            .collect()
    }

    pub fn id_path(&self, id: EntryId) -> Option<IdPath> {
        let mut ids = Vec::new();
        let mut current = self.nodes.get(&id)?;
        while current.id != EntryId::ROOT {
            ids.push(current.id);
            current = self.nodes.get(&current.parent?)?;
        }
        ids.reverse();
        Some(IdPath::new(ids))
    }

    pub fn path_of(&self, id: EntryId) -> Option<String> {
        let mut names = Vec::new();
        let mut current = self.nodes.get(&id)?;
        while current.id != EntryId::ROOT {
            names.push(current.name.as_str());
            current = self.nodes.get(&current.parent?)?;
        }
        names.reverse();
        Some(names.join("/"))
    }

    pub(crate) fn add_file(
        &mut self,
        parent: EntryId,
        id: EntryId,
        name: &str,
        content: Content,
        timestamp: i64,
    ) -> LvcsResult<()> {
        self.add_node(parent, id, name, NodeKind::File { content, timestamp })
    }

    pub(crate) fn add_directory(&mut self, parent: EntryId, id: EntryId, name: &str) -> LvcsResult<()> {
        self.add_node(
            parent,
            id,
            name,
            NodeKind::Directory {
                children: Vec::new(),
            },
        )
    }

    /// Replaces the content of a file, returning the previous content and timestamp.
    pub(crate) fn set_content(
        &mut self,
        id: EntryId,
        content: Content,
        timestamp: i64,
    ) -> LvcsResult<(Content, i64)> {
        let path = self.describe(id);
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| LvcsError::entry_not_found(path.clone()))?;
        match &mut node.kind {
            NodeKind::File {
                content: current,
                timestamp: current_timestamp,
            } => {
                let old_content = std::mem::replace(current, content);
                let old_timestamp = std::mem::replace(current_timestamp, timestamp);
                Ok((old_content, old_timestamp))
            }
            NodeKind::Directory { .. } => Err(LvcsError::NotAFile { path }),
        }
    }

    /// Renames an entry in place, returning the previous name.
    pub(crate) fn rename(&mut self, id: EntryId, new_name: &str) -> LvcsResult<String> {
        validate_name(new_name)?;
        let parent = self.parent_of(id)?;
        if let Some(existing) = self.child_named(parent, new_name) {
            if existing != id {
                return Err(LvcsError::EntryAlreadyExists {
                    path: self.describe(existing),
                });
            }
        }
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| LvcsError::entry_not_found(id.to_string()))?;
        Ok(std::mem::replace(&mut node.name, new_name.to_string()))
    }

    /// Moves an entry under a new parent directory, returning the old parent.
    pub(crate) fn move_entry(&mut self, id: EntryId, new_parent: EntryId) -> LvcsResult<EntryId> {
        let old_parent = self.parent_of(id)?;
        self.ensure_directory(new_parent)?;
        if self
            .id_path(new_parent)
            .is_some_and(|path| path.contains(id))
        {
            return Err(LvcsError::InvalidPath {
                path: self.describe(new_parent),
            });
        }
        let name = self.nodes[&id].name.clone();
        if let Some(existing) = self.child_named(new_parent, &name) {
            if existing != id {
                return Err(LvcsError::EntryAlreadyExists {
                    path: self.describe(existing),
                });
            }
        }

        self.unlink_child(old_parent, id);
        self.link_child(new_parent, id);
        Ok(old_parent)
    }

    /// Detaches an entry and returns its subtree.
    pub(crate) fn remove(&mut self, id: EntryId) -> LvcsResult<Entry> {
        if id == EntryId::ROOT {
            return Err(LvcsError::InvalidPath {
                path: String::new(),
            });
        }
        let parent = self.parent_of(id)?;
        let entry = self
            .snapshot(id)
            .ok_or_else(|| LvcsError::entry_not_found(id.to_string()))?;
        self.unlink_child(parent, id);
        self.drop_subtree(id);
        Ok(entry)
    }

    /// Attaches a detached subtree under `parent`.
    pub(crate) fn insert(&mut self, parent: EntryId, entry: Entry) -> LvcsResult<()> {
        let Entry { id, name, kind } = entry;
        match kind {
            EntryKind::Root { .. } => Err(LvcsError::InvalidPath { path: name }),
            EntryKind::File { content, timestamp } => {
                self.add_node(parent, id, &name, NodeKind::File { content, timestamp })
            }
            EntryKind::Directory { children } => {
                self.add_directory(parent, id, &name)?;
                for child in children {
                    self.insert(id, child)?;
                }
                Ok(())
            }
        }
    }

    fn add_node(&mut self, parent: EntryId, id: EntryId, name: &str, kind: NodeKind) -> LvcsResult<()> {
        validate_name(name)?;
        self.ensure_directory(parent)?;
        if let Some(existing) = self.child_named(parent, name) {
            return Err(LvcsError::EntryAlreadyExists {
                path: self.describe(existing),
            });
        }
        if self.nodes.contains_key(&id) {
            return Err(LvcsError::EntryAlreadyExists {
                path: self.describe(id),
            });
        }

        self.nodes.insert(
            id,
            Node {
                id,
                name: name.to_string(),
                parent: None,
                kind,
            },
        );
        self.link_child(parent, id);
        Ok(())
    }

    fn ensure_directory(&self, id: EntryId) -> LvcsResult<()> {
        match self.nodes.get(&id) {
            Some(Node {
                kind: NodeKind::Directory { .. },
                ..
            }) => Ok(()),
            Some(_) => Err(LvcsError::NotADirectory {
                path: self.describe(id),
            }),
            None => Err(LvcsError::entry_not_found(id.to_string())),
        }
    }

    fn parent_of(&self, id: EntryId) -> LvcsResult<EntryId> {
        self.nodes
            .get(&id)
            .and_then(|node| node.parent)
            .ok_or_else(|| LvcsError::entry_not_found(id.to_string()))
    }

    fn children_of(&self, id: EntryId) -> &[EntryId] {
        match self.nodes.get(&id).map(|node| &node.kind) {
            Some(NodeKind::Directory { children }) => children,
            _ => &[],
        }
    }

    fn child_named(&self, parent: EntryId, name: &str) -> Option<EntryId> {
        self.children_of(parent)
            .iter()
            .copied()
            .find(|child| {
                self.nodes
                    .get(child)
                    .is_some_and(|node| self.case_sensitivity.names_equal(&node.name, name))
            })
    }

    fn link_child(&mut self, parent: EntryId, child: EntryId) {
        if let Some(Node {
            kind: NodeKind::Directory { children },
            ..
        }) = self.nodes.get_mut(&parent)
        {
            children.push(child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
    }

    fn unlink_child(&mut self, parent: EntryId, child: EntryId) {
        if let Some(Node {
            kind: NodeKind::Directory { children },
            ..
        }) = self.nodes.get_mut(&parent)
        {
            children.retain(|c| *c != child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = None;
        }
    }

    fn drop_subtree(&mut self, id: EntryId) {
        let children = self.children_of(id).to_vec();
        for child in children {
            self.drop_subtree(child);
        }
        self.nodes.remove(&id);
    }

    fn describe(&self, id: EntryId) -> String {
        self.path_of(id).unwrap_or_else(|| format!("#{id}"))
    }
}

/// Borrowed view of a live entry.
#[derive(Clone, Copy)]
pub struct EntryRef<'a> {
    tree: &'a EntryTree,
    node: &'a Node,
}

impl<'a> EntryRef<'a> {
    pub fn id(&self) -> EntryId {
        self.node.id
    }

    pub fn name(&self) -> &'a str {
        &self.node.name
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.node.kind, NodeKind::Directory { .. })
    }

    pub fn content(&self) -> Option<&'a Content> {
        match &self.node.kind {
            NodeKind::File { content, .. } => Some(content),
            NodeKind::Directory { .. } => None,
        }
    }

    pub fn timestamp(&self) -> Option<i64> {
        match &self.node.kind {
            NodeKind::File { timestamp, .. } => Some(*timestamp),
            NodeKind::Directory { .. } => None,
        }
    }

    pub fn parent(&self) -> Option<EntryRef<'a>> {
        self.node.parent.and_then(|id| self.tree.entry_by_id(id))
    }

    pub fn children(&self) -> Vec<EntryRef<'a>> {
        self.tree
            .children_of(self.node.id)
            .iter()
            .filter_map(|id| self.tree.entry_by_id(*id))
            .collect()
    }

    pub fn path(&self) -> String {
        self.tree.path_of(self.node.id).unwrap_or_default()
    }

    pub fn id_path(&self) -> IdPath {
        self.tree
            .id_path(self.node.id)
            .unwrap_or_else(|| IdPath::new(Vec::new()))
    }
}

impl std::fmt::Debug for EntryRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryRef")
            .field("id", &self.node.id)
            .field("path", &self.path())
            .finish()
    }
}

/// A name is one non-empty path segment.
fn validate_name(name: &str) -> LvcsResult<()> {
    if name.is_empty() || name.contains(paths::SEPARATOR) {
        return Err(LvcsError::InvalidPath {
            path: name.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: i32) -> EntryId {
        EntryId::new(n)
    }

    fn bytes(s: &str) -> Content {
        Content::Bytes(s.as_bytes().to_vec())
    }

    fn sample_tree() -> EntryTree {
        let mut tree = EntryTree::new(CaseSensitivity::Sensitive);
        tree.add_directory(EntryId::ROOT, id(1), "dir").unwrap();
        tree.add_directory(id(1), id(2), "sub").unwrap();
        tree.add_file(id(2), id(3), "file", bytes("content"), 10).unwrap();
        tree
    }

    #[test]
    fn test_path_resolution() {
        let tree = sample_tree();

        let file = tree.get_entry("dir/sub/file").unwrap();
        assert_eq!(file.id(), id(3));
        assert_eq!(file.path(), "dir/sub/file");
        assert_eq!(file.id_path(), IdPath::new(vec![id(1), id(2), id(3)]));
        assert_eq!(file.parent().unwrap().name(), "sub");
        assert_eq!(file.content().unwrap(), &bytes("content"));
        assert_eq!(file.timestamp(), Some(10));

        assert!(tree.has_entry("dir/sub"));
        assert!(!tree.has_entry("dir/missing"));
        assert!(tree.find_entry("dir/sub/file/deeper").is_none());
        assert!(matches!(
            tree.get_entry("nothing"),
            Err(LvcsError::EntryNotFound { .. })
        ));
    }

    #[test]
    fn test_roots_allow_several_top_level_entries() {
        let mut tree = sample_tree();
        tree.add_directory(EntryId::ROOT, id(4), "c:").unwrap();

        let names: Vec<_> = tree.roots().iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["dir", "c:"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut tree = sample_tree();
        assert!(matches!(
            tree.add_file(id(1), id(9), "sub", bytes(""), 0),
            Err(LvcsError::EntryAlreadyExists { .. })
        ));
        assert!(matches!(
            tree.add_file(id(3), id(9), "child", bytes(""), 0),
            Err(LvcsError::NotADirectory { .. })
        ));
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let mut tree = EntryTree::new(CaseSensitivity::InsensitivePreserving);
        tree.add_directory(EntryId::ROOT, id(1), "Dir").unwrap();
        tree.add_file(id(1), id(2), "File.TXT", bytes("x"), 0).unwrap();

        assert_eq!(tree.get_entry("dir/file.txt").unwrap().id(), id(2));
        // The stored name keeps its case
        assert_eq!(tree.get_entry("DIR/FILE.txt").unwrap().path(), "Dir/File.TXT");
        assert!(tree.add_file(id(1), id(3), "file.txt", bytes("y"), 0).is_err());
    }

    #[test]
    fn test_rename_keeps_id() {
        let mut tree = sample_tree();
        let old = tree.rename(id(3), "renamed").unwrap();

        assert_eq!(old, "file");
        assert_eq!(tree.get_entry("dir/sub/renamed").unwrap().id(), id(3));
        assert!(!tree.has_entry("dir/sub/file"));
    }

    #[test]
    fn test_rename_rejects_invalid_names() {
        let mut tree = sample_tree();
        for name in ["", "x/y", "/"] {
            assert!(
                matches!(tree.rename(id(3), name), Err(LvcsError::InvalidPath { .. })),
                "{name:?}"
            );
        }
        assert!(tree.rename(id(1), "").is_err());

        assert_eq!(tree.get_entry("dir/sub/file").unwrap().id(), id(3));
        assert_eq!(tree.get_entry("dir").unwrap().id(), id(1));
    }

    #[test]
    fn test_move_changes_id_path_prefix() {
        let mut tree = sample_tree();
        tree.add_directory(EntryId::ROOT, id(5), "other").unwrap();

        let old_parent = tree.move_entry(id(3), id(5)).unwrap();
        assert_eq!(old_parent, id(2));
        assert_eq!(tree.id_path(id(3)).unwrap(), IdPath::new(vec![id(5), id(3)]));
        assert_eq!(tree.get_entry("other/file").unwrap().id(), id(3));
    }

    #[test]
    fn test_move_into_own_subtree_rejected() {
        let mut tree = sample_tree();
        assert!(matches!(
            tree.move_entry(id(1), id(2)),
            Err(LvcsError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_remove_and_reinsert_subtree() {
        let mut tree = sample_tree();
        let removed = tree.remove(id(2)).unwrap();

        assert!(!tree.has_entry("dir/sub"));
        assert!(tree.entry_by_id(id(3)).is_none());
        assert_eq!(removed.children().len(), 1);
        assert_eq!(removed.children()[0].content(), Some(&bytes("content")));

        tree.insert(id(1), removed).unwrap();
        assert_eq!(tree.get_entry("dir/sub/file").unwrap().id(), id(3));
        assert_eq!(tree.get_entry("dir/sub/file").unwrap().parent().unwrap().id(), id(2));
    }

    #[test]
    fn test_root_entry_round_trip_relinks_parents() {
        let tree = sample_tree();
        let root = tree.to_root_entry();

        let rebuilt = EntryTree::from_root_entry(root.clone(), CaseSensitivity::Sensitive).unwrap();
        assert_eq!(rebuilt.to_root_entry(), root);
        assert_eq!(
            rebuilt.get_entry("dir/sub/file").unwrap().parent().unwrap().id(),
            id(2)
        );
    }

    #[test]
    fn test_set_content_on_directory_fails() {
        let mut tree = sample_tree();
        assert!(matches!(
            tree.set_content(id(1), bytes("x"), 0),
            Err(LvcsError::NotAFile { .. })
        ));
        let (old, old_ts) = tree.set_content(id(3), bytes("new"), 20).unwrap();
        assert_eq!(old, bytes("content"));
        assert_eq!(old_ts, 10);
    }
}
