//! Binary codec for the persisted state.
//!
//! Integers are little-endian. Strings are a presence byte, an `i32` byte
//! length and UTF-8 bytes. Every captured pre-state field of a change is
//! preceded by a presence byte. Stored contents are written as their store id
//! only and are bound back to a [`Storage`] when read.
//!
//! Any malformed input is reported as [`LvcsError::Corrupted`].

use std::io::{Read, Write};
use std::sync::Arc;

use crate::change::{
    Change, ChangeFileContentChange, ChangeSet, CreateDirectoryChange, CreateFileChange,
    DeleteChange, MoveChange, PutEntryLabelChange, PutLabelChange, PutSystemLabelChange,
    RenameChange,
};
use crate::change_list::ChangeList;
use crate::content::Content;
use crate::error::{LvcsError, LvcsResult};
use crate::storage::Storage;
use crate::tree::{Entry, EntryKind};
use crate::{ContentId, EntryId, IdPath};

const MAGIC: &[u8; 4] = b"LVCS";
const FORMAT_VERSION: i32 = 1;

const CONTENT_BYTES: u8 = 0;
const CONTENT_STORED: u8 = 1;
const CONTENT_UNAVAILABLE: u8 = 2;

const ENTRY_ROOT: u8 = 0;
const ENTRY_DIRECTORY: u8 = 1;
const ENTRY_FILE: u8 = 2;

const CHANGE_CREATE_FILE: u8 = 0;
const CHANGE_CREATE_DIRECTORY: u8 = 1;
const CHANGE_CONTENT: u8 = 2;
const CHANGE_RENAME: u8 = 3;
const CHANGE_MOVE: u8 = 4;
const CHANGE_DELETE: u8 = 5;
const CHANGE_PUT_LABEL: u8 = 6;
const CHANGE_PUT_SYSTEM_LABEL: u8 = 7;
const CHANGE_PUT_ENTRY_LABEL: u8 = 8;
const CHANGE_SET: u8 = 9;

/// Deepest nesting of directories or change sets a reader accepts.
const MAX_NESTING: usize = 128;

/// Everything persisted for one history: the tree, the entry id counter and the log.
#[derive(Clone, Debug)]
pub struct Memento {
    pub root: Entry,
    pub entry_counter: i32,
    pub changes: ChangeList,
}

impl Memento {
    pub fn encode(&self) -> LvcsResult<Vec<u8>> {
        let mut writer = StreamWriter::new(Vec::new());
        writer.write_memento(self)?;
        Ok(writer.into_inner())
    }

    pub fn decode(bytes: &[u8], storage: Arc<dyn Storage>) -> LvcsResult<Self> {
        let mut reader = StreamReader::new(bytes, storage);
        reader.read_memento()
    }
}

pub struct StreamWriter<W: Write> {
    inner: W,
}

impl<W: Write> StreamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn write_u8(&mut self, value: u8) -> LvcsResult<()> {
        self.inner.write_all(&[value])?;
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> LvcsResult<()> {
        self.inner.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    pub fn write_i64(&mut self, value: i64) -> LvcsResult<()> {
        self.inner.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> LvcsResult<()> {
        self.write_u8(u8::from(value))
    }

    fn write_len(&mut self, len: usize) -> LvcsResult<()> {
        let len = i32::try_from(len)
            .map_err(|_| LvcsError::storage(format!("length {len} does not fit the format")))?;
        self.write_i32(len)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> LvcsResult<()> {
        self.write_len(bytes.len())?;
        self.inner.write_all(bytes)?;
        Ok(())
    }

    pub fn write_opt_string(&mut self, value: Option<&str>) -> LvcsResult<()> {
        match value {
            Some(value) => {
                self.write_bool(true)?;
                self.write_bytes(value.as_bytes())
            }
            None => self.write_bool(false),
        }
    }

    pub fn write_string(&mut self, value: &str) -> LvcsResult<()> {
        self.write_opt_string(Some(value))
    }

    pub fn write_id_path(&mut self, path: &IdPath) -> LvcsResult<()> {
        self.write_len(path.ids().len())?;
        for id in path.ids() {
            self.write_i32(id.get())?;
        }
        Ok(())
    }

    fn write_opt_id_path(&mut self, path: Option<&IdPath>) -> LvcsResult<()> {
        self.write_bool(path.is_some())?;
        match path {
            Some(path) => self.write_id_path(path),
            None => Ok(()),
        }
    }

    pub fn write_content(&mut self, content: &Content) -> LvcsResult<()> {
        match content {
            Content::Bytes(bytes) => {
                self.write_u8(CONTENT_BYTES)?;
                self.write_bytes(bytes)
            }
            Content::Stored(stored) => {
                self.write_u8(CONTENT_STORED)?;
                self.write_i32(stored.id().get())
            }
            Content::Unavailable => self.write_u8(CONTENT_UNAVAILABLE),
        }
    }

    pub fn write_entry(&mut self, entry: &Entry) -> LvcsResult<()> {
        let (tag, name) = match &entry.kind {
            EntryKind::Root { .. } => (ENTRY_ROOT, None),
            EntryKind::Directory { .. } => (ENTRY_DIRECTORY, Some(entry.name.as_str())),
            EntryKind::File { .. } => (ENTRY_FILE, Some(entry.name.as_str())),
        };
        self.write_u8(tag)?;
        self.write_i32(entry.id.get())?;
        self.write_opt_string(name)?;
        match &entry.kind {
            EntryKind::File { content, timestamp } => {
                self.write_content(content)?;
                self.write_i64(*timestamp)
            }
            EntryKind::Root { children } | EntryKind::Directory { children } => {
                self.write_len(children.len())?;
                for child in children {
                    self.write_entry(child)?;
                }
                Ok(())
            }
        }
    }

    pub fn write_change(&mut self, change: &Change) -> LvcsResult<()> {
        match change {
            Change::CreateFile(c) => {
                self.write_u8(CHANGE_CREATE_FILE)?;
                self.write_i32(c.id.get())?;
                self.write_string(&c.path)?;
                self.write_content(&c.content)?;
                self.write_i64(c.timestamp)?;
                self.write_opt_id_path(c.id_path.as_ref())
            }
            Change::CreateDirectory(c) => {
                self.write_u8(CHANGE_CREATE_DIRECTORY)?;
                self.write_i32(c.id.get())?;
                self.write_string(&c.path)?;
                self.write_i64(c.timestamp)?;
                self.write_opt_id_path(c.id_path.as_ref())
            }
            Change::ChangeFileContent(c) => {
                self.write_u8(CHANGE_CONTENT)?;
                self.write_string(&c.path)?;
                self.write_content(&c.new_content)?;
                self.write_i64(c.new_timestamp)?;
                self.write_bool(c.old_content.is_some())?;
                if let Some(old_content) = &c.old_content {
                    self.write_content(old_content)?;
                    self.write_i64(c.old_timestamp)?;
                }
                self.write_opt_id_path(c.id_path.as_ref())
            }
            Change::Rename(c) => {
                self.write_u8(CHANGE_RENAME)?;
                self.write_string(&c.path)?;
                self.write_string(&c.new_name)?;
                self.write_i64(c.timestamp)?;
                self.write_opt_string(c.old_name.as_deref())?;
                self.write_opt_id_path(c.id_path.as_ref())
            }
            Change::Move(c) => {
                self.write_u8(CHANGE_MOVE)?;
                self.write_string(&c.path)?;
                self.write_string(&c.new_parent_path)?;
                self.write_i64(c.timestamp)?;
                self.write_opt_string(c.old_parent_path.as_deref())?;
                self.write_opt_id_path(c.from_id_path.as_ref())?;
                self.write_opt_id_path(c.to_id_path.as_ref())
            }
            Change::Delete(c) => {
                self.write_u8(CHANGE_DELETE)?;
                self.write_string(&c.path)?;
                self.write_i64(c.timestamp)?;
                self.write_bool(c.removed.is_some())?;
                if let Some(removed) = &c.removed {
                    self.write_entry(removed)?;
                }
                self.write_opt_id_path(c.id_path.as_ref())
            }
            Change::PutLabel(c) => {
                self.write_u8(CHANGE_PUT_LABEL)?;
                self.write_string(&c.name)?;
                self.write_i64(c.timestamp)?;
                self.write_bool(c.is_global_mark)
            }
            Change::PutSystemLabel(c) => {
                self.write_u8(CHANGE_PUT_SYSTEM_LABEL)?;
                self.write_string(&c.name)?;
                self.write_i64(c.timestamp)?;
                self.write_i32(c.color)
            }
            Change::PutEntryLabel(c) => {
                self.write_u8(CHANGE_PUT_ENTRY_LABEL)?;
                self.write_string(&c.path)?;
                self.write_string(&c.name)?;
                self.write_i64(c.timestamp)?;
                self.write_opt_id_path(c.id_path.as_ref())
            }
            Change::ChangeSet(c) => {
                self.write_u8(CHANGE_SET)?;
                self.write_opt_string(c.name.as_deref())?;
                self.write_i64(c.timestamp)?;
                self.write_len(c.changes.len())?;
                for member in &c.changes {
                    self.write_change(member)?;
                }
                Ok(())
            }
        }
    }

    pub fn write_change_list(&mut self, list: &ChangeList) -> LvcsResult<()> {
        self.write_len(list.len())?;
        for change in list.changes() {
            self.write_change(change)?;
        }
        Ok(())
    }

    pub fn write_memento(&mut self, memento: &Memento) -> LvcsResult<()> {
        self.write_state(&memento.root, memento.entry_counter, &memento.changes)
    }

    /// Writes the parts of a [`Memento`] without assembling one.
    pub fn write_state(
        &mut self,
        root: &Entry,
        entry_counter: i32,
        changes: &ChangeList,
    ) -> LvcsResult<()> {
        self.inner.write_all(MAGIC)?;
        self.write_i32(FORMAT_VERSION)?;
        self.write_entry(root)?;
        self.write_i32(entry_counter)?;
        self.write_change_list(changes)
    }
}

pub struct StreamReader<R: Read> {
    inner: R,
    storage: Arc<dyn Storage>,
    depth: usize,
}

impl<R: Read> StreamReader<R> {
    /// `storage` is what stored contents are bound to.
    pub fn new(inner: R, storage: Arc<dyn Storage>) -> Self {
        Self {
            inner,
            storage,
            depth: 0,
        }
    }

    fn nested<T>(&mut self, read: impl FnOnce(&mut Self) -> LvcsResult<T>) -> LvcsResult<T> {
        if self.depth >= MAX_NESTING {
            return Err(LvcsError::corrupted(format!(
                "nesting deeper than {MAX_NESTING} levels"
            )));
        }
        self.depth += 1;
        let result = read(self);
        self.depth -= 1;
        result
    }

    fn read_array<const N: usize>(&mut self) -> LvcsResult<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| LvcsError::corrupted(format!("truncated stream: {e}")))?;
        Ok(buf)
    }

    fn read_u8(&mut self) -> LvcsResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i32(&mut self) -> LvcsResult<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> LvcsResult<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_bool(&mut self) -> LvcsResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(LvcsError::corrupted(format!("invalid boolean byte {other}"))),
        }
    }

    fn read_len(&mut self) -> LvcsResult<usize> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| LvcsError::corrupted(format!("negative length {len}")))
    }

    pub fn read_bytes(&mut self) -> LvcsResult<Vec<u8>> {
        let len = self.read_len()?;
        let mut bytes = Vec::new();
        let read = (&mut self.inner)
            .take(len as u64)
            .read_to_end(&mut bytes)
            .map_err(|e| LvcsError::corrupted(format!("truncated stream: {e}")))?;
        if read != len {
            return Err(LvcsError::corrupted(format!(
                "expected {len} bytes, found {read}"
            )));
        }
        Ok(bytes)
    }

    pub fn read_opt_string(&mut self) -> LvcsResult<Option<String>> {
        if !self.read_bool()? {
            return Ok(None);
        }
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| LvcsError::corrupted(format!("invalid string: {e}")))
    }

    pub fn read_string(&mut self) -> LvcsResult<String> {
        self.read_opt_string()?
            .ok_or_else(|| LvcsError::corrupted("missing required string"))
    }

    pub fn read_id_path(&mut self) -> LvcsResult<IdPath> {
        let len = self.read_len()?;
        let mut ids = Vec::new();
        for _ in 0..len {
            ids.push(EntryId::new(self.read_i32()?));
        }
        Ok(IdPath::new(ids))
    }

    fn read_opt_id_path(&mut self) -> LvcsResult<Option<IdPath>> {
        if self.read_bool()? {
            Ok(Some(self.read_id_path()?))
        } else {
            Ok(None)
        }
    }

    pub fn read_content(&mut self) -> LvcsResult<Content> {
        match self.read_u8()? {
            CONTENT_BYTES => Ok(Content::Bytes(self.read_bytes()?)),
            CONTENT_STORED => {
                let id = ContentId::new(self.read_i32()?);
                Ok(Content::stored(id, self.storage.clone()))
            }
            CONTENT_UNAVAILABLE => Ok(Content::Unavailable),
            tag => Err(LvcsError::corrupted(format!("unknown content tag {tag}"))),
        }
    }

    fn read_children(&mut self) -> LvcsResult<Vec<Entry>> {
        let count = self.read_len()?;
        let mut children = Vec::new();
        for _ in 0..count {
            children.push(self.nested(Self::read_entry)?);
        }
        Ok(children)
    }

    pub fn read_entry(&mut self) -> LvcsResult<Entry> {
        let tag = self.read_u8()?;
        let id = EntryId::new(self.read_i32()?);
        let name = self.read_opt_string()?.unwrap_or_default();
        let kind = match tag {
            ENTRY_ROOT => EntryKind::Root {
                children: self.read_children()?,
            },
            ENTRY_DIRECTORY => EntryKind::Directory {
                children: self.read_children()?,
            },
            ENTRY_FILE => EntryKind::File {
                content: self.read_content()?,
                timestamp: self.read_i64()?,
            },
            tag => return Err(LvcsError::corrupted(format!("unknown entry tag {tag}"))),
        };
        Ok(Entry { id, name, kind })
    }

    pub fn read_change(&mut self) -> LvcsResult<Change> {
        let change = match self.read_u8()? {
            CHANGE_CREATE_FILE => Change::CreateFile(CreateFileChange {
                id: EntryId::new(self.read_i32()?),
                path: self.read_string()?,
                content: self.read_content()?,
                timestamp: self.read_i64()?,
                id_path: self.read_opt_id_path()?,
            }),
            CHANGE_CREATE_DIRECTORY => Change::CreateDirectory(CreateDirectoryChange {
                id: EntryId::new(self.read_i32()?),
                path: self.read_string()?,
                timestamp: self.read_i64()?,
                id_path: self.read_opt_id_path()?,
            }),
            CHANGE_CONTENT => {
                let path = self.read_string()?;
                let new_content = self.read_content()?;
                let new_timestamp = self.read_i64()?;
                let (old_content, old_timestamp) = if self.read_bool()? {
                    (Some(self.read_content()?), self.read_i64()?)
                } else {
                    (None, 0)
                };
                Change::ChangeFileContent(ChangeFileContentChange {
                    path,
                    new_content,
                    new_timestamp,
                    old_content,
                    old_timestamp,
                    id_path: self.read_opt_id_path()?,
                })
            }
            CHANGE_RENAME => Change::Rename(RenameChange {
                path: self.read_string()?,
                new_name: self.read_string()?,
                timestamp: self.read_i64()?,
                old_name: self.read_opt_string()?,
                id_path: self.read_opt_id_path()?,
            }),
            CHANGE_MOVE => Change::Move(MoveChange {
                path: self.read_string()?,
                new_parent_path: self.read_string()?,
                timestamp: self.read_i64()?,
                old_parent_path: self.read_opt_string()?,
                from_id_path: self.read_opt_id_path()?,
                to_id_path: self.read_opt_id_path()?,
            }),
            CHANGE_DELETE => {
                let path = self.read_string()?;
                let timestamp = self.read_i64()?;
                let removed = if self.read_bool()? {
                    Some(self.read_entry()?)
                } else {
                    None
                };
                Change::Delete(DeleteChange {
                    path,
                    timestamp,
                    removed,
                    id_path: self.read_opt_id_path()?,
                })
            }
            CHANGE_PUT_LABEL => Change::PutLabel(PutLabelChange {
                name: self.read_string()?,
                timestamp: self.read_i64()?,
                is_global_mark: self.read_bool()?,
            }),
            CHANGE_PUT_SYSTEM_LABEL => Change::PutSystemLabel(PutSystemLabelChange {
                name: self.read_string()?,
                timestamp: self.read_i64()?,
                color: self.read_i32()?,
            }),
            CHANGE_PUT_ENTRY_LABEL => Change::PutEntryLabel(PutEntryLabelChange {
                path: self.read_string()?,
                name: self.read_string()?,
                timestamp: self.read_i64()?,
                id_path: self.read_opt_id_path()?,
            }),
            CHANGE_SET => {
                let name = self.read_opt_string()?;
                let timestamp = self.read_i64()?;
                let count = self.read_len()?;
                let mut changes = Vec::new();
                for _ in 0..count {
                    changes.push(self.nested(Self::read_change)?);
                }
                Change::ChangeSet(ChangeSet {
                    name,
                    timestamp,
                    changes,
                })
            }
            tag => return Err(LvcsError::corrupted(format!("unknown change tag {tag}"))),
        };
        Ok(change)
    }

    pub fn read_change_list(&mut self) -> LvcsResult<ChangeList> {
        let count = self.read_len()?;
        let mut changes = Vec::new();
        for _ in 0..count {
            changes.push(self.read_change()?);
        }
        Ok(ChangeList::from_changes(changes))
    }

    pub fn read_memento(&mut self) -> LvcsResult<Memento> {
        let magic: [u8; 4] = self.read_array()?;
        if &magic != MAGIC {
            return Err(LvcsError::corrupted("not a local history state"));
        }
        let version = self.read_i32()?;
        if version != FORMAT_VERSION {
            return Err(LvcsError::corrupted(format!(
                "unsupported state version {version}"
            )));
        }
        let root = self.read_entry()?;
        if !matches!(root.kind, EntryKind::Root { .. }) {
            return Err(LvcsError::corrupted("state does not start with a root entry"));
        }
        Ok(Memento {
            root,
            entry_counter: self.read_i32()?,
            changes: self.read_change_list()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaseSensitivity;
    use crate::storage::InMemoryStorage;
    use crate::tree::EntryTree;

    fn storage() -> Arc<dyn Storage> {
        Arc::new(InMemoryStorage::new())
    }

    fn bytes(s: &str) -> Content {
        Content::Bytes(s.as_bytes().to_vec())
    }

    fn round_trip_change(change: &Change, storage: Arc<dyn Storage>) -> Change {
        let mut writer = StreamWriter::new(Vec::new());
        writer.write_change(change).unwrap();
        let buf = writer.into_inner();
        StreamReader::new(buf.as_slice(), storage).read_change().unwrap()
    }

    /// Tree and log after a realistic editing session, every change applied.
    fn session(storage: &Arc<dyn Storage>) -> (EntryTree, ChangeList) {
        let stored = Content::stored(storage.store_content(b"big").unwrap(), storage.clone());
        let mut tree = EntryTree::new(CaseSensitivity::Sensitive);
        let mut list = ChangeList::new();
        let steps: Vec<Vec<Change>> = vec![
            vec![CreateDirectoryChange::new(EntryId::new(0), "src", 1).into()],
            vec![CreateFileChange::new(EntryId::new(1), "src/a.rs", bytes("fn a() {}"), 2).into()],
            vec![
                ChangeFileContentChange::new("src/a.rs", stored, 3).into(),
                RenameChange::new("src/a.rs", "b.rs", 4).into(),
            ],
            vec![CreateDirectoryChange::new(EntryId::new(2), "lib", 5).into()],
            vec![MoveChange::new("src/b.rs", "lib", 6).into()],
            vec![PutEntryLabelChange::new("lib/b.rs", "reviewed", 7).into()],
            vec![PutSystemLabelChange::new("external change", 8, 0x00ff00).into()],
            vec![DeleteChange::new("src", 9).into()],
            vec![PutLabelChange::new("release", 10, true).into()],
        ];
        for (i, step) in steps.into_iter().enumerate() {
            list.begin_change_set().unwrap();
            for mut change in step {
                change.apply_to(&mut tree).unwrap();
                list.add_change(change).unwrap();
            }
            list.end_change_set(Some(format!("step {i}"))).unwrap();
        }
        (tree, list)
    }

    #[test]
    fn test_memento_round_trip() {
        let storage = storage();
        let (tree, list) = session(&storage);
        let memento = Memento {
            root: tree.to_root_entry(),
            entry_counter: 3,
            changes: list,
        };

        let encoded = memento.encode().unwrap();
        let decoded = Memento::decode(&encoded, storage.clone()).unwrap();

        assert_eq!(decoded.root, memento.root);
        assert_eq!(decoded.entry_counter, 3);
        assert_eq!(decoded.changes.changes(), memento.changes.changes());

        let restored = EntryTree::from_root_entry(decoded.root, CaseSensitivity::Sensitive).unwrap();
        let file = restored.get_entry("lib/b.rs").unwrap();
        assert_eq!(file.parent().unwrap().name(), "lib");
        assert_eq!(file.content().unwrap().bytes().unwrap(), b"big");
    }

    #[test]
    fn test_decoded_changes_keep_captured_state() {
        let storage = storage();
        let (mut tree, list) = session(&storage);
        let encoded = Memento {
            root: tree.to_root_entry(),
            entry_counter: 3,
            changes: list,
        }
        .encode()
        .unwrap();
        let decoded = Memento::decode(&encoded, storage).unwrap();

        // Reverting the decoded delete brings back the removed directory
        let delete = decoded.changes.changes()[7].clone();
        delete.revert_on(&mut tree).unwrap();
        assert!(tree.has_entry("src"));
        assert!(delete.affects(EntryId::new(0)));
    }

    #[test]
    fn test_unavailable_content_survives() {
        let change = Change::CreateFile(CreateFileChange::new(
            EntryId::new(4),
            "huge.bin",
            Content::Unavailable,
            11,
        ));
        let Change::CreateFile(read) = round_trip_change(&change, storage()) else {
            panic!("expected a file creation");
        };
        assert!(!read.content().is_available());
        assert_eq!(read.path(), "huge.bin");
        assert_eq!(read.id(), EntryId::new(4));
    }

    #[test]
    fn test_unapplied_change_round_trip() {
        let change = Change::Move(MoveChange::new("a/b", "c", 12));
        assert_eq!(round_trip_change(&change, storage()), change);
    }

    #[test]
    fn test_decoded_stored_content_binds_to_reader_storage() {
        let original = storage();
        let id = original.store_content(b"payload").unwrap();
        let change = Change::ChangeFileContent(ChangeFileContentChange::new(
            "f",
            Content::stored(id, original.clone()),
            1,
        ));

        let other = storage();
        let Change::ChangeFileContent(read) = round_trip_change(&change, other) else {
            panic!("expected a content change");
        };
        assert_eq!(read.new_content().stored_id(), Some(id));
        assert!(read.new_content().bytes().is_none());
    }

    #[test]
    fn test_bad_magic_is_corrupted() {
        let err = Memento::decode(b"NOPE\x01\x00\x00\x00", storage()).unwrap_err();
        assert!(err.is_rebuild_needed());
    }

    #[test]
    fn test_truncated_state_is_corrupted() {
        let storage = storage();
        let (tree, list) = session(&storage);
        let encoded = Memento {
            root: tree.to_root_entry(),
            entry_counter: 3,
            changes: list,
        }
        .encode()
        .unwrap();

        for cut in [4, 9, encoded.len() / 2, encoded.len() - 1] {
            let err = Memento::decode(&encoded[..cut], storage.clone()).unwrap_err();
            assert!(err.is_rebuild_needed(), "cut at {cut}: {err}");
        }
    }

    #[test]
    fn test_deeply_nested_change_sets_are_corrupted() {
        let mut buf = Vec::new();
        for _ in 0..MAX_NESTING + 10 {
            buf.push(CHANGE_SET);
            buf.push(0);
            buf.extend_from_slice(&0i64.to_le_bytes());
            buf.extend_from_slice(&1i32.to_le_bytes());
        }
        let mut reader = StreamReader::new(buf.as_slice(), storage());
        let err = reader.read_change().unwrap_err();
        assert!(err.is_rebuild_needed(), "{err}");
    }

    #[test]
    fn test_deeply_nested_directories_are_corrupted() {
        let mut buf = Vec::new();
        for i in 0..MAX_NESTING as i32 + 10 {
            buf.push(ENTRY_DIRECTORY);
            buf.extend_from_slice(&i.to_le_bytes());
            buf.push(0);
            buf.extend_from_slice(&1i32.to_le_bytes());
        }
        let mut reader = StreamReader::new(buf.as_slice(), storage());
        assert!(matches!(
            reader.read_entry(),
            Err(LvcsError::Corrupted { .. })
        ));
    }

    #[test]
    fn test_unknown_tag_is_corrupted() {
        let mut reader = StreamReader::new(&[42u8][..], storage());
        assert!(matches!(
            reader.read_change(),
            Err(LvcsError::Corrupted { .. })
        ));
    }
}
