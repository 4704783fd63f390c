//! Content store and persisted state backends

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

use crate::error::{LvcsError, LvcsResult};
use crate::ContentId;

const CONTENTS_DIR: &str = "contents";
const STATE_FILE: &str = "state.bin";

/// Byte store for file contents plus the single persisted state blob.
///
/// Implementations carry their own synchronization; the core holds the
/// store behind an `Arc` and may share it with content references.
pub trait Storage: Send + Sync {
    fn store_content(&self, bytes: &[u8]) -> LvcsResult<ContentId>;
    fn load_content(&self, id: ContentId) -> LvcsResult<Vec<u8>>;
    fn purge_contents(&self, ids: &[ContentId]) -> LvcsResult<()>;

    fn read_state(&self) -> LvcsResult<Option<Vec<u8>>>;
    fn write_state(&self, bytes: &[u8]) -> LvcsResult<()>;
    /// Drops the persisted state and every stored content.
    fn discard_state(&self) -> LvcsResult<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> LvcsResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| LvcsError::storage(format!("failed to acquire storage lock: {e}")))
}

/// In-memory storage implementation
pub struct InMemoryStorage {
    next_id: Mutex<i32>,
    contents: Mutex<HashMap<ContentId, Vec<u8>>>,
    state: Mutex<Option<Vec<u8>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(0),
            contents: Mutex::new(HashMap::new()),
            state: Mutex::new(None),
        }
    }

    pub fn content_count(&self) -> LvcsResult<usize> {
        Ok(lock(&self.contents)?.len())
    }

    fn get_next_id(&self) -> LvcsResult<ContentId> {
        let mut next_id = lock(&self.next_id)?;
        let id = ContentId::new(*next_id);
        *next_id += 1;
        Ok(id)
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for InMemoryStorage {
    fn store_content(&self, bytes: &[u8]) -> LvcsResult<ContentId> {
        let id = self.get_next_id()?;
        lock(&self.contents)?.insert(id, bytes.to_vec());
        Ok(id)
    }

    fn load_content(&self, id: ContentId) -> LvcsResult<Vec<u8>> {
        lock(&self.contents)?
            .get(&id)
            .cloned()
            .ok_or(LvcsError::ContentNotFound { id: id.get() })
    }

    fn purge_contents(&self, ids: &[ContentId]) -> LvcsResult<()> {
        let mut contents = lock(&self.contents)?;
        for id in ids {
            contents.remove(id);
        }
        Ok(())
    }

    fn read_state(&self) -> LvcsResult<Option<Vec<u8>>> {
        Ok(lock(&self.state)?.clone())
    }

    fn write_state(&self, bytes: &[u8]) -> LvcsResult<()> {
        *lock(&self.state)? = Some(bytes.to_vec());
        Ok(())
    }

    fn discard_state(&self) -> LvcsResult<()> {
        *lock(&self.state)? = None;
        lock(&self.contents)?.clear();
        Ok(())
    }
}

/// Storage rooted at a directory: one file per content under `contents/`
/// and the state blob in `state.bin`.
pub struct DirectoryStorage {
    root: PathBuf,
    next_id: Mutex<i32>,
}

impl DirectoryStorage {
    /// Opens the directory, creating it when missing.
    pub fn open<P: AsRef<Path>>(root: P) -> LvcsResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(CONTENTS_DIR))?;
        let next_id = Self::scan_next_id(&root.join(CONTENTS_DIR))?;
        debug!("Opened directory storage at {} (next content id {})", root.display(), next_id);
        Ok(Self {
            root,
            next_id: Mutex::new(next_id),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scan_next_id(contents_dir: &Path) -> LvcsResult<i32> {
        let mut max_id = -1;
        for entry in fs::read_dir(contents_dir)? {
            let entry = entry?;
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<i32>().ok())
            {
                max_id = max_id.max(id);
            }
        }
        Ok(max_id + 1)
    }

    fn content_path(&self, id: ContentId) -> PathBuf {
        self.root.join(CONTENTS_DIR).join(id.get().to_string())
    }

    fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }
}

impl Storage for DirectoryStorage {
    fn store_content(&self, bytes: &[u8]) -> LvcsResult<ContentId> {
        let mut next_id = lock(&self.next_id)?;
        let id = ContentId::new(*next_id);
        fs::write(self.content_path(id), bytes)?;
        *next_id += 1;
        Ok(id)
    }

    fn load_content(&self, id: ContentId) -> LvcsResult<Vec<u8>> {
        match fs::read(self.content_path(id)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(LvcsError::ContentNotFound { id: id.get() })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn purge_contents(&self, ids: &[ContentId]) -> LvcsResult<()> {
        for id in ids {
            match fs::remove_file(self.content_path(*id)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn read_state(&self) -> LvcsResult<Option<Vec<u8>>> {
        match fs::read(self.state_path()) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_state(&self, bytes: &[u8]) -> LvcsResult<()> {
        // The blob on disk is always either the old or the new one
        let tmp = self.root.join(format!("{STATE_FILE}.tmp"));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, self.state_path())?;
        Ok(())
    }

    fn discard_state(&self) -> LvcsResult<()> {
        info!("Discarding local history state at {}", self.root.display());
        match fs::remove_file(self.state_path()) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let contents_dir = self.root.join(CONTENTS_DIR);
        fs::remove_dir_all(&contents_dir)?;
        fs::create_dir_all(&contents_dir)?;
        *lock(&self.next_id)? = 0;
        Ok(())
    }
}
