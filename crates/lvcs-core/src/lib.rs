//! LVCS Core — embedded local history for a virtual file tree
//!
//! This crate records every edit to a tree of files and directories as a log
//! of reversible changes, reconstructs historical revisions and file contents
//! from that log, and persists the whole state as one binary blob through a
//! pluggable content store.

pub mod change;
pub mod change_list;
pub mod clock;
pub mod config;
pub mod content;
pub mod error;
pub mod local_vcs;
pub mod paths;
pub mod revisions;
pub mod storage;
pub mod stream;
pub mod tree;
pub mod types;

// Re-export key types for convenience
pub use change::{Change, ChangeSet};
pub use change_list::ChangeList;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CaseSensitivity, LvcsConfig};
pub use content::Content;
pub use error::{LvcsError, LvcsResult};
pub use local_vcs::LocalVcs;
pub use revisions::{
    at_or_before, exactly, RecentChange, Revision, RevisionKind, TimestampComparator,
};
pub use storage::{DirectoryStorage, InMemoryStorage, Storage};
pub use tree::{Entry, EntryKind, EntryRef, EntryTree};
pub use types::*;
