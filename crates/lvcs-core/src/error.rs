//! Error types for the local history core

use std::io;

/// Core local history error type
#[derive(thiserror::Error, Debug)]
pub enum LvcsError {
    #[error("entry not found: {path}")]
    EntryNotFound { path: String },
    #[error("entry already exists: {path}")]
    EntryAlreadyExists { path: String },
    #[error("not a directory: {path}")]
    NotADirectory { path: String },
    #[error("not a file: {path}")]
    NotAFile { path: String },
    #[error("invalid path: {path:?}")]
    InvalidPath { path: String },
    #[error("change has already been applied")]
    AlreadyApplied,
    #[error("change has not been applied yet")]
    NotApplied,
    #[error("a change set is already open")]
    TransactionAlreadyOpen,
    #[error("no change set is open")]
    NoOpenTransaction,
    #[error("log position {index} is no longer in the change list")]
    UnknownLogPosition { index: usize },
    #[error("content {id} not found in storage")]
    ContentNotFound { id: i32 },
    #[error("storage error: {message}")]
    Storage { message: String },
    #[error("persisted state is corrupted, rebuild needed: {message}")]
    Corrupted { message: String },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl LvcsError {
    pub fn entry_not_found<S: Into<String>>(path: S) -> Self {
        Self::EntryNotFound { path: path.into() }
    }

    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn corrupted<S: Into<String>>(message: S) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// True when the persisted state cannot be decoded and has to be discarded.
    pub fn is_rebuild_needed(&self) -> bool {
        matches!(self, Self::Corrupted { .. })
    }
}

pub type LvcsResult<T> = Result<T, LvcsError>;
