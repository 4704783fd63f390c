//! File content as recorded in the history

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::storage::Storage;
use crate::ContentId;

/// Byte payload of a file at a point in time.
///
/// Equality follows the variant: inline bytes compare by value, stored
/// contents by store id, and unavailable content is never equal to anything,
/// itself included.
#[derive(Clone)]
pub enum Content {
    Bytes(Vec<u8>),
    Stored(StoredContent),
    /// Content that was deliberately not captured, e.g. a file over the size limit.
    Unavailable,
}

/// Reference to bytes held by a [`Storage`].
#[derive(Clone)]
pub struct StoredContent {
    id: ContentId,
    storage: Arc<dyn Storage>,
}

impl StoredContent {
    pub fn new(id: ContentId, storage: Arc<dyn Storage>) -> Self {
        Self { id, storage }
    }

    pub fn id(&self) -> ContentId {
        self.id
    }
}

impl Content {
    pub fn stored(id: ContentId, storage: Arc<dyn Storage>) -> Self {
        Content::Stored(StoredContent::new(id, storage))
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, Content::Unavailable)
    }

    pub fn stored_id(&self) -> Option<ContentId> {
        match self {
            Content::Stored(stored) => Some(stored.id),
            _ => None,
        }
    }

    /// Fetches the bytes. A store entry that is gone degrades to `None`
    /// exactly like unavailable content.
    pub fn bytes(&self) -> Option<Vec<u8>> {
        match self {
            Content::Bytes(bytes) => Some(bytes.clone()),
            Content::Stored(stored) => match stored.storage.load_content(stored.id) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!("Content {} is no longer loadable: {}", stored.id, e);
                    None
                }
            },
            Content::Unavailable => None,
        }
    }
}

impl PartialEq for Content {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Content::Bytes(left), Content::Bytes(right)) => left == right,
            (Content::Stored(left), Content::Stored(right)) => left.id == right.id,
            _ => false,
        }
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Content::Stored(stored) => f.debug_tuple("Stored").field(&stored.id).finish(),
            Content::Unavailable => f.write_str("Unavailable"),
        }
    }
}
