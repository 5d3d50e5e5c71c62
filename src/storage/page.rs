use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a page allocated by a storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub u64);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {}", self.0)
    }
}

/// Target of a store request.
///
/// `New` asks the backend to allocate a fresh id; callers never invent ids
/// themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageRef {
    New,
    Existing(PageId),
}

impl PageRef {
    pub fn page_id(&self) -> Option<PageId> {
        match self {
            PageRef::New => None,
            PageRef::Existing(page_id) => Some(*page_id),
        }
    }
}

impl From<PageId> for PageRef {
    fn from(page_id: PageId) -> Self {
        PageRef::Existing(page_id)
    }
}

/// A persisted page: its id and the opaque bytes stored under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub id: PageId,
    pub data: Bytes,
}

impl Page {
    pub fn new(id: PageId, data: impl Into<Bytes>) -> Self {
        Self {
            id,
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
