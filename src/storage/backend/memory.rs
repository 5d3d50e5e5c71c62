use super::StorageBackend;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{Page, PageId, PageRef};
use bytes::Bytes;
use std::collections::HashMap;

/// In-process backend keeping every page in a hash map.
///
/// Pages survive `destroy`, so the same instance can be reopened by a new
/// session and expose what the previous session wrote.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    pages: HashMap<PageId, Bytes>,
    /// Next id to hand out. Only moves forward, so deleted ids are never reused.
    next_page_id: u64,
    id_limit: Option<u64>,
    is_open: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that refuses to allocate more than `limit` ids.
    pub fn with_id_limit(limit: u64) -> Self {
        Self {
            id_limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.pages.contains_key(&page_id)
    }

    /// Snapshot of every live page, ordered by id.
    pub fn pages(&self) -> Vec<Page> {
        let mut pages: Vec<Page> = self
            .pages
            .iter()
            .map(|(&id, data)| Page::new(id, data.clone()))
            .collect();
        pages.sort_by_key(|page| page.id);
        pages
    }

    fn check_open(&self) -> StorageResult<()> {
        if !self.is_open {
            return Err(StorageError::unavailable("memory backend is not open"));
        }
        Ok(())
    }

    fn allocate(&mut self) -> StorageResult<PageId> {
        if let Some(limit) = self.id_limit {
            if self.next_page_id >= limit {
                return Err(StorageError::AllocationExhausted);
            }
        }
        let next = self
            .next_page_id
            .checked_add(1)
            .ok_or(StorageError::AllocationExhausted)?;
        let page_id = PageId(self.next_page_id);
        self.next_page_id = next;
        Ok(page_id)
    }
}

impl StorageBackend for MemoryBackend {
    fn create(&mut self) -> StorageResult<()> {
        if self.is_open {
            return Err(StorageError::unavailable("memory backend is already open"));
        }
        self.is_open = true;
        Ok(())
    }

    fn destroy(&mut self) -> StorageResult<()> {
        self.check_open()?;
        self.is_open = false;
        Ok(())
    }

    fn load(&mut self, page_id: PageId) -> StorageResult<Bytes> {
        self.check_open()?;
        self.pages
            .get(&page_id)
            .cloned()
            .ok_or(StorageError::InvalidPage(page_id))
    }

    fn store(&mut self, page: PageRef, data: &[u8]) -> StorageResult<PageId> {
        self.check_open()?;
        let page_id = match page {
            PageRef::New => self.allocate()?,
            PageRef::Existing(page_id) => {
                if !self.pages.contains_key(&page_id) {
                    return Err(StorageError::InvalidPage(page_id));
                }
                page_id
            }
        };
        self.pages.insert(page_id, Bytes::copy_from_slice(data));
        Ok(page_id)
    }

    fn delete(&mut self, page_id: PageId) -> StorageResult<()> {
        self.check_open()?;
        self.pages
            .remove(&page_id)
            .map(|_| ())
            .ok_or(StorageError::InvalidPage(page_id))
    }

    fn clear(&mut self) -> StorageResult<()> {
        self.check_open()?;
        self.pages.clear();
        self.next_page_id = 0;
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }
}
