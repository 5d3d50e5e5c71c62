pub mod lru;
pub mod replacer;

use crate::storage::backend::StorageBackend;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{PageId, PageRef};
use bytes::Bytes;
use lru::LruReplacer;
use replacer::Replacer;
use std::collections::HashMap;

#[derive(Debug)]
struct BufferEntry {
    data: Bytes,
    /// The backend copy of this page is stale.
    is_dirty: bool,
}

/// Counters describing how much work the buffer kept away from the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub hits: u64,
    pub misses: u64,
    pub backend_reads: u64,
    pub backend_writes: u64,
    pub evictions: u64,
}

/// Cache of recently touched pages in front of a [`StorageBackend`].
///
/// With `writethrough` every store reaches the backend immediately and
/// entries are never dirty. Otherwise a store to a page that is already
/// buffered stays in the buffer until the entry is evicted or
/// [`PageBuffer::flush`] runs; a store to a page that is not buffered goes to
/// the backend so unknown ids fail on the call that names them. A capacity of
/// zero turns the buffer into a pass-through.
pub struct PageBuffer<B: StorageBackend> {
    backend: B,
    entries: HashMap<PageId, BufferEntry>,
    replacer: Box<dyn Replacer>,
    capacity: usize,
    writethrough: bool,
    stats: BufferStats,
}

impl<B: StorageBackend> PageBuffer<B> {
    pub fn new(backend: B, capacity: usize, writethrough: bool) -> Self {
        Self::with_replacer(backend, Box::new(LruReplacer::new()), capacity, writethrough)
    }

    pub fn with_replacer(
        backend: B,
        replacer: Box<dyn Replacer>,
        capacity: usize,
        writethrough: bool,
    ) -> Self {
        Self {
            backend,
            entries: HashMap::with_capacity(capacity),
            replacer,
            capacity,
            writethrough,
            stats: BufferStats::default(),
        }
    }

    pub fn load(&mut self, page_id: PageId) -> StorageResult<Bytes> {
        // Check if page is already buffered
        if let Some(entry) = self.entries.get(&page_id) {
            let data = entry.data.clone();
            self.stats.hits += 1;
            self.replacer.touch(page_id);
            return Ok(data);
        }

        self.stats.misses += 1;
        self.stats.backend_reads += 1;
        let data = self.backend.load(page_id)?;

        if self.capacity > 0 {
            self.reserve(Some(page_id))?;
            self.put(page_id, data.clone(), false);
        }
        Ok(data)
    }

    pub fn store(&mut self, page: PageRef, data: Bytes) -> StorageResult<PageId> {
        if self.capacity == 0 {
            self.stats.backend_writes += 1;
            return self.backend.store(page, &data);
        }

        // Room is made before the backend sees a new page, so a failed
        // eviction never strands a freshly allocated id.
        self.reserve(page.page_id())?;

        match page {
            // A resident entry came from a successful backend call, so the
            // id is known to exist and the write can wait.
            PageRef::Existing(page_id) if !self.writethrough && self.contains(page_id) => {
                self.put(page_id, data, true);
                Ok(page_id)
            }
            _ => {
                self.stats.backend_writes += 1;
                let page_id = self.backend.store(page, &data)?;
                self.put(page_id, data, false);
                Ok(page_id)
            }
        }
    }

    /// Drop any buffered copy of `page_id` and delete it from the backend.
    ///
    /// Unflushed writes to the page are discarded.
    pub fn delete(&mut self, page_id: PageId) -> StorageResult<()> {
        if let Some(entry) = self.entries.remove(&page_id) {
            self.replacer.remove(page_id);
            if entry.is_dirty {
                log::debug!("Discarding unflushed write to {} on delete", page_id);
            }
        }
        self.backend.delete(page_id)
    }

    /// Write every dirty entry to the backend, least recently touched first.
    ///
    /// Stops at the first failed write; that entry and any not yet written
    /// stay dirty.
    pub fn flush(&mut self) -> StorageResult<()> {
        let dirty: Vec<PageId> = self
            .replacer
            .eviction_order()
            .into_iter()
            .filter(|page_id| self.is_dirty(*page_id))
            .collect();

        for &page_id in &dirty {
            self.write_back(page_id)?;
        }

        if !dirty.is_empty() {
            log::debug!("Flushed {} dirty pages", dirty.len());
        }
        Ok(())
    }

    /// Flush, then drop every entry.
    pub fn clear(&mut self) -> StorageResult<()> {
        self.flush()?;
        for page_id in self.entries.keys() {
            self.replacer.remove(*page_id);
        }
        self.entries.clear();
        Ok(())
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.entries.contains_key(&page_id)
    }

    pub fn is_dirty(&self, page_id: PageId) -> bool {
        self.entries
            .get(&page_id)
            .is_some_and(|entry| entry.is_dirty)
    }

    pub fn dirty_count(&self) -> usize {
        self.entries.values().filter(|entry| entry.is_dirty).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> BufferStats {
        self.stats
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Give the backend back. Dirty entries are dropped, so flush first.
    pub fn into_inner(self) -> B {
        self.backend
    }

    /// Evict until an entry for `page_id` (or a new page) fits.
    fn reserve(&mut self, page_id: Option<PageId>) -> StorageResult<()> {
        if page_id.is_some_and(|id| self.entries.contains_key(&id)) {
            return Ok(());
        }

        while self.entries.len() >= self.capacity {
            let victim = self.replacer.victim().ok_or_else(|| {
                StorageError::unavailable("page buffer has no eviction candidate")
            })?;
            self.evict(victim)?;
        }
        Ok(())
    }

    fn evict(&mut self, page_id: PageId) -> StorageResult<()> {
        if self.is_dirty(page_id) {
            self.write_back(page_id)?;
        }

        if self.entries.remove(&page_id).is_some() {
            self.stats.evictions += 1;
            log::debug!("Evicted {} from page buffer", page_id);
        }
        self.replacer.remove(page_id);
        Ok(())
    }

    fn write_back(&mut self, page_id: PageId) -> StorageResult<()> {
        let Some(data) = self.entries.get(&page_id).map(|entry| entry.data.clone()) else {
            return Ok(());
        };

        self.stats.backend_writes += 1;
        self.backend.store(PageRef::Existing(page_id), &data)?;
        if let Some(entry) = self.entries.get_mut(&page_id) {
            entry.is_dirty = false;
        }
        Ok(())
    }

    fn put(&mut self, page_id: PageId, data: Bytes, is_dirty: bool) {
        self.entries.insert(page_id, BufferEntry { data, is_dirty });
        self.replacer.touch(page_id);
    }
}
