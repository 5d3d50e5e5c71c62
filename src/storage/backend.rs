//! Pluggable page storage backends.
//!
//! A backend is the single source of truth for durability. It maps
//! backend-allocated [`PageId`]s to opaque byte payloads and never interprets
//! those payloads.
//!
//! # Invariants
//!
//! - `store(PageRef::New, ..)` returns an id that was never handed out before
//!   while the backend is open
//! - `load` returns exactly the bytes last stored under that id
//! - operations on an id the backend does not know fail with
//!   [`StorageError::InvalidPage`]
//! - calls made outside a `create`/`destroy` bracket fail with
//!   [`StorageError::BackendUnavailable`]
//!
//! # Implementors
//!
//! - [`MemoryBackend`] - in-process reference store
//! - [`FileBackend`] - append-only page file

pub mod file;
pub mod memory;

pub use file::{FileBackend, FileBackendConfig};
pub use memory::MemoryBackend;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{PageId, PageRef};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;

pub trait StorageBackend: Send {
    /// Prepare the backend for use. Called once per session open.
    fn create(&mut self) -> StorageResult<()> {
        Ok(())
    }

    /// Tear the backend down. Called once when the owning session ends.
    ///
    /// Anything the backend promises to be durable must already be durable
    /// before this runs.
    fn destroy(&mut self) -> StorageResult<()> {
        Ok(())
    }

    /// Return the bytes stored under `page_id`.
    fn load(&mut self, page_id: PageId) -> StorageResult<Bytes>;

    /// Persist `data`, allocating a fresh id for `PageRef::New`.
    fn store(&mut self, page: PageRef, data: &[u8]) -> StorageResult<PageId>;

    /// Remove `page_id`.
    fn delete(&mut self, page_id: PageId) -> StorageResult<()>;

    /// Drop every page and restart allocation. Used when a session is opened
    /// with `overwrite`.
    fn clear(&mut self) -> StorageResult<()> {
        Err(StorageError::unavailable(
            "backend does not support discarding existing pages",
        ))
    }

    /// Number of live pages.
    fn page_count(&self) -> usize;
}

/// A backend instance shared between the adopter and the sessions opened on it.
pub type SharedBackend<B> = Arc<Mutex<B>>;

pub fn shared<B: StorageBackend>(backend: B) -> SharedBackend<B> {
    Arc::new(Mutex::new(backend))
}

impl<B: StorageBackend> StorageBackend for Arc<Mutex<B>> {
    fn create(&mut self) -> StorageResult<()> {
        self.lock().create()
    }

    fn destroy(&mut self) -> StorageResult<()> {
        self.lock().destroy()
    }

    fn load(&mut self, page_id: PageId) -> StorageResult<Bytes> {
        self.lock().load(page_id)
    }

    fn store(&mut self, page: PageRef, data: &[u8]) -> StorageResult<PageId> {
        self.lock().store(page, data)
    }

    fn delete(&mut self, page_id: PageId) -> StorageResult<()> {
        self.lock().delete(page_id)
    }

    fn clear(&mut self) -> StorageResult<()> {
        self.lock().clear()
    }

    fn page_count(&self) -> usize {
        self.lock().page_count()
    }
}

impl<B: StorageBackend + ?Sized> StorageBackend for Box<B> {
    fn create(&mut self) -> StorageResult<()> {
        (**self).create()
    }

    fn destroy(&mut self) -> StorageResult<()> {
        (**self).destroy()
    }

    fn load(&mut self, page_id: PageId) -> StorageResult<Bytes> {
        (**self).load(page_id)
    }

    fn store(&mut self, page: PageRef, data: &[u8]) -> StorageResult<PageId> {
        (**self).store(page, data)
    }

    fn delete(&mut self, page_id: PageId) -> StorageResult<()> {
        (**self).delete(page_id)
    }

    fn clear(&mut self) -> StorageResult<()> {
        (**self).clear()
    }

    fn page_count(&self) -> usize {
        (**self).page_count()
    }
}
